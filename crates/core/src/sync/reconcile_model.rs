//! Per-pass bookkeeping of the reconciler.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::OperationKind;
use crate::records::{Identity, RecordSignature};

/// Key used to recognize logically identical queued operations.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DedupSignature {
    pub op: OperationKind,
    pub record: RecordSignature,
    pub target: Option<Identity>,
}

/// Temporary token -> confirmed token, valid for a single pass.
#[derive(Debug, Clone, Default)]
pub struct TempIdMapping {
    confirmed: HashMap<String, String>,
    aliases: HashMap<String, String>,
}

impl TempIdMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, temp_token: &str, confirmed_token: &str) {
        self.confirmed
            .insert(temp_token.to_string(), confirmed_token.to_string());
    }

    /// Make `duplicate` resolve through `survivor` (a collapsed duplicate create).
    pub fn alias(&mut self, duplicate: &str, survivor: &str) {
        if duplicate != survivor {
            self.aliases
                .insert(duplicate.to_string(), survivor.to_string());
        }
    }

    /// Temporary token that actually carries the create for `temp_token`.
    pub fn canonical<'a>(&'a self, temp_token: &'a str) -> &'a str {
        let mut current = temp_token;
        // Aliases always point at a survivor that is not itself aliased,
        // the bound only guards against a corrupted map.
        for _ in 0..self.aliases.len() {
            match self.aliases.get(current) {
                Some(next) => current = next.as_str(),
                None => break,
            }
        }
        current
    }

    pub fn resolve(&self, temp_token: &str) -> Option<&str> {
        self.confirmed
            .get(self.canonical(temp_token))
            .map(String::as_str)
    }

    /// Rewrite a temporary identity to its confirmed one when known.
    pub fn rewrite(&self, identity: &Identity) -> Option<Identity> {
        match identity {
            Identity::Temporary(token) => self.resolve(token).map(Identity::confirmed),
            Identity::Confirmed(_) => Some(identity.clone()),
        }
    }

    pub fn len(&self) -> usize {
        self.confirmed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.confirmed.is_empty()
    }
}

/// Outcome counts of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileSummary {
    pub succeeded: usize,
    pub failed: usize,
    /// Left in the log because their create is not confirmed yet.
    pub deferred: usize,
    /// Dropped as duplicates of an earlier operation in the same pass.
    pub deduplicated: usize,
    /// Temporary records removed by the post-pass cleanup.
    pub cleaned_up: usize,
    /// The pass stopped early because the remote became unreachable.
    pub interrupted: bool,
    pub duration_ms: i64,
}

impl ReconcileSummary {
    pub fn processed(&self) -> usize {
        self.succeeded + self.failed
    }
}

/// Result of asking the reconciler for a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The pass (and any coalesced follow-up passes) ran; summary of the last one.
    Completed(ReconcileSummary),
    /// Another pass was draining; this request was folded into a re-run.
    Coalesced,
}
