//! Queued mutations awaiting remote confirmation.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::records::{Identity, TransactionFields};

/// Collection path of transaction records on the remote API.
pub const TRANSACTIONS_RESOURCE: &str = "/api/transactions";

/// Collection path of categories on the remote API.
pub const CATEGORIES_RESOURCE: &str = "/api/categories";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Create,
    Update,
    Delete,
}

impl OperationKind {
    pub fn method(&self) -> HttpMethod {
        match self {
            Self::Create => HttpMethod::Post,
            Self::Update => HttpMethod::Put,
            Self::Delete => HttpMethod::Delete,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }
}

/// A mutation persisted in the pending operation log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingOperation {
    pub id: String,
    pub kind: OperationKind,
    /// Collection path, e.g. `/api/transactions`.
    pub resource: String,
    /// Record the mutation applies to. For creates this is the temporary
    /// identity of the optimistic local record.
    pub target: Option<Identity>,
    pub method: HttpMethod,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub owner_id: String,
    pub attempts: i32,
    pub last_error: Option<String>,
}

impl PendingOperation {
    /// Path to call for this operation, given the confirmed token of the target.
    pub fn request_path(&self, confirmed_token: Option<&str>) -> String {
        let base = self.resource.trim_end_matches('/');
        match (self.kind, confirmed_token) {
            (OperationKind::Create, _) | (_, None) => base.to_string(),
            (_, Some(token)) => format!("{}/{}", base, token),
        }
    }

    /// Business fields carried by the payload, when it holds a transaction.
    pub fn fields(&self) -> Option<TransactionFields> {
        serde_json::from_value(self.payload.clone()).ok()
    }

    pub fn targets_temporary(&self) -> bool {
        self.target.as_ref().is_some_and(Identity::is_temporary)
    }

    /// Signature used to collapse duplicate submissions within one pass.
    ///
    /// Creates are keyed on their fields only. Updates and deletes also carry
    /// the target, so edits of two distinct records never collapse.
    pub fn dedup_signature(&self, today: NaiveDate) -> Option<super::DedupSignature> {
        let fields = self.fields()?;
        let target = match self.kind {
            OperationKind::Create => None,
            OperationKind::Update | OperationKind::Delete => self.target.clone(),
        };
        Some(super::DedupSignature {
            op: self.kind,
            record: crate::records::RecordSignature::new(
                fields.kind,
                fields.amount,
                &fields.category,
                fields.date.unwrap_or(today),
            ),
            target,
        })
    }
}

/// Request to append a mutation to the log.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPendingOperation {
    pub kind: OperationKind,
    pub resource: String,
    pub target: Option<Identity>,
    pub payload: serde_json::Value,
    pub owner_id: String,
}

impl NewPendingOperation {
    pub fn new(
        kind: OperationKind,
        target: Option<Identity>,
        payload: serde_json::Value,
        owner_id: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            resource: TRANSACTIONS_RESOURCE.to_string(),
            target,
            payload,
            owner_id: owner_id.into(),
        }
    }

    pub fn method(&self) -> HttpMethod {
        self.kind.method()
    }
}
