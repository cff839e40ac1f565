//! Domain models for locally cached records.

use std::fmt;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{Error, Result};

/// Identity of a cached record.
///
/// A temporary identity is minted locally for a record the remote system has
/// not acknowledged yet; a confirmed identity is the one the remote assigned.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "token", rename_all = "snake_case")]
pub enum Identity {
    Temporary(String),
    Confirmed(String),
}

impl Identity {
    pub const TEMPORARY_KIND: &'static str = "temporary";
    pub const CONFIRMED_KIND: &'static str = "confirmed";

    /// Mint a fresh temporary identity.
    pub fn new_temporary() -> Self {
        Self::Temporary(Uuid::now_v7().to_string())
    }

    pub fn confirmed(token: impl Into<String>) -> Self {
        Self::Confirmed(token.into())
    }

    pub fn token(&self) -> &str {
        match self {
            Self::Temporary(token) | Self::Confirmed(token) => token,
        }
    }

    pub fn is_temporary(&self) -> bool {
        matches!(self, Self::Temporary(_))
    }

    /// Discriminant as persisted in storage columns.
    pub fn kind_str(&self) -> &'static str {
        match self {
            Self::Temporary(_) => Self::TEMPORARY_KIND,
            Self::Confirmed(_) => Self::CONFIRMED_KIND,
        }
    }

    /// Rebuild an identity from its persisted (kind, token) pair.
    pub fn from_parts(kind: &str, token: impl Into<String>) -> Result<Self> {
        match kind {
            Self::TEMPORARY_KIND => Ok(Self::Temporary(token.into())),
            Self::CONFIRMED_KIND => Ok(Self::Confirmed(token.into())),
            other => Err(Error::validation(format!(
                "Unknown identity kind '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind_str(), self.token())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Income,
    Expense,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Income => "income",
            Self::Expense => "expense",
        }
    }

    /// Human label used when synthesizing descriptions.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Income => "Income",
            Self::Expense => "Expense",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "income" => Ok(Self::Income),
            "expense" => Ok(Self::Expense),
            other => Err(Error::validation(format!(
                "Unknown transaction kind '{}'",
                other
            ))),
        }
    }
}

/// Lifecycle flags of a cached record.
///
/// At most one of `pending_add` / `pending_update` is set. `is_temporary`
/// records were created with `pending_add`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordFlags {
    pub pending_add: bool,
    pub pending_update: bool,
    pub is_temporary: bool,
    /// Token of the temporary record this confirmed record superseded.
    pub replaced_temp_id: Option<String>,
}

impl RecordFlags {
    pub fn temporary() -> Self {
        Self {
            pending_add: true,
            pending_update: false,
            is_temporary: true,
            replaced_temp_id: None,
        }
    }

    pub fn confirmed() -> Self {
        Self::default()
    }

    /// Flag a local edit. Temporary records stay `pending_add`: the queued
    /// create has not been acknowledged, so the edit rides along with it.
    pub fn mark_edited(&mut self) {
        if self.is_temporary {
            self.pending_add = true;
            self.pending_update = false;
        } else {
            self.pending_add = false;
            self.pending_update = true;
        }
    }
}

/// Business fields of a transaction, used as façade input and as the queued
/// operation payload sent to the remote API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionFields {
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    pub amount: Decimal,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub description: String,
}

impl TransactionFields {
    pub fn new(kind: TransactionKind, amount: Decimal, category: impl Into<String>) -> Self {
        Self {
            kind,
            amount,
            category: category.into(),
            date: None,
            description: String::new(),
        }
    }

    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.amount.is_sign_negative() {
            return Err(Error::validation("Transaction amount must not be negative"));
        }
        if self.category.trim().is_empty() {
            return Err(Error::validation("Transaction category is required"));
        }
        Ok(())
    }

    /// Fill the blank description with the deterministic default.
    pub fn normalized(mut self) -> Self {
        if self.description.trim().is_empty() {
            self.description = super::default_description(self.kind, &self.category);
        }
        self
    }
}

/// A transaction as held in the local entity cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainRecord {
    pub identity: Identity,
    pub kind: TransactionKind,
    pub amount: Decimal,
    pub category: String,
    pub date: NaiveDate,
    pub description: String,
    pub owner_id: String,
    pub flags: RecordFlags,
    pub updated_at: DateTime<Utc>,
}

impl DomainRecord {
    /// Build a temporary, pending record for an offline create.
    pub fn new_temporary(fields: TransactionFields, owner_id: &str, today: NaiveDate) -> Self {
        let fields = fields.normalized();
        Self {
            identity: Identity::new_temporary(),
            kind: fields.kind,
            amount: fields.amount,
            category: fields.category,
            date: fields.date.unwrap_or(today),
            description: fields.description,
            owner_id: owner_id.to_string(),
            flags: RecordFlags::temporary(),
            updated_at: Utc::now(),
        }
    }

    /// Build a confirmed record from fields acknowledged by the remote.
    pub fn confirmed(
        id: impl Into<String>,
        fields: TransactionFields,
        owner_id: &str,
        today: NaiveDate,
    ) -> Self {
        Self {
            identity: Identity::confirmed(id),
            kind: fields.kind,
            amount: fields.amount,
            category: fields.category,
            date: fields.date.unwrap_or(today),
            description: fields.description,
            owner_id: owner_id.to_string(),
            flags: RecordFlags::confirmed(),
            updated_at: Utc::now(),
        }
    }

    /// Overwrite business fields with a local edit and flag the record pending.
    pub fn apply_edit(&mut self, fields: TransactionFields) {
        let fields = fields.normalized();
        self.kind = fields.kind;
        self.amount = fields.amount;
        self.category = fields.category;
        if let Some(date) = fields.date {
            self.date = date;
        }
        self.description = fields.description;
        self.flags.mark_edited();
        self.updated_at = Utc::now();
    }

    /// Shows the "will sync" indicator.
    pub fn is_pending(&self) -> bool {
        self.flags.pending_add || self.flags.pending_update
    }

    pub fn fields(&self) -> TransactionFields {
        TransactionFields {
            kind: self.kind,
            amount: self.amount,
            category: self.category.clone(),
            date: Some(self.date),
            description: self.description.clone(),
        }
    }

    pub fn signature(&self) -> super::RecordSignature {
        super::RecordSignature::new(self.kind, self.amount, &self.category, self.date)
    }

    /// Keyed views this record is listed under.
    pub fn view_keys(&self) -> Vec<ViewKey> {
        vec![ViewKey::All, ViewKey::for_date(self.date)]
    }
}

/// A keyed view of the cache (e.g. the list shown for one month).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "view", rename_all = "snake_case")]
pub enum ViewKey {
    All,
    Month { year: i32, month: u32 },
}

impl ViewKey {
    pub fn for_date(date: NaiveDate) -> Self {
        Self::Month {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn as_key(&self) -> String {
        match self {
            Self::All => "all".to_string(),
            Self::Month { year, month } => format!("month:{:04}-{:02}", year, month),
        }
    }

    pub fn parse(key: &str) -> Result<Self> {
        if key == "all" {
            return Ok(Self::All);
        }
        let invalid = || Error::validation(format!("Invalid view key '{}'", key));
        let rest = key.strip_prefix("month:").ok_or_else(invalid)?;
        let (year, month) = rest.split_once('-').ok_or_else(invalid)?;
        let year = year.parse::<i32>().map_err(|_| invalid())?;
        let month = month.parse::<u32>().map_err(|_| invalid())?;
        if !(1..=12).contains(&month) {
            return Err(invalid());
        }
        Ok(Self::Month { year, month })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: String,
    pub name: String,
    #[serde(default, rename = "type")]
    pub kind: Option<TransactionKind>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 16).unwrap()
    }

    #[test]
    fn identity_serializes_as_tagged_union() {
        let json = serde_json::to_value(Identity::confirmed("tx-9")).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "confirmed", "token": "tx-9"}));
        let back: Identity = serde_json::from_value(json).unwrap();
        assert_eq!(back, Identity::confirmed("tx-9"));
    }

    #[test]
    fn identity_rejects_unknown_kind() {
        assert!(Identity::from_parts("temp", "x").is_err());
        assert!(Identity::from_parts("temporary", "x").unwrap().is_temporary());
    }

    #[test]
    fn offline_create_synthesizes_description() {
        let fields = TransactionFields::new(TransactionKind::Expense, dec!(42.50), "Food");
        let record = DomainRecord::new_temporary(fields, "user-1", today());

        assert!(record.identity.is_temporary());
        assert_eq!(record.description, "Expense - Food");
        assert_eq!(record.date, today());
        assert!(record.flags.pending_add && record.flags.is_temporary);
        assert!(!record.flags.pending_update);
    }

    #[test]
    fn editing_a_temporary_record_keeps_it_pending_add() {
        let fields = TransactionFields::new(TransactionKind::Expense, dec!(10), "Food");
        let mut record = DomainRecord::new_temporary(fields.clone(), "user-1", today());
        record.apply_edit(fields.with_description("Lunch"));
        assert!(record.flags.pending_add);
        assert!(!record.flags.pending_update);

        let mut confirmed = DomainRecord::confirmed(
            "srv-1",
            TransactionFields::new(TransactionKind::Income, dec!(5), "Salary"),
            "user-1",
            today(),
        );
        confirmed.apply_edit(TransactionFields::new(TransactionKind::Income, dec!(6), "Salary"));
        assert!(confirmed.flags.pending_update);
        assert!(!confirmed.flags.pending_add);
        assert!(confirmed.is_pending());
    }

    #[test]
    fn payload_uses_type_field_for_kind() {
        let fields = TransactionFields::new(TransactionKind::Income, dec!(1200), "Salary")
            .with_date(today());
        let json = serde_json::to_value(&fields).unwrap();
        assert_eq!(json["type"], "income");
        assert_eq!(json["date"], "2026-10-16");
    }

    #[test]
    fn view_keys_parse_back() {
        let key = ViewKey::for_date(today());
        assert_eq!(key.as_key(), "month:2026-10");
        assert_eq!(ViewKey::parse(&key.as_key()).unwrap(), key);
        assert_eq!(ViewKey::parse("all").unwrap(), ViewKey::All);
        assert!(ViewKey::parse("month:2026-13").is_err());
    }

    #[test]
    fn validation_rejects_blank_category() {
        let fields = TransactionFields::new(TransactionKind::Expense, dec!(3), "  ");
        assert!(fields.validate().is_err());
    }
}
