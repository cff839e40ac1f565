//! Wire types of the remote ledger API.

use chrono::{DateTime, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};

use ledgerline_core::records::{Category, DomainRecord, TransactionFields, TransactionKind};

use crate::error::{Result, SyncError};

/// Error body returned by the API on non-2xx responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(alias = "error")]
    pub message: String,
}

/// A transaction as returned by the remote ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteTransaction {
    #[serde(alias = "_id", deserialize_with = "deserialize_id")]
    pub id: String,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    pub amount: Decimal,
    pub category: String,
    #[serde(default, deserialize_with = "deserialize_date")]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub description: String,
}

impl RemoteTransaction {
    /// Parse a create/update response body.
    pub fn from_body(body: Option<serde_json::Value>) -> Result<Self> {
        let body = body.ok_or_else(|| SyncError::invalid_request("Empty response body"))?;
        Ok(serde_json::from_value(body)?)
    }

    pub fn fields(&self) -> TransactionFields {
        TransactionFields {
            kind: self.kind,
            amount: self.amount,
            category: self.category.clone(),
            date: self.date,
            description: self.description.clone(),
        }
    }

    pub fn into_record(self, owner_id: &str, today: NaiveDate) -> DomainRecord {
        let fields = self.fields().normalized();
        DomainRecord::confirmed(self.id, fields, owner_id, today)
    }
}

/// A category as returned by the remote ledger.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteCategory {
    #[serde(alias = "_id", deserialize_with = "deserialize_id")]
    pub id: String,
    pub name: String,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

impl From<RemoteCategory> for Category {
    fn from(remote: RemoteCategory) -> Self {
        Category {
            id: remote.id,
            name: remote.name,
            kind: remote
                .kind
                .as_deref()
                .and_then(|kind| TransactionKind::parse(kind).ok()),
        }
    }
}

/// Record ids arrive as strings or numbers depending on the backend.
fn deserialize_id<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(id) if !id.is_empty() => Ok(id),
        serde_json::Value::Number(id) => Ok(id.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected a string or numeric id, got {}",
            other
        ))),
    }
}

/// Accepts `YYYY-MM-DD` or a full RFC 3339 timestamp.
fn deserialize_date<'de, D>(deserializer: D) -> std::result::Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(raw) = Option::<String>::deserialize(deserializer)? else {
        return Ok(None);
    };
    if let Ok(date) = NaiveDate::parse_from_str(&raw, "%Y-%m-%d") {
        return Ok(Some(date));
    }
    DateTime::parse_from_rfc3339(&raw)
        .map(|timestamp| Some(timestamp.date_naive()))
        .map_err(|e| serde::de::Error::custom(format!("invalid date '{}': {}", raw, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn remote_transaction_accepts_numeric_mongo_style_id() {
        let tx: RemoteTransaction = serde_json::from_value(json!({
            "_id": 981,
            "type": "expense",
            "amount": 42.5,
            "category": "Food",
            "date": "2026-10-16T09:30:00.000Z",
            "description": "Expense - Food"
        }))
        .unwrap();

        assert_eq!(tx.id, "981");
        assert_eq!(tx.amount, dec!(42.5));
        assert_eq!(tx.date, NaiveDate::from_ymd_opt(2026, 10, 16));
    }

    #[test]
    fn blank_remote_description_is_normalized_on_import() {
        let tx: RemoteTransaction = serde_json::from_value(json!({
            "id": "a1",
            "type": "income",
            "amount": 1200,
            "category": "Salary"
        }))
        .unwrap();
        let today = NaiveDate::from_ymd_opt(2026, 10, 1).unwrap();
        let record = tx.into_record("user-1", today);

        assert_eq!(record.description, "Income - Salary");
        assert_eq!(record.date, today);
        assert!(!record.identity.is_temporary());
    }

    #[test]
    fn unknown_category_type_is_dropped() {
        let category: Category = serde_json::from_value::<RemoteCategory>(json!({
            "id": 7,
            "name": "Gifts",
            "type": "both"
        }))
        .unwrap()
        .into();
        assert_eq!(category.id, "7");
        assert_eq!(category.kind, None);
    }

    #[test]
    fn error_body_accepts_error_field() {
        let body: ApiErrorResponse =
            serde_json::from_value(json!({"error": "Transaction not found"})).unwrap();
        assert_eq!(body.message, "Transaction not found");
        assert!(body.code.is_none());
    }
}
