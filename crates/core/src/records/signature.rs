//! Record signatures used to recognize logically identical transactions.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::TransactionKind;

/// Default description when the user left it blank: `"Expense - Food"`.
///
/// The remote API rejects empty descriptions, so both the mutation façade and
/// the reconciler repair them with this value.
pub fn default_description(kind: TransactionKind, category: &str) -> String {
    let category = category.trim();
    if category.is_empty() {
        kind.label().to_string()
    } else {
        format!("{} - {}", kind.label(), category)
    }
}

/// (kind, amount, category, date) of a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordSignature {
    pub kind: TransactionKind,
    /// Normalized decimal string, so `42.50` and `42.5` compare equal.
    pub amount: String,
    pub category: String,
    pub date: NaiveDate,
}

impl RecordSignature {
    pub fn new(kind: TransactionKind, amount: Decimal, category: &str, date: NaiveDate) -> Self {
        Self {
            kind,
            amount: amount.normalize().to_string(),
            category: category.trim().to_lowercase(),
            date,
        }
    }

    /// Same kind, amount and category with dates at most `tolerance_days` apart.
    pub fn matches_approximately(&self, other: &RecordSignature, tolerance_days: i64) -> bool {
        self.kind == other.kind
            && self.amount == other.amount
            && self.category == other.category
            && (self.date - other.date).num_days().abs() <= tolerance_days
    }
}
