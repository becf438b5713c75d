use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A team's account state. Balance is signed cents; the credit limit is how
/// far below zero the balance may go before new reservations are rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamBalance {
    pub team_id: String,
    pub balance_cents: i64,
    /// Non-negative. A limit of 0 means the balance may not go below zero.
    pub credit_limit_cents: i64,
}

impl TeamBalance {
    pub fn new(team_id: impl Into<String>, balance_cents: i64, credit_limit_cents: i64) -> Self {
        Self {
            team_id: team_id.into(),
            balance_cents,
            credit_limit_cents: credit_limit_cents.max(0),
        }
    }

    /// Whether a reservation of `amount_cents` would stay within the limit.
    pub fn can_reserve(&self, amount_cents: i64) -> bool {
        self.balance_cents - amount_cents >= -self.credit_limit_cents
    }
}

/// What a balance transaction records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    /// Upfront deduction at job creation
    Reservation,
    /// Reversal of a reservation after job failure
    Refund,
    /// Manual balance change (funding, correction)
    Adjustment,
}

/// Append-only audit record. Every mutation of a TeamBalance is paired with
/// exactly one of these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceTransaction {
    pub team_id: String,
    /// Signed: negative for reservations, positive for refunds and credits.
    pub amount_cents: i64,
    pub balance_before_cents: i64,
    pub balance_after_cents: i64,
    pub note: String,
    pub actor_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    pub kind: TransactionKind,
    pub created_at: DateTime<Utc>,
}

impl BalanceTransaction {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        team_id: impl Into<String>,
        amount_cents: i64,
        balance_before_cents: i64,
        balance_after_cents: i64,
        note: impl Into<String>,
        actor_id: impl Into<String>,
        job_id: Option<String>,
        kind: TransactionKind,
    ) -> Self {
        Self {
            team_id: team_id.into(),
            amount_cents,
            balance_before_cents,
            balance_after_cents,
            note: note.into(),
            actor_id: actor_id.into(),
            job_id,
            kind,
            created_at: Utc::now(),
        }
    }
}
