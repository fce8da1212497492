//! Coin ledger: per-user balances plus an append-only payment history.
//!
//! Balances never go negative. `debit` is a single conditional update, so two
//! concurrent debits against the last coin cannot both succeed.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{domain::UserId, errors::Error, Result};

pub mod sqlite;

pub use sqlite::SqliteStore;

/// Immutable payment log entry, written as a side effect of every credit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PaymentRecord {
    pub id: i64,
    pub user_id: i64,
    pub amount: u64,
    pub timestamp: DateTime<Utc>,
}

/// Result of a debit attempt. Running out of coins is an expected outcome,
/// not an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DebitOutcome {
    Debited { balance: u64 },
    InsufficientBalance { balance: u64 },
}

impl DebitOutcome {
    pub fn is_debited(&self) -> bool {
        matches!(self, Self::Debited { .. })
    }

    /// Balance after the attempt (unchanged when insufficient).
    pub fn balance(&self) -> u64 {
        match self {
            Self::Debited { balance } | Self::InsufficientBalance { balance } => *balance,
        }
    }
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Current balance; 0 for users that were never credited.
    async fn get_balance(&self, user_id: UserId) -> Result<u64>;

    /// Add coins (creating the account if needed) and append a payment
    /// record. Returns the new balance.
    async fn credit(&self, user_id: UserId, amount: u64) -> Result<u64>;

    /// Subtract coins only if the balance covers `amount`.
    async fn debit(&self, user_id: UserId, amount: u64) -> Result<DebitOutcome>;

    /// Give back coins taken by a `debit` whose message was never delivered.
    /// Unlike `credit`, no payment record is written. Returns the new balance.
    async fn release(&self, user_id: UserId, amount: u64) -> Result<u64>;

    /// Most recent payment records first.
    async fn payment_history(&self, user_id: UserId, limit: usize)
        -> Result<Vec<PaymentRecord>>;
}

/// Amounts must be positive and fit SQLite's signed 64-bit integers.
pub(crate) fn checked_amount(amount: u64) -> Result<i64> {
    match i64::try_from(amount) {
        Ok(v) if v > 0 => Ok(v),
        _ => Err(Error::InvalidAmount(amount)),
    }
}
