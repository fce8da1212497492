//! Message-cost gate: one debit per forwarded message.

use std::sync::Arc;

use crate::{
    ledger::{DebitOutcome, LedgerStore},
    messaging::types::UserMessage,
    ports::Downstream,
    Result,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GateDecision {
    /// Coin debited and the message handed downstream.
    Forwarded { balance: u64 },
    /// Not enough coins; nothing was forwarded.
    Blocked { balance: u64 },
}

#[derive(Clone)]
pub struct MessageGate {
    ledger: Arc<dyn LedgerStore>,
    cost: u64,
}

impl MessageGate {
    pub fn new(ledger: Arc<dyn LedgerStore>, cost: u64) -> Self {
        Self { ledger, cost }
    }

    pub fn cost(&self) -> u64 {
        self.cost
    }

    /// Debit first, forward second: a message only reaches `downstream` after
    /// its coin is gone, and a blocked message never does. A failed forward
    /// releases the coin before the error is returned.
    pub async fn pass(
        &self,
        msg: &UserMessage,
        downstream: &dyn Downstream,
    ) -> Result<GateDecision> {
        match self.ledger.debit(msg.user_id, self.cost).await? {
            DebitOutcome::Debited { balance } => {
                if let Err(e) = downstream.forward(msg).await {
                    // The message never went out, so its coin goes back.
                    if let Err(release_err) = self.ledger.release(msg.user_id, self.cost).await {
                        tracing::error!(
                            user_id = %msg.user_id,
                            error = %release_err,
                            "failed to release coin after forward failure"
                        );
                    }
                    return Err(e);
                }
                tracing::info!(user_id = %msg.user_id, balance, "message forwarded");
                Ok(GateDecision::Forwarded { balance })
            }
            DebitOutcome::InsufficientBalance { balance } => {
                tracing::info!(
                    user_id = %msg.user_id,
                    balance,
                    "message blocked: insufficient coins"
                );
                Ok(GateDecision::Blocked { balance })
            }
        }
    }
}
