//! Ports for the collaborators the coin logic does not own.

use async_trait::async_trait;

use crate::{messaging::types::UserMessage, Result};

/// Where a paid-for message goes once its coin has been debited.
#[async_trait]
pub trait Downstream: Send + Sync {
    async fn forward(&self, msg: &UserMessage) -> Result<()>;
}

/// Renders a short payment summary as a scannable image.
pub trait PaymentCodeEncoder: Send + Sync {
    /// PNG bytes encoding `text`.
    fn encode_payment_code(&self, text: &str) -> Result<Vec<u8>>;
}
