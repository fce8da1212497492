use async_trait::async_trait;

use teloxide::prelude::*;

use coingate_core::{
    domain::ChatId, messaging::port::MessagingPort, messaging::types::UserMessage,
    ports::Downstream, Result,
};

use crate::TelegramMessenger;

const DELIVERED_ACK: &str = "✅ Message sent.";

/// Delivers paid messages: copied into the forward channel when one is
/// configured, otherwise acknowledged back to the sender.
#[derive(Clone)]
pub struct TelegramDownstream {
    messenger: TelegramMessenger,
    forward_to: Option<ChatId>,
}

impl TelegramDownstream {
    pub fn new(messenger: TelegramMessenger, forward_to: Option<ChatId>) -> Self {
        Self {
            messenger,
            forward_to,
        }
    }
}

#[async_trait]
impl Downstream for TelegramDownstream {
    async fn forward(&self, msg: &UserMessage) -> Result<()> {
        let Some(target) = self.forward_to else {
            self.messenger.send_html(msg.chat_id, DELIVERED_ACK).await?;
            return Ok(());
        };

        let bot = self.messenger.bot();
        let copied = self
            .messenger
            .with_retry(|| {
                bot.copy_message(
                    TelegramMessenger::tg_chat(target),
                    TelegramMessenger::tg_chat(msg.chat_id),
                    TelegramMessenger::tg_msg_id(msg.message_id),
                )
            })
            .await?;

        tracing::info!(
            user_id = %msg.user_id,
            target = target.0,
            copied_id = copied.0,
            "message forwarded"
        );
        Ok(())
    }
}
