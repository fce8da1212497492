use teloxide::types::{Message, MessageKind};

use coingate_core::{
    domain::{ChatId, MessageId, UserId},
    messaging::types::UserMessage,
};

/// `None` for service messages, channel posts and other bots.
pub(super) fn to_incoming(msg: &Message) -> Option<UserMessage> {
    if !matches!(msg.kind, MessageKind::Common(_)) {
        return None;
    }
    let user = msg.from()?;
    if user.is_bot {
        return None;
    }

    Some(UserMessage {
        chat_id: ChatId(msg.chat.id.0),
        user_id: UserId(user.id.0 as i64),
        username: user.username.clone(),
        message_id: MessageId(msg.id.0),
        text: msg.text().or_else(|| msg.caption()).map(str::to_string),
        is_private: msg.chat.is_private(),
    })
}
