use teloxide::types::CallbackQuery as TgCallbackQuery;

use coingate_core::{
    domain::{ChatId, UserId},
    messaging::types::CallbackQuery,
};

pub(super) fn to_incoming(q: &TgCallbackQuery) -> CallbackQuery {
    let user_id = q.from.id.0 as i64;
    // Inline-mode buttons carry no message; reply in the private chat instead.
    let chat_id = q.message.as_ref().map(|m| m.chat.id.0).unwrap_or(user_id);

    CallbackQuery {
        chat_id: ChatId(chat_id),
        user_id: UserId(user_id),
        username: q.from.username.clone(),
        callback_id: q.id.clone(),
        data: q.data.clone().unwrap_or_default(),
    }
}
