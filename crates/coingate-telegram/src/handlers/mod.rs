//! Telegram update handlers.
//!
//! Each handler converts a teloxide update into the cross-messenger model and
//! hands it to the core `CoinBot`. Failures never escape to the dispatcher.

use std::sync::Arc;

use teloxide::{
    prelude::*,
    types::{CallbackQuery, Message},
};

use coingate_core::messaging::types::IncomingUpdate;

use crate::router::AppState;

mod callback;
mod message;

pub async fn handle_callback(q: CallbackQuery, state: Arc<AppState>) -> ResponseResult<()> {
    let update = callback::to_incoming(&q);
    state.bot.handle(IncomingUpdate::Callback(update)).await;
    Ok(())
}

pub async fn handle_message(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(update) = message::to_incoming(&msg) else {
        return Ok(());
    };
    state.bot.handle(IncomingUpdate::Message(update)).await;
    Ok(())
}
