use std::sync::Arc;

use teloxide::{dispatching::Dispatcher, dptree, prelude::*, types::BotCommand};

use coingate_core::{
    bot::{CoinBot, CoinBotDeps},
    config::Config,
    domain::ChatId,
    ledger::SqliteStore,
    messaging::port::MessagingPort,
    ports::{Downstream, PaymentCodeEncoder},
    utils::AuditLogger,
};

use crate::handlers;
use crate::{TelegramDownstream, TelegramMessenger};

#[derive(Clone)]
pub struct AppState {
    pub bot: Arc<CoinBot>,
}

pub async fn run_polling(
    cfg: Arc<Config>,
    store: Arc<SqliteStore>,
    codes: Arc<dyn PaymentCodeEncoder>,
) -> anyhow::Result<()> {
    let bot = Bot::new(cfg.telegram_bot_token.clone());

    let bot_username = match bot.get_me().await {
        Ok(me) => {
            tracing::info!(username = %me.username(), "coingate started");
            me.user.username.clone()
        }
        Err(e) => {
            tracing::warn!(error = %e, "get_me failed");
            None
        }
    };
    tracing::info!(
        database = %cfg.database_file.display(),
        cost_per_message = cfg.cost_per_message,
        packages = cfg.catalog.packages().len(),
        forward_chat_id = ?cfg.forward_chat_id,
        "configuration loaded"
    );

    if let Err(e) = bot.set_my_commands(command_menu()).await {
        tracing::warn!(error = %e, "failed to register command menu");
    }

    let telegram = TelegramMessenger::new(bot.clone());
    let messenger: Arc<dyn MessagingPort> = Arc::new(telegram.clone());
    let downstream: Arc<dyn Downstream> = Arc::new(TelegramDownstream::new(
        telegram,
        cfg.forward_chat_id.map(ChatId),
    ));

    let mut coin_bot = CoinBot::new(CoinBotDeps {
        catalog: Arc::new(cfg.catalog.clone()),
        ledger: store.clone(),
        purchases: store,
        messenger,
        downstream,
        codes,
        cost_per_message: cfg.cost_per_message,
    })
    .with_audit(Arc::new(AuditLogger::new(
        cfg.audit_log_path.clone(),
        cfg.audit_log_json,
    )));
    if let Some(username) = bot_username {
        coin_bot = coin_bot.with_username(username);
    }

    let state = Arc::new(AppState {
        bot: Arc::new(coin_bot),
    });

    let handler = dptree::entry()
        .branch(Update::filter_callback_query().endpoint(handlers::handle_callback))
        .branch(Update::filter_message().endpoint(handlers::handle_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .build()
        .dispatch()
        .await;

    tracing::info!("dispatcher stopped");
    Ok(())
}

fn command_menu() -> Vec<BotCommand> {
    vec![
        BotCommand::new("coins", "Check your balance"),
        BotCommand::new("buy", "Buy a coin package"),
        BotCommand::new("history", "Show recent purchases"),
        BotCommand::new("cancel", "Cancel the purchase in progress"),
        BotCommand::new("help", "Show help"),
    ]
}
