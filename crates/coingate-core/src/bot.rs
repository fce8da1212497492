//! Update dispatcher: routes commands, purchase buttons and paid messages.
//!
//! `CoinBot::handle` is the error boundary. Infrastructure failures are logged
//! and turned into a generic notice for the affected user only.

use std::sync::Arc;

use crate::{
    catalog::{Catalog, Package},
    domain::{ChatId, UserId},
    formatting::{escape_html, format_price, title_case},
    gate::{GateDecision, MessageGate},
    ledger::LedgerStore,
    messaging::{
        port::MessagingPort,
        types::{BotCommand, CallbackQuery, IncomingUpdate, InlineButton, InlineKeyboard, UserMessage},
    },
    ports::{Downstream, PaymentCodeEncoder},
    purchase::{
        CallbackAction, PaymentInstructions, PurchaseOutcome, PurchaseStore, PurchaseWorkflow,
    },
    utils::{AuditEvent, AuditLogger},
    Result,
};

const HISTORY_LIMIT: usize = 10;
const GENERIC_FAILURE: &str = "⚠️ Something went wrong. Please try again later.";
const INVALID_CALLBACK: &str = "Invalid selection";

pub struct CoinBotDeps {
    pub catalog: Arc<Catalog>,
    pub ledger: Arc<dyn LedgerStore>,
    pub purchases: Arc<dyn PurchaseStore>,
    pub messenger: Arc<dyn MessagingPort>,
    pub downstream: Arc<dyn Downstream>,
    pub codes: Arc<dyn PaymentCodeEncoder>,
    pub cost_per_message: u64,
}

pub struct CoinBot {
    ledger: Arc<dyn LedgerStore>,
    workflow: PurchaseWorkflow,
    gate: MessageGate,
    messenger: Arc<dyn MessagingPort>,
    downstream: Arc<dyn Downstream>,
    codes: Arc<dyn PaymentCodeEncoder>,
    audit: Option<Arc<AuditLogger>>,
    bot_username: Option<String>,
}

impl CoinBot {
    pub fn new(deps: CoinBotDeps) -> Self {
        let workflow = PurchaseWorkflow::new(deps.catalog, deps.ledger.clone(), deps.purchases);
        let gate = MessageGate::new(deps.ledger.clone(), deps.cost_per_message);
        Self {
            ledger: deps.ledger,
            workflow,
            gate,
            messenger: deps.messenger,
            downstream: deps.downstream,
            codes: deps.codes,
            audit: None,
            bot_username: None,
        }
    }

    pub fn with_audit(mut self, audit: Arc<AuditLogger>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Our own `@username`, so `/cmd@otherbot` in groups is left alone.
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.bot_username = Some(username.into());
        self
    }

    pub async fn handle(&self, update: IncomingUpdate) {
        let (chat_id, user_id, username, context) = match &update {
            IncomingUpdate::Message(m) => (m.chat_id, m.user_id, m.username.clone(), "message"),
            IncomingUpdate::Callback(q) => (q.chat_id, q.user_id, q.username.clone(), "callback"),
        };

        let result = match &update {
            IncomingUpdate::Message(m) => self.handle_message(m).await,
            IncomingUpdate::Callback(q) => self.handle_callback(q).await,
        };

        if let Err(e) = result {
            tracing::error!(%user_id, error = %e, context, "failed to handle update");
            self.audit(AuditEvent::error(
                user_id.0,
                username.as_deref(),
                &e.to_string(),
                context,
            ))
            .await;
            if let Err(send_err) = self.messenger.send_html(chat_id, GENERIC_FAILURE).await {
                tracing::warn!(%user_id, error = %send_err, "failed to send failure notice");
            }
        }
    }

    async fn handle_message(&self, msg: &UserMessage) -> Result<()> {
        let command = msg
            .text
            .as_deref()
            .and_then(|t| BotCommand::parse(t, self.bot_username.as_deref()));
        if let Some(cmd) = command {
            return self.handle_command(msg, cmd).await;
        }

        // Only private conversations are paid for.
        if !msg.is_private {
            return Ok(());
        }

        match self.gate.pass(msg, self.downstream.as_ref()).await? {
            GateDecision::Forwarded { balance } => {
                self.audit(AuditEvent::message(
                    msg.user_id.0,
                    msg.username.as_deref(),
                    msg.text.as_deref(),
                    balance,
                ))
                .await;
            }
            GateDecision::Blocked { balance } => {
                self.audit(AuditEvent::blocked(
                    msg.user_id.0,
                    msg.username.as_deref(),
                    balance,
                ))
                .await;
                self.messenger
                    .send_html(msg.chat_id, &insufficient_notice(self.gate.cost()))
                    .await?;
            }
        }
        Ok(())
    }

    async fn handle_command(&self, msg: &UserMessage, cmd: BotCommand) -> Result<()> {
        let chat_id = msg.chat_id;
        match cmd {
            BotCommand::Start | BotCommand::Help => {
                self.messenger
                    .send_html(chat_id, &help_text(self.gate.cost()))
                    .await?;
            }

            BotCommand::Coins => {
                let balance = self.ledger.get_balance(msg.user_id).await?;
                self.messenger
                    .send_html(chat_id, &format!("💰 Your current balance: {balance} coins"))
                    .await?;
            }

            BotCommand::Buy => {
                let keyboard = package_menu(self.workflow.catalog());
                self.messenger
                    .send_inline_keyboard(chat_id, "🪙 Select a coin package to purchase:", keyboard)
                    .await?;
            }

            BotCommand::History => {
                let text = self.history_text(msg.user_id).await?;
                self.messenger.send_html(chat_id, &text).await?;
            }

            BotCommand::Cancel => match self.workflow.cancel(msg.user_id).await? {
                Ok(outcome) => self.present(chat_id, msg.user_id, None, outcome).await?,
                Err(rejected) => {
                    self.messenger
                        .send_html(chat_id, &escape_html(&rejected.to_string()))
                        .await?;
                }
            },
        }
        Ok(())
    }

    async fn handle_callback(&self, q: &CallbackQuery) -> Result<()> {
        let Some(action) = CallbackAction::parse(&q.data) else {
            self.answer(&q.callback_id, Some(INVALID_CALLBACK)).await;
            return Ok(());
        };

        let step = match self.workflow.handle_action(q.user_id, &action).await {
            Ok(step) => step,
            Err(e) => {
                self.answer(&q.callback_id, None).await;
                return Err(e);
            }
        };

        match step {
            Ok(outcome) => {
                self.answer(&q.callback_id, None).await;
                self.present(q.chat_id, q.user_id, q.username.as_deref(), outcome)
                    .await
            }
            Err(rejected) => {
                self.answer(&q.callback_id, Some(&rejected.to_string()))
                    .await;
                Ok(())
            }
        }
    }

    async fn present(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        username: Option<&str>,
        outcome: PurchaseOutcome,
    ) -> Result<()> {
        match outcome {
            PurchaseOutcome::PackageChosen { package } => {
                let text = format!(
                    "💳 Select payment method for {} coins ({}):",
                    package.coin_count,
                    format_price(package.price)
                );
                let keyboard = method_menu(self.workflow.catalog(), &package);
                self.messenger
                    .send_inline_keyboard(chat_id, &text, keyboard)
                    .await?;
            }

            PurchaseOutcome::MethodChosen {
                package,
                method,
                instructions,
            } => {
                let png = self
                    .codes
                    .encode_payment_code(&instructions.code_payload())?;
                let confirm = InlineKeyboard::new(vec![InlineButton::action(
                    "✅ I have paid",
                    &CallbackAction::Confirm {
                        package: package.name,
                        method: method.name,
                    },
                )]);
                self.messenger
                    .send_photo(chat_id, png, &instructions_caption(&instructions), Some(confirm))
                    .await?;
            }

            PurchaseOutcome::Confirmed {
                package,
                method,
                balance,
            } => {
                self.audit(AuditEvent::purchase(
                    user_id.0,
                    username,
                    &package.name,
                    &method.name,
                    package.coin_count,
                    balance,
                ))
                .await;
                let text = format!(
                    "✅ Payment confirmed!\nAdded {} coins to your balance.\nCurrent balance: {balance} coins",
                    package.coin_count
                );
                self.messenger.send_html(chat_id, &text).await?;
            }

            PurchaseOutcome::Cancelled => {
                self.messenger
                    .send_html(chat_id, "🛑 Purchase cancelled.")
                    .await?;
            }
        }
        Ok(())
    }

    async fn history_text(&self, user_id: UserId) -> Result<String> {
        let records = self.ledger.payment_history(user_id, HISTORY_LIMIT).await?;
        if records.is_empty() {
            return Ok("🧾 No purchases yet. Use /buy to get coins.".to_string());
        }

        let mut lines = vec!["🧾 <b>Recent purchases</b>".to_string()];
        for r in records {
            lines.push(format!(
                "• {}: +{} coins",
                r.timestamp.format("%Y-%m-%d %H:%M UTC"),
                r.amount
            ));
        }
        Ok(lines.join("\n"))
    }

    /// Callback answers are best-effort; a stale query must not abort the flow.
    async fn answer(&self, callback_id: &str, text: Option<&str>) {
        if let Err(e) = self.messenger.answer_callback_query(callback_id, text).await {
            tracing::warn!(error = %e, "failed to answer callback query");
        }
    }

    /// Best-effort audit append, run on the blocking pool.
    async fn audit(&self, event: AuditEvent) {
        let Some(audit) = self.audit.clone() else {
            return;
        };
        let written = tokio::task::spawn_blocking(move || {
            audit
                .write(event)
                .map_err(|e| (e, audit.path().display().to_string()))
        })
        .await;
        match written {
            Ok(Ok(())) => {}
            Ok(Err((e, path))) => {
                tracing::warn!(error = %e, %path, "failed to write audit event");
            }
            Err(e) => tracing::warn!(error = %e, "audit task failed"),
        }
    }
}

fn help_text(cost: u64) -> String {
    format!(
        "🪙 <b>Coin Bot</b>\n\n\
Every message you send costs {cost} coin(s).\n\n\
<b>📋 Commands:</b>\n\
/coins - Check your balance\n\
/buy - Buy a coin package\n\
/history - Show recent purchases\n\
/cancel - Cancel the purchase in progress\n\
/help - Show this help message"
    )
}

fn insufficient_notice(cost: u64) -> String {
    format!(
        "❌ Insufficient coins! You need {cost} coin(s) to send a message.\n\
Use /buy to purchase coins or /coins to check your balance."
    )
}

fn package_menu(catalog: &Catalog) -> InlineKeyboard {
    InlineKeyboard::new(
        catalog
            .packages()
            .iter()
            .map(|p| {
                InlineButton::action(
                    format!(
                        "{} - {} coins ({})",
                        title_case(&p.name),
                        p.coin_count,
                        format_price(p.price)
                    ),
                    &CallbackAction::Buy {
                        package: p.name.clone(),
                    },
                )
            })
            .collect(),
    )
}

fn method_menu(catalog: &Catalog, package: &Package) -> InlineKeyboard {
    let mut buttons: Vec<InlineButton> = catalog
        .methods()
        .iter()
        .map(|m| {
            InlineButton::action(
                m.name.to_uppercase(),
                &CallbackAction::Pay {
                    package: package.name.clone(),
                    method: m.name.clone(),
                },
            )
        })
        .collect();
    buttons.push(InlineButton::action("✖️ Cancel", &CallbackAction::Cancel));
    InlineKeyboard::new(buttons)
}

fn instructions_caption(i: &PaymentInstructions) -> String {
    format!(
        "📱 {} Payment Details:\n\
Number: <code>{}</code>\n\
Amount: {}\n\n\
Please send the exact amount and click 'I have paid' after payment.",
        escape_html(&i.method.to_uppercase()),
        escape_html(&i.account_number),
        format_price(i.price)
    )
}
