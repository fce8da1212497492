use crate::{
    domain::{ChatId, MessageId, UserId},
    purchase::CallbackAction,
};

/// Cross-messenger incoming update model.
///
/// Telegram-specific fields stay in the Telegram adapter.
#[derive(Clone, Debug)]
pub enum IncomingUpdate {
    Message(UserMessage),
    Callback(CallbackQuery),
}

/// Any user-originated message (text, media, or a `/command`).
#[derive(Clone, Debug)]
pub struct UserMessage {
    pub chat_id: ChatId,
    pub user_id: UserId,
    pub username: Option<String>,
    pub message_id: MessageId,
    /// Text or media caption.
    pub text: Option<String>,
    pub is_private: bool,
}

/// Button press carrying an opaque payload.
#[derive(Clone, Debug)]
pub struct CallbackQuery {
    pub chat_id: ChatId,
    pub user_id: UserId,
    pub username: Option<String>,
    pub callback_id: String,
    pub data: String,
}

/// Workflow commands. Anything else starting with `/` is an ordinary message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BotCommand {
    Start,
    Help,
    Coins,
    Buy,
    History,
    Cancel,
}

impl BotCommand {
    /// Parse `/cmd`, `/cmd args` or `/cmd@botname`.
    ///
    /// A command addressed to another bot (`@name` not matching
    /// `bot_username`, case-insensitive) is not ours and yields `None`.
    pub fn parse(text: &str, bot_username: Option<&str>) -> Option<Self> {
        let (cmd, mention) = parse_command(text)?;
        if let (Some(mention), Some(me)) = (mention, bot_username) {
            if !mention.eq_ignore_ascii_case(me) {
                return None;
            }
        }
        match cmd.as_str() {
            "start" => Some(Self::Start),
            "help" => Some(Self::Help),
            "coins" => Some(Self::Coins),
            "buy" => Some(Self::Buy),
            "history" => Some(Self::History),
            "cancel" => Some(Self::Cancel),
            _ => None,
        }
    }
}

/// Split `/cmd@botname arg1 ...` into the lowercased command and the mention.
fn parse_command(text: &str) -> Option<(String, Option<&str>)> {
    let first = text.split_whitespace().next()?;
    let body = first.strip_prefix('/')?;

    let (cmd, mention) = match body.split_once('@') {
        Some((cmd, mention)) => (cmd, Some(mention)),
        None => (body, None),
    };
    Some((cmd.to_lowercase(), mention))
}

/// Inline keyboard, one button per row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InlineKeyboard {
    pub buttons: Vec<InlineButton>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InlineButton {
    pub label: String,
    pub callback_data: String,
}

impl InlineKeyboard {
    pub fn new(buttons: Vec<InlineButton>) -> Self {
        Self { buttons }
    }
}

impl InlineButton {
    pub fn action(label: impl Into<String>, action: &CallbackAction) -> Self {
        Self {
            label: label.into(),
            callback_data: action.encode(),
        }
    }
}
