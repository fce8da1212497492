use std::{
    env, fs,
    path::{Path, PathBuf},
};

use crate::{
    catalog::{Catalog, PaymentMethod},
    errors::Error,
    Result,
};

const DEFAULT_ACCOUNT_NUMBER: &str = "081234567890";

/// Typed configuration, loaded once at startup.
#[derive(Clone, Debug)]
pub struct Config {
    // Core
    pub telegram_bot_token: String,
    pub database_file: PathBuf,

    // Coins
    pub cost_per_message: u64,
    pub catalog: Catalog,

    // Downstream: where paid messages are delivered (None = acknowledge in chat).
    pub forward_chat_id: Option<i64>,

    // Audit
    pub audit_log_path: PathBuf,
    pub audit_log_json: bool,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        let telegram_bot_token = env_str("BOT_TOKEN")
            .and_then(non_empty)
            .or_else(|| env_str("TELEGRAM_BOT_TOKEN").and_then(non_empty))
            .ok_or_else(|| {
                Error::Config("BOT_TOKEN environment variable is required".to_string())
            })?;

        let database_file =
            PathBuf::from(env_str("DATABASE_FILE").unwrap_or("menfess.db".to_string()));

        let cost_per_message = env_u64("COST_PER_MESSAGE").unwrap_or(1);
        if cost_per_message == 0 {
            return Err(Error::Config(
                "COST_PER_MESSAGE must be at least 1".to_string(),
            ));
        }

        let catalog = match env_path("COIN_CATALOG_FILE") {
            Some(path) => Catalog::from_json_file(&path).map_err(|e| {
                Error::Config(format!("failed to load {}: {e}", path.display()))
            })?,
            None => Catalog::with_default_packages(default_methods())?,
        };

        let forward_chat_id = match env_str("FORWARD_CHAT_ID").and_then(non_empty) {
            Some(raw) => Some(raw.trim().parse::<i64>().map_err(|_| {
                Error::Config(format!("FORWARD_CHAT_ID is not a chat id: {raw}"))
            })?),
            None => None,
        };

        let audit_log_path = PathBuf::from(
            env_str("AUDIT_LOG_PATH").unwrap_or("/tmp/coingate-audit.log".to_string()),
        );
        let audit_log_json = env_bool("AUDIT_LOG_JSON").unwrap_or(false);

        Ok(Self {
            telegram_bot_token,
            database_file,
            cost_per_message,
            catalog,
            forward_chat_id,
            audit_log_path,
            audit_log_json,
        })
    }
}

/// E-wallet methods, account numbers overridable per method.
fn default_methods() -> Vec<PaymentMethod> {
    [
        ("dana", "DANA_NUMBER"),
        ("gopay", "GOPAY_NUMBER"),
        ("ovo", "OVO_NUMBER"),
    ]
    .into_iter()
    .map(|(name, key)| PaymentMethod {
        name: name.to_string(),
        account_number: env_str(key)
            .and_then(non_empty)
            .unwrap_or_else(|| DEFAULT_ACCOUNT_NUMBER.to_string()),
    })
    .collect()
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for (key, val) in parse_dotenv(&contents) {
        if env::var_os(&key).is_some() {
            continue; // do not override existing env
        }
        env::set_var(key, val);
    }
}

fn parse_dotenv(contents: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        out.push((key.to_string(), val));
    }
    out
}

fn env_bool(key: &str) -> Option<bool> {
    env_str(key).map(|s| {
        matches!(
            s.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn env_path(key: &str) -> Option<PathBuf> {
    env::var_os(key)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
