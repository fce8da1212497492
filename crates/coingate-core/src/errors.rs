/// Core error type.
///
/// Only infrastructure failures live here. Business outcomes such as an unknown
/// package or an insufficient balance are ordinary return values
/// (`InvalidSelection`, `DebitOutcome`).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("storage task failed: {0}")]
    StorageTask(#[from] tokio::task::JoinError),

    #[error("invalid coin amount: {0}")]
    InvalidAmount(u64),

    #[error("payment code error: {0}")]
    PaymentCode(String),

    #[error("external error: {0}")]
    External(String),
}

pub type Result<T> = std::result::Result<T, Error>;
