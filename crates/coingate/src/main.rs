use std::sync::Arc;

use coingate_core::{config::Config, ledger::SqliteStore};
use coingate_qr::QrEncoder;

#[tokio::main]
async fn main() -> Result<(), coingate_core::Error> {
    coingate_core::logging::init("coingate")?;

    let cfg = Arc::new(Config::load()?);
    let store = Arc::new(SqliteStore::open(&cfg.database_file)?);

    coingate_telegram::router::run_polling(cfg, store, Arc::new(QrEncoder::new()))
        .await
        .map_err(|e| coingate_core::Error::External(format!("telegram bot failed: {e}")))?;

    Ok(())
}
