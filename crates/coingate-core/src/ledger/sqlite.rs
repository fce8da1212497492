//! SQLite-backed ledger and purchase-state storage.
//!
//! One long-lived connection behind a mutex; every call runs on tokio's
//! blocking pool so slow disk I/O never stalls the async workers. The mutex
//! also serializes all balance updates, and debits are additionally guarded by
//! a conditional `UPDATE`.

use std::{
    path::Path,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::{
    domain::UserId,
    errors::Error,
    ledger::{checked_amount, DebitOutcome, LedgerStore, PaymentRecord},
    purchase::{PurchaseState, PurchaseStore},
    Result,
};

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS user_coins (
    user_id INTEGER PRIMARY KEY,
    coins   INTEGER NOT NULL DEFAULT 0 CHECK (coins >= 0)
);

CREATE TABLE IF NOT EXISTS payment_history (
    id        INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id   INTEGER NOT NULL,
    amount    INTEGER NOT NULL,
    timestamp TEXT    NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE INDEX IF NOT EXISTS payment_history_user ON payment_history (user_id, id);

CREATE TABLE IF NOT EXISTS purchase_state (
    user_id    INTEGER PRIMARY KEY,
    package    TEXT NOT NULL,
    method     TEXT,
    updated_at TEXT NOT NULL
);
"#;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the database file and make sure the schema exists.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        tracing::debug!(path = %path.display(), journal_mode = %mode, "ledger opened");
        conn.execute_batch(SCHEMA_SQL)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Private in-memory database, used by tests.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA_SQL)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` with exclusive access to the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| Error::External("ledger connection lock poisoned".to_string()))?;
            f(&mut *guard)
        })
        .await?
    }
}

fn balance_of(conn: &Connection, user_id: UserId) -> Result<u64> {
    let coins: Option<i64> = conn
        .query_row(
            "SELECT coins FROM user_coins WHERE user_id = ?1",
            params![user_id.0],
            |row| row.get(0),
        )
        .optional()?;
    to_balance(coins.unwrap_or(0))
}

fn to_balance(coins: i64) -> Result<u64> {
    u64::try_from(coins)
        .map_err(|_| Error::Storage(rusqlite::Error::IntegralValueOutOfRange(0, coins)))
}

fn read_purchase(conn: &Connection, user_id: UserId) -> Result<PurchaseState> {
    let row: Option<(String, Option<String>)> = conn
        .query_row(
            "SELECT package, method FROM purchase_state WHERE user_id = ?1",
            params![user_id.0],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    Ok(match row {
        None => PurchaseState::Idle,
        Some((package, None)) => PurchaseState::PackageChosen { package },
        Some((package, Some(method))) => PurchaseState::MethodChosen { package, method },
    })
}

#[async_trait]
impl LedgerStore for SqliteStore {
    async fn get_balance(&self, user_id: UserId) -> Result<u64> {
        self.with_conn(move |conn| balance_of(conn, user_id)).await
    }

    async fn credit(&self, user_id: UserId, amount: u64) -> Result<u64> {
        let coins = checked_amount(amount)?;
        let balance = self
            .with_conn(move |conn| {
                let tx = conn.transaction()?;
                tx.execute(
                    "INSERT INTO user_coins (user_id, coins) VALUES (?1, ?2)
                     ON CONFLICT(user_id) DO UPDATE SET coins = coins + excluded.coins",
                    params![user_id.0, coins],
                )?;
                tx.execute(
                    "INSERT INTO payment_history (user_id, amount, timestamp) VALUES (?1, ?2, ?3)",
                    params![user_id.0, coins, Utc::now()],
                )?;
                let balance = balance_of(&tx, user_id)?;
                tx.commit()?;
                Ok(balance)
            })
            .await?;

        tracing::info!(%user_id, amount, balance, "coins credited");
        Ok(balance)
    }

    async fn debit(&self, user_id: UserId, amount: u64) -> Result<DebitOutcome> {
        let coins = checked_amount(amount)?;
        let outcome = self
            .with_conn(move |conn| {
                let changed = conn.execute(
                    "UPDATE user_coins SET coins = coins - ?1 WHERE user_id = ?2 AND coins >= ?1",
                    params![coins, user_id.0],
                )?;
                let balance = balance_of(conn, user_id)?;
                Ok(if changed == 1 {
                    DebitOutcome::Debited { balance }
                } else {
                    DebitOutcome::InsufficientBalance { balance }
                })
            })
            .await?;

        tracing::debug!(%user_id, amount, ?outcome, "debit");
        Ok(outcome)
    }

    async fn release(&self, user_id: UserId, amount: u64) -> Result<u64> {
        let coins = checked_amount(amount)?;
        let balance = self
            .with_conn(move |conn| {
                conn.execute(
                    "INSERT INTO user_coins (user_id, coins) VALUES (?1, ?2)
                     ON CONFLICT(user_id) DO UPDATE SET coins = coins + excluded.coins",
                    params![user_id.0, coins],
                )?;
                balance_of(conn, user_id)
            })
            .await?;

        tracing::info!(%user_id, amount, balance, "debit released");
        Ok(balance)
    }

    async fn payment_history(
        &self,
        user_id: UserId,
        limit: usize,
    ) -> Result<Vec<PaymentRecord>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, amount, timestamp FROM payment_history
                 WHERE user_id = ?1 ORDER BY id DESC LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![user_id.0, limit], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, DateTime<Utc>>(3)?,
                ))
            })?;

            let mut out = Vec::new();
            for row in rows {
                let (id, user_id, amount, timestamp) = row?;
                out.push(PaymentRecord {
                    id,
                    user_id,
                    amount: to_balance(amount)?,
                    timestamp,
                });
            }
            Ok(out)
        })
        .await
    }
}

#[async_trait]
impl PurchaseStore for SqliteStore {
    async fn load_purchase(&self, user_id: UserId) -> Result<PurchaseState> {
        self.with_conn(move |conn| read_purchase(conn, user_id)).await
    }

    async fn swap_purchase(
        &self,
        user_id: UserId,
        expected: &PurchaseState,
        next: &PurchaseState,
    ) -> Result<bool> {
        let expected = expected.clone();
        let next = next.clone();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            if read_purchase(&tx, user_id)? != expected {
                return Ok(false);
            }

            match &next {
                PurchaseState::Idle => {
                    tx.execute(
                        "DELETE FROM purchase_state WHERE user_id = ?1",
                        params![user_id.0],
                    )?;
                }
                other => {
                    tx.execute(
                        "INSERT INTO purchase_state (user_id, package, method, updated_at)
                         VALUES (?1, ?2, ?3, ?4)
                         ON CONFLICT(user_id) DO UPDATE SET
                           package = excluded.package,
                           method = excluded.method,
                           updated_at = excluded.updated_at",
                        params![user_id.0, other.package(), other.method(), Utc::now()],
                    )?;
                }
            }
            tx.commit()?;
            Ok(true)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SqliteStore {
        SqliteStore::in_memory().unwrap()
    }

    #[tokio::test]
    async fn unknown_user_has_zero_balance() {
        let s = store();
        assert_eq!(s.get_balance(UserId(42)).await.unwrap(), 0);
        assert!(s.payment_history(UserId(42), 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn credit_creates_account_and_records_payment() {
        let s = store();
        assert_eq!(s.credit(UserId(42), 5).await.unwrap(), 5);
        assert_eq!(s.get_balance(UserId(42)).await.unwrap(), 5);

        let history = s.payment_history(UserId(42), 10).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].user_id, 42);
        assert_eq!(history[0].amount, 5);
    }

    #[tokio::test]
    async fn credits_sum_regardless_of_order() {
        let s = Arc::new(store());
        let amounts = [3u64, 1, 25, 50, 5, 8];

        let mut tasks = Vec::new();
        for amount in amounts {
            let s = s.clone();
            tasks.push(tokio::spawn(
                async move { s.credit(UserId(7), amount).await },
            ));
        }
        for t in tasks {
            t.await.unwrap().unwrap();
        }

        assert_eq!(
            s.get_balance(UserId(7)).await.unwrap(),
            amounts.iter().sum::<u64>()
        );
        let history = s.payment_history(UserId(7), 100).await.unwrap();
        assert_eq!(history.len(), amounts.len());
        // Newest first.
        assert!(history.windows(2).all(|w| w[0].id > w[1].id));
    }

    #[tokio::test]
    async fn debit_never_goes_negative() {
        let s = store();
        let user = UserId(1);

        assert_eq!(
            s.debit(user, 1).await.unwrap(),
            DebitOutcome::InsufficientBalance { balance: 0 }
        );

        s.credit(user, 2).await.unwrap();
        assert_eq!(
            s.debit(user, 3).await.unwrap(),
            DebitOutcome::InsufficientBalance { balance: 2 }
        );
        assert_eq!(
            s.debit(user, 2).await.unwrap(),
            DebitOutcome::Debited { balance: 0 }
        );
        assert_eq!(
            s.debit(user, 1).await.unwrap(),
            DebitOutcome::InsufficientBalance { balance: 0 }
        );
        assert_eq!(s.get_balance(user).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn credit_then_debit_round_trips() {
        let s = store();
        let user = UserId(5);
        s.credit(user, 4).await.unwrap();
        let before = s.get_balance(user).await.unwrap();

        s.credit(user, 10).await.unwrap();
        assert!(s.debit(user, 10).await.unwrap().is_debited());
        assert_eq!(s.get_balance(user).await.unwrap(), before);
    }

    #[tokio::test]
    async fn concurrent_debits_on_last_coin_succeed_once() {
        let s = Arc::new(store());
        let user = UserId(99);
        s.credit(user, 1).await.unwrap();

        let a = {
            let s = s.clone();
            tokio::spawn(async move { s.debit(user, 1).await })
        };
        let b = {
            let s = s.clone();
            tokio::spawn(async move { s.debit(user, 1).await })
        };
        let outcomes = [a.await.unwrap().unwrap(), b.await.unwrap().unwrap()];

        assert_eq!(outcomes.iter().filter(|o| o.is_debited()).count(), 1);
        assert!(outcomes
            .iter()
            .any(|o| matches!(o, DebitOutcome::InsufficientBalance { balance: 0 })));
        assert_eq!(s.get_balance(user).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn release_restores_debit_without_payment_record() {
        let s = store();
        let user = UserId(11);
        s.credit(user, 1).await.unwrap();
        assert!(s.debit(user, 1).await.unwrap().is_debited());

        assert_eq!(s.release(user, 1).await.unwrap(), 1);
        assert_eq!(s.get_balance(user).await.unwrap(), 1);
        assert_eq!(s.payment_history(user, 10).await.unwrap().len(), 1);
        assert!(matches!(s.release(user, 0).await, Err(Error::InvalidAmount(0))));
    }

    #[tokio::test]
    async fn rejects_non_positive_amounts() {
        let s = store();
        assert!(matches!(
            s.credit(UserId(1), 0).await,
            Err(Error::InvalidAmount(0))
        ));
        assert!(matches!(
            s.debit(UserId(1), 0).await,
            Err(Error::InvalidAmount(0))
        ));
        assert!(s.payment_history(UserId(1), 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn swap_purchase_only_replaces_expected_state() {
        let s = store();
        let user = UserId(3);
        let chosen = PurchaseState::PackageChosen {
            package: "basic".to_string(),
        };
        let paid = PurchaseState::MethodChosen {
            package: "basic".to_string(),
            method: "dana".to_string(),
        };

        assert!(s
            .swap_purchase(user, &PurchaseState::Idle, &chosen)
            .await
            .unwrap());
        assert!(!s
            .swap_purchase(user, &PurchaseState::Idle, &paid)
            .await
            .unwrap());
        assert!(s.swap_purchase(user, &chosen, &paid).await.unwrap());
        assert_eq!(s.load_purchase(user).await.unwrap(), paid);

        assert!(s
            .swap_purchase(user, &paid, &PurchaseState::Idle)
            .await
            .unwrap());
        assert_eq!(s.load_purchase(user).await.unwrap(), PurchaseState::Idle);
    }

    #[tokio::test]
    async fn state_survives_reopen() {
        let dir = std::env::temp_dir().join(format!("coingate-ledger-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("coins.db");

        {
            let s = SqliteStore::open(&path).unwrap();
            s.credit(UserId(42), 5).await.unwrap();
            s.swap_purchase(
                UserId(42),
                &PurchaseState::Idle,
                &PurchaseState::PackageChosen {
                    package: "medium".to_string(),
                },
            )
            .await
            .unwrap();
        }

        let s = SqliteStore::open(&path).unwrap();
        assert_eq!(s.get_balance(UserId(42)).await.unwrap(), 5);
        assert_eq!(
            s.load_purchase(UserId(42)).await.unwrap(),
            PurchaseState::PackageChosen {
                package: "medium".to_string()
            }
        );

        drop(s);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
