//! Coin purchase workflow: package → payment method → instructions → confirm.
//!
//! Confirmation is taken on trust; nothing here verifies that the payment
//! actually arrived.

use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    catalog::{Catalog, Package, PaymentMethod},
    domain::UserId,
    formatting::format_price,
    ledger::LedgerStore,
    Result,
};

pub mod payload;
pub mod state;

pub use payload::CallbackAction;
pub use state::{transition, Effect, InvalidSelection, PurchaseEvent, PurchaseState};

/// Durable per-user purchase state, so a restart between steps keeps the
/// purchase context.
#[async_trait]
pub trait PurchaseStore: Send + Sync {
    async fn load_purchase(&self, user_id: UserId) -> Result<PurchaseState>;

    /// Replace the stored state only if it still equals `expected`.
    ///
    /// Returns `false` when another event changed the state first.
    async fn swap_purchase(
        &self,
        user_id: UserId,
        expected: &PurchaseState,
        next: &PurchaseState,
    ) -> Result<bool>;
}

/// What the user must pay, and the text encoded into the scannable code.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PaymentInstructions {
    pub method: String,
    pub account_number: String,
    pub price: u64,
}

impl PaymentInstructions {
    pub fn new(package: &Package, method: &PaymentMethod) -> Self {
        Self {
            method: method.name.clone(),
            account_number: method.account_number.clone(),
            price: package.price,
        }
    }

    /// Payload for the scannable payment code (method + account + amount).
    pub fn code_payload(&self) -> String {
        format!(
            "{}: {}\nAmount: {}",
            self.method.to_uppercase(),
            self.account_number,
            format_price(self.price)
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PurchaseOutcome {
    PackageChosen {
        package: Package,
    },
    MethodChosen {
        package: Package,
        method: PaymentMethod,
        instructions: PaymentInstructions,
    },
    Confirmed {
        package: Package,
        method: PaymentMethod,
        balance: u64,
    },
    Cancelled,
}

/// Infrastructure failures are the outer `Err`; a rejected selection is the
/// inner one.
pub type Step = std::result::Result<PurchaseOutcome, InvalidSelection>;

#[derive(Clone)]
pub struct PurchaseWorkflow {
    catalog: Arc<Catalog>,
    ledger: Arc<dyn LedgerStore>,
    states: Arc<dyn PurchaseStore>,
}

impl PurchaseWorkflow {
    pub fn new(
        catalog: Arc<Catalog>,
        ledger: Arc<dyn LedgerStore>,
        states: Arc<dyn PurchaseStore>,
    ) -> Self {
        Self {
            catalog,
            ledger,
            states,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub async fn state(&self, user_id: UserId) -> Result<PurchaseState> {
        self.states.load_purchase(user_id).await
    }

    pub async fn select_package(&self, user_id: UserId, name: &str) -> Result<Step> {
        let current = self.states.load_purchase(user_id).await?;
        self.run(user_id, current, PurchaseEvent::SelectPackage(name.to_string()))
            .await
    }

    pub async fn select_method(&self, user_id: UserId, name: &str) -> Result<Step> {
        let current = self.states.load_purchase(user_id).await?;
        self.run(user_id, current, PurchaseEvent::SelectMethod(name.to_string()))
            .await
    }

    pub async fn confirm(&self, user_id: UserId) -> Result<Step> {
        let current = self.states.load_purchase(user_id).await?;
        self.run(user_id, current, PurchaseEvent::Confirm).await
    }

    pub async fn cancel(&self, user_id: UserId) -> Result<Step> {
        let current = self.states.load_purchase(user_id).await?;
        self.run(user_id, current, PurchaseEvent::Cancel).await
    }

    /// Apply a button press. The context carried by the payload must match the
    /// stored state, so buttons from an abandoned or finished purchase are
    /// rejected instead of crediting twice.
    pub async fn handle_action(&self, user_id: UserId, action: &CallbackAction) -> Result<Step> {
        let current = self.states.load_purchase(user_id).await?;

        let event = match action {
            CallbackAction::Buy { package } => PurchaseEvent::SelectPackage(package.clone()),
            CallbackAction::Pay { package, method } => {
                match current.package() {
                    None => return Ok(Err(InvalidSelection::NoActivePurchase)),
                    Some(p) if p != package.as_str() => return Ok(Err(InvalidSelection::Stale)),
                    Some(_) => {}
                }
                PurchaseEvent::SelectMethod(method.clone())
            }
            CallbackAction::Confirm { package, method } => {
                match (&current, current.package(), current.method()) {
                    (PurchaseState::Idle, _, _) => {
                        return Ok(Err(InvalidSelection::NoActivePurchase))
                    }
                    (_, Some(p), Some(m)) if p == package.as_str() && m == method.as_str() => {}
                    _ => return Ok(Err(InvalidSelection::Stale)),
                }
                PurchaseEvent::Confirm
            }
            CallbackAction::Cancel => PurchaseEvent::Cancel,
        };

        self.run(user_id, current, event).await
    }

    async fn run(
        &self,
        user_id: UserId,
        current: PurchaseState,
        event: PurchaseEvent,
    ) -> Result<Step> {
        let t = match transition(&current, &event, &self.catalog) {
            Ok(t) => t,
            Err(rejected) => {
                tracing::debug!(%user_id, ?event, %rejected, "purchase selection rejected");
                return Ok(Err(rejected));
            }
        };

        if !self
            .states
            .swap_purchase(user_id, &current, &t.next)
            .await?
        {
            return Ok(Err(InvalidSelection::Stale));
        }

        let outcome = match t.effect {
            Effect::PresentMethods { package } => {
                tracing::info!(%user_id, package = %package.name, "package selected");
                PurchaseOutcome::PackageChosen { package }
            }
            Effect::PresentInstructions { package, method } => {
                tracing::info!(
                    %user_id,
                    package = %package.name,
                    method = %method.name,
                    "payment method selected"
                );
                let instructions = PaymentInstructions::new(&package, &method);
                PurchaseOutcome::MethodChosen {
                    package,
                    method,
                    instructions,
                }
            }
            Effect::Credit { package, method } => {
                let balance = match self.ledger.credit(user_id, package.coin_count).await {
                    Ok(balance) => balance,
                    Err(e) => {
                        // Put the purchase back so "I have paid" can be pressed again.
                        if let Err(restore) =
                            self.states.swap_purchase(user_id, &t.next, &current).await
                        {
                            tracing::error!(%user_id, error = %restore, "failed to restore purchase state");
                        }
                        return Err(e);
                    }
                };
                tracing::info!(
                    %user_id,
                    package = %package.name,
                    method = %method.name,
                    coins = package.coin_count,
                    balance,
                    "purchase confirmed"
                );
                PurchaseOutcome::Confirmed {
                    package,
                    method,
                    balance,
                }
            }
            Effect::Cancelled => {
                tracing::info!(%user_id, "purchase cancelled");
                PurchaseOutcome::Cancelled
            }
        };

        Ok(Ok(outcome))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::Error;
    use crate::ledger::{DebitOutcome, PaymentRecord, SqliteStore};

    fn workflow() -> (PurchaseWorkflow, Arc<SqliteStore>) {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let catalog = Catalog::with_default_packages(vec![
            PaymentMethod {
                name: "dana".to_string(),
                account_number: "081234567890".to_string(),
            },
            PaymentMethod {
                name: "gopay".to_string(),
                account_number: "085555".to_string(),
            },
        ])
        .unwrap();
        let wf = PurchaseWorkflow::new(Arc::new(catalog), store.clone(), store.clone());
        (wf, store)
    }

    #[tokio::test]
    async fn basic_dana_confirm_credits_five_coins() {
        let (wf, store) = workflow();
        let user = UserId(42);

        let step = wf.select_package(user, "basic").await.unwrap().unwrap();
        assert!(matches!(step, PurchaseOutcome::PackageChosen { ref package } if package.name == "basic"));

        let step = wf.select_method(user, "dana").await.unwrap().unwrap();
        match step {
            PurchaseOutcome::MethodChosen { instructions, .. } => {
                assert_eq!(instructions.account_number, "081234567890");
                assert_eq!(instructions.price, 5_000);
                assert_eq!(
                    instructions.code_payload(),
                    "DANA: 081234567890\nAmount: Rp 5,000"
                );
            }
            other => panic!("unexpected outcome: {other:?}"),
        }

        let step = wf.confirm(user).await.unwrap().unwrap();
        assert!(matches!(step, PurchaseOutcome::Confirmed { balance: 5, .. }));
        assert_eq!(store.get_balance(user).await.unwrap(), 5);
        assert!(wf.state(user).await.unwrap().is_idle());
    }

    /// Ledger whose `credit` always fails; everything else hits the store.
    struct CreditDown(Arc<SqliteStore>);

    #[async_trait]
    impl LedgerStore for CreditDown {
        async fn get_balance(&self, user_id: UserId) -> Result<u64> {
            self.0.get_balance(user_id).await
        }
        async fn credit(&self, _user_id: UserId, _amount: u64) -> Result<u64> {
            Err(Error::Storage(rusqlite::Error::InvalidQuery))
        }
        async fn debit(&self, user_id: UserId, amount: u64) -> Result<DebitOutcome> {
            self.0.debit(user_id, amount).await
        }
        async fn release(&self, user_id: UserId, amount: u64) -> Result<u64> {
            self.0.release(user_id, amount).await
        }
        async fn payment_history(
            &self,
            user_id: UserId,
            limit: usize,
        ) -> Result<Vec<PaymentRecord>> {
            self.0.payment_history(user_id, limit).await
        }
    }

    #[tokio::test]
    async fn failed_credit_puts_the_purchase_back() {
        let (healthy, store) = workflow();
        let wf = PurchaseWorkflow::new(
            Arc::new(healthy.catalog().clone()),
            Arc::new(CreditDown(store.clone())),
            store.clone(),
        );
        let user = UserId(42);

        wf.select_package(user, "basic").await.unwrap().unwrap();
        wf.select_method(user, "dana").await.unwrap().unwrap();

        assert!(matches!(wf.confirm(user).await, Err(Error::Storage(_))));
        assert_eq!(
            wf.state(user).await.unwrap(),
            PurchaseState::MethodChosen {
                package: "basic".to_string(),
                method: "dana".to_string(),
            }
        );
        assert_eq!(store.get_balance(user).await.unwrap(), 0);

        // With the ledger back, the same purchase can be confirmed.
        let step = healthy.confirm(user).await.unwrap().unwrap();
        assert!(matches!(step, PurchaseOutcome::Confirmed { balance: 5, .. }));
    }

    #[tokio::test]
    async fn unknown_package_leaves_state_untouched() {
        let (wf, _) = workflow();
        let user = UserId(7);

        let step = wf.select_package(user, "gold").await.unwrap();
        assert_eq!(step, Err(InvalidSelection::UnknownPackage("gold".to_string())));
        assert!(wf.state(user).await.unwrap().is_idle());
    }

    #[tokio::test]
    async fn confirm_button_pressed_twice_credits_once() {
        let (wf, store) = workflow();
        let user = UserId(42);
        let confirm = CallbackAction::Confirm {
            package: "medium".to_string(),
            method: "gopay".to_string(),
        };

        wf.handle_action(
            user,
            &CallbackAction::Buy {
                package: "medium".to_string(),
            },
        )
        .await
        .unwrap()
        .unwrap();
        wf.handle_action(
            user,
            &CallbackAction::Pay {
                package: "medium".to_string(),
                method: "gopay".to_string(),
            },
        )
        .await
        .unwrap()
        .unwrap();

        let first = wf.handle_action(user, &confirm).await.unwrap();
        assert!(matches!(first, Ok(PurchaseOutcome::Confirmed { balance: 25, .. })));

        let second = wf.handle_action(user, &confirm).await.unwrap();
        assert_eq!(second, Err(InvalidSelection::NoActivePurchase));
        assert_eq!(store.get_balance(user).await.unwrap(), 25);
        assert_eq!(store.payment_history(user, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn buttons_from_an_abandoned_purchase_are_stale() {
        let (wf, store) = workflow();
        let user = UserId(9);

        wf.select_package(user, "basic").await.unwrap().unwrap();
        wf.select_method(user, "dana").await.unwrap().unwrap();
        // User reopens /buy and picks another package.
        wf.select_package(user, "premium").await.unwrap().unwrap();

        let old_pay = CallbackAction::Pay {
            package: "basic".to_string(),
            method: "gopay".to_string(),
        };
        assert_eq!(
            wf.handle_action(user, &old_pay).await.unwrap(),
            Err(InvalidSelection::Stale)
        );

        let old_confirm = CallbackAction::Confirm {
            package: "basic".to_string(),
            method: "dana".to_string(),
        };
        assert_eq!(
            wf.handle_action(user, &old_confirm).await.unwrap(),
            Err(InvalidSelection::Stale)
        );
        assert_eq!(store.get_balance(user).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn concurrent_confirms_credit_once() {
        let (wf, store) = workflow();
        let user = UserId(11);
        wf.select_package(user, "basic").await.unwrap().unwrap();
        wf.select_method(user, "dana").await.unwrap().unwrap();

        let (a, b) = tokio::join!(wf.confirm(user), wf.confirm(user));
        let confirmed = [a.unwrap(), b.unwrap()]
            .into_iter()
            .filter(|s| s.is_ok())
            .count();
        assert_eq!(confirmed, 1);
        assert_eq!(store.get_balance(user).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn cancel_clears_the_purchase() {
        let (wf, _) = workflow();
        let user = UserId(3);

        assert_eq!(
            wf.cancel(user).await.unwrap(),
            Err(InvalidSelection::NoActivePurchase)
        );
        wf.select_package(user, "basic").await.unwrap().unwrap();
        assert_eq!(wf.cancel(user).await.unwrap(), Ok(PurchaseOutcome::Cancelled));
        assert_eq!(
            wf.confirm(user).await.unwrap(),
            Err(InvalidSelection::NoActivePurchase)
        );
    }

    #[tokio::test]
    async fn users_do_not_share_purchase_state() {
        let (wf, store) = workflow();
        wf.select_package(UserId(1), "basic").await.unwrap().unwrap();
        wf.select_method(UserId(1), "dana").await.unwrap().unwrap();

        assert_eq!(
            wf.confirm(UserId(2)).await.unwrap(),
            Err(InvalidSelection::NoActivePurchase)
        );
        wf.confirm(UserId(1)).await.unwrap().unwrap();
        assert_eq!(store.get_balance(UserId(1)).await.unwrap(), 5);
        assert_eq!(store.get_balance(UserId(2)).await.unwrap(), 0);
    }
}
