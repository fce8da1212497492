//! Pure purchase state machine.
//!
//! `transition` never touches storage; `PurchaseWorkflow` persists the next
//! state and runs the returned effect.

use crate::catalog::{Catalog, Package, PaymentMethod};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum PurchaseState {
    #[default]
    Idle,
    PackageChosen {
        package: String,
    },
    MethodChosen {
        package: String,
        method: String,
    },
}

impl PurchaseState {
    pub fn package(&self) -> Option<&str> {
        match self {
            Self::Idle => None,
            Self::PackageChosen { package } | Self::MethodChosen { package, .. } => {
                Some(package)
            }
        }
    }

    pub fn method(&self) -> Option<&str> {
        match self {
            Self::MethodChosen { method, .. } => Some(method),
            _ => None,
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PurchaseEvent {
    SelectPackage(String),
    SelectMethod(String),
    Confirm,
    Cancel,
}

/// A selection the user is not allowed to make right now.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum InvalidSelection {
    #[error("Unknown package: {0}")]
    UnknownPackage(String),

    #[error("Unknown payment method: {0}")]
    UnknownMethod(String),

    #[error("No purchase in progress. Use /buy to start one.")]
    NoActivePurchase,

    #[error("This purchase is no longer active. Use /buy to start again.")]
    Stale,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Effect {
    PresentMethods {
        package: Package,
    },
    PresentInstructions {
        package: Package,
        method: PaymentMethod,
    },
    Credit {
        package: Package,
        method: PaymentMethod,
    },
    Cancelled,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transition {
    pub next: PurchaseState,
    pub effect: Effect,
}

pub fn transition(
    state: &PurchaseState,
    event: &PurchaseEvent,
    catalog: &Catalog,
) -> Result<Transition, InvalidSelection> {
    match event {
        // Choosing a package (re)starts the purchase from any state.
        PurchaseEvent::SelectPackage(name) => {
            let package = lookup_package(catalog, name)?;
            Ok(Transition {
                next: PurchaseState::PackageChosen {
                    package: package.name.clone(),
                },
                effect: Effect::PresentMethods { package },
            })
        }

        PurchaseEvent::SelectMethod(name) => {
            let Some(current) = state.package() else {
                return Err(InvalidSelection::NoActivePurchase);
            };
            let package = lookup_package(catalog, current)?;
            let method = catalog
                .method(name)
                .cloned()
                .ok_or_else(|| InvalidSelection::UnknownMethod(name.clone()))?;
            Ok(Transition {
                next: PurchaseState::MethodChosen {
                    package: package.name.clone(),
                    method: method.name.clone(),
                },
                effect: Effect::PresentInstructions { package, method },
            })
        }

        PurchaseEvent::Confirm => {
            let PurchaseState::MethodChosen { package, method } = state else {
                return Err(InvalidSelection::NoActivePurchase);
            };
            let package = lookup_package(catalog, package)?;
            let method = catalog
                .method(method)
                .cloned()
                .ok_or_else(|| InvalidSelection::UnknownMethod(method.clone()))?;
            Ok(Transition {
                next: PurchaseState::Idle,
                effect: Effect::Credit { package, method },
            })
        }

        PurchaseEvent::Cancel => {
            if state.is_idle() {
                return Err(InvalidSelection::NoActivePurchase);
            }
            Ok(Transition {
                next: PurchaseState::Idle,
                effect: Effect::Cancelled,
            })
        }
    }
}

fn lookup_package(catalog: &Catalog, name: &str) -> Result<Package, InvalidSelection> {
    catalog
        .package(name)
        .cloned()
        .ok_or_else(|| InvalidSelection::UnknownPackage(name.to_string()))
}
