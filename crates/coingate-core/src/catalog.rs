//! Static purchase catalog: coin packages and payment methods.
//!
//! Built once at startup (see `Config::load`) and shared read-only by `Arc`.

use std::{collections::HashSet, fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::{errors::Error, Result};

const MAX_NAME_LEN: usize = 24;

/// A purchasable bundle of coins at a fixed price.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    pub name: String,
    pub coin_count: u64,
    pub price: u64,
}

/// A named external payment channel with an associated account number.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentMethod {
    pub name: String,
    pub account_number: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    packages: Vec<Package>,
    methods: Vec<PaymentMethod>,
}

impl Catalog {
    /// Build a catalog, rejecting tables the purchase flow could not use.
    ///
    /// Names end up inside callback payloads, so they must be non-empty and may
    /// not contain the `:` separator.
    pub fn new(packages: Vec<Package>, methods: Vec<PaymentMethod>) -> Result<Self> {
        if packages.is_empty() {
            return Err(Error::Config("catalog has no coin packages".to_string()));
        }
        if methods.is_empty() {
            return Err(Error::Config("catalog has no payment methods".to_string()));
        }

        let mut seen = HashSet::new();
        for p in &packages {
            validate_name("package", &p.name)?;
            if p.coin_count == 0 {
                return Err(Error::Config(format!(
                    "package '{}' must grant at least one coin",
                    p.name
                )));
            }
            if !seen.insert(p.name.as_str()) {
                return Err(Error::Config(format!("duplicate package '{}'", p.name)));
            }
        }

        let mut seen = HashSet::new();
        for m in &methods {
            validate_name("payment method", &m.name)?;
            if m.account_number.trim().is_empty() {
                return Err(Error::Config(format!(
                    "payment method '{}' has no account number",
                    m.name
                )));
            }
            if !seen.insert(m.name.as_str()) {
                return Err(Error::Config(format!(
                    "duplicate payment method '{}'",
                    m.name
                )));
            }
        }

        Ok(Self { packages, methods })
    }

    /// The stock packages (basic / medium / premium) with the given methods.
    pub fn with_default_packages(methods: Vec<PaymentMethod>) -> Result<Self> {
        let packages = vec![
            Package {
                name: "basic".to_string(),
                coin_count: 5,
                price: 5_000,
            },
            Package {
                name: "medium".to_string(),
                coin_count: 25,
                price: 20_000,
            },
            Package {
                name: "premium".to_string(),
                coin_count: 50,
                price: 35_000,
            },
        ];
        Self::new(packages, methods)
    }

    /// Load a catalog from a JSON file of the form
    /// `{"packages": [{"name", "coin_count", "price"}], "methods": [{"name", "account_number"}]}`.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let txt = fs::read_to_string(path)?;
        Self::from_json_str(&txt)
    }

    pub fn from_json_str(txt: &str) -> Result<Self> {
        let raw: Catalog = serde_json::from_str(txt)?;
        Self::new(raw.packages, raw.methods)
    }

    /// Packages in menu order.
    pub fn packages(&self) -> &[Package] {
        &self.packages
    }

    /// Payment methods in menu order.
    pub fn methods(&self) -> &[PaymentMethod] {
        &self.methods
    }

    pub fn package(&self, name: &str) -> Option<&Package> {
        self.packages.iter().find(|p| p.name == name)
    }

    pub fn method(&self, name: &str) -> Option<&PaymentMethod> {
        self.methods.iter().find(|m| m.name == name)
    }
}

fn validate_name(kind: &str, name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::Config(format!("{kind} name must not be empty")));
    }
    if name.contains(':') || name.chars().any(char::is_whitespace) {
        return Err(Error::Config(format!(
            "{kind} name '{name}' must not contain ':' or whitespace"
        )));
    }
    // `confirm:<package>:<method>` must fit Telegram's callback data limit.
    if name.len() > MAX_NAME_LEN {
        return Err(Error::Config(format!(
            "{kind} name '{name}' is longer than {MAX_NAME_LEN} bytes"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dana() -> PaymentMethod {
        PaymentMethod {
            name: "dana".to_string(),
            account_number: "081234567890".to_string(),
        }
    }

    #[test]
    fn default_packages_are_looked_up_by_name() {
        let catalog = Catalog::with_default_packages(vec![dana()]).unwrap();
        let basic = catalog.package("basic").unwrap();
        assert_eq!(basic.coin_count, 5);
        assert_eq!(basic.price, 5_000);
        assert_eq!(catalog.package("premium").unwrap().coin_count, 50);
        assert!(catalog.package("gold").is_none());
        assert_eq!(catalog.method("dana").unwrap().account_number, "081234567890");
        assert!(catalog.method("paypal").is_none());
    }

    #[test]
    fn keeps_menu_order() {
        let catalog = Catalog::with_default_packages(vec![dana()]).unwrap();
        let names: Vec<&str> = catalog.packages().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["basic", "medium", "premium"]);
    }

    #[test]
    fn loads_json_catalog() {
        let txt = r#"{
            "packages": [{"name": "mini", "coin_count": 2, "price": 1500}],
            "methods": [{"name": "ovo", "account_number": "0899"}]
        }"#;
        let catalog = Catalog::from_json_str(txt).unwrap();
        assert_eq!(catalog.package("mini").unwrap().price, 1_500);
        assert_eq!(catalog.methods().len(), 1);
    }

    #[test]
    fn rejects_unusable_tables() {
        assert!(Catalog::with_default_packages(vec![]).is_err());

        let bad_name = PaymentMethod {
            name: "bank:bca".to_string(),
            account_number: "1".to_string(),
        };
        assert!(Catalog::with_default_packages(vec![bad_name]).is_err());

        let dup = Catalog::new(
            vec![
                Package {
                    name: "a".to_string(),
                    coin_count: 1,
                    price: 1,
                },
                Package {
                    name: "a".to_string(),
                    coin_count: 2,
                    price: 2,
                },
            ],
            vec![dana()],
        );
        assert!(dup.is_err());

        let empty_coins = Catalog::new(
            vec![Package {
                name: "free".to_string(),
                coin_count: 0,
                price: 0,
            }],
            vec![dana()],
        );
        assert!(empty_coins.is_err());
    }
}
