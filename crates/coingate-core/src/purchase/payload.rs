//! Callback payloads for the purchase buttons.
//!
//! Every payload carries the full purchase context so a button pressed after a
//! restart can still be checked against the stored state.

/// Telegram rejects callback data longer than this many bytes.
pub const MAX_CALLBACK_DATA_LEN: usize = 64;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CallbackAction {
    /// `buy:<package>`
    Buy { package: String },
    /// `pay:<package>:<method>`
    Pay { package: String, method: String },
    /// `confirm:<package>:<method>`
    Confirm { package: String, method: String },
    /// `cancel`
    Cancel,
}

impl CallbackAction {
    pub fn encode(&self) -> String {
        match self {
            Self::Buy { package } => format!("buy:{package}"),
            Self::Pay { package, method } => format!("pay:{package}:{method}"),
            Self::Confirm { package, method } => format!("confirm:{package}:{method}"),
            Self::Cancel => "cancel".to_string(),
        }
    }

    pub fn parse(data: &str) -> Option<Self> {
        if data.len() > MAX_CALLBACK_DATA_LEN {
            return None;
        }

        let parts: Vec<&str> = data.split(':').collect();
        if parts.iter().skip(1).any(|p| p.is_empty()) {
            return None;
        }

        match parts.as_slice() {
            ["buy", package] => Some(Self::Buy {
                package: package.to_string(),
            }),
            ["pay", package, method] => Some(Self::Pay {
                package: package.to_string(),
                method: method.to_string(),
            }),
            ["confirm", package, method] => Some(Self::Confirm {
                package: package.to_string(),
                method: method.to_string(),
            }),
            ["cancel"] => Some(Self::Cancel),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_each_prefix() {
        assert_eq!(
            CallbackAction::parse("buy:basic"),
            Some(CallbackAction::Buy {
                package: "basic".to_string()
            })
        );
        assert_eq!(
            CallbackAction::parse("pay:medium:gopay"),
            Some(CallbackAction::Pay {
                package: "medium".to_string(),
                method: "gopay".to_string()
            })
        );
        assert_eq!(
            CallbackAction::parse("confirm:premium:ovo"),
            Some(CallbackAction::Confirm {
                package: "premium".to_string(),
                method: "ovo".to_string()
            })
        );
        assert_eq!(CallbackAction::parse("cancel"), Some(CallbackAction::Cancel));
    }

    #[test]
    fn encode_matches_parse() {
        let action = CallbackAction::Confirm {
            package: "basic".to_string(),
            method: "dana".to_string(),
        };
        assert_eq!(action.encode(), "confirm:basic:dana");
        assert_eq!(CallbackAction::parse(&action.encode()), Some(action));
    }

    #[test]
    fn rejects_malformed_payloads() {
        for data in [
            "",
            "buy",
            "buy:",
            "buy:a:b",
            "pay:basic",
            "confirm::dana",
            "askuser:1:2",
            "cancel:now",
        ] {
            assert_eq!(CallbackAction::parse(data), None, "{data}");
        }
        let long = format!("buy:{}", "x".repeat(MAX_CALLBACK_DATA_LEN));
        assert_eq!(CallbackAction::parse(&long), None);
    }
}
