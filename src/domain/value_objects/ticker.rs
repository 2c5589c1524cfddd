use crate::domain::errors::ValidationError;
use serde::{Deserialize, Serialize};

const MAX_TICKER_LEN: usize = 10;

/// Upper-cased equity symbol, e.g. `AAPL`, `BRK.B`, `^GSPC`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Ticker(String);

impl Ticker {
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let symbol = raw.trim().to_uppercase();

        if symbol.is_empty() {
            return Err(ValidationError::InvalidTicker(
                "ticker must not be empty".to_string(),
            ));
        }
        if symbol.len() > MAX_TICKER_LEN {
            return Err(ValidationError::InvalidTicker(format!(
                "{} exceeds {} characters",
                symbol, MAX_TICKER_LEN
            )));
        }
        if !symbol
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '^' | '='))
        {
            return Err(ValidationError::InvalidTicker(format!(
                "{} contains unsupported characters",
                symbol
            )));
        }

        Ok(Ticker(symbol))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Ticker {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Ticker::parse(&value)
    }
}

impl From<Ticker> for String {
    fn from(t: Ticker) -> Self {
        t.0
    }
}

impl std::fmt::Display for Ticker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
