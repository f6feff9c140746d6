// harness/src/utils.rs

use crate::config::Config;
use crate::error::{HarnessError, Result};
use chrono::{DateTime, Utc};
use ethers::types::U256;
use ethers::utils::format_units as ethers_format_units;
use std::fmt;

/// Decimals of the chain's native unit (wei -> ether).
pub const NATIVE_DECIMALS: u32 = 18;

/// Currency a payment was made in, as flagged by the `isUSDC` event field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Currency {
    Token,
    Native,
}

impl Currency {
    pub fn from_is_token(is_token: bool) -> Self {
        if is_token { Currency::Token } else { Currency::Native }
    }
}

/// How amounts are rendered for each currency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmountFormat {
    pub token_decimals: u32,
    pub token_symbol: String,
    pub native_symbol: String,
}

impl Default for AmountFormat {
    fn default() -> Self {
        Self {
            token_decimals: 18,
            token_symbol: "USDC".to_string(),
            native_symbol: "ETH".to_string(),
        }
    }
}

impl From<&Config> for AmountFormat {
    fn from(config: &Config) -> Self {
        Self {
            token_decimals: config.token_decimals,
            token_symbol: config.token_symbol.clone(),
            native_symbol: config.native_symbol.clone(),
        }
    }
}

impl AmountFormat {
    /// Renders `amount` (smallest units) with the currency's scaling and symbol, e.g. `0.05 ETH`.
    pub fn format(&self, amount: U256, currency: Currency) -> Result<String> {
        let (decimals, symbol) = match currency {
            Currency::Token => (self.token_decimals, &self.token_symbol),
            Currency::Native => (NATIVE_DECIMALS, &self.native_symbol),
        };
        Ok(format!("{} {}", format_units(amount, decimals)?, symbol))
    }
}

/// `format_units` without the trailing zero padding: `50000000000000000` at 18 decimals is `0.05`,
/// whole amounts keep one fractional digit (`1.0`).
pub fn format_units(value: U256, decimals: u32) -> Result<String> {
    let padded = ethers_format_units(value, decimals)
        .map_err(|e| HarnessError::Decode(format!("failed to format units: {e}")))?;
    Ok(trim_fraction(&padded))
}

fn trim_fraction(padded: &str) -> String {
    match padded.split_once('.') {
        Some((whole, fraction)) => {
            let fraction = fraction.trim_end_matches('0');
            let fraction = if fraction.is_empty() { "0" } else { fraction };
            format!("{whole}.{fraction}")
        }
        None => format!("{padded}.0"),
    }
}

/// A block timestamp as a UTC date-time; raw seconds if out of range.
pub struct BlockTime(pub U256);

impl fmt::Display for BlockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let datetime = (self.0 <= U256::from(i64::MAX as u64))
            .then(|| DateTime::<Utc>::from_timestamp(self.0.as_u64() as i64, 0))
            .flatten();
        match datetime {
            Some(dt) => write!(f, "{} ({})", dt.format("%Y-%m-%d %H:%M:%S UTC"), self.0),
            None => write!(f, "{}", self.0),
        }
    }
}
