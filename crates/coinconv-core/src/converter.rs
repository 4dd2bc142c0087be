//! Exchange rate arithmetic and formatting.
//!
//! Rates are expressed relative to USD, so converting `from -> to` uses
//! `rates[to] / rates[from]`.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::models::CurrencyCode;

/// Fraction digits shown for amounts and rates
const MAX_FRACTION_DIGITS: usize = 6;

/// Amounts always show at least cents
const MIN_FRACTION_DIGITS: usize = 2;

#[derive(Error, Debug, PartialEq)]
pub enum ConvertError {
    #[error("Unknown currency: {0}")]
    UnknownCurrency(String),

    #[error("No rate available for {0}")]
    MissingRate(CurrencyCode),
}

/// Rates relative to USD.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateTable {
    rates: BTreeMap<CurrencyCode, f64>,
}

impl Default for RateTable {
    fn default() -> Self {
        Self::demo()
    }
}

impl RateTable {
    /// Built-in demo rates, used until live rates are fetched
    pub fn demo() -> Self {
        Self {
            rates: BTreeMap::from([
                (CurrencyCode::Usd, 1.0),
                (CurrencyCode::Eur, 0.92),
                (CurrencyCode::Usdt, 1.0),
                (CurrencyCode::Ves, 36.5),
            ]),
        }
    }

    /// Build from the API's `{CODE: rate}` map. Unknown codes and
    /// non-positive rates are skipped.
    pub fn from_codes(raw: &HashMap<String, f64>) -> Self {
        let mut rates = BTreeMap::new();
        for (code, &rate) in raw {
            match code.parse::<CurrencyCode>() {
                Ok(currency) if is_usable(rate) => {
                    rates.insert(currency, rate);
                }
                Ok(currency) => debug!(%currency, rate, "Ignoring unusable rate"),
                Err(_) => debug!(code = %code, "Ignoring unsupported currency"),
            }
        }
        Self { rates }
    }

    /// Drop rates that cannot be divided by, e.g. from a damaged cache file
    pub fn retain_usable(mut self) -> Self {
        self.rates.retain(|currency, rate| {
            let usable = is_usable(*rate);
            if !usable {
                debug!(%currency, rate = *rate, "Ignoring unusable rate");
            }
            usable
        });
        self
    }

    pub fn get(&self, currency: CurrencyCode) -> Option<f64> {
        self.rates.get(&currency).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (CurrencyCode, f64)> + '_ {
        self.rates.iter().map(|(&code, &rate)| (code, rate))
    }

    /// Fill gaps with demo rates
    pub fn with_fallback(mut self) -> Self {
        for (code, rate) in Self::demo().rates {
            self.rates.entry(code).or_insert(rate);
        }
        self
    }

    /// Units of `to` per unit of `from`
    pub fn rate(&self, from: CurrencyCode, to: CurrencyCode) -> Result<f64, ConvertError> {
        let from_rate = self.get(from).ok_or(ConvertError::MissingRate(from))?;
        let to_rate = self.get(to).ok_or(ConvertError::MissingRate(to))?;
        Ok(to_rate / from_rate)
    }

    /// Convert `amount`. A non-finite amount converts to zero.
    pub fn convert(
        &self,
        amount: f64,
        from: CurrencyCode,
        to: CurrencyCode,
    ) -> Result<Conversion, ConvertError> {
        let rate = self.rate(from, to)?;
        let result = if amount.is_finite() { amount * rate } else { 0.0 };
        Ok(Conversion {
            amount,
            from,
            to,
            rate,
            result,
        })
    }
}

fn is_usable(rate: f64) -> bool {
    rate.is_finite() && rate > 0.0
}

/// Exchange the two sides of a conversion
pub fn swap(from: CurrencyCode, to: CurrencyCode) -> (CurrencyCode, CurrencyCode) {
    (to, from)
}

/// Outcome of one conversion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Conversion {
    pub amount: f64,
    pub from: CurrencyCode,
    pub to: CurrencyCode,
    pub rate: f64,
    pub result: f64,
}

impl Conversion {
    /// e.g. `1 USD = 0.920000 EUR`
    pub fn rate_line(&self) -> String {
        format!(
            "1 {} = {:.prec$} {}",
            self.from,
            self.rate,
            self.to,
            prec = MAX_FRACTION_DIGITS
        )
    }
}

impl fmt::Display for Conversion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let amount = if self.amount.is_finite() { self.amount } else { 0.0 };
        write!(
            f,
            "{} → {}",
            format_amount(amount, self.from),
            format_amount(self.result, self.to)
        )
    }
}

/// Amount with two to six fraction digits and thousands separators,
/// followed by the currency code.
pub fn format_amount(value: f64, currency: CurrencyCode) -> String {
    let fixed = format!("{:.prec$}", value.abs(), prec = MAX_FRACTION_DIGITS);
    let (int_part, frac_part) = fixed.split_once('.').unwrap_or((fixed.as_str(), ""));

    let mut frac = frac_part.trim_end_matches('0').to_string();
    while frac.len() < MIN_FRACTION_DIGITS {
        frac.push('0');
    }

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, digit) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    let sign = if value < 0.0 && fixed.chars().any(|c| c.is_ascii_digit() && c != '0') {
        "-"
    } else {
        ""
    };
    format!("{sign}{grouped}.{frac} {currency}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_demo_rate_usd_to_eur() {
        let rates = RateTable::demo();
        let conversion = rates
            .convert(1.0, CurrencyCode::Usd, CurrencyCode::Eur)
            .expect("demo rates cover EUR");
        assert!((conversion.result - 0.92).abs() < 1e-12);
        assert_eq!(conversion.rate_line(), "1 USD = 0.920000 EUR");
    }

    #[test]
    fn test_cross_rate_goes_through_usd() {
        let rates = RateTable::demo();
        let rate = rates
            .rate(CurrencyCode::Eur, CurrencyCode::Ves)
            .expect("demo rates");
        assert!((rate - 36.5 / 0.92).abs() < 1e-9);
    }

    #[test]
    fn test_non_finite_amount_converts_to_zero() {
        let rates = RateTable::demo();
        let conversion = rates
            .convert(f64::NAN, CurrencyCode::Usd, CurrencyCode::Ves)
            .expect("demo rates");
        assert_eq!(conversion.result, 0.0);
        assert_eq!(conversion.to_string(), "0.00 USD → 0.00 VES");
    }

    #[test]
    fn test_from_codes_skips_unknown_and_invalid() {
        let raw = HashMap::from([
            ("USD".to_string(), 1.0),
            ("EUR".to_string(), 0.9),
            ("GBP".to_string(), 0.8),
            ("VES".to_string(), 0.0),
        ]);
        let rates = RateTable::from_codes(&raw);
        assert_eq!(rates.get(CurrencyCode::Eur), Some(0.9));
        assert_eq!(rates.get(CurrencyCode::Ves), None);
        assert_eq!(
            rates.rate(CurrencyCode::Usd, CurrencyCode::Ves),
            Err(ConvertError::MissingRate(CurrencyCode::Ves))
        );

        let filled = rates.with_fallback();
        assert_eq!(filled.get(CurrencyCode::Ves), Some(36.5));
        assert_eq!(filled.get(CurrencyCode::Eur), Some(0.9));
    }

    #[test]
    fn test_retain_usable_drops_zero_and_negative_rates() {
        let damaged: RateTable = serde_json::from_str(
            r#"{"rates":{"USD":1.0,"EUR":0.0,"VES":-3.0,"USDT":1.0}}"#,
        )
        .expect("rate table json");
        let rates = damaged.retain_usable();
        assert_eq!(rates.get(CurrencyCode::Eur), None);
        assert_eq!(rates.get(CurrencyCode::Ves), None);
        assert_eq!(
            rates.rate(CurrencyCode::Eur, CurrencyCode::Usd),
            Err(ConvertError::MissingRate(CurrencyCode::Eur))
        );

        let filled = rates.with_fallback();
        let rate = filled.rate(CurrencyCode::Eur, CurrencyCode::Usd).expect("demo EUR");
        assert!(rate.is_finite());
    }

    #[test]
    fn test_swap() {
        assert_eq!(
            swap(CurrencyCode::Usd, CurrencyCode::Eur),
            (CurrencyCode::Eur, CurrencyCode::Usd)
        );
    }

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(1.0, CurrencyCode::Usd), "1.00 USD");
        assert_eq!(format_amount(1234567.5, CurrencyCode::Ves), "1,234,567.50 VES");
        assert_eq!(format_amount(0.123456789, CurrencyCode::Usdt), "0.123457 USDT");
        assert_eq!(format_amount(-12.3, CurrencyCode::Eur), "-12.30 EUR");
        assert_eq!(format_amount(-0.0000001, CurrencyCode::Eur), "0.00 EUR");
    }
}
