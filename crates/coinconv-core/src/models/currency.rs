use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::converter::ConvertError;

/// Currencies offered by the converter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "UPPERCASE")]
pub enum CurrencyCode {
    Usd,
    Eur,
    Usdt,
    Ves,
}

impl CurrencyCode {
    pub const ALL: [CurrencyCode; 4] = [
        CurrencyCode::Usd,
        CurrencyCode::Eur,
        CurrencyCode::Usdt,
        CurrencyCode::Ves,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            CurrencyCode::Usd => "USD",
            CurrencyCode::Eur => "EUR",
            CurrencyCode::Usdt => "USDT",
            CurrencyCode::Ves => "VES",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            CurrencyCode::Usd => "US Dollar",
            CurrencyCode::Eur => "Euro",
            CurrencyCode::Usdt => "Tether (USDT)",
            CurrencyCode::Ves => "Bolívar (VES)",
        }
    }

    pub fn currency_type(&self) -> CurrencyType {
        match self {
            CurrencyCode::Usdt => CurrencyType::Crypto,
            _ => CurrencyType::Fiat,
        }
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for CurrencyCode {
    type Err = ConvertError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        CurrencyCode::ALL
            .into_iter()
            .find(|c| c.code().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| ConvertError::UnknownCurrency(wanted.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "UPPERCASE")]
pub enum CurrencyType {
    Fiat,
    Crypto,
}

/// A currency with its rate relative to USD, as served by the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Currency {
    pub id: String,
    pub name: String,
    pub code: String,
    #[serde(rename = "type")]
    pub currency_type: CurrencyType,
    pub rate: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_currency_code_parsing() {
        assert_eq!("usd".parse::<CurrencyCode>().ok(), Some(CurrencyCode::Usd));
        assert_eq!(" VES ".parse::<CurrencyCode>().ok(), Some(CurrencyCode::Ves));
        assert!("GBP".parse::<CurrencyCode>().is_err());
    }

    #[test]
    fn test_parse_currency() {
        let json = r#"{"id":"c1","name":"Tether","code":"USDT","type":"CRYPTO","rate":1.0}"#;
        let currency: Currency = serde_json::from_str(json).expect("Failed to parse currency");
        assert_eq!(currency.currency_type, CurrencyType::Crypto);
        assert_eq!(CurrencyCode::Usdt.currency_type(), CurrencyType::Crypto);
    }
}
