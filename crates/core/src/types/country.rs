//! Country resolution for label routing.
//!
//! Only the home market matters here: a domestic receiver gets the domestic
//! default product preselected. Every other country is passed through as
//! written (uppercased) and left to the operator.

use core::fmt;

use serde::{Deserialize, Serialize};

/// ISO 3166-1 alpha-3 code of the home market.
pub const DOMESTIC_CODE: &str = "DEU";

/// Spellings (uppercased) that denote the home market.
const DOMESTIC_SPELLINGS: &[&str] = &["DEUTSCHLAND", "GERMANY", "DE", "DEU"];

/// A resolved country.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CountryCode {
    code: String,
    is_domestic: bool,
}

impl CountryCode {
    /// Canonical code: `DEU` for domestic spellings, otherwise the input uppercased.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.code
    }

    /// Whether this is the home market.
    #[must_use]
    pub const fn is_domestic(&self) -> bool {
        self.is_domestic
    }

    /// Whether the label carried no country at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }
}

impl fmt::Display for CountryCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code)
    }
}

/// Resolve free-text country spellings.
///
/// # Examples
///
/// ```
/// use stampdesk_core::resolve_country;
///
/// assert!(resolve_country(" deutschland ").is_domestic());
/// assert_eq!(resolve_country("Deutschland").as_str(), "DEU");
/// assert_eq!(resolve_country("Österreich").as_str(), "ÖSTERREICH");
/// ```
#[must_use]
pub fn resolve_country(country_text: &str) -> CountryCode {
    let normalized = country_text.trim().to_uppercase();

    if DOMESTIC_SPELLINGS.contains(&normalized.as_str()) {
        CountryCode {
            code: DOMESTIC_CODE.to_owned(),
            is_domestic: true,
        }
    } else {
        CountryCode {
            code: normalized,
            is_domestic: false,
        }
    }
}
