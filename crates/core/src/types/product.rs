//! Internetmarke product catalog.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use super::country::CountryCode;
use super::price::Price;

/// Errors that can occur when looking up a [`Product`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ProductError {
    /// The code is not a number.
    #[error("product code must be numeric, got '{0}'")]
    NotNumeric(String),
    /// The code is not in the catalog.
    #[error("unknown product code {0}")]
    Unknown(ProductCode),
}

/// Numeric Internetmarke product code (PPL id).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductCode(u32);

impl ProductCode {
    /// Create a product code.
    #[must_use]
    pub const fn new(code: u32) -> Self {
        Self(code)
    }

    /// Get the underlying numeric value.
    #[must_use]
    pub const fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for ProductCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ProductCode {
    type Err = ProductError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u32>()
            .map(Self)
            .map_err(|_| ProductError::NotNumeric(s.to_owned()))
    }
}

/// A stamp product that can be bought for a label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Product {
    pub code: ProductCode,
    pub name: &'static str,
    pub price: Price,
}

/// Products offered in the label editor, in display order.
const CATALOG: &[Product] = &[
    Product {
        code: ProductCode::new(290),
        name: "Warensendung",
        price: Price::from_cents(270),
    },
    Product {
        code: ProductCode::new(331),
        name: "Warensendung 1.000 zzgl. Gewichtszuschlag",
        price: Price::from_cents(355),
    },
];

/// Product preselected for domestic receivers.
const DOMESTIC_DEFAULT: ProductCode = ProductCode::new(290);

impl Product {
    /// All products, in display order.
    #[must_use]
    pub const fn catalog() -> &'static [Self] {
        CATALOG
    }

    /// Look up a product by code.
    ///
    /// # Errors
    ///
    /// Returns `ProductError::Unknown` if the code is not in the catalog.
    pub fn find(code: ProductCode) -> Result<Self, ProductError> {
        CATALOG
            .iter()
            .find(|product| product.code == code)
            .copied()
            .ok_or(ProductError::Unknown(code))
    }

    /// Default product for a receiver country, if any.
    ///
    /// Only domestic receivers get a preselection; foreign labels need the
    /// operator to pick a product.
    #[must_use]
    pub fn default_for(country: &CountryCode) -> Option<Self> {
        if country.is_domestic() {
            Self::find(DOMESTIC_DEFAULT).ok()
        } else {
            None
        }
    }
}

impl fmt::Display for Product {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ({})", self.code, self.name, self.price)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::resolve_country;

    #[test]
    fn test_find_known_product() {
        let product = Product::find(ProductCode::new(331)).unwrap();
        assert_eq!(product.price, Price::from_cents(355));
    }

    #[test]
    fn test_find_unknown_product() {
        let err = Product::find(ProductCode::new(1)).unwrap_err();
        assert_eq!(err, ProductError::Unknown(ProductCode::new(1)));
        assert_eq!(err.to_string(), "unknown product code 1");
    }

    #[test]
    fn test_parse_product_code() {
        assert_eq!(" 290 ".parse::<ProductCode>().unwrap(), ProductCode::new(290));
        assert!(matches!(
            "abc".parse::<ProductCode>(),
            Err(ProductError::NotNumeric(_))
        ));
    }

    #[test]
    fn test_default_for_country() {
        let domestic = Product::default_for(&resolve_country("Deutschland")).unwrap();
        assert_eq!(domestic.code, ProductCode::new(290));
        assert!(Product::default_for(&resolve_country("France")).is_none());
        assert!(Product::default_for(&resolve_country("")).is_none());
    }

    #[test]
    fn test_display() {
        let product = Product::find(ProductCode::new(290)).unwrap();
        assert_eq!(product.to_string(), "290 Warensendung (2.70 EUR)");
    }
}
