//! Content address of a purchased postmark.
//!
//! A key is the MD5 digest of a canonical JSON rendering of
//! `{receiver, product_id, date}`:
//!
//! ```text
//! {"receiver": "<text>", "product_id": "<code>", "date": "<YYYY-MM-DD>"}
//! ```
//!
//! Field order, separators (`", "` and `": "`) and the ASCII-only string
//! escaping are fixed so that the keys match the `<key>.png` files already
//! present in existing marks directories.

use core::fmt;
use std::io;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::ser::Formatter;

use super::product::ProductCode;

/// Length of the hex rendering of a key.
pub const KEY_LENGTH: usize = 32;

/// Errors that can occur when parsing a [`PurchaseKey`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PurchaseKeyError {
    /// Wrong number of characters.
    #[error("purchase key must be {KEY_LENGTH} characters (got {0})")]
    InvalidLength(usize),
    /// Contains something other than lowercase hex digits.
    #[error("purchase key must be lowercase hex")]
    NotHex,
}

/// Fixed-width identifier of a postmark in the cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PurchaseKey(String);

impl PurchaseKey {
    /// Parse a key from its hex rendering.
    ///
    /// # Errors
    ///
    /// Returns an error unless the input is exactly 32 lowercase hex characters.
    pub fn parse(s: &str) -> Result<Self, PurchaseKeyError> {
        if s.len() != KEY_LENGTH {
            return Err(PurchaseKeyError::InvalidLength(s.len()));
        }
        if !s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
            return Err(PurchaseKeyError::NotHex);
        }
        Ok(Self(s.to_owned()))
    }

    /// The key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File name of the cached postmark image.
    #[must_use]
    pub fn file_name(&self) -> String {
        format!("{}.png", self.0)
    }
}

impl fmt::Display for PurchaseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for PurchaseKey {
    type Error = PurchaseKeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<PurchaseKey> for String {
    fn from(key: PurchaseKey) -> Self {
        key.0
    }
}

#[derive(Serialize)]
struct KeyMaterial<'a> {
    receiver: &'a str,
    product_id: String,
    date: String,
}

/// JSON formatter with `", "` / `": "` separators and `\uXXXX` escapes for
/// everything outside printable ASCII.
struct CanonicalFormatter;

impl Formatter for CanonicalFormatter {
    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }

    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        for c in fragment.chars() {
            if c.is_ascii() && c != '\u{7f}' {
                writer.write_all(c.encode_utf8(&mut [0; 4]).as_bytes())?;
            } else {
                let mut units = [0u16; 2];
                for unit in c.encode_utf16(&mut units) {
                    write!(writer, "\\u{unit:04x}")?;
                }
            }
        }
        Ok(())
    }
}

/// Canonical byte serialization fed into the digest.
///
/// # Panics
///
/// Does not panic in practice: serializing string fields into a `Vec` has no
/// failure path.
#[must_use]
pub fn canonical_key_material(
    receiver_text: &str,
    product_code: ProductCode,
    purchase_date: NaiveDate,
) -> Vec<u8> {
    let material = KeyMaterial {
        receiver: receiver_text,
        product_id: product_code.to_string(),
        date: purchase_date.format("%Y-%m-%d").to_string(),
    };

    let mut buf = Vec::with_capacity(receiver_text.len() + 64);
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, CanonicalFormatter);
    material
        .serialize(&mut serializer)
        .expect("serializing key material into memory cannot fail");
    buf
}

/// Compute the cache key for a postmark purchase.
///
/// The receiver text is used byte for byte, whitespace included.
///
/// # Examples
///
/// ```
/// use chrono::NaiveDate;
/// use stampdesk_core::{ProductCode, compute_purchase_key};
///
/// let date = NaiveDate::from_ymd_opt(2025, 9, 5).unwrap();
/// let key = compute_purchase_key("", ProductCode::new(290), date);
/// assert_eq!(key.as_str(), "d70dc1d3cab4d42b60aec2a253e9e1b1");
/// ```
#[must_use]
pub fn compute_purchase_key(
    receiver_text: &str,
    product_code: ProductCode,
    purchase_date: NaiveDate,
) -> PurchaseKey {
    let material = canonical_key_material(receiver_text, product_code, purchase_date);
    PurchaseKey(format!("{:x}", md5::compute(&material)))
}
