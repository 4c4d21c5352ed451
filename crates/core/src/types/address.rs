//! Postal address parsing.
//!
//! Label text arrives as an unstructured block (typed by the operator or
//! formatted from a database row). The parser assigns each non-blank line a
//! role with a small state machine:
//!
//! ```text
//! ExpectName -> ExpectAdditionalOrStreet -> ExpectStreet -> ExpectPostalOrStreet2
//!            -> [ExpectPostalOrCity] -> ExpectCountry -> Done
//! ```
//!
//! Parsing never fails. Missing lines leave their fields empty, and lines that
//! arrive after the country has been assigned are reported as ignored.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// `<4-5 digits><whitespace><city>`, anchored at the start of the line.
static POSTAL_LINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{4,5})\s+(.+)").expect("Invalid regex"));

static DIGIT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d").expect("Invalid regex"));

/// Characters that end a line, besides `\n`. Blocks pasted from other tools
/// may use old Mac line endings or Unicode separators.
const LINE_BREAKS: &[char] = &[
    '\n', '\r', '\u{0b}', '\u{0c}', '\u{1c}', '\u{1d}', '\u{1e}', '\u{85}', '\u{2028}', '\u{2029}',
];

/// A structured postal address.
///
/// Every field may be empty. Only produced by [`parse_address`] (or built
/// directly in tests), and never mutated afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address {
    /// First line: person or company name.
    pub name: String,
    /// Optional second name line (company, department, c/o).
    pub additional_name: String,
    /// Street and house number.
    pub street: String,
    /// Optional second street line (PO box, floor).
    pub street2: String,
    /// Postal code (4 or 5 digits).
    pub postal_code: String,
    /// City name.
    pub city: String,
    /// Country as written on the label.
    pub country: String,
}

/// Result of [`parse_address_detailed`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedAddress {
    /// The structured address.
    pub address: Address,
    /// Lines found after the country line. These do not end up on the label.
    pub ignored_lines: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineRole {
    ExpectName,
    ExpectAdditionalOrStreet,
    ExpectStreet,
    ExpectPostalOrStreet2,
    ExpectPostalOrCity,
    ExpectCountry,
    Done,
}

/// Parse an address block into its structured fields.
///
/// # Examples
///
/// ```
/// use stampdesk_core::parse_address;
///
/// let address = parse_address("frapp GmbH\nBachstraße 24-26\n96188 Stettfeld\nDeutschland\n");
/// assert_eq!(address.name, "frapp GmbH");
/// assert_eq!(address.postal_code, "96188");
/// assert_eq!(address.city, "Stettfeld");
/// assert_eq!(address.country, "Deutschland");
/// ```
#[must_use]
pub fn parse_address(text: &str) -> Address {
    parse_address_detailed(text).address
}

/// Parse an address block, also returning the lines that were dropped.
#[must_use]
pub fn parse_address_detailed(text: &str) -> ParsedAddress {
    let mut address = Address::default();
    let mut ignored_lines = Vec::new();
    let mut role = LineRole::ExpectName;

    // `\r\n` splits into a line and an empty piece, which is skipped like any blank line
    for line in text
        .split(LINE_BREAKS)
        .map(str::trim)
        .filter(|line| !line.is_empty())
    {
        role = match role {
            LineRole::ExpectName => {
                line.clone_into(&mut address.name);
                LineRole::ExpectAdditionalOrStreet
            }
            LineRole::ExpectAdditionalOrStreet if !DIGIT_RE.is_match(line) => {
                line.clone_into(&mut address.additional_name);
                LineRole::ExpectStreet
            }
            LineRole::ExpectAdditionalOrStreet | LineRole::ExpectStreet => {
                line.clone_into(&mut address.street);
                LineRole::ExpectPostalOrStreet2
            }
            LineRole::ExpectPostalOrStreet2 => {
                if let Some((postal_code, city)) = split_postal_line(line) {
                    address.postal_code = postal_code;
                    address.city = city;
                    LineRole::ExpectCountry
                } else {
                    line.clone_into(&mut address.street2);
                    LineRole::ExpectPostalOrCity
                }
            }
            LineRole::ExpectPostalOrCity => {
                if let Some((postal_code, city)) = split_postal_line(line) {
                    address.postal_code = postal_code;
                    address.city = city;
                } else {
                    line.clone_into(&mut address.city);
                }
                LineRole::ExpectCountry
            }
            LineRole::ExpectCountry => {
                line.clone_into(&mut address.country);
                LineRole::Done
            }
            LineRole::Done => {
                ignored_lines.push(line.to_owned());
                LineRole::Done
            }
        };
    }

    ParsedAddress {
        address,
        ignored_lines,
    }
}

fn split_postal_line(line: &str) -> Option<(String, String)> {
    let captures = POSTAL_LINE_RE.captures(line)?;
    let postal_code = captures.get(1)?.as_str().to_owned();
    let city = captures.get(2)?.as_str().to_owned();
    Some((postal_code, city))
}

impl Address {
    /// Render the address as a label block, one field per line.
    ///
    /// Empty fields are skipped; postal code and city share a line. Feeding
    /// the result back through [`parse_address`] yields the same address for
    /// well-formed input (a digit-free additional name, a street with a house
    /// number, a 4-5 digit postal code).
    #[must_use]
    pub fn to_text(&self) -> String {
        let postal_line = format!("{} {}", self.postal_code, self.city);
        [
            self.name.as_str(),
            self.additional_name.as_str(),
            self.street.as_str(),
            self.street2.as_str(),
            postal_line.trim(),
            self.country.as_str(),
        ]
        .into_iter()
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
    }

    /// Whether every field is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// A delivery address row as stored by the ERP.
///
/// The label editor shows addresses as text blocks; this converts the
/// column-based row into that block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressRecord {
    pub company: String,
    pub title: String,
    pub last_name: String,
    pub first_name: String,
    pub street: String,
    pub postal_code: String,
    pub city: String,
    pub country: String,
}

impl AddressRecord {
    /// Format the row as a multi-line address block.
    ///
    /// Lines: company, `first title last`, street, `postal city`, country.
    /// Empty parts are skipped.
    #[must_use]
    pub fn to_block(&self) -> String {
        let mut lines = Vec::with_capacity(5);

        push_non_empty(&mut lines, self.company.trim().to_owned());

        let person = [&self.first_name, &self.title, &self.last_name]
            .into_iter()
            .map(|part| part.trim())
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        push_non_empty(&mut lines, person);

        push_non_empty(&mut lines, self.street.trim().to_owned());

        let postal_line = format!("{} {}", self.postal_code.trim(), self.city.trim());
        push_non_empty(&mut lines, postal_line.trim().to_owned());

        push_non_empty(&mut lines, self.country.trim().to_owned());

        lines.join("\n")
    }
}

fn push_non_empty(lines: &mut Vec<String>, line: String) {
    if !line.is_empty() {
        lines.push(line);
    }
}
