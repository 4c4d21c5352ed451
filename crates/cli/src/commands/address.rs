//! Address and purchase key inspection.
//!
//! Neither command touches the network.

use std::path::Path;

use chrono::NaiveDate;
use stampdesk_core::{
    Product, ProductCode, compute_purchase_key, parse_address_detailed, resolve_country,
};
use stampdesk_postage::{PostageConfig, cache_has_postmark};

use super::read_label;
use crate::error::CliError;

/// Print the parsed fields of an address block.
#[allow(clippy::print_stdout)]
pub async fn show(file: &Path) -> Result<(), CliError> {
    let text = read_label(file).await?;
    let parsed = parse_address_detailed(&text);
    let address = &parsed.address;
    let country = resolve_country(&address.country);

    println!("name:            {}", address.name);
    println!("additional name: {}", address.additional_name);
    println!("street:          {}", address.street);
    println!("street 2:        {}", address.street2);
    println!("postal code:     {}", address.postal_code);
    println!("city:            {}", address.city);
    println!("country:         {} ({})", address.country, country);
    if let Some(product) = Product::default_for(&country) {
        println!("default product: {product}");
    } else {
        println!("default product: none, choose one of:");
        for product in Product::catalog() {
            println!("  {product}");
        }
    }

    for line in &parsed.ignored_lines {
        tracing::warn!(line = %line, "Line after the country is not printed");
    }
    Ok(())
}

/// Print the purchase key of a label and whether its postmark is cached.
#[allow(clippy::print_stdout)]
pub async fn key(file: &Path, product: ProductCode, date: NaiveDate) -> Result<(), CliError> {
    let text = read_label(file).await?;
    let key = compute_purchase_key(&text, product, date);
    let marks_dir = PostageConfig::marks_dir_from_env();

    let cached = if cache_has_postmark(&marks_dir, &key) {
        "cached"
    } else {
        "not cached"
    };
    println!("{key} ({cached} in {})", marks_dir.display());
    Ok(())
}
