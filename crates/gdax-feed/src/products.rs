//! Product ids tracked by the recorder

use crate::error::ProductError;

/// Products recorded when the selection is empty or contains `all`
pub const DEFAULT_PRODUCT_IDS: [&str; 9] = [
    "BTC-USD", "BTC-EUR", "BTC-GBP", "ETH-USD", "ETH-EUR", "ETH-BTC", "LTC-USD", "LTC-EUR",
    "LTC-BTC",
];

/// Sentinel selecting every default product
pub const ALL_PRODUCTS: &str = "all";

/// Expand a product selection into the list of ids to follow.
///
/// Duplicates are dropped (first occurrence wins) so that every product is
/// fetched once per snapshot cycle.
pub fn resolve_product_ids<S: AsRef<str>>(requested: &[S]) -> Result<Vec<String>, ProductError> {
    let all = || DEFAULT_PRODUCT_IDS.iter().map(|p| p.to_string()).collect();

    if requested.is_empty() {
        return Ok(all());
    }

    let mut resolved: Vec<String> = Vec::with_capacity(requested.len());
    for product_id in requested.iter().map(|p| p.as_ref().trim()) {
        if product_id.eq_ignore_ascii_case(ALL_PRODUCTS) {
            return Ok(all());
        }
        if !DEFAULT_PRODUCT_IDS.contains(&product_id) {
            return Err(ProductError::Unknown(product_id.to_string()));
        }
        if !resolved.iter().any(|p| p == product_id) {
            resolved.push(product_id.to_string());
        }
    }

    Ok(resolved)
}
