//! Coinbase symbol mapping
//!
//! Coinbase product ids use a dash (`BTC-USD`); the canonical form strips
//! it (`BTCUSD`). The forward map (symbol -> product id) is configuration,
//! not code: see `SymbolMapping` in the settings.

use crate::provider::SourceError;

/// Convert a Coinbase product id to the canonical symbol form.
pub fn product_to_symbol(product_id: &str) -> Result<String, SourceError> {
    let symbol: String = product_id
        .chars()
        .filter(|c| *c != '-')
        .collect::<String>()
        .to_uppercase();

    if symbol.is_empty() || !symbol.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(SourceError::Decode(format!(
            "Invalid product id: {product_id}"
        )));
    }

    Ok(symbol)
}
