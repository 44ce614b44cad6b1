//! Symbol-format translation between exchange-native and display names.
//!
//! Exchange pair names ("XXBTZUSD", "BTCUSD") and display names ("XBT/USD")
//! coexist at the feed boundary. Translation lives here as a pure adapter;
//! ledger queries never convert symbols themselves.

/// Kraken-style names that do not follow the plain `<BASE>USD` pattern.
const SPECIAL: &[(&str, &str)] = &[
    ("XXBTZUSD", "XBT/USD"),
    ("XBTUSD", "XBT/USD"),
    ("BTCUSD", "XBT/USD"),
    ("XXETHZUSD", "ETH/USD"),
];

/// Convert an exchange-native pair name to its display form.
///
/// Names already in display form pass through untouched; unknown shapes are
/// returned as-is.
pub fn to_display(symbol: &str) -> String {
    if symbol.contains('/') {
        return symbol.to_string();
    }
    if let Some((_, display)) = SPECIAL.iter().find(|(native, _)| *native == symbol) {
        return (*display).to_string();
    }
    if let Some(base) = symbol.strip_suffix("USD") {
        if !base.is_empty() {
            return format!("{}/USD", base);
        }
    }
    symbol.to_string()
}

/// Convert a display pair name to its exchange-native form.
pub fn to_exchange(symbol: &str) -> String {
    match symbol {
        "XBT/USD" => "XXBTZUSD".to_string(),
        "ETH/USD" => "XXETHZUSD".to_string(),
        _ => symbol.replace('/', ""),
    }
}
