// src/amount.rs
//! Token amounts as they cross the API boundary.
use ethers::types::U256;
use ethers::utils::format_units;

/// Largest `decimals` whose unit, `10^decimals`, fits in a `U256`.
const MAX_DECIMALS: u8 = 77;

/// Renders a base-unit amount with two decimals, truncating finer precision.
pub fn format_amount(value: U256, decimals: u8) -> String {
    two_decimals(value, decimals, false)
}

/// Like [`format_amount`], rounding up to the next cent, so a required amount
/// is never shown lower than it is.
pub fn format_amount_ceil(value: U256, decimals: u8) -> String {
    two_decimals(value, decimals, true)
}

fn two_decimals(value: U256, decimals: u8, round_up: bool) -> String {
    if decimals > MAX_DECIMALS {
        return format_full(value, decimals);
    }
    let cents = if decimals >= 2 {
        let (cents, rest) = value.div_mod(U256::exp10(decimals as usize - 2));
        if round_up && !rest.is_zero() {
            cents + U256::one()
        } else {
            cents
        }
    } else {
        value.saturating_mul(U256::exp10(2 - decimals as usize))
    };
    let (whole, fraction) = cents.div_mod(U256::from(100u64));
    format!("{whole}.{:02}", fraction.low_u64())
}

/// Full precision rendering, e.g. `"100.000000"` for 100 USDC.
pub fn format_full(value: U256, decimals: u8) -> String {
    format_units(value, decimals as u32).unwrap_or_else(|_| value.to_string())
}

/// Parses a base-unit amount given as a decimal or `0x` hex string.
pub fn parse_amount(raw: &str) -> Result<U256, String> {
    let raw = raw.trim();
    match raw.strip_prefix("0x") {
        Some(hex) => U256::from_str_radix(hex, 16).map_err(|e| format!("invalid hex amount {raw}: {e:?}")),
        None => U256::from_dec_str(raw).map_err(|e| format!("invalid amount {raw}: {e:?}")),
    }
}
