//! Fixed-point amount parsing and formatting.
//!
//! Balances are integers in the smallest unit (lamports for SOL, base units
//! for tokens). User input and output use decimal notation.

/// Decimal places of the native currency.
pub const SOL_DECIMALS: u8 = 9;

/// Lamports in one SOL.
pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

/// Parse a non-negative decimal string into base units.
///
/// Returns `None` for malformed input, negative numbers, more fractional
/// digits than `decimals`, or overflow.
pub fn parse_units(input: &str, decimals: u8) -> Option<u64> {
    let input = input.trim();
    let (whole, fraction) = match input.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (input, ""),
    };

    if whole.is_empty() && fraction.is_empty() {
        return None;
    }
    if !whole.bytes().all(|b| b.is_ascii_digit()) || !fraction.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if fraction.len() > usize::from(decimals) {
        return None;
    }

    let scale = 10u64.checked_pow(u32::from(decimals))?;
    let whole_units = if whole.is_empty() {
        0
    } else {
        whole.parse::<u64>().ok()?.checked_mul(scale)?
    };
    let fraction_units = if fraction.is_empty() {
        0
    } else {
        let padded = format!("{:0<width$}", fraction, width = usize::from(decimals));
        padded.parse::<u64>().ok()?
    };

    whole_units.checked_add(fraction_units)
}

/// Render base units as a trimmed decimal string (`2`, `1.999995`).
pub fn format_units(value: u64, decimals: u8) -> String {
    let scale = 10u64.pow(u32::from(decimals));
    let whole = value / scale;
    let fraction = value % scale;
    if fraction == 0 {
        return whole.to_string();
    }
    let digits = format!("{:0>width$}", fraction, width = usize::from(decimals));
    format!("{}.{}", whole, digits.trim_end_matches('0'))
}

pub fn parse_sol(input: &str) -> Option<u64> {
    parse_units(input, SOL_DECIMALS)
}

pub fn format_sol(lamports: u64) -> String {
    format_units(lamports, SOL_DECIMALS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sol() {
        assert_eq!(parse_sol("2"), Some(2 * LAMPORTS_PER_SOL));
        assert_eq!(parse_sol("0.5"), Some(500_000_000));
        assert_eq!(parse_sol(".25"), Some(250_000_000));
        assert_eq!(parse_sol("1.000000001"), Some(1_000_000_001));
        assert_eq!(parse_sol("0"), Some(0));
        assert_eq!(parse_sol("-1"), None);
        assert_eq!(parse_sol("1.0000000001"), None);
        assert_eq!(parse_sol("abc"), None);
        assert_eq!(parse_sol("."), None);
        assert_eq!(parse_sol("99999999999999999999"), None);
    }

    #[test]
    fn test_format_sol() {
        assert_eq!(format_sol(2 * LAMPORTS_PER_SOL), "2");
        assert_eq!(format_sol(1_999_995_000), "1.999995");
        assert_eq!(format_sol(5_000), "0.000005");
        assert_eq!(format_sol(0), "0");
    }

    #[test]
    fn test_token_units() {
        assert_eq!(parse_units("12.5", 2), Some(1250));
        assert_eq!(parse_units("12.555", 2), None);
        assert_eq!(parse_units("7", 0), Some(7));
        assert_eq!(format_units(1250, 2), "12.5");
        assert_eq!(format_units(7, 0), "7");
    }
}
