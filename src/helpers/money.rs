use bigdecimal::{BigDecimal, RoundingMode, Signed};

use super::currencies::currency_symbol;
use crate::enums::CurrencyPosition;

pub const DEFAULT_DECIMALS: u32 = 2;
const MAX_DECIMALS: i64 = 8;

/// Admin-defined currency display settings.
#[derive(Debug, Clone, PartialEq)]
pub struct CurrencyFormat {
    pub currency: String,
    pub decimals: u32,
    pub position: Option<CurrencyPosition>,
    pub thousand_separator: String,
    pub decimal_separator: String,
}

impl Default for CurrencyFormat {
    fn default() -> Self {
        Self {
            currency: "NGN".into(),
            decimals: DEFAULT_DECIMALS,
            position: Some(CurrencyPosition::Left),
            thousand_separator: ",".into(),
            decimal_separator: ".".into(),
        }
    }
}

/// Parses the `number_of_decimals` setting, falling back to 2 outside 0..=8.
pub fn parse_decimals(raw: &str) -> u32 {
    match raw.trim().parse::<i64>() {
        Ok(decimals) if (0..=MAX_DECIMALS).contains(&decimals) => decimals as u32,
        _ => {
            tracing::warn!(
                "Invalid decimal setting {:?}, falling back to {}",
                raw,
                DEFAULT_DECIMALS
            );
            DEFAULT_DECIMALS
        }
    }
}

/// Rounds half-up to the configured number of decimals.
pub fn quantize(amount: &BigDecimal, decimals: u32) -> BigDecimal {
    amount.with_scale_round(i64::from(decimals), RoundingMode::HalfUp)
}

fn group_thousands(digits: &str, separator: &str) -> String {
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3 * separator.len());
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push_str(separator);
        }
        grouped.push(ch);
    }
    grouped
}

/// Number part only: `1234.5` with 2 decimals and `,`/`.` gives `1,234.50`.
pub fn format_number(amount: &BigDecimal, format: &CurrencyFormat) -> String {
    let quantized = quantize(amount, format.decimals);
    let (units, _) = quantized.as_bigint_and_exponent();
    let decimals = format.decimals as usize;

    let mut digits = units.magnitude().to_string();
    if digits.len() <= decimals {
        digits = format!("{}{}", "0".repeat(decimals + 1 - digits.len()), digits);
    }
    let (integer, fraction) = digits.split_at(digits.len() - decimals);

    let sign = if quantized.is_negative() { "-" } else { "" };
    let integer = group_thousands(integer, &format.thousand_separator);
    if fraction.is_empty() {
        format!("{sign}{integer}")
    } else {
        format!("{sign}{integer}{}{fraction}", format.decimal_separator)
    }
}

/// Formats an amount with the currency symbol placed per the admin setting.
pub fn format_money(amount: &BigDecimal, format: &CurrencyFormat) -> String {
    let number = format_number(amount, format);
    let symbol = currency_symbol(&format.currency);
    match format.position {
        Some(CurrencyPosition::Left) => format!("{symbol}{number}"),
        Some(CurrencyPosition::Right) => format!("{number}{symbol}"),
        Some(CurrencyPosition::LeftSpace) => format!("{symbol} {number}"),
        Some(CurrencyPosition::RightSpace) => format!("{number} {symbol}"),
        None => number,
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    fn usd(position: CurrencyPosition) -> CurrencyFormat {
        CurrencyFormat {
            currency: "USD".into(),
            position: Some(position),
            ..CurrencyFormat::default()
        }
    }

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    #[test]
    fn places_symbol_by_position() {
        let amount = dec("1234.56");
        assert_eq!(format_money(&amount, &usd(CurrencyPosition::Left)), "$1,234.56");
        assert_eq!(format_money(&amount, &usd(CurrencyPosition::Right)), "1,234.56$");
        assert_eq!(
            format_money(&amount, &usd(CurrencyPosition::LeftSpace)),
            "$ 1,234.56"
        );
        assert_eq!(
            format_money(&amount, &usd(CurrencyPosition::RightSpace)),
            "1,234.56 $"
        );
    }

    #[test]
    fn rounds_half_up_and_pads() {
        let format = usd(CurrencyPosition::Left);
        assert_eq!(format_number(&dec("100.456"), &format), "100.46");
        assert_eq!(format_number(&dec("0.005"), &format), "0.01");
        assert_eq!(format_number(&dec("7"), &format), "7.00");
        assert_eq!(format_number(&dec("1234567.8"), &format), "1,234,567.80");
    }

    #[test]
    fn honours_custom_separators_and_zero_decimals() {
        let format = CurrencyFormat {
            currency: "EUR".into(),
            decimals: 0,
            position: Some(CurrencyPosition::RightSpace),
            thousand_separator: ".".into(),
            decimal_separator: ",".into(),
        };
        assert_eq!(format_money(&dec("1234567.5"), &format), "1.234.568 €");
    }

    #[test]
    fn negative_amounts_keep_the_sign_inside_the_symbol() {
        assert_eq!(
            format_money(&dec("-1234.56"), &usd(CurrencyPosition::Left)),
            "$-1,234.56"
        );
    }

    #[test]
    fn invalid_decimal_settings_fall_back_to_two() {
        assert_eq!(parse_decimals("3"), 3);
        assert_eq!(parse_decimals("9"), 2);
        assert_eq!(parse_decimals("-1"), 2);
        assert_eq!(parse_decimals("two"), 2);
    }
}
