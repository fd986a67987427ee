/// ISO 4217 code to display symbol. Unknown codes display as the code itself.
const CURRENCY_SYMBOLS: &[(&str, &str)] = &[
    ("AED", "د.إ"),
    ("AUD", "$"),
    ("BRL", "R$"),
    ("BTC", "₿"),
    ("CAD", "$"),
    ("CHF", "Fr."),
    ("CNY", "¥"),
    ("EGP", "£"),
    ("EUR", "€"),
    ("GBP", "£"),
    ("GHS", "₵"),
    ("INR", "₹"),
    ("JPY", "¥"),
    ("KES", "KSh"),
    ("NGN", "₦"),
    ("USD", "$"),
    ("XAF", "FCFA"),
    ("XOF", "CFA"),
    ("ZAR", "R"),
];

pub fn currency_symbol(code: &str) -> &str {
    CURRENCY_SYMBOLS
        .iter()
        .find(|(known, _)| *known == code)
        .map(|(_, symbol)| *symbol)
        .unwrap_or(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_and_unknown_codes() {
        assert_eq!(currency_symbol("NGN"), "₦");
        assert_eq!(currency_symbol("USD"), "$");
        assert_eq!(currency_symbol("XYZ"), "XYZ");
    }
}
