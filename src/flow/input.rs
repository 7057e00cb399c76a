// src/flow/input.rs — Parsing of free-text answers

use crate::infra::errors::InputError;

const MAX_PRICE: f64 = 1_000_000.0;

/// Parse a user-typed price such as "50€", "1.200,50 EUR" or "12.5".
///
/// Zero ("0", "free", "gratis") is a valid answer and means giveaway.
pub fn parse_price(text: &str) -> Result<f64, InputError> {
    let err = || InputError::Price(text.trim().to_string());
    let lower = text.trim().to_lowercase();
    if matches!(lower.as_str(), "free" | "gratis" | "giveaway") {
        return Ok(0.0);
    }

    let mut cleaned = lower;
    for token in ["euros", "euro", "eur", "€", "$", " "] {
        cleaned = cleaned.replace(token, "");
    }
    if cleaned.is_empty() || !cleaned.chars().all(|c| c.is_ascii_digit() || c == '.' || c == ',') {
        return Err(err());
    }

    let normalized = normalize_separators(&cleaned).ok_or_else(err)?;
    let value: f64 = normalized.parse().map_err(|_| err())?;
    if !value.is_finite() || !(0.0..MAX_PRICE).contains(&value) {
        return Err(err());
    }
    Ok((value * 100.0).round() / 100.0)
}

/// Turn "1.200,50" / "1,200.50" / "12,5" / "1.200" into "1200.50"-style.
fn normalize_separators(s: &str) -> Option<String> {
    let last_dot = s.rfind('.');
    let last_comma = s.rfind(',');

    let decimal = match (last_dot, last_comma) {
        (Some(d), Some(c)) => Some(d.max(c)),
        (Some(d), None) => single_kind_decimal(s, '.', d),
        (None, Some(c)) => single_kind_decimal(s, ',', c),
        (None, None) => None,
    };

    let mut out = String::with_capacity(s.len());
    for (i, ch) in s.char_indices() {
        match ch {
            '.' | ',' if Some(i) == decimal => out.push('.'),
            '.' | ',' => {}
            d => out.push(d),
        }
    }
    if out.is_empty() || out == "." {
        return None;
    }
    Some(out)
}

/// With only one separator kind present, it is a decimal point unless it
/// appears more than once or groups exactly three trailing digits.
fn single_kind_decimal(s: &str, sep: char, pos: usize) -> Option<usize> {
    let occurrences = s.matches(sep).count();
    let trailing = s.len() - pos - 1;
    if occurrences > 1 || (trailing == 3 && pos > 0) {
        None
    } else {
        Some(pos)
    }
}

pub fn validate_postal_code(text: &str) -> Result<String, InputError> {
    let code = text.trim();
    if code.len() == 5 && code.chars().all(|c| c.is_ascii_digit()) {
        Ok(code.to_string())
    } else {
        Err(InputError::PostalCode(code.to_string()))
    }
}

pub fn parse_yes_no(text: &str) -> Result<bool, InputError> {
    match text.trim().to_lowercase().as_str() {
        "yes" | "y" | "si" | "sí" | "true" | "1" => Ok(true),
        "no" | "n" | "false" | "0" => Ok(false),
        _ => Err(InputError::YesNo),
    }
}

pub fn validate_email(text: &str) -> Result<String, InputError> {
    let email = text.trim();
    let valid = email
        .split_once('@')
        .is_some_and(|(local, domain)| {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
        })
        && !email.contains(char::is_whitespace);
    if valid {
        Ok(email.to_lowercase())
    } else {
        Err(InputError::Email(email.to_string()))
    }
}

/// Trimmed, non-empty text.
pub fn non_empty(text: &str) -> Result<String, InputError> {
    let t = text.trim();
    if t.is_empty() {
        Err(InputError::Empty)
    } else {
        Ok(t.to_string())
    }
}

/// Render a price the way prompts show it.
pub fn format_price(price: f64) -> String {
    if price.fract() == 0.0 {
        format!("{price:.0} €")
    } else {
        format!("{price:.2} €")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_price_plain_and_symbol() {
        assert_eq!(parse_price("50"), Ok(50.0));
        assert_eq!(parse_price("50€"), Ok(50.0));
        assert_eq!(parse_price(" 50 € "), Ok(50.0));
        assert_eq!(parse_price("50 euros"), Ok(50.0));
        assert_eq!(parse_price("$20"), Ok(20.0));
    }

    #[test]
    fn test_parse_price_separators() {
        assert_eq!(parse_price("12,5"), Ok(12.5));
        assert_eq!(parse_price("12.50"), Ok(12.5));
        assert_eq!(parse_price("1.200"), Ok(1200.0));
        assert_eq!(parse_price("1.200,50"), Ok(1200.5));
        assert_eq!(parse_price("1,200.50"), Ok(1200.5));
        assert!(parse_price("1.000.000,00").is_err());
        assert_eq!(parse_price("0,99"), Ok(0.99));
    }

    #[test]
    fn test_parse_price_giveaway() {
        assert_eq!(parse_price("0"), Ok(0.0));
        assert_eq!(parse_price("gratis"), Ok(0.0));
        assert_eq!(parse_price("Free"), Ok(0.0));
    }

    #[test]
    fn test_parse_price_rejects_garbage() {
        assert!(parse_price("").is_err());
        assert!(parse_price("cheap").is_err());
        assert!(parse_price("-5").is_err());
        assert!(parse_price("€").is_err());
        assert!(parse_price(".").is_err());
        assert_eq!(parse_price("abc"), Err(InputError::Price("abc".into())));
    }

    #[test]
    fn test_postal_code() {
        assert_eq!(validate_postal_code(" 28001 "), Ok("28001".into()));
        assert!(validate_postal_code("2800").is_err());
        assert!(validate_postal_code("28A01").is_err());
    }

    #[test]
    fn test_yes_no() {
        assert_eq!(parse_yes_no("Yes"), Ok(true));
        assert_eq!(parse_yes_no("sí"), Ok(true));
        assert_eq!(parse_yes_no("n"), Ok(false));
        assert_eq!(parse_yes_no("maybe"), Err(InputError::YesNo));
    }

    #[test]
    fn test_email() {
        assert_eq!(validate_email("Me@Example.com"), Ok("me@example.com".into()));
        assert!(validate_email("me@example").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("me @example.com").is_err());
    }

    #[test]
    fn test_format_price() {
        assert_eq!(format_price(50.0), "50 €");
        assert_eq!(format_price(12.5), "12.50 €");
    }
}
