use regex::Regex;
use std::sync::OnceLock;

static INTERNATIONAL: OnceLock<Regex> = OnceLock::new();

fn international() -> &'static Regex {
    INTERNATIONAL.get_or_init(|| Regex::new(r"^\+233\d{9}$").unwrap())
}

/// Normalizes a Ghanaian subscriber number to international format.
/// Accepts `0XXXXXXXXX`, `233XXXXXXXXX`, and `+233XXXXXXXXX`, with spaces
/// and dashes tolerated.
pub fn normalize_msisdn(raw: &str) -> Result<String, String> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect();

    let normalized = if let Some(rest) = cleaned.strip_prefix("+233") {
        format!("+233{}", rest)
    } else if let Some(rest) = cleaned.strip_prefix("233") {
        format!("+233{}", rest)
    } else if let Some(rest) = cleaned.strip_prefix('0') {
        format!("+233{}", rest)
    } else {
        cleaned.clone()
    };

    if international().is_match(&normalized) {
        Ok(normalized)
    } else {
        Err(format!("invalid Ghanaian phone number: {}", raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_format_is_normalized() {
        assert_eq!(normalize_msisdn("0241234567").unwrap(), "+233241234567");
    }

    #[test]
    fn bare_country_code_gains_plus() {
        assert_eq!(normalize_msisdn("233241234567").unwrap(), "+233241234567");
    }

    #[test]
    fn international_format_passes_through() {
        assert_eq!(normalize_msisdn("+233241234567").unwrap(), "+233241234567");
    }

    #[test]
    fn whitespace_and_dashes_are_tolerated() {
        assert_eq!(normalize_msisdn("024 123 4567").unwrap(), "+233241234567");
        assert_eq!(normalize_msisdn("024-123-4567").unwrap(), "+233241234567");
    }

    #[test]
    fn wrong_lengths_are_rejected()  {
        assert!(normalize_msisdn("02412345").is_err());
        assert!(normalize_msisdn("02412345678").is_err());
        assert!(normalize_msisdn("").is_err());
    }

    #[test]
    fn non_digits_are_rejected() {
        assert!(normalize_msisdn("02412345ab").is_err());
        assert!(normalize_msisdn("not a phone").is_err());
    }
}
