//! Boundary checks shared by the wallet service and the reconciler.

use bigdecimal::{BigDecimal, Zero};
use regex::Regex;
use serde_json::Value as JsonValue;
use std::sync::LazyLock;

use crate::error::{AppError, AppResult, ValidationError};
use crate::payments::types::decimal_from_json;

static TX_REF_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]{0,99}$").expect("tx_ref pattern is valid")
});

pub fn validate_tx_ref(tx_ref: &str) -> AppResult<()> {
    if TX_REF_PATTERN.is_match(tx_ref) {
        Ok(())
    } else {
        Err(AppError::validation(ValidationError::InvalidReference {
            reference: tx_ref.chars().take(100).collect(),
            reason: "must be 1-100 letters, digits, '.', '_' or '-'".to_string(),
        }))
    }
}

/// Accepts `100`, `100.5` or `"100.50"`.
pub fn parse_amount(value: Option<&JsonValue>) -> AppResult<BigDecimal> {
    let value = match value {
        Some(JsonValue::Null) | None => return Err(AppError::missing_field("amount")),
        Some(v) => v,
    };

    let amount = decimal_from_json(value).ok_or_else(|| {
        AppError::validation(ValidationError::InvalidAmount {
            amount: value.to_string(),
            reason: "not a number".to_string(),
        })
    })?;
    validate_amount(&amount)?;
    Ok(amount)
}

/// Positive, ETB, at most two fractional digits.
pub fn validate_amount(amount: &BigDecimal) -> AppResult<()> {
    if amount <= &BigDecimal::zero() {
        return Err(AppError::validation(ValidationError::InvalidAmount {
            amount: amount.to_string(),
            reason: "must be greater than zero".to_string(),
        }));
    }
    if amount.with_scale(2) != *amount {
        return Err(AppError::validation(ValidationError::InvalidAmount {
            amount: amount.to_string(),
            reason: "must have at most 2 decimal places".to_string(),
        }));
    }
    Ok(())
}

pub fn require_text(field: &str, value: Option<&str>) -> AppResult<String> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(AppError::missing_field(field)),
    }
}

pub fn validate_email(email: &str) -> AppResult<()> {
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.')
        }
        None => false,
    };

    if valid && !email.chars().any(char::is_whitespace) {
        Ok(())
    } else {
        Err(AppError::validation(ValidationError::InvalidField {
            field: "email".to_string(),
            reason: "not a valid email address".to_string(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_tx_ref_format() {
        assert!(validate_tx_ref("DEP-0f8e1c2a").is_ok());
        assert!(validate_tx_ref("chapa.ref_1").is_ok());
        assert!(validate_tx_ref("").is_err());
        assert!(validate_tx_ref("-leading-dash").is_err());
        assert!(validate_tx_ref("has space").is_err());
        assert!(validate_tx_ref(&"a".repeat(101)).is_err());
        assert!(validate_tx_ref(&"a".repeat(100)).is_ok());
    }

    #[test]
    fn test_amount_rules() {
        assert!(validate_amount(&BigDecimal::from(100)).is_ok());
        assert!(validate_amount(&BigDecimal::from_str("99.99").unwrap()).is_ok());
        assert!(validate_amount(&BigDecimal::from_str("10.50").unwrap()).is_ok());

        let err = validate_amount(&BigDecimal::from(0)).unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert!(validate_amount(&BigDecimal::from(-5)).is_err());
        assert!(validate_amount(&BigDecimal::from_str("1.005").unwrap()).is_err());
    }

    #[test]
    fn test_parse_amount_from_json() {
        use serde_json::json;

        assert_eq!(parse_amount(Some(&json!(100))).unwrap(), BigDecimal::from(100));
        assert_eq!(
            parse_amount(Some(&json!("25.50"))).unwrap(),
            BigDecimal::from_str("25.5").unwrap()
        );
        assert!(parse_amount(None).is_err());
        assert!(parse_amount(Some(&json!(null))).is_err());
        assert!(parse_amount(Some(&json!("ten"))).is_err());
        assert!(parse_amount(Some(&json!(-1))).is_err());
    }

    #[test]
    fn test_required_text_and_email() {
        assert_eq!(require_text("email", Some("  a@b.co ")).unwrap(), "a@b.co");
        assert!(require_text("email", Some("   ")).is_err());
        assert!(require_text("email", None).is_err());

        assert!(validate_email("player@example.com").is_ok());
        assert!(validate_email("player@localhost").is_err());
        assert!(validate_email("no-at-sign").is_err());
    }
}
