//! Request validation from declarative per-field rules.

use crate::case::to_camel_case;
use crate::dates::parse_instant;
use crate::error::AppError;
use crate::store::Record;
use regex::Regex;
use serde_json::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Format {
    Email,
    /// `YYYY-MM-DD` or an RFC 3339 timestamp.
    Date,
}

/// Whether a body is a full create or a partial update.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    Create,
    Update,
}

/// Rules for one field. Built with the chained constructors below.
#[derive(Clone, Debug, Default)]
pub struct ValidationRule {
    pub required: bool,
    pub not_blank: bool,
    pub format: Option<Format>,
    pub integer: bool,
    pub number: bool,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub pattern: Option<&'static str>,
    pub allowed: Option<&'static [&'static str]>,
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
}

impl ValidationRule {
    pub fn required() -> Self {
        ValidationRule {
            required: true,
            ..ValidationRule::default()
        }
    }

    pub fn optional() -> Self {
        ValidationRule::default()
    }

    pub fn not_blank(mut self) -> Self {
        self.not_blank = true;
        self
    }

    pub fn email(mut self) -> Self {
        self.format = Some(Format::Email);
        self
    }

    pub fn date(mut self) -> Self {
        self.format = Some(Format::Date);
        self
    }

    pub fn integer(mut self) -> Self {
        self.integer = true;
        self
    }

    pub fn number(mut self) -> Self {
        self.number = true;
        self
    }

    pub fn min_length(mut self, n: usize) -> Self {
        self.min_length = Some(n);
        self
    }

    pub fn max_length(mut self, n: usize) -> Self {
        self.max_length = Some(n);
        self
    }

    pub fn pattern(mut self, re: &'static str) -> Self {
        self.pattern = Some(re);
        self
    }

    pub fn one_of(mut self, allowed: &'static [&'static str]) -> Self {
        self.allowed = Some(allowed);
        self
    }

    pub fn minimum(mut self, min: f64) -> Self {
        self.minimum = Some(min);
        self
    }

    pub fn maximum(mut self, max: f64) -> Self {
        self.maximum = Some(max);
        self
    }
}

/// Field rules in the order they are checked. Field names are column names.
pub type Rules = Vec<(&'static str, ValidationRule)>;

pub struct RequestValidator;

impl RequestValidator {
    pub fn check(body: &Record, rules: &[(&'static str, ValidationRule)], mode: Mode) -> Result<(), AppError> {
        match mode {
            Mode::Create => Self::validate(body, rules),
            Mode::Update => Self::validate_partial(body, rules),
        }
    }

    /// Validate body against per-field rules. All required fields must be present.
    pub fn validate(body: &Record, rules: &[(&'static str, ValidationRule)]) -> Result<(), AppError> {
        for (col, rule) in rules {
            let val = body.get(*col).filter(|v| !v.is_null());
            if rule.required && val.is_none() {
                return Err(AppError::Validation(format!("{} is required", to_camel_case(col))));
            }
            if let Some(v) = val {
                validate_field(col, v, rule)?;
            }
        }
        Ok(())
    }

    /// Validate only the fields present in body (for PATCH). A required field may not be
    /// cleared to null.
    pub fn validate_partial(body: &Record, rules: &[(&'static str, ValidationRule)]) -> Result<(), AppError> {
        for (col, rule) in rules {
            let Some(v) = body.get(*col) else { continue };
            if v.is_null() {
                if rule.required {
                    return Err(AppError::Validation(format!("{} is required", to_camel_case(col))));
                }
                continue;
            }
            validate_field(col, v, rule)?;
        }
        Ok(())
    }
}

fn invalid(col: &str, what: impl std::fmt::Display) -> AppError {
    AppError::Validation(format!("{} {}", to_camel_case(col), what))
}

fn numeric(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

fn validate_field(col: &str, v: &Value, rule: &ValidationRule) -> Result<(), AppError> {
    if rule.not_blank && v.as_str().is_some_and(|s| s.trim().is_empty()) {
        return Err(invalid(col, "must not be blank"));
    }
    if let Some(format) = rule.format {
        validate_format(col, v, format)?;
    }
    if rule.integer {
        // Ids and counts are int8; anything outside i64 cannot be stored.
        let ok = match v {
            Value::Number(n) => n.is_i64(),
            Value::String(s) => s.trim().parse::<i64>().is_ok(),
            _ => false,
        };
        if !ok {
            return Err(invalid(col, "must be an integer"));
        }
    }
    if rule.number && numeric(v).is_none() {
        return Err(invalid(col, "must be a number"));
    }
    if let Some(s) = v.as_str() {
        let len = s.chars().count();
        if let Some(max) = rule.max_length {
            if len > max {
                return Err(invalid(col, format_args!("must be at most {} characters", max)));
            }
        }
        if let Some(min) = rule.min_length {
            if len < min {
                return Err(invalid(col, format_args!("must be at least {} characters", min)));
            }
        }
        if let Some(pattern) = rule.pattern {
            let re = Regex::new(pattern).map_err(|_| invalid(col, "has an invalid pattern rule"))?;
            if !re.is_match(s) {
                return Err(invalid(col, "does not match required pattern"));
            }
        }
    }
    if let Some(allowed) = rule.allowed {
        if !v.as_str().is_some_and(|s| allowed.contains(&s)) {
            return Err(invalid(col, format_args!("must be one of: {}", allowed.join(", "))));
        }
    }
    if let Some(n) = numeric(v) {
        if let Some(min) = rule.minimum {
            if n < min {
                return Err(invalid(col, format_args!("must be at least {}", min)));
            }
        }
        if let Some(max) = rule.maximum {
            if n > max {
                return Err(invalid(col, format_args!("must be at most {}", max)));
            }
        }
    }
    Ok(())
}

fn validate_format(col: &str, v: &Value, format: Format) -> Result<(), AppError> {
    let Some(s) = v.as_str() else {
        return Err(invalid(col, "must be a string"));
    };
    match format {
        Format::Email => {
            let s = s.trim();
            if !s.contains('@') || s.len() < 3 {
                return Err(invalid(col, "must be a valid email"));
            }
        }
        Format::Date => {
            if parse_instant(s).is_none() {
                return Err(invalid(col, "must be a valid date"));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn body(v: Value) -> Record {
        match v {
            Value::Object(m) => m,
            _ => unreachable!(),
        }
    }

    fn rules() -> Rules {
        vec![
            ("first_name", ValidationRule::required().not_blank().max_length(10)),
            ("email", ValidationRule::required().email()),
            ("owner_id", ValidationRule::required().integer()),
            ("birth_date", ValidationRule::optional().date()),
            ("price", ValidationRule::optional().number().minimum(0.0)),
            ("time_slot", ValidationRule::optional().one_of(&["09:00", "10:00"])),
            ("phone", ValidationRule::optional().pattern(r"^[0-9+ ]+$")),
        ]
    }

    fn message(err: AppError) -> String {
        match err {
            AppError::Validation(m) => m,
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn create_requires_fields_and_names_them_in_camel_case() {
        let b = body(json!({"email": "a@b.lt", "owner_id": 1}));
        let err = RequestValidator::check(&b, &rules(), Mode::Create).unwrap_err();
        assert_eq!(message(err), "firstName is required");

        let b = body(json!({"first_name": "  ", "email": "a@b.lt", "owner_id": 1}));
        let err = RequestValidator::validate(&b, &rules()).unwrap_err();
        assert_eq!(message(err), "firstName must not be blank");
    }

    #[test]
    fn update_checks_only_present_fields() {
        let b = body(json!({"price": -1}));
        let err = RequestValidator::check(&b, &rules(), Mode::Update).unwrap_err();
        assert_eq!(message(err), "price must be at least 0");

        let b = body(json!({"phone": "+370 600"}));
        assert!(RequestValidator::check(&b, &rules(), Mode::Update).is_ok());

        let b = body(json!({"email": null}));
        assert!(RequestValidator::check(&b, &rules(), Mode::Update).is_err());
    }

    #[test]
    fn type_and_format_rules() {
        let base = json!({"first_name": "Ona", "email": "ona@example.com", "owner_id": "12"});
        assert!(RequestValidator::validate(&body(base.clone()), &rules()).is_ok());

        let mut b = body(base.clone());
        b.insert("owner_id".into(), json!("twelve"));
        assert_eq!(message(RequestValidator::validate(&b, &rules()).unwrap_err()), "ownerId must be an integer");

        let mut b = body(base.clone());
        b.insert("owner_id".into(), json!(u64::MAX));
        assert_eq!(message(RequestValidator::validate(&b, &rules()).unwrap_err()), "ownerId must be an integer");

        let mut b = body(base.clone());
        b.insert("owner_id".into(), json!("18446744073709551615"));
        assert!(RequestValidator::validate(&b, &rules()).is_err());

        let mut b = body(base.clone());
        b.insert("owner_id".into(), json!(i64::MAX));
        assert!(RequestValidator::validate(&b, &rules()).is_ok());

        let mut b = body(base.clone());
        b.insert("birth_date".into(), json!("2020-13-01"));
        assert_eq!(message(RequestValidator::validate(&b, &rules()).unwrap_err()), "birthDate must be a valid date");

        let mut b = body(base.clone());
        b.insert("email".into(), json!("nope"));
        assert!(RequestValidator::validate(&b, &rules()).is_err());

        let mut b = body(base.clone());
        b.insert("time_slot".into(), json!("08:00"));
        assert_eq!(
            message(RequestValidator::validate(&b, &rules()).unwrap_err()),
            "timeSlot must be one of: 09:00, 10:00"
        );

        let mut b = body(base);
        b.insert("price".into(), json!("12.50"));
        assert!(RequestValidator::validate(&b, &rules()).is_ok());
    }
}
