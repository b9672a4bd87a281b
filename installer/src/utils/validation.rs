// Input validation utilities
//
// Field-level rules shared by the domain settings. Every helper returns the
// operator-facing message on failure so callers can drop it straight into an
// error map keyed by field name.

use regex::Regex;
use std::sync::OnceLock;

fn email_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("static e-mail regex"))
}

fn username_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_.\-]+$").expect("static username regex"))
}

/// Require a non-blank value.
pub fn validate_required(value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err("This value is required.".to_string());
    }
    Ok(())
}

/// Validate an optional TCP port (empty is accepted).
pub fn validate_optional_port(value: &str) -> Result<(), String> {
    let v = value.trim();
    if v.is_empty() {
        return Ok(());
    }
    match v.parse::<u32>() {
        Ok(p) if (1..=65535).contains(&p) => Ok(()),
        _ => Err("Port must be a number between 1 and 65535.".to_string()),
    }
}

pub fn validate_email(value: &str) -> Result<(), String> {
    validate_required(value)?;
    if !email_regex().is_match(value.trim()) {
        return Err("This value is not a valid e-mail address.".to_string());
    }
    Ok(())
}

/// Validate an optional absolute http(s) URL (empty is accepted).
pub fn validate_optional_url(value: &str) -> Result<(), String> {
    let v = value.trim();
    if v.is_empty() {
        return Ok(());
    }
    match url::Url::parse(v) {
        Ok(u) if u.scheme() == "http" || u.scheme() == "https" => Ok(()),
        _ => Err("This value is not a valid URL (http:// or https://).".to_string()),
    }
}

pub fn validate_username(value: &str) -> Result<(), String> {
    validate_required(value)?;
    let v = value.trim();
    if v.chars().count() < 3 || v.chars().count() > 50 {
        return Err("Username must be between 3 and 50 characters.".to_string());
    }
    if !username_regex().is_match(v) {
        return Err(
            "Username may only contain letters, digits, dots, dashes and underscores.".to_string(),
        );
    }
    Ok(())
}

pub fn validate_password(value: &str) -> Result<(), String> {
    validate_required(value)?;
    if value.chars().count() < 8 {
        return Err("Password must be at least 8 characters long.".to_string());
    }
    Ok(())
}

/// Validate database name (SQL Server)
pub fn validate_sql_server_database_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("Database name cannot be empty.".to_string());
    }

    if name.chars().count() > 128 {
        return Err("Database name cannot exceed 128 characters.".to_string());
    }

    if name.starts_with(' ') || name.ends_with(' ') {
        return Err("Database name cannot start or end with spaces.".to_string());
    }

    let invalid_chars = ['<', '>', ':', '"', '/', '\\', '|', '?', '*'];
    if name.chars().any(|c| invalid_chars.contains(&c)) {
        return Err("Database name contains invalid characters.".to_string());
    }

    Ok(())
}

/// Validate database name (PostgreSQL)
pub fn validate_postgres_database_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("Database name cannot be empty.".to_string());
    }

    // NAMEDATALEN - 1
    if name.len() > 63 {
        return Err("Database name cannot exceed 63 characters.".to_string());
    }

    if name.contains('\0') {
        return Err("Database name cannot contain null bytes.".to_string());
    }

    Ok(())
}

/// Validate a value against a closed set (empty allowed when `allow_empty`).
pub fn validate_choice(value: &str, choices: &[&str], allow_empty: bool) -> Result<(), String> {
    let v = value.trim();
    if v.is_empty() && allow_empty {
        return Ok(());
    }
    if choices.iter().any(|c| c.eq_ignore_ascii_case(v)) {
        return Ok(());
    }
    Err(format!(
        "This value is not valid (expected one of: {}).",
        choices.join(", ")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optional_port_accepts_empty_and_range() {
        assert!(validate_optional_port("").is_ok());
        assert!(validate_optional_port("5432").is_ok());
        assert!(validate_optional_port("0").is_err());
        assert!(validate_optional_port("70000").is_err());
        assert!(validate_optional_port("abc").is_err());
    }

    #[test]
    fn email_requires_at_and_domain() {
        assert!(validate_email("admin@example.org").is_ok());
        assert!(validate_email("admin").is_err());
        assert!(validate_email("admin@localhost").is_err());
        assert!(validate_email("   ").is_err());
    }

    #[test]
    fn url_must_be_http_or_https() {
        assert!(validate_optional_url("").is_ok());
        assert!(validate_optional_url("https://example.org").is_ok());
        assert!(validate_optional_url("ftp://example.org").is_err());
        assert!(validate_optional_url("example.org").is_err());
    }

    #[test]
    fn sql_server_database_name_rejects_reserved_characters() {
        assert!(validate_sql_server_database_name("platform").is_ok());
        assert!(validate_sql_server_database_name("plat/form").is_err());
        assert!(validate_sql_server_database_name(" platform").is_err());
        assert!(validate_sql_server_database_name(&"x".repeat(129)).is_err());
    }

    #[test]
    fn postgres_database_name_length_limit() {
        assert!(validate_postgres_database_name(&"x".repeat(63)).is_ok());
        assert!(validate_postgres_database_name(&"x".repeat(64)).is_err());
    }

    #[test]
    fn username_rules() {
        assert!(validate_username("jdoe").is_ok());
        assert!(validate_username("jd").is_err());
        assert!(validate_username("j doe").is_err());
    }

    #[test]
    fn choice_is_case_insensitive() {
        assert!(validate_choice("TLS", &["tls", "ssl"], true).is_ok());
        assert!(validate_choice("", &["tls", "ssl"], true).is_ok());
        assert!(validate_choice("", &["tls", "ssl"], false).is_err());
        assert!(validate_choice("starttls", &["tls", "ssl"], true).is_err());
    }
}
