// Domain settings objects
//
// Each domain (database, platform, first admin, mailing) binds a posted field
// map and validates itself into a field -> message map. Validation is pure: it
// only reads the bound values, so repeated calls return the same errors.

use crate::i18n;
use crate::utils::validation::{
    validate_choice, validate_email, validate_optional_port, validate_optional_url,
    validate_password, validate_postgres_database_name, validate_required,
    validate_sql_server_database_name, validate_username,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Posted form data, keyed by field name.
pub type FieldMap = BTreeMap<String, String>;

/// Field-level validation errors, keyed by field name.
pub type ValidationErrors = BTreeMap<String, String>;

pub trait DomainSettings {
    /// Overwrite the known fields present in `data`; other keys are ignored.
    fn bind_data(&mut self, data: &FieldMap);

    fn validate(&self) -> ValidationErrors;
}

fn bind_field(data: &FieldMap, key: &str, target: &mut String) {
    if let Some(v) = data.get(key) {
        *target = v.clone();
    }
}

fn check(errors: &mut ValidationErrors, field: &str, result: Result<(), String>) {
    if let Err(msg) = result {
        errors.entry(field.to_string()).or_insert(msg);
    }
}

// =========================
// Database
// =========================

pub const DATABASE_DRIVERS: &[&str] = &["postgres", "sqlserver"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub driver: String,
    pub host: String,
    pub port: String,
    pub name: String,
    pub user: String,
    pub password: String,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            driver: "postgres".to_string(),
            host: "localhost".to_string(),
            port: String::new(),
            name: "platform".to_string(),
            user: "root".to_string(),
            password: String::new(),
        }
    }
}

impl DatabaseSettings {
    pub fn engine(&self) -> &str {
        self.driver.trim()
    }

    /// Explicit port, or the driver's default.
    pub fn port_or_default(&self) -> u16 {
        self.port.trim().parse::<u16>().unwrap_or(match self.engine() {
            "sqlserver" => 1433,
            _ => 5432,
        })
    }
}

impl DomainSettings for DatabaseSettings {
    fn bind_data(&mut self, data: &FieldMap) {
        bind_field(data, "driver", &mut self.driver);
        bind_field(data, "host", &mut self.host);
        bind_field(data, "port", &mut self.port);
        bind_field(data, "name", &mut self.name);
        bind_field(data, "user", &mut self.user);
        bind_field(data, "password", &mut self.password);
    }

    fn validate(&self) -> ValidationErrors {
        let mut errors = ValidationErrors::new();
        check(
            &mut errors,
            "driver",
            validate_choice(&self.driver, DATABASE_DRIVERS, false),
        );
        check(&mut errors, "host", validate_required(&self.host));
        check(&mut errors, "port", validate_optional_port(&self.port));
        check(&mut errors, "name", validate_required(&self.name));
        let name_rule = match self.engine() {
            "sqlserver" => validate_sql_server_database_name(self.name.trim()),
            _ => validate_postgres_database_name(self.name.trim()),
        };
        check(&mut errors, "name", name_rule);
        check(&mut errors, "user", validate_required(&self.user));
        errors
    }
}

// =========================
// Platform
// =========================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformSettings {
    pub name: String,
    pub support_email: String,
    pub language: Option<String>,
    pub organization: String,
    pub organization_url: String,
}

impl PlatformSettings {
    pub fn language(&self) -> Option<&str> {
        self.language.as_deref().filter(|l| !l.trim().is_empty())
    }

    pub fn set_language(&mut self, language: impl Into<String>) {
        self.language = Some(language.into());
    }
}

impl DomainSettings for PlatformSettings {
    fn bind_data(&mut self, data: &FieldMap) {
        bind_field(data, "name", &mut self.name);
        bind_field(data, "support_email", &mut self.support_email);
        if let Some(lang) = data.get("language") {
            self.language = Some(lang.clone());
        }
        bind_field(data, "organization", &mut self.organization);
        bind_field(data, "organization_url", &mut self.organization_url);
    }

    fn validate(&self) -> ValidationErrors {
        let mut errors = ValidationErrors::new();
        check(&mut errors, "name", validate_required(&self.name));
        check(
            &mut errors,
            "support_email",
            validate_email(&self.support_email),
        );
        match self.language() {
            None => check(&mut errors, "language", validate_required("")),
            Some(lang) if !i18n::is_available_language(lang) => {
                check(
                    &mut errors,
                    "language",
                    Err("This language is not available.".to_string()),
                );
            }
            Some(_) => {}
        }
        check(
            &mut errors,
            "organization_url",
            validate_optional_url(&self.organization_url),
        );
        errors
    }
}

// =========================
// First administrator
// =========================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminSettings {
    pub first_name: String,
    pub last_name: String,
    pub username: String,
    pub password: String,
    pub password_confirmation: String,
    pub email: String,
}

impl DomainSettings for AdminSettings {
    fn bind_data(&mut self, data: &FieldMap) {
        bind_field(data, "first_name", &mut self.first_name);
        bind_field(data, "last_name", &mut self.last_name);
        bind_field(data, "username", &mut self.username);
        bind_field(data, "password", &mut self.password);
        bind_field(data, "password_confirmation", &mut self.password_confirmation);
        bind_field(data, "email", &mut self.email);
    }

    fn validate(&self) -> ValidationErrors {
        let mut errors = ValidationErrors::new();
        check(&mut errors, "first_name", validate_required(&self.first_name));
        check(&mut errors, "last_name", validate_required(&self.last_name));
        check(&mut errors, "username", validate_username(&self.username));
        check(&mut errors, "password", validate_password(&self.password));
        if self.password != self.password_confirmation {
            check(
                &mut errors,
                "password_confirmation",
                Err("The passwords do not match.".to_string()),
            );
        }
        check(&mut errors, "email", validate_email(&self.email));
        errors
    }
}

// =========================
// Mailing
// =========================

pub const TRANSPORT_SMTP: &str = "smtp";
pub const TRANSPORT_GMAIL: &str = "gmail";
pub const TRANSPORT_SENDMAIL: &str = "sendmail";

/// Transport labels offered on the mailing step, in display order.
pub const TRANSPORT_LABELS: &[&str] = &["SMTP", "Gmail", "Sendmail / Postfix"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MailingSettings {
    transport: String,
    transport_options: FieldMap,
}

impl Default for MailingSettings {
    fn default() -> Self {
        Self {
            transport: TRANSPORT_SMTP.to_string(),
            transport_options: FieldMap::new(),
        }
    }
}

impl MailingSettings {
    pub fn transport(&self) -> &str {
        &self.transport
    }

    /// Select a transport. Options belong to the previous transport, so they are dropped.
    pub fn set_transport(&mut self, transport: impl Into<String>) {
        self.transport = transport.into();
        self.transport_options.clear();
    }

    pub fn transport_options(&self) -> &FieldMap {
        &self.transport_options
    }

    pub fn set_transport_options(&mut self, options: FieldMap) {
        self.transport_options = options;
    }

    pub fn option(&self, key: &str) -> &str {
        self.transport_options
            .get(key)
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Option field names shown for the current transport.
    pub fn option_fields(&self) -> &'static [&'static str] {
        option_fields_for(&self.transport)
    }
}

pub fn option_fields_for(transport: &str) -> &'static [&'static str] {
    match transport {
        TRANSPORT_SMTP => &["host", "port", "encryption", "auth_mode", "username", "password"],
        TRANSPORT_GMAIL => &["username", "password"],
        _ => &[],
    }
}

impl DomainSettings for MailingSettings {
    fn bind_data(&mut self, data: &FieldMap) {
        self.set_transport_options(data.clone());
    }

    fn validate(&self) -> ValidationErrors {
        let mut errors = ValidationErrors::new();
        match self.transport.as_str() {
            TRANSPORT_SMTP => {
                check(&mut errors, "host", validate_required(self.option("host")));
                check(&mut errors, "port", validate_optional_port(self.option("port")));
                check(
                    &mut errors,
                    "encryption",
                    validate_choice(self.option("encryption"), &["tls", "ssl"], true),
                );
                check(
                    &mut errors,
                    "auth_mode",
                    validate_choice(
                        self.option("auth_mode"),
                        &["plain", "login", "cram-md5"],
                        true,
                    ),
                );
            }
            TRANSPORT_GMAIL => {
                check(&mut errors, "username", validate_email(self.option("username")));
                check(
                    &mut errors,
                    "password",
                    validate_required(self.option("password")),
                );
            }
            TRANSPORT_SENDMAIL => {}
            other => {
                check(
                    &mut errors,
                    "transport",
                    Err(format!("Unsupported mail transport '{}'.", other)),
                );
            }
        }
        errors
    }
}
