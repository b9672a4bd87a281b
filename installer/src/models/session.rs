// Wizard session (settings store)
//
// Holds every domain's settings plus its latest validation state. This is a
// plain data holder: it never validates, and each domain's settings, field
// errors and global error are separate slots that can be cleared independently.

use super::settings::{
    AdminSettings, DatabaseSettings, MailingSettings, PlatformSettings, ValidationErrors,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WizardSession {
    install_language: String,
    country: String,
    database_settings: DatabaseSettings,
    database_global_error: Option<String>,
    database_validation_errors: ValidationErrors,
    platform_settings: PlatformSettings,
    platform_validation_errors: ValidationErrors,
    first_admin_settings: AdminSettings,
    first_admin_validation_errors: ValidationErrors,
    mailing_settings: MailingSettings,
    mailing_global_error: Option<String>,
    mailing_validation_errors: ValidationErrors,
}

impl Default for WizardSession {
    fn default() -> Self {
        Self::new("en", "US")
    }
}

impl WizardSession {
    pub fn new(install_language: &str, country: &str) -> Self {
        Self {
            install_language: install_language.to_string(),
            country: country.to_string(),
            database_settings: DatabaseSettings::default(),
            database_global_error: None,
            database_validation_errors: ValidationErrors::new(),
            platform_settings: PlatformSettings::default(),
            platform_validation_errors: ValidationErrors::new(),
            first_admin_settings: AdminSettings::default(),
            first_admin_validation_errors: ValidationErrors::new(),
            mailing_settings: MailingSettings::default(),
            mailing_global_error: None,
            mailing_validation_errors: ValidationErrors::new(),
        }
    }

    pub fn install_language(&self) -> &str {
        &self.install_language
    }

    pub fn set_install_language(&mut self, language: impl Into<String>) {
        self.install_language = language.into();
    }

    pub fn country(&self) -> &str {
        &self.country
    }

    pub fn set_country(&mut self, country: impl Into<String>) {
        self.country = country.into();
    }

    // Database

    pub fn database_settings(&self) -> &DatabaseSettings {
        &self.database_settings
    }

    pub fn database_settings_mut(&mut self) -> &mut DatabaseSettings {
        &mut self.database_settings
    }

    pub fn database_global_error(&self) -> Option<&str> {
        self.database_global_error.as_deref()
    }

    pub fn set_database_global_error(&mut self, error: Option<String>) {
        self.database_global_error = error;
    }

    pub fn database_validation_errors(&self) -> &ValidationErrors {
        &self.database_validation_errors
    }

    pub fn set_database_validation_errors(&mut self, errors: ValidationErrors) {
        self.database_validation_errors = errors;
    }

    // Platform

    pub fn platform_settings(&self) -> &PlatformSettings {
        &self.platform_settings
    }

    pub fn platform_settings_mut(&mut self) -> &mut PlatformSettings {
        &mut self.platform_settings
    }

    pub fn platform_validation_errors(&self) -> &ValidationErrors {
        &self.platform_validation_errors
    }

    pub fn set_platform_validation_errors(&mut self, errors: ValidationErrors) {
        self.platform_validation_errors = errors;
    }

    // First admin

    pub fn first_admin_settings(&self) -> &AdminSettings {
        &self.first_admin_settings
    }

    pub fn first_admin_settings_mut(&mut self) -> &mut AdminSettings {
        &mut self.first_admin_settings
    }

    pub fn first_admin_validation_errors(&self) -> &ValidationErrors {
        &self.first_admin_validation_errors
    }

    pub fn set_first_admin_validation_errors(&mut self, errors: ValidationErrors) {
        self.first_admin_validation_errors = errors;
    }

    // Mailing

    pub fn mailing_settings(&self) -> &MailingSettings {
        &self.mailing_settings
    }

    pub fn mailing_settings_mut(&mut self) -> &mut MailingSettings {
        &mut self.mailing_settings
    }

    /// Replace the mailing settings with a fresh default instance.
    pub fn reinitialize_mailing_settings(&mut self) {
        self.mailing_settings = MailingSettings::default();
    }

    pub fn mailing_global_error(&self) -> Option<&str> {
        self.mailing_global_error.as_deref()
    }

    pub fn set_mailing_global_error(&mut self, error: Option<String>) {
        self.mailing_global_error = error;
    }

    pub fn mailing_validation_errors(&self) -> &ValidationErrors {
        &self.mailing_validation_errors
    }

    pub fn set_mailing_validation_errors(&mut self, errors: ValidationErrors) {
        self.mailing_validation_errors = errors;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_and_field_errors_are_independent_slots() {
        let mut session = WizardSession::default();
        let mut errors = ValidationErrors::new();
        errors.insert("host".to_string(), "required".to_string());
        session.set_database_validation_errors(errors.clone());
        session.set_database_global_error(Some("unreachable".to_string()));

        session.set_database_global_error(None);
        assert_eq!(session.database_validation_errors(), &errors);

        session.set_database_global_error(Some("unreachable".to_string()));
        session.set_database_validation_errors(ValidationErrors::new());
        assert_eq!(session.database_global_error(), Some("unreachable"));
    }

    #[test]
    fn domains_do_not_contaminate_each_other() {
        let mut session = WizardSession::default();
        session.set_mailing_global_error(Some("no smtp".to_string()));
        session.platform_settings_mut().name = "Campus".to_string();
        assert_eq!(session.database_global_error(), None);
        assert!(session.first_admin_settings().username.is_empty());
        assert_eq!(session.mailing_global_error(), Some("no smtp"));
    }

    #[test]
    fn session_survives_json_round_trip_with_missing_fields() {
        let restored: WizardSession =
            serde_json::from_str(r#"{"install_language":"fr"}"#).expect("partial session");
        assert_eq!(restored.install_language(), "fr");
        assert_eq!(restored.mailing_settings().transport(), "smtp");
    }
}
