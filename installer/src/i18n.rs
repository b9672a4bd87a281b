//! Active locale and the small message catalog used by the wizard pages.

use log::info;

/// Languages offered on the language step: (code, display name).
pub const AVAILABLE_LANGUAGES: &[(&str, &str)] = &[("en", "English"), ("fr", "Français")];

/// Countries offered on the language step: (ISO code, display name).
pub const AVAILABLE_COUNTRIES: &[(&str, &str)] = &[
    ("BE", "Belgium"),
    ("CA", "Canada"),
    ("CH", "Switzerland"),
    ("DE", "Germany"),
    ("ES", "Spain"),
    ("FR", "France"),
    ("GB", "United Kingdom"),
    ("IT", "Italy"),
    ("LU", "Luxembourg"),
    ("NL", "Netherlands"),
    ("US", "United States"),
];

const FALLBACK_LANGUAGE: &str = "en";

pub fn is_available_language(code: &str) -> bool {
    AVAILABLE_LANGUAGES
        .iter()
        .any(|(c, _)| c.eq_ignore_ascii_case(code.trim()))
}

#[derive(Debug, Clone)]
pub struct Translator {
    language: String,
}

impl Translator {
    pub fn new(language: &str) -> Self {
        let mut t = Self {
            language: FALLBACK_LANGUAGE.to_string(),
        };
        t.set_language(language);
        t
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    /// Switch the active locale. Unknown locales fall back to English.
    pub fn set_language(&mut self, language: &str) {
        let code = language.trim().to_ascii_lowercase();
        let next = if is_available_language(&code) {
            code
        } else {
            FALLBACK_LANGUAGE.to_string()
        };
        if next != self.language {
            info!(
                "[PHASE: wizard] [STEP: language] Active locale switched ({} -> {})",
                self.language, next
            );
        }
        self.language = next;
    }

    /// Look up `key` in the active catalog; unknown keys are returned as-is.
    pub fn trans(&self, key: &str) -> String {
        let hit = match self.language.as_str() {
            "fr" => french(key),
            _ => None,
        };
        hit.or_else(|| english(key))
            .map(str::to_string)
            .unwrap_or_else(|| key.to_string())
    }
}

impl Default for Translator {
    fn default() -> Self {
        Self::new(FALLBACK_LANGUAGE)
    }
}

fn english(key: &str) -> Option<&'static str> {
    Some(match key {
        "welcome" => "Welcome",
        "requirements_check" => "Requirements check",
        "database_parameters" => "Database parameters",
        "platform_parameters" => "Platform parameters",
        "admin_user" => "Administrator account",
        "mail_server" => "Mail server",
        "installation" => "Installation",
        "failed_install" => "Installation failed",
        "install_done" => "Installation complete",
        "next" => "Next",
        "submit" => "Submit",
        "skip" => "Skip",
        "install" => "Install",
        "quit" => "Quit",
        _ => return None,
    })
}

fn french(key: &str) -> Option<&'static str> {
    Some(match key {
        "welcome" => "Bienvenue",
        "requirements_check" => "Vérification de la configuration",
        "database_parameters" => "Paramètres de la base de données",
        "platform_parameters" => "Paramètres de la plateforme",
        "admin_user" => "Compte administrateur",
        "mail_server" => "Serveur de courrier",
        "installation" => "Installation",
        "failed_install" => "L'installation a échoué",
        "install_done" => "Installation terminée",
        "next" => "Suivant",
        "submit" => "Valider",
        "skip" => "Passer",
        "install" => "Installer",
        "quit" => "Quitter",
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_language_falls_back_to_english() {
        let t = Translator::new("tlh");
        assert_eq!(t.language(), "en");
        assert_eq!(t.trans("welcome"), "Welcome");
    }

    #[test]
    fn switching_language_changes_catalog() {
        let mut t = Translator::default();
        t.set_language("FR");
        assert_eq!(t.language(), "fr");
        assert_eq!(t.trans("welcome"), "Bienvenue");
        assert_eq!(t.trans("no_such_key"), "no_such_key");
    }
}
