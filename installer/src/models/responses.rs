// View models handed from the controller to a front end
//
// Everything a page needs to render itself, already translated. Front ends
// never reach into the session directly.

use super::settings::ValidationErrors;
use crate::checkers::SettingCategory;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Choice {
    pub value: String,
    pub label: String,
}

impl Choice {
    pub fn new(value: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            label: label.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormField {
    pub name: String,
    pub value: String,
    /// Rendered masked; never echoed into logs
    pub secret: bool,
    /// Allowed values; empty means free text
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<String>,
}

impl FormField {
    pub fn text(name: &str, value: &str) -> Self {
        Self {
            name: name.to_string(),
            value: value.to_string(),
            secret: false,
            choices: Vec::new(),
        }
    }

    pub fn secret(name: &str, value: &str) -> Self {
        Self {
            secret: true,
            ..Self::text(name, value)
        }
    }

    pub fn choice(name: &str, value: &str, choices: &[&str]) -> Self {
        Self {
            choices: choices.iter().map(|c| c.to_string()).collect(),
            ..Self::text(name, value)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormPage {
    pub fields: Vec<FormField>,
    pub errors: ValidationErrors,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub global_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LanguagePage {
    pub languages: Vec<Choice>,
    pub countries: Vec<Choice>,
    pub install_language: String,
    pub country: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequirementsPage {
    pub categories: Vec<SettingCategory>,
    pub has_failed_recommendation: bool,
    pub has_failed_requirement: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MailingPage {
    pub transport_labels: Vec<String>,
    /// Canonical id of the stored transport
    pub transport: String,
    pub form: FormPage,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedPage {
    pub log_filename: String,
    /// `None` when the log does not exist (or is unreadable)
    pub log: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum StepView {
    Language(LanguagePage),
    Requirements(RequirementsPage),
    Database(FormPage),
    Platform(FormPage),
    Admin(FormPage),
    Mailing(MailingPage),
    Install,
    Failed(FailedPage),
}

/// A rendered step: translated title plus its view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub title: String,
    pub view: StepView,
}

/// JSON body returned when a status query fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub error: String,
    pub kind: String,
}
