// Live verification collaborators
//
// Each checker is a one-method capability so the wizard can run against the
// real implementations (environment audit, database connection, mail transport
// handshake) or against stubs in tests. Timeouts are enforced by the caller.

pub mod database;
pub mod mailing;
pub mod requirements;

use crate::models::settings::{DatabaseSettings, MailingSettings};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Failure returned by a live check.
/// Keeps the operator-facing message separate from internal details.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{user_message}")]
pub struct CheckFailure {
    /// Safe to show in the wizard (never contains credentials)
    pub user_message: String,
    /// Internal details for logging (already masked)
    pub internal_details: String,
}

impl CheckFailure {
    pub fn new(user_message: impl Into<String>, internal_details: impl Into<String>) -> Self {
        Self {
            user_message: user_message.into(),
            internal_details: internal_details.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequirementLevel {
    Recommended,
    Required,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingItem {
    pub description: String,
    pub level: RequirementLevel,
    pub passed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingCategory {
    pub name: String,
    pub items: Vec<SettingItem>,
}

/// Classified result of an environment audit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequirementReport {
    pub categories: Vec<SettingCategory>,
}

impl RequirementReport {
    fn has_failed(&self, level: RequirementLevel) -> bool {
        self.categories
            .iter()
            .flat_map(|c| c.items.iter())
            .any(|i| i.level == level && !i.passed)
    }

    pub fn has_failed_recommendation(&self) -> bool {
        self.has_failed(RequirementLevel::Recommended)
    }

    pub fn has_failed_requirement(&self) -> bool {
        self.has_failed(RequirementLevel::Required)
    }
}

#[async_trait]
pub trait RequirementChecker: Send + Sync {
    /// Audit the host and classify capabilities into ordered categories.
    async fn setting_categories(&self) -> Vec<SettingCategory>;
}

#[async_trait]
pub trait DatabaseChecker: Send + Sync {
    /// Open a live connection with the supplied credentials.
    async fn connect_to_database(&self, settings: &DatabaseSettings) -> Result<(), CheckFailure>;
}

#[async_trait]
pub trait MailingChecker: Send + Sync {
    /// Handshake with the selected mail transport.
    async fn test_transport(&self, settings: &MailingSettings) -> Result<(), CheckFailure>;
}
