// Step graph
//
// language -> requirements -> database -> platform -> admin -> mailing -> install -> done
// mailing also exits through skip-mailing; install ends in done or failed(log).
// The graph is fixed: transitions are a pure function of (step, event).

pub mod controller;

use crate::models::settings::TRANSPORT_SENDMAIL;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    Language,
    Requirements,
    Database,
    Platform,
    Admin,
    Mailing,
    Install,
}

impl Step {
    pub const ALL: [Step; 7] = [
        Step::Language,
        Step::Requirements,
        Step::Database,
        Step::Platform,
        Step::Admin,
        Step::Mailing,
        Step::Install,
    ];

    /// Route of the step, relative to the base path.
    pub fn path(self) -> &'static str {
        match self {
            Step::Language => "/",
            Step::Requirements => "/requirements",
            Step::Database => "/database",
            Step::Platform => "/platform",
            Step::Admin => "/admin",
            Step::Mailing => "/mailing",
            Step::Install => "/install",
        }
    }

    pub fn from_path(path: &str) -> Option<Step> {
        match path {
            "/" | "/language" => Some(Step::Language),
            _ => Step::ALL.iter().copied().find(|s| s.path() == path),
        }
    }

    /// Translation key of the step title.
    pub fn title_key(self) -> &'static str {
        match self {
            Step::Language => "welcome",
            Step::Requirements => "requirements_check",
            Step::Database => "database_parameters",
            Step::Platform => "platform_parameters",
            Step::Admin => "admin_user",
            Step::Mailing => "mail_server",
            Step::Install => "installation",
        }
    }

    /// Forward successor; `None` after install.
    pub fn next(self) -> Option<Step> {
        match self {
            Step::Language => Some(Step::Requirements),
            Step::Requirements => Some(Step::Database),
            Step::Database => Some(Step::Platform),
            Step::Platform => Some(Step::Admin),
            Step::Admin => Some(Step::Mailing),
            Step::Mailing => Some(Step::Install),
            Step::Install => None,
        }
    }
}

/// Outcome of a submit, as seen by the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Input accepted (and verified where the step verifies)
    Accepted,
    /// Field errors or a failed check; the step re-renders
    Rejected,
    /// Mailing transport switched; the mailing step re-renders with fresh options
    TransportChanged,
    SkipMailing,
    InstallFinished {
        succeeded: bool,
        log_filename: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    Step(Step),
    Failed { log_filename: String },
    Done,
}

impl Location {
    /// Route relative to the base path; `done_path` is where a finished install goes.
    pub fn path(&self, done_path: &str) -> String {
        match self {
            Location::Step(step) => step.path().to_string(),
            Location::Failed { log_filename } => format!("/error/{}", log_filename),
            Location::Done => done_path.to_string(),
        }
    }
}

pub fn transition(step: Step, event: Event) -> Location {
    match (step, event) {
        (Step::Mailing, Event::SkipMailing) => Location::Step(Step::Install),
        (Step::Mailing, Event::TransportChanged) => Location::Step(Step::Mailing),
        (Step::Install, Event::InstallFinished { succeeded: true, .. }) => Location::Done,
        (Step::Install, Event::InstallFinished { log_filename, .. }) => {
            Location::Failed { log_filename }
        }
        (step, Event::Accepted) => step.next().map_or(Location::Done, Location::Step),
        (step, _) => Location::Step(step),
    }
}

/// Canonical transport id for a posted transport label.
pub fn resolve_transport_id(label: &str) -> String {
    let id = label.to_lowercase();
    if id == "sendmail / postfix" {
        TRANSPORT_SENDMAIL.to_string()
    } else {
        id
    }
}
