// Step controller
//
// One show/submit pair per step. Submits bind posted fields into the session,
// validate, run the live check where the step has one, record errors in the
// session and return where the operator goes next. The session is the only
// state; it is passed in explicitly on every call.

use super::{resolve_transport_id, transition, Event, Location, Step};
use crate::checkers::{
    DatabaseChecker, MailingChecker, RequirementChecker, RequirementReport,
};
use crate::i18n::{Translator, AVAILABLE_COUNTRIES, AVAILABLE_LANGUAGES};
use crate::installation::install_log::record_setup_fault;
use crate::installation::status::{InstallStatus, InstallStatusReporter, StatusError};
use crate::installation::Installer;
use crate::models::responses::{
    Choice, FailedPage, FormField, FormPage, LanguagePage, MailingPage, Page, RequirementsPage,
    StepView,
};
use crate::models::session::WizardSession;
use crate::models::settings::{
    DomainSettings, FieldMap, ValidationErrors, DATABASE_DRIVERS, TRANSPORT_LABELS,
};
use crate::persistence::session_store::TransportSession;
use crate::persistence::writer::ParametersWriter;
use crate::utils::logging::mask_fields;
use log::{error, info, warn};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::time::{timeout, Duration};

/// External services the controller calls through their contracts.
#[derive(Clone)]
pub struct Collaborators {
    pub requirement_checker: Arc<dyn RequirementChecker>,
    pub database_checker: Arc<dyn DatabaseChecker>,
    pub mailing_checker: Arc<dyn MailingChecker>,
    pub installer: Arc<dyn Installer>,
    pub parameters_writer: Arc<dyn ParametersWriter>,
    pub transport_session: Arc<dyn TransportSession>,
}

pub struct StepController {
    collaborators: Collaborators,
    reporter: InstallStatusReporter,
    translator: Mutex<Translator>,
    database_timeout: Duration,
    mailing_timeout: Duration,
    default_language: String,
    default_country: String,
}

impl StepController {
    pub fn new(collaborators: Collaborators, reporter: InstallStatusReporter) -> Self {
        Self {
            collaborators,
            reporter,
            translator: Mutex::new(Translator::default()),
            database_timeout: Duration::from_secs(15),
            mailing_timeout: Duration::from_secs(15),
            default_language: "en".to_string(),
            default_country: "US".to_string(),
        }
    }

    pub fn with_timeouts(mut self, database: Duration, mailing: Duration) -> Self {
        self.database_timeout = database;
        self.mailing_timeout = mailing;
        self
    }

    pub fn with_defaults(mut self, language: &str, country: &str) -> Self {
        self.default_language = language.to_string();
        self.default_country = country.to_string();
        self
    }

    /// A session as created at wizard start.
    pub fn fresh_session(&self) -> WizardSession {
        WizardSession::new(&self.default_language, &self.default_country)
    }

    /// Translate `key` in the session's locale.
    pub fn trans(&self, session: &WizardSession, key: &str) -> String {
        let mut translator = self.translator.lock().unwrap_or_else(PoisonError::into_inner);
        translator.set_language(session.install_language());
        translator.trans(key)
    }

    fn page(&self, session: &WizardSession, step: Step, view: StepView) -> Page {
        Page {
            title: self.trans(session, step.title_key()),
            view,
        }
    }

    // =========================
    // Language
    // =========================

    pub fn show_language(&self, session: &WizardSession) -> Page {
        let view = StepView::Language(LanguagePage {
            languages: AVAILABLE_LANGUAGES
                .iter()
                .map(|(code, name)| Choice::new(*code, *name))
                .collect(),
            countries: AVAILABLE_COUNTRIES
                .iter()
                .map(|(code, name)| Choice::new(*code, *name))
                .collect(),
            install_language: session.install_language().to_string(),
            country: session.country().to_string(),
        });
        self.page(session, Step::Language, view)
    }

    pub fn submit_language(&self, session: &mut WizardSession, form: &FieldMap) -> Location {
        if let Some(language) = form.get("install_language") {
            session.set_install_language(language.trim());
        }
        if let Some(country) = form.get("country") {
            session.set_country(country.trim());
        }
        self.translator
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .set_language(session.install_language());
        info!(
            "[PHASE: wizard] [STEP: language] Language selected (language={}, country={})",
            session.install_language(),
            session.country()
        );
        transition(Step::Language, Event::Accepted)
    }

    // =========================
    // Requirements
    // =========================

    pub async fn show_requirements(&self, session: &WizardSession) -> Page {
        let report = RequirementReport {
            categories: self.collaborators.requirement_checker.setting_categories().await,
        };
        let view = StepView::Requirements(RequirementsPage {
            has_failed_recommendation: report.has_failed_recommendation(),
            has_failed_requirement: report.has_failed_requirement(),
            categories: report.categories,
        });
        self.page(session, Step::Requirements, view)
    }

    // =========================
    // Database
    // =========================

    pub fn show_database(&self, session: &WizardSession) -> Page {
        let s = session.database_settings();
        let view = StepView::Database(FormPage {
            fields: vec![
                FormField::choice("driver", &s.driver, DATABASE_DRIVERS),
                FormField::text("host", &s.host),
                FormField::text("port", &s.port),
                FormField::text("name", &s.name),
                FormField::text("user", &s.user),
                FormField::secret("password", &s.password),
            ],
            errors: session.database_validation_errors().clone(),
            global_error: session.database_global_error().map(str::to_string),
        });
        self.page(session, Step::Database, view)
    }

    pub async fn submit_database(&self, session: &mut WizardSession, form: &FieldMap) -> Location {
        info!(
            "[PHASE: wizard] [STEP: database] Submitted {}",
            mask_fields(form)
        );
        session.database_settings_mut().bind_data(form);
        let errors = session.database_settings().validate();
        let valid = errors.is_empty();
        session.set_database_validation_errors(errors);
        if !valid {
            return transition(Step::Database, Event::Rejected);
        }

        let check = timeout(
            self.database_timeout,
            self.collaborators
                .database_checker
                .connect_to_database(session.database_settings()),
        )
        .await;
        let failure = match check {
            Ok(Ok(())) => None,
            Ok(Err(failure)) => {
                warn!(
                    "[PHASE: wizard] [STEP: database] Check failed: {}",
                    failure.internal_details
                );
                Some(failure.user_message)
            }
            Err(_) => {
                warn!(
                    "[PHASE: wizard] [STEP: database] Check timed out after {}ms",
                    self.database_timeout.as_millis()
                );
                Some(format!(
                    "The database server did not answer within {} seconds.",
                    self.database_timeout.as_secs()
                ))
            }
        };

        match failure {
            Some(message) => {
                session.set_database_global_error(Some(message));
                transition(Step::Database, Event::Rejected)
            }
            None => {
                session.set_database_global_error(None);
                transition(Step::Database, Event::Accepted)
            }
        }
    }

    // =========================
    // Platform
    // =========================

    /// Shows the platform step; a platform without a language inherits the install language.
    pub fn show_platform(&self, session: &mut WizardSession) -> Page {
        if session.platform_settings().language().is_none() {
            let language = session.install_language().to_string();
            session.platform_settings_mut().set_language(language);
        }
        let s = session.platform_settings();
        let languages: Vec<&str> = AVAILABLE_LANGUAGES.iter().map(|(code, _)| *code).collect();
        let view = StepView::Platform(FormPage {
            fields: vec![
                FormField::text("name", &s.name),
                FormField::text("support_email", &s.support_email),
                FormField::choice("language", s.language().unwrap_or(""), &languages),
                FormField::text("organization", &s.organization),
                FormField::text("organization_url", &s.organization_url),
            ],
            errors: session.platform_validation_errors().clone(),
            global_error: None,
        });
        self.page(session, Step::Platform, view)
    }

    pub fn submit_platform(&self, session: &mut WizardSession, form: &FieldMap) -> Location {
        info!(
            "[PHASE: wizard] [STEP: platform] Submitted {}",
            mask_fields(form)
        );
        session.platform_settings_mut().bind_data(form);
        let errors = session.platform_settings().validate();
        let valid = errors.is_empty();
        session.set_platform_validation_errors(errors);
        let event = if valid { Event::Accepted } else { Event::Rejected };
        transition(Step::Platform, event)
    }

    // =========================
    // First administrator
    // =========================

    pub fn show_admin(&self, session: &WizardSession) -> Page {
        let s = session.first_admin_settings();
        let view = StepView::Admin(FormPage {
            fields: vec![
                FormField::text("first_name", &s.first_name),
                FormField::text("last_name", &s.last_name),
                FormField::text("username", &s.username),
                FormField::secret("password", &s.password),
                FormField::secret("password_confirmation", &s.password_confirmation),
                FormField::text("email", &s.email),
            ],
            errors: session.first_admin_validation_errors().clone(),
            global_error: None,
        });
        self.page(session, Step::Admin, view)
    }

    pub fn submit_admin(&self, session: &mut WizardSession, form: &FieldMap) -> Location {
        info!(
            "[PHASE: wizard] [STEP: admin] Submitted {}",
            mask_fields(form)
        );
        session.first_admin_settings_mut().bind_data(form);
        let errors = session.first_admin_settings().validate();
        let valid = errors.is_empty();
        session.set_first_admin_validation_errors(errors);
        let event = if valid { Event::Accepted } else { Event::Rejected };
        transition(Step::Admin, event)
    }

    // =========================
    // Mailing
    // =========================

    pub fn show_mailing(&self, session: &WizardSession) -> Page {
        let s = session.mailing_settings();
        let fields = s
            .option_fields()
            .iter()
            .map(|name| match *name {
                "password" => FormField::secret(name, s.option(name)),
                "encryption" => FormField::choice(name, s.option(name), &["", "tls", "ssl"]),
                "auth_mode" => {
                    FormField::choice(name, s.option(name), &["", "plain", "login", "cram-md5"])
                }
                _ => FormField::text(name, s.option(name)),
            })
            .collect();
        let view = StepView::Mailing(MailingPage {
            transport_labels: TRANSPORT_LABELS.iter().map(|l| l.to_string()).collect(),
            transport: s.transport().to_string(),
            form: FormPage {
                fields,
                errors: session.mailing_validation_errors().clone(),
                global_error: session.mailing_global_error().map(str::to_string),
            },
        });
        self.page(session, Step::Mailing, view)
    }

    pub async fn submit_mailing(&self, session: &mut WizardSession, form: &FieldMap) -> Location {
        let transport = form
            .get("transport")
            .map(|label| resolve_transport_id(label))
            .unwrap_or_else(|| session.mailing_settings().transport().to_string());

        if transport != session.mailing_settings().transport() {
            info!(
                "[PHASE: wizard] [STEP: mailing] Transport changed ({} -> {})",
                session.mailing_settings().transport(),
                transport
            );
            session.mailing_settings_mut().set_transport(transport);
            session.set_mailing_global_error(None);
            session.set_mailing_validation_errors(ValidationErrors::new());
            return transition(Step::Mailing, Event::TransportChanged);
        }

        info!(
            "[PHASE: wizard] [STEP: mailing] Submitted {}",
            mask_fields(form)
        );
        session.mailing_settings_mut().bind_data(form);
        let errors = session.mailing_settings().validate();
        let valid = errors.is_empty();
        session.set_mailing_validation_errors(errors);
        if !valid {
            return transition(Step::Mailing, Event::Rejected);
        }

        let check = timeout(
            self.mailing_timeout,
            self.collaborators
                .mailing_checker
                .test_transport(session.mailing_settings()),
        )
        .await;
        let failure = match check {
            Ok(Ok(())) => None,
            Ok(Err(failure)) => {
                warn!(
                    "[PHASE: wizard] [STEP: mailing] Check failed: {}",
                    failure.internal_details
                );
                Some(failure.user_message)
            }
            Err(_) => {
                warn!(
                    "[PHASE: wizard] [STEP: mailing] Check timed out after {}ms",
                    self.mailing_timeout.as_millis()
                );
                Some(format!(
                    "The mail server did not answer within {} seconds.",
                    self.mailing_timeout.as_secs()
                ))
            }
        };

        match failure {
            Some(message) => {
                session.set_mailing_global_error(Some(message));
                transition(Step::Mailing, Event::Rejected)
            }
            None => {
                session.set_mailing_global_error(None);
                transition(Step::Mailing, Event::Accepted)
            }
        }
    }

    pub fn skip_mailing(&self, session: &mut WizardSession) -> Location {
        session.reinitialize_mailing_settings();
        session.set_mailing_global_error(None);
        session.set_mailing_validation_errors(ValidationErrors::new());
        info!("[PHASE: wizard] [STEP: mailing] Mailing skipped");
        transition(Step::Mailing, Event::SkipMailing)
    }

    // =========================
    // Install
    // =========================

    pub fn show_install(&self, session: &WizardSession) -> Page {
        self.page(session, Step::Install, StepView::Install)
    }

    /// Persist, hand the session over to the installer and report where to go.
    ///
    /// Order: write parameters, close the transport session, install, invalidate
    /// the transport session. A write failure aborts before the installer runs,
    /// keeps the session, and still produces a failure log.
    pub async fn submit_install(&self, session: &mut WizardSession) -> Location {
        info!("[PHASE: install] [STEP: submit] Install requested");

        if let Err(e) = self
            .collaborators
            .parameters_writer
            .write_parameters(session)
            .await
        {
            error!(
                "[PHASE: install] [STEP: write_parameters] Failed: {:#}",
                e
            );
            return self
                .setup_fault(&format!("parameters could not be written: {:#}", e))
                .await;
        }

        if let Err(e) = self.collaborators.transport_session.close(session).await {
            warn!(
                "[PHASE: install] [STEP: session] Closing the session failed: {:#}",
                e
            );
        }

        let outcome = self.collaborators.installer.install(session).await;

        if let Err(e) = self.collaborators.transport_session.invalidate().await {
            warn!(
                "[PHASE: install] [STEP: session] Invalidating the session failed: {:#}",
                e
            );
        }
        *session = self.fresh_session();

        match outcome {
            Ok(outcome) => {
                info!(
                    "[PHASE: install] [STEP: finished] Installer finished (succeeded={}, log={})",
                    outcome.has_succeeded(),
                    outcome.log_filename()
                );
                transition(
                    Step::Install,
                    Event::InstallFinished {
                        succeeded: outcome.has_succeeded(),
                        log_filename: outcome.log_filename().to_string(),
                    },
                )
            }
            Err(e) => {
                error!(
                    "[PHASE: install] [STEP: finished] Installer could not start: {:#}",
                    e
                );
                self.setup_fault(&format!("installer could not start: {:#}", e))
                    .await
            }
        }
    }

    async fn setup_fault(&self, reason: &str) -> Location {
        match record_setup_fault(self.reporter.log_dir(), reason).await {
            Ok(log_filename) => transition(
                Step::Install,
                Event::InstallFinished {
                    succeeded: false,
                    log_filename,
                },
            ),
            Err(e) => {
                error!(
                    "[PHASE: install] [STEP: setup_fault] Failure log could not be written: {:#}",
                    e
                );
                transition(Step::Install, Event::Rejected)
            }
        }
    }

    // =========================
    // Failure / status
    // =========================

    pub async fn show_failed(&self, session: &WizardSession, log_filename: &str) -> Page {
        let log = self.reporter.read_failed_log(log_filename).await;
        Page {
            title: self.trans(session, "failed_install"),
            view: StepView::Failed(FailedPage {
                log_filename: log_filename.to_string(),
                log,
            }),
        }
    }

    pub async fn install_status(
        &self,
        timestamp: Option<&str>,
    ) -> Result<InstallStatus, StatusError> {
        self.reporter.status(timestamp).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkers::{CheckFailure, RequirementLevel, SettingCategory, SettingItem};
    use crate::installation::InstallOutcome;
    use crate::models::settings::{DatabaseSettings, MailingSettings};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    type Journal = Arc<Mutex<Vec<String>>>;

    fn note(journal: &Journal, entry: &str) {
        journal.lock().expect("journal").push(entry.to_string());
    }

    struct FakeRequirements;

    #[async_trait]
    impl RequirementChecker for FakeRequirements {
        async fn setting_categories(&self) -> Vec<SettingCategory> {
            vec![SettingCategory {
                name: "Tools".to_string(),
                items: vec![SettingItem {
                    description: "sendmail".to_string(),
                    level: RequirementLevel::Recommended,
                    passed: false,
                }],
            }]
        }
    }

    struct StubDatabase {
        result: Result<(), CheckFailure>,
        delay: Duration,
        calls: AtomicU32,
    }

    #[async_trait]
    impl DatabaseChecker for StubDatabase {
        async fn connect_to_database(&self, _: &DatabaseSettings) -> Result<(), CheckFailure> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.result.clone()
        }
    }

    struct StubMailing {
        result: Result<(), CheckFailure>,
        calls: AtomicU32,
    }

    #[async_trait]
    impl MailingChecker for StubMailing {
        async fn test_transport(&self, _: &MailingSettings) -> Result<(), CheckFailure> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result.clone()
        }
    }

    struct StubInstaller {
        succeed: bool,
        journal: Journal,
        seen_platform: Mutex<Option<String>>,
    }

    #[async_trait]
    impl Installer for StubInstaller {
        async fn install(&self, session: &WizardSession) -> anyhow::Result<InstallOutcome> {
            note(&self.journal, "install");
            *self.seen_platform.lock().expect("seen") =
                Some(session.platform_settings().name.clone());
            Ok(InstallOutcome::new(self.succeed, "install-77.log"))
        }
    }

    struct StubWriter {
        fail: bool,
        journal: Journal,
    }

    #[async_trait]
    impl ParametersWriter for StubWriter {
        async fn write_parameters(&self, _: &WizardSession) -> anyhow::Result<()> {
            note(&self.journal, "write");
            if self.fail {
                anyhow::bail!("disk full");
            }
            Ok(())
        }
    }

    struct StubTransport {
        journal: Journal,
    }

    #[async_trait]
    impl TransportSession for StubTransport {
        async fn close(&self, _: &WizardSession) -> anyhow::Result<()> {
            note(&self.journal, "close");
            Ok(())
        }

        async fn invalidate(&self) -> anyhow::Result<()> {
            note(&self.journal, "invalidate");
            Ok(())
        }
    }

    struct Harness {
        controller: StepController,
        database: Arc<StubDatabase>,
        mailing: Arc<StubMailing>,
        installer: Arc<StubInstaller>,
        journal: Journal,
        _logs: tempfile::TempDir,
    }

    struct Setup {
        database: Result<(), CheckFailure>,
        database_delay: Duration,
        mailing: Result<(), CheckFailure>,
        install_succeeds: bool,
        writer_fails: bool,
    }

    impl Default for Setup {
        fn default() -> Self {
            Self {
                database: Ok(()),
                database_delay: Duration::ZERO,
                mailing: Ok(()),
                install_succeeds: true,
                writer_fails: false,
            }
        }
    }

    fn harness(setup: Setup) -> Harness {
        let logs = tempfile::tempdir().expect("tempdir");
        let journal: Journal = Arc::new(Mutex::new(Vec::new()));
        let database = Arc::new(StubDatabase {
            result: setup.database,
            delay: setup.database_delay,
            calls: AtomicU32::new(0),
        });
        let mailing = Arc::new(StubMailing {
            result: setup.mailing,
            calls: AtomicU32::new(0),
        });
        let installer = Arc::new(StubInstaller {
            succeed: setup.install_succeeds,
            journal: journal.clone(),
            seen_platform: Mutex::new(None),
        });
        let collaborators = Collaborators {
            requirement_checker: Arc::new(FakeRequirements),
            database_checker: database.clone(),
            mailing_checker: mailing.clone(),
            installer: installer.clone(),
            parameters_writer: Arc::new(StubWriter {
                fail: setup.writer_fails,
                journal: journal.clone(),
            }),
            transport_session: Arc::new(StubTransport {
                journal: journal.clone(),
            }),
        };
        let controller = StepController::new(
            collaborators,
            InstallStatusReporter::new(logs.path().to_path_buf()),
        )
        .with_timeouts(Duration::from_millis(100), Duration::from_millis(100));
        Harness {
            controller,
            database,
            mailing,
            installer,
            journal,
            _logs: logs,
        }
    }

    fn form(pairs: &[(&str, &str)]) -> FieldMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn valid_database_form() -> FieldMap {
        form(&[
            ("driver", "postgres"),
            ("host", "db.local"),
            ("port", "5432"),
            ("name", "platform"),
            ("user", "platform"),
            ("password", "s3cret"),
        ])
    }

    fn smtp_form() -> FieldMap {
        form(&[
            ("transport", "SMTP"),
            ("host", "mail.local"),
            ("port", "25"),
        ])
    }

    #[test]
    fn language_submit_always_advances_and_switches_locale() {
        let h = harness(Setup::default());
        let mut session = WizardSession::default();
        let next = h.controller.submit_language(
            &mut session,
            &form(&[("install_language", "fr"), ("country", "BE")]),
        );
        assert_eq!(next, Location::Step(Step::Requirements));
        assert_eq!(session.install_language(), "fr");
        assert_eq!(session.country(), "BE");
        assert_eq!(h.controller.show_admin(&session).title, "Compte administrateur");
    }

    #[tokio::test]
    async fn requirements_page_exposes_derived_flags() {
        let h = harness(Setup::default());
        let page = h.controller.show_requirements(&WizardSession::default()).await;
        match page.view {
            StepView::Requirements(req) => {
                assert!(req.has_failed_recommendation);
                assert!(!req.has_failed_requirement);
            }
            other => panic!("unexpected view {:?}", other),
        }
    }

    #[tokio::test]
    async fn invalid_database_fields_never_reach_the_checker() {
        let h = harness(Setup::default());
        let mut session = WizardSession::default();
        let posted = form(&[("driver", "postgres"), ("host", ""), ("port", "99999")]);

        let next = h.controller.submit_database(&mut session, &posted).await;

        assert_eq!(next, Location::Step(Step::Database));
        assert_eq!(h.database.calls.load(Ordering::SeqCst), 0);
        assert_eq!(
            session.database_validation_errors(),
            &session.database_settings().validate()
        );
        assert!(session.database_validation_errors().contains_key("host"));
        assert!(session.database_validation_errors().contains_key("port"));
        assert_eq!(session.database_settings().port, "99999");
    }

    #[tokio::test]
    async fn database_check_failure_sets_global_error_only() {
        let h = harness(Setup {
            database: Err(CheckFailure::new("Unable to connect.", "refused")),
            ..Setup::default()
        });
        let mut session = WizardSession::default();

        let next = h
            .controller
            .submit_database(&mut session, &valid_database_form())
            .await;

        assert_eq!(next, Location::Step(Step::Database));
        assert_eq!(session.database_global_error(), Some("Unable to connect."));
        assert!(session.database_validation_errors().is_empty());
        assert_eq!(session.database_settings().host, "db.local");
    }

    #[tokio::test]
    async fn database_check_success_clears_global_error_and_advances() {
        let h = harness(Setup::default());
        let mut session = WizardSession::default();
        session.set_database_global_error(Some("stale".to_string()));

        let next = h
            .controller
            .submit_database(&mut session, &valid_database_form())
            .await;

        assert_eq!(next, Location::Step(Step::Platform));
        assert_eq!(session.database_global_error(), None);
        assert_eq!(h.database.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn slow_database_check_is_reported_as_global_error() {
        let h = harness(Setup {
            database_delay: Duration::from_secs(5),
            ..Setup::default()
        });
        let mut session = WizardSession::default();
        let next = h
            .controller
            .submit_database(&mut session, &valid_database_form())
            .await;
        assert_eq!(next, Location::Step(Step::Database));
        assert!(session
            .database_global_error()
            .is_some_and(|e| e.contains("did not answer")));
    }

    #[test]
    fn platform_language_defaults_once_and_is_never_overwritten() {
        let h = harness(Setup::default());
        let mut session = WizardSession::new("fr", "FR");

        h.controller.show_platform(&mut session);
        assert_eq!(session.platform_settings().language(), Some("fr"));

        h.controller
            .submit_platform(&mut session, &form(&[("language", "en")]));
        session.set_install_language("fr");
        h.controller.show_platform(&mut session);
        assert_eq!(session.platform_settings().language(), Some("en"));
    }

    #[test]
    fn platform_and_admin_gate_on_validation() {
        let h = harness(Setup::default());
        let mut session = WizardSession::default();
        h.controller.show_platform(&mut session);

        let next = h.controller.submit_platform(
            &mut session,
            &form(&[("name", "Campus"), ("support_email", "not-an-email")]),
        );
        assert_eq!(next, Location::Step(Step::Platform));
        assert!(session.platform_validation_errors().contains_key("support_email"));

        let next = h.controller.submit_platform(
            &mut session,
            &form(&[("support_email", "help@example.org")]),
        );
        assert_eq!(next, Location::Step(Step::Admin));
        assert!(session.platform_validation_errors().is_empty());

        let admin = form(&[
            ("first_name", "Jane"),
            ("last_name", "Doe"),
            ("username", "jdoe"),
            ("password", "longenough"),
            ("password_confirmation", "different"),
            ("email", "jane@example.org"),
        ]);
        let next = h.controller.submit_admin(&mut session, &admin);
        assert_eq!(next, Location::Step(Step::Admin));
        assert_eq!(
            session
                .first_admin_validation_errors()
                .keys()
                .collect::<Vec<_>>(),
            vec!["password_confirmation"]
        );
    }

    #[test]
    fn repeated_validation_without_changes_is_stable() {
        let h = harness(Setup::default());
        let mut session = WizardSession::default();
        let posted = form(&[("username", "x"), ("email", "nope")]);
        h.controller.submit_admin(&mut session, &posted);
        let first = session.first_admin_validation_errors().clone();
        h.controller.submit_admin(&mut session, &posted);
        assert_eq!(session.first_admin_validation_errors(), &first);
        assert_eq!(session.first_admin_settings().validate(), first);
    }

    #[tokio::test]
    async fn switching_transport_resets_mailing_without_checking() {
        let h = harness(Setup::default());
        let mut session = WizardSession::default();
        session
            .mailing_settings_mut()
            .set_transport_options(form(&[("host", "old.local")]));
        session.set_mailing_global_error(Some("old failure".to_string()));
        session.set_mailing_validation_errors(form(&[("host", "bad")]));

        let next = h
            .controller
            .submit_mailing(&mut session, &form(&[("transport", "Gmail"), ("username", "x")]))
            .await;

        assert_eq!(next, Location::Step(Step::Mailing));
        assert_eq!(session.mailing_settings().transport(), "gmail");
        assert!(session.mailing_settings().transport_options().is_empty());
        assert_eq!(session.mailing_global_error(), None);
        assert!(session.mailing_validation_errors().is_empty());
        assert_eq!(h.mailing.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn mailing_check_failure_keeps_submitted_options() {
        let h = harness(Setup {
            mailing: Err(CheckFailure::new("Mail server refused.", "554")),
            ..Setup::default()
        });
        let mut session = WizardSession::default();

        let next = h.controller.submit_mailing(&mut session, &smtp_form()).await;

        assert_eq!(next, Location::Step(Step::Mailing));
        assert_eq!(session.mailing_settings().transport_options(), &smtp_form());
        assert_eq!(session.mailing_global_error(), Some("Mail server refused."));
        assert_eq!(h.mailing.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn mailing_success_advances_to_install() {
        let h = harness(Setup::default());
        let mut session = WizardSession::default();
        session.set_mailing_global_error(Some("stale".to_string()));
        let next = h.controller.submit_mailing(&mut session, &smtp_form()).await;
        assert_eq!(next, Location::Step(Step::Install));
        assert_eq!(session.mailing_global_error(), None);
    }

    #[tokio::test]
    async fn invalid_mailing_options_skip_the_checker() {
        let h = harness(Setup::default());
        let mut session = WizardSession::default();
        let next = h
            .controller
            .submit_mailing(&mut session, &form(&[("transport", "SMTP"), ("port", "x")]))
            .await;
        assert_eq!(next, Location::Step(Step::Mailing));
        assert!(session.mailing_validation_errors().contains_key("host"));
        assert_eq!(h.mailing.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn skip_mailing_resets_from_any_state() {
        let h = harness(Setup::default());
        let mut session = WizardSession::default();
        h.controller
            .submit_mailing(&mut session, &form(&[("transport", "Sendmail / Postfix")]))
            .await;
        session.set_mailing_global_error(Some("boom".to_string()));
        session.set_mailing_validation_errors(form(&[("x", "y")]));

        let next = h.controller.skip_mailing(&mut session);

        assert_eq!(next, Location::Step(Step::Install));
        assert_eq!(session.mailing_settings(), &MailingSettings::default());
        assert_eq!(session.mailing_global_error(), None);
        assert!(session.mailing_validation_errors().is_empty());
    }

    #[tokio::test]
    async fn install_runs_in_order_and_redirects_on_outcome() {
        let h = harness(Setup::default());
        let mut session = WizardSession::default();
        session.platform_settings_mut().name = "Campus".to_string();

        let next = h.controller.submit_install(&mut session).await;

        assert_eq!(next, Location::Done);
        assert_eq!(
            *h.journal.lock().expect("journal"),
            vec!["write", "close", "install", "invalidate"]
        );
        assert_eq!(
            h.installer.seen_platform.lock().expect("seen").as_deref(),
            Some("Campus")
        );
        assert!(session.platform_settings().name.is_empty());
    }

    #[tokio::test]
    async fn failed_install_points_at_its_log_and_still_invalidates() {
        let h = harness(Setup {
            install_succeeds: false,
            ..Setup::default()
        });
        let mut session = WizardSession::default();
        let next = h.controller.submit_install(&mut session).await;
        assert_eq!(
            next,
            Location::Failed {
                log_filename: "install-77.log".to_string()
            }
        );
        assert!(h
            .journal
            .lock()
            .expect("journal")
            .contains(&"invalidate".to_string()));
    }

    #[tokio::test]
    async fn write_failure_produces_setup_fault_log_without_installing() {
        let h = harness(Setup {
            writer_fails: true,
            ..Setup::default()
        });
        let mut session = WizardSession::default();
        session.platform_settings_mut().name = "Campus".to_string();

        let next = h.controller.submit_install(&mut session).await;

        let Location::Failed { log_filename } = next else {
            panic!("expected failure, got {:?}", next);
        };
        assert_eq!(*h.journal.lock().expect("journal"), vec!["write"]);
        assert_eq!(session.platform_settings().name, "Campus");

        let page = h.controller.show_failed(&session, &log_filename).await;
        match page.view {
            StepView::Failed(failed) => {
                let log = failed.log.expect("fault log exists");
                assert!(log.contains("SETUP I/O FAULT"), "{}", log);
                assert!(log.contains("disk full"), "{}", log);
            }
            other => panic!("unexpected view {:?}", other),
        }
    }

    #[tokio::test]
    async fn failed_page_tolerates_missing_log() {
        let h = harness(Setup::default());
        let page = h
            .controller
            .show_failed(&WizardSession::default(), "install-404.log")
            .await;
        assert_eq!(page.title, "Installation failed");
        assert!(matches!(
            page.view,
            StepView::Failed(FailedPage { log: None, .. })
        ));
    }

    #[test]
    fn mailing_page_masks_password_option() {
        let h = harness(Setup::default());
        let mut session = WizardSession::default();
        session.mailing_settings_mut().set_transport("gmail");
        let page = h.controller.show_mailing(&session);
        let StepView::Mailing(mailing) = page.view else {
            panic!("expected mailing view");
        };
        assert_eq!(mailing.transport, "gmail");
        let password = mailing
            .form
            .fields
            .iter()
            .find(|f| f.name == "password")
            .expect("password field");
        assert!(password.secret);
    }
}
