// Route table
//
// GET renders a step, POST submits it and always answers with a redirect.
// The session is loaded once, kept behind a mutex and saved after every
// request unless the store was closed by an install submission.

use super::{Method, Request, Response};
use crate::installation::status::StatusError;
use crate::models::responses::ErrorBody;
use crate::models::session::WizardSession;
use crate::persistence::session_store::FileSessionStore;
use crate::wizard::controller::StepController;
use crate::wizard::{Location, Step};
use log::{debug, warn};
use std::sync::Arc;
use tokio::sync::Mutex;

const STATUS_PREFIX: &str = "/install/status";
const ERROR_PREFIX: &str = "/error/";
const SKIP_MAILING: &str = "/mailing/skip";

pub struct Router {
    controller: StepController,
    store: Arc<FileSessionStore>,
    session: Mutex<WizardSession>,
    base_path: String,
    success_path: String,
}

impl Router {
    /// Build a router around the stored session (or a fresh one).
    pub async fn open(
        controller: StepController,
        store: Arc<FileSessionStore>,
        base_path: &str,
        success_path: &str,
    ) -> Self {
        let session = store.load_or(controller.fresh_session()).await;
        Self {
            controller,
            store,
            session: Mutex::new(session),
            base_path: base_path.trim_end_matches('/').to_string(),
            success_path: success_path.to_string(),
        }
    }

    pub fn controller(&self) -> &StepController {
        &self.controller
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    /// Absolute path of a route relative to the base path.
    pub fn url(&self, route: &str) -> String {
        let route = if route == "/" { "" } else { route };
        let url = format!("{}{}", self.base_path, route);
        if url.is_empty() {
            "/".to_string()
        } else {
            url
        }
    }

    /// Route relative to the base path, or `None` when `path` is outside it.
    pub fn route_of<'a>(&self, path: &'a str) -> Option<&'a str> {
        let rest = path.strip_prefix(self.base_path.as_str())?;
        match rest {
            "" => Some("/"),
            r if r.starts_with('/') => Some(r),
            _ => None,
        }
    }

    fn redirect(&self, location: &Location) -> Response {
        Response::Redirect(self.url(&location.path(&self.success_path)))
    }

    pub async fn handle(&self, request: Request) -> Response {
        let Some(route) = self.route_of(&request.path) else {
            debug!(
                "[PHASE: wizard] [STEP: route] Outside base path: {}",
                request.path
            );
            return Response::NotFound;
        };
        debug!(
            "[PHASE: wizard] [STEP: route] {:?} {}",
            request.method, route
        );

        // Status polling never touches the session: it runs while an install holds it.
        if request.method == Method::Get {
            if route == STATUS_PREFIX {
                return self.install_status(None).await;
            }
            if let Some(ts) = route.strip_prefix(STATUS_PREFIX).and_then(|r| r.strip_prefix('/'))
            {
                return self.install_status(Some(ts)).await;
            }
        }

        let mut session = self.session.lock().await;
        let response = self.dispatch(&request, route, &mut session).await;

        if let Err(e) = self.store.save(&session).await {
            warn!(
                "[PHASE: wizard] [STEP: session] Session could not be saved: {:#}",
                e
            );
        }
        response
    }

    async fn dispatch(
        &self,
        request: &Request,
        route: &str,
        session: &mut WizardSession,
    ) -> Response {
        let c = &self.controller;
        let form = &request.form;

        if request.method == Method::Get {
            if let Some(log_filename) = route.strip_prefix(ERROR_PREFIX) {
                return Response::Page(c.show_failed(session, log_filename).await);
            }
        }
        if route == SKIP_MAILING {
            return match request.method {
                Method::Post => self.redirect(&c.skip_mailing(session)),
                Method::Get => Response::NotFound,
            };
        }

        let Some(step) = Step::from_path(route) else {
            return Response::NotFound;
        };

        match (request.method, step) {
            (Method::Get, Step::Language) => Response::Page(c.show_language(session)),
            (Method::Get, Step::Requirements) => {
                Response::Page(c.show_requirements(session).await)
            }
            (Method::Get, Step::Database) => Response::Page(c.show_database(session)),
            (Method::Get, Step::Platform) => Response::Page(c.show_platform(session)),
            (Method::Get, Step::Admin) => Response::Page(c.show_admin(session)),
            (Method::Get, Step::Mailing) => Response::Page(c.show_mailing(session)),
            (Method::Get, Step::Install) => Response::Page(c.show_install(session)),

            (Method::Post, Step::Language) => self.redirect(&c.submit_language(session, form)),
            (Method::Post, Step::Requirements) => Response::NotFound,
            (Method::Post, Step::Database) => {
                self.redirect(&c.submit_database(session, form).await)
            }
            (Method::Post, Step::Platform) => self.redirect(&c.submit_platform(session, form)),
            (Method::Post, Step::Admin) => self.redirect(&c.submit_admin(session, form)),
            (Method::Post, Step::Mailing) => {
                self.redirect(&c.submit_mailing(session, form).await)
            }
            (Method::Post, Step::Install) => self.redirect(&c.submit_install(session).await),
        }
    }

    async fn install_status(&self, timestamp: Option<&str>) -> Response {
        match self.controller.install_status(timestamp).await {
            Ok(status) => Response::Json {
                status: 200,
                body: serde_json::json!(status),
            },
            Err(e) => {
                let (status, kind) = match &e {
                    StatusError::NoInstallLogs => (404, "no_install_logs"),
                    StatusError::Unreadable { .. } => (500, "unreadable"),
                    StatusError::LogDirUnreadable { .. } => (500, "log_dir_unreadable"),
                    StatusError::InvalidTimestamp(_) => (400, "invalid_timestamp"),
                };
                warn!(
                    "[PHASE: status] [STEP: query] {} (status={})",
                    e, status
                );
                Response::Json {
                    status,
                    body: serde_json::json!(ErrorBody {
                        error: e.to_string(),
                        kind: kind.to_string(),
                    }),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkers::{
        CheckFailure, DatabaseChecker, MailingChecker, RequirementChecker, SettingCategory,
    };
    use crate::installation::status::InstallStatusReporter;
    use crate::installation::{InstallOutcome, Installer};
    use crate::models::responses::StepView;
    use crate::models::settings::{DatabaseSettings, FieldMap, MailingSettings};
    use crate::persistence::writer::ParametersWriter;
    use crate::security::secret_protector::{default_key_path, SecretProtector};
    use crate::wizard::controller::Collaborators;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Pass;

    #[async_trait]
    impl RequirementChecker for Pass {
        async fn setting_categories(&self) -> Vec<SettingCategory> {
            Vec::new()
        }
    }

    #[async_trait]
    impl DatabaseChecker for Pass {
        async fn connect_to_database(&self, _: &DatabaseSettings) -> Result<(), CheckFailure> {
            Ok(())
        }
    }

    #[async_trait]
    impl MailingChecker for Pass {
        async fn test_transport(&self, _: &MailingSettings) -> Result<(), CheckFailure> {
            Ok(())
        }
    }

    #[async_trait]
    impl ParametersWriter for Pass {
        async fn write_parameters(&self, _: &WizardSession) -> anyhow::Result<()> {
            Ok(())
        }
    }

    struct CountingInstaller {
        calls: AtomicU32,
    }

    #[async_trait]
    impl Installer for CountingInstaller {
        async fn install(&self, _: &WizardSession) -> anyhow::Result<InstallOutcome> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(InstallOutcome::new(true, "install-1.log"))
        }
    }

    struct Fixture {
        router: Router,
        store: Arc<FileSessionStore>,
        installer: Arc<CountingInstaller>,
        dir: tempfile::TempDir,
    }

    async fn fixture(base_path: &str) -> Fixture {
        let dir = tempfile::tempdir().expect("tempdir");
        let session_path = dir.path().join("session.json");
        let protector = Arc::new(SecretProtector::new(default_key_path(&session_path)));
        let store = Arc::new(FileSessionStore::new(session_path, protector));
        let installer = Arc::new(CountingInstaller {
            calls: AtomicU32::new(0),
        });
        let pass = Arc::new(Pass);
        let controller = StepController::new(
            Collaborators {
                requirement_checker: pass.clone(),
                database_checker: pass.clone(),
                mailing_checker: pass.clone(),
                installer: installer.clone(),
                parameters_writer: pass,
                transport_session: store.clone(),
            },
            InstallStatusReporter::new(dir.path().join("logs")),
        );
        let router = Router::open(controller, store.clone(), base_path, "/../app").await;
        Fixture {
            router,
            store,
            installer,
            dir,
        }
    }

    fn form(pairs: &[(&str, &str)]) -> FieldMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn root_and_language_render_the_language_step() {
        let f = fixture("/install").await;
        for path in ["/install", "/install/", "/install/language"] {
            match f.router.handle(Request::get(path)).await {
                Response::Page(page) => assert!(matches!(page.view, StepView::Language(_))),
                other => panic!("{}: unexpected {:?}", path, other),
            }
        }
        assert_eq!(
            f.router.handle(Request::get("/elsewhere")).await,
            Response::NotFound
        );
    }

    #[tokio::test]
    async fn posts_redirect_under_the_base_path() {
        let f = fixture("/install").await;
        let response = f
            .router
            .handle(Request::post("/install/language", form(&[("install_language", "fr")])))
            .await;
        assert_eq!(response, Response::Redirect("/install/requirements".to_string()));

        let response = f
            .router
            .handle(Request::post("/install/admin", FieldMap::new()))
            .await;
        assert_eq!(response, Response::Redirect("/install/admin".to_string()));
    }

    #[tokio::test]
    async fn root_redirect_is_normalized() {
        let f = fixture("/install").await;
        assert_eq!(f.router.url("/"), "/install");
        let f = fixture("").await;
        assert_eq!(f.router.url("/"), "/");
        assert_eq!(f.router.url("/database"), "/database");
    }

    #[tokio::test]
    async fn skip_mailing_is_post_only() {
        let f = fixture("").await;
        assert_eq!(
            f.router.handle(Request::get("/mailing/skip")).await,
            Response::NotFound
        );
        assert_eq!(
            f.router
                .handle(Request::post("/mailing/skip", FieldMap::new()))
                .await,
            Response::Redirect("/install".to_string())
        );
        assert_eq!(
            f.router
                .handle(Request::post("/requirements", FieldMap::new()))
                .await,
            Response::NotFound
        );
    }

    #[tokio::test]
    async fn session_survives_between_router_instances() {
        let f = fixture("").await;
        f.router
            .handle(Request::post("/language", form(&[("country", "BE")])))
            .await;
        assert!(f.store.path().exists());

        let restored = f.store.load_or(WizardSession::default()).await;
        assert_eq!(restored.country(), "BE");
    }

    #[tokio::test]
    async fn install_submit_redirects_to_success_and_resets_session() {
        let f = fixture("/install").await;
        f.router
            .handle(Request::post("/install/language", form(&[("country", "BE")])))
            .await;

        let response = f
            .router
            .handle(Request::post("/install/install", FieldMap::new()))
            .await;

        assert_eq!(response, Response::Redirect("/install/../app".to_string()));
        assert_eq!(f.installer.calls.load(Ordering::SeqCst), 1);
        assert!(!f.store.is_closed());
        let restored = f.store.load_or(WizardSession::new("xx", "XX")).await;
        assert_eq!(restored.country(), "US");
    }

    #[tokio::test]
    async fn status_route_maps_failures_to_statuses() {
        let f = fixture("").await;
        let Response::Json { status, body } =
            f.router.handle(Request::get("/install/status")).await
        else {
            panic!("expected json");
        };
        assert_eq!(status, 404);
        assert_eq!(body["kind"], "no_install_logs");

        let Response::Json { status, .. } =
            f.router.handle(Request::get("/install/status/12ab")).await
        else {
            panic!("expected json");
        };
        assert_eq!(status, 400);

        let logs = f.dir.path().join("logs");
        std::fs::create_dir_all(&logs).expect("logs dir");
        std::fs::write(logs.join("install-42.log"), "step one\n").expect("write log");

        let Response::Json { status, body } =
            f.router.handle(Request::get("/install/status/42")).await
        else {
            panic!("expected json");
        };
        assert_eq!(status, 200);
        assert_eq!(body["timestamp"], "42");
        assert_eq!(body["content"], "step one\n");
    }

    #[tokio::test]
    async fn broken_log_directory_is_a_server_error() {
        let f = fixture("").await;
        std::fs::write(f.dir.path().join("logs"), "not a directory").expect("write");
        let Response::Json { status, body } =
            f.router.handle(Request::get("/install/status")).await
        else {
            panic!("expected json");
        };
        assert_eq!(status, 500);
        assert_eq!(body["kind"], "log_dir_unreadable");
    }

    #[tokio::test]
    async fn error_page_renders_named_log() {
        let f = fixture("").await;
        let logs = f.dir.path().join("logs");
        std::fs::create_dir_all(&logs).expect("logs dir");
        std::fs::write(logs.join("install-7.log"), "INSTALL FAILED\n").expect("write log");

        match f.router.handle(Request::get("/error/install-7.log")).await {
            Response::Page(page) => match page.view {
                StepView::Failed(failed) => {
                    assert_eq!(failed.log.as_deref(), Some("INSTALL FAILED\n"))
                }
                other => panic!("unexpected view {:?}", other),
            },
            other => panic!("unexpected {:?}", other),
        }
    }
}
