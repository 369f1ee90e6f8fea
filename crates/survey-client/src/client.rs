//! Wires configuration, storage and navigation into a ready client.

use std::sync::Arc;

use tracing::info;

use crate::api::HttpBackend;
use crate::auth::{Audience, AuthSession, MonitorStatus, Navigator, RestoreOutcome, SessionMonitor};
use crate::clock::{Clock, SystemClock};
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::questionnaire::QuestionnaireSession;
use crate::storage::StorageScopes;
use crate::telemetry;

pub struct SurveyClient {
    config: ClientConfig,
    auth: Arc<AuthSession>,
    backend: Arc<HttpBackend>,
    questionnaire: QuestionnaireSession<HttpBackend>,
    respondent_monitor: SessionMonitor,
    reports_monitor: SessionMonitor,
}

impl SurveyClient {
    /// Loads [`ClientConfig`] from the environment, installs the tracing
    /// subscriber and builds the client.
    pub fn from_env(
        storage: StorageScopes,
        navigator: Arc<dyn Navigator>,
    ) -> Result<Self, ClientError> {
        let config = ClientConfig::load()?;
        telemetry::init(&config.telemetry)?;
        Self::new(config, storage, navigator)
    }

    pub fn new(
        config: ClientConfig,
        storage: StorageScopes,
        navigator: Arc<dyn Navigator>,
    ) -> Result<Self, ClientError> {
        Self::with_clock(config, storage, navigator, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: ClientConfig,
        storage: StorageScopes,
        navigator: Arc<dyn Navigator>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ClientError> {
        let auth = Arc::new(AuthSession::new(storage.clone(), clock, navigator));
        let backend = Arc::new(HttpBackend::new(&config.backend, auth.clone())?);
        let questionnaire = QuestionnaireSession::new(backend.clone(), auth.clone(), storage);
        let interval = config.monitor.check_interval;

        info!(
            environment = ?config.environment,
            base_url = %config.backend.base_url,
            "survey client configured"
        );

        Ok(Self {
            respondent_monitor: SessionMonitor::new(auth.clone(), Audience::Respondent, interval),
            reports_monitor: SessionMonitor::new(auth.clone(), Audience::Reports, interval),
            config,
            auth,
            backend,
            questionnaire,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn auth(&self) -> &Arc<AuthSession> {
        &self.auth
    }

    pub fn backend(&self) -> &Arc<HttpBackend> {
        &self.backend
    }

    pub fn questionnaire(&self) -> &QuestionnaireSession<HttpBackend> {
        &self.questionnaire
    }

    pub fn monitor(&self, audience: Audience) -> &SessionMonitor {
        match audience {
            Audience::Respondent => &self.respondent_monitor,
            Audience::Reports => &self.reports_monitor,
        }
    }

    /// Restores persisted credentials and starts both expiry monitors.
    pub fn start(&self) -> Result<[MonitorStatus; 2], ClientError> {
        let [respondent, reports] = self.auth.restore_all()?;
        if respondent == RestoreOutcome::Restored || reports == RestoreOutcome::Restored {
            info!(?respondent, ?reports, "persisted credentials restored");
        }
        Ok([
            self.respondent_monitor.start()?,
            self.reports_monitor.start()?,
        ])
    }

    pub fn stop(&self) {
        self.respondent_monitor.stop();
        self.reports_monitor.stop();
    }
}

impl std::fmt::Debug for SurveyClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SurveyClient")
            .field("environment", &self.config.environment)
            .field("backend", &self.backend)
            .finish_non_exhaustive()
    }
}
