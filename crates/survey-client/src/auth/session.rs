use std::sync::Arc;

use chrono::Duration;
use tracing::{info, warn};

use super::credential::{
    Audience, AuthError, Credential, CredentialStore, EntryPoint, RestoreOutcome, SlotState,
};
use crate::api::{ApiError, SurveyBackend};
use crate::clock::Clock;
use crate::storage::StorageScopes;

/// Outbound hook for redirects and user-facing notices.
pub trait Navigator: Send + Sync {
    fn navigate(&self, entry_point: EntryPoint);

    fn notify_expiring(&self, audience: Audience, remaining: Duration) {
        let _ = (audience, remaining);
    }
}

/// Owns both credential slots and is the single path through which any of
/// them is expired or invalidated.
pub struct AuthSession {
    respondent: CredentialStore,
    reports: CredentialStore,
    navigator: Arc<dyn Navigator>,
}

impl AuthSession {
    pub fn new(storage: StorageScopes, clock: Arc<dyn Clock>, navigator: Arc<dyn Navigator>) -> Self {
        Self {
            respondent: CredentialStore::new(Audience::Respondent, storage.clone(), clock.clone()),
            reports: CredentialStore::new(Audience::Reports, storage, clock),
            navigator,
        }
    }

    pub fn store(&self, audience: Audience) -> &CredentialStore {
        match audience {
            Audience::Respondent => &self.respondent,
            Audience::Reports => &self.reports,
        }
    }

    pub fn navigator(&self) -> &Arc<dyn Navigator> {
        &self.navigator
    }

    /// Restores both slots; elapsed ones are cleared without a redirect.
    pub fn restore_all(&self) -> Result<[RestoreOutcome; 2], AuthError> {
        Ok([self.respondent.restore()?, self.reports.restore()?])
    }

    /// Explicit logout without a redirect.
    pub fn logout(&self, audience: Audience) -> Result<(), AuthError> {
        self.store(audience).logout()?;
        Ok(())
    }

    /// Clears an elapsed credential and sends the user to its entry point.
    pub fn expire(&self, audience: Audience) {
        info!(%audience, "credential window elapsed");
        if let Err(err) = self.store(audience).logout() {
            warn!(%audience, error = %err, "failed to clear expired credential from storage");
        }
        self.navigator.navigate(audience.entry_point());
    }

    /// Server-side invalidation: both slots are cleared regardless of which one was used.
    pub fn invalidate_all(&self) {
        for audience in [Audience::Reports, Audience::Respondent] {
            if let Err(err) = self.store(audience).logout() {
                warn!(%audience, error = %err, "failed to clear invalidated credential");
            }
        }
        self.navigator.navigate(EntryPoint::Login);
    }

    /// Picks the bearer token for an authenticated request.
    ///
    /// The reports slot wins over the respondent slot. Elapsed slots are
    /// cleared and skipped. Only when no valid slot remains is the first
    /// elapsed one expired through [`AuthSession::expire`], failing the
    /// request with [`ApiError::AuthExpired`].
    pub fn bearer(&self) -> Result<Option<String>, ApiError> {
        let mut expired = None;
        for audience in [Audience::Reports, Audience::Respondent] {
            match self.store(audience).state() {
                SlotState::Vacant => {}
                SlotState::Valid(credential) => return Ok(Some(credential.token)),
                SlotState::Expired(_) => {
                    info!(%audience, "skipping elapsed credential");
                    if let Err(err) = self.store(audience).discard() {
                        warn!(%audience, error = %err, "failed to clear expired credential from storage");
                    }
                    expired.get_or_insert(audience);
                }
            }
        }

        match expired {
            Some(audience) => {
                self.expire(audience);
                Err(ApiError::AuthExpired(audience))
            }
            None => Ok(None),
        }
    }

    pub async fn login_with_access_code<B>(
        &self,
        backend: &B,
        code: &str,
    ) -> Result<Credential, AuthError>
    where
        B: SurveyBackend + ?Sized,
    {
        let payload = backend.authenticate_access_code(code).await?;
        self.respondent.authenticate(&payload)
    }

    pub async fn admin_login<B>(
        &self,
        backend: &B,
        email: &str,
        password: &str,
    ) -> Result<Credential, AuthError>
    where
        B: SurveyBackend + ?Sized,
    {
        let payload = backend.admin_login(email, password).await?;
        self.reports.authenticate(&payload)
    }
}

impl std::fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSession")
            .field("respondent", &self.respondent)
            .field("reports", &self.reports)
            .finish_non_exhaustive()
    }
}
