use std::fmt;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::clock::Clock;
use crate::storage::{keys, StorageError, StorageScopes};

/// Remaining lifetime under which the expiring-soon notice is raised.
pub fn expiry_warning() -> Duration {
    Duration::hours(2)
}

const PRINCIPAL_FIELDS: [&str; 3] = ["adminUser", "user", "usuario"];

/// The two independent login flows, each with its own credential slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Audience {
    /// Access-code login for answering the questionnaire.
    Respondent,
    /// Email/password login for the reports view.
    Reports,
}

/// Where a user is sent to authenticate again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryPoint {
    AccessCode,
    Login,
}

impl EntryPoint {
    pub fn path(self) -> &'static str {
        match self {
            EntryPoint::AccessCode => "/cuestionario",
            EntryPoint::Login => "/login",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CredentialKeys {
    pub token: &'static str,
    pub principal: &'static str,
    pub issued_at: &'static str,
}

impl Audience {
    pub fn window(self) -> Duration {
        match self {
            Audience::Respondent => Duration::hours(2),
            Audience::Reports => Duration::hours(20),
        }
    }

    pub fn storage_keys(self) -> CredentialKeys {
        match self {
            Audience::Respondent => CredentialKeys {
                token: "auth_token",
                principal: "auth_user",
                issued_at: "auth_token_issued_at",
            },
            Audience::Reports => CredentialKeys {
                token: "report_token",
                principal: "report_user",
                issued_at: "report_token_issued_at",
            },
        }
    }

    pub fn entry_point(self) -> EntryPoint {
        match self {
            Audience::Respondent => EntryPoint::AccessCode,
            Audience::Reports => EntryPoint::Login,
        }
    }

    /// Reports logins tolerate responses that carry a token but no user.
    pub fn allows_placeholder_principal(self) -> bool {
        matches!(self, Audience::Reports)
    }

    pub fn label(self) -> &'static str {
        match self {
            Audience::Respondent => "respondent",
            Audience::Reports => "reports",
        }
    }
}

impl fmt::Display for Audience {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// User descriptor returned by the backend, kept as raw JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Principal(pub Value);

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrincipalInfo {
    pub id: Option<Value>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub role: String,
}

impl Principal {
    pub fn placeholder() -> Self {
        Self(json!({ "id": 1, "name": "Usuario Test" }))
    }

    fn text(&self, fields: &[&str]) -> Option<String> {
        fields
            .iter()
            .find_map(|field| self.0.get(*field).and_then(Value::as_str))
            .map(str::to_string)
    }

    pub fn info(&self) -> PrincipalInfo {
        PrincipalInfo {
            id: self.0.get("id").cloned(),
            name: self.text(&["name", "nombre"]),
            email: self.text(&["email"]),
            role: self
                .text(&["role", "rol"])
                .unwrap_or_else(|| "Admin".to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Credential {
    pub token: String,
    pub principal: Principal,
    pub issued_at: DateTime<Utc>,
}

impl Credential {
    /// Expired once `now - issued_at` reaches the audience window.
    pub fn is_expired(&self, audience: Audience, now: DateTime<Utc>) -> bool {
        now - self.issued_at >= audience.window()
    }

    pub fn remaining(&self, audience: Audience, now: DateTime<Utc>) -> Duration {
        let remaining = audience.window() - (now - self.issued_at);
        remaining.max(Duration::zero())
    }
}

/// Snapshot of one credential slot.
#[derive(Debug, Clone, PartialEq)]
pub enum SlotState {
    Vacant,
    Valid(Credential),
    Expired(Credential),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreOutcome {
    Absent,
    Restored,
    Expired,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("authentication response carried no token")]
    MissingToken,
    #[error("authentication response carried no user descriptor")]
    MissingPrincipal,
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Api(#[from] crate::api::ApiError),
}

/// One audience's credential, mirrored into persistent storage.
pub struct CredentialStore {
    audience: Audience,
    storage: StorageScopes,
    clock: Arc<dyn Clock>,
    current: Mutex<Option<Credential>>,
}

impl CredentialStore {
    pub fn new(audience: Audience, storage: StorageScopes, clock: Arc<dyn Clock>) -> Self {
        Self {
            audience,
            storage,
            clock,
            current: Mutex::new(None),
        }
    }

    pub fn audience(&self) -> Audience {
        self.audience
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Accepts a raw login response.
    pub fn authenticate(&self, payload: &Value) -> Result<Credential, AuthError> {
        let token = payload
            .get("token")
            .and_then(Value::as_str)
            .filter(|token| !token.is_empty())
            .ok_or(AuthError::MissingToken)?;

        let principal = match PRINCIPAL_FIELDS
            .iter()
            .filter_map(|field| payload.get(*field))
            .find(|value| !value.is_null())
        {
            Some(value) => Principal(value.clone()),
            None if self.audience.allows_placeholder_principal() => {
                warn!(audience = %self.audience, "login response had no user, using placeholder");
                Principal::placeholder()
            }
            None => return Err(AuthError::MissingPrincipal),
        };

        let credential = Credential {
            token: token.to_string(),
            principal,
            issued_at: self.clock.now(),
        };
        self.persist(&credential)?;
        *self.current.lock().expect("credential mutex poisoned") = Some(credential.clone());

        info!(audience = %self.audience, "credential issued");
        Ok(credential)
    }

    /// Loads the persisted credential, clearing it if its window has elapsed.
    pub fn restore(&self) -> Result<RestoreOutcome, AuthError> {
        let slot = self.audience.storage_keys();
        let persistent = &self.storage.persistent;

        let (Some(token), Some(principal), Some(issued_at)) = (
            persistent.get(slot.token)?,
            persistent.get(slot.principal)?,
            persistent.get(slot.issued_at)?,
        ) else {
            return Ok(RestoreOutcome::Absent);
        };

        let parsed = decode_issued_at(&issued_at).and_then(|issued_at| {
            serde_json::from_str::<Value>(&principal)
                .ok()
                .map(|principal| (issued_at, Principal(principal)))
        });
        let Some((issued_at, principal)) = parsed else {
            warn!(audience = %self.audience, "persisted credential is malformed, clearing it");
            self.logout()?;
            return Ok(RestoreOutcome::Expired);
        };

        let credential = Credential {
            token,
            principal,
            issued_at,
        };
        if credential.is_expired(self.audience, self.clock.now()) {
            info!(audience = %self.audience, "persisted credential expired, clearing it");
            self.logout()?;
            return Ok(RestoreOutcome::Expired);
        }

        *self.current.lock().expect("credential mutex poisoned") = Some(credential);
        info!(audience = %self.audience, "credential restored");
        Ok(RestoreOutcome::Restored)
    }

    /// Clears the credential and every answer reconciliation key.
    ///
    /// The respondent flow also drops the current form instance id.
    pub fn logout(&self) -> Result<(), StorageError> {
        self.discard()?;
        self.storage.session.remove_prefixed(keys::ANSWER_PREFIX)?;

        info!(audience = %self.audience, "credential cleared");
        Ok(())
    }

    /// Drops only this slot's keys; answer reconciliation keys are kept.
    pub(crate) fn discard(&self) -> Result<(), StorageError> {
        self.current
            .lock()
            .expect("credential mutex poisoned")
            .take();

        let slot = self.audience.storage_keys();
        let persistent = &self.storage.persistent;
        persistent.remove(slot.token)?;
        persistent.remove(slot.principal)?;
        persistent.remove(slot.issued_at)?;
        if self.audience == Audience::Respondent {
            persistent.remove(keys::GENERAL_DATA_ID)?;
        }
        Ok(())
    }

    pub fn current(&self) -> Option<Credential> {
        self.current
            .lock()
            .expect("credential mutex poisoned")
            .clone()
    }

    pub fn state(&self) -> SlotState {
        match self.current() {
            None => SlotState::Vacant,
            Some(credential) if credential.is_expired(self.audience, self.clock.now()) => {
                SlotState::Expired(credential)
            }
            Some(credential) => SlotState::Valid(credential),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self.state(), SlotState::Valid(_))
    }

    pub fn token_if_valid(&self) -> Option<String> {
        match self.state() {
            SlotState::Valid(credential) => Some(credential.token),
            _ => None,
        }
    }

    pub fn remaining(&self) -> Duration {
        self.current()
            .map(|credential| credential.remaining(self.audience, self.clock.now()))
            .unwrap_or_else(Duration::zero)
    }

    pub fn format_remaining(&self) -> String {
        format_remaining(self.remaining())
    }

    fn persist(&self, credential: &Credential) -> Result<(), StorageError> {
        let slot = self.audience.storage_keys();
        let persistent = &self.storage.persistent;
        persistent.set(slot.token, &credential.token)?;
        persistent.set(slot.principal, &credential.principal.0.to_string())?;
        persistent.set(
            slot.issued_at,
            &credential.issued_at.timestamp_millis().to_string(),
        )?;
        Ok(())
    }
}

impl fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialStore")
            .field("audience", &self.audience)
            .field("authenticated", &self.current().is_some())
            .finish_non_exhaustive()
    }
}

fn decode_issued_at(raw: &str) -> Option<DateTime<Utc>> {
    let millis = raw.trim().parse::<i64>().ok()?;
    Utc.timestamp_millis_opt(millis).single()
}

pub fn format_remaining(remaining: Duration) -> String {
    if remaining <= Duration::zero() {
        return "session expired".to_string();
    }
    let hours = remaining.num_hours();
    let minutes = remaining.num_minutes() % 60;
    format!("{hours}h {minutes}m remaining")
}
