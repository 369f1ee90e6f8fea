use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::auth::{Audience, AuthSession, EntryPoint, Navigator};
use crate::clock::ManualClock;
use crate::storage::{KeyValueStore, MemoryStore, StorageScopes};

#[derive(Debug, Clone, PartialEq)]
pub(super) enum NavigatorEvent {
    Navigated(EntryPoint),
    Expiring(Audience, Duration),
}

#[derive(Debug, Default)]
pub(super) struct RecordingNavigator {
    events: Mutex<Vec<NavigatorEvent>>,
}

impl RecordingNavigator {
    pub(super) fn events(&self) -> Vec<NavigatorEvent> {
        self.events.lock().expect("navigator mutex").clone()
    }

    pub(super) fn navigations(&self) -> Vec<EntryPoint> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                NavigatorEvent::Navigated(entry) => Some(entry),
                NavigatorEvent::Expiring(..) => None,
            })
            .collect()
    }

    pub(super) fn notices(&self) -> usize {
        self.events()
            .iter()
            .filter(|event| matches!(event, NavigatorEvent::Expiring(..)))
            .count()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, entry_point: EntryPoint) {
        self.events
            .lock()
            .expect("navigator mutex")
            .push(NavigatorEvent::Navigated(entry_point));
    }

    fn notify_expiring(&self, audience: Audience, remaining: Duration) {
        self.events
            .lock()
            .expect("navigator mutex")
            .push(NavigatorEvent::Expiring(audience, remaining));
    }
}

pub(super) fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0)
        .single()
        .expect("valid timestamp")
}

pub(super) struct Harness {
    pub(super) persistent: MemoryStore,
    pub(super) session: MemoryStore,
    pub(super) clock: ManualClock,
    pub(super) navigator: Arc<RecordingNavigator>,
    pub(super) auth: Arc<AuthSession>,
}

impl Harness {
    pub(super) fn new() -> Self {
        let persistent = MemoryStore::new();
        let session = MemoryStore::new();
        let clock = ManualClock::new(epoch());
        let navigator = Arc::new(RecordingNavigator::default());
        let auth = Arc::new(AuthSession::new(
            StorageScopes::new(Arc::new(persistent.clone()), Arc::new(session.clone())),
            Arc::new(clock.clone()),
            navigator.clone(),
        ));
        Self {
            persistent,
            session,
            clock,
            navigator,
            auth,
        }
    }

    /// A second session over the same storage, as after a page reload.
    pub(super) fn reloaded(&self) -> Arc<AuthSession> {
        Arc::new(AuthSession::new(
            StorageScopes::new(
                Arc::new(self.persistent.clone()),
                Arc::new(self.session.clone()),
            ),
            Arc::new(self.clock.clone()),
            self.navigator.clone(),
        ))
    }

    pub(super) fn persist_issued_at(&self, audience: Audience, issued_at: DateTime<Utc>) {
        self.persistent
            .set(
                audience.storage_keys().issued_at,
                &issued_at.timestamp_millis().to_string(),
            )
            .expect("set issued_at");
    }
}

pub(super) fn login_payload(token: &str) -> serde_json::Value {
    serde_json::json!({
        "token": token,
        "adminUser": { "id": 4, "nombre": "Marta Ruiz", "email": "marta@example.org", "rol": "Analista" }
    })
}
