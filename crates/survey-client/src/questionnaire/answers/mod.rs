//! In-memory answer map plus its server-side mirror.
//!
//! Every answer lives in the local map first. When a form instance exists,
//! the answer is also persisted through [`AnswerStore::submit_answer`], which
//! routes to update or create based on the record id remembered under the
//! answer's [`ReconciliationKey`] in session storage.

mod reconcile;

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::domain::{
    match_option, AnswerOption, AnswerRecordId, CategoryId, GeneralDataId, OptionValue, Question,
    QuestionId,
};
use crate::api::{ApiError, StoredAnswer, SurveyBackend};
use crate::storage::{keys, StorageError, StorageScopes};

use reconcile::InFlight;

const FAILURE_CHANNEL_CAPACITY: usize = 32;

/// (form instance, category, question): decides create vs. update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReconciliationKey {
    pub general_data_id: GeneralDataId,
    pub category_id: CategoryId,
    pub question_id: QuestionId,
}

impl ReconciliationKey {
    pub fn storage_key(&self) -> String {
        format!(
            "{}{}_{}_{}",
            keys::ANSWER_PREFIX,
            self.general_data_id,
            self.category_id,
            self.question_id
        )
    }
}

/// One answer bound for the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct AnswerRecord {
    pub general_data_id: GeneralDataId,
    pub category_id: CategoryId,
    pub question_id: QuestionId,
    pub value: OptionValue,
}

impl AnswerRecord {
    pub fn key(&self) -> ReconciliationKey {
        ReconciliationKey {
            general_data_id: self.general_data_id,
            category_id: self.category_id,
            question_id: self.question_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// First submission; carries the id the server returned, if any.
    Created(Option<AnswerRecordId>),
    Updated(AnswerRecordId),
    /// The update failed and a fresh record was created instead.
    Recreated(Option<AnswerRecordId>),
    /// A newer value for the same key replaced this one before it was sent.
    Superseded,
    /// The value has no numeric form and stays local.
    Skipped,
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Non-blocking report of a failed background submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionFailure {
    pub question_id: QuestionId,
    pub message: String,
}

struct Inner<B: ?Sized> {
    backend: Arc<B>,
    storage: StorageScopes,
    answers: Mutex<BTreeMap<QuestionId, OptionValue>>,
    in_flight: InFlight,
    failures: broadcast::Sender<SubmissionFailure>,
}

pub struct AnswerStore<B: ?Sized> {
    inner: Arc<Inner<B>>,
}

impl<B: ?Sized> Clone for AnswerStore<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B> AnswerStore<B>
where
    B: SurveyBackend + ?Sized + 'static,
{
    pub fn new(backend: Arc<B>, storage: StorageScopes) -> Self {
        let (failures, _) = broadcast::channel(FAILURE_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                backend,
                storage,
                answers: Mutex::new(BTreeMap::new()),
                in_flight: InFlight::default(),
                failures,
            }),
        }
    }

    pub fn answer(&self, question: QuestionId) -> Option<OptionValue> {
        self.lock_answers().get(&question).cloned()
    }

    pub fn answers(&self) -> BTreeMap<QuestionId, OptionValue> {
        self.lock_answers().clone()
    }

    pub fn set_local(&self, question: QuestionId, value: OptionValue) {
        self.lock_answers().insert(question, value);
    }

    /// Seeds the map and the reconciliation keys from records already on the server.
    pub fn hydrate(&self, stored: &[StoredAnswer]) -> Result<usize, StorageError> {
        for answer in stored {
            if let Some(id) = answer.id {
                let key = ReconciliationKey {
                    general_data_id: answer.general_data_id,
                    category_id: answer.category_id,
                    question_id: answer.question_id,
                };
                self.record_id(&key, id)?;
            }
        }

        let mut answers = self.lock_answers();
        for answer in stored {
            answers.insert(answer.question_id, answer.value.clone());
        }
        Ok(stored.len())
    }

    pub fn form_instance(&self) -> Result<Option<GeneralDataId>, StorageError> {
        let Some(raw) = self.inner.storage.persistent.get(keys::GENERAL_DATA_ID)? else {
            return Ok(None);
        };
        raw.trim()
            .parse::<i64>()
            .map(|id| Some(GeneralDataId(id)))
            .map_err(|err| StorageError::Malformed {
                key: keys::GENERAL_DATA_ID.to_string(),
                detail: err.to_string(),
            })
    }

    pub fn set_form_instance(&self, id: Option<GeneralDataId>) -> Result<(), StorageError> {
        let persistent = &self.inner.storage.persistent;
        match id {
            Some(id) => persistent.set(keys::GENERAL_DATA_ID, &id.to_string()),
            None => persistent.remove(keys::GENERAL_DATA_ID),
        }
    }

    /// Record id remembered for `key`; unreadable entries are dropped.
    pub fn recorded_id(&self, key: &ReconciliationKey) -> Result<Option<AnswerRecordId>, StorageError> {
        let storage_key = key.storage_key();
        let session = &self.inner.storage.session;
        let Some(raw) = session.get(&storage_key)? else {
            return Ok(None);
        };
        match raw.trim().parse::<i64>() {
            Ok(id) if id > 0 => Ok(Some(AnswerRecordId(id))),
            _ => {
                warn!(key = %storage_key, "discarding unreadable answer record id");
                session.remove(&storage_key)?;
                Ok(None)
            }
        }
    }

    pub fn record_id(&self, key: &ReconciliationKey, id: AnswerRecordId) -> Result<(), StorageError> {
        self.inner
            .storage
            .session
            .set(&key.storage_key(), &id.to_string())
    }

    pub fn forget_id(&self, key: &ReconciliationKey) -> Result<(), StorageError> {
        self.inner.storage.session.remove(&key.storage_key())
    }

    pub fn subscribe_failures(&self) -> broadcast::Receiver<SubmissionFailure> {
        self.inner.failures.subscribe()
    }

    /// Stores `value` locally and, when a form instance exists, submits it in
    /// the background.
    ///
    /// The submitted token is the matched option's value, so a label typed as
    /// `"5"` is sent as the number 5. A value matching no option is only kept
    /// locally. Failures go to
    /// [`AnswerStore::subscribe_failures`]; the local answer is kept either way.
    /// Dropping the returned handle does not cancel the submission.
    pub fn set_answer(
        &self,
        question: &Question,
        value: OptionValue,
        options: &[AnswerOption],
    ) -> Option<JoinHandle<()>> {
        self.set_local(question.id, value.clone());

        let general_data_id = match self.form_instance() {
            Ok(Some(id)) => id,
            Ok(None) => {
                debug!(question_id = %question.id, "no form instance yet, answer kept locally");
                return None;
            }
            Err(err) => {
                warn!(question_id = %question.id, error = %err, "form instance unreadable, answer kept locally");
                return None;
            }
        };

        let Ok(runtime) = Handle::try_current() else {
            warn!(question_id = %question.id, "no async runtime, answer kept locally");
            return None;
        };

        let Some(option) = match_option(options, &value) else {
            debug!(question_id = %question.id, "answer matches no option, kept locally");
            return None;
        };
        let record = AnswerRecord {
            general_data_id,
            category_id: question.category_id,
            question_id: question.id,
            value: option.value.clone(),
        };
        let store = self.clone();
        Some(runtime.spawn(async move { store.submit_reporting(record).await }))
    }

    async fn submit_reporting(&self, record: AnswerRecord) {
        let question_id = record.question_id;
        match self.submit_answer(record).await {
            Ok(outcome) => debug!(%question_id, ?outcome, "answer submission settled"),
            Err(err) => {
                warn!(%question_id, error = %err, "answer submission failed");
                // Errs only when nobody is subscribed.
                let _ = self.inner.failures.send(SubmissionFailure {
                    question_id,
                    message: err.to_string(),
                });
            }
        }
    }

    fn lock_answers(&self) -> std::sync::MutexGuard<'_, BTreeMap<QuestionId, OptionValue>> {
        self.inner.answers.lock().expect("answer mutex poisoned")
    }
}

impl<B: ?Sized> std::fmt::Debug for AnswerStore<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let answered = self.inner.answers.lock().map(|map| map.len()).unwrap_or(0);
        f.debug_struct("AnswerStore")
            .field("answered", &answered)
            .finish_non_exhaustive()
    }
}
