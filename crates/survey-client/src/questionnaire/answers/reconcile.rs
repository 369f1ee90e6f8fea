//! Update-vs-create routing with a per-key in-flight guard.
//!
//! At most one request per [`ReconciliationKey`] is outstanding. Submissions
//! arriving meanwhile share a single pending slot: a newer value replaces an
//! older pending one (which resolves as [`SubmitOutcome::Superseded`]) and the
//! survivor is sent once the outstanding request finishes, so it observes the
//! record id that request stored.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use super::{AnswerRecord, AnswerStore, ReconciliationKey, SubmitOutcome, SyncError};
use crate::api::{extract_record_id, AnswerPayload, SurveyBackend};
use crate::questionnaire::AnswerRecordId;

type Reply = oneshot::Sender<Result<SubmitOutcome, SyncError>>;

struct Pending {
    record: AnswerRecord,
    reply: Reply,
}

/// Keys with an outstanding request, each holding at most one queued record.
#[derive(Default)]
pub(super) struct InFlight {
    slots: Mutex<HashMap<ReconciliationKey, Option<Pending>>>,
}

enum Claim {
    Owner,
    Queued(oneshot::Receiver<Result<SubmitOutcome, SyncError>>),
}

impl InFlight {
    fn claim(&self, record: &AnswerRecord) -> Claim {
        let key = record.key();
        let mut slots = self.slots.lock().expect("in-flight mutex poisoned");
        let Some(slot) = slots.get_mut(&key) else {
            slots.insert(key, None);
            return Claim::Owner;
        };

        let (reply, receiver) = oneshot::channel();
        let queued = Pending {
            record: record.clone(),
            reply,
        };
        if let Some(replaced) = slot.replace(queued) {
            debug!(question_id = %key.question_id, "pending answer superseded");
            let _ = replaced.reply.send(Ok(SubmitOutcome::Superseded));
        }
        Claim::Queued(receiver)
    }

    /// Next queued record for `key`, or releases the key when none is waiting.
    fn next(&self, key: &ReconciliationKey) -> Option<Pending> {
        let mut slots = self.slots.lock().expect("in-flight mutex poisoned");
        let pending = slots.get_mut(key).and_then(Option::take);
        if pending.is_none() {
            slots.remove(key);
        }
        pending
    }

    fn release(&self, key: &ReconciliationKey) {
        self.slots
            .lock()
            .expect("in-flight mutex poisoned")
            .remove(key);
    }
}

/// Frees the key if the owning future is dropped mid-request. A queued
/// submitter then sees its reply channel close and takes over.
struct OwnerGuard<'a> {
    in_flight: &'a InFlight,
    key: ReconciliationKey,
    armed: bool,
}

impl Drop for OwnerGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.in_flight.release(&self.key);
        }
    }
}

impl<B> AnswerStore<B>
where
    B: SurveyBackend + ?Sized + 'static,
{
    /// Persists one answer, creating the server record or updating the one
    /// recorded for its key.
    pub async fn submit_answer(&self, record: AnswerRecord) -> Result<SubmitOutcome, SyncError> {
        loop {
            match self.inner.in_flight.claim(&record) {
                Claim::Owner => return self.drive(record).await,
                Claim::Queued(receiver) => match receiver.await {
                    Ok(result) => return result,
                    // Owner dropped before sending ours; take over.
                    Err(_) => continue,
                },
            }
        }
    }

    async fn drive(&self, record: AnswerRecord) -> Result<SubmitOutcome, SyncError> {
        let key = record.key();
        let mut guard = OwnerGuard {
            in_flight: &self.inner.in_flight,
            key,
            armed: true,
        };

        let first = self.persist(&record).await;
        while let Some(Pending { record, reply }) = self.inner.in_flight.next(&key) {
            let result = self.persist(&record).await;
            let _ = reply.send(result);
        }

        guard.armed = false;
        first
    }

    async fn persist(&self, record: &AnswerRecord) -> Result<SubmitOutcome, SyncError> {
        let key = record.key();
        let Some(value) = record.value.as_number() else {
            debug!(question_id = %key.question_id, value = %record.value, "non-numeric answer not submitted");
            return Ok(SubmitOutcome::Skipped);
        };

        let mut payload = AnswerPayload {
            id: None,
            general_data_id: record.general_data_id,
            category_id: record.category_id,
            question_id: record.question_id,
            value,
        };
        let backend = &self.inner.backend;

        let Some(recorded) = self.recorded_id(&key)? else {
            let response = backend.create_answer(&payload).await?;
            let id = self.remember(&key, extract_record_id(&response))?;
            info!(question_id = %key.question_id, answer_id = ?id, "answer created");
            return Ok(SubmitOutcome::Created(id));
        };

        payload.id = Some(recorded);
        match backend.update_answer(&payload).await {
            Ok(_) => {
                debug!(question_id = %key.question_id, answer_id = %recorded, "answer updated");
                Ok(SubmitOutcome::Updated(recorded))
            }
            Err(err) if err.is_auth() => Err(err.into()),
            Err(err) => {
                warn!(
                    question_id = %key.question_id,
                    answer_id = %recorded,
                    error = %err,
                    "answer update failed, creating a new record"
                );
                payload.id = None;
                let response = backend.create_answer(&payload).await?;
                let id = self.remember(&key, extract_record_id(&response))?;
                info!(question_id = %key.question_id, answer_id = ?id, "answer recreated");
                Ok(SubmitOutcome::Recreated(id))
            }
        }
    }

    /// Stores a freshly returned id; a response without one clears any stale id.
    fn remember(
        &self,
        key: &ReconciliationKey,
        id: Option<i64>,
    ) -> Result<Option<AnswerRecordId>, SyncError> {
        match id.map(AnswerRecordId) {
            Some(id) => {
                self.record_id(key, id)?;
                Ok(Some(id))
            }
            None => {
                warn!(question_id = %key.question_id, "create response carried no record id");
                self.forget_id(key)?;
                Ok(None)
            }
        }
    }
}
