use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Value};
use tokio::sync::Semaphore;

use crate::api::{
    ApiError, AnswerPayload, GeneralData, ReportPage, ReportQuery, StoredAnswer, SurveyBackend,
};
use crate::auth::{AuthSession, EntryPoint, Navigator};
use crate::clock::ManualClock;
use crate::questionnaire::{
    AnswerOption, Category, CategoryId, GeneralDataId, OptionValue, Question, QuestionId,
    QuestionnaireSession,
};
use crate::storage::{MemoryStore, StorageScopes};

#[derive(Debug, Clone, PartialEq)]
pub(super) enum Call {
    FetchAnswers(GeneralDataId),
    CreateAnswer(AnswerPayload),
    UpdateAnswer(AnswerPayload),
    CreateGeneralData,
    UpdateGeneralData(GeneralDataId),
}

fn fault(status: u16) -> ApiError {
    match status {
        401 | 403 => ApiError::AuthInvalid { status },
        _ => ApiError::Http {
            status,
            body: "injected".to_string(),
        },
    }
}

/// In-memory backend that records every write and can be told to fail.
#[derive(Default)]
pub(super) struct RecordingBackend {
    pub(super) categories: Mutex<Vec<Category>>,
    pub(super) questions: Mutex<Vec<Question>>,
    pub(super) options: Mutex<Vec<AnswerOption>>,
    pub(super) stored: Mutex<Vec<StoredAnswer>>,
    pub(super) general_data: Mutex<Option<GeneralData>>,
    /// Status returned by the reference-data fetch, answer create and answer update.
    pub(super) options_fault: Mutex<Option<u16>>,
    pub(super) create_fault: Mutex<Option<u16>>,
    pub(super) update_fault: Mutex<Option<u16>>,
    gate: Mutex<Option<Arc<Semaphore>>>,
    calls: Mutex<Vec<Call>>,
    next_id: AtomicI64,
}

impl RecordingBackend {
    pub(super) fn with_catalog() -> Self {
        let backend = Self::default();
        let (categories, questions, options) = catalog_fixture();
        *backend.categories.lock().expect("fixture") = categories;
        *backend.questions.lock().expect("fixture") = questions;
        *backend.options.lock().expect("fixture") = options;
        backend
    }

    pub(super) fn calls(&self) -> Vec<Call> {
        self.calls.lock().expect("calls mutex").clone()
    }

    pub(super) fn answer_writes(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|call| matches!(call, Call::CreateAnswer(_) | Call::UpdateAnswer(_)))
            .collect()
    }

    /// Holds answer writes until permits are added to the returned semaphore.
    pub(super) fn close_gate(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.gate.lock().expect("gate mutex") = Some(gate.clone());
        gate
    }

    pub(super) fn fail(slot: &Mutex<Option<u16>>, status: u16) {
        *slot.lock().expect("fault mutex") = Some(status);
    }

    fn record(&self, call: Call) {
        self.calls.lock().expect("calls mutex").push(call);
    }

    fn check(slot: &Mutex<Option<u16>>) -> Result<(), ApiError> {
        match *slot.lock().expect("fault mutex") {
            Some(status) => Err(fault(status)),
            None => Ok(()),
        }
    }

    async fn pass_gate(&self) {
        let gate = self.gate.lock().expect("gate mutex").clone();
        if let Some(gate) = gate {
            gate.acquire().await.expect("gate open").forget();
        }
    }

    fn issue_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst) + 1
    }
}

#[async_trait]
impl SurveyBackend for RecordingBackend {
    async fn fetch_categories(&self) -> Result<Vec<Category>, ApiError> {
        Ok(self.categories.lock().expect("fixture").clone())
    }

    async fn fetch_questions(&self) -> Result<Vec<Question>, ApiError> {
        Ok(self.questions.lock().expect("fixture").clone())
    }

    async fn fetch_options(&self) -> Result<Vec<AnswerOption>, ApiError> {
        Self::check(&self.options_fault)?;
        Ok(self.options.lock().expect("fixture").clone())
    }

    async fn fetch_general_data(&self) -> Result<Option<GeneralData>, ApiError> {
        Ok(self.general_data.lock().expect("fixture").clone())
    }

    async fn create_general_data(&self, _data: &GeneralData) -> Result<Value, ApiError> {
        self.record(Call::CreateGeneralData);
        Ok(json!({ "data": { "id": 70 + self.issue_id() } }))
    }

    async fn update_general_data(
        &self,
        id: GeneralDataId,
        data: &GeneralData,
    ) -> Result<Value, ApiError> {
        self.record(Call::UpdateGeneralData(id));
        Ok(serde_json::to_value(data).expect("general data serializes"))
    }

    async fn fetch_answers(&self, form: GeneralDataId) -> Result<Vec<StoredAnswer>, ApiError> {
        self.record(Call::FetchAnswers(form));
        Ok(self
            .stored
            .lock()
            .expect("fixture")
            .iter()
            .filter(|answer| answer.general_data_id == form)
            .cloned()
            .collect())
    }

    async fn create_answer(&self, payload: &AnswerPayload) -> Result<Value, ApiError> {
        self.record(Call::CreateAnswer(payload.clone()));
        self.pass_gate().await;
        Self::check(&self.create_fault)?;
        Ok(json!({ "answer_id": self.issue_id() }))
    }

    async fn update_answer(&self, payload: &AnswerPayload) -> Result<Value, ApiError> {
        self.record(Call::UpdateAnswer(payload.clone()));
        self.pass_gate().await;
        Self::check(&self.update_fault)?;
        Ok(json!({ "id": payload.id }))
    }

    async fn authenticate_access_code(&self, code: &str) -> Result<Value, ApiError> {
        Ok(json!({ "token": format!("resp-{code}"), "user": { "id": 1 } }))
    }

    async fn admin_login(&self, _email: &str, _password: &str) -> Result<Value, ApiError> {
        Ok(json!({ "token": "rpt" }))
    }

    async fn fetch_reports(&self, query: ReportQuery) -> Result<ReportPage, ApiError> {
        Ok(ReportPage::from_response(json!([]), query))
    }
}

#[derive(Debug, Default)]
pub(super) struct SilentNavigator {
    visits: Mutex<Vec<EntryPoint>>,
}

impl SilentNavigator {
    pub(super) fn visits(&self) -> Vec<EntryPoint> {
        self.visits.lock().expect("navigator mutex").clone()
    }
}

impl Navigator for SilentNavigator {
    fn navigate(&self, entry_point: EntryPoint) {
        self.visits.lock().expect("navigator mutex").push(entry_point);
    }
}

pub(super) fn category(id: i64, weight: f64, order: i64) -> Category {
    Category {
        id: CategoryId(id),
        name: format!("Categoría {id}"),
        description: String::new(),
        weight: Some(weight),
        order: Some(order),
    }
}

pub(super) fn question(id: i64, category: i64, order: Option<i64>) -> Question {
    Question {
        id: QuestionId(id),
        category_id: CategoryId(category),
        text: format!("Pregunta {id}"),
        order,
    }
}

pub(super) fn scale_option(value: f64, label: &str, order: i64) -> AnswerOption {
    AnswerOption {
        value: OptionValue::Number(value),
        points: None,
        label: Some(label.to_string()),
        order: Some(order),
    }
}

/// Two equally weighted categories, listed out of display order, two questions each.
pub(super) fn catalog_fixture() -> (Vec<Category>, Vec<Question>, Vec<AnswerOption>) {
    (
        vec![category(1, 50.0, 2), category(2, 50.0, 1)],
        vec![
            question(12, 1, Some(2)),
            question(11, 1, Some(1)),
            question(21, 2, None),
            question(22, 2, Some(1)),
        ],
        vec![
            scale_option(1.0, "No", 3),
            scale_option(3.0, "En Parte", 2),
            scale_option(5.0, "Si", 1),
        ],
    )
}

pub(super) fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0)
        .single()
        .expect("valid timestamp")
}

pub(super) struct Fixture {
    pub(super) backend: Arc<RecordingBackend>,
    pub(super) persistent: MemoryStore,
    pub(super) session_storage: MemoryStore,
    pub(super) clock: ManualClock,
    pub(super) navigator: Arc<SilentNavigator>,
    pub(super) auth: Arc<AuthSession>,
    pub(super) session: QuestionnaireSession<RecordingBackend>,
}

impl Fixture {
    pub(super) fn new() -> Self {
        Self::with_backend(RecordingBackend::with_catalog())
    }

    pub(super) fn with_backend(backend: RecordingBackend) -> Self {
        let backend = Arc::new(backend);
        let persistent = MemoryStore::new();
        let session_storage = MemoryStore::new();
        let storage =
            StorageScopes::new(Arc::new(persistent.clone()), Arc::new(session_storage.clone()));
        let clock = ManualClock::new(epoch());
        let navigator = Arc::new(SilentNavigator::default());
        let auth = Arc::new(AuthSession::new(
            storage.clone(),
            Arc::new(clock.clone()),
            navigator.clone(),
        ));
        let session = QuestionnaireSession::new(backend.clone(), auth.clone(), storage);
        Self {
            backend,
            persistent,
            session_storage,
            clock,
            navigator,
            auth,
            session,
        }
    }
}
