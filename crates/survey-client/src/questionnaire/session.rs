use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::answers::{AnswerStore, SubmissionFailure, SyncError};
use super::catalog::Catalog;
use super::domain::{
    AnswerOption, Category, CategoryId, GeneralDataId, OptionValue, Question, QuestionId,
};
use super::scoring::{ScoreCalculator, ScoreSummary};
use crate::api::{extract_record_id, ApiError, GeneralData, StoredAnswer, SurveyBackend};
use crate::auth::{AuthError, AuthSession};
use crate::storage::{StorageError, StorageScopes};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadState {
    Idle,
    Loading,
    Ready,
    Failed(String),
}

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("failed to fetch reference data: {0}")]
    ReferenceData(#[source] ApiError),
    #[error("failed to fetch stored answers: {0}")]
    StoredAnswers(#[source] ApiError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Auth(#[from] AuthError),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("no questions are loaded")]
    NothingLoaded,
    #[error("{} question(s) still need an answer", missing.len())]
    MissingAnswers { missing: Vec<QuestionId> },
}

struct SessionState {
    catalog: Catalog,
    load_state: LoadState,
}

/// One respondent's questionnaire: reference data, answers and scores.
pub struct QuestionnaireSession<B: ?Sized> {
    backend: Arc<B>,
    auth: Arc<AuthSession>,
    answers: AnswerStore<B>,
    state: RwLock<SessionState>,
}

impl<B> QuestionnaireSession<B>
where
    B: SurveyBackend + ?Sized + 'static,
{
    pub fn new(backend: Arc<B>, auth: Arc<AuthSession>, storage: StorageScopes) -> Self {
        Self {
            answers: AnswerStore::new(Arc::clone(&backend), storage),
            backend,
            auth,
            state: RwLock::new(SessionState {
                catalog: Catalog::default(),
                load_state: LoadState::Idle,
            }),
        }
    }

    /// Restores credentials, fetches the reference data and any stored
    /// answers for the current form instance, then commits them together.
    ///
    /// On failure the previously loaded data stays in place and the load
    /// state becomes [`LoadState::Failed`].
    pub async fn load(&self) -> Result<(), LoadError> {
        self.write_state().load_state = LoadState::Loading;

        match self.fetch_all().await {
            Ok((catalog, stored)) => {
                let hydrated = match self.answers.hydrate(&stored) {
                    Ok(count) => count,
                    Err(err) => return Err(self.fail(err.into())),
                };
                let mut state = self.write_state();
                info!(
                    categories = catalog.categories().len(),
                    questions = catalog.questions().len(),
                    answers = hydrated,
                    "questionnaire loaded"
                );
                state.catalog = catalog;
                state.load_state = LoadState::Ready;
                Ok(())
            }
            Err(err) => Err(self.fail(err)),
        }
    }

    async fn fetch_all(&self) -> Result<(Catalog, Vec<StoredAnswer>), LoadError> {
        self.auth.restore_all()?;

        let backend = &self.backend;
        let (categories, questions, options) = tokio::try_join!(
            backend.fetch_categories(),
            backend.fetch_questions(),
            backend.fetch_options(),
        )
        .map_err(LoadError::ReferenceData)?;
        let catalog = Catalog::assemble(categories, questions, options);

        let stored = match self.answers.form_instance()? {
            Some(form) => backend
                .fetch_answers(form)
                .await
                .map_err(LoadError::StoredAnswers)?,
            None => Vec::new(),
        };
        Ok((catalog, stored))
    }

    fn fail(&self, err: LoadError) -> LoadError {
        warn!(error = %err, "questionnaire load failed");
        self.write_state().load_state = LoadState::Failed(err.to_string());
        err
    }

    pub fn load_state(&self) -> LoadState {
        self.read_state().load_state.clone()
    }

    pub fn categories(&self) -> Vec<Category> {
        self.read_state().catalog.categories().to_vec()
    }

    pub fn questions_for(&self, category: CategoryId) -> Vec<Question> {
        self.read_state().catalog.questions_for(category).to_vec()
    }

    pub fn options(&self) -> Vec<AnswerOption> {
        self.read_state().catalog.options().to_vec()
    }

    pub fn answer(&self, question: QuestionId) -> Option<OptionValue> {
        self.answers.answer(question)
    }

    pub fn answers(&self) -> BTreeMap<QuestionId, OptionValue> {
        self.answers.answers()
    }

    pub fn answer_store(&self) -> &AnswerStore<B> {
        &self.answers
    }

    pub fn subscribe_failures(&self) -> broadcast::Receiver<SubmissionFailure> {
        self.answers.subscribe_failures()
    }

    /// Records an answer and submits it in the background when a form
    /// instance exists. Answers to unknown questions stay local.
    pub fn set_answer(&self, question: QuestionId, value: OptionValue) -> Option<JoinHandle<()>> {
        let state = self.read_state();
        let Some(known) = state.catalog.question(question) else {
            debug!(question_id = %question, "answer for unknown question kept locally");
            self.answers.set_local(question, value);
            return None;
        };
        self.answers
            .set_answer(known, value, state.catalog.options())
    }

    pub fn is_complete(&self) -> bool {
        self.validate().is_ok()
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let state = self.read_state();
        let questions = state.catalog.questions();
        if questions.is_empty() {
            return Err(ValidationError::NothingLoaded);
        }

        let answers = self.answers.answers();
        let missing: Vec<QuestionId> = questions
            .iter()
            .map(|question| question.id)
            .filter(|id| answers.get(id).map_or(true, OptionValue::is_empty))
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::MissingAnswers { missing })
        }
    }

    /// Runs `f` against a calculator over the current catalog and answers.
    pub fn score_calculator<R>(&self, f: impl FnOnce(&ScoreCalculator<'_>) -> R) -> R {
        let state = self.read_state();
        let answers = self.answers.answers();
        let provisional = matches!(state.load_state, LoadState::Failed(_));
        let calculator = ScoreCalculator::new(&state.catalog, &answers).provisional(provisional);
        f(&calculator)
    }

    pub fn category_score(&self, category: CategoryId) -> String {
        self.score_calculator(|scores| scores.category_score(category))
    }

    pub fn total_score(&self) -> String {
        self.score_calculator(|scores| scores.total_score())
    }

    pub fn summary(&self) -> ScoreSummary {
        self.score_calculator(|scores| scores.summary())
    }

    pub fn form_instance(&self) -> Result<Option<GeneralDataId>, StorageError> {
        self.answers.form_instance()
    }

    pub fn set_form_instance(&self, id: Option<GeneralDataId>) -> Result<(), StorageError> {
        self.answers.set_form_instance(id)
    }

    /// Returns the persisted form instance, creating one with an empty
    /// general-data submission if none exists.
    pub async fn ensure_form_instance(&self) -> Result<GeneralDataId, SyncError> {
        if let Some(id) = self.answers.form_instance()? {
            return Ok(id);
        }

        let response = self
            .backend
            .create_general_data(&GeneralData::default())
            .await?;
        let id = extract_record_id(&response)
            .map(GeneralDataId)
            .ok_or_else(|| ApiError::Decode("general data response carried no id".to_string()))?;
        self.answers.set_form_instance(Some(id))?;
        info!(general_data_id = %id, "form instance created");
        Ok(id)
    }

    /// Fetches the respondent's general data, adopting its id as the form instance.
    pub async fn load_general_data(&self) -> Option<GeneralData> {
        let data = match self.backend.fetch_general_data().await {
            Ok(Some(data)) => data,
            Ok(None) => return None,
            Err(err) => {
                warn!(error = %err, "failed to fetch general data");
                return None;
            }
        };

        if let Some(id) = data.id {
            if let Err(err) = self.answers.set_form_instance(Some(id)) {
                warn!(general_data_id = %id, error = %err, "failed to persist form instance");
            }
        }
        Some(data)
    }

    pub async fn update_general_data(&self, details: &GeneralData) -> Result<GeneralDataId, SyncError> {
        let id = self.ensure_form_instance().await?;
        let mut details = details.clone();
        details.id = Some(id);
        self.backend.update_general_data(id, &details).await?;
        debug!(general_data_id = %id, "general data updated");
        Ok(id)
    }

    fn read_state(&self) -> RwLockReadGuard<'_, SessionState> {
        self.state.read().expect("session lock poisoned")
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, SessionState> {
        self.state.write().expect("session lock poisoned")
    }
}

impl<B: ?Sized> std::fmt::Debug for QuestionnaireSession<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuestionnaireSession")
            .field("answers", &self.answers)
            .finish_non_exhaustive()
    }
}
