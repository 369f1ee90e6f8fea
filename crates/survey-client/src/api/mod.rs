//! Backend seam: the REST endpoints the questionnaire consumes.

mod error;
mod extract;
mod http;
mod wire;

pub use error::ApiError;
pub use extract::extract_record_id;
pub use http::HttpBackend;
pub use wire::{AnswerPayload, GeneralData, ReportPage, ReportQuery, StoredAnswer};

use async_trait::async_trait;
use serde_json::Value;

use crate::questionnaire::{AnswerOption, Category, GeneralDataId, Question};

/// Endpoints exposed by the survey backend.
///
/// Create/update calls return the raw response body; ids are pulled out
/// through [`extract_record_id`] by the caller.
#[async_trait]
pub trait SurveyBackend: Send + Sync {
    async fn fetch_categories(&self) -> Result<Vec<Category>, ApiError>;
    async fn fetch_questions(&self) -> Result<Vec<Question>, ApiError>;
    async fn fetch_options(&self) -> Result<Vec<AnswerOption>, ApiError>;

    async fn fetch_general_data(&self) -> Result<Option<GeneralData>, ApiError>;
    async fn create_general_data(&self, data: &GeneralData) -> Result<Value, ApiError>;
    async fn update_general_data(
        &self,
        id: GeneralDataId,
        data: &GeneralData,
    ) -> Result<Value, ApiError>;

    async fn fetch_answers(&self, form: GeneralDataId) -> Result<Vec<StoredAnswer>, ApiError>;
    async fn create_answer(&self, payload: &AnswerPayload) -> Result<Value, ApiError>;
    /// `payload.id` carries the record being updated.
    async fn update_answer(&self, payload: &AnswerPayload) -> Result<Value, ApiError>;

    async fn authenticate_access_code(&self, code: &str) -> Result<Value, ApiError>;
    async fn admin_login(&self, email: &str, password: &str) -> Result<Value, ApiError>;
    async fn fetch_reports(&self, query: ReportQuery) -> Result<ReportPage, ApiError>;
}
