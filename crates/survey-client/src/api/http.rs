use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, warn};
use url::Url;

use super::wire::unwrap_collection;
use super::{
    AnswerPayload, ApiError, GeneralData, ReportPage, ReportQuery, StoredAnswer, SurveyBackend,
};
use crate::auth::AuthSession;
use crate::config::BackendConfig;
use crate::questionnaire::{AnswerOption, Category, GeneralDataId, Question};

const CATEGORIES_PATH: &str = "categories/";
const QUESTIONS_PATH: &str = "questions/";
const OPTIONS_PATH: &str = "options/";
const GENERAL_DATA_PATH: &str = "general-data/";
const ANSWERS_PATH: &str = "answers/";
const ACCESS_CODE_PATH: &str = "auth/access-code/";
const ADMIN_LOGIN_PATH: &str = "auth/admin-login/";
const REPORTS_PATH: &str = "reports/";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Access {
    Public,
    Bearer,
}

/// reqwest-backed [`SurveyBackend`] with a fixed request deadline.
#[derive(Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: Url,
    timeout: Duration,
    auth: Arc<AuthSession>,
}

impl HttpBackend {
    pub fn new(config: &BackendConfig, auth: Arc<AuthSession>) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|err| ApiError::Transport(err.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            timeout: config.request_timeout,
            auth,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        self.base_url
            .join(path)
            .map_err(|err| ApiError::Transport(format!("invalid endpoint '{path}': {err}")))
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, ApiError> {
        Ok(self.client.request(method, self.endpoint(path)?))
    }

    async fn dispatch<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        access: Access,
    ) -> Result<T, ApiError> {
        let request = match access {
            Access::Bearer => match self.auth.bearer()? {
                Some(token) => request.bearer_auth(token),
                None => request,
            },
            Access::Public => request,
        };

        let response = request.send().await.map_err(|err| self.map_transport(err))?;
        let status = response.status();
        let body = response.text().await.map_err(|err| self.map_transport(err))?;

        if !status.is_success() {
            return Err(self.rejection(status, body));
        }

        let value = if body.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&body).map_err(|err| ApiError::Decode(err.to_string()))?
        };
        serde_json::from_value(value).map_err(|err| ApiError::Decode(err.to_string()))
    }

    async fn fetch_collection<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>, ApiError> {
        let request = self.request(Method::GET, path)?;
        let response: Value = self.dispatch(request, Access::Bearer).await?;
        decode_collection(response)
    }

    fn rejection(&self, status: StatusCode, body: String) -> ApiError {
        let code = status.as_u16();
        if status == StatusCode::FORBIDDEN && body.to_ascii_lowercase().contains("token") {
            warn!(status = code, "backend invalidated the session token");
            self.auth.invalidate_all();
            return ApiError::AuthInvalid { status: code };
        }

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                ApiError::AuthInvalid { status: code }
            }
            _ => ApiError::Http { status: code, body },
        }
    }

    fn map_transport(&self, err: reqwest::Error) -> ApiError {
        if err.is_timeout() {
            ApiError::Timeout(self.timeout)
        } else {
            ApiError::Transport(err.to_string())
        }
    }
}

impl std::fmt::Debug for HttpBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpBackend")
            .field("base_url", &self.base_url.as_str())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

fn decode_collection<T: DeserializeOwned>(response: Value) -> Result<Vec<T>, ApiError> {
    match unwrap_collection(response) {
        Value::Null => Ok(Vec::new()),
        collection => {
            serde_json::from_value(collection).map_err(|err| ApiError::Decode(err.to_string()))
        }
    }
}

#[async_trait]
impl SurveyBackend for HttpBackend {
    async fn fetch_categories(&self) -> Result<Vec<Category>, ApiError> {
        self.fetch_collection(CATEGORIES_PATH).await
    }

    async fn fetch_questions(&self) -> Result<Vec<Question>, ApiError> {
        self.fetch_collection(QUESTIONS_PATH).await
    }

    async fn fetch_options(&self) -> Result<Vec<AnswerOption>, ApiError> {
        self.fetch_collection(OPTIONS_PATH).await
    }

    async fn fetch_general_data(&self) -> Result<Option<GeneralData>, ApiError> {
        let request = self.request(Method::GET, GENERAL_DATA_PATH)?;
        let response: Value = match self.dispatch(request, Access::Bearer).await {
            Ok(value) => value,
            Err(ApiError::Http { status: 404, .. }) => return Ok(None),
            Err(err) => return Err(err),
        };

        let record = match unwrap_collection(response) {
            Value::Array(mut rows) if !rows.is_empty() => rows.swap_remove(0),
            Value::Array(_) | Value::Null => return Ok(None),
            other => other,
        };
        serde_json::from_value(record)
            .map(Some)
            .map_err(|err| ApiError::Decode(err.to_string()))
    }

    async fn create_general_data(&self, data: &GeneralData) -> Result<Value, ApiError> {
        let request = self.request(Method::POST, GENERAL_DATA_PATH)?.json(data);
        self.dispatch(request, Access::Bearer).await
    }

    async fn update_general_data(
        &self,
        id: GeneralDataId,
        data: &GeneralData,
    ) -> Result<Value, ApiError> {
        let path = format!("{GENERAL_DATA_PATH}{id}/");
        let request = self.request(Method::PUT, &path)?.json(data);
        self.dispatch(request, Access::Bearer).await
    }

    async fn fetch_answers(&self, form: GeneralDataId) -> Result<Vec<StoredAnswer>, ApiError> {
        let request = self
            .request(Method::GET, ANSWERS_PATH)?
            .query(&[("general_data_id", form.0)]);
        let response: Value = self.dispatch(request, Access::Bearer).await?;
        decode_collection(response)
    }

    async fn create_answer(&self, payload: &AnswerPayload) -> Result<Value, ApiError> {
        debug!(question_id = %payload.question_id, "creating answer record");
        let request = self.request(Method::POST, ANSWERS_PATH)?.json(payload);
        self.dispatch(request, Access::Bearer).await
    }

    async fn update_answer(&self, payload: &AnswerPayload) -> Result<Value, ApiError> {
        let id = payload
            .id
            .ok_or_else(|| ApiError::Decode("answer update requires a record id".to_string()))?;
        debug!(question_id = %payload.question_id, record_id = %id, "updating answer record");
        let path = format!("{ANSWERS_PATH}{id}/");
        let request = self.request(Method::PUT, &path)?.json(payload);
        self.dispatch(request, Access::Bearer).await
    }

    async fn authenticate_access_code(&self, code: &str) -> Result<Value, ApiError> {
        let request = self
            .request(Method::POST, ACCESS_CODE_PATH)?
            .json(&json!({ "code": code }));
        self.dispatch(request, Access::Public).await
    }

    async fn admin_login(&self, email: &str, password: &str) -> Result<Value, ApiError> {
        let request = self
            .request(Method::POST, ADMIN_LOGIN_PATH)?
            .json(&json!({ "email": email, "password": password }));
        self.dispatch(request, Access::Public).await
    }

    async fn fetch_reports(&self, query: ReportQuery) -> Result<ReportPage, ApiError> {
        let request = self.request(Method::GET, REPORTS_PATH)?.query(&query);
        let response: Value = self.dispatch(request, Access::Bearer).await?;
        Ok(ReportPage::from_response(response, query))
    }
}
