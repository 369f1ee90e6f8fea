use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::questionnaire::{AnswerRecordId, CategoryId, GeneralDataId, OptionValue, QuestionId};

/// Respondent details held on the general-data record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneralData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<GeneralDataId>,
    #[serde(default)]
    pub company: String,
    #[serde(default)]
    pub nit: String,
    #[serde(default)]
    pub sector: String,
    #[serde(default)]
    pub employees_number: String,
    #[serde(default)]
    pub chief_name: String,
    #[serde(default)]
    pub company_role: String,
    #[serde(default)]
    pub chief_email: String,
}

/// Answer record as returned when listing a form instance's answers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredAnswer {
    #[serde(default)]
    pub id: Option<AnswerRecordId>,
    pub general_data_id: GeneralDataId,
    pub category_id: CategoryId,
    pub question_id: QuestionId,
    pub value: OptionValue,
}

/// Body for creating or updating one answer record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<AnswerRecordId>,
    pub general_data_id: GeneralDataId,
    pub category_id: CategoryId,
    pub question_id: QuestionId,
    pub value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReportQuery {
    pub page: u32,
    pub per_page: u32,
}

impl Default for ReportQuery {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 10,
        }
    }
}

/// One page of submissions for the reports view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportPage {
    pub items: Vec<Value>,
    pub page: u32,
    pub per_page: u32,
    pub total: u64,
}

impl ReportPage {
    /// Accepts a bare array or an object wrapping the rows under
    /// `data`, `results`, or `items`, with the count under `total` or `count`.
    pub fn from_response(response: Value, query: ReportQuery) -> Self {
        let total_hint = ["total", "count"]
            .iter()
            .find_map(|field| response.get(*field).and_then(Value::as_u64));
        let page = response
            .get("page")
            .and_then(Value::as_u64)
            .map_or(query.page, |page| page as u32);

        let items = match unwrap_collection(response) {
            Value::Array(items) => items,
            _ => Vec::new(),
        };
        let total = total_hint.unwrap_or(items.len() as u64);

        Self {
            items,
            page,
            per_page: query.per_page,
            total,
        }
    }
}

/// Strips a `data`/`results`/`items` envelope around a collection if present.
pub(crate) fn unwrap_collection(response: Value) -> Value {
    match response {
        Value::Object(mut object) => ["data", "results", "items"]
            .iter()
            .find_map(|field| object.remove(*field).filter(Value::is_array))
            .unwrap_or(Value::Object(object)),
        other => other,
    }
}
