use std::fmt;

use serde::{Deserialize, Serialize};

/// Weight applied to a category whose record omits one.
pub const DEFAULT_CATEGORY_WEIGHT: f64 = 25.0;

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

numeric_id!(CategoryId);
numeric_id!(QuestionId);
numeric_id!(
    /// Identifier of one respondent's questionnaire submission ("general data").
    GeneralDataId
);
numeric_id!(
    /// Server-assigned id of a persisted answer record.
    AnswerRecordId
);

/// Weighted grouping of questions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    #[serde(default, alias = "nombre")]
    pub name: String,
    #[serde(default, alias = "descripcion")]
    pub description: String,
    #[serde(default, alias = "peso")]
    pub weight: Option<f64>,
    #[serde(default)]
    pub order: Option<i64>,
}

impl Category {
    pub fn weight(&self) -> f64 {
        self.weight.unwrap_or(DEFAULT_CATEGORY_WEIGHT)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: QuestionId,
    #[serde(rename = "categoryId", alias = "category_id", alias = "categoriaId")]
    pub category_id: CategoryId,
    #[serde(default, alias = "texto")]
    pub text: String,
    #[serde(default)]
    pub order: Option<i64>,
}

/// Raw answer token: options and stored answers carry either a number or a label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Number(f64),
    Text(String),
}

impl OptionValue {
    /// Numeric reading of the token; labels that parse as numbers count.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            OptionValue::Number(value) => Some(*value).filter(|value| value.is_finite()),
            OptionValue::Text(text) => text
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|value| value.is_finite()),
        }
    }

    /// String form used when an exact comparison fails.
    pub fn coerced(&self) -> String {
        self.to_string()
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, OptionValue::Text(text) if text.trim().is_empty())
    }

    pub fn matches(&self, other: &OptionValue) -> bool {
        self == other || self.coerced() == other.coerced()
    }
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionValue::Number(value) => write!(f, "{value}"),
            OptionValue::Text(text) => f.write_str(text),
        }
    }
}

impl From<f64> for OptionValue {
    fn from(value: f64) -> Self {
        OptionValue::Number(value)
    }
}

impl From<i64> for OptionValue {
    fn from(value: i64) -> Self {
        OptionValue::Number(value as f64)
    }
}

impl From<&str> for OptionValue {
    fn from(value: &str) -> Self {
        OptionValue::Text(value.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(value: String) -> Self {
        OptionValue::Text(value)
    }
}

/// A selectable answer with its point value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerOption {
    pub value: OptionValue,
    #[serde(default)]
    pub points: Option<f64>,
    #[serde(default, alias = "text", alias = "texto")]
    pub label: Option<String>,
    #[serde(default)]
    pub order: Option<i64>,
}

/// Finds the option for `value`: exact match first, then string-coerced.
pub fn match_option<'a>(
    options: &'a [AnswerOption],
    value: &OptionValue,
) -> Option<&'a AnswerOption> {
    options
        .iter()
        .find(|option| &option.value == value)
        .or_else(|| {
            let coerced = value.coerced();
            options
                .iter()
                .find(|option| option.value.coerced() == coerced)
        })
}
