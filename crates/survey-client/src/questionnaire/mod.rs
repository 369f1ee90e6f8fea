//! Questionnaire reference data, answers and scoring.

mod answers;
mod catalog;
mod domain;
mod scoring;
mod session;

#[cfg(test)]
mod tests;

pub use answers::{
    AnswerRecord, AnswerStore, ReconciliationKey, SubmissionFailure, SubmitOutcome, SyncError,
};
pub use catalog::Catalog;
pub use domain::{
    match_option, AnswerOption, AnswerRecordId, Category, CategoryId, GeneralDataId, OptionValue,
    Question, QuestionId, DEFAULT_CATEGORY_WEIGHT,
};
pub use scoring::{
    format_score, points_for_answer, CategoryResult, ScoreBand, ScoreCalculator, ScoreSummary,
    LABEL_POINTS,
};
pub use session::{LoadError, LoadState, QuestionnaireSession, ValidationError};
