//! Client core for a weighted questionnaire: reference-data loading, scoring,
//! incremental answer persistence, and the time-limited credentials that
//! guard the respondent and reports flows.

pub mod api;
pub mod auth;
pub mod client;
pub mod clock;
pub mod config;
pub mod error;
pub mod questionnaire;
pub mod storage;
pub mod telemetry;
