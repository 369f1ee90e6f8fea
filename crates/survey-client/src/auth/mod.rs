//! Credential lifecycle for the respondent and reports flows.

mod credential;
mod monitor;
mod session;

#[cfg(test)]
mod tests;

pub use credential::{
    expiry_warning, format_remaining, Audience, AuthError, Credential, CredentialKeys,
    CredentialStore, EntryPoint, Principal, PrincipalInfo, RestoreOutcome, SlotState,
};
pub use monitor::{MonitorError, MonitorStatus, SessionMonitor};
pub use session::{AuthSession, Navigator};
