use serde::Serialize;

/// Out-of-band signals for the consumer, next to the ambient state
/// snapshots: transient notices (the toast channel) and the prompt to
/// re-run authorization.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EngineEvent {
    /// A user-facing, non-fatal notice, e.g. a control call that found
    /// no active device.
    Notice { message: String },
    /// Credentials are gone; the user must restart authorization.
    ReauthRequired,
}

impl EngineEvent {
    pub fn notice(message: impl Into<String>) -> Self {
        EngineEvent::Notice {
            message: message.into(),
        }
    }
}
