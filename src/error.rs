#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Authorization code exchange failed: {status} - {message}")]
    AuthExchange { status: u16, message: String },

    #[error("Re-authentication required")]
    ReauthRequired,

    #[error("No active playback device")]
    NoActiveDevice,

    #[error("Spotify API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    pub fn kind(&self) -> &str {
        match self {
            AppError::Http(_) => "http",
            AppError::Json(_) => "json",
            AppError::AuthExchange { .. } => "auth_exchange",
            AppError::ReauthRequired => "reauth_required",
            AppError::NoActiveDevice => "no_active_device",
            AppError::Api { .. } => "api",
            AppError::Config(_) => "config",
            AppError::Io(_) => "io",
        }
    }

    /// Failures that mean the stored credentials are no longer usable.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, AppError::ReauthRequired | AppError::AuthExchange { .. })
    }
}

pub type AppResult<T> = Result<T, AppError>;
