pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod store;

pub use api::auth::Authenticator;
pub use api::client::{build_http, SpotifyClient};
pub use api::models::NowPlaying;
pub use config::Settings;
pub use engine::state::{PlaybackState, PositionSource, TrackSummary};
pub use engine::{EngineHandle, Intent, PlaybackEngine};
pub use error::{AppError, AppResult};
pub use events::EngineEvent;
pub use store::{CredentialStore, Credentials, FileStore, MemoryStore};
