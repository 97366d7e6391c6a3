use serde::{Deserialize, Serialize};

// Token endpoint payload
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: u64,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

// Playback domain types
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Track {
    pub id: String,
    pub name: String,
    pub duration_ms: u64,
    #[serde(default)]
    pub artists: Vec<Artist>,
    #[serde(default)]
    pub album: Option<Album>,
}

impl Track {
    pub fn artist_name(&self) -> &str {
        self.artists.first().map(|a| a.name.as_str()).unwrap_or("")
    }

    pub fn artwork_url(&self) -> Option<&str> {
        self.album
            .as_ref()
            .and_then(|album| album.images.first())
            .map(|image| image.url.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artist {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Album {
    pub name: String,
    #[serde(default)]
    pub images: Vec<Image>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Image {
    pub url: String,
}

/// `GET /me/player` 200 payload. `item` is absent for private sessions
/// and some episode types; callers treat that like an empty response.
#[derive(Debug, Deserialize)]
pub struct CurrentlyPlaying {
    #[serde(default)]
    pub progress_ms: Option<u64>,
    pub is_playing: bool,
    #[serde(default)]
    pub item: Option<Track>,
}

#[derive(Debug, Deserialize)]
pub struct RecentlyPlayed {
    #[serde(default)]
    pub items: Vec<PlayHistoryItem>,
}

#[derive(Debug, Deserialize)]
pub struct PlayHistoryItem {
    pub track: Track,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Device {
    pub id: Option<String>,
    pub is_active: bool,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct DevicesResponse {
    #[serde(default)]
    pub devices: Vec<Device>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserProfile {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub product: Option<String>,
}

/// The three things `state()` can report. Live and historical payloads
/// are deliberately distinct variants rather than one shape with
/// optional fields.
#[derive(Debug, Clone)]
pub enum NowPlaying {
    /// An active session exists; `is_playing` may still be false
    /// (paused on an active device).
    Live {
        track: Track,
        progress_ms: u64,
        is_playing: bool,
    },
    /// No active session; the most recently played track.
    Historical { track: Track },
    /// No session and no listening history.
    Empty,
}

impl NowPlaying {
    pub fn track(&self) -> Option<&Track> {
        match self {
            NowPlaying::Live { track, .. } | NowPlaying::Historical { track } => Some(track),
            NowPlaying::Empty => None,
        }
    }
}
