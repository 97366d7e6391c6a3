use crate::api::models::Track;
use serde::Serialize;

/// The slice of track metadata a consumer needs to render the widget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackSummary {
    pub id: String,
    pub title: String,
    pub artist: String,
    pub album: String,
    pub artwork_url: Option<String>,
    pub duration_ms: u64,
}

impl From<&Track> for TrackSummary {
    fn from(track: &Track) -> Self {
        Self {
            id: track.id.clone(),
            title: track.name.clone(),
            artist: track.artist_name().to_string(),
            album: track
                .album
                .as_ref()
                .map(|album| album.name.clone())
                .unwrap_or_default(),
            artwork_url: track.artwork_url().map(str::to_string),
            duration_ms: track.duration_ms,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionSource {
    /// Position taken from an authoritative poll result.
    LivePoll,
    /// Position advanced locally between polls (or set optimistically).
    Extrapolated,
}

/// Displayed playback state. Owned by the reconciler; consumers only
/// ever see cloned snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlaybackState {
    pub track: TrackSummary,
    /// True for an active session, false when the track comes from
    /// listening history.
    pub live: bool,
    pub is_playing: bool,
    pub position_ms: u64,
    pub source: PositionSource,
    pub liked: bool,
}

impl PlaybackState {
    /// Position for display, wrapped modulo duration. The raw
    /// `position_ms` keeps growing past the end between polls and is
    /// never persisted wrapped.
    pub fn display_position_ms(&self) -> u64 {
        if self.track.duration_ms > 0 {
            self.position_ms % self.track.duration_ms
        } else {
            self.position_ms
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Play,
    Pause,
    Seek,
    Next,
    Previous,
    ToggleLike,
}

impl ActionKind {
    pub fn label(&self) -> &'static str {
        match self {
            ActionKind::Play => "play",
            ActionKind::Pause => "pause",
            ActionKind::Seek => "seek",
            ActionKind::Next => "skip",
            ActionKind::Previous => "skip back",
            ActionKind::ToggleLike => "update liked state",
        }
    }
}

/// What to undo if the control call behind an optimistic mutation fails.
#[derive(Debug, Clone)]
pub enum Rollback {
    None,
    IsPlaying(bool),
    Position {
        position_ms: u64,
        source: PositionSource,
    },
    Liked(bool),
}

/// An in-flight user intent. At most one per kind is pending; a newer
/// action of the same kind supersedes the older one outright.
#[derive(Debug, Clone)]
pub struct PendingAction {
    pub kind: ActionKind,
    pub seq: u64,
    pub issued_at_ms: u64,
    pub rollback: Rollback,
}

/// Countdown gating poll frequency, in milliseconds of engine time.
/// Never negative; polls happen when it is exhausted or forced past.
#[derive(Debug)]
pub struct PollBudget {
    remaining_ms: u64,
    window_ms: u64,
}

impl PollBudget {
    pub fn new(window_ms: u64) -> Self {
        Self {
            // Start exhausted so the first tick polls immediately.
            remaining_ms: 0,
            window_ms,
        }
    }

    pub fn tick(&mut self, tick_ms: u64) {
        self.remaining_ms = self.remaining_ms.saturating_sub(tick_ms);
    }

    pub fn reset(&mut self) {
        self.remaining_ms = self.window_ms;
    }

    pub fn exhaust(&mut self) {
        self.remaining_ms = 0;
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining_ms == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_floors_at_zero() {
        let mut budget = PollBudget::new(100);
        budget.reset();
        budget.tick(70);
        assert!(!budget.is_exhausted());
        budget.tick(70);
        assert!(budget.is_exhausted());
        budget.tick(70);
        assert!(budget.is_exhausted());
    }

    #[test]
    fn display_position_wraps_without_mutating() {
        let state = PlaybackState {
            track: TrackSummary {
                id: "t".into(),
                title: "T".into(),
                artist: "A".into(),
                album: "L".into(),
                artwork_url: None,
                duration_ms: 1_000,
            },
            live: true,
            is_playing: true,
            position_ms: 2_300,
            source: PositionSource::Extrapolated,
            liked: false,
        };
        assert_eq!(state.display_position_ms(), 300);
        assert_eq!(state.position_ms, 2_300);
    }
}
