use crate::api::client::SpotifyClient;
use crate::api::models::{
    CurrentlyPlaying, Device, DevicesResponse, NowPlaying, RecentlyPlayed, UserProfile,
};
use crate::error::{AppError, AppResult};

/// Restart the current track instead of skipping back once playback is
/// this far in, matching common player UX.
pub const PREVIOUS_RESTART_THRESHOLD_MS: u64 = 5_000;

pub fn previous_restarts(is_playing: bool, progress_ms: u64) -> bool {
    is_playing && progress_ms > PREVIOUS_RESTART_THRESHOLD_MS
}

impl SpotifyClient {
    /// Current playback, distinguishing three outcomes: a live session,
    /// an idle session falling back to listening history, or nothing at
    /// all. Callers must handle all three.
    pub async fn state(&self) -> AppResult<NowPlaying> {
        let response = self.get("/me/player").await?;

        if response.status() != reqwest::StatusCode::NO_CONTENT {
            let playing: CurrentlyPlaying = response.json().await?;
            if let Some(track) = playing.item {
                return Ok(NowPlaying::Live {
                    track,
                    progress_ms: playing.progress_ms.unwrap_or(0),
                    is_playing: playing.is_playing,
                });
            }
            // Private session or an item type we don't model; treat it
            // like an idle session.
            log::debug!("[player] live payload without item, using history");
        }

        let history: RecentlyPlayed = self
            .get_json("/me/player/recently-played?limit=1")
            .await?;
        match history.items.into_iter().next() {
            Some(item) => Ok(NowPlaying::Historical { track: item.track }),
            None => Ok(NowPlaying::Empty),
        }
    }

    pub async fn devices(&self) -> AppResult<Vec<Device>> {
        let response: DevicesResponse = self.get_json("/me/player/devices").await?;
        Ok(response.devices)
    }

    /// Control operations only target a device that reports itself
    /// active; without one they fail up front instead of being retried.
    async fn active_device_id(&self) -> AppResult<String> {
        let devices = self.devices().await?;
        devices
            .into_iter()
            .find(|device| device.is_active)
            .and_then(|device| device.id)
            .ok_or(AppError::NoActiveDevice)
    }

    pub async fn play(&self) -> AppResult<()> {
        let device_id = self.active_device_id().await?;
        self.put("/me/player/play", &[("device_id", device_id)])
            .await?;
        Ok(())
    }

    pub async fn pause(&self) -> AppResult<()> {
        let device_id = self.active_device_id().await?;
        self.put("/me/player/pause", &[("device_id", device_id)])
            .await?;
        Ok(())
    }

    pub async fn seek(&self, position_ms: u64) -> AppResult<()> {
        let device_id = self.active_device_id().await?;
        self.put(
            "/me/player/seek",
            &[
                ("position_ms", position_ms.to_string()),
                ("device_id", device_id),
            ],
        )
        .await?;
        Ok(())
    }

    pub async fn next(&self) -> AppResult<()> {
        self.active_device_id().await?;
        self.post("/me/player/next").await?;
        Ok(())
    }

    /// Previous with the restart threshold: far enough into the track,
    /// this seeks to zero rather than changing tracks.
    pub async fn previous(&self, is_playing: bool, progress_ms: u64) -> AppResult<()> {
        if previous_restarts(is_playing, progress_ms) {
            return self.seek(0).await;
        }
        self.active_device_id().await?;
        self.post("/me/player/previous").await?;
        Ok(())
    }

    pub async fn set_saved(&self, track_id: &str, saved: bool) -> AppResult<()> {
        let query = [("ids", track_id.to_string())];
        if saved {
            self.put("/me/tracks", &query).await?;
        } else {
            self.delete("/me/tracks", &query).await?;
        }
        Ok(())
    }

    pub async fn is_saved(&self, track_id: &str) -> AppResult<bool> {
        let flags: Vec<bool> = self
            .get_json(&format!("/me/tracks/contains?ids={}", track_id))
            .await?;
        Ok(flags.first().copied().unwrap_or(false))
    }

    pub async fn profile(&self) -> AppResult<UserProfile> {
        self.get_json("/me").await
    }
}
