use crate::api::models::NowPlaying;
use crate::config::Settings;
use crate::engine::state::{
    ActionKind, PendingAction, PlaybackState, PollBudget, PositionSource, Rollback,
};

/// Issued to the driver when a tick decides the remote should be polled.
/// `issued_seq` is the action watermark at issue time; a result coming
/// back after a newer action is stale and gets discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollRequest {
    pub issued_seq: u64,
}

/// Authoritative data from one poll round-trip. `liked` is `None` when
/// the saved-state lookup failed while the playback payload itself came
/// back fine; the last known value stays on display.
#[derive(Debug, Clone)]
pub struct PollOutcome {
    pub now: NowPlaying,
    pub liked: Option<bool>,
}

/// A control call the driver should perform for an intent.
#[derive(Debug, Clone)]
pub struct ControlCommand {
    pub seq: u64,
    pub kind: ActionKind,
    pub request: ControlRequest,
}

#[derive(Debug, Clone)]
pub enum ControlRequest {
    Play,
    Pause,
    Seek(u64),
    Next,
    Previous { is_playing: bool, progress_ms: u64 },
    SetSaved { track_id: String, saved: bool },
}

/// The central scheduler: decides on each tick whether to poll,
/// extrapolates position between polls, and merges user actions with
/// authoritative results. Pure state machine; all I/O lives in the
/// driver, so every path here is exercisable in tests.
pub struct Reconciler {
    state: Option<PlaybackState>,
    budget: PollBudget,
    /// Engine time, accumulated from tick durations.
    clock_ms: u64,
    next_seq: u64,
    /// Sequence of the most recently issued action; poll results tagged
    /// with a lower watermark lose (last-writer-wins).
    last_action_seq: u64,
    pending: Vec<PendingAction>,
    /// One forced re-poll after an acknowledged action; issuing a poll
    /// clears it, so forced polls never queue up.
    force_poll: bool,
    settle_window_ms: u64,
    reconcile_threshold_ms: u64,
    track_end_margin_ms: u64,
}

impl Reconciler {
    pub fn new(settings: &Settings) -> Self {
        Self {
            state: None,
            budget: PollBudget::new(settings.poll_window_ms),
            clock_ms: 0,
            next_seq: 1,
            last_action_seq: 0,
            pending: Vec::new(),
            force_poll: false,
            settle_window_ms: settings.settle_window_ms,
            reconcile_threshold_ms: settings.reconcile_threshold_ms,
            track_end_margin_ms: settings.track_end_margin_ms,
        }
    }

    pub fn state(&self) -> Option<&PlaybackState> {
        self.state.as_ref()
    }

    /// One scheduler tick. Order matters: visibility gate, poll
    /// decision, extrapolation only when not polling, then the budget
    /// countdown.
    pub fn on_tick(
        &mut self,
        visible: bool,
        tick_ms: u64,
        poll_in_flight: bool,
    ) -> Option<PollRequest> {
        self.clock_ms += tick_ms;

        if !visible {
            // No polls and no extrapolation while backgrounded; an
            // exhausted budget makes the first foreground tick poll.
            self.budget.exhaust();
            return None;
        }

        let wants_poll = self.budget.is_exhausted()
            || self.force_poll
            || self.has_pending_within_settle()
            || self.near_track_end();
        let polling = wants_poll && !poll_in_flight;

        if polling {
            self.force_poll = false;
        } else if let Some(state) = &mut self.state {
            if state.live && state.is_playing {
                state.position_ms += tick_ms;
                state.source = PositionSource::Extrapolated;
            }
        }

        self.budget.tick(tick_ms);

        polling.then_some(PollRequest {
            issued_seq: self.last_action_seq,
        })
    }

    fn has_pending_within_settle(&self) -> bool {
        self.pending
            .iter()
            .any(|action| self.clock_ms.saturating_sub(action.issued_at_ms) <= self.settle_window_ms)
    }

    /// Liked state to carry into a rebuilt snapshot when the lookup
    /// missed: keep it for the same track, default off for a new one.
    fn carried_liked(&self, track_id: &str) -> bool {
        match &self.state {
            Some(state) if state.track.id == track_id => state.liked,
            _ => false,
        }
    }

    fn near_track_end(&self) -> bool {
        match &self.state {
            Some(state) if state.live && state.is_playing && state.track.duration_ms > 0 => {
                state.track.duration_ms.saturating_sub(state.position_ms)
                    <= self.track_end_margin_ms
            }
            _ => false,
        }
    }

    /// Merge an authoritative poll result. The budget restarts after
    /// every poll regardless; the payload is dropped wholesale when an
    /// action was issued after the poll went out.
    pub fn apply_poll(&mut self, issued_seq: u64, outcome: PollOutcome) {
        self.budget.reset();

        if issued_seq < self.last_action_seq {
            log::debug!(
                "[reconcile] dropping stale poll (issued at seq {}, now at {})",
                issued_seq,
                self.last_action_seq
            );
            return;
        }

        match outcome.now {
            NowPlaying::Empty => {
                self.state = None;
            }
            NowPlaying::Historical { track } => {
                let liked = outcome
                    .liked
                    .unwrap_or_else(|| self.carried_liked(&track.id));
                self.state = Some(PlaybackState {
                    track: (&track).into(),
                    live: false,
                    is_playing: false,
                    position_ms: 0,
                    source: PositionSource::LivePoll,
                    liked,
                });
            }
            NowPlaying::Live {
                track,
                progress_ms,
                is_playing,
            } => {
                match &mut self.state {
                    Some(state) if state.track.id == track.id => {
                        // Same track: only adopt the remote position when
                        // it disagrees enough to matter, otherwise the
                        // smoother local value stays.
                        if progress_ms.abs_diff(state.position_ms) > self.reconcile_threshold_ms {
                            state.position_ms = progress_ms;
                            state.source = PositionSource::LivePoll;
                        }
                        state.track = (&track).into();
                        state.live = true;
                        state.is_playing = is_playing;
                        if let Some(liked) = outcome.liked {
                            state.liked = liked;
                        }
                    }
                    _ => {
                        self.state = Some(PlaybackState {
                            track: (&track).into(),
                            live: true,
                            is_playing,
                            position_ms: progress_ms,
                            source: PositionSource::LivePoll,
                            liked: outcome.liked.unwrap_or(false),
                        });
                    }
                }
            }
        }
    }

    /// A poll that failed still restarts the budget; the next window
    /// retries naturally, with no backoff loop.
    pub fn poll_failed(&mut self) {
        self.budget.reset();
    }

    fn issue(&mut self, kind: ActionKind, rollback: Rollback) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.last_action_seq = seq;

        // Supersede, never queue behind, an unacknowledged same-kind
        // action.
        self.pending.retain(|action| action.kind != kind);
        self.pending.push(PendingAction {
            kind,
            seq,
            issued_at_ms: self.clock_ms,
            rollback,
        });

        self.budget.reset();
        self.force_poll = true;
        seq
    }

    pub fn request_play(&mut self) -> Option<ControlCommand> {
        let state = self.state.as_mut()?;
        let rollback = Rollback::IsPlaying(state.is_playing);
        state.is_playing = true;
        let seq = self.issue(ActionKind::Play, rollback);
        Some(ControlCommand {
            seq,
            kind: ActionKind::Play,
            request: ControlRequest::Play,
        })
    }

    pub fn request_pause(&mut self) -> Option<ControlCommand> {
        let state = self.state.as_mut()?;
        let rollback = Rollback::IsPlaying(state.is_playing);
        state.is_playing = false;
        let seq = self.issue(ActionKind::Pause, rollback);
        Some(ControlCommand {
            seq,
            kind: ActionKind::Pause,
            request: ControlRequest::Pause,
        })
    }

    pub fn request_seek(&mut self, target_ms: u64) -> Option<ControlCommand> {
        let state = self.state.as_mut()?;
        let rollback = Rollback::Position {
            position_ms: state.position_ms,
            source: state.source,
        };
        state.position_ms = target_ms;
        state.source = PositionSource::Extrapolated;
        let seq = self.issue(ActionKind::Seek, rollback);
        Some(ControlCommand {
            seq,
            kind: ActionKind::Seek,
            request: ControlRequest::Seek(target_ms),
        })
    }

    pub fn request_next(&mut self) -> Option<ControlCommand> {
        self.state.as_ref()?;
        let seq = self.issue(ActionKind::Next, Rollback::None);
        Some(ControlCommand {
            seq,
            kind: ActionKind::Next,
            request: ControlRequest::Next,
        })
    }

    pub fn request_previous(&mut self) -> Option<ControlCommand> {
        let state = self.state.as_mut()?;
        let is_playing = state.is_playing;
        let progress_ms = state.display_position_ms();

        // Mirror the client's restart policy optimistically: far enough
        // in, the result is a seek back to the start of this track.
        let rollback = if crate::api::previous_restarts(is_playing, progress_ms) {
            let rollback = Rollback::Position {
                position_ms: state.position_ms,
                source: state.source,
            };
            state.position_ms = 0;
            state.source = PositionSource::Extrapolated;
            rollback
        } else {
            Rollback::None
        };

        let seq = self.issue(ActionKind::Previous, rollback);
        Some(ControlCommand {
            seq,
            kind: ActionKind::Previous,
            request: ControlRequest::Previous {
                is_playing,
                progress_ms,
            },
        })
    }

    pub fn request_toggle_like(&mut self) -> Option<ControlCommand> {
        let state = self.state.as_mut()?;
        let rollback = Rollback::Liked(state.liked);
        state.liked = !state.liked;
        let saved = state.liked;
        let track_id = state.track.id.clone();
        let seq = self.issue(ActionKind::ToggleLike, rollback);
        Some(ControlCommand {
            seq,
            kind: ActionKind::ToggleLike,
            request: ControlRequest::SetSaved { track_id, saved },
        })
    }

    /// The control call behind `seq` succeeded; the optimistic guess
    /// stands until the forced re-poll fetches the authoritative state.
    pub fn on_control_success(&mut self, seq: u64) {
        self.pending.retain(|action| action.seq != seq);
        self.force_poll = true;
    }

    /// The control call behind `seq` failed: undo its optimistic
    /// mutation and leave everything else alone. A superseded action is
    /// already gone and rolls back nothing.
    pub fn on_control_failure(&mut self, seq: u64) {
        let Some(index) = self.pending.iter().position(|action| action.seq == seq) else {
            return;
        };
        let action = self.pending.remove(index);
        let Some(state) = &mut self.state else {
            return;
        };
        match action.rollback {
            Rollback::None => {}
            Rollback::IsPlaying(was_playing) => state.is_playing = was_playing,
            Rollback::Position {
                position_ms,
                source,
            } => {
                state.position_ms = position_ms;
                state.source = source;
            }
            Rollback::Liked(was_liked) => state.liked = was_liked,
        }
    }

    #[cfg(test)]
    pub fn pending_actions(&self) -> &[PendingAction] {
        &self.pending
    }
}
