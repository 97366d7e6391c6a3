pub mod reconciler;
pub mod state;

use crate::api::client::SpotifyClient;
use crate::config::Settings;
use crate::engine::reconciler::{ControlCommand, ControlRequest, PollOutcome, Reconciler};
use crate::engine::state::{ActionKind, PlaybackState};
use crate::error::{AppError, AppResult};
use crate::events::EngineEvent;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::MissedTickBehavior;

/// A user intent or host signal headed for the engine task.
#[derive(Debug, Clone)]
pub enum Intent {
    Play,
    Pause,
    Seek(u64),
    Next,
    Previous,
    ToggleLike,
    SetVisible(bool),
}

/// Result of a spawned network task, reported back to the engine task.
/// All state mutation happens there, on tick boundaries.
enum Completion {
    Poll {
        issued_seq: u64,
        result: AppResult<PollOutcome>,
    },
    Control {
        seq: u64,
        kind: ActionKind,
        result: AppResult<()>,
    },
}

/// Consumer-side handle: intents in, snapshots and events out.
#[derive(Clone)]
pub struct EngineHandle {
    intents: mpsc::UnboundedSender<Intent>,
    state: watch::Receiver<Option<PlaybackState>>,
    events: broadcast::Sender<EngineEvent>,
}

impl EngineHandle {
    /// A receiver of playback snapshots, refreshed every tick.
    pub fn state(&self) -> watch::Receiver<Option<PlaybackState>> {
        self.state.clone()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    fn send(&self, intent: Intent) {
        // A closed channel just means the engine stopped; intents after
        // that are no-ops.
        let _ = self.intents.send(intent);
    }

    pub fn request_play(&self) {
        self.send(Intent::Play);
    }

    pub fn request_pause(&self) {
        self.send(Intent::Pause);
    }

    pub fn request_seek(&self, position_ms: u64) {
        self.send(Intent::Seek(position_ms));
    }

    pub fn request_next(&self) {
        self.send(Intent::Next);
    }

    pub fn request_previous(&self) {
        self.send(Intent::Previous);
    }

    pub fn request_toggle_like(&self) {
        self.send(Intent::ToggleLike);
    }

    /// Foreground/background signal. Resets scheduling state; never
    /// cancels requests already in flight.
    pub fn set_visible(&self, visible: bool) {
        self.send(Intent::SetVisible(visible));
    }
}

/// Owns the reconciler and drives it from a single recurring timer.
/// Network calls run as spawned tasks; one poll and one control call at
/// most are in flight at any moment.
pub struct PlaybackEngine {
    client: Arc<SpotifyClient>,
    reconciler: Reconciler,
    tick: Duration,
    tick_ms: u64,
    visible: bool,
    poll_in_flight: bool,
    control_in_flight: bool,
    /// Latest unsent control per kind, dispatched when the in-flight
    /// call completes.
    queued_controls: VecDeque<ControlCommand>,
    intents_rx: mpsc::UnboundedReceiver<Intent>,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions_rx: mpsc::UnboundedReceiver<Completion>,
    state_tx: watch::Sender<Option<PlaybackState>>,
    events_tx: broadcast::Sender<EngineEvent>,
}

impl PlaybackEngine {
    pub fn new(client: Arc<SpotifyClient>, settings: &Settings) -> (Self, EngineHandle) {
        let (intents_tx, intents_rx) = mpsc::unbounded_channel();
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(None);
        let (events_tx, _) = broadcast::channel(32);

        let handle = EngineHandle {
            intents: intents_tx,
            state: state_rx,
            events: events_tx.clone(),
        };

        let engine = Self {
            client,
            reconciler: Reconciler::new(settings),
            tick: Duration::from_millis(settings.tick_ms),
            tick_ms: settings.tick_ms,
            visible: true,
            poll_in_flight: false,
            control_in_flight: false,
            queued_controls: VecDeque::new(),
            intents_rx,
            completions_tx,
            completions_rx,
            state_tx,
            events_tx,
        };

        (engine, handle)
    }

    /// Run until every handle is dropped.
    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        log::info!("[engine] started, tick={}ms", self.tick_ms);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.on_tick(),
                intent = self.intents_rx.recv() => match intent {
                    Some(intent) => self.on_intent(intent),
                    None => break,
                },
                Some(completion) = self.completions_rx.recv() => self.on_completion(completion),
            }
        }
        log::info!("[engine] all handles dropped, stopping");
    }

    fn on_tick(&mut self) {
        if let Some(request) = self
            .reconciler
            .on_tick(self.visible, self.tick_ms, self.poll_in_flight)
        {
            self.spawn_poll(request.issued_seq);
        }
        let _ = self.state_tx.send(self.reconciler.state().cloned());
    }

    fn on_intent(&mut self, intent: Intent) {
        let command = match intent {
            Intent::SetVisible(visible) => {
                if visible != self.visible {
                    log::debug!("[engine] visibility -> {}", visible);
                }
                self.visible = visible;
                return;
            }
            Intent::Play => self.reconciler.request_play(),
            Intent::Pause => self.reconciler.request_pause(),
            Intent::Seek(position_ms) => self.reconciler.request_seek(position_ms),
            Intent::Next => self.reconciler.request_next(),
            Intent::Previous => self.reconciler.request_previous(),
            Intent::ToggleLike => self.reconciler.request_toggle_like(),
        };
        if let Some(command) = command {
            self.dispatch_control(command);
        }
    }

    fn dispatch_control(&mut self, command: ControlCommand) {
        if self.control_in_flight {
            // One control call at a time; a newer same-kind command
            // replaces a queued one instead of lining up behind it.
            self.queued_controls.retain(|c| c.kind != command.kind);
            self.queued_controls.push_back(command);
            return;
        }
        self.spawn_control(command);
    }

    fn spawn_control(&mut self, command: ControlCommand) {
        self.control_in_flight = true;
        let client = Arc::clone(&self.client);
        let completions = self.completions_tx.clone();
        tokio::spawn(async move {
            let result = run_control(&client, &command.request).await;
            let _ = completions.send(Completion::Control {
                seq: command.seq,
                kind: command.kind,
                result,
            });
        });
    }

    fn spawn_poll(&mut self, issued_seq: u64) {
        self.poll_in_flight = true;
        let client = Arc::clone(&self.client);
        let completions = self.completions_tx.clone();
        tokio::spawn(async move {
            let result = run_poll(&client).await;
            let _ = completions.send(Completion::Poll { issued_seq, result });
        });
    }

    fn on_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Poll { issued_seq, result } => {
                self.poll_in_flight = false;
                match result {
                    Ok(outcome) => self.reconciler.apply_poll(issued_seq, outcome),
                    Err(e) => {
                        self.reconciler.poll_failed();
                        if e.is_auth_failure() {
                            log::warn!("[engine] poll hit an auth failure: {}", e);
                            let _ = self.events_tx.send(EngineEvent::ReauthRequired);
                        } else {
                            // The next scheduled poll retries naturally.
                            log::warn!("[engine] poll failed ({}): {}", e.kind(), e);
                        }
                    }
                }
            }
            Completion::Control { seq, kind, result } => {
                self.control_in_flight = false;
                match result {
                    Ok(()) => self.reconciler.on_control_success(seq),
                    Err(e) => {
                        self.reconciler.on_control_failure(seq);
                        if e.is_auth_failure() {
                            let _ = self.events_tx.send(EngineEvent::ReauthRequired);
                        } else {
                            log::warn!("[engine] {} failed: {}", kind.label(), e);
                            let _ = self
                                .events_tx
                                .send(EngineEvent::notice(format!("Failed to {}", kind.label())));
                        }
                    }
                }
                if let Some(next) = self.queued_controls.pop_front() {
                    self.spawn_control(next);
                }
            }
        }
    }
}

async fn run_control(client: &SpotifyClient, request: &ControlRequest) -> AppResult<()> {
    match request {
        ControlRequest::Play => client.play().await,
        ControlRequest::Pause => client.pause().await,
        ControlRequest::Seek(position_ms) => client.seek(*position_ms).await,
        ControlRequest::Next => client.next().await,
        ControlRequest::Previous {
            is_playing,
            progress_ms,
        } => client.previous(*is_playing, *progress_ms).await,
        ControlRequest::SetSaved { track_id, saved } => client.set_saved(track_id, *saved).await,
    }
}

async fn run_poll(client: &SpotifyClient) -> AppResult<PollOutcome> {
    let now = client.state().await?;
    let liked = match now.track() {
        Some(track) => match client.is_saved(&track.id).await {
            Ok(liked) => Some(liked),
            Err(e) if matches!(e, AppError::ReauthRequired) => return Err(e),
            Err(e) => {
                // The playback payload is still good; only the liked
                // lookup missed, so the last known value stands.
                log::warn!("[engine] liked-state lookup failed: {}", e);
                None
            }
        },
        None => None,
    };
    Ok(PollOutcome { now, liked })
}
