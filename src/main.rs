use nowbar::{
    build_http, Authenticator, EngineEvent, FileStore, PlaybackEngine, PlaybackState, Settings,
    SpotifyClient,
};
use std::io::Write;
use std::sync::Arc;

/// Headless consumer: logs in, runs the engine, and prints playback
/// transitions. Stands in for the rendering layer.
#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("nowbar=info"))
        .init();

    let settings = Settings::load().unwrap_or_else(|e| {
        log::warn!("Failed to load config: {}. Using defaults.", e);
        let defaults = Settings::default();
        // Save defaults so the config file exists for next launch.
        if let Err(save_err) = defaults.save() {
            log::error!("Failed to save default config: {}", save_err);
        }
        defaults
    });

    if settings.client_id.is_empty() {
        eprintln!(
            "No client_id configured. Set it in {}",
            Settings::config_path()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|_| "~/.nowbar/config.json".into())
        );
        std::process::exit(1);
    }

    if let Err(e) = run(settings).await {
        log::error!("Fatal: {}", e);
        std::process::exit(1);
    }
}

async fn run(settings: Settings) -> nowbar::AppResult<()> {
    let store = Arc::new(FileStore::new(FileStore::default_path()?));
    let http = build_http(settings.request_timeout())?;
    let auth = Arc::new(Authenticator::new(
        http.clone(),
        settings.client_id.clone(),
        settings.redirect_uri.clone(),
        store,
    ));

    if !auth.is_authenticated() {
        login(&auth).await?;
    }

    let client = Arc::new(SpotifyClient::new(http, Arc::clone(&auth)));
    match client.profile().await {
        Ok(profile) => log::info!(
            "Logged in as {}",
            profile.display_name.as_deref().unwrap_or(&profile.id)
        ),
        Err(e) => log::warn!("Could not fetch profile: {}", e),
    }

    let (engine, handle) = PlaybackEngine::new(client, &settings);
    tokio::spawn(engine.run());

    let mut events = handle.subscribe_events();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                EngineEvent::Notice { message } => println!("! {}", message),
                EngineEvent::ReauthRequired => {
                    println!("! Session expired, restart to log in again");
                }
            }
        }
    });

    let mut state_rx = handle.state();
    let mut last: Option<PlaybackState> = None;
    while state_rx.changed().await.is_ok() {
        let snapshot = state_rx.borrow_and_update().clone();
        if let Some(state) = &snapshot {
            let changed = last.as_ref().map(|prev| {
                prev.track.id != state.track.id
                    || prev.is_playing != state.is_playing
                    || prev.liked != state.liked
            });
            if changed.unwrap_or(true) {
                let marker = if state.is_playing { ">" } else { "=" };
                let heart = if state.liked { " <3" } else { "" };
                println!(
                    "{} {} - {}{} ({}s / {}s)",
                    marker,
                    state.track.artist,
                    state.track.title,
                    heart,
                    state.display_position_ms() / 1000,
                    state.track.duration_ms / 1000
                );
            }
        } else if last.is_some() {
            println!("= nothing playing");
        }
        last = snapshot;
    }
    Ok(())
}

/// Interactive PKCE login: open the printed URL, approve, paste the
/// redirect back.
async fn login(auth: &Authenticator) -> nowbar::AppResult<()> {
    let url = auth.begin_auth()?;
    println!("Open this URL in a browser and authorize:\n\n  {}\n", url);
    print!("Paste the URL you were redirected to: ");
    std::io::stdout().flush()?;

    let mut redirect = String::new();
    std::io::stdin().read_line(&mut redirect)?;
    let code = Authenticator::extract_code(redirect.trim())?;
    auth.exchange_code(&code).await?;
    println!("Login complete.");
    Ok(())
}
