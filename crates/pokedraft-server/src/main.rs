// Draft league server entry point.
//
// Startup sequence:
// 1. Load config (copying defaults/ into config/ on first run)
// 2. Initialize tracing (log to file)
// 3. Open database
// 4. Load rulesets from disk and register them
// 5. Create channels
// 6. Spawn WebSocket server task
// 7. Spawn app logic task
// 8. Wait for Ctrl+C, then shut down

use pokedraft_core::config;
use pokedraft_core::engine::{DraftEngine, RulesetChange};
use pokedraft_core::error::EngineError;
use pokedraft_core::store::Database;
use pokedraft_server::app::{self, AppCommand, AppState};
use pokedraft_server::ws_server;

use anyhow::Context;
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info, warn};

/// Capacity of the notification fan-out. Slow clients past this many
/// events behind are told they lagged.
const EVENT_BUFFER: usize = 256;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Load config
    let config = config::load_config().context("failed to load configuration")?;

    // 2. Initialize tracing
    init_tracing(&config.log_filter)?;
    info!(
        "Pokedraft server starting up: generation {}, default rules {} points / {} slots",
        config.draft.generation,
        config.draft.default_rules.max_points,
        config.draft.default_rules.max_team_size
    );

    // 3. Open database
    let db_path = config
        .resolved_db_path()
        .context("failed to resolve database path")?;
    let db_path_str = db_path
        .to_str()
        .context("database path is not valid UTF-8")?;
    let db = Database::open(db_path_str).context("failed to open database")?;
    info!("Database opened at {}", db_path.display());

    // 4. Rulesets
    let (events_tx, _) = broadcast::channel(EVENT_BUFFER);
    let engine = DraftEngine::new(db, events_tx.clone(), config.draft.clone());

    let cwd = std::env::current_dir().context("failed to read working directory")?;
    let rulesets = config
        .load_rulesets(&cwd)
        .context("failed to load rulesets")?;
    for ruleset in &rulesets {
        match engine.register_ruleset(ruleset) {
            Ok(RulesetChange::Unchanged) => {}
            Ok(change) => info!("Ruleset {} {:?}", ruleset.id, change),
            Err(EngineError::RulesetInUse { ruleset_id }) => {
                warn!(
                    "Ruleset {} changed on disk but is used by existing games; keeping stored values",
                    ruleset_id
                );
            }
            Err(e) => {
                return Err(anyhow::Error::new(e)
                    .context(format!("failed to register ruleset {}", ruleset.id)));
            }
        }
    }
    info!("{} rulesets available", rulesets.len());

    // 5. Channels
    let (ws_tx, ws_rx) = mpsc::channel(256);
    let (cmd_tx, cmd_rx) = mpsc::channel(8);

    // 6. Spawn WebSocket server task
    let ws_port = config.ws_port;
    let ws_handle = tokio::spawn(async move {
        match ws_server::TungsteniteListener::bind(ws_port).await {
            Ok(listener) => {
                if let Err(e) = ws_server::run(listener, ws_tx, events_tx).await {
                    error!("WebSocket server error: {}", e);
                }
            }
            Err(e) => {
                error!("Failed to bind WebSocket server on port {}: {}", ws_port, e);
            }
        }
    });

    // 7. Spawn app logic task
    let mut app_handle = tokio::spawn(async move {
        if let Err(e) = app::run(ws_rx, cmd_rx, AppState::new(engine)).await {
            error!("Application loop error: {}", e);
        }
    });

    info!("Server ready on 127.0.0.1:{}", ws_port);

    // 8. Run until Ctrl+C or the app loop ends on its own.
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!("Failed to listen for Ctrl+C: {}", e);
            }
            info!("Ctrl+C received, shutting down");
            let _ = cmd_tx.send(AppCommand::Shutdown).await;
            let _ = tokio::time::timeout(std::time::Duration::from_secs(5), &mut app_handle).await;
        }
        _ = &mut app_handle => {
            warn!("Application loop ended unexpectedly");
        }
    }

    // The accept loop runs forever; abort it.
    ws_handle.abort();

    info!("Pokedraft server shut down cleanly");
    Ok(())
}

/// Initialize tracing to log to `logs/pokedraft.log`. `RUST_LOG` overrides
/// the configured filter.
fn init_tracing(default_filter: &str) -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let log_dir = std::env::current_dir()?.join("logs");
    std::fs::create_dir_all(&log_dir)?;

    let log_file = std::fs::File::create(log_dir.join("pokedraft.log"))?;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(log_file)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
