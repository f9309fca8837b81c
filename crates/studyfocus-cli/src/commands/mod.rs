pub mod config;
pub mod stats;
pub mod timer;

use std::sync::Arc;
use std::time::Duration;

use studyfocus_core::storage::Database;
use studyfocus_core::{Config, CoreError, EngineConfig, FocusEngine, SessionMachine};

pub type CmdResult = Result<(), Box<dyn std::error::Error>>;

const ENGINE_KEY: &str = "session_machine";
const DEFAULT_WATCH_TICK: Duration = Duration::from_secs(1);

/// One CLI invocation's view of the engine: restored from the kv
/// checkpoint on open, written back on close.
pub struct EngineSession {
    pub db: Arc<Database>,
    pub engine: FocusEngine,
}

impl EngineSession {
    /// `ticker`: run the configured background ticker (for `watch`).
    pub fn open(ticker: bool) -> Result<Self, CoreError> {
        let config = Config::load()?;
        let db = Arc::new(Database::open()?);

        let mut engine_config = EngineConfig::from(&config);
        engine_config.tick_interval = if ticker {
            engine_config.tick_interval.or(Some(DEFAULT_WATCH_TICK))
        } else {
            None
        };
        let mut builder = FocusEngine::builder(db.clone())
            .settings(Arc::new(config.clone()))
            .config(engine_config);
        if let Some(machine) = load_machine(&db) {
            builder = builder.restore(machine);
        }
        let engine = builder.build()?;

        Ok(Self { db, engine })
    }

    /// Drain persistence and checkpoint the machine.
    pub async fn close(&self) -> Result<(), CoreError> {
        self.engine.shutdown().await;
        let json = serde_json::to_string(&self.engine.machine().await)?;
        self.db.kv_set(ENGINE_KEY, &json)?;
        Ok(())
    }
}

fn load_machine(db: &Database) -> Option<SessionMachine> {
    let json = match db.kv_get(ENGINE_KEY) {
        Ok(Some(json)) => json,
        Ok(None) => return None,
        Err(e) => {
            tracing::warn!(error = %e, "could not read timer checkpoint");
            return None;
        }
    };
    serde_json::from_str(&json)
        .map_err(|e| tracing::warn!(error = %e, "discarding unreadable timer checkpoint"))
        .ok()
}
