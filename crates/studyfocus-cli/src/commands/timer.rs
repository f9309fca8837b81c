use std::time::Duration;

use chrono::Utc;
use clap::Subcommand;
use studyfocus_core::{Event, FocusEngine, Phase};
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};

use super::{CmdResult, EngineSession};

#[derive(Subcommand)]
pub enum TimerAction {
    /// Start a work session
    Start {
        /// Study mode (short-burst, standard-focus, deep-work, custom)
        #[arg(long)]
        mode: Option<String>,
        /// What you are working on
        #[arg(long)]
        task: Option<String>,
    },
    /// Pause the running phase
    Pause,
    /// Resume a paused phase
    Resume,
    /// Stop the work session (or skip the running break)
    Stop,
    /// Skip the running or pending break
    Skip,
    /// Start the scheduled break
    Break,
    /// Back to idle; clears the completed-session count
    Reset,
    /// Switch study mode (only while idle)
    Mode {
        /// Mode id
        id: String,
    },
    /// Print current timer state as JSON
    Status,
    /// Follow the timer live until it returns to idle
    Watch,
}

pub async fn run(action: TimerAction) -> CmdResult {
    let watching = matches!(action, TimerAction::Watch);
    let status = matches!(action, TimerAction::Status);

    let session = EngineSession::open(watching)?;
    let engine = &session.engine;
    let mut events = engine.subscribe();

    // Catch up on time that passed since the last invocation.
    engine.tick().await;
    let outcome = apply(engine, action, &mut events).await;

    // Persist even if the action itself failed.
    session.close().await?;
    outcome?;

    let printed = print_pending(&mut events)?;
    if printed == 0 || status {
        let snapshot = engine.machine().await.snapshot(Utc::now());
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    }
    Ok(())
}

async fn apply(
    engine: &FocusEngine,
    action: TimerAction,
    events: &mut broadcast::Receiver<Event>,
) -> CmdResult {
    match action {
        TimerAction::Start { mode, task } => {
            if let Some(mode) = mode {
                engine.select_mode_named(&mode).await?;
            }
            engine.start_work(task).await;
        }
        TimerAction::Pause => {
            engine.pause().await;
        }
        TimerAction::Resume => {
            engine.resume().await;
        }
        TimerAction::Stop => {
            engine.stop().await;
        }
        TimerAction::Skip => {
            engine.skip_break().await;
        }
        TimerAction::Break => {
            engine.start_break().await;
        }
        TimerAction::Reset => {
            engine.reset().await;
        }
        TimerAction::Mode { id } => {
            engine.select_mode_named(&id).await?;
        }
        TimerAction::Status => {}
        TimerAction::Watch => watch(engine, events).await?,
    }
    Ok(())
}

/// Print events as JSON lines and a once-per-second snapshot until the
/// timer is idle again or the user interrupts.
async fn watch(engine: &FocusEngine, events: &mut broadcast::Receiver<Event>) -> CmdResult {
    if engine.state().await.phase == Phase::Idle {
        return Ok(());
    }

    let mut display = tokio::time::interval(Duration::from_secs(1));
    loop {
        tokio::select! {
            received = events.recv() => match received {
                Ok(Event::StateSnapshot { .. }) => {}
                Ok(event) => {
                    println!("{}", serde_json::to_string(&event)?);
                    if engine.state().await.phase == Phase::Idle {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "watch fell behind; events dropped");
                }
                Err(RecvError::Closed) => break,
            },
            _ = display.tick() => {
                let snapshot = engine.machine().await.snapshot(Utc::now());
                println!("{}", serde_json::to_string(&snapshot)?);
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    Ok(())
}

fn print_pending(events: &mut broadcast::Receiver<Event>) -> Result<usize, serde_json::Error> {
    let mut printed = 0;
    loop {
        match events.try_recv() {
            Ok(event) => {
                println!("{}", serde_json::to_string(&event)?);
                printed += 1;
            }
            Err(TryRecvError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }
    Ok(printed)
}
