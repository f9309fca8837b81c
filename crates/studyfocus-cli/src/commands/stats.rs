use std::sync::Arc;

use chrono::Utc;
use clap::Subcommand;
use serde_json::json;
use studyfocus_core::progress::{achievements, levels};
use studyfocus_core::storage::Database;
use studyfocus_core::{Config, SessionRecorder};

use super::CmdResult;

#[derive(Subcommand)]
pub enum StatsAction {
    /// Today's sessions and focus minutes
    Today,
    /// This week (Monday onwards), per day
    Week,
    /// Level, XP, streaks and achievements
    Progress,
}

pub fn run(action: StatsAction) -> CmdResult {
    let config = Config::load()?;
    let db = Arc::new(Database::open()?);
    let recorder = SessionRecorder::new(db, config.user_id.clone(), config.utc_offset());
    let ctx = config.evaluation_context(Utc::now());

    match action {
        StatsAction::Today => {
            let rollup = recorder.daily_summary(ctx.today)?;
            println!("{}", serde_json::to_string_pretty(&rollup)?);
        }
        StatsAction::Week => {
            let rollup = recorder.weekly_summary(ctx.today)?;
            println!("{}", serde_json::to_string_pretty(&rollup)?);
        }
        StatsAction::Progress => {
            let snapshot = recorder.progress(&ctx)?;
            let table: Vec<_> = achievements::ACHIEVEMENTS
                .iter()
                .map(|a| {
                    json!({
                        "id": a.id,
                        "title": a.title,
                        "description": a.description,
                        "xp_bonus": a.xp_bonus,
                        "unlocked": snapshot.unlocked_achievements.contains(a.id),
                    })
                })
                .collect();
            let out = json!({
                "progress": snapshot,
                "xp_to_next_level": levels::xp_to_next_level(snapshot.xp),
                "achievements": table,
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
    }
    Ok(())
}
