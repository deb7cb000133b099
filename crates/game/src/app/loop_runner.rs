use std::process::ExitCode;

use thiserror::Error;
use tracing::{debug, error, info, warn};
use universe::{
    DrawRequest, EntityStatus, Genus, OfflineLink, RenderSink, TransitionRequest, UniverseConfig,
    UniverseController, UniverseError, UniverseEvent, UniversePaths, AUTOSAVE_SLOT,
};

use super::bootstrap::{AppWiring, RunConfig};

const SPAWN_WAYPOINT: &str = "spawn";

#[derive(Debug, Error)]
pub(crate) enum RunError {
    #[error("open universe '{universe}': {source}")]
    Open {
        universe: String,
        #[source]
        source: UniverseError,
    },
    #[error("universe '{0}' declares no primary map")]
    NoPrimaryMap(String),
    #[error("{stage}: {source}")]
    Transition {
        stage: &'static str,
        #[source]
        source: UniverseError,
    },
    #[error("save on exit: {0}")]
    Save(#[source] UniverseError),
}

impl RunError {
    fn transition(stage: &'static str) -> impl FnOnce(UniverseError) -> Self {
        move |source| RunError::Transition { stage, source }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct RunSummary {
    pub(crate) ticks: u32,
    pub(crate) map_transitions: u32,
    pub(crate) deaths: u32,
    pub(crate) levels_completed: u32,
    pub(crate) gold_collected: u32,
    pub(crate) draw_calls: usize,
    pub(crate) final_map: Option<String>,
}

pub(crate) fn run(app: AppWiring) -> ExitCode {
    match run_headless(&app.paths, &app.config) {
        Ok(summary) => {
            info!(
                ticks = summary.ticks,
                transitions = summary.map_transitions,
                deaths = summary.deaths,
                levels = summary.levels_completed,
                gold = summary.gold_collected,
                final_map = summary.final_map.as_deref().unwrap_or("<none>"),
                "run_finished"
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(error = %err, "run_failed");
            ExitCode::FAILURE
        }
    }
}

/// Logs every draw request and keeps a count for the run summary.
#[derive(Debug, Default)]
struct TraceSink {
    draw_calls: usize,
}

impl RenderSink for TraceSink {
    fn draw_region(&mut self, request: &DrawRequest) {
        self.draw_calls += 1;
        debug!(
            map = %request.map,
            layer = ?request.layer,
            x = request.screen_x,
            y = request.screen_y,
            tint = request.tint,
            alpha = request.alpha,
            "draw_region"
        );
    }
}

/// Walks the local player back and forth, picking up gold it touches,
/// until the tick budget runs out.
struct Autopilot {
    speed: i32,
    heading: i32,
}

impl Autopilot {
    fn new(speed: i32) -> Self {
        Self {
            speed: speed.max(1),
            heading: 1,
        }
    }

    fn step(&mut self, universe: &mut UniverseController) -> u32 {
        let player_name = universe.local_player_name();
        let config = universe.config().clone();
        let Some(map) = universe.active_map_mut() else {
            return 0;
        };
        let Some(player) = map.entity(&player_name) else {
            return 0;
        };
        if !player.is_active() {
            return 0;
        }

        let moved = player.rect.translate(self.speed * self.heading, 0);
        let target = if map.rect_collides(moved, &config) {
            self.heading = -self.heading;
            player.rect
        } else {
            moved
        };

        let mut collected = 0;
        for entity in map.entities_mut() {
            if entity.genus == Genus::Gold && entity.is_active() && entity.rect.intersects(&target) {
                entity.status = EntityStatus::Inactive;
                collected += 1;
            }
        }
        if let Some(player) = map.entity_mut(&player_name) {
            player.rect = target;
        }

        if collected > 0 {
            let remaining = map.remaining_gold_count();
            let name = map.name.clone();
            universe.set_map_gold_remaining(&name, remaining);
            info!(map = %name, collected, remaining, "gold_collected");
        }
        collected
    }
}

pub(crate) fn run_headless(paths: &UniversePaths, config: &RunConfig) -> Result<RunSummary, RunError> {
    let mut universe = UniverseController::open(
        paths,
        &config.universe,
        UniverseConfig::default(),
        Box::new(OfflineLink),
    )
    .map_err(|source| RunError::Open {
        universe: config.universe.clone(),
        source,
    })?;

    let primary = universe.primary_map_name().to_string();
    if primary.is_empty() {
        return Err(RunError::NoPrimaryMap(config.universe.clone()));
    }
    universe
        .transition_to_map(
            TransitionRequest::to_map(primary)
                .at_waypoint(SPAWN_WAYPOINT)
                .without_memory_save(),
        )
        .map_err(RunError::transition("enter primary map"))?;

    let mut autopilot = Autopilot::new(config.autopilot_speed);
    let mut sink = TraceSink::default();
    let mut summary = RunSummary::default();

    for _ in 0..config.ticks {
        summary.gold_collected += autopilot.step(&mut universe);
        for event in universe.tick() {
            handle_event(&mut universe, &mut summary, event)?;
        }
        universe.draw(&mut sink);
        summary.ticks += 1;
    }

    if config.save_on_exit {
        let manifest = universe
            .commit_autosave(AUTOSAVE_SLOT)
            .map_err(RunError::Save)?;
        info!(files = manifest.files.len(), "exit_save_written");
    }

    summary.draw_calls = sink.draw_calls;
    summary.final_map = universe.active_map_name().map(str::to_string);
    Ok(summary)
}

fn handle_event(
    universe: &mut UniverseController,
    summary: &mut RunSummary,
    event: UniverseEvent,
) -> Result<(), RunError> {
    let next_level = match event {
        UniverseEvent::MapTransition { from, to } => {
            summary.map_transitions += 1;
            info!(%from, %to, "map_transition");
            None
        }
        UniverseEvent::PlayerDied { cause } => {
            summary.deaths += 1;
            let current = universe
                .active_map_name()
                .map(str::to_string)
                .unwrap_or_else(|| universe.primary_map_name().to_string());
            info!(%cause, map = %current, "respawning_player");
            universe
                .transition_to_map(
                    TransitionRequest::to_map(current)
                        .at_waypoint(SPAWN_WAYPOINT)
                        .without_memory_save(),
                )
                .map_err(RunError::transition("respawn"))?;
            None
        }
        UniverseEvent::LevelComplete { next } => {
            summary.levels_completed += 1;
            Some(next)
        }
        UniverseEvent::LevelFailed { next } => Some(next),
        UniverseEvent::LockCallback { action } => {
            warn!(%action, "lock_callback_unhandled");
            None
        }
        other => {
            debug!(event = ?other, "universe_event");
            None
        }
    };

    if let Some(next) = next_level {
        info!(%next, "level_finished");
        universe
            .transition_to_map(TransitionRequest::to_map(next).at_waypoint(SPAWN_WAYPOINT))
            .map_err(RunError::transition("level transition"))?;
    }
    Ok(())
}
