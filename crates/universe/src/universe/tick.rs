use tracing::{debug, info, warn};

use crate::camera::PrerenderStatus;
use crate::map::{EntityStatus, Genus};
use crate::map_data::Layer;
use crate::network::{NetStatus, Outbound};

use super::persist::AUTOSAVE_SLOT;
use super::{UniverseController, UniverseError, UniverseEvent};

/// One step of the per-tick pipeline. `tick` runs them in `PIPELINE` order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickPhase {
    CameraFocus,
    CameraPan,
    CameraProcess,
    DeferredEviction,
    Prerender,
    Network,
    Simulation,
    PlayerExit,
    Events,
}

impl TickPhase {
    pub const PIPELINE: [TickPhase; 9] = [
        TickPhase::CameraFocus,
        TickPhase::CameraPan,
        TickPhase::CameraProcess,
        TickPhase::DeferredEviction,
        TickPhase::Prerender,
        TickPhase::Network,
        TickPhase::Simulation,
        TickPhase::PlayerExit,
        TickPhase::Events,
    ];

    /// Phases run while the network layer holds its global lock.
    pub const GLOBAL_LOCK_PIPELINE: [TickPhase; 2] = [TickPhase::Network, TickPhase::Events];
}

impl UniverseController {
    /// Advances the universe by one frame and returns what happened.
    pub fn tick(&mut self) -> Vec<UniverseEvent> {
        let phases: &[TickPhase] = if self.network.is_global_locked() {
            &TickPhase::GLOBAL_LOCK_PIPELINE
        } else {
            &TickPhase::PIPELINE
        };
        for phase in phases {
            self.run_phase(*phase);
        }
        std::mem::take(&mut self.pending_events)
    }

    fn run_phase(&mut self, phase: TickPhase) {
        match phase {
            TickPhase::CameraFocus => self.focus_camera_on_player(),
            TickPhase::CameraPan => {
                if !self.cutscene_active {
                    self.camera.pan_diagonal(self.config.camera_speed);
                }
            }
            TickPhase::CameraProcess => self.camera.process(),
            TickPhase::DeferredEviction => {
                if self.discard_pending && self.camera.is_settled() {
                    self.discard_nonadjacent_maps();
                    self.discard_pending = false;
                }
            }
            TickPhase::Prerender => self.advance_prerender(),
            TickPhase::Network => {
                self.drain_network();
                if self.network.status() == NetStatus::Server
                    && self.session.is_flag_set("net.game-in-progress")
                {
                    self.check_level_outcome();
                }
            }
            TickPhase::Simulation => self.simulate_active_map(),
            TickPhase::PlayerExit => self.check_player_exit(),
            TickPhase::Events => self.handle_events(),
        }
    }

    fn focus_camera_on_player(&mut self) {
        let Some(active) = self.active_map_name.as_deref() else {
            return;
        };
        let player_name = self.local_player_name();
        let Some(player) = self
            .visible_maps
            .get(&Layer::Foreground)
            .and_then(|maps| maps.get(active))
            .and_then(|map| map.entity(&player_name))
        else {
            return;
        };
        let Some(data) = self
            .map_data
            .get(&Layer::Foreground)
            .and_then(|maps| maps.get(active))
        else {
            return;
        };
        self.camera.focus(player.rect, data, &self.config);
    }

    fn advance_prerender(&mut self) {
        self.prerender_status = match self.prerender_status {
            PrerenderStatus::Pending if self.camera.is_settled() => PrerenderStatus::Ready,
            PrerenderStatus::Done if self.camera.is_dirty() => PrerenderStatus::Ready,
            status => status,
        };
    }

    fn simulate_active_map(&mut self) {
        if self.pause.is_paused() || self.locks.is_locked() {
            return;
        }
        let Some(active) = self.active_map_name.clone() else {
            return;
        };
        let Some(map) = self.visible_map_mut(Layer::Foreground, &active) else {
            return;
        };
        if map.is_busy() {
            return;
        }
        map.process();
        let remaining = map.remaining_gold_count();
        self.set_map_gold_remaining(&active, remaining);
        self.session.increment("core.time.played", 1);
    }

    /// Server only: decides whether the level just finished, either by
    /// collecting every gold piece or by losing every player.
    fn check_level_outcome(&mut self) {
        let Some(active) = self.active_map_name.clone() else {
            return;
        };
        let Some(map) = self.visible_map(Layer::Foreground, &active) else {
            return;
        };

        if map.remaining_gold_count() == 0 {
            let next = match map.param("next-map") {
                Some(next) if !next.is_empty() => next.to_string(),
                _ => {
                    warn!(map = %active, "next_map_param_missing");
                    active.clone()
                }
            };
            self.session.set("net.game-in-progress", "0");
            self.save_linear_progress();
            self.session.set("net.transition.target", next.as_str());
            self.network.send(Outbound::LevelComplete {
                next_map: next.clone(),
            });
            self.session.set("net.level.complete", "1");
            info!(map = %active, next = %next, "level_complete");
            self.emit(UniverseEvent::LevelComplete { next });
            return;
        }

        let player_limit = self.session.get_int("net.player-limit").max(1);
        let any_player_alive = (1..=player_limit).any(|slot| {
            map.entity(&format!("player{slot}"))
                .is_some_and(|player| player.is_active())
        });
        if !any_player_alive {
            self.session.set("net.game-in-progress", "0");
            self.session.set("net.transition.target", active.as_str());
            self.network.send(Outbound::LevelFailed {
                next_map: active.clone(),
            });
            self.session.set("net.level.failed", "1");
            info!(map = %active, "level_failed");
            self.emit(UniverseEvent::LevelFailed { next: active });
        }
    }

    /// Tests the local player against the active map's bounds. Outside the
    /// map the player either falls to its death or crosses into the first
    /// loaded foreground map it overlaps.
    pub(crate) fn check_player_exit(&mut self) {
        let Some(active) = self.active_map_name.clone() else {
            return;
        };
        let player_name = self.local_player_name();
        let Some(map) = self.visible_map(Layer::Foreground, &active) else {
            return;
        };
        let Some(player) = map.entity(&player_name) else {
            return;
        };
        if player.status != EntityStatus::Active {
            return;
        }
        let player_rect = player.rect;
        if player_rect.intersects(&map.relative_rect(&self.config)) {
            return;
        }

        let falling = map
            .fall_regions()
            .iter()
            .any(|region| region.relative_rect(map.height(), &self.config).intersects(&player_rect));
        if falling {
            // A dying player never crosses maps in the same frame.
            self.queue_player_death("out-of-bounds");
            return;
        }

        let origin = (map.x, map.y);
        let destination = self
            .visible_maps
            .get(&Layer::Foreground)
            .into_iter()
            .flat_map(|maps| maps.values())
            .filter(|candidate| candidate.name != active)
            .find(|candidate| {
                candidate
                    .relative_rect_from(origin, &self.config)
                    .intersects(&player_rect)
            })
            .map(|candidate| candidate.name.clone());

        match destination {
            Some(destination) => {
                if let Err(error) = self.cross_into_map(&active, &destination) {
                    warn!(from = %active, to = %destination, %error, "map_crossing_failed");
                }
            }
            None => debug!(map = %active, "player_outside_every_loaded_map"),
        }
    }

    /// Kills the local player once per life.
    pub(crate) fn queue_player_death(&mut self, cause: &str) {
        if self.session.is_flag_set("core.handled-local-death") {
            return;
        }
        self.session.set("core.handled-local-death", "1");
        self.session.set("core.player1.cause-of-death", cause);

        let player_name = self.local_player_name();
        if let Some(player) = self
            .active_map_mut()
            .and_then(|map| map.entity_mut(&player_name))
        {
            player.status = EntityStatus::Dying;
            player.pending_death = Some(cause.to_string());
        }
        info!(player = %player_name, cause, "player_died");
        self.emit(UniverseEvent::PlayerDied {
            cause: cause.to_string(),
        });
    }

    /// Boundary crossing: the player keeps its world position, re-expressed
    /// relative to the new map's origin.
    fn cross_into_map(&mut self, from: &str, to: &str) -> Result<(), UniverseError> {
        let player_name = self.local_player_name();
        let Some(from_map) = self.visible_map(Layer::Foreground, from) else {
            return Ok(());
        };
        let Some(to_map) = self.visible_map(Layer::Foreground, to) else {
            return Ok(());
        };
        let rel_x = (to_map.x - from_map.x) * self.config.tile_width;
        let rel_y = (to_map.y - from_map.y) * self.config.tile_height;

        self.save_map_memory(from);
        self.activate_map(to)?;

        let departing = self
            .visible_map_mut(Layer::Foreground, from)
            .map(|map| map.remove_entities_by_genus(Genus::Player))
            .unwrap_or_default();
        let Some(mut player) = departing.into_iter().find(|entity| entity.name == player_name) else {
            warn!(map = from, player = %player_name, "crossing_player_missing");
            return Ok(());
        };
        player.rect = player.rect.translate(-rel_x, -rel_y);
        let (x, y) = (player.rect.x, player.rect.y);

        if let Some(map) = self.visible_map_mut(Layer::Foreground, to) {
            map.remove_entities_by_genus(Genus::Player);
            map.add_entity(player);
        }
        self.session.set("core.player1.x", x.to_string());
        self.session.set("core.player1.y", y.to_string());
        self.discard_pending = true;

        info!(from, to, x, y, "player_crossed_map");
        self.emit(UniverseEvent::Autosave);
        self.emit(UniverseEvent::MapTransition {
            from: from.to_string(),
            to: to.to_string(),
        });
        Ok(())
    }

    fn handle_events(&mut self) {
        if !self.pending_events.contains(&UniverseEvent::Autosave) {
            return;
        }
        if self.dirs.save_dir.is_none() {
            debug!(universe = %self.name, "autosave_skipped_without_save_dir");
            return;
        }
        if let Err(error) = self.commit_autosave(AUTOSAVE_SLOT) {
            warn!(universe = %self.name, %error, "autosave_failed");
        }
    }
}
