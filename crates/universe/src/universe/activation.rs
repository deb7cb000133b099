use tracing::{debug, info, warn};

use crate::builder::{build_bounds_plane, compute_fall_regions, BuildRequest, GameMode, LifecycleStage};
use crate::camera::PrerenderStatus;
use crate::geometry::Rect;
use crate::map::{Genus, MapEntity};
use crate::map_data::Layer;
use crate::script::ScriptMode;

use super::persist::AUTOSAVE_SLOT;
use super::{UniverseController, UniverseError, UniverseEvent};

/// Waypoint used when the resolved spawn point is inside solid tiles.
const SAFE_SPAWN_WAYPOINT: &str = "safe-spawn";

/// Map `type` param whose exits load only the destination map.
const LINEAR_MAP_TYPE: &str = "linear";

/// An explicit warp to a map, e.g. through a door or on game start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionRequest {
    pub map: String,
    pub waypoint: Option<String>,
    /// Waypoint on the departing map an undo should return to.
    pub from_waypoint: Option<String>,
    pub save_memory: bool,
    /// Record where the player came from so the warp can be undone.
    pub can_undo: bool,
}

impl TransitionRequest {
    pub fn to_map(map: impl Into<String>) -> Self {
        Self {
            map: map.into(),
            waypoint: None,
            from_waypoint: None,
            save_memory: true,
            can_undo: true,
        }
    }

    pub fn from_waypoint(mut self, waypoint: impl Into<String>) -> Self {
        self.from_waypoint = Some(waypoint.into());
        self
    }

    pub fn at_waypoint(mut self, waypoint: impl Into<String>) -> Self {
        self.waypoint = Some(waypoint.into());
        self
    }

    /// Skip saving the departing map's memory (death retry, loading a save).
    pub fn without_memory_save(mut self) -> Self {
        self.save_memory = false;
        self
    }

    pub fn without_undo(mut self) -> Self {
        self.can_undo = false;
        self
    }
}

impl UniverseController {
    /// Loads `name` into the visible-maps cache if needed and, unless the
    /// request ignores them, its adjacent maps. Recomputes the map's fall
    /// regions and, in game mode, its bounds plane.
    ///
    /// A foreground request that ignores adjacent maps empties the
    /// foreground cache first, leaving `name` as the only loaded map.
    pub fn build_map_on_layer_by_name(
        &mut self,
        name: &str,
        request: BuildRequest,
    ) -> Result<(), UniverseError> {
        let Some(data) = self.map_data(request.layer, name).cloned() else {
            self.warn_unknown_map(name);
            return Ok(());
        };
        if request.ignore_adjacent && request.layer == Layer::Foreground {
            if let Some(maps) = self.visible_maps.get_mut(&Layer::Foreground) {
                maps.clear();
            }
        }
        self.ensure_loaded(request.layer, name, request.mode)?;
        if request.layer == Layer::Background {
            return Ok(());
        }

        let mut neighbors = Vec::new();
        if !request.ignore_adjacent {
            for neighbor in self.adjacency.adjacent(name).to_vec() {
                self.ensure_loaded(Layer::Foreground, &neighbor, request.mode)?;
                self.set_map_visible(&neighbor);
                neighbors.push(neighbor);
            }
        }

        let regions = {
            let records = neighbors
                .iter()
                .filter_map(|neighbor| self.map_data(Layer::Foreground, neighbor));
            compute_fall_regions(&data, records)
        };

        let plane = if request.mode == GameMode::Game && !request.ignore_adjacent {
            self.visible_map(Layer::Foreground, name).map(|map| {
                let loaded = neighbors
                    .iter()
                    .filter_map(|neighbor| self.visible_map(Layer::Foreground, neighbor));
                build_bounds_plane(map, loaded, self.config.collision_boundary_size)
            })
        } else {
            None
        };

        if let Some(map) = self.visible_map_mut(Layer::Foreground, name) {
            map.set_fall_regions(regions);
            if let Some(plane) = plane {
                map.set_bounds_plane(plane);
            }
        }
        Ok(())
    }

    /// Instantiates `name` if it is not cached yet. In game mode a fresh map
    /// walks every lifecycle stage with itself as the script target.
    fn ensure_loaded(&mut self, layer: Layer, name: &str, mode: GameMode) -> Result<(), UniverseError> {
        if self.visible_map(layer, name).is_some() {
            return Ok(());
        }
        let Some(data) = self.map_data(layer, name) else {
            self.warn_unknown_map(name);
            return Ok(());
        };
        let map = self.maps.load_map(data)?;
        self.visible_maps
            .entry(layer)
            .or_default()
            .insert(name.to_string(), map);
        debug!(map = name, ?layer, "map_instantiated");

        if mode == GameMode::Game && layer == Layer::Foreground {
            self.run_lifecycle(layer, name);
        }
        Ok(())
    }

    fn run_lifecycle(&mut self, layer: Layer, name: &str) {
        self.context_stack.push(name.to_string());
        let mut stage = Some(LifecycleStage::GlobalOnLoad);
        while let Some(current) = stage {
            match current {
                LifecycleStage::GlobalOnLoad | LifecycleStage::OnLoad | LifecycleStage::LoadComplete => {
                    if let Some(script) = current.script_name() {
                        self.run_script_on(layer, name, script, ScriptMode::ToCompletion);
                    }
                }
                LifecycleStage::OnBirth => {
                    if self.is_map_newborn(name) {
                        if let Some(script) = current.script_name() {
                            self.run_script_on(layer, name, script, ScriptMode::ToCompletion);
                        }
                    }
                }
                LifecycleStage::Memory => {
                    if !self.ignore_map_memory {
                        self.load_map_memory(layer, name);
                    }
                }
                LifecycleStage::Visible => self.set_map_visible(name),
            }
            stage = current.next();
        }
        self.context_stack.pop();
    }

    /// Makes `name` the active foreground map. An unknown name reloads the
    /// current map instead.
    pub fn activate_map(&mut self, name: &str) -> Result<(), UniverseError> {
        self.activate_foreground_map(name, false)
    }

    fn activate_foreground_map(&mut self, name: &str, ignore_adjacent: bool) -> Result<(), UniverseError> {
        if self.map_data(Layer::Foreground, name).is_none() {
            self.warn_unknown_map(name);
            let current = self.active_map_name.clone().ok_or(UniverseError::NoActiveMap)?;
            if self.map_data(Layer::Foreground, &current).is_none() {
                return Err(UniverseError::NoActiveMap);
            }
            warn!(requested = name, current = %current, "reloading_current_map");
            return self.activate_foreground_map(&current, ignore_adjacent);
        }

        self.clear_item_attribute_cache();
        self.active_map_name = Some(name.to_string());
        self.session.set("app.active-map-name", name);
        let mut request = BuildRequest::new(Layer::Foreground, self.mode);
        if ignore_adjacent {
            request = request.without_adjacent();
        }
        self.build_map_on_layer_by_name(name, request)?;

        if self.is_map_newborn(name) {
            self.set_map_visited(name);
            self.run_script_on(Layer::Foreground, name, "map.first-visit", ScriptMode::ToCompletion);
        }

        for neighbor in self.adjacency.adjacent(name).to_vec() {
            self.set_map_visible(&neighbor);
        }

        for background in self.adjacency.parallax_maps(name).to_vec() {
            self.build_map_on_layer_by_name(&background, BuildRequest::editor(Layer::Background))?;
        }

        if self.mode == GameMode::Game {
            self.run_script_on(Layer::Foreground, name, "global.map.onvisit", ScriptMode::UntilYield);
            self.run_script_on(Layer::Foreground, name, "onvisit", ScriptMode::UntilYield);
        }

        self.prerender_status = PrerenderStatus::Pending;
        info!(map = name, "map_activated");
        self.emit(UniverseEvent::MapActivated {
            name: name.to_string(),
        });
        Ok(())
    }

    /// Warps the local player to another map: save memory, clear the
    /// foreground cache, activate, resolve and validate the spawn point,
    /// recreate the player and cut the camera. Leaving a linear map loads
    /// the destination without its neighbors.
    pub fn transition_to_map(&mut self, request: TransitionRequest) -> Result<(), UniverseError> {
        let destination = if self.map_data(Layer::Foreground, &request.map).is_some() {
            request.map.clone()
        } else {
            self.warn_unknown_map(&request.map);
            let current = self.active_map_name.clone().ok_or(UniverseError::NoActiveMap)?;
            warn!(requested = %request.map, current = %current, "transition_falls_back_to_current_map");
            current
        };
        let from = self.active_map_name.clone();
        let player_name = self.local_player_name();
        let ignore_adjacent = self
            .active_map()
            .is_some_and(|map| map.param("type") == Some(LINEAR_MAP_TYPE));

        if request.save_memory {
            if let Some(from) = &from {
                self.save_map_memory(from);
            }
        }
        let previous_player = self
            .active_map()
            .and_then(|map| map.entity(&player_name))
            .cloned();

        if request.can_undo {
            self.session
                .set("app.transition.from.map", from.clone().unwrap_or_default());
            self.session.set(
                "app.transition.from.waypoint",
                request.from_waypoint.clone().unwrap_or_default(),
            );
            if let Some(previous) = &previous_player {
                self.session
                    .set("app.transition.from.player-x", previous.rect.x.to_string());
                self.session
                    .set("app.transition.from.player-y", previous.rect.y.to_string());
            }
        }

        if let Some(maps) = self.visible_maps.get_mut(&Layer::Foreground) {
            maps.clear();
        }
        self.activate_foreground_map(&destination, ignore_adjacent)?;

        let (spawn_x, spawn_y) = self.resolve_spawn(&destination, request.waypoint.as_deref());

        let mut player = MapEntity::new(
            player_name,
            Genus::Player,
            Rect::new(spawn_x, spawn_y, self.config.tile_width, self.config.tile_height),
        );
        if let Some(previous) = &previous_player {
            player.inherit_motion_from(previous);
        }
        let player_rect = player.rect;
        if let Some(map) = self.visible_map_mut(Layer::Foreground, &destination) {
            map.remove_entities_by_genus(Genus::Player);
            map.add_entity(player);
        }

        self.session.set("core.player1.x", spawn_x.to_string());
        self.session.set("core.player1.y", spawn_y.to_string());
        self.session.set("core.handled-local-death", "0");
        self.session.set("app.transition.to.map", destination.as_str());
        self.session.set(
            "app.transition.to.waypoint",
            request.waypoint.clone().unwrap_or_default(),
        );

        if let Some(data) = self.map_data(Layer::Foreground, &destination).cloned() {
            self.camera
                .center_on_entity_within_map(player_rect, &data, &self.config);
            self.camera.zap();
        }

        info!(
            from = from.as_deref().unwrap_or(""),
            to = %destination,
            x = spawn_x,
            y = spawn_y,
            "map_transition"
        );
        self.emit(UniverseEvent::MapTransition {
            from: from.unwrap_or_default(),
            to: destination,
        });
        Ok(())
    }

    /// Returns to the map the last undoable transition left, at its recorded
    /// waypoint or, without one, where the player stood. Autosaves after.
    pub fn undo_last_map_transition(&mut self, save_memory: bool) -> Result<(), UniverseError> {
        let map = self.session.text("app.transition.from.map").to_string();
        if map.is_empty() {
            return Err(UniverseError::NoTransitionToUndo);
        }
        let waypoint = self.session.text("app.transition.from.waypoint").to_string();
        let mut request = TransitionRequest::to_map(map).without_undo();
        if waypoint.is_empty() {
            let x = self.session.text("app.transition.from.player-x").to_string();
            let y = self.session.text("app.transition.from.player-y").to_string();
            self.session.set("core.player1.x", x);
            self.session.set("core.player1.y", y);
        } else {
            request = request.at_waypoint(waypoint);
        }
        if !save_memory {
            request = request.without_memory_save();
        }
        self.transition_to_map(request)?;

        let player_name = self.local_player_name();
        if let Some(player) = self.active_map().and_then(|map| map.entity(&player_name)) {
            let (x, y) = (player.rect.x, player.rect.y);
            self.session.set("core.player1.x", x.to_string());
            self.session.set("core.player1.y", y.to_string());
        }
        if self.dirs.save_dir.is_some() {
            if let Err(error) = self.commit_autosave(AUTOSAVE_SLOT) {
                warn!(%error, "undo_transition_autosave_failed");
            }
        }
        Ok(())
    }

    /// Waypoint first, then the recorded player position; a spot inside
    /// solid tiles falls back to the map's safe-spawn waypoint.
    fn resolve_spawn(&self, map_name: &str, waypoint: Option<&str>) -> (i32, i32) {
        let Some(map) = self.visible_map(Layer::Foreground, map_name) else {
            return (0, 0);
        };
        let recorded = (
            self.session.get_int("core.player1.x") as i32,
            self.session.get_int("core.player1.y") as i32,
        );
        let spawn = match waypoint.and_then(|name| map.trigger(name)) {
            Some(trigger) => (trigger.rect.x, trigger.rect.y),
            None => {
                if let Some(name) = waypoint {
                    warn!(map = map_name, waypoint = name, "waypoint_missing_using_recorded_position");
                }
                recorded
            }
        };

        let footprint = Rect::new(spawn.0, spawn.1, self.config.tile_width, self.config.tile_height);
        if map.rect_collides(footprint, &self.config) {
            if let Some(safe) = map.trigger(SAFE_SPAWN_WAYPOINT) {
                debug!(map = map_name, "spawn_blocked_using_safe_spawn");
                return (safe.rect.x, safe.rect.y);
            }
            warn!(map = map_name, x = spawn.0, y = spawn.1, "spawn_blocked_without_safe_spawn");
        }
        spawn
    }

    /// Evicts every loaded foreground map that is neither active nor
    /// adjacent to the active map.
    pub fn discard_nonadjacent_maps(&mut self) {
        let Some(active) = self.active_map_name.clone() else {
            return;
        };
        let keep = self.adjacency.adjacent(&active).to_vec();
        if let Some(maps) = self.visible_maps.get_mut(&Layer::Foreground) {
            let before = maps.len();
            maps.retain(|name, _| *name == active || keep.contains(name));
            debug!(
                active = %active,
                discarded = before - maps.len(),
                "nonadjacent_maps_discarded"
            );
        }
    }
}
