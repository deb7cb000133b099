use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{info, warn};

use crate::adjacency::AdjacencyEngine;
use crate::builder::GameMode;
use crate::camera::{Camera, PrerenderStatus};
use crate::config::UniverseConfig;
use crate::loader::{MapLoadError, MapSource, XmlMapSource};
use crate::locks::{LockAction, LockStrength, LockTable, PauseCounter};
use crate::map::Map;
use crate::map_data::{Layer, MapData};
use crate::network::{NetworkCommand, NetworkLink};
use crate::script::{LineScriptRunner, ScriptContext, ScriptLibrary, ScriptMode, ScriptRunner};
use crate::session::SessionStore;
use crate::tree::{TreeError, TreeStore, XmlTreeStore};
use crate::UniversePaths;

mod activation;
mod bookkeeping;
mod draw;
mod items;
mod net_dispatch;
mod persist;
mod tick;

#[cfg(test)]
mod tests;

pub use activation::TransitionRequest;
pub use bookkeeping::{Quest, QuestStatus, QuestUpdate};
pub use items::{Inventory, InventoryItem, ItemSort, UpgradeOption, UpgradePool, ITEM_ATTRIBUTE_KEYS};
pub use persist::{SaveManifest, AUTOSAVE_SLOT, SAVE_FORMAT_VERSION};
pub use tick::TickPhase;

#[derive(Debug, Error)]
pub enum UniverseError {
    #[error(transparent)]
    Tree(#[from] TreeError),
    #[error(transparent)]
    MapLoad(#[from] MapLoadError),
    #[error("no active map is available to fall back to")]
    NoActiveMap,
    #[error("no map transition has been recorded to undo")]
    NoTransitionToUndo,
    #[error("universe {universe} has no save directory")]
    NoSaveDirectory { universe: String },
    #[error("failed to encode save manifest {path}: {source}")]
    ManifestEncode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to access save file {path}: {source}")]
    SaveIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Notable things that happened during a tick, in the order they happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UniverseEvent {
    Autosave,
    MapActivated { name: String },
    MapTransition { from: String, to: String },
    PlayerDied { cause: String },
    LevelComplete { next: String },
    LevelFailed { next: String },
    NetTransitionPending { target: String },
    Chat { text: String },
    LockCallback { action: String },
    EntityCommand { command: NetworkCommand },
}

/// External collaborators the controller drives.
pub struct Collaborators {
    pub maps: Box<dyn MapSource>,
    pub scripts: Box<dyn ScriptRunner>,
    pub network: Box<dyn NetworkLink>,
    pub store: Box<dyn TreeStore>,
}

/// On-disk locations for one universe.
#[derive(Debug, Clone)]
pub struct UniverseDirs {
    pub data_dir: PathBuf,
    pub save_dir: Option<PathBuf>,
}

/// Owns every piece of universe state and drives the per-tick pipeline.
pub struct UniverseController {
    name: String,
    config: UniverseConfig,
    dirs: UniverseDirs,
    maps: Box<dyn MapSource>,
    scripts: Box<dyn ScriptRunner>,
    network: Box<dyn NetworkLink>,
    store: Box<dyn TreeStore>,

    session: SessionStore,
    map_data: BTreeMap<Layer, BTreeMap<String, MapData>>,
    visible_maps: BTreeMap<Layer, BTreeMap<String, Map>>,
    adjacency: AdjacencyEngine,
    camera: Camera,

    active_map_name: Option<String>,
    context_stack: Vec<String>,
    primary_map_name: String,
    title: String,
    version: String,
    min_players: u32,
    max_players: u32,
    ignore_map_memory: bool,

    quests: Vec<Quest>,
    tracked_quests: Vec<String>,
    historical_records: BTreeMap<String, Vec<String>>,
    level_xp_requirements: BTreeMap<u32, u64>,
    inventory: Inventory,

    locks: LockTable,
    pause: PauseCounter,
    mode: GameMode,
    prerender_status: PrerenderStatus,
    discard_pending: bool,
    cutscene_active: bool,
    pending_events: Vec<UniverseEvent>,
}

impl UniverseController {
    pub fn new(
        name: impl Into<String>,
        config: UniverseConfig,
        dirs: UniverseDirs,
        collaborators: Collaborators,
    ) -> Self {
        let camera = Camera::new(&config);
        Self {
            name: name.into(),
            config,
            dirs,
            maps: collaborators.maps,
            scripts: collaborators.scripts,
            network: collaborators.network,
            store: collaborators.store,
            session: SessionStore::new(),
            map_data: BTreeMap::from([
                (Layer::Background, BTreeMap::new()),
                (Layer::Foreground, BTreeMap::new()),
            ]),
            visible_maps: BTreeMap::from([
                (Layer::Background, BTreeMap::new()),
                (Layer::Foreground, BTreeMap::new()),
            ]),
            adjacency: AdjacencyEngine::default(),
            camera,
            active_map_name: None,
            context_stack: Vec::new(),
            primary_map_name: String::new(),
            title: String::new(),
            version: String::new(),
            min_players: 1,
            max_players: 1,
            ignore_map_memory: false,
            quests: Vec::new(),
            tracked_quests: Vec::new(),
            historical_records: BTreeMap::new(),
            level_xp_requirements: BTreeMap::new(),
            inventory: Inventory::default(),
            locks: LockTable::default(),
            pause: PauseCounter::default(),
            mode: GameMode::Game,
            prerender_status: PrerenderStatus::Pending,
            discard_pending: false,
            cutscene_active: false,
            pending_events: Vec::new(),
        }
    }

    /// Opens `assets/universes/<name>` with the XML collaborators and the
    /// line script runner, then loads every universe file.
    pub fn open(
        paths: &UniversePaths,
        name: &str,
        config: UniverseConfig,
        network: Box<dyn NetworkLink>,
    ) -> Result<Self, UniverseError> {
        let data_dir = paths.universes_dir.join(name);
        let library = XmlTreeStore
            .load_tree(&data_dir.join("global").join("scripts.xml"))?
            .map(|node| ScriptLibrary::from_node(&node))
            .unwrap_or_default();
        info!(universe = name, scripts = library.len(), "script_library_loaded");

        let collaborators = Collaborators {
            maps: Box::new(XmlMapSource::new(data_dir.join("maps"))),
            scripts: Box::new(LineScriptRunner::new(library)),
            network,
            store: Box::new(XmlTreeStore),
        };
        let dirs = UniverseDirs {
            data_dir,
            save_dir: Some(paths.saves_dir.join(name)),
        };
        let mut universe = Self::new(name, config, dirs, collaborators);
        universe.load_universe()?;
        Ok(universe)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &UniverseConfig {
        &self.config
    }

    pub fn data_dir(&self) -> &Path {
        &self.dirs.data_dir
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn player_range(&self) -> (u32, u32) {
        (self.min_players, self.max_players)
    }

    pub fn primary_map_name(&self) -> &str {
        &self.primary_map_name
    }

    pub fn ignores_map_memory(&self) -> bool {
        self.ignore_map_memory
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut SessionStore {
        &mut self.session
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn camera_mut(&mut self) -> &mut Camera {
        &mut self.camera
    }

    pub fn adjacency(&self) -> &AdjacencyEngine {
        &self.adjacency
    }

    pub fn set_mode(&mut self, mode: GameMode) {
        self.mode = mode;
    }

    pub fn mode(&self) -> GameMode {
        self.mode
    }

    pub fn map_data(&self, layer: Layer, name: &str) -> Option<&MapData> {
        self.map_data.get(&layer).and_then(|maps| maps.get(name))
    }

    pub fn map_data_mut(&mut self, layer: Layer, name: &str) -> Option<&mut MapData> {
        self.map_data.get_mut(&layer).and_then(|maps| maps.get_mut(name))
    }

    pub fn map_names(&self, layer: Layer) -> Vec<String> {
        self.map_data
            .get(&layer)
            .map(|maps| maps.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Adds or replaces a map record and rebuilds adjacency and parallax.
    pub fn add_map(&mut self, data: MapData) {
        let layer = data.layer;
        self.map_data
            .entry(layer)
            .or_default()
            .insert(data.name.clone(), data);
        self.recalculate_adjacency();
    }

    pub fn recalculate_adjacency(&mut self) {
        let background = self
            .map_data
            .get(&Layer::Background)
            .cloned()
            .unwrap_or_default();
        let foreground = self.map_data.entry(Layer::Foreground).or_default();
        self.adjacency
            .rebuild(foreground, &background, &self.config);
    }

    /// Loaded map on `layer`, if it is in the visible-maps cache.
    pub fn visible_map(&self, layer: Layer, name: &str) -> Option<&Map> {
        self.visible_maps.get(&layer).and_then(|maps| maps.get(name))
    }

    pub fn visible_map_mut(&mut self, layer: Layer, name: &str) -> Option<&mut Map> {
        self.visible_maps
            .get_mut(&layer)
            .and_then(|maps| maps.get_mut(name))
    }

    pub fn loaded_map_names(&self, layer: Layer) -> Vec<String> {
        self.visible_maps
            .get(&layer)
            .map(|maps| maps.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn active_map_name(&self) -> Option<&str> {
        self.active_map_name.as_deref()
    }

    pub fn active_map(&self) -> Option<&Map> {
        let name = self.active_map_name.as_deref()?;
        self.visible_map(Layer::Foreground, name)
    }

    pub fn active_map_mut(&mut self) -> Option<&mut Map> {
        let name = self.active_map_name.clone()?;
        self.visible_map_mut(Layer::Foreground, &name)
    }

    /// Map scripts are currently initializing, falling back to the active
    /// map. Read-only; lifecycle code passes its target map explicitly.
    pub fn context_map_name(&self) -> Option<&str> {
        self.context_stack
            .last()
            .map(String::as_str)
            .or(self.active_map_name.as_deref())
    }

    pub fn local_player_name(&self) -> String {
        format!("player{}", self.session.get_int("core.player-id"))
    }

    pub fn prerender_status(&self) -> PrerenderStatus {
        self.prerender_status
    }

    pub fn is_discard_pending(&self) -> bool {
        self.discard_pending
    }

    pub fn set_cutscene_active(&mut self, active: bool) {
        self.cutscene_active = active;
    }

    pub fn pause(&mut self) -> bool {
        let soft_locked = self.locks.is_soft_locked();
        self.pause.pause(soft_locked)
    }

    pub fn unpause(&mut self, force: bool) {
        self.pause.unpause(force);
    }

    pub fn is_paused(&self) -> bool {
        self.pause.is_paused()
    }

    pub fn lock_with_key(
        &mut self,
        key: &str,
        timeout: Option<Duration>,
        strength: LockStrength,
        on_unlock: Option<&str>,
        on_timeout: Option<&str>,
    ) -> bool {
        self.locks
            .lock_with_key(key, timeout, strength, on_unlock, on_timeout, Instant::now())
    }

    /// Releases `key` and performs its on-unlock action.
    pub fn unlock(&mut self, key: &str) {
        if let Some(action) = self.locks.unlock(key, Instant::now()) {
            self.apply_lock_action(action);
        }
    }

    /// Drops expired locks and performs their on-timeout actions. Called by
    /// the network layer; the tick pipeline never enforces timeouts.
    pub fn expire_locks(&mut self, now: Instant) {
        for action in self.locks.timeout_expired(now) {
            self.apply_lock_action(action);
        }
    }

    pub fn lock_count(&self) -> usize {
        self.locks.lock_count()
    }

    pub fn is_locked(&self) -> bool {
        self.locks.is_locked()
    }

    pub fn is_soft_locked(&self) -> bool {
        self.locks.is_soft_locked()
    }

    fn apply_lock_action(&mut self, action: LockAction) {
        match action {
            LockAction::Script(name) => self.run_script(&name, ScriptMode::UntilYield),
            LockAction::Callback(action) => self.emit(UniverseEvent::LockCallback { action }),
        }
    }

    /// Runs `script` against the active map.
    pub fn run_script(&mut self, script: &str, mode: ScriptMode) {
        match self.active_map_name.clone() {
            Some(map_name) => self.run_script_on(Layer::Foreground, &map_name, script, mode),
            None => {
                let ctx = ScriptContext {
                    map_name: "",
                    session: &mut self.session,
                    map: None,
                };
                self.scripts.run_script(script, mode, ctx);
            }
        }
    }

    /// Runs `script` with `map_name` as its explicit target map.
    pub(crate) fn run_script_on(
        &mut self,
        layer: Layer,
        map_name: &str,
        script: &str,
        mode: ScriptMode,
    ) {
        let map = self
            .visible_maps
            .get_mut(&layer)
            .and_then(|maps| maps.get_mut(map_name));
        let ctx = ScriptContext {
            map_name,
            session: &mut self.session,
            map,
        };
        self.scripts.run_script(script, mode, ctx);
    }

    /// New game: session reboot plus every piece of per-playthrough state.
    /// Loaded maps are dropped so the next activation builds them fresh.
    pub fn reboot(&mut self) {
        self.session.reboot();
        for maps in self.map_data.values_mut() {
            for data in maps.values_mut() {
                data.reset_world_map_data();
            }
        }
        for maps in self.visible_maps.values_mut() {
            maps.clear();
        }
        self.active_map_name = None;
        self.context_stack.clear();
        self.discard_pending = false;
        self.reset_quests();
        self.historical_records.clear();
        self.inventory.reset();
        self.locks.clear();
        self.pause.unpause(true);
        info!(universe = %self.name, "universe_rebooted");
    }

    pub(crate) fn emit(&mut self, event: UniverseEvent) {
        self.pending_events.push(event);
    }

    pub(crate) fn warn_unknown_map(&self, name: &str) {
        warn!(universe = %self.name, map = name, "map_unknown");
    }
}
