use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub mod adjacency;
pub mod builder;
pub mod camera;
pub mod config;
mod fs_util;
pub mod geometry;
pub mod loader;
pub mod locks;
pub mod map;
pub mod map_data;
pub mod network;
pub mod render;
pub mod script;
pub mod session;
pub mod tree;
pub mod universe;

pub use adjacency::{camera_region, AdjacencyEngine, AdjacencyGraph};
pub use builder::{BuildRequest, GameMode, LifecycleStage};
pub use camera::{Camera, PrerenderStatus};
pub use config::UniverseConfig;
pub use geometry::{Rect, Vec2};
pub use loader::{MapLoadError, MapSource, XmlMapSource};
pub use locks::{LockAction, LockStrength};
pub use map::{Direction, EntityStatus, FallRegion, Genus, Map, MapEntity, Trigger};
pub use map_data::{Layer, MapData};
pub use network::{
    NetMessage, NetStatus, NetworkCommand, NetworkLink, NetworkParseError, OfflineLink, Outbound,
    QueuedLink,
};
pub use render::{DrawRequest, RenderSink};
pub use script::{LineScriptRunner, ScriptContext, ScriptLibrary, ScriptMode, ScriptRunner};
pub use session::{SessionStore, SessionVariable};
pub use tree::{TreeError, TreeNode, TreeStore, XmlTreeStore};
pub use universe::{
    Collaborators, Inventory, InventoryItem, ItemSort, Quest, QuestStatus, QuestUpdate,
    SaveManifest, TickPhase, TransitionRequest, UniverseController, UniverseDirs, UniverseError,
    UniverseEvent, UpgradeOption, UpgradePool, AUTOSAVE_SLOT, ITEM_ATTRIBUTE_KEYS,
    SAVE_FORMAT_VERSION,
};

pub const ROOT_ENV_VAR: &str = "DIGWORLD_ROOT";

#[derive(Debug, Clone)]
pub struct UniversePaths {
    pub root: PathBuf,
    pub universes_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub saves_dir: PathBuf,
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to read environment variable {var}: {source}")]
    EnvVar {
        var: &'static str,
        #[source]
        source: env::VarError,
    },
    #[error("failed to resolve current executable path: {0}")]
    CurrentExe(#[source] std::io::Error),
    #[error("current executable path has no parent directory: {0}")]
    ExeHasNoParent(PathBuf),
    #[error("failed to create save directory at {path}: {source}")]
    CreateSavesDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(
        "DIGWORLD_ROOT is set but does not point to a valid project root: {path}\n\
A valid root must contain Cargo.toml and either crates/ or assets/."
    )]
    InvalidEnvRoot { path: PathBuf },
    #[error(
        "Could not detect project root by walking upward from executable directory: {start_dir}\n\
Expected a directory containing Cargo.toml and either crates/ or assets/.\n\
Set {env_var} explicitly, for example:\n\
Bash/zsh: export {env_var}=\"/path/to/digworld\""
    )]
    RootNotFound {
        start_dir: PathBuf,
        env_var: &'static str,
    },
}

pub fn resolve_universe_paths() -> Result<UniversePaths, StartupError> {
    let root = resolve_root()?;
    universe_paths_at(root)
}

/// Lays out the standard directories under `root` and creates the save
/// directory.
pub fn universe_paths_at(root: PathBuf) -> Result<UniversePaths, StartupError> {
    let universes_dir = root.join("assets").join("universes");
    let cache_dir = root.join("cache");
    let saves_dir = cache_dir.join("saves");

    fs::create_dir_all(&saves_dir).map_err(|source| StartupError::CreateSavesDir {
        path: saves_dir.clone(),
        source,
    })?;

    Ok(UniversePaths {
        root,
        universes_dir,
        cache_dir,
        saves_dir,
    })
}

fn resolve_root() -> Result<PathBuf, StartupError> {
    match env::var(ROOT_ENV_VAR) {
        Ok(value) => {
            let raw = PathBuf::from(value);
            let normalized = normalize_path(&raw);
            if is_repo_marker(&normalized) {
                Ok(normalized)
            } else {
                Err(StartupError::InvalidEnvRoot { path: normalized })
            }
        }
        Err(env::VarError::NotPresent) => {
            let exe = env::current_exe().map_err(StartupError::CurrentExe)?;
            let exe_dir = exe
                .parent()
                .map(Path::to_path_buf)
                .ok_or_else(|| StartupError::ExeHasNoParent(exe.clone()))?;

            for candidate in exe_dir.ancestors() {
                if is_repo_marker(candidate) {
                    return Ok(normalize_path(candidate));
                }
            }

            Err(StartupError::RootNotFound {
                start_dir: normalize_path(&exe_dir),
                env_var: ROOT_ENV_VAR,
            })
        }
        Err(source) => Err(StartupError::EnvVar {
            var: ROOT_ENV_VAR,
            source,
        }),
    }
}

fn is_repo_marker(path: &Path) -> bool {
    let cargo_toml = path.join("Cargo.toml").is_file();
    let has_crates = path.join("crates").is_dir();
    let has_assets = path.join("assets").is_dir();

    cargo_toml && (has_crates || has_assets)
}

fn normalize_path(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
