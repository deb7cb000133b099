use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::fs_util::{read_optional_text, write_text_atomic};
use crate::map_data::{Layer, MapData};
use crate::tree::TreeNode;

use super::bookkeeping::{Quest, QuestUpdate};
use super::items::Inventory;
use super::{UniverseController, UniverseError};

pub const SAVE_FORMAT_VERSION: u16 = 1;
pub const AUTOSAVE_SLOT: u32 = 1;

const MAPS_FILE: &str = "maps.xml";
const SESSION_FILE: &str = "session.xml";
const MANIFEST_FILE: &str = "manifest.json";

/// Written last into a save slot; lists a SHA-256 digest per saved file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SaveManifest {
    pub format_version: u16,
    pub universe: String,
    pub slot: u32,
    pub active_map: String,
    pub files: BTreeMap<String, String>,
}

impl UniverseController {
    /// Reads meta, maps, quests, items and session defaults from the data
    /// directory. Missing files leave the corresponding defaults in place.
    pub(crate) fn load_universe(&mut self) -> Result<(), UniverseError> {
        let data_dir = self.dirs.data_dir.clone();

        match self.store.load_tree(&data_dir.join("meta.xml"))? {
            Some(meta) => self.apply_metadata(&meta),
            None => warn!(universe = %self.name, "universe_meta_missing"),
        }

        match self.store.load_tree(&data_dir.join(MAPS_FILE))? {
            Some(maps) => self.apply_maps(&maps),
            None => warn!(universe = %self.name, "universe_maps_missing"),
        }

        if let Some(quests) = self.store.load_tree(&data_dir.join("quests.xml"))? {
            self.quests = quests.children_by_tag("quest").filter_map(quest_from_node).collect();
        }

        if let Some(items) = self.store.load_tree(&data_dir.join("items.xml"))? {
            self.inventory = Inventory::from_node(&items);
        }

        if let Some(session) = self.store.load_tree(&data_dir.join(SESSION_FILE))? {
            self.session.load_state(&session);
        }

        info!(
            universe = %self.name,
            title = %self.title,
            foreground_maps = self.map_names(Layer::Foreground).len(),
            background_maps = self.map_names(Layer::Background).len(),
            quests = self.quests.len(),
            items = self.inventory.blueprints().len(),
            "universe_loaded"
        );
        Ok(())
    }

    fn apply_metadata(&mut self, meta: &TreeNode) {
        if let Some(version) = meta.find_child("version") {
            self.version = version.text.clone();
        }
        if let Some(params) = meta.find_child("params") {
            let param = |id: &str| params.find_child_by_id(id).map(|node| node.text.trim().to_string());
            if let Some(title) = param("title") {
                self.title = title;
            }
            if let Some(min) = param("min-players").and_then(|raw| raw.parse().ok()) {
                self.min_players = min;
            }
            if let Some(max) = param("max-players").and_then(|raw| raw.parse().ok()) {
                self.max_players = max;
            }
            self.ignore_map_memory = param("type").as_deref() == Some("linear");
        }
        if let Some(levels) = meta.find_child("character-levels") {
            for level in levels.children_by_tag("character-level") {
                let number = level.get_attribute("level").and_then(|raw| raw.parse::<u32>().ok());
                let xp = level.get_attribute("xp").and_then(|raw| raw.parse::<u64>().ok());
                if let (Some(number), Some(xp)) = (number, xp) {
                    self.level_xp_requirements.insert(number, xp);
                }
            }
        }
    }

    fn apply_maps(&mut self, maps: &TreeNode) {
        if let Some(primary) = maps.find_child("primary-map") {
            self.primary_map_name = primary.get_attribute("name").unwrap_or("").to_string();
        }
        for layer in [Layer::Background, Layer::Foreground] {
            let Some(group) = maps.find_child(layer.tag()) else {
                continue;
            };
            let records = self.map_data.entry(layer).or_default();
            for node in group.children_by_tag("map") {
                let mut data = MapData::from_node(node);
                data.layer = layer;
                if data.name.is_empty() {
                    warn!(?layer, "map_record_without_name");
                    continue;
                }
                records.insert(data.name.clone(), data);
            }
        }
        self.recalculate_adjacency();
    }

    fn save_root(&self) -> Result<&Path, UniverseError> {
        self.dirs
            .save_dir
            .as_deref()
            .ok_or_else(|| UniverseError::NoSaveDirectory {
                universe: self.name.clone(),
            })
    }

    pub fn save_slot_dir(&self, slot: u32) -> Result<PathBuf, UniverseError> {
        Ok(self.save_root()?.join(format!("slot{slot}")))
    }

    fn memory_path(&self, map_name: &str) -> Option<PathBuf> {
        let root = self.dirs.save_dir.as_deref()?;
        Some(
            root.join("active")
                .join("history")
                .join(format!("{map_name}.history.xml")),
        )
    }

    /// Saves the map's memory file. Best effort: failures are logged.
    pub fn save_map_memory(&mut self, map_name: &str) {
        if self.ignore_map_memory {
            return;
        }
        let Some(path) = self.memory_path(map_name) else {
            debug!(map = map_name, "map_memory_not_saved_without_save_dir");
            return;
        };
        let Some(memory) = self
            .visible_map(Layer::Foreground, map_name)
            .and_then(|map| map.save_memory())
        else {
            return;
        };
        match self.store.save_tree(&memory, &path) {
            Ok(()) => debug!(map = map_name, path = %path.display(), "map_memory_saved"),
            Err(error) => warn!(map = map_name, %error, "map_memory_save_failed"),
        }
    }

    pub(crate) fn load_map_memory(&mut self, layer: Layer, map_name: &str) {
        let Some(path) = self.memory_path(map_name) else {
            return;
        };
        let memory = match self.store.load_tree(&path) {
            Ok(Some(memory)) => memory,
            Ok(None) => return,
            Err(error) => {
                warn!(map = map_name, %error, "map_memory_load_failed");
                return;
            }
        };
        if let Some(map) = self.visible_map_mut(layer, map_name) {
            map.load_memory(&memory);
            debug!(map = map_name, "map_memory_loaded");
        }
    }

    /// Writes `maps.xml`, `session.xml` and `manifest.json` into the slot.
    pub fn commit_autosave(&mut self, slot: u32) -> Result<SaveManifest, UniverseError> {
        let dir = self.save_slot_dir(slot)?;

        let mut maps = TreeNode::new("maps");
        maps.add_child(TreeNode::new("primary-map").with_attribute("name", &self.primary_map_name));
        for (layer, records) in &self.map_data {
            let group = maps.add_child(TreeNode::new(layer.tag()));
            for data in records.values() {
                group.add_child(
                    data.save_state()
                        .with_attribute("visited", u8::from(data.visited))
                        .with_attribute("visible", u8::from(data.visible))
                        .with_attribute("completed", u8::from(data.completed))
                        .with_attribute("gold-remaining", data.gold_remaining()),
                );
            }
        }
        let session = self.session.save_state();

        let mut files = BTreeMap::new();
        for (file, node) in [(MAPS_FILE, &maps), (SESSION_FILE, &session)] {
            let path = dir.join(file);
            self.store.save_tree(node, &path)?;
            files.insert(file.to_string(), digest_hex(&node.to_xml_string()));
        }

        let manifest = SaveManifest {
            format_version: SAVE_FORMAT_VERSION,
            universe: self.name.clone(),
            slot,
            active_map: self.active_map_name.clone().unwrap_or_default(),
            files,
        };
        let manifest_path = dir.join(MANIFEST_FILE);
        let text = serde_json::to_string_pretty(&manifest).map_err(|source| {
            UniverseError::ManifestEncode {
                path: manifest_path.clone(),
                source,
            }
        })?;
        write_text_atomic(&manifest_path, &text).map_err(|source| UniverseError::SaveIo {
            path: manifest_path.clone(),
            source,
        })?;

        info!(universe = %self.name, slot, dir = %dir.display(), "autosave_committed");
        Ok(manifest)
    }

    /// Restores session values and map flags from a slot. A missing,
    /// unreadable or tampered save is treated as absent.
    pub fn load_save(&mut self, slot: u32) -> Result<Option<SaveManifest>, UniverseError> {
        let dir = self.save_slot_dir(slot)?;
        let manifest_path = dir.join(MANIFEST_FILE);
        let Some(raw) = read_optional_text(&manifest_path).map_err(|source| UniverseError::SaveIo {
            path: manifest_path.clone(),
            source,
        })?
        else {
            debug!(slot, "save_slot_empty");
            return Ok(None);
        };
        let manifest = match serde_json::from_str::<SaveManifest>(&raw) {
            Ok(manifest) if manifest.format_version == SAVE_FORMAT_VERSION => manifest,
            Ok(manifest) => {
                warn!(slot, version = manifest.format_version, "save_format_unsupported");
                return Ok(None);
            }
            Err(error) => {
                warn!(slot, %error, "save_manifest_unreadable");
                return Ok(None);
            }
        };

        let mut trees = BTreeMap::new();
        for file in [MAPS_FILE, SESSION_FILE] {
            let path = dir.join(file);
            let text = read_optional_text(&path).map_err(|source| UniverseError::SaveIo {
                path: path.clone(),
                source,
            })?;
            let Some(text) = text else {
                warn!(slot, file, "save_file_missing");
                return Ok(None);
            };
            if manifest.files.get(file) != Some(&digest_hex(&text)) {
                warn!(slot, file, "save_digest_mismatch");
                return Ok(None);
            }
            trees.insert(file, TreeNode::parse(&text, &path)?);
        }

        if let Some(session) = trees.get(SESSION_FILE) {
            self.session.load_state(session);
        }
        if let Some(maps) = trees.get(MAPS_FILE) {
            self.apply_saved_map_flags(maps);
        }
        info!(universe = %self.name, slot, active_map = %manifest.active_map, "save_loaded");
        Ok(Some(manifest))
    }

    fn apply_saved_map_flags(&mut self, maps: &TreeNode) {
        for layer in [Layer::Background, Layer::Foreground] {
            let Some(group) = maps.find_child(layer.tag()) else {
                continue;
            };
            for node in group.children_by_tag("map") {
                let Some(name) = node.get_attribute("name") else {
                    continue;
                };
                let Some(data) = self.map_data_mut(layer, name) else {
                    debug!(map = name, "saved_map_unknown");
                    continue;
                };
                let flag = |key: &str| node.get_attribute(key) == Some("1");
                data.visited = flag("visited");
                data.visible = flag("visible");
                data.completed = flag("completed");
                if let Some(time) = node.get_attribute("completion-time").and_then(|raw| raw.parse().ok()) {
                    data.completion_time = time;
                }
                if let Some(remaining) = node.get_attribute("gold-remaining").and_then(|raw| raw.parse().ok()) {
                    data.set_gold_remaining(remaining);
                }
            }
        }
    }
}

/// `<quest name title xp><description/><update name>text</update></quest>`.
fn quest_from_node(node: &TreeNode) -> Option<Quest> {
    let mut quest = Quest::new(
        node.get_attribute("name")?,
        node.get_attribute("title").unwrap_or(""),
    );
    quest.xp = node
        .get_attribute("xp")
        .and_then(|raw| raw.trim().parse().ok())
        .unwrap_or(0);
    if let Some(description) = node.find_child("description") {
        quest.description = description.text.trim().to_string();
    }
    quest.updates = node
        .children_by_tag("update")
        .filter_map(|update| {
            Some(QuestUpdate::new(
                update.get_attribute("name")?,
                update.text.trim(),
            ))
        })
        .collect();
    Some(quest)
}

fn digest_hex(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}
