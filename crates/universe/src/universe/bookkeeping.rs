use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use crate::adjacency;
use crate::camera::Camera;
use crate::config::MAX_SKILL_SLOTS;
use crate::geometry::Rect;
use crate::map_data::Layer;
use crate::session::ACTIVE_SKILL_LIST;

use super::persist::AUTOSAVE_SLOT;
use super::UniverseController;

const UNTITLED_AREA: &str = "Untitled Area";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum QuestStatus {
    #[default]
    Inactive,
    Active,
    Complete,
    Failed,
}

impl QuestStatus {
    pub fn phrase(self) -> &'static str {
        match self {
            QuestStatus::Inactive => "inactive",
            QuestStatus::Active => "active",
            QuestStatus::Complete => "complete",
            QuestStatus::Failed => "failed",
        }
    }
}

/// One step of a quest's log. Scripts reveal updates as the player makes
/// progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestUpdate {
    pub name: String,
    pub description: String,
    pub active: bool,
}

impl QuestUpdate {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            active: false,
        }
    }

    pub fn status_phrase(&self) -> &'static str {
        if self.active {
            "active"
        } else {
            "inactive"
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quest {
    pub name: String,
    pub title: String,
    pub description: String,
    pub xp: u64,
    pub status: QuestStatus,
    pub updates: Vec<QuestUpdate>,
    /// Update names in the order the player reached them.
    tracked_updates: Vec<String>,
}

impl Quest {
    pub fn new(name: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            title: title.into(),
            description: String::new(),
            xp: 0,
            status: QuestStatus::Inactive,
            updates: Vec::new(),
            tracked_updates: Vec::new(),
        }
    }

    pub fn update(&self, name: &str) -> Option<&QuestUpdate> {
        self.updates.iter().find(|update| update.name == name)
    }

    pub fn status_phrase(&self) -> &'static str {
        self.status.phrase()
    }

    /// Activates the named update and appends it to the tracked order once.
    pub fn track_update_by_name(&mut self, name: &str) -> bool {
        let Some(update) = self.updates.iter_mut().find(|update| update.name == name) else {
            return false;
        };
        update.active = true;
        if !self.tracked_updates.iter().any(|tracked| tracked == name) {
            self.tracked_updates.push(name.to_string());
        }
        true
    }

    /// Tracked updates with text, in the order they were reached.
    pub fn active_updates(&self) -> Vec<&QuestUpdate> {
        self.tracked_updates
            .iter()
            .filter_map(|name| self.update(name))
            .filter(|update| !update.description.is_empty())
            .collect()
    }

    /// Last active update in declaration order.
    pub fn latest_update(&self) -> Option<&QuestUpdate> {
        self.updates.iter().rev().find(|update| update.active)
    }

    fn reset(&mut self) {
        self.status = QuestStatus::Inactive;
        self.tracked_updates.clear();
        for update in &mut self.updates {
            update.active = false;
        }
    }
}

impl UniverseController {
    // Gold

    pub fn count_gold_pieces(&self, class: &str) -> u32 {
        self.foreground_records()
            .filter(|data| data.has_class(class))
            .map(|data| data.gold_count())
            .sum()
    }

    pub fn count_collected_gold_pieces(&self, class: &str) -> u32 {
        self.foreground_records()
            .filter(|data| data.has_class(class))
            .map(|data| data.gold_count() - data.gold_remaining())
            .sum()
    }

    pub fn calculate_universal_gold_total(&self) -> u32 {
        self.count_gold_pieces("*")
    }

    pub fn set_map_gold_remaining(&mut self, name: &str, remaining: u32) {
        match self.map_data_mut(Layer::Foreground, name) {
            Some(data) => data.set_gold_remaining(remaining),
            None => self.warn_unknown_map(name),
        }
    }

    fn foreground_records(&self) -> impl Iterator<Item = &crate::map_data::MapData> {
        self.map_data
            .get(&Layer::Foreground)
            .into_iter()
            .flat_map(|maps| maps.values())
    }

    // Quests

    pub fn quests(&self) -> &[Quest] {
        &self.quests
    }

    pub fn quest(&self, name: &str) -> Option<&Quest> {
        self.quests.iter().find(|quest| quest.name == name)
    }

    pub fn set_quest_status(&mut self, name: &str, status: QuestStatus) -> bool {
        match self.quests.iter_mut().find(|quest| quest.name == name) {
            Some(quest) => {
                quest.status = status;
                true
            }
            None => {
                warn!(quest = name, "quest_unknown");
                false
            }
        }
    }

    /// Flags one update of `quest`. Only `"active"` does anything; it returns
    /// true when the update was newly activated.
    pub fn flag_update_by_name(&mut self, quest: &str, update: &str, flag_type: &str) -> bool {
        if flag_type != "active" {
            warn!(quest, update, flag_type, "quest_update_flag_unsupported");
            return false;
        }
        let Some(quest_data) = self.quests.iter_mut().find(|candidate| candidate.name == quest) else {
            warn!(quest, "quest_unknown");
            return false;
        };
        if quest_data.update(update).map_or(true, |existing| existing.active) {
            return false;
        }
        quest_data.track_update_by_name(update);
        info!(quest, update, "quest_updated");
        true
    }

    pub fn track_update_by_name(&mut self, quest: &str, update: &str) -> bool {
        match self.quests.iter_mut().find(|candidate| candidate.name == quest) {
            Some(quest_data) => quest_data.track_update_by_name(update),
            None => {
                warn!(quest, "quest_unknown");
                false
            }
        }
    }

    /// Adds `name` to the tracked list once.
    pub fn track_quest_by_name(&mut self, name: &str) {
        if !self.tracked_quests.iter().any(|tracked| tracked == name) {
            self.tracked_quests.push(name.to_string());
        }
    }

    pub fn tracked_quests(&self) -> &[String] {
        &self.tracked_quests
    }

    pub fn count_quests(&self) -> usize {
        self.quests.len()
    }

    pub fn count_completed_quests(&self) -> usize {
        self.completed_quests().len()
    }

    pub fn completed_quests(&self) -> Vec<&Quest> {
        self.quests
            .iter()
            .filter(|quest| quest.status == QuestStatus::Complete)
            .collect()
    }

    pub(crate) fn reset_quests(&mut self) {
        self.tracked_quests.clear();
        for quest in &mut self.quests {
            quest.reset();
        }
    }

    // Session text

    /// Replaces every `$[key]` naming a session variable with its value.
    /// Unknown keys stay as written.
    pub fn translate_session_variable_references(&self, message: &str) -> String {
        self.session.translate_references(message)
    }

    // Skills

    pub fn skill_level(&self, skill: &str) -> i64 {
        self.session.get_int(&format!("core.skills.{skill}"))
    }

    /// Active skills with a level above zero, in roster order.
    pub fn unlocked_skill_names(&self) -> Vec<&'static str> {
        ACTIVE_SKILL_LIST
            .iter()
            .copied()
            .filter(|skill| self.skill_level(skill) > 0)
            .collect()
    }

    /// Equips an active skill in `slot` (1-based). A skill already equipped
    /// elsewhere moves to the new slot.
    pub fn assign_skill_to_slot(&mut self, skill: &str, slot: u32) -> bool {
        if !ACTIVE_SKILL_LIST.contains(&skill) || !(1..=MAX_SKILL_SLOTS).contains(&slot) {
            warn!(skill, slot, "skill_assignment_rejected");
            return false;
        }
        for other in 1..=MAX_SKILL_SLOTS {
            let key = format!("core.player1.skill{other}");
            if other != slot && self.session.text(&key) == skill {
                self.session.set(&key, "");
                self.session.set(&format!("{key}:changed"), "1");
            }
        }
        let key = format!("core.player1.skill{slot}");
        self.session.set(&key, skill);
        self.session.set(&format!("{key}:changed"), "1");
        debug!(skill, slot, "skill_assigned");
        true
    }

    pub fn is_skill_equipped(&self, skill: &str) -> bool {
        (1..=MAX_SKILL_SLOTS).any(|slot| self.session.text(&format!("core.player1.skill{slot}")) == skill)
    }

    // Historical records

    pub fn add_historical_record(&mut self, group: &str, record: &str) {
        let records = self.historical_records.entry(group.to_string()).or_default();
        if !records.iter().any(|existing| existing == record) {
            records.push(record.to_string());
        }
    }

    pub fn has_historical_record(&self, group: &str, record: &str) -> bool {
        self.historical_records(group).iter().any(|existing| existing == record)
    }

    pub fn historical_records(&self, group: &str) -> &[String] {
        self.historical_records
            .get(group)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    // Character levels

    pub fn level_xp_requirements(&self) -> &BTreeMap<u32, u64> {
        &self.level_xp_requirements
    }

    pub fn xp_required_for_level(&self, level: u32) -> Option<u64> {
        self.level_xp_requirements.get(&level).copied()
    }

    // Map visibility

    pub fn set_map_visible(&mut self, name: &str) {
        for layer in [Layer::Foreground, Layer::Background] {
            if let Some(data) = self.map_data_mut(layer, name) {
                data.mark_as_visible();
                return;
            }
        }
    }

    /// Visited implies visible.
    pub fn set_map_visited(&mut self, name: &str) {
        match self.map_data_mut(Layer::Foreground, name) {
            Some(data) => data.mark_as_visited(),
            None => self.warn_unknown_map(name),
        }
    }

    pub fn is_map_newborn(&self, name: &str) -> bool {
        self.map_data(Layer::Foreground, name)
            .is_some_and(|data| !data.visited)
    }

    pub fn visible_map_names(&self) -> Vec<String> {
        self.foreground_records()
            .filter(|data| data.visible)
            .map(|data| data.name.clone())
            .collect()
    }

    pub fn map_title(&self, name: &str) -> &str {
        match self.map_data(Layer::Foreground, name) {
            Some(data) if !data.title.is_empty() => &data.title,
            _ => UNTITLED_AREA,
        }
    }

    /// Best completion time in ticks, 0 when never completed.
    pub fn map_completion_time(&self, name: &str) -> u64 {
        self.map_data(Layer::Foreground, name)
            .map(|data| data.completion_time)
            .unwrap_or(0)
    }

    pub fn mark_map_completed(&mut self, name: &str) {
        if let Some(data) = self.map_data_mut(Layer::Foreground, name) {
            data.mark_as_completed();
        }
    }

    /// Marks the active map complete, keeps the best completion time,
    /// resets the recorded player position and autosaves.
    pub fn save_linear_progress(&mut self) {
        let Some(active) = self.active_map_name.clone() else {
            return;
        };
        let ticks = self.active_map().map(|map| map.completion_ticks()).unwrap_or(0);
        if let Some(data) = self.map_data_mut(Layer::Foreground, &active) {
            data.mark_as_completed();
            if data.completion_time == 0 || ticks < data.completion_time {
                data.completion_time = ticks;
            }
        }
        self.session.set("core.player1.x", "0");
        self.session.set("core.player1.y", "0");
        info!(map = %active, ticks, "linear_progress_saved");

        if self.dirs.save_dir.is_some() {
            if let Err(error) = self.commit_autosave(AUTOSAVE_SLOT) {
                warn!(%error, "linear_progress_autosave_failed");
            }
        }
    }

    // Regions

    /// Map rect in pixels scaled for its layer.
    pub fn base_region(&self, name: &str, layer: Layer) -> Rect {
        let Some(data) = self.map_data(layer, name) else {
            return Rect::EMPTY;
        };
        let scale = self.config.scale_for_layer(layer);
        let scaled = |value: i32, unit: i32| (value as f32 * unit as f32 * scale) as i32;
        Rect::new(
            scaled(data.x, self.config.tile_width),
            scaled(data.y, self.config.tile_height),
            scaled(data.width, self.config.tile_width),
            scaled(data.height, self.config.tile_height),
        )
    }

    /// Screen-space rect for the current camera position, parallax applied.
    pub fn render_region(&self, name: &str, layer: Layer) -> Rect {
        if self.map_data(layer, name).is_none() {
            return Rect::EMPTY;
        }
        let base = self.base_region(name, layer);
        let camera_x = self.camera.x as i32;
        let camera_y = self.camera.y as i32;
        let (px, py) = Camera::parallax_offsets_at_location(
            camera_x,
            camera_y,
            self.config.parallax_for_layer(layer),
        );
        Rect::new(base.x + px - camera_x, base.y + py - camera_y, base.w, base.h)
    }

    pub fn camera_region(&self, name: &str) -> Rect {
        self.map_data(Layer::Foreground, name)
            .map(|data| adjacency::camera_region(data, &self.config))
            .unwrap_or(Rect::EMPTY)
    }
}
