//! Item blueprints, upgrade pools and the player's acquired and equipped
//! inventories.

use std::collections::BTreeMap;

use rand::Rng;
use tracing::{debug, warn};

use crate::tree::TreeNode;

use super::UniverseController;

/// Upgrade options rolled onto a freshly acquired item.
const UPGRADE_OFFERS_PER_ITEM: usize = 2;

/// Attribute keys an item or upgrade may adjust. Anything else in the data
/// files is dropped on load.
pub const ITEM_ATTRIBUTE_KEYS: [&str; 22] = [
    "player-speed-modifier",
    "dig-length-bonus",
    "enemy-trapped-length-bonus",
    "enemy-respawn-wait-bonus",
    "enemy-first-movement-wait-bonus",
    "enemy-carrying-gold-movement-penalty",
    "enemy-never-carries-gold",
    "enemy-explode-on-death-chance",
    "enemy-speed-modifier",
    "skill-recharge-adjustment",
    "reverse-kill-probability",
    "gold-pickup-player-speed-bonus",
    "gold-pickup-player-speed-bonus-duration",
    "gold-pickup-enemy-speed-bonus",
    "gold-pickup-enemy-speed-bonus-duration",
    "gold-pickup-jackpot-chance",
    "gold-pickup-jackpot-amount",
    "bomb-replenishment-adjustment",
    "bomb-player-immunity",
    "bomb-enemy-immunity",
    "bomb-fuse-bonus",
    "player-gravity-bonus",
];

/// How `acquired_item_names` orders its result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ItemSort {
    /// By title, then name.
    #[default]
    Alphabetical,
    OrderOfAcquisition,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpgradeOption {
    pub name: String,
    pub title: String,
    pub cost: u32,
    pub attributes: BTreeMap<String, f64>,
}

impl UpgradeOption {
    fn from_node(node: &TreeNode) -> Self {
        Self {
            name: node.get_attribute("name").unwrap_or("").to_string(),
            title: child_text(node, "title").unwrap_or_default(),
            cost: child_number(node, "cost").unwrap_or(0),
            attributes: parse_attributes(node),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpgradePool {
    pub name: String,
    pub upgrades: Vec<UpgradeOption>,
}

impl UpgradePool {
    fn from_node(node: &TreeNode) -> Self {
        Self {
            name: node.get_attribute("name").unwrap_or("").to_string(),
            upgrades: node
                .children_by_tag("upgrade")
                .map(UpgradeOption::from_node)
                .collect(),
        }
    }
}

/// A blueprint from `items.xml`, or a per-playthrough copy of one once the
/// player acquires it.
#[derive(Debug, Clone, PartialEq)]
pub struct InventoryItem {
    pub name: String,
    pub title: String,
    pub description: String,
    pub quality: u32,
    pub cost: u32,
    pub upgrades_allowed: u32,
    pub upgrade_pools: Vec<String>,
    pub warehouses: Vec<String>,
    pub attributes: BTreeMap<String, f64>,
    available_upgrades: Vec<UpgradeOption>,
    committed_upgrades: Vec<UpgradeOption>,
}

impl Default for InventoryItem {
    fn default() -> Self {
        Self {
            name: String::new(),
            title: "Unnamed Item".to_string(),
            description: String::new(),
            quality: 0,
            cost: 0,
            upgrades_allowed: 1,
            upgrade_pools: Vec::new(),
            warehouses: Vec::new(),
            attributes: BTreeMap::new(),
            available_upgrades: Vec::new(),
            committed_upgrades: Vec::new(),
        }
    }
}

impl InventoryItem {
    pub fn from_node(node: &TreeNode) -> Self {
        let defaults = Self::default();
        let texts = |parent: &str, tag: &str| -> Vec<String> {
            node.find_child(parent)
                .map(|group| {
                    group
                        .children_by_tag(tag)
                        .map(|child| child.text.trim().to_string())
                        .filter(|text| !text.is_empty())
                        .collect()
                })
                .unwrap_or_default()
        };
        Self {
            name: child_text(node, "name").unwrap_or_default(),
            title: child_text(node, "title").unwrap_or_else(|| defaults.title.clone()),
            description: child_text(node, "description").unwrap_or_default(),
            quality: child_number(node, "quality").unwrap_or(defaults.quality),
            cost: child_number(node, "cost").unwrap_or(defaults.cost),
            upgrades_allowed: child_number(node, "upgrades-allowed").unwrap_or(defaults.upgrades_allowed),
            upgrade_pools: texts("upgrade-pools", "upgrade-pool"),
            warehouses: texts("warehouses", "warehouse"),
            attributes: parse_attributes(node),
            ..defaults
        }
    }

    /// Attribute value, 0 when the item leaves it untouched.
    pub fn attribute(&self, key: &str) -> f64 {
        self.attributes.get(key).copied().unwrap_or(0.0)
    }

    pub fn available_upgrades(&self) -> &[UpgradeOption] {
        &self.available_upgrades
    }

    pub fn committed_upgrades(&self) -> &[UpgradeOption] {
        &self.committed_upgrades
    }

    pub fn remaining_upgrades(&self) -> u32 {
        self.upgrades_allowed
            .saturating_sub(self.committed_upgrades.len() as u32)
    }

    /// Moves an offered upgrade onto the item. Fails when the upgrade is not
    /// on offer or the item has no upgrade slots left.
    pub fn commit_upgrade(&mut self, name: &str) -> bool {
        if self.remaining_upgrades() == 0 {
            return false;
        }
        let Some(index) = self.available_upgrades.iter().position(|upgrade| upgrade.name == name) else {
            return false;
        };
        let upgrade = self.available_upgrades.remove(index);
        self.committed_upgrades.push(upgrade);
        true
    }

    /// Base description followed by one line per committed upgrade.
    pub fn full_description(&self) -> String {
        let mut description = self.description.clone();
        if !self.committed_upgrades.is_empty() {
            description.push('\n');
            for upgrade in &self.committed_upgrades {
                description.push('\n');
                description.push_str(&upgrade.title);
            }
        }
        description
    }

    /// Copy used while equipped: committed upgrades fold into the base
    /// attributes.
    fn equipped_copy(&self) -> Self {
        let mut item = self.clone();
        for upgrade in &self.committed_upgrades {
            for (key, value) in &upgrade.attributes {
                *item.attributes.entry(key.clone()).or_insert(0.0) += value;
            }
        }
        item
    }
}

/// Blueprints plus the player's items. Acquired and equipped lists keep
/// acquisition order.
#[derive(Debug, Clone, Default)]
pub struct Inventory {
    blueprints: Vec<InventoryItem>,
    upgrade_pools: Vec<UpgradePool>,
    acquired: Vec<InventoryItem>,
    equipped: Vec<InventoryItem>,
    attribute_cache: BTreeMap<String, f64>,
}

impl Inventory {
    /// Reads `<item-data>`: an `<items>` list and named `<upgrade-pools>`.
    pub fn from_node(node: &TreeNode) -> Self {
        let Some(root) = node.find_descendant("item-data") else {
            warn!(tag = %node.tag, "item_data_missing");
            return Self::default();
        };
        let blueprints = root
            .find_child("items")
            .map(|items| {
                items
                    .children_by_tag("item")
                    .map(InventoryItem::from_node)
                    .filter(|item| !item.name.is_empty())
                    .collect()
            })
            .unwrap_or_default();
        let upgrade_pools = root
            .find_child("upgrade-pools")
            .map(|pools| pools.children_by_tag("upgrade-pool").map(UpgradePool::from_node).collect())
            .unwrap_or_default();
        Self {
            blueprints,
            upgrade_pools,
            ..Self::default()
        }
    }

    pub fn blueprints(&self) -> &[InventoryItem] {
        &self.blueprints
    }

    pub fn blueprint(&self, name: &str) -> Option<&InventoryItem> {
        self.blueprints.iter().find(|item| item.name == name)
    }

    pub fn upgrade_pool(&self, name: &str) -> Option<&UpgradePool> {
        self.upgrade_pools.iter().find(|pool| pool.name == name)
    }

    pub fn acquired(&self) -> &[InventoryItem] {
        &self.acquired
    }

    pub fn equipped(&self) -> &[InventoryItem] {
        &self.equipped
    }

    pub fn acquired_item(&self, name: &str) -> Option<&InventoryItem> {
        self.acquired.iter().find(|item| item.name == name)
    }

    pub fn acquired_item_mut(&mut self, name: &str) -> Option<&mut InventoryItem> {
        self.acquired.iter_mut().find(|item| item.name == name)
    }

    pub fn is_acquired(&self, name: &str) -> bool {
        self.acquired_item(name).is_some()
    }

    pub fn is_equipped(&self, name: &str) -> bool {
        self.equipped.iter().any(|item| item.name == name)
    }

    /// Copies the blueprint into the acquired list and offers it up to two
    /// upgrades drawn without replacement from its pools.
    pub fn acquire(&mut self, name: &str, rng: &mut impl Rng) -> bool {
        let Some(blueprint) = self.blueprint(name) else {
            warn!(item = name, "item_unknown");
            return false;
        };
        let mut item = blueprint.clone();
        let mut candidates = item
            .upgrade_pools
            .iter()
            .filter_map(|pool| self.upgrade_pool(pool))
            .flat_map(|pool| pool.upgrades.iter().cloned())
            .collect::<Vec<_>>();
        for _ in 0..UPGRADE_OFFERS_PER_ITEM {
            if candidates.is_empty() {
                break;
            }
            let index = rng.gen_range(0..candidates.len());
            item.available_upgrades.push(candidates.swap_remove(index));
        }
        debug!(item = name, offers = item.available_upgrades.len(), "item_acquired");
        self.acquired.push(item);
        true
    }

    /// Equips an acquired item with its committed upgrades applied. Already
    /// equipped items are left alone.
    pub fn equip(&mut self, name: &str) -> bool {
        if self.is_equipped(name) {
            return false;
        }
        let Some(item) = self.acquired_item(name) else {
            warn!(item = name, "equip_without_acquiring");
            return false;
        };
        let copy = item.equipped_copy();
        self.equipped.push(copy);
        self.attribute_cache.clear();
        true
    }

    pub fn unequip(&mut self, name: &str) {
        self.equipped.retain(|item| item.name != name);
        self.attribute_cache.clear();
    }

    /// Drops every acquired and equipped copy of `name`.
    pub fn remove(&mut self, name: &str) {
        self.acquired.retain(|item| item.name != name);
        self.unequip(name);
    }

    pub fn acquired_item_names(&self, sort: ItemSort, descending: bool) -> Vec<String> {
        let mut items = self.acquired.iter().collect::<Vec<_>>();
        if sort == ItemSort::Alphabetical {
            items.sort_by(|a, b| (&a.title, &a.name).cmp(&(&b.title, &b.name)));
        }
        if descending {
            items.reverse();
        }
        items.into_iter().map(|item| item.name.clone()).collect()
    }

    /// Blueprints not yet acquired, stocked by any of `warehouses`, within
    /// `quality` when given, and not in `blacklist`.
    pub fn unacquired_item_names(
        &self,
        quality: Option<std::ops::RangeInclusive<u32>>,
        warehouses: &[&str],
        blacklist: &[&str],
    ) -> Vec<String> {
        self.blueprints
            .iter()
            .filter(|item| !blacklist.contains(&item.name.as_str()))
            .filter(|item| !self.is_acquired(&item.name))
            .filter(|item| item.warehouses.iter().any(|stock| warehouses.contains(&stock.as_str())))
            .filter(|item| quality.as_ref().map_or(true, |range| range.contains(&item.quality)))
            .map(|item| item.name.clone())
            .collect()
    }

    pub fn cache_attribute_result(&mut self, key: &str, value: f64) {
        self.attribute_cache.insert(key.to_string(), value);
    }

    pub fn invalidate_attribute_result(&mut self, key: &str) {
        self.attribute_cache.remove(key);
    }

    pub fn cached_attribute_result(&self, key: &str) -> Option<f64> {
        self.attribute_cache.get(key).copied()
    }

    pub fn clear_attribute_cache(&mut self) {
        self.attribute_cache.clear();
    }

    /// Sum of `key` over every equipped item, cached until the equipped set
    /// changes or a map activates.
    pub fn equipped_attribute_total(&mut self, key: &str) -> f64 {
        if let Some(total) = self.cached_attribute_result(key) {
            return total;
        }
        let total = self.equipped.iter().map(|item| item.attribute(key)).sum();
        self.cache_attribute_result(key, total);
        total
    }

    /// New game: the player owns nothing again.
    pub fn reset(&mut self) {
        self.acquired.clear();
        self.equipped.clear();
        self.attribute_cache.clear();
    }
}

impl UniverseController {
    pub fn inventory(&self) -> &Inventory {
        &self.inventory
    }

    pub fn inventory_mut(&mut self) -> &mut Inventory {
        &mut self.inventory
    }

    pub fn acquire_item_by_name(&mut self, name: &str, rng: &mut impl Rng) -> bool {
        self.inventory.acquire(name, rng)
    }

    pub fn equip_item_by_name(&mut self, name: &str) -> bool {
        self.inventory.equip(name)
    }

    pub fn unequip_item_by_name(&mut self, name: &str) {
        self.inventory.unequip(name);
    }

    pub fn remove_item_from_inventory(&mut self, name: &str) {
        self.inventory.remove(name);
    }

    pub fn is_item_acquired(&self, name: &str) -> bool {
        self.inventory.is_acquired(name)
    }

    pub fn is_item_equipped(&self, name: &str) -> bool {
        self.inventory.is_equipped(name)
    }

    pub fn get_upgrade_pool_by_name(&self, name: &str) -> Option<&UpgradePool> {
        self.inventory.upgrade_pool(name)
    }

    pub fn clear_item_attribute_cache(&mut self) {
        self.inventory.clear_attribute_cache();
    }
}

fn child_text(node: &TreeNode, tag: &str) -> Option<String> {
    node.find_child(tag).map(|child| child.text.trim().to_string())
}

fn child_number(node: &TreeNode, tag: &str) -> Option<u32> {
    let raw = child_text(node, tag)?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(tag, value = %raw, "item_number_invalid");
            None
        }
    }
}

/// `<attributes><attribute><key/><value/></attribute>...</attributes>`.
fn parse_attributes(node: &TreeNode) -> BTreeMap<String, f64> {
    let mut attributes = BTreeMap::new();
    let Some(group) = node.find_child("attributes") else {
        return attributes;
    };
    for attribute in group.children_by_tag("attribute") {
        let (Some(key), Some(raw)) = (child_text(attribute, "key"), child_text(attribute, "value")) else {
            continue;
        };
        if !ITEM_ATTRIBUTE_KEYS.contains(&key.as_str()) {
            warn!(%key, "item_attribute_unknown");
            continue;
        }
        match raw.parse::<f64>() {
            Ok(value) => {
                attributes.insert(key, value);
            }
            Err(_) => warn!(%key, value = %raw, "item_attribute_invalid"),
        }
    }
    attributes
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;

    const ITEMS: &str = r#"<item-data>
  <items>
    <item>
      <name>boots</name>
      <title>Swift Boots</title>
      <quality>2</quality>
      <cost>40</cost>
      <upgrades-allowed>1</upgrades-allowed>
      <description>Light on your feet.</description>
      <warehouses><warehouse>general</warehouse></warehouses>
      <upgrade-pools><upgrade-pool>speed</upgrade-pool></upgrade-pools>
      <attributes>
        <attribute><key>player-speed-modifier</key><value>10</value></attribute>
        <attribute><key>made-up-bonus</key><value>99</value></attribute>
      </attributes>
    </item>
    <item>
      <name>anvil</name>
      <title>Anvil</title>
      <quality>7</quality>
      <warehouses><warehouse>smithy</warehouse></warehouses>
      <attributes>
        <attribute><key>player-gravity-bonus</key><value>25</value></attribute>
      </attributes>
    </item>
  </items>
  <upgrade-pools>
    <upgrade-pool name="speed">
      <upgrade name="quick"><title>Quick</title><cost>5</cost>
        <attributes><attribute><key>player-speed-modifier</key><value>5</value></attribute></attributes>
      </upgrade>
      <upgrade name="quicker"><title>Quicker</title><cost>9</cost>
        <attributes><attribute><key>player-speed-modifier</key><value>8</value></attribute></attributes>
      </upgrade>
      <upgrade name="steady"><title>Steady</title>
        <attributes><attribute><key>player-gravity-bonus</key><value>-3</value></attribute></attributes>
      </upgrade>
    </upgrade-pool>
  </upgrade-pools>
</item-data>"#;

    fn inventory() -> Inventory {
        let node = TreeNode::parse(ITEMS, Path::new("items.xml")).expect("items");
        Inventory::from_node(&node)
    }

    #[test]
    fn parses_blueprints_pools_and_known_attributes() {
        let inventory = inventory();
        let boots = inventory.blueprint("boots").expect("boots");
        assert_eq!(boots.title, "Swift Boots");
        assert_eq!(boots.quality, 2);
        assert_eq!(boots.cost, 40);
        assert_eq!(boots.warehouses, ["general"]);
        assert_eq!(boots.attribute("player-speed-modifier"), 10.0);
        assert!(!boots.attributes.contains_key("made-up-bonus"));
        assert_eq!(inventory.blueprint("anvil").expect("anvil").upgrades_allowed, 1);

        let pool = inventory.upgrade_pool("speed").expect("speed pool");
        assert_eq!(pool.upgrades.len(), 3);
        assert_eq!(pool.upgrades[1].cost, 9);
    }

    #[test]
    fn acquiring_offers_two_distinct_upgrades_from_the_pools() {
        let mut inventory = inventory();
        let mut rng = StdRng::seed_from_u64(42);
        assert!(inventory.acquire("boots", &mut rng));
        assert!(!inventory.acquire("missing", &mut rng));

        let boots = inventory.acquired_item("boots").expect("acquired");
        let offers = boots.available_upgrades();
        assert_eq!(offers.len(), 2);
        assert_ne!(offers[0].name, offers[1].name);
        assert!(inventory.blueprint("boots").expect("blueprint").available_upgrades().is_empty());

        assert!(inventory.acquire("anvil", &mut rng));
        assert!(inventory.acquired_item("anvil").expect("anvil").available_upgrades().is_empty());
    }

    #[test]
    fn equipping_applies_committed_upgrades_once() {
        let mut inventory = inventory();
        let mut rng = StdRng::seed_from_u64(7);
        assert!(!inventory.equip("boots"));
        inventory.acquire("boots", &mut rng);

        let boots = inventory.acquired_item_mut("boots").expect("boots");
        let offered = boots.available_upgrades()[0].clone();
        let second = boots.available_upgrades()[1].name.clone();
        assert!(boots.commit_upgrade(&offered.name));
        assert!(!boots.commit_upgrade(&second), "only one upgrade slot");
        assert!(boots.full_description().ends_with(&offered.title));

        assert!(inventory.equip("boots"));
        assert!(!inventory.equip("boots"));
        let equipped = &inventory.equipped()[0];
        let blueprint = inventory.blueprint("boots").expect("blueprint");
        for key in ITEM_ATTRIBUTE_KEYS {
            let expected = blueprint.attribute(key) + offered.attributes.get(key).copied().unwrap_or(0.0);
            assert_eq!(equipped.attribute(key), expected, "{key}");
        }
        assert_eq!(
            inventory.acquired_item("boots").expect("boots").attribute("player-speed-modifier"),
            10.0
        );
    }

    #[test]
    fn attribute_totals_are_cached_until_equipment_changes() {
        let mut inventory = inventory();
        let mut rng = StdRng::seed_from_u64(1);
        inventory.acquire("anvil", &mut rng);
        inventory.equip("anvil");
        assert_eq!(inventory.equipped_attribute_total("player-gravity-bonus"), 25.0);
        assert_eq!(inventory.cached_attribute_result("player-gravity-bonus"), Some(25.0));

        inventory.cache_attribute_result("player-gravity-bonus", 1.0);
        assert_eq!(inventory.equipped_attribute_total("player-gravity-bonus"), 1.0);
        inventory.invalidate_attribute_result("player-gravity-bonus");
        assert_eq!(inventory.equipped_attribute_total("player-gravity-bonus"), 25.0);

        inventory.unequip("anvil");
        assert_eq!(inventory.cached_attribute_result("player-gravity-bonus"), None);
        assert_eq!(inventory.equipped_attribute_total("player-gravity-bonus"), 0.0);
    }

    #[test]
    fn item_name_queries_sort_and_filter() {
        let mut inventory = inventory();
        let mut rng = StdRng::seed_from_u64(3);
        assert_eq!(inventory.unacquired_item_names(None, &["general", "smithy"], &[]), ["boots", "anvil"]);
        assert_eq!(inventory.unacquired_item_names(Some(0..=5), &["general", "smithy"], &[]), ["boots"]);
        assert_eq!(inventory.unacquired_item_names(None, &["smithy"], &["anvil"]), Vec::<String>::new());

        inventory.acquire("boots", &mut rng);
        inventory.acquire("anvil", &mut rng);
        assert_eq!(inventory.acquired_item_names(ItemSort::Alphabetical, false), ["anvil", "boots"]);
        assert_eq!(inventory.acquired_item_names(ItemSort::OrderOfAcquisition, false), ["boots", "anvil"]);
        assert_eq!(inventory.acquired_item_names(ItemSort::OrderOfAcquisition, true), ["anvil", "boots"]);
        assert!(inventory.unacquired_item_names(None, &["general", "smithy"], &[]).is_empty());

        inventory.equip("boots");
        inventory.remove("boots");
        assert!(!inventory.is_acquired("boots"));
        assert!(!inventory.is_equipped("boots"));
    }
}
