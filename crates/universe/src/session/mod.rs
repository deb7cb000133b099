use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::tree::TreeNode;

mod schema;

pub use schema::{
    net_player_key, ACTIVE_SKILL_LIST, MAX_ENEMY_COUNT, NET_PLAYER_SLOTS, SKILL_KEY_SUFFIXES,
    SKILL_LIST,
};
use schema::{builtin_entries, Persistence};

pub const UNDECLARED_DEFAULT: &str = "0";

/// One named, string-valued piece of session state. Consumers parse numbers
/// and flags out of `value` themselves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionVariable {
    default: String,
    value: String,
    ignore_on_reboot: bool,
    ignore_on_import: bool,
    name: Option<String>,
}

impl SessionVariable {
    pub fn new(default: impl Into<String>) -> Self {
        let default = default.into();
        Self {
            value: default.clone(),
            default,
            ignore_on_reboot: false,
            ignore_on_import: false,
            name: None,
        }
    }

    pub fn ignoring_reboot(mut self) -> Self {
        self.ignore_on_reboot = true;
        self
    }

    pub fn ignoring_import(mut self) -> Self {
        self.ignore_on_import = true;
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn default_value(&self) -> &str {
        &self.default
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn ignore_on_reboot(&self) -> bool {
        self.ignore_on_reboot
    }

    pub fn ignore_on_import(&self) -> bool {
        self.ignore_on_import
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn set_value(&mut self, value: impl Into<String>) {
        self.value = value.into();
    }

    pub fn reset(&mut self) {
        self.value.clone_from(&self.default);
    }

    /// Integer increment. Leaves the value untouched and returns `false` when
    /// the current value is not an integer.
    pub fn increment_value(&mut self, amount: i64) -> bool {
        match self.value.trim().parse::<i64>() {
            Ok(current) => {
                self.value = current.saturating_add(amount).to_string();
                true
            }
            Err(_) => false,
        }
    }
}

/// Schema-backed key/value store for all mutable game, player and network
/// state.
///
/// Reads come in two flavors. [`SessionStore::lookup`] is strict and never
/// mutates. [`SessionStore::get`] is the permissive path used by scripts:
/// an undeclared key is created on the spot with default `"0"` so content
/// referencing a misspelled key keeps running. Warnings for that fallback
/// can be switched off with [`SessionStore::set_undeclared_key_warnings`].
#[derive(Debug, Clone)]
pub struct SessionStore {
    variables: BTreeMap<String, SessionVariable>,
    warn_on_undeclared: bool,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        let mut variables = BTreeMap::new();
        for entry in builtin_entries() {
            let mut variable = SessionVariable::new(entry.default).named(entry.key.clone());
            match entry.persistence {
                Persistence::Normal => {}
                Persistence::Sticky => variable = variable.ignoring_reboot().ignoring_import(),
                Persistence::LocalOnly => variable = variable.ignoring_import(),
            }
            variables.insert(entry.key, variable);
        }
        Self {
            variables,
            warn_on_undeclared: true,
        }
    }

    pub fn set_undeclared_key_warnings(&mut self, enabled: bool) {
        self.warn_on_undeclared = enabled;
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.variables.contains_key(key)
    }

    pub fn lookup(&self, key: &str) -> Option<&SessionVariable> {
        self.variables.get(key)
    }

    /// Permissive read. Creates `key` with default `"0"` if it is missing.
    pub fn get(&mut self, key: &str) -> &SessionVariable {
        if !self.variables.contains_key(key) {
            if self.warn_on_undeclared {
                warn!(key, "session_key_implicitly_created");
            }
            self.variables.insert(
                key.to_string(),
                SessionVariable::new(UNDECLARED_DEFAULT).named(key),
            );
        }
        &self.variables[key]
    }

    /// Value of a declared key, or `""` when the key does not exist.
    pub fn text(&self, key: &str) -> &str {
        self.lookup(key).map(SessionVariable::value).unwrap_or("")
    }

    /// Integer value of a declared key; missing or non-numeric reads as 0.
    pub fn get_int(&self, key: &str) -> i64 {
        self.text(key).trim().parse::<i64>().unwrap_or(0)
    }

    pub fn is_flag_set(&self, key: &str) -> bool {
        self.text(key) == "1"
    }

    /// Writes an existing key. Unknown keys are not created.
    pub fn set(&mut self, key: &str, value: impl Into<String>) -> bool {
        match self.variables.get_mut(key) {
            Some(variable) => {
                variable.set_value(value);
                true
            }
            None => {
                warn!(key, "session_set_on_undeclared_key");
                false
            }
        }
    }

    pub fn increment(&mut self, key: &str, amount: i64) -> bool {
        match self.variables.get_mut(key) {
            Some(variable) => {
                let incremented = variable.increment_value(amount);
                if !incremented {
                    debug!(key, value = variable.value(), "session_increment_non_numeric");
                }
                incremented
            }
            None => false,
        }
    }

    pub fn reset(&mut self) {
        for variable in self.variables.values_mut() {
            variable.reset();
        }
    }

    /// New-game reset. Variables flagged `ignore_on_reboot` keep their value;
    /// afterwards the local death handler flag is cleared unconditionally.
    pub fn reboot(&mut self) {
        for variable in self.variables.values_mut() {
            if !variable.ignore_on_reboot() {
                variable.reset();
            }
        }
        self.set("core.handled-local-death", "0");
    }

    /// Applies saved values. Unknown keys are declared first with default
    /// `"0"`; keys flagged `ignore_on_import` keep their current value.
    pub fn import<K, V, I>(&mut self, values: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        for (key, value) in values {
            let key = key.as_ref();
            let variable = self
                .variables
                .entry(key.to_string())
                .or_insert_with(|| SessionVariable::new(UNDECLARED_DEFAULT).named(key));
            if !variable.ignore_on_import() {
                variable.set_value(value);
            }
        }
    }

    pub fn values_snapshot(&self) -> BTreeMap<String, String> {
        self.variables
            .iter()
            .map(|(key, variable)| (key.clone(), variable.value().to_string()))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SessionVariable)> {
        self.variables
            .iter()
            .map(|(key, variable)| (key.as_str(), variable))
    }

    /// Expands `$[key]` references to the value of each declared key.
    pub fn translate_references(&self, message: &str) -> String {
        let mut out = String::with_capacity(message.len());
        let mut rest = message;
        while let Some(start) = rest.find("$[") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            match after.find(']') {
                Some(end) => match self.lookup(&after[..end]) {
                    Some(variable) => {
                        out.push_str(variable.value());
                        rest = &after[end + 1..];
                    }
                    None => {
                        out.push_str("$[");
                        rest = after;
                    }
                },
                None => {
                    out.push_str(&rest[start..]);
                    rest = "";
                }
            }
        }
        out.push_str(rest);
        out
    }

    pub fn save_state(&self) -> TreeNode {
        let mut root = TreeNode::new("session");
        for (key, variable) in &self.variables {
            root.add_child(
                TreeNode::new("variable")
                    .with_attribute("key", key)
                    .with_attribute("default", variable.default_value())
                    .with_attribute("value", variable.value()),
            );
        }
        root
    }

    pub fn load_state(&mut self, node: &TreeNode) {
        let values = node
            .children_by_tag("variable")
            .filter_map(|variable| {
                let key = variable
                    .get_attribute("key")
                    .or_else(|| variable.get_attribute("name"))?;
                let value = variable.get_attribute("value").unwrap_or("");
                Some((key.to_string(), value.to_string()))
            })
            .collect::<Vec<_>>();
        self.import(values);
    }
}
