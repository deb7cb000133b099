use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::map::Map;
use crate::session::SessionStore;
use crate::tree::TreeNode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptMode {
    /// Run until the script yields; the next call resumes after the yield.
    UntilYield,
    /// Drain the script synchronously, ignoring yields.
    ToCompletion,
}

/// Everything a script may touch, passed explicitly. `map` is the map the
/// script runs against, which is not necessarily the active map.
pub struct ScriptContext<'a> {
    pub map_name: &'a str,
    pub session: &'a mut SessionStore,
    pub map: Option<&'a mut Map>,
}

/// Script-execution collaborator. Unknown script names are a no-op.
pub trait ScriptRunner {
    fn run_script(&mut self, name: &str, mode: ScriptMode, ctx: ScriptContext<'_>);
}

/// Named global scripts, usually from `global/scripts.xml`.
#[derive(Debug, Clone, Default)]
pub struct ScriptLibrary {
    scripts: BTreeMap<String, String>,
}

impl ScriptLibrary {
    pub fn from_node(node: &TreeNode) -> Self {
        let scripts = node
            .children_by_tag("script")
            .filter_map(|script| {
                let name = script.get_attribute("name")?;
                Some((name.to_string(), script.text.clone()))
            })
            .collect();
        Self { scripts }
    }

    pub fn insert(&mut self, name: impl Into<String>, body: impl Into<String>) {
        self.scripts.insert(name.into(), body.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.scripts.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.scripts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty()
    }
}

/// Minimal line-oriented interpreter used by the headless driver.
///
/// One command per line:
/// `set <key> <value>`, `inc <key> <amount>`, `param <name> <value>`,
/// `busy <0|1>` and `yield`. Blank lines and lines starting with `#` are
/// skipped. A map's own scripts shadow global scripts of the same name.
#[derive(Debug, Clone, Default)]
pub struct LineScriptRunner {
    library: ScriptLibrary,
    resume_at: BTreeMap<(String, String), usize>,
}

impl LineScriptRunner {
    pub fn new(library: ScriptLibrary) -> Self {
        Self {
            library,
            resume_at: BTreeMap::new(),
        }
    }

    pub fn library_mut(&mut self) -> &mut ScriptLibrary {
        &mut self.library
    }
}

impl ScriptRunner for LineScriptRunner {
    fn run_script(&mut self, name: &str, mode: ScriptMode, ctx: ScriptContext<'_>) {
        let ScriptContext {
            map_name,
            session,
            mut map,
        } = ctx;

        let body = map
            .as_deref()
            .and_then(|map| map.script(name))
            .or_else(|| self.library.get(name))
            .map(str::to_string);
        let Some(body) = body else {
            debug!(script = name, map = map_name, "script_not_found");
            return;
        };

        let resume_key = (map_name.to_string(), name.to_string());
        let lines = body
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .collect::<Vec<_>>();
        let start = match mode {
            ScriptMode::UntilYield => self.resume_at.remove(&resume_key).unwrap_or(0),
            ScriptMode::ToCompletion => 0,
        };

        for (index, line) in lines.iter().enumerate().skip(start) {
            let mut parts = line.splitn(3, ' ');
            let command = parts.next().unwrap_or("");
            let first = parts.next().unwrap_or("");
            let rest = parts.next().unwrap_or("");
            match command {
                "set" => {
                    session.set(first, rest);
                }
                "inc" => {
                    let amount = rest.trim().parse::<i64>().unwrap_or(1);
                    session.increment(first, amount);
                }
                "param" => match map.as_deref_mut() {
                    Some(map) => map.set_param(first, rest),
                    None => warn!(script = name, "script_param_without_map"),
                },
                "busy" => match map.as_deref_mut() {
                    Some(map) => map.set_busy(first == "1"),
                    None => warn!(script = name, "script_busy_without_map"),
                },
                "yield" => {
                    if mode == ScriptMode::UntilYield && index + 1 < lines.len() {
                        self.resume_at.insert(resume_key, index + 1);
                        debug!(script = name, map = map_name, line = index, "script_yielded");
                        return;
                    }
                }
                other => warn!(script = name, command = other, "script_command_unknown"),
            }
        }
        debug!(script = name, map = map_name, ?mode, "script_finished");
    }
}
