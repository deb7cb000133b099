//! Built-in session keys that exist in every freshly constructed store.

pub const SKILL_LIST: [&str; 14] = [
    "sprint",
    "matrix",
    "hacking",
    "persuasion",
    "hologram",
    "fright",
    "jackhammer",
    "earth-mover",
    "personal-shield",
    "wall",
    "remote-bomb",
    "mega-bomb",
    "invisibility",
    "pickpocket",
];

pub const ACTIVE_SKILL_LIST: [&str; 12] = [
    "sprint",
    "matrix",
    "hologram",
    "fright",
    "jackhammer",
    "earth-mover",
    "personal-shield",
    "wall",
    "remote-bomb",
    "mega-bomb",
    "invisibility",
    "pickpocket",
];

pub const SKILL_KEY_SUFFIXES: [&str; 8] = [
    ":lastused",
    ":locked",
    ":timer",
    ":timer-max",
    ":timer-drain",
    ":timer-drain-while-motionless",
    ":recharge-remaining",
    ":recharge-potential",
];

pub const MAX_ENEMY_COUNT: u32 = 8;
pub const NET_PLAYER_SLOTS: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Persistence {
    /// Reset on reboot, overwritten on import.
    Normal,
    /// Survives reboot and import.
    Sticky,
    /// Reset on reboot, never imported from a save.
    LocalOnly,
}

pub(crate) struct SchemaEntry {
    pub key: String,
    pub default: String,
    pub persistence: Persistence,
}

fn entry(key: &str, default: &str, persistence: Persistence) -> SchemaEntry {
    SchemaEntry {
        key: key.to_string(),
        default: default.to_string(),
        persistence,
    }
}

const NORMAL_KEYS: &[(&str, &str)] = &[
    ("app.load-from-folder", ""),
    ("app.active-map-name", "x"),
    ("app.transition.from.map", ""),
    ("app.transition.from.waypoint", ""),
    ("app.transition.from.player-x", ""),
    ("app.transition.from.player-y", ""),
    ("app.transition.to.map", ""),
    ("app.transition.to.waypoint", ""),
    ("app.quests.inactive", "inactive"),
    ("app.quests.active", "active"),
    ("app.quests.complete", "complete"),
    ("app.rebuild-response-menu", "0"),
    ("algebra.x", "0"),
    ("algebra.y", "0"),
    ("algebra.z", "0"),
    ("core.keyboard.value", ""),
    ("core.player.entered-name", "no"),
    ("core.overworld-title", "Overworld"),
    ("core.is-gif", "0"),
    ("core.generated-splash", "0"),
    ("core.puzzle-room-virgin", "1"),
    ("core.is-dummy-session", "0"),
    ("core.minimap.can-travel", "no"),
    ("core.x", "0"),
    ("core.y", "0"),
    ("core.z", "0"),
    ("core.constants.death-by-tile-fill", ""),
    ("core.constants.death-by-enemy", ""),
    ("core.constants.death-by-planar-shift", ""),
    ("core.constants.death-by-out-of-bounds", ""),
    ("core.constants.death-by-deadly-tile", ""),
    ("core.constants.death-by-bomb", ""),
    ("core.constants.death-by-vaporization", ""),
    ("core.time.played", "0"),
    ("core.time", "0"),
    ("core.chapter", "1"),
    ("core.player1.name", "HERO"),
    ("core.player1.colors", ""),
    ("core.player1.x", "0"),
    ("core.player1.y", "0"),
    ("core.player1.cause-of-death", ""),
    ("core.player1.inventory-size", "2"),
    ("core.last-safe-zone.map", ""),
    ("core.last-safe-zone.title", ""),
    ("core.xp.bonus.completionist", "125"),
    ("core.xp.bonus.pacifist", "50"),
    ("core.xp.bonus.no-bombs", "25"),
    ("core.xp-bar.percent-old", "0.0"),
    ("core.xp-bar.percent-new", "0.0"),
    ("core.xp-bar.timer", "0"),
    ("core.xp-bar.timer-max", "0"),
    ("core.xp-bar.total-earned", "0"),
    ("core.xp-bar.message", ""),
    ("core.worldmap.view", "gold"),
    ("core.worldmap.zoom", "1.0"),
    ("core.dialogue-response", ""),
    ("core.login-succeeded", "no"),
    ("core.gold.found", "0"),
    ("core.gold.wallet", "0"),
    ("core.gold.wallet:visible", "0"),
    ("core.bombs.count", "0"),
    ("core.challenge.wave", "0"),
    ("core.player1.level", "1"),
    ("core.player1.xp", "0"),
    ("core.player1.skill-points", "0"),
    ("core.player1.skill1", ""),
    ("core.player1.skill2", ""),
    ("core.player1.skill1:changed", "0"),
    ("core.player1.skill2:changed", "0"),
    ("core.skills.invisibility:power-drain", ""),
    ("core.skills.invisibility:power-drain-while-motionless", ""),
    ("stats.bombs-used", "0"),
    ("stats.enemies-killed", "0"),
    ("stats.digs", "0"),
    ("stats.items-bought", "0"),
    ("stats.skills-unlocked", "0"),
    ("stats.gold-spent", "0"),
    ("core.skills.remote-bomb:bombs-remaining", "0"),
];

const LOCAL_ONLY_KEYS: &[(&str, &str)] = &[
    ("core.received-player-id", "0"),
    ("core.player-id", "1"),
    ("net.online", "0"),
    ("net.session.id", "0"),
    ("net.player-limit", "4"),
    ("net.password", ""),
    ("net.port", ""),
    ("net.rebuild-intro-menu", "0"),
    ("net.rebuild-intro-menu:curtailed-count", "0"),
    ("net.countdown-in-progress", "0"),
    ("net.game-in-progress", "0"),
    ("net.level.complete", "0"),
    ("net.level.failed", "0"),
    ("net.votes-to-skip", "0"),
    ("net.already-voted-to-skip", "0"),
    ("net.transition.target", ""),
];

const AVATAR_COLORS: [&str; NET_PLAYER_SLOTS as usize] = [
    "primary=225,25,25;secondary=225,225,225",
    "primary=25,225,25;secondary=225,225,225",
    "primary=25,25,225;secondary=225,225,225",
    "primary=225,25,225;secondary=225,225,225",
];

pub(crate) fn builtin_entries() -> Vec<SchemaEntry> {
    let mut entries = Vec::with_capacity(260);
    entries.extend(
        NORMAL_KEYS
            .iter()
            .map(|(key, default)| entry(key, default, Persistence::Normal)),
    );
    entries.push(entry(
        "app.max-enemy-count",
        &MAX_ENEMY_COUNT.to_string(),
        Persistence::Normal,
    ));
    entries.push(entry("core.handled-local-death", "0", Persistence::Sticky));
    entries.extend(
        LOCAL_ONLY_KEYS
            .iter()
            .map(|(key, default)| entry(key, default, Persistence::LocalOnly)),
    );

    for slot in 1..=NET_PLAYER_SLOTS {
        let joined = if slot == 1 { "1" } else { "0" };
        let nick = format!("Player {slot}");
        let colors = AVATAR_COLORS[(slot - 1) as usize];
        for (suffix, default) in [
            ("joined", joined),
            ("received-nick", "0"),
            ("nick", nick.as_str()),
            ("ready", "0"),
            ("avatar.colors", colors),
        ] {
            entries.push(entry(
                &net_player_key(slot, suffix),
                default,
                Persistence::LocalOnly,
            ));
        }
    }

    for skill in SKILL_LIST {
        entries.push(entry(&format!("core.skills.{skill}"), "0", Persistence::Normal));
        for suffix in SKILL_KEY_SUFFIXES {
            entries.push(entry(
                &format!("core.skills.{skill}{suffix}"),
                "0",
                Persistence::Normal,
            ));
        }
    }

    entries
}

pub fn net_player_key(slot: u32, suffix: &str) -> String {
    format!("net.player{slot}.{suffix}")
}
