use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::rc::Rc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tempfile::TempDir;

use super::*;
use crate::geometry::Rect;
use crate::map::{EntityStatus, Genus, MapEntity, Trigger};
use crate::network::{NetMessage, NetStatus, Outbound, QueuedLink};
use crate::render::DrawRequest;
use crate::tree::TreeNode;
use crate::universe_paths_at;

struct MemoryMaps(BTreeMap<String, Map>);

impl MapSource for MemoryMaps {
    fn load_map(&self, data: &MapData) -> Result<Map, MapLoadError> {
        Ok(self.0.get(&data.name).cloned().unwrap_or_else(|| {
            let mut map = Map::empty(data);
            map.add_trigger(Trigger {
                name: "spawn".into(),
                rect: Rect::new(24, 24, 24, 24),
                active: true,
            });
            map
        }))
    }
}

struct RecordingScripts(Rc<RefCell<Vec<String>>>);

impl ScriptRunner for RecordingScripts {
    fn run_script(&mut self, name: &str, _mode: ScriptMode, ctx: ScriptContext<'_>) {
        self.0.borrow_mut().push(format!("{}:{name}", ctx.map_name));
    }
}

struct SharedLink(Rc<RefCell<QueuedLink>>);

impl NetworkLink for SharedLink {
    fn status(&self) -> NetStatus {
        self.0.borrow().status()
    }

    fn is_global_locked(&self) -> bool {
        self.0.borrow().is_global_locked()
    }

    fn next_command(&mut self) -> Option<NetworkCommand> {
        self.0.borrow_mut().next_command()
    }

    fn send(&mut self, message: Outbound) {
        self.0.borrow_mut().send(message);
    }
}

struct Harness {
    universe: UniverseController,
    link: Rc<RefCell<QueuedLink>>,
    scripts: Rc<RefCell<Vec<String>>>,
}

impl Harness {
    fn new(records: Vec<MapData>, maps: Vec<Map>, status: NetStatus, save_dir: Option<PathBuf>) -> Self {
        let link = Rc::new(RefCell::new(QueuedLink::new(status)));
        let scripts = Rc::new(RefCell::new(Vec::new()));
        let collaborators = Collaborators {
            maps: Box::new(MemoryMaps(
                maps.into_iter().map(|map| (map.name.clone(), map)).collect(),
            )),
            scripts: Box::new(RecordingScripts(Rc::clone(&scripts))),
            network: Box::new(SharedLink(Rc::clone(&link))),
            store: Box::new(XmlTreeStore),
        };
        let dirs = UniverseDirs {
            data_dir: PathBuf::from("unused"),
            save_dir,
        };
        let mut universe =
            UniverseController::new("test", UniverseConfig::default(), dirs, collaborators);
        for data in records {
            universe.add_map(data);
        }
        Self {
            universe,
            link,
            scripts,
        }
    }

    fn offline(records: Vec<MapData>) -> Self {
        Self::new(records, Vec::new(), NetStatus::Offline, None)
    }

    fn spawn_on(&mut self, map: &str) {
        self.universe
            .transition_to_map(TransitionRequest::to_map(map).at_waypoint("spawn"))
            .expect("transition");
    }

    fn player(&self) -> &MapEntity {
        self.universe
            .active_map()
            .and_then(|map| map.entity("player1"))
            .expect("player")
    }

    fn move_player(&mut self, x: i32, y: i32) {
        let player = self
            .universe
            .active_map_mut()
            .and_then(|map| map.entity_mut("player1"))
            .expect("player");
        player.rect.x = x;
        player.rect.y = y;
    }

    fn push(&self, raw: &str, source: Option<u32>) {
        assert!(self.link.borrow_mut().push_raw(raw, source), "queued {raw}");
    }

    fn sent(&self) -> Vec<Outbound> {
        self.link.borrow().sent().to_vec()
    }

    fn recorded_scripts(&self) -> Vec<String> {
        self.scripts.borrow().clone()
    }
}

fn record(name: &str, x: i32, y: i32, width: i32, height: i32) -> MapData {
    let mut data = MapData::new(name);
    data.layer = Layer::Foreground;
    data.x = x;
    data.y = y;
    data.width = width;
    data.height = height;
    data
}

fn side_by_side() -> Vec<MapData> {
    vec![record("a", 0, 0, 10, 10), record("b", 10, 0, 10, 10)]
}

#[test]
fn flush_maps_are_adjacent_both_ways() {
    let harness = Harness::offline(side_by_side());
    let adjacency = harness.universe.adjacency();
    assert!(adjacency.is_adjacent("a", "b"));
    assert!(adjacency.is_adjacent("b", "a"));
    let a = harness
        .universe
        .map_data(Layer::Foreground, "a")
        .expect("a");
    assert_eq!(a.adjacent_maps(), ["b".to_string()]);
}

#[test]
fn transition_spawns_player_at_waypoint_and_loads_neighbors() {
    let mut harness = Harness::offline(side_by_side());
    harness.spawn_on("a");

    assert_eq!(harness.universe.active_map_name(), Some("a"));
    assert_eq!(harness.player().rect, Rect::new(24, 24, 24, 24));
    assert_eq!(
        harness.universe.loaded_map_names(Layer::Foreground),
        ["a".to_string(), "b".to_string()]
    );
    let session = harness.universe.session();
    assert_eq!(session.text("core.player1.x"), "24");
    assert_eq!(session.text("app.active-map-name"), "a");
    assert_eq!(session.text("app.transition.to.waypoint"), "spawn");
    assert!(harness
        .universe
        .map_data(Layer::Foreground, "b")
        .expect("b")
        .visible);
}

#[test]
fn player_crossing_right_edge_keeps_world_position() {
    let mut harness = Harness::offline(side_by_side());
    harness.spawn_on("a");
    harness.universe.tick();
    harness.move_player(250, 24);

    let events = harness.universe.tick();
    assert!(events.contains(&UniverseEvent::Autosave));
    assert!(events.contains(&UniverseEvent::MapTransition {
        from: "a".into(),
        to: "b".into(),
    }));
    assert_eq!(harness.universe.active_map_name(), Some("b"));
    assert_eq!(harness.player().rect.x, 250 - 10 * 24);
    assert_eq!(harness.player().rect.y, 24);
    assert_eq!(harness.universe.session().text("core.player1.x"), "10");
    assert!(harness.universe.is_discard_pending());

    let old = harness
        .universe
        .visible_map(Layer::Foreground, "a")
        .expect("a stays loaded");
    assert!(old.entity("player1").is_none());
}

#[test]
fn falling_into_open_column_kills_player_once() {
    let mut harness = Harness::offline(side_by_side());
    harness.spawn_on("a");
    harness.move_player(48, 245);

    let events = harness.universe.tick();
    assert_eq!(
        events
            .iter()
            .filter(|event| matches!(event, UniverseEvent::PlayerDied { .. }))
            .count(),
        1
    );
    assert!(events.contains(&UniverseEvent::PlayerDied {
        cause: "out-of-bounds".into(),
    }));
    assert_eq!(harness.player().status, EntityStatus::Dying);
    assert_eq!(harness.player().pending_death.as_deref(), Some("out-of-bounds"));
    let session = harness.universe.session();
    assert!(session.is_flag_set("core.handled-local-death"));
    assert_eq!(session.text("core.player1.cause-of-death"), "out-of-bounds");

    let again = harness.universe.tick();
    assert!(!again
        .iter()
        .any(|event| matches!(event, UniverseEvent::PlayerDied { .. })));
}

#[test]
fn dropping_onto_flush_map_below_crosses_instead_of_dying() {
    let mut records = side_by_side();
    records.push(record("c", 0, 10, 10, 10));
    let mut harness = Harness::offline(records);
    harness.spawn_on("a");
    let regions = harness.universe.active_map().expect("a").fall_regions().to_vec();
    assert_eq!(regions.len(), 2);

    harness.move_player(48, 245);
    let events = harness.universe.tick();
    assert!(events.contains(&UniverseEvent::MapTransition {
        from: "a".into(),
        to: "c".into(),
    }));
    assert_eq!(harness.player().rect.y, 5);
}

#[test]
fn unknown_destination_reloads_current_map() {
    let mut harness = Harness::offline(side_by_side());
    harness.spawn_on("a");
    harness
        .universe
        .transition_to_map(TransitionRequest::to_map("nowhere"))
        .expect("fallback transition");
    assert_eq!(harness.universe.active_map_name(), Some("a"));

    let mut fresh = Harness::offline(side_by_side());
    let error = fresh.universe.activate_map("nowhere").expect_err("no active map");
    assert!(matches!(error, UniverseError::NoActiveMap));
}

#[test]
fn lifecycle_scripts_run_in_order_and_onbirth_only_once() {
    let mut harness = Harness::offline(vec![record("a", 0, 0, 10, 10)]);
    harness.universe.activate_map("a").expect("activate");
    assert_eq!(
        harness.recorded_scripts(),
        [
            "a:global.map.onload",
            "a:onload",
            "a:onbirth",
            "a:global.map.load.complete",
            "a:map.first-visit",
            "a:global.map.onvisit",
            "a:onvisit",
        ]
    );

    harness.scripts.borrow_mut().clear();
    harness
        .universe
        .transition_to_map(TransitionRequest::to_map("a"))
        .expect("reload");
    let second = harness.recorded_scripts();
    assert!(second.contains(&"a:onload".to_string()));
    assert!(!second.contains(&"a:onbirth".to_string()));
    assert!(!second.contains(&"a:map.first-visit".to_string()));
}

#[test]
fn neighbor_lifecycle_targets_the_neighbor() {
    let mut harness = Harness::offline(side_by_side());
    harness.universe.activate_map("a").expect("activate");
    let scripts = harness.recorded_scripts();
    assert!(scripts.contains(&"b:onload".to_string()));
    assert!(scripts.contains(&"b:onbirth".to_string()));
    assert!(!scripts.contains(&"b:onvisit".to_string()));
    assert_eq!(harness.universe.context_map_name(), Some("a"));
}

#[test]
fn nonadjacent_maps_are_evicted_after_camera_settles() {
    let mut records = side_by_side();
    records.push(record("c", 20, 0, 10, 10));
    let mut harness = Harness::offline(records);
    harness.spawn_on("a");
    harness.move_player(250, 24);
    harness.universe.tick();
    assert_eq!(harness.universe.active_map_name(), Some("b"));
    assert_eq!(harness.universe.loaded_map_names(Layer::Foreground).len(), 3);

    harness.move_player(-30, 24);
    harness.universe.tick();
    assert_eq!(harness.universe.active_map_name(), Some("a"));
    assert!(harness
        .universe
        .visible_map(Layer::Foreground, "c")
        .is_some());
    assert!(harness.universe.is_discard_pending());

    for _ in 0..200 {
        if !harness.universe.is_discard_pending() {
            break;
        }
        harness.universe.tick();
    }
    assert!(!harness.universe.is_discard_pending());
    assert_eq!(
        harness.universe.loaded_map_names(Layer::Foreground),
        ["a".to_string(), "b".to_string()]
    );
}

#[test]
fn hard_lock_skips_simulation_and_soft_lock_blocks_pause() {
    let mut harness = Harness::offline(side_by_side());
    harness.spawn_on("a");

    assert!(harness
        .universe
        .lock_with_key("dig", None, LockStrength::Hard, None, None));
    harness.universe.tick();
    assert_eq!(harness.universe.session().get_int("core.time.played"), 0);
    assert_eq!(harness.universe.active_map().expect("a").completion_ticks(), 0);

    harness.universe.unlock("dig");
    harness.universe.tick();
    assert_eq!(harness.universe.session().get_int("core.time.played"), 1);

    harness
        .universe
        .lock_with_key("chat", None, LockStrength::Soft, None, None);
    assert!(!harness.universe.pause());
    harness.universe.tick();
    assert_eq!(harness.universe.session().get_int("core.time.played"), 2);

    harness.universe.unlock("chat");
    assert!(harness.universe.pause());
    harness.universe.tick();
    assert_eq!(harness.universe.session().get_int("core.time.played"), 2);
}

#[test]
fn unlock_actions_run_scripts_or_surface_callbacks() {
    let mut harness = Harness::offline(side_by_side());
    harness.spawn_on("a");
    harness.scripts.borrow_mut().clear();

    harness.universe.lock_with_key(
        "door",
        None,
        LockStrength::Soft,
        Some("script:door.open"),
        None,
    );
    harness.universe.unlock("door");
    assert_eq!(harness.recorded_scripts(), ["a:door.open"]);

    harness
        .universe
        .lock_with_key("scene", None, LockStrength::Soft, Some("cutscene.end"), None);
    harness.universe.unlock("scene");
    let events = harness.universe.tick();
    assert!(events.contains(&UniverseEvent::LockCallback {
        action: "cutscene.end".into(),
    }));
    assert_eq!(harness.universe.lock_count(), 0);
}

#[test]
fn client_applies_lobby_messages() {
    let mut harness = Harness::new(side_by_side(), Vec::new(), NetStatus::Client, None);
    harness.push("15;2", None);
    harness.push("33;3;Zed", None);
    harness.push("36;3;ff0000", None);
    harness.push("30;2", None);
    harness.push("10;", Some(7));
    harness.push("31;", None);
    harness.universe.tick();

    let session = harness.universe.session();
    assert_eq!(session.text("core.player-id"), "2");
    assert!(session.is_flag_set("core.received-player-id"));
    assert_eq!(session.text("net.player2.joined"), "0");
    assert_eq!(session.text("net.player3.nick"), "Zed");
    assert!(session.is_flag_set("net.player3.received-nick"));
    assert_eq!(session.text("net.player3.avatar.colors"), "ff0000");
    assert_eq!(session.text("net.online"), "0");
    assert_eq!(harness.sent(), [Outbound::Pong { target: Some(7) }]);
}

#[test]
fn entity_death_and_respawn_reply_with_receipts() {
    let mut a = Map::empty(&record("a", 0, 0, 10, 10));
    a.add_trigger(Trigger {
        name: "spawn".into(),
        rect: Rect::new(24, 24, 24, 24),
        active: true,
    });
    a.add_trigger(Trigger {
        name: "den".into(),
        rect: Rect::new(120, 96, 24, 24),
        active: true,
    });
    a.add_entity(MapEntity::new("mole", Genus::Enemy, Rect::new(0, 0, 24, 24)));
    let mut harness = Harness::new(side_by_side(), vec![a], NetStatus::Client, None);
    harness.spawn_on("a");

    harness.push("27;k1;mole", Some(3));
    harness.universe.tick();
    let mole = harness.universe.active_map().and_then(|map| map.entity("mole")).expect("mole");
    assert!(!mole.is_active());

    harness.push("28;k2;mole;den", Some(3));
    harness.push("27;k3;player1", Some(3));
    let events = harness.universe.tick();
    let mole = harness.universe.active_map().and_then(|map| map.entity("mole")).expect("mole");
    assert_eq!(mole.status, EntityStatus::Active);
    assert_eq!((mole.rect.x, mole.rect.y), (120, 96));
    assert!(events.contains(&UniverseEvent::PlayerDied {
        cause: "network".into(),
    }));

    let receipts = harness
        .sent()
        .into_iter()
        .filter_map(|message| match message {
            Outbound::UnlockReceipt { key, target } => Some((key, target)),
            _ => None,
        })
        .collect::<Vec<_>>();
    assert_eq!(
        receipts,
        [
            ("k1".to_string(), Some(3)),
            ("k2".to_string(), Some(3)),
            ("k3".to_string(), Some(3)),
        ]
    );
}

#[test]
fn malformed_payloads_are_dropped_and_entity_messages_surface() {
    let mut harness = Harness::new(side_by_side(), Vec::new(), NetStatus::Client, None);
    harness.spawn_on("a");
    harness.push("21;gold1;x", None);
    harness.push("4;player1;oops", None);
    harness.push("6;3;4", None);
    let events = harness.universe.tick();

    assert_eq!(harness.player().rect, Rect::new(24, 24, 24, 24));
    assert!(harness.sent().is_empty());
    assert!(events.iter().any(|event| matches!(
        event,
        UniverseEvent::EntityCommand { command } if command.message == NetMessage::Dig
    )));
}

#[test]
fn motion_updates_position_and_direction() {
    let mut harness = Harness::new(side_by_side(), Vec::new(), NetStatus::Client, None);
    harness.spawn_on("a");
    harness.push("4;player1;72;48;4", None);
    harness.universe.tick();
    assert_eq!((harness.player().rect.x, harness.player().rect.y), (72, 48));
    assert_eq!(harness.player().direction, crate::map::Direction::Left);
}

#[test]
fn global_lock_drains_network_but_skips_simulation() {
    let mut harness = Harness::new(side_by_side(), Vec::new(), NetStatus::Client, None);
    harness.spawn_on("a");
    harness.link.borrow_mut().global_locked = true;
    harness.push("32;hello", None);

    let events = harness.universe.tick();
    assert_eq!(harness.link.borrow().pending(), 0);
    assert!(events.contains(&UniverseEvent::Chat {
        text: "hello".into(),
    }));
    assert_eq!(harness.universe.session().get_int("core.time.played"), 0);
}

fn gold_map(next: Option<&str>) -> Map {
    let mut a = Map::empty(&record("a", 0, 0, 10, 10));
    a.add_entity(MapEntity::new("gold1", Genus::Gold, Rect::new(48, 48, 24, 24)));
    if let Some(next) = next {
        a.set_param("next-map", next);
    }
    a
}

#[test]
fn server_completes_level_once_gold_is_collected() {
    let mut records = side_by_side();
    records[0].set_gold_count(1);
    let mut harness = Harness::new(records, vec![gold_map(Some("b"))], NetStatus::Server, None);
    harness.spawn_on("a");
    harness.universe.session_mut().set("net.game-in-progress", "1");

    let events = harness.universe.tick();
    assert!(!events.iter().any(|event| matches!(
        event,
        UniverseEvent::LevelComplete { .. } | UniverseEvent::LevelFailed { .. }
    )));

    harness.push("21;gold1;48;48;2", None);
    let events = harness.universe.tick();
    assert!(events.contains(&UniverseEvent::LevelComplete { next: "b".into() }));
    assert!(harness.sent().contains(&Outbound::LevelComplete {
        next_map: "b".into(),
    }));
    let session = harness.universe.session();
    assert_eq!(session.text("net.transition.target"), "b");
    assert!(session.is_flag_set("net.level.complete"));
    assert!(!session.is_flag_set("net.game-in-progress"));
    let a = harness.universe.map_data(Layer::Foreground, "a").expect("a");
    assert!(a.completed);
    assert_eq!(a.gold_remaining(), 0);
}

#[test]
fn server_fails_level_when_no_player_is_alive() {
    let mut harness = Harness::new(side_by_side(), vec![gold_map(None)], NetStatus::Server, None);
    harness.universe.activate_map("a").expect("activate");
    harness.universe.session_mut().set("net.game-in-progress", "1");

    let events = harness.universe.tick();
    assert!(events.contains(&UniverseEvent::LevelFailed { next: "a".into() }));
    assert!(harness.sent().contains(&Outbound::LevelFailed {
        next_map: "a".into(),
    }));
    assert!(harness.universe.session().is_flag_set("net.level.failed"));
}

#[test]
fn client_level_complete_saves_linear_progress() {
    let mut harness = Harness::new(side_by_side(), Vec::new(), NetStatus::Client, None);
    harness.spawn_on("a");
    harness.universe.tick();
    harness.push("39;k9;b", Some(1));
    let events = harness.universe.tick();

    assert!(events.contains(&UniverseEvent::LevelComplete { next: "b".into() }));
    let session = harness.universe.session();
    assert_eq!(session.text("net.transition.target"), "b");
    assert_eq!(session.text("core.player1.x"), "0");
    assert_eq!(harness.universe.map_completion_time("a"), 1);
    assert!(harness.sent().contains(&Outbound::UnlockReceipt {
        key: "k9".into(),
        target: Some(1),
    }));
}

#[test]
fn autosave_round_trips_and_rejects_tampered_files() {
    let saves = TempDir::new().expect("tempdir");
    let mut harness = Harness::new(
        side_by_side(),
        Vec::new(),
        NetStatus::Offline,
        Some(saves.path().to_path_buf()),
    );
    harness.spawn_on("a");
    harness.universe.session_mut().set("core.player1.xp", "42");
    harness.universe.mark_map_completed("b");

    let manifest = harness.universe.commit_autosave(AUTOSAVE_SLOT).expect("save");
    assert_eq!(manifest.active_map, "a");
    assert_eq!(manifest.format_version, SAVE_FORMAT_VERSION);
    assert_eq!(
        manifest.files.keys().collect::<Vec<_>>(),
        ["maps.xml", "session.xml"]
    );

    let mut restored = Harness::new(
        side_by_side(),
        Vec::new(),
        NetStatus::Offline,
        Some(saves.path().to_path_buf()),
    );
    let loaded = restored.universe.load_save(AUTOSAVE_SLOT).expect("load");
    assert_eq!(loaded.as_ref(), Some(&manifest));
    assert_eq!(restored.universe.session().text("core.player1.xp"), "42");
    let b = restored.universe.map_data(Layer::Foreground, "b").expect("b");
    assert!(b.completed);
    assert!(b.visible);

    let slot = restored.universe.save_slot_dir(AUTOSAVE_SLOT).expect("slot dir");
    let session_path = slot.join("session.xml");
    let mut text = fs::read_to_string(&session_path).expect("read session");
    text.push('\n');
    fs::write(&session_path, text).expect("tamper");
    assert!(restored.universe.load_save(AUTOSAVE_SLOT).expect("load").is_none());
    assert!(restored.universe.load_save(7).expect("load").is_none());
}

#[test]
fn crossing_maps_writes_an_autosave() {
    let saves = TempDir::new().expect("tempdir");
    let mut harness = Harness::new(
        side_by_side(),
        Vec::new(),
        NetStatus::Offline,
        Some(saves.path().to_path_buf()),
    );
    harness.spawn_on("a");
    harness.move_player(250, 24);
    harness.universe.tick();

    let manifest = saves.path().join("slot1").join("manifest.json");
    assert!(manifest.exists());
    let text = fs::read_to_string(manifest).expect("manifest");
    let parsed: SaveManifest = serde_json::from_str(&text).expect("json");
    assert_eq!(parsed.active_map, "b");
}

#[test]
fn map_memory_survives_leaving_and_returning() {
    let saves = TempDir::new().expect("tempdir");
    let mut harness = Harness::new(
        side_by_side(),
        vec![gold_map(None)],
        NetStatus::Offline,
        Some(saves.path().to_path_buf()),
    );
    harness.universe.activate_map("a").expect("activate");
    harness
        .universe
        .active_map_mut()
        .and_then(|map| map.entity_mut("gold1"))
        .expect("gold")
        .status = EntityStatus::Inactive;

    harness
        .universe
        .transition_to_map(TransitionRequest::to_map("b").at_waypoint("spawn"))
        .expect("to b");
    harness
        .universe
        .transition_to_map(TransitionRequest::to_map("a"))
        .expect("back to a");
    let gold = harness
        .universe
        .active_map()
        .and_then(|map| map.entity("gold1"))
        .expect("gold");
    assert_eq!(gold.status, EntityStatus::Inactive);
}

#[test]
fn draw_orders_background_first_and_fades_inactive_maps() {
    let mut records = side_by_side();
    let mut sky = MapData::new("sky");
    sky.layer = Layer::Background;
    sky.width = 20;
    sky.height = 20;
    records.push(sky);
    let mut harness = Harness::offline(records);
    harness.universe.activate_map("a").expect("activate");
    harness.universe.tick();
    assert_eq!(harness.universe.prerender_status(), PrerenderStatus::Ready);

    let mut requests: Vec<DrawRequest> = Vec::new();
    harness.universe.draw(&mut requests);

    let order = requests
        .iter()
        .map(|request| (request.layer, request.map.as_str()))
        .collect::<Vec<_>>();
    assert_eq!(
        order,
        [
            (Layer::Background, "sky"),
            (Layer::Foreground, "a"),
            (Layer::Foreground, "b"),
        ]
    );
    assert_eq!((requests[0].scale, requests[0].tint, requests[0].alpha), (0.75, 0.5, 1.0));
    assert_eq!((requests[1].tint, requests[1].alpha), (1.0, 1.0));
    assert_eq!((requests[2].tint, requests[2].alpha), (0.75, 0.5));
    assert_eq!(requests[2].screen_x, 240);

    assert_eq!(harness.universe.prerender_status(), PrerenderStatus::Done);
    assert_eq!(
        harness.universe.camera().prerender_bounds(),
        harness.universe.camera_region("a")
    );
}

#[test]
fn render_region_applies_parallax_for_background() {
    let mut sky = MapData::new("sky");
    sky.layer = Layer::Background;
    sky.width = 20;
    sky.height = 20;
    let mut harness = Harness::offline(vec![record("a", 0, 0, 10, 10), sky]);
    harness.universe.camera_mut().position(100.0, 0.0);

    assert_eq!(
        harness.universe.render_region("a", Layer::Foreground),
        Rect::new(-100, 0, 240, 240)
    );
    assert_eq!(
        harness.universe.render_region("sky", Layer::Background),
        Rect::new(-83, 0, 360, 360)
    );
    assert_eq!(harness.universe.render_region("missing", Layer::Background), Rect::EMPTY);
}

#[test]
fn gold_quests_skills_and_records_bookkeeping() {
    let mut records = side_by_side();
    records[0].class_name = "mine".into();
    records[0].set_gold_count(5);
    records[1].set_gold_count(3);
    let mut harness = Harness::offline(records);
    let universe = &mut harness.universe;

    universe.set_map_gold_remaining("a", 2);
    universe.set_map_gold_remaining("b", 9);
    assert_eq!(universe.count_gold_pieces("mine"), 5);
    assert_eq!(universe.count_collected_gold_pieces("mine"), 3);
    assert_eq!(universe.calculate_universal_gold_total(), 8);
    assert_eq!(universe.count_collected_gold_pieces("*"), 3);

    universe.session_mut().set("core.skills.sprint", "1");
    assert!(!universe.assign_skill_to_slot("sprint", 3));
    assert!(universe.assign_skill_to_slot("sprint", 1));
    assert!(universe.is_skill_equipped("sprint"));
    assert!(universe.assign_skill_to_slot("sprint", 2));
    assert_eq!(universe.session().text("core.player1.skill1"), "");
    assert_eq!(universe.session().text("core.player1.skill2"), "sprint");
    assert!(universe.unlocked_skill_names().contains(&"sprint"));

    universe.add_historical_record("bosses", "mole-king");
    universe.add_historical_record("bosses", "mole-king");
    assert_eq!(universe.historical_records("bosses"), ["mole-king".to_string()]);
    assert!(universe.has_historical_record("bosses", "mole-king"));
    assert!(universe.historical_records("unknown").is_empty());

    assert_eq!(universe.map_title("a"), "Untitled Area");
    universe.set_map_visited("a");
    assert!(!universe.is_map_newborn("a"));
    assert_eq!(universe.visible_map_names(), ["a".to_string()]);
}

#[test]
fn reboot_resets_per_playthrough_state() {
    let mut harness = Harness::offline(side_by_side());
    let universe = &mut harness.universe;
    universe.quests = vec![Quest::new("find-key", "Find the key")];
    assert!(universe.set_quest_status("find-key", QuestStatus::Complete));
    universe.track_quest_by_name("find-key");
    universe.track_quest_by_name("find-key");
    assert_eq!(universe.tracked_quests().len(), 1);
    assert_eq!(universe.count_completed_quests(), 1);
    universe.add_historical_record("npcs", "met-smith");
    universe.session_mut().set("core.player1.xp", "99");
    universe.set_map_visited("a");
    universe.lock_with_key("net", None, LockStrength::Hard, None, None);

    universe.reboot();
    assert_eq!(universe.count_completed_quests(), 0);
    assert!(universe.tracked_quests().is_empty());
    assert!(universe.historical_records("npcs").is_empty());
    assert_eq!(universe.session().text("core.player1.xp"), "0");
    assert!(universe.is_map_newborn("a"));
    assert!(!universe.is_locked());
}

fn trigger(name: &str, x: i32, y: i32) -> Trigger {
    Trigger {
        name: name.into(),
        rect: Rect::new(x, y, 24, 24),
        active: true,
    }
}

fn lamp_items() -> Inventory {
    let item = TreeNode::new("item")
        .with_child(TreeNode::new("name").with_text("lamp"))
        .with_child(TreeNode::new("title").with_text("Miner's Lamp"));
    let node = TreeNode::new("item-data").with_child(TreeNode::new("items").with_child(item));
    Inventory::from_node(&node)
}

#[test]
fn reboot_drops_loaded_maps_so_the_next_visit_is_a_birth() {
    let mut records = side_by_side();
    records.push(record("c", 20, 0, 10, 10));
    let mut harness = Harness::offline(records);
    *harness.universe.inventory_mut() = lamp_items();
    harness.spawn_on("a");
    harness.move_player(250, 24);
    harness.universe.tick();
    assert!(harness.universe.is_discard_pending());
    assert_eq!(harness.universe.loaded_map_names(Layer::Foreground).len(), 3);
    let mut rng = StdRng::seed_from_u64(5);
    assert!(harness.universe.acquire_item_by_name("lamp", &mut rng));
    assert!(harness.universe.equip_item_by_name("lamp"));

    harness.universe.reboot();
    assert_eq!(harness.universe.active_map_name(), None);
    assert_eq!(harness.universe.context_map_name(), None);
    assert!(!harness.universe.is_discard_pending());
    assert!(harness.universe.loaded_map_names(Layer::Foreground).is_empty());
    assert!(harness.universe.loaded_map_names(Layer::Background).is_empty());
    assert!(!harness.universe.is_item_acquired("lamp"));
    assert!(!harness.universe.is_item_equipped("lamp"));

    harness.scripts.borrow_mut().clear();
    harness.universe.activate_map("a").expect("activate");
    assert!(harness.recorded_scripts().contains(&"a:onbirth".to_string()));
    assert!(harness.recorded_scripts().contains(&"a:map.first-visit".to_string()));
    assert_eq!(
        harness.universe.loaded_map_names(Layer::Foreground),
        ["a".to_string(), "b".to_string()]
    );
}

#[test]
fn leaving_a_linear_map_loads_only_the_destination() {
    let records = vec![
        record("lin", 0, 0, 10, 10),
        record("far", 40, 0, 10, 10),
        record("far2", 50, 0, 10, 10),
    ];
    let mut linear = Map::empty(&records[0]);
    linear.set_param("type", "linear");
    linear.add_trigger(trigger("spawn", 24, 24));
    let mut harness = Harness::new(records, vec![linear], NetStatus::Offline, None);
    harness.spawn_on("lin");
    assert_eq!(harness.universe.loaded_map_names(Layer::Foreground), ["lin".to_string()]);

    harness.scripts.borrow_mut().clear();
    harness
        .universe
        .transition_to_map(TransitionRequest::to_map("far").at_waypoint("spawn"))
        .expect("to far");
    assert_eq!(harness.universe.active_map_name(), Some("far"));
    assert_eq!(harness.universe.loaded_map_names(Layer::Foreground), ["far".to_string()]);
    assert!(!harness.recorded_scripts().contains(&"far2:onload".to_string()));
    assert_eq!(harness.player().rect, Rect::new(24, 24, 24, 24));

    harness
        .universe
        .transition_to_map(TransitionRequest::to_map("far").at_waypoint("spawn"))
        .expect("reload far");
    assert_eq!(
        harness.universe.loaded_map_names(Layer::Foreground),
        ["far".to_string(), "far2".to_string()]
    );
}

#[test]
fn blocked_spawn_moves_player_to_safe_spawn() {
    let data = record("a", 0, 0, 10, 10);
    let mut map = Map::empty(&data);
    map.set_tile(1, 1, 2);
    map.add_trigger(trigger("spawn", 24, 24));
    map.add_trigger(trigger("safe-spawn", 96, 96));
    let mut harness = Harness::new(vec![data], vec![map], NetStatus::Offline, None);
    harness.spawn_on("a");

    assert_eq!(harness.player().rect, Rect::new(96, 96, 24, 24));
    assert_eq!(harness.universe.session().text("core.player1.x"), "96");
    assert_eq!(harness.universe.session().text("core.player1.y"), "96");
}

#[test]
fn blocked_spawn_without_safe_spawn_keeps_the_waypoint() {
    let data = record("a", 0, 0, 10, 10);
    let mut map = Map::empty(&data);
    map.set_tile(1, 1, 2);
    map.add_trigger(trigger("spawn", 24, 24));
    let mut harness = Harness::new(vec![data], vec![map], NetStatus::Offline, None);
    harness.spawn_on("a");

    assert_eq!(harness.player().rect, Rect::new(24, 24, 24, 24));
    assert_eq!(harness.universe.session().text("core.player1.x"), "24");
}

#[test]
fn falling_player_dies_before_reaching_a_loaded_map_below() {
    let mut records = side_by_side();
    records.push(record("c", 0, 11, 10, 10));
    let mut harness = Harness::offline(records);
    harness.spawn_on("a");
    assert!(harness.universe.visible_map(Layer::Foreground, "c").is_some());

    harness.move_player(48, 245);
    let events = harness.universe.tick();
    assert!(events.contains(&UniverseEvent::PlayerDied {
        cause: "out-of-bounds".into(),
    }));
    assert!(!events
        .iter()
        .any(|event| matches!(event, UniverseEvent::MapTransition { .. })));
    assert_eq!(harness.universe.active_map_name(), Some("a"));
}

#[test]
fn busy_map_skips_simulation() {
    let mut harness = Harness::offline(side_by_side());
    harness.spawn_on("a");
    harness.universe.active_map_mut().expect("a").set_busy(true);
    harness.universe.tick();
    assert_eq!(harness.universe.session().get_int("core.time.played"), 0);

    harness.universe.active_map_mut().expect("a").set_busy(false);
    harness.universe.tick();
    assert_eq!(harness.universe.session().get_int("core.time.played"), 1);
}

#[test]
fn undo_returns_to_the_recorded_position() {
    let mut harness = Harness::offline(side_by_side());
    harness.spawn_on("a");
    harness.move_player(100, 48);
    harness
        .universe
        .transition_to_map(TransitionRequest::to_map("b").at_waypoint("spawn"))
        .expect("to b");
    let session = harness.universe.session();
    assert_eq!(session.text("app.transition.from.map"), "a");
    assert_eq!(session.text("app.transition.from.waypoint"), "");
    assert_eq!(session.text("app.transition.from.player-x"), "100");
    assert_eq!(session.text("app.transition.from.player-y"), "48");

    harness.universe.undo_last_map_transition(true).expect("undo");
    assert_eq!(harness.universe.active_map_name(), Some("a"));
    assert_eq!(harness.player().rect, Rect::new(100, 48, 24, 24));
    assert_eq!(harness.universe.session().text("core.player1.x"), "100");
    assert_eq!(harness.universe.session().text("app.transition.from.map"), "a");
    assert_eq!(harness.universe.session().text("app.transition.to.map"), "a");
}

#[test]
fn undo_prefers_the_departure_waypoint() {
    let records = side_by_side();
    let mut a = Map::empty(&records[0]);
    a.add_trigger(trigger("spawn", 24, 24));
    a.add_trigger(trigger("door", 144, 24));
    let mut harness = Harness::new(records, vec![a], NetStatus::Offline, None);
    harness.spawn_on("a");
    harness
        .universe
        .transition_to_map(
            TransitionRequest::to_map("b")
                .at_waypoint("spawn")
                .from_waypoint("door"),
        )
        .expect("to b");
    assert_eq!(harness.universe.session().text("app.transition.from.waypoint"), "door");

    harness.universe.undo_last_map_transition(false).expect("undo");
    assert_eq!(harness.universe.active_map_name(), Some("a"));
    assert_eq!(harness.player().rect, Rect::new(144, 24, 24, 24));
    assert_eq!(harness.universe.session().text("core.player1.y"), "24");
}

#[test]
fn undo_without_a_recorded_transition_fails() {
    let mut harness = Harness::offline(side_by_side());
    let error = harness
        .universe
        .undo_last_map_transition(true)
        .expect_err("nothing to undo");
    assert!(matches!(error, UniverseError::NoTransitionToUndo));

    harness.spawn_on("a");
    let error = harness
        .universe
        .undo_last_map_transition(true)
        .expect_err("first warp has no origin");
    assert!(matches!(error, UniverseError::NoTransitionToUndo));
}

#[test]
fn quest_updates_track_in_the_order_reached() {
    let mut harness = Harness::offline(side_by_side());
    let universe = &mut harness.universe;
    let mut quest = Quest::new("find-key", "Find the key");
    quest.updates = vec![
        QuestUpdate::new("asked", "Ask the smith."),
        QuestUpdate::new("hint", ""),
        QuestUpdate::new("found", "Found it."),
    ];
    universe.quests = vec![quest];

    assert!(universe.flag_update_by_name("find-key", "found", "active"));
    assert!(!universe.flag_update_by_name("find-key", "found", "active"));
    assert!(!universe.flag_update_by_name("find-key", "asked", "complete"));
    assert!(!universe.flag_update_by_name("lost-quest", "asked", "active"));
    assert!(universe.track_update_by_name("find-key", "hint"));
    assert!(!universe.track_update_by_name("find-key", "missing"));
    assert!(universe.track_update_by_name("find-key", "asked"));
    assert!(universe.track_update_by_name("find-key", "asked"));

    let quest = universe.quest("find-key").expect("quest");
    let active = quest
        .active_updates()
        .iter()
        .map(|update| update.name.as_str())
        .collect::<Vec<_>>();
    assert_eq!(active, ["found", "asked"]);
    assert_eq!(quest.latest_update().map(|update| update.name.as_str()), Some("found"));
    assert_eq!(quest.update("hint").expect("hint").status_phrase(), "active");
    assert_eq!(quest.status_phrase(), "inactive");

    universe.set_quest_status("find-key", QuestStatus::Failed);
    assert_eq!(universe.quest("find-key").expect("quest").status_phrase(), "failed");

    universe.reboot();
    let quest = universe.quest("find-key").expect("quest");
    assert!(quest.active_updates().is_empty());
    assert!(quest.latest_update().is_none());
    assert_eq!(quest.status_phrase(), "inactive");
}

#[test]
fn session_references_expand_in_messages() {
    let mut harness = Harness::offline(side_by_side());
    harness.spawn_on("a");
    assert_eq!(
        harness
            .universe
            .translate_session_variable_references("You are in $[app.active-map-name]."),
        "You are in a."
    );
}

#[test]
fn opening_a_universe_reads_quest_updates_and_items() {
    let temp = TempDir::new().expect("tempdir");
    let dir = temp.path().join("assets").join("universes").join("mine");
    fs::create_dir_all(&dir).expect("mkdir");
    fs::write(
        dir.join("maps.xml"),
        r#"<maps><primary-map name="a"/><foreground><map name="a" x="0" y="0" width="10" height="10"/></foreground></maps>"#,
    )
    .expect("maps");
    fs::write(
        dir.join("quests.xml"),
        r#"<quests>
  <quest name="find-key" title="Find the key" xp="250">
    <description>The smith lost a key.</description>
    <update name="asked">Ask the smith.</update>
    <update name="found">Found it.</update>
  </quest>
</quests>"#,
    )
    .expect("quests");
    fs::write(
        dir.join("items.xml"),
        r#"<item-data>
  <items><item><name>lamp</name><title>Miner's Lamp</title><upgrade-pools><upgrade-pool>glow</upgrade-pool></upgrade-pools></item></items>
  <upgrade-pools><upgrade-pool name="glow"><upgrade name="bright"><title>Bright</title><cost>3</cost></upgrade></upgrade-pool></upgrade-pools>
</item-data>"#,
    )
    .expect("items");
    let paths = universe_paths_at(temp.path().to_path_buf()).expect("paths");

    let mut universe = UniverseController::open(
        &paths,
        "mine",
        UniverseConfig::default(),
        Box::new(crate::network::OfflineLink),
    )
    .expect("open");
    let quest = universe.quest("find-key").expect("quest");
    assert_eq!(quest.xp, 250);
    assert_eq!(quest.description, "The smith lost a key.");
    assert_eq!(quest.updates.len(), 2);
    assert_eq!(quest.updates[1].description, "Found it.");

    let pool = universe.get_upgrade_pool_by_name("glow").expect("pool");
    assert_eq!(pool.upgrades[0].title, "Bright");
    let mut rng = StdRng::seed_from_u64(9);
    assert!(universe.acquire_item_by_name("lamp", &mut rng));
    let lamp = universe.inventory().acquired_item("lamp").expect("lamp");
    assert_eq!(lamp.available_upgrades().len(), 1);
    assert_eq!(lamp.title, "Miner's Lamp");
}
