use tracing::{debug, info, warn};

use crate::locks::LockStrength;
use crate::map::{Direction, EntityStatus};
use crate::network::{NetMessage, NetStatus, NetworkCommand, Outbound};
use crate::script::ScriptMode;
use crate::session::net_player_key;

use super::{UniverseController, UniverseEvent};

/// Cause recorded for deaths announced by another peer.
const NETWORK_DEATH_CAUSE: &str = "network";

impl UniverseController {
    /// Drains every queued inbound command and dispatches it by type.
    pub(crate) fn drain_network(&mut self) {
        while let Some(command) = self.network.next_command() {
            self.dispatch_command(command);
        }
    }

    pub fn dispatch_command(&mut self, command: NetworkCommand) {
        let fields = command.fields();
        let source = command.source;
        let handled = match command.message {
            NetMessage::PlayerId => self.on_player_id(&fields),
            NetMessage::Unlock => fields.first().map(|key| self.unlock(key)),
            NetMessage::Ping => {
                self.network.send(Outbound::Pong { target: source });
                Some(())
            }
            NetMessage::SyncOneGold => self.on_sync_one_gold(&fields),
            NetMessage::EntityDie => self.on_entity_die(&fields, source),
            NetMessage::EntityRespawn => self.on_entity_respawn(&fields, source),
            NetMessage::StartMotion | NetMessage::StopMotion => self.on_motion(&fields),
            NetMessage::CallScript => fields.first().map(|script| {
                self.run_script(script, ScriptMode::UntilYield);
            }),
            NetMessage::VoteToSkip => fields.first().map(|key| {
                self.session.increment("net.votes-to-skip", 1);
                self.session.set("net.rebuild-intro-menu", "1");
                self.send_receipt(key, source);
            }),
            NetMessage::BeginGame => self.on_begin_game(&fields, source),
            NetMessage::TransitionToMap => self.on_transition_to_map(&fields, source),
            NetMessage::LevelComplete => self.on_level_outcome(&fields, source, true),
            NetMessage::LevelFailed => self.on_level_outcome(&fields, source, false),
            NetMessage::Chat => {
                self.emit(UniverseEvent::Chat {
                    text: command.payload.clone(),
                });
                Some(())
            }
            NetMessage::ClientDisconnecting => self.on_client_disconnecting(&fields),
            NetMessage::ServerDisconnecting => {
                self.session.set("net.online", "0");
                info!("server_disconnected");
                Some(())
            }
            NetMessage::ReqNick => self.set_net_player_field(&fields, "nick", Some("received-nick")),
            NetMessage::AvatarData => self.set_net_player_field(&fields, "avatar.colors", None),
            NetMessage::SyncAllPlayers => self.set_net_player_field(&fields, "joined", None),
            NetMessage::LockSoft => fields.first().map(|key| {
                self.lock_with_key(key, None, LockStrength::Soft, None, None);
            }),
            NetMessage::LockHard => fields.first().map(|key| {
                self.lock_with_key(key, None, LockStrength::Hard, None, None);
            }),
            _ => {
                self.emit(UniverseEvent::EntityCommand {
                    command: command.clone(),
                });
                Some(())
            }
        };

        if handled.is_none() {
            warn!(
                message = ?command.message,
                payload = %command.payload,
                "net_payload_malformed"
            );
        }
    }

    fn send_receipt(&mut self, key: &str, target: Option<u32>) {
        self.network.send(Outbound::UnlockReceipt {
            key: key.to_string(),
            target,
        });
    }

    fn is_network_client(&self) -> bool {
        self.network.status() == NetStatus::Client
    }

    fn on_player_id(&mut self, fields: &[&str]) -> Option<()> {
        let id = fields.first()?.trim().parse::<u32>().ok()?;
        if !self.is_network_client() {
            debug!(id, "player_id_ignored_when_not_client");
            return Some(());
        }
        self.session.set("core.player-id", id.to_string());
        self.session.set(&net_player_key(id, "joined"), "1");
        self.session.set("core.received-player-id", "1");
        info!(id, "player_id_received");
        Some(())
    }

    fn on_sync_one_gold(&mut self, fields: &[&str]) -> Option<()> {
        let [id, x, y, status] = fields else {
            return None;
        };
        let x = x.trim().parse::<i32>().ok()?;
        let y = y.trim().parse::<i32>().ok()?;
        let status = status.trim().parse::<i32>().ok().and_then(EntityStatus::from_code)?;
        let active = self.active_map_name.clone()?;

        let map = self.active_map_mut()?;
        match map.entity_mut(id) {
            Some(gold) => {
                gold.rect.x = x;
                gold.rect.y = y;
                gold.status = status;
            }
            None => debug!(entity = *id, "sync_gold_entity_missing"),
        }
        let remaining = map.remaining_gold_count();
        self.set_map_gold_remaining(&active, remaining);
        Some(())
    }

    fn on_entity_die(&mut self, fields: &[&str], source: Option<u32>) -> Option<()> {
        let [key, id] = fields else {
            return None;
        };
        if *id == self.local_player_name() {
            self.queue_player_death(NETWORK_DEATH_CAUSE);
        } else if let Some(entity) = self.active_map_mut().and_then(|map| map.entity_mut(id)) {
            entity.status = EntityStatus::Dying;
            entity.pending_death = Some(NETWORK_DEATH_CAUSE.to_string());
        } else {
            debug!(entity = *id, "entity_die_target_missing");
        }
        self.send_receipt(key, source);
        Some(())
    }

    fn on_entity_respawn(&mut self, fields: &[&str], source: Option<u32>) -> Option<()> {
        let [key, id, marker] = fields else {
            return None;
        };
        let map = self.active_map_mut()?;
        match map.trigger(marker).map(|trigger| trigger.rect) {
            Some(spot) => {
                if let Some(entity) = map.entity_mut(id) {
                    entity.rect.x = spot.x;
                    entity.rect.y = spot.y;
                    entity.status = EntityStatus::Active;
                    entity.pending_death = None;
                }
            }
            None => warn!(entity = *id, marker = *marker, "respawn_marker_missing"),
        }
        self.send_receipt(key, source);
        Some(())
    }

    fn on_motion(&mut self, fields: &[&str]) -> Option<()> {
        let [id, x, y, direction] = fields else {
            return None;
        };
        let x = x.trim().parse::<i32>().ok()?;
        let y = y.trim().parse::<i32>().ok()?;
        let direction = direction
            .trim()
            .parse::<i32>()
            .ok()
            .and_then(Direction::from_code)?;
        if let Some(entity) = self.active_map_mut().and_then(|map| map.entity_mut(id)) {
            entity.rect.x = x;
            entity.rect.y = y;
            entity.direction = direction;
        }
        Some(())
    }

    fn on_begin_game(&mut self, fields: &[&str], source: Option<u32>) -> Option<()> {
        let key = fields.first()?;
        if self.is_network_client() {
            self.session.set("net.game-in-progress", "1");
            self.run_script("global.coop.ready", ScriptMode::ToCompletion);
            self.run_script("coop.ready", ScriptMode::ToCompletion);
            info!("coop_game_started");
        }
        self.send_receipt(key, source);
        Some(())
    }

    fn on_transition_to_map(&mut self, fields: &[&str], source: Option<u32>) -> Option<()> {
        let [key, name] = fields else {
            return None;
        };
        self.session.set("net.transition.target", *name);
        self.emit(UniverseEvent::NetTransitionPending {
            target: name.to_string(),
        });
        self.send_receipt(key, source);
        Some(())
    }

    fn on_level_outcome(&mut self, fields: &[&str], source: Option<u32>, complete: bool) -> Option<()> {
        let [key, name] = fields else {
            return None;
        };
        if !self.is_network_client() {
            debug!(complete, "level_outcome_ignored_when_not_client");
            return Some(());
        }
        self.session.set("net.transition.target", *name);
        if complete {
            self.session.set("net.level.complete", "1");
            self.save_linear_progress();
        } else {
            self.session.set("net.level.failed", "1");
        }
        self.send_receipt(key, source);
        let next = name.to_string();
        self.emit(if complete {
            UniverseEvent::LevelComplete { next }
        } else {
            UniverseEvent::LevelFailed { next }
        });
        Some(())
    }

    fn on_client_disconnecting(&mut self, fields: &[&str]) -> Option<()> {
        let slot = fields.first()?.trim().parse::<u32>().ok()?;
        for suffix in ["joined", "ready", "received-nick"] {
            self.session.set(&net_player_key(slot, suffix), "0");
        }
        info!(slot, "client_disconnected");
        Some(())
    }

    /// `slot;value` into `net.player<slot>.<field>`, optionally raising a
    /// companion flag.
    fn set_net_player_field(&mut self, fields: &[&str], field: &str, flag: Option<&str>) -> Option<()> {
        let [slot, value] = fields else {
            return None;
        };
        let slot = slot.trim().parse::<u32>().ok()?;
        self.session.set(&net_player_key(slot, field), *value);
        if let Some(flag) = flag {
            self.session.set(&net_player_key(slot, flag), "1");
        }
        Some(())
    }
}
