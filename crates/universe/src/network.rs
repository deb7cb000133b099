use std::collections::VecDeque;

use thiserror::Error;
use tracing::debug;

macro_rules! net_messages {
    ($($variant:ident = $id:literal),+ $(,)?) => {
        /// Wire message types with their fixed integer ids.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum NetMessage {
            $($variant),+
        }

        impl NetMessage {
            pub fn from_id(id: i32) -> Option<Self> {
                match id {
                    $($id => Some(NetMessage::$variant),)+
                    _ => None,
                }
            }

            pub fn id(self) -> i32 {
                match self {
                    $(NetMessage::$variant => $id),+
                }
            }
        }
    };
}

net_messages! {
    LockSoft = 1,
    LockHard = 2,
    Unlock = 3,
    StartMotion = 4,
    StopMotion = 5,
    Dig = 6,
    ReqConfirmDig = 7,
    DigValid = 8,
    DigInvalid = 9,
    Ping = 10,
    Pong = 11,
    ReqCallScript = 12,
    SyncEnemyAi = 13,
    CallScript = 14,
    PlayerId = 15,
    Ok = 17,
    Unauthorized = 18,
    InvalidateDig = 20,
    SyncOneGold = 21,
    SyncAllGold = 22,
    ReqValidateBomb = 23,
    ValidateBombOk = 24,
    ValidateBombUnauthorized = 25,
    CreateBomb = 26,
    EntityDie = 27,
    EntityRespawn = 28,
    SyncPlayer = 29,
    ClientDisconnecting = 30,
    ServerDisconnecting = 31,
    Chat = 32,
    ReqNick = 33,
    SyncAllPlayers = 34,
    BeginGame = 35,
    AvatarData = 36,
    VoteToSkip = 37,
    TransitionToMap = 38,
    LevelComplete = 39,
    LevelFailed = 40,
    ConfirmDisconnect = 41,
    SyncPlayerById = 42,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NetworkParseError {
    #[error("network command {raw:?} has a non-integer type")]
    BadType { raw: String },
    #[error("network command type {id} is not a known message")]
    UnknownType { id: i32 },
}

/// One inbound command, drained each tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkCommand {
    pub message: NetMessage,
    pub payload: String,
    pub source: Option<u32>,
}

impl NetworkCommand {
    pub fn new(message: NetMessage, payload: impl Into<String>) -> Self {
        Self {
            message,
            payload: payload.into(),
            source: None,
        }
    }

    /// Parses `type;payload`, splitting on the first `;` only.
    pub fn parse(raw: &str, source: Option<u32>) -> Result<Self, NetworkParseError> {
        let (kind, payload) = raw.split_once(';').unwrap_or((raw, ""));
        let id = kind
            .trim()
            .parse::<i32>()
            .map_err(|_| NetworkParseError::BadType {
                raw: raw.to_string(),
            })?;
        let message = NetMessage::from_id(id).ok_or(NetworkParseError::UnknownType { id })?;
        Ok(Self {
            message,
            payload: payload.to_string(),
            source,
        })
    }

    /// Payload fields split on `;`.
    pub fn fields(&self) -> Vec<&str> {
        if self.payload.is_empty() {
            Vec::new()
        } else {
            self.payload.split(';').collect()
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NetStatus {
    #[default]
    Offline,
    Server,
    Client,
}

/// Messages the core hands to the network collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    UnlockReceipt { key: String, target: Option<u32> },
    Pong { target: Option<u32> },
    EnemyAiSync { map: String, entity: String },
    LevelComplete { next_map: String },
    LevelFailed { next_map: String },
    EntityDie { entity: String },
    SyncPlayer { entity: String, x: i32, y: i32 },
    VoteToSkip,
}

/// Abstract message-delivery collaborator.
pub trait NetworkLink {
    fn status(&self) -> NetStatus;
    fn is_global_locked(&self) -> bool;
    fn next_command(&mut self) -> Option<NetworkCommand>;
    fn send(&mut self, message: Outbound);
}

/// Single-player link: never receives, drops everything sent.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineLink;

impl NetworkLink for OfflineLink {
    fn status(&self) -> NetStatus {
        NetStatus::Offline
    }

    fn is_global_locked(&self) -> bool {
        false
    }

    fn next_command(&mut self) -> Option<NetworkCommand> {
        None
    }

    fn send(&mut self, message: Outbound) {
        debug!(?message, "net_send_offline_dropped");
    }
}

/// In-memory link with a scripted inbound queue and a record of everything
/// sent.
#[derive(Debug, Clone, Default)]
pub struct QueuedLink {
    pub status: NetStatus,
    pub global_locked: bool,
    inbound: VecDeque<NetworkCommand>,
    sent: Vec<Outbound>,
}

impl QueuedLink {
    pub fn new(status: NetStatus) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }

    pub fn push(&mut self, command: NetworkCommand) {
        self.inbound.push_back(command);
    }

    /// Parses and queues a raw `type;payload` line; malformed lines are
    /// logged and dropped.
    pub fn push_raw(&mut self, raw: &str, source: Option<u32>) -> bool {
        match NetworkCommand::parse(raw, source) {
            Ok(command) => {
                self.push(command);
                true
            }
            Err(error) => {
                tracing::warn!(%error, "net_command_dropped");
                false
            }
        }
    }

    pub fn sent(&self) -> &[Outbound] {
        &self.sent
    }

    pub fn take_sent(&mut self) -> Vec<Outbound> {
        std::mem::take(&mut self.sent)
    }

    pub fn pending(&self) -> usize {
        self.inbound.len()
    }
}

impl NetworkLink for QueuedLink {
    fn status(&self) -> NetStatus {
        self.status
    }

    fn is_global_locked(&self) -> bool {
        self.global_locked
    }

    fn next_command(&mut self) -> Option<NetworkCommand> {
        self.inbound.pop_front()
    }

    fn send(&mut self, message: Outbound) {
        self.sent.push(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_splits_on_first_separator_only() {
        let command = NetworkCommand::parse("38;door-key;cave", Some(2)).expect("parse");
        assert_eq!(command.message, NetMessage::TransitionToMap);
        assert_eq!(command.payload, "door-key;cave");
        assert_eq!(command.fields(), vec!["door-key", "cave"]);
        assert_eq!(command.source, Some(2));
    }

    #[test]
    fn parse_without_payload() {
        let command = NetworkCommand::parse("10", None).expect("parse");
        assert_eq!(command.message, NetMessage::Ping);
        assert!(command.fields().is_empty());
    }

    #[test]
    fn parse_rejects_bad_and_unknown_types() {
        assert_eq!(
            NetworkCommand::parse("abc;x", None),
            Err(NetworkParseError::BadType {
                raw: "abc;x".to_string()
            })
        );
        assert_eq!(
            NetworkCommand::parse("16;x", None),
            Err(NetworkParseError::UnknownType { id: 16 })
        );
    }

    #[test]
    fn ids_round_trip_for_every_message() {
        for id in 1..=42 {
            if let Some(message) = NetMessage::from_id(id) {
                assert_eq!(message.id(), id);
            }
        }
        assert!(NetMessage::from_id(19).is_none());
    }

    #[test]
    fn queued_link_drains_in_order() {
        let mut link = QueuedLink::new(NetStatus::Client);
        assert!(link.push_raw("10", None));
        assert!(!link.push_raw("nope", None));
        link.push(NetworkCommand::new(NetMessage::Chat, "hi"));
        assert_eq!(link.next_command().expect("ping").message, NetMessage::Ping);
        assert_eq!(link.next_command().expect("chat").payload, "hi");
        assert!(link.next_command().is_none());
    }
}
