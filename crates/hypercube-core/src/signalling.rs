//! Signalling message model
//!
//! Control-plane JSON documents exchanged on the SIGNALLING subsystem. Every
//! document carries a `command` discriminator; field names are camelCase and
//! unknown fields are ignored.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::codec::Msg;
use crate::errors::{CodecError, SignallingError};
use crate::types::{ConnectionInfo, Subsystem};

/// Command names this client understands
pub const KNOWN_COMMANDS: &[&str] = &[
    "connectionInfo",
    "createGroup",
    "createGroupAck",
    "subscribe",
    "publish",
    "echoData",
    "localPing",
    "remotePing",
    "subscriber",
    "unsubscriber",
];

// ----------------------------------------------------------------------------
// Signalling Messages
// ----------------------------------------------------------------------------

/// One signalling document, tagged by its `command` field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command")]
pub enum SignallingMessage {
    /// Handshake identity (outbound) or its acknowledgement (inbound)
    #[serde(rename = "connectionInfo", rename_all = "camelCase")]
    ConnectionInfo {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        connection_info: Option<ConnectionInfo>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        system_id: Option<u64>,
    },

    #[serde(rename = "createGroup", rename_all = "camelCase")]
    CreateGroup { group_name: String, system_id: u64 },

    #[serde(rename = "createGroupAck", rename_all = "camelCase")]
    CreateGroupAck {
        status: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        group_name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        group_id: Option<u64>,
    },

    #[serde(rename = "subscribe", rename_all = "camelCase")]
    Subscribe { group_name: String, system_id: u64 },

    #[serde(rename = "publish", rename_all = "camelCase")]
    Publish { group_id: u64, system_id: u64 },

    #[serde(rename = "echoData", rename_all = "camelCase")]
    EchoData {
        #[serde(default)]
        data: Value,
        #[serde(default)]
        ack: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        system_id: Option<u64>,
    },

    #[serde(rename = "localPing", rename_all = "camelCase")]
    LocalPing {
        #[serde(default)]
        ack: bool,
        #[serde(default)]
        data: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        system_id: Option<u64>,
    },

    #[serde(rename = "remotePing", rename_all = "camelCase")]
    RemotePing {
        #[serde(default)]
        ack: bool,
        #[serde(default)]
        data: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        system_id: Option<u64>,
    },

    /// A peer subscribed to a group this client publishes to
    #[serde(rename = "subscriber", rename_all = "camelCase")]
    Subscriber {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        group_id: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        system_id: Option<u64>,
    },

    /// The last subscriber left
    #[serde(rename = "unsubscriber", rename_all = "camelCase")]
    Unsubscriber {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        group_id: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        system_id: Option<u64>,
    },
}

impl SignallingMessage {
    /// Parse a signalling payload
    ///
    /// A document without a `command` string, or whose fields do not match the
    /// named command, is `Malformed`. A command name this client does not know
    /// is `UnknownCommand`.
    pub fn parse(payload: &str) -> Result<Self, SignallingError> {
        let value: Value =
            serde_json::from_str(payload).map_err(|e| SignallingError::Malformed {
                command: String::from("<unparsed>"),
                reason: e.to_string(),
            })?;
        Self::from_value(value)
    }

    /// Interpret an already-parsed JSON document
    pub fn from_value(value: Value) -> Result<Self, SignallingError> {
        let command = match value.get("command").and_then(Value::as_str) {
            Some(command) => command.to_string(),
            None => {
                return Err(SignallingError::Malformed {
                    command: String::from("<missing>"),
                    reason: String::from("no command field"),
                })
            }
        };

        if !KNOWN_COMMANDS.contains(&command.as_str()) {
            return Err(SignallingError::UnknownCommand(command));
        }

        serde_json::from_value(value).map_err(|e| SignallingError::Malformed {
            command,
            reason: e.to_string(),
        })
    }

    /// Wire name of the command
    pub fn command_name(&self) -> &'static str {
        match self {
            SignallingMessage::ConnectionInfo { .. } => "connectionInfo",
            SignallingMessage::CreateGroup { .. } => "createGroup",
            SignallingMessage::CreateGroupAck { .. } => "createGroupAck",
            SignallingMessage::Subscribe { .. } => "subscribe",
            SignallingMessage::Publish { .. } => "publish",
            SignallingMessage::EchoData { .. } => "echoData",
            SignallingMessage::LocalPing { .. } => "localPing",
            SignallingMessage::RemotePing { .. } => "remotePing",
            SignallingMessage::Subscriber { .. } => "subscriber",
            SignallingMessage::Unsubscriber { .. } => "unsubscriber",
        }
    }

    /// Acknowledgement for an unacknowledged ping or echo
    ///
    /// The reply keeps the command and data and flips `ack` to true. Returns
    /// None for every other message, including pings that are already acks.
    pub fn reply(&self, system_id: u64) -> Option<Self> {
        match self {
            SignallingMessage::LocalPing { ack: false, data, .. } => {
                Some(SignallingMessage::LocalPing {
                    ack: true,
                    data: data.clone(),
                    system_id: Some(system_id),
                })
            }
            SignallingMessage::RemotePing { ack: false, data, .. } => {
                Some(SignallingMessage::RemotePing {
                    ack: true,
                    data: data.clone(),
                    system_id: Some(system_id),
                })
            }
            SignallingMessage::EchoData { ack: false, data, .. } => {
                Some(SignallingMessage::EchoData {
                    data: data.clone(),
                    ack: true,
                    system_id: Some(system_id),
                })
            }
            _ => None,
        }
    }

    /// Wrap as a SIGNALLING `Msg`
    pub fn to_msg(&self) -> Result<Msg, CodecError> {
        Msg::from_json(Subsystem::Signalling, self)
    }
}

// ----------------------------------------------------------------------------
// Outbound Constructors
// ----------------------------------------------------------------------------

impl SignallingMessage {
    pub fn connection_info(info: ConnectionInfo, system_id: u64) -> Self {
        SignallingMessage::ConnectionInfo {
            connection_info: Some(info),
            status: None,
            system_id: Some(system_id),
        }
    }

    pub fn create_group<S: Into<String>>(group_name: S, system_id: u64) -> Self {
        SignallingMessage::CreateGroup {
            group_name: group_name.into(),
            system_id,
        }
    }

    pub fn subscribe<S: Into<String>>(group_name: S, system_id: u64) -> Self {
        SignallingMessage::Subscribe {
            group_name: group_name.into(),
            system_id,
        }
    }

    pub fn publish(group_id: u64, system_id: u64) -> Self {
        SignallingMessage::Publish {
            group_id,
            system_id,
        }
    }

    pub fn echo<V: Into<Value>>(data: V, system_id: u64) -> Self {
        SignallingMessage::EchoData {
            data: data.into(),
            ack: false,
            system_id: Some(system_id),
        }
    }

    /// Liveness probe answered by the server itself
    pub fn local_ping(system_id: u64) -> Self {
        SignallingMessage::LocalPing {
            ack: false,
            data: Value::Null,
            system_id: Some(system_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_outbound_messages_carry_command_and_system_id() {
        let msg = SignallingMessage::create_group("room", 9);
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json, json!({"command": "createGroup", "groupName": "room", "systemId": 9}));

        let info = ConnectionInfo {
            connection_name: "alpha".to_string(),
            instance_id: 3,
        };
        let json = serde_json::to_value(SignallingMessage::connection_info(info, 9)).unwrap();
        assert_eq!(json["command"], "connectionInfo");
        assert_eq!(json["connectionInfo"]["connectionName"], "alpha");
        assert_eq!(json["systemId"], 9);
        assert!(json.get("status").is_none());
    }

    #[test]
    fn test_parse_acks() {
        let msg = SignallingMessage::parse(r#"{"command":"createGroupAck","status":false}"#).unwrap();
        assert_eq!(
            msg,
            SignallingMessage::CreateGroupAck {
                status: false,
                group_name: None,
                group_id: None,
            }
        );

        let msg =
            SignallingMessage::parse(r#"{"command":"connectionInfo","status":true,"extra":1}"#)
                .unwrap();
        assert!(matches!(
            msg,
            SignallingMessage::ConnectionInfo {
                status: Some(true),
                ..
            }
        ));
    }

    #[test]
    fn test_parse_rejects_missing_or_unknown_command() {
        assert!(matches!(
            SignallingMessage::parse(r#"{"status":true}"#),
            Err(SignallingError::Malformed { .. })
        ));
        assert!(matches!(
            SignallingMessage::parse("not json"),
            Err(SignallingError::Malformed { .. })
        ));
        match SignallingMessage::parse(r#"{"command":"teleport"}"#) {
            Err(SignallingError::UnknownCommand(name)) => assert_eq!(name, "teleport"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_parse_rejects_wrong_field_types() {
        match SignallingMessage::parse(r#"{"command":"createGroupAck","status":"yes"}"#) {
            Err(SignallingError::Malformed { command, .. }) => assert_eq!(command, "createGroupAck"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_ping_reply_keeps_data() {
        let ping = SignallingMessage::parse(r#"{"command":"remotePing","ack":false,"data":"x1"}"#)
            .unwrap();
        let reply = ping.reply(5).unwrap();
        let json = serde_json::to_value(&reply).unwrap();
        assert_eq!(json, json!({"command": "remotePing", "ack": true, "data": "x1", "systemId": 5}));

        assert!(reply.reply(5).is_none());
        assert!(SignallingMessage::publish(1, 2).reply(5).is_none());
    }

    #[test]
    fn test_to_msg_uses_signalling_subsystem() {
        let msg = SignallingMessage::local_ping(1).to_msg().unwrap();
        assert_eq!(msg.subsystem, Subsystem::Signalling);
        let parsed = SignallingMessage::parse(&msg.payload).unwrap();
        assert_eq!(parsed.command_name(), "localPing");
    }
}
