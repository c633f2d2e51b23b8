//! Wire protocol for the dashboard command channel
//!
//! Every frame is a JSON object with a `cmd` tag and a `body` payload, in
//! both directions. Inbound parsing is tolerant: a frame that is not JSON
//! at all is carried through as a raw string, and a known tag with a body
//! that does not deserialize falls into the unrecognized arm.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Command tags understood by the dispatcher
pub mod tags {
    pub const ALL_UNIFIED_REQUESTS: &str = "allUnifiedRequests";
    pub const MSG: &str = "msg";
    pub const ALL_COLUMNS: &str = "allColumns";
    pub const DEL_COLUMN: &str = "delColumn";
    pub const USER_INFOS: &str = "userInfos";
    pub const TOKEN_INVALID: &str = "tokenInvalid";
    pub const NEW_TOKEN: &str = "newToken";
    pub const ERROR: &str = "error";
    pub const MOD_COLUMN: &str = "modColumn";
}

/// Catalog record: one provider endpoint and the services it exposes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderServices {
    pub endpoint: String,
    #[serde(rename = "hasToken")]
    pub has_token: bool,
    pub services: Vec<ServiceDescriptor>,
}

/// Server-shape service descriptor as listed in the catalog: composite id
/// plus the ordered argument names a subscription must fill in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    pub service: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(rename = "hasParser", default)]
    pub has_parser: bool,
}

/// Server-shape subscription request as stored in a column snapshot: the
/// argument list collapses to an unordered name -> value mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerUnifiedRequest {
    pub service: String,
    #[serde(default)]
    pub args: BTreeMap<String, String>,
}

/// One column as the server snapshots it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerColumn {
    pub title: String,
    #[serde(rename = "unifiedRequests", default)]
    pub unified_requests: Vec<ServerUnifiedRequest>,
}

/// Payload of a `msg` command
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MsgBody {
    pub column: String,
    pub msg: RawMessage,
}

/// A message as it arrives on the wire, before sanitizing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawMessage {
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub author: String,
    #[serde(rename = "authorAvatar", default)]
    pub author_avatar: String,
    pub message: String,
    #[serde(rename = "createdAt", deserialize_with = "millis_or_string")]
    pub created_at: i64,
}

/// Payload of a `userInfos` command
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserInfoBody {
    #[serde(rename = "socialType")]
    pub social_type: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub avatar: String,
}

/// Payload of `tokenInvalid` / `newToken` commands
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRef {
    #[serde(rename = "providerName")]
    pub provider_name: String,
    #[serde(default)]
    pub msg: String,
}

/// Payload of a server-reported `error` command
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub msg: String,
    #[serde(rename = "providerName", default)]
    pub provider_name: String,
}

/// Inbound tagged command, keyed by the `cmd` field
#[derive(Debug, Clone)]
pub enum ServerCommand {
    AllUnifiedRequests(Vec<ProviderServices>),
    Msg(MsgBody),
    AllColumns(Vec<ServerColumn>),
    /// `delColumn` acknowledgment, only recognized with body `"Ok"`
    DelColumnAck,
    UserInfos(UserInfoBody),
    TokenInvalid(ProviderRef),
    NewToken(ProviderRef),
    Error(ErrorBody),
    /// Echo of our own `modColumn`, ignored without logging
    ModColumnAck(Value),
    /// Any other tag, or a known tag whose body failed to deserialize
    Unimplemented(Value),
}

impl ServerCommand {
    /// Classify a parsed frame. Never fails: anything unrecognized becomes
    /// `Unimplemented` and is logged by the dispatcher.
    pub fn from_value(value: Value) -> Self {
        let Some(cmd) = value.get("cmd").and_then(Value::as_str) else {
            return ServerCommand::Unimplemented(value);
        };
        let body = value.get("body").cloned().unwrap_or(Value::Null);
        match cmd {
            tags::ALL_UNIFIED_REQUESTS => match serde_json::from_value(body) {
                Ok(records) => ServerCommand::AllUnifiedRequests(records),
                Err(_) => ServerCommand::Unimplemented(value),
            },
            tags::MSG => match serde_json::from_value(body) {
                Ok(msg) => ServerCommand::Msg(msg),
                Err(_) => ServerCommand::Unimplemented(value),
            },
            tags::ALL_COLUMNS => match serde_json::from_value(body) {
                Ok(columns) => ServerCommand::AllColumns(columns),
                Err(_) => ServerCommand::Unimplemented(value),
            },
            tags::DEL_COLUMN if body.as_str() == Some("Ok") => ServerCommand::DelColumnAck,
            tags::USER_INFOS => match serde_json::from_value(body) {
                Ok(info) => ServerCommand::UserInfos(info),
                Err(_) => ServerCommand::Unimplemented(value),
            },
            tags::TOKEN_INVALID => match serde_json::from_value(body) {
                Ok(provider) => ServerCommand::TokenInvalid(provider),
                Err(_) => ServerCommand::Unimplemented(value),
            },
            tags::NEW_TOKEN => match serde_json::from_value(body) {
                Ok(provider) => ServerCommand::NewToken(provider),
                Err(_) => ServerCommand::Unimplemented(value),
            },
            tags::ERROR => match serde_json::from_value(body) {
                Ok(error) => ServerCommand::Error(error),
                Err(_) => ServerCommand::Unimplemented(value),
            },
            tags::MOD_COLUMN => ServerCommand::ModColumnAck(body),
            _ => ServerCommand::Unimplemented(value),
        }
    }
}

/// One frame off the transport: a classified command, or the raw text when
/// the frame was not JSON (the fallback channel tolerates these).
#[derive(Debug, Clone)]
pub enum Inbound {
    Command(ServerCommand),
    Raw(String),
}

impl Inbound {
    pub fn parse(text: &str) -> Self {
        match serde_json::from_str::<Value>(text) {
            Ok(value) => Inbound::Command(ServerCommand::from_value(value)),
            Err(_) => Inbound::Raw(text.to_string()),
        }
    }
}

/// Outbound tagged command; serializes to the same `{cmd, body}` shape
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "cmd", content = "body")]
pub enum ClientCommand {
    #[serde(rename = "addColumn")]
    AddColumn(ColumnPayload),
    #[serde(rename = "modColumn")]
    ModColumn { title: String, column: ColumnPayload },
    #[serde(rename = "delColumn")]
    DelColumn { title: String },
}

/// Body of `addColumn` / `modColumn`
#[derive(Debug, Clone, Serialize)]
pub struct ColumnPayload {
    pub title: String,
    #[serde(rename = "unifiedRequests")]
    pub unified_requests: Vec<ServerUnifiedRequest>,
}

/// Timestamps arrive as a JSON number or as a decimal string, depending on
/// the producing service; accept both.
fn millis_or_string<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Millis {
        Number(i64),
        Text(String),
    }
    match Millis::deserialize(deserializer)? {
        Millis::Number(n) => Ok(n),
        Millis::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_msg_frame() {
        let frame = r#"{"cmd":"msg","body":{"column":"A","msg":{
            "from":"tw-42","author":"someone","authorAvatar":"",
            "message":"hello","createdAt":"1700000000000"}}}"#;
        match Inbound::parse(frame) {
            Inbound::Command(ServerCommand::Msg(body)) => {
                assert_eq!(body.column, "A");
                assert_eq!(body.msg.created_at, 1_700_000_000_000);
            }
            other => panic!("expected msg command, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_created_at_number() {
        let frame = r#"{"cmd":"msg","body":{"column":"A","msg":{
            "from":"f","author":"a","message":"m","createdAt":123}}}"#;
        match Inbound::parse(frame) {
            Inbound::Command(ServerCommand::Msg(body)) => {
                assert_eq!(body.msg.created_at, 123);
            }
            other => panic!("expected msg command, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_frame_passes_through_raw() {
        match Inbound::parse("not json at all") {
            Inbound::Raw(text) => assert_eq!(text, "not json at all"),
            other => panic!("expected raw frame, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_tag_is_unimplemented() {
        match Inbound::parse(r#"{"cmd":"somethingElse","body":1}"#) {
            Inbound::Command(ServerCommand::Unimplemented(value)) => {
                assert_eq!(value["cmd"], "somethingElse");
            }
            other => panic!("expected unimplemented, got {:?}", other),
        }
    }

    #[test]
    fn test_del_column_ack_requires_ok_body() {
        match Inbound::parse(r#"{"cmd":"delColumn","body":"Ok"}"#) {
            Inbound::Command(ServerCommand::DelColumnAck) => {}
            other => panic!("expected ack, got {:?}", other),
        }
        match Inbound::parse(r#"{"cmd":"delColumn","body":"Nope"}"#) {
            Inbound::Command(ServerCommand::Unimplemented(_)) => {}
            other => panic!("expected unimplemented, got {:?}", other),
        }
    }

    #[test]
    fn test_mod_column_echo_is_silent_variant() {
        match Inbound::parse(r#"{"cmd":"modColumn","body":"Ok"}"#) {
            Inbound::Command(ServerCommand::ModColumnAck(_)) => {}
            other => panic!("expected modColumn ack, got {:?}", other),
        }
    }

    #[test]
    fn test_outbound_wire_shape() {
        let command = ClientCommand::DelColumn {
            title: "News".to_string(),
        };
        let json: Value = serde_json::to_value(&command).unwrap();
        assert_eq!(json["cmd"], "delColumn");
        assert_eq!(json["body"]["title"], "News");
    }

    #[test]
    fn test_outbound_mod_column_carries_old_title() {
        let command = ClientCommand::ModColumn {
            title: "Old".to_string(),
            column: ColumnPayload {
                title: "New".to_string(),
                unified_requests: vec![],
            },
        };
        let json: Value = serde_json::to_value(&command).unwrap();
        assert_eq!(json["cmd"], "modColumn");
        assert_eq!(json["body"]["title"], "Old");
        assert_eq!(json["body"]["column"]["title"], "New");
        assert!(json["body"]["column"]["unifiedRequests"]
            .as_array()
            .unwrap()
            .is_empty());
    }
}
