// Control-plane wire model
//
// Every inter-node payload is a JSON dictionary whose `action` field selects
// the message kind; the remaining keys are the action's fields in camelCase.
// Unknown actions fail decoding and surface as an error reply, never a
// silent no-op.

use crate::replication::event::EventType;
use serde::{Deserialize, Serialize};

// Control-plane message bodies, tagged by `action`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action")]
pub enum SyncBody {
    #[serde(rename = "SERVER_PING", rename_all = "camelCase")]
    ServerPing { node_id: String },

    #[serde(rename = "SERVER_ANNOUNCEMENT", rename_all = "camelCase")]
    ServerAnnouncement {
        node_id: String,
        address: String,
        service_port: u16,
        sync_address: String,
    },

    #[serde(rename = "IS_COORDINATOR_REQUEST", rename_all = "camelCase")]
    IsCoordinatorRequest { node_id: String },

    #[serde(rename = "COORDINATOR_PING", rename_all = "camelCase")]
    CoordinatorPing { node_id: String },

    #[serde(rename = "COORDINATOR_HEARTBEAT", rename_all = "camelCase")]
    CoordinatorHeartbeat { coordinator_id: String },

    #[serde(rename = "ELECTION", rename_all = "camelCase")]
    Election { from_server: String },

    #[serde(rename = "ELECTION_RESPONSE", rename_all = "camelCase")]
    ElectionResponse { from_server: String },

    #[serde(rename = "COORDINATOR", rename_all = "camelCase")]
    Coordinator { coordinator_id: String },

    #[serde(rename = "TIME_REQUEST", rename_all = "camelCase")]
    TimeRequest { coordinator: String, timestamp: i64 },

    #[serde(rename = "TIME_RESPONSE", rename_all = "camelCase")]
    TimeResponse {
        server_id: String,
        request_timestamp: i64,
        response_timestamp: i64,
        time_difference: i64,
    },

    #[serde(rename = "CLOCK_ADJUSTMENT", rename_all = "camelCase")]
    ClockAdjustment { coordinator: String, adjustment: i64 },

    #[serde(rename = "DATA_REPLICATION", rename_all = "camelCase")]
    DataReplication {
        source_server_id: String,
        event_type: EventType,
        entity_id: String,
        timestamp: i64,
        data: serde_json::Value,
    },
}

impl SyncBody {
    pub fn action_name(&self) -> &'static str {
        match self {
            SyncBody::ServerPing { .. } => "SERVER_PING",
            SyncBody::ServerAnnouncement { .. } => "SERVER_ANNOUNCEMENT",
            SyncBody::IsCoordinatorRequest { .. } => "IS_COORDINATOR_REQUEST",
            SyncBody::CoordinatorPing { .. } => "COORDINATOR_PING",
            SyncBody::CoordinatorHeartbeat { .. } => "COORDINATOR_HEARTBEAT",
            SyncBody::Election { .. } => "ELECTION",
            SyncBody::ElectionResponse { .. } => "ELECTION_RESPONSE",
            SyncBody::Coordinator { .. } => "COORDINATOR",
            SyncBody::TimeRequest { .. } => "TIME_REQUEST",
            SyncBody::TimeResponse { .. } => "TIME_RESPONSE",
            SyncBody::ClockAdjustment { .. } => "CLOCK_ADJUSTMENT",
            SyncBody::DataReplication { .. } => "DATA_REPLICATION",
        }
    }
}

// Envelope: the body plus the sender's logical clock value
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncEnvelope {
    #[serde(rename = "logicalTime", skip_serializing_if = "Option::is_none")]
    pub logical_time: Option<u64>,
    #[serde(flatten)]
    pub body: SyncBody,
}

impl SyncEnvelope {
    pub fn new(logical_time: u64, body: SyncBody) -> Self {
        Self {
            logical_time: Some(logical_time),
            body,
        }
    }
}

// Reply dictionary for control-plane calls. Field presence depends on the
// request; `success` is always carried.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncReply {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_coordinator: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logical_time: Option<u64>,
}

impl SyncReply {
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Self::default()
        }
    }

    pub fn ok_from(node_id: impl Into<String>) -> Self {
        Self {
            success: true,
            node_id: Some(node_id.into()),
            ..Self::default()
        }
    }

    pub fn ping_ack(node_id: impl Into<String>) -> Self {
        Self {
            success: true,
            node_id: Some(node_id.into()),
            is_active: Some(true),
            ..Self::default()
        }
    }

    pub fn coordinator_status(node_id: impl Into<String>, is_coordinator: bool) -> Self {
        Self {
            success: true,
            node_id: Some(node_id.into()),
            is_coordinator: Some(is_coordinator),
            ..Self::default()
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_carries_action_and_logical_time() {
        let envelope = SyncEnvelope::new(
            7,
            SyncBody::ServerPing {
                node_id: "b1".into(),
            },
        );
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["action"], "SERVER_PING");
        assert_eq!(json["logicalTime"], 7);
        assert_eq!(json["nodeId"], "b1");
    }

    #[test]
    fn test_announcement_field_names() {
        let envelope = SyncEnvelope::new(
            1,
            SyncBody::ServerAnnouncement {
                node_id: "b1".into(),
                address: "127.0.0.1".into(),
                service_port: 5555,
                sync_address: "tcp://127.0.0.1:6000".into(),
            },
        );
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["action"], "SERVER_ANNOUNCEMENT");
        assert_eq!(json["servicePort"], 5555);
        assert_eq!(json["syncAddress"], "tcp://127.0.0.1:6000");
    }

    #[test]
    fn test_unknown_action_is_a_decode_error() {
        let raw = r#"{"action":"SELF_DESTRUCT","logicalTime":3}"#;
        assert!(serde_json::from_str::<SyncEnvelope>(raw).is_err());
    }

    #[test]
    fn test_decode_without_logical_time() {
        let raw = r#"{"action":"COORDINATOR","coordinatorId":"b3"}"#;
        let envelope: SyncEnvelope = serde_json::from_str(raw).unwrap();
        assert!(envelope.logical_time.is_none());
        match envelope.body {
            SyncBody::Coordinator { coordinator_id } => assert_eq!(coordinator_id, "b3"),
            other => panic!("unexpected body {:?}", other),
        }
    }

    #[test]
    fn test_reply_shape() {
        let reply = SyncReply::ping_ack("b2");
        let json = serde_json::to_value(&reply).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["nodeId"], "b2");
        assert_eq!(json["isActive"], true);
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_data_replication_round_trip() {
        let raw = r#"{
            "action": "DATA_REPLICATION",
            "logicalTime": 42,
            "sourceServerId": "b1",
            "eventType": "POST_CREATED",
            "entityId": "p-1",
            "timestamp": 1700000000000,
            "data": {"postId": "p-1", "username": "alice"}
        }"#;
        let envelope: SyncEnvelope = serde_json::from_str(raw).unwrap();
        match &envelope.body {
            SyncBody::DataReplication {
                event_type,
                entity_id,
                ..
            } => {
                assert_eq!(*event_type, EventType::PostCreated);
                assert_eq!(entity_id, "p-1");
            }
            other => panic!("unexpected body {:?}", other),
        }
    }
}
