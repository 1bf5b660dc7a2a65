//
// vigil_comm.rs
//
// Copyright (C) 2025 Posit Software, PBC. All rights reserved.
//
//

//! Wire types for the remote-management check action. The transport
//! (management socket, comm channel, ...) belongs to the host; these types
//! only fix the request/reply shapes.

use serde::Deserialize;
use serde::Serialize;

/// Requests accepted by the watchdog from a remote manager.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "method", content = "params")]
pub enum VigilBackendRequest {
    /// Probe every monitored lock once and report the result.
    #[serde(rename = "check_freeze")]
    CheckFreeze(CheckFreezeParams),
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CheckFreezeParams {
    /// Opaque correlation identifier, echoed in the reply when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_id: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "method", content = "result")]
pub enum VigilBackendReply {
    #[serde(rename = "check_freeze_reply")]
    CheckFreezeReply(CheckFreezeReplyParams),
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CheckFreezeReplyParams {
    pub response: ResponseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_id: Option<String>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub enum ResponseStatus {
    Success,
    Fail,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_request_wire_format() {
        let request = VigilBackendRequest::CheckFreeze(CheckFreezeParams {
            action_id: Some("42".to_string()),
        });

        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({ "method": "check_freeze", "params": { "action_id": "42" } })
        );

        // The identifier is optional on the wire
        let request: VigilBackendRequest =
            serde_json::from_value(json!({ "method": "check_freeze", "params": {} })).unwrap();
        assert_eq!(
            request,
            VigilBackendRequest::CheckFreeze(CheckFreezeParams { action_id: None })
        );
    }

    #[test]
    fn test_reply_wire_format() {
        let reply = VigilBackendReply::CheckFreezeReply(CheckFreezeReplyParams {
            response: ResponseStatus::Success,
            action_id: None,
        });

        assert_eq!(
            serde_json::to_value(&reply).unwrap(),
            json!({ "method": "check_freeze_reply", "result": { "response": "Success" } })
        );
    }
}
