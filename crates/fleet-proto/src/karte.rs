//! Karte messages (`karte` package)
//!
//! Actions are events performed on lab assets (repairs, audits, deploys);
//! observations are measurements attached to an action.

use prost_types::{FieldMask, Timestamp};
use serde::{Deserialize, Serialize};

/// Full pRPC service name
pub const SERVICE_NAME: &str = "karte.Karte";

/// Action outcome
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum ActionStatus {
    Unspecified = 0,
    Success = 1,
    Fail = 2,
    Skip = 3,
}

impl ActionStatus {
    pub fn as_str_name(&self) -> &'static str {
        match self {
            Self::Unspecified => "STATUS_UNSPECIFIED",
            Self::Success => "SUCCESS",
            Self::Fail => "FAIL",
            Self::Skip => "SKIP",
        }
    }

    pub fn from_str_name(value: &str) -> Option<Self> {
        match value {
            "STATUS_UNSPECIFIED" => Some(Self::Unspecified),
            "SUCCESS" => Some(Self::Success),
            "FAIL" => Some(Self::Fail),
            "SKIP" => Some(Self::Skip),
            _ => None,
        }
    }
}

/// Whether a failing action is allowed to fail its plan
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum AllowFail {
    Unspecified = 0,
    AllowFail = 1,
    NoAllowFail = 2,
}

impl AllowFail {
    pub fn as_str_name(&self) -> &'static str {
        match self {
            Self::Unspecified => "ALLOW_FAIL_UNSPECIFIED",
            Self::AllowFail => "ALLOW_FAIL",
            Self::NoAllowFail => "NO_ALLOW_FAIL",
        }
    }

    pub fn from_str_name(value: &str) -> Option<Self> {
        match value {
            "ALLOW_FAIL_UNSPECIFIED" => Some(Self::Unspecified),
            "ALLOW_FAIL" => Some(Self::AllowFail),
            "NO_ALLOW_FAIL" => Some(Self::NoAllowFail),
            _ => None,
        }
    }
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Action {
    /// Server-assigned, must be empty on create
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(string, tag = "2")]
    pub kind: String,
    #[prost(string, tag = "3")]
    pub swarming_task_id: String,
    #[prost(string, tag = "4")]
    pub buildbucket_id: String,
    #[prost(string, tag = "5")]
    pub asset_tag: String,
    #[prost(message, optional, tag = "6")]
    #[serde(with = "crate::serde_helpers::timestamp", skip_serializing_if = "Option::is_none")]
    pub start_time: Option<Timestamp>,
    #[prost(message, optional, tag = "7")]
    #[serde(with = "crate::serde_helpers::timestamp", skip_serializing_if = "Option::is_none")]
    pub stop_time: Option<Timestamp>,
    #[prost(message, optional, tag = "8")]
    #[serde(with = "crate::serde_helpers::timestamp", skip_serializing_if = "Option::is_none")]
    pub create_time: Option<Timestamp>,
    #[prost(enumeration = "ActionStatus", tag = "9")]
    pub status: i32,
    #[prost(string, tag = "10")]
    pub fail_reason: String,
    /// After this time the action is immutable and eligible for export
    #[prost(message, optional, tag = "11")]
    #[serde(with = "crate::serde_helpers::timestamp", skip_serializing_if = "Option::is_none")]
    pub seal_time: Option<Timestamp>,
    #[prost(string, tag = "12")]
    pub client_name: String,
    #[prost(string, tag = "13")]
    pub client_version: String,
    #[prost(string, tag = "14")]
    pub hostname: String,
    #[prost(string, tag = "15")]
    pub model: String,
    #[prost(string, tag = "16")]
    pub board: String,
    /// Name of the action that recovered this one
    #[prost(string, tag = "17")]
    pub recovered_by: String,
    #[prost(int32, tag = "18")]
    pub restarts: i32,
    #[prost(string, tag = "19")]
    pub plan_name: String,
    #[prost(enumeration = "AllowFail", tag = "20")]
    pub allow_fail: i32,
}

/// A measurement attached to an action. At most one value is set.
#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Observation {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(string, tag = "2")]
    pub action_name: String,
    #[prost(string, tag = "3")]
    pub metric_kind: String,
    #[prost(string, optional, tag = "4")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_string: Option<String>,
    #[prost(double, optional, tag = "5")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_number: Option<f64>,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateActionRequest {
    #[prost(message, optional, tag = "1")]
    pub action: Option<Action>,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UpdateActionRequest {
    #[prost(message, optional, tag = "1")]
    pub action: Option<Action>,
    #[prost(message, optional, tag = "2")]
    #[serde(with = "crate::serde_helpers::field_mask", skip_serializing_if = "Option::is_none")]
    pub update_mask: Option<FieldMask>,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateObservationRequest {
    #[prost(message, optional, tag = "1")]
    pub observation: Option<Observation>,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ListActionsRequest {
    #[prost(int32, tag = "1")]
    pub page_size: i32,
    #[prost(string, tag = "2")]
    pub page_token: String,
    /// e.g. `kind == "ssh-attempt" && status == SUCCESS`
    #[prost(string, tag = "3")]
    pub filter: String,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ListActionsResponse {
    #[prost(message, repeated, tag = "1")]
    pub actions: Vec<Action>,
    #[prost(string, tag = "2")]
    pub next_page_token: String,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ListObservationsRequest {
    #[prost(int32, tag = "1")]
    pub page_size: i32,
    #[prost(string, tag = "2")]
    pub page_token: String,
    #[prost(string, tag = "3")]
    pub filter: String,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ListObservationsResponse {
    #[prost(message, repeated, tag = "1")]
    pub observations: Vec<Observation>,
    #[prost(string, tag = "2")]
    pub next_page_token: String,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PersistActionRangeRequest {
    #[prost(message, optional, tag = "1")]
    #[serde(with = "crate::serde_helpers::timestamp", skip_serializing_if = "Option::is_none")]
    pub start_time: Option<Timestamp>,
    #[prost(message, optional, tag = "2")]
    #[serde(with = "crate::serde_helpers::timestamp", skip_serializing_if = "Option::is_none")]
    pub stop_time: Option<Timestamp>,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PersistActionRangeResponse {
    /// Number of action and observation rows written
    #[prost(int32, tag = "1")]
    pub created_records: i32,
    #[prost(bool, tag = "2")]
    pub succeeded: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_json_mapping() {
        let action = Action {
            kind: "ssh-attempt".to_string(),
            status: ActionStatus::Fail as i32,
            stop_time: Some(Timestamp {
                seconds: 1_600_000_000,
                nanos: 0,
            }),
            ..Default::default()
        };
        let json = serde_json::to_value(&action).unwrap();
        assert_eq!(json["kind"], "ssh-attempt");
        assert_eq!(json["status"], 2);
        assert_eq!(json["stopTime"], "2020-09-13T12:26:40Z");
        assert!(json.get("startTime").is_none());

        let back: Action = serde_json::from_value(json).unwrap();
        assert_eq!(back, action);
        assert_eq!(back.status(), ActionStatus::Fail);
    }

    #[test]
    fn test_update_mask_accepts_camel_case() {
        let req: UpdateActionRequest = serde_json::from_str(
            r#"{"action":{"name":"zzzz1"},"updateMask":"failReason,status"}"#,
        )
        .unwrap();
        assert_eq!(
            req.update_mask.unwrap().paths,
            vec!["fail_reason".to_string(), "status".to_string()]
        );
    }

    #[test]
    fn test_observation_binary_encoding() {
        use prost::Message;
        let obs = Observation {
            action_name: "zzzz1".to_string(),
            metric_kind: "battery".to_string(),
            value_number: Some(0.5),
            ..Default::default()
        };
        let bytes = obs.encode_to_vec();
        assert_eq!(Observation::decode(bytes.as_slice()).unwrap(), obs);
    }
}
