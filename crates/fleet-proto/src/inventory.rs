//! Lab inventory messages (`inventory` package)

use std::collections::BTreeMap;

use prost_types::Timestamp;
use serde::{Deserialize, Serialize};

pub const SERVICE_NAME: &str = "inventory.Inventory";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum Environment {
    Invalid = 0,
    Prod = 1,
    Staging = 2,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum ServerRole {
    Invalid = 0,
    SkylabDrone = 1,
    SkylabSuiteProxy = 2,
    Devserver = 3,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum ServerStatus {
    Invalid = 0,
    Primary = 1,
    Backup = 2,
    RepairRequired = 3,
}

/// Health state of a DUT as reported by repair and admin tasks
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum DutHealth {
    Unknown = 0,
    Ready = 1,
    NeedsRepair = 2,
    RepairFailed = 3,
    NeedsDeploy = 4,
    NeedsReplacement = 5,
}

impl DutHealth {
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Ready)
    }
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeviceUnderTest {
    #[prost(string, tag = "1")]
    pub id: String,
    #[prost(string, tag = "2")]
    pub hostname: String,
    #[prost(string, tag = "3")]
    pub model: String,
    #[prost(string, tag = "4")]
    pub board: String,
    /// Critical pools such as `DUT_POOL_CQ` or `DUT_POOL_SUITES`
    #[prost(string, repeated, tag = "5")]
    pub pools: Vec<String>,
    #[prost(enumeration = "Environment", tag = "6")]
    pub environment: i32,
    #[prost(btree_map = "string, string", tag = "7")]
    pub labels: BTreeMap<String, String>,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Server {
    #[prost(string, tag = "1")]
    pub hostname: String,
    #[prost(enumeration = "Environment", tag = "2")]
    pub environment: i32,
    #[prost(enumeration = "ServerRole", repeated, tag = "3")]
    pub roles: Vec<i32>,
    #[prost(enumeration = "ServerStatus", tag = "4")]
    pub status: i32,
    /// DUTs served by this drone
    #[prost(string, repeated, tag = "5")]
    pub dut_uids: Vec<String>,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Lab {
    #[prost(message, repeated, tag = "1")]
    pub duts: Vec<DeviceUnderTest>,
    #[prost(message, repeated, tag = "2")]
    pub servers: Vec<Server>,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DutState {
    #[prost(string, tag = "1")]
    pub dut_id: String,
    #[prost(enumeration = "DutHealth", tag = "2")]
    pub health: i32,
    #[prost(string, tag = "3")]
    pub reason: String,
    #[prost(message, optional, tag = "4")]
    #[serde(with = "crate::serde_helpers::timestamp", skip_serializing_if = "Option::is_none")]
    pub update_time: Option<Timestamp>,
}

/// Selects DUTs by any combination of fields; empty fields match everything
#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DutSelector {
    #[prost(string, tag = "1")]
    pub id: String,
    #[prost(string, tag = "2")]
    pub hostname: String,
    #[prost(string, tag = "3")]
    pub model: String,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PoolChange {
    #[prost(string, tag = "1")]
    pub dut_id: String,
    #[prost(string, tag = "2")]
    pub old_pool: String,
    #[prost(string, tag = "3")]
    pub new_pool: String,
}

// ---------------------------------------------------------------------------
// Pools
// ---------------------------------------------------------------------------

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResizePoolRequest {
    #[prost(message, optional, tag = "1")]
    pub dut_selector: Option<DutSelector>,
    #[prost(string, tag = "2")]
    pub target_pool: String,
    #[prost(int32, tag = "3")]
    pub target_pool_size: i32,
    #[prost(string, tag = "4")]
    pub spare_pool: String,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResizePoolResponse {
    /// Inventory revision after the commit, empty when nothing changed
    #[prost(string, tag = "1")]
    pub revision: String,
    #[prost(message, repeated, tag = "2")]
    pub changes: Vec<PoolChange>,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BalancePoolsRequest {
    /// Restrict to one model, empty balances every model
    #[prost(string, tag = "1")]
    pub model: String,
    #[prost(string, tag = "2")]
    pub target_pool: String,
    #[prost(string, tag = "3")]
    pub spare_pool: String,
    /// Compute changes without committing them
    #[prost(bool, tag = "4")]
    pub dry_run: bool,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BalancePoolsModelResult {
    #[prost(string, tag = "1")]
    pub model: String,
    #[prost(int32, tag = "2")]
    pub target_pool_unhealthy_before: i32,
    /// Unhealthy DUTs left in the target pool after balancing
    #[prost(int32, tag = "3")]
    pub remaining_unhealthy: i32,
    #[prost(message, repeated, tag = "4")]
    pub changes: Vec<PoolChange>,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BalancePoolsResponse {
    #[prost(message, repeated, tag = "1")]
    pub model_results: Vec<BalancePoolsModelResult>,
    #[prost(string, tag = "2")]
    pub revision: String,
}

// ---------------------------------------------------------------------------
// Drones
// ---------------------------------------------------------------------------

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DutAssignment {
    #[prost(string, tag = "1")]
    pub dut_id: String,
    /// Empty picks the least loaded drone in the DUT's environment
    #[prost(string, tag = "2")]
    pub drone_hostname: String,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AssignDutsToDronesRequest {
    #[prost(message, repeated, tag = "1")]
    pub assignments: Vec<DutAssignment>,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AssignDutsToDronesResponse {
    #[prost(message, repeated, tag = "1")]
    pub assigned: Vec<DutAssignment>,
    #[prost(string, tag = "2")]
    pub revision: String,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DutRemoval {
    #[prost(string, tag = "1")]
    pub dut_id: String,
    /// If set, the DUT must currently be assigned to this drone
    #[prost(string, tag = "2")]
    pub drone_hostname: String,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RemoveDutsFromDronesRequest {
    #[prost(message, repeated, tag = "1")]
    pub removals: Vec<DutRemoval>,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RemoveDutsFromDronesResponse {
    #[prost(message, repeated, tag = "1")]
    pub removed: Vec<DutRemoval>,
    #[prost(string, tag = "2")]
    pub revision: String,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ListServersRequest {
    #[prost(string, tag = "1")]
    pub hostname: String,
    #[prost(enumeration = "Environment", tag = "2")]
    pub environment: i32,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ListServersResponse {
    #[prost(message, repeated, tag = "1")]
    pub servers: Vec<Server>,
}

// ---------------------------------------------------------------------------
// DUTs
// ---------------------------------------------------------------------------

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GetDutInfoRequest {
    #[prost(string, tag = "1")]
    pub id: String,
    #[prost(string, tag = "2")]
    pub hostname: String,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GetDutInfoResponse {
    #[prost(message, optional, tag = "1")]
    pub dut: Option<DeviceUnderTest>,
    #[prost(message, optional, tag = "2")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<DutState>,
    /// Name of the drone serving the DUT, empty if unassigned
    #[prost(string, tag = "3")]
    pub drone: String,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ListDutsRequest {
    #[prost(string, tag = "1")]
    pub model: String,
    #[prost(string, tag = "2")]
    pub pool: String,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ListDutsResponse {
    #[prost(message, repeated, tag = "1")]
    pub duts: Vec<DeviceUnderTest>,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeleteDutsRequest {
    #[prost(string, repeated, tag = "1")]
    pub hostnames: Vec<String>,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeleteDutsResponse {
    #[prost(bool, tag = "1")]
    pub changed: bool,
    #[prost(string, repeated, tag = "2")]
    pub ids: Vec<String>,
    #[prost(string, tag = "3")]
    pub revision: String,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UpdateDutStateRequest {
    #[prost(message, optional, tag = "1")]
    pub state: Option<DutState>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lab_json() {
        let lab: Lab = serde_json::from_str(
            r#"{
                "duts": [{"id": "d1", "hostname": "host1", "model": "eve", "pools": ["DUT_POOL_CQ"], "environment": 1}],
                "servers": [{"hostname": "drone1", "environment": 1, "roles": [1], "dutUids": ["d1"]}]
            }"#,
        )
        .unwrap();
        assert_eq!(lab.duts[0].environment(), Environment::Prod);
        assert_eq!(
            lab.servers[0].roles().collect::<Vec<_>>(),
            vec![ServerRole::SkylabDrone]
        );
        assert_eq!(lab.servers[0].dut_uids, vec!["d1".to_string()]);
    }
}
