//! Unified Fleet System messages (`ufs` package)

use prost_types::{FieldMask, Timestamp};
use serde::{Deserialize, Serialize};

pub const SERVICE_NAME: &str = "ufs.Fleet";

/// Physical location zone
///
/// ChromeOS lab zones and browser lab zones map to different realms.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum Zone {
    Unspecified = 0,
    Atl97 = 1,
    Iad97 = 2,
    Mtv96 = 3,
    Mtv97 = 4,
    Sfo36Browser = 5,
    Chromeos1 = 10,
    Chromeos2 = 11,
    Chromeos3 = 12,
    Chromeos4 = 13,
    Chromeos5 = 14,
    Chromeos6 = 15,
    Chromeos7 = 16,
    Chromeos15 = 17,
    Sfo36Os = 18,
    Satlab = 19,
}

impl Zone {
    pub fn as_str_name(&self) -> &'static str {
        match self {
            Self::Unspecified => "ZONE_UNSPECIFIED",
            Self::Atl97 => "ZONE_ATL97",
            Self::Iad97 => "ZONE_IAD97",
            Self::Mtv96 => "ZONE_MTV96",
            Self::Mtv97 => "ZONE_MTV97",
            Self::Sfo36Browser => "ZONE_SFO36_BROWSER",
            Self::Chromeos1 => "ZONE_CHROMEOS1",
            Self::Chromeos2 => "ZONE_CHROMEOS2",
            Self::Chromeos3 => "ZONE_CHROMEOS3",
            Self::Chromeos4 => "ZONE_CHROMEOS4",
            Self::Chromeos5 => "ZONE_CHROMEOS5",
            Self::Chromeos6 => "ZONE_CHROMEOS6",
            Self::Chromeos7 => "ZONE_CHROMEOS7",
            Self::Chromeos15 => "ZONE_CHROMEOS15",
            Self::Sfo36Os => "ZONE_SFO36_OS",
            Self::Satlab => "ZONE_SATLAB",
        }
    }

    pub fn from_str_name(value: &str) -> Option<Self> {
        ALL_ZONES.iter().copied().find(|z| z.as_str_name() == value)
    }
}

pub const ALL_ZONES: [Zone; 16] = [
    Zone::Unspecified,
    Zone::Atl97,
    Zone::Iad97,
    Zone::Mtv96,
    Zone::Mtv97,
    Zone::Sfo36Browser,
    Zone::Chromeos1,
    Zone::Chromeos2,
    Zone::Chromeos3,
    Zone::Chromeos4,
    Zone::Chromeos5,
    Zone::Chromeos6,
    Zone::Chromeos7,
    Zone::Chromeos15,
    Zone::Sfo36Os,
    Zone::Satlab,
];

/// Resource lifecycle state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum State {
    Unspecified = 0,
    Registered = 1,
    DeployedPreServing = 2,
    Serving = 3,
    NeedsRepair = 4,
    Disabled = 5,
    Decommissioned = 6,
}

impl State {
    pub fn as_str_name(&self) -> &'static str {
        match self {
            Self::Unspecified => "STATE_UNSPECIFIED",
            Self::Registered => "STATE_REGISTERED",
            Self::DeployedPreServing => "STATE_DEPLOYED_PRE_SERVING",
            Self::Serving => "STATE_SERVING",
            Self::NeedsRepair => "STATE_NEEDS_REPAIR",
            Self::Disabled => "STATE_DISABLED",
            Self::Decommissioned => "STATE_DECOMMISSIONED",
        }
    }

    pub fn from_str_name(value: &str) -> Option<Self> {
        [
            Self::Unspecified,
            Self::Registered,
            Self::DeployedPreServing,
            Self::Serving,
            Self::NeedsRepair,
            Self::Disabled,
            Self::Decommissioned,
        ]
        .into_iter()
        .find(|s| s.as_str_name() == value)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum AssetType {
    Undefined = 0,
    Dut = 1,
    Servo = 2,
    Labstation = 3,
}

impl AssetType {
    pub fn as_str_name(&self) -> &'static str {
        match self {
            Self::Undefined => "UNDEFINED",
            Self::Dut => "DUT",
            Self::Servo => "SERVO",
            Self::Labstation => "LABSTATION",
        }
    }

    pub fn from_str_name(value: &str) -> Option<Self> {
        [Self::Undefined, Self::Dut, Self::Servo, Self::Labstation]
            .into_iter()
            .find(|t| t.as_str_name() == value)
    }
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Location {
    #[prost(enumeration = "Zone", tag = "1")]
    pub zone: i32,
    /// Rack id the resource lives in
    #[prost(string, tag = "2")]
    pub rack: String,
    #[prost(string, tag = "3")]
    pub rack_number: String,
    #[prost(string, tag = "4")]
    pub shelf: String,
    #[prost(string, tag = "5")]
    pub position: String,
    #[prost(string, tag = "6")]
    pub aisle: String,
    #[prost(string, tag = "7")]
    pub row: String,
    #[prost(string, tag = "8")]
    pub barcode_name: String,
}

/// Ownership data is maintained by a separate sync job and is never
/// overwritten by regular machine updates.
#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OwnershipData {
    #[prost(string, tag = "1")]
    pub pool_name: String,
    #[prost(string, tag = "2")]
    pub swarming_instance: String,
    #[prost(string, tag = "3")]
    pub customer: String,
    #[prost(string, tag = "4")]
    pub security_level: String,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Machine {
    /// `machines/{id}`
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(string, tag = "2")]
    pub serial_number: String,
    #[prost(message, optional, tag = "3")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    /// Output only, derived from the zone
    #[prost(string, tag = "4")]
    pub realm: String,
    #[prost(string, repeated, tag = "5")]
    pub tags: Vec<String>,
    #[prost(string, tag = "6")]
    pub device_type: String,
    #[prost(string, tag = "7")]
    pub model: String,
    #[prost(string, tag = "8")]
    pub board: String,
    #[prost(enumeration = "State", tag = "9")]
    pub resource_state: i32,
    #[prost(message, optional, tag = "10")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ownership: Option<OwnershipData>,
    #[prost(message, optional, tag = "11")]
    #[serde(with = "crate::serde_helpers::timestamp", skip_serializing_if = "Option::is_none")]
    pub update_time: Option<Timestamp>,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Rack {
    /// `racks/{id}`
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(message, optional, tag = "2")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    #[prost(string, tag = "3")]
    pub realm: String,
    #[prost(string, repeated, tag = "4")]
    pub tags: Vec<String>,
    #[prost(int32, tag = "5")]
    pub capacity_ru: i32,
    #[prost(string, tag = "6")]
    pub description: String,
    #[prost(enumeration = "State", tag = "7")]
    pub resource_state: i32,
    #[prost(message, optional, tag = "8")]
    #[serde(with = "crate::serde_helpers::timestamp", skip_serializing_if = "Option::is_none")]
    pub update_time: Option<Timestamp>,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AssetInfo {
    #[prost(string, tag = "1")]
    pub asset_tag: String,
    #[prost(string, tag = "2")]
    pub serial_number: String,
    #[prost(string, tag = "3")]
    pub model: String,
    #[prost(string, tag = "4")]
    pub board: String,
    #[prost(string, tag = "5")]
    pub sku: String,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Asset {
    /// `assets/{id}`
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(enumeration = "AssetType", tag = "2")]
    pub r#type: i32,
    #[prost(string, tag = "3")]
    pub model: String,
    #[prost(message, optional, tag = "4")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    #[prost(message, optional, tag = "5")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<AssetInfo>,
    #[prost(string, tag = "6")]
    pub realm: String,
    #[prost(string, repeated, tag = "7")]
    pub tags: Vec<String>,
    #[prost(message, optional, tag = "8")]
    #[serde(with = "crate::serde_helpers::timestamp", skip_serializing_if = "Option::is_none")]
    pub update_time: Option<Timestamp>,
}

// ---------------------------------------------------------------------------
// Machine RPCs
// ---------------------------------------------------------------------------

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateMachineRequest {
    #[prost(message, optional, tag = "1")]
    pub machine: Option<Machine>,
    /// Overrides the id in `machine.name` when set
    #[prost(string, tag = "2")]
    pub machine_id: String,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UpdateMachineRequest {
    #[prost(message, optional, tag = "1")]
    pub machine: Option<Machine>,
    #[prost(message, optional, tag = "2")]
    #[serde(with = "crate::serde_helpers::field_mask", skip_serializing_if = "Option::is_none")]
    pub update_mask: Option<FieldMask>,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UpdateMachineOwnershipRequest {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(message, optional, tag = "2")]
    pub ownership: Option<OwnershipData>,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ListMachinesResponse {
    #[prost(message, repeated, tag = "1")]
    pub machines: Vec<Machine>,
    #[prost(string, tag = "2")]
    pub next_page_token: String,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BatchGetMachinesResponse {
    #[prost(message, repeated, tag = "1")]
    pub machines: Vec<Machine>,
}

// ---------------------------------------------------------------------------
// Rack RPCs
// ---------------------------------------------------------------------------

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateRackRequest {
    #[prost(message, optional, tag = "1")]
    pub rack: Option<Rack>,
    #[prost(string, tag = "2")]
    pub rack_id: String,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UpdateRackRequest {
    #[prost(message, optional, tag = "1")]
    pub rack: Option<Rack>,
    #[prost(message, optional, tag = "2")]
    #[serde(with = "crate::serde_helpers::field_mask", skip_serializing_if = "Option::is_none")]
    pub update_mask: Option<FieldMask>,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ListRacksResponse {
    #[prost(message, repeated, tag = "1")]
    pub racks: Vec<Rack>,
    #[prost(string, tag = "2")]
    pub next_page_token: String,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BatchGetRacksResponse {
    #[prost(message, repeated, tag = "1")]
    pub racks: Vec<Rack>,
}

// ---------------------------------------------------------------------------
// Asset RPCs
// ---------------------------------------------------------------------------

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateAssetRequest {
    #[prost(message, optional, tag = "1")]
    pub asset: Option<Asset>,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UpdateAssetRequest {
    #[prost(message, optional, tag = "1")]
    pub asset: Option<Asset>,
    #[prost(message, optional, tag = "2")]
    #[serde(with = "crate::serde_helpers::field_mask", skip_serializing_if = "Option::is_none")]
    pub update_mask: Option<FieldMask>,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ListAssetsResponse {
    #[prost(message, repeated, tag = "1")]
    pub assets: Vec<Asset>,
    #[prost(string, tag = "2")]
    pub next_page_token: String,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BatchGetAssetsResponse {
    #[prost(message, repeated, tag = "1")]
    pub assets: Vec<Asset>,
}

// ---------------------------------------------------------------------------
// Shared request shapes
// ---------------------------------------------------------------------------

/// Get / Delete by resource name
#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NameRequest {
    #[prost(string, tag = "1")]
    pub name: String,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BatchGetRequest {
    #[prost(string, repeated, tag = "1")]
    pub names: Vec<String>,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ListRequest {
    #[prost(int32, tag = "1")]
    pub page_size: i32,
    #[prost(string, tag = "2")]
    pub page_token: String,
    /// e.g. `zone=ZONE_ATL97 & tags=a|b`
    #[prost(string, tag = "3")]
    pub filter: String,
    /// Only resource names are returned
    #[prost(bool, tag = "4")]
    pub keys_only: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enum_names() {
        assert_eq!(Zone::from_str_name("ZONE_SATLAB"), Some(Zone::Satlab));
        assert_eq!(Zone::from_str_name("ZONE_MARS"), None);
        assert_eq!(State::Serving.as_str_name(), "STATE_SERVING");
        assert_eq!(AssetType::from_str_name("SERVO"), Some(AssetType::Servo));
    }

    #[test]
    fn test_asset_type_field_json() {
        let asset: Asset = serde_json::from_str(r#"{"name":"assets/a1","type":1}"#).unwrap();
        assert_eq!(asset.r#type(), AssetType::Dut);
        let json = serde_json::to_value(&asset).unwrap();
        assert_eq!(json["type"], 1);
    }
}
