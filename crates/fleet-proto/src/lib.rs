//! fleetd Protocol Buffer Definitions
//!
//! This crate contains the protocol buffer messages for every fleetd service.
//! Messages derive `prost::Message` for the binary wire format and `serde`
//! for the proto3 JSON mapping used by the pRPC transport (camelCase field
//! names, RFC 3339 timestamps, comma-separated field masks, enums as numbers).
//!
//! # Modules
//!
//! - [`karte`]: Karte action / observation store
//! - [`weetbix`]: Weetbix clusters, rules, projects and test history
//! - [`ufs`]: Unified Fleet System machine / rack / asset registries
//! - [`inventory`]: lab inventory admin (DUTs, pools, drones)
//!
//! # Usage
//!
//! ```ignore
//! use fleet_proto::karte::{Action, CreateActionRequest};
//! use fleet_proto::time::{now, to_datetime};
//! ```

pub mod inventory;
pub mod karte;
pub mod serde_helpers;
pub mod time;
pub mod ufs;
pub mod weetbix;

pub use prost::Message;
pub use prost_types::{FieldMask, Timestamp};

/// 空响应
#[derive(Clone, PartialEq, ::prost::Message, ::serde::Serialize, ::serde::Deserialize)]
pub struct Empty {}
