//! # fleetd
//!
//! 实验室设备管理与测试分析服务集合：Karte、Weetbix、UFS 与 Inventory，
//! 共用同一个数据存储，通过 pRPC over HTTP 对外提供服务。

pub mod service;

// Re-export commonly used types
pub use fleet_common::config::FleetConfig;
pub use service::{ServiceContainer, ServiceManager};
