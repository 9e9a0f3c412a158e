//! fleetd 基础设施库
//!
//! 为 Karte、Weetbix、UFS、Inventory 等服务提供共用组件：配置、数据存储、
//! Realm 权限检查、pRPC 请求处理、分页、重试和监控指标。

pub mod config;
pub mod error;
pub mod metrics;
pub mod pagination;
pub mod prpc;
pub mod realm;
pub mod retry;
pub mod storage;

// Re-export commonly used types for convenience
pub use config::FleetConfig;
pub use error::{BaseError, ConfigError, DatastoreError, DatastoreResult, Result};
pub use prpc::{Caller, PrpcError, PrpcRequest, PrpcResult};
pub use realm::{Authorizer, RealmError, RealmSet};
pub use retry::{RetryPolicy, with_retry};
pub use storage::{Datastore, Entity, IndexEntry, IndexValue, Page, Query};
