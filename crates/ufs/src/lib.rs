//! UFS：实验室设备登记服务
//!
//! 管理机器、机架和资产的登记信息。资源按所在 zone 归入 `@internal` 项目下的
//! realm，读写都在该 realm 上做权限检查。List 支持 `key=v1|v2 & key2=v3`
//! 形式的过滤表达式。

pub mod entities;
pub mod error;
pub mod filter;
pub mod handlers;
pub mod names;
pub mod perms;
pub mod realm;
pub mod registry;
pub mod service;

pub use entities::{AssetEntity, MachineEntity, RackEntity, Resource};
pub use error::{UfsError, UfsResult};
pub use handlers::{UfsState, create_router, create_ufs_state};
pub use registry::{ListOptions, RealmScope, Registry};
pub use service::FleetService;
