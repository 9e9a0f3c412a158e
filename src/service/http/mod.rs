//! HTTP 业务服务
//!
//! 每个服务持有自己的配置和共享的数据存储句柄，在 `build_router` 时创建状态

mod inventory;
mod karte;
mod ufs;
mod weetbix;

pub use inventory::InventoryHttpService;
pub use karte::KarteHttpService;
pub use ufs::UfsHttpService;
pub use weetbix::WeetbixHttpService;
