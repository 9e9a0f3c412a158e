//! Lab Inventory：DUT 资源池与 drone 分配管理
//!
//! 实验室库存（DUT 与服务器）是一份整体读写的文档，保存在 [`InventoryStore`] 中；
//! DUT 健康状态单独保存在数据存储里，供资源池调整时选择健康的 DUT。

pub mod dutpool;
pub mod error;
pub mod handlers;
pub mod infrastructure;
pub mod service;
pub mod state;
pub mod store;

pub use error::{InventoryError, InventoryResult};
pub use handlers::{InventoryState, create_inventory_state, create_router};
pub use service::InventoryService;
pub use state::{DutStateEntity, DutStates};
pub use store::{FileStore, InventoryStore, MemoryStore, Snapshot, open_store};
