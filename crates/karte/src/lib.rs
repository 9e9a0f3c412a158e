//! Karte - 实验室设备操作记录服务
//!
//! Karte 保存自动化工具对设备执行的操作（action）以及操作过程中采集的
//! 观测值（observation）：
//! 1. Action 创建后在封存时间之前可以按 update mask 修改
//! 2. 列表接口支持 `field op literal && ...` 形式的过滤表达式，结果按时间倒序
//! 3. 封存后的 action 与 observation 被导出到分析仓库

pub mod entities;
pub mod error;
pub mod filter;
pub mod handlers;
pub mod idgen;
pub mod persist;
pub mod query;
pub mod service;
pub mod sink;

pub use entities::{ActionEntity, ObservationEntity};
pub use error::{KarteError, KarteResult};
pub use handlers::{KarteState, create_karte_state, create_router};
pub use persist::persist_loop;
pub use service::KarteService;
pub use sink::{MemorySink, NdjsonSink, RowSink};
