//! Weetbix - 测试失败聚类与分析服务
//!
//! - 按测试 ID、失败原因以及用户编写的失败关联规则对测试失败聚类
//! - 管理失败关联规则（规则语言见 [`rules::lang`]）
//! - 提供项目配置与测试历史查询

pub mod clustering;
pub mod clusters;
pub mod error;
pub mod handlers;
pub mod ingest;
pub mod names;
pub mod perms;
pub mod projects;
pub mod rules;
pub mod service;
pub mod testhistory;

pub use clustering::{Algorithm, AlgorithmRegistry, Failure};
pub use error::{RuleError, WeetbixError, WeetbixResult};
pub use handlers::{WeetbixState, create_router, create_weetbix_state};
pub use ingest::{IngestedVerdict, Ingester};
pub use service::WeetbixService;
