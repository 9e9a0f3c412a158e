//! 数据存储后端抽象接口
//!
//! 后端只处理已序列化的原始实体，类型化的读写由 [`super::Datastore`] 负责。

use async_trait::async_trait;

use super::query::Query;
use crate::error::DatastoreResult;

/// 已序列化的实体
#[derive(Debug, Clone, PartialEq)]
pub struct RawEntity {
    pub kind: String,
    pub id: String,
    /// JSON 编码的实体本体；keys-only 查询时为空
    pub body: Vec<u8>,
    /// `(字段名, 编码后的值)` 索引项
    pub index: Vec<(String, String)>,
}

/// 写入模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutMode {
    /// 存在则覆盖，不存在则创建
    Upsert,
    /// 仅当不存在时创建，否则 `AlreadyExists`
    Insert,
    /// 仅当存在时覆盖，否则 `NotFound`
    Update,
}

/// 数据存储后端
///
/// 单个实体的读写是原子的；批量操作由上层逐个调用，不保证原子性。
#[async_trait]
pub trait DatastoreBackend: Send + Sync {
    /// 初始化后端（建表、建索引等）
    async fn init(&self) -> DatastoreResult<()>;

    /// 读取单个实体
    async fn get(&self, kind: &str, id: &str) -> DatastoreResult<Option<RawEntity>>;

    /// 写入单个实体，连同其索引项一起替换
    async fn put(&self, entity: RawEntity, mode: PutMode) -> DatastoreResult<()>;

    /// 删除单个实体，返回实体是否存在
    async fn delete(&self, kind: &str, id: &str) -> DatastoreResult<bool>;

    /// 执行查询，按 ID 升序返回，最多 `limit` 条
    async fn query(&self, query: &Query) -> DatastoreResult<Vec<RawEntity>>;

    /// 统计满足过滤条件的实体数量（忽略游标与 limit）
    async fn count(&self, query: &Query) -> DatastoreResult<u64>;
}
