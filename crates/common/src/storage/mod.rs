//! 数据存储模块
//!
//! 带二级索引和游标分页的文档存储，供各服务的实体映射层使用。
//!
//! # 设计
//!
//! - `DatastoreBackend` trait 定义原始实体的统一异步接口
//! - `StoreBackend` enum 封装不同的后端实现（SQLite、内存）
//! - `Datastore` 在后端之上提供类型化读写、分页和临时错误重试
//!
//! 单实体读写是原子的；`put_multi` / `delete_multi` 等批量操作逐个执行，
//! 中途失败会留下部分更新。

use std::path::Path;

pub mod backend;
pub mod config;
pub mod entity;
pub mod memory;
pub mod query;
pub mod sqlite;

use crate::error::{DatastoreError, DatastoreResult};
use crate::metrics::DATASTORE_OPERATIONS;
use crate::retry::{RetryPolicy, with_retry};

pub use backend::{DatastoreBackend, PutMode, RawEntity};
pub use config::{DatastoreBackendKind, DatastoreConfig};
pub use entity::{Entity, IndexEntry, IndexValue, base64_bytes};
pub use memory::MemoryBackend;
pub use query::{Cursor, Filter, FilterOp, Page, Query};
pub use sqlite::SqliteBackend;

/// 存储后端
#[derive(Clone, Debug)]
pub enum StoreBackend {
    /// 内存存储后端
    Memory(MemoryBackend),

    /// SQLite 存储后端
    Sqlite(Box<SqliteBackend>),
}

impl StoreBackend {
    async fn get(&self, kind: &str, id: &str) -> DatastoreResult<Option<RawEntity>> {
        match self {
            Self::Memory(b) => b.get(kind, id).await,
            Self::Sqlite(b) => b.get(kind, id).await,
        }
    }

    async fn put(&self, entity: RawEntity, mode: PutMode) -> DatastoreResult<()> {
        match self {
            Self::Memory(b) => b.put(entity, mode).await,
            Self::Sqlite(b) => b.put(entity, mode).await,
        }
    }

    async fn delete(&self, kind: &str, id: &str) -> DatastoreResult<bool> {
        match self {
            Self::Memory(b) => b.delete(kind, id).await,
            Self::Sqlite(b) => b.delete(kind, id).await,
        }
    }

    async fn query(&self, query: &Query) -> DatastoreResult<Vec<RawEntity>> {
        match self {
            Self::Memory(b) => b.query(query).await,
            Self::Sqlite(b) => b.query(query).await,
        }
    }

    async fn count(&self, query: &Query) -> DatastoreResult<u64> {
        match self {
            Self::Memory(b) => b.count(query).await,
            Self::Sqlite(b) => b.count(query).await,
        }
    }

    /// 获取后端类型名称
    pub fn backend_name(&self) -> &'static str {
        match self {
            Self::Memory(_) => "Memory",
            Self::Sqlite(_) => "SQLite",
        }
    }
}

/// 类型化数据存储
#[derive(Clone, Debug)]
pub struct Datastore {
    backend: StoreBackend,
    retry: RetryPolicy,
}

fn record(kind: &str, op: &str, ok: bool) {
    DATASTORE_OPERATIONS
        .with_label_values(&[kind, op, if ok { "ok" } else { "error" }])
        .inc();
}

fn check_id(kind: &str, id: &str) -> DatastoreResult<()> {
    if id.is_empty() {
        return Err(DatastoreError::InvalidArgument(format!(
            "{kind} id must not be empty"
        )));
    }
    Ok(())
}

impl Datastore {
    /// 从配置创建数据存储
    ///
    /// # Errors
    /// - SQLite 目录无法创建
    /// - 后端初始化失败
    pub async fn from_config(config: &DatastoreConfig) -> DatastoreResult<Self> {
        let store = match config.backend {
            DatastoreBackendKind::Memory => Self::memory(),
            DatastoreBackendKind::Sqlite => {
                std::fs::create_dir_all(&config.sqlite_path).map_err(|e| {
                    DatastoreError::Config(format!(
                        "Failed to create datastore directory {}: {e}",
                        config.sqlite_path.display()
                    ))
                })?;
                Self::sqlite(&config.sqlite_path).await?
            }
        };
        Ok(store.with_retry_policy(config.retry.clone()))
    }

    /// 内存数据存储
    pub fn memory() -> Self {
        Self {
            backend: StoreBackend::Memory(MemoryBackend::new()),
            retry: RetryPolicy::default(),
        }
    }

    /// SQLite 数据存储，`path` 为数据库目录
    pub async fn sqlite(path: &Path) -> DatastoreResult<Self> {
        let backend = SqliteBackend::new(path).await?;
        Ok(Self {
            backend: StoreBackend::Sqlite(Box::new(backend)),
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.backend_name()
    }

    fn encode<E: Entity>(entity: &E) -> DatastoreResult<RawEntity> {
        let id = entity.id();
        check_id(E::KIND, &id)?;
        Ok(RawEntity {
            kind: E::KIND.to_string(),
            id,
            body: serde_json::to_vec(entity)?,
            index: entity
                .index()
                .into_iter()
                .map(|entry| (entry.field.to_string(), entry.value.encode()))
                .collect(),
        })
    }

    fn decode<E: Entity>(raw: &RawEntity) -> DatastoreResult<E> {
        Ok(serde_json::from_slice(&raw.body)?)
    }

    /// 读取实体，不存在时返回 `NotFound`
    pub async fn get<E: Entity>(&self, id: &str) -> DatastoreResult<E> {
        self.try_get(id)
            .await?
            .ok_or_else(|| DatastoreError::not_found(E::KIND, id))
    }

    /// 读取实体，不存在时返回 `None`
    pub async fn try_get<E: Entity>(&self, id: &str) -> DatastoreResult<Option<E>> {
        check_id(E::KIND, id)?;
        let result = with_retry(&self.retry, || self.backend.get(E::KIND, id)).await;
        record(E::KIND, "get", result.is_ok());
        result?.as_ref().map(Self::decode).transpose()
    }

    /// 批量读取，结果顺序与 `ids` 一致
    pub async fn get_multi<E: Entity>(&self, ids: &[String]) -> DatastoreResult<Vec<Option<E>>> {
        let mut entities = Vec::with_capacity(ids.len());
        for id in ids {
            entities.push(self.try_get(id).await?);
        }
        Ok(entities)
    }

    pub async fn exists<E: Entity>(&self, id: &str) -> DatastoreResult<bool> {
        Ok(self.try_get::<E>(id).await?.is_some())
    }

    async fn put_with_mode<E: Entity>(&self, entity: &E, mode: PutMode, op: &str) -> DatastoreResult<()> {
        let raw = Self::encode(entity)?;
        let result = with_retry(&self.retry, || self.backend.put(raw.clone(), mode)).await;
        record(E::KIND, op, result.is_ok());
        result
    }

    /// 写入实体，存在则覆盖
    pub async fn put<E: Entity>(&self, entity: &E) -> DatastoreResult<()> {
        self.put_with_mode(entity, PutMode::Upsert, "put").await
    }

    /// 创建实体，已存在时返回 `AlreadyExists`
    pub async fn insert<E: Entity>(&self, entity: &E) -> DatastoreResult<()> {
        self.put_with_mode(entity, PutMode::Insert, "insert").await
    }

    /// 覆盖已有实体，不存在时返回 `NotFound`
    pub async fn update<E: Entity>(&self, entity: &E) -> DatastoreResult<()> {
        self.put_with_mode(entity, PutMode::Update, "update").await
    }

    /// 批量写入
    ///
    /// 不检查实体是否已存在，也不在事务中执行：中途失败会留下部分更新。
    pub async fn put_multi<E: Entity>(&self, entities: &[E]) -> DatastoreResult<()> {
        for entity in entities {
            self.put(entity).await?;
        }
        Ok(())
    }

    /// 删除实体，不存在时返回 `NotFound`
    pub async fn delete<E: Entity>(&self, id: &str) -> DatastoreResult<()> {
        check_id(E::KIND, id)?;
        let result = with_retry(&self.retry, || self.backend.delete(E::KIND, id)).await;
        record(E::KIND, "delete", result.is_ok());
        if result? {
            Ok(())
        } else {
            Err(DatastoreError::not_found(E::KIND, id))
        }
    }

    /// 批量删除，忽略不存在的 ID，返回实际删除的数量
    ///
    /// 非原子操作，中途失败时之前的删除不会回滚。
    pub async fn delete_multi<E: Entity>(&self, ids: &[String]) -> DatastoreResult<usize> {
        let mut deleted = 0;
        for id in ids {
            match self.delete::<E>(id).await {
                Ok(()) => deleted += 1,
                Err(DatastoreError::NotFound { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(deleted)
    }

    async fn run_raw(&self, query: &Query) -> DatastoreResult<Page<RawEntity>> {
        let limit = query.get_limit();
        if limit == Some(0) {
            return Ok(Page::empty());
        }

        // 多取一条用于判断是否还有下一页
        let probe = match limit {
            Some(n) => query.clone().limit(n + 1),
            None => query.clone(),
        };
        let result = with_retry(&self.retry, || self.backend.query(&probe)).await;
        record(query.kind(), "query", result.is_ok());
        let mut items = result?;

        let next_cursor = match limit {
            Some(n) if items.len() > n => {
                items.truncate(n);
                items
                    .last()
                    .map(|last| Cursor::new(query.kind(), last.id.clone()).encode())
            }
            _ => None,
        };

        Ok(Page { items, next_cursor })
    }

    /// 执行查询，返回一页实体
    pub async fn run_query<E: Entity>(&self, query: &Query) -> DatastoreResult<Page<E>> {
        let page = self.run_raw(query).await?;
        let items = page
            .items
            .iter()
            .map(Self::decode)
            .collect::<DatastoreResult<Vec<E>>>()?;
        Ok(Page {
            items,
            next_cursor: page.next_cursor,
        })
    }

    /// 执行仅返回 ID 的查询
    pub async fn run_keys_query(&self, query: &Query) -> DatastoreResult<Page<String>> {
        let page = self.run_raw(&query.clone().keys_only()).await?;
        Ok(page.map(|raw| raw.id))
    }

    /// 执行查询并取回全部结果（忽略 limit 和游标）
    pub async fn get_all<E: Entity>(&self, query: &Query) -> DatastoreResult<Vec<E>> {
        let mut all = Vec::new();
        let mut query = query.clone();
        loop {
            let page = self.run_query::<E>(&query.clone().limit(500)).await?;
            all.extend(page.items);
            match page.next_cursor {
                Some(token) => query = query.start(&token)?,
                None => return Ok(all),
            }
        }
    }

    /// 统计满足过滤条件的实体数量
    pub async fn count(&self, query: &Query) -> DatastoreResult<u64> {
        let result = with_retry(&self.retry, || self.backend.count(query)).await;
        record(query.kind(), "count", result.is_ok());
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use tempfile::tempdir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Widget {
        id: String,
        zone: String,
        tags: Vec<String>,
        weight: i64,
    }

    impl Entity for Widget {
        const KIND: &'static str = "Widget";

        fn id(&self) -> String {
            self.id.clone()
        }

        fn index(&self) -> Vec<IndexEntry> {
            let mut index = vec![
                IndexEntry::new("zone", &self.zone),
                IndexEntry::new("weight", self.weight),
            ];
            index.extend(IndexEntry::many("tags", &self.tags));
            index
        }
    }

    fn widget(id: &str, zone: &str, tags: &[&str], weight: i64) -> Widget {
        Widget {
            id: id.to_string(),
            zone: zone.to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            weight,
        }
    }

    async fn exercise(store: Datastore) {
        // insert / get
        store.insert(&widget("w1", "atl", &["a"], 10)).await.unwrap();
        let err = store.insert(&widget("w1", "atl", &[], 1)).await.unwrap_err();
        assert!(matches!(err, DatastoreError::AlreadyExists { .. }));
        assert_eq!(store.get::<Widget>("w1").await.unwrap().weight, 10);

        // update requires existence
        let err = store.update(&widget("missing", "atl", &[], 1)).await.unwrap_err();
        assert!(err.is_not_found());
        store.update(&widget("w1", "sfo", &["b"], 11)).await.unwrap();
        let w1 = store.get::<Widget>("w1").await.unwrap();
        assert_eq!(w1.zone, "sfo");

        // index entries are replaced on update
        let page = store
            .run_query::<Widget>(&Query::of::<Widget>().eq("zone", "atl"))
            .await
            .unwrap();
        assert!(page.items.is_empty());

        store
            .put_multi(&[
                widget("w2", "atl", &["a", "b"], -5),
                widget("w3", "atl", &["c"], 30),
                widget("w4", "sfo", &["a"], 40),
            ])
            .await
            .unwrap();

        // array field match-any
        let page = store
            .run_query::<Widget>(&Query::of::<Widget>().eq("tags", "a"))
            .await
            .unwrap();
        let ids: Vec<_> = page.items.iter().map(|w| w.id.as_str()).collect();
        assert_eq!(ids, vec!["w2", "w4"]);

        // range filter with negative numbers
        let page = store
            .run_query::<Widget>(
                &Query::of::<Widget>()
                    .filter("weight", FilterOp::Ge, -5i64)
                    .filter("weight", FilterOp::Lt, 30i64),
            )
            .await
            .unwrap();
        let ids: Vec<_> = page.items.iter().map(|w| w.id.as_str()).collect();
        assert_eq!(ids, vec!["w1", "w2"]);

        // IN filter
        let count = store
            .count(&Query::of::<Widget>().in_values("zone", ["atl", "sfo"]))
            .await
            .unwrap();
        assert_eq!(count, 4);

        // pagination
        let first = store
            .run_query::<Widget>(&Query::of::<Widget>().limit(3))
            .await
            .unwrap();
        assert_eq!(first.items.len(), 3);
        let token = first.next_cursor.clone().expect("more results");
        let second = store
            .run_query::<Widget>(&Query::of::<Widget>().start(&token).unwrap().limit(3))
            .await
            .unwrap();
        assert_eq!(second.items.len(), 1);
        assert_eq!(second.items[0].id, "w4");
        assert!(second.next_cursor.is_none());

        // keys-only
        let keys = store
            .run_keys_query(&Query::of::<Widget>().eq("zone", "sfo"))
            .await
            .unwrap();
        assert_eq!(keys.items, vec!["w1".to_string(), "w4".to_string()]);

        // get_multi keeps order and reports missing
        let found = store
            .get_multi::<Widget>(&["w3".to_string(), "nope".to_string()])
            .await
            .unwrap();
        assert!(found[0].is_some());
        assert!(found[1].is_none());

        // delete
        store.delete::<Widget>("w3").await.unwrap();
        assert!(store.delete::<Widget>("w3").await.unwrap_err().is_not_found());
        let deleted = store
            .delete_multi::<Widget>(&["w2".to_string(), "w3".to_string()])
            .await
            .unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(store.count(&Query::of::<Widget>()).await.unwrap(), 2);

        // empty id rejected
        assert!(matches!(
            store.get::<Widget>("").await,
            Err(DatastoreError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_memory_datastore() {
        let store = Datastore::memory();
        assert_eq!(store.backend_name(), "Memory");
        exercise(store).await;
    }

    #[tokio::test]
    async fn test_sqlite_datastore() {
        let temp_dir = tempdir().unwrap();
        let store = Datastore::sqlite(temp_dir.path()).await.unwrap();
        assert_eq!(store.backend_name(), "SQLite");
        exercise(store).await;
    }

    #[tokio::test]
    async fn test_from_config_creates_directory() {
        let temp_dir = tempdir().unwrap();
        let config = DatastoreConfig {
            backend: DatastoreBackendKind::Sqlite,
            sqlite_path: temp_dir.path().join("nested"),
            retry: RetryPolicy::none(),
        };
        let store = Datastore::from_config(&config).await.unwrap();
        assert_eq!(store.backend_name(), "SQLite");
        assert!(temp_dir.path().join("nested").join(sqlite::DB_FILE_NAME).exists());
    }

    #[tokio::test]
    async fn test_get_all_walks_pages() {
        let store = Datastore::memory();
        let widgets: Vec<_> = (0..1203)
            .map(|i| widget(&format!("w{i:05}"), "atl", &[], i))
            .collect();
        store.put_multi(&widgets).await.unwrap();
        let all = store
            .get_all::<Widget>(&Query::of::<Widget>().eq("zone", "atl"))
            .await
            .unwrap();
        assert_eq!(all.len(), 1203);
    }
}
