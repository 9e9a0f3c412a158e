//! 内存存储后端
//!
//! 用于测试与单机开发环境，数据不落盘。

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use super::backend::{DatastoreBackend, PutMode, RawEntity};
use super::query::Query;
use crate::error::{DatastoreError, DatastoreResult};

type KindTable = BTreeMap<String, RawEntity>;

/// 内存存储后端
///
/// 按 kind 分表，每张表是以 ID 排序的 BTreeMap。克隆共享同一份数据。
#[derive(Clone, Default)]
pub struct MemoryBackend {
    tables: Arc<RwLock<BTreeMap<String, KindTable>>>,
}

impl std::fmt::Debug for MemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBackend").finish_non_exhaustive()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DatastoreBackend for MemoryBackend {
    async fn init(&self) -> DatastoreResult<()> {
        debug!("Memory datastore initialized");
        Ok(())
    }

    async fn get(&self, kind: &str, id: &str) -> DatastoreResult<Option<RawEntity>> {
        let tables = self.tables.read().await;
        Ok(tables.get(kind).and_then(|t| t.get(id)).cloned())
    }

    async fn put(&self, entity: RawEntity, mode: PutMode) -> DatastoreResult<()> {
        let mut tables = self.tables.write().await;
        let table = tables.entry(entity.kind.clone()).or_default();
        let exists = table.contains_key(&entity.id);
        match mode {
            PutMode::Insert if exists => {
                return Err(DatastoreError::already_exists(&entity.kind, &entity.id));
            }
            PutMode::Update if !exists => {
                return Err(DatastoreError::not_found(&entity.kind, &entity.id));
            }
            _ => {}
        }
        table.insert(entity.id.clone(), entity);
        Ok(())
    }

    async fn delete(&self, kind: &str, id: &str) -> DatastoreResult<bool> {
        let mut tables = self.tables.write().await;
        Ok(tables
            .get_mut(kind)
            .is_some_and(|t| t.remove(id).is_some()))
    }

    async fn query(&self, query: &Query) -> DatastoreResult<Vec<RawEntity>> {
        let tables = self.tables.read().await;
        let Some(table) = tables.get(query.kind()) else {
            return Ok(Vec::new());
        };

        let iter = table
            .iter()
            .filter(|(id, _)| query.after_id().is_none_or(|after| id.as_str() > after))
            .filter(|(_, entity)| query.matches_index(&entity.index))
            .map(|(_, entity)| {
                if query.is_keys_only() {
                    RawEntity {
                        body: Vec::new(),
                        ..entity.clone()
                    }
                } else {
                    entity.clone()
                }
            });

        Ok(match query.get_limit() {
            Some(limit) => iter.take(limit).collect(),
            None => iter.collect(),
        })
    }

    async fn count(&self, query: &Query) -> DatastoreResult<u64> {
        let tables = self.tables.read().await;
        Ok(tables.get(query.kind()).map_or(0, |table| {
            table
                .values()
                .filter(|entity| query.matches_index(&entity.index))
                .count() as u64
        }))
    }
}
