//! 资源登记的通用读写
//!
//! 单个实体的读写是原子的；`batch_update` 逐个写入，不检查实体是否存在，
//! 中途失败会留下部分更新。

use std::marker::PhantomData;

use fleet_common::{Datastore, DatastoreError, Page, Query};
use tracing::{debug, info};

use crate::entities::Resource;
use crate::error::{UfsError, UfsResult};
use crate::filter::parse_filter;

/// 按 realm 限定 List 结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RealmScope {
    All,
    Only(Vec<String>),
}

/// List 参数
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    pub page_size: usize,
    pub page_token: String,
    pub filter: String,
}

#[derive(Debug, Clone)]
pub struct Registry<R> {
    store: Datastore,
    _kind: PhantomData<fn() -> R>,
}

impl<R: Resource> Registry<R> {
    pub fn new(store: Datastore) -> Self {
        Self {
            store,
            _kind: PhantomData,
        }
    }

    fn map_error(err: DatastoreError, id: &str) -> UfsError {
        match err {
            DatastoreError::NotFound { .. } => UfsError::NotFound {
                kind: R::KIND,
                id: id.to_string(),
            },
            DatastoreError::AlreadyExists { .. } => UfsError::AlreadyExists {
                kind: R::KIND,
                id: id.to_string(),
            },
            other => other.into(),
        }
    }

    pub async fn create(&self, entity: &R) -> UfsResult<()> {
        let id = entity.id();
        self.store
            .insert(entity)
            .await
            .map_err(|e| Self::map_error(e, &id))?;
        info!(kind = R::KIND, id = %id, realm = entity.realm(), "resource created");
        Ok(())
    }

    pub async fn update(&self, entity: &R) -> UfsResult<()> {
        let id = entity.id();
        self.store
            .update(entity)
            .await
            .map_err(|e| Self::map_error(e, &id))?;
        debug!(kind = R::KIND, id = %id, "resource updated");
        Ok(())
    }

    pub async fn get(&self, id: &str) -> UfsResult<R> {
        self.store.get(id).await.map_err(|e| Self::map_error(e, id))
    }

    /// 全部存在时按请求顺序返回，任一不存在返回 `NotFound`
    pub async fn batch_get(&self, ids: &[String]) -> UfsResult<Vec<R>> {
        let found = self.store.get_multi::<R>(ids).await?;
        ids.iter()
            .zip(found)
            .map(|(id, entity)| {
                entity.ok_or_else(|| UfsError::NotFound {
                    kind: R::KIND,
                    id: id.clone(),
                })
            })
            .collect()
    }

    pub async fn delete(&self, id: &str) -> UfsResult<()> {
        self.store
            .delete::<R>(id)
            .await
            .map_err(|e| Self::map_error(e, id))?;
        info!(kind = R::KIND, id, "resource deleted");
        Ok(())
    }

    /// 批量写入（创建或覆盖），非原子
    pub async fn batch_update(&self, entities: &[R]) -> UfsResult<()> {
        self.store.put_multi(entities).await?;
        info!(kind = R::KIND, count = entities.len(), "resources batch updated");
        Ok(())
    }

    fn list_query(&self, opts: &ListOptions, scope: &RealmScope) -> UfsResult<Option<Query>> {
        let mut query = Query::of::<R>();
        for condition in parse_filter(&opts.filter, R::FILTER_KEYS)? {
            query = match condition.values.as_slice() {
                [single] => query.eq(condition.field, single.as_str()),
                values => query.in_values(condition.field, values.iter().map(String::as_str)),
            };
        }
        if let RealmScope::Only(realms) = scope {
            if realms.is_empty() {
                return Ok(None);
            }
            query = query.in_values("realm", realms.iter().map(String::as_str));
        }
        Ok(Some(query.start(&opts.page_token)?.limit(opts.page_size)))
    }

    /// 一页实体，按 ID 排序
    pub async fn list(&self, opts: &ListOptions, scope: &RealmScope) -> UfsResult<Page<R>> {
        match self.list_query(opts, scope)? {
            Some(query) => Ok(self.store.run_query(&query).await?),
            None => Ok(Page::empty()),
        }
    }

    /// 只返回实体 ID
    pub async fn list_keys(&self, opts: &ListOptions, scope: &RealmScope) -> UfsResult<Page<String>> {
        match self.list_query(opts, scope)? {
            Some(query) => Ok(self.store.run_keys_query(&query.keys_only()).await?),
            None => Ok(Page::empty()),
        }
    }

    /// 按单个索引字段查询全部匹配的实体
    pub async fn query_by_property(&self, field: &str, value: &str) -> UfsResult<Vec<R>> {
        let query = Query::of::<R>().eq(field, value);
        Ok(self.store.get_all(&query).await?)
    }
}
