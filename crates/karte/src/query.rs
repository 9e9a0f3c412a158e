//! 按批次遍历实体的查询
//!
//! 保存分页游标，每次调用 [`EntitiesQuery::next`] 返回下一批实体。

use std::marker::PhantomData;

use fleet_common::{Datastore, Entity, Query};

use crate::entities::{ActionEntity, ObservationEntity};
use crate::error::KarteResult;
use crate::filter::{ACTION_FIELDS, OBSERVATION_FIELDS, apply_filter};

/// 可续查的实体查询
#[derive(Debug, Clone)]
pub struct EntitiesQuery<E> {
    /// 下一批的起始游标；为空且 `started` 时表示已遍历完
    pub token: String,
    query: Query,
    started: bool,
    _marker: PhantomData<E>,
}

pub type ActionEntitiesQuery = EntitiesQuery<ActionEntity>;
pub type ObservationEntitiesQuery = EntitiesQuery<ObservationEntity>;

impl<E: Entity> EntitiesQuery<E> {
    pub fn new(query: Query, token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            query,
            started: false,
            _marker: PhantomData,
        }
    }

    /// 是否已经没有更多结果
    pub fn is_done(&self) -> bool {
        self.started && self.token.is_empty()
    }

    /// 取下一批实体并推进游标
    pub async fn next(&mut self, store: &Datastore, batch_size: usize) -> KarteResult<Vec<E>> {
        if self.is_done() {
            return Ok(Vec::new());
        }
        let query = self.query.clone().start(&self.token)?.limit(batch_size);
        let page = store.run_query::<E>(&query).await?;
        self.started = true;
        self.token = page.next_token();
        Ok(page.items)
    }
}

impl ActionEntitiesQuery {
    /// 由 List 请求的 filter 和 page_token 构造
    pub fn from_filter(filter: &str, token: &str) -> KarteResult<Self> {
        let query = apply_filter(Query::of::<ActionEntity>(), filter, ACTION_FIELDS)?;
        Ok(Self::new(query, token))
    }
}

impl ObservationEntitiesQuery {
    pub fn from_filter(filter: &str, token: &str) -> KarteResult<Self> {
        let query = apply_filter(Query::of::<ObservationEntity>(), filter, OBSERVATION_FIELDS)?;
        Ok(Self::new(query, token))
    }
}
