//! DUT 健康状态
//!
//! 状态不在库存文档里，单独保存在数据存储中，按 DUT id 存取。

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use fleet_common::{Datastore, Entity, IndexEntry};
use fleet_proto::inventory::{DutHealth, DutState};
use fleet_proto::time::{to_datetime, to_timestamp};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{InventoryError, InventoryResult};

pub const DUT_STATE_KIND: &str = "DutState";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DutStateEntity {
    pub dut_id: String,
    pub health: i32,
    pub reason: String,
    pub update_time: DateTime<Utc>,
}

impl Entity for DutStateEntity {
    const KIND: &'static str = DUT_STATE_KIND;

    fn id(&self) -> String {
        self.dut_id.clone()
    }

    fn index(&self) -> Vec<IndexEntry> {
        vec![IndexEntry::new("health", self.health)]
    }
}

impl DutStateEntity {
    pub fn from_state(state: &DutState, now: DateTime<Utc>) -> InventoryResult<Self> {
        if state.dut_id.is_empty() {
            return Err(InventoryError::invalid("state.dut_id: unspecified"));
        }
        DutHealth::try_from(state.health)
            .map_err(|_| InventoryError::invalid(format!("state.health: unknown value {}", state.health)))?;
        let update_time = match &state.update_time {
            Some(ts) => to_datetime(ts).ok_or_else(|| {
                InventoryError::invalid(format!("state.update_time: invalid timestamp {ts:?}"))
            })?,
            None => now,
        };
        Ok(Self {
            dut_id: state.dut_id.clone(),
            health: state.health,
            reason: state.reason.clone(),
            update_time,
        })
    }

    pub fn to_state(&self) -> DutState {
        DutState {
            dut_id: self.dut_id.clone(),
            health: self.health,
            reason: self.reason.clone(),
            update_time: Some(to_timestamp(self.update_time)),
        }
    }

    pub fn health(&self) -> DutHealth {
        DutHealth::try_from(self.health).unwrap_or(DutHealth::Unknown)
    }
}

#[derive(Debug, Clone)]
pub struct DutStates {
    store: Datastore,
}

impl DutStates {
    pub fn new(store: Datastore) -> Self {
        Self { store }
    }

    pub async fn get(&self, dut_id: &str) -> InventoryResult<Option<DutStateEntity>> {
        Ok(self.store.try_get(dut_id).await?)
    }

    pub async fn put(&self, entity: &DutStateEntity) -> InventoryResult<()> {
        self.store.put(entity).await?;
        info!(dut_id = %entity.dut_id, health = ?entity.health(), "DUT state updated");
        Ok(())
    }

    /// 批量读取健康状态，没有记录的 DUT 为 `Unknown`
    pub async fn health_map(&self, dut_ids: &[String]) -> InventoryResult<HashMap<String, DutHealth>> {
        let found = self.store.get_multi::<DutStateEntity>(dut_ids).await?;
        Ok(dut_ids
            .iter()
            .zip(found)
            .map(|(id, state)| {
                let health = state.map(|s| s.health()).unwrap_or(DutHealth::Unknown);
                (id.clone(), health)
            })
            .collect())
    }

    /// 删除状态记录，非原子
    pub async fn delete_many(&self, dut_ids: &[String]) -> InventoryResult<usize> {
        Ok(self.store.delete_multi::<DutStateEntity>(dut_ids).await?)
    }
}
