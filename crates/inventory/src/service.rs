//! Inventory 业务逻辑
//!
//! 修改库存的操作都遵循同一流程：读取文档和修订号、在内存中修改、带修订号提交。
//! 提交冲突按重试策略重新执行整个流程。

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use fleet_common::config::InventoryConfig;
use fleet_common::metrics::DUT_POOL_MOVES;
use fleet_common::{Caller, Datastore, RetryPolicy, with_retry};
use fleet_proto::inventory::{
    AssignDutsToDronesRequest, AssignDutsToDronesResponse, BalancePoolsModelResult,
    BalancePoolsRequest, BalancePoolsResponse, DeleteDutsRequest, DeleteDutsResponse, DutHealth,
    DutState, GetDutInfoRequest, GetDutInfoResponse, Lab, ListDutsRequest, ListDutsResponse,
    ListServersRequest, ListServersResponse, RemoveDutsFromDronesRequest,
    RemoveDutsFromDronesResponse, ResizePoolRequest, ResizePoolResponse, UpdateDutStateRequest,
};
use tracing::info;

use crate::dutpool::{self, in_pool};
use crate::error::{InventoryError, InventoryResult};
use crate::infrastructure::{self, drone_of};
use crate::state::{DutStateEntity, DutStates};
use crate::store::InventoryStore;

#[derive(Clone, Debug)]
pub struct InventoryService {
    store: Arc<dyn InventoryStore>,
    states: DutStates,
    config: InventoryConfig,
    retry: RetryPolicy,
}

/// 一次修改的结果；`changed` 为 false 时不提交
struct Edit<T> {
    value: T,
    changed: bool,
}

impl InventoryService {
    pub fn new(store: Arc<dyn InventoryStore>, datastore: Datastore, config: InventoryConfig) -> Self {
        Self {
            store,
            states: DutStates::new(datastore),
            config,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn states(&self) -> &DutStates {
        &self.states
    }

    /// 读取、修改并提交库存，返回修改结果和新修订号（未修改时为空）
    async fn modify<T, F>(&self, message: &str, edit: F) -> InventoryResult<(T, String)>
    where
        F: Fn(&mut Lab) -> InventoryResult<Edit<T>> + Sync,
        T: Send,
    {
        let edit = &edit;
        with_retry(&self.retry, move || async move {
            let snapshot = self.store.load().await?;
            let mut lab = snapshot.lab;
            let Edit { value, changed } = edit(&mut lab)?;
            if !changed {
                return Ok((value, String::new()));
            }
            let revision = self.store.commit(&lab, &snapshot.revision, message).await?;
            Ok((value, revision))
        })
        .await
    }

    async fn health_of_lab(&self, lab: &Lab) -> InventoryResult<HashMap<String, DutHealth>> {
        let ids: Vec<String> = lab.duts.iter().map(|d| d.id.clone()).collect();
        self.states.health_map(&ids).await
    }

    // ---- Pools ----

    pub async fn resize_pool(&self, caller: &Caller, req: ResizePoolRequest) -> InventoryResult<ResizePoolResponse> {
        let size = usize::try_from(req.target_pool_size).map_err(|_| {
            InventoryError::invalid(format!(
                "target_pool_size must be non-negative, got {}",
                req.target_pool_size
            ))
        })?;
        let selector = req
            .dut_selector
            .ok_or_else(|| InventoryError::invalid("dut_selector: unspecified"))?;
        let spare = if req.spare_pool.is_empty() {
            self.config.spare_pool.clone()
        } else {
            req.spare_pool
        };
        let health = self.health_of_lab(&self.store.load().await?.lab).await?;

        let message = format!(
            "resize pool {} to {size} ({})",
            req.target_pool,
            caller.identity()
        );
        let (changes, revision) = self
            .modify(&message, |lab| {
                let changes = dutpool::resize(&mut lab.duts, &health, &selector, &req.target_pool, &spare, size)?;
                Ok(Edit {
                    changed: !changes.is_empty(),
                    value: changes,
                })
            })
            .await?;

        DUT_POOL_MOVES
            .with_label_values(&["resize"])
            .inc_by(changes.len() as u64);
        info!(
            target_pool = %req.target_pool,
            spare_pool = %spare,
            size,
            moved = changes.len(),
            "pool resized"
        );
        Ok(ResizePoolResponse { revision, changes })
    }

    pub async fn balance_pools(&self, caller: &Caller, req: BalancePoolsRequest) -> InventoryResult<BalancePoolsResponse> {
        if !self.config.critical_pools.contains(&req.target_pool) {
            return Err(InventoryError::invalid(format!(
                "target_pool {:?} is not a critical pool, expected one of {}",
                req.target_pool,
                self.config.critical_pools.join(", ")
            )));
        }
        let spare = if req.spare_pool.is_empty() {
            self.config.spare_pool.clone()
        } else {
            req.spare_pool
        };
        let health = self.health_of_lab(&self.store.load().await?.lab).await?;

        let balance = |lab: &mut Lab| -> InventoryResult<Edit<Vec<BalancePoolsModelResult>>> {
            let results = dutpool::balance(&mut lab.duts, &health, &req.model, &req.target_pool, &spare)?;
            Ok(Edit {
                changed: results.iter().any(|r| !r.changes.is_empty()),
                value: results,
            })
        };
        let (model_results, revision) = if req.dry_run {
            let mut lab = self.store.load().await?.lab;
            (balance(&mut lab)?.value, String::new())
        } else {
            let message = format!("balance pool {} ({})", req.target_pool, caller.identity());
            self.modify(&message, balance).await?
        };

        let moved: usize = model_results.iter().map(|r| r.changes.len()).sum();
        if !req.dry_run {
            DUT_POOL_MOVES.with_label_values(&["balance"]).inc_by(moved as u64);
        }
        info!(
            target_pool = %req.target_pool,
            models = model_results.len(),
            moved,
            dry_run = req.dry_run,
            "pools balanced"
        );
        Ok(BalancePoolsResponse {
            model_results,
            revision,
        })
    }

    // ---- Drones ----

    pub async fn assign_duts_to_drones(
        &self,
        caller: &Caller,
        req: AssignDutsToDronesRequest,
    ) -> InventoryResult<AssignDutsToDronesResponse> {
        if req.assignments.is_empty() {
            return Err(InventoryError::invalid("assignments: empty"));
        }
        let message = format!("assign {} DUTs to drones ({})", req.assignments.len(), caller.identity());
        let (assigned, revision) = self
            .modify(&message, |lab| {
                Ok(Edit {
                    value: infrastructure::assign_duts_to_drones(lab, &req.assignments)?,
                    changed: true,
                })
            })
            .await?;
        Ok(AssignDutsToDronesResponse { assigned, revision })
    }

    pub async fn remove_duts_from_drones(
        &self,
        caller: &Caller,
        req: RemoveDutsFromDronesRequest,
    ) -> InventoryResult<RemoveDutsFromDronesResponse> {
        if req.removals.is_empty() {
            return Err(InventoryError::invalid("removals: empty"));
        }
        let message = format!("remove {} DUTs from drones ({})", req.removals.len(), caller.identity());
        let (removed, revision) = self
            .modify(&message, |lab| {
                Ok(Edit {
                    value: infrastructure::remove_duts_from_drones(lab, &req.removals)?,
                    changed: true,
                })
            })
            .await?;
        Ok(RemoveDutsFromDronesResponse { removed, revision })
    }

    pub async fn list_servers(&self, _caller: &Caller, req: ListServersRequest) -> InventoryResult<ListServersResponse> {
        let lab = self.store.load().await?.lab;
        Ok(ListServersResponse {
            servers: infrastructure::list_servers(&lab, &req),
        })
    }

    // ---- DUTs ----

    /// 按 id 或主机名查找 DUT，同时给出时以 id 为准
    pub async fn get_dut_info(&self, _caller: &Caller, req: GetDutInfoRequest) -> InventoryResult<GetDutInfoResponse> {
        if req.id.is_empty() && req.hostname.is_empty() {
            return Err(InventoryError::invalid("one of id or hostname is required"));
        }
        let lab = self.store.load().await?.lab;
        let found = if req.id.is_empty() {
            lab.duts.iter().find(|d| d.hostname == req.hostname)
        } else {
            lab.duts.iter().find(|d| d.id == req.id)
        };
        let Some(dut) = found else {
            let key = if req.id.is_empty() { req.hostname } else { req.id };
            return Err(InventoryError::dut_not_found(key));
        };

        let state = self.states.get(&dut.id).await?.map(|s| s.to_state());
        let drone = drone_of(&lab, &dut.id)
            .map(|s| s.hostname.clone())
            .unwrap_or_default();
        Ok(GetDutInfoResponse {
            dut: Some(dut.clone()),
            state,
            drone,
        })
    }

    pub async fn list_duts(&self, _caller: &Caller, req: ListDutsRequest) -> InventoryResult<ListDutsResponse> {
        let lab = self.store.load().await?.lab;
        let mut duts: Vec<_> = lab
            .duts
            .into_iter()
            .filter(|d| req.model.is_empty() || d.model == req.model)
            .filter(|d| req.pool.is_empty() || in_pool(d, &req.pool))
            .collect();
        duts.sort_by(|a, b| a.hostname.cmp(&b.hostname));
        Ok(ListDutsResponse { duts })
    }

    /// 从库存中删除 DUT 及其 drone 分配，并清理状态记录
    ///
    /// 未知的主机名被忽略。状态记录在库存提交之后删除，两者不是原子的。
    pub async fn delete_duts(&self, caller: &Caller, req: DeleteDutsRequest) -> InventoryResult<DeleteDutsResponse> {
        if req.hostnames.is_empty() {
            return Err(InventoryError::invalid("hostnames: empty"));
        }
        let message = format!("delete {} DUTs ({})", req.hostnames.len(), caller.identity());
        let (ids, revision) = self
            .modify(&message, |lab| {
                let ids: Vec<String> = lab
                    .duts
                    .iter()
                    .filter(|d| req.hostnames.contains(&d.hostname))
                    .map(|d| d.id.clone())
                    .collect();
                lab.duts.retain(|d| !ids.contains(&d.id));
                for server in &mut lab.servers {
                    server.dut_uids.retain(|u| !ids.contains(u));
                }
                Ok(Edit {
                    changed: !ids.is_empty(),
                    value: ids,
                })
            })
            .await?;

        if !ids.is_empty() {
            let deleted_states = self.states.delete_many(&ids).await?;
            info!(duts = ids.len(), deleted_states, %revision, "DUTs deleted");
        }
        Ok(DeleteDutsResponse {
            changed: !ids.is_empty(),
            ids,
            revision,
        })
    }

    pub async fn update_dut_state(&self, caller: &Caller, req: UpdateDutStateRequest) -> InventoryResult<DutState> {
        let state = req
            .state
            .ok_or_else(|| InventoryError::invalid("state: unspecified"))?;
        let entity = DutStateEntity::from_state(&state, Utc::now())?;
        let lab = self.store.load().await?.lab;
        if !lab.duts.iter().any(|d| d.id == entity.dut_id) {
            return Err(InventoryError::dut_not_found(entity.dut_id.as_str()));
        }
        self.states.put(&entity).await?;
        info!(dut_id = %entity.dut_id, identity = caller.identity(), "DUT state recorded");
        Ok(entity.to_state())
    }
}
