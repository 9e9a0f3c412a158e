//! Karte 业务逻辑

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use fleet_common::config::KarteConfig;
use fleet_common::pagination::default_page_size;
use fleet_common::storage::FilterOp;
use fleet_common::{Datastore, DatastoreError, Query};
use fleet_proto::karte::{
    Action, CreateActionRequest, CreateObservationRequest, ListActionsRequest,
    ListActionsResponse, ListObservationsRequest, ListObservationsResponse, Observation,
    PersistActionRangeRequest, PersistActionRangeResponse, UpdateActionRequest,
};
use serde_json::Value;
use tracing::{debug, info};

use crate::entities::{ActionEntity, ObservationEntity, datetime_field};
use crate::error::{KarteError, KarteResult};
use crate::idgen;
use crate::query::{ActionEntitiesQuery, ObservationEntitiesQuery};
use crate::sink::{ACTIONS_TABLE, ActionRow, OBSERVATIONS_TABLE, ObservationRow, RowSink};

/// Karte 服务
#[derive(Clone)]
pub struct KarteService {
    store: Datastore,
    sink: Arc<dyn RowSink>,
    seal_duration: Duration,
}

impl std::fmt::Debug for KarteService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KarteService")
            .field("store", &self.store.backend_name())
            .field("seal_duration", &self.seal_duration)
            .finish()
    }
}

impl KarteService {
    pub fn new(store: Datastore, sink: Arc<dyn RowSink>, config: &KarteConfig) -> Self {
        let seal_duration = i64::try_from(config.seal_duration_secs)
            .ok()
            .and_then(Duration::try_seconds)
            .unwrap_or(Duration::MAX);
        Self {
            store,
            sink,
            seal_duration,
        }
    }

    pub fn store(&self) -> &Datastore {
        &self.store
    }

    /// 创建 action，名称由服务端分配
    pub async fn create_action(&self, req: CreateActionRequest) -> KarteResult<Action> {
        let action = req
            .action
            .ok_or_else(|| KarteError::invalid("action: must be set"))?;
        if !action.name.is_empty() {
            return Err(KarteError::invalid(format!(
                "action name must be empty, got {:?}",
                action.name
            )));
        }

        let mut entity = ActionEntity::from_action(&action)?;
        let create_time = entity.create_time.unwrap_or_else(Utc::now);
        entity.create_time = Some(create_time);
        if entity.seal_time.is_none() {
            let seal_time = create_time
                .checked_add_signed(self.seal_duration)
                .ok_or_else(|| KarteError::invalid(format!("create_time {create_time} is out of range")))?;
            entity.seal_time = Some(seal_time);
        }
        entity.id = idgen::new_id(create_time)?;

        self.store.insert(&entity).await?;
        info!(name = %entity.id, kind = %entity.kind, "action created");
        Ok(entity.to_action())
    }

    /// 按 update mask 修改 action
    pub async fn update_action(&self, req: UpdateActionRequest) -> KarteResult<Action> {
        let action = req
            .action
            .ok_or_else(|| KarteError::invalid("action: must be set"))?;
        if action.name.is_empty() {
            return Err(KarteError::invalid("action name: must be set"));
        }
        let paths = match req.update_mask {
            Some(mask) if !mask.paths.is_empty() => mask.paths,
            _ => return Err(KarteError::invalid("update_mask: must be set")),
        };

        let update = ActionEntity::from_action(&action)?;
        let mut stored = match self.store.get::<ActionEntity>(&action.name).await {
            Ok(entity) => entity,
            Err(DatastoreError::NotFound { .. }) => {
                return Err(KarteError::NotFound {
                    kind: "action",
                    name: action.name,
                });
            }
            Err(e) => return Err(e.into()),
        };

        if stored.is_sealed(Utc::now()) {
            return Err(KarteError::FailedPrecondition(format!(
                "action {:?} is sealed and can no longer be modified",
                stored.id
            )));
        }

        for path in &paths {
            if !stored.apply_field(path, &update) {
                return Err(KarteError::invalid(format!(
                    "update_mask: field {path:?} cannot be updated"
                )));
            }
        }

        self.store.update(&stored).await?;
        debug!(name = %stored.id, fields = ?paths, "action updated");
        Ok(stored.to_action())
    }

    /// 创建 observation；所属 action 必须存在
    pub async fn create_observation(&self, req: CreateObservationRequest) -> KarteResult<Observation> {
        let observation = req
            .observation
            .ok_or_else(|| KarteError::invalid("observation: must be set"))?;
        if !observation.name.is_empty() {
            return Err(KarteError::invalid(format!(
                "observation name must be empty, got {:?}",
                observation.name
            )));
        }
        if observation.action_name.is_empty() {
            return Err(KarteError::invalid("observation action_name: must be set"));
        }
        if observation.value_string.is_none() && observation.value_number.is_none() {
            return Err(KarteError::invalid(
                "observation: exactly one of value_string and value_number must be set",
            ));
        }

        let mut entity = ObservationEntity::from_observation(&observation)?;
        if !self.store.exists::<ActionEntity>(&entity.action_id).await? {
            return Err(KarteError::NotFound {
                kind: "action",
                name: entity.action_id,
            });
        }
        entity.id = idgen::new_id(Utc::now())?;

        self.store.insert(&entity).await?;
        debug!(name = %entity.id, action = %entity.action_id, "observation created");
        Ok(entity.to_observation())
    }

    /// 列出 action，按时间倒序
    pub async fn list_actions(&self, req: ListActionsRequest) -> KarteResult<ListActionsResponse> {
        let size = default_page_size(req.page_size).map_err(|s| KarteError::invalid(s.message()))?;
        let mut query = ActionEntitiesQuery::from_filter(&req.filter, &req.page_token)?;
        let entities = query.next(&self.store, size).await?;
        Ok(ListActionsResponse {
            actions: entities.iter().map(ActionEntity::to_action).collect(),
            next_page_token: query.token,
        })
    }

    pub async fn list_observations(
        &self,
        req: ListObservationsRequest,
    ) -> KarteResult<ListObservationsResponse> {
        let size = default_page_size(req.page_size).map_err(|s| KarteError::invalid(s.message()))?;
        let mut query = ObservationEntitiesQuery::from_filter(&req.filter, &req.page_token)?;
        let entities = query.next(&self.store, size).await?;
        Ok(ListObservationsResponse {
            observations: entities.iter().map(ObservationEntity::to_observation).collect(),
            next_page_token: query.token,
        })
    }

    /// 导出封存时间落在 `[start, stop)` 内的 action 及其 observation
    pub async fn persist_action_range(
        &self,
        req: PersistActionRangeRequest,
    ) -> KarteResult<PersistActionRangeResponse> {
        let start = datetime_field("start_time", &req.start_time)?
            .ok_or_else(|| KarteError::invalid("start_time: must be set"))?;
        let stop = datetime_field("stop_time", &req.stop_time)?
            .ok_or_else(|| KarteError::invalid("stop_time: must be set"))?;
        let created = self.persist_range(start, stop).await?;
        Ok(PersistActionRangeResponse {
            created_records: i32::try_from(created).unwrap_or(i32::MAX),
            succeeded: true,
        })
    }

    /// 按封存时间范围导出
    ///
    /// `stop` 截断到当前时间，尚未封存的 action 仍可修改，不导出。
    /// 范围内已导出过的 action 会再次写入。
    pub async fn persist_range(&self, start: DateTime<Utc>, stop: DateTime<Utc>) -> KarteResult<usize> {
        if start >= stop {
            return Err(KarteError::invalid(format!(
                "start_time {start} must be before stop_time {stop}"
            )));
        }
        let stop = stop.min(Utc::now());
        if start >= stop {
            debug!(start = %start, "persist range starts in the future, nothing sealed");
            return Ok(0);
        }

        // 索引精度为秒：seal_time 的秒数 < stop 的秒数即保证已封存
        let query = Query::of::<ActionEntity>()
            .filter("seal_time", FilterOp::Ge, start.timestamp())
            .filter("seal_time", FilterOp::Lt, stop.timestamp());
        let actions = self.store.get_all::<ActionEntity>(&query).await?;
        let created = self.export(actions).await?;
        info!(start = %start, stop = %stop, records = created, "persisted action range");
        Ok(created)
    }

    /// 导出所有已封存但尚未导出的 action
    ///
    /// 以导出标记而不是时间窗口挑选，补录的、封存时间早于上次导出的 action 也不会漏掉。
    pub async fn persist_sealed(&self, now: DateTime<Utc>) -> KarteResult<usize> {
        let query = Query::of::<ActionEntity>()
            .eq("persisted", false)
            .filter("seal_time", FilterOp::Lt, now.timestamp());
        let actions = self.store.get_all::<ActionEntity>(&query).await?;
        if actions.is_empty() {
            return Ok(0);
        }
        let count = actions.len();
        let created = self.export(actions).await?;
        info!(actions = count, records = created, "persisted sealed actions");
        Ok(created)
    }

    /// 写入 action 与 observation 行，成功后打上导出标记
    async fn export(&self, mut actions: Vec<ActionEntity>) -> KarteResult<usize> {
        let mut observation_rows = Vec::new();
        for action in &actions {
            let query = Query::of::<ObservationEntity>().eq("action_id", action.id.as_str());
            for observation in self.store.get_all::<ObservationEntity>(&query).await? {
                observation_rows.push(serde_json::to_value(ObservationRow::from(&observation))?);
            }
        }
        let action_rows = actions
            .iter()
            .map(|a| serde_json::to_value(ActionRow::from(a)))
            .collect::<Result<Vec<Value>, _>>()?;

        let mut created = self.sink.insert(ACTIONS_TABLE, action_rows).await?;
        created += self.sink.insert(OBSERVATIONS_TABLE, observation_rows).await?;

        actions.retain(|a| !a.persisted);
        for action in &mut actions {
            action.persisted = true;
        }
        self.store.put_multi(&actions).await?;
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemorySink;
    use fleet_proto::FieldMask;
    use fleet_proto::karte::ActionStatus;
    use fleet_proto::time::to_timestamp;
    use tonic::{Code, Status};

    fn service() -> (KarteService, MemorySink) {
        let sink = MemorySink::new();
        let svc = KarteService::new(Datastore::memory(), Arc::new(sink.clone()), &KarteConfig::default());
        (svc, sink)
    }

    fn code(err: KarteError) -> Code {
        Status::from(err).code()
    }

    async fn create(svc: &KarteService, kind: &str) -> Action {
        svc.create_action(CreateActionRequest {
            action: Some(Action {
                kind: kind.to_string(),
                ..Default::default()
            }),
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_create_action_assigns_name_and_seal_time() {
        let (svc, _) = service();
        let action = create(&svc, "ssh-attempt").await;
        assert!(action.name.starts_with(idgen::ID_VERSION));
        let create_time = action.create_time.unwrap();
        let seal_time = action.seal_time.unwrap();
        assert_eq!(seal_time.seconds - create_time.seconds, 12 * 60 * 60);
    }

    #[tokio::test]
    async fn test_create_action_validation() {
        let (svc, _) = service();
        let err = svc
            .create_action(CreateActionRequest { action: None })
            .await
            .unwrap_err();
        assert_eq!(code(err), Code::InvalidArgument);

        let err = svc
            .create_action(CreateActionRequest {
                action: Some(Action {
                    name: "chosen-by-client".to_string(),
                    ..Default::default()
                }),
            })
            .await
            .unwrap_err();
        assert_eq!(code(err), Code::InvalidArgument);
    }

    #[tokio::test]
    async fn test_update_action_with_mask() {
        let (svc, _) = service();
        let created = create(&svc, "repair").await;

        let updated = svc
            .update_action(UpdateActionRequest {
                action: Some(Action {
                    name: created.name.clone(),
                    status: ActionStatus::Fail as i32,
                    fail_reason: "servo timeout".to_string(),
                    kind: "ignored".to_string(),
                    ..Default::default()
                }),
                update_mask: Some(FieldMask {
                    paths: vec!["status".to_string(), "fail_reason".to_string()],
                }),
            })
            .await
            .unwrap();
        assert_eq!(updated.status(), ActionStatus::Fail);
        assert_eq!(updated.fail_reason, "servo timeout");
        assert_eq!(updated.kind, "repair");
    }

    #[tokio::test]
    async fn test_update_action_errors() {
        let (svc, _) = service();
        let missing = UpdateActionRequest {
            action: Some(Action {
                name: "zzzzdoesnotexist".to_string(),
                ..Default::default()
            }),
            update_mask: Some(FieldMask {
                paths: vec!["status".to_string()],
            }),
        };
        assert_eq!(code(svc.update_action(missing).await.unwrap_err()), Code::NotFound);

        let created = create(&svc, "repair").await;
        let no_mask = UpdateActionRequest {
            action: Some(created.clone()),
            update_mask: None,
        };
        assert_eq!(
            code(svc.update_action(no_mask).await.unwrap_err()),
            Code::InvalidArgument
        );

        let bad_path = UpdateActionRequest {
            action: Some(created),
            update_mask: Some(FieldMask {
                paths: vec!["create_time".to_string()],
            }),
        };
        assert_eq!(
            code(svc.update_action(bad_path).await.unwrap_err()),
            Code::InvalidArgument
        );
    }

    #[tokio::test]
    async fn test_sealed_action_is_immutable() {
        let (svc, _) = service();
        let past = Utc::now() - Duration::hours(1);
        let created = svc
            .create_action(CreateActionRequest {
                action: Some(Action {
                    kind: "audit".to_string(),
                    seal_time: Some(to_timestamp(past)),
                    ..Default::default()
                }),
            })
            .await
            .unwrap();

        let err = svc
            .update_action(UpdateActionRequest {
                action: Some(created),
                update_mask: Some(FieldMask {
                    paths: vec!["status".to_string()],
                }),
            })
            .await
            .unwrap_err();
        assert_eq!(code(err), Code::FailedPrecondition);
    }

    #[tokio::test]
    async fn test_create_observation() {
        let (svc, _) = service();
        let action = create(&svc, "audit").await;

        let obs = svc
            .create_observation(CreateObservationRequest {
                observation: Some(Observation {
                    action_name: action.name.clone(),
                    metric_kind: "battery_level".to_string(),
                    value_number: Some(0.75),
                    ..Default::default()
                }),
            })
            .await
            .unwrap();
        assert!(!obs.name.is_empty());

        let orphan = svc
            .create_observation(CreateObservationRequest {
                observation: Some(Observation {
                    action_name: "zzzzmissing".to_string(),
                    value_string: Some("x".to_string()),
                    ..Default::default()
                }),
            })
            .await
            .unwrap_err();
        assert_eq!(code(orphan), Code::NotFound);

        let no_value = svc
            .create_observation(CreateObservationRequest {
                observation: Some(Observation {
                    action_name: action.name.clone(),
                    ..Default::default()
                }),
            })
            .await
            .unwrap_err();
        assert_eq!(code(no_value), Code::InvalidArgument);
    }

    #[tokio::test]
    async fn test_list_actions_newest_first_with_filter() {
        let (svc, _) = service();
        let first = create(&svc, "a").await;
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        let second = create(&svc, "b").await;
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        let third = create(&svc, "a").await;

        let all = svc
            .list_actions(ListActionsRequest::default())
            .await
            .unwrap();
        let names: Vec<_> = all.actions.iter().map(|a| a.name.clone()).collect();
        assert_eq!(names, vec![third.name.clone(), second.name, first.name.clone()]);
        assert!(all.next_page_token.is_empty());

        let only_a = svc
            .list_actions(ListActionsRequest {
                page_size: 1,
                filter: r#"kind == "a""#.to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(only_a.actions.len(), 1);
        assert_eq!(only_a.actions[0].name, third.name);

        let next = svc
            .list_actions(ListActionsRequest {
                page_size: 1,
                page_token: only_a.next_page_token,
                filter: r#"kind == "a""#.to_string(),
            })
            .await
            .unwrap();
        assert_eq!(next.actions[0].name, first.name);
    }

    #[tokio::test]
    async fn test_list_rejects_bad_filter_and_size() {
        let (svc, _) = service();
        let err = svc
            .list_actions(ListActionsRequest {
                filter: "nope == 1".to_string(),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert_eq!(code(err), Code::InvalidArgument);

        let err = svc
            .list_observations(ListObservationsRequest {
                page_size: -1,
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert_eq!(code(err), Code::InvalidArgument);
    }

    #[tokio::test]
    async fn test_persist_action_range() {
        let (svc, sink) = service();
        let now = Utc::now();
        let sealed = svc
            .create_action(CreateActionRequest {
                action: Some(Action {
                    kind: "audit".to_string(),
                    seal_time: Some(to_timestamp(now - Duration::minutes(30))),
                    ..Default::default()
                }),
            })
            .await
            .unwrap();
        svc.create_observation(CreateObservationRequest {
            observation: Some(Observation {
                action_name: sealed.name.clone(),
                metric_kind: "temp".to_string(),
                value_number: Some(40.0),
                ..Default::default()
            }),
        })
        .await
        .unwrap();
        // 默认 12 小时后才封存，不在导出范围内
        create(&svc, "open").await;

        let resp = svc
            .persist_action_range(PersistActionRangeRequest {
                start_time: Some(to_timestamp(now - Duration::hours(1))),
                stop_time: Some(to_timestamp(now)),
            })
            .await
            .unwrap();
        assert_eq!(resp.created_records, 2);
        assert!(resp.succeeded);

        let rows = sink.rows(ACTIONS_TABLE).await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["name"], sealed.name.as_str());
        assert_eq!(sink.rows(OBSERVATIONS_TABLE).await.len(), 1);
    }

    #[tokio::test]
    async fn test_persist_range_validation() {
        let (svc, _) = service();
        let now = Utc::now();
        let err = svc
            .persist_action_range(PersistActionRangeRequest {
                start_time: Some(to_timestamp(now)),
                stop_time: Some(to_timestamp(now - Duration::hours(1))),
            })
            .await
            .unwrap_err();
        assert_eq!(code(err), Code::InvalidArgument);

        let err = svc
            .persist_action_range(PersistActionRangeRequest::default())
            .await
            .unwrap_err();
        assert_eq!(code(err), Code::InvalidArgument);
    }

    #[tokio::test]
    async fn test_persist_range_skips_unsealed_actions() {
        let (svc, sink) = service();
        let now = Utc::now();
        let open = create(&svc, "open").await;

        let resp = svc
            .persist_action_range(PersistActionRangeRequest {
                start_time: Some(to_timestamp(now - Duration::hours(1))),
                stop_time: Some(to_timestamp(now + Duration::days(1))),
            })
            .await
            .unwrap();
        assert_eq!(resp.created_records, 0);
        assert!(sink.rows(ACTIONS_TABLE).await.is_empty());

        // 范围完全在未来时同样不导出
        let created = svc
            .persist_range(now + Duration::hours(1), now + Duration::days(1))
            .await
            .unwrap();
        assert_eq!(created, 0);

        // 未导出的 action 仍可修改
        svc.update_action(UpdateActionRequest {
            action: Some(Action {
                fail_reason: "late".to_string(),
                ..open
            }),
            update_mask: Some(FieldMask {
                paths: vec!["fail_reason".to_string()],
            }),
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_persist_sealed_picks_up_backdated_actions() {
        let (svc, sink) = service();
        let first = svc
            .create_action(CreateActionRequest {
                action: Some(Action {
                    kind: "audit".to_string(),
                    seal_time: Some(to_timestamp(Utc::now() - Duration::minutes(10))),
                    ..Default::default()
                }),
            })
            .await
            .unwrap();
        create(&svc, "open").await;

        let now = Utc::now() + Duration::seconds(1);
        assert_eq!(svc.persist_sealed(now).await.unwrap(), 1);
        assert_eq!(svc.persist_sealed(now).await.unwrap(), 0);

        // 默认封存时间早于上次导出的补录 action
        let backdated = svc
            .create_action(CreateActionRequest {
                action: Some(Action {
                    kind: "audit".to_string(),
                    create_time: Some(to_timestamp(Utc::now() - Duration::hours(13))),
                    ..Default::default()
                }),
            })
            .await
            .unwrap();
        assert_eq!(svc.persist_sealed(now).await.unwrap(), 1);

        let names: Vec<_> = sink
            .rows(ACTIONS_TABLE)
            .await
            .iter()
            .map(|r| r["name"].as_str().unwrap_or_default().to_string())
            .collect();
        assert_eq!(names, vec![first.name, backdated.name]);
    }

    #[tokio::test]
    async fn test_huge_seal_duration_does_not_panic() {
        let config = KarteConfig {
            seal_duration_secs: u64::MAX / 2,
            ..Default::default()
        };
        let svc = KarteService::new(Datastore::memory(), Arc::new(MemorySink::new()), &config);
        let err = svc
            .create_action(CreateActionRequest {
                action: Some(Action {
                    kind: "audit".to_string(),
                    ..Default::default()
                }),
            })
            .await
            .unwrap_err();
        assert_eq!(code(err), Code::InvalidArgument);
    }
}
