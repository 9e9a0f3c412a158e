//! Action / Observation 实体映射
//!
//! 实体保存消息的全部字段，并把可查询的字段投影为索引项。时间字段以 unix
//! 秒建立索引。

use chrono::{DateTime, Utc};
use fleet_common::{Entity, IndexEntry};
use fleet_proto::karte::{Action, Observation};
use fleet_proto::time::{to_datetime, to_timestamp};
use prost_types::Timestamp;
use serde::{Deserialize, Serialize};

use crate::error::{KarteError, KarteResult};

pub const ACTION_KIND: &str = "Action";
pub const OBSERVATION_KIND: &str = "Observation";

/// 可选时间戳转换；超出范围视为参数错误
pub(crate) fn datetime_field(field: &str, ts: &Option<Timestamp>) -> KarteResult<Option<DateTime<Utc>>> {
    match ts {
        None => Ok(None),
        Some(ts) => to_datetime(ts)
            .map(Some)
            .ok_or_else(|| KarteError::invalid(format!("{field}: invalid timestamp {ts:?}"))),
    }
}

fn timestamp_field(dt: &Option<DateTime<Utc>>) -> Option<Timestamp> {
    dt.map(to_timestamp)
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ActionEntity {
    pub id: String,
    pub kind: String,
    pub swarming_task_id: String,
    pub buildbucket_id: String,
    pub asset_tag: String,
    pub start_time: Option<DateTime<Utc>>,
    pub stop_time: Option<DateTime<Utc>>,
    pub create_time: Option<DateTime<Utc>>,
    pub status: i32,
    pub fail_reason: String,
    pub seal_time: Option<DateTime<Utc>>,
    pub client_name: String,
    pub client_version: String,
    pub hostname: String,
    pub model: String,
    pub board: String,
    pub recovered_by: String,
    pub restarts: i32,
    pub plan_name: String,
    pub allow_fail: i32,
    /// 已写入导出表；不对外暴露
    #[serde(default)]
    pub persisted: bool,
}

impl ActionEntity {
    pub fn from_action(action: &Action) -> KarteResult<Self> {
        Ok(Self {
            id: action.name.clone(),
            kind: action.kind.clone(),
            swarming_task_id: action.swarming_task_id.clone(),
            buildbucket_id: action.buildbucket_id.clone(),
            asset_tag: action.asset_tag.clone(),
            start_time: datetime_field("start_time", &action.start_time)?,
            stop_time: datetime_field("stop_time", &action.stop_time)?,
            create_time: datetime_field("create_time", &action.create_time)?,
            status: action.status,
            fail_reason: action.fail_reason.clone(),
            seal_time: datetime_field("seal_time", &action.seal_time)?,
            client_name: action.client_name.clone(),
            client_version: action.client_version.clone(),
            hostname: action.hostname.clone(),
            model: action.model.clone(),
            board: action.board.clone(),
            recovered_by: action.recovered_by.clone(),
            restarts: action.restarts,
            plan_name: action.plan_name.clone(),
            allow_fail: action.allow_fail,
            persisted: false,
        })
    }

    pub fn to_action(&self) -> Action {
        Action {
            name: self.id.clone(),
            kind: self.kind.clone(),
            swarming_task_id: self.swarming_task_id.clone(),
            buildbucket_id: self.buildbucket_id.clone(),
            asset_tag: self.asset_tag.clone(),
            start_time: timestamp_field(&self.start_time),
            stop_time: timestamp_field(&self.stop_time),
            create_time: timestamp_field(&self.create_time),
            status: self.status,
            fail_reason: self.fail_reason.clone(),
            seal_time: timestamp_field(&self.seal_time),
            client_name: self.client_name.clone(),
            client_version: self.client_version.clone(),
            hostname: self.hostname.clone(),
            model: self.model.clone(),
            board: self.board.clone(),
            recovered_by: self.recovered_by.clone(),
            restarts: self.restarts,
            plan_name: self.plan_name.clone(),
            allow_fail: self.allow_fail,
        }
    }

    /// 封存时间已过，action 不再可修改
    pub fn is_sealed(&self, now: DateTime<Utc>) -> bool {
        self.seal_time.is_some_and(|seal| now >= seal)
    }

    /// 把 `other` 中 `path` 对应的字段复制过来
    ///
    /// 返回 `false` 表示字段不可修改或不存在。
    pub fn apply_field(&mut self, path: &str, other: &ActionEntity) -> bool {
        match path {
            "kind" => self.kind = other.kind.clone(),
            "swarming_task_id" => self.swarming_task_id = other.swarming_task_id.clone(),
            "buildbucket_id" => self.buildbucket_id = other.buildbucket_id.clone(),
            "asset_tag" => self.asset_tag = other.asset_tag.clone(),
            "start_time" => self.start_time = other.start_time,
            "stop_time" => self.stop_time = other.stop_time,
            "status" => self.status = other.status,
            "fail_reason" => self.fail_reason = other.fail_reason.clone(),
            "seal_time" => self.seal_time = other.seal_time,
            "client_name" => self.client_name = other.client_name.clone(),
            "client_version" => self.client_version = other.client_version.clone(),
            "hostname" => self.hostname = other.hostname.clone(),
            "model" => self.model = other.model.clone(),
            "board" => self.board = other.board.clone(),
            "recovered_by" => self.recovered_by = other.recovered_by.clone(),
            "restarts" => self.restarts = other.restarts,
            "plan_name" => self.plan_name = other.plan_name.clone(),
            "allow_fail" => self.allow_fail = other.allow_fail,
            _ => return false,
        }
        true
    }
}

impl Entity for ActionEntity {
    const KIND: &'static str = ACTION_KIND;

    fn id(&self) -> String {
        self.id.clone()
    }

    fn index(&self) -> Vec<IndexEntry> {
        let mut entries = vec![
            IndexEntry::new("kind", &self.kind),
            IndexEntry::new("swarming_task_id", &self.swarming_task_id),
            IndexEntry::new("buildbucket_id", &self.buildbucket_id),
            IndexEntry::new("asset_tag", &self.asset_tag),
            IndexEntry::new("status", self.status),
            IndexEntry::new("fail_reason", &self.fail_reason),
            IndexEntry::new("client_name", &self.client_name),
            IndexEntry::new("client_version", &self.client_version),
            IndexEntry::new("hostname", &self.hostname),
            IndexEntry::new("model", &self.model),
            IndexEntry::new("board", &self.board),
            IndexEntry::new("recovered_by", &self.recovered_by),
            IndexEntry::new("restarts", self.restarts),
            IndexEntry::new("plan_name", &self.plan_name),
            IndexEntry::new("allow_fail", self.allow_fail),
            IndexEntry::new("persisted", self.persisted),
        ];
        for (field, value) in [
            ("start_time", self.start_time),
            ("stop_time", self.stop_time),
            ("create_time", self.create_time),
            ("seal_time", self.seal_time),
        ] {
            if let Some(t) = value {
                entries.push(IndexEntry::new(field, t.timestamp()));
            }
        }
        entries
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ObservationEntity {
    pub id: String,
    pub action_id: String,
    pub metric_kind: String,
    pub value_string: Option<String>,
    pub value_number: Option<f64>,
}

impl ObservationEntity {
    /// 转换为实体；字符串值与数值同时设置时返回错误
    pub fn from_observation(observation: &Observation) -> KarteResult<Self> {
        if observation.value_string.is_some() && observation.value_number.is_some() {
            return Err(KarteError::invalid(format!(
                "observation {:?}: value_string and value_number are mutually exclusive",
                observation.name
            )));
        }
        Ok(Self {
            id: observation.name.clone(),
            action_id: observation.action_name.clone(),
            metric_kind: observation.metric_kind.clone(),
            value_string: observation.value_string.clone(),
            value_number: observation.value_number,
        })
    }

    pub fn to_observation(&self) -> Observation {
        Observation {
            name: self.id.clone(),
            action_name: self.action_id.clone(),
            metric_kind: self.metric_kind.clone(),
            value_string: self.value_string.clone(),
            value_number: self.value_number,
        }
    }
}

impl Entity for ObservationEntity {
    const KIND: &'static str = OBSERVATION_KIND;

    fn id(&self) -> String {
        self.id.clone()
    }

    fn index(&self) -> Vec<IndexEntry> {
        let mut entries = vec![
            IndexEntry::new("action_id", &self.action_id),
            IndexEntry::new("metric_kind", &self.metric_kind),
        ];
        if let Some(value) = &self.value_string {
            entries.push(IndexEntry::new("value_string", value));
        }
        entries
    }
}
