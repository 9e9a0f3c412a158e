//! 分析仓库导出目标
//!
//! 封存的 action 与 observation 被展平成行，批量写入 [`RowSink`]。
//! - `MemorySink` - 测试用，行保存在内存中
//! - `NdjsonSink` - 每张表一个追加写入的 `.ndjson` 文件

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fleet_common::metrics::ROWS_EXPORTED;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

use crate::entities::{ActionEntity, ObservationEntity};
use crate::error::{KarteError, KarteResult};

pub const ACTIONS_TABLE: &str = "actions";
pub const OBSERVATIONS_TABLE: &str = "observations";

/// 一行 action 导出数据
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRow {
    pub name: String,
    pub kind: String,
    pub swarming_task_id: String,
    pub buildbucket_id: String,
    pub asset_tag: String,
    pub start_time: Option<DateTime<Utc>>,
    pub stop_time: Option<DateTime<Utc>>,
    pub create_time: Option<DateTime<Utc>>,
    /// 枚举名，例如 `SUCCESS`
    pub status: String,
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
    pub allow_fail: String,
}

impl From<&ActionEntity> for ActionRow {
    fn from(e: &ActionEntity) -> Self {
        let action = e.to_action();
        Self {
            status: action.status().as_str_name().to_string(),
            allow_fail: action.allow_fail().as_str_name().to_string(),
            name: action.name,
            kind: action.kind,
            swarming_task_id: action.swarming_task_id,
            buildbucket_id: action.buildbucket_id,
            asset_tag: action.asset_tag,
            start_time: e.start_time,
            stop_time: e.stop_time,
            create_time: e.create_time,
            fail_reason: action.fail_reason,
            seal_time: e.seal_time,
            client_name: action.client_name,
            client_version: action.client_version,
            hostname: action.hostname,
            model: action.model,
            board: action.board,
            recovered_by: action.recovered_by,
            restarts: action.restarts,
            plan_name: action.plan_name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationRow {
    pub name: String,
    pub action_name: String,
    pub metric_kind: String,
    pub value_string: Option<String>,
    pub value_number: Option<f64>,
}

impl From<&ObservationEntity> for ObservationRow {
    fn from(e: &ObservationEntity) -> Self {
        Self {
            name: e.id.clone(),
            action_name: e.action_id.clone(),
            metric_kind: e.metric_kind.clone(),
            value_string: e.value_string.clone(),
            value_number: e.value_number,
        }
    }
}

/// 行写入目标
#[async_trait]
pub trait RowSink: Send + Sync {
    /// 追加写入一批行，返回写入的行数
    async fn insert(&self, table: &str, rows: Vec<Value>) -> KarteResult<usize>;
}

/// 内存导出目标
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    tables: Arc<Mutex<BTreeMap<String, Vec<Value>>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn rows(&self, table: &str) -> Vec<Value> {
        self.tables
            .lock()
            .await
            .get(table)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl RowSink for MemorySink {
    async fn insert(&self, table: &str, rows: Vec<Value>) -> KarteResult<usize> {
        let count = rows.len();
        self.tables
            .lock()
            .await
            .entry(table.to_string())
            .or_default()
            .extend(rows);
        ROWS_EXPORTED.with_label_values(&[table]).inc_by(count as u64);
        Ok(count)
    }
}

/// 追加写入 NDJSON 文件的导出目标
#[derive(Debug)]
pub struct NdjsonSink {
    dir: PathBuf,
    // 串行化同一进程内的写入
    write_lock: Mutex<()>,
}

impl NdjsonSink {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn table_path(&self, table: &str) -> PathBuf {
        self.dir.join(format!("{table}.ndjson"))
    }
}

#[async_trait]
impl RowSink for NdjsonSink {
    async fn insert(&self, table: &str, rows: Vec<Value>) -> KarteResult<usize> {
        if rows.is_empty() {
            return Ok(0);
        }
        if table.is_empty() || table.contains(['/', '\\', '.']) {
            return Err(KarteError::Sink(format!("invalid table name {table:?}")));
        }

        let mut buf = Vec::new();
        for row in &rows {
            serde_json::to_writer(&mut buf, row)?;
            buf.push(b'\n');
        }

        let _guard = self.write_lock.lock().await;
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.table_path(table);
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(&buf).await?;
        file.flush().await?;

        debug!(table, rows = rows.len(), path = %path.display(), "rows appended");
        ROWS_EXPORTED.with_label_values(&[table]).inc_by(rows.len() as u64);
        Ok(rows.len())
    }
}
