//! 测试结果导入
//!
//! 保存测试结论，并把其中的失败按全部算法聚类后写入 [`ClusteredFailureEntity`]，
//! 供 cluster 摘要统计使用。

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use fleet_common::{Datastore, Entity, IndexEntry};
use fleet_proto::weetbix::{ClusterId, TestVerdictStatus};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::clustering::{AlgorithmRegistry, Failure, RulesAlgorithm, hash_id};
use crate::error::WeetbixResult;
use crate::names::validate_project;
use crate::rules::RulesRepository;
use crate::testhistory::{TestVerdictEntity, variant_hash};

pub const CLUSTERED_FAILURE_KIND: &str = "ClusteredFailure";

/// 一个失败在某个 cluster 中的记录
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClusteredFailureEntity {
    pub project: String,
    pub cluster_algorithm: String,
    pub cluster_id: String,
    pub test_id: String,
    pub variant_hash: String,
    pub invocation_id: String,
    pub failure_reason: Option<String>,
    pub partition_time: DateTime<Utc>,
}

impl ClusteredFailureEntity {
    /// `algorithm/id` 形式的 cluster 键
    pub fn cluster_key(id: &ClusterId) -> String {
        format!("{}/{}", id.algorithm, id.id)
    }

    pub fn failure(&self) -> Failure {
        Failure {
            test_id: self.test_id.clone(),
            reason: self.failure_reason.clone(),
        }
    }
}

impl Entity for ClusteredFailureEntity {
    const KIND: &'static str = CLUSTERED_FAILURE_KIND;

    fn id(&self) -> String {
        format!(
            "{}/{}/{}/{}/{}/{}",
            self.project,
            self.cluster_algorithm,
            self.cluster_id,
            self.invocation_id,
            hash_id(&self.test_id),
            self.variant_hash
        )
    }

    fn index(&self) -> Vec<IndexEntry> {
        vec![
            IndexEntry::new("project", &self.project),
            IndexEntry::new("cluster", format!("{}/{}", self.cluster_algorithm, self.cluster_id)),
            IndexEntry::new("test_id", &self.test_id),
            IndexEntry::new("partition_time", self.partition_time.timestamp()),
        ]
    }
}

/// 待导入的测试结论
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestedVerdict {
    pub test_id: String,
    pub variant: BTreeMap<String, String>,
    pub invocation_id: String,
    pub status: TestVerdictStatus,
    pub partition_time: DateTime<Utc>,
    pub failure_reason: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub verdicts: usize,
    pub clustered_failures: usize,
}

/// 测试结论与失败聚类的唯一写入入口
///
/// 没有对应的 RPC。外部的结果导入流水线链接本 crate，对同一个数据存储调用
/// [`Ingester::ingest`]；未导入任何数据时 TestHistory 与 cluster 摘要都为空。
#[derive(Debug, Clone)]
pub struct Ingester {
    store: Datastore,
    rules: RulesRepository,
    registry: Arc<AlgorithmRegistry>,
}

impl Ingester {
    pub fn new(store: Datastore, registry: Arc<AlgorithmRegistry>) -> Self {
        Self {
            rules: RulesRepository::new(store.clone()),
            store,
            registry,
        }
    }

    /// 导入一个子 realm 下的一批结论
    ///
    /// 批量写入不是原子的：中途失败时已写入的实体会保留。
    pub async fn ingest(
        &self,
        project: &str,
        sub_realm: &str,
        verdicts: Vec<IngestedVerdict>,
    ) -> WeetbixResult<IngestSummary> {
        validate_project(project)?;
        let rules = RulesAlgorithm::new(&self.rules.read_active(project).await?);

        let mut entities = Vec::with_capacity(verdicts.len());
        let mut clustered = Vec::new();
        for verdict in verdicts {
            let hash = variant_hash(&verdict.variant);
            if verdict.status.is_failure() || verdict.status == TestVerdictStatus::Flaky {
                let failure = Failure {
                    test_id: verdict.test_id.clone(),
                    reason: verdict.failure_reason.clone(),
                };
                let ids = self
                    .registry
                    .cluster(&failure)
                    .into_iter()
                    .chain(rules.cluster(&failure).into_iter().map(|(id, _)| id));
                for id in ids {
                    clustered.push(ClusteredFailureEntity {
                        project: project.to_string(),
                        cluster_algorithm: id.algorithm,
                        cluster_id: id.id,
                        test_id: verdict.test_id.clone(),
                        variant_hash: hash.clone(),
                        invocation_id: verdict.invocation_id.clone(),
                        failure_reason: verdict.failure_reason.clone(),
                        partition_time: verdict.partition_time,
                    });
                }
            }
            entities.push(TestVerdictEntity {
                project: project.to_string(),
                sub_realm: sub_realm.to_string(),
                test_id: verdict.test_id,
                variant_hash: hash,
                variant: verdict.variant,
                invocation_id: verdict.invocation_id,
                status: verdict.status as i32,
                partition_time: verdict.partition_time,
                failure_reason: verdict.failure_reason.unwrap_or_default(),
            });
        }

        self.store.put_multi(&entities).await?;
        self.store.put_multi(&clustered).await?;
        debug!(project, sub_realm, rules = rules.len(), "clustered ingested failures");

        let summary = IngestSummary {
            verdicts: entities.len(),
            clustered_failures: clustered.len(),
        };
        info!(
            project,
            sub_realm,
            verdicts = summary.verdicts,
            clustered_failures = summary.clustered_failures,
            "test results ingested"
        );
        Ok(summary)
    }
}
