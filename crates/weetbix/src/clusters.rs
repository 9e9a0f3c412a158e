//! Cluster 计算与摘要

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use fleet_common::storage::FilterOp;
use fleet_common::{Datastore, Query};
use fleet_proto::weetbix::{
    Cluster, ClusterEntry, ClusterId, ClusterResult, ClusterTestResult, MetricValues,
};

use crate::clustering::{AlgorithmRegistry, Failure, RulesAlgorithm, rules};
use crate::error::WeetbixResult;
use crate::ingest::ClusteredFailureEntity;
use crate::names::cluster_name;
use crate::rules::FailureAssociationRule;

/// 摘要中最多返回的测试 ID 数
pub const TOP_TEST_IDS: usize = 5;

/// 对一批测试结果聚类，结果顺序与请求一致
pub fn cluster_results(
    registry: &AlgorithmRegistry,
    rules: &RulesAlgorithm,
    results: &[ClusterTestResult],
) -> Vec<ClusterResult> {
    results
        .iter()
        .map(|result| {
            let failure = Failure {
                test_id: result.test_id.clone(),
                reason: result
                    .failure_reason
                    .as_ref()
                    .map(|r| r.primary_error_message.clone()),
            };
            let mut clusters: Vec<ClusterEntry> = rules
                .cluster(&failure)
                .into_iter()
                .map(|(id, bug)| ClusterEntry {
                    cluster_id: Some(id),
                    bug: Some(bug),
                })
                .collect();
            clusters.extend(registry.cluster(&failure).into_iter().map(|id| ClusterEntry {
                cluster_id: Some(id),
                bug: None,
            }));
            ClusterResult {
                request_tag: result.request_tag.clone(),
                clusters,
            }
        })
        .collect()
}

/// 按 cluster 统计已导入的失败
#[derive(Debug, Clone)]
pub struct ClusterSummaries {
    store: Datastore,
    registry: Arc<AlgorithmRegistry>,
}

impl ClusterSummaries {
    pub fn new(store: Datastore, registry: Arc<AlgorithmRegistry>) -> Self {
        Self { store, registry }
    }

    /// 计算 cluster 摘要；没有失败记录的 cluster 返回空摘要
    ///
    /// 规则 cluster 的标题即规则定义，`rule` 为空或调用方无权读取定义时留空。
    pub async fn summarize(
        &self,
        project: &str,
        id: &ClusterId,
        rule: Option<&FailureAssociationRule>,
        include_definition: bool,
        now: DateTime<Utc>,
    ) -> WeetbixResult<Cluster> {
        let since = now - Duration::days(7);
        let query = Query::of::<ClusteredFailureEntity>()
            .eq("project", project)
            .eq("cluster", ClusteredFailureEntity::cluster_key(id))
            .filter("partition_time", FilterOp::Ge, since.timestamp());
        let failures: Vec<ClusteredFailureEntity> = self.store.get_all(&query).await?;

        let mut cluster = Cluster {
            name: cluster_name(project, id),
            has_example: !failures.is_empty(),
            failures: Some(count_failures(&failures, now)),
            top_test_ids: top_test_ids(&failures),
            ..Default::default()
        };

        if id.algorithm == rules::ALGORITHM_NAME {
            if let Some(rule) = rule.filter(|_| include_definition) {
                cluster.title = rule.rule_definition.clone();
                cluster.equivalent_failure_association_rule = rule.rule_definition.clone();
            }
        } else if let (Some(alg), Some(example)) = (self.registry.get(&id.algorithm), failures.first()) {
            let example = example.failure();
            cluster.title = alg.title(&example);
            cluster.equivalent_failure_association_rule = alg.failure_association_rule(&example);
        }
        Ok(cluster)
    }
}

fn count_failures(failures: &[ClusteredFailureEntity], now: DateTime<Utc>) -> MetricValues {
    let within = |days: i64| {
        let since = now - Duration::days(days);
        failures.iter().filter(|f| f.partition_time >= since).count() as i64
    };
    MetricValues {
        one_day: within(1),
        three_day: within(3),
        seven_day: within(7),
    }
}

/// 失败数最多的测试，次数相同按 ID 排序
fn top_test_ids(failures: &[ClusteredFailureEntity]) -> Vec<String> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for f in failures {
        *counts.entry(f.test_id.as_str()).or_default() += 1;
    }
    let mut ranked: Vec<(&str, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    ranked
        .into_iter()
        .take(TOP_TEST_IDS)
        .map(|(id, _)| id.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clustering::{reason, testname};
    use fleet_proto::weetbix::FailureReason;

    fn failure(test_id: &str, hours_ago: i64, now: DateTime<Utc>) -> ClusteredFailureEntity {
        ClusteredFailureEntity {
            project: "chromium".to_string(),
            cluster_algorithm: testname::ALGORITHM_NAME.to_string(),
            cluster_id: "ab".repeat(16),
            test_id: test_id.to_string(),
            variant_hash: "0".repeat(16),
            invocation_id: format!("inv-{hours_ago}"),
            failure_reason: None,
            partition_time: now - Duration::hours(hours_ago),
        }
    }

    #[test]
    fn test_cluster_results_keep_request_order() {
        let registry = AlgorithmRegistry::new();
        let results = cluster_results(
            &registry,
            &RulesAlgorithm::default(),
            &[
                ClusterTestResult {
                    request_tag: "a".to_string(),
                    test_id: "t1".to_string(),
                    failure_reason: Some(FailureReason {
                        primary_error_message: "failed 42".to_string(),
                    }),
                },
                ClusterTestResult {
                    request_tag: "b".to_string(),
                    test_id: "t2".to_string(),
                    failure_reason: None,
                },
            ],
        );
        assert_eq!(results[0].request_tag, "a");
        assert_eq!(results[0].clusters.len(), 2);
        assert_eq!(results[1].clusters.len(), 1);
        let algorithm = results[1].clusters[0].cluster_id.as_ref().unwrap().algorithm.as_str();
        assert_eq!(algorithm, testname::ALGORITHM_NAME);
        assert!(results[0]
            .clusters
            .iter()
            .any(|c| c.cluster_id.as_ref().unwrap().algorithm == reason::ALGORITHM_NAME));
    }

    #[tokio::test]
    async fn test_summary_counts_and_title() {
        let store = Datastore::memory();
        let now = Utc::now();
        let records = vec![
            failure("t1", 2, now),
            failure("t1", 30, now),
            failure("t2", 50, now),
            failure("t2", 100, now),
            failure("t2", 24 * 10, now),
        ];
        store.put_multi(&records).await.unwrap();

        let summaries = ClusterSummaries::new(store, Arc::new(AlgorithmRegistry::new()));
        let id = ClusterId {
            algorithm: testname::ALGORITHM_NAME.to_string(),
            id: "ab".repeat(16),
        };
        let cluster = summaries.summarize("chromium", &id, None, false, now).await.unwrap();
        assert_eq!(cluster.name, format!("projects/chromium/clusters/testname-v3/{}", "ab".repeat(16)));
        assert!(cluster.has_example);
        let counts = cluster.failures.unwrap();
        assert_eq!((counts.one_day, counts.three_day, counts.seven_day), (1, 3, 4));
        assert_eq!(cluster.top_test_ids, vec!["t1", "t2"]);
        assert!(!cluster.title.is_empty());
        assert!(cluster.equivalent_failure_association_rule.starts_with("test = "));
    }

    #[tokio::test]
    async fn test_unknown_cluster_is_empty() {
        let summaries = ClusterSummaries::new(Datastore::memory(), Arc::new(AlgorithmRegistry::new()));
        let id = ClusterId {
            algorithm: reason::ALGORITHM_NAME.to_string(),
            id: "ff".to_string(),
        };
        let cluster = summaries.summarize("chromium", &id, None, true, Utc::now()).await.unwrap();
        assert!(!cluster.has_example);
        assert!(cluster.title.is_empty());
        assert_eq!(cluster.failures.unwrap().seven_day, 0);
    }

    #[tokio::test]
    async fn test_rule_cluster_definition_visibility() {
        let summaries = ClusterSummaries::new(Datastore::memory(), Arc::new(AlgorithmRegistry::new()));
        let rule = FailureAssociationRule {
            project: "chromium".to_string(),
            rule_id: "a".repeat(32),
            rule_definition: r#"test = "t1""#.to_string(),
            ..Default::default()
        };
        let id = ClusterId {
            algorithm: rules::ALGORITHM_NAME.to_string(),
            id: rule.rule_id.clone(),
        };
        let now = Utc::now();
        let hidden = summaries.summarize("chromium", &id, Some(&rule), false, now).await.unwrap();
        assert!(hidden.title.is_empty());
        let shown = summaries.summarize("chromium", &id, Some(&rule), true, now).await.unwrap();
        assert_eq!(shown.title, r#"test = "t1""#);
    }
}
