//! 测试历史
//!
//! 每个测试结论（verdict）以 [`TestVerdictEntity`] 保存。实体 ID 中包含取反的
//! 分区时间，所以同一测试的结论按 ID 升序遍历即为按时间倒序。

use std::cmp::Reverse;
use std::collections::BTreeMap;

use base64::prelude::*;
use chrono::{DateTime, Utc};
use fleet_common::storage::FilterOp;
use fleet_common::{Datastore, Entity, IndexEntry, Query};
use fleet_proto::time::to_timestamp;
use fleet_proto::weetbix::{
    FailureReason, TestHistoryStatsGroup, TestVerdict, TestVerdictPredicate, TestVerdictStatus,
    Variant, VariantInfo,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::clustering::hash_id;
use crate::error::{WeetbixError, WeetbixResult};

pub const TEST_VERDICT_KIND: &str = "TestVerdict";

const END_OF_TIME_MICROS: i64 = 253_402_300_799_999_999;
const SECONDS_PER_DAY: i64 = 24 * 60 * 60;

/// 变体哈希：排序后的 `key:value` 以换行连接，取 SHA-256 前 8 字节
pub fn variant_hash(variant: &BTreeMap<String, String>) -> String {
    let text = variant
        .iter()
        .map(|(k, v)| format!("{k}:{v}"))
        .collect::<Vec<_>>()
        .join("\n");
    hex::encode(&Sha256::digest(text.as_bytes())[..8])
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TestVerdictEntity {
    pub project: String,
    pub sub_realm: String,
    pub test_id: String,
    pub variant_hash: String,
    pub variant: BTreeMap<String, String>,
    pub invocation_id: String,
    pub status: i32,
    pub partition_time: DateTime<Utc>,
    pub failure_reason: String,
}

impl TestVerdictEntity {
    pub fn to_verdict(&self) -> TestVerdict {
        TestVerdict {
            test_id: self.test_id.clone(),
            variant_hash: self.variant_hash.clone(),
            invocation_id: self.invocation_id.clone(),
            status: self.status,
            partition_time: Some(to_timestamp(self.partition_time)),
            failure_reason: (!self.failure_reason.is_empty()).then(|| FailureReason {
                primary_error_message: self.failure_reason.clone(),
            }),
        }
    }

    fn day(&self) -> i64 {
        self.partition_time.timestamp().div_euclid(SECONDS_PER_DAY) * SECONDS_PER_DAY
    }
}

impl Entity for TestVerdictEntity {
    const KIND: &'static str = TEST_VERDICT_KIND;

    fn id(&self) -> String {
        let inverted = END_OF_TIME_MICROS - self.partition_time.timestamp_micros();
        format!(
            "{}/{}/{inverted:018}/{}/{}",
            self.project,
            hash_id(&self.test_id),
            self.variant_hash,
            self.invocation_id
        )
    }

    fn index(&self) -> Vec<IndexEntry> {
        let mut entries = vec![
            IndexEntry::new("project", &self.project),
            IndexEntry::new("test_id", &self.test_id),
            IndexEntry::new("sub_realm", &self.sub_realm),
            IndexEntry::new("variant_hash", &self.variant_hash),
            IndexEntry::new("status", self.status),
            IndexEntry::new("partition_time", self.partition_time.timestamp()),
        ];
        entries.extend(IndexEntry::many(
            "variant",
            self.variant.iter().map(|(k, v)| format!("{k}:{v}")),
        ));
        entries
    }
}

/// 调用方可读取的子 realm 范围
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubRealms {
    /// 项目内全部子 realm
    All,
    Only(Vec<String>),
}

/// 构造某个测试的结论查询
pub fn verdict_query(
    project: &str,
    test_id: &str,
    predicate: Option<&TestVerdictPredicate>,
    sub_realms: &SubRealms,
) -> WeetbixResult<Query> {
    let mut query = Query::of::<TestVerdictEntity>()
        .eq("project", project)
        .eq("test_id", test_id);

    if let SubRealms::Only(realms) = sub_realms {
        query = query.in_values("sub_realm", realms.iter().map(String::as_str));
    }

    let Some(predicate) = predicate else {
        return Ok(query);
    };
    if let Some(vp) = &predicate.variant_predicate {
        let set = [vp.equals.is_some(), vp.contains.is_some(), !vp.hash_equals.is_empty()]
            .iter()
            .filter(|s| **s)
            .count();
        if set > 1 {
            return Err(WeetbixError::invalid(
                "predicate.variant_predicate: at most one of equals, contains and hash_equals may be set",
            ));
        }
        if let Some(equals) = &vp.equals {
            query = query.eq("variant_hash", variant_hash(&equals.def));
        }
        if !vp.hash_equals.is_empty() {
            query = query.eq("variant_hash", vp.hash_equals.as_str());
        }
        if let Some(contains) = &vp.contains {
            for (k, v) in &contains.def {
                query = query.eq("variant", format!("{k}:{v}"));
            }
        }
    }
    if let Some(range) = &predicate.partition_time_range {
        if let Some(earliest) = &range.earliest {
            query = query.filter("partition_time", FilterOp::Ge, earliest.seconds);
        }
        if let Some(latest) = &range.latest {
            query = query.filter("partition_time", FilterOp::Lt, latest.seconds);
        }
    }
    Ok(query)
}

/// 查询一页结论
pub async fn query_verdicts(
    store: &Datastore,
    query: Query,
    page_size: usize,
    page_token: &str,
) -> WeetbixResult<(Vec<TestVerdict>, String)> {
    let query = query.start(page_token)?.limit(page_size);
    let page = store.run_query::<TestVerdictEntity>(&query).await?;
    let token = page.next_token();
    Ok((page.items.iter().map(TestVerdictEntity::to_verdict).collect(), token))
}

fn encode_token(key: &str) -> String {
    BASE64_URL_SAFE_NO_PAD.encode(key)
}

fn decode_token(token: &str) -> WeetbixResult<Option<String>> {
    if token.is_empty() {
        return Ok(None);
    }
    BASE64_URL_SAFE_NO_PAD
        .decode(token)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .map(Some)
        .ok_or_else(|| WeetbixError::invalid(format!("page_token: invalid token {token:?}")))
}

/// 日期倒序的定长分页键
///
/// 翻转符号位后按位取反，1970 年之前的日期也保持字典序与倒序一致。
fn descending_day_key(day: i64) -> String {
    format!("{:016x}", !((day as u64) ^ (1 << 63)))
}

/// 取出 `after` 之后的一页；`keys` 必须已按顺序排列
fn paginate<T>(items: Vec<(String, T)>, page_size: usize, after: Option<&str>) -> (Vec<T>, String) {
    let start = match after {
        Some(after) => items.iter().position(|(k, _)| k.as_str() > after).unwrap_or(items.len()),
        None => 0,
    };
    let remaining = items.len() - start;
    let mut page: Vec<(String, T)> = items.into_iter().skip(start).take(page_size).collect();
    let token = if remaining > page_size {
        page.last().map(|(k, _)| encode_token(k)).unwrap_or_default()
    } else {
        String::new()
    };
    (page.drain(..).map(|(_, v)| v).collect(), token)
}

/// 按天和变体统计结论，按日期倒序
pub async fn query_stats(
    store: &Datastore,
    query: Query,
    page_size: usize,
    page_token: &str,
) -> WeetbixResult<(Vec<TestHistoryStatsGroup>, String)> {
    let after = decode_token(page_token)?;
    let verdicts = store.get_all::<TestVerdictEntity>(&query).await?;

    let mut groups: BTreeMap<(Reverse<i64>, String), TestHistoryStatsGroup> = BTreeMap::new();
    for verdict in &verdicts {
        let day = verdict.day();
        let group = groups
            .entry((Reverse(day), verdict.variant_hash.clone()))
            .or_insert_with(|| TestHistoryStatsGroup {
                partition_time: DateTime::from_timestamp(day, 0).map(to_timestamp),
                variant_hash: verdict.variant_hash.clone(),
                ..Default::default()
            });
        match TestVerdictStatus::try_from(verdict.status).unwrap_or(TestVerdictStatus::Unspecified) {
            TestVerdictStatus::Unexpected => group.unexpected_count += 1,
            TestVerdictStatus::UnexpectedlySkipped => group.unexpectedly_skipped_count += 1,
            TestVerdictStatus::Flaky => group.flaky_count += 1,
            TestVerdictStatus::Exonerated => group.exonerated_count += 1,
            TestVerdictStatus::Expected => group.expected_count += 1,
            TestVerdictStatus::Unspecified => {}
        }
    }

    let keyed = groups
        .into_iter()
        .map(|((Reverse(day), hash), group)| (format!("{}/{hash}", descending_day_key(day)), group))
        .collect();
    Ok(paginate(keyed, page_size, after.as_deref()))
}

/// 测试出现过的全部变体，按变体哈希排序
pub async fn query_variants(
    store: &Datastore,
    query: Query,
    page_size: usize,
    page_token: &str,
) -> WeetbixResult<(Vec<VariantInfo>, String)> {
    let after = decode_token(page_token)?;
    let verdicts = store.get_all::<TestVerdictEntity>(&query).await?;

    let mut variants: BTreeMap<String, VariantInfo> = BTreeMap::new();
    for verdict in verdicts {
        variants
            .entry(verdict.variant_hash.clone())
            .or_insert_with(|| VariantInfo {
                variant_hash: verdict.variant_hash,
                variant: Some(Variant { def: verdict.variant }),
            });
    }
    Ok(paginate(variants.into_iter().collect(), page_size, after.as_deref()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use fleet_proto::weetbix::{TimeRange, VariantPredicate};

    fn variant(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn verdict(
        sub_realm: &str,
        v: &BTreeMap<String, String>,
        hours_ago: i64,
        status: TestVerdictStatus,
        invocation: &str,
    ) -> TestVerdictEntity {
        TestVerdictEntity {
            project: "chromium".to_string(),
            sub_realm: sub_realm.to_string(),
            test_id: "ninja://test".to_string(),
            variant_hash: variant_hash(v),
            variant: v.clone(),
            invocation_id: invocation.to_string(),
            status: status as i32,
            partition_time: DateTime::from_timestamp(1_700_000_000, 0).unwrap() - Duration::hours(hours_ago),
            failure_reason: String::new(),
        }
    }

    async fn seeded() -> Datastore {
        let store = Datastore::memory();
        let linux = variant(&[("builder", "linux-rel"), ("os", "linux")]);
        let mac = variant(&[("builder", "mac-rel"), ("os", "mac")]);
        for v in [
            verdict("ci", &linux, 1, TestVerdictStatus::Expected, "inv-1"),
            verdict("ci", &linux, 2, TestVerdictStatus::Unexpected, "inv-2"),
            verdict("ci", &mac, 3, TestVerdictStatus::Flaky, "inv-3"),
            verdict("try", &linux, 30, TestVerdictStatus::Expected, "inv-4"),
        ] {
            store.put(&v).await.unwrap();
        }
        store
    }

    #[test]
    fn test_variant_hash_is_stable() {
        let a = variant(&[("os", "linux"), ("builder", "b")]);
        let b = variant(&[("builder", "b"), ("os", "linux")]);
        assert_eq!(variant_hash(&a), variant_hash(&b));
        assert_eq!(variant_hash(&a).len(), 16);
        assert_ne!(variant_hash(&a), variant_hash(&variant(&[("os", "mac")])));
    }

    #[tokio::test]
    async fn test_query_newest_first_and_paginated() {
        let store = seeded().await;
        let query = verdict_query("chromium", "ninja://test", None, &SubRealms::All).unwrap();
        let (page, token) = query_verdicts(&store, query.clone(), 3, "").await.unwrap();
        let invocations: Vec<_> = page.iter().map(|v| v.invocation_id.as_str()).collect();
        assert_eq!(invocations, vec!["inv-1", "inv-2", "inv-3"]);
        assert!(!token.is_empty());

        let (rest, token) = query_verdicts(&store, query, 3, &token).await.unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].invocation_id, "inv-4");
        assert!(token.is_empty());
    }

    #[tokio::test]
    async fn test_sub_realm_and_variant_filters() {
        let store = seeded().await;
        let only_ci = SubRealms::Only(vec!["ci".to_string()]);
        let query = verdict_query("chromium", "ninja://test", None, &only_ci).unwrap();
        let (page, _) = query_verdicts(&store, query, 10, "").await.unwrap();
        assert_eq!(page.len(), 3);

        let predicate = TestVerdictPredicate {
            variant_predicate: Some(VariantPredicate {
                contains: Some(Variant {
                    def: variant(&[("os", "linux")]),
                }),
                ..Default::default()
            }),
            ..Default::default()
        };
        let query = verdict_query("chromium", "ninja://test", Some(&predicate), &SubRealms::All).unwrap();
        let (page, _) = query_verdicts(&store, query, 10, "").await.unwrap();
        assert_eq!(page.len(), 3);

        let predicate = TestVerdictPredicate {
            variant_predicate: Some(VariantPredicate {
                equals: Some(Variant {
                    def: variant(&[("builder", "mac-rel"), ("os", "mac")]),
                }),
                ..Default::default()
            }),
            partition_time_range: Some(TimeRange {
                earliest: Some(fleet_proto::Timestamp {
                    seconds: 1_700_000_000 - 4 * 3600,
                    nanos: 0,
                }),
                latest: None,
            }),
            ..Default::default()
        };
        let query = verdict_query("chromium", "ninja://test", Some(&predicate), &SubRealms::All).unwrap();
        let (page, _) = query_verdicts(&store, query, 10, "").await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].invocation_id, "inv-3");
    }

    #[test]
    fn test_conflicting_variant_predicate() {
        let predicate = TestVerdictPredicate {
            variant_predicate: Some(VariantPredicate {
                equals: Some(Variant::default()),
                hash_equals: "0123456789abcdef".to_string(),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(verdict_query("chromium", "t", Some(&predicate), &SubRealms::All).is_err());
    }

    #[tokio::test]
    async fn test_stats_grouped_by_day_and_variant() {
        let store = seeded().await;
        let query = verdict_query("chromium", "ninja://test", None, &SubRealms::All).unwrap();
        let (groups, token) = query_stats(&store, query.clone(), 2, "").await.unwrap();
        assert_eq!(groups.len(), 2);
        assert!(!token.is_empty());
        // 同一天的 linux 组
        let linux = groups
            .iter()
            .find(|g| g.expected_count == 1 && g.unexpected_count == 1)
            .unwrap();
        assert_eq!(linux.flaky_count, 0);

        let (rest, token) = query_stats(&store, query, 2, &token).await.unwrap();
        assert_eq!(rest.len(), 1);
        assert!(token.is_empty());
        assert!(rest[0].partition_time.unwrap().seconds < groups[0].partition_time.unwrap().seconds);

        assert!(query_stats(&store, Query::of::<TestVerdictEntity>(), 2, "!!").await.is_err());
    }

    #[tokio::test]
    async fn test_stats_before_epoch_keep_descending_order() {
        let store = Datastore::memory();
        let linux = variant(&[("os", "linux")]);
        let epoch = DateTime::from_timestamp(0, 0).unwrap();
        for (days, invocation) in [(1, "inv-a"), (-3, "inv-b"), (-400, "inv-c")] {
            let mut v = verdict("ci", &linux, 0, TestVerdictStatus::Expected, invocation);
            v.partition_time = epoch + Duration::days(days);
            store.put(&v).await.unwrap();
        }

        let query = verdict_query("chromium", "ninja://test", None, &SubRealms::All).unwrap();
        let mut seconds = Vec::new();
        let mut token = String::new();
        loop {
            let (page, next) = query_stats(&store, query.clone(), 1, &token).await.unwrap();
            seconds.extend(page.iter().map(|g| g.partition_time.unwrap().seconds));
            if next.is_empty() {
                break;
            }
            token = next;
        }
        let day = SECONDS_PER_DAY;
        assert_eq!(seconds, vec![day, -3 * day, -400 * day]);

        assert!(descending_day_key(-day) > descending_day_key(0));
        assert!(descending_day_key(i64::MIN) > descending_day_key(i64::MAX));
    }

    #[tokio::test]
    async fn test_query_variants() {
        let store = seeded().await;
        let query = verdict_query("chromium", "ninja://test", None, &SubRealms::All).unwrap();
        let (variants, token) = query_variants(&store, query, 10, "").await.unwrap();
        assert_eq!(variants.len(), 2);
        assert!(token.is_empty());
        assert!(variants[0].variant_hash < variants[1].variant_hash);
    }
}
