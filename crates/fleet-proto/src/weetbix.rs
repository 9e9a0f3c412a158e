//! Weetbix messages (`weetbix.v1` package)

use std::collections::BTreeMap;

use prost_types::{FieldMask, Timestamp};
use serde::{Deserialize, Serialize};

pub const CLUSTERS_SERVICE: &str = "weetbix.v1.Clusters";
pub const RULES_SERVICE: &str = "weetbix.v1.Rules";
pub const PROJECTS_SERVICE: &str = "weetbix.v1.Projects";
pub const TEST_HISTORY_SERVICE: &str = "weetbix.v1.TestHistory";

// ---------------------------------------------------------------------------
// Common
// ---------------------------------------------------------------------------

/// Identifies a cluster within a project
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClusterId {
    /// e.g. `reason-v3`, `testname-v3`, `rules-v2`
    #[prost(string, tag = "1")]
    pub algorithm: String,
    /// Lowercase hex, at most 32 characters
    #[prost(string, tag = "2")]
    pub id: String,
}

/// Key/value pairs describing the configuration a test ran in
#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Variant {
    #[prost(btree_map = "string, string", tag = "1")]
    pub def: BTreeMap<String, String>,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FailureReason {
    #[prost(string, tag = "1")]
    pub primary_error_message: String,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AssociatedBug {
    /// `monorail` or `buganizer`
    #[prost(string, tag = "1")]
    pub system: String,
    /// `{project}/{number}` for monorail, a number for buganizer
    #[prost(string, tag = "2")]
    pub id: String,
    #[prost(string, tag = "3")]
    pub link_text: String,
    #[prost(string, tag = "4")]
    pub url: String,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TimeRange {
    #[prost(message, optional, tag = "1")]
    #[serde(with = "crate::serde_helpers::timestamp", skip_serializing_if = "Option::is_none")]
    pub earliest: Option<Timestamp>,
    #[prost(message, optional, tag = "2")]
    #[serde(with = "crate::serde_helpers::timestamp", skip_serializing_if = "Option::is_none")]
    pub latest: Option<Timestamp>,
}

// ---------------------------------------------------------------------------
// Clusters
// ---------------------------------------------------------------------------

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClusterTestResult {
    /// Opaque tag echoed back in the response
    #[prost(string, tag = "1")]
    pub request_tag: String,
    #[prost(string, tag = "2")]
    pub test_id: String,
    #[prost(message, optional, tag = "3")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<FailureReason>,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClusterRequest {
    #[prost(string, tag = "1")]
    pub project: String,
    #[prost(message, repeated, tag = "2")]
    pub test_results: Vec<ClusterTestResult>,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClusterEntry {
    #[prost(message, optional, tag = "1")]
    pub cluster_id: Option<ClusterId>,
    /// Bug associated with the cluster, set for `rules-v2` clusters
    #[prost(message, optional, tag = "2")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bug: Option<AssociatedBug>,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClusterResult {
    #[prost(string, tag = "1")]
    pub request_tag: String,
    #[prost(message, repeated, tag = "2")]
    pub clusters: Vec<ClusterEntry>,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClusteringVersion {
    #[prost(int32, tag = "1")]
    pub algorithms_version: i32,
    /// Last time any rule predicate in the project changed
    #[prost(message, optional, tag = "2")]
    #[serde(with = "crate::serde_helpers::timestamp", skip_serializing_if = "Option::is_none")]
    pub rules_version: Option<Timestamp>,
    #[prost(message, optional, tag = "3")]
    #[serde(with = "crate::serde_helpers::timestamp", skip_serializing_if = "Option::is_none")]
    pub config_version: Option<Timestamp>,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClusterResponse {
    #[prost(message, repeated, tag = "1")]
    pub cluster_results: Vec<ClusterResult>,
    #[prost(message, optional, tag = "2")]
    pub clustering_version: Option<ClusteringVersion>,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BatchGetClustersRequest {
    /// `projects/{project}`
    #[prost(string, tag = "1")]
    pub parent: String,
    /// `projects/{project}/clusters/{cluster_alg}/{cluster_id}`
    #[prost(string, repeated, tag = "2")]
    pub names: Vec<String>,
}

/// Failure counts over trailing windows
#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MetricValues {
    #[prost(int64, tag = "1")]
    #[serde(with = "crate::serde_helpers::int64_string")]
    pub one_day: i64,
    #[prost(int64, tag = "2")]
    #[serde(with = "crate::serde_helpers::int64_string")]
    pub three_day: i64,
    #[prost(int64, tag = "3")]
    #[serde(with = "crate::serde_helpers::int64_string")]
    pub seven_day: i64,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Cluster {
    #[prost(string, tag = "1")]
    pub name: String,
    /// Whether any failure in the cluster is known
    #[prost(bool, tag = "2")]
    pub has_example: bool,
    /// Example test id, failure reason or rule definition
    #[prost(string, tag = "3")]
    pub title: String,
    #[prost(message, optional, tag = "4")]
    pub failures: Option<MetricValues>,
    #[prost(string, repeated, tag = "5")]
    pub top_test_ids: Vec<String>,
    /// Suggested rule that would match exactly this cluster
    #[prost(string, tag = "6")]
    pub equivalent_failure_association_rule: String,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BatchGetClustersResponse {
    #[prost(message, repeated, tag = "1")]
    pub clusters: Vec<Cluster>,
}

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Rule {
    /// `projects/{project}/rules/{rule_id}`
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(string, tag = "2")]
    pub project: String,
    #[prost(string, tag = "3")]
    pub rule_id: String,
    /// Omitted when the caller lacks `analysis.rules.getDefinition`
    #[prost(string, tag = "4")]
    pub rule_definition: String,
    #[prost(message, optional, tag = "5")]
    pub bug: Option<AssociatedBug>,
    #[prost(bool, tag = "6")]
    pub is_active: bool,
    #[prost(bool, tag = "7")]
    pub is_managing_bug: bool,
    #[prost(message, optional, tag = "8")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_cluster: Option<ClusterId>,
    #[prost(message, optional, tag = "9")]
    #[serde(with = "crate::serde_helpers::timestamp", skip_serializing_if = "Option::is_none")]
    pub create_time: Option<Timestamp>,
    #[prost(string, tag = "10")]
    pub create_user: String,
    #[prost(message, optional, tag = "11")]
    #[serde(with = "crate::serde_helpers::timestamp", skip_serializing_if = "Option::is_none")]
    pub last_update_time: Option<Timestamp>,
    #[prost(string, tag = "12")]
    pub last_update_user: String,
    #[prost(message, optional, tag = "13")]
    #[serde(with = "crate::serde_helpers::timestamp", skip_serializing_if = "Option::is_none")]
    pub predicate_last_update_time: Option<Timestamp>,
    #[prost(string, tag = "14")]
    pub etag: String,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GetRuleRequest {
    #[prost(string, tag = "1")]
    pub name: String,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ListRulesRequest {
    /// `projects/{project}`
    #[prost(string, tag = "1")]
    pub parent: String,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ListRulesResponse {
    #[prost(message, repeated, tag = "1")]
    pub rules: Vec<Rule>,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateRuleRequest {
    #[prost(string, tag = "1")]
    pub parent: String,
    #[prost(message, optional, tag = "2")]
    pub rule: Option<Rule>,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UpdateRuleRequest {
    #[prost(message, optional, tag = "1")]
    pub rule: Option<Rule>,
    #[prost(message, optional, tag = "2")]
    #[serde(with = "crate::serde_helpers::field_mask", skip_serializing_if = "Option::is_none")]
    pub update_mask: Option<FieldMask>,
    /// If set, the update only happens when the stored rule has this etag
    #[prost(string, tag = "3")]
    pub etag: String,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LookupBugRequest {
    #[prost(string, tag = "1")]
    pub system: String,
    #[prost(string, tag = "2")]
    pub id: String,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LookupBugResponse {
    /// Names of rules the caller can see that reference the bug
    #[prost(string, repeated, tag = "1")]
    pub rules: Vec<String>,
}

// ---------------------------------------------------------------------------
// Projects
// ---------------------------------------------------------------------------

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Project {
    /// `projects/{project}`
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(string, tag = "2")]
    pub display_name: String,
    #[prost(string, tag = "3")]
    pub project: String,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ListProjectsRequest {}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ListProjectsResponse {
    #[prost(message, repeated, tag = "1")]
    pub projects: Vec<Project>,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GetProjectConfigRequest {
    /// `projects/{project}/config`
    #[prost(string, tag = "1")]
    pub name: String,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MonorailProject {
    #[prost(string, tag = "1")]
    pub project: String,
    /// Prefix used when displaying bug ids, e.g. `crbug.com`
    #[prost(string, tag = "2")]
    pub display_prefix: String,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProjectConfig {
    /// `projects/{project}/config`
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(message, optional, tag = "2")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monorail: Option<MonorailProject>,
}

// ---------------------------------------------------------------------------
// Test history
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum TestVerdictStatus {
    Unspecified = 0,
    Unexpected = 10,
    UnexpectedlySkipped = 20,
    Flaky = 30,
    Exonerated = 40,
    Expected = 50,
}

impl TestVerdictStatus {
    /// Whether the verdict contains an unexpected failure
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Unexpected | Self::UnexpectedlySkipped)
    }
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VariantPredicate {
    /// Variant must match exactly
    #[prost(message, optional, tag = "1")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub equals: Option<Variant>,
    /// Variant must contain every given key/value pair
    #[prost(message, optional, tag = "2")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contains: Option<Variant>,
    #[prost(string, tag = "3")]
    pub hash_equals: String,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TestVerdictPredicate {
    /// Restrict to one realm within the project, e.g. `ci`
    #[prost(string, tag = "1")]
    pub sub_realm: String,
    #[prost(message, optional, tag = "2")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variant_predicate: Option<VariantPredicate>,
    #[prost(message, optional, tag = "3")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partition_time_range: Option<TimeRange>,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TestVerdict {
    #[prost(string, tag = "1")]
    pub test_id: String,
    #[prost(string, tag = "2")]
    pub variant_hash: String,
    #[prost(string, tag = "3")]
    pub invocation_id: String,
    #[prost(enumeration = "TestVerdictStatus", tag = "4")]
    pub status: i32,
    #[prost(message, optional, tag = "5")]
    #[serde(with = "crate::serde_helpers::timestamp", skip_serializing_if = "Option::is_none")]
    pub partition_time: Option<Timestamp>,
    #[prost(message, optional, tag = "6")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<FailureReason>,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueryTestHistoryRequest {
    #[prost(string, tag = "1")]
    pub project: String,
    #[prost(string, tag = "2")]
    pub test_id: String,
    #[prost(message, optional, tag = "3")]
    pub predicate: Option<TestVerdictPredicate>,
    #[prost(int32, tag = "4")]
    pub page_size: i32,
    #[prost(string, tag = "5")]
    pub page_token: String,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueryTestHistoryResponse {
    #[prost(message, repeated, tag = "1")]
    pub verdicts: Vec<TestVerdict>,
    #[prost(string, tag = "2")]
    pub next_page_token: String,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueryTestHistoryStatsRequest {
    #[prost(string, tag = "1")]
    pub project: String,
    #[prost(string, tag = "2")]
    pub test_id: String,
    #[prost(message, optional, tag = "3")]
    pub predicate: Option<TestVerdictPredicate>,
    #[prost(int32, tag = "4")]
    pub page_size: i32,
    #[prost(string, tag = "5")]
    pub page_token: String,
}

/// Verdict counts for one variant on one day
#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TestHistoryStatsGroup {
    #[prost(message, optional, tag = "1")]
    #[serde(with = "crate::serde_helpers::timestamp", skip_serializing_if = "Option::is_none")]
    pub partition_time: Option<Timestamp>,
    #[prost(string, tag = "2")]
    pub variant_hash: String,
    #[prost(int32, tag = "3")]
    pub unexpected_count: i32,
    #[prost(int32, tag = "4")]
    pub unexpectedly_skipped_count: i32,
    #[prost(int32, tag = "5")]
    pub flaky_count: i32,
    #[prost(int32, tag = "6")]
    pub exonerated_count: i32,
    #[prost(int32, tag = "7")]
    pub expected_count: i32,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueryTestHistoryStatsResponse {
    #[prost(message, repeated, tag = "1")]
    pub groups: Vec<TestHistoryStatsGroup>,
    #[prost(string, tag = "2")]
    pub next_page_token: String,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueryVariantsRequest {
    #[prost(string, tag = "1")]
    pub project: String,
    #[prost(string, tag = "2")]
    pub test_id: String,
    #[prost(string, tag = "3")]
    pub sub_realm: String,
    #[prost(int32, tag = "4")]
    pub page_size: i32,
    #[prost(string, tag = "5")]
    pub page_token: String,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VariantInfo {
    #[prost(string, tag = "1")]
    pub variant_hash: String,
    #[prost(message, optional, tag = "2")]
    pub variant: Option<Variant>,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueryVariantsResponse {
    #[prost(message, repeated, tag = "1")]
    pub variants: Vec<VariantInfo>,
    #[prost(string, tag = "2")]
    pub next_page_token: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_values_use_string_int64() {
        let metrics = MetricValues {
            one_day: 1,
            three_day: 3,
            seven_day: 7,
        };
        let json = serde_json::to_value(&metrics).unwrap();
        assert_eq!(json["sevenDay"], "7");

        let parsed: MetricValues =
            serde_json::from_str(r#"{"oneDay":"1","threeDay":3,"sevenDay":"7"}"#).unwrap();
        assert_eq!(parsed, metrics);
    }

    #[test]
    fn test_rule_mask_and_variant() {
        let req: UpdateRuleRequest = serde_json::from_str(
            r#"{"rule":{"name":"projects/chromium/rules/00"},"updateMask":"ruleDefinition,bug"}"#,
        )
        .unwrap();
        assert_eq!(
            req.update_mask.unwrap().paths,
            vec!["rule_definition".to_string(), "bug".to_string()]
        );

        let variant: Variant =
            serde_json::from_str(r#"{"def":{"builder":"linux-rel","os":"Ubuntu"}}"#).unwrap();
        assert_eq!(variant.def.len(), 2);
    }
}
