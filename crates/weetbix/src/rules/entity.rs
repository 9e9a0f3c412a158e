//! 失败关联规则实体

use chrono::{DateTime, SecondsFormat, Utc};
use fleet_common::{Entity, IndexEntry};
use fleet_proto::time::to_timestamp;
use fleet_proto::weetbix::{AssociatedBug, ClusterId, Rule};
use serde::{Deserialize, Serialize};

use crate::names::rule_name;

pub const RULE_KIND: &str = "FailureAssociationRule";

pub const MONORAIL_SYSTEM: &str = "monorail";
pub const BUGANIZER_SYSTEM: &str = "buganizer";

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FailureAssociationRule {
    pub project: String,
    /// 32 位小写十六进制
    pub rule_id: String,
    pub rule_definition: String,
    pub bug_system: String,
    pub bug_id: String,
    pub is_active: bool,
    pub is_managing_bug: bool,
    pub source_cluster_algorithm: String,
    pub source_cluster_id: String,
    pub create_time: Option<DateTime<Utc>>,
    pub create_user: String,
    pub last_update_time: Option<DateTime<Utc>>,
    pub last_update_user: String,
    pub predicate_last_update_time: Option<DateTime<Utc>>,
}

impl FailureAssociationRule {
    pub fn entity_id(project: &str, rule_id: &str) -> String {
        format!("{project}/{rule_id}")
    }

    /// `system/id` 形式的 bug 键
    pub fn bug_key(system: &str, id: &str) -> String {
        format!("{system}/{id}")
    }

    /// 以最后更新时间计算的 etag
    pub fn etag(&self) -> String {
        let time = self
            .last_update_time
            .map(|t| t.to_rfc3339_opts(SecondsFormat::Nanos, true))
            .unwrap_or_default();
        format!("W/\"{time}\"")
    }

    pub fn associated_bug(&self) -> AssociatedBug {
        let (link_text, url) = match self.bug_system.as_str() {
            MONORAIL_SYSTEM => {
                let (project, number) = self.bug_id.split_once('/').unwrap_or(("", self.bug_id.as_str()));
                (
                    self.bug_id.clone(),
                    format!("https://bugs.chromium.org/p/{project}/issues/detail?id={number}"),
                )
            }
            BUGANIZER_SYSTEM => (
                format!("b/{}", self.bug_id),
                format!("https://issuetracker.google.com/issues/{}", self.bug_id),
            ),
            _ => (self.bug_id.clone(), String::new()),
        };
        AssociatedBug {
            system: self.bug_system.clone(),
            id: self.bug_id.clone(),
            link_text,
            url,
        }
    }

    pub fn source_cluster(&self) -> Option<ClusterId> {
        if self.source_cluster_algorithm.is_empty() && self.source_cluster_id.is_empty() {
            return None;
        }
        Some(ClusterId {
            algorithm: self.source_cluster_algorithm.clone(),
            id: self.source_cluster_id.clone(),
        })
    }

    /// 转换为消息；没有 `getDefinition` 权限时不返回规则定义
    pub fn to_rule(&self, include_definition: bool) -> Rule {
        Rule {
            name: rule_name(&self.project, &self.rule_id),
            project: self.project.clone(),
            rule_id: self.rule_id.clone(),
            rule_definition: if include_definition {
                self.rule_definition.clone()
            } else {
                String::new()
            },
            bug: Some(self.associated_bug()),
            is_active: self.is_active,
            is_managing_bug: self.is_managing_bug,
            source_cluster: self.source_cluster(),
            create_time: self.create_time.map(to_timestamp),
            create_user: self.create_user.clone(),
            last_update_time: self.last_update_time.map(to_timestamp),
            last_update_user: self.last_update_user.clone(),
            predicate_last_update_time: self.predicate_last_update_time.map(to_timestamp),
            etag: self.etag(),
        }
    }
}

impl Entity for FailureAssociationRule {
    const KIND: &'static str = RULE_KIND;

    fn id(&self) -> String {
        Self::entity_id(&self.project, &self.rule_id)
    }

    fn index(&self) -> Vec<IndexEntry> {
        let mut entries = vec![
            IndexEntry::new("project", &self.project),
            IndexEntry::new("is_active", self.is_active),
            IndexEntry::new("bug", Self::bug_key(&self.bug_system, &self.bug_id)),
        ];
        if let Some(t) = self.last_update_time {
            entries.push(IndexEntry::new("last_update_time", t.timestamp()));
        }
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_associated_bug_links() {
        let rule = FailureAssociationRule {
            bug_system: MONORAIL_SYSTEM.to_string(),
            bug_id: "chromium/1234".to_string(),
            ..Default::default()
        };
        let bug = rule.associated_bug();
        assert_eq!(bug.link_text, "chromium/1234");
        assert_eq!(bug.url, "https://bugs.chromium.org/p/chromium/issues/detail?id=1234");

        let rule = FailureAssociationRule {
            bug_system: BUGANIZER_SYSTEM.to_string(),
            bug_id: "555".to_string(),
            ..Default::default()
        };
        assert_eq!(rule.associated_bug().link_text, "b/555");
    }

    #[test]
    fn test_to_rule_hides_definition() {
        let rule = FailureAssociationRule {
            project: "chromium".to_string(),
            rule_id: "0".repeat(32),
            rule_definition: r#"test = "a""#.to_string(),
            last_update_time: Some(Utc::now()),
            ..Default::default()
        };
        let full = rule.to_rule(true);
        assert_eq!(full.name, format!("projects/chromium/rules/{}", "0".repeat(32)));
        assert_eq!(full.rule_definition, r#"test = "a""#);
        assert!(full.etag.starts_with("W/\""));
        assert!(full.source_cluster.is_none());

        assert!(rule.to_rule(false).rule_definition.is_empty());
    }
}
