//! 失败关联规则仓库
//!
//! 规则把匹配的失败关联到一个 bug。同一个 bug 最多只能被一条生效规则
//! 引用。更新支持 update mask，调用方可带上读取时的 etag 做乐观并发检查。

pub mod entity;
pub mod lang;

use chrono::{DateTime, Utc};
use fleet_common::{Datastore, Query};
use fleet_proto::weetbix::{AssociatedBug, ClusterId};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::info;

pub use entity::{BUGANIZER_SYSTEM, FailureAssociationRule, MONORAIL_SYSTEM, RULE_KIND};

use crate::error::{RuleError, WeetbixError, WeetbixResult};
use crate::names::validate_cluster_id;

/// 规则定义的最大长度
pub const MAX_DEFINITION_LENGTH: usize = 4096;

/// update mask 允许的字段
pub const UPDATABLE_FIELDS: &[&str] = &[
    "rule_definition",
    "bug",
    "is_active",
    "is_managing_bug",
    "source_cluster",
];

static MONORAIL_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9\-]+/[1-9][0-9]*$").expect("valid regex"));
static BUGANIZER_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[1-9][0-9]*$").expect("valid regex"));

pub fn validate_definition(definition: &str) -> Result<(), RuleError> {
    if definition.is_empty() {
        return Err(RuleError::Invalid("rule definition: unspecified".to_string()));
    }
    if definition.len() > MAX_DEFINITION_LENGTH {
        return Err(RuleError::Invalid(format!(
            "rule definition: exceeds maximum length of {MAX_DEFINITION_LENGTH}"
        )));
    }
    lang::parse(definition)?;
    Ok(())
}

pub fn validate_bug(bug: Option<&AssociatedBug>) -> Result<(), RuleError> {
    let bug = bug.ok_or_else(|| RuleError::Bug("unspecified".to_string()))?;
    let valid = match bug.system.as_str() {
        MONORAIL_SYSTEM => MONORAIL_ID_RE.is_match(&bug.id),
        BUGANIZER_SYSTEM => BUGANIZER_ID_RE.is_match(&bug.id),
        other => {
            return Err(RuleError::Bug(format!("invalid bug tracking system {other:?}")));
        }
    };
    if !valid {
        return Err(RuleError::Bug(format!("invalid {} bug id {:?}", bug.system, bug.id)));
    }
    Ok(())
}

fn validate_source_cluster(cluster: Option<&ClusterId>) -> WeetbixResult<()> {
    match cluster {
        Some(c) if !(c.algorithm.is_empty() && c.id.is_empty()) => validate_cluster_id(c),
        _ => Ok(()),
    }
}

fn new_rule_id() -> String {
    hex::encode(rand::random::<[u8; 16]>())
}

/// 新规则的内容
#[derive(Debug, Clone, Default)]
pub struct NewRule {
    pub rule_definition: String,
    pub bug: Option<AssociatedBug>,
    pub is_active: bool,
    pub is_managing_bug: bool,
    pub source_cluster: Option<ClusterId>,
}

/// 规则仓库
#[derive(Clone, Debug)]
pub struct RulesRepository {
    store: Datastore,
}

impl RulesRepository {
    pub fn new(store: Datastore) -> Self {
        Self { store }
    }

    pub async fn get(&self, project: &str, rule_id: &str) -> WeetbixResult<FailureAssociationRule> {
        self.store
            .try_get(&FailureAssociationRule::entity_id(project, rule_id))
            .await?
            .ok_or_else(|| WeetbixError::NotFound(format!("rule {project}/{rule_id}")))
    }

    /// 项目下的全部规则（含未生效的）
    pub async fn list(&self, project: &str) -> WeetbixResult<Vec<FailureAssociationRule>> {
        let query = Query::of::<FailureAssociationRule>().eq("project", project);
        Ok(self.store.get_all(&query).await?)
    }

    /// 项目下生效的规则
    pub async fn read_active(&self, project: &str) -> WeetbixResult<Vec<FailureAssociationRule>> {
        let query = Query::of::<FailureAssociationRule>()
            .eq("project", project)
            .eq("is_active", true);
        Ok(self.store.get_all(&query).await?)
    }

    /// 引用指定 bug 的生效规则，可能跨项目
    pub async fn lookup_bug(&self, system: &str, id: &str) -> WeetbixResult<Vec<FailureAssociationRule>> {
        let query = Query::of::<FailureAssociationRule>()
            .eq("bug", FailureAssociationRule::bug_key(system, id))
            .eq("is_active", true);
        Ok(self.store.get_all(&query).await?)
    }

    /// 项目规则集的最后修改时间
    pub async fn last_updated(&self, project: &str) -> WeetbixResult<Option<DateTime<Utc>>> {
        Ok(self
            .list(project)
            .await?
            .iter()
            .filter_map(|r| r.last_update_time)
            .max())
    }

    async fn check_bug_unused(&self, rule: &FailureAssociationRule) -> WeetbixResult<()> {
        if !rule.is_active {
            return Ok(());
        }
        let conflicting = self
            .lookup_bug(&rule.bug_system, &rule.bug_id)
            .await?
            .into_iter()
            .find(|other| !(other.project == rule.project && other.rule_id == rule.rule_id));
        match conflicting {
            Some(other) => Err(WeetbixError::AlreadyExists(format!(
                "bug {}/{} is already used by rule {}/{}",
                rule.bug_system, rule.bug_id, other.project, other.rule_id
            ))),
            None => Ok(()),
        }
    }

    /// 创建规则，规则 ID 由服务端生成
    pub async fn create(&self, project: &str, new: NewRule, user: &str) -> WeetbixResult<FailureAssociationRule> {
        validate_definition(&new.rule_definition)?;
        validate_bug(new.bug.as_ref())?;
        validate_source_cluster(new.source_cluster.as_ref())?;
        let bug = new.bug.unwrap_or_default();
        let source = new.source_cluster.unwrap_or_default();

        let now = Utc::now();
        let rule = FailureAssociationRule {
            project: project.to_string(),
            rule_id: new_rule_id(),
            rule_definition: new.rule_definition,
            bug_system: bug.system,
            bug_id: bug.id,
            is_active: new.is_active,
            is_managing_bug: new.is_managing_bug,
            source_cluster_algorithm: source.algorithm,
            source_cluster_id: source.id,
            create_time: Some(now),
            create_user: user.to_string(),
            last_update_time: Some(now),
            last_update_user: user.to_string(),
            predicate_last_update_time: Some(now),
        };
        self.check_bug_unused(&rule).await?;
        self.store.insert(&rule).await?;

        info!(project, rule_id = %rule.rule_id, user, "rule created");
        Ok(rule)
    }

    /// 按 update mask 更新规则
    ///
    /// `etag` 非空时必须与当前规则一致，否则返回 `Aborted`。
    pub async fn update(
        &self,
        project: &str,
        rule_id: &str,
        changes: NewRule,
        paths: &[String],
        etag: &str,
        user: &str,
    ) -> WeetbixResult<FailureAssociationRule> {
        if paths.is_empty() {
            return Err(WeetbixError::invalid("update_mask: unspecified"));
        }
        let mut rule = self.get(project, rule_id).await?;
        if !etag.is_empty() && etag != rule.etag() {
            return Err(WeetbixError::Aborted(format!(
                "etag {etag:?} does not match the current rule, re-read the rule and retry"
            )));
        }

        let mut predicate_changed = false;
        for path in paths {
            match path.as_str() {
                "rule_definition" => {
                    validate_definition(&changes.rule_definition)?;
                    predicate_changed |= rule.rule_definition != changes.rule_definition;
                    rule.rule_definition = changes.rule_definition.clone();
                }
                "bug" => {
                    validate_bug(changes.bug.as_ref())?;
                    let bug = changes.bug.clone().unwrap_or_default();
                    rule.bug_system = bug.system;
                    rule.bug_id = bug.id;
                }
                "is_active" => {
                    predicate_changed |= rule.is_active != changes.is_active;
                    rule.is_active = changes.is_active;
                }
                "is_managing_bug" => rule.is_managing_bug = changes.is_managing_bug,
                "source_cluster" => {
                    validate_source_cluster(changes.source_cluster.as_ref())?;
                    let source = changes.source_cluster.clone().unwrap_or_default();
                    rule.source_cluster_algorithm = source.algorithm;
                    rule.source_cluster_id = source.id;
                }
                other => {
                    return Err(WeetbixError::invalid(format!(
                        "update_mask: unsupported field path {other:?}"
                    )));
                }
            }
        }
        self.check_bug_unused(&rule).await?;

        let now = Utc::now();
        rule.last_update_time = Some(now);
        rule.last_update_user = user.to_string();
        if predicate_changed {
            rule.predicate_last_update_time = Some(now);
        }
        self.store.update(&rule).await?;

        info!(project, rule_id, user, fields = ?paths, "rule updated");
        Ok(rule)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bug(id: &str) -> Option<AssociatedBug> {
        Some(AssociatedBug {
            system: MONORAIL_SYSTEM.to_string(),
            id: id.to_string(),
            ..Default::default()
        })
    }

    fn new_rule(definition: &str, bug_id: &str) -> NewRule {
        NewRule {
            rule_definition: definition.to_string(),
            bug: bug(bug_id),
            is_active: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_validate_bug() {
        assert!(validate_bug(bug("chromium/123").as_ref()).is_ok());
        assert!(validate_bug(bug("chromium/0123").as_ref()).is_err());
        assert!(validate_bug(bug("123").as_ref()).is_err());
        assert!(validate_bug(None).is_err());
        assert!(
            validate_bug(Some(&AssociatedBug {
                system: BUGANIZER_SYSTEM.to_string(),
                id: "987".to_string(),
                ..Default::default()
            }))
            .is_ok()
        );
        assert!(
            validate_bug(Some(&AssociatedBug {
                system: "jira".to_string(),
                id: "1".to_string(),
                ..Default::default()
            }))
            .is_err()
        );
    }

    #[test]
    fn test_validate_definition() {
        assert!(validate_definition(r#"test = "a""#).is_ok());
        assert!(validate_definition("").is_err());
        assert!(validate_definition("test = ").is_err());
        let long = format!(r#"test = "{}""#, "a".repeat(MAX_DEFINITION_LENGTH));
        assert!(matches!(validate_definition(&long), Err(RuleError::Invalid(_))));
    }

    #[tokio::test]
    async fn test_create_get_list() {
        let repo = RulesRepository::new(Datastore::memory());
        let rule = repo
            .create("chromium", new_rule(r#"reason LIKE "%oom%""#, "chromium/1"), "user:a@example.com")
            .await
            .unwrap();
        assert_eq!(rule.rule_id.len(), 32);
        assert_eq!(rule.create_user, "user:a@example.com");

        let fetched = repo.get("chromium", &rule.rule_id).await.unwrap();
        assert_eq!(fetched, rule);
        assert_eq!(repo.list("chromium").await.unwrap().len(), 1);
        assert!(repo.list("v8").await.unwrap().is_empty());
        assert!(matches!(
            repo.get("chromium", &"f".repeat(32)).await,
            Err(WeetbixError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_bug_used_by_one_active_rule() {
        let repo = RulesRepository::new(Datastore::memory());
        let first = repo
            .create("chromium", new_rule(r#"test = "a""#, "chromium/7"), "user:a@example.com")
            .await
            .unwrap();

        let dup = repo
            .create("v8", new_rule(r#"test = "b""#, "chromium/7"), "user:a@example.com")
            .await;
        assert!(matches!(dup, Err(WeetbixError::AlreadyExists(_))));

        // 不生效的规则可以共用 bug
        let inactive = NewRule {
            is_active: false,
            ..new_rule(r#"test = "b""#, "chromium/7")
        };
        let second = repo.create("v8", inactive, "user:a@example.com").await.unwrap();

        let hits = repo.lookup_bug(MONORAIL_SYSTEM, "chromium/7").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].rule_id, first.rule_id);

        // 重新激活第二条规则会与第一条冲突
        let reactivate = repo
            .update(
                "v8",
                &second.rule_id,
                NewRule {
                    is_active: true,
                    ..Default::default()
                },
                &["is_active".to_string()],
                "",
                "user:b@example.com",
            )
            .await;
        assert!(matches!(reactivate, Err(WeetbixError::AlreadyExists(_))));
    }

    #[tokio::test]
    async fn test_update_with_mask_and_etag() {
        let repo = RulesRepository::new(Datastore::memory());
        let rule = repo
            .create("chromium", new_rule(r#"test = "a""#, "chromium/1"), "user:a@example.com")
            .await
            .unwrap();

        let stale = repo
            .update(
                "chromium",
                &rule.rule_id,
                new_rule(r#"test = "b""#, "chromium/2"),
                &["rule_definition".to_string()],
                "W/\"2000-01-01T00:00:00Z\"",
                "user:b@example.com",
            )
            .await;
        assert!(matches!(stale, Err(WeetbixError::Aborted(_))));

        let updated = repo
            .update(
                "chromium",
                &rule.rule_id,
                new_rule(r#"test = "b""#, "chromium/2"),
                &["rule_definition".to_string()],
                &rule.etag(),
                "user:b@example.com",
            )
            .await
            .unwrap();
        assert_eq!(updated.rule_definition, r#"test = "b""#);
        // 未在 mask 中的字段保持不变
        assert_eq!(updated.bug_id, "chromium/1");
        assert_eq!(updated.last_update_user, "user:b@example.com");
        assert!(updated.predicate_last_update_time > rule.predicate_last_update_time);
        assert_ne!(updated.etag(), rule.etag());

        let bad_path = repo
            .update(
                "chromium",
                &rule.rule_id,
                NewRule::default(),
                &["project".to_string()],
                "",
                "user:b@example.com",
            )
            .await;
        assert!(matches!(bad_path, Err(WeetbixError::InvalidArgument(_))));
    }
}
