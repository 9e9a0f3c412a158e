//! 按失败关联规则聚类

use fleet_proto::weetbix::{AssociatedBug, ClusterId};
use tracing::warn;

use super::Failure;
use crate::rules::FailureAssociationRule;
use crate::rules::lang::{Expr, parse};

pub const ALGORITHM_NAME: &str = "rules-v2";

/// 已编译的生效规则
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub rule_id: String,
    pub bug: AssociatedBug,
    predicate: Expr,
}

impl CompiledRule {
    pub fn compile(rule: &FailureAssociationRule) -> Result<Self, crate::rules::lang::ParseError> {
        Ok(Self {
            rule_id: rule.rule_id.clone(),
            bug: rule.associated_bug(),
            predicate: parse(&rule.rule_definition)?,
        })
    }

    pub fn matches(&self, failure: &Failure) -> bool {
        self.predicate.evaluate(failure)
    }
}

/// 一个项目当前生效的规则集
#[derive(Debug, Clone, Default)]
pub struct RulesAlgorithm {
    rules: Vec<CompiledRule>,
}

impl RulesAlgorithm {
    /// 编译生效规则；无法解析的规则被跳过
    pub fn new(rules: &[FailureAssociationRule]) -> Self {
        let rules = rules
            .iter()
            .filter(|r| r.is_active)
            .filter_map(|r| match CompiledRule::compile(r) {
                Ok(compiled) => Some(compiled),
                Err(e) => {
                    warn!(project = %r.project, rule_id = %r.rule_id, "skipping invalid rule: {e}");
                    None
                }
            })
            .collect();
        Self { rules }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// 失败命中的全部规则，cluster ID 即规则 ID
    pub fn cluster(&self, failure: &Failure) -> Vec<(ClusterId, AssociatedBug)> {
        self.rules
            .iter()
            .filter(|r| r.matches(failure))
            .map(|r| {
                (
                    ClusterId {
                        algorithm: ALGORITHM_NAME.to_string(),
                        id: r.rule_id.clone(),
                    },
                    r.bug.clone(),
                )
            })
            .collect()
    }
}
