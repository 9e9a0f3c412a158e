//! 按测试 ID 聚类

use super::{Algorithm, Failure, hash_id};
use crate::rules::lang::quote;

pub const ALGORITHM_NAME: &str = "testname-v3";

/// 同一测试 ID 的失败属于同一 cluster
#[derive(Debug, Clone, Copy, Default)]
pub struct TestNameAlgorithm;

impl Algorithm for TestNameAlgorithm {
    fn name(&self) -> &'static str {
        ALGORITHM_NAME
    }

    fn cluster(&self, failure: &Failure) -> Option<String> {
        Some(hash_id(&failure.test_id))
    }

    fn title(&self, example: &Failure) -> String {
        example.test_id.clone()
    }

    fn failure_association_rule(&self, example: &Failure) -> String {
        format!("test = {}", quote(&example.test_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::lang::parse;

    #[test]
    fn test_cluster_by_test_id() {
        let alg = TestNameAlgorithm;
        let a = alg.cluster(&Failure::new("suite/a", Some("x"))).unwrap();
        let b = alg.cluster(&Failure::new("suite/a", Some("y"))).unwrap();
        let c = alg.cluster(&Failure::new("suite/c", Some("x"))).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_rule_matches_cluster() {
        let example = Failure::new(r#"ninja://a"quoted"\test"#, None::<String>);
        let rule = parse(&TestNameAlgorithm.failure_association_rule(&example)).unwrap();
        assert!(rule.evaluate(&example));
        assert!(!rule.evaluate(&Failure::new("ninja://other", None::<String>)));
    }
}
