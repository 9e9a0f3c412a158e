//! 按失败原因聚类
//!
//! 错误信息中时间戳、引号内字符串、base64 串、长十六进制串和数字被替换为
//! LIKE 通配符 `%`，其余部分按 LIKE 语法转义。得到的模式既是 cluster 标题，
//! 也用于计算 cluster ID，因此只在这些可变部分上不同的错误信息会落入同一
//! cluster。

use once_cell::sync::Lazy;
use regex::Regex;

use super::{Algorithm, Failure, hash_id};
use crate::rules::lang::{escape_like, quote};

pub const ALGORITHM_NAME: &str = "reason-v3";

static VARIABLE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}:\d{2}(?:\.\d+)?(?:Z|[+\-]\d{2}:?\d{2})?",
        r#"|'[^']*'|"[^"]*""#,
        r"|[/+0-9a-zA-Z]{10,}=+",
        r"|[0-9a-fA-Fx]{8,}",
        r"|[0-9]+",
    ))
    .expect("valid regex")
});

/// 把错误信息转为 LIKE 模式
pub fn like_pattern(reason: &str) -> String {
    let mut out = String::with_capacity(reason.len());
    let mut last = 0;
    for m in VARIABLE_RE.find_iter(reason) {
        out.push_str(&escape_like(&reason[last..m.start()]));
        out.push('%');
        last = m.end();
    }
    out.push_str(&escape_like(&reason[last..]));
    out
}

fn reason_of(failure: &Failure) -> Option<&str> {
    failure.reason.as_deref().filter(|r| !r.is_empty())
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ReasonAlgorithm;

impl Algorithm for ReasonAlgorithm {
    fn name(&self) -> &'static str {
        ALGORITHM_NAME
    }

    fn cluster(&self, failure: &Failure) -> Option<String> {
        reason_of(failure).map(|r| hash_id(&like_pattern(r)))
    }

    fn title(&self, example: &Failure) -> String {
        reason_of(example).map(like_pattern).unwrap_or_default()
    }

    fn failure_association_rule(&self, example: &Failure) -> String {
        let pattern = reason_of(example).map(like_pattern).unwrap_or_default();
        format!("reason LIKE {}", quote(&pattern))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::lang::parse;

    #[test]
    fn test_like_pattern_normalisation() {
        assert_eq!(like_pattern("Expected 5 but got 10"), "Expected % but got %");
        assert_eq!(
            like_pattern("at 2021-03-04T05:06:07.123Z: file 'a.txt' missing"),
            "at %: file % missing"
        );
        assert_eq!(like_pattern("pointer 0xdeadbeef freed"), "pointer % freed");
        assert_eq!(like_pattern("100% of_tests"), r"%\% of\_tests");
    }

    #[test]
    fn test_similar_reasons_share_cluster() {
        let alg = ReasonAlgorithm;
        let a = alg.cluster(&Failure::new("t1", Some("Timeout after 30s waiting for \"x\""))).unwrap();
        let b = alg.cluster(&Failure::new("t2", Some("Timeout after 45s waiting for \"yy\""))).unwrap();
        let c = alg.cluster(&Failure::new("t1", Some("Connection refused"))).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_no_reason_no_cluster() {
        assert!(ReasonAlgorithm.cluster(&Failure::new("t", None::<String>)).is_none());
        assert!(ReasonAlgorithm.cluster(&Failure::new("t", Some(""))).is_none());
    }

    #[test]
    fn test_rule_matches_cluster_members() {
        let example = Failure::new("t", Some("disk 3 is 99% full"));
        let rule = parse(&ReasonAlgorithm.failure_association_rule(&example)).unwrap();
        assert!(rule.evaluate(&example));
        assert!(rule.evaluate(&Failure::new("t2", Some("disk 12 is 80% full"))));
        assert!(!rule.evaluate(&Failure::new("t", Some("disk 3 is 99 full"))));
    }
}
