//! 失败聚类算法
//!
//! 每个算法把一次测试失败映射到零个或多个 cluster。基于失败内容的算法
//! （[`testname`]、[`reason`]）通过 [`AlgorithmRegistry`] 分发；基于规则的
//! 算法依赖项目当前生效的规则集，见 [`rules::RulesAlgorithm`]。

pub mod reason;
pub mod rules;
pub mod testname;

use std::collections::BTreeMap;

use fleet_proto::weetbix::ClusterId;
use sha2::{Digest, Sha256};

pub use reason::ReasonAlgorithm;
pub use rules::{CompiledRule, RulesAlgorithm};
pub use testname::TestNameAlgorithm;

/// 当前聚类算法版本
pub const ALGORITHMS_VERSION: i32 = 3;

/// 待聚类的失败
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Failure {
    pub test_id: String,
    /// 主要错误信息
    pub reason: Option<String>,
}

impl Failure {
    pub fn new(test_id: impl Into<String>, reason: Option<impl Into<String>>) -> Self {
        Self {
            test_id: test_id.into(),
            reason: reason.map(Into::into),
        }
    }
}

/// 基于失败内容的聚类算法
pub trait Algorithm: Send + Sync {
    /// 算法名称，同时是 cluster 名称中的 `{algorithm}` 部分
    fn name(&self) -> &'static str;

    /// 计算失败所属 cluster 的 ID；不适用于该失败时返回 `None`
    fn cluster(&self, failure: &Failure) -> Option<String>;

    /// cluster 的可读标题，由该 cluster 中的一个示例失败得出
    fn title(&self, example: &Failure) -> String;

    /// 与该 cluster 等价的失败关联规则定义
    fn failure_association_rule(&self, example: &Failure) -> String;
}

/// 算法分发表
pub struct AlgorithmRegistry {
    algorithms: BTreeMap<&'static str, Box<dyn Algorithm>>,
}

impl std::fmt::Debug for AlgorithmRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.algorithms.keys()).finish()
    }
}

impl Default for AlgorithmRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl AlgorithmRegistry {
    /// 注册当前版本的全部算法
    pub fn new() -> Self {
        let mut registry = Self {
            algorithms: BTreeMap::new(),
        };
        registry.register(Box::new(TestNameAlgorithm));
        registry.register(Box::new(ReasonAlgorithm));
        registry
    }

    pub fn register(&mut self, algorithm: Box<dyn Algorithm>) {
        self.algorithms.insert(algorithm.name(), algorithm);
    }

    pub fn get(&self, name: &str) -> Option<&dyn Algorithm> {
        self.algorithms.get(name).map(|a| a.as_ref())
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.algorithms.keys().copied()
    }

    /// 用所有已注册算法聚类
    pub fn cluster(&self, failure: &Failure) -> Vec<ClusterId> {
        self.algorithms
            .values()
            .filter_map(|alg| {
                alg.cluster(failure).map(|id| ClusterId {
                    algorithm: alg.name().to_string(),
                    id,
                })
            })
            .collect()
    }
}

/// SHA-256 的前 16 字节，十六进制编码
pub(crate) fn hash_id(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    hex::encode(&digest[..16])
}
