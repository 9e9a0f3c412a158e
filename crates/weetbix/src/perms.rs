//! Weetbix 使用的权限名称

pub const GET_RULE: &str = "analysis.rules.get";
pub const LIST_RULES: &str = "analysis.rules.list";
pub const CREATE_RULE: &str = "analysis.rules.create";
pub const UPDATE_RULE: &str = "analysis.rules.update";
/// 读取规则定义
pub const GET_RULE_DEFINITION: &str = "analysis.rules.getDefinition";

pub const GET_CLUSTER: &str = "analysis.clusters.get";
pub const GET_CONFIG: &str = "analysis.config.get";

/// 在子 realm 上检查
pub const LIST_TEST_RESULTS: &str = "resultdb.testResults.list";
