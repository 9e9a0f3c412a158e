//! List 过滤表达式
//!
//! 形如 `zone=ZONE_ATL97 & tags=a|b`：条件之间以 `&` 连接（与），同一条件的
//! 多个取值以 `|` 分隔（或）。可用的键由资源种类决定。

use fleet_proto::ufs::{AssetType, State, Zone};

use crate::error::{UfsError, UfsResult};

/// 取值的规范化方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Plain,
    Zone,
    State,
    AssetType,
}

/// 过滤键到索引字段的映射
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterKey {
    pub key: &'static str,
    pub field: &'static str,
    pub kind: ValueKind,
}

impl FilterKey {
    pub const fn plain(key: &'static str, field: &'static str) -> Self {
        Self {
            key,
            field,
            kind: ValueKind::Plain,
        }
    }

    pub const fn typed(key: &'static str, field: &'static str, kind: ValueKind) -> Self {
        Self { key, field, kind }
    }
}

/// 解析后的单个条件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    pub field: &'static str,
    pub values: Vec<String>,
}

/// 枚举取值可省略前缀且不区分大小写，如 `atl97` 等同 `ZONE_ATL97`
fn normalize(kind: ValueKind, key: &str, value: &str) -> UfsResult<String> {
    let upper = value.to_ascii_uppercase();
    let with_prefix = |prefix: &str| {
        if upper.starts_with(prefix) {
            upper.clone()
        } else {
            format!("{prefix}{upper}")
        }
    };
    let known = match kind {
        ValueKind::Plain => return Ok(value.to_string()),
        ValueKind::Zone => {
            let name = with_prefix("ZONE_");
            Zone::from_str_name(&name).map(|z| z.as_str_name())
        }
        ValueKind::State => {
            let name = with_prefix("STATE_");
            State::from_str_name(&name).map(|s| s.as_str_name())
        }
        ValueKind::AssetType => AssetType::from_str_name(&upper).map(|t| t.as_str_name()),
    };
    known
        .map(str::to_string)
        .ok_or_else(|| UfsError::invalid(format!("filter: invalid value {value:?} for {key}")))
}

/// 解析过滤表达式；空表达式返回空条件列表
pub fn parse_filter(filter: &str, keys: &[FilterKey]) -> UfsResult<Vec<Condition>> {
    let mut conditions: Vec<Condition> = Vec::new();
    for clause in filter.split('&').map(str::trim).filter(|c| !c.is_empty()) {
        let (key, values) = clause
            .split_once('=')
            .ok_or_else(|| UfsError::invalid(format!("filter: expected key=value, got {clause:?}")))?;
        let key = key.trim();
        let spec = keys.iter().find(|k| k.key == key).ok_or_else(|| {
            let valid: Vec<_> = keys.iter().map(|k| k.key).collect();
            UfsError::invalid(format!(
                "filter: unknown key {key:?}, valid keys are {}",
                valid.join(", ")
            ))
        })?;
        let values = values
            .split('|')
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| normalize(spec.kind, key, v))
            .collect::<UfsResult<Vec<_>>>()?;
        if values.is_empty() {
            return Err(UfsError::invalid(format!("filter: missing value for {key}")));
        }
        if conditions.iter().any(|c| c.field == spec.field) {
            return Err(UfsError::invalid(format!("filter: duplicate key {key}")));
        }
        conditions.push(Condition {
            field: spec.field,
            values,
        });
    }
    Ok(conditions)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEYS: &[FilterKey] = &[
        FilterKey::typed("zone", "zone", ValueKind::Zone),
        FilterKey::typed("state", "state", ValueKind::State),
        FilterKey::plain("tags", "tag"),
        FilterKey::plain("rack", "rack"),
    ];

    #[test]
    fn test_parse_filter() {
        let conditions = parse_filter("zone=atl97 & tags=a|b &state=STATE_SERVING", KEYS).unwrap();
        assert_eq!(
            conditions,
            vec![
                Condition {
                    field: "zone",
                    values: vec!["ZONE_ATL97".to_string()],
                },
                Condition {
                    field: "tag",
                    values: vec!["a".to_string(), "b".to_string()],
                },
                Condition {
                    field: "state",
                    values: vec!["STATE_SERVING".to_string()],
                },
            ]
        );
        assert!(parse_filter("", KEYS).unwrap().is_empty());
        assert!(parse_filter("  ", KEYS).unwrap().is_empty());
    }

    #[test]
    fn test_invalid_filters() {
        assert!(parse_filter("color=red", KEYS).is_err());
        assert!(parse_filter("zone", KEYS).is_err());
        assert!(parse_filter("zone=", KEYS).is_err());
        assert!(parse_filter("zone=mars", KEYS).is_err());
        assert!(parse_filter("rack=r1 & rack=r2", KEYS).is_err());
    }
}
