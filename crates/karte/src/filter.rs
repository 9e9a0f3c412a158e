//! List 请求的过滤表达式
//!
//! 语法见 `filter.pest`：若干 `field op literal` 子句以 `&&` 连接。字面量可以是
//! 双引号字符串、整数或不带引号的枚举名。时间字段接受 unix 秒或 RFC 3339 字符串。

use fleet_common::storage::FilterOp;
use fleet_common::{IndexValue, Query};
use fleet_proto::karte::{ActionStatus, AllowFail};
use pest::Parser;
use pest_derive::Parser;

use crate::error::{KarteError, KarteResult};

#[derive(Parser)]
#[grammar = "filter.pest"]
struct FilterParser;

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Str(String),
    Int(i64),
    Ident(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Clause {
    pub field: String,
    pub op: FilterOp,
    pub literal: Literal,
}

/// 可过滤字段的值类型
#[derive(Clone, Copy)]
pub enum FieldType {
    Str,
    Int,
    /// 以 unix 秒索引
    Time,
    /// 枚举名或数值
    Enum(fn(&str) -> Option<i32>),
}

fn action_status(name: &str) -> Option<i32> {
    ActionStatus::from_str_name(name).map(|s| s as i32)
}

fn allow_fail(name: &str) -> Option<i32> {
    AllowFail::from_str_name(name).map(|a| a as i32)
}

pub const ACTION_FIELDS: &[(&str, FieldType)] = &[
    ("kind", FieldType::Str),
    ("swarming_task_id", FieldType::Str),
    ("buildbucket_id", FieldType::Str),
    ("asset_tag", FieldType::Str),
    ("start_time", FieldType::Time),
    ("stop_time", FieldType::Time),
    ("create_time", FieldType::Time),
    ("seal_time", FieldType::Time),
    ("status", FieldType::Enum(action_status)),
    ("fail_reason", FieldType::Str),
    ("client_name", FieldType::Str),
    ("client_version", FieldType::Str),
    ("hostname", FieldType::Str),
    ("model", FieldType::Str),
    ("board", FieldType::Str),
    ("recovered_by", FieldType::Str),
    ("restarts", FieldType::Int),
    ("plan_name", FieldType::Str),
    ("allow_fail", FieldType::Enum(allow_fail)),
];

pub const OBSERVATION_FIELDS: &[(&str, FieldType)] = &[
    ("action_id", FieldType::Str),
    ("metric_kind", FieldType::Str),
    ("value_string", FieldType::Str),
];

/// 解析过滤表达式；空字符串得到空子句列表
pub fn parse_filter(text: &str) -> KarteResult<Vec<Clause>> {
    let pairs = FilterParser::parse(Rule::filter, text)
        .map_err(|e| KarteError::InvalidFilter(e.to_string()))?;

    let mut clauses = Vec::new();
    for pair in pairs.flat_map(|p| p.into_inner()) {
        match pair.as_rule() {
            Rule::clause => clauses.push(parse_clause(pair)?),
            Rule::EOI => {}
            rule => {
                return Err(KarteError::InvalidFilter(format!("unexpected {rule:?}")));
            }
        }
    }
    Ok(clauses)
}

fn parse_clause(pair: pest::iterators::Pair<Rule>) -> KarteResult<Clause> {
    let mut inner = pair.into_inner();
    let missing = || KarteError::InvalidFilter("incomplete clause".to_string());

    let field = inner.next().ok_or_else(missing)?.as_str().to_string();
    let op = match inner.next().ok_or_else(missing)?.as_str() {
        "==" => FilterOp::Eq,
        "<" => FilterOp::Lt,
        "<=" => FilterOp::Le,
        ">" => FilterOp::Gt,
        ">=" => FilterOp::Ge,
        other => return Err(KarteError::InvalidFilter(format!("unknown operator {other}"))),
    };

    let literal = inner.next().ok_or_else(missing)?;
    let literal = match literal.as_rule() {
        Rule::string => Literal::Str(unescape(literal.into_inner().as_str())),
        Rule::int => Literal::Int(
            literal
                .as_str()
                .parse()
                .map_err(|e| KarteError::InvalidFilter(format!("{}: {e}", literal.as_str())))?,
        ),
        Rule::ident => Literal::Ident(literal.as_str().to_string()),
        rule => return Err(KarteError::InvalidFilter(format!("unexpected {rule:?}"))),
    };

    Ok(Clause { field, op, literal })
}

fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

/// 子句转换为索引值
fn index_value(clause: &Clause, field_type: FieldType) -> KarteResult<IndexValue> {
    let mismatch = || {
        KarteError::InvalidFilter(format!(
            "field {} does not accept {:?}",
            clause.field, clause.literal
        ))
    };
    match (field_type, &clause.literal) {
        (FieldType::Str, Literal::Str(s)) => Ok(IndexValue::from(s.as_str())),
        (FieldType::Int, Literal::Int(i)) => Ok(IndexValue::Int(*i)),
        (FieldType::Time, Literal::Int(seconds)) => Ok(IndexValue::Int(*seconds)),
        (FieldType::Time, Literal::Str(text)) => {
            let ts = chrono::DateTime::parse_from_rfc3339(text)
                .map_err(|e| KarteError::InvalidFilter(format!("{}: {e}", clause.field)))?;
            Ok(IndexValue::Int(ts.timestamp()))
        }
        (FieldType::Enum(_), Literal::Int(i)) => Ok(IndexValue::Int(*i)),
        (FieldType::Enum(lookup), Literal::Ident(name) | Literal::Str(name)) => lookup(name)
            .map(|v| IndexValue::Int(i64::from(v)))
            .ok_or_else(|| {
                KarteError::InvalidFilter(format!("unknown value {name} for {}", clause.field))
            }),
        _ => Err(mismatch()),
    }
}

/// 把过滤表达式应用到查询上
pub fn apply_filter(
    mut query: Query,
    text: &str,
    fields: &[(&str, FieldType)],
) -> KarteResult<Query> {
    for clause in parse_filter(text)? {
        let field_type = fields
            .iter()
            .find(|(name, _)| *name == clause.field)
            .map(|(_, t)| *t)
            .ok_or_else(|| KarteError::InvalidFilter(format!("unknown field {}", clause.field)))?;
        let value = index_value(&clause, field_type)?;
        query = query.filter(clause.field.clone(), clause.op, value);
    }
    Ok(query)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_clauses() {
        let clauses =
            parse_filter(r#"kind == "ssh-attempt" && status == FAIL && restarts >= -2"#).unwrap();
        assert_eq!(clauses.len(), 3);
        assert_eq!(clauses[0].field, "kind");
        assert_eq!(clauses[0].literal, Literal::Str("ssh-attempt".to_string()));
        assert_eq!(clauses[1].literal, Literal::Ident("FAIL".to_string()));
        assert_eq!(clauses[2].op, FilterOp::Ge);
        assert_eq!(clauses[2].literal, Literal::Int(-2));
    }

    #[test]
    fn test_empty_filter() {
        assert!(parse_filter("").unwrap().is_empty());
        assert!(parse_filter("   ").unwrap().is_empty());
    }

    #[test]
    fn test_escapes() {
        let clauses = parse_filter(r#"fail_reason == "say \"hi\"\n""#).unwrap();
        assert_eq!(clauses[0].literal, Literal::Str("say \"hi\"\n".to_string()));
    }

    #[test]
    fn test_syntax_errors() {
        assert!(parse_filter("kind =").is_err());
        assert!(parse_filter("kind = \"a\"").is_err());
        assert!(parse_filter("kind == \"a\" &&").is_err());
        assert!(parse_filter("kind == \"a\" || kind == \"b\"").is_err());
    }

    #[test]
    fn test_apply_filter_types() {
        let query = apply_filter(
            Query::new("Action"),
            r#"status == SUCCESS && seal_time < "2021-01-01T00:00:00Z""#,
            ACTION_FIELDS,
        )
        .unwrap();
        assert_eq!(query.filters().len(), 2);
        assert_eq!(query.filters()[0].values, vec![IndexValue::Int(1)]);
        assert_eq!(query.filters()[1].values, vec![IndexValue::Int(1_609_459_200)]);
    }

    #[test]
    fn test_apply_filter_rejects_unknown_and_mismatched() {
        assert!(matches!(
            apply_filter(Query::new("Action"), "color == \"red\"", ACTION_FIELDS),
            Err(KarteError::InvalidFilter(_))
        ));
        assert!(apply_filter(Query::new("Action"), "kind == 5", ACTION_FIELDS).is_err());
        assert!(apply_filter(Query::new("Action"), "status == BROKEN", ACTION_FIELDS).is_err());
    }
}
