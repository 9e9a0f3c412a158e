//! 失败关联规则语言
//!
//! 规则是关于失败的布尔表达式，可用字段为 `test`（测试 ID）和 `reason`
//! （主要错误信息），例如：
//!
//! ```text
//! reason LIKE "%connection reset%" AND NOT test IN ("ninja://a", "ninja://b")
//! ```
//!
//! 支持 `=`, `!=`, `LIKE`, `NOT LIKE`, `IN (...)`, `REGEXP_CONTAINS(field, "re")`
//! 以及 `AND` / `OR` / `NOT` 和括号。LIKE 模式中 `%` 匹配任意串，`_` 匹配
//! 单个字符，`\` 转义下一个字符。

use pest::Parser;
use pest::iterators::Pair;
use pest_derive::Parser;
use regex::Regex;
use thiserror::Error;

use crate::clustering::Failure;

#[derive(Parser)]
#[grammar = "rules/lang.pest"]
struct RuleParser;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("syntax error: {0}")]
    Syntax(String),

    #[error("unknown field {0:?}, valid fields are test and reason")]
    UnknownField(String),

    #[error("invalid LIKE pattern {0:?}: unfinished escape sequence")]
    InvalidLikePattern(String),

    #[error("invalid regular expression {pattern:?}: {reason}")]
    InvalidRegex { pattern: String, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Test,
    Reason,
}

impl Field {
    fn parse(name: &str) -> Result<Self, ParseError> {
        match name {
            "test" => Ok(Self::Test),
            "reason" => Ok(Self::Reason),
            other => Err(ParseError::UnknownField(other.to_string())),
        }
    }

    fn value<'a>(&self, failure: &'a Failure) -> &'a str {
        match self {
            Self::Test => &failure.test_id,
            Self::Reason => failure.reason.as_deref().unwrap_or_default(),
        }
    }
}

/// 规则表达式
#[derive(Debug, Clone)]
pub enum Expr {
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Not(Box<Expr>),
    Eq(Field, String),
    Ne(Field, String),
    /// LIKE 模式已编译为锚定的正则
    Like(Field, Regex),
    In(Field, Vec<String>),
    RegexpContains(Field, Regex),
}

impl Expr {
    /// 判断失败是否满足规则
    pub fn evaluate(&self, failure: &Failure) -> bool {
        match self {
            Self::And(items) => items.iter().all(|e| e.evaluate(failure)),
            Self::Or(items) => items.iter().any(|e| e.evaluate(failure)),
            Self::Not(inner) => !inner.evaluate(failure),
            Self::Eq(field, value) => field.value(failure) == value,
            Self::Ne(field, value) => field.value(failure) != value,
            Self::Like(field, re) | Self::RegexpContains(field, re) => re.is_match(field.value(failure)),
            Self::In(field, values) => {
                let actual = field.value(failure);
                values.iter().any(|v| v == actual)
            }
        }
    }
}

/// 解析规则定义
pub fn parse(text: &str) -> Result<Expr, ParseError> {
    let definition = RuleParser::parse(Rule::definition, text)
        .map_err(|e| ParseError::Syntax(e.to_string()))?
        .next()
        .ok_or_else(|| ParseError::Syntax("empty rule".to_string()))?;

    let expr = definition
        .into_inner()
        .find(|p| p.as_rule() == Rule::expr)
        .ok_or_else(|| ParseError::Syntax("empty rule".to_string()))?;
    build(expr)
}

fn build(pair: Pair<Rule>) -> Result<Expr, ParseError> {
    match pair.as_rule() {
        Rule::expr | Rule::term => {
            let is_or = pair.as_rule() == Rule::expr;
            let mut items = pair
                .into_inner()
                .filter(|p| !matches!(p.as_rule(), Rule::kw_and | Rule::kw_or))
                .map(build)
                .collect::<Result<Vec<_>, _>>()?;
            if items.len() == 1 {
                return Ok(items.remove(0));
            }
            Ok(if is_or { Expr::Or(items) } else { Expr::And(items) })
        }
        Rule::negated => {
            let inner = pair
                .into_inner()
                .find(|p| p.as_rule() != Rule::kw_not)
                .ok_or_else(|| ParseError::Syntax("NOT without operand".to_string()))?;
            Ok(Expr::Not(Box::new(build(inner)?)))
        }
        Rule::predicate => build_predicate(pair),
        Rule::regexp_contains => {
            let mut inner = pair.into_inner().filter(|p| p.as_rule() != Rule::kw_regexp);
            let field = next_field(&mut inner)?;
            let pattern = next_string(&mut inner)?;
            let re = Regex::new(&pattern).map_err(|e| ParseError::InvalidRegex {
                pattern: pattern.clone(),
                reason: e.to_string(),
            })?;
            Ok(Expr::RegexpContains(field, re))
        }
        rule => Err(ParseError::Syntax(format!("unexpected {rule:?}"))),
    }
}

fn build_predicate(pair: Pair<Rule>) -> Result<Expr, ParseError> {
    let mut inner = pair.into_inner();
    let field = next_field(&mut inner)?;
    let op = inner
        .next()
        .ok_or_else(|| ParseError::Syntax("missing operator".to_string()))?;
    let rule = op.as_rule();
    let mut strings: Vec<String> = op
        .into_inner()
        .filter(|p| p.as_rule() == Rule::string)
        .map(string_value)
        .collect();
    if strings.is_empty() {
        return Err(ParseError::Syntax("missing operand".to_string()));
    }

    match rule {
        Rule::eq => Ok(Expr::Eq(field, strings.remove(0))),
        Rule::neq => Ok(Expr::Ne(field, strings.remove(0))),
        Rule::like => Ok(Expr::Like(field, like_regex(&strings[0])?)),
        Rule::not_like => Ok(Expr::Not(Box::new(Expr::Like(field, like_regex(&strings[0])?)))),
        Rule::in_list => Ok(Expr::In(field, strings)),
        rule => Err(ParseError::Syntax(format!("unexpected {rule:?}"))),
    }
}

fn next_field<'a>(pairs: &mut impl Iterator<Item = Pair<'a, Rule>>) -> Result<Field, ParseError> {
    let ident = pairs
        .next()
        .ok_or_else(|| ParseError::Syntax("missing field".to_string()))?;
    Field::parse(ident.as_str())
}

fn next_string<'a>(pairs: &mut impl Iterator<Item = Pair<'a, Rule>>) -> Result<String, ParseError> {
    pairs
        .next()
        .map(string_value)
        .ok_or_else(|| ParseError::Syntax("missing string".to_string()))
}

/// 字符串字面量去掉引号并处理转义；未知转义原样保留，交给 LIKE / 正则处理
fn string_value(pair: Pair<Rule>) -> String {
    let raw = pair.into_inner().as_str();
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// LIKE 模式转为锚定正则
pub fn like_regex(pattern: &str) -> Result<Regex, ParseError> {
    let mut re = String::from("(?s)^");
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '%' => re.push_str(".*"),
            '_' => re.push('.'),
            '\\' => {
                let escaped = chars
                    .next()
                    .ok_or_else(|| ParseError::InvalidLikePattern(pattern.to_string()))?;
                re.push_str(&regex::escape(&escaped.to_string()));
            }
            other => re.push_str(&regex::escape(&other.to_string())),
        }
    }
    re.push('$');
    Regex::new(&re).map_err(|e| ParseError::InvalidRegex {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}

/// 把任意文本转义为只匹配其自身的 LIKE 模式
pub fn escape_like(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// 把任意文本转义为规则语言的字符串字面量
pub fn quote(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(test_id: &str, reason: Option<&str>) -> Failure {
        Failure {
            test_id: test_id.to_string(),
            reason: reason.map(str::to_string),
        }
    }

    fn matches(rule: &str, f: &Failure) -> bool {
        parse(rule).unwrap().evaluate(f)
    }

    #[test]
    fn test_comparisons() {
        let f = failure("ninja://chrome/test:browser_tests/Foo.Bar", Some("Timeout after 30s"));
        assert!(matches(r#"test = "ninja://chrome/test:browser_tests/Foo.Bar""#, &f));
        assert!(matches(r#"test != "other""#, &f));
        assert!(matches(r#"reason LIKE "Timeout after %""#, &f));
        assert!(!matches(r#"reason NOT LIKE "%after%""#, &f));
        assert!(matches(r#"test IN ("a", "ninja://chrome/test:browser_tests/Foo.Bar")"#, &f));
        assert!(matches(r#"REGEXP_CONTAINS(reason, "after [0-9]+s")"#, &f));
    }

    #[test]
    fn test_boolean_precedence() {
        let f = failure("a", Some("x"));
        // AND 优先于 OR
        assert!(matches(r#"test = "a" OR test = "b" AND reason = "y""#, &f));
        assert!(!matches(r#"(test = "a" OR test = "b") AND reason = "y""#, &f));
        assert!(matches(r#"NOT test = "b" and reason = "x""#, &f));
        assert!(!matches(r#"not (test = "a")"#, &f));
    }

    #[test]
    fn test_like_wildcards_and_escapes() {
        let re = like_regex(r"100\% done_").unwrap();
        assert!(re.is_match("100% done!"));
        assert!(!re.is_match("1000 done!"));
        assert!(like_regex(r"abc\").is_err());

        assert!(matches(r#"reason LIKE "%\%%""#, &failure("t", Some("50% off"))));
        assert!(!matches(r#"reason LIKE "%\%%""#, &failure("t", Some("half off"))));
    }

    #[test]
    fn test_missing_reason_is_empty_string() {
        let f = failure("t", None);
        assert!(matches(r#"reason = """#, &f));
        assert!(!matches(r#"reason LIKE "_%""#, &f));
    }

    #[test]
    fn test_string_escapes() {
        let f = failure(r#"say "hi""#, None);
        assert!(matches(r#"test = "say \"hi\"""#, &f));
        assert!(matches(&format!("test = {}", quote(r#"say "hi""#)), &f));
    }

    #[test]
    fn test_escape_like_round_trip() {
        let text = r"50%_of\everything";
        let re = like_regex(&escape_like(text)).unwrap();
        assert!(re.is_match(text));
        assert!(!re.is_match("50xxof\\everything"));
    }

    #[test]
    fn test_errors() {
        assert!(matches!(parse(""), Err(ParseError::Syntax(_))));
        assert!(matches!(parse(r#"test = "a" AND"#), Err(ParseError::Syntax(_))));
        assert!(matches!(parse(r#"test == "a""#), Err(ParseError::Syntax(_))));
        assert!(matches!(parse(r#"name = "a""#), Err(ParseError::UnknownField(_))));
        assert!(matches!(
            parse(r#"REGEXP_CONTAINS(test, "(")"#),
            Err(ParseError::InvalidRegex { .. })
        ));
        assert!(matches!(parse(r#"test = "unterminated"#), Err(ParseError::Syntax(_))));
    }
}
