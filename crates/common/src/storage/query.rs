//! 查询、过滤条件与分页游标

use base64::prelude::*;

use super::entity::{Entity, IndexValue};
use crate::error::{DatastoreError, DatastoreResult};

/// 过滤操作符
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Lt,
    Le,
    Gt,
    Ge,
    In,
}

/// 单个过滤条件
///
/// 多个过滤条件之间是 AND 关系。数组字段的任一索引项满足条件即命中。
#[derive(Debug, Clone)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub values: Vec<IndexValue>,
}

impl Filter {
    /// 编码后的比较值
    pub fn encoded_values(&self) -> Vec<String> {
        self.values.iter().map(IndexValue::encode).collect()
    }

    /// 判断一条已编码的索引值是否满足条件
    pub fn matches_encoded(&self, encoded: &str) -> bool {
        match self.op {
            FilterOp::Eq | FilterOp::In => self.values.iter().any(|v| v.encode() == encoded),
            op => {
                let Some(target) = self.values.first() else {
                    return false;
                };
                // 不同类型之间不做范围比较
                if !encoded.starts_with(target.type_prefix()) {
                    return false;
                }
                let target = target.encode();
                match op {
                    FilterOp::Lt => encoded < target.as_str(),
                    FilterOp::Le => encoded <= target.as_str(),
                    FilterOp::Gt => encoded > target.as_str(),
                    FilterOp::Ge => encoded >= target.as_str(),
                    FilterOp::Eq | FilterOp::In => unreachable!(),
                }
            }
        }
    }

    /// SQL 比较运算符（范围操作）
    pub(crate) fn sql_operator(&self) -> &'static str {
        match self.op {
            FilterOp::Eq => "=",
            FilterOp::Lt => "<",
            FilterOp::Le => "<=",
            FilterOp::Gt => ">",
            FilterOp::Ge => ">=",
            FilterOp::In => "IN",
        }
    }
}

/// 实体查询
///
/// 结果总是按实体 ID 升序返回。
#[derive(Debug, Clone)]
pub struct Query {
    kind: String,
    filters: Vec<Filter>,
    after_id: Option<String>,
    limit: Option<usize>,
    keys_only: bool,
}

impl Query {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            filters: Vec::new(),
            after_id: None,
            limit: None,
            keys_only: false,
        }
    }

    /// 针对某类实体的查询
    pub fn of<E: Entity>() -> Self {
        Self::new(E::KIND)
    }

    pub fn filter(mut self, field: impl Into<String>, op: FilterOp, value: impl Into<IndexValue>) -> Self {
        self.filters.push(Filter {
            field: field.into(),
            op,
            values: vec![value.into()],
        });
        self
    }

    pub fn eq(self, field: impl Into<String>, value: impl Into<IndexValue>) -> Self {
        self.filter(field, FilterOp::Eq, value)
    }

    /// 字段值属于给定集合；集合为空时不匹配任何实体
    pub fn in_values<I, V>(mut self, field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<IndexValue>,
    {
        self.filters.push(Filter {
            field: field.into(),
            op: FilterOp::In,
            values: values.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// 从分页游标处继续
    ///
    /// 空字符串表示从头开始；属于其他实体种类或无法解析的游标返回 `InvalidCursor`。
    pub fn start(mut self, token: &str) -> DatastoreResult<Self> {
        if token.is_empty() {
            return Ok(self);
        }
        let cursor = Cursor::decode(token)?;
        if cursor.kind != self.kind {
            return Err(DatastoreError::InvalidCursor(format!(
                "cursor belongs to kind {}, not {}",
                cursor.kind, self.kind
            )));
        }
        self.after_id = Some(cursor.last_id);
        Ok(self)
    }

    /// 从指定 ID 之后开始（不含该 ID）
    pub fn start_after(mut self, id: impl Into<String>) -> Self {
        self.after_id = Some(id.into());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn keys_only(mut self) -> Self {
        self.keys_only = true;
        self
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    pub fn after_id(&self) -> Option<&str> {
        self.after_id.as_deref()
    }

    pub fn get_limit(&self) -> Option<usize> {
        self.limit
    }

    pub fn is_keys_only(&self) -> bool {
        self.keys_only
    }

    /// 判断一组索引项是否满足全部过滤条件
    pub fn matches_index(&self, index: &[(String, String)]) -> bool {
        self.filters.iter().all(|filter| {
            index
                .iter()
                .filter(|(field, _)| *field == filter.field)
                .any(|(_, value)| filter.matches_encoded(value))
        })
    }
}

/// 分页游标
///
/// 编码为 URL 安全的 base64 字符串，对调用方不透明。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor {
    pub kind: String,
    pub last_id: String,
}

impl Cursor {
    pub fn new(kind: impl Into<String>, last_id: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            last_id: last_id.into(),
        }
    }

    pub fn encode(&self) -> String {
        BASE64_URL_SAFE_NO_PAD.encode(format!("{}\n{}", self.kind, self.last_id))
    }

    pub fn decode(token: &str) -> DatastoreResult<Self> {
        let bytes = BASE64_URL_SAFE_NO_PAD
            .decode(token.as_bytes())
            .map_err(|e| DatastoreError::InvalidCursor(format!("{token:?}: {e}")))?;
        let text = String::from_utf8(bytes)
            .map_err(|_| DatastoreError::InvalidCursor(format!("{token:?}: not utf-8")))?;
        let (kind, last_id) = text
            .split_once('\n')
            .ok_or_else(|| DatastoreError::InvalidCursor(format!("{token:?}: malformed")))?;
        if kind.is_empty() || last_id.is_empty() {
            return Err(DatastoreError::InvalidCursor(format!("{token:?}: malformed")));
        }
        Ok(Self::new(kind, last_id))
    }
}

/// 一页查询结果
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// 还有更多结果时返回下一页游标
    pub next_cursor: Option<String>,
}

impl<T> Page<T> {
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            next_cursor: None,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            next_cursor: self.next_cursor,
        }
    }

    /// 下一页游标，没有更多结果时为空字符串
    pub fn next_token(&self) -> String {
        self.next_cursor.clone().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_round_trip() {
        let cursor = Cursor::new("Machine", "machine-01");
        let token = cursor.encode();
        assert!(!token.contains('/') && !token.contains('+'));
        assert_eq!(Cursor::decode(&token).unwrap(), cursor);
    }

    #[test]
    fn test_malformed_cursor() {
        assert!(matches!(
            Cursor::decode("!!not-base64!!"),
            Err(DatastoreError::InvalidCursor(_))
        ));
        let no_separator = BASE64_URL_SAFE_NO_PAD.encode("Machine");
        assert!(Cursor::decode(&no_separator).is_err());
    }

    #[test]
    fn test_cursor_kind_mismatch() {
        let token = Cursor::new("Rack", "r1").encode();
        let result = Query::new("Machine").start(&token);
        assert!(matches!(result, Err(DatastoreError::InvalidCursor(_))));

        let query = Query::new("Machine").start("").unwrap();
        assert!(query.after_id().is_none());
    }

    #[test]
    fn test_matches_index() {
        let index = vec![
            ("zone".to_string(), IndexValue::from("atl").encode()),
            ("tags".to_string(), IndexValue::from("a").encode()),
            ("tags".to_string(), IndexValue::from("b").encode()),
            ("restarts".to_string(), IndexValue::from(3i64).encode()),
        ];

        assert!(Query::new("K").eq("zone", "atl").matches_index(&index));
        assert!(Query::new("K").eq("tags", "b").matches_index(&index));
        assert!(!Query::new("K").eq("tags", "c").matches_index(&index));
        assert!(
            Query::new("K")
                .in_values("zone", ["sfo", "atl"])
                .matches_index(&index)
        );
        assert!(
            !Query::new("K")
                .in_values("zone", Vec::<String>::new())
                .matches_index(&index)
        );
        assert!(
            Query::new("K")
                .filter("restarts", FilterOp::Gt, 2i64)
                .filter("restarts", FilterOp::Le, 3i64)
                .matches_index(&index)
        );
        // 类型不同不参与范围比较
        assert!(
            !Query::new("K")
                .filter("zone", FilterOp::Gt, 0i64)
                .matches_index(&index)
        );
        // 缺失字段视为不匹配
        assert!(!Query::new("K").eq("state", "ready").matches_index(&index));
    }
}
