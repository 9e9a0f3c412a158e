//! 实体抽象
//!
//! 数据存储中的每条记录都是一个按 `(kind, id)` 寻址的实体。实体本体以 JSON
//! 存储，需要查询的字段通过 [`Entity::index`] 单独投影为索引项。

use serde::{Serialize, de::DeserializeOwned};

/// 可存入 [`crate::storage::Datastore`] 的实体
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// 实体种类，相当于表名
    const KIND: &'static str;

    /// 实体主键，不能为空
    fn id(&self) -> String;

    /// 需要建立索引的字段
    ///
    /// 数组字段以同名的多条索引项表示，查询时任一项匹配即视为命中。
    fn index(&self) -> Vec<IndexEntry> {
        Vec::new()
    }
}

/// 索引值
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IndexValue {
    Str(String),
    Int(i64),
    Bool(bool),
}

const INT_SIGN_BIT: u64 = 1 << 63;

impl IndexValue {
    /// 编码为保序字符串
    ///
    /// 同类型值的编码字典序与值的自然序一致，前两个字符标识类型。
    pub fn encode(&self) -> String {
        match self {
            IndexValue::Str(s) => format!("s:{s}"),
            IndexValue::Int(i) => format!("i:{:016x}", (*i as u64) ^ INT_SIGN_BIT),
            IndexValue::Bool(b) => format!("b:{}", u8::from(*b)),
        }
    }

    /// 类型前缀（`s:` / `i:` / `b:`）
    pub fn type_prefix(&self) -> &'static str {
        match self {
            IndexValue::Str(_) => "s:",
            IndexValue::Int(_) => "i:",
            IndexValue::Bool(_) => "b:",
        }
    }
}

impl From<&str> for IndexValue {
    fn from(value: &str) -> Self {
        IndexValue::Str(value.to_string())
    }
}

impl From<String> for IndexValue {
    fn from(value: String) -> Self {
        IndexValue::Str(value)
    }
}

impl From<&String> for IndexValue {
    fn from(value: &String) -> Self {
        IndexValue::Str(value.clone())
    }
}

impl From<i64> for IndexValue {
    fn from(value: i64) -> Self {
        IndexValue::Int(value)
    }
}

impl From<i32> for IndexValue {
    fn from(value: i32) -> Self {
        IndexValue::Int(i64::from(value))
    }
}

impl From<bool> for IndexValue {
    fn from(value: bool) -> Self {
        IndexValue::Bool(value)
    }
}

/// 单条索引项
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub field: &'static str,
    pub value: IndexValue,
}

impl IndexEntry {
    pub fn new(field: &'static str, value: impl Into<IndexValue>) -> Self {
        Self {
            field,
            value: value.into(),
        }
    }

    /// 为数组字段生成多条同名索引项
    pub fn many<I, V>(field: &'static str, values: I) -> Vec<Self>
    where
        I: IntoIterator<Item = V>,
        V: Into<IndexValue>,
    {
        values.into_iter().map(|v| Self::new(field, v)).collect()
    }
}

/// 协议缓冲区载荷在 JSON 中以 base64 表示
pub mod base64_bytes {
    use base64::prelude::*;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64_STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        BASE64_STANDARD
            .decode(s.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
