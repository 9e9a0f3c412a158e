//! proto3 JSON 映射中的特殊类型

/// `Option<Timestamp>` 以 RFC 3339 字符串表示
pub mod timestamp {
    use prost_types::Timestamp;
    use serde::{Deserialize, Deserializer, Serializer, de};

    use crate::time::{format_timestamp, parse_timestamp};

    pub fn serialize<S: Serializer>(value: &Option<Timestamp>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(ts) => s.serialize_str(&format_timestamp(ts)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Timestamp>, D::Error> {
        let text: Option<String> = Option::deserialize(d)?;
        text.map(|t| parse_timestamp(&t).map_err(de::Error::custom))
            .transpose()
    }
}

/// `Option<FieldMask>` 以逗号分隔的 lowerCamelCase 路径表示
///
/// 解析时同时接受 camelCase 与 snake_case，内部统一保存为 snake_case。
pub mod field_mask {
    use prost_types::FieldMask;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<FieldMask>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(mask) => {
                let joined = mask
                    .paths
                    .iter()
                    .map(|p| to_camel(p))
                    .collect::<Vec<_>>()
                    .join(",");
                s.serialize_str(&joined)
            }
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<FieldMask>, D::Error> {
        let text: Option<String> = Option::deserialize(d)?;
        Ok(text.map(|t| FieldMask {
            paths: t
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(to_snake)
                .collect(),
        }))
    }

    pub fn to_snake(path: &str) -> String {
        let mut out = String::with_capacity(path.len() + 4);
        for c in path.chars() {
            if c.is_ascii_uppercase() {
                out.push('_');
                out.push(c.to_ascii_lowercase());
            } else {
                out.push(c);
            }
        }
        out
    }

    pub fn to_camel(path: &str) -> String {
        let mut out = String::with_capacity(path.len());
        let mut upper = false;
        for c in path.chars() {
            if c == '_' {
                upper = true;
            } else if upper {
                out.push(c.to_ascii_uppercase());
                upper = false;
            } else {
                out.push(c);
            }
        }
        out
    }
}

/// `int64` 在 proto3 JSON 中以字符串表示，解析时也接受数字
pub mod int64_string {
    use serde::{Deserialize, Deserializer, Serializer, de};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Num(i64),
        Text(String),
    }

    pub fn serialize<S: Serializer>(value: &i64, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
        match Repr::deserialize(d)? {
            Repr::Num(n) => Ok(n),
            Repr::Text(t) => t.parse().map_err(de::Error::custom),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::field_mask::{to_camel, to_snake};

    #[test]
    fn test_path_case_conversion() {
        assert_eq!(to_snake("failReason"), "fail_reason");
        assert_eq!(to_snake("fail_reason"), "fail_reason");
        assert_eq!(to_camel("predicate_last_update_time"), "predicateLastUpdateTime");
        assert_eq!(to_camel("status"), "status");
    }
}
