//! 资源名称：`machines/{id}`、`racks/{id}`、`assets/{id}`

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{UfsError, UfsResult};

static ID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-zA-Z0-9_.:\-]+$").expect("valid regex"));

pub fn validate_id(id: &str) -> UfsResult<()> {
    if ID_RE.is_match(id) {
        Ok(())
    } else {
        Err(UfsError::invalid(format!(
            "invalid id {id:?}: must be non-empty and contain only letters, digits and -_.:"
        )))
    }
}

pub fn resource_name(collection: &str, id: &str) -> String {
    format!("{collection}/{id}")
}

/// `{collection}/{id}` -> id；也接受不带前缀的 id
pub fn parse_name(collection: &str, name: &str) -> UfsResult<String> {
    let id = match name.split_once('/') {
        Some((prefix, id)) if prefix == collection => id,
        Some(_) => {
            return Err(UfsError::invalid(format!(
                "invalid name {name:?}, expected format: {collection}/{{id}}"
            )));
        }
        None => name,
    };
    validate_id(id)?;
    Ok(id.to_string())
}
