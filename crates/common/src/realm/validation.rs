//! Realm 名称校验
//!
//! 全局 realm 名称形如 `{project}:{realm}`。

use once_cell::sync::Lazy;
use regex::Regex;

use super::error::{RealmError, RealmResult};

/// 项目根 realm，授予其上的权限适用于项目内所有 realm
pub const ROOT_REALM: &str = "@root";
/// 项目级资源使用的 realm
pub const PROJECT_REALM: &str = "@project";
/// 未迁移到 realm 的旧资源使用的 realm
pub const LEGACY_REALM: &str = "@legacy";

static PROJECT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(@internal|[a-z0-9\-_]{1,100})$").expect("valid regex"));

static REALM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9_\.\-/]{1,400}$").expect("valid regex"));

/// 拆分全局 realm 名称为 `(project, realm)`
pub fn parse_realm(global: &str) -> RealmResult<(&str, &str)> {
    let (project, realm) = global
        .split_once(':')
        .ok_or_else(|| RealmError::invalid(global, "should be <project>:<realm>"))?;

    if !PROJECT_RE.is_match(project) {
        return Err(RealmError::invalid(global, "bad project name"));
    }
    let special = matches!(realm, ROOT_REALM | PROJECT_REALM | LEGACY_REALM);
    if !special && !REALM_RE.is_match(realm) {
        return Err(RealmError::invalid(global, "bad realm name"));
    }
    Ok((project, realm))
}

pub fn validate_realm(global: &str) -> RealmResult<()> {
    parse_realm(global).map(|_| ())
}

/// 项目根 realm 的全局名称
pub fn root_realm(project: &str) -> String {
    format!("{project}:{ROOT_REALM}")
}

/// 项目级 realm 的全局名称
pub fn project_realm(project: &str) -> String {
    format!("{project}:{PROJECT_REALM}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_realm() {
        assert_eq!(parse_realm("chromium:ci").unwrap(), ("chromium", "ci"));
        assert_eq!(
            parse_realm("@internal:ufs/os-atl").unwrap(),
            ("@internal", "ufs/os-atl")
        );
        assert_eq!(parse_realm("chromium:@root").unwrap(), ("chromium", "@root"));
        assert!(parse_realm("no-colon").is_err());
        assert!(parse_realm("Chromium:ci").is_err());
        assert!(parse_realm("chromium:@bogus").is_err());
        assert!(parse_realm("chromium:").is_err());
    }

    #[test]
    fn test_helpers() {
        assert_eq!(root_realm("chrome"), "chrome:@root");
        assert_eq!(project_realm("chrome"), "chrome:@project");
    }
}
