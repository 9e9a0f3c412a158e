//! 资源名称解析
//!
//! - `projects/{project}`
//! - `projects/{project}/config`
//! - `projects/{project}/rules/{rule_id}`
//! - `projects/{project}/clusters/{algorithm}/{cluster_id}`

use fleet_proto::weetbix::ClusterId;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{WeetbixError, WeetbixResult};

const PROJECT_PATTERN: &str = r"[a-z0-9\-]{1,40}";
const ALGORITHM_PATTERN: &str = r"[a-z0-9\-]{1,32}";
const CLUSTER_ID_PATTERN: &str = r"[0-9a-f]{1,32}";
const RULE_ID_PATTERN: &str = r"[0-9a-f]{32}";

fn anchored(pattern: &str) -> Regex {
    Regex::new(&format!("^{pattern}$")).expect("valid regex")
}

static PROJECT_RE: Lazy<Regex> = Lazy::new(|| anchored(PROJECT_PATTERN));
static ALGORITHM_RE: Lazy<Regex> = Lazy::new(|| anchored(ALGORITHM_PATTERN));
static CLUSTER_ID_RE: Lazy<Regex> = Lazy::new(|| anchored(CLUSTER_ID_PATTERN));
static RULE_ID_RE: Lazy<Regex> = Lazy::new(|| anchored(RULE_ID_PATTERN));

static PROJECT_NAME_RE: Lazy<Regex> =
    Lazy::new(|| anchored(&format!("projects/({PROJECT_PATTERN})")));
static PROJECT_CONFIG_NAME_RE: Lazy<Regex> =
    Lazy::new(|| anchored(&format!("projects/({PROJECT_PATTERN})/config")));
static RULE_NAME_RE: Lazy<Regex> =
    Lazy::new(|| anchored(&format!("projects/({PROJECT_PATTERN})/rules/({RULE_ID_PATTERN})")));
static CLUSTER_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    anchored(&format!(
        "projects/({PROJECT_PATTERN})/clusters/({ALGORITHM_PATTERN})/({CLUSTER_ID_PATTERN})"
    ))
});

pub fn validate_project(project: &str) -> WeetbixResult<()> {
    if PROJECT_RE.is_match(project) {
        Ok(())
    } else {
        Err(WeetbixError::invalid(format!(
            "project {project:?}: must match ^{PROJECT_PATTERN}$"
        )))
    }
}

pub fn is_rule_id(id: &str) -> bool {
    RULE_ID_RE.is_match(id)
}

pub fn validate_cluster_id(id: &ClusterId) -> WeetbixResult<()> {
    if !ALGORITHM_RE.is_match(&id.algorithm) {
        return Err(WeetbixError::invalid(format!(
            "cluster algorithm {:?}: must match ^{ALGORITHM_PATTERN}$",
            id.algorithm
        )));
    }
    if !CLUSTER_ID_RE.is_match(&id.id) {
        return Err(WeetbixError::invalid(format!(
            "cluster id {:?}: must match ^{CLUSTER_ID_PATTERN}$",
            id.id
        )));
    }
    Ok(())
}

fn invalid_name(what: &str, name: &str, expected: &str) -> WeetbixError {
    WeetbixError::invalid(format!("invalid {what} name {name:?}, expected format: {expected}"))
}

/// `projects/{project}` -> project
pub fn parse_project_name(name: &str) -> WeetbixResult<String> {
    PROJECT_NAME_RE
        .captures(name)
        .map(|c| c[1].to_string())
        .ok_or_else(|| invalid_name("project", name, "projects/{project}"))
}

/// `projects/{project}/config` -> project
pub fn parse_project_config_name(name: &str) -> WeetbixResult<String> {
    PROJECT_CONFIG_NAME_RE
        .captures(name)
        .map(|c| c[1].to_string())
        .ok_or_else(|| invalid_name("project config", name, "projects/{project}/config"))
}

/// `projects/{project}/rules/{rule_id}` -> (project, rule_id)
pub fn parse_rule_name(name: &str) -> WeetbixResult<(String, String)> {
    RULE_NAME_RE
        .captures(name)
        .map(|c| (c[1].to_string(), c[2].to_string()))
        .ok_or_else(|| invalid_name("rule", name, "projects/{project}/rules/{rule_id}"))
}

/// `projects/{project}/clusters/{algorithm}/{id}` -> (project, cluster id)
pub fn parse_cluster_name(name: &str) -> WeetbixResult<(String, ClusterId)> {
    CLUSTER_NAME_RE
        .captures(name)
        .map(|c| {
            (
                c[1].to_string(),
                ClusterId {
                    algorithm: c[2].to_string(),
                    id: c[3].to_string(),
                },
            )
        })
        .ok_or_else(|| {
            invalid_name(
                "cluster",
                name,
                "projects/{project}/clusters/{cluster_algorithm}/{cluster_id}",
            )
        })
}

pub fn project_name(project: &str) -> String {
    format!("projects/{project}")
}

pub fn project_config_name(project: &str) -> String {
    format!("projects/{project}/config")
}

pub fn rule_name(project: &str, rule_id: &str) -> String {
    format!("projects/{project}/rules/{rule_id}")
}

pub fn cluster_name(project: &str, id: &ClusterId) -> String {
    format!("projects/{project}/clusters/{}/{}", id.algorithm, id.id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_names() {
        assert_eq!(parse_project_name("projects/chromium").unwrap(), "chromium");
        assert_eq!(parse_project_config_name("projects/chrome-os/config").unwrap(), "chrome-os");
        assert!(parse_project_name("projects/Chromium").is_err());
        assert!(parse_project_name("projects/").is_err());
        assert!(parse_project_name(&format!("projects/{}", "a".repeat(41))).is_err());
        assert!(parse_project_name("projects/chromium/config").is_err());
    }

    #[test]
    fn test_rule_names() {
        let id = "0123456789abcdef0123456789abcdef";
        let (project, rule_id) = parse_rule_name(&rule_name("chromium", id)).unwrap();
        assert_eq!(project, "chromium");
        assert_eq!(rule_id, id);

        // rule id 必须是 32 位小写十六进制
        assert!(parse_rule_name("projects/chromium/rules/0123").is_err());
        assert!(parse_rule_name(&format!("projects/chromium/rules/{}", id.to_uppercase())).is_err());
    }

    #[test]
    fn test_cluster_names() {
        let (project, id) = parse_cluster_name("projects/chromium/clusters/reason-v3/0a1b").unwrap();
        assert_eq!(project, "chromium");
        assert_eq!(id.algorithm, "reason-v3");
        assert_eq!(id.id, "0a1b");
        assert_eq!(cluster_name(&project, &id), "projects/chromium/clusters/reason-v3/0a1b");

        assert!(parse_cluster_name("projects/chromium/clusters/reason-v3/").is_err());
        assert!(parse_cluster_name("projects/chromium/clusters/reason_v3/00").is_err());
        assert!(parse_cluster_name(&format!("projects/chromium/clusters/rules-v2/{}", "0".repeat(33))).is_err());
    }

    #[test]
    fn test_validate_cluster_id() {
        assert!(validate_cluster_id(&ClusterId {
            algorithm: "testname-v3".to_string(),
            id: "ff".to_string()
        })
        .is_ok());
        assert!(validate_cluster_id(&ClusterId {
            algorithm: "testname-v3".to_string(),
            id: "FF".to_string()
        })
        .is_err());
    }
}
