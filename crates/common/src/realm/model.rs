//! Realm 授权记录

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::storage::{Entity, IndexEntry};

/// 一条授权：身份 `identity` 在 realm `realm` 中拥有权限 `permission`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealmGrant {
    pub realm: String,
    pub identity: String,
    pub permission: String,
    pub granted_at: DateTime<Utc>,
}

impl RealmGrant {
    pub fn new(
        realm: impl Into<String>,
        identity: impl Into<String>,
        permission: impl Into<String>,
    ) -> Self {
        Self {
            realm: realm.into(),
            identity: identity.into(),
            permission: permission.into(),
            granted_at: Utc::now(),
        }
    }

    pub fn grant_id(realm: &str, identity: &str, permission: &str) -> String {
        format!("{realm}|{identity}|{permission}")
    }
}

impl Entity for RealmGrant {
    const KIND: &'static str = "RealmGrant";

    fn id(&self) -> String {
        Self::grant_id(&self.realm, &self.identity, &self.permission)
    }

    fn index(&self) -> Vec<IndexEntry> {
        vec![
            IndexEntry::new("realm", &self.realm),
            IndexEntry::new("identity", &self.identity),
            IndexEntry::new("permission", &self.permission),
        ]
    }
}
