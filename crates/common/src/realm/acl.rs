//! Realm 访问控制
//!
//! 检查调用方在某个 realm 中是否拥有指定权限

use std::collections::BTreeSet;

use tracing::debug;

use super::error::{RealmError, RealmResult};
use super::model::RealmGrant;
use super::validation::{ROOT_REALM, parse_realm, root_realm};
use crate::prpc::Caller;
use crate::storage::{Datastore, Query};

/// 代表所有调用方（含匿名）的身份组
pub const ALL_USERS: &str = "group:all";

/// 调用方拥有某项权限的 realm 集合
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RealmSet {
    realms: BTreeSet<String>,
    /// 在 `{project}:@root` 上被授权的项目
    root_projects: BTreeSet<String>,
}

impl RealmSet {
    /// 该 realm 是否在集合内
    pub fn allows(&self, realm: &str) -> bool {
        if self.realms.contains(realm) {
            return true;
        }
        parse_realm(realm).is_ok_and(|(project, _)| self.root_projects.contains(project))
    }

    pub fn is_empty(&self) -> bool {
        self.realms.is_empty() && self.root_projects.is_empty()
    }

    /// 是否包含项目级通配授权
    ///
    /// 包含时无法把集合直接转为 `IN` 查询条件，需要逐个调用 [`RealmSet::allows`]。
    pub fn has_project_roots(&self) -> bool {
        !self.root_projects.is_empty()
    }

    pub fn realms(&self) -> &BTreeSet<String> {
        &self.realms
    }
}

/// 授权检查器
#[derive(Clone, Debug)]
pub struct Authorizer {
    store: Datastore,
}

impl Authorizer {
    pub fn new(store: Datastore) -> Self {
        Self { store }
    }

    /// 授予权限
    pub async fn grant(&self, realm: &str, identity: &str, permission: &str) -> RealmResult<()> {
        parse_realm(realm)?;
        self.store
            .put(&RealmGrant::new(realm, identity, permission))
            .await?;
        debug!(realm, identity, permission, "permission granted");
        Ok(())
    }

    /// 撤销权限
    pub async fn revoke(&self, realm: &str, identity: &str, permission: &str) -> RealmResult<()> {
        let id = RealmGrant::grant_id(realm, identity, permission);
        match self.store.delete::<RealmGrant>(&id).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => Err(RealmError::GrantNotFound),
            Err(e) => Err(e.into()),
        }
    }

    /// 检查调用方在 realm 中是否拥有权限
    ///
    /// 对调用方本人或 `group:all` 的授权都有效；`{project}:@root` 上的授权
    /// 覆盖项目内所有 realm。
    pub async fn has_permission(
        &self,
        caller: &Caller,
        permission: &str,
        realm: &str,
    ) -> RealmResult<bool> {
        let (project, _) = parse_realm(realm)?;
        let realms = [realm.to_string(), root_realm(project)];
        let query = Query::of::<RealmGrant>()
            .eq("permission", permission)
            .in_values("identity", [caller.identity(), ALL_USERS])
            .in_values("realm", realms);
        let granted = self.store.count(&query).await? > 0;
        debug!(
            identity = caller.identity(),
            permission, realm, granted, "permission check"
        );
        Ok(granted)
    }

    /// 权限检查，无权限时返回 `PermissionDenied`
    pub async fn check_permission(
        &self,
        caller: &Caller,
        permission: &str,
        realm: &str,
    ) -> RealmResult<()> {
        if self.has_permission(caller, permission, realm).await? {
            Ok(())
        } else {
            Err(RealmError::PermissionDenied {
                identity: caller.identity().to_string(),
                permission: permission.to_string(),
                realm: realm.to_string(),
            })
        }
    }

    /// 调用方拥有指定权限的全部 realm
    pub async fn realms_with_permission(
        &self,
        caller: &Caller,
        permission: &str,
    ) -> RealmResult<RealmSet> {
        let query = Query::of::<RealmGrant>()
            .eq("permission", permission)
            .in_values("identity", [caller.identity(), ALL_USERS]);
        let grants = self.store.get_all::<RealmGrant>(&query).await?;

        let mut set = RealmSet::default();
        for grant in grants {
            match parse_realm(&grant.realm) {
                Ok((project, ROOT_REALM)) => {
                    set.root_projects.insert(project.to_string());
                }
                Ok(_) => {
                    set.realms.insert(grant.realm.clone());
                }
                Err(_) => {}
            }
        }
        Ok(set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn authorizer() -> Authorizer {
        let auth = Authorizer::new(Datastore::memory());
        auth.grant("chromium:ci", "user:alice@example.com", "ufs.machines.get")
            .await
            .unwrap();
        auth.grant("chromium:@root", "user:bob@example.com", "ufs.machines.get")
            .await
            .unwrap();
        auth.grant("public:ci", ALL_USERS, "ufs.machines.get")
            .await
            .unwrap();
        auth
    }

    #[tokio::test]
    async fn test_default_deny() {
        let auth = Authorizer::new(Datastore::memory());
        let caller = Caller::new("user:alice@example.com");
        assert!(
            !auth
                .has_permission(&caller, "ufs.machines.get", "chromium:ci")
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_direct_root_and_group_grants() {
        let auth = authorizer().await;
        let alice = Caller::new("user:alice@example.com");
        let bob = Caller::new("user:bob@example.com");
        let anon = Caller::anonymous();

        assert!(auth.has_permission(&alice, "ufs.machines.get", "chromium:ci").await.unwrap());
        assert!(!auth.has_permission(&alice, "ufs.machines.get", "chromium:try").await.unwrap());
        assert!(!auth.has_permission(&alice, "ufs.machines.delete", "chromium:ci").await.unwrap());

        // @root 覆盖整个项目
        assert!(auth.has_permission(&bob, "ufs.machines.get", "chromium:try").await.unwrap());
        assert!(!auth.has_permission(&bob, "ufs.machines.get", "v8:ci").await.unwrap());

        assert!(auth.has_permission(&anon, "ufs.machines.get", "public:ci").await.unwrap());
    }

    #[tokio::test]
    async fn test_check_permission_error() {
        let auth = authorizer().await;
        let err = auth
            .check_permission(&Caller::anonymous(), "ufs.machines.get", "chromium:ci")
            .await
            .unwrap_err();
        assert!(matches!(err, RealmError::PermissionDenied { .. }));
        let status: tonic::Status = err.into();
        assert_eq!(status.code(), tonic::Code::PermissionDenied);

        let err = auth
            .check_permission(&Caller::anonymous(), "ufs.machines.get", "not a realm")
            .await
            .unwrap_err();
        assert!(matches!(err, RealmError::InvalidRealm { .. }));
    }

    #[tokio::test]
    async fn test_realms_with_permission() {
        let auth = authorizer().await;

        let alice = auth
            .realms_with_permission(&Caller::new("user:alice@example.com"), "ufs.machines.get")
            .await
            .unwrap();
        assert!(alice.allows("chromium:ci"));
        assert!(alice.allows("public:ci"));
        assert!(!alice.allows("chromium:try"));
        assert!(!alice.has_project_roots());

        let bob = auth
            .realms_with_permission(&Caller::new("user:bob@example.com"), "ufs.machines.get")
            .await
            .unwrap();
        assert!(bob.has_project_roots());
        assert!(bob.allows("chromium:anything"));
    }

    #[tokio::test]
    async fn test_revoke() {
        let auth = authorizer().await;
        auth.revoke("chromium:ci", "user:alice@example.com", "ufs.machines.get")
            .await
            .unwrap();
        assert!(matches!(
            auth.revoke("chromium:ci", "user:alice@example.com", "ufs.machines.get")
                .await,
            Err(RealmError::GrantNotFound)
        ));
    }
}
