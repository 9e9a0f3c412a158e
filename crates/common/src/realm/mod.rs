//! Realm 权限模块
//!
//! Realm 是用于控制资源访问的授权范围。授权记录保存在数据存储中，
//! 默认拒绝：没有匹配的授权即无权限。
//!
//! - `model.rs` - 授权记录实体
//! - `acl.rs` - 权限检查
//! - `validation.rs` - realm 名称校验

pub mod acl;
pub mod error;
pub mod model;
pub mod validation;

pub use acl::{ALL_USERS, Authorizer, RealmSet};
pub use error::{RealmError, RealmResult};
pub use model::RealmGrant;
pub use validation::{
    LEGACY_REALM, PROJECT_REALM, ROOT_REALM, parse_realm, project_realm, root_realm,
    validate_realm,
};
