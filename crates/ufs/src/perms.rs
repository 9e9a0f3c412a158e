//! UFS 权限名称：`ufs.{collection}.{verb}`

pub const GET: &str = "get";
pub const LIST: &str = "list";
pub const CREATE: &str = "create";
pub const UPDATE: &str = "update";
pub const DELETE: &str = "delete";

pub fn permission(collection: &str, verb: &str) -> String {
    format!("ufs.{collection}.{verb}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission() {
        assert_eq!(permission("machines", GET), "ufs.machines.get");
        assert_eq!(permission("assets", DELETE), "ufs.assets.delete");
    }
}
