//! 由 zone 推导资源所属的 realm
//!
//! ChromeOS 实验室的 zone 映射到 `@internal:ufs/os-{site}`，浏览器实验室映射到
//! `@internal:ufs/browser-{site}`。未指定 zone 的资源归入 `@internal:@legacy`。

use fleet_common::realm::LEGACY_REALM;
use fleet_proto::ufs::Zone;

/// 内部资源所在的 realm 项目
pub const INTERNAL_PROJECT: &str = "@internal";

pub fn is_browser_zone(zone: Zone) -> bool {
    matches!(
        zone,
        Zone::Atl97 | Zone::Iad97 | Zone::Mtv96 | Zone::Mtv97 | Zone::Sfo36Browser
    )
}

fn site(zone: Zone) -> Option<&'static str> {
    let site = match zone {
        Zone::Unspecified => return None,
        Zone::Atl97 => "atl",
        Zone::Iad97 => "iad",
        Zone::Mtv96 | Zone::Mtv97 => "mtv",
        Zone::Sfo36Browser | Zone::Sfo36Os => "sfo",
        Zone::Chromeos2 | Zone::Chromeos4 | Zone::Chromeos6 => "acs",
        Zone::Chromeos1 | Zone::Chromeos3 | Zone::Chromeos5 | Zone::Chromeos7 | Zone::Chromeos15 => {
            "atl"
        }
        Zone::Satlab => "satlab",
    };
    Some(site)
}

/// zone 对应的全局 realm 名称
pub fn zone_realm(zone: Zone) -> String {
    match site(zone) {
        None => format!("{INTERNAL_PROJECT}:{LEGACY_REALM}"),
        Some(site) if is_browser_zone(zone) => format!("{INTERNAL_PROJECT}:ufs/browser-{site}"),
        Some(site) => format!("{INTERNAL_PROJECT}:ufs/os-{site}"),
    }
}

/// 原始 zone 值对应的 realm，无法识别的值按未指定处理
pub fn realm_of(zone: i32) -> String {
    zone_realm(Zone::try_from(zone).unwrap_or(Zone::Unspecified))
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_common::realm::validate_realm;
    use fleet_proto::ufs::ALL_ZONES;

    #[test]
    fn test_zone_realms() {
        assert_eq!(zone_realm(Zone::Chromeos6), "@internal:ufs/os-acs");
        assert_eq!(zone_realm(Zone::Chromeos1), "@internal:ufs/os-atl");
        assert_eq!(zone_realm(Zone::Sfo36Os), "@internal:ufs/os-sfo");
        assert_eq!(zone_realm(Zone::Sfo36Browser), "@internal:ufs/browser-sfo");
        assert_eq!(zone_realm(Zone::Mtv96), "@internal:ufs/browser-mtv");
        assert_eq!(zone_realm(Zone::Unspecified), "@internal:@legacy");
        assert_eq!(realm_of(999), "@internal:@legacy");
    }

    #[test]
    fn test_every_zone_maps_to_valid_realm() {
        for zone in ALL_ZONES {
            validate_realm(&zone_realm(zone)).unwrap();
        }
    }
}
