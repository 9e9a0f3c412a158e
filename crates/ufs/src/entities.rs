//! 机器、机架与资产实体
//!
//! 实体保存完整消息的 protobuf 编码，并把 zone、rack、state、tags、realm 等
//! 可查询字段展开为索引项。

use fleet_common::storage::base64_bytes;
use fleet_common::{Entity, IndexEntry};
use fleet_proto::Timestamp;
use fleet_proto::ufs::{Asset, AssetType, Location, Machine, Rack, State, Zone};
use prost::Message;
use serde::{Deserialize, Serialize};

use crate::error::{UfsError, UfsResult};
use crate::filter::{FilterKey, ValueKind};
use crate::names::resource_name;
use crate::realm::realm_of;

pub const MACHINE_KIND: &str = "Machine";
pub const RACK_KIND: &str = "Rack";
pub const ASSET_KIND: &str = "Asset";

/// 登记在 UFS 中的一类资源
pub trait Resource: Entity {
    type Proto: Message + Default + Clone;

    /// 资源名称前缀，同时用于权限名 `ufs.{collection}.{verb}`
    const COLLECTION: &'static str;
    const FILTER_KEYS: &'static [FilterKey];

    /// 由消息构造实体；realm 由 zone 推导
    fn from_proto(id: &str, proto: &Self::Proto) -> Self;

    fn to_proto(&self) -> UfsResult<Self::Proto>;

    fn realm(&self) -> &str;

    /// 只有名称的消息，用于 keys_only 列表
    fn name_only(id: &str) -> Self::Proto;

    fn stamp(proto: &mut Self::Proto, now: Timestamp);

    /// 按 update mask 合并；mask 为空时整体替换可写字段
    fn apply_mask(current: &mut Self::Proto, update: &Self::Proto, paths: &[String]) -> UfsResult<()>;
}

fn unsupported(path: &str) -> UfsError {
    UfsError::invalid(format!("update_mask: unsupported field path {path:?}"))
}

/// `location` 及其子字段；不是 location 路径时返回 false
fn apply_location(current: &mut Option<Location>, update: Option<&Location>, path: &str) -> bool {
    let source = update.cloned().unwrap_or_default();
    match path {
        "location" => *current = update.cloned(),
        "location.zone" => current.get_or_insert_with(Location::default).zone = source.zone,
        "location.rack" => current.get_or_insert_with(Location::default).rack = source.rack,
        "location.shelf" => current.get_or_insert_with(Location::default).shelf = source.shelf,
        "location.position" => {
            current.get_or_insert_with(Location::default).position = source.position
        }
        _ => return false,
    }
    true
}

fn zone_name(location: Option<&Location>) -> String {
    let zone = location.map(|l| l.zone).unwrap_or_default();
    Zone::try_from(zone).unwrap_or(Zone::Unspecified).as_str_name().to_string()
}

fn state_name(state: i32) -> String {
    State::try_from(state).unwrap_or(State::Unspecified).as_str_name().to_string()
}

fn location_realm(location: Option<&Location>) -> String {
    realm_of(location.map(|l| l.zone).unwrap_or_default())
}

// ---- Machine ----

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MachineEntity {
    pub id: String,
    pub zone: String,
    pub rack: String,
    pub state: String,
    pub tags: Vec<String>,
    pub realm: String,
    pub model: String,
    pub board: String,
    pub serial_number: String,
    pub device_type: String,
    #[serde(with = "base64_bytes")]
    pub payload: Vec<u8>,
}

impl Entity for MachineEntity {
    const KIND: &'static str = MACHINE_KIND;

    fn id(&self) -> String {
        self.id.clone()
    }

    fn index(&self) -> Vec<IndexEntry> {
        let mut entries = vec![
            IndexEntry::new("zone", &self.zone),
            IndexEntry::new("rack", &self.rack),
            IndexEntry::new("state", &self.state),
            IndexEntry::new("realm", &self.realm),
            IndexEntry::new("model", &self.model),
            IndexEntry::new("board", &self.board),
            IndexEntry::new("serial_number", &self.serial_number),
            IndexEntry::new("device_type", &self.device_type),
        ];
        entries.extend(IndexEntry::many("tag", &self.tags));
        entries
    }
}

impl Resource for MachineEntity {
    type Proto = Machine;
    const COLLECTION: &'static str = "machines";
    const FILTER_KEYS: &'static [FilterKey] = &[
        FilterKey::typed("zone", "zone", ValueKind::Zone),
        FilterKey::plain("rack", "rack"),
        FilterKey::typed("state", "state", ValueKind::State),
        FilterKey::plain("tags", "tag"),
        FilterKey::plain("realm", "realm"),
        FilterKey::plain("model", "model"),
        FilterKey::plain("board", "board"),
        FilterKey::plain("serialnumber", "serial_number"),
        FilterKey::plain("devicetype", "device_type"),
    ];

    fn from_proto(id: &str, proto: &Machine) -> Self {
        let mut machine = proto.clone();
        machine.name = resource_name(Self::COLLECTION, id);
        machine.realm = location_realm(machine.location.as_ref());
        Self {
            id: id.to_string(),
            zone: zone_name(machine.location.as_ref()),
            rack: machine.location.as_ref().map(|l| l.rack.clone()).unwrap_or_default(),
            state: state_name(machine.resource_state),
            tags: machine.tags.clone(),
            realm: machine.realm.clone(),
            model: machine.model.clone(),
            board: machine.board.clone(),
            serial_number: machine.serial_number.clone(),
            device_type: machine.device_type.clone(),
            payload: machine.encode_to_vec(),
        }
    }

    fn to_proto(&self) -> UfsResult<Machine> {
        Ok(Machine::decode(self.payload.as_slice())?)
    }

    fn realm(&self) -> &str {
        &self.realm
    }

    fn name_only(id: &str) -> Machine {
        Machine {
            name: resource_name(Self::COLLECTION, id),
            ..Default::default()
        }
    }

    fn stamp(proto: &mut Machine, now: Timestamp) {
        proto.update_time = Some(now);
    }

    /// ownership 只能通过 UpdateMachineOwnership 修改，整体替换时保留原值
    fn apply_mask(current: &mut Machine, update: &Machine, paths: &[String]) -> UfsResult<()> {
        if paths.is_empty() {
            let ownership = current.ownership.take();
            *current = update.clone();
            current.ownership = ownership;
            return Ok(());
        }
        for path in paths {
            if apply_location(&mut current.location, update.location.as_ref(), path) {
                continue;
            }
            match path.as_str() {
                "serial_number" => current.serial_number = update.serial_number.clone(),
                "tags" => current.tags = update.tags.clone(),
                "device_type" => current.device_type = update.device_type.clone(),
                "model" => current.model = update.model.clone(),
                "board" => current.board = update.board.clone(),
                "resource_state" => current.resource_state = update.resource_state,
                "ownership" => {
                    return Err(UfsError::invalid(
                        "update_mask: ownership can only be changed by UpdateMachineOwnership",
                    ));
                }
                other => return Err(unsupported(other)),
            }
        }
        Ok(())
    }
}

// ---- Rack ----

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RackEntity {
    pub id: String,
    pub zone: String,
    pub state: String,
    pub tags: Vec<String>,
    pub realm: String,
    #[serde(with = "base64_bytes")]
    pub payload: Vec<u8>,
}

impl Entity for RackEntity {
    const KIND: &'static str = RACK_KIND;

    fn id(&self) -> String {
        self.id.clone()
    }

    fn index(&self) -> Vec<IndexEntry> {
        let mut entries = vec![
            IndexEntry::new("zone", &self.zone),
            IndexEntry::new("state", &self.state),
            IndexEntry::new("realm", &self.realm),
        ];
        entries.extend(IndexEntry::many("tag", &self.tags));
        entries
    }
}

impl Resource for RackEntity {
    type Proto = Rack;
    const COLLECTION: &'static str = "racks";
    const FILTER_KEYS: &'static [FilterKey] = &[
        FilterKey::typed("zone", "zone", ValueKind::Zone),
        FilterKey::typed("state", "state", ValueKind::State),
        FilterKey::plain("tags", "tag"),
        FilterKey::plain("realm", "realm"),
    ];

    fn from_proto(id: &str, proto: &Rack) -> Self {
        let mut rack = proto.clone();
        rack.name = resource_name(Self::COLLECTION, id);
        rack.realm = location_realm(rack.location.as_ref());
        Self {
            id: id.to_string(),
            zone: zone_name(rack.location.as_ref()),
            state: state_name(rack.resource_state),
            tags: rack.tags.clone(),
            realm: rack.realm.clone(),
            payload: rack.encode_to_vec(),
        }
    }

    fn to_proto(&self) -> UfsResult<Rack> {
        Ok(Rack::decode(self.payload.as_slice())?)
    }

    fn realm(&self) -> &str {
        &self.realm
    }

    fn name_only(id: &str) -> Rack {
        Rack {
            name: resource_name(Self::COLLECTION, id),
            ..Default::default()
        }
    }

    fn stamp(proto: &mut Rack, now: Timestamp) {
        proto.update_time = Some(now);
    }

    fn apply_mask(current: &mut Rack, update: &Rack, paths: &[String]) -> UfsResult<()> {
        if paths.is_empty() {
            *current = update.clone();
            return Ok(());
        }
        for path in paths {
            if apply_location(&mut current.location, update.location.as_ref(), path) {
                continue;
            }
            match path.as_str() {
                "tags" => current.tags = update.tags.clone(),
                "capacity_ru" => current.capacity_ru = update.capacity_ru,
                "description" => current.description = update.description.clone(),
                "resource_state" => current.resource_state = update.resource_state,
                other => return Err(unsupported(other)),
            }
        }
        Ok(())
    }
}

// ---- Asset ----

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AssetEntity {
    pub id: String,
    pub zone: String,
    pub rack: String,
    pub asset_type: String,
    pub model: String,
    pub board: String,
    pub serial_number: String,
    pub tags: Vec<String>,
    pub realm: String,
    #[serde(with = "base64_bytes")]
    pub payload: Vec<u8>,
}

impl Entity for AssetEntity {
    const KIND: &'static str = ASSET_KIND;

    fn id(&self) -> String {
        self.id.clone()
    }

    fn index(&self) -> Vec<IndexEntry> {
        let mut entries = vec![
            IndexEntry::new("zone", &self.zone),
            IndexEntry::new("rack", &self.rack),
            IndexEntry::new("type", &self.asset_type),
            IndexEntry::new("model", &self.model),
            IndexEntry::new("board", &self.board),
            IndexEntry::new("serial_number", &self.serial_number),
            IndexEntry::new("realm", &self.realm),
        ];
        entries.extend(IndexEntry::many("tag", &self.tags));
        entries
    }
}

impl Resource for AssetEntity {
    type Proto = Asset;
    const COLLECTION: &'static str = "assets";
    const FILTER_KEYS: &'static [FilterKey] = &[
        FilterKey::typed("zone", "zone", ValueKind::Zone),
        FilterKey::plain("rack", "rack"),
        FilterKey::typed("type", "type", ValueKind::AssetType),
        FilterKey::plain("model", "model"),
        FilterKey::plain("board", "board"),
        FilterKey::plain("serialnumber", "serial_number"),
        FilterKey::plain("tags", "tag"),
        FilterKey::plain("realm", "realm"),
    ];

    fn from_proto(id: &str, proto: &Asset) -> Self {
        let mut asset = proto.clone();
        asset.name = resource_name(Self::COLLECTION, id);
        asset.realm = location_realm(asset.location.as_ref());
        let info = asset.info.clone().unwrap_or_default();
        Self {
            id: id.to_string(),
            zone: zone_name(asset.location.as_ref()),
            rack: asset.location.as_ref().map(|l| l.rack.clone()).unwrap_or_default(),
            asset_type: AssetType::try_from(asset.r#type)
                .unwrap_or(AssetType::Undefined)
                .as_str_name()
                .to_string(),
            model: if asset.model.is_empty() { info.model } else { asset.model.clone() },
            board: info.board,
            serial_number: info.serial_number,
            tags: asset.tags.clone(),
            realm: asset.realm.clone(),
            payload: asset.encode_to_vec(),
        }
    }

    fn to_proto(&self) -> UfsResult<Asset> {
        Ok(Asset::decode(self.payload.as_slice())?)
    }

    fn realm(&self) -> &str {
        &self.realm
    }

    fn name_only(id: &str) -> Asset {
        Asset {
            name: resource_name(Self::COLLECTION, id),
            ..Default::default()
        }
    }

    fn stamp(proto: &mut Asset, now: Timestamp) {
        proto.update_time = Some(now);
    }

    fn apply_mask(current: &mut Asset, update: &Asset, paths: &[String]) -> UfsResult<()> {
        if paths.is_empty() {
            *current = update.clone();
            return Ok(());
        }
        for path in paths {
            if apply_location(&mut current.location, update.location.as_ref(), path) {
                continue;
            }
            match path.as_str() {
                "type" => current.r#type = update.r#type,
                "model" => current.model = update.model.clone(),
                "info" => current.info = update.info.clone(),
                "tags" => current.tags = update.tags.clone(),
                other => return Err(unsupported(other)),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_proto::ufs::{AssetInfo, OwnershipData};

    #[test]
    fn test_machine_mapping() {
        let machine = Machine {
            name: "ignored".to_string(),
            serial_number: "SN1".to_string(),
            location: Some(Location {
                zone: Zone::Chromeos6 as i32,
                rack: "chromeos6-row1-rack2".to_string(),
                ..Default::default()
            }),
            tags: vec!["a".to_string(), "b".to_string()],
            resource_state: State::Serving as i32,
            ..Default::default()
        };
        let entity = MachineEntity::from_proto("m1", &machine);
        assert_eq!(entity.zone, "ZONE_CHROMEOS6");
        assert_eq!(entity.state, "STATE_SERVING");
        assert_eq!(entity.realm, "@internal:ufs/os-acs");
        assert_eq!(entity.index().iter().filter(|e| e.field == "tag").count(), 2);

        let decoded = entity.to_proto().unwrap();
        assert_eq!(decoded.name, "machines/m1");
        assert_eq!(decoded.realm, "@internal:ufs/os-acs");
        assert_eq!(decoded.serial_number, "SN1");
    }

    #[test]
    fn test_asset_mapping() {
        let asset = Asset {
            r#type: AssetType::Servo as i32,
            info: Some(AssetInfo {
                model: "servo_v4".to_string(),
                serial_number: "S-1".to_string(),
                ..Default::default()
            }),
            ..Default::default()
        };
        let entity = AssetEntity::from_proto("a1", &asset);
        assert_eq!(entity.asset_type, "SERVO");
        assert_eq!(entity.model, "servo_v4");
        assert_eq!(entity.zone, "ZONE_UNSPECIFIED");
        assert_eq!(entity.realm, "@internal:@legacy");
    }

    #[test]
    fn test_machine_mask_keeps_ownership() {
        let mut current = Machine {
            serial_number: "SN1".to_string(),
            model: "eve".to_string(),
            ownership: Some(OwnershipData {
                pool_name: "DUT_POOL_QUOTA".to_string(),
                ..Default::default()
            }),
            ..Default::default()
        };
        let update = Machine {
            serial_number: "SN2".to_string(),
            location: Some(Location {
                zone: Zone::Chromeos2 as i32,
                rack: "r9".to_string(),
                ..Default::default()
            }),
            ..Default::default()
        };

        MachineEntity::apply_mask(&mut current, &update, &["location.zone".to_string()]).unwrap();
        let location = current.location.clone().unwrap();
        assert_eq!(location.zone, Zone::Chromeos2 as i32);
        assert!(location.rack.is_empty());
        assert_eq!(current.serial_number, "SN1");

        MachineEntity::apply_mask(&mut current, &update, &[]).unwrap();
        assert_eq!(current.serial_number, "SN2");
        assert!(current.model.is_empty());
        assert_eq!(current.ownership.as_ref().unwrap().pool_name, "DUT_POOL_QUOTA");

        assert!(MachineEntity::apply_mask(&mut current, &update, &["ownership".to_string()]).is_err());
        assert!(MachineEntity::apply_mask(&mut current, &update, &["color".to_string()]).is_err());
    }

    #[test]
    fn test_corrupted_payload() {
        let entity = RackEntity {
            id: "r1".to_string(),
            payload: vec![0xff, 0xff, 0xff],
            ..Default::default()
        };
        assert!(entity.to_proto().is_err());
    }
}
