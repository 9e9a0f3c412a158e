//! UFS Fleet 服务
//!
//! 机器、机架、资产三类资源共用同一套读写流程，差异只在 [`Resource`] 的实现上。
//! 每个资源的 realm 由所在 zone 推导，权限在资源 realm 上检查；修改 zone 的
//! 更新需要同时拥有新旧两个 realm 的 update 权限。

use fleet_common::config::UfsConfig;
use fleet_common::pagination::page_size;
use fleet_common::realm::root_realm;
use fleet_common::{Authorizer, Caller, Datastore};
use fleet_proto::Empty;
use fleet_proto::time::now;
use fleet_proto::ufs::{
    Asset, BatchGetAssetsResponse, BatchGetMachinesResponse, BatchGetRacksResponse,
    BatchGetRequest, CreateAssetRequest, CreateMachineRequest, CreateRackRequest,
    ListAssetsResponse, ListMachinesResponse, ListRacksResponse, ListRequest, Machine, NameRequest,
    Rack, UpdateAssetRequest, UpdateMachineOwnershipRequest, UpdateMachineRequest,
    UpdateRackRequest,
};
use fleet_proto::FieldMask;
use tracing::{debug, info};

use crate::entities::{AssetEntity, MachineEntity, RackEntity, Resource};
use crate::error::{UfsError, UfsResult};
use crate::names::{parse_name, validate_id};
use crate::perms::{self, permission};
use crate::realm::INTERNAL_PROJECT;
use crate::registry::{ListOptions, RealmScope, Registry};

#[derive(Clone, Debug)]
pub struct FleetService {
    machines: Registry<MachineEntity>,
    racks: Registry<RackEntity>,
    assets: Registry<AssetEntity>,
    authorizer: Authorizer,
    config: UfsConfig,
}

fn mask_paths(mask: Option<FieldMask>) -> Vec<String> {
    mask.map(|m| m.paths).unwrap_or_default()
}

/// 请求中显式给出的 id 优先，否则取自消息的 name
fn resolve_id(collection: &str, explicit: &str, name: &str) -> UfsResult<String> {
    if explicit.is_empty() {
        parse_name(collection, name)
    } else {
        validate_id(explicit)?;
        Ok(explicit.to_string())
    }
}

impl FleetService {
    pub fn new(store: Datastore, config: UfsConfig) -> Self {
        Self {
            machines: Registry::new(store.clone()),
            racks: Registry::new(store.clone()),
            assets: Registry::new(store.clone()),
            authorizer: Authorizer::new(store),
            config,
        }
    }

    pub fn authorizer(&self) -> &Authorizer {
        &self.authorizer
    }

    pub fn machines(&self) -> &Registry<MachineEntity> {
        &self.machines
    }

    async fn check<R: Resource>(&self, caller: &Caller, verb: &str, realm: &str) -> UfsResult<()> {
        self.authorizer
            .check_permission(caller, &permission(R::COLLECTION, verb), realm)
            .await?;
        Ok(())
    }

    /// 调用方可列出的 realm；在 `@internal:@root` 上有权限时不做限制
    async fn list_scope<R: Resource>(&self, caller: &Caller) -> UfsResult<RealmScope> {
        let set = self
            .authorizer
            .realms_with_permission(caller, &permission(R::COLLECTION, perms::LIST))
            .await?;
        if set.allows(&root_realm(INTERNAL_PROJECT)) {
            return Ok(RealmScope::All);
        }
        let prefix = format!("{INTERNAL_PROJECT}:");
        Ok(RealmScope::Only(
            set.realms()
                .iter()
                .filter(|r| r.starts_with(&prefix))
                .cloned()
                .collect(),
        ))
    }

    async fn create_resource<R: Resource>(
        &self,
        registry: &Registry<R>,
        caller: &Caller,
        id: String,
        mut proto: R::Proto,
    ) -> UfsResult<R::Proto> {
        R::stamp(&mut proto, now());
        let entity = R::from_proto(&id, &proto);
        self.check::<R>(caller, perms::CREATE, entity.realm()).await?;
        registry.create(&entity).await?;
        entity.to_proto()
    }

    async fn update_resource<R: Resource>(
        &self,
        registry: &Registry<R>,
        caller: &Caller,
        update: R::Proto,
        name: &str,
        paths: &[String],
    ) -> UfsResult<R::Proto> {
        let id = parse_name(R::COLLECTION, name)?;
        let current = registry.get(&id).await?;
        self.check::<R>(caller, perms::UPDATE, current.realm()).await?;

        let mut proto = current.to_proto()?;
        R::apply_mask(&mut proto, &update, paths)?;
        R::stamp(&mut proto, now());
        let updated = R::from_proto(&id, &proto);
        if updated.realm() != current.realm() {
            self.check::<R>(caller, perms::UPDATE, updated.realm()).await?;
            info!(
                kind = R::KIND,
                id = %id,
                from = current.realm(),
                to = updated.realm(),
                "resource moved between realms"
            );
        }
        registry.update(&updated).await?;
        updated.to_proto()
    }

    async fn get_resource<R: Resource>(
        &self,
        registry: &Registry<R>,
        caller: &Caller,
        name: &str,
    ) -> UfsResult<R::Proto> {
        let id = parse_name(R::COLLECTION, name)?;
        let entity = registry.get(&id).await?;
        self.check::<R>(caller, perms::GET, entity.realm()).await?;
        entity.to_proto()
    }

    async fn batch_get_resources<R: Resource>(
        &self,
        registry: &Registry<R>,
        caller: &Caller,
        names: &[String],
    ) -> UfsResult<Vec<R::Proto>> {
        if names.len() > self.config.max_page_size {
            return Err(UfsError::invalid(format!(
                "names: at most {} names can be requested at once, got {}",
                self.config.max_page_size,
                names.len()
            )));
        }
        let ids = names
            .iter()
            .map(|n| parse_name(R::COLLECTION, n))
            .collect::<UfsResult<Vec<_>>>()?;
        let entities = registry.batch_get(&ids).await?;
        let mut protos = Vec::with_capacity(entities.len());
        for entity in &entities {
            self.check::<R>(caller, perms::GET, entity.realm()).await?;
            protos.push(entity.to_proto()?);
        }
        Ok(protos)
    }

    async fn list_resources<R: Resource>(
        &self,
        registry: &Registry<R>,
        caller: &Caller,
        req: ListRequest,
    ) -> UfsResult<(Vec<R::Proto>, String)> {
        let size = page_size(
            req.page_size,
            self.config.default_page_size,
            self.config.max_page_size,
        )
        .map_err(|s| UfsError::invalid(s.message()))?;
        let scope = self.list_scope::<R>(caller).await?;
        debug!(kind = R::KIND, ?scope, filter = %req.filter, "list resources");
        let opts = ListOptions {
            page_size: size,
            page_token: req.page_token,
            filter: req.filter,
        };
        if req.keys_only {
            let page = registry.list_keys(&opts, &scope).await?;
            let token = page.next_token();
            return Ok((page.items.iter().map(|id| R::name_only(id)).collect(), token));
        }
        let page = registry.list(&opts, &scope).await?;
        let token = page.next_token();
        let protos = page
            .items
            .iter()
            .map(R::to_proto)
            .collect::<UfsResult<Vec<_>>>()?;
        Ok((protos, token))
    }

    async fn delete_resource<R: Resource>(
        &self,
        registry: &Registry<R>,
        caller: &Caller,
        id: &str,
    ) -> UfsResult<()> {
        let entity = registry.get(id).await?;
        self.check::<R>(caller, perms::DELETE, entity.realm()).await?;
        registry.delete(id).await
    }

    // ---- Machines ----

    pub async fn create_machine(&self, caller: &Caller, req: CreateMachineRequest) -> UfsResult<Machine> {
        let machine = req
            .machine
            .ok_or_else(|| UfsError::invalid("machine: unspecified"))?;
        let id = resolve_id(MachineEntity::COLLECTION, &req.machine_id, &machine.name)?;
        self.create_resource(&self.machines, caller, id, machine).await
    }

    pub async fn update_machine(&self, caller: &Caller, req: UpdateMachineRequest) -> UfsResult<Machine> {
        let machine = req
            .machine
            .ok_or_else(|| UfsError::invalid("machine: unspecified"))?;
        let name = machine.name.clone();
        let paths = mask_paths(req.update_mask);
        self.update_resource(&self.machines, caller, machine, &name, &paths)
            .await
    }

    /// 只修改 ownership，其余字段保持不变
    pub async fn update_machine_ownership(
        &self,
        caller: &Caller,
        req: UpdateMachineOwnershipRequest,
    ) -> UfsResult<Machine> {
        let id = parse_name(MachineEntity::COLLECTION, &req.name)?;
        let current = self.machines.get(&id).await?;
        self.check::<MachineEntity>(caller, perms::UPDATE, current.realm())
            .await?;
        let mut machine = current.to_proto()?;
        machine.ownership = req.ownership;
        MachineEntity::stamp(&mut machine, now());
        let updated = MachineEntity::from_proto(&id, &machine);
        self.machines.update(&updated).await?;
        info!(id = %id, "machine ownership updated");
        updated.to_proto()
    }

    pub async fn get_machine(&self, caller: &Caller, req: NameRequest) -> UfsResult<Machine> {
        self.get_resource(&self.machines, caller, &req.name).await
    }

    pub async fn batch_get_machines(
        &self,
        caller: &Caller,
        req: BatchGetRequest,
    ) -> UfsResult<BatchGetMachinesResponse> {
        let machines = self
            .batch_get_resources(&self.machines, caller, &req.names)
            .await?;
        Ok(BatchGetMachinesResponse { machines })
    }

    pub async fn list_machines(&self, caller: &Caller, req: ListRequest) -> UfsResult<ListMachinesResponse> {
        let (machines, next_page_token) = self.list_resources(&self.machines, caller, req).await?;
        Ok(ListMachinesResponse {
            machines,
            next_page_token,
        })
    }

    pub async fn delete_machine(&self, caller: &Caller, req: NameRequest) -> UfsResult<Empty> {
        let id = parse_name(MachineEntity::COLLECTION, &req.name)?;
        self.delete_resource(&self.machines, caller, &id).await?;
        Ok(Empty {})
    }

    // ---- Racks ----

    pub async fn create_rack(&self, caller: &Caller, req: CreateRackRequest) -> UfsResult<Rack> {
        let rack = req.rack.ok_or_else(|| UfsError::invalid("rack: unspecified"))?;
        let id = resolve_id(RackEntity::COLLECTION, &req.rack_id, &rack.name)?;
        self.create_resource(&self.racks, caller, id, rack).await
    }

    pub async fn update_rack(&self, caller: &Caller, req: UpdateRackRequest) -> UfsResult<Rack> {
        let rack = req.rack.ok_or_else(|| UfsError::invalid("rack: unspecified"))?;
        let name = rack.name.clone();
        let paths = mask_paths(req.update_mask);
        self.update_resource(&self.racks, caller, rack, &name, &paths)
            .await
    }

    pub async fn get_rack(&self, caller: &Caller, req: NameRequest) -> UfsResult<Rack> {
        self.get_resource(&self.racks, caller, &req.name).await
    }

    pub async fn batch_get_racks(&self, caller: &Caller, req: BatchGetRequest) -> UfsResult<BatchGetRacksResponse> {
        let racks = self
            .batch_get_resources(&self.racks, caller, &req.names)
            .await?;
        Ok(BatchGetRacksResponse { racks })
    }

    pub async fn list_racks(&self, caller: &Caller, req: ListRequest) -> UfsResult<ListRacksResponse> {
        let (racks, next_page_token) = self.list_resources(&self.racks, caller, req).await?;
        Ok(ListRacksResponse {
            racks,
            next_page_token,
        })
    }

    /// 仍有机器或资产位于该机架时拒绝删除
    pub async fn delete_rack(&self, caller: &Caller, req: NameRequest) -> UfsResult<Empty> {
        let id = parse_name(RackEntity::COLLECTION, &req.name)?;
        let machines = self.machines.query_by_property("rack", &id).await?;
        let assets = self.assets.query_by_property("rack", &id).await?;
        if !machines.is_empty() || !assets.is_empty() {
            let mut users: Vec<String> = machines.iter().map(|m| format!("machines/{}", m.id)).collect();
            users.extend(assets.iter().map(|a| format!("assets/{}", a.id)));
            return Err(UfsError::FailedPrecondition(format!(
                "rack {id:?} is still referenced by {}",
                users.join(", ")
            )));
        }
        self.delete_resource(&self.racks, caller, &id).await?;
        Ok(Empty {})
    }

    // ---- Assets ----

    pub async fn create_asset(&self, caller: &Caller, req: CreateAssetRequest) -> UfsResult<Asset> {
        let asset = req.asset.ok_or_else(|| UfsError::invalid("asset: unspecified"))?;
        let id = parse_name(AssetEntity::COLLECTION, &asset.name)?;
        self.create_resource(&self.assets, caller, id, asset).await
    }

    pub async fn update_asset(&self, caller: &Caller, req: UpdateAssetRequest) -> UfsResult<Asset> {
        let asset = req.asset.ok_or_else(|| UfsError::invalid("asset: unspecified"))?;
        let name = asset.name.clone();
        let paths = mask_paths(req.update_mask);
        self.update_resource(&self.assets, caller, asset, &name, &paths)
            .await
    }

    pub async fn get_asset(&self, caller: &Caller, req: NameRequest) -> UfsResult<Asset> {
        self.get_resource(&self.assets, caller, &req.name).await
    }

    pub async fn batch_get_assets(&self, caller: &Caller, req: BatchGetRequest) -> UfsResult<BatchGetAssetsResponse> {
        let assets = self
            .batch_get_resources(&self.assets, caller, &req.names)
            .await?;
        Ok(BatchGetAssetsResponse { assets })
    }

    pub async fn list_assets(&self, caller: &Caller, req: ListRequest) -> UfsResult<ListAssetsResponse> {
        let (assets, next_page_token) = self.list_resources(&self.assets, caller, req).await?;
        Ok(ListAssetsResponse {
            assets,
            next_page_token,
        })
    }

    pub async fn delete_asset(&self, caller: &Caller, req: NameRequest) -> UfsResult<Empty> {
        let id = parse_name(AssetEntity::COLLECTION, &req.name)?;
        self.delete_resource(&self.assets, caller, &id).await?;
        Ok(Empty {})
    }
}
