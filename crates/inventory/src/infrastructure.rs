//! Drone 与 DUT 的分配关系

use std::collections::HashMap;

use fleet_proto::inventory::{
    DeviceUnderTest, DutAssignment, DutRemoval, Lab, ListServersRequest, Server, ServerRole,
};
use tracing::debug;

use crate::error::{InventoryError, InventoryResult};

fn is_drone(server: &Server) -> bool {
    server.roles().any(|r| r == ServerRole::SkylabDrone)
}

/// DUT 当前所在的 drone
pub fn drone_of<'a>(lab: &'a Lab, dut_id: &str) -> Option<&'a Server> {
    lab.servers
        .iter()
        .find(|s| s.dut_uids.iter().any(|u| u == dut_id))
}

fn find_dut<'a>(lab: &'a Lab, dut_id: &str) -> InventoryResult<&'a DeviceUnderTest> {
    lab.duts
        .iter()
        .find(|d| d.id == dut_id)
        .ok_or_else(|| InventoryError::dut_not_found(dut_id))
}

fn find_drone(lab: &Lab, hostname: &str) -> InventoryResult<usize> {
    let index = lab
        .servers
        .iter()
        .position(|s| s.hostname == hostname)
        .ok_or_else(|| InventoryError::invalid(format!("unknown server {hostname:?}")))?;
    if !is_drone(&lab.servers[index]) {
        return Err(InventoryError::invalid(format!(
            "server {hostname:?} is not a drone"
        )));
    }
    Ok(index)
}

/// 与 DUT 同环境、负载最小的 drone；负载相同时按主机名排序
fn least_loaded_drone(lab: &Lab, environment: i32) -> Option<usize> {
    lab.servers
        .iter()
        .enumerate()
        .filter(|(_, s)| is_drone(s) && s.environment == environment)
        .min_by(|(_, a), (_, b)| {
            a.dut_uids
                .len()
                .cmp(&b.dut_uids.len())
                .then_with(|| a.hostname.cmp(&b.hostname))
        })
        .map(|(i, _)| i)
}

/// 把 DUT 分配给 drone，返回实际的分配结果
///
/// 未指定 drone 时选择同环境中负载最小的 drone。已分配的 DUT 返回
/// `InvalidArgument`。任一分配失败时库存保持不变。
pub fn assign_duts_to_drones(lab: &mut Lab, assignments: &[DutAssignment]) -> InventoryResult<Vec<DutAssignment>> {
    let mut staged = lab.clone();
    let mut assigned = Vec::with_capacity(assignments.len());
    for assignment in assignments {
        let dut = find_dut(&staged, &assignment.dut_id)?;
        let environment = dut.environment;
        if let Some(current) = drone_of(&staged, &assignment.dut_id) {
            return Err(InventoryError::invalid(format!(
                "DUT {:?} is already assigned to drone {:?}",
                assignment.dut_id, current.hostname
            )));
        }

        let index = if assignment.drone_hostname.is_empty() {
            least_loaded_drone(&staged, environment).ok_or_else(|| {
                InventoryError::FailedPrecondition(format!(
                    "no drone available for DUT {:?} in environment {environment}",
                    assignment.dut_id
                ))
            })?
        } else {
            find_drone(&staged, &assignment.drone_hostname)?
        };

        let drone = &mut staged.servers[index];
        drone.dut_uids.push(assignment.dut_id.clone());
        debug!(dut = %assignment.dut_id, drone = %drone.hostname, "DUT assigned");
        assigned.push(DutAssignment {
            dut_id: assignment.dut_id.clone(),
            drone_hostname: drone.hostname.clone(),
        });
    }
    *lab = staged;
    Ok(assigned)
}

/// 从 drone 上移除 DUT
///
/// 指定了 drone 时 DUT 必须分配在该 drone 上。任一移除失败时库存保持不变。
pub fn remove_duts_from_drones(lab: &mut Lab, removals: &[DutRemoval]) -> InventoryResult<Vec<DutRemoval>> {
    let mut staged = lab.clone();
    let mut removed = Vec::with_capacity(removals.len());
    for removal in removals {
        let index = staged
            .servers
            .iter()
            .position(|s| s.dut_uids.iter().any(|u| *u == removal.dut_id))
            .ok_or_else(|| {
                InventoryError::invalid(format!("DUT {:?} is not assigned to any drone", removal.dut_id))
            })?;
        let drone = &mut staged.servers[index];
        if !removal.drone_hostname.is_empty() && removal.drone_hostname != drone.hostname {
            return Err(InventoryError::invalid(format!(
                "DUT {:?} is assigned to drone {:?}, not {:?}",
                removal.dut_id, drone.hostname, removal.drone_hostname
            )));
        }
        drone.dut_uids.retain(|u| *u != removal.dut_id);
        removed.push(DutRemoval {
            dut_id: removal.dut_id.clone(),
            drone_hostname: drone.hostname.clone(),
        });
    }
    *lab = staged;
    Ok(removed)
}

/// 按主机名和环境过滤服务器，空条件匹配全部
pub fn list_servers(lab: &Lab, req: &ListServersRequest) -> Vec<Server> {
    let mut servers: Vec<Server> = lab
        .servers
        .iter()
        .filter(|s| req.hostname.is_empty() || s.hostname == req.hostname)
        .filter(|s| req.environment == 0 || s.environment == req.environment)
        .cloned()
        .collect();
    servers.sort_by(|a, b| a.hostname.cmp(&b.hostname));
    servers
}

/// DUT id 到 drone 主机名的映射
pub fn drone_assignments(lab: &Lab) -> HashMap<&str, &str> {
    lab.servers
        .iter()
        .flat_map(|s| s.dut_uids.iter().map(move |u| (u.as_str(), s.hostname.as_str())))
        .collect()
}
