//! DUT 资源池调整
//!
//! 两个操作都是在内存中的 DUT 列表上做贪心移动，返回所有池变化；
//! 调用方负责提交修改后的库存。

use std::cmp::Reverse;
use std::collections::{BTreeSet, HashMap};

use fleet_proto::inventory::{BalancePoolsModelResult, DeviceUnderTest, DutHealth, DutSelector, PoolChange};

use crate::error::{InventoryError, InventoryResult};

pub fn matches_selector(selector: &DutSelector, dut: &DeviceUnderTest) -> bool {
    (selector.id.is_empty() || selector.id == dut.id)
        && (selector.hostname.is_empty() || selector.hostname == dut.hostname)
        && (selector.model.is_empty() || selector.model == dut.model)
}

pub fn in_pool(dut: &DeviceUnderTest, pool: &str) -> bool {
    dut.pools.iter().any(|p| p == pool)
}

fn health_of(health: &HashMap<String, DutHealth>, dut: &DeviceUnderTest) -> DutHealth {
    health.get(&dut.id).copied().unwrap_or(DutHealth::Unknown)
}

/// Ready 排在最前，没有状态记录的其次
fn health_rank(health: DutHealth) -> u8 {
    match health {
        DutHealth::Ready => 0,
        DutHealth::Unknown => 1,
        _ => 2,
    }
}

/// 已知处于故障状态；没有状态记录不算
pub fn is_unhealthy(health: DutHealth) -> bool {
    health_rank(health) == 2
}

fn validate_pools(target: &str, spare: &str) -> InventoryResult<()> {
    if target.is_empty() {
        return Err(InventoryError::invalid("target_pool: unspecified"));
    }
    if spare.is_empty() {
        return Err(InventoryError::invalid("spare_pool: unspecified"));
    }
    if target == spare {
        return Err(InventoryError::invalid(format!(
            "target_pool and spare_pool must differ, both are {target:?}"
        )));
    }
    Ok(())
}

fn move_dut(dut: &mut DeviceUnderTest, from: &str, to: &str) -> PoolChange {
    dut.pools.retain(|p| p != from && p != to);
    dut.pools.push(to.to_string());
    PoolChange {
        dut_id: dut.id.clone(),
        old_pool: from.to_string(),
        new_pool: to.to_string(),
    }
}

/// 把选中 DUT 中属于 `target` 池的数量调整为 `size`
///
/// 扩容时从 `spare` 池补充，优先健康的 DUT；缩容时移回 `spare` 池，
/// 优先移出不健康的 DUT。备用 DUT 不足时返回 `FailedPrecondition`，不做任何修改。
pub fn resize(
    duts: &mut [DeviceUnderTest],
    health: &HashMap<String, DutHealth>,
    selector: &DutSelector,
    target: &str,
    spare: &str,
    size: usize,
) -> InventoryResult<Vec<PoolChange>> {
    validate_pools(target, spare)?;

    let selected: Vec<usize> = (0..duts.len())
        .filter(|&i| matches_selector(selector, &duts[i]))
        .collect();
    let mut in_target: Vec<usize> = selected
        .iter()
        .copied()
        .filter(|&i| in_pool(&duts[i], target))
        .collect();
    let mut in_spare: Vec<usize> = selected
        .iter()
        .copied()
        .filter(|&i| !in_pool(&duts[i], target) && in_pool(&duts[i], spare))
        .collect();

    let current = in_target.len();
    if current == size {
        return Ok(Vec::new());
    }

    if current < size {
        let need = size - current;
        if in_spare.len() < need {
            return Err(InventoryError::FailedPrecondition(format!(
                "not enough DUTs in spare pool {spare:?}: need {need}, have {}",
                in_spare.len()
            )));
        }
        in_spare.sort_by_key(|&i| (health_rank(health_of(health, &duts[i])), duts[i].hostname.clone()));
        Ok(in_spare[..need]
            .iter()
            .map(|&i| move_dut(&mut duts[i], spare, target))
            .collect())
    } else {
        let excess = current - size;
        in_target.sort_by_key(|&i| {
            (
                Reverse(health_rank(health_of(health, &duts[i]))),
                duts[i].hostname.clone(),
            )
        });
        Ok(in_target[..excess]
            .iter()
            .map(|&i| move_dut(&mut duts[i], target, spare))
            .collect())
    }
}

/// 对每个型号，把 `target` 池中的故障 DUT 与 `spare` 池中健康的 DUT 交换
///
/// `model` 为空时处理 `target` 池中出现的所有型号。备用 DUT 不够时
/// 尽量交换，剩余的故障数量记录在结果中。
pub fn balance(
    duts: &mut [DeviceUnderTest],
    health: &HashMap<String, DutHealth>,
    model: &str,
    target: &str,
    spare: &str,
) -> InventoryResult<Vec<BalancePoolsModelResult>> {
    validate_pools(target, spare)?;

    let models: BTreeSet<String> = duts
        .iter()
        .filter(|d| in_pool(d, target) && (model.is_empty() || d.model == model))
        .map(|d| d.model.clone())
        .collect();

    let mut results = Vec::with_capacity(models.len());
    for model in models {
        let mut unhealthy: Vec<usize> = (0..duts.len())
            .filter(|&i| {
                let dut = &duts[i];
                dut.model == model && in_pool(dut, target) && is_unhealthy(health_of(health, dut))
            })
            .collect();
        let mut spares: Vec<usize> = (0..duts.len())
            .filter(|&i| {
                let dut = &duts[i];
                dut.model == model
                    && !in_pool(dut, target)
                    && in_pool(dut, spare)
                    && health_of(health, dut) == DutHealth::Ready
            })
            .collect();
        unhealthy.sort_by(|&a, &b| duts[a].hostname.cmp(&duts[b].hostname));
        spares.sort_by(|&a, &b| duts[a].hostname.cmp(&duts[b].hostname));

        let swaps = unhealthy.len().min(spares.len());
        let mut changes = Vec::with_capacity(swaps * 2);
        for (&bad, &good) in unhealthy.iter().zip(&spares) {
            changes.push(move_dut(&mut duts[bad], target, spare));
            changes.push(move_dut(&mut duts[good], spare, target));
        }
        results.push(BalancePoolsModelResult {
            model,
            target_pool_unhealthy_before: unhealthy.len() as i32,
            remaining_unhealthy: (unhealthy.len() - swaps) as i32,
            changes,
        });
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dut(id: &str, model: &str, pool: &str) -> DeviceUnderTest {
        DeviceUnderTest {
            id: id.to_string(),
            hostname: format!("host-{id}"),
            model: model.to_string(),
            pools: vec![pool.to_string()],
            ..Default::default()
        }
    }

    fn health(entries: &[(&str, DutHealth)]) -> HashMap<String, DutHealth> {
        entries.iter().map(|(id, h)| (id.to_string(), *h)).collect()
    }

    fn pool_members(duts: &[DeviceUnderTest], pool: &str) -> Vec<String> {
        duts.iter().filter(|d| in_pool(d, pool)).map(|d| d.id.clone()).collect()
    }

    const CQ: &str = "DUT_POOL_CQ";
    const SUITES: &str = "DUT_POOL_SUITES";

    #[test]
    fn test_resize_grow_prefers_healthy() {
        let mut duts = vec![
            dut("a", "eve", CQ),
            dut("b", "eve", SUITES),
            dut("c", "eve", SUITES),
            dut("d", "eve", SUITES),
            dut("e", "nami", SUITES),
        ];
        let health = health(&[("b", DutHealth::NeedsRepair), ("d", DutHealth::Ready)]);
        let selector = DutSelector {
            model: "eve".to_string(),
            ..Default::default()
        };

        let changes = resize(&mut duts, &health, &selector, CQ, SUITES, 3).unwrap();
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].dut_id, "d");
        assert_eq!(changes[1].dut_id, "c");
        assert_eq!(pool_members(&duts, CQ), vec!["a", "c", "d"]);

        assert!(resize(&mut duts, &health, &selector, CQ, SUITES, 3).unwrap().is_empty());
        let err = resize(&mut duts, &health, &selector, CQ, SUITES, 5).unwrap_err();
        assert!(matches!(err, InventoryError::FailedPrecondition(_)));
        assert_eq!(pool_members(&duts, CQ).len(), 3);
    }

    #[test]
    fn test_resize_shrink_moves_unhealthy_first() {
        let mut duts = vec![dut("a", "eve", CQ), dut("b", "eve", CQ), dut("c", "eve", CQ)];
        let health = health(&[
            ("a", DutHealth::Ready),
            ("b", DutHealth::RepairFailed),
            ("c", DutHealth::Ready),
        ]);
        let changes = resize(&mut duts, &health, &DutSelector::default(), CQ, SUITES, 2).unwrap();
        assert_eq!(
            changes,
            vec![PoolChange {
                dut_id: "b".to_string(),
                old_pool: CQ.to_string(),
                new_pool: SUITES.to_string(),
            }]
        );
        assert_eq!(duts[1].pools, vec![SUITES.to_string()]);

        assert!(resize(&mut duts, &health, &DutSelector::default(), CQ, CQ, 1).is_err());
        assert!(resize(&mut duts, &health, &DutSelector::default(), "", SUITES, 1).is_err());
    }

    #[test]
    fn test_balance_swaps_per_model() {
        let mut duts = vec![
            dut("a", "eve", CQ),
            dut("b", "eve", CQ),
            dut("c", "eve", SUITES),
            dut("d", "nami", CQ),
            dut("e", "nami", SUITES),
            dut("f", "eve", CQ),
        ];
        let health = health(&[
            ("a", DutHealth::NeedsRepair),
            ("b", DutHealth::RepairFailed),
            ("c", DutHealth::Ready),
            ("d", DutHealth::Ready),
            ("e", DutHealth::NeedsRepair),
        ]);

        let results = balance(&mut duts, &health, "", CQ, SUITES).unwrap();
        assert_eq!(results.len(), 2);
        let eve = &results[0];
        assert_eq!(eve.model, "eve");
        assert_eq!(eve.target_pool_unhealthy_before, 2);
        assert_eq!(eve.remaining_unhealthy, 1);
        assert_eq!(eve.changes.len(), 2);
        assert_eq!(eve.changes[0].dut_id, "a");
        assert_eq!(eve.changes[1].dut_id, "c");

        let nami = &results[1];
        assert_eq!(nami.remaining_unhealthy, 0);
        assert!(nami.changes.is_empty());

        assert_eq!(pool_members(&duts, CQ), vec!["b", "c", "d", "f"]);

        let only_nami = balance(&mut duts, &health, "nami", CQ, SUITES).unwrap();
        assert_eq!(only_nami.len(), 1);
    }
}
