//! Prometheus 监控指标模块
//!
//! 提供全局指标收集和导出功能

use lazy_static::lazy_static;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry};
use std::sync::Once;
use std::time::Instant;

static METRICS_INIT: Once = Once::new();

lazy_static! {
    /// 全局 Prometheus Registry
    pub static ref REGISTRY: Registry = Registry::new();

    // ========== RPC 指标 ==========

    /// RPC 请求总数（按服务、方法、状态码分组）
    pub static ref RPC_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("rpc_requests_total", "Total number of pRPC requests")
            .namespace("fleet"),
        &["service", "method", "code"]
    ).unwrap();

    /// RPC 请求延迟（秒）
    pub static ref RPC_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new("rpc_duration_seconds", "pRPC request duration in seconds")
            .namespace("fleet")
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
        &["service", "method"]
    ).unwrap();

    // ========== 存储指标 ==========

    /// 数据存储操作次数
    pub static ref DATASTORE_OPERATIONS: IntCounterVec = IntCounterVec::new(
        Opts::new("datastore_operations_total", "Total number of datastore operations")
            .namespace("fleet"),
        &["kind", "op", "result"]
    ).unwrap();

    // ========== 业务指标 ==========

    /// 导出到分析仓库的行数（Karte）
    pub static ref ROWS_EXPORTED: IntCounterVec = IntCounterVec::new(
        Opts::new("rows_exported_total", "Total number of rows exported to the analytics sink")
            .namespace("fleet"),
        &["table"]
    ).unwrap();

    /// DUT 在资源池之间的移动次数（Inventory）
    pub static ref DUT_POOL_MOVES: IntCounterVec = IntCounterVec::new(
        Opts::new("dut_pool_moves_total", "Total number of DUTs moved between pools")
            .namespace("fleet"),
        &["operation"]
    ).unwrap();
}

/// 注册所有指标到全局 Registry
///
/// This function is idempotent - calling it multiple times is safe.
/// Only the first call will actually register the metrics.
pub fn register_metrics() -> Result<(), prometheus::Error> {
    let mut result = Ok(());

    METRICS_INIT.call_once(|| {
        let register_result = (|| {
            REGISTRY.register(Box::new(RPC_REQUESTS_TOTAL.clone()))?;
            REGISTRY.register(Box::new(RPC_DURATION.clone()))?;
            REGISTRY.register(Box::new(DATASTORE_OPERATIONS.clone()))?;
            REGISTRY.register(Box::new(ROWS_EXPORTED.clone()))?;
            REGISTRY.register(Box::new(DUT_POOL_MOVES.clone()))?;
            Ok::<(), prometheus::Error>(())
        })();

        if let Err(e) = register_result {
            result = Err(e);
        }
    });

    result
}

/// RPC 请求计时器
pub struct RpcTimer {
    start: Instant,
    service: &'static str,
    method: &'static str,
}

impl RpcTimer {
    pub fn new(service: &'static str, method: &'static str) -> Self {
        Self {
            start: Instant::now(),
            service,
            method,
        }
    }

    /// 完成计时并记录指标
    pub fn observe(self, code: tonic::Code) {
        let duration = self.start.elapsed().as_secs_f64();
        let code = format!("{code:?}");

        RPC_DURATION
            .with_label_values(&[self.service, self.method])
            .observe(duration);

        RPC_REQUESTS_TOTAL
            .with_label_values(&[self.service, self.method, code.as_str()])
            .inc();
    }
}

/// 导出 Prometheus 格式的指标
pub fn export_metrics() -> Result<String, prometheus::Error> {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;

    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rpc_timer() {
        let _ = register_metrics();

        let before = RPC_REQUESTS_TOTAL
            .with_label_values(&["test.Service", "Get", "Ok"])
            .get();

        RpcTimer::new("test.Service", "Get").observe(tonic::Code::Ok);

        let after = RPC_REQUESTS_TOTAL
            .with_label_values(&["test.Service", "Get", "Ok"])
            .get();

        assert_eq!(after, before + 1);
    }

    #[test]
    fn test_export_metrics() {
        let _ = register_metrics();

        DATASTORE_OPERATIONS
            .with_label_values(&["Export", "get", "ok"])
            .inc();

        let output = export_metrics().unwrap();
        assert!(
            output.contains("fleet_datastore_operations_total"),
            "Output should contain datastore metric. Output: {}",
            output
        );
    }
}
