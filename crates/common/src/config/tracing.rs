//! OpenTelemetry 分布式追踪配置
//!
//! 通过 OTLP gRPC 把 span 导出到 Jaeger、Tempo 或任意 OpenTelemetry Collector。
//! 需要编译时启用 `opentelemetry` feature。

use serde::{Deserialize, Serialize};

fn default_service_name() -> String {
    "fleetd".to_string()
}

fn default_endpoint() -> String {
    "http://127.0.0.1:4317".to_string()
}

fn default_sample_ratio() -> f64 {
    1.0
}

/// 追踪配置，对应 `[observability.tracing]`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TracingConfig {
    /// 是否导出追踪数据，默认关闭
    #[serde(default)]
    pub enable: bool,

    /// 追踪后端中显示的服务名
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// OTLP gRPC 端点，例如 `http://otel-collector:4317`
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// 采样比例，取值 0.0 ~ 1.0
    #[serde(default = "default_sample_ratio")]
    pub sample_ratio: f64,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            enable: false,
            service_name: default_service_name(),
            endpoint: default_endpoint(),
            sample_ratio: default_sample_ratio(),
        }
    }
}

impl TracingConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.sample_ratio) {
            return Err(format!(
                "sample_ratio must be within [0.0, 1.0], got {}",
                self.sample_ratio
            ));
        }
        if !self.enable {
            return Ok(());
        }
        let endpoint = self.endpoint.trim();
        if endpoint.is_empty() {
            return Err("endpoint cannot be empty when tracing is enabled".to_string());
        }
        if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
            return Err(format!("endpoint {endpoint:?} must be an http(s) URL"));
        }
        Ok(())
    }

    pub fn is_enabled(&self) -> bool {
        self.enable
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }
}
