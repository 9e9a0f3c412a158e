//! 日志与分布式追踪初始化
//!
//! 日志输出到控制台或文件（可按天轮转），过滤级别由 `RUST_LOG` 或配置决定；
//! 启用 `opentelemetry` feature 且配置打开时，span 通过 OTLP 导出。

use fleet_common::config::{FleetConfig, LogConfig, ObservabilityConfig};
use std::fs;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

#[cfg(feature = "opentelemetry")]
use crate::error::Error;
use crate::error::Result;
#[cfg(feature = "opentelemetry")]
use opentelemetry::KeyValue;
#[cfg(feature = "opentelemetry")]
use opentelemetry_otlp::WithExportConfig;
#[cfg(feature = "opentelemetry")]
use opentelemetry_sdk::propagation::TraceContextPropagator;
#[cfg(feature = "opentelemetry")]
use opentelemetry_sdk::{
    Resource,
    trace::{Sampler, SdkTracerProvider},
};

const LOG_FILE_NAME: &str = "fleetd.log";

/// 持有日志写入线程和 tracer provider，drop 时刷新
#[derive(Default)]
pub struct ObservabilityGuard {
    #[cfg(feature = "opentelemetry")]
    tracer_provider: Option<SdkTracerProvider>,
    log_guard: Option<WorkerGuard>,
}

impl Drop for ObservabilityGuard {
    fn drop(&mut self) {
        #[cfg(feature = "opentelemetry")]
        if let Some(provider) = self.tracer_provider.take()
            && let Err(e) = provider.shutdown()
        {
            eprintln!("Failed to shutdown tracer provider: {e:?}");
        }
        // WorkerGuard drop 时刷新剩余日志
        self.log_guard.take();
    }
}

/// 按配置初始化日志与追踪
pub fn init_observability(config: &FleetConfig) -> Result<ObservabilityGuard> {
    let mut guard = ObservabilityGuard::default();
    let observability_config = config.observability_config();

    match observability_config.log.output.as_str() {
        "file" => {
            fs::create_dir_all(&observability_config.log.path)?;
            let (non_blocking, worker_guard) = build_file_writer(&observability_config.log)?;
            guard.log_guard = Some(worker_guard);

            init_subscriber_with_writer(non_blocking, false, &mut guard, config)?;
        }
        _ => {
            init_subscriber_with_writer(std::io::stdout, true, &mut guard, config)?;
        }
    }

    Ok(guard)
}

/// 优先使用 `RUST_LOG`，否则使用配置中的过滤级别
fn create_env_filter(config: &ObservabilityConfig) -> EnvFilter {
    let directive = std::env::var("RUST_LOG")
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| config.filter_level.clone());

    EnvFilter::try_new(&directive).unwrap_or_else(|_| {
        println!("Failed to parse filter directive: {directive}. Falling back to default: info");
        EnvFilter::new("info")
    })
}

fn init_subscriber_with_writer<W>(
    writer: W,
    use_ansi: bool,
    #[cfg_attr(not(feature = "opentelemetry"), allow(unused_variables))]
    guard: &mut ObservabilityGuard,
    config: &FleetConfig,
) -> Result<()>
where
    W: for<'a> fmt::MakeWriter<'a> + Send + Sync + 'static,
{
    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_level(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(use_ansi)
        .with_writer(writer);

    let observability_config = config.observability_config();

    #[cfg(feature = "opentelemetry")]
    {
        if let Some(provider) = build_tracing_provider(config)? {
            use opentelemetry::trace::TracerProvider as _;
            let tracer = provider.tracer(observability_config.tracing.service_name.clone());
            guard.tracer_provider = Some(provider);

            tracing_subscriber::registry()
                .with(create_env_filter(observability_config))
                .with(fmt_layer)
                .with(tracing_opentelemetry::layer().with_tracer(tracer))
                .try_init()
                .ok();
            return Ok(());
        }
    }

    // 重复初始化（例如测试中）时忽略错误
    tracing_subscriber::registry()
        .with(create_env_filter(observability_config))
        .with(fmt_layer)
        .try_init()
        .ok();

    Ok(())
}

fn build_file_writer(log_config: &LogConfig) -> Result<(NonBlocking, WorkerGuard)> {
    println!(
        "日志写入文件: {}/{LOG_FILE_NAME}（轮转: {}）",
        log_config.path,
        if log_config.rotate { "按天" } else { "关闭" }
    );
    if log_config.rotate {
        let file_appender = tracing_appender::rolling::daily(&log_config.path, LOG_FILE_NAME);
        Ok(tracing_appender::non_blocking(file_appender))
    } else {
        let log_file_path = std::path::Path::new(&log_config.path).join(LOG_FILE_NAME);
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_file_path)?;
        Ok(tracing_appender::non_blocking(file))
    }
}

#[cfg(feature = "opentelemetry")]
fn build_tracing_provider(config: &FleetConfig) -> Result<Option<SdkTracerProvider>> {
    let tracing_cfg = config.tracing_config();

    if !tracing_cfg.enable {
        return Ok(None);
    }
    tracing_cfg.validate().map_err(Error::custom)?;

    println!(
        "Initializing OpenTelemetry tracing: service_name={}, endpoint={}",
        tracing_cfg.service_name, tracing_cfg.endpoint
    );

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(tracing_cfg.endpoint.clone())
        .build()
        .map_err(|e| Error::custom(format!("Failed to build OTLP exporter: {e}")))?;

    let resource = Resource::builder()
        .with_service_name(tracing_cfg.service_name.clone())
        .with_attributes([
            KeyValue::new("service.instance.id", config.name.clone()),
            KeyValue::new("service.environment", config.env.clone()),
        ])
        .build();

    let tracer_provider = SdkTracerProvider::builder()
        .with_resource(resource)
        .with_sampler(Sampler::TraceIdRatioBased(tracing_cfg.sample_ratio))
        .with_batch_exporter(exporter)
        .build();

    opentelemetry::global::set_tracer_provider(tracer_provider.clone());
    opentelemetry::global::set_text_map_propagator(TraceContextPropagator::new());

    Ok(Some(tracer_provider))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_env_filter_prefers_rust_log() {
        let config = ObservabilityConfig {
            filter_level: "warn".to_string(),
            ..Default::default()
        };
        // SAFETY: serial 测试，没有其他线程读写环境变量
        unsafe { std::env::set_var("RUST_LOG", "debug") };
        assert_eq!(create_env_filter(&config).to_string(), "debug");
        unsafe { std::env::remove_var("RUST_LOG") };
        assert_eq!(create_env_filter(&config).to_string(), "warn");
    }

    #[test]
    #[serial]
    fn test_file_output_creates_log_dir() {
        let dir = tempfile::tempdir().unwrap();
        let log_dir = dir.path().join("logs");
        let mut config = FleetConfig::default();
        config.observability.log.output = "file".to_string();
        config.observability.log.path = log_dir.display().to_string();

        let guard = init_observability(&config).unwrap();
        assert!(log_dir.join(LOG_FILE_NAME).exists());
        drop(guard);
    }
}
