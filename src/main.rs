//! fleetd 主程序
//!
//! 加载配置、初始化日志与数据存储，按 `enable` 位启动各业务服务

mod cli;
mod error;
mod observability;
mod service;

use clap::Parser;
use fleet_common::error::BaseError;
use fleet_common::{Authorizer, Datastore};
use fleet_common::config::FleetConfig;
use observability::init_observability;
use service::{
    InventoryHttpService, KarteHttpService, ServiceContainer, ServiceManager, UfsHttpService,
    WeetbixHttpService,
};
use std::path::{Path, PathBuf};
use tokio::task::JoinHandle;

use tracing::{error, info, warn};

macro_rules! bootstrap_info {
    ($($arg:tt)*) => {
        println!($($arg)*);
    };
}

macro_rules! bootstrap_error {
    ($($arg:tt)*) => {
        eprintln!($($arg)*);
    };
}

use cli::{Cli, Commands};
use error::{Error, Result};

const SYSTEM_CONFIG_PATH: &str = "/etc/fleetd/config.toml";

/// Application launcher utilities
struct ApplicationLauncher;

fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Some(Commands::Test { config_file }) => {
            let config_path =
                ApplicationLauncher::find_config_file(config_file.as_ref().unwrap_or(&cli.config))?;
            ApplicationLauncher::test_config_file(&config_path)
        }
        None => {
            let config_path = ApplicationLauncher::find_config_file(&cli.config)?;

            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;

            runtime.block_on(ApplicationLauncher::run_application(&config_path))
        }
    }
}

impl ApplicationLauncher {
    /// Find config file with fallback locations
    fn find_config_file(provided_path: &PathBuf) -> Result<PathBuf> {
        // 显式指定的路径必须存在，不再回退
        if provided_path != Path::new("config.toml") {
            if provided_path.exists() {
                bootstrap_info!("Using provided config file: {:?}", provided_path);
                return Ok(provided_path.clone());
            }
            bootstrap_error!("Provided config file not found: {:?}", provided_path);
            return Err(Error::custom(format!(
                "Config file not found: {provided_path:?}"
            )));
        }

        let fallback_paths = [
            PathBuf::from("config.toml"),
            PathBuf::from(SYSTEM_CONFIG_PATH),
        ];

        for path in &fallback_paths {
            if path.exists() {
                bootstrap_info!("Found config file: {:?}", path);
                return Ok(path.clone());
            }
        }

        bootstrap_error!("No configuration file found!");
        bootstrap_error!("Please create a config file in one of these locations:");
        for (i, path) in fallback_paths.iter().enumerate() {
            bootstrap_error!("  {}. {:?}", i + 1, path);
        }
        bootstrap_error!("Or specify a custom path with: fleetd --config <path>");

        Err(Error::custom(
            "No configuration file found. Please create one or specify path with --config",
        ))
    }

    /// 加载并验证配置，打印所有问题；只有警告时仍返回配置
    fn load_config(config_path: &Path) -> Result<FleetConfig> {
        let config = FleetConfig::from_file(config_path).map_err(|e| {
            bootstrap_error!("❌ 配置加载失败: {}", e);
            Error::custom(format!("配置加载失败: {e}"))
        })?;

        if let Err(errors) = config.validate() {
            bootstrap_error!("配置验证发现问题:");
            for (i, err) in errors.iter().enumerate() {
                if err.starts_with("Warning:") {
                    bootstrap_error!("  {}. ⚠️  {}", i + 1, err);
                } else {
                    bootstrap_error!("  {}. ❌ {}", i + 1, err);
                }
            }
            if !FleetConfig::fatal_errors(&errors).is_empty() {
                return Err(Error::service_validation("配置验证失败，请修复上述错误"));
            }
        }

        Ok(config)
    }

    /// 测试配置文件是否有效
    fn test_config_file(config_path: &Path) -> Result<()> {
        Self::load_config(config_path)?;
        bootstrap_info!("✅ 配置验证通过: {:?}", config_path);
        Ok(())
    }

    /// 运行应用程序的主入口
    async fn run_application(config_path: &Path) -> Result<()> {
        bootstrap_info!("📄 加载配置文件: {:?}", config_path);
        let config = Self::load_config(config_path)?;

        let _observability_guard = init_observability(&config)?;

        if let Err(e) = fleet_common::metrics::register_metrics() {
            warn!("Prometheus metrics registration warning: {}", e);
        }

        // 数据存储须在任何服务之前就绪
        let store = Datastore::from_config(&config.datastore).await?;
        info!(backend = store.backend_name(), "✅ 数据存储初始化完成");
        Self::apply_grants(&config, &store).await?;

        Self::run_services(config, store).await
    }

    /// 写入配置中的 realm 授权，重复写入是幂等的
    async fn apply_grants(config: &FleetConfig, store: &Datastore) -> Result<()> {
        if config.grants.is_empty() {
            return Ok(());
        }
        let authorizer = Authorizer::new(store.clone());
        for grant in &config.grants {
            authorizer
                .grant(&grant.realm, &grant.identity, &grant.permission)
                .await
                .map_err(BaseError::from)?;
        }
        info!(count = config.grants.len(), "✅ realm 授权已写入");
        Ok(())
    }

    async fn run_services(config: FleetConfig, store: Datastore) -> Result<()> {
        info!("🚀 启动 fleetd: {} ({})", config.name, config.env);

        let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(10);
        setup_ctrl_c_handler(shutdown_tx.clone()).await;

        let mut service_manager = Self::create_service_manager(&config, store, shutdown_tx.clone());
        let handles: Vec<JoinHandle<()>> = service_manager
            .start_all()
            .await
            .map_err(|e| Error::service_startup(e.to_string()))?;

        Self::display_service_info(&config);

        for handle in handles {
            if let Err(e) = handle.await {
                error!("Service task terminated unexpectedly: {}", e);
                let _ = shutdown_tx.send(());
            }
        }
        service_manager.stop_all().await?;

        info!("🛑 所有服务已安全关闭");
        Ok(())
    }

    fn create_service_manager(
        config: &FleetConfig,
        store: Datastore,
        shutdown_tx: tokio::sync::broadcast::Sender<()>,
    ) -> ServiceManager {
        info!("📊 计划启动的服务:");
        let mut service_manager = ServiceManager::new(config.clone(), shutdown_tx);

        if config.is_karte_enabled() {
            info!("  - Karte");
            service_manager.add_service(ServiceContainer::karte(KarteHttpService::new(
                config.karte_config(),
                store.clone(),
            )));
        }
        if config.is_weetbix_enabled() {
            info!("  - Weetbix");
            service_manager.add_service(ServiceContainer::weetbix(WeetbixHttpService::new(
                config.weetbix_config(),
                store.clone(),
            )));
        }
        if config.is_ufs_enabled() {
            info!("  - UFS");
            service_manager.add_service(ServiceContainer::ufs(UfsHttpService::new(
                config.ufs_config(),
                store.clone(),
            )));
        }
        if config.is_inventory_enabled() {
            info!("  - Inventory");
            service_manager.add_service(ServiceContainer::inventory(InventoryHttpService::new(
                config.inventory_config(),
                store,
            )));
        }

        service_manager
    }

    fn display_service_info(config: &FleetConfig) {
        let base = format!("http://{}", config.http_addr());
        info!("✅ 所有服务已启动，监听在: {}", base);
        info!("🔧 可用的端点:");
        info!("  - {}/health", base);
        info!("  - {}/metrics", base);
        if config.is_karte_enabled() {
            info!("  - {}/prpc/{}/*", base, fleet_proto::karte::SERVICE_NAME);
        }
        if config.is_weetbix_enabled() {
            info!("  - {}/prpc/weetbix.v1.*/*", base);
        }
        if config.is_ufs_enabled() {
            info!("  - {}/prpc/{}/*", base, fleet_proto::ufs::SERVICE_NAME);
        }
        if config.is_inventory_enabled() {
            info!("  - {}/prpc/{}/*", base, fleet_proto::inventory::SERVICE_NAME);
        }
    }
}

/// 设置Ctrl-C信号处理程序
async fn setup_ctrl_c_handler(shutdown_tx: tokio::sync::broadcast::Sender<()>) {
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("无法监听Ctrl-C信号: {}", e);
            return;
        }
        info!("收到Ctrl-C信号，开始优雅关闭...");
        let _ = shutdown_tx.send(());
    });
}
