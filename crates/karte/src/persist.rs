//! 定期导出已封存的 action
//!
//! 每次导出所有已封存、尚未带导出标记的 action。补录的 action 即使封存时间
//! 早于上次导出，也会在下一轮被导出。

use std::time::Duration as StdDuration;

use chrono::Utc;
use fleet_common::config::KartePersistConfig;
use tokio::sync::broadcast;
use tracing::{debug, error, info};

use crate::service::KarteService;

/// 后台导出循环，收到关闭信号后退出
pub async fn persist_loop(
    service: KarteService,
    config: KartePersistConfig,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(StdDuration::from_secs(config.interval_secs.max(1)));

    info!(
        interval_secs = config.interval_secs,
        output = %config.output_path,
        "karte persist loop started"
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match service.persist_sealed(Utc::now()).await {
                    Ok(records) => debug!(records, "persist tick finished"),
                    // 导出标记未写入，下次重试
                    Err(e) => error!("failed to persist sealed actions: {e}"),
                }
            }
            _ = shutdown_rx.recv() => {
                info!("karte persist loop received shutdown signal");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::Duration;
    use fleet_common::Datastore;
    use fleet_common::config::KarteConfig;
    use fleet_proto::karte::{Action, CreateActionRequest};
    use fleet_proto::time::to_timestamp;

    use crate::sink::{ACTIONS_TABLE, MemorySink};

    async fn wait_for_rows(sink: &MemorySink, expected: usize) -> usize {
        for _ in 0..300 {
            let rows = sink.rows(ACTIONS_TABLE).await.len();
            if rows >= expected {
                return rows;
            }
            tokio::time::sleep(StdDuration::from_millis(10)).await;
        }
        sink.rows(ACTIONS_TABLE).await.len()
    }

    fn sealed_action(seal_time: chrono::DateTime<Utc>) -> CreateActionRequest {
        CreateActionRequest {
            action: Some(Action {
                kind: "audit".to_string(),
                seal_time: Some(to_timestamp(seal_time)),
                ..Default::default()
            }),
        }
    }

    #[tokio::test]
    async fn test_persist_loop_exports_backdated_actions_and_stops() {
        let sink = MemorySink::new();
        let service = KarteService::new(
            Datastore::memory(),
            Arc::new(sink.clone()),
            &KarteConfig::default(),
        );
        service
            .create_action(sealed_action(Utc::now() - Duration::minutes(5)))
            .await
            .unwrap();

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = tokio::spawn(persist_loop(
            service.clone(),
            KartePersistConfig {
                enable: true,
                interval_secs: 1,
                output_path: String::new(),
            },
            shutdown_rx,
        ));

        // interval 的第一次 tick 立即触发
        assert_eq!(wait_for_rows(&sink, 1).await, 1);

        // 封存时间早于上一轮导出的补录 action
        service
            .create_action(sealed_action(Utc::now() - Duration::hours(2)))
            .await
            .unwrap();
        assert_eq!(wait_for_rows(&sink, 2).await, 2);

        shutdown_tx.send(()).unwrap();
        handle.await.unwrap();
        assert_eq!(sink.rows(ACTIONS_TABLE).await.len(), 2);
    }
}
