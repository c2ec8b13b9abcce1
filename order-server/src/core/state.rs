use std::sync::Arc;

use crate::core::{Config, Result, StoreBackend};
use crate::orders::{
    LocalOrderStore, OrderQueryService, OrderStore, OrdersManager, RedbOrderStore,
    RetryingOrderStore,
};

/// 服务器状态 - 持有所有服务的共享引用
///
/// 使用 Arc 实现浅拷贝，clone 成本极低。
///
/// | 字段 | 说明 |
/// |------|------|
/// | config | 配置项 (不可变) |
/// | orders | 状态流转引擎 (唯一写入方) |
/// | queries | 查询与订阅 |
#[derive(Debug, Clone)]
pub struct ServerState {
    pub config: Arc<Config>,
    pub orders: OrdersManager,
    pub queries: OrderQueryService,
}

impl ServerState {
    /// Open the configured store and wire the services
    pub async fn initialize(config: &Config) -> Result<Self> {
        tokio::fs::create_dir_all(&config.work_dir).await?;

        let policy = config.retry_policy();
        let store: Arc<dyn OrderStore> = match config.store_backend {
            StoreBackend::Redb => {
                let path = config.redb_path();
                tracing::info!(path = %path.display(), "Opening redb order store");
                let store = tokio::task::spawn_blocking(move || RedbOrderStore::open(path))
                    .await
                    .map_err(|e| anyhow::anyhow!("store open task failed: {e}"))??;
                Arc::new(RetryingOrderStore::new(store, policy))
            }
            StoreBackend::Local => {
                let path = config.snapshot_path();
                tracing::info!(path = %path.display(), "Opening local order store");
                Arc::new(RetryingOrderStore::new(LocalOrderStore::open(path)?, policy))
            }
        };

        Ok(Self::with_store(config.clone(), store))
    }

    /// Wire services over an existing store (tests)
    pub fn with_store(config: Config, store: Arc<dyn OrderStore>) -> Self {
        let orders = OrdersManager::with_capacity(store, config.event_channel_capacity);
        let queries = OrderQueryService::new(orders.clone());
        Self {
            config: Arc::new(config),
            orders,
            queries,
        }
    }
}
