//! Order Server - 订单生命周期服务
//!
//! # 架构概述
//!
//! - **订单** (`orders`): 存储端口、状态流转引擎、查询与订阅
//! - **HTTP API** (`api`): 下单、状态流转、查询、SSE 推送
//! - **核心** (`core`): 配置、状态、错误
//!
//! # 模块结构
//!
//! ```text
//! order-server/src/
//! ├── core/          # 配置、状态、错误
//! ├── api/           # HTTP 路由和处理器
//! ├── utils/         # 错误响应、日志
//! └── orders/        # 存储、状态机、查询
//! ```

pub mod api;
pub mod core;
pub mod orders;
pub mod utils;

// Re-export 公共类型
pub use core::{Config, Server, ServerError, ServerState, StoreBackend};
pub use orders::{OrderQueryService, OrderStore, OrdersManager};
pub use utils::{AppError, AppResult};

// Re-export logger functions
pub use utils::logger::{init_logger, init_logger_with_file};

/// Load `.env` and build the configuration, then initialize logging
pub fn setup_environment() -> Result<Config, ServerError> {
    // .env is optional
    if let Err(e) = dotenv::dotenv()
        && !e.not_found()
    {
        eprintln!("Failed to load .env: {e}");
    }

    let config = Config::from_env()?;
    init_logger_with_file(
        Some(&config.log_level),
        config.log_json,
        config.log_dir.as_deref(),
    )
    .map_err(|e| ServerError::Internal(e.into()))?;

    Ok(config)
}
