use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::core::ServerError;
use crate::orders::RetryPolicy;
use crate::orders::manager::DEFAULT_EVENT_CHANNEL_CAPACITY;

/// Order store backend selected at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreBackend {
    /// Embedded redb database (`<WORK_DIR>/orders.redb`)
    #[default]
    Redb,
    /// In-memory map with a JSON snapshot (`<WORK_DIR>/orders.json`)
    Local,
}

impl FromStr for StoreBackend {
    type Err = ServerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "redb" => Ok(StoreBackend::Redb),
            "local" => Ok(StoreBackend::Local),
            other => Err(ServerError::Config(format!(
                "ORDER_STORE must be 'redb' or 'local', got '{other}'"
            ))),
        }
    }
}

/// 服务器配置
///
/// # 环境变量
///
/// | 环境变量 | 默认值 | 说明 |
/// |----------|--------|------|
/// | WORK_DIR | ./data | 工作目录 (数据库、快照、日志) |
/// | HTTP_PORT | 3000 | HTTP 服务端口 |
/// | ENVIRONMENT | development | 运行环境 |
/// | ORDER_STORE | redb | 存储后端: redb / local |
/// | LOG_LEVEL | info | 日志级别 |
/// | LOG_JSON | false | JSON 日志 |
/// | LOG_DIR | (未设置) | 按天滚动的日志目录 |
/// | STORE_RETRY_ATTEMPTS | 3 | 瞬时错误重试次数 |
/// | STORE_RETRY_BASE_MS | 50 | 首次退避 (毫秒) |
/// | STORE_RETRY_MAX_MS | 2000 | 退避上限 (毫秒) |
/// | STORE_TIMEOUT_MS | 5000 | 单次存储操作超时 (毫秒) |
/// | EVENT_CHANNEL_CAPACITY | 1024 | 广播通道容量 |
///
/// # 示例
///
/// ```ignore
/// WORK_DIR=/srv/orders HTTP_PORT=8080 ORDER_STORE=local cargo run
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// 工作目录
    pub work_dir: String,
    /// HTTP API 服务端口
    pub http_port: u16,
    /// 运行环境: development | staging | production
    pub environment: String,
    pub store_backend: StoreBackend,
    pub log_level: String,
    pub log_json: bool,
    pub log_dir: Option<String>,
    pub store_retry_attempts: u32,
    pub store_retry_base_ms: u64,
    pub store_retry_max_ms: u64,
    pub store_timeout_ms: u64,
    pub event_channel_capacity: usize,
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// 从环境变量加载配置
    ///
    /// 未设置或无法解析的数值项使用默认值；ORDER_STORE 写错直接报错。
    pub fn from_env() -> Result<Self, ServerError> {
        let store_backend = match std::env::var("ORDER_STORE") {
            Ok(v) => v.parse()?,
            Err(_) => StoreBackend::default(),
        };

        Ok(Self {
            work_dir: std::env::var("WORK_DIR").unwrap_or_else(|_| "./data".into()),
            http_port: env_or("HTTP_PORT", 3000),
            environment: std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into()),
            store_backend,
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
            log_json: env_or("LOG_JSON", false),
            log_dir: std::env::var("LOG_DIR").ok().filter(|d| !d.trim().is_empty()),
            store_retry_attempts: env_or("STORE_RETRY_ATTEMPTS", 3),
            store_retry_base_ms: env_or("STORE_RETRY_BASE_MS", 50),
            store_retry_max_ms: env_or("STORE_RETRY_MAX_MS", 2000),
            store_timeout_ms: env_or("STORE_TIMEOUT_MS", 5000),
            event_channel_capacity: env_or("EVENT_CHANNEL_CAPACITY", DEFAULT_EVENT_CHANNEL_CAPACITY),
        })
    }

    /// Defaults rooted at `work_dir`, ignoring the environment
    ///
    /// 常用于测试场景
    pub fn with_work_dir(work_dir: impl Into<String>, store_backend: StoreBackend) -> Self {
        Self {
            work_dir: work_dir.into(),
            http_port: 0,
            environment: "development".into(),
            store_backend,
            log_level: "info".into(),
            log_json: false,
            log_dir: None,
            store_retry_attempts: 3,
            store_retry_base_ms: 50,
            store_retry_max_ms: 2000,
            store_timeout_ms: 5000,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.store_retry_attempts.max(1),
            base_delay: Duration::from_millis(self.store_retry_base_ms),
            max_delay: Duration::from_millis(self.store_retry_max_ms),
            attempt_timeout: Duration::from_millis(self.store_timeout_ms),
        }
    }

    pub fn redb_path(&self) -> PathBuf {
        PathBuf::from(&self.work_dir).join("orders.redb")
    }

    pub fn snapshot_path(&self) -> PathBuf {
        PathBuf::from(&self.work_dir).join("orders.json")
    }

    /// 是否生产环境
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}
