// ReportingDashboard/src/config.rs

//! 同步层的应用配置管理模块。
//!
//! 配置保存在工作目录下的 `dashboard_settings.json` 中。文件不存在时用默认值创建；
//! 文件损坏时记录错误并退回默认配置，保证仪表盘总能启动。
//! 两个环境变量可以覆盖文件中的地址，便于在不同环境部署同一份配置：
//! `DASHBOARD_API_BASE_URL` 与 `DASHBOARD_WS_URL`。

use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};
use url::Url;

use crate::error::AppError;
use crate::ws_client::reconnect::ReconnectPolicy;

/// 配置文件名。
pub const CONFIG_FILE_NAME: &str = "dashboard_settings.json";
/// 覆盖 REST 基础地址的环境变量。
pub const API_BASE_URL_ENV: &str = "DASHBOARD_API_BASE_URL";
/// 覆盖 WebSocket 地址的环境变量。
pub const WS_URL_ENV: &str = "DASHBOARD_WS_URL";

/// 重连退避参数，对应 `ReconnectPolicy`。
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ReconnectConfig {
    /// 第一次重连前的等待时间 (秒)。
    pub base_delay_seconds: u64,
    /// 退避上限 (秒)。
    pub max_delay_seconds: u64,
    /// 每次连续失败后延迟乘以的因子；`1.0` 即固定间隔重连。
    pub backoff_factor: f64,
    /// 随机抖动比例 (0.0-1.0)。
    pub jitter_factor: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay_seconds: 5,
            max_delay_seconds: 60,
            backoff_factor: 2.0,
            jitter_factor: 0.1,
        }
    }
}

impl ReconnectConfig {
    pub fn to_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy::new(
            Duration::from_secs(self.base_delay_seconds),
            Duration::from_secs(self.max_delay_seconds),
            self.backoff_factor,
            self.jitter_factor,
        )
    }
}

/// 应用配置结构体，对应 `dashboard_settings.json` 的内容。
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// REST 后端的基础地址，例如 `"http://localhost:8000"`。
    pub api_base_url: String,
    /// WebSocket 端点在后端上的路径。
    pub ws_path: String,
    /// 显式指定的 WebSocket 地址；为 `None` 时由 `api_base_url` 与 `ws_path` 推导。
    pub ws_url: Option<String>,
    /// 日志级别: `"trace"`, `"debug"`, `"info"`, `"warn"`, `"error"`。
    pub log_level: String,
    /// 周期性心跳间隔 (秒)。`None` 表示只在连接建立时发送一次 ping。
    pub heartbeat_interval_seconds: Option<u64>,
    pub reconnect: ReconnectConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8000".to_string(),
            ws_path: "/api/v1/ws/studies".to_string(),
            ws_url: None,
            log_level: "info".to_string(),
            heartbeat_interval_seconds: Some(30),
            reconnect: ReconnectConfig::default(),
        }
    }
}

impl AppConfig {
    /// 用环境变量覆盖地址字段。
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(env::var(API_BASE_URL_ENV).ok(), env::var(WS_URL_ENV).ok());
    }

    fn apply_overrides(&mut self, api_base_url: Option<String>, ws_url: Option<String>) {
        if let Some(base) = api_base_url.filter(|v| !v.trim().is_empty()) {
            info!("[配置模块] 使用环境变量 {} 覆盖 REST 基础地址: {}", API_BASE_URL_ENV, base);
            self.api_base_url = base;
        }
        if let Some(ws) = ws_url.filter(|v| !v.trim().is_empty()) {
            info!("[配置模块] 使用环境变量 {} 覆盖 WebSocket 地址: {}", WS_URL_ENV, ws);
            self.ws_url = Some(ws);
        }
    }

    /// 计算实际连接的 WebSocket 地址。
    ///
    /// `http` 映射为 `ws`，`https` 映射为 `wss`，路径取 `ws_path`。
    pub fn ws_url(&self) -> Result<String, AppError> {
        if let Some(explicit) = &self.ws_url {
            return Ok(explicit.clone());
        }
        let mut url = Url::parse(&self.api_base_url)
            .map_err(|e| AppError::Config(format!("无效的 REST 基础地址 '{}': {}", self.api_base_url, e)))?;
        let scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => {
                return Err(AppError::Config(format!(
                    "REST 基础地址的协议 '{}' 无法映射为 WebSocket 协议",
                    other
                )))
            }
        };
        url.set_scheme(scheme)
            .map_err(|_| AppError::Config(format!("无法将 '{}' 的协议改为 {}", self.api_base_url, scheme)))?;
        url.set_path(&self.ws_path);
        Ok(url.to_string())
    }

    pub fn heartbeat_interval(&self) -> Option<Duration> {
        self.heartbeat_interval_seconds
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

/// 从指定路径加载配置；文件不存在时写入并返回默认配置。
pub fn load_app_config(config_file_path: &Path) -> Result<AppConfig, AppError> {
    if config_file_path.exists() {
        let content = fs::read_to_string(config_file_path).map_err(|e| {
            AppError::Config(format!("读取配置文件 '{}' 失败: {}", config_file_path.display(), e))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            AppError::Config(format!("解析配置文件 '{}' 的内容失败: {}", config_file_path.display(), e))
        })
    } else {
        info!(
            "[配置模块] 配置文件 '{}' 未找到，将使用默认配置参数创建新文件。",
            config_file_path.display()
        );
        let default_config = AppConfig::default();
        save_app_config(config_file_path, &default_config)?;
        Ok(default_config)
    }
}

/// 将配置以格式化 JSON 写入指定路径，必要时创建父目录。
pub fn save_app_config(config_file_path: &Path, app_config: &AppConfig) -> Result<(), AppError> {
    if let Some(parent_dir) = config_file_path.parent() {
        if !parent_dir.as_os_str().is_empty() && !parent_dir.exists() {
            fs::create_dir_all(parent_dir).map_err(|e| {
                AppError::Config(format!("创建配置目录 '{}' 失败: {}", parent_dir.display(), e))
            })?;
        }
    }
    let content = serde_json::to_string_pretty(app_config)
        .map_err(|e| AppError::Config(format!("序列化应用配置到 JSON 字符串失败: {}", e)))?;
    fs::write(config_file_path, content).map_err(|e| {
        AppError::Config(format!("写入配置文件 '{}' 失败: {}", config_file_path.display(), e))
    })?;
    info!("[配置模块] 应用配置已保存至: '{}'", config_file_path.display());
    Ok(())
}

/// 默认配置文件路径：当前工作目录下的 `dashboard_settings.json`。
pub fn default_config_path() -> PathBuf {
    env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(CONFIG_FILE_NAME)
}

/// 初始化应用配置：加载文件 (失败则用默认值)，再应用环境变量覆盖。
pub fn init_app_config(config_file_path: &Path) -> AppConfig {
    let mut config = match load_app_config(config_file_path) {
        Ok(config) => {
            info!("[配置模块] 应用配置已从 {} 加载。", config_file_path.display());
            config
        }
        Err(e) => {
            error!("[配置模块] {}。将使用默认配置。", e);
            AppConfig::default()
        }
    };
    config.apply_env_overrides();
    if config.reconnect.base_delay_seconds == 0 {
        let fallback = ReconnectConfig::default().base_delay_seconds;
        warn!(
            "[配置模块] base_delay_seconds=0 会让重连毫无间隔地反复尝试；已改为 {} 秒。",
            fallback
        );
        config.reconnect.base_delay_seconds = fallback;
    }
    if config.reconnect.backoff_factor < 1.0 {
        warn!(
            "[配置模块] backoff_factor={} 小于 1.0，重连间隔会越来越短；已改为 1.0。",
            config.reconnect.backoff_factor
        );
        config.reconnect.backoff_factor = 1.0;
    }
    config
}
