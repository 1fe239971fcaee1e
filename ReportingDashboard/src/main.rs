// ReportingDashboard/src/main.rs

//! `reporting-dashboard-sync`：无界面的同步进程。
//!
//! 为每种实体挂载一个面板缓存并做首次拉取，然后连接后端的 WebSocket 端点，
//! 按推送通知保持缓存新鲜，直到收到 Ctrl-C。

use log::{error, info, LevelFilter};
use reporting_dashboard::api_client::HttpApiClient;
use reporting_dashboard::config::{default_config_path, init_app_config};
use reporting_dashboard::sync::{
    refresh_on_first_connect, MessageDispatcher, PanelCache, ReconciliationPolicy, SubscriberRegistry,
};
use reporting_dashboard::ws_client::{ConnectionManager, ConnectionState, TungsteniteConnector};
use common_models::EntityKind;
use std::str::FromStr;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 先放开全部级别，读取配置后再按 log_level 收紧；设置了 RUST_LOG 时以它为准。
    env_logger::Builder::new()
        .filter_level(LevelFilter::Trace)
        .filter_module("hyper", LevelFilter::Warn)
        .filter_module("reqwest", LevelFilter::Warn)
        .filter_module("tungstenite", LevelFilter::Info)
        .filter_module("tokio_tungstenite", LevelFilter::Info)
        .parse_default_env()
        .try_init()?;

    let config = init_app_config(&default_config_path());
    if std::env::var_os("RUST_LOG").is_none() {
        log::set_max_level(LevelFilter::from_str(&config.log_level).unwrap_or(LevelFilter::Info));
    }
    info!("[同步进程] 正在启动，REST 基础地址: {}", config.api_base_url);

    let ws_url = config.ws_url()?;
    let api = Arc::new(HttpApiClient::new(&config.api_base_url)?);

    let registry = SubscriberRegistry::new();
    let panels: Vec<PanelCache> = EntityKind::ALL
        .into_iter()
        .map(|kind| {
            let panel = PanelCache::new(kind, api.clone());
            panel.attach(&registry);
            panel.request_refresh();
            panel
        })
        .collect();
    info!("[同步进程] 已挂载 {} 个面板。", panels.len());

    let dispatcher = MessageDispatcher::new(registry, ReconciliationPolicy::default());
    let manager = ConnectionManager::new(
        Arc::new(TungsteniteConnector),
        dispatcher,
        config.reconnect.to_policy(),
        config.heartbeat_interval(),
    );
    // 挂载时的拉取早于握手完成，首次连接后再补拉一次。
    tokio::spawn(refresh_on_first_connect(manager.subscribe_state(), panels.clone()));
    manager.connect(&ws_url);

    let mut state_rx = manager.subscribe_state();
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    error!("[同步进程] 监听 Ctrl-C 失败: {}", e);
                }
                break;
            }
            changed = state_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *state_rx.borrow_and_update();
                info!("[同步进程] 连接状态: {:?}", state);
                if state == ConnectionState::Connected {
                    for panel in &panels {
                        let status = panel.status();
                        info!(
                            "[同步进程] 面板 {}: {} 行, 成功 {} 次, 失败 {} 次",
                            panel.kind(),
                            panel.rows().len(),
                            status.completed_refreshes,
                            status.failed_refreshes
                        );
                    }
                }
            }
        }
    }

    info!("[同步进程] 收到退出信号，正在关闭。");
    manager.close();
    for panel in &panels {
        panel.teardown();
    }
    Ok(())
}
