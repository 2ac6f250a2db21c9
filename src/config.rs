//! アプリケーション設定管理モジュール
//!
//! XDGディレクトリ上の `config.toml` を読み書きする。ファイルが無ければ
//! デフォルト値を使う。

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::channels::DEFAULT_LOG_CAPACITY;
use crate::error::{ChanviewError, ChanviewResult};
use crate::transport::RetryConfig;

/// デフォルトの接続先
pub const DEFAULT_SERVER_URL: &str = "ws://127.0.0.1:5000/ws";

/// ログ設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// ログレベル (trace/debug/info/warn/error)。`RUST_LOG` が優先される
    pub log_level: String,
    /// ファイル出力有効化
    pub enable_file_logging: bool,
    /// カスタムログディレクトリ（Noneの場合はXDGデフォルト使用）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,
    /// ログファイル名の接頭辞
    pub file_prefix: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            enable_file_logging: false,
            log_dir: None,
            file_prefix: "chanview.log".to_string(),
        }
    }
}

/// アプリケーション設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// 接続先サーバーのURL
    pub server_url: String,

    /// チャンネルあたりのメッセージ保持件数
    pub history_capacity: usize,

    /// 再接続設定
    pub retry: RetryConfig,

    /// ログ設定
    pub log: LogConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            history_capacity: DEFAULT_LOG_CAPACITY,
            retry: RetryConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl AppConfig {
    /// 設定値の妥当性を確認する
    pub fn validate(&self) -> ChanviewResult<()> {
        if !(self.server_url.starts_with("ws://") || self.server_url.starts_with("wss://")) {
            return Err(ChanviewError::Configuration(format!(
                "server_url must be a ws:// or wss:// URL: {}",
                self.server_url
            )));
        }
        if self.history_capacity == 0 {
            return Err(ChanviewError::Configuration(
                "history_capacity must be at least 1".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(ChanviewError::Configuration(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// XDGのプロジェクトディレクトリ
pub fn project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("dev", "chanview", "chanview").context("Failed to get project directories")
}

/// 設定管理マネージャー
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// XDGディレクトリの設定ファイルを使うマネージャーを作成
    pub fn new() -> Result<Self> {
        let config_file = project_dirs()?.config_dir().join("config.toml");
        debug!("Config file path: {}", config_file.display());
        Ok(Self::with_path(config_file))
    }

    /// 任意のパスの設定ファイルを使うマネージャーを作成
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: path.into(),
        }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn config_exists(&self) -> bool {
        self.config_path.exists()
    }

    /// 設定を読み込み
    pub fn load_config(&self) -> Result<AppConfig> {
        if !self.config_path.exists() {
            info!(
                "Config file not found, using default settings: {}",
                self.config_path.display()
            );
            return Ok(AppConfig::default());
        }

        let config_content = fs::read_to_string(&self.config_path).with_context(|| {
            format!("Failed to read config file: {}", self.config_path.display())
        })?;

        let config: AppConfig = toml::from_str(&config_content).with_context(|| {
            format!(
                "Failed to parse config file: {}",
                self.config_path.display()
            )
        })?;

        info!(
            "✅ Configuration loaded from: {}",
            self.config_path.display()
        );

        Ok(config)
    }

    /// 設定を保存（ディレクトリが無ければ作成）
    pub fn save_config(&self, config: &AppConfig) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let config_content =
            toml::to_string_pretty(config).context("Failed to serialize config")?;

        fs::write(&self.config_path, config_content).with_context(|| {
            format!(
                "Failed to write config file: {}",
                self.config_path.display()
            )
        })?;

        info!("💾 Configuration saved to: {}", self.config_path.display());

        Ok(())
    }
}
