//! ログ初期化

use anyhow::Context;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::{project_dirs, LogConfig};

/// ログ出力先ディレクトリ
///
/// 設定に指定が無ければXDGのデータディレクトリ配下の `logs` を使う。
pub fn log_directory(config: &LogConfig) -> anyhow::Result<PathBuf> {
    match &config.log_dir {
        Some(dir) => Ok(dir.clone()),
        None => Ok(project_dirs()?.data_local_dir().join("logs")),
    }
}

/// `RUST_LOG` が設定されていればそれを、無ければ設定のログレベルを使うフィルタ
pub fn env_filter(config: &LogConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// ログを初期化する
///
/// 標準エラーへのコンパクト出力に加え、ファイル出力が有効なら日次ローテーションの
/// ファイルにも書き出す。戻り値の [`WorkerGuard`] はプロセス終了まで保持すること。
pub fn init_logging(config: &LogConfig) -> anyhow::Result<Option<WorkerGuard>> {
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact();

    let (file_layer, guard) = if config.enable_file_logging {
        let dir = log_directory(config)?;
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;

        let appender = tracing_appender::rolling::daily(&dir, &config.file_prefix);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_target(true)
            .boxed();
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(env_filter(config))
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .context("Failed to initialize logging")?;

    Ok(guard)
}
