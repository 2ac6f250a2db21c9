use chanview::{
    channels::ChannelChange,
    config::{AppConfig, ConfigManager},
    logging, ConnectionStatus, Decision, EventSurface, SessionController, SessionHandle,
    SurfaceEvent, TransportHandle, UserIntent, WebSocketTransport,
};
use clap::Parser;
use parking_lot::RwLock;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

/// マルチチャンネル・チャットビューア（端末版）
#[derive(Parser, Debug)]
#[command(name = "chanview", version)]
struct Args {
    /// 接続先サーバーのURL（設定ファイルより優先）
    #[arg(long)]
    url: Option<String>,

    /// ログレベル (trace/debug/info/warn/error)
    #[arg(long)]
    log_level: Option<String>,

    /// 設定ファイルのパス（省略時はXDG設定ディレクトリ）
    #[arg(long)]
    config: Option<PathBuf>,

    /// ログをファイルにも出力
    #[arg(long)]
    log_file: bool,

    /// 上書き後の設定を保存して終了
    #[arg(long)]
    save_config: bool,
}

/// 端末から入力されたコマンド
#[derive(Debug, Clone, PartialEq)]
enum Command {
    Intent(UserIntent),
    /// 提示中のプロンプトへの応答
    Answer(Decision),
    /// フォーカス中のチャンネルへ送信
    Say(String),
    Channels,
    Help,
    Quit,
    Unknown(String),
}

fn parse_command(line: &str) -> Option<Command> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return None;
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Some(Command::Say(line.to_string()));
    };

    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest, ""),
    };
    let channel = || arg.to_string();

    let command = match (name, arg.is_empty()) {
        ("join", false) => Command::Intent(UserIntent::JoinChannel { channel: channel() }),
        ("skip", false) => Command::Intent(UserIntent::SkipChannel { channel: channel() }),
        ("focus", false) => Command::Intent(UserIntent::Select(channel())),
        ("remove", false) => Command::Intent(UserIntent::Remove(channel())),
        ("y", _) => Command::Answer(Decision::Join),
        ("n", _) => Command::Answer(Decision::Skip),
        ("ping", _) => Command::Intent(UserIntent::Ping),
        ("channels", _) => Command::Channels,
        ("help", _) => Command::Help,
        ("quit", _) | ("exit", _) => Command::Quit,
        _ => Command::Unknown(line.to_string()),
    };
    Some(command)
}

const HELP: &str = "\
commands:
  <text>            send to the focused channel
  /join <channel>   join a channel
  /skip <channel>   skip a channel
  /focus <channel>  focus a channel
  /remove <channel> close a channel
  /y  /n            answer the current prompt
  /channels         list channels
  /ping             ping the server
  /quit             exit";

/// 画面側で把握しているチャンネル一覧とフォーカス
#[derive(Debug, Default)]
struct ViewState {
    channels: Vec<String>,
    focused: Option<String>,
}

/// 描画イベントを端末に出力する
async fn render(
    mut events: mpsc::UnboundedReceiver<SurfaceEvent>,
    view: Arc<RwLock<ViewState>>,
    session: SessionHandle,
) {
    while let Some(event) = events.recv().await {
        match event {
            SurfaceEvent::Channel(change) => render_channel(change, &view, &session),
            SurfaceEvent::Connection(status) => match status {
                ConnectionStatus::Connected => println!("* connected"),
                ConnectionStatus::Disconnected { reason } => {
                    println!("* disconnected ({})", reason)
                }
                ConnectionStatus::Error { error } => println!("* connection error: {}", error),
                ConnectionStatus::Reconnecting { attempt } => {
                    println!("* reconnecting (attempt {})...", attempt)
                }
                ConnectionStatus::Reconnected => println!("* reconnected"),
                ConnectionStatus::Failed => println!("* could not reconnect, giving up"),
            },
            SurfaceEvent::Prompt(prompt) => {
                let title = prompt
                    .info
                    .get("title")
                    .and_then(|t| t.as_str())
                    .unwrap_or("");
                println!(
                    "? {} is live {} - join? [/y /n] ({} waiting)",
                    prompt.channel, title, prompt.waiting
                );
            }
        }
    }
}

fn render_channel(change: ChannelChange, view: &RwLock<ViewState>, session: &SessionHandle) {
    match change {
        ChannelChange::Created { name, .. } => {
            // 同じステップで複数作成されても最初のチャンネルだけを選ぶ
            let first = {
                let mut view = view.write();
                view.channels.push(name.clone());
                let first = view.focused.is_none();
                if first {
                    view.focused = Some(name.clone());
                }
                first
            };
            println!("+ #{}", name);
            if first {
                let _ = session.send(UserIntent::Select(name));
            }
        }
        ChannelChange::MessageAppended { name, message, .. } => {
            println!("[{}] #{} <{}> {}", message.timestamp, name, message.tag, message.text);
        }
        ChannelChange::MetadataUpdated { name, metadata, .. } => {
            let game = metadata.game.as_deref().unwrap_or("-");
            let viewers = metadata
                .viewers
                .map(|v| v.to_string())
                .unwrap_or_else(|| "-".to_string());
            println!("~ #{} game: {} viewers: {}", name, game, viewers);
        }
        ChannelChange::Removed { name, .. } => {
            view.write().channels.retain(|c| c != &name);
            println!("- #{}", name);
        }
        ChannelChange::SelectionChanged { name, .. } => {
            match &name {
                Some(name) => println!("> focused #{}", name),
                None => println!("> no channel focused"),
            }
            view.write().focused = name;
        }
    }
}

fn load_config(args: &Args) -> anyhow::Result<(ConfigManager, AppConfig, Option<anyhow::Error>)> {
    let manager = match &args.config {
        Some(path) => ConfigManager::with_path(path),
        None => ConfigManager::new()?,
    };
    let (mut config, load_error) = match manager.load_config() {
        Ok(config) => (config, None),
        Err(e) => (AppConfig::default(), Some(e)),
    };

    if let Some(url) = &args.url {
        config.server_url = url.clone();
    }
    if let Some(level) = &args.log_level {
        config.log.log_level = level.clone();
    }
    if args.log_file {
        config.log.enable_file_logging = true;
    }
    Ok((manager, config, load_error))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let (manager, config, load_error) = load_config(&args)?;

    let _log_guard = logging::init_logging(&config.log)?;
    if let Some(e) = load_error {
        tracing::warn!("設定読み込みエラー、デフォルト設定を使用: {:#}", e);
    }

    config.validate()?;

    if args.save_config {
        manager.save_config(&config)?;
        println!("saved {}", manager.config_path().display());
        return Ok(());
    }

    tracing::info!("🎬 Starting chanview");

    let (surface, surface_rx) = EventSurface::new();
    let (transport_handle, outbound_rx) = TransportHandle::channel();
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (session, intents_rx) = SessionHandle::channel();

    let mut controller = SessionController::new(transport_handle, Arc::new(surface), &config);
    controller.begin_connect();

    let transport = WebSocketTransport::new(config.server_url.clone(), config.retry.clone());
    tracing::info!(url = transport.url(), "🔌 Connecting");
    let driver = transport.spawn(outbound_rx, events_tx);
    let controller_task = tokio::spawn(controller.run(events_rx, intents_rx));

    let view = Arc::new(RwLock::new(ViewState::default()));
    let render_task = tokio::spawn(render(surface_rx, Arc::clone(&view), session.clone()));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("🛑 終了シグナルを受信しました");
                break;
            }
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            break;
        };

        match parse_command(&line) {
            None => {}
            Some(Command::Quit) => break,
            Some(Command::Help) => println!("{}", HELP),
            Some(Command::Channels) => {
                let view = view.read();
                for name in &view.channels {
                    let marker = if view.focused.as_deref() == Some(name) { ">" } else { " " };
                    println!("{} #{}", marker, name);
                }
            }
            Some(Command::Say(text)) => {
                let focused = view.read().focused.clone();
                match focused {
                    Some(channel) => session.send_chat(channel, text)?,
                    None => println!("no channel focused, use /focus <channel>"),
                }
            }
            Some(Command::Intent(intent)) => session.send(intent)?,
            Some(Command::Answer(decision)) => session.resolve_prompt(decision)?,
            Some(Command::Unknown(line)) => println!("unknown command: {} (try /help)", line),
        }
    }

    session.shutdown()?;
    let controller = controller_task.await?;
    driver.abort();
    render_task.abort();

    tracing::info!(
        channels = controller.registry().len(),
        "👋 chanview shutting down"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chanview::SessionId;

    #[test]
    fn test_parse_plain_text() {
        assert_eq!(
            parse_command("hello there"),
            Some(Command::Say("hello there".to_string()))
        );
        assert_eq!(parse_command("   "), None);
    }

    #[test]
    fn test_parse_channel_commands() {
        assert_eq!(
            parse_command("/join alpha"),
            Some(Command::Intent(UserIntent::JoinChannel {
                channel: "alpha".to_string()
            }))
        );
        assert_eq!(
            parse_command("/focus beta\r\n"),
            Some(Command::Intent(UserIntent::Select("beta".to_string())))
        );
        assert!(matches!(parse_command("/join"), Some(Command::Unknown(_))));
    }

    #[test]
    fn test_parse_prompt_answers() {
        assert_eq!(parse_command("/y"), Some(Command::Answer(Decision::Join)));
        assert_eq!(parse_command("/n"), Some(Command::Answer(Decision::Skip)));
        assert_eq!(parse_command("/quit"), Some(Command::Quit));
    }

    #[test]
    fn test_first_created_channel_gets_focus() {
        let (session, mut intents) = SessionHandle::channel();
        let view = RwLock::new(ViewState::default());

        for (id, name) in [(1, "alpha"), (2, "beta")] {
            render_channel(
                ChannelChange::Created {
                    id: SessionId(id),
                    name: name.to_string(),
                },
                &view,
                &session,
            );
        }

        let mut sent = Vec::new();
        while let Ok(intent) = intents.try_recv() {
            sent.push(intent);
        }
        assert_eq!(sent, vec![UserIntent::Select("alpha".to_string())]);

        let view = view.read();
        assert_eq!(view.channels, vec!["alpha", "beta"]);
        assert_eq!(view.focused.as_deref(), Some("alpha"));
    }
}
