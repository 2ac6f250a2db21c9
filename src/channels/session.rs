use serde::{Deserialize, Serialize};

use super::message_log::MessageLog;

/// メッセージの分類ラベル（大文字小文字を区別しない）
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum MessageTag {
    /// 自分が送信したメッセージ
    SelfMessage,
    System,
    #[default]
    User,
    /// その他のラベル（小文字化して保持）
    Other(String),
}

impl MessageTag {
    /// ラベル文字列から分類を判定
    pub fn from_label(label: &str) -> Self {
        let lower = label.trim().to_lowercase();
        match lower.as_str() {
            "self" => MessageTag::SelfMessage,
            "system" => MessageTag::System,
            "user" => MessageTag::User,
            _ => MessageTag::Other(lower),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            MessageTag::SelfMessage => "self",
            MessageTag::System => "system",
            MessageTag::User => "user",
            MessageTag::Other(label) => label,
        }
    }
}

impl From<String> for MessageTag {
    fn from(label: String) -> Self {
        MessageTag::from_label(&label)
    }
}

impl From<MessageTag> for String {
    fn from(tag: MessageTag) -> Self {
        tag.as_str().to_string()
    }
}

impl std::fmt::Display for MessageTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// チャットメッセージ（不変値）
///
/// `text` はサーバーから届いたままの信頼できない文字列で、解釈しない。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub tag: MessageTag,
    pub text: String,
    /// 表示用タイムスタンプ
    pub timestamp: String,
}

impl ChatMessage {
    pub fn new(tag: MessageTag, text: impl Into<String>, timestamp: impl Into<String>) -> Self {
        Self {
            tag,
            text: text.into(),
            timestamp: timestamp.into(),
        }
    }
}

/// チャンネルのメタデータ
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelMetadata {
    pub game: Option<String>,
    pub viewers: Option<u64>,
    /// サムネイル画像の参照（base64等、中身は解釈しない）
    pub thumbnail: Option<String>,
}

/// メタデータの部分更新
///
/// `None` の項目は既存の値を変更しない。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataUpdate {
    pub game: Option<String>,
    pub viewers: Option<u64>,
    pub thumbnail: Option<String>,
}

impl MetadataUpdate {
    pub fn is_empty(&self) -> bool {
        self.game.is_none() && self.viewers.is_none() && self.thumbnail.is_none()
    }
}

impl ChannelMetadata {
    /// 部分更新をマージする
    pub fn merge(&mut self, update: MetadataUpdate) {
        if let Some(game) = update.game {
            self.game = Some(game);
        }
        if let Some(viewers) = update.viewers {
            self.viewers = Some(viewers);
        }
        if let Some(thumbnail) = update.thumbnail {
            self.thumbnail = Some(thumbnail);
        }
    }
}

/// チャンネルセッションの識別子
///
/// レジストリ内で単調増加に払い出され、再利用されない。描画側はこれを
/// キーにしてパネルを差分更新できる。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub u64);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// 監視中の1チャンネル分の状態
#[derive(Debug, Clone)]
pub struct ChannelSession {
    id: SessionId,
    name: String,
    messages: MessageLog,
    metadata: ChannelMetadata,
    draft_input: String,
}

impl ChannelSession {
    pub(crate) fn new(id: SessionId, name: impl Into<String>, capacity: usize) -> Self {
        Self {
            id,
            name: name.into(),
            messages: MessageLog::new(capacity),
            metadata: ChannelMetadata::default(),
            draft_input: String::new(),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn messages(&self) -> &MessageLog {
        &self.messages
    }

    pub fn metadata(&self) -> &ChannelMetadata {
        &self.metadata
    }

    /// 未送信の入力テキスト
    pub fn draft_input(&self) -> &str {
        &self.draft_input
    }

    pub(crate) fn push_message(&mut self, message: ChatMessage) -> usize {
        self.messages.push(message)
    }

    pub(crate) fn merge_metadata(&mut self, update: MetadataUpdate) {
        self.metadata.merge(update);
    }

    pub(crate) fn set_draft(&mut self, text: String) {
        self.draft_input = text;
    }

    pub(crate) fn take_draft(&mut self) -> String {
        std::mem::take(&mut self.draft_input)
    }
}
