//! チャンネルレジストリ
//!
//! チャンネル名をキーに [`ChannelSession`] を1つずつ保持する。セッションは
//! 最初に参照されたときに作られ、明示的な `remove` でのみ消える。
//! どのチャンネルにフォーカスしているか（選択状態）もここで管理する。

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use super::message_log::DEFAULT_LOG_CAPACITY;
use super::session::{ChannelSession, ChatMessage, MessageTag, MetadataUpdate, SessionId};
use crate::surface::{ChannelChange, NullSurface, RenderSurface};

/// チャンネルレジストリ
pub struct ChannelRegistry {
    sessions: HashMap<String, ChannelSession>,
    /// 作成順のチャンネル名
    order: Vec<String>,
    selected: Option<String>,
    next_id: u64,
    capacity: usize,
    surface: Arc<dyn RenderSurface>,
}

impl std::fmt::Debug for ChannelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelRegistry")
            .field("channels", &self.order)
            .field("selected", &self.selected)
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self::new(Arc::new(NullSurface))
    }
}

impl ChannelRegistry {
    pub fn new(surface: Arc<dyn RenderSurface>) -> Self {
        Self::with_capacity(surface, DEFAULT_LOG_CAPACITY)
    }

    /// チャンネルあたりの保持件数を指定して作成
    pub fn with_capacity(surface: Arc<dyn RenderSurface>, capacity: usize) -> Self {
        Self {
            sessions: HashMap::new(),
            order: Vec::new(),
            selected: None,
            next_id: 1,
            capacity,
            surface,
        }
    }

    /// セッションを取得、無ければ作成する
    ///
    /// 既存の名前で呼んだ場合は何も変更しない。
    pub fn ensure(&mut self, name: &str) -> &ChannelSession {
        self.ensure_mut(name)
    }

    fn ensure_mut(&mut self, name: &str) -> &mut ChannelSession {
        match self.sessions.entry(name.to_string()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let id = SessionId(self.next_id);
                self.next_id += 1;

                tracing::info!(channel = name, id = %id, "📺 Channel session created");
                self.order.push(name.to_string());
                self.surface.channel_changed(&ChannelChange::Created {
                    id,
                    name: name.to_string(),
                });
                entry.insert(ChannelSession::new(id, name, self.capacity))
            }
        }
    }

    /// メッセージを追加する（セッションが無ければ作成）
    pub fn append(
        &mut self,
        name: &str,
        tag: MessageTag,
        text: impl Into<String>,
        timestamp: impl Into<String>,
    ) -> SessionId {
        let message = ChatMessage::new(tag, text, timestamp);
        let session = self.ensure_mut(name);
        let id = session.id();
        let evicted = session.push_message(message.clone());

        if evicted > 0 {
            tracing::trace!(channel = name, evicted = evicted, "🧹 Evicted old messages");
        }

        self.surface.channel_changed(&ChannelChange::MessageAppended {
            id,
            name: name.to_string(),
            message,
            evicted,
        });
        id
    }

    /// メタデータを部分更新する
    ///
    /// 未知のチャンネルに対しては何もせず `None` を返す。
    pub fn update_metadata(&mut self, name: &str, update: MetadataUpdate) -> Option<SessionId> {
        let Some(session) = self.sessions.get_mut(name) else {
            tracing::debug!(channel = name, "Metadata for unknown channel ignored");
            return None;
        };

        session.merge_metadata(update);
        let id = session.id();
        let metadata = session.metadata().clone();
        self.surface.channel_changed(&ChannelChange::MetadataUpdated {
            id,
            name: name.to_string(),
            metadata,
        });
        Some(id)
    }

    /// セッションを削除する
    ///
    /// 選択中のセッションを削除した場合、残りの先頭（作成順）に選択を移す。
    /// 残りが無ければ未選択になる。
    pub fn remove(&mut self, name: &str) -> Option<ChannelSession> {
        let session = self.sessions.remove(name)?;
        self.order.retain(|n| n != name);

        tracing::info!(channel = name, id = %session.id(), "🗑️ Channel session removed");
        self.surface.channel_changed(&ChannelChange::Removed {
            id: session.id(),
            name: name.to_string(),
        });

        if self.selected.as_deref() == Some(name) {
            self.selected = self.order.first().cloned();
            self.notify_selection();
        }

        Some(session)
    }

    /// フォーカスするチャンネルを選択する
    ///
    /// 存在しないチャンネルは選択できない（`false` を返す）。
    pub fn select(&mut self, name: &str) -> bool {
        if !self.sessions.contains_key(name) {
            tracing::debug!(channel = name, "Cannot select unknown channel");
            return false;
        }
        if self.selected.as_deref() != Some(name) {
            self.selected = Some(name.to_string());
            self.notify_selection();
        }
        true
    }

    fn notify_selection(&self) {
        let id = self.selected().map(ChannelSession::id);
        tracing::debug!(selected = ?self.selected, "🎯 Selection changed");
        self.surface.channel_changed(&ChannelChange::SelectionChanged {
            id,
            name: self.selected.clone(),
        });
    }

    /// 選択中のセッション
    pub fn selected(&self) -> Option<&ChannelSession> {
        self.selected
            .as_deref()
            .and_then(|name| self.sessions.get(name))
    }

    pub fn selected_name(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    /// 入力中テキストを保存する
    pub fn set_draft(&mut self, name: &str, text: impl Into<String>) -> bool {
        match self.sessions.get_mut(name) {
            Some(session) => {
                session.set_draft(text.into());
                true
            }
            None => false,
        }
    }

    /// 入力中テキストを取り出してクリアする
    pub fn take_draft(&mut self, name: &str) -> Option<String> {
        self.sessions.get_mut(name).map(ChannelSession::take_draft)
    }

    pub fn get(&self, name: &str) -> Option<&ChannelSession> {
        self.sessions.get(name)
    }

    pub fn get_by_id(&self, id: SessionId) -> Option<&ChannelSession> {
        self.sessions.values().find(|session| session.id() == id)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.sessions.contains_key(name)
    }

    /// 作成順のチャンネル名
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// 作成順にセッションを走査
    pub fn iter(&self) -> impl Iterator<Item = &ChannelSession> {
        self.order.iter().filter_map(|name| self.sessions.get(name))
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingSurface {
        changes: Mutex<Vec<ChannelChange>>,
    }

    impl RenderSurface for RecordingSurface {
        fn channel_changed(&self, change: &ChannelChange) {
            self.changes.lock().push(change.clone());
        }
    }

    fn recording_registry() -> (ChannelRegistry, Arc<RecordingSurface>) {
        let surface = Arc::new(RecordingSurface::default());
        (ChannelRegistry::new(surface.clone()), surface)
    }

    #[test]
    fn test_ensure_is_idempotent() {
        let (mut registry, surface) = recording_registry();
        let first = registry.ensure("alpha").id();
        let second = registry.ensure("alpha").id();
        let other = registry.ensure("beta").id();

        assert_eq!(first, second);
        assert_ne!(first, other);
        assert_eq!(registry.len(), 2);
        // 2回目の ensure("alpha") は通知しない
        assert_eq!(surface.changes.lock().len(), 2);
    }

    #[test]
    fn test_names_are_case_sensitive() {
        let mut registry = ChannelRegistry::default();
        registry.ensure("Alpha");
        registry.ensure("alpha");
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_append_creates_session_and_caps_log() {
        let mut registry = ChannelRegistry::with_capacity(Arc::new(NullSurface), 5);
        for i in 0..12 {
            registry.append("alpha", MessageTag::User, format!("m{}", i), "00:00:00");
        }
        let session = registry.get("alpha").unwrap();
        assert_eq!(session.messages().len(), 5);
        let texts: Vec<&str> = session.messages().iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["m7", "m8", "m9", "m10", "m11"]);
    }

    #[test]
    fn test_append_reports_eviction() {
        let (mut registry, surface) = {
            let surface = Arc::new(RecordingSurface::default());
            (ChannelRegistry::with_capacity(surface.clone(), 1), surface)
        };
        registry.append("alpha", MessageTag::User, "one", "t");
        registry.append("alpha", MessageTag::User, "two", "t");

        let changes = surface.changes.lock();
        assert!(matches!(changes[0], ChannelChange::Created { .. }));
        assert!(matches!(
            changes[1],
            ChannelChange::MessageAppended { evicted: 0, .. }
        ));
        assert!(matches!(
            changes[2],
            ChannelChange::MessageAppended { evicted: 1, .. }
        ));
    }

    #[test]
    fn test_update_metadata_merges() {
        let mut registry = ChannelRegistry::default();
        registry.ensure("alpha");
        registry.update_metadata(
            "alpha",
            MetadataUpdate {
                game: Some("Chess".to_string()),
                viewers: Some(5),
                thumbnail: Some("thumb".to_string()),
            },
        );
        registry.update_metadata(
            "alpha",
            MetadataUpdate {
                viewers: Some(7),
                ..Default::default()
            },
        );

        let metadata = registry.get("alpha").unwrap().metadata();
        assert_eq!(metadata.game.as_deref(), Some("Chess"));
        assert_eq!(metadata.viewers, Some(7));
        assert_eq!(metadata.thumbnail.as_deref(), Some("thumb"));
    }

    #[test]
    fn test_update_metadata_unknown_channel() {
        let mut registry = ChannelRegistry::default();
        let result = registry.update_metadata(
            "ghost",
            MetadataUpdate {
                viewers: Some(1),
                ..Default::default()
            },
        );
        assert!(result.is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_remove_selected_falls_back() {
        let (mut registry, surface) = recording_registry();
        registry.ensure("alpha");
        registry.ensure("beta");
        assert!(registry.select("alpha"));

        let removed = registry.remove("alpha").unwrap();
        assert_eq!(removed.name(), "alpha");
        assert_eq!(registry.selected_name(), Some("beta"));

        let last = surface.changes.lock().last().cloned().unwrap();
        assert_eq!(
            last,
            ChannelChange::SelectionChanged {
                id: registry.get("beta").map(|s| s.id()),
                name: Some("beta".to_string()),
            }
        );

        registry.remove("beta");
        assert!(registry.selected().is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_remove_unselected_keeps_selection() {
        let mut registry = ChannelRegistry::default();
        registry.ensure("alpha");
        registry.ensure("beta");
        registry.select("beta");
        registry.remove("alpha");
        assert_eq!(registry.selected_name(), Some("beta"));
        assert!(registry.remove("alpha").is_none());
    }

    #[test]
    fn test_select_unknown_channel() {
        let mut registry = ChannelRegistry::default();
        assert!(!registry.select("nobody"));
        assert!(registry.selected().is_none());
    }

    #[test]
    fn test_ids_are_not_reused() {
        let mut registry = ChannelRegistry::default();
        let first = registry.ensure("alpha").id();
        registry.remove("alpha");
        let second = registry.ensure("alpha").id();
        assert_ne!(first, second);
        assert_eq!(registry.get_by_id(second).unwrap().name(), "alpha");
        assert!(registry.get_by_id(first).is_none());
    }

    #[test]
    fn test_drafts() {
        let mut registry = ChannelRegistry::default();
        assert!(!registry.set_draft("alpha", "x"));
        registry.ensure("alpha");
        assert!(registry.set_draft("alpha", "hello"));
        assert_eq!(registry.get("alpha").unwrap().draft_input(), "hello");
        assert_eq!(registry.take_draft("alpha").as_deref(), Some("hello"));
        assert_eq!(registry.get("alpha").unwrap().draft_input(), "");
    }

    #[test]
    fn test_names_in_creation_order() {
        let mut registry = ChannelRegistry::default();
        for name in ["c", "a", "b"] {
            registry.ensure(name);
        }
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["c", "a", "b"]);
        assert_eq!(registry.iter().count(), 3);
    }
}
