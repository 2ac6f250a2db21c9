//! 統合テスト
//!
//! 公開APIだけを使ってコントローラの振り分けを確認する

use chanview::{
    channels::{MetadataUpdate, DEFAULT_LOG_CAPACITY},
    transport::{protocol, InboundEvent, OutboundEvent},
    AppConfig, ChannelChange, ChanviewError, ConnectionState, Decision, EventSurface,
    SessionController, SurfaceEvent, TransportHandle, UserIntent,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_test::{assert_err, assert_ok};

struct Scenario {
    controller: SessionController,
    outbound: mpsc::UnboundedReceiver<OutboundEvent>,
    surface: mpsc::UnboundedReceiver<SurfaceEvent>,
}

impl Scenario {
    fn connected() -> Self {
        let (handle, outbound) = TransportHandle::channel();
        let (surface, surface_rx) = EventSurface::new();
        let mut controller =
            SessionController::new(handle, Arc::new(surface), &AppConfig::default());
        controller.begin_connect();
        controller.handle_event(InboundEvent::Connect);

        let mut scenario = Self {
            controller,
            outbound,
            surface: surface_rx,
        };
        assert_eq!(scenario.outbound(), vec![OutboundEvent::GetActiveChannels]);
        scenario.surface_events();
        scenario
    }

    /// サーバーから届いたテキストフレームとして処理する
    fn frame(&mut self, text: &str) {
        match protocol::decode(text) {
            Ok(event) => self.controller.handle_event(event),
            Err(e) => tracing::debug!("frame dropped: {}", e),
        }
    }

    fn outbound(&mut self) -> Vec<OutboundEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.outbound.try_recv() {
            events.push(event);
        }
        events
    }

    fn surface_events(&mut self) -> Vec<SurfaceEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.surface.try_recv() {
            events.push(event);
        }
        events
    }

    fn presented_channels(&mut self) -> Vec<String> {
        self.surface_events()
            .into_iter()
            .filter_map(|event| match event {
                SurfaceEvent::Prompt(view) => Some(view.channel),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod channel_tests {
    use super::*;

    #[test]
    fn test_history_is_bounded() {
        let mut scenario = Scenario::connected();
        let total = DEFAULT_LOG_CAPACITY + 37;
        for i in 0..total {
            scenario.frame(&format!(
                r#"{{"event":"chat_message","data":{{"channel":"alpha","tag":"user","text":"m{}","timestamp":"12:00:00"}}}}"#,
                i
            ));
        }

        let session = scenario.controller.registry().get("alpha").unwrap();
        assert_eq!(session.messages().len(), DEFAULT_LOG_CAPACITY);
        assert_eq!(session.messages().iter().next().unwrap().text, "m37");
        assert_eq!(
            session.messages().last().unwrap().text,
            format!("m{}", total - 1)
        );
        assert_eq!(session.messages().dropped_count(), 37);
    }

    #[test]
    fn test_session_identity_is_stable() {
        let mut scenario = Scenario::connected();
        scenario.frame(r#"{"event":"channel_joined","data":{"channel":"alpha"}}"#);
        let id = scenario.controller.registry().get("alpha").unwrap().id();

        scenario.frame(r#"{"event":"channel_joined","data":{"channel":"alpha"}}"#);
        scenario.frame(r#"{"event":"chat_message","data":{"channel":"alpha","text":"hi"}}"#);
        scenario.frame(r#"{"event":"active_channels","data":{"channels":["alpha"]}}"#);

        assert_eq!(scenario.controller.registry().len(), 1);
        assert_eq!(scenario.controller.registry().get("alpha").unwrap().id(), id);

        let created: Vec<ChannelChange> = scenario
            .surface_events()
            .into_iter()
            .filter_map(|event| match event {
                SurfaceEvent::Channel(change @ ChannelChange::Created { .. }) => Some(change),
                _ => None,
            })
            .collect();
        assert_eq!(created.len(), 1);
    }

    #[test]
    fn test_frames_without_channel_are_dropped() {
        let mut scenario = Scenario::connected();
        scenario.frame(r#"{"event":"chat_message","data":{"text":"orphan"}}"#);
        scenario.frame(r#"{"event":"channel_meta","data":{"viewers":3}}"#);
        scenario.frame(r#"{"event":"channel_joined","data":{}}"#);
        scenario.frame("garbage");
        scenario.frame(r#"{"event":"mystery","data":{"channel":"alpha"}}"#);

        assert!(scenario.controller.registry().is_empty());
        assert!(scenario.surface_events().is_empty());
    }

    #[test]
    fn test_metadata_is_merged() {
        let mut scenario = Scenario::connected();
        scenario.frame(r#"{"event":"channel_joined","data":{"channel":"alpha"}}"#);
        scenario.frame(
            r#"{"event":"channel_meta","data":{"channel":"alpha","game":"Chess","viewers":10,"thumbnail":"aGk="}}"#,
        );
        scenario.controller.handle_event(InboundEvent::ChannelMeta {
            channel: "alpha".to_string(),
            update: MetadataUpdate {
                viewers: Some(12),
                ..Default::default()
            },
        });

        let metadata = scenario.controller.registry().get("alpha").unwrap().metadata();
        assert_eq!(metadata.game.as_deref(), Some("Chess"));
        assert_eq!(metadata.viewers, Some(12));
        assert_eq!(metadata.thumbnail.as_deref(), Some("aGk="));
    }

    #[test]
    fn test_remove_selected_falls_back_to_remaining() {
        let mut scenario = Scenario::connected();
        scenario.frame(r#"{"event":"active_channels","data":{"channels":["alpha","beta"]}}"#);
        assert_ok!(scenario
            .controller
            .handle_intent(UserIntent::Select("alpha".to_string())));
        assert_ok!(scenario
            .controller
            .handle_intent(UserIntent::Remove("alpha".to_string())));

        let registry = scenario.controller.registry();
        assert!(registry.get("alpha").is_none());
        assert_eq!(registry.selected().map(|s| s.name()), Some("beta"));
    }
}

#[cfg(test)]
mod prompt_tests {
    use super::*;

    #[test]
    fn test_concurrent_stream_prompts() {
        let mut scenario = Scenario::connected();
        scenario.frame(r#"{"event":"stream_online","data":{"channel":"A","info":{"title":"a"}}}"#);
        scenario.frame(r#"{"event":"stream_online","data":{"info":{"user":"B"}}}"#);

        assert_eq!(scenario.presented_channels(), vec!["A"]);
        assert_eq!(scenario.controller.prompts().pending_len(), 1);

        assert_ok!(scenario
            .controller
            .handle_intent(UserIntent::ResolvePrompt(Decision::Join)));
        assert_eq!(
            scenario.outbound(),
            vec![OutboundEvent::JoinChannel {
                channel: "A".to_string()
            }]
        );
        assert_eq!(scenario.presented_channels(), vec!["B"]);

        assert_ok!(scenario
            .controller
            .handle_intent(UserIntent::ResolvePrompt(Decision::Skip)));
        assert_eq!(
            scenario.outbound(),
            vec![OutboundEvent::SkipChannel {
                channel: "B".to_string()
            }]
        );
        assert!(scenario.controller.prompts().is_idle());
    }

    #[test]
    fn test_double_resolve_is_rejected() {
        let mut scenario = Scenario::connected();
        scenario.frame(r#"{"event":"stream_online","data":{"channel":"A","info":{}}}"#);
        assert_ok!(scenario
            .controller
            .handle_intent(UserIntent::ResolvePrompt(Decision::Join)));

        let err = assert_err!(scenario
            .controller
            .handle_intent(UserIntent::ResolvePrompt(Decision::Join)));
        assert!(matches!(err, ChanviewError::Prompt(_)));
        assert_eq!(scenario.outbound().len(), 1);
    }

    #[test]
    fn test_prompt_answered_after_disconnect_emits_nothing() {
        let mut scenario = Scenario::connected();
        scenario.frame(r#"{"event":"stream_online","data":{"channel":"A","info":{}}}"#);
        scenario.controller.handle_event(InboundEvent::Disconnect {
            reason: "transport close".to_string(),
        });

        assert_ok!(scenario
            .controller
            .handle_intent(UserIntent::ResolvePrompt(Decision::Join)));
        assert!(scenario.outbound().is_empty());
        assert!(scenario.controller.prompts().is_idle());
    }
}

#[cfg(test)]
mod chat_tests {
    use super::*;

    #[test]
    fn test_whitespace_only_send_emits_nothing() {
        let mut scenario = Scenario::connected();
        assert_ok!(scenario.controller.handle_intent(UserIntent::SendChat {
            channel: "alpha".to_string(),
            text: "   ".to_string(),
        }));
        assert!(scenario.outbound().is_empty());
    }

    #[test]
    fn test_send_is_not_echoed_locally() {
        let mut scenario = Scenario::connected();
        scenario.frame(r#"{"event":"channel_joined","data":{"channel":"alpha"}}"#);
        assert_ok!(scenario.controller.handle_intent(UserIntent::SendChat {
            channel: "alpha".to_string(),
            text: "hello".to_string(),
        }));
        assert_eq!(
            scenario.outbound(),
            vec![OutboundEvent::SendChat {
                channel: "alpha".to_string(),
                message: "hello".to_string(),
            }]
        );
        assert!(scenario
            .controller
            .registry()
            .get("alpha")
            .unwrap()
            .messages()
            .is_empty());

        // サーバーからの確認は状態を変えない
        scenario.frame(r#"{"event":"chat_sent","data":{"channel":"alpha","message":"hello"}}"#);
        assert!(scenario
            .controller
            .registry()
            .get("alpha")
            .unwrap()
            .messages()
            .is_empty());
    }

    #[test]
    fn test_reconnect_failed_is_terminal() {
        let mut scenario = Scenario::connected();
        scenario.controller.handle_event(InboundEvent::Disconnect {
            reason: "ping timeout".to_string(),
        });
        for attempt in 1..=10 {
            scenario
                .controller
                .handle_event(InboundEvent::Reconnecting { attempt });
        }
        scenario.controller.handle_event(InboundEvent::ReconnectFailed);

        assert_eq!(
            scenario.controller.connection_state(),
            ConnectionState::Disconnected
        );
        assert!(scenario.controller.transport().gave_up());
        assert!(scenario.outbound().is_empty());
    }
}
