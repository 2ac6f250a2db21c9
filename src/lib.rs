pub mod channels;
pub mod config;
pub mod controller;
pub mod error;
pub mod logging;
pub mod prompts;
pub mod surface;
pub mod transport;

// Re-export the main error types for convenience
pub use error::{ChanviewError, ChanviewResult};
pub use prompts::PromptError;
pub use transport::protocol::ProtocolError;
pub use transport::TransportError;

// Re-export the core components
pub use channels::{ChannelRegistry, ChannelSession, ChatMessage, MessageTag, SessionId};
pub use controller::{SessionController, SessionHandle, UserIntent};
pub use prompts::{Decision, PromptQueue};
pub use transport::{ConnectionState, TransportHandle, TransportSession, WebSocketTransport};

// Re-export the render boundary
pub use surface::{
    ChannelChange, ConnectionStatus, EventSurface, NullSurface, PromptView, RenderSurface,
    SurfaceEvent,
};

pub use config::{AppConfig, ConfigManager};
