//! Session lifecycle.
//!
//! ```text
//! Unconnected --attach--> Negotiating --initialized--> Ready --close--> Closed
//! ```
//!
//! `initialize` is accepted only once, while negotiating. Until it has been
//! answered, every request other than `initialize` and `ping` is rejected.
//! Requests are accepted as soon as `initialize` has been answered, even
//! before the host's `notifications/initialized` arrives.

use tokio::sync::RwLock;
use tracing::info;

use crate::error::{Error, Result};
use crate::mcp::protocol::{
    methods, ClientCapabilities, ClientInfo, InitializeParams, LATEST_PROTOCOL_VERSION,
    SUPPORTED_PROTOCOL_VERSIONS,
};

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unconnected,
    Negotiating,
    Ready,
    Closed,
}

/// What the host told us during `initialize`.
#[derive(Debug, Clone)]
pub struct Negotiated {
    pub protocol_version: String,
    pub client_info: ClientInfo,
    pub client_capabilities: ClientCapabilities,
}

#[derive(Debug)]
struct Inner {
    state: SessionState,
    negotiated: Option<Negotiated>,
}

/// One session per transport connection.
#[derive(Debug)]
pub struct Session {
    id: String,
    inner: RwLock<Inner>,
}

/// Pick the protocol version to answer with: the host's when supported,
/// otherwise the latest this server speaks.
pub fn negotiate_version(requested: &str) -> &'static str {
    SUPPORTED_PROTOCOL_VERSIONS
        .iter()
        .find(|v| **v == requested)
        .copied()
        .unwrap_or(LATEST_PROTOCOL_VERSION)
}

impl Session {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            inner: RwLock::new(Inner {
                state: SessionState::Unconnected,
                negotiated: None,
            }),
        }
    }

    /// A session with a random id.
    pub fn generate() -> Self {
        Self::new(uuid::Uuid::new_v4().to_string())
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub async fn state(&self) -> SessionState {
        self.inner.read().await.state
    }

    pub async fn negotiated(&self) -> Option<Negotiated> {
        self.inner.read().await.negotiated.clone()
    }

    pub async fn is_closed(&self) -> bool {
        self.state().await == SessionState::Closed
    }

    /// The transport is connected; start negotiating.
    pub async fn attach(&self) {
        let mut inner = self.inner.write().await;
        if inner.state == SessionState::Unconnected {
            inner.state = SessionState::Negotiating;
        }
    }

    /// Whether a request for `method` may be processed in the current state.
    pub async fn check_request(&self, method: &str) -> Result<()> {
        let inner = self.inner.read().await;
        if inner.state == SessionState::Closed {
            return Err(Error::SessionClosed);
        }
        match method {
            methods::PING => Ok(()),
            methods::INITIALIZE if inner.negotiated.is_some() => Err(Error::AlreadyInitialized),
            methods::INITIALIZE => Ok(()),
            _ if inner.negotiated.is_none() => Err(Error::NotInitialized(method.to_string())),
            _ => Ok(()),
        }
    }

    /// Record the host's `initialize` and return the negotiated version.
    pub async fn initialize(&self, params: InitializeParams) -> Result<&'static str> {
        let mut inner = self.inner.write().await;
        match inner.state {
            SessionState::Closed => return Err(Error::SessionClosed),
            _ if inner.negotiated.is_some() => return Err(Error::AlreadyInitialized),
            _ => {}
        }

        let version = negotiate_version(&params.protocol_version);
        info!(
            session = %self.id,
            client = %params.client_info.name,
            client_version = %params.client_info.version,
            requested = %params.protocol_version,
            negotiated = version,
            "Session negotiated"
        );
        inner.state = SessionState::Negotiating;
        inner.negotiated = Some(Negotiated {
            protocol_version: version.to_string(),
            client_info: params.client_info,
            client_capabilities: params.capabilities,
        });
        Ok(version)
    }

    /// Handle `notifications/initialized`. Returns false if it arrived
    /// before `initialize` was answered.
    pub async fn mark_initialized(&self) -> bool {
        let mut inner = self.inner.write().await;
        if inner.negotiated.is_none() || inner.state == SessionState::Closed {
            return false;
        }
        if inner.state != SessionState::Ready {
            inner.state = SessionState::Ready;
            info!(session = %self.id, "Session ready");
        }
        true
    }

    /// Terminal transition.
    pub async fn close(&self) {
        let mut inner = self.inner.write().await;
        if inner.state != SessionState::Closed {
            inner.state = SessionState::Closed;
            info!(session = %self.id, "Session closed");
        }
    }
}
