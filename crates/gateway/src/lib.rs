//! Gateway: WebSocket sessions for end users, the callback endpoint workers
//! answer through, and the heartbeat monitor that ages out dead connections.
//!
//! Lifecycle:
//! 1. Client connects to `/ws?uid=N`
//! 2. The connection registers a session, replacing any older one for `N`
//! 3. `CHAT` frames are acknowledged and handed to the classifier out of band
//! 4. Workers `POST` answers to the callback endpoint, which pushes them as
//!    `AI_RESPONSE` frames
//! 5. Silent sessions are evicted after `max_missed` late heartbeat scans

pub mod dispatch;
pub mod error;
pub mod heartbeat;
pub mod registry;
pub mod router;
pub mod server;
pub mod session;
pub mod state;
pub mod ws;

pub use {
    dispatch::{ChatDispatcher, ChatJob, ClassifierDispatcher, DispatchPool},
    error::GatewayError,
    heartbeat::HeartbeatMonitor,
    registry::{SessionRegistry, SweepReport},
    router::{ConnectionContext, MessageRouter},
    server::{build_gateway_app, serve, start_gateway},
    session::{Session, SessionInfo, TransportHandle},
    state::GatewayState,
};
