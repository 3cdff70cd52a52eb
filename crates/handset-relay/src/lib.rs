//! Session relay for handset.
//!
//! Hosts and remote controls that cannot reach each other directly both
//! connect to `/ws/<session>`; the relay forwards every frame from one member
//! to all other members of the same session, in order. It also tells members
//! when someone joins or leaves, using `memberJoined` / `memberLeft`
//! envelopes, so a host can send a fresh snapshot to a late joiner.

mod config;
mod registry;
mod server;

pub use config::RelayConfig;
pub use registry::{Frame, MemberId, Membership, Payload, SessionRegistry};
pub use server::router;

use tokio::net::TcpListener;

/// Bind and serve until the process is stopped.
pub async fn serve(config: RelayConfig) -> std::io::Result<()> {
    let listener = TcpListener::bind(config.bind).await?;
    tracing::info!("Listening on ws://{}", listener.local_addr()?);
    serve_on(listener, SessionRegistry::new(config.channel_capacity.get())).await
}

/// Serve on an already bound listener.
pub async fn serve_on(listener: TcpListener, registry: SessionRegistry) -> std::io::Result<()> {
    axum::serve(listener, router(registry)).await
}
