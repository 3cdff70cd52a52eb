//! Transports, sync engines and session actors for handset.
//!
//! A host runs [`spawn_host`] with its game view and action handlers; a remote
//! control runs [`spawn_remote`]. Both pick a [`Transport`]:
//!
//! - [`Transport::Relayed`]: both sides connect to `<relay>/ws/<session>` and
//!   the relay forwards frames between them. Reconnecting re-subscribes with
//!   the same session id.
//! - [`Transport::Peer`]: the host publishes an offer, the remote answers, and
//!   the two connect directly. Reconnecting needs a fresh offer.
//!
//! ```no_run
//! # async fn demo() -> Result<(), handset_core::ProtocolError> {
//! use handset_client::{ReconnectPolicy, RelayEndpoint, Transport, spawn_remote};
//!
//! let transport = Transport::Relayed {
//!     endpoint: RelayEndpoint::from_build_env(),
//!     session: "ab12cd".parse().expect("valid id"),
//! };
//! let remote = spawn_remote(transport, ReconnectPolicy::default());
//! let mut view = remote.view();
//! view.wait_for(Option::is_some).await.ok();
//! remote.draw().await?;
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod engine;
pub mod peer;
pub mod relayed;
mod session;
pub mod supervisor;

pub use channel::{Channel, ChannelId};
pub use engine::{HostActions, HostEngine, Outcome, RemoteEngine, dispatch};
pub use peer::PeerConfig;
pub use relayed::{EndpointError, RelayEndpoint};
pub use session::{HostHandle, RemoteHandle, Transport, spawn_host, spawn_remote};
pub use supervisor::{Decision, ReconnectPolicy, Supervisor};
