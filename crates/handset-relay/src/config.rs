use clap::Parser;
use std::net::SocketAddr;
use std::num::NonZeroUsize;

/// Relay settings, from flags or the environment.
#[derive(Debug, Clone, PartialEq, Eq, Parser)]
#[command(name = "handset-relay", version, about = "Session relay for handset remote controls")]
pub struct RelayConfig {
    /// Address to listen on.
    #[arg(long, env = "HANDSET_RELAY_BIND", default_value = "127.0.0.1:3002")]
    pub bind: SocketAddr,

    /// Frames a member may fall behind its session before being dropped.
    #[arg(long, env = "HANDSET_RELAY_CHANNEL_CAPACITY", default_value = "64")]
    pub channel_capacity: NonZeroUsize,
}
