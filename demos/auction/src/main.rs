//! Animal auction hosted on this machine, played from a remote control.
//!
//! Relayed (start `handset-relay` first):
//!   cargo run -p handset-example-auction --bin auction-host -- --session ab12cd
//!   cargo run -p handset-example-auction --bin auction-remote -- --session ab12cd
//!
//! Direct peer:
//!   cargo run -p handset-example-auction --bin auction-host -- --peer
//!   cargo run -p handset-example-auction --bin auction-remote -- --link '<printed link>'
//!   then paste the remote's answer into the host's terminal.

mod table;

use handset_client::{PeerConfig, ReconnectPolicy, RelayEndpoint, Transport, spawn_host};
use handset_core::{SessionId, signal};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;
use url::Url;

const DEFAULT_LINK_BASE: &str = "https://handset.local/remote";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("auction_host=info".parse()?)
                .add_directive("handset_client=info".parse()?),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let link_base = Url::parse(
        &parse_arg_string(&args, "--link-base").unwrap_or_else(|| DEFAULT_LINK_BASE.to_string()),
    )?;
    let players = parse_arg_string(&args, "--players").unwrap_or_else(|| "Ada,Bo,Cy".to_string());
    let players: Vec<&str> = players.split(',').map(str::trim).collect();

    let transport = if args.iter().any(|a| a == "--peer") {
        Transport::Peer(PeerConfig {
            bind: parse_arg(&args, "--bind").unwrap_or(PeerConfig::default().bind),
            ..PeerConfig::default()
        })
    } else {
        let endpoint = match parse_arg_string(&args, "--relay") {
            Some(url) => RelayEndpoint::new(&url)?,
            None => RelayEndpoint::from_build_env(),
        };
        let session: SessionId = match parse_arg_string(&args, "--session") {
            Some(id) => id.trim().parse()?,
            None => SessionId::generate(),
        };
        println!("Session id: {session}");
        Transport::Relayed { endpoint, session }
    };

    let (table, view) = table::Table::new(&players);
    let host = spawn_host(transport, ReconnectPolicy::default(), view, table);

    let mut offers = host.offer();
    let mut status = host.status();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            changed = offers.changed() => {
                if changed.is_err() {
                    break;
                }
                if let Some(offer) = offers.borrow_and_update().clone() {
                    println!("Open on the remote:\n  {}", signal::link(&link_base, &offer));
                    println!("Then paste its answer here.");
                }
            }
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                tracing::info!("Status: {}", *status.borrow_and_update());
            }
            line = lines.next_line() => match line? {
                Some(line) if line.trim().is_empty() => {}
                Some(line) => {
                    let result = match signal::extract(&line) {
                        Ok(answer) => host.answer(answer).await,
                        Err(e) => Err(e),
                    };
                    if let Err(e) = result {
                        eprintln!("{}", e.user_message().unwrap_or("Could not use that answer"));
                    }
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    host.shutdown().await;
    Ok(())
}

fn parse_arg<T: std::str::FromStr>(args: &[String], flag: &str) -> Option<T> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|v| v.parse().ok())
}

fn parse_arg_string(args: &[String], flag: &str) -> Option<String> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}
