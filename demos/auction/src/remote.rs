//! Terminal remote control for the auction demo.
//!
//! Commands (one per line):
//!   draw | start | bid <player> <amount> | close | buyback | sell
//!   swap <player> <give> <take> | accept
//!   cow <player> <animal> <offer> | counter <offer>
//!   link <offer link>  (direct peer: answer a new offer)
//!   quit

use handset_client::{PeerConfig, ReconnectPolicy, RelayEndpoint, RemoteHandle, Transport, spawn_remote};
use handset_core::{ActionMethod, ProtocolError, signal};
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[derive(Debug, PartialEq)]
enum Input {
    Action(ActionMethod, Option<Value>),
    Link(String),
    Quit,
}

fn parse_input(line: &str) -> Result<Input, String> {
    let words: Vec<&str> = line.split_whitespace().collect();
    let number = |i: usize| -> Result<u64, String> {
        words
            .get(i)
            .ok_or_else(|| format!("missing argument {i}"))?
            .parse()
            .map_err(|e| format!("argument {i}: {e}"))
    };
    let word = |i: usize| -> Result<&str, String> {
        words
            .get(i)
            .copied()
            .ok_or_else(|| format!("missing argument {i}"))
    };

    let input = match words.first().copied() {
        Some("draw") => Input::Action(ActionMethod::Draw, None),
        Some("start") => Input::Action(ActionMethod::AuctionStart, None),
        Some("bid") => Input::Action(
            ActionMethod::AuctionOffer,
            Some(json!({"player": number(1)?, "amount": number(2)?})),
        ),
        Some("close") => Input::Action(ActionMethod::AuctionClose, None),
        Some("buyback") => Input::Action(ActionMethod::BuyBack, Some(json!({"buy": true}))),
        Some("sell") => Input::Action(ActionMethod::BuyBack, Some(json!({"buy": false}))),
        Some("swap") => Input::Action(
            ActionMethod::Exchange,
            Some(json!({"with": number(1)?, "give": word(2)?, "take": word(3)?})),
        ),
        Some("accept") => Input::Action(ActionMethod::ExchangeAccept, None),
        Some("cow") => Input::Action(
            ActionMethod::CowTradeStart,
            Some(json!({"with": number(1)?, "animal": word(2)?, "offer": number(3)?})),
        ),
        Some("counter") => Input::Action(
            ActionMethod::CowTradeRespond,
            Some(json!({"offer": number(1)?})),
        ),
        Some("link") => Input::Link(word(1)?.to_string()),
        Some("quit") => Input::Quit,
        Some(other) => return Err(format!("unknown command: {other}")),
        None => return Err("empty command".to_string()),
    };
    Ok(input)
}

async fn answer_offer(remote: &RemoteHandle, link: &str) -> Result<(), ProtocolError> {
    remote.offer(signal::extract(link)?).await
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("auction_remote=info".parse()?)
                .add_directive("handset_client=info".parse()?),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let link = parse_arg_string(&args, "--link");

    let transport = match (&link, parse_arg_string(&args, "--session")) {
        (Some(_), _) => Transport::Peer(PeerConfig::default()),
        (None, Some(session)) => Transport::Relayed {
            endpoint: match parse_arg_string(&args, "--relay") {
                Some(url) => RelayEndpoint::new(&url)?,
                None => RelayEndpoint::from_build_env(),
            },
            session: session.trim().parse()?,
        },
        (None, None) => anyhow::bail!("pass --session <id> or --link <offer link>"),
    };

    let remote = spawn_remote(transport, ReconnectPolicy::default());
    if let Some(link) = &link
        && let Err(e) = answer_offer(&remote, link).await
    {
        eprintln!("{}", e.user_message().unwrap_or("Could not use that link"));
    }

    let mut view = remote.view();
    let mut status = remote.status();
    let mut answer = remote.answer();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            changed = view.changed() => {
                if changed.is_err() {
                    break;
                }
                if let Some(view) = view.borrow_and_update().as_ref() {
                    println!("{}", serde_json::to_string_pretty(view.as_value())?);
                }
            }
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                println!("[{}]", *status.borrow_and_update());
            }
            changed = answer.changed() => {
                if changed.is_err() {
                    break;
                }
                if let Some(answer) = answer.borrow_and_update().as_ref() {
                    println!("Paste this into the host:\n  {}", signal::encode(answer));
                }
            }
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if line.trim().is_empty() {
                    continue;
                }
                match parse_input(&line) {
                    Ok(Input::Action(action, payload)) => {
                        if let Err(e) = remote.send(action, payload).await {
                            eprintln!("{}", e.user_message().unwrap_or("Could not send"));
                        }
                    }
                    Ok(Input::Link(link)) => {
                        if let Err(e) = answer_offer(&remote, &link).await {
                            eprintln!("{}", e.user_message().unwrap_or("Could not use that link"));
                        }
                    }
                    Ok(Input::Quit) => break,
                    Err(e) => eprintln!("{e}"),
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    remote.shutdown().await;
    Ok(())
}

fn parse_arg_string(args: &[String], flag: &str) -> Option<String> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}
