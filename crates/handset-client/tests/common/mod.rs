#![allow(dead_code)]

use handset_client::HostActions;
use handset_core::GameView;
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::timeout;

/// Minimal game: every draw hands out the next card and bumps the score.
pub struct Deck {
    view: watch::Sender<GameView>,
    drawn: u32,
    pub calls: Arc<Mutex<Vec<(&'static str, Option<Value>)>>>,
}

impl Deck {
    pub fn new() -> (Self, watch::Receiver<GameView>) {
        let (view, rx) = watch::channel(GameView::new(json!({"score": 0})));
        let deck = Self {
            view,
            drawn: 0,
            calls: Arc::default(),
        };
        (deck, rx)
    }

    fn record(&self, name: &'static str, payload: Option<Value>) {
        self.calls.lock().unwrap().push((name, payload));
    }
}

impl HostActions for Deck {
    fn draw(&mut self, payload: Option<Value>) {
        self.record("draw", payload);
        self.drawn += 1;
        self.view.send_replace(GameView::new(
            json!({"score": self.drawn, "card": format!("card-{}", self.drawn)}),
        ));
    }
    fn auction_start(&mut self, payload: Option<Value>) {
        self.record("auction_start", payload);
    }
    fn auction_close(&mut self, payload: Option<Value>) {
        self.record("auction_close", payload);
    }
    fn auction_offer(&mut self, payload: Option<Value>) {
        self.record("auction_offer", payload);
    }
    fn exchange(&mut self, payload: Option<Value>) {
        self.record("exchange", payload);
    }
    fn exchange_accept(&mut self, payload: Option<Value>) {
        self.record("exchange_accept", payload);
    }
    fn buy_back(&mut self, payload: Option<Value>) {
        self.record("buy_back", payload);
    }
    fn cow_trade_start(&mut self, payload: Option<Value>) {
        self.record("cow_trade_start", payload);
    }
    fn cow_trade_respond(&mut self, payload: Option<Value>) {
        self.record("cow_trade_respond", payload);
    }
}

/// Game that ignores every action.
pub struct Idle;

impl HostActions for Idle {
    fn draw(&mut self, _: Option<Value>) {}
    fn auction_start(&mut self, _: Option<Value>) {}
    fn auction_close(&mut self, _: Option<Value>) {}
    fn auction_offer(&mut self, _: Option<Value>) {}
    fn exchange(&mut self, _: Option<Value>) {}
    fn exchange_accept(&mut self, _: Option<Value>) {}
    fn buy_back(&mut self, _: Option<Value>) {}
    fn cow_trade_start(&mut self, _: Option<Value>) {}
    fn cow_trade_respond(&mut self, _: Option<Value>) {}
}

/// Wait until `rx` holds a value matching `f`.
pub async fn settle<T>(rx: &mut watch::Receiver<T>, f: impl FnMut(&T) -> bool) {
    timeout(Duration::from_secs(10), rx.wait_for(f))
        .await
        .expect("timed out waiting for state")
        .expect("session ended");
}

/// Poll `f` until it holds.
pub async fn eventually(mut f: impl FnMut() -> bool) {
    timeout(Duration::from_secs(10), async {
        while !f() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition never held");
}
