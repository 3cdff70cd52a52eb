//! Table state and rules.
//!
//! A deliberately small animal-auction game: the player whose turn it is
//! reveals a card and auctions it, or challenges another player to a swap or a
//! cow trade. Every accepted action publishes a fresh view; anything that
//! doesn't fit the current phase is logged and ignored.

use handset_client::HostActions;
use handset_core::GameView;
use rand::seq::SliceRandom;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::watch;

const ANIMALS: [&str; 8] = [
    "horse", "cow", "pig", "donkey", "goat", "sheep", "dog", "goose",
];
const COPIES: usize = 4;
const START_MONEY: u32 = 90;
const LOG_LEN: usize = 8;

#[derive(Debug, Clone, Serialize)]
pub struct Player {
    pub name: String,
    pub money: u32,
    pub animals: Vec<String>,
}

impl Player {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            money: START_MONEY,
            animals: Vec::new(),
        }
    }

    fn owns(&self, animal: &str) -> bool {
        self.animals.iter().any(|a| a == animal)
    }

    fn give_up(&mut self, animal: &str) -> Option<String> {
        let idx = self.animals.iter().position(|a| a == animal)?;
        Some(self.animals.remove(idx))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bid {
    pub player: usize,
    pub amount: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Revealed {
        card: String,
    },
    Bidding {
        card: String,
        best: Option<Bid>,
    },
    /// Bidding is over; the auctioneer decides whether to buy the card back.
    Sold {
        card: String,
        best: Bid,
    },
    Exchange {
        with: usize,
        give: String,
        take: String,
    },
    CowTrade {
        with: usize,
        animal: String,
        offer: u32,
    },
}

#[derive(Deserialize)]
struct BuyBack {
    buy: bool,
}

#[derive(Deserialize)]
struct ExchangeProposal {
    with: usize,
    give: String,
    take: String,
}

#[derive(Deserialize)]
struct CowTradeChallenge {
    with: usize,
    animal: String,
    offer: u32,
}

#[derive(Deserialize)]
struct CowTradeAnswer {
    offer: u32,
}

#[derive(Serialize)]
struct Snapshot<'a> {
    players: &'a [Player],
    turn: usize,
    deck: usize,
    #[serde(flatten)]
    phase: &'a Phase,
    log: &'a [String],
}

pub struct Table {
    view: watch::Sender<GameView>,
    players: Vec<Player>,
    deck: Vec<String>,
    turn: usize,
    phase: Phase,
    log: Vec<String>,
}

impl Table {
    pub fn new(names: &[&str]) -> (Self, watch::Receiver<GameView>) {
        let mut deck: Vec<String> = ANIMALS
            .iter()
            .flat_map(|a| std::iter::repeat_n(a.to_string(), COPIES))
            .collect();
        deck.shuffle(&mut rand::thread_rng());
        Self::with_deck(names, deck)
    }

    /// Cards are drawn from the end of `deck`.
    pub fn with_deck(names: &[&str], deck: Vec<String>) -> (Self, watch::Receiver<GameView>) {
        let (view, rx) = watch::channel(GameView::default());
        let table = Self {
            view,
            players: names.iter().map(|n| Player::new(n)).collect(),
            deck,
            turn: 0,
            phase: Phase::Idle,
            log: Vec::new(),
        };
        table.publish();
        (table, rx)
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    fn snapshot(&self) -> GameView {
        let snapshot = Snapshot {
            players: &self.players,
            turn: self.turn,
            deck: self.deck.len(),
            phase: &self.phase,
            log: &self.log,
        };
        serde_json::to_value(snapshot)
            .map(GameView::new)
            .unwrap_or_default()
    }

    fn publish(&self) {
        self.view.send_replace(self.snapshot());
    }

    fn note(&mut self, line: String) {
        tracing::info!("{}", line);
        self.log.push(line);
        if self.log.len() > LOG_LEN {
            self.log.remove(0);
        }
        self.publish();
    }

    fn end_turn(&mut self) {
        self.phase = Phase::Idle;
        self.turn = (self.turn + 1) % self.players.len().max(1);
    }

    fn name(&self, player: usize) -> &str {
        self.players.get(player).map_or("?", |p| p.name.as_str())
    }

    fn is_opponent(&self, player: usize) -> bool {
        player != self.turn && player < self.players.len()
    }
}

fn ignore(action: &str, why: &str) {
    tracing::warn!("Ignoring {}: {}", action, why);
}

fn parse<T: DeserializeOwned>(action: &str, payload: Option<Value>) -> Option<T> {
    match serde_json::from_value(payload.unwrap_or(Value::Null)) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            ignore(action, &e.to_string());
            None
        }
    }
}

impl HostActions for Table {
    fn draw(&mut self, _: Option<Value>) {
        if self.phase != Phase::Idle {
            return ignore("draw", "a card is already in play");
        }
        let Some(card) = self.deck.pop() else {
            return ignore("draw", "the deck is empty");
        };
        self.phase = Phase::Revealed { card: card.clone() };
        let line = format!("{} reveals a {}", self.name(self.turn), card);
        self.note(line);
    }

    fn auction_start(&mut self, _: Option<Value>) {
        let Phase::Revealed { card } = &self.phase else {
            return ignore("auction start", "no revealed card");
        };
        let card = card.clone();
        self.phase = Phase::Bidding {
            card: card.clone(),
            best: None,
        };
        let line = format!("Bidding opens for the {}", card);
        self.note(line);
    }

    fn auction_offer(&mut self, payload: Option<Value>) {
        let Some(bid) = parse::<Bid>("auction offer", payload) else {
            return;
        };
        let Phase::Bidding { card, best } = &self.phase else {
            return ignore("auction offer", "no auction running");
        };
        if !self.is_opponent(bid.player) {
            return ignore("auction offer", "the auctioneer cannot bid");
        }
        if best.is_some_and(|best| bid.amount <= best.amount) {
            return ignore("auction offer", "bid too low");
        }
        if bid.amount > self.players[bid.player].money {
            return ignore("auction offer", "not enough money");
        }
        let card = card.clone();
        self.phase = Phase::Bidding {
            card,
            best: Some(bid),
        };
        let line = format!("{} bids {}", self.name(bid.player), bid.amount);
        self.note(line);
    }

    fn auction_close(&mut self, _: Option<Value>) {
        let Phase::Bidding { card, best } = &self.phase else {
            return ignore("auction close", "no auction running");
        };
        let (card, best) = (card.clone(), *best);
        match best {
            Some(best) => {
                self.phase = Phase::Sold {
                    card: card.clone(),
                    best,
                };
                let line = format!("Going once, going twice: {} for {}", card, best.amount);
                self.note(line);
            }
            None => {
                let auctioneer = self.turn;
                self.players[auctioneer].animals.push(card.clone());
                self.end_turn();
                let line = format!("No bids; {} keeps the {}", self.name(auctioneer), card);
                self.note(line);
            }
        }
    }

    fn buy_back(&mut self, payload: Option<Value>) {
        let Some(BuyBack { buy }) = parse("buy back", payload) else {
            return;
        };
        let Phase::Sold { card, best } = &self.phase else {
            return ignore("buy back", "nothing was sold");
        };
        let (card, best) = (card.clone(), *best);
        let auctioneer = self.turn;
        let (buyer, seller) = if buy {
            if self.players[auctioneer].money < best.amount {
                return ignore("buy back", "not enough money");
            }
            (auctioneer, best.player)
        } else {
            (best.player, auctioneer)
        };
        self.players[buyer].money -= best.amount;
        self.players[seller].money += best.amount;
        self.players[buyer].animals.push(card.clone());
        self.end_turn();
        let line = format!("{} takes the {} for {}", self.name(buyer), card, best.amount);
        self.note(line);
    }

    fn exchange(&mut self, payload: Option<Value>) {
        let Some(ExchangeProposal { with, give, take }) = parse("exchange", payload) else {
            return;
        };
        if self.phase != Phase::Idle {
            return ignore("exchange", "finish the current action first");
        }
        if !self.is_opponent(with) {
            return ignore("exchange", "pick another player");
        }
        if !self.players[self.turn].owns(&give) || !self.players[with].owns(&take) {
            return ignore("exchange", "both cards must be owned");
        }
        let line = format!(
            "{} offers {} a {} for a {}",
            self.name(self.turn),
            self.name(with),
            give,
            take
        );
        self.phase = Phase::Exchange { with, give, take };
        self.note(line);
    }

    fn exchange_accept(&mut self, _: Option<Value>) {
        let Phase::Exchange { with, give, take } = self.phase.clone() else {
            return ignore("exchange accept", "no exchange offered");
        };
        let me = self.turn;
        if let (Some(given), Some(taken)) =
            (self.players[me].give_up(&give), self.players[with].give_up(&take))
        {
            self.players[with].animals.push(given);
            self.players[me].animals.push(taken);
        }
        self.end_turn();
        let line = format!("{} and {} swap cards", self.name(me), self.name(with));
        self.note(line);
    }

    fn cow_trade_start(&mut self, payload: Option<Value>) {
        let Some(CowTradeChallenge {
            with,
            animal,
            offer,
        }) = parse("cow trade", payload)
        else {
            return;
        };
        if self.phase != Phase::Idle {
            return ignore("cow trade", "finish the current action first");
        }
        if !self.is_opponent(with) {
            return ignore("cow trade", "pick another player");
        }
        if !self.players[self.turn].owns(&animal) || !self.players[with].owns(&animal) {
            return ignore("cow trade", "both players need that animal");
        }
        if offer > self.players[self.turn].money {
            return ignore("cow trade", "not enough money");
        }
        let line = format!(
            "{} challenges {} for a {}",
            self.name(self.turn),
            self.name(with),
            animal
        );
        self.phase = Phase::CowTrade {
            with,
            animal,
            offer,
        };
        self.note(line);
    }

    fn cow_trade_respond(&mut self, payload: Option<Value>) {
        let Some(CowTradeAnswer { offer: counter }) = parse("cow trade response", payload) else {
            return;
        };
        let Phase::CowTrade {
            with,
            animal,
            offer,
        } = self.phase.clone()
        else {
            return ignore("cow trade response", "no cow trade running");
        };
        if counter > self.players[with].money {
            return ignore("cow trade response", "not enough money");
        }
        let me = self.turn;
        // Offers change hands; the higher one wins the animal, ties go to the
        // challenger.
        self.players[me].money = self.players[me].money - offer + counter;
        self.players[with].money = self.players[with].money - counter + offer;
        let (winner, loser) = if offer >= counter { (me, with) } else { (with, me) };
        if let Some(card) = self.players[loser].give_up(&animal) {
            self.players[winner].animals.push(card);
        }
        self.end_turn();
        let line = format!("{} wins the {}", self.name(winner), animal);
        self.note(line);
    }
}
