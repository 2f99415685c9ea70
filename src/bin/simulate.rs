//! Observation Stream Simulation
//!
//! Generates a noisy perception stream for exercising the cascade advisor.
//! Each simulated hand keeps its identity fields steady while the board
//! grows and the pot climbs, with injected perception faults:
//! - Low-confidence frames (blurred capture)
//! - Misread pot values (pot appears to shrink mid-hand)
//! - New hands (identity change, which resets validator history)
//!
//! # Usage
//! ```bash
//! ./simulate --hands 20 --interval-ms 800 | ./cascade-advisor --stdin
//! ./simulate --hands 50 --interval-ms 0 --seed 7 > session.jsonl
//! ```

use cascade_advisor::Observation;
use clap::Parser;
use rand::prelude::*;
use rand::rngs::StdRng;
use std::io::{self, Write};
use std::time::Duration;

// ============================================================================
// Constants
// ============================================================================

const RANKS: &[char] = &['2', '3', '4', '5', '6', '7', '8', '9', 'T', 'J', 'Q', 'K', 'A'];
const SUITS: &[char] = &['s', 'h', 'd', 'c'];
const POSITIONS: &[&str] = &["UTG", "MP", "CO", "BTN", "SB", "BB"];
/// Cards revealed per street: flop, turn, river.
const STREETS: &[usize] = &[0, 3, 4, 5];
/// Big blind used for pot and stack sizes.
const BIG_BLIND: f64 = 2.0;

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "simulate")]
#[command(about = "Noisy observation stream for cascade advisor testing")]
#[command(version)]
struct Args {
    /// Number of hands to simulate
    #[arg(long, default_value = "10", value_parser = clap::value_parser!(u32).range(1..=10_000))]
    hands: u32,

    /// Delay between frames in milliseconds (0 = write everything at once)
    #[arg(long, default_value = "1000")]
    interval_ms: u64,

    /// Probability of a blurred, low-confidence frame
    #[arg(long, default_value = "0.1")]
    blur_rate: f64,

    /// Probability of a misread pot within a hand
    #[arg(long, default_value = "0.05")]
    misread_rate: f64,

    /// Random seed for reproducibility
    #[arg(long)]
    seed: Option<u64>,
}

// ============================================================================
// Hand Model
// ============================================================================

struct Hand {
    position: &'static str,
    hole_cards: Vec<String>,
    community: Vec<String>,
    pot: f64,
    stack: f64,
}

impl Hand {
    fn deal(rng: &mut StdRng) -> Self {
        let mut deck: Vec<String> = RANKS
            .iter()
            .flat_map(|r| SUITS.iter().map(move |s| format!("{r}{s}")))
            .collect();
        deck.shuffle(rng);
        let hole_cards = deck.drain(..2).collect();
        let community = deck.drain(..5).collect();
        let position = POSITIONS.choose(rng).copied().unwrap_or("BTN");
        Self {
            position,
            hole_cards,
            community,
            pot: BIG_BLIND * 1.5,
            stack: BIG_BLIND * rng.gen_range(40.0..150.0_f64).round(),
        }
    }

    /// Coarse class used as the strategy-table key, e.g. "AKs", "TT", "72o".
    fn hand_class(&self) -> String {
        let rank_of = |card: &String| card.chars().next().unwrap_or('2');
        let suit_of = |card: &String| card.chars().nth(1).unwrap_or('s');
        let (a, b) = (&self.hole_cards[0], &self.hole_cards[1]);
        let idx = |c: char| RANKS.iter().position(|r| *r == c).unwrap_or(0);
        let (hi, lo) = if idx(rank_of(a)) >= idx(rank_of(b)) {
            (rank_of(a), rank_of(b))
        } else {
            (rank_of(b), rank_of(a))
        };
        if hi == lo {
            format!("{hi}{lo}")
        } else if suit_of(a) == suit_of(b) {
            format!("{hi}{lo}s")
        } else {
            format!("{hi}{lo}o")
        }
    }

    fn frame(&self, sequence: u64, street: usize, pot: f64, confidence: f64) -> Observation {
        let board: Vec<&str> = self.community[..STREETS[street]]
            .iter()
            .map(String::as_str)
            .collect();
        let hole: Vec<&str> = self.hole_cards.iter().map(String::as_str).collect();
        Observation::new(sequence)
            .with_field("position", self.position, confidence)
            .with_field("hole_cards", hole, confidence)
            .with_field("hand_class", self.hand_class().as_str(), confidence)
            .with_field("board", board, confidence)
            .with_field("pot", pot, confidence)
            .with_field("stack", self.stack, confidence)
    }
}

// ============================================================================
// Main
// ============================================================================

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let interval = Duration::from_millis(args.interval_ms);
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut sequence = 0u64;

    for hand_no in 1..=args.hands {
        let mut hand = Hand::deal(&mut rng);
        eprintln!(
            "hand {hand_no}: {} {} ({})",
            hand.position,
            hand.hole_cards.join(" "),
            hand.hand_class()
        );

        for street in 0..STREETS.len() {
            // A couple of frames per street as the pot grows.
            for _ in 0..rng.gen_range(1..=3) {
                sequence += 1;
                hand.pot += BIG_BLIND * rng.gen_range(0..=4) as f64;

                let confidence = if rng.gen_bool(args.blur_rate.clamp(0.0, 1.0)) {
                    rng.gen_range(0.2..0.6)
                } else {
                    rng.gen_range(0.8..0.99)
                };
                let shown_pot = if rng.gen_bool(args.misread_rate.clamp(0.0, 1.0)) {
                    (hand.pot * 0.5).floor()
                } else {
                    hand.pot
                };

                let obs = hand.frame(sequence, street, shown_pot, confidence);
                writeln!(out, "{}", serde_json::to_string(&obs)?)?;
                out.flush()?;

                if !interval.is_zero() {
                    std::thread::sleep(interval);
                }
            }
        }
    }

    eprintln!("{sequence} observations written");
    Ok(())
}
