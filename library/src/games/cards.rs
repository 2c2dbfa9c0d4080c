use rand::Rng;
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{Outcome, Rules};

/// High card against the house. Higher rank pays 2x, a tie returns the bet.
#[derive(Debug, Default)]
pub struct HighCard;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hand {
    pub player: u8,
    pub house: u8,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CardRound {
    pub last_hand: Option<Hand>,
    pub streak: u32,
}

/// Ranks 2 through 14, aces high.
const RANKS: [&str; 13] = [
    "2", "3", "4", "5", "6", "7", "8", "9", "10", "J", "Q", "K", "A",
];

fn rank_name(rank: u8) -> &'static str {
    RANKS[usize::from(rank.clamp(2, 14) - 2)]
}

impl Rules for HighCard {
    type Round = CardRound;

    fn play(&self, rng: &mut Pcg32, round: &mut CardRound, bet: f64) -> Outcome {
        let hand = Hand {
            player: rng.random_range(2..=14u8),
            house: rng.random_range(2..=14u8),
        };
        round.last_hand = Some(hand);

        let payout = match hand.player.cmp(&hand.house) {
            std::cmp::Ordering::Greater => {
                round.streak += 1;
                bet * 2.0
            }
            std::cmp::Ordering::Equal => bet,
            std::cmp::Ordering::Less => {
                round.streak = 0;
                0.0
            }
        };

        Outcome {
            payout,
            detail: json!({
                "player": rank_name(hand.player),
                "house": rank_name(hand.house),
                "streak": round.streak,
            }),
        }
    }
}
