use rand::Rng;
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{Outcome, Rules};

/// Two six-sided dice. Doubles pay 3x, a total of 7 or 11 pays 2x.
#[derive(Debug, Default)]
pub struct Dice;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DiceRound {
    pub last_roll: Option<[u8; 2]>,
}

impl Dice {
    pub fn multiplier(roll: [u8; 2]) -> f64 {
        let total = roll[0] + roll[1];
        if roll[0] == roll[1] {
            3.0
        } else if total == 7 || total == 11 {
            2.0
        } else {
            0.0
        }
    }
}

impl Rules for Dice {
    type Round = DiceRound;

    fn play(&self, rng: &mut Pcg32, round: &mut DiceRound, bet: f64) -> Outcome {
        let roll = [rng.random_range(1..=6u8), rng.random_range(1..=6u8)];
        round.last_roll = Some(roll);
        Outcome {
            payout: bet * Self::multiplier(roll),
            detail: json!({ "roll": roll, "total": roll[0] + roll[1] }),
        }
    }

    fn features(&self) -> &'static [&'static str] {
        &["autoplay"]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_multipliers() {
        assert_eq!(Dice::multiplier([3, 3]), 3.0);
        assert_eq!(Dice::multiplier([6, 5]), 2.0);
        assert_eq!(Dice::multiplier([2, 5]), 2.0);
        assert_eq!(Dice::multiplier([1, 2]), 0.0);
    }

    #[test]
    fn test_play_records_roll() {
        let mut rng = Pcg32::seed_from_u64(42);
        let mut round = DiceRound::default();
        for _ in 0..100 {
            let outcome = Dice.play(&mut rng, &mut round, 10.0);
            let roll = round.last_roll.unwrap();
            assert!((1..=6).contains(&roll[0]) && (1..=6).contains(&roll[1]));
            assert_eq!(outcome.payout, 10.0 * Dice::multiplier(roll));
        }
    }
}
