//! Bot-score classification.
//!
//! The score (0-100, higher is more human) and the verified-bot flag come
//! from the edge; nothing is inferred here.

use crate::config::BotThresholds;
use crate::security::Verdict;

#[derive(Debug, Clone, Copy)]
pub struct BotPolicy {
    thresholds: BotThresholds,
}

impl BotPolicy {
    pub fn new(thresholds: BotThresholds) -> Self {
        Self { thresholds }
    }

    pub fn evaluate(&self, score: u8, verified_bot: bool) -> Verdict {
        if verified_bot {
            return Verdict::Allow;
        }
        if score < self.thresholds.block_below {
            Verdict::Block
        } else if score < self.thresholds.challenge_below {
            Verdict::Challenge
        } else {
            Verdict::Allow
        }
    }
}
