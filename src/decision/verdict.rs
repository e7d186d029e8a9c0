//! Pure precedence function over classifier outputs.

use serde::Serialize;

use crate::audit::EventType;
use crate::security::{LimitPass, SignatureMatch, Verdict};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Allow,
    Challenge,
    Block,
    RateLimited,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Allow => "allow",
            Action::Challenge => "challenge",
            Action::Block => "block",
            Action::RateLimited => "rate_limited",
        }
    }
}

/// Which classifier produced the decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cause {
    Attack(SignatureMatch),
    GeoBlocked,
    GeoChallenged,
    RateLimited(LimitPass),
    BotBlocked,
    BotChallenged,
    Clean,
}

impl Cause {
    pub fn as_str(&self) -> &'static str {
        self.event_type().as_str()
    }

    pub fn event_type(&self) -> EventType {
        match self {
            Cause::Attack(_) => EventType::AttackBlocked,
            Cause::GeoBlocked => EventType::GeoBlocked,
            Cause::GeoChallenged => EventType::GeoChallenged,
            Cause::RateLimited(_) => EventType::RateLimited,
            Cause::BotBlocked => EventType::BotBlocked,
            Cause::BotChallenged => EventType::BotChallenged,
            Cause::Clean => EventType::Allowed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub action: Action,
    pub reason: String,
    pub retry_after_secs: Option<u64>,
    pub cause: Cause,
}

impl Decision {
    /// The pass that triggered a rate-limited decision.
    pub fn limit_pass(&self) -> Option<&LimitPass> {
        match &self.cause {
            Cause::RateLimited(pass) => Some(pass),
            _ => None,
        }
    }
}

/// Classifier outputs for one request.
#[derive(Debug, Clone)]
pub struct Verdicts {
    pub attack: Option<SignatureMatch>,
    pub geo: Verdict,
    /// The exceeded limiter pass, if any.
    pub rate_limit: Option<LimitPass>,
    pub bot: Verdict,
    pub country: Option<String>,
    pub bot_score: u8,
}

impl Default for Verdicts {
    fn default() -> Self {
        Self {
            attack: None,
            geo: Verdict::Allow,
            rate_limit: None,
            bot: Verdict::Allow,
            country: None,
            bot_score: 100,
        }
    }
}

/// Apply the fixed precedence: attack, geo block, geo challenge, rate
/// limit, bot block, bot challenge, allow.
pub fn decide(verdicts: Verdicts, challenge_retry_after_secs: u64) -> Decision {
    let country = verdicts.country.as_deref().unwrap_or("an unknown location");

    if let Some(hit) = verdicts.attack {
        return Decision {
            action: Action::Block,
            reason: format!("Request matched attack signature '{}'", hit.signature),
            retry_after_secs: None,
            cause: Cause::Attack(hit),
        };
    }

    match verdicts.geo {
        Verdict::Block => {
            return Decision {
                action: Action::Block,
                reason: format!("Access to this route is not permitted from {country}"),
                retry_after_secs: None,
                cause: Cause::GeoBlocked,
            }
        }
        Verdict::Challenge => {
            return Decision {
                action: Action::Challenge,
                reason: format!("Access to this route from {country} requires verification"),
                retry_after_secs: Some(challenge_retry_after_secs),
                cause: Cause::GeoChallenged,
            }
        }
        Verdict::Allow => {}
    }

    if let Some(pass) = verdicts.rate_limit {
        return Decision {
            action: Action::RateLimited,
            reason: pass.reason(),
            retry_after_secs: Some(pass.retry_after_secs),
            cause: Cause::RateLimited(pass),
        };
    }

    match verdicts.bot {
        Verdict::Block => Decision {
            action: Action::Block,
            reason: format!("Automated traffic detected (bot score {})", verdicts.bot_score),
            retry_after_secs: None,
            cause: Cause::BotBlocked,
        },
        Verdict::Challenge => Decision {
            action: Action::Challenge,
            reason: format!(
                "Suspected automated traffic (bot score {}) requires verification",
                verdicts.bot_score
            ),
            retry_after_secs: Some(challenge_retry_after_secs),
            cause: Cause::BotChallenged,
        },
        Verdict::Allow => Decision {
            action: Action::Allow,
            reason: "ok".to_string(),
            retry_after_secs: None,
            cause: Cause::Clean,
        },
    }
}
