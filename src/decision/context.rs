//! Per-request inputs to the decision engine.

use std::net::IpAddr;

/// A signal that was missing or unusable and replaced by a default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalFallback {
    MissingBotScore,
    MalformedBotScore(String),
    MalformedCountry(String),
}

impl SignalFallback {
    pub fn signal(&self) -> &'static str {
        match self {
            SignalFallback::MissingBotScore | SignalFallback::MalformedBotScore(_) => "bot_score",
            SignalFallback::MalformedCountry(_) => "country",
        }
    }

    pub fn raw_value(&self) -> Option<&str> {
        match self {
            SignalFallback::MissingBotScore => None,
            SignalFallback::MalformedBotScore(raw) | SignalFallback::MalformedCountry(raw) => {
                Some(raw)
            }
        }
    }
}

/// Everything the engine needs to know about one request, already
/// normalized. The body is passed separately so it is never copied.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    pub method: String,
    pub path: String,
    /// Path plus query, as received.
    pub target: String,
    pub address: IpAddr,
    /// Opaque principal identifier; never the raw credential.
    pub principal: Option<String>,
    /// Normalized two-letter code; `None` when unknown.
    pub country: Option<String>,
    /// `None` when the edge sent no usable score.
    pub bot_score: Option<u8>,
    pub verified_bot: bool,
    pub fallbacks: Vec<SignalFallback>,
}

impl RequestContext {
    pub fn new(method: &str, target: &str, address: IpAddr) -> Self {
        let path = target.split('?').next().unwrap_or("/");
        Self {
            request_id: String::new(),
            method: method.to_string(),
            path: if path.is_empty() { "/" } else { path }.to_string(),
            target: target.to_string(),
            address,
            principal: None,
            country: None,
            bot_score: None,
            verified_bot: false,
            fallbacks: Vec::new(),
        }
    }

    pub fn with_country(mut self, country: &str) -> Self {
        self.country = Some(country.to_string());
        self
    }

    pub fn with_bot_score(mut self, score: u8) -> Self {
        self.bot_score = Some(score);
        self
    }

    pub fn verified(mut self) -> Self {
        self.verified_bot = true;
        self
    }

    pub fn with_principal(mut self, principal: &str) -> Self {
        self.principal = Some(principal.to_string());
        self
    }
}
