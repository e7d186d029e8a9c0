//! Security response headers.
//!
//! # Responsibilities
//! - Compile the configured header set once per policy snapshot
//! - Stamp every response (forwarded or synthetic) with the full set
//!
//! # Design Decisions
//! - Configured values replace whatever the origin sent for the same name
//! - Invalid names/values are rejected at compile time, never at request time

use std::collections::BTreeMap;

use axum::http::{HeaderMap, HeaderName, HeaderValue};

#[derive(Debug, Clone, Default)]
pub struct SecurityHeaders {
    headers: Vec<(HeaderName, HeaderValue)>,
}

impl SecurityHeaders {
    /// Compile from config. Fails with the offending header name.
    pub fn compile(configured: &BTreeMap<String, String>) -> Result<Self, String> {
        let mut headers = Vec::with_capacity(configured.len());
        for (name, value) in configured {
            let header_name =
                HeaderName::from_bytes(name.as_bytes()).map_err(|_| name.clone())?;
            let header_value = HeaderValue::from_str(value).map_err(|_| name.clone())?;
            headers.push((header_name, header_value));
        }
        Ok(Self { headers })
    }

    pub fn apply(&self, target: &mut HeaderMap) {
        for (name, value) in &self.headers {
            target.insert(name.clone(), value.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }
}
