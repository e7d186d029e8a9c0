//! Attack signature scanner.
//!
//! Matches the request target and a bounded prefix of the body against the
//! configured signatures, each both raw and with form encoding removed. A
//! match is terminal: the request is blocked regardless of any other signal.

use regex::{RegexSet, RegexSetBuilder};

use crate::config::SignatureConfig;

/// Where a signature matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchLocation {
    Target,
    Body,
}

impl MatchLocation {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchLocation::Target => "target",
            MatchLocation::Body => "body",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureMatch {
    pub signature: String,
    pub location: MatchLocation,
}

/// Compiled, case-insensitive signature set.
#[derive(Debug, Clone)]
pub struct AttackSignatures {
    set: RegexSet,
    names: Vec<String>,
    body_scan_limit: usize,
}

impl AttackSignatures {
    /// Compile signatures. Fails with the offending signature name.
    pub fn compile(
        signatures: &[SignatureConfig],
        body_scan_limit: usize,
    ) -> Result<Self, (String, regex::Error)> {
        // Compile individually first so a failure names its signature.
        for sig in signatures {
            if let Err(e) = RegexSetBuilder::new([sig.pattern.as_str()])
                .case_insensitive(true)
                .build()
            {
                return Err((sig.name.clone(), e));
            }
        }

        let set = RegexSetBuilder::new(signatures.iter().map(|s| s.pattern.as_str()))
            .case_insensitive(true)
            .build()
            .map_err(|e| ("<set>".to_string(), e))?;

        Ok(Self {
            set,
            names: signatures.iter().map(|s| s.name.clone()).collect(),
            body_scan_limit,
        })
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Scan a request target (path + query) and body. The body is only read,
    /// never consumed, and only its first `body_scan_limit` bytes are inspected.
    pub fn scan(&self, target: &str, body: &[u8]) -> Option<SignatureMatch> {
        if self.is_empty() {
            return None;
        }

        if let Some(signature) = self.first_match(target) {
            return Some(SignatureMatch { signature, location: MatchLocation::Target });
        }

        let query = target.split_once('?').map(|(_, query)| query);
        if let Some(decoded) = query.and_then(decode_form) {
            if let Some(signature) = self.first_match(&decoded) {
                return Some(SignatureMatch { signature, location: MatchLocation::Target });
            }
        }

        let prefix = &body[..body.len().min(self.body_scan_limit)];
        if prefix.is_empty() {
            return None;
        }
        let text = String::from_utf8_lossy(prefix);
        let signature = self
            .first_match(&text)
            .or_else(|| decode_form(&text).and_then(|decoded| self.first_match(&decoded)))?;
        Some(SignatureMatch { signature, location: MatchLocation::Body })
    }

    /// Convenience form of [`scan`](Self::scan).
    pub fn is_match(&self, target: &str, body: &[u8]) -> bool {
        self.scan(target, body).is_some()
    }

    fn first_match(&self, haystack: &str) -> Option<String> {
        self.set
            .matches(haystack)
            .iter()
            .next()
            .map(|idx| self.names[idx].clone())
    }
}

/// Form-encoded text (query string or form body) with percent and `+`
/// encoding removed, if it has any.
fn decode_form(encoded: &str) -> Option<String> {
    if !encoded.contains('%') && !encoded.contains('+') {
        return None;
    }
    let decoded = url::form_urlencoded::parse(encoded.as_bytes())
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");
    Some(decoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::default_signatures;

    fn scanner() -> AttackSignatures {
        AttackSignatures::compile(&default_signatures(), 64).unwrap()
    }

    #[test]
    fn test_clean_requests_pass() {
        let s = scanner();
        assert!(!s.is_match("/api/users?page=2&sort=name", b""));
        assert!(!s.is_match(
            "/api/auth/login",
            br#"{"email":"ana@example.com","password":"hunter2"}"#
        ));
        assert!(!s.is_match("/blog/select-a-union-rep", b"Union members select a rep."));
    }

    #[test]
    fn test_target_signatures() {
        let s = scanner();
        assert_eq!(
            s.scan("/items?id=1 UNION SELECT password FROM users", b"")
                .unwrap()
                .signature,
            "sqli_union_select"
        );
        assert!(s.is_match("/static/../../etc/passwd", b""));
        assert!(s.is_match("/search?q=<ScRiPt>alert(1)</script>", b""));
        assert!(s.is_match("/ping?host=127.0.0.1;cat /etc/hosts", b""));
    }

    #[test]
    fn test_encoded_query_is_decoded() {
        let s = scanner();
        let hit = s.scan("/search?q=%27%20or%20%271%27%3D%271", b"").unwrap();
        assert_eq!(hit.signature, "sqli_tautology");
        assert_eq!(hit.location, MatchLocation::Target);
    }

    #[test]
    fn test_form_encoded_body_is_decoded() {
        let s = scanner();
        let hit = s
            .scan("/api/search", b"q=%27%20or%20%271%27%3D%271")
            .unwrap();
        assert_eq!(hit.signature, "sqli_tautology");
        assert_eq!(hit.location, MatchLocation::Body);

        assert!(!s.is_match("/api/search", b"q=rust%20gateways&page=2"));
    }

    #[test]
    fn test_body_scan_is_bounded() {
        let s = scanner();
        let hit = s.scan("/api/comments", b"{\"text\":\"<script>x</script>\"}").unwrap();
        assert_eq!(hit.location, MatchLocation::Body);

        // Payload beyond the 64 byte prefix is not inspected.
        let mut body = vec![b'a'; 100];
        body.extend_from_slice(b"<script>");
        assert!(!s.is_match("/api/comments", &body));
    }

    #[test]
    fn test_bad_pattern_names_signature() {
        let err = AttackSignatures::compile(
            &[SignatureConfig { name: "bad".to_string(), pattern: "[".to_string() }],
            0,
        )
        .unwrap_err();
        assert_eq!(err.0, "bad");
    }
}
