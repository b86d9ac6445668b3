//! Path matching logic.
//!
//! # Responsibilities
//! - Compile a route's path pattern according to its match type
//! - Match a request path and extract path parameters
//! - Report the literal length used for tie-breaking
//!
//! # Design Decisions
//! - Path matching is case-sensitive
//! - Exact and prefix patterns may contain `{name}` or `:name` segments
//! - Regex patterns must match the whole path; named groups become params
//! - Prefix matches expose the unmatched remainder as the `*` parameter,
//!   without a leading `/`, however the prefix is spelled

use std::collections::BTreeMap;

use axum::http::HeaderMap;
use regex::Regex;

use crate::model::MatchType;

/// Parameter name holding the remainder of a prefix match.
pub const REMAINDER_PARAM: &str = "*";

/// Extracted path parameters, ordered by name.
pub type PathParams = BTreeMap<String, String>;

/// Trait for matching a request path against a compiled pattern.
pub trait PathMatcher: Send + Sync + std::fmt::Debug {
    /// Returns the extracted parameters if the path matches.
    fn match_path(&self, path: &str) -> Option<PathParams>;

    /// Number of literal (non-parameter) characters in the pattern.
    fn literal_len(&self) -> usize;

    /// The literal path for parameter-free exact patterns.
    fn exact_literal(&self) -> Option<&str> {
        None
    }
}

/// Compile `pattern` for the given match type.
pub fn compile(pattern: &str, match_type: MatchType) -> Result<Box<dyn PathMatcher>, regex::Error> {
    Ok(match match_type {
        MatchType::Exact if has_params(pattern) => Box::new(SegmentMatcher::new(pattern, false)),
        MatchType::Exact => Box::new(ExactMatcher::new(pattern)),
        MatchType::Prefix if has_params(pattern) => Box::new(SegmentMatcher::new(pattern, true)),
        MatchType::Prefix => Box::new(PrefixMatcher::new(pattern)),
        MatchType::Regex => Box::new(RegexMatcher::new(pattern)?),
    })
}

fn param_name(segment: &str) -> Option<&str> {
    let name = if let Some(inner) = segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
        inner
    } else {
        segment.strip_prefix(':')?
    };
    let mut chars = name.chars();
    let first_ok = chars
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_')
        .unwrap_or(false);
    (first_ok && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')).then_some(name)
}

/// Remainder of a prefix match, normalized to carry no leading `/`.
fn remainder(rest: &str) -> Option<&str> {
    let rest = rest.strip_prefix('/').unwrap_or(rest);
    (!rest.is_empty()).then_some(rest)
}

fn has_params(pattern: &str) -> bool {
    pattern.split('/').any(|s| param_name(s).is_some())
}

/// Path equals the pattern.
#[derive(Debug, Clone)]
pub struct ExactMatcher {
    path: String,
}

impl ExactMatcher {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

impl PathMatcher for ExactMatcher {
    fn match_path(&self, path: &str) -> Option<PathParams> {
        (path == self.path).then(PathParams::new)
    }

    fn literal_len(&self) -> usize {
        self.path.len()
    }

    fn exact_literal(&self) -> Option<&str> {
        Some(&self.path)
    }
}

/// Path starts with the pattern.
#[derive(Debug, Clone)]
pub struct PrefixMatcher {
    prefix: String,
}

impl PrefixMatcher {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl PathMatcher for PrefixMatcher {
    fn match_path(&self, path: &str) -> Option<PathParams> {
        let rest = path.strip_prefix(self.prefix.as_str())?;
        let mut params = PathParams::new();
        if let Some(rest) = remainder(rest) {
            params.insert(REMAINDER_PARAM.to_string(), rest.to_string());
        }
        Some(params)
    }

    fn literal_len(&self) -> usize {
        self.prefix.len()
    }
}

#[derive(Debug, Clone)]
enum Segment {
    Literal(String),
    Param(String),
}

/// Segment-wise matching for patterns with named segments.
#[derive(Debug, Clone)]
pub struct SegmentMatcher {
    segments: Vec<Segment>,
    prefix: bool,
}

impl SegmentMatcher {
    pub fn new(pattern: &str, prefix: bool) -> Self {
        let trimmed = if prefix && pattern.len() > 1 {
            pattern.strip_suffix('/').unwrap_or(pattern)
        } else {
            pattern
        };
        let segments = trimmed
            .split('/')
            .map(|s| match param_name(s) {
                Some(name) => Segment::Param(name.to_string()),
                None => Segment::Literal(s.to_string()),
            })
            .collect();
        Self { segments, prefix }
    }
}

impl PathMatcher for SegmentMatcher {
    fn match_path(&self, path: &str) -> Option<PathParams> {
        let mut params = PathParams::new();
        let mut parts = path.split('/');
        let mut consumed = 0usize;

        for (i, segment) in self.segments.iter().enumerate() {
            let part = parts.next()?;
            match segment {
                Segment::Literal(lit) if lit == part => {}
                Segment::Param(name) if !part.is_empty() => {
                    params.insert(name.clone(), part.to_string());
                }
                _ => return None,
            }
            consumed += part.len() + usize::from(i > 0);
        }

        let rest = &path[consumed..];
        if rest.is_empty() {
            return Some(params);
        }
        if !self.prefix {
            return None;
        }
        if let Some(rest) = remainder(rest) {
            params.insert(REMAINDER_PARAM.to_string(), rest.to_string());
        }
        Some(params)
    }

    fn literal_len(&self) -> usize {
        let separators = self.segments.len().saturating_sub(1);
        separators
            + self
                .segments
                .iter()
                .map(|s| match s {
                    Segment::Literal(l) => l.len(),
                    Segment::Param(_) => 0,
                })
                .sum::<usize>()
    }
}

/// Path fully matches a regular expression.
#[derive(Debug, Clone)]
pub struct RegexMatcher {
    pattern: String,
    regex: Regex,
}

impl RegexMatcher {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        let regex = Regex::new(&format!("^(?:{})$", pattern))?;
        Ok(Self {
            pattern: pattern.to_string(),
            regex,
        })
    }
}

impl PathMatcher for RegexMatcher {
    fn match_path(&self, path: &str) -> Option<PathParams> {
        let caps = self.regex.captures(path)?;
        let params = self
            .regex
            .capture_names()
            .flatten()
            .filter_map(|name| caps.name(name).map(|m| (name.to_string(), m.as_str().to_string())))
            .collect();
        Some(params)
    }

    fn literal_len(&self) -> usize {
        self.pattern.len()
    }
}

/// True when the request asks for a websocket upgrade.
pub fn is_websocket_upgrade(headers: &HeaderMap) -> bool {
    headers
        .get("upgrade")
        .and_then(|h| h.to_str().ok())
        .map(|h| h.eq_ignore_ascii_case("websocket"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_exact_matcher() {
        let m = compile("/health", MatchType::Exact).unwrap();
        assert_eq!(m.match_path("/health"), Some(PathParams::new()));
        assert!(m.match_path("/health/").is_none());
        assert!(m.match_path("/HEALTH").is_none());
        assert_eq!(m.exact_literal(), Some("/health"));
    }

    #[test]
    fn test_prefix_matcher_remainder() {
        let m = compile("/v1/", MatchType::Prefix).unwrap();
        let params = m.match_path("/v1/users/7").unwrap();
        assert_eq!(params.get(REMAINDER_PARAM).map(String::as_str), Some("users/7"));
        assert!(m.match_path("/v1/").unwrap().is_empty());
        assert!(m.match_path("/v2/users").is_none());
        assert_eq!(m.literal_len(), 4);
    }

    #[test]
    fn test_named_segments_exact() {
        let m = compile("/users/{id}/orders/:order", MatchType::Exact).unwrap();
        let params = m.match_path("/users/42/orders/a1").unwrap();
        assert_eq!(params["id"], "42");
        assert_eq!(params["order"], "a1");
        assert!(m.match_path("/users//orders/a1").is_none());
        assert!(m.match_path("/users/42/orders/a1/x").is_none());
        assert!(m.exact_literal().is_none());
        assert_eq!(m.literal_len(), "/users//orders/".len());
    }

    #[test]
    fn test_named_segments_prefix() {
        let m = compile("/users/{id}/", MatchType::Prefix).unwrap();
        let params = m.match_path("/users/42/orders").unwrap();
        assert_eq!(params["id"], "42");
        assert_eq!(params[REMAINDER_PARAM], "orders");

        let params = m.match_path("/users/42").unwrap();
        assert!(!params.contains_key(REMAINDER_PARAM));
        assert!(m.match_path("/accounts/42").is_none());
    }

    #[test]
    fn test_remainder_form_is_independent_of_spelling() {
        let plain_slash = compile("/v1/", MatchType::Prefix).unwrap();
        let plain = compile("/v1", MatchType::Prefix).unwrap();
        let segment = compile("/v1/{ver}/", MatchType::Prefix).unwrap();
        let segment_bare = compile("/v1/{ver}", MatchType::Prefix).unwrap();

        assert_eq!(plain_slash.match_path("/v1/x/y").unwrap()[REMAINDER_PARAM], "x/y");
        assert_eq!(plain.match_path("/v1/x/y").unwrap()[REMAINDER_PARAM], "x/y");
        assert_eq!(segment.match_path("/v1/a/x/y").unwrap()[REMAINDER_PARAM], "x/y");
        assert_eq!(segment_bare.match_path("/v1/a/x/y").unwrap()[REMAINDER_PARAM], "x/y");

        assert!(!plain.match_path("/v1/").unwrap().contains_key(REMAINDER_PARAM));
        assert!(!segment.match_path("/v1/a/").unwrap().contains_key(REMAINDER_PARAM));
    }

    #[test]
    fn test_regex_matcher() {
        let m = compile(r"/items/(?P<id>\d+)(/.*)?", MatchType::Regex).unwrap();
        let params = m.match_path("/items/99/detail").unwrap();
        assert_eq!(params.len(), 1);
        assert_eq!(params["id"], "99");
        // Must match the whole path.
        assert!(m.match_path("/api/items/99").is_none());
        assert!(m.match_path("/items/x").is_none());
    }

    #[test]
    fn test_invalid_regex() {
        assert!(compile("/items/(", MatchType::Regex).is_err());
        // Valid on its own, but the comment swallows the anchoring group.
        assert!(compile("(?x)a #c", MatchType::Regex).is_err());
    }

    #[test]
    fn test_websocket_upgrade_detection() {
        let mut headers = HeaderMap::new();
        assert!(!is_websocket_upgrade(&headers));
        headers.insert("Upgrade", HeaderValue::from_static("WebSocket"));
        assert!(is_websocket_upgrade(&headers));
    }
}
