/// Turns a raw `scope` parameter into an ordered set of scope tokens.
pub trait ScopeProvider: Send + Sync {
    fn parse_scopes(&self, raw: &str) -> Vec<String>;
}

/// RFC 6749 §3.3 parsing: whitespace-delimited, empties dropped, duplicates
/// removed keeping the first occurrence.
#[derive(Debug, Clone, Copy, Default)]
pub struct WhitespaceScopeParser;

impl ScopeProvider for WhitespaceScopeParser {
    fn parse_scopes(&self, raw: &str) -> Vec<String> {
        parse_scopes(raw)
    }
}

pub fn parse_scopes(raw: &str) -> Vec<String> {
    let mut scopes: Vec<String> = Vec::new();
    for token in raw.split_whitespace() {
        if !scopes.iter().any(|s| s == token) {
            scopes.push(token.to_string());
        }
    }
    scopes
}

/// Space-joined form used in token responses.
pub fn format_scopes(scopes: &[String]) -> String {
    scopes.join(" ")
}

/// Requested ∩ entitled, in request order. An empty request means the full
/// entitlement.
pub fn negotiate_scopes(requested: &[String], entitled: &[String]) -> Vec<String> {
    if requested.is_empty() {
        return entitled.to_vec();
    }
    requested
        .iter()
        .filter(|scope| entitled.contains(scope))
        .cloned()
        .collect()
}
