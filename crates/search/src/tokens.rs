use std::collections::HashSet;
use unicode_segmentation::UnicodeSegmentation;

/// Query tokens used for relation matching.
///
/// The query is cut at any character that cannot appear in an identifier; an
/// identifier such as `parseConfig` or `std::fs::read` is kept whole and also
/// split on `_`, `.`, `::` and camelCase humps. Tokens are case-folded unless
/// `case_sensitive`, deduplicated, and keep first-occurrence order.
#[must_use]
pub fn query_tokens(query: &str, case_sensitive: bool) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    let mut push = |token: &str| {
        if token.is_empty() {
            return;
        }
        let token = fold(token, case_sensitive);
        if seen.insert(token.clone()) {
            out.push(token);
        }
    };

    let pieces = query
        .split(|c: char| !(c.is_alphanumeric() || c == '_' || c == '.' || c == ':'))
        .map(|piece| piece.trim_matches(|c: char| c == '.' || c == ':'))
        .filter(|piece| !piece.is_empty());
    for piece in pieces {
        let parts = split_identifier(piece);
        if parts.len() > 1 {
            push(piece);
        }
        for part in &parts {
            push(part);
        }
    }
    out
}

/// Plain word sequence of the query, in order and with repeats, for phrase
/// matching.
#[must_use]
pub fn query_words(query: &str, case_sensitive: bool) -> Vec<String> {
    query
        .unicode_words()
        .map(|word| fold(word, case_sensitive))
        .collect()
}

/// Case-folds `token` unless matching is case-sensitive.
#[must_use]
pub fn fold(token: &str, case_sensitive: bool) -> String {
    if case_sensitive {
        token.to_string()
    } else {
        token.to_lowercase()
    }
}

/// Splits an identifier into its word parts, preserving case.
///
/// - "getUserName" -> ["get", "User", "Name"]
/// - "get_user.name" -> ["get", "user", "name"]
/// - "HTTPServer" -> ["HTTP", "Server"]
pub(crate) fn split_identifier(ident: &str) -> Vec<String> {
    let mut parts = Vec::new();
    for segment in ident
        .split(|c: char| c == '_' || c == '.' || c == ':')
        .filter(|s| !s.is_empty())
    {
        for word in segment.unicode_words() {
            split_camel(word, &mut parts);
        }
    }
    parts
}

fn split_camel(word: &str, parts: &mut Vec<String>) {
    let chars: Vec<char> = word.chars().collect();
    let mut current = String::new();
    for (i, &ch) in chars.iter().enumerate() {
        if ch.is_uppercase() && !current.is_empty() {
            let next_is_lower = chars.get(i + 1).is_some_and(|c| c.is_lowercase());
            let prev_is_upper = current.chars().last().is_some_and(char::is_uppercase);
            if next_is_lower || !prev_is_upper {
                parts.push(std::mem::take(&mut current));
            }
        }
        current.push(ch);
    }
    if !current.is_empty() {
        parts.push(current);
    }
}
