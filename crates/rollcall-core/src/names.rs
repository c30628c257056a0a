//! Name, email and phone normalization shared by extraction and retrieval.
//!
//! Every "is this the person they asked for" decision goes through here so
//! the extractor's idea of a name-shaped query and the retriever's exact-match
//! override never drift apart.

use crate::patterns;

/// Honorifics dropped before comparing names.
pub const HONORIFICS: &[&str] = &[
    "mr", "mrs", "ms", "miss", "mx", "dr", "prof", "shri", "sri", "smt", "thiru", "thirumathi",
    "selvi", "er", "adv", "ca", "capt", "col", "sir", "madam",
];

/// How a query matched a member name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MatchKind {
    /// A single query token equal to the first or last name token.
    Token,
    /// Full name, a consecutive run of name tokens, email or phone.
    Full,
}

/// Lower-cased name tokens with honorifics and single-letter initials removed.
///
/// # Examples
///
/// ```
/// use rollcall_core::names::name_tokens;
///
/// assert_eq!(name_tokens("Mrs. Fatima Mary"), vec!["fatima", "mary"]);
/// assert_eq!(name_tokens("Raj Sivakumar K"), vec!["raj", "sivakumar"]);
/// assert_eq!(name_tokens("R.K. Narayan"), vec!["narayan"]);
/// ```
pub fn name_tokens(name: &str) -> Vec<String> {
    name.split(|c: char| c.is_whitespace() || c == '.' || c == ',')
        .map(|token| {
            token
                .chars()
                .filter(|c| c.is_alphanumeric())
                .flat_map(char::to_lowercase)
                .collect::<String>()
        })
        .filter(|token| token.chars().count() > 1 && !HONORIFICS.contains(&token.as_str()))
        .collect()
}

/// Trimmed, lower-cased email.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Digits of a phone number, punctuation and spaces stripped.
///
/// # Examples
///
/// ```
/// use rollcall_core::names::normalize_phone;
///
/// assert_eq!(normalize_phone("+91 98400-12345"), "919840012345");
/// ```
pub fn normalize_phone(phone: &str) -> String {
    phone.chars().filter(char::is_ascii_digit).collect()
}

/// `true` if the text is shaped like an email address.
pub fn looks_like_email(text: &str) -> bool {
    let text = text.trim();
    match text.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !text.contains(char::is_whitespace)
        }
        None => false,
    }
}

/// `true` if the text is a phone number: at least seven digits and nothing
/// but digits, spaces, `+`, `-`, `(` and `)`.
pub fn looks_like_phone(text: &str) -> bool {
    let text = text.trim();
    normalize_phone(text).len() >= 7
        && text
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, ' ' | '+' | '-' | '(' | ')'))
}

/// Compare a query against a member name.
///
/// # Examples
///
/// ```
/// use rollcall_core::names::{match_name, MatchKind};
///
/// assert_eq!(match_name("Fatima Mary", "Mrs. Fatima Mary"), Some(MatchKind::Full));
/// assert_eq!(match_name("Sivakumar", "Raj Sivakumar K"), Some(MatchKind::Token));
/// assert_eq!(match_name("Sivakumar", "Anand Sivakumar Raj"), None);
/// ```
pub fn match_name(query: &str, name: &str) -> Option<MatchKind> {
    let query = name_tokens(query);
    let name = name_tokens(name);
    if query.is_empty() || name.is_empty() {
        return None;
    }
    if query == name {
        return Some(MatchKind::Full);
    }
    if query.len() == 1 {
        let token = &query[0];
        let first_or_last = name.first() == Some(token) || name.last() == Some(token);
        return first_or_last.then_some(MatchKind::Token);
    }
    if name.windows(query.len()).any(|run| run == query.as_slice()) {
        return Some(MatchKind::Full);
    }
    let aligned = name.len() >= 2 && query[0] == name[0] && query[1] == name[1];
    if aligned && query.iter().all(|token| name.contains(token)) {
        return Some(MatchKind::Full);
    }
    None
}

/// `true` if the query equals the member's email (ignoring case) or phone
/// (ignoring punctuation).
pub fn match_contact(query: &str, email: Option<&str>, phone: Option<&str>) -> bool {
    if looks_like_email(query) {
        return email.is_some_and(|e| normalize_email(e) == normalize_email(query));
    }
    if looks_like_phone(query) {
        let wanted = normalize_phone(query);
        return phone.is_some_and(|p| normalize_phone(p) == wanted);
    }
    false
}

/// Full exact-match check: contact first, then name.
pub fn exact_match(
    query: &str,
    name: &str,
    email: Option<&str>,
    phone: Option<&str>,
) -> Option<MatchKind> {
    if match_contact(query, email, phone) {
        return Some(MatchKind::Full);
    }
    match_name(query, name)
}

fn is_title_case(token: &str) -> bool {
    let mut chars = token.chars();
    match chars.next() {
        Some(first) if first.is_uppercase() => {
            let rest: Vec<char> = chars.collect();
            !rest.is_empty() && rest.iter().all(|c| c.is_lowercase())
        }
        _ => false,
    }
}

/// `true` if the raw query contains two consecutive title-cased words,
/// e.g. "... number of Fatima Mary".
///
/// # Examples
///
/// ```
/// use rollcall_core::names::has_name_shaped_substring;
///
/// assert!(has_name_shaped_substring("contact of Fatima Mary please"));
/// assert!(!has_name_shaped_substring("who is sivakumar"));
/// ```
pub fn has_name_shaped_substring(raw: &str) -> bool {
    let tokens: Vec<&str> = raw
        .split_whitespace()
        .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric()))
        .collect();
    tokens
        .windows(2)
        .any(|pair| is_title_case(pair[0]) && is_title_case(pair[1]))
}

/// `true` when a cleaned query looks like a bare person name: one to three
/// tokens, no digits, no `@`, no punctuation other than `.`, `'` and `-`,
/// and no directory vocabulary.
///
/// # Examples
///
/// ```
/// use rollcall_core::names::looks_like_person_name;
///
/// assert!(looks_like_person_name("Fatima Mary"));
/// assert!(looks_like_person_name("sivakumar"));
/// assert!(!looks_like_person_name("python developers chennai"));
/// assert!(!looks_like_person_name("1995 batch"));
/// ```
pub fn looks_like_person_name(cleaned: &str) -> bool {
    let tokens: Vec<&str> = cleaned.split_whitespace().collect();
    if tokens.is_empty() || tokens.len() > 3 {
        return false;
    }
    let shaped = cleaned
        .chars()
        .all(|c| c.is_alphabetic() || c.is_whitespace() || matches!(c, '.' | '\'' | '-'));
    shaped && !patterns::contains_domain_vocabulary(&cleaned.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn honorifics_and_initials_are_ignored() {
        assert_eq!(name_tokens("Dr. K. Anand"), vec!["anand"]);
        assert_eq!(name_tokens("Shri  Venkat  Raman"), vec!["venkat", "raman"]);
        assert!(name_tokens("Mr.").is_empty());
    }

    #[test]
    fn multi_token_runs_and_alignment() {
        assert_eq!(
            match_name("sivakumar raj", "Anand Sivakumar Raj"),
            Some(MatchKind::Full)
        );
        assert_eq!(
            match_name("priya raman iyer", "Priya Raman Venkatesh Iyer"),
            Some(MatchKind::Full)
        );
        assert_eq!(match_name("raman priya", "Priya Raman"), None);
    }

    #[test]
    fn single_token_matches_first_or_last_only() {
        assert_eq!(match_name("sivakumar", "Sivakumar Raj"), Some(MatchKind::Token));
        assert_eq!(match_name("raj", "Sivakumar Raj"), Some(MatchKind::Token));
        assert_eq!(match_name("kumar", "Sivakumar Raj"), None);
    }

    #[test]
    fn single_token_name_is_full_match() {
        assert_eq!(match_name("Madonna", "Madonna"), Some(MatchKind::Full));
    }

    #[test]
    fn contact_matching() {
        assert!(match_contact(
            "Fatima@Example.com",
            Some("fatima@example.com"),
            None
        ));
        assert!(match_contact("98400 12345", None, Some("98400-12345")));
        assert!(!match_contact("98400 12345", None, Some("98400-12346")));
        assert!(!match_contact("fatima", Some("fatima@example.com"), None));
    }

    #[test]
    fn exact_match_prefers_contact() {
        assert_eq!(
            exact_match("a@b.co", "Someone Else", Some("A@B.co"), None),
            Some(MatchKind::Full)
        );
        assert_eq!(exact_match("x@y.io", "Someone Else", None, None), None);
    }

    #[test]
    fn name_shape_rejects_symbols() {
        assert!(looks_like_person_name("O'Brien"));
        assert!(looks_like_person_name("Anne-Marie D."));
        assert!(!looks_like_person_name("a@b.com"));
        assert!(!looks_like_person_name("one two three four"));
        assert!(!looks_like_person_name(""));
    }
}
