use rollcall_core::patterns::is_filler;

/// Strip filler words from a search phrase.
///
/// Falls back to the trimmed input when fewer than two characters would
/// remain.
///
/// # Examples
///
/// ```
/// use rollcall_search::clean_query;
///
/// assert_eq!(clean_query("Can you find me python developers in Chennai?"), "python developers Chennai");
/// assert_eq!(clean_query("who is he"), "who is he");
/// ```
pub fn clean_query(phrase: &str) -> String {
    let kept: Vec<&str> = phrase
        .split_whitespace()
        .map(|word| word.trim_matches(|c: char| matches!(c, '?' | '!' | ',' | ';' | ':')))
        .filter(|word| !word.is_empty() && !is_filler(&word.to_lowercase()))
        .collect();
    let cleaned = kept.join(" ");
    if cleaned.chars().count() < 2 {
        phrase.trim().to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_names_and_contacts() {
        assert_eq!(clean_query("who is Fatima Mary"), "Fatima Mary");
        assert_eq!(clean_query("contact of anand@example.com"), "anand@example.com");
        assert_eq!(clean_query("Mrs. Fatima Mary"), "Mrs. Fatima Mary");
    }

    #[test]
    fn all_filler_falls_back_to_input() {
        assert_eq!(clean_query("  find the people  "), "find the people");
        assert_eq!(clean_query(""), "");
    }
}
