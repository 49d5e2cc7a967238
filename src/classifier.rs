//! Keyword-based subject classification

/// Category assigned when the subject is absent or no keyword matches.
pub const FALLBACK_CATEGORY: &str = "Other";

/// Map a subject to a category label.
///
/// Scans `keywords` in their configured order and returns the first whose
/// lowercase form is a substring of the lowercased subject, capitalized.
/// Absent/empty subjects and non-matching subjects fall back to "Other".
///
/// Matching is plain containment, not word-boundary aware: the keyword
/// "it" matches the subject "Witness statement".
pub fn categorize(subject: Option<&str>, keywords: &[String]) -> String {
    let subject = match subject {
        Some(s) if !s.is_empty() => s.to_lowercase(),
        _ => return FALLBACK_CATEGORY.to_string(),
    };

    for keyword in keywords {
        if subject.contains(&keyword.to_lowercase()) {
            return capitalize(keyword);
        }
    }

    FALLBACK_CATEGORY.to_string()
}

/// Decide whether a subject qualifies for an automatic reply: it must be
/// present, non-empty, and contain at least one keyword
/// (case-insensitive substring).
pub fn is_reply_candidate(subject: Option<&str>, keywords: &[String]) -> bool {
    match subject {
        Some(s) if !s.is_empty() => {
            let lowered = s.to_lowercase();
            keywords.iter().any(|k| lowered.contains(&k.to_lowercase()))
        }
        _ => false,
    }
}

/// First character uppercased, the rest lowercased ("IT" becomes "It").
fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
        None => String::new(),
    }
}
