use std::sync::LazyLock;

use regex::Regex;

const TECH_TERMS: &[&str] = &[
    "python",
    "javascript",
    "react",
    "node",
    "django",
    "flask",
    "machine learning",
    "ai",
    "data science",
    "database",
    "frontend",
    "backend",
    "fullstack",
    "devops",
];

static TERM_PATTERNS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    TECH_TERMS
        .iter()
        .filter_map(|term| {
            Regex::new(&format!(r"\b{}\b", regex::escape(term)))
                .ok()
                .map(|re| (*term, re))
        })
        .collect()
});

/// Technical terms mentioned in `text`, in vocabulary order.
///
/// Whole-word, case-insensitive matching: "ai" matches "AI tools" but not
/// "maintain". The result is descriptive metadata only.
pub fn extract(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    TERM_PATTERNS
        .iter()
        .filter(|(_, re)| re.is_match(&lowered))
        .map(|(term, _)| (*term).to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_terms_case_insensitively() {
        let found = extract("Should I learn Python or JavaScript for Backend work?");
        assert_eq!(found, ["python", "javascript", "backend"]);
    }

    #[test]
    fn multi_word_terms() {
        let found = extract("machine learning vs data science careers");
        assert_eq!(found, ["machine learning", "data science"]);
    }

    #[test]
    fn short_terms_need_word_boundaries() {
        assert!(extract("how do I maintain focus?").is_empty());
        assert_eq!(extract("using AI to study"), ["ai"]);
    }

    #[test]
    fn greeting_has_no_keywords() {
        assert!(extract("hi").is_empty());
    }
}
