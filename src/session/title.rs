//! Session title inference helpers.

/// Label used when no title could be inferred.
pub const DEFAULT_TITLE: &str = "New Chat";

/// Leading instruction of every title prompt.
pub const TITLE_INSTRUCTION: &str = "Generate a concise title of at most 3 words";

/// Build the prompt asking the completion service to label a conversation
/// that starts with `message`.
#[must_use]
pub fn title_prompt(message: &str) -> String {
    format!(
        "{TITLE_INSTRUCTION} for a conversation that starts with this message: \"{message}\"\n\nRespond with ONLY the title, no explanation."
    )
}

/// Normalize a raw completion into a display title.
///
/// Trims whitespace and strips a single leading and a single trailing quote
/// character. Returns `None` when nothing is left.
#[must_use]
pub fn clean_title(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let trimmed = trimmed
        .strip_prefix(['"', '\''])
        .unwrap_or(trimmed);
    let trimmed = trimmed
        .strip_suffix(['"', '\''])
        .unwrap_or(trimmed)
        .trim();

    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_wraps_message() {
        let prompt = title_prompt("What is the capital of France?");
        assert!(prompt.starts_with(TITLE_INSTRUCTION));
        assert!(prompt.contains("\"What is the capital of France?\""));
    }

    #[test]
    fn test_clean_title() {
        assert_eq!(clean_title("France Capital").as_deref(), Some("France Capital"));
        assert_eq!(clean_title("\"France Capital\"").as_deref(), Some("France Capital"));
        assert_eq!(clean_title("  'Rust Tips'\n").as_deref(), Some("Rust Tips"));
        // Only one quote is stripped from each end.
        assert_eq!(clean_title("\"\"Nested\"\"").as_deref(), Some("\"Nested\""));
        assert_eq!(clean_title("\"\""), None);
        assert_eq!(clean_title("   "), None);
    }
}
