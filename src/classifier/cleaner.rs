//! Removal of "thinking" content some models emit before their answer.

use regex::Regex;
use std::sync::LazyLock;

/// Tags whose content is reasoning, never part of the answer.
const THINKING_TAGS: &[&str] = &[
    "think",
    "thinking",
    "thought",
    "reasoning",
    "reflection",
    "analysis",
    "scratchpad",
    "思考",
    "推理",
    "分析",
    "想法",
];

static PAIRED_BLOCKS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    THINKING_TAGS
        .iter()
        .map(|tag| {
            let tag = regex::escape(tag);
            Regex::new(&format!(r"(?is)<{tag}(?:\s[^>]*)?>.*?</{tag}\s*>")).expect("valid regex")
        })
        .collect()
});

/// Closing tag left behind when the model omits the opening one: everything
/// before it is reasoning.
static ORPHAN_CLOSE: LazyLock<Regex> = LazyLock::new(|| {
    let alternatives = THINKING_TAGS.iter().map(|t| regex::escape(t)).collect::<Vec<_>>();
    Regex::new(&format!(r"(?is)^.*</(?:{})\s*>", alternatives.join("|"))).expect("valid regex")
});

static STRAY_TAGS: LazyLock<Regex> = LazyLock::new(|| {
    let alternatives = THINKING_TAGS.iter().map(|t| regex::escape(t)).collect::<Vec<_>>();
    Regex::new(&format!(r"(?i)</?(?:{})(?:\s[^>]*)?>", alternatives.join("|"))).expect("valid regex")
});

static LEAD_IN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*(?:(?:okay|ok|alright|so|hmm|well)[,.!]?\s+)?(?:let me|let's|i need to|i will|i'll|i should|first,? i(?:'ll| will)?)\s+(?:think|analy[sz]e|look at|review|consider|check|read|examine|figure out|break down|determine)\b[^\n.!?]*[.!?:]*\s*",
    )
    .expect("valid regex")
});

static EXCESS_BLANK_LINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\s*\n\s*\n+").expect("valid regex"));

/// Returns the model answer without its reasoning.
///
/// If cleaning would leave nothing, the trimmed input is returned instead so
/// that a reply consisting only of tags is not mistaken for an empty summary.
pub fn clean_response(response: &str) -> String {
    let mut text = response.to_string();

    for block in PAIRED_BLOCKS.iter() {
        text = block.replace_all(&text, "").into_owned();
    }
    text = ORPHAN_CLOSE.replace(&text, "").into_owned();
    text = STRAY_TAGS.replace_all(&text, "").into_owned();

    // Lead-ins can be chained ("Okay, let me read this. Let me analyze it.")
    loop {
        let stripped = LEAD_IN.replace(&text, "");
        if stripped.len() == text.len() || stripped.trim().is_empty() {
            break;
        }
        text = stripped.into_owned();
    }

    let text = EXCESS_BLANK_LINES.replace_all(&text, "\n\n");
    let cleaned = text.trim();

    if cleaned.is_empty() {
        response.trim().to_string()
    } else {
        cleaned.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_think_block_removed() {
        assert_eq!(
            clean_response("<think>reasoning...</think>You should reply to Bob."),
            "You should reply to Bob."
        );
    }

    #[test]
    fn test_multiline_and_uppercase_tags() {
        let response = "<THINKING>\nThe sender is a bank.\nProbably important.\n</THINKING>\n\n\n\nYour card statement is ready.";
        assert_eq!(clean_response(response), "Your card statement is ready.");
    }

    #[test]
    fn test_cjk_tags() {
        assert_eq!(
            clean_response("<思考>这是一封营销邮件</思考>NOT IMPORTANT"),
            "NOT IMPORTANT"
        );
    }

    #[test]
    fn test_missing_opening_tag() {
        assert_eq!(
            clean_response("The user knows Alice personally.</think>\nAlice invites you to dinner on Friday."),
            "Alice invites you to dinner on Friday."
        );
    }

    #[test]
    fn test_lead_in_sentences() {
        assert_eq!(
            clean_response("Okay, let me analyze this email. Let me think about it.\nThe dentist moved your appointment to 3pm."),
            "The dentist moved your appointment to 3pm."
        );
    }

    #[test]
    fn test_plain_answer_untouched() {
        let answer = "Let the landlord know by Friday whether you renew the lease.";
        assert_eq!(clean_response(answer), answer);
    }

    #[test]
    fn test_blank_lines_collapsed() {
        assert_eq!(clean_response("First.\n\n\n\n\nSecond."), "First.\n\nSecond.");
    }

    #[test]
    fn test_only_reasoning_falls_back_to_input() {
        assert_eq!(clean_response("  <think></think>  "), "<think></think>");
    }
}
