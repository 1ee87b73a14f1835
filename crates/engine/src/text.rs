//! Response cleanup and the two small grammars agents speak.
//!
//! Models occasionally leak tool-protocol tokens (`<|…|>`) into replies;
//! the cleanup here strips them conservatively, then degenerate output is
//! classified as a pass. Search requests are recognized from natural
//! language (`@WebSearcher … search … "query"`), not a tool-call format.

use regex::Regex;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Cleanup
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Strip tool-syntax tokens, collapse runs of blank lines to one, trim.
///
/// Token stripping runs twice: first `<|…|>` plus any trailing text up to
/// the next `<`, then any bare `<|…|>` left behind.
pub fn clean_response(raw: &str) -> String {
    let with_body = Regex::new(r"<\|[^|]*\|>[^<]*").expect("valid regex");
    let bare = Regex::new(r"<\|[^|]*\|>").expect("valid regex");
    let blank_runs = Regex::new(r"\n(?:[ \t]*\n)+").expect("valid regex");

    let stripped = with_body.replace_all(raw, "");
    let stripped = bare.replace_all(&stripped, "");
    let collapsed = blank_runs.replace_all(&stripped, "\n\n");
    collapsed.trim().to_string()
}

/// Whether cleaned text signals a pass: a leading `PASS` / `[PASS` marker
/// (case-insensitive) or trivially short content.
pub fn is_pass(cleaned: &str) -> bool {
    if cleaned.chars().count() < 10 {
        return true;
    }
    let marker = Regex::new(r"(?i)^\s*\[?\s*PASS").expect("valid regex");
    marker.is_match(cleaned)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Search-request grammar
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Extract the query from a natural-language search request.
///
/// Accepts `@WebSearcher` (any case), optional punctuation, an optional
/// `please`, a `search` verb with optional `for`, then a query that is
/// either quoted or runs to the end of the sentence or line.
pub fn parse_search_request(raw: &str) -> Option<String> {
    let pattern = Regex::new(
        r#"(?i)@websearcher[\s!,.:;-]*(?:please\s+)?search(?:es|ing)?(?:\s+for)?[\s:,-]*(?:"([^"\n]*)"|'([^'\n]*)'|([^.?!\n]+))"#,
    )
    .expect("valid regex");

    let captures = pattern.captures(raw)?;
    let query = captures
        .get(1)
        .or_else(|| captures.get(2))
        .or_else(|| captures.get(3))?
        .as_str()
        .trim()
        .trim_end_matches(['"', '\'', '.', '!', '?'])
        .trim()
        .to_string();

    if query.is_empty() {
        None
    } else {
        Some(query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── clean_response ──────────────────────────────────────────────

    #[test]
    fn plain_text_unchanged() {
        assert_eq!(clean_response("A useful contribution."), "A useful contribution.");
    }

    #[test]
    fn strips_tool_tokens_and_trailing_body() {
        let raw = "<|im_start|>assistant<|im_end|>";
        assert_eq!(clean_response(raw), "");
    }

    #[test]
    fn only_tool_tokens_is_a_pass() {
        let cleaned = clean_response("<|tool|>");
        assert_eq!(cleaned, "");
        assert!(is_pass(&cleaned));
    }

    #[test]
    fn collapses_blank_line_runs() {
        let raw = "first paragraph\n\n\n\nsecond paragraph";
        assert_eq!(clean_response(raw), "first paragraph\n\nsecond paragraph");

        let raw = "a\n   \n\t\n\nb";
        assert_eq!(clean_response(raw), "a\n\nb");
    }

    #[test]
    fn trims_surrounding_whitespace() {
        assert_eq!(clean_response("  an answer that matters  \n"), "an answer that matters");
    }

    // ── is_pass ─────────────────────────────────────────────────────

    #[test]
    fn pass_markers() {
        assert!(is_pass("PASS"));
        assert!(is_pass("pass, nothing to add here"));
        assert!(is_pass("[PASS] Not relevant to this round"));
        assert!(is_pass("  [ PASS ] covered already"));
        assert!(is_pass("Passing on this one, nothing new"));
    }

    #[test]
    fn short_content_is_a_pass() {
        assert!(is_pass(""));
        assert!(is_pass("Yes."));
        assert!(is_pass("Agreed!!"));
    }

    #[test]
    fn substantive_content_is_not_a_pass() {
        assert!(!is_pass("A monolith keeps deployment simple for five people."));
        assert!(!is_pass("Compassion is not a pass marker here at all."));
    }

    // ── parse_search_request ────────────────────────────────────────

    #[test]
    fn quoted_query() {
        let raw = r#"@WebSearcher! search for "release train best practices""#;
        assert_eq!(
            parse_search_request(raw).as_deref(),
            Some("release train best practices")
        );
    }

    #[test]
    fn single_quoted_query() {
        let raw = "@websearcher search for 'rust 2024 edition changes'";
        assert_eq!(
            parse_search_request(raw).as_deref(),
            Some("rust 2024 edition changes")
        );
    }

    #[test]
    fn unquoted_query_stops_at_sentence_end() {
        let raw = "@WebSearcher, please search for current Kubernetes LTS cadence. Thanks!";
        assert_eq!(
            parse_search_request(raw).as_deref(),
            Some("current Kubernetes LTS cadence")
        );
    }

    #[test]
    fn search_without_for() {
        let raw = "@WebSearcher: search median SRE team sizes 2025";
        assert_eq!(
            parse_search_request(raw).as_deref(),
            Some("median SRE team sizes 2025")
        );
    }

    #[test]
    fn embedded_in_longer_reply() {
        let raw = "I would want data first.\n@WebSearcher search for \"microservice team size studies\"\nThen I can quantify.";
        assert_eq!(
            parse_search_request(raw).as_deref(),
            Some("microservice team size studies")
        );
    }

    #[test]
    fn plain_mention_is_not_a_request() {
        assert_eq!(parse_search_request("The WebSearcher agent is idle."), None);
        assert_eq!(parse_search_request("We could search the archives ourselves."), None);
        assert_eq!(parse_search_request("@WebSearcher search \"\""), None);
    }
}
