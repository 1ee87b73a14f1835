//! Contribution-admission policy.
//!
//! A pure function deciding, before each model call, whether an agent may
//! take a turn. The rules bound fan-out (hard cap of three turns each,
//! no back-to-back turns, anti-dominance window), seed the early phase
//! (core roles first, support roles once a base exists), and contract the
//! discussion in its late phase.
//!
//! Rules evaluate top to bottom. The two first-contribution rules admit
//! and otherwise fall through, so a first-timer that misses the keyword
//! check can still be seeded by the early-phase rule; all later rules are
//! terminal.

use cq_domain::discussion::Contribution;
use cq_domain::role::{Role, RoleClass};

/// Non-hidden turns any single deliberator may take in one run.
pub const MAX_TURNS_PER_AGENT: u32 = 3;

/// Decide whether `role` should invoke the model this tick.
///
/// `discussion` is the full contribution list (hidden entries included;
/// they occupy positions). `own_count` is this agent's non-hidden
/// contribution count. Pure: identical inputs always yield the same
/// output.
pub fn should_contribute(
    role: Role,
    discussion: &[Contribution],
    user_input: &str,
    own_count: u32,
) -> bool {
    if !role.is_deliberator() {
        return false;
    }
    let len = discussion.len();

    // 1. Bootstrap: open discussions take anyone's first turn.
    if own_count == 0 && len < 2 {
        return true;
    }

    // 2. First turn on relevance.
    if own_count == 0 && keywords_match(role, discussion, user_input) {
        return true;
    }

    // 3. No back-to-back turns.
    if last_visible_author(discussion) == Some(role.name()) {
        return false;
    }

    // 4. Anti-dominance: at most twice in any three adjacent visible turns.
    if count_in_last_three_visible(discussion, role.name()) >= 2 {
        return false;
    }

    // 5. Hard cap.
    if own_count >= MAX_TURNS_PER_AGENT {
        return false;
    }

    // 6. Early phase: finish seeding the core trio, then let each support
    //    role in once at least two turns exist.
    if len < 6 {
        let core_seeding = role.class() == RoleClass::Core && !all_core_appeared(discussion);
        let support_entry = role.class() == RoleClass::Support && own_count == 0 && len >= 2;
        return core_seeding || support_entry;
    }

    // 7. Mid phase: second turns only, and only on relevance.
    if len < 12 {
        if own_count >= 2 {
            return false;
        }
        return keywords_match(role, discussion, user_input);
    }

    // 8. Late-stage convergence.
    false
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Case-insensitive keyword match against the user question or the
/// content of the last three contributions (hidden search results count:
/// they legitimately carry relevance signals).
fn keywords_match(role: Role, discussion: &[Contribution], user_input: &str) -> bool {
    let mut haystack = user_input.to_lowercase();
    for contribution in discussion.iter().rev().take(3) {
        haystack.push('\n');
        haystack.push_str(&contribution.content.to_lowercase());
    }
    role.descriptor()
        .keywords
        .iter()
        .any(|keyword| haystack.contains(keyword))
}

fn last_visible_author(discussion: &[Contribution]) -> Option<&str> {
    discussion
        .iter()
        .rev()
        .find(|c| !c.hidden)
        .map(|c| c.agent.as_str())
}

fn count_in_last_three_visible(discussion: &[Contribution], agent: &str) -> usize {
    discussion
        .iter()
        .rev()
        .filter(|c| !c.hidden)
        .take(3)
        .filter(|c| c.agent == agent)
        .count()
}

fn all_core_appeared(discussion: &[Contribution]) -> bool {
    [Role::Divergent, Role::Convergent, Role::Critical]
        .iter()
        .all(|core| {
            discussion
                .iter()
                .any(|c| !c.hidden && c.agent == core.name())
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(agent: Role, content: &str) -> Contribution {
        Contribution::new(agent.name(), content, 0, false)
    }

    fn hidden(content: &str) -> Contribution {
        Contribution::new(Role::WebSearcher.name(), content, 0, true)
    }

    fn numbered(mut list: Vec<Contribution>) -> Vec<Contribution> {
        for (i, c) in list.iter_mut().enumerate() {
            c.contribution_num = (i + 1) as u32;
        }
        list
    }

    const QUESTION: &str = "Compare microservices vs monolith for a 5-person team.";

    // ── Rule 1: bootstrap ───────────────────────────────────────────

    #[test]
    fn empty_discussion_admits_first_turn() {
        assert!(should_contribute(Role::Divergent, &[], QUESTION, 0));
        assert!(should_contribute(Role::Quantifier, &[], "x", 0));
    }

    #[test]
    fn one_entry_still_bootstraps() {
        let discussion = numbered(vec![entry(Role::Divergent, "split by domain")]);
        assert!(should_contribute(Role::UserProxy, &discussion, "x", 0));
    }

    // ── Rule 2: first turn on relevance ─────────────────────────────

    #[test]
    fn first_turn_admitted_on_user_input_keyword() {
        let discussion = numbered(vec![
            entry(Role::Divergent, "one idea"),
            entry(Role::Convergent, "a merge"),
            entry(Role::Critical, "a flaw"),
            entry(Role::Divergent, "another idea"),
            entry(Role::Convergent, "a pick"),
            entry(Role::Critical, "a gap"),
        ]);
        // len 6: rule 6 no longer applies; "compare" keys Convergent, but
        // own_count 0 and keyword present admits via rule 2 first. Use a
        // support role whose keyword is in the question.
        assert!(should_contribute(
            Role::Pragmatist,
            &discussion,
            "What is a practical plan for our team?",
            0
        ));
    }

    #[test]
    fn first_turn_keyword_can_come_from_recent_contributions() {
        let discussion = numbered(vec![
            entry(Role::Divergent, "idea one"),
            entry(Role::Convergent, "merge them"),
            entry(Role::Critical, "we need usability data for real users"),
            entry(Role::Divergent, "idea two"),
            entry(Role::Convergent, "choose one"),
            entry(Role::Critical, "still risky"),
        ]);
        // "user" appears in the third-from-last contribution? Window is the
        // last three entries; "users" is outside it, so UserProxy must miss.
        assert!(!should_contribute(Role::UserProxy, &discussion, "plain", 0));

        let discussion = numbered(vec![
            entry(Role::Divergent, "idea one"),
            entry(Role::Convergent, "merge them"),
            entry(Role::Divergent, "idea two"),
            entry(Role::Convergent, "choose one"),
            entry(Role::Critical, "what do users expect here"),
            entry(Role::Divergent, "a wild card"),
        ]);
        assert!(should_contribute(Role::UserProxy, &discussion, "plain", 0));
    }

    #[test]
    fn hidden_search_results_carry_relevance() {
        let discussion = numbered(vec![
            entry(Role::Divergent, "a"),
            entry(Role::Convergent, "b"),
            entry(Role::Critical, "c"),
            entry(Role::Divergent, "d"),
            entry(Role::Convergent, "e"),
            entry(Role::Critical, "f"),
            hidden("Search results for 'metrics': median benchmark data shows p99 numbers"),
        ]);
        assert!(should_contribute(Role::Quantifier, &discussion, "plain", 0));
    }

    // ── Rule 3: no back-to-back ─────────────────────────────────────

    #[test]
    fn back_to_back_rejected() {
        let discussion = numbered(vec![
            entry(Role::Convergent, "combine and decide on the best option"),
            entry(Role::Divergent, "explore a creative alternative approach"),
        ]);
        // Divergent spoke last; its keywords are present, but own_count 1
        // skips rules 1-2 and rule 3 rejects.
        assert!(!should_contribute(Role::Divergent, &discussion, QUESTION, 1));
    }

    #[test]
    fn hidden_tail_does_not_mask_back_to_back() {
        let discussion = numbered(vec![
            entry(Role::Critical, "risk one"),
            hidden("Search results for 'x': data"),
        ]);
        assert!(!should_contribute(Role::Critical, &discussion, QUESTION, 1));
    }

    // ── Rule 4: anti-dominance ──────────────────────────────────────

    #[test]
    fn two_of_last_three_rejected() {
        // A hidden search result sits between Critical's two turns, so the
        // visible window still reads Critical, Critical, Convergent.
        let discussion = numbered(vec![
            entry(Role::Critical, "risk one on the new architecture"),
            hidden("Search results for 'x': data"),
            entry(Role::Critical, "risk two in this design"),
            entry(Role::Convergent, "synthesis of both threads"),
        ]);
        assert!(!should_contribute(Role::Critical, &discussion, QUESTION, 2));
    }

    // ── Rule 5: hard cap ────────────────────────────────────────────

    #[test]
    fn three_turns_is_the_cap() {
        let discussion = numbered(vec![
            entry(Role::Divergent, "risky creative idea to explore"),
            entry(Role::Convergent, "combine"),
            entry(Role::Critical, "flaw"),
            entry(Role::Pragmatist, "steps"),
        ]);
        assert!(!should_contribute(Role::Divergent, &discussion, QUESTION, 3));
        assert!(!should_contribute(Role::Divergent, &discussion, QUESTION, 4));
    }

    // ── Rule 6: early phase ─────────────────────────────────────────

    #[test]
    fn core_readmitted_until_trio_complete() {
        let discussion = numbered(vec![
            entry(Role::Divergent, "plain words"),
            entry(Role::Convergent, "plain words"),
        ]);
        // Critical has not appeared; Divergent may go again (no keywords in
        // "plain" input, own_count 1).
        assert!(should_contribute(Role::Divergent, &discussion, "plain", 1));

        let discussion = numbered(vec![
            entry(Role::Divergent, "plain words"),
            entry(Role::Convergent, "plain words"),
            entry(Role::Critical, "plain words"),
        ]);
        // Trio complete: early re-admission ends for core roles.
        assert!(!should_contribute(Role::Divergent, &discussion, "plain", 1));
    }

    #[test]
    fn support_seeded_once_base_exists() {
        let one = numbered(vec![entry(Role::Divergent, "plain")]);
        let two = numbered(vec![
            entry(Role::Divergent, "plain"),
            entry(Role::Convergent, "plain"),
        ]);
        // len 1 admits via bootstrap anyway; at len 2 the support entry
        // clause carries it despite no keyword match.
        assert!(should_contribute(Role::Quantifier, &one, "plain", 0));
        assert!(should_contribute(Role::Quantifier, &two, "plain", 0));
    }

    #[test]
    fn support_second_turn_not_seeded_early() {
        let discussion = numbered(vec![
            entry(Role::Divergent, "plain"),
            entry(Role::Quantifier, "plain"),
            entry(Role::Convergent, "plain"),
        ]);
        assert!(!should_contribute(Role::Quantifier, &discussion, "plain", 1));
    }

    // ── Rule 7: mid phase ───────────────────────────────────────────

    fn mid_phase_discussion() -> Vec<Contribution> {
        numbered(vec![
            entry(Role::Divergent, "plain one"),
            entry(Role::Convergent, "plain two"),
            entry(Role::Critical, "plain three"),
            entry(Role::Pragmatist, "plain four"),
            entry(Role::UserProxy, "plain five"),
            entry(Role::Quantifier, "plain six"),
            entry(Role::Divergent, "plain seven"),
        ])
    }

    #[test]
    fn mid_phase_second_turn_needs_keywords() {
        let discussion = mid_phase_discussion();
        assert!(!should_contribute(Role::Critical, &discussion, "plain", 1));
        assert!(should_contribute(
            Role::Critical,
            &discussion,
            "What is the main risk in this plan?",
            1
        ));
    }

    #[test]
    fn mid_phase_third_turn_rejected() {
        let discussion = mid_phase_discussion();
        assert!(!should_contribute(
            Role::Critical,
            &discussion,
            "What is the main risk in this plan?",
            2
        ));
    }

    // ── Rule 8: late phase ──────────────────────────────────────────

    #[test]
    fn twelve_entries_rejects_seconds() {
        let mut discussion = Vec::new();
        for i in 0..12 {
            let role = [Role::Divergent, Role::Convergent, Role::Critical][i % 3];
            discussion.push(entry(role, "plain content"));
        }
        let discussion = numbered(discussion);
        assert_eq!(discussion.len(), 12);
        assert!(!should_contribute(Role::Pragmatist, &discussion, QUESTION, 2));
        assert!(!should_contribute(Role::UserProxy, &discussion, "plain", 1));
    }

    // ── General properties ──────────────────────────────────────────

    #[test]
    fn service_roles_never_admitted() {
        assert!(!should_contribute(Role::Summarizer, &[], QUESTION, 0));
        assert!(!should_contribute(Role::WebSearcher, &[], QUESTION, 0));
        assert!(!should_contribute(Role::Classifier, &[], QUESTION, 0));
    }

    #[test]
    fn policy_is_deterministic() {
        let discussion = mid_phase_discussion();
        let first = should_contribute(Role::Critical, &discussion, QUESTION, 1);
        for _ in 0..10 {
            assert_eq!(
                should_contribute(Role::Critical, &discussion, QUESTION, 1),
                first
            );
        }
    }
}
