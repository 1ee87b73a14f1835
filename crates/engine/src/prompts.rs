//! Prompt construction.
//!
//! Every deliberator prompt shares one shape: restate the question, replay
//! the full discussion in numbered form, state the role, instruct the agent
//! to PASS when it would add nothing, and permit a web-search request for
//! factual claims. Role personality lives in the system prompts, which a
//! `system_prompt_file` config entry can replace wholesale.

use cq_domain::discussion::Contribution;
use cq_domain::role::Role;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// System prompts
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub fn default_system_prompt(role: Role) -> &'static str {
    match role {
        Role::Divergent => {
            "You are the Divergent thinker in an expert panel. Generate unconventional \
             angles, challenge assumptions, and widen the option space. Offer one sharp, \
             novel perspective per turn rather than a list of everything."
        }
        Role::Convergent => {
            "You are the Convergent thinker in an expert panel. Integrate what others \
             have proposed, resolve tensions between perspectives, and move the group \
             toward a concrete recommendation."
        }
        Role::Critical => {
            "You are the Critical thinker in an expert panel. Probe for flaws, hidden \
             assumptions, risks, and failure modes in what has been said. Be specific \
             about what breaks and under which conditions."
        }
        Role::Pragmatist => {
            "You are the Pragmatist in an expert panel. Ground the discussion in \
             implementation reality: effort, cost, sequencing, and what a small team \
             can actually ship."
        }
        Role::UserProxy => {
            "You speak for the end user in an expert panel. Evaluate proposals through \
             the eyes of the people affected by them: what they need, expect, and will \
             find confusing."
        }
        Role::Quantifier => {
            "You are the Quantifier in an expert panel. Attach numbers to the \
             discussion: estimates, benchmarks, orders of magnitude, and measurable \
             criteria for the claims being made."
        }
        Role::Summarizer => {
            "You are an expert summarizer who creates comprehensive yet clear \
             summaries. Extract and synthesize key insights from expert discussions, \
             ensuring all important points are captured. Focus on the substance of \
             what is being discussed, not meta-commentary about the discussion itself."
        }
        Role::WebSearcher => {
            "You are a web research assistant with live search capability. Answer \
             queries with current, factual information and cite sources when possible."
        }
        Role::Classifier => {
            "You classify questions. Answer with exactly one word as instructed."
        }
    }
}

/// System prompt for the Summarizer's one-shot final synthesis.
pub fn final_synthesis_system() -> &'static str {
    "You are an expert synthesizer who creates thorough, well-structured answers. \
     Synthesize multi-perspective discussions into complete, actionable responses \
     that directly answer the user's question. Be comprehensive - users rely on \
     this as their final answer."
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Deliberation prompt
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Replay the discussion in numbered form, hidden entries included (agents
/// see search results and waiting notices).
pub fn format_discussion(contributions: &[Contribution]) -> String {
    if contributions.is_empty() {
        return "No contributions yet. You open the discussion.".into();
    }
    contributions
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{}. {}: {}", i + 1, c.agent, c.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn deliberation_prompt(
    role: Role,
    user_input: &str,
    contributions: &[Contribution],
    context: Option<&str>,
) -> String {
    let mut prompt = format!("Question: \"{user_input}\"\n\n");

    if let Some(context) = context.filter(|c| !c.trim().is_empty()) {
        prompt.push_str(&format!("Context from the earlier conversation:\n{context}\n\n"));
    }

    prompt.push_str(&format!(
        "The discussion so far ({} contributions):\n{}\n\n",
        contributions.len(),
        format_discussion(contributions)
    ));

    prompt.push_str(&format!(
        "You are the {} voice in this panel. Add the single most valuable \
         contribution your role can make right now, in a few sentences.\n\n",
        role.name()
    ));

    prompt.push_str(
        "Before answering, compare the full discussion above against what you are \
         about to add. If it would repeat or merely rephrase what is already there, \
         respond with exactly: PASS\n\n",
    );

    prompt.push_str(
        "If your contribution would rest on factual claims you cannot verify from \
         the discussion, do not guess. Instead request a search by responding with: \
         @WebSearcher search for \"your query\"\n",
    );

    prompt
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Summarizer prompts
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub fn rolling_summary_prompt(user_input: &str, contributions: &[Contribution]) -> String {
    let discussion = contributions
        .iter()
        .map(|c| format!("**{}:** {}", c.agent, c.content))
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "Question: \"{user_input}\"\n\n\
         Here are the {} expert contributions made so far:\n\n\
         {discussion}\n\n\
         Provide a comprehensive summary of the KEY INSIGHTS, MAIN POINTS, and \
         RECOMMENDATIONS that have emerged so far.\n\n\
         Include:\n\
         - What perspectives have been shared\n\
         - Key recommendations or solutions proposed\n\
         - Important trade-offs or concerns raised\n\
         - Current direction of the discussion\n\n\
         Be thorough but concise - aim for a complete picture that would help \
         someone understand the discussion without reading every contribution. \
         4-6 sentences is ideal.",
        contributions.len()
    )
}

pub fn final_synthesis_prompt(
    user_input: &str,
    contributions: &[Contribution],
    rolling_summary: &str,
) -> String {
    let discussion = contributions
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{}. {}: {}", i + 1, c.agent, c.content))
        .collect::<Vec<_>>()
        .join("\n\n");

    let rolling_context = if rolling_summary.is_empty() {
        String::new()
    } else {
        format!("ROLLING SUMMARY (generated during discussion):\n{rolling_summary}\n\n")
    };

    format!(
        "Question: \"{user_input}\"\n\n\
         {rolling_context}COMPLETE DISCUSSION ({} contributions):\n{discussion}\n\n\
         Synthesize this discussion into a clear, comprehensive answer that \
         directly addresses the user's question.\n\n\
         Your synthesis should:\n\
         1. Start with a direct answer to the question\n\
         2. Include KEY INSIGHTS and RECOMMENDATIONS from the specialists\n\
         3. Cover important TRADE-OFFS, CONCERNS, or CONSIDERATIONS raised\n\
         4. Provide ACTIONABLE next steps or conclusions\n\n\
         Be thorough and complete - this is the final response the user will see. \
         The answer should stand on its own and fully address their question. \
         Aim for 6-10 sentences to provide a comprehensive response.",
        contributions.len()
    )
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Web search prompt
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub fn web_search_prompt(query: &str) -> String {
    format!(
        "Perform a web search to answer the following query:\n\n\
         {query}\n\n\
         Instructions:\n\
         - Use your web search capability to find current, accurate information\n\
         - Provide factual results with sources when possible\n\
         - Keep the response focused and relevant to the query\n\
         - If multiple sources have different information, note the differences\n\
         - If information is not found, clearly state that\n\n\
         Search results:"
    )
}
