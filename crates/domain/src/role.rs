use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Role
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Closed set of agent roles.
///
/// All role-specific behaviour (temperature, relevance keywords, class)
/// lives in the [`RoleDescriptor`] table; roles carry no state of their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Divergent,
    Convergent,
    Critical,
    Pragmatist,
    UserProxy,
    Quantifier,
    Summarizer,
    WebSearcher,
    Classifier,
}

/// The six roles that take turns in a discussion.
pub const DELIBERATORS: [Role; 6] = [
    Role::Divergent,
    Role::Convergent,
    Role::Critical,
    Role::Pragmatist,
    Role::UserProxy,
    Role::Quantifier,
];

/// Deliberator class, used by the admission policy's early-phase rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleClass {
    /// Divergent / Convergent / Critical: seeded first.
    Core,
    /// Pragmatist / UserProxy / Quantifier: admitted once a base exists.
    Support,
    /// Summarizer, WebSearcher, Classifier: never admitted as deliberators.
    Service,
}

impl Role {
    /// Stable display name, also the `agent` field on contributions and the
    /// key in `agent_status` maps.
    pub fn name(self) -> &'static str {
        self.descriptor().name
    }

    pub fn class(self) -> RoleClass {
        self.descriptor().class
    }

    pub fn is_deliberator(self) -> bool {
        !matches!(self.class(), RoleClass::Service)
    }

    pub fn descriptor(self) -> &'static RoleDescriptor {
        &DESCRIPTORS[self as usize]
    }

    /// Resolve a role from its display name.
    pub fn from_name(name: &str) -> Option<Role> {
        DESCRIPTORS
            .iter()
            .find(|d| d.name == name)
            .map(|d| d.role)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Role descriptor table
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Per-role behaviour record.
pub struct RoleDescriptor {
    pub role: Role,
    pub name: &'static str,
    pub class: RoleClass,
    /// Sampling temperature for this role's primary operation.
    pub temperature: f32,
    /// Default token cap when the config leaves `max_tokens` at 0.
    pub default_max_tokens: u32,
    /// Relevance vocabulary matched (case-insensitively) against the user
    /// question and the tail of the discussion by the admission policy.
    pub keywords: &'static [&'static str],
}

/// Indexed by `Role as usize`; keep the order in sync with the enum.
static DESCRIPTORS: [RoleDescriptor; 9] = [
    RoleDescriptor {
        role: Role::Divergent,
        name: "Divergent",
        class: RoleClass::Core,
        temperature: 0.9,
        default_max_tokens: 900,
        keywords: &[
            "alternative", "creative", "brainstorm", "explore", "possibilit",
            "option", "idea", "novel", "imagine", "what if", "approach",
        ],
    },
    RoleDescriptor {
        role: Role::Convergent,
        name: "Convergent",
        class: RoleClass::Core,
        temperature: 0.5,
        default_max_tokens: 800,
        keywords: &[
            "synthesize", "combine", "decide", "recommend", "conclusion",
            "integrate", "converge", "choose", "best", "compare",
        ],
    },
    RoleDescriptor {
        role: Role::Critical,
        name: "Critical",
        class: RoleClass::Core,
        temperature: 0.3,
        default_max_tokens: 700,
        keywords: &[
            "risk", "flaw", "problem", "assumption", "concern", "weakness",
            "fail", "limitation", "edge case", "challenge", "trade-off",
        ],
    },
    RoleDescriptor {
        role: Role::Pragmatist,
        name: "Pragmatist",
        class: RoleClass::Support,
        temperature: 0.5,
        default_max_tokens: 600,
        keywords: &[
            "implement", "practical", "step", "cost", "timeline", "resource",
            "feasib", "action", "plan", "team", "budget",
        ],
    },
    RoleDescriptor {
        role: Role::UserProxy,
        name: "UserProxy",
        class: RoleClass::Support,
        temperature: 0.5,
        default_max_tokens: 600,
        keywords: &[
            "user", "experience", "need", "expect", "usab", "customer",
            "audience", "accessib", "confus", "adopt",
        ],
    },
    RoleDescriptor {
        role: Role::Quantifier,
        name: "Quantifier",
        class: RoleClass::Support,
        temperature: 0.5,
        default_max_tokens: 600,
        keywords: &[
            "number", "metric", "data", "measure", "percent", "estimate",
            "statistic", "benchmark", "count", "quantif", "scale",
        ],
    },
    RoleDescriptor {
        role: Role::Summarizer,
        name: "Summarizer",
        class: RoleClass::Service,
        temperature: 0.3,
        default_max_tokens: 0,
        keywords: &[],
    },
    RoleDescriptor {
        role: Role::WebSearcher,
        name: "WebSearcher",
        class: RoleClass::Service,
        temperature: 0.3,
        default_max_tokens: 0,
        keywords: &[],
    },
    RoleDescriptor {
        role: Role::Classifier,
        name: "Classifier",
        class: RoleClass::Service,
        temperature: 0.0,
        default_max_tokens: 10,
        keywords: &[],
    },
];

/// Temperature for the Summarizer's one-shot final synthesis (its rolling
/// summaries use the descriptor temperature).
pub const FINAL_SYNTHESIS_TEMPERATURE: f32 = 0.4;
