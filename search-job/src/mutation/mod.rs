//! Rules that derive alternative clauses from a user's clause.
//!
//! Every rule is a pure `&Basic -> Option<Basic>` function: it never touches
//! its input and returns `None` when its precondition does not hold. The
//! compiler searches the derived clauses next to the original one.

mod only_select;
mod unordered;
mod unquote;
mod uri;

pub use only_select::only_select;
pub use unordered::unordered_terms;
pub use unquote::unquote;
pub use uri::uri_as_filter;

use strum::Display;

use crate::config::MutationSettings;
use crate::query::{Basic, SearchType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum Rule {
    UnorderedTerms,
    UriAsFilter,
    Unquote,
    OnlySelect,
}

impl Rule {
    /// Whether the rule is meaningful for clauses read as `search_type`.
    pub fn supports(self, search_type: SearchType) -> bool {
        match self {
            Rule::UnorderedTerms => search_type == SearchType::Literal,
            _ => true,
        }
    }

    pub fn apply(self, basic: &Basic) -> Option<Basic> {
        match self {
            Rule::UnorderedTerms => unordered_terms(basic),
            Rule::UriAsFilter => uri_as_filter(basic),
            Rule::Unquote => unquote(basic),
            Rule::OnlySelect => only_select(basic),
        }
    }
}

/// The enabled rules, applied in a fixed order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    pub fn new(settings: &MutationSettings) -> Self {
        let rules = [
            (settings.unordered_terms, Rule::UnorderedTerms),
            (settings.uri_as_filter, Rule::UriAsFilter),
            (settings.unquote, Rule::Unquote),
            (settings.only_select, Rule::OnlySelect),
        ]
        .into_iter()
        .filter_map(|(enabled, rule)| enabled.then_some(rule))
        .collect();
        Self { rules }
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Distinct clauses derived from `basic`, excluding `basic` itself.
    /// `search_type` applies when the clause has no `patterntype:`.
    pub fn mutate(&self, basic: &Basic, search_type: SearchType) -> Vec<Basic> {
        let search_type = basic.search_type(search_type);
        let mut out: Vec<Basic> = Vec::new();
        for rule in &self.rules {
            if !rule.supports(search_type) {
                continue;
            }
            let Some(mutated) = rule.apply(basic) else {
                continue;
            };
            if mutated == *basic || out.contains(&mutated) {
                continue;
            }
            tracing::debug!(%rule, clause = %mutated, "derived clause");
            out.push(mutated);
        }
        out
    }
}
