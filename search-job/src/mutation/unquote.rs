use crate::query::{Basic, Node, Pattern, PatternKind};

/// Drops the quotes of a pattern mixing quoted and unquoted terms and searches
/// the whole pattern as one literal phrase.
///
/// `"result please" unless? "maybe" ok` becomes the single literal
/// `result please unless? maybe ok`.
pub fn unquote(basic: &Basic) -> Option<Basic> {
    let leaves = basic.pattern.as_ref()?.flat_leaves()?;
    if !leaves.iter().any(|p| p.kind == PatternKind::Quoted) {
        return None;
    }
    if leaves.iter().any(|p| p.negated || p.is_regexp()) {
        return None;
    }

    let phrase = leaves
        .iter()
        .map(|p| p.value.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    Some(basic.with_pattern(Some(Node::Pattern(Pattern::literal(phrase)))))
}
