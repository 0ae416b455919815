use crate::query::{Basic, Node};

/// Lets adjacent literal terms match in any order: `func parse` becomes
/// `func AND parse`. Negated terms are kept as they are.
///
/// Clauses containing a regular expression are left alone.
pub fn unordered_terms(basic: &Basic) -> Option<Basic> {
    let pattern = basic.pattern.as_ref()?;
    if pattern.leaves().iter().any(|p| p.is_regexp()) {
        return None;
    }
    let (node, changed) = split(pattern);
    changed.then(|| basic.with_pattern(Some(node)))
}

fn split(node: &Node) -> (Node, bool) {
    match node {
        Node::Pattern(_) => (node.clone(), false),
        Node::Concat(nodes) if splittable(nodes) => (Node::And(nodes.clone()), true),
        Node::Concat(nodes) => map(nodes, Node::Concat),
        Node::And(nodes) => {
            let (mapped, changed) = map(nodes, Node::And);
            let Node::And(children) = mapped else {
                return (mapped, changed);
            };
            let flat = children
                .into_iter()
                .flat_map(|child| match child {
                    Node::And(inner) => inner,
                    other => vec![other],
                })
                .collect();
            (Node::And(flat), changed)
        }
        Node::Or(nodes) => map(nodes, Node::Or),
    }
}

fn map(nodes: &[Node], rebuild: fn(Vec<Node>) -> Node) -> (Node, bool) {
    let mut changed = false;
    let children = nodes
        .iter()
        .map(|n| {
            let (child, c) = split(n);
            changed |= c;
            child
        })
        .collect();
    (rebuild(children), changed)
}

fn splittable(nodes: &[Node]) -> bool {
    let mut terms = 0;
    for node in nodes {
        match node {
            Node::Pattern(p) if !p.negated => terms += 1,
            Node::Pattern(_) => {}
            _ => return false,
        }
    }
    terms >= 2
}
