use std::sync::LazyLock;

use regex::Regex;

use crate::query::{Basic, Node, Parameter, PatternKind, FIELD_SELECT};

static TARGET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(repos?|files?|paths?|content|symbols?)$").unwrap());

/// Reads a trailing-phrase projection such as `func parse only repos` as
/// `select:repo func parse`.
///
/// Any `select:` already present is replaced. Nothing is produced when the
/// phrase is missing or nothing would be left to search for.
pub fn only_select(basic: &Basic) -> Option<Basic> {
    let leaves = basic.pattern.as_ref()?.flat_leaves()?;
    let plain = |i: usize| {
        leaves
            .get(i)
            .filter(|p| p.kind == PatternKind::Literal && !p.negated)
            .map(|p| p.value.as_str())
    };

    let at = (0..leaves.len()).find(|&i| {
        plain(i).is_some_and(|v| v.eq_ignore_ascii_case("only"))
            && plain(i + 1).is_some_and(|v| TARGET.is_match(v))
    })?;
    let target = select_target(plain(at + 1)?);

    let residual: Vec<Node> = leaves
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != at && *i != at + 1)
        .map(|(_, p)| Node::Pattern((*p).clone()))
        .collect();
    let pattern = Node::concat(residual)?;

    let mut parameters: Vec<Parameter> = basic
        .parameters
        .iter()
        .filter(|p| p.field != FIELD_SELECT)
        .cloned()
        .collect();
    parameters.push(Parameter::new(FIELD_SELECT, target));
    Some(Basic::new(parameters, Some(pattern)))
}

fn select_target(word: &str) -> &'static str {
    let word = word.to_ascii_lowercase();
    if word.starts_with("repo") {
        "repo"
    } else if word.starts_with("symbol") {
        "symbol"
    } else if word == "content" {
        "content"
    } else {
        "file"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{parse, SearchType};

    fn mutate(q: &str) -> Option<String> {
        let basic = parse(q, SearchType::Literal).unwrap()[0].clone();
        only_select(&basic).map(|b| b.string_human())
    }

    #[test]
    fn phrase_becomes_select() {
        assert_eq!(
            mutate("repo:sourcegraph func parse only repo").as_deref(),
            Some("repo:sourcegraph select:repo func parse")
        );
        assert_eq!(
            mutate("select:content only paths parse").as_deref(),
            Some("select:file parse")
        );
    }

    #[test]
    fn precondition() {
        assert_eq!(mutate("only repo"), None);
        assert_eq!(mutate("parse only"), None);
        assert_eq!(mutate("parse only things"), None);
        assert_eq!(mutate("parse \"only repo\""), None);
    }
}
