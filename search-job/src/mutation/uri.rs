use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use crate::query::{Basic, Node, Parameter, FIELD_FILE, FIELD_REPO, FIELD_REV};

static HOST_QUALIFIED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9-]+(\.[A-Za-z0-9-]+)+(:\d+)?/[^/\s]+/[^/\s]+").unwrap()
});
static REPO_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\w.-]+/[\w.-]+/?$").unwrap());

/// Turns code host URLs in the pattern into repository filters.
///
/// `https://github.com/owner/name` and `github.com/owner/name` become
/// `repo:owner/name`; a `blob/<rev>/<path>` suffix adds `rev:` and an anchored
/// `file:` filter. Once a URL is present, plain `owner/name` terms are treated
/// as repositories too. The other terms remain the pattern.
pub fn uri_as_filter(basic: &Basic) -> Option<Basic> {
    let leaves = basic.pattern.as_ref()?.flat_leaves()?;
    if leaves.iter().any(|p| p.negated || p.is_regexp()) {
        return None;
    }

    let mut hosted = Vec::new();
    let mut plain = Vec::new();
    let mut residual = Vec::new();
    for leaf in &leaves {
        if let Some(filters) = parse_hosted(&leaf.value) {
            hosted.extend(filters);
        } else if REPO_PATH.is_match(&leaf.value) {
            plain.push(leaf);
        } else {
            residual.push(Node::Pattern((*leaf).clone()));
        }
    }
    if hosted.is_empty() {
        return None;
    }

    let mut parameters = basic.parameters.clone();
    parameters.extend(hosted);
    parameters.extend(
        plain
            .iter()
            .map(|p| Parameter::new(FIELD_REPO, regex::escape(p.value.trim_end_matches('/')))),
    );
    Some(Basic::new(parameters, Node::concat(residual)))
}

fn parse_hosted(value: &str) -> Option<Vec<Parameter>> {
    let url = if value.starts_with("http://") || value.starts_with("https://") {
        Url::parse(value).ok()?
    } else if HOST_QUALIFIED.is_match(value) {
        Url::parse(&format!("https://{}", value)).ok()?
    } else {
        return None;
    };
    url.host_str()?;

    let segments: Vec<&str> = url.path_segments()?.filter(|s| !s.is_empty()).collect();
    let [owner, name, rest @ ..] = segments.as_slice() else {
        return None;
    };

    let repo = format!("{}/{}", owner, name.trim_end_matches(".git"));
    let mut filters = vec![Parameter::new(FIELD_REPO, regex::escape(&repo))];
    if let [kind @ ("blob" | "tree"), rev, path @ ..] = rest {
        filters.push(Parameter::new(FIELD_REV, *rev));
        if *kind == "blob" && !path.is_empty() {
            let path = path.join("/");
            filters.push(Parameter::new(
                FIELD_FILE,
                format!("^{}$", regex::escape(&path)),
            ));
        }
    }
    Some(filters)
}
