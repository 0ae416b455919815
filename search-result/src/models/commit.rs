use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::{
    Key, Location, Match, MatchError, MatchedString, MinimalRepo, Range, RepoMatch, SelectPath,
    SelectRoot, TypeRank,
};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommitId(pub String);

impl CommitId {
    /// Abbreviated seven character form of the commit id.
    pub fn short(&self) -> &str {
        match self.0.char_indices().nth(7) {
            Some((idx, _)) => &self.0[..idx],
            None => &self.0,
        }
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub name: String,
    pub email: String,
    #[serde(with = "time::serde::rfc3339")]
    pub date: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub id: CommitId,
    pub author: Signature,
    #[serde(default)]
    pub committer: Option<Signature>,
    pub message: String,
    #[serde(default)]
    pub parents: Vec<CommitId>,
}

impl Commit {
    /// First line of the commit message.
    pub fn subject(&self) -> &str {
        self.message.lines().next().unwrap_or_default()
    }
}

/// The part of a commit a commit match highlights. A match previews either its
/// message or its diff, never both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitPreview {
    Message(MatchedString),
    Diff(MatchedString),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitMatch {
    pub commit: Commit,
    pub repo: MinimalRepo,
    /// Git references that point at this commit. May be empty because
    /// resolving them is expensive.
    pub refs: Vec<String>,
    /// The input revisions that were used to find this commit.
    pub source_refs: Vec<String>,
    pub preview: Option<CommitPreview>,
    /// Files modified by the commit, populated when the backend is asked for
    /// them.
    pub modified_files: Vec<String>,
}

const DIFF_FENCE: &str = "```diff\n";
const MESSAGE_FENCE: &str = "```COMMIT_EDITMSG\n";

impl CommitMatch {
    pub fn new(commit: Commit, repo: MinimalRepo, preview: CommitPreview) -> Self {
        Self {
            commit,
            repo,
            refs: Vec::new(),
            source_refs: Vec::new(),
            preview: Some(preview),
            modified_files: Vec::new(),
        }
    }

    pub fn is_diff(&self) -> bool {
        matches!(self.preview, Some(CommitPreview::Diff(_)))
    }

    pub fn diff_preview(&self) -> Option<&MatchedString> {
        match &self.preview {
            Some(CommitPreview::Diff(ms)) => Some(ms),
            _ => None,
        }
    }

    pub fn message_preview(&self) -> Option<&MatchedString> {
        match &self.preview {
            Some(CommitPreview::Message(ms)) => Some(ms),
            _ => None,
        }
    }

    /// Markdown rendering of the preview, with ranges shifted past the fence.
    pub fn body(&self) -> Option<MatchedString> {
        let (fence, ms) = match self.preview.as_ref()? {
            CommitPreview::Diff(ms) => (DIFF_FENCE, ms),
            CommitPreview::Message(ms) => (MESSAGE_FENCE, ms),
        };
        Some(MatchedString {
            content: format!("{}{}\n```", fence, ms.content),
            matched_ranges: ms.shifted(Location::new(fence.len(), 1, 0)),
        })
    }

    /// The number of highlights, or 1 for matches without highlights (for
    /// example `type:commit after:"1 week ago"`).
    pub fn result_count(&self) -> usize {
        let count = match &self.preview {
            Some(CommitPreview::Diff(ms)) | Some(CommitPreview::Message(ms)) => {
                ms.matched_ranges.len()
            }
            None => 0,
        };
        count.max(1)
    }

    pub fn try_limit(&mut self, limit: i64) -> Result<i64, MatchError> {
        let ms = match &mut self.preview {
            Some(CommitPreview::Diff(ms)) | Some(CommitPreview::Message(ms)) => ms,
            None => return Err(MatchError::NoCountableContent(self.commit.id.to_string())),
        };
        let len = ms.matched_ranges.len() as i64;
        if len == 0 {
            Ok(limit - 1)
        } else if len > limit {
            ms.matched_ranges.truncate(limit.max(0) as usize);
            Ok(0)
        } else {
            Ok(limit - len)
        }
    }

    pub fn select(self, path: &SelectPath) -> Option<Match> {
        match path.root() {
            SelectRoot::Repository => Some(Match::Repo(RepoMatch::new(&self.repo))),
            SelectRoot::Commit => {
                let fields = path.fields();
                match fields.first().map(String::as_str) {
                    Some("diff") => {
                        if !self.is_diff() {
                            return None;
                        }
                        match fields.get(1) {
                            None => Some(Match::Commit(self)),
                            Some(kind) => select_commit_diff_kind(self, kind),
                        }
                    }
                    _ => Some(Match::Commit(self)),
                }
            }
            _ => None,
        }
    }

    /// Merge message highlights from a duplicate of this match. Diff
    /// highlights are not merged because their offsets refer to rendered
    /// markdown and do not line up.
    pub fn append_matches(&mut self, src: &CommitMatch) {
        if let (Some(CommitPreview::Message(dst)), Some(CommitPreview::Message(src))) =
            (&mut self.preview, &src.preview)
        {
            dst.matched_ranges.extend(src.matched_ranges.iter().copied());
        }
    }

    pub fn key(&self) -> Key {
        let type_rank = if self.is_diff() {
            TypeRank::Diff
        } else {
            TypeRank::Commit
        };
        Key {
            author_date: Some(self.commit.author.date),
            commit: self.commit.id.0.clone(),
            ..Key::new(type_rank, self.repo.name.clone())
        }
    }

    pub fn url(&self) -> String {
        format!("{}/-/commit/{}", self.repo.url(), self.commit.id)
    }

    pub fn label(&self) -> String {
        let commit_url = self.url();
        format!(
            "[{}]({}) › [{}]({}): [{}]({})",
            display_repo_name(&self.repo.name),
            self.repo.url(),
            self.commit.author.name,
            commit_url,
            self.commit.subject(),
            commit_url,
        )
    }

    pub fn detail(&self) -> String {
        self.detail_at(OffsetDateTime::now_utc())
    }

    pub fn detail_at(&self, now: OffsetDateTime) -> String {
        format!(
            "[`{}` {}]({})",
            self.commit.id.short(),
            time_ago(self.commit.author.date, now),
            self.url()
        )
    }
}

/// Drops the host from `host/owner/name` style repository names.
fn display_repo_name(repo_path: &str) -> String {
    let parts: Vec<&str> = repo_path.split('/').collect();
    if parts.len() >= 3 && parts[0].contains('.') {
        return parts[1..].join("/");
    }
    repo_path.to_string()
}

fn time_ago(then: OffsetDateTime, now: OffsetDateTime) -> String {
    const UNITS: [(i64, &str); 6] = [
        (365 * 24 * 3600, "year"),
        (30 * 24 * 3600, "month"),
        (7 * 24 * 3600, "week"),
        (24 * 3600, "day"),
        (3600, "hour"),
        (60, "minute"),
    ];

    let secs = (now - then).whole_seconds().max(0);
    for (size, unit) in UNITS {
        let n = secs / size;
        if n == 1 {
            return format!("1 {} ago", unit);
        }
        if n > 1 {
            return format!("{} {}s ago", n, unit);
        }
    }
    "just now".to_string()
}

/// Highlight ranges that sit on lines starting with `prefix`.
fn select_modified_lines(lines: &[&str], highlights: &[Range], prefix: &str) -> Vec<Range> {
    if lines.is_empty() {
        return highlights.to_vec();
    }
    highlights
        .iter()
        .filter(|h| h.start.line >= 0)
        .filter(|h| {
            lines
                .get(h.start.line as usize)
                .is_some_and(|line| line.starts_with(prefix))
        })
        .copied()
        .collect()
}

/// Keeps a diff match only when it touches added (resp. removed) lines, and
/// restricts its highlights to those lines.
fn select_commit_diff_kind(mut c: CommitMatch, field: &str) -> Option<Match> {
    let prefix = match field {
        "added" => "+",
        "removed" => "-",
        _ => return None,
    };
    let Some(CommitPreview::Diff(diff)) = &mut c.preview else {
        return None;
    };
    let lines: Vec<&str> = diff.content.split('\n').collect();

    if diff.matched_ranges.is_empty() {
        // No pattern was given, so filter on the presence of modified lines.
        if lines.iter().any(|l| l.starts_with(prefix)) {
            return Some(Match::Commit(c));
        }
        return None;
    }

    let highlights = select_modified_lines(&lines, &diff.matched_ranges, prefix);
    if highlights.is_empty() {
        return None;
    }
    diff.matched_ranges = highlights;
    Some(Match::Commit(c))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use time::macros::datetime;

    pub(crate) fn make_commit(id: &str, message: &str) -> Commit {
        Commit {
            id: CommitId(id.to_string()),
            author: Signature {
                name: "Ada".to_string(),
                email: "ada@example.com".to_string(),
                date: datetime!(2023-03-01 12:00 UTC),
            },
            committer: None,
            message: message.to_string(),
            parents: vec![],
        }
    }

    fn line_range(line: i32, start: usize, end: usize) -> Range {
        Range::new(
            Location::new(0, line, start),
            Location::new(0, line, end),
        )
    }

    pub(crate) fn diff_match(ranges: usize) -> CommitMatch {
        let content = "a.go b.go\n@@ -1,1 +1,1 @@\n-old\n+new".to_string();
        CommitMatch::new(
            make_commit("abcdef0123456789", "fix things"),
            MinimalRepo::new(1, "github.com/org/repo"),
            CommitPreview::Diff(MatchedString::new(
                content,
                (0..ranges).map(|i| line_range(3, i, i + 1)).collect(),
            )),
        )
    }

    #[test]
    fn limit_truncates_diff_ranges() {
        let mut cm = diff_match(10);
        assert_eq!(cm.result_count(), 10);
        assert_eq!(cm.try_limit(4).unwrap(), 0);
        assert_eq!(cm.diff_preview().unwrap().matched_ranges.len(), 4);
        assert_eq!(cm.result_count(), 4);
    }

    #[test]
    fn limit_returns_remaining_budget() {
        let mut cm = diff_match(3);
        assert_eq!(cm.try_limit(10).unwrap(), 7);
        assert_eq!(cm.diff_preview().unwrap().matched_ranges.len(), 3);

        let mut empty = diff_match(0);
        assert_eq!(empty.result_count(), 1);
        assert_eq!(empty.try_limit(5).unwrap(), 4);
    }

    #[test]
    fn limit_without_preview_is_an_invariant_violation() {
        let mut cm = diff_match(1);
        cm.preview = None;
        assert!(matches!(
            cm.try_limit(3),
            Err(MatchError::NoCountableContent(_))
        ));
    }

    #[test]
    fn key_uses_diff_rank_for_diff_previews() {
        let cm = diff_match(1);
        let key = cm.key();
        assert_eq!(key.type_rank, TypeRank::Diff);
        assert_eq!(key.repo, "github.com/org/repo");
        assert_eq!(key.commit, "abcdef0123456789");

        let message = CommitMatch::new(
            make_commit("1234", "msg"),
            MinimalRepo::new(1, "r"),
            CommitPreview::Message(MatchedString::new("msg", vec![])),
        );
        assert_eq!(message.key().type_rank, TypeRank::Commit);
    }

    #[test]
    fn select_repo_projects_to_repo_match() {
        let cm = diff_match(2);
        let selected = cm.select(&"repo".parse().unwrap()).unwrap();
        match selected {
            Match::Repo(rm) => assert_eq!(rm.name, "github.com/org/repo"),
            other => panic!("unexpected match {:?}", other),
        }
    }

    #[test]
    fn select_diff_added_keeps_added_highlights() {
        let mut cm = diff_match(0);
        if let Some(CommitPreview::Diff(ms)) = &mut cm.preview {
            ms.matched_ranges = vec![line_range(2, 1, 4), line_range(3, 1, 4)];
        }
        let added = cm.clone().select(&"commit.diff.added".parse().unwrap());
        match added {
            Some(Match::Commit(c)) => {
                assert_eq!(c.diff_preview().unwrap().matched_ranges, vec![line_range(3, 1, 4)])
            }
            other => panic!("unexpected {:?}", other),
        }

        let removed = cm.select(&"commit.diff.removed".parse().unwrap());
        match removed {
            Some(Match::Commit(c)) => {
                assert_eq!(c.diff_preview().unwrap().matched_ranges, vec![line_range(2, 1, 4)])
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn select_diff_on_message_match_is_none() {
        let cm = CommitMatch::new(
            make_commit("1234", "msg"),
            MinimalRepo::new(1, "r"),
            CommitPreview::Message(MatchedString::new("msg", vec![])),
        );
        assert!(cm.clone().select(&"commit.diff".parse().unwrap()).is_none());
        assert!(cm.select(&"commit".parse().unwrap()).is_some());
    }

    #[test]
    fn select_is_idempotent() {
        let path: SelectPath = "commit.diff.added".parse().unwrap();
        let mut cm = diff_match(0);
        if let Some(CommitPreview::Diff(ms)) = &mut cm.preview {
            ms.matched_ranges = vec![line_range(2, 0, 1), line_range(3, 0, 1)];
        }
        let once = cm.select(&path).unwrap();
        let twice = once.clone().select(&path).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn body_wraps_preview_in_fence() {
        let cm = CommitMatch::new(
            make_commit("1234", "msg"),
            MinimalRepo::new(1, "r"),
            CommitPreview::Message(MatchedString::new(
                "fix bug",
                vec![line_range(0, 4, 7)],
            )),
        );
        let body = cm.body().unwrap();
        assert_eq!(body.content, "```COMMIT_EDITMSG\nfix bug\n```");
        assert_eq!(body.matched_ranges[0].start.line, 1);
        assert_eq!(body.matched_ranges[0].start.offset, MESSAGE_FENCE.len());
    }

    #[test]
    fn label_and_detail() {
        let cm = diff_match(1);
        assert_eq!(
            cm.label(),
            "[org/repo](/github.com/org/repo) › [Ada](/github.com/org/repo/-/commit/abcdef0123456789): [fix things](/github.com/org/repo/-/commit/abcdef0123456789)"
        );
        assert_eq!(
            cm.detail_at(datetime!(2023-03-04 12:00 UTC)),
            "[`abcdef0` 3 days ago](/github.com/org/repo/-/commit/abcdef0123456789)"
        );
    }

    #[test]
    fn append_matches_merges_message_highlights() {
        let preview = |r| CommitPreview::Message(MatchedString::new("fix bug", vec![r]));
        let mut a = CommitMatch::new(
            make_commit("1", "fix bug"),
            MinimalRepo::new(1, "r"),
            preview(line_range(0, 0, 3)),
        );
        let b = CommitMatch::new(
            make_commit("1", "fix bug"),
            MinimalRepo::new(1, "r"),
            preview(line_range(0, 4, 7)),
        );
        a.append_matches(&b);
        assert_eq!(a.result_count(), 2);
    }
}
