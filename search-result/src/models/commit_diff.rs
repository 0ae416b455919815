use std::sync::LazyLock;

use regex::Regex;

use super::{
    Commit, CommitMatch, Key, Match, MinimalRepo, PathStatus, RepoMatch, SelectPath, SelectRoot,
    TypeRank,
};

const DEV_NULL: &str = "/dev/null";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DiffParseError {
    #[error("invalid diff file header: {0}")]
    InvalidFileHeader(String),
    #[error("invalid diff hunk header: {0}")]
    InvalidHunkHeader(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Hunk {
    pub orig_start: u32,
    pub orig_lines: u32,
    pub new_start: u32,
    pub new_lines: u32,
    pub section: String,
    pub lines: Vec<String>,
}

/// The diff of a single file inside a commit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileDiff {
    pub orig_name: String,
    pub new_name: String,
    pub hunks: Vec<Hunk>,
}

impl FileDiff {
    fn has_line_with_prefix(&self, prefix: &str) -> bool {
        self.hunks
            .iter()
            .flat_map(|h| h.lines.iter())
            .any(|l| l.starts_with(prefix))
    }
}

/// One file of a commit diff, produced by splitting a diff commit match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitDiffMatch {
    pub commit: Commit,
    pub repo: MinimalRepo,
    pub diff: FileDiff,
}

impl CommitDiffMatch {
    /// The created path for added files, the deleted path for deleted files
    /// and the original path otherwise.
    pub fn path(&self) -> &str {
        if self.diff.orig_name == DEV_NULL {
            return &self.diff.new_name;
        }
        &self.diff.orig_name
    }

    pub fn path_status(&self) -> PathStatus {
        if self.diff.orig_name == DEV_NULL {
            PathStatus::Added
        } else if self.diff.new_name == DEV_NULL {
            PathStatus::Deleted
        } else {
            PathStatus::Modified
        }
    }

    pub fn key(&self) -> Key {
        Key {
            author_date: Some(self.commit.author.date),
            commit: self.commit.id.0.clone(),
            path: self.path().to_string(),
            path_status: self.path_status(),
            ..Key::new(TypeRank::Diff, self.repo.name.clone())
        }
    }

    /// A file diff counts as a single hit.
    pub fn result_count(&self) -> usize {
        1
    }

    pub fn limit(&mut self, limit: i64) -> i64 {
        limit - 1
    }

    pub fn select(self, path: &SelectPath) -> Option<Match> {
        match path.root() {
            SelectRoot::Repository => Some(Match::Repo(RepoMatch::new(&self.repo))),
            SelectRoot::Commit => match path.fields() {
                [] => Some(Match::CommitDiff(self)),
                [diff] if diff == "diff" => Some(Match::CommitDiff(self)),
                [diff, kind] if diff == "diff" => {
                    let prefix = match kind.as_str() {
                        "added" => "+",
                        "removed" => "-",
                        _ => return None,
                    };
                    self.diff
                        .has_line_with_prefix(prefix)
                        .then_some(Match::CommitDiff(self))
                }
                _ => None,
            },
            _ => None,
        }
    }
}

impl CommitMatch {
    /// Splits a diff preview into one match per modified file.
    pub fn to_diff_matches(&self) -> Result<Vec<CommitDiffMatch>, DiffParseError> {
        let Some(preview) = self.diff_preview() else {
            return Ok(Vec::new());
        };
        Ok(parse_diff_preview(&preview.content)?
            .into_iter()
            .map(|diff| CommitDiffMatch {
                commit: self.commit.clone(),
                repo: self.repo.clone(),
                diff,
            })
            .collect())
    }
}

/// Replace every diff commit match with its per-file diff matches. Previews
/// that fail to parse are skipped.
pub fn to_commit_diff_matches(matches: Vec<Match>) -> Vec<Match> {
    let mut out = Vec::with_capacity(matches.len());
    for m in matches {
        match m {
            Match::Commit(cm) if cm.is_diff() => match cm.to_diff_matches() {
                Ok(diffs) => out.extend(diffs.into_iter().map(Match::CommitDiff)),
                Err(err) => {
                    tracing::warn!(commit = %cm.commit.id, error = %err, "Skipping unparsable diff preview");
                }
            },
            other => out.push(other),
        }
    }
    out
}

static HUNK_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^@@ -(\d+),(\d+) \+(\d+),(\d+) @@ ?(.*)$").unwrap());

#[derive(PartialEq)]
enum ParseState {
    Init,
    InDiff,
    InHunk,
}

/// Parse the compact diff format used by commit diff previews:
///
/// ```text
/// old/path new/path
/// @@ -1,2 +1,3 @@ section
///  context
/// +added
/// ```
pub fn parse_diff_preview(preview: &str) -> Result<Vec<FileDiff>, DiffParseError> {
    let mut files = Vec::new();
    let mut current = FileDiff::default();
    let mut state = ParseState::Init;

    for line in preview.split('\n').filter(|l| !l.is_empty()) {
        match state {
            ParseState::Init => {
                current = parse_file_header(line)?;
                state = ParseState::InDiff;
            }
            ParseState::InDiff => {
                current.hunks.push(parse_hunk_header(line)?);
                state = ParseState::InHunk;
            }
            ParseState::InHunk => match line.as_bytes()[0] {
                b'-' | b'+' | b' ' => {
                    if let Some(hunk) = current.hunks.last_mut() {
                        hunk.lines.push(line.to_string());
                    }
                }
                b'@' => current.hunks.push(parse_hunk_header(line)?),
                _ => {
                    files.push(std::mem::replace(&mut current, parse_file_header(line)?));
                    state = ParseState::InDiff;
                }
            },
        }
    }
    if state != ParseState::Init {
        files.push(current);
    }

    Ok(files)
}

fn parse_file_header(line: &str) -> Result<FileDiff, DiffParseError> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    match fields.as_slice() {
        [orig, new] => Ok(FileDiff {
            orig_name: orig.to_string(),
            new_name: new.to_string(),
            hunks: Vec::new(),
        }),
        _ => Err(DiffParseError::InvalidFileHeader(line.to_string())),
    }
}

fn parse_hunk_header(line: &str) -> Result<Hunk, DiffParseError> {
    let invalid = || DiffParseError::InvalidHunkHeader(line.to_string());
    let caps = HUNK_HEADER.captures(line).ok_or_else(invalid)?;
    let num = |i: usize| caps[i].parse::<u32>().map_err(|_| invalid());

    Ok(Hunk {
        orig_start: num(1)?,
        orig_lines: num(2)?,
        new_start: num(3)?,
        new_lines: num(4)?,
        section: caps[5].to_string(),
        lines: Vec::new(),
    })
}
