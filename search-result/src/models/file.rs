use super::{Key, Match, MinimalRepo, RepoMatch, SelectPath, SelectRoot, TypeRank};

/// A single line of a file with the byte spans that matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineMatch {
    pub preview: String,
    /// Zero-based line number.
    pub line_number: i32,
    /// `(offset, length)` pairs inside `preview`.
    pub offset_and_lengths: Vec<(usize, usize)>,
}

/// A file that matched by content or by path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMatch {
    pub repo: MinimalRepo,
    pub commit_id: Option<String>,
    pub path: String,
    pub line_matches: Vec<LineMatch>,
    /// Set when the match came from the file path rather than its content.
    pub path_matched: bool,
}

impl FileMatch {
    pub fn new(repo: MinimalRepo, path: impl Into<String>) -> Self {
        Self {
            repo,
            commit_id: None,
            path: path.into(),
            line_matches: Vec::new(),
            path_matched: false,
        }
    }

    fn range_count(&self) -> usize {
        self.line_matches
            .iter()
            .map(|lm| lm.offset_and_lengths.len())
            .sum()
    }

    pub fn key(&self) -> Key {
        Key {
            commit: self.commit_id.clone().unwrap_or_default(),
            path: self.path.clone(),
            ..Key::new(TypeRank::File, self.repo.name.clone())
        }
    }

    /// Number of highlighted ranges. A path-only match still counts once.
    pub fn result_count(&self) -> usize {
        self.range_count().max(1)
    }

    pub fn limit(&mut self, limit: i64) -> i64 {
        let count = self.range_count() as i64;
        if count == 0 {
            return limit - 1;
        }
        if count <= limit {
            return limit - count;
        }

        let mut budget = limit.max(0) as usize;
        for lm in &mut self.line_matches {
            let keep = lm.offset_and_lengths.len().min(budget);
            lm.offset_and_lengths.truncate(keep);
            budget -= keep;
        }
        self.line_matches
            .retain(|lm| !lm.offset_and_lengths.is_empty());
        0
    }

    pub fn select(mut self, path: &SelectPath) -> Option<Match> {
        match path.root() {
            SelectRoot::Repository => Some(Match::Repo(RepoMatch::new(&self.repo))),
            SelectRoot::File => {
                if path.fields().first().map(String::as_str) == Some("directory") {
                    self.path = match self.path.rsplit_once('/') {
                        Some((dir, _)) => format!("{}/", dir),
                        None => "/".to_string(),
                    };
                }
                self.line_matches.clear();
                Some(Match::File(self))
            }
            SelectRoot::Content => {
                (!self.line_matches.is_empty()).then_some(Match::File(self))
            }
            SelectRoot::Symbol | SelectRoot::Commit => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file_match(ranges_per_line: &[usize]) -> FileMatch {
        let mut fm = FileMatch::new(MinimalRepo::new(1, "github.com/org/repo"), "src/main.rs");
        fm.line_matches = ranges_per_line
            .iter()
            .enumerate()
            .map(|(i, n)| LineMatch {
                preview: "foo foo foo".to_string(),
                line_number: i as i32,
                offset_and_lengths: (0..*n).map(|j| (j * 4, 3)).collect(),
            })
            .collect();
        fm
    }

    #[test]
    fn result_count_counts_ranges() {
        assert_eq!(file_match(&[2, 3]).result_count(), 5);
        assert_eq!(file_match(&[]).result_count(), 1);
    }

    #[test]
    fn limit_trims_across_lines() {
        let mut fm = file_match(&[2, 3, 1]);
        assert_eq!(fm.limit(4), 0);
        assert_eq!(fm.result_count(), 4);
        assert_eq!(fm.line_matches.len(), 2);
        assert_eq!(fm.line_matches[1].offset_and_lengths.len(), 2);
    }

    #[test]
    fn limit_under_budget() {
        let mut fm = file_match(&[1, 1]);
        assert_eq!(fm.limit(10), 8);
        let mut path_only = file_match(&[]);
        assert_eq!(path_only.limit(10), 9);
    }

    #[test]
    fn select_projections() {
        let fm = file_match(&[1]);
        match fm.clone().select(&"file".parse().unwrap()) {
            Some(Match::File(f)) => assert!(f.line_matches.is_empty()),
            other => panic!("unexpected {:?}", other),
        }
        match fm.clone().select(&"file.directory".parse().unwrap()) {
            Some(Match::File(f)) => assert_eq!(f.path, "src/"),
            other => panic!("unexpected {:?}", other),
        }
        assert!(fm.clone().select(&"content".parse().unwrap()).is_some());
        assert!(file_match(&[]).select(&"content".parse().unwrap()).is_none());
        assert!(fm.select(&"commit".parse().unwrap()).is_none());
    }
}
