use std::collections::HashMap;

use super::{Key, Match};

/// Merges matches that share a key. The first occurrence keeps its position;
/// later commit matches contribute their message highlights and file matches
/// their line matches.
#[derive(Debug, Default)]
pub struct Deduper {
    index: HashMap<Key, usize>,
    matches: Vec<Match>,
}

impl Deduper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seen(&self, m: &Match) -> bool {
        self.index.contains_key(&m.key())
    }

    pub fn add(&mut self, m: Match) {
        let key = m.key();
        match self.index.get(&key) {
            Some(&i) => merge(&mut self.matches[i], m),
            None => {
                self.index.insert(key, self.matches.len());
                self.matches.push(m);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    pub fn results(self) -> Vec<Match> {
        self.matches
    }
}

fn merge(dst: &mut Match, src: Match) {
    match (dst, src) {
        (Match::Commit(dst), Match::Commit(src)) => dst.append_matches(&src),
        (Match::File(dst), Match::File(src)) => {
            for lm in src.line_matches {
                if !dst.line_matches.contains(&lm) {
                    dst.line_matches.push(lm);
                }
            }
            dst.line_matches.sort_by_key(|lm| lm.line_number);
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FileMatch, LineMatch, MinimalRepo, RepoMatch};

    #[test]
    fn merges_duplicate_keys() {
        let repo = MinimalRepo::new(1, "a/b");
        let mut deduper = Deduper::new();
        deduper.add(Match::Repo(RepoMatch::new(&repo)));
        deduper.add(Match::Repo(RepoMatch::new(&repo)));
        assert_eq!(deduper.len(), 1);
        assert!(deduper.seen(&Match::Repo(RepoMatch::new(&repo))));
    }

    #[test]
    fn merges_file_line_matches() {
        let line = |n| LineMatch {
            preview: "foo".to_string(),
            line_number: n,
            offset_and_lengths: vec![(0, 3)],
        };
        let mut a = FileMatch::new(MinimalRepo::new(1, "a/b"), "main.go");
        a.line_matches.push(line(4));
        let mut b = a.clone();
        b.line_matches = vec![line(1), line(4)];

        let mut deduper = Deduper::new();
        deduper.add(Match::File(a));
        deduper.add(Match::File(b));
        let results = deduper.results();
        assert_eq!(results.len(), 1);
        match &results[0] {
            Match::File(fm) => {
                let lines: Vec<i32> = fm.line_matches.iter().map(|l| l.line_number).collect();
                assert_eq!(lines, vec![1, 4]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
