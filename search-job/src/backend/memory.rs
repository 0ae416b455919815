//! In-memory backend over a JSON corpus, used by the CLI and tests.

use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use search_result::{
    Commit, CommitMatch, CommitPreview, FileMatch, LineMatch, Location, Match, MatchedString,
    Range,
};
use serde::Deserialize;

use super::{
    CommitSearcher, ExcludedRepos, IndexedRepos, IndexedSearcher, Repo, RepoPage, RepoStore,
    Result, UnindexedSearcher,
};
use crate::context::SearchContext;
use crate::error::BackendError;
use crate::query::{compile_regex, CommitRequest, Node, RepoOptions, TextRequest};
use crate::streaming::{SearchEvent, Sender};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Corpus {
    pub repos: Vec<RepoFixture>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RepoFixture {
    #[serde(flatten)]
    pub repo: Repo,
    #[serde(default = "default_indexed")]
    pub indexed: bool,
    #[serde(default)]
    pub files: Vec<FileFixture>,
    #[serde(default)]
    pub commits: Vec<CommitFixture>,
}

fn default_indexed() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct FileFixture {
    pub path: String,
    pub content: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommitFixture {
    #[serde(flatten)]
    pub commit: Commit,
    /// Rendered diff, one `a b` header line per file followed by its hunks.
    #[serde(default)]
    pub diff: String,
    #[serde(default)]
    pub files: Vec<String>,
}

/// Backend serving all search interfaces from a [`Corpus`].
///
/// # Examples
///
/// ```
/// use search_job::backend::memory::InMemoryBackend;
///
/// let backend = InMemoryBackend::from_json(r#"{"repos": []}"#).unwrap();
/// let slow = backend.with_latency(std::time::Duration::from_millis(5));
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryBackend {
    corpus: Corpus,
    latency: Option<Duration>,
    index_unavailable: bool,
}

impl InMemoryBackend {
    pub fn new(corpus: Corpus) -> Self {
        Self {
            corpus,
            ..Self::default()
        }
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        Ok(Self::new(serde_json::from_str(json)?))
    }

    /// Delay every repository a searcher visits by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Make the indexed searcher report itself as unavailable.
    pub fn with_index_unavailable(mut self) -> Self {
        self.index_unavailable = true;
        self
    }

    fn fixture(&self, repo: &Repo) -> Option<&RepoFixture> {
        self.corpus.repos.iter().find(|f| f.repo.id == repo.id)
    }

    fn matching_repos(&self, opts: &RepoOptions) -> Result<Vec<&RepoFixture>> {
        let (include, exclude) = opts
            .compile()
            .map_err(|e| BackendError::InvalidPattern(e.to_string()))?;
        let mut repos: Vec<&RepoFixture> = self
            .corpus
            .repos
            .iter()
            .filter(|f| {
                include.iter().all(|r| r.is_match(&f.repo.name))
                    && !exclude.iter().any(|r| r.is_match(&f.repo.name))
            })
            .collect();
        repos.sort_by(|a, b| a.repo.name.cmp(&b.repo.name));
        Ok(repos)
    }

    async fn pause(&self, ctx: &SearchContext) -> Result<()> {
        if let Some(latency) = self.latency {
            tokio::select! {
                _ = ctx.done() => return Err(BackendError::Cancelled),
                _ = tokio::time::sleep(latency) => {}
            }
        }
        if ctx.is_cancelled() {
            return Err(BackendError::Cancelled);
        }
        Ok(())
    }

    async fn search_files(
        &self,
        ctx: &SearchContext,
        request: &TextRequest,
        repos: &[Repo],
        sink: &dyn Sender,
    ) -> Result<()> {
        let matcher = match &request.pattern {
            Some(node) => Some(Matcher::new(node, request.is_case_sensitive)?),
            None => None,
        };
        let include = compile_all(&request.include_patterns, request.is_case_sensitive)?;
        let exclude = compile_all(&request.exclude_patterns, request.is_case_sensitive)?;

        let mut remaining = request.file_match_limit;
        for repo in repos {
            if remaining <= 0 {
                break;
            }
            self.pause(ctx).await?;
            let Some(fixture) = self.fixture(repo) else {
                continue;
            };

            let mut results = Vec::new();
            for file in &fixture.files {
                if !include.iter().all(|r| r.is_match(&file.path))
                    || exclude.iter().any(|r| r.is_match(&file.path))
                    || !request
                        .languages
                        .iter()
                        .all(|l| has_language(&file.path, l))
                {
                    continue;
                }
                let Some(fm) = file_match(repo, file, matcher.as_ref(), request, !include.is_empty())
                else {
                    continue;
                };
                results.push(Match::File(fm));
                remaining -= 1;
                if remaining <= 0 {
                    break;
                }
            }

            if !results.is_empty() && !ctx.send(sink, SearchEvent::results(results)).await {
                return Err(BackendError::Cancelled);
            }
        }
        Ok(())
    }
}

fn compile_all(patterns: &[String], case_sensitive: bool) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|p| compile_regex(p, case_sensitive))
        .collect::<std::result::Result<_, _>>()
        .map_err(|e| BackendError::InvalidPattern(e.to_string()))
}

fn has_language(path: &str, language: &str) -> bool {
    let extensions: &[&str] = match language.to_ascii_lowercase().as_str() {
        "rust" => &["rs"],
        "go" => &["go"],
        "python" => &["py"],
        "javascript" => &["js", "jsx", "mjs"],
        "typescript" => &["ts", "tsx"],
        "markdown" => &["md"],
        _ => return path.ends_with(&format!(".{}", language)),
    };
    path.rsplit_once('.')
        .is_some_and(|(_, ext)| extensions.contains(&ext))
}

fn file_match(
    repo: &Repo,
    file: &FileFixture,
    matcher: Option<&Matcher>,
    request: &TextRequest,
    has_file_filter: bool,
) -> Option<FileMatch> {
    let mut fm = FileMatch::new(repo.minimal(), file.path.clone());
    fm.commit_id = request.rev.clone();

    let Some(matcher) = matcher else {
        // Without a pattern only the file filters select files.
        fm.path_matched = true;
        return has_file_filter.then_some(fm);
    };

    if request.pattern_matches_content && matcher.is_match(&file.content) {
        fm.line_matches = matcher.line_matches(&file.content);
    }
    if fm.line_matches.is_empty() {
        if request.pattern_matches_path && matcher.is_match(&file.path) {
            fm.path_matched = true;
        } else if !(request.pattern_matches_content && matcher.is_match(&file.content)) {
            return None;
        }
    }
    Some(fm)
}

/// Evaluates a pattern expression against text.
#[derive(Debug)]
enum Matcher {
    Term { re: Regex, negated: bool },
    And(Vec<Matcher>),
    Or(Vec<Matcher>),
}

impl Matcher {
    fn new(node: &Node, case_sensitive: bool) -> Result<Self> {
        let compile = |source: &str| {
            compile_regex(source, case_sensitive)
                .map_err(|e| BackendError::InvalidPattern(e.to_string()))
        };
        Ok(match node {
            Node::Pattern(p) => Matcher::Term {
                re: compile(&p.to_regex_source())?,
                negated: p.negated,
            },
            Node::Concat(nodes) => match node.flat_leaves() {
                // A phrase: terms separated by any whitespace.
                Some(leaves) if leaves.iter().all(|p| !p.negated) => {
                    let source = leaves
                        .iter()
                        .map(|p| p.to_regex_source())
                        .collect::<Vec<_>>()
                        .join(r"\s+");
                    Matcher::Term {
                        re: compile(&source)?,
                        negated: false,
                    }
                }
                _ => Matcher::And(
                    nodes
                        .iter()
                        .map(|n| Matcher::new(n, case_sensitive))
                        .collect::<Result<_>>()?,
                ),
            },
            Node::And(nodes) => Matcher::And(
                nodes
                    .iter()
                    .map(|n| Matcher::new(n, case_sensitive))
                    .collect::<Result<_>>()?,
            ),
            Node::Or(nodes) => Matcher::Or(
                nodes
                    .iter()
                    .map(|n| Matcher::new(n, case_sensitive))
                    .collect::<Result<_>>()?,
            ),
        })
    }

    fn is_match(&self, text: &str) -> bool {
        match self {
            Matcher::Term { re, negated } => re.is_match(text) != *negated,
            Matcher::And(ms) => ms.iter().all(|m| m.is_match(text)),
            Matcher::Or(ms) => ms.iter().any(|m| m.is_match(text)),
        }
    }

    fn positive_terms<'a>(&'a self, out: &mut Vec<&'a Regex>) {
        match self {
            Matcher::Term { re, negated: false } => out.push(re),
            Matcher::Term { negated: true, .. } => {}
            Matcher::And(ms) | Matcher::Or(ms) => {
                for m in ms {
                    m.positive_terms(out);
                }
            }
        }
    }

    /// Byte ranges of every positive term in `text`, sorted by offset.
    fn ranges(&self, text: &str) -> Vec<(usize, usize)> {
        let mut terms = Vec::new();
        self.positive_terms(&mut terms);
        let mut ranges: Vec<(usize, usize)> = terms
            .iter()
            .flat_map(|re| re.find_iter(text).filter(|m| !m.is_empty()))
            .map(|m| (m.start(), m.end()))
            .collect();
        ranges.sort_unstable();
        ranges.dedup();
        ranges
    }

    fn line_matches(&self, content: &str) -> Vec<LineMatch> {
        content
            .lines()
            .enumerate()
            .filter_map(|(i, line)| {
                let ranges = self.ranges(line);
                (!ranges.is_empty()).then(|| LineMatch {
                    preview: line.to_string(),
                    line_number: i as i32,
                    offset_and_lengths: ranges.iter().map(|(s, e)| (*s, e - s)).collect(),
                })
            })
            .collect()
    }

    fn matched_string(&self, content: &str) -> MatchedString {
        let ranges = self
            .ranges(content)
            .into_iter()
            .map(|(s, e)| Range::new(location(content, s), location(content, e)))
            .collect();
        MatchedString::new(content, ranges)
    }
}

fn location(content: &str, offset: usize) -> Location {
    let before = &content[..offset];
    let line = before.matches('\n').count() as i32;
    let column = before
        .rfind('\n')
        .map_or(before.chars().count(), |nl| before[nl + 1..].chars().count());
    Location::new(offset, line, column)
}

#[async_trait]
impl RepoStore for InMemoryBackend {
    async fn list_repos(
        &self,
        ctx: &SearchContext,
        opts: &RepoOptions,
        offset: usize,
        limit: usize,
    ) -> Result<RepoPage> {
        if ctx.is_cancelled() {
            return Err(BackendError::Cancelled);
        }
        let repos: Vec<Repo> = self
            .matching_repos(opts)?
            .into_iter()
            .filter(|f| opts.fork.admits(f.repo.fork) && opts.archived.admits(f.repo.archived))
            .map(|f| f.repo.clone())
            .collect();
        let end = offset.saturating_add(limit.max(1)).min(repos.len());
        let page = repos.get(offset..end).map(<[Repo]>::to_vec).unwrap_or_default();
        Ok(RepoPage {
            repos: page,
            next: (end < repos.len()).then_some(end),
        })
    }

    async fn excluded_repos(
        &self,
        ctx: &SearchContext,
        opts: &RepoOptions,
    ) -> Result<ExcludedRepos> {
        if ctx.is_cancelled() {
            return Err(BackendError::Cancelled);
        }
        let mut excluded = ExcludedRepos::default();
        for f in self.matching_repos(opts)? {
            if f.repo.fork && !opts.fork.admits(true) {
                excluded.forks += 1;
            } else if f.repo.archived && !opts.archived.admits(true) {
                excluded.archived += 1;
            }
        }
        Ok(excluded)
    }
}

#[async_trait]
impl IndexedSearcher for InMemoryBackend {
    async fn partition(&self, _ctx: &SearchContext, repos: Vec<Repo>) -> Result<IndexedRepos> {
        if self.index_unavailable {
            return Err(BackendError::Unavailable("index is offline".to_string()));
        }
        let (indexed, unindexed): (Vec<Repo>, Vec<Repo>) = repos
            .into_iter()
            .partition(|r| self.fixture(r).is_some_and(|f| f.indexed));
        Ok(IndexedRepos { indexed, unindexed })
    }

    async fn search(
        &self,
        ctx: &SearchContext,
        request: &TextRequest,
        repos: &[Repo],
        sink: &dyn Sender,
    ) -> Result<()> {
        if self.index_unavailable {
            return Err(BackendError::Unavailable("index is offline".to_string()));
        }
        self.search_files(ctx, request, repos, sink).await
    }
}

#[async_trait]
impl UnindexedSearcher for InMemoryBackend {
    async fn search(
        &self,
        ctx: &SearchContext,
        request: &TextRequest,
        repos: &[Repo],
        sink: &dyn Sender,
    ) -> Result<()> {
        self.search_files(ctx, request, repos, sink).await
    }
}

#[async_trait]
impl CommitSearcher for InMemoryBackend {
    async fn search(
        &self,
        ctx: &SearchContext,
        request: &CommitRequest,
        repos: &[Repo],
        sink: &dyn Sender,
    ) -> Result<()> {
        let matcher = match &request.pattern {
            Some(node) => Some(Matcher::new(node, request.is_case_sensitive)?),
            None => None,
        };
        let authors = compile_all(&request.authors, false)?;
        let messages = compile_all(&request.messages, request.is_case_sensitive)?;
        let files = compile_all(&request.include_patterns, request.is_case_sensitive)?;

        let mut remaining = request.limit;
        for repo in repos {
            if remaining <= 0 {
                break;
            }
            self.pause(ctx).await?;
            let Some(fixture) = self.fixture(repo) else {
                continue;
            };

            let mut results = Vec::new();
            for c in &fixture.commits {
                let commit = &c.commit;
                let author = format!("{} <{}>", commit.author.name, commit.author.email);
                let in_range = request.after.is_none_or(|t| commit.author.date >= t)
                    && request.before.is_none_or(|t| commit.author.date <= t);
                if !in_range
                    || !authors.iter().all(|r| r.is_match(&author))
                    || !messages.iter().all(|r| r.is_match(&commit.message))
                    || !files
                        .iter()
                        .all(|r| c.files.iter().any(|f| r.is_match(f)))
                {
                    continue;
                }

                let content = if request.diff { &c.diff } else { &commit.message };
                let preview = match &matcher {
                    Some(m) if !m.is_match(content) => continue,
                    Some(m) => m.matched_string(content),
                    None => MatchedString::new(content.as_str(), Vec::new()),
                };
                let preview = if request.diff {
                    CommitPreview::Diff(preview)
                } else {
                    CommitPreview::Message(preview)
                };
                let mut cm = CommitMatch::new(commit.clone(), repo.minimal(), preview);
                cm.modified_files = c.files.clone();
                results.push(Match::Commit(cm));
                remaining -= 1;
                if remaining <= 0 {
                    break;
                }
            }

            if !results.is_empty() && !ctx.send(sink, SearchEvent::results(results)).await {
                return Err(BackendError::Cancelled);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::query::{parse, SearchType};
    use crate::streaming::Aggregator;

    pub(crate) const CORPUS: &str = r#"{
      "repos": [
        {
          "id": 1,
          "name": "github.com/sourcegraph/sourcegraph",
          "files": [
            {"path": "cmd/main.go", "content": "package main\n\nfunc parse(s string) {}\nfunc main() { parse(\"x\") }"},
            {"path": "README.md", "content": "Sourcegraph parses code"}
          ],
          "commits": [
            {
              "id": "a1b2c3d4e5f6",
              "author": {"name": "Ada", "email": "ada@example.com", "date": "2024-02-01T10:00:00Z"},
              "message": "fix parse bug\n\nThe parser dropped tokens.",
              "diff": "cmd/main.go cmd/main.go\n@@ -1,1 +1,1 @@\n-func parse() {}\n+func parse(s string) {}",
              "files": ["cmd/main.go"]
            }
          ]
        },
        {
          "id": 2,
          "name": "github.com/sourcegraph/zoekt",
          "indexed": false,
          "files": [
            {"path": "query/parse.go", "content": "func parse(q string) Q {\n\treturn nil\n}"}
          ]
        },
        {"id": 3, "name": "github.com/other/fork", "fork": true,
         "files": [{"path": "x.go", "content": "func parse() {}"}]},
        {"id": 4, "name": "github.com/other/old", "archived": true}
      ]
    }"#;

    pub(crate) fn backend() -> InMemoryBackend {
        InMemoryBackend::from_json(CORPUS).unwrap()
    }

    fn request(q: &str) -> TextRequest {
        parse(q, SearchType::Literal).unwrap()[0]
            .text_request(100)
            .unwrap()
    }

    async fn all_repos(b: &InMemoryBackend) -> Vec<Repo> {
        b.list_repos(&SearchContext::new(), &RepoOptions::default(), 0, 100)
            .await
            .unwrap()
            .repos
    }

    #[tokio::test]
    async fn pages_through_repos() {
        let b = backend();
        let ctx = SearchContext::new();
        let opts = RepoOptions::default();
        let first = b.list_repos(&ctx, &opts, 0, 1).await.unwrap();
        assert_eq!(first.repos.len(), 1);
        assert_eq!(first.next, Some(1));
        let second = b.list_repos(&ctx, &opts, 1, 1).await.unwrap();
        assert_eq!(second.next, None);
        assert_ne!(first.repos[0].id, second.repos[0].id);

        let excluded = b.excluded_repos(&ctx, &opts).await.unwrap();
        assert_eq!(excluded, ExcludedRepos { forks: 1, archived: 1 });
    }

    #[tokio::test]
    async fn partitions_indexed_repos() {
        let b = backend();
        let repos = all_repos(&b).await;
        let parts = b.partition(&SearchContext::new(), repos).await.unwrap();
        assert_eq!(parts.indexed.len(), 1);
        assert_eq!(parts.unindexed.len(), 1);

        let degraded = backend().with_index_unavailable();
        assert!(degraded.partition(&SearchContext::new(), vec![]).await.is_err());
    }

    #[tokio::test]
    async fn phrase_search_reports_line_matches() {
        let b = backend();
        let repos = all_repos(&b).await;
        let sink = Aggregator::new();
        UnindexedSearcher::search(&b, &SearchContext::new(), &request("func parse"), &repos, &sink)
            .await
            .unwrap();
        let (results, _) = sink.into_results();
        assert_eq!(results.len(), 2);
        let Match::File(fm) = &results[0] else {
            panic!("expected a file match");
        };
        assert_eq!(fm.path, "cmd/main.go");
        assert_eq!(fm.line_matches[0].line_number, 2);
        assert_eq!(fm.line_matches[0].offset_and_lengths, vec![(0, 10)]);
    }

    #[tokio::test]
    async fn file_filters_and_path_matches() {
        let b = backend();
        let repos = all_repos(&b).await;
        let sink = Aggregator::new();
        let req = request("file:\\.md$ sourcegraph");
        UnindexedSearcher::search(&b, &SearchContext::new(), &req, &repos, &sink)
            .await
            .unwrap();
        let (results, _) = sink.into_results();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].key().path, "README.md");
    }

    #[tokio::test]
    async fn commit_search_highlights_message() {
        let b = backend();
        let repos = all_repos(&b).await;
        let sink = Aggregator::new();
        let req = parse("type:commit parse", SearchType::Literal).unwrap()[0]
            .commit_request(false, 10)
            .unwrap();
        CommitSearcher::search(&b, &SearchContext::new(), &req, &repos, &sink)
            .await
            .unwrap();
        let (results, _) = sink.into_results();
        assert_eq!(results.len(), 1);
        let Match::Commit(cm) = &results[0] else {
            panic!("expected a commit match");
        };
        let ranges = &cm.message_preview().unwrap().matched_ranges;
        assert_eq!(ranges.len(), 2);
        assert_eq!(ranges[0].start, Location::new(4, 0, 4));
        assert_eq!(ranges[1].start.line, 2);
    }

    #[tokio::test]
    async fn cancelled_search_stops() {
        let b = backend().with_latency(Duration::from_secs(5));
        let repos = all_repos(&b).await;
        let ctx = SearchContext::new();
        ctx.cancel();
        let err = UnindexedSearcher::search(&b, &ctx, &request("parse"), &repos, &Aggregator::new())
            .await
            .unwrap_err();
        assert_eq!(err, BackendError::Cancelled);
    }
}
