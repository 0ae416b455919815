use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use search_job::backend::memory::InMemoryBackend;
use search_job::query::{Protocol, SearchType};
use search_job::{pretty_json, read_settings, Clients, SearchClient, Stats};
use search_result::{sort_matches, to_commit_diff_matches, Deduper, Match};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "search", about = "Search a JSON corpus of repositories")]
struct Opts {
    /// The search query, e.g. `repo:sourcegraph func parse`
    query: String,

    /// Corpus of repositories, files and commits to search
    #[arg(long, default_value = "search-cli/fixtures/corpus.json")]
    corpus: PathBuf,

    /// How unannotated patterns are read: literal, regexp or standard
    #[arg(long, default_value_t = SearchType::Literal)]
    pattern_type: SearchType,

    /// Use batch limits and run backends one after another
    #[arg(long)]
    batch: bool,

    /// Settings file layered over the defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print the compiled job tree instead of running it
    #[arg(long)]
    plan: bool,

    /// Show commit diffs as one result per file
    #[arg(long)]
    split_diffs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let opts = Opts::parse();
    let settings = read_settings(opts.config.as_deref()).context("reading settings")?;
    let corpus = std::fs::read_to_string(&opts.corpus)
        .with_context(|| format!("reading corpus {}", opts.corpus.display()))?;
    let backend = InMemoryBackend::from_json(&corpus).context("parsing corpus")?;
    let client = SearchClient::new(Clients::from_backend(Arc::new(backend)), settings);

    let protocol = if opts.batch {
        Protocol::Batch
    } else {
        Protocol::Streaming
    };

    if opts.plan {
        let job = client.job(&opts.query, opts.pattern_type, protocol)?;
        println!("{}", pretty_json(job.as_ref()));
        return Ok(());
    }

    let mut stream = client.stream(&opts.query, opts.pattern_type, protocol);
    let mut results = Deduper::new();
    let mut stats = Stats::default();
    while let Some(event) = stream.recv().await {
        for m in event.results {
            results.add(m);
        }
        stats.update(&event.stats);
    }
    let alert = stream.finish().await?;

    let mut matches = results.results();
    if opts.split_diffs {
        matches = to_commit_diff_matches(matches);
    }
    sort_matches(&mut matches);
    for m in &matches {
        print_match(m);
    }

    println!(
        "{} results{}",
        matches.len(),
        if stats.is_limit_hit { " (limit hit)" } else { "" }
    );
    if let Some(alert) = alert {
        println!("{}: {}", alert.title, alert.description);
    }
    Ok(())
}

fn print_match(m: &Match) {
    println!("{}", m.url());
    match m {
        Match::File(fm) => {
            for line in &fm.line_matches {
                println!("  {:>4}: {}", line.line_number + 1, line.preview);
            }
        }
        Match::Commit(cm) => println!("  {}", cm.label()),
        Match::Repo(_) | Match::CommitDiff(_) => {}
    }
}
