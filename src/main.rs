use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use repolens::{LensConfig, OwnerRepo, RepoLens, TreeNode};

/// Browse a hosted repository: file tree, cached contents, keyword search.
#[derive(Debug, Parser)]
#[command(name = "repolens", version, about)]
struct Args {
    /// Repository slug, e.g. rust-lang/cargo
    repo: String,

    /// Search the cached file bodies after the tree is built
    /// (warms the content cache first)
    #[arg(short, long, value_name = "QUERY")]
    search: Option<String>,

    /// Warm the content cache before exiting
    #[arg(long)]
    prefetch: bool,

    /// Print the repository's language breakdown
    #[arg(long)]
    languages: bool,

    /// Print cache statistics at the end of the run
    #[arg(long)]
    stats: bool,

    /// Emit the tree as JSON instead of indented text
    #[arg(long)]
    json: bool,

    /// Bearer token for the hosting API
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// TOML configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let repo = OwnerRepo::parse(&args.repo)
        .with_context(|| format!("invalid repository slug: {}", args.repo))?;

    let mut config = match &args.config {
        Some(path) => LensConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => LensConfig::default(),
    };
    if args.token.is_some() {
        config.api.token = args.token.clone();
    }
    // The CLI warms the cache explicitly below; a detached prefetch would
    // race process exit.
    config.content.prefetch = false;

    let lens = RepoLens::builder()
        .with_config(config)
        .build()
        .context("constructing browsing session")?;

    let tree = lens
        .build_file_tree(&repo.owner, &repo.repo)
        .await
        .with_context(|| format!("building file tree for {}", repo))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&tree)?);
    } else {
        print_tree(&tree.roots, 0);
        println!(
            "\n{} directories, {} files ({} ms)",
            tree.stats.directories, tree.stats.files, tree.stats.duration_ms
        );
    }
    for warning in &tree.warnings {
        eprintln!("warning: {}: {}", warning.path, warning.message);
    }

    if args.languages {
        let languages = lens
            .repository_languages()
            .await
            .context("fetching language breakdown")?;
        println!();
        for (language, bytes) in &languages {
            println!("{:>12} bytes  {}", bytes, language);
        }
    }

    if args.prefetch || args.search.is_some() {
        let stats = lens
            .prefetch_contents()
            .await
            .context("warming content cache")?;
        if stats.failed > 0 {
            eprintln!("warning: {} file(s) failed to load", stats.failed);
        }
    }

    if let Some(query) = &args.search {
        let hits = lens.search_files(query);
        println!();
        if hits.is_empty() {
            println!("no matches for {:?}", query);
        }
        for (rank, hit) in hits.iter().enumerate() {
            println!(
                "{}. {} lines {}-{} (score {:.2})",
                rank + 1,
                hit.path,
                hit.start_line,
                hit.end_line,
                hit.relevance
            );
            for line in hit.text.lines() {
                println!("   | {}", line);
            }
        }
    }

    if args.stats {
        let stats = lens.stats();
        println!(
            "\ntree cache: {} entries, {:.0}% hit rate; content cache: {} entries, {:.0}% hit rate",
            stats.tree_cache.entries,
            stats.tree_cache.hit_rate() * 100.0,
            stats.content_cache.entries,
            stats.content_cache.hit_rate() * 100.0,
        );
    }

    Ok(())
}

fn init_logging(verbosity: u8) {
    let default_filter = match verbosity {
        0 => "warn",
        1 => "repolens=debug,info",
        _ => "trace",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .init();
}

fn print_tree(nodes: &[TreeNode], depth: usize) {
    for node in nodes {
        let indent = "  ".repeat(depth);
        if node.is_dir() {
            println!("{}{}/", indent, node.name);
            if let Some(children) = &node.children {
                print_tree(children, depth + 1);
            }
        } else {
            println!("{}{}", indent, node.name);
        }
    }
}
