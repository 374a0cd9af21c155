use clap::{Args, Parser, Subcommand};
use llm_interface::{annotate_posts, LlmClient, TextGenerator};
use reddit_client::{harvest, RedditClient};
use sentiment_core::{
    load_results, save_results, search_output_path, summarized_path, CoreError, ErrorExt,
    ErrorReporter, FileSettings, FlattenConfig, LlmCredentials, ProcessEnv, RedditCredentials,
    SearchParameters, SearchResults, SentimentReport, SortMode, TimeFilter,
};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_DIRECTIVE: &str =
    "reddit_sentiment=info,reddit_client=info,llm_interface=info,sentiment_core=info";
const VERBOSE_LOG_DIRECTIVE: &str =
    "reddit_sentiment=debug,reddit_client=debug,llm_interface=debug,sentiment_core=debug";

#[derive(Parser)]
#[command(author, version, about = "Reddit stock sentiment harvester", long_about = None)]
struct Cli {
    /// TOML file with flatten/annotate tuning
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Search Reddit and save posts with their flattened comments
    Search(SearchArgs),
    /// Annotate a saved search with LLM summaries and sentiment labels
    Annotate {
        input: PathBuf,
    },
    /// Print the sentiment report for an annotated file
    Report {
        input: PathBuf,
    },
    /// Search, annotate and report in one go
    Run(SearchArgs),
}

#[derive(Args, Clone)]
struct SearchArgs {
    #[arg(short, long, default_value = "Google stock")]
    term: String,

    #[arg(short, long, default_value_t = 2)]
    limit: u32,

    /// hour, day, week, month, year or all
    #[arg(long, default_value = "week")]
    time_filter: TimeFilter,

    /// relevance, hot, top, new or comments
    #[arg(short, long, default_value = "relevance")]
    sort: SortMode,

    #[arg(long, default_value = "all")]
    subreddit: String,

    /// Large batches with pauses between them, no expansion limit
    #[arg(long)]
    bulk: bool,

    #[arg(short, long)]
    output_dir: Option<PathBuf>,
}

impl SearchArgs {
    fn parameters(&self) -> SearchParameters {
        SearchParameters {
            search_term: self.term.clone(),
            limit: self.limit,
            time_filter: self.time_filter,
            sort: self.sort,
            subreddit: self.subreddit.clone(),
            ..SearchParameters::default()
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let directive = if cli.verbose {
        VERBOSE_LOG_DIRECTIVE
    } else {
        DEFAULT_LOG_DIRECTIVE
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive)),
        )
        .init();

    if let Err(e) = run(cli).await {
        ErrorReporter::new().report_error(&e);
        eprintln!("❌ Error: {}", e.user_friendly_message());
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), CoreError> {
    let settings = match &cli.config {
        Some(path) => FileSettings::load(path)?,
        None => FileSettings::default(),
    };

    match cli.command {
        Command::Search(args) => {
            search(&args, &settings).await?;
        }
        Command::Annotate { input } => {
            annotate(&input, &settings).await?;
        }
        Command::Report { input } => report(&input)?,
        Command::Run(args) => {
            if let Some(path) = search(&args, &settings).await? {
                let annotated = annotate(&path, &settings).await?;
                report(&annotated)?;
            }
        }
    }
    Ok(())
}

/// Returns the written file, or `None` when the search found nothing.
async fn search(args: &SearchArgs, settings: &FileSettings) -> Result<Option<PathBuf>, CoreError> {
    let credentials = RedditCredentials::from_env(&ProcessEnv)?;
    let params = args.parameters();
    let flatten = if args.bulk {
        FlattenConfig::bulk()
    } else {
        settings.flatten.clone()
    };

    println!("Reddit API - {} Search", params.search_term);
    println!("{}", "=".repeat(40));
    println!("Connecting to Reddit API...");
    let client = RedditClient::new(credentials)?.with_comment_sort(&params.comment_sort);
    match client.current_user().await? {
        Some(user) => println!("Connected as: {}", user.name),
        None => println!("Connected with application-only access (read-only)"),
    }

    println!(
        "\nSearching for '{}' posts in r/{} ({}, sorted by {})...",
        params.search_term, params.subreddit, params.time_filter, params.sort
    );
    let mut results = harvest(&client, &params, &flatten, env!("CARGO_PKG_VERSION")).await;

    if results.posts.is_empty() {
        println!("No posts found matching the search criteria.");
        return Ok(None);
    }

    let output_dir = args
        .output_dir
        .clone()
        .unwrap_or_else(|| settings.output_dir.clone());
    let path = search_output_path(&output_dir, &params);
    results.results_summary.output_file = Some(path.display().to_string());
    save_results(&path, &results)?;

    print_listing(&results);
    println!("\nData saved to {}", path.display());
    Ok(Some(path))
}

fn print_listing(results: &SearchResults) {
    println!("\nSummary:");
    println!("Found {} posts", results.posts.len());
    for (i, post) in results.posts.iter().enumerate() {
        let title: String = post.title.chars().take(60).collect();
        println!("{}. '{}...' in r/{}", i + 1, title, post.subreddit);
        println!("   Score: {}, Comments: {}", post.score, post.comments_count);
    }
}

async fn annotate(input: &Path, settings: &FileSettings) -> Result<PathBuf, CoreError> {
    let mut results = load_results(input)?;
    let credentials = LlmCredentials::from_env(&ProcessEnv)?;
    let generator = LlmClient::from_credentials(&credentials)?;

    println!("🔄 Processing: {}", input.display());
    info!(
        "Annotating {} posts with {} ({})",
        results.posts.len(),
        generator.provider_name(),
        generator.model()
    );
    let stats = annotate_posts(&generator, &mut results.posts, &settings.annotate).await;

    let output = summarized_path(input);
    results.results_summary.output_file = Some(output.display().to_string());
    save_results(&output, &results)?;

    println!(
        "\nPosts: {} summarized, {} failed | Comments: {} classified, {} failed",
        stats.posts_annotated, stats.posts_failed, stats.comments_annotated, stats.comments_failed
    );
    println!("✅ Saved: {}", output.display());
    Ok(output)
}

fn report(input: &Path) -> Result<(), CoreError> {
    let results = load_results(input)?;
    let report = SentimentReport::from_results(&results);
    if !report.has_data() {
        ErrorReporter::new().report_warning(&CoreError::InvalidInput {
            message: format!("{} has no annotated comments", input.display()),
        });
    }
    println!("{}", report);
    Ok(())
}
