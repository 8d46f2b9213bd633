// src/main.rs
// =============================================================================
// This is the entry point of our CLI application.
//
// What happens here:
// 1. Set up logging (RUST_LOG overrides the default level)
// 2. Parse command-line arguments using clap
// 3. Dispatch to the appropriate subcommand handler
// 4. Exit with proper code (0 = success, 1 = pages failed, 2 = error)
//
// Rust concepts used:
// - async/await: The servers and the crawl are all async
// - Result<T, E>: For error handling (T = success type, E = error type)
// - match: Pattern matching to handle different subcommands
// =============================================================================

// Module declarations - tells Rust about our other source files
mod cli;       // src/cli.rs - command-line parsing
mod config;    // src/config.rs - plain settings structs
mod crawl;     // src/crawl/ - single-site crawling
mod error;     // src/error.rs - error types
mod protocol;  // src/protocol/ - WebSocket messages and heartbeat
mod render;    // src/render/ - screenshot renderer
mod resources; // src/resources.rs - stylesheet discovery and caching
mod sanitize;  // src/sanitize.rs - markup cleanup
mod server;    // src/server.rs - crawl WebSocket endpoint

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands, CrawlArgs};
use crawl::{CrawlEvent, CrawlServices, CrawlSession, EventSink, HttpFetcher, PageRecord};
use resources::AssetCache;
use sanitize::MarkupSanitizer;

#[tokio::main]
async fn main() {
    let exit_code = match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            2
        }
    };

    std::process::exit(exit_code);
}

fn init_tracing() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("site_snapper=info".parse()?))
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

// Returns:
//   Ok(0) = success
//   Ok(1) = the crawl reported failed pages
//   Err = unexpected error
async fn run() -> Result<i32> {
    let cli = Cli::parse();
    init_tracing()?;

    match cli.command {
        Commands::Serve(args) => {
            let config = args.into_config();
            let fetcher = HttpFetcher::new(config.crawl.fetch_timeout)?;
            let services = CrawlServices::new(
                Arc::new(fetcher),
                Arc::new(MarkupSanitizer),
                Arc::new(AssetCache::new()),
                config.crawl.clone(),
            );
            server::serve(config, services).await?;
            Ok(0)
        }
        Commands::Render(args) => {
            render::run_renderer(args.into_config()).await?;
            Ok(0)
        }
        Commands::Crawl(args) => handle_crawl(args).await,
    }
}

// Handles the 'crawl' subcommand
// Parameters:
//   args.url: seed URL (e.g., "https://example.com")
//   args.json: print protocol messages as JSON lines instead of a table
async fn handle_crawl(args: CrawlArgs) -> Result<i32> {
    let config = args.crawl_config();
    let fetcher = HttpFetcher::new(config.fetch_timeout)?;
    let services = CrawlServices::new(
        Arc::new(fetcher),
        Arc::new(MarkupSanitizer),
        Arc::new(AssetCache::new()),
        config,
    );

    let (tx, mut rx) = mpsc::unbounded_channel();
    let session = CrawlSession::start(&args.url, &services, EventSink::new(1, tx))?;

    if !args.json {
        println!("🔍 Crawling website: {}", session.seed());
        println!("📊 Max concurrent fetches: {}", services.config.max_concurrent);
    }

    // The channel closes once the worker pool and all workers are gone
    let mut pages = Vec::new();
    let mut errors = Vec::new();
    let mut links = 0;
    while let Some(event) = rx.recv().await {
        let event = event.event;
        if args.json {
            println!("{}", event.clone().into_message().to_json());
        }
        match event {
            CrawlEvent::Link(_) => links += 1,
            CrawlEvent::Page(record) => pages.push(record),
            CrawlEvent::Error(message) => errors.push(message),
            CrawlEvent::Info(_) | CrawlEvent::Complete => {}
        }
    }
    session.wait().await;

    if !args.json {
        print_table(&pages, &errors, links);
    }

    if errors.is_empty() {
        Ok(0)
    } else {
        Ok(1)
    }
}

// Prints crawled pages as a human-readable table in the terminal
fn print_table(pages: &[PageRecord], errors: &[String], links: usize) {
    println!();
    println!("{:<60} {:>10} {:>10}", "URL", "HTML", "STYLES");
    println!("{}", "=".repeat(82));

    for page in pages {
        let url = page.url.as_str();
        // Truncate URL if too long for display
        let url_display = if url.chars().count() > 57 {
            format!("{}...", url.chars().take(57).collect::<String>())
        } else {
            url.to_string()
        };
        println!(
            "{:<60} {:>10} {:>10}",
            url_display,
            page.sanitized_html.len(),
            page.resources.len()
        );
    }

    if !errors.is_empty() {
        println!();
        for message in errors {
            println!("❌ {}", message);
        }
    }

    println!();
    println!("📊 Summary:");
    println!("   🔗 Links discovered: {}", links);
    println!("   ✅ Pages: {}", pages.len());
    println!("   ❌ Errors: {}", errors.len());
}
