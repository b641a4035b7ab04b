mod commands;
#[cfg(feature = "mcp")]
mod mcp;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use book_rag::Settings;

#[derive(Parser)]
#[command(name = "bookrag")]
#[command(about = "Hybrid book search with live catalog fallback", long_about = None)]
#[command(version)]
struct Cli {
    /// Settings file, instead of ./bookrag.toml + BOOKRAG_* environment
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build, rebuild or inspect the corpus index
    Index {
        #[arg(long, help = "Show index status only")]
        status: bool,
        #[arg(long, help = "Force rebuild index")]
        rebuild: bool,
        #[arg(long, help = "JSON output")]
        json: bool,
    },
    /// Search books (hybrid index, catalog fallback on low confidence)
    Search {
        query: String,
        #[arg(short, long, help = "Number of books")]
        k: Option<usize>,
        #[arg(long, help = "Semantic weight in [0, 1]")]
        weight: Option<f32>,
        #[arg(long, help = "Never fall back to the live catalog")]
        no_fallback: bool,
        #[arg(long, help = "JSON output")]
        json: bool,
    },
    /// Show parsed chapters and atomic units of one record file
    Toc {
        record: PathBuf,
        #[arg(long, help = "JSON output")]
        json: bool,
    },
    /// Fetch catalog records into the corpus directory
    Ingest {
        query: String,
        #[arg(long, default_value_t = 10, help = "Maximum number of books")]
        limit: usize,
        #[arg(long, help = "JSON output")]
        json: bool,
    },

    // ===== MCP Server =====
    /// Start MCP server exposing the book-search tool
    #[cfg(feature = "mcp")]
    Mcp {
        #[arg(long, help = "Show client configuration instructions")]
        install: bool,
    },
}

fn init_tracing() {
    // stdout belongs to command output and the MCP transport
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("book_rag=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_settings(path: Option<&PathBuf>) -> anyhow::Result<Settings> {
    Ok(match path {
        Some(p) => Settings::from_file(p)?,
        None => Settings::load()?,
    })
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Index {
            status,
            rebuild,
            json,
        } => commands::index::run(&load_settings(cli.config.as_ref())?, status, rebuild, json),
        Commands::Search {
            query,
            k,
            weight,
            no_fallback,
            json,
        } => commands::search::run(
            &load_settings(cli.config.as_ref())?,
            &query,
            k,
            weight,
            no_fallback,
            json,
        ),
        Commands::Toc { record, json } => commands::toc::run(&record, json),
        Commands::Ingest { query, limit, json } => {
            commands::ingest::run(&load_settings(cli.config.as_ref())?, &query, limit, json)
        }

        // MCP Server
        #[cfg(feature = "mcp")]
        Commands::Mcp { install } => {
            if install {
                print_mcp_install_instructions();
                Ok(())
            } else {
                run_mcp_server(&load_settings(cli.config.as_ref())?)
            }
        }
    }
}

#[cfg(feature = "mcp")]
fn run_mcp_server(settings: &Settings) -> anyhow::Result<()> {
    use book_rag::search::provider_from_settings;
    use book_rag::{AladinCatalog, BookSearchTool, HybridRanker};
    use std::sync::Arc;

    // Blocking HTTP clients are created and finally dropped outside the runtime.
    let provider = provider_from_settings(&settings.embedding)?;
    let ranker = HybridRanker::open(settings, provider)?;
    let catalog = AladinCatalog::new(&settings.catalog)?;
    let tool = Arc::new(BookSearchTool::new(Arc::new(ranker), Arc::new(catalog), settings));

    let runtime = tokio::runtime::Runtime::new()?;
    let served = runtime.block_on(mcp::run_mcp_server(tool.clone(), settings.index_path.clone()));
    drop(runtime);
    drop(tool);
    served
}

#[cfg(feature = "mcp")]
fn print_mcp_install_instructions() {
    use colored::Colorize;

    let work_dir = std::env::current_dir()
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_else(|_| "/path/to/your/library".to_string());

    let binary_path = std::env::current_exe()
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_else(|_| "bookrag".to_string());

    println!("{}", "MCP Server Installation Guide".bold().cyan());
    println!();
    println!("Add the following to your MCP client configuration:");
    println!();
    println!(r#"{{
  "mcpServers": {{
    "book-search": {{
      "command": "{}",
      "args": ["mcp"],
      "cwd": "{}"
    }}
  }}
}}"#, binary_path, work_dir);
    println!();
    println!("{}", "The working directory should hold bookrag.toml (or set BOOKRAG_* variables).".dimmed());
    println!("{}", "Set ALADIN_API_KEY for the catalog fallback.".dimmed());
    println!();
    println!("{}", "Available tools:".bold());
    println!("  • {} - Hybrid book search with catalog fallback", "search_books".green());
    println!("  • {} - Index size, embedder and build time", "index_status".green());
}
