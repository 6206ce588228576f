use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "pkgsearch")]
#[command(about = "Package search over a crawled import graph", long_about = None)]
pub struct Cli {
    /// Configuration file (default: <config dir>/pkgsearch/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the MCP server on stdio (default)
    Serve,
    /// Search the index and print one page of results
    Search {
        query: String,
        /// Zero-based result page
        #[arg(short, long, default_value = "0")]
        page: usize,
    },
    /// Print frontier and collection statistics
    Stats,
}
