mod sample;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use std::io;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "sql-sampler")]
#[command(version)]
#[command(
    about = "Extract a small, referentially complete sample of rows from a database",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Sample rows from a DuckDB database, following foreign keys until every reference resolves
    Sample {
        /// Input DuckDB database file
        file: PathBuf,

        /// Output SQL file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output quoting dialect: mysql, postgres, sqlite, mssql
        #[arg(short, long, default_value = "postgres")]
        dialect: Option<String>,

        /// Seed rows per table
        #[arg(long, default_value = "1000")]
        rows: usize,

        /// Tables to seed from (comma-separated; default: all tables)
        #[arg(short, long)]
        seed_tables: Option<String>,

        /// Exclude specific tables (comma-separated)
        #[arg(short, long)]
        exclude: Option<String>,

        /// YAML config file for per-table settings
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Rows per INSERT statement
        #[arg(long, default_value = "1000")]
        batch_size: usize,

        /// Abort if sampling takes longer than this many seconds (checked between rounds)
        #[arg(long)]
        timeout: Option<u64>,

        /// Maximum total rows to sample (explosion guard). Use 0 to disable.
        #[arg(long)]
        max_total_rows: Option<usize>,

        /// Show progress during sampling
        #[arg(short, long)]
        progress: bool,

        /// Output statistics as JSON
        #[arg(long)]
        json: bool,

        /// Preview without writing output (dry run)
        #[arg(long)]
        dry_run: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

pub fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Sample {
            file,
            output,
            dialect,
            rows,
            seed_tables,
            exclude,
            config,
            batch_size,
            timeout,
            max_total_rows,
            progress,
            json,
            dry_run,
        } => {
            let effective_limit = if max_total_rows == Some(0) {
                None
            } else {
                max_total_rows
            };
            sample::run(
                file,
                output,
                dialect,
                rows,
                seed_tables,
                exclude,
                config,
                batch_size,
                timeout,
                effective_limit,
                progress,
                json,
                dry_run,
            )
        }
        Commands::Completions { shell } => {
            generate(shell, &mut Cli::command(), "sql-sampler", &mut io::stdout());
            Ok(())
        }
    }
}
