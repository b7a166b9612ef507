//! Sample command CLI handler.

use sql_sampler::dialect::SqlDialect;
use sql_sampler::sample::{self, SampleConfig};
use std::path::PathBuf;
use std::time::Duration;

#[allow(clippy::too_many_arguments)]
pub fn run(
    file: PathBuf,
    output: Option<PathBuf>,
    dialect: Option<String>,
    rows: usize,
    seed_tables: Option<String>,
    exclude: Option<String>,
    config: Option<PathBuf>,
    batch_size: usize,
    timeout: Option<u64>,
    max_total_rows: Option<usize>,
    progress: bool,
    json: bool,
    dry_run: bool,
) -> anyhow::Result<()> {
    if rows == 0 {
        anyhow::bail!("--rows must be greater than 0");
    }
    if batch_size == 0 {
        anyhow::bail!("--batch-size must be greater than 0");
    }
    if !file.exists() {
        anyhow::bail!("Database file not found: {}", file.display());
    }

    let dialect = match dialect {
        Some(d) => d
            .parse::<SqlDialect>()
            .map_err(|e| anyhow::anyhow!("{}", e))?,
        None => SqlDialect::default(),
    };

    let seed_tables: Vec<String> = seed_tables
        .map(|t| t.split(',').map(|s| s.trim().to_string()).collect())
        .unwrap_or_default();

    let exclude_list: Vec<String> = exclude
        .map(|e| e.split(',').map(|s| s.trim().to_string()).collect())
        .unwrap_or_default();

    let sample_config = SampleConfig {
        input: file,
        output,
        dialect,
        rows,
        seed_tables,
        exclude: exclude_list,
        config_file: config,
        batch_size,
        timeout: timeout.map(Duration::from_secs),
        max_total_rows,
        dry_run,
        progress,
    };

    let stats = sample::run(sample_config)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    if progress || dry_run {
        eprintln!();
        eprintln!("Sample Statistics:");
        eprintln!("  Tables tracked: {}", stats.tables_tracked);
        eprintln!("  Tables seeded: {}", stats.tables_seeded);
        eprintln!("  Rounds: {}", stats.rounds);
        eprintln!("  Total rows: {}", stats.total_rows);

        if !stats.warnings.is_empty() {
            eprintln!();
            for warning in &stats.warnings {
                eprintln!("  Warning: {}", warning);
            }
        }

        if dry_run {
            eprintln!();
            eprintln!("Per-table breakdown:");
            for table_stat in &stats.table_stats {
                let seed_str = if table_stat.seeded { " [seed]" } else { "" };
                eprintln!(
                    "  {}{}: {} rows (target {})",
                    table_stat.name, seed_str, table_stat.rows, table_stat.target_size
                );
            }
        }
    }

    Ok(())
}
