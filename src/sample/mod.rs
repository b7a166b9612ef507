//! Referentially complete sampling.
//!
//! A sample starts from a bounded fetch of one or more seed tables. Every
//! sampled row is decomposed into [`Dependency`] values, one per non-NULL
//! outgoing foreign key. Dependencies are resolved in rounds: everything
//! enqueued during round N is looked up in round N+1. Sampling stops at the
//! first round that enqueues nothing, at which point every foreign key among
//! the sampled rows points at a sampled row.

mod config;
mod dependency;
pub mod emit;
mod row;
mod table;

pub use config::{DeclaredForeignKey, DefaultConfig, SampleYamlConfig, TableConfig};
pub use dependency::Dependency;
pub use emit::DEFAULT_BATCH_SIZE;
pub use row::{Row, Value};
pub use table::TableSample;

use crate::dialect::SqlDialect;
use crate::source::{DuckDbSource, QuerySource, SourceError};
use ahash::AHashMap;
use anyhow::Context;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

/// Default seed size per table
pub const DEFAULT_ROWS: usize = 1000;

/// Errors that abort sampling. Rows collected before the failure stay in
/// the [`Sampler`].
#[derive(Debug, Error)]
pub enum SampleError {
    /// A foreign key value has no matching row in the referenced table
    #[error("Dangling reference: no row in '{table}' matches {key} (referenced from '{origin}')")]
    DanglingReference {
        table: String,
        key: String,
        origin: String,
    },

    /// A foreign key points at a table this run does not track
    #[error("Table sample for '{table}' not found (referenced from '{origin}')")]
    UntrackedTable { table: String, origin: String },

    /// Foreign key metadata that cannot be turned into a lookup
    #[error("Invalid foreign key from '{table}' to '{referenced_table}': {message}")]
    InvalidForeignKey {
        table: String,
        referenced_table: String,
        message: String,
    },

    /// Cancelled through the handle from [`Sampler::cancel_handle`]
    #[error("Sampling cancelled after {rounds} rounds")]
    Cancelled { rounds: usize },

    /// The configured timeout elapsed
    #[error("Sampling timed out after {rounds} rounds")]
    TimedOut { rounds: usize },

    /// More rows than `max_total_rows` were needed to close the sample
    #[error("Sample grew to {rows} rows, over the limit of {limit}")]
    RowLimitExceeded { rows: usize, limit: usize },

    #[error(transparent)]
    Source(#[from] SourceError),
}

/// All table samples of a run, keyed by table name.
#[derive(Debug, Default)]
pub struct TableSamples {
    tables: AHashMap<String, TableSample>,
}

impl TableSamples {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, sample: TableSample) {
        self.tables.insert(sample.name().to_string(), sample);
    }

    pub fn get(&self, table: &str) -> Option<&TableSample> {
        self.tables.get(table)
    }

    pub fn get_mut(&mut self, table: &str) -> Option<&mut TableSample> {
        self.tables.get_mut(table)
    }

    pub fn contains(&self, table: &str) -> bool {
        self.tables.contains_key(table)
    }

    /// Table names in sorted order
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn total_rows(&self) -> usize {
        self.tables.values().map(TableSample::len).sum()
    }

    /// Resolve every dependency pending on `table` against the sample that
    /// owns its target table.
    ///
    /// Returns the number of dependencies newly enqueued anywhere while
    /// doing so. On failure the unprocessed dependencies, including the one
    /// that failed, are put back on `table`.
    pub fn close_round<S: QuerySource + ?Sized>(
        &mut self,
        table: &str,
        source: &S,
    ) -> Result<usize, SampleError> {
        let drained = match self.tables.get_mut(table) {
            Some(sample) => sample.drain_pending(),
            None => return Ok(0),
        };

        let mut newly_added = 0;
        let mut remaining = drained.into_iter();
        while let Some(dependency) = remaining.next() {
            let result = match self.tables.get_mut(&dependency.table) {
                Some(target) => target.fulfil(&dependency, source),
                None => Err(SampleError::UntrackedTable {
                    table: dependency.table.clone(),
                    origin: dependency.origin.clone(),
                }),
            };

            match result {
                Ok(n) => newly_added += n,
                Err(e) => {
                    if let Some(sample) = self.tables.get_mut(table) {
                        sample.requeue(std::iter::once(dependency).chain(remaining));
                    }
                    return Err(e);
                }
            }
        }

        Ok(newly_added)
    }
}

/// Knobs for a [`Sampler`] run
#[derive(Debug, Clone, Default)]
pub struct SamplerOptions {
    /// Abort between rounds once this much time has passed
    pub timeout: Option<Duration>,
    /// Abort when closure needs more rows than this
    pub max_total_rows: Option<usize>,
}

/// Drives seeding and round-based closure over a set of table samples.
pub struct Sampler<S: QuerySource> {
    source: S,
    tables: TableSamples,
    options: SamplerOptions,
    cancelled: Arc<AtomicBool>,
    started: Instant,
    rounds: usize,
    progress_fn: Option<Box<dyn FnMut(usize, usize, usize)>>,
}

impl<S: QuerySource> Sampler<S> {
    pub fn new(source: S, options: SamplerOptions) -> Self {
        Self {
            source,
            tables: TableSamples::new(),
            options,
            cancelled: Arc::new(AtomicBool::new(false)),
            started: Instant::now(),
            rounds: 0,
            progress_fn: None,
        }
    }

    /// Callback after each round: (round, newly enqueued, total rows)
    pub fn with_progress<F: FnMut(usize, usize, usize) + 'static>(mut self, f: F) -> Self {
        self.progress_fn = Some(Box::new(f));
        self
    }

    /// Start tracking a table. Replaces an existing sample of the same name.
    pub fn track(&mut self, sample: TableSample) {
        self.tables.insert(sample);
    }

    /// Seed a tracked table with its target size. Returns its row count.
    pub fn seed(&mut self, table: &str) -> Result<usize, SampleError> {
        let sample = self
            .tables
            .get_mut(table)
            .ok_or_else(|| SampleError::UntrackedTable {
                table: table.to_string(),
                origin: "seed".to_string(),
            })?;
        let limit = sample.target_size();
        Ok(sample.seed(&self.source, limit)?.len())
    }

    /// Run rounds until one enqueues no new dependency. Returns the number
    /// of rounds run by this call.
    ///
    /// A round closes every table once, in name order. Dependencies a table
    /// enqueues on a later-named table are resolved in the same round, those
    /// on itself or an earlier-named table in the next one. A round that
    /// enqueues nothing still means every pending set was empty when it was
    /// drained, so the stop condition is unaffected.
    pub fn close(&mut self) -> Result<usize, SampleError> {
        let first_round = self.rounds;
        loop {
            self.check_interrupted()?;

            let mut newly_added = 0;
            for name in self.tables.names() {
                newly_added += self.tables.close_round(&name, &self.source)?;
            }
            self.rounds += 1;

            let total_rows = self.tables.total_rows();
            debug!(round = self.rounds, newly_added, total_rows, "closed round");
            if let Some(ref mut f) = self.progress_fn {
                f(self.rounds, newly_added, total_rows);
            }

            if let Some(limit) = self.options.max_total_rows {
                if total_rows > limit {
                    return Err(SampleError::RowLimitExceeded {
                        rows: total_rows,
                        limit,
                    });
                }
            }

            if newly_added == 0 {
                return Ok(self.rounds - first_round);
            }
        }
    }

    /// Concatenate every table's output, in table-name order.
    pub fn emit(&self, dialect: SqlDialect, batch_size: usize) -> String {
        self.tables
            .names()
            .iter()
            .filter_map(|name| self.tables.get(name))
            .map(|sample| sample.emit(dialect, batch_size))
            .collect()
    }

    /// Shared flag; setting it stops [`Sampler::close`] before the next round.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    pub fn tables(&self) -> &TableSamples {
        &self.tables
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Rounds run over the sampler's lifetime
    pub fn rounds(&self) -> usize {
        self.rounds
    }

    pub fn stats(&self) -> SampleStats {
        let mut stats = SampleStats {
            rounds: self.rounds,
            ..Default::default()
        };
        for name in self.tables.names() {
            let Some(sample) = self.tables.get(&name) else {
                continue;
            };
            stats.tables_tracked += 1;
            if sample.is_seeded() {
                stats.tables_seeded += 1;
            }
            stats.total_rows += sample.len();
            if sample.skipped_dependencies() > 0 {
                stats.warnings.push(format!(
                    "{} dependencies on '{}' could not be looked up",
                    sample.skipped_dependencies(),
                    name
                ));
            }
            stats.table_stats.push(TableSampleStats {
                name,
                rows: sample.len(),
                target_size: sample.target_size(),
                seeded: sample.is_seeded(),
            });
        }
        stats
    }

    fn check_interrupted(&self) -> Result<(), SampleError> {
        if self.cancelled.load(Ordering::Relaxed) {
            return Err(SampleError::Cancelled {
                rounds: self.rounds,
            });
        }
        if let Some(timeout) = self.options.timeout {
            if self.started.elapsed() >= timeout {
                return Err(SampleError::TimedOut {
                    rounds: self.rounds,
                });
            }
        }
        Ok(())
    }
}

/// Configuration for the sample command
#[derive(Debug)]
pub struct SampleConfig {
    /// Input DuckDB database
    pub input: PathBuf,
    /// Output SQL file (None for stdout)
    pub output: Option<PathBuf>,
    /// Dialect used to quote the output
    pub dialect: SqlDialect,
    /// Seed rows per table
    pub rows: usize,
    /// Tables to seed (empty = all tracked tables)
    pub seed_tables: Vec<String>,
    /// Tables to leave untracked
    pub exclude: Vec<String>,
    /// YAML config file path
    pub config_file: Option<PathBuf>,
    /// Rows per INSERT statement
    pub batch_size: usize,
    /// Abort after this long (checked between rounds)
    pub timeout: Option<Duration>,
    /// Maximum total rows to sample (explosion guard)
    pub max_total_rows: Option<usize>,
    /// Dry run mode (show stats only)
    pub dry_run: bool,
    /// Show progress
    pub progress: bool,
}

impl Default for SampleConfig {
    fn default() -> Self {
        Self {
            input: PathBuf::new(),
            output: None,
            dialect: SqlDialect::Postgres,
            rows: DEFAULT_ROWS,
            seed_tables: Vec::new(),
            exclude: Vec::new(),
            config_file: None,
            batch_size: DEFAULT_BATCH_SIZE,
            timeout: None,
            max_total_rows: None,
            dry_run: false,
            progress: false,
        }
    }
}

/// Statistics from sample operation
#[derive(Debug, Default, serde::Serialize)]
pub struct SampleStats {
    /// Number of tables tracked
    pub tables_tracked: usize,
    /// Number of tables seeded
    pub tables_seeded: usize,
    /// Closure rounds run
    pub rounds: usize,
    /// Total rows sampled
    pub total_rows: usize,
    /// Per-table statistics
    pub table_stats: Vec<TableSampleStats>,
    /// Warning messages
    pub warnings: Vec<String>,
}

/// Per-table sampling statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct TableSampleStats {
    pub name: String,
    pub rows: usize,
    pub target_size: usize,
    pub seeded: bool,
}

/// Run the sample command against a DuckDB database file
pub fn run(config: SampleConfig) -> anyhow::Result<SampleStats> {
    let source = DuckDbSource::open(&config.input)?;
    run_with_source(&config, &source)
}

/// Run the sample command against any source
pub fn run_with_source<S: QuerySource + ?Sized>(
    config: &SampleConfig,
    source: &S,
) -> anyhow::Result<SampleStats> {
    let yaml_config = match config.config_file {
        Some(ref path) => SampleYamlConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => SampleYamlConfig::default(),
    };

    let options = SamplerOptions {
        timeout: config.timeout,
        max_total_rows: config.max_total_rows,
    };
    let mut sampler = Sampler::new(source, options);

    let progress_bar = if config.progress {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {msg}")
                .context("Invalid progress template")?
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
        );
        pb.enable_steady_tick(Duration::from_millis(100));
        pb.set_message("Seeding tables...");
        let pb_clone = pb.clone();
        sampler = sampler.with_progress(move |round, newly_added, rows| {
            pb_clone.set_message(format!(
                "Round {}: {} new dependencies, {} rows",
                round, newly_added, rows
            ));
        });
        Some(pb)
    } else {
        None
    };

    // Track every base table not excluded
    for table in source.list_tables()? {
        let excluded = config
            .exclude
            .iter()
            .any(|e| e.eq_ignore_ascii_case(&table));
        if excluded || yaml_config.should_skip(&table) {
            continue;
        }
        let rows = yaml_config.get_rows(&table).unwrap_or(config.rows);
        let declared = yaml_config.foreign_keys_for(&table);
        sampler.track(TableSample::new(table, rows).with_foreign_keys(declared));
    }

    let mut seeds: Vec<String> = config.seed_tables.clone();
    for name in sampler.tables().names() {
        if yaml_config.is_seed(&name) && !seeds.iter().any(|s| s.eq_ignore_ascii_case(&name)) {
            seeds.push(name);
        }
    }
    if seeds.is_empty() {
        seeds = sampler.tables().names();
    }

    for seed in &seeds {
        let Some(name) = resolve_table_name(sampler.tables(), seed) else {
            anyhow::bail!("Seed table '{}' is not a tracked table", seed);
        };
        sampler.seed(&name)?;
    }

    let rounds = sampler.close();
    if let Some(ref pb) = progress_bar {
        pb.finish_and_clear();
    }
    rounds.context("Failed to close sample over foreign keys")?;

    let stats = sampler.stats();
    if config.progress {
        eprintln!(
            "Sampling complete: {} rows from {} tables in {} rounds",
            stats.total_rows, stats.tables_tracked, stats.rounds
        );
    }

    if config.dry_run {
        return Ok(stats);
    }

    let sql = sampler.emit(config.dialect, config.batch_size);
    match config.output {
        Some(ref path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            let mut writer = BufWriter::new(file);
            writer.write_all(sql.as_bytes())?;
            writer.flush()?;
        }
        None => {
            let stdout = io::stdout();
            let mut writer = stdout.lock();
            writer.write_all(sql.as_bytes())?;
            writer.flush()?;
        }
    }

    Ok(stats)
}

fn resolve_table_name(tables: &TableSamples, name: &str) -> Option<String> {
    if tables.contains(name) {
        return Some(name.to_string());
    }
    tables
        .names()
        .into_iter()
        .find(|t| t.eq_ignore_ascii_case(name))
}
