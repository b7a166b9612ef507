//! Per-table sample state: seeding, dependency discovery and fulfilment.

use super::emit;
use super::{Dependency, Row, SampleError, Value};
use crate::dialect::SqlDialect;
use crate::source::{ForeignKey, QuerySource};
use ahash::AHashSet;
use tracing::{debug, info, warn};

/// Column whose values are tracked for the `fulfilled` fast path.
const ID_COLUMN: &str = "id";

/// Evolving sample for one table.
#[derive(Debug)]
pub struct TableSample {
    name: String,
    /// Bounds the initial fetch only; closure may grow the sample past it
    target_size: usize,
    sample: AHashSet<Row>,
    /// Values of the `id` column of sampled rows
    sampled_ids: AHashSet<Value>,
    pending: AHashSet<Dependency>,
    seeded: bool,
    /// Foreign keys declared outside the database (config)
    declared_keys: Vec<ForeignKey>,
    /// Resolved foreign keys, loaded on the first `add`
    foreign_keys: Option<Vec<ForeignKey>>,
    /// Dependencies dropped because the table could not be queried
    skipped: usize,
}

impl TableSample {
    pub fn new(name: impl Into<String>, target_size: usize) -> Self {
        Self {
            name: name.into(),
            target_size,
            sample: AHashSet::new(),
            sampled_ids: AHashSet::new(),
            pending: AHashSet::new(),
            seeded: false,
            declared_keys: Vec::new(),
            foreign_keys: None,
            skipped: 0,
        }
    }

    /// Add foreign keys on top of the ones the source reports.
    pub fn with_foreign_keys(mut self, keys: Vec<ForeignKey>) -> Self {
        self.declared_keys.extend(keys);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn target_size(&self) -> usize {
        self.target_size
    }

    pub fn is_seeded(&self) -> bool {
        self.seeded
    }

    pub fn rows(&self) -> &AHashSet<Row> {
        &self.sample
    }

    pub fn len(&self) -> usize {
        self.sample.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sample.is_empty()
    }

    pub fn pending(&self) -> &AHashSet<Dependency> {
        &self.pending
    }

    pub fn skipped_dependencies(&self) -> usize {
        self.skipped
    }

    /// Target size before seeding, actual row count after.
    pub fn current_or_target_size(&self) -> usize {
        if self.seeded {
            self.sample.len()
        } else {
            self.target_size
        }
    }

    /// Fetch up to `limit` rows, newest primary key first. Runs once.
    ///
    /// Relations the source cannot query like a table (views, virtual
    /// tables) count as empty. The table is marked seeded even when the
    /// fetch fails.
    pub fn seed<S: QuerySource + ?Sized>(
        &mut self,
        source: &S,
        limit: usize,
    ) -> Result<&AHashSet<Row>, SampleError> {
        if self.seeded {
            return Ok(&self.sample);
        }
        self.seeded = true;

        match source.is_samplable(&self.name) {
            Ok(true) => {}
            Ok(false) => {
                debug!(table = %self.name, "not a base table, skipping seed");
                return Ok(&self.sample);
            }
            Err(e) if e.is_ignorable() => {
                warn!(table = %self.name, error = %e, "ignoring unqueryable relation");
                return Ok(&self.sample);
            }
            Err(e) => return Err(e.into()),
        }

        info!(table = %self.name, rows = limit, "sampling rows");

        let order_by = match source.primary_key(&self.name) {
            Ok(pk) => pk,
            Err(e) if e.is_ignorable() => Vec::new(),
            Err(e) => return Err(e.into()),
        };

        let rows = match source.select_bulk(&self.name, limit, &order_by) {
            Ok(rows) => rows,
            Err(e) if e.is_ignorable() => {
                warn!(table = %self.name, error = %e, "ignoring unqueryable relation");
                Vec::new()
            }
            Err(e) => return Err(e.into()),
        };

        for row in rows {
            self.add(row, source)?;
        }

        Ok(&self.sample)
    }

    /// Insert a row and enqueue the dependencies it introduces.
    ///
    /// Returns the number of newly enqueued dependencies; a row that is
    /// already present (same value in every column) yields 0.
    pub fn add<S: QuerySource + ?Sized>(
        &mut self,
        row: Row,
        source: &S,
    ) -> Result<usize, SampleError> {
        if self.sample.contains(&row) {
            return Ok(0);
        }

        self.load_foreign_keys(source)?;
        let keys = self.foreign_keys.as_deref().unwrap_or_default();
        let dependencies: Vec<Dependency> = keys
            .iter()
            .filter_map(|fk| dependency_for(&self.name, fk, &row))
            .collect();

        if let Some(id) = row.get(ID_COLUMN) {
            if !id.is_null() {
                self.sampled_ids.insert(id.clone());
            }
        }
        self.sample.insert(row);

        let mut newly_added = 0;
        for dependency in dependencies {
            if self.pending.insert(dependency) {
                newly_added += 1;
            }
        }
        Ok(newly_added)
    }

    /// Cheap membership test, true only for a single-column key named `id`
    /// whose value is already sampled.
    ///
    /// Any other key shape (a different column, composite keys) reports
    /// false, forcing a real lookup in [`TableSample::fulfil`]. Duplicate
    /// rows found that way are still caught by `add`.
    pub fn fulfilled(&self, dependency: &Dependency) -> bool {
        dependency
            .single_key(ID_COLUMN)
            .is_some_and(|id| self.sampled_ids.contains(id))
    }

    /// Fetch the row a dependency points at and add it.
    ///
    /// A missing row is a dangling reference in the source data and fails.
    pub fn fulfil<S: QuerySource + ?Sized>(
        &mut self,
        dependency: &Dependency,
        source: &S,
    ) -> Result<usize, SampleError> {
        if self.fulfilled(dependency) {
            return Ok(0);
        }

        let row = match source.select_one(&self.name, &dependency.key) {
            Ok(row) => row,
            Err(e) if e.is_ignorable() => {
                warn!(
                    dependency = %dependency,
                    error = %e,
                    "cannot look up dependency in unqueryable relation"
                );
                self.skipped += 1;
                return Ok(0);
            }
            Err(e) => return Err(e.into()),
        };

        match row {
            Some(row) => self.add(row, source),
            None => Err(SampleError::DanglingReference {
                table: dependency.table.clone(),
                key: dependency.key_display(),
                origin: dependency.origin.clone(),
            }),
        }
    }

    /// Swap out the pending set for an empty one and return the old contents.
    ///
    /// Dependencies discovered while the drained set is processed land in
    /// the fresh set, i.e. in the next round.
    pub fn drain_pending(&mut self) -> AHashSet<Dependency> {
        std::mem::take(&mut self.pending)
    }

    /// Put dependencies back, e.g. ones left unprocessed after a failure.
    pub(crate) fn requeue(&mut self, dependencies: impl IntoIterator<Item = Dependency>) {
        self.pending.extend(dependencies);
    }

    /// Render the sample as a header comment plus batched INSERT statements.
    pub fn emit(&self, dialect: SqlDialect, batch_size: usize) -> String {
        emit::render_table(&self.name, &self.sample, dialect, batch_size)
    }

    fn load_foreign_keys<S: QuerySource + ?Sized>(
        &mut self,
        source: &S,
    ) -> Result<(), SampleError> {
        if self.foreign_keys.is_some() {
            return Ok(());
        }

        let mut keys = match source.foreign_keys(&self.name) {
            Ok(keys) => keys,
            Err(e) if e.is_ignorable() => {
                warn!(table = %self.name, error = %e, "no foreign key metadata, assuming none");
                Vec::new()
            }
            Err(e) => return Err(e.into()),
        };
        for declared in &self.declared_keys {
            if !keys.contains(declared) {
                keys.push(declared.clone());
            }
        }

        for fk in &mut keys {
            if fk.columns.is_empty() {
                return Err(SampleError::InvalidForeignKey {
                    table: self.name.clone(),
                    referenced_table: fk.referenced_table.clone(),
                    message: "no referencing columns".to_string(),
                });
            }
            if fk.referenced_columns.is_empty() {
                fk.referenced_columns = match source.primary_key(&fk.referenced_table) {
                    Ok(pk) => pk,
                    Err(e) if e.is_ignorable() => Vec::new(),
                    Err(e) => return Err(e.into()),
                };
            }
            if fk.referenced_columns.len() != fk.columns.len() {
                return Err(SampleError::InvalidForeignKey {
                    table: self.name.clone(),
                    referenced_table: fk.referenced_table.clone(),
                    message: format!(
                        "{} referencing columns but {} referenced columns",
                        fk.columns.len(),
                        fk.referenced_columns.len()
                    ),
                });
            }
        }

        debug!(table = %self.name, foreign_keys = keys.len(), "loaded foreign keys");
        self.foreign_keys = Some(keys);
        Ok(())
    }
}

/// Dependency for one foreign key, or None when any referencing column is NULL.
fn dependency_for(table: &str, fk: &ForeignKey, row: &Row) -> Option<Dependency> {
    let mut key = Vec::with_capacity(fk.columns.len());
    for (column, referenced) in fk.columns.iter().zip(&fk.referenced_columns) {
        match row.get(column) {
            Some(value) if !value.is_null() => key.push((referenced.clone(), value.clone())),
            _ => return None,
        }
    }
    Some(Dependency::new(fk.referenced_table.clone(), key, table))
}
