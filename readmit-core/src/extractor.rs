//! The feature extractor contract and the emitter extractors write into.
//!
//! An extractor derives one feature group. It reads whatever it needs through
//! the [`ExtractionContext`] and reports cells to an [`Emitter`], which
//! namespaces feature keys with the extractor prefix, enforces one missing
//! sentinel per key and validates whole tables before emitting them.

use crate::error::Result;
use crate::source::DataSource;
use crate::store::ExtractorOutput;
use crate::table::Table;
use crate::validation::validate_table;
use crate::value::FeatureValue;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use tracing::{debug, info};

/// Separator between extractor prefix and feature name.
pub const KEY_SEPARATOR: &str = "__";

/// Build a namespaced feature key, `<prefix>__<feature>`.
pub fn feature_key(prefix: &str, feature: &str) -> String {
    format!("{prefix}{KEY_SEPARATOR}{feature}")
}

/// A unit of feature derivation the Databuilder can run and cache.
pub trait FeatureExtractor {
    /// Identity of the extractor; also the cache key.
    fn name(&self) -> &str;

    /// Namespace for emitted feature keys.
    fn prefix(&self) -> &str {
        self.name()
    }

    /// Author-maintained version. Bump it whenever the extractor's output
    /// could change in a way its [`definition`](Self::definition) does not
    /// capture.
    fn version(&self) -> u32;

    /// Behavior-defining text folded into the fingerprint, e.g. a query.
    fn definition(&self) -> String {
        String::new()
    }

    /// Derive the feature group, emitting cells into `out`.
    fn extract(&self, ctx: &ExtractionContext<'_>, out: &mut Emitter) -> Result<()>;

    fn fingerprint(&self) -> Fingerprint {
        Fingerprint::compute(self.name(), self.prefix(), self.version(), &self.definition())
    }
}

/// Content hash identifying an extractor definition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn compute(name: &str, prefix: &str, version: u32, definition: &str) -> Self {
        let mut hasher = Sha256::new();
        for part in [name, prefix] {
            hasher.update(part.as_bytes());
            hasher.update(b"\n");
        }
        hasher.update(version.to_le_bytes());
        hasher.update(definition.as_bytes());
        Self(format!("{:x}", hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0[..12.min(self.0.len())])
    }
}

/// Everything an extractor may read during `extract`.
pub struct ExtractionContext<'a> {
    source: &'a dyn DataSource,
    schema: String,
    column_limit: Option<usize>,
}

impl<'a> ExtractionContext<'a> {
    pub fn new(source: &'a dyn DataSource, schema: impl Into<String>) -> Self {
        Self {
            source,
            schema: schema.into(),
            column_limit: None,
        }
    }

    /// Restrict `emit_table` to the first `limit` columns (testing mode).
    pub fn with_column_limit(mut self, limit: Option<usize>) -> Self {
        self.column_limit = limit;
        self
    }

    pub fn source(&self) -> &dyn DataSource {
        self.source
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn column_limit(&self) -> Option<usize> {
        self.column_limit
    }

    /// Substitute `{schema}` in a query template.
    pub fn render_query(&self, template: &str) -> String {
        template.replace("{schema}", &self.schema)
    }

    /// Render `template`, run it and index the result by `index_column`.
    pub fn query_table(&self, template: &str, index_column: &str) -> Result<Table> {
        let sql = self.render_query(template);
        debug!(%sql, "running extractor query");
        Ok(self.source.query(&sql)?.into_table(index_column)?)
    }
}

/// What [`Emitter::emit_table`] does with a validated table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    /// Emit every cell into the record store.
    #[default]
    Emit,
    /// Keep the table in memory and return it to the caller.
    Table,
}

/// Collects the cells emitted by one extractor run.
#[derive(Debug)]
pub struct Emitter {
    prefix: String,
    mode: OutputMode,
    column_limit: Option<usize>,
    output: ExtractorOutput,
    tables: Vec<Table>,
}

impl Emitter {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            mode: OutputMode::Emit,
            column_limit: None,
            output: ExtractorOutput::default(),
            tables: Vec::new(),
        }
    }

    pub fn with_mode(mut self, mode: OutputMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_column_limit(mut self, limit: Option<usize>) -> Self {
        self.column_limit = limit;
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Record one cell. `missing` is the column's fill value for rows that
    /// never receive a cell; it must be the same on every call for a feature.
    pub fn emit(
        &mut self,
        row_key: impl fmt::Display,
        feature: &str,
        value: impl Into<FeatureValue>,
        missing: Option<FeatureValue>,
    ) -> Result<()> {
        let key = feature_key(&self.prefix, feature);
        self.output.meta.declare(&key, missing)?;
        self.output
            .records
            .insert(&row_key.to_string(), &key, value.into());
        Ok(())
    }

    /// Like [`emit`](Self::emit), also attaching a debug annotation.
    pub fn emit_debug(
        &mut self,
        row_key: impl fmt::Display,
        feature: &str,
        value: impl Into<FeatureValue>,
        missing: Option<FeatureValue>,
        note: impl fmt::Display,
    ) -> Result<()> {
        let row_key = row_key.to_string();
        self.emit(&row_key, feature, value, missing)?;
        let key = feature_key(&self.prefix, feature);
        self.output.debug.insert(&row_key, &key, note.to_string());
        Ok(())
    }

    /// Validate `table`, then emit every cell (or keep the table, in
    /// [`OutputMode::Table`]).
    pub fn emit_table(&mut self, table: Table) -> Result<()> {
        info!("The final table has {} rows.", table.row_count());
        validate_table(&table)?;

        if self.mode == OutputMode::Table {
            self.tables.push(table);
            return Ok(());
        }

        let limit = self.column_limit.unwrap_or(usize::MAX);
        for (feature, values) in table.iter_columns().take(limit) {
            for (row_key, value) in table.index().iter().zip(values) {
                self.emit(row_key, feature, value.clone(), None)?;
            }
        }
        Ok(())
    }

    pub fn output(&self) -> &ExtractorOutput {
        &self.output
    }

    pub fn tables(&self) -> &[Table] {
        &self.tables
    }

    pub fn into_output(self) -> ExtractorOutput {
        self.output
    }

    pub fn into_tables(self) -> Vec<Table> {
        self.tables
    }
}

/// Run one extractor outside of the Databuilder.
pub fn run_extractor(
    extractor: &dyn FeatureExtractor,
    ctx: &ExtractionContext<'_>,
    mode: OutputMode,
) -> Result<Emitter> {
    let mut emitter = Emitter::new(extractor.prefix())
        .with_mode(mode)
        .with_column_limit(ctx.column_limit());
    extractor.extract(ctx, &mut emitter)?;
    Ok(emitter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;

    #[test]
    fn test_emit_namespaces_keys() {
        let mut out = Emitter::new("Vitals");
        out.emit(17, "pulse", 80, None).unwrap();
        assert_eq!(
            out.output().records.get("17", "Vitals__pulse"),
            Some(&FeatureValue::Int(80))
        );
    }

    #[test]
    fn test_emit_conflicting_missing_fails() {
        let mut out = Emitter::new("A");
        out.emit("1", "x", 1, Some(FeatureValue::Int(0))).unwrap();
        out.emit("2", "x", 1, Some(FeatureValue::Int(0))).unwrap();
        let err = out.emit("3", "x", 1, None).unwrap_err();
        assert!(matches!(err, CoreError::MetaInconsistent { ref feature, .. } if feature == "A__x"));
    }

    #[test]
    fn test_emit_debug_records_note() {
        let mut out = Emitter::new("A");
        out.emit_debug("1", "x", 1, None, "icd9 428.0").unwrap();
        let debug = out.output().debug.to_records();
        assert_eq!(debug.get("1", "A__x"), Some(&FeatureValue::from("icd9 428.0")));
    }

    fn two_column_table() -> Table {
        let mut table = Table::new("hsp_acct_study_id", vec!["a".into(), "b".into()]);
        table.push_row("1", vec![FeatureValue::Int(1), FeatureValue::Int(2)]);
        table.push_row("2", vec![FeatureValue::Int(3), FeatureValue::Int(4)]);
        table
    }

    #[test]
    fn test_emit_table_column_limit() {
        let mut out = Emitter::new("T").with_column_limit(Some(1));
        out.emit_table(two_column_table()).unwrap();
        let keys = out.output().records.feature_keys();
        assert_eq!(keys.into_iter().collect::<Vec<_>>(), vec!["T__a"]);
    }

    #[test]
    fn test_emit_table_in_table_mode_returns_table() {
        let mut out = Emitter::new("T").with_mode(OutputMode::Table);
        out.emit_table(two_column_table()).unwrap();
        assert!(out.output().records.is_empty());
        assert_eq!(out.into_tables().len(), 1);
    }

    #[test]
    fn test_fingerprint_changes_with_version_and_definition() {
        let base = Fingerprint::compute("A", "A", 1, "SELECT 1");
        assert_eq!(base, Fingerprint::compute("A", "A", 1, "SELECT 1"));
        assert_ne!(base, Fingerprint::compute("A", "A", 2, "SELECT 1"));
        assert_ne!(base, Fingerprint::compute("A", "A", 1, "SELECT 2"));
        assert_eq!(base.as_str().len(), 64);
    }
}
