//! The Databuilder: runs extractors incrementally and assembles the matrix.
//!
//! Each registered extractor is looked up in the durable cache by name. When
//! the stored fingerprint matches, the cached output is merged without calling
//! `extract`; otherwise the extractor runs and its entry is overwritten. The
//! cache is only written after the matrix has been persisted, so a failed run
//! leaves the previous blob on disk untouched.

use crate::cache::ExtractionCache;
use crate::config::ExtractionConfig;
use crate::error::{ConfigError, Result};
use crate::extractor::{ExtractionContext, FeatureExtractor, Fingerprint, OutputMode, run_extractor};
use crate::matrix::FeatureMatrix;
use crate::source::DataSource;
use crate::store::{ExtractorOutput, FeatureRecords, MetaStore};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{error, info};

struct Registered {
    extractor: Box<dyn FeatureExtractor>,
    fingerprint: Fingerprint,
}

/// Summary of one orchestration pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// Extractors whose `extract` was called, in run order.
    pub executed: Vec<String>,
    /// Extractors served from the cache, in run order.
    pub cached: Vec<String>,
    pub rows: usize,
    pub columns: usize,
    pub elapsed_ms: u64,
}

/// Result of [`Databuilder::generate_features`].
#[derive(Debug, Clone)]
pub struct BuildOutput {
    pub features: FeatureMatrix,
    /// Cells emitted with a debug annotation, `None` when there were none.
    pub debug: Option<FeatureMatrix>,
    pub report: RunReport,
}

pub struct Databuilder {
    extractors: Vec<Registered>,
    cache: ExtractionCache,
    schema: String,
    index_name: String,
    column_limit: Option<usize>,
    cache_path: PathBuf,
    dataset_path: PathBuf,
    debug_path: Option<PathBuf>,
}

impl Databuilder {
    /// Build an orchestrator, loading the cache blob when `load_cache` is set.
    pub fn new(config: &ExtractionConfig) -> Self {
        let cache = if config.load_cache {
            ExtractionCache::load(&config.cache_path)
        } else {
            ExtractionCache::new()
        };
        Self {
            extractors: Vec::new(),
            cache,
            schema: config.schema.clone(),
            index_name: config.index_name.clone(),
            column_limit: config.test_column_subset,
            cache_path: config.cache_path.clone(),
            dataset_path: config.dataset_path.clone(),
            debug_path: config.debug_path.clone(),
        }
    }

    /// Register an extractor. Its fingerprint is computed here, once.
    pub fn add_extractor(&mut self, extractor: Box<dyn FeatureExtractor>) -> Result<()> {
        if self.extractors.iter().any(|r| r.extractor.name() == extractor.name()) {
            return Err(ConfigError::Invalid {
                message: format!("extractor '{}' registered twice", extractor.name()),
            }
            .into());
        }
        let fingerprint = extractor.fingerprint();
        self.extractors.push(Registered {
            extractor,
            fingerprint,
        });
        Ok(())
    }

    pub fn with_extractor(mut self, extractor: Box<dyn FeatureExtractor>) -> Result<Self> {
        self.add_extractor(extractor)?;
        Ok(self)
    }

    pub fn extractor_names(&self) -> Vec<&str> {
        self.extractors.iter().map(|r| r.extractor.name()).collect()
    }

    pub fn cache(&self) -> &ExtractionCache {
        &self.cache
    }

    /// Run or reuse every extractor in registration order and assemble the
    /// feature and debug matrices. Nothing is written to disk.
    pub fn generate_features(&mut self, source: &dyn DataSource) -> Result<BuildOutput> {
        let start = Instant::now();
        let ctx = ExtractionContext::new(source, self.schema.clone())
            .with_column_limit(self.column_limit);
        let total = self.extractors.len();
        let mut merged = ExtractorOutput::default();
        let mut report = RunReport::default();

        for (i, registered) in self.extractors.iter().enumerate() {
            let name = registered.extractor.name();
            if let Some(cached) = self.cache.lookup(name, &registered.fingerprint) {
                info!("from cache: '{}' ({}/{})", name, i + 1, total);
                merged = merged.merge(cached.clone());
                report.cached.push(name.to_string());
                continue;
            }

            info!("running: '{}' ({}/{})", name, i + 1, total);
            let started = Instant::now();
            let emitter = run_extractor(registered.extractor.as_ref(), &ctx, OutputMode::Emit)
                .inspect_err(|e| error!(extractor = name, error = %e, "extraction failed"))?;
            let output = emitter.into_output();
            info!(
                extractor = name,
                rows = output.records.row_count(),
                cells = output.records.cell_count(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "extractor finished"
            );
            self.cache
                .insert(name, registered.fingerprint.clone(), output.clone());
            merged = merged.merge(output);
            report.executed.push(name.to_string());
        }

        let features = FeatureMatrix::assemble(&self.index_name, &merged.records, &merged.meta);
        let debug = (!merged.debug.is_empty()).then(|| {
            FeatureMatrix::assemble(&self.index_name, &merged.debug.to_records(), &MetaStore::new())
        });

        report.rows = features.row_count();
        report.columns = features.column_count();
        report.elapsed_ms = start.elapsed().as_millis() as u64;
        Ok(BuildOutput {
            features,
            debug,
            report,
        })
    }

    /// Generate features, write the matrix (and debug matrix when a path is
    /// configured), then persist the cache.
    pub fn run(&mut self, source: &dyn DataSource) -> Result<BuildOutput> {
        let output = self.generate_features(source)?;

        output.features.write_csv(&self.dataset_path)?;
        if let Some(path) = &self.debug_path {
            let debug = output.debug.clone().unwrap_or_else(|| {
                FeatureMatrix::assemble(
                    &self.index_name,
                    &FeatureRecords::new(),
                    &MetaStore::new(),
                )
            });
            debug.write_csv(path)?;
        }
        self.save_cache()?;

        info!(
            executed = output.report.executed.len(),
            cached = output.report.cached.len(),
            rows = output.report.rows,
            columns = output.report.columns,
            "databuilder run complete"
        );
        Ok(output)
    }

    /// Persist the in-memory cache to the configured blob path.
    pub fn save_cache(&self) -> Result<()> {
        self.cache.save(&self.cache_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CoreError, SourceError};
    use crate::extractor::Emitter;
    use crate::table::RowSet;
    use std::cell::Cell;
    use std::rc::Rc;

    struct NoSource;

    impl DataSource for NoSource {
        fn query(&self, _sql: &str) -> std::result::Result<RowSet, SourceError> {
            Err(SourceError::Query {
                message: "no data".into(),
            })
        }

        fn describe(&self) -> String {
            "none".into()
        }
    }

    struct Counting {
        name: &'static str,
        calls: Rc<Cell<usize>>,
    }

    impl FeatureExtractor for Counting {
        fn name(&self) -> &str {
            self.name
        }

        fn version(&self) -> u32 {
            1
        }

        fn extract(&self, _ctx: &ExtractionContext<'_>, out: &mut Emitter) -> Result<()> {
            self.calls.set(self.calls.get() + 1);
            out.emit("1", "x", 1, None)
        }
    }

    fn in_memory_config() -> ExtractionConfig {
        ExtractionConfig {
            load_cache: false,
            ..Default::default()
        }
    }

    #[test]
    fn test_second_pass_served_from_memory_cache() {
        let calls = Rc::new(Cell::new(0));
        let mut builder = Databuilder::new(&in_memory_config());
        builder
            .add_extractor(Box::new(Counting {
                name: "A",
                calls: calls.clone(),
            }))
            .unwrap();

        let first = builder.generate_features(&NoSource).unwrap();
        let second = builder.generate_features(&NoSource).unwrap();
        assert_eq!(calls.get(), 1);
        assert_eq!(first.report.executed, vec!["A"]);
        assert_eq!(second.report.cached, vec!["A"]);
        assert_eq!(first.features, second.features);
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let calls = Rc::new(Cell::new(0));
        let mut builder = Databuilder::new(&in_memory_config());
        builder
            .add_extractor(Box::new(Counting {
                name: "A",
                calls: calls.clone(),
            }))
            .unwrap();
        let err = builder
            .add_extractor(Box::new(Counting { name: "A", calls }))
            .unwrap_err();
        assert!(matches!(err, CoreError::Config(_)));
    }

    #[test]
    fn test_no_debug_matrix_without_annotations() {
        let mut builder = Databuilder::new(&in_memory_config());
        builder
            .add_extractor(Box::new(Counting {
                name: "A",
                calls: Rc::new(Cell::new(0)),
            }))
            .unwrap();
        assert!(builder.generate_features(&NoSource).unwrap().debug.is_none());
    }
}
