//! Extractor defined by a query template.

use crate::config::SqlExtractorDef;
use crate::error::Result;
use crate::extractor::{Emitter, ExtractionContext, FeatureExtractor};

/// Emits every column of a query result, indexed by the configured column.
#[derive(Debug, Clone)]
pub struct SqlExtractor {
    def: SqlExtractorDef,
}

impl SqlExtractor {
    pub fn new(def: SqlExtractorDef) -> Self {
        Self { def }
    }
}

impl FeatureExtractor for SqlExtractor {
    fn name(&self) -> &str {
        &self.def.name
    }

    fn prefix(&self) -> &str {
        self.def.prefix.as_deref().unwrap_or(&self.def.name)
    }

    fn version(&self) -> u32 {
        self.def.version
    }

    fn definition(&self) -> String {
        format!("{}\n{}", self.def.index_column, self.def.query)
    }

    fn extract(&self, ctx: &ExtractionContext<'_>, out: &mut Emitter) -> Result<()> {
        let table = ctx.query_table(&self.def.query, &self.def.index_column)?;
        out.emit_table(table)
    }
}
