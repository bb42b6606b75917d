//! CLI subcommand handlers.

use crate::settings::Settings;
use crate::{CacheAction, Commands, ConfigAction};
use readmit_core::extractors::default_extractors;
use readmit_core::{Databuilder, ExtractionCache, SqliteSource};
use readmit_ml::metrics::combine_fold_metrics;
use readmit_ml::{
    Dataset, LaceModel, LogisticRegression, MedianImputer, MinMaxScaler, Normalizer, Params,
    Pipeline, Preprocessing, StandardScaler, Trainable,
};
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelKind {
    /// L2-regularized logistic regression
    Logistic,
    /// The LACE index
    Lace,
}

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormalizerKind {
    Standard,
    MinMax,
    Median,
    None,
}

/// Handle a CLI subcommand.
pub fn handle_command(command: Commands, settings: Settings, workspace: &Path) -> anyhow::Result<()> {
    match command {
        Commands::Extract {
            database,
            no_cache,
            output,
            column_subset,
        } => handle_extract(settings, database, no_cache, output, column_subset),
        Commands::Evaluate {
            dataset,
            model,
            normalize,
            conditions,
            seed,
            json,
        } => handle_evaluate(settings, dataset, &model, normalize, conditions, seed, json),
        Commands::Cache { action } => handle_cache(action, &settings),
        Commands::Config { action } => handle_config(action, &settings, workspace),
    }
}

fn handle_extract(
    mut settings: Settings,
    database: Option<PathBuf>,
    no_cache: bool,
    output: Option<PathBuf>,
    column_subset: Option<usize>,
) -> anyhow::Result<()> {
    let config = &mut settings.extraction;
    if let Some(database) = database {
        config.database = Some(database);
    }
    if let Some(output) = output {
        config.dataset_path = output;
    }
    if no_cache {
        config.load_cache = false;
    }
    if column_subset.is_some() {
        config.test_column_subset = column_subset;
    }
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;

    let db_path = config
        .database
        .clone()
        .ok_or_else(|| anyhow::anyhow!("No database configured; pass --database or set extraction.database"))?;
    let source = SqliteSource::open(&db_path)?;
    if config.schema != "main" {
        source.attach(&config.schema, &db_path)?;
    }

    let mut builder = Databuilder::new(config);
    for extractor in default_extractors(config) {
        builder.add_extractor(extractor)?;
    }
    let output = builder.run(&source)?;
    let report = &output.report;

    println!(
        "Wrote {} rows x {} features to {}",
        report.rows,
        report.columns,
        config.dataset_path.display()
    );
    println!("  executed: {}", list_or_none(&report.executed));
    println!("  cached:   {}", list_or_none(&report.cached));
    println!("  elapsed:  {} ms", report.elapsed_ms);
    Ok(())
}

fn list_or_none(names: &[String]) -> String {
    if names.is_empty() {
        "(none)".to_string()
    } else {
        names.join(", ")
    }
}

fn normalizer(kind: NormalizerKind) -> Option<Box<dyn Normalizer>> {
    match kind {
        NormalizerKind::Standard => Some(Box::new(StandardScaler::new())),
        NormalizerKind::MinMax => Some(Box::new(MinMaxScaler::new())),
        NormalizerKind::Median => Some(Box::new(MedianImputer::new())),
        NormalizerKind::None => None,
    }
}

fn handle_evaluate(
    settings: Settings,
    dataset: Option<PathBuf>,
    models: &[ModelKind],
    normalize: NormalizerKind,
    conditions: Vec<String>,
    seed: Option<u64>,
    as_json: bool,
) -> anyhow::Result<()> {
    let config = settings.evaluation;
    let path = dataset.unwrap_or_else(|| config.dataset_path.clone());
    let data = Dataset::load_csv(&path, &config.labels, config.dummify_categorical)?;
    let mut pipeline = Pipeline::new(data, config.cohort_prefix.clone());
    info!("{} features available.", pipeline.num_features());

    let splitter = config.splitter.build()?;
    let conditions = if conditions.is_empty() {
        config.health_conditions.clone()
    } else {
        conditions
    };
    let seed = seed.or(config.seed);
    pipeline.build_train_and_test_sets(config.horizon_days, splitter.as_ref(), seed, &conditions)?;

    for kind in models {
        let (name, model): (&str, Box<dyn Trainable>) = match kind {
            ModelKind::Logistic => ("logistic_regression", Box::new(LogisticRegression::new())),
            ModelKind::Lace => ("lace", Box::new(LaceModel::new())),
        };
        let mut norm = match kind {
            ModelKind::Logistic => normalizer(normalize),
            ModelKind::Lace => None,
        };
        let mut pre = Preprocessing::new();
        if let Some(norm) = norm.as_deref_mut() {
            pre = pre.with_normalizer(norm);
        }
        pipeline.train_model(name, model.as_ref(), pre, &Params::new())?;
    }

    let mut summaries = serde_json::Map::new();
    for name in pipeline.model_names() {
        let folds = pipeline.evaluate_model(name, None, config.intervention_pct)?;
        summaries.insert(name.to_string(), serde_json::to_value(combine_fold_metrics(&folds))?);
    }
    let simulation = pipeline.simulate_interventions(&config.intervention_pcts)?;

    if as_json {
        let report = json!({
            "metrics": summaries,
            "interventions": serde_json::to_value(&simulation)?,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    for (name, rows) in &simulation {
        let auc = summaries
            .get(name)
            .and_then(|m| m.get("auc"))
            .and_then(|v| v.as_f64());
        println!("\n{name} (AUC {})", fmt_opt(auc));
        println!(
            "{:>6} {:>15} {:>22} {:>10} {:>8} {:>12}",
            "%", "num_intervened", "num_intervened_correct", "precision", "recall", "specificity"
        );
        for row in rows {
            println!(
                "{:>6} {:>15} {:>22} {:>10} {:>8} {:>12}",
                row.pct,
                fmt_opt(row.num_intervened),
                fmt_opt(row.num_intervened_correct),
                fmt_opt(row.precision),
                fmt_opt(row.recall),
                fmt_opt(row.specificity),
            );
        }
    }
    Ok(())
}

fn fmt_opt(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:.3}"))
}

fn handle_cache(action: CacheAction, settings: &Settings) -> anyhow::Result<()> {
    let path = &settings.extraction.cache_path;
    let mut cache = ExtractionCache::load(path);
    match action {
        CacheAction::Show => {
            if cache.is_empty() {
                println!("Cache at {} is empty.", path.display());
                return Ok(());
            }
            println!("Cache at {} ({} entries):", path.display(), cache.len());
            for entry in cache.entries() {
                println!(
                    "  {:<32} {}  {}  {} rows",
                    entry.name,
                    entry.fingerprint,
                    entry.created_at.format("%Y-%m-%d %H:%M:%S"),
                    entry.output.records.row_count()
                );
            }
            Ok(())
        }
        CacheAction::Clear { extractor } => {
            match extractor {
                Some(name) => {
                    if cache.remove(&name).is_none() {
                        anyhow::bail!("No cache entry for '{}'", name);
                    }
                    println!("Removed cache entry '{}'.", name);
                }
                None => {
                    cache.clear();
                    println!("Cleared cache at {}.", path.display());
                }
            }
            cache.save(path)?;
            Ok(())
        }
    }
}

fn handle_config(action: ConfigAction, settings: &Settings, workspace: &Path) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let config_path = workspace.join(readmit_core::config::WORKSPACE_CONFIG_FILE);
            if config_path.exists() {
                println!(
                    "Configuration file already exists at: {}",
                    config_path.display()
                );
                return Ok(());
            }
            let toml_str = toml::to_string_pretty(&Settings::default())?;
            std::fs::write(&config_path, &toml_str)?;
            println!(
                "Created default configuration at: {}",
                config_path.display()
            );
            Ok(())
        }
        ConfigAction::Show => {
            let toml_str = toml::to_string_pretty(settings)?;
            println!("{}", toml_str);
            Ok(())
        }
    }
}
