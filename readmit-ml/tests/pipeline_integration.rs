//! End-to-end tests for the evaluation pipeline on small hand-built matrices.

use readmit_ml::{
    Dataset, FeatureFrame, FeatureSelector, KFold, LabelColumns, LogisticRegression, MlError,
    Params, Pipeline, Preprocessing, RandomOverSampler, Result, RowFilter, StandardScaler,
    Temporal, Trainable,
};
use readmit_ml::dataset::parse_timestamp;
use readmit_ml::search::{ParamDistribution, SearchSpace};
use serde_json::json;
use std::io::Write;

const HEADER: &str = "hsp_acct_study_id,HospitalProblemsExtractor__hcup_category_chf,\
ReadmissionExtractor__admit_date_time,ReadmissionExtractor__days_to_readmit,\
ReadmissionExtractor__discharge_date_time,ScoreExtractor__score";

/// Train rows admitted in early January, test rows in February, and one
/// June visit that is dropped by the horizon cutoff.
fn scored_csv() -> String {
    let rows = [
        "1,True,2020-01-01,,2020-01-01,0.1",
        "2,False,2020-01-02,10,2020-01-02,0.5",
        "3,True,2020-01-03,5,2020-01-03,0.9",
        "4,False,2020-02-01,,2020-02-01,0.2",
        "5,True,2020-02-02,3,2020-02-02,0.8",
        "6,True,2020-02-03,,2020-02-03,0.7",
        "7,False,2020-06-01,2,2020-06-01,0.3",
    ];
    format!("{HEADER}\n{}\n", rows.join("\n"))
}

fn load(csv: &str) -> Dataset {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(csv.as_bytes()).unwrap();
    Dataset::load_csv(file.path(), &LabelColumns::default(), true).unwrap()
}

/// Predicts the `ScoreExtractor__score` column as-is.
#[derive(Clone, Default)]
struct ScoreColumn;

impl Trainable for ScoreColumn {
    fn name(&self) -> &str {
        "score_column"
    }

    fn fresh_copy(&self) -> Box<dyn Trainable> {
        Box::new(self.clone())
    }

    fn params(&self) -> Params {
        Params::new()
    }

    fn set_params(&mut self, _params: &Params) -> Result<()> {
        Ok(())
    }

    fn fit(&mut self, _x: &FeatureFrame, _y: &[u8]) -> Result<()> {
        Ok(())
    }

    fn predict_proba(&self, x: &FeatureFrame) -> Result<Vec<f64>> {
        x.column("ScoreExtractor__score")
            .ok_or_else(|| MlError::model("score column missing"))
    }
}

fn temporal_pipeline() -> Pipeline {
    let mut pipeline = Pipeline::new(load(&scored_csv()), "HospitalProblemsExtractor__hcup_category_");
    let splitter = Temporal::new(parse_timestamp("2020-01-15").unwrap());
    pipeline
        .build_train_and_test_sets(30, &splitter, None, &[])
        .unwrap();
    pipeline
        .train_model("score", &ScoreColumn, Preprocessing::new(), &Params::new())
        .unwrap();
    pipeline
}

#[test]
fn intervention_threshold_comes_from_train_predictions() {
    let pipeline = temporal_pipeline();
    let fold = &pipeline.folds()[0];
    assert_eq!(fold.train.row_keys(), &["1", "2", "3"]);
    assert_eq!(fold.test.row_keys(), &["4", "5", "6"]);
    assert_eq!(fold.train_labels, vec![0, 1, 1]);
    assert_eq!(fold.test_labels, vec![0, 1, 0]);

    let metrics = pipeline.evaluate_model("score", None, 33.0).unwrap();
    assert_eq!(metrics.len(), 1);
    let m = &metrics[0];
    assert!((m.intervention_threshold.unwrap() - 0.636).abs() < 1e-9);
    assert_eq!(m.num_intervened, Some(2.0));
    assert_eq!(m.num_intervened_correct, Some(1.0));
    assert_eq!(m.precision, Some(0.5));
    assert_eq!(m.recall, Some(1.0));
    assert_eq!(m.specificity, Some(0.5));
    assert_eq!(m.auc, Some(1.0));
    assert!(m.total_time_secs >= m.test_time_secs);
}

#[test]
fn filtered_evaluation_uses_matching_test_rows() {
    let pipeline = temporal_pipeline();
    let chf = RowFilter::flag("HospitalProblemsExtractor__hcup_category_chf");
    let metrics = pipeline.evaluate_model("score", Some(&chf), 33.0).unwrap();
    // Test visits 5 and 6 carry the flag; both are above the threshold.
    assert_eq!(metrics[0].num_predictions, 2.0);
    assert_eq!(metrics[0].num_intervened, Some(2.0));
    assert_eq!(metrics[0].precision, Some(0.5));
}

#[test]
fn simulation_reports_rounded_rows_per_model() {
    let pipeline = temporal_pipeline();
    let results = pipeline.simulate_interventions(&[33.0, 100.0]).unwrap();
    let rows = &results["score"];
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].pct, 33.0);
    assert_eq!(rows[0].precision, Some(0.5));
    assert_eq!(rows[0].recall, Some(1.0));
    assert_eq!(rows[0].specificity, Some(0.5));
    // At 100% the threshold is the lowest train prediction (0.1).
    assert_eq!(rows[1].num_intervened, Some(3.0));
    assert_eq!(rows[1].precision, Some(0.333));
}

#[test]
fn rebuilding_folds_discards_trained_models() {
    let mut pipeline = temporal_pipeline();
    assert_eq!(pipeline.model_names().collect::<Vec<_>>(), vec!["score"]);
    let splitter = Temporal::new(parse_timestamp("2020-01-15").unwrap());
    pipeline
        .build_train_and_test_sets(30, &splitter, None, &[])
        .unwrap();
    assert!(matches!(
        pipeline.evaluate_model("score", None, 25.0),
        Err(MlError::NotFound(_))
    ));
}

/// 40 visits in the first half of 2020; the first feature separates the
/// classes, the second is noise.
fn synthetic_csv() -> String {
    let mut lines = vec![HEADER.to_string()];
    for i in 0..40 {
        let positive = i % 3 == 0;
        let day = (i % 28) + 1;
        let month = i / 28 + 1;
        lines.push(format!(
            "{},{},2020-{month:02}-{day:02},{},2020-{month:02}-{day:02},{}",
            100 + i,
            if i % 2 == 0 { "True" } else { "False" },
            if positive { "4" } else { "" },
            if positive { 2.0 + (i % 5) as f64 / 10.0 } else { -1.0 - (i % 7) as f64 / 10.0 },
        ));
    }
    lines.push("999,False,2020-06-30,,2020-06-30,0.0".to_string());
    lines.join("\n")
}

/// Records the row keys of every frame it is fitted on; keeps all columns.
#[derive(Default)]
struct RecordingSelector {
    fitted_on: Vec<Vec<String>>,
    columns: Vec<String>,
}

impl FeatureSelector for RecordingSelector {
    fn name(&self) -> &str {
        "recording"
    }

    fn fit(&mut self, train: &FeatureFrame, _labels: &[u8]) -> Result<()> {
        self.fitted_on.push(train.row_keys().to_vec());
        self.columns = train.columns().to_vec();
        Ok(())
    }

    fn select(&self, frame: &FeatureFrame) -> Result<FeatureFrame> {
        frame.select_columns(&self.columns)
    }
}

#[test]
fn preprocessing_is_fitted_on_training_rows_only() {
    let mut pipeline = Pipeline::new(load(&synthetic_csv()), "HospitalProblemsExtractor__hcup_category_");
    let splitter = KFold::new(4).unwrap();
    pipeline
        .build_train_and_test_sets(30, &splitter, Some(11), &[])
        .unwrap();

    let mut selector = RecordingSelector::default();
    let mut scaler = StandardScaler::new();
    let mut sampler = RandomOverSampler::new(Some(11));
    let pre = Preprocessing::new()
        .with_selector(&mut selector)
        .with_normalizer(&mut scaler)
        .with_sampler(&mut sampler);
    pipeline
        .train_model("lr", &LogisticRegression::new(), pre, &Params::new())
        .unwrap();

    assert_eq!(selector.fitted_on.len(), 4);
    for (fold, seen) in pipeline.folds().iter().zip(&selector.fitted_on) {
        assert_eq!(seen.as_slice(), fold.train.row_keys());
        assert!(fold.test.row_keys().iter().all(|k| !seen.contains(k)));
    }

    let metrics = pipeline.evaluate_model("lr", None, 25.0).unwrap();
    assert_eq!(metrics.len(), 4);
    let aucs: Vec<f64> = metrics.iter().filter_map(|m| m.auc).collect();
    assert!(!aucs.is_empty());
    assert!(aucs.iter().all(|auc| *auc > 0.9));
}

#[test]
fn grid_search_runs_on_first_fold() {
    let mut pipeline = Pipeline::new(load(&synthetic_csv()), "HospitalProblemsExtractor__hcup_category_");
    let splitter = KFold::new(3).unwrap();
    pipeline
        .build_train_and_test_sets(30, &splitter, Some(5), &[])
        .unwrap();

    let space = SearchSpace::from([
        (
            "learning_rate".to_string(),
            ParamDistribution::Uniform { min: 0.05, max: 0.5 },
        ),
        (
            "l2".to_string(),
            ParamDistribution::Choice {
                values: vec![json!(0.0), json!(0.01)],
            },
        ),
    ]);
    let mut scaler = StandardScaler::new();
    let result = pipeline
        .grid_search(&LogisticRegression::new(), space, 4, None, Some(&mut scaler), 3, Some(5))
        .unwrap();
    assert_eq!(result.trials.len(), 4);
    assert_eq!(result.model, "logistic_regression");
    assert!(result.best().unwrap().metric.unwrap() > 0.9);
}

#[test]
fn empty_cohort_is_an_error() {
    let mut pipeline = Pipeline::new(load(&scored_csv()), "HospitalProblemsExtractor__hcup_category_");
    let splitter = Temporal::new(parse_timestamp("2020-01-15").unwrap());
    let err = pipeline.build_train_and_test_sets(30, &splitter, None, &["sepsis".to_string()]);
    assert!(matches!(err, Err(MlError::Dataset(_))));
}
