//! Cross-validation: fold generation, backtesting and model selection.
//!
//! The backtester's primary output is computed over the concatenation of
//! all fold predictions against the concatenated held-out actuals, not
//! as a mean of per-fold metrics.

use crate::error::{ForecastError, Result};
use crate::forecast::Forecaster;
use crate::metrics;

/// How the training window evolves across folds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SplitStrategy {
    /// Fixed-size window sliding forward.
    Rolling,
    /// Window anchored at the start, growing.
    #[default]
    Expanding,
}

/// Cross-validation configuration.
#[derive(Debug, Clone)]
pub struct CvConfig {
    pub strategy: SplitStrategy,
    /// Length of the first training window.
    pub initial_window: usize,
    /// Test horizon per fold.
    pub horizon: usize,
    /// Offset between consecutive training ends.
    pub step: usize,
    /// Maximum number of folds.
    pub max_folds: usize,
    /// Gap between training end and test start.
    pub gap: usize,
    /// Cap on the training window length (truncates the oldest end).
    pub max_window: Option<usize>,
}

impl Default for CvConfig {
    fn default() -> Self {
        Self {
            strategy: SplitStrategy::Expanding,
            initial_window: 12,
            horizon: 1,
            step: 1,
            max_folds: 10,
            gap: 0,
            max_window: None,
        }
    }
}

impl CvConfig {
    fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("initial_window", self.initial_window),
            ("horizon", self.horizon),
            ("step", self.step),
            ("max_folds", self.max_folds),
        ] {
            if value < 1 {
                return Err(ForecastError::invalid_parameter(
                    name,
                    value,
                    "must be at least 1",
                ));
            }
        }
        Ok(())
    }
}

/// One train/test split. Ranges are half-open: `train_start..train_end`
/// and `test_start..test_end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fold {
    pub train_start: usize,
    pub train_end: usize,
    pub test_start: usize,
    pub test_end: usize,
}

/// Generate train/test folds over a series of length `n`.
pub fn generate_folds(n: usize, config: &CvConfig) -> Result<Vec<Fold>> {
    config.validate()?;
    let needed = config.initial_window + config.gap + config.horizon;
    if n < needed {
        return Err(ForecastError::InsufficientData { needed, got: n });
    }

    let mut folds = Vec::new();
    let mut train_end = config.initial_window;
    while folds.len() < config.max_folds {
        let test_start = train_end + config.gap;
        let test_end = test_start + config.horizon;
        if test_end > n {
            break;
        }
        let train_start = match config.strategy {
            SplitStrategy::Rolling => train_end.saturating_sub(config.initial_window),
            SplitStrategy::Expanding => match config.max_window {
                Some(w) => train_end.saturating_sub(w),
                None => 0,
            },
        };
        folds.push(Fold {
            train_start,
            train_end,
            test_start,
            test_end,
        });
        train_end += config.step;
    }

    Ok(folds)
}

/// Per-fold evaluation detail.
#[derive(Debug, Clone)]
pub struct FoldResult {
    pub fold: Fold,
    pub mae: f64,
    pub mse: f64,
    pub rmse: f64,
    pub mape: Option<f64>,
    pub smape: Option<f64>,
}

/// Backtest outcome. The headline metrics are computed once over the
/// concatenated actual/prediction vectors.
#[derive(Debug, Clone)]
pub struct BacktestResult {
    pub folds: Vec<FoldResult>,
    pub actuals: Vec<f64>,
    pub predictions: Vec<f64>,
    pub mae: f64,
    pub mse: f64,
    pub rmse: f64,
    pub mape: Option<f64>,
    pub smape: Option<f64>,
    /// Scaled error against a last-value baseline over the same folds.
    pub mase: Option<f64>,
}

/// Backtest a model over rolling or expanding folds.
///
/// `factory` produces a fresh forecaster per fold so no state leaks
/// across training windows.
pub fn backtest<F>(values: &[f64], factory: F, config: &CvConfig) -> Result<BacktestResult>
where
    F: Fn() -> Box<dyn Forecaster>,
{
    let folds = generate_folds(values.len(), config)?;

    let mut fold_results = Vec::with_capacity(folds.len());
    let mut actuals: Vec<f64> = Vec::new();
    let mut predictions: Vec<f64> = Vec::new();
    let mut baseline: Vec<f64> = Vec::new();

    for fold in folds {
        let train = &values[fold.train_start..fold.train_end];
        let test = &values[fold.test_start..fold.test_end];

        let mut model = factory();
        model.fit(train)?;
        let forecast = model.forecast(config.horizon, 0.95)?;

        let fold_mae = metrics::mae(test, &forecast.point)?;
        let fold_mse = metrics::mse(test, &forecast.point)?;
        fold_results.push(FoldResult {
            fold,
            mae: fold_mae,
            mse: fold_mse,
            rmse: fold_mse.sqrt(),
            mape: metrics::mape(test, &forecast.point)?,
            smape: metrics::smape(test, &forecast.point)?,
        });

        let last_train = train[train.len() - 1];
        actuals.extend_from_slice(test);
        predictions.extend_from_slice(&forecast.point);
        baseline.extend(std::iter::repeat(last_train).take(test.len()));
    }

    let mae = metrics::mae(&actuals, &predictions)?;
    let mse = metrics::mse(&actuals, &predictions)?;
    Ok(BacktestResult {
        mae,
        mse,
        rmse: mse.sqrt(),
        mape: metrics::mape(&actuals, &predictions)?,
        smape: metrics::smape(&actuals, &predictions)?,
        mase: metrics::mase(&actuals, &predictions, &baseline)?,
        folds: fold_results,
        actuals,
        predictions,
    })
}

/// Cross-validate a model: an alias for [`backtest`] matching the
/// driver surface the host query layer consumes.
pub fn cross_validate<F>(values: &[f64], factory: F, config: &CvConfig) -> Result<BacktestResult>
where
    F: Fn() -> Box<dyn Forecaster>,
{
    backtest(values, factory, config)
}

/// A scoring function over a backtest result; lower is better.
pub type ScoreFn = fn(&BacktestResult) -> f64;

/// Default candidate score: RMSE over the concatenated folds.
pub fn rmse_score(result: &BacktestResult) -> f64 {
    result.rmse
}

/// A named model candidate for selection.
pub struct Candidate {
    pub name: String,
    pub factory: Box<dyn Fn() -> Box<dyn Forecaster>>,
}

impl Candidate {
    pub fn new(
        name: impl Into<String>,
        factory: impl Fn() -> Box<dyn Forecaster> + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            factory: Box::new(factory),
        }
    }
}

impl std::fmt::Debug for Candidate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Candidate({})", self.name)
    }
}

/// Ranking entry from model selection.
#[derive(Debug, Clone)]
pub struct RankedModel {
    pub name: String,
    pub score: f64,
}

/// Model-selection outcome: candidates ranked best first.
#[derive(Debug, Clone)]
pub struct SelectionResult {
    pub best: String,
    pub ranking: Vec<RankedModel>,
}

/// Rank candidate models under identical CV splits.
///
/// Candidates that fail to backtest are dropped from the ranking; if
/// every candidate fails the last error surfaces.
pub fn auto_select(
    values: &[f64],
    candidates: &[Candidate],
    config: &CvConfig,
    score: Option<ScoreFn>,
) -> Result<SelectionResult> {
    if candidates.is_empty() {
        return Err(ForecastError::InvalidInput(
            "at least one candidate model is required".to_string(),
        ));
    }
    let score = score.unwrap_or(rmse_score);

    let mut ranking: Vec<RankedModel> = Vec::new();
    let mut last_error: Option<ForecastError> = None;
    for candidate in candidates {
        match backtest(values, &candidate.factory, config) {
            Ok(result) => {
                let value = score(&result);
                log::trace!("candidate {} scored {value:.4}", candidate.name);
                ranking.push(RankedModel {
                    name: candidate.name.clone(),
                    score: value,
                });
            }
            Err(e) => {
                log::debug!("candidate {} failed: {e}", candidate.name);
                last_error = Some(e);
            }
        }
    }

    if ranking.is_empty() {
        return Err(last_error.unwrap_or_else(|| {
            ForecastError::Degenerate("no candidate could be backtested".to_string())
        }));
    }

    ranking.sort_by(|a, b| a.score.partial_cmp(&b.score).unwrap_or(std::cmp::Ordering::Equal));
    Ok(SelectionResult {
        best: ranking[0].name.clone(),
        ranking,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::baseline::{Naive, Sma};
    use approx::assert_relative_eq;

    #[test]
    fn test_expanding_folds_grow() {
        let config = CvConfig {
            initial_window: 10,
            horizon: 2,
            step: 3,
            max_folds: 4,
            ..CvConfig::default()
        };
        let folds = generate_folds(30, &config).unwrap();
        assert_eq!(folds.len(), 4);
        for fold in &folds {
            assert_eq!(fold.train_start, 0);
            assert_eq!(fold.test_start, fold.train_end);
            assert_eq!(fold.test_end - fold.test_start, 2);
        }
        assert!(folds[1].train_end > folds[0].train_end);
    }

    #[test]
    fn test_rolling_folds_fixed_width() {
        let config = CvConfig {
            strategy: SplitStrategy::Rolling,
            initial_window: 8,
            horizon: 1,
            step: 2,
            max_folds: 100,
            ..CvConfig::default()
        };
        let folds = generate_folds(20, &config).unwrap();
        for fold in &folds {
            assert_eq!(fold.train_end - fold.train_start, 8);
        }
    }

    #[test]
    fn test_folds_strictly_increasing_test_start() {
        let config = CvConfig {
            initial_window: 5,
            horizon: 1,
            step: 1,
            max_folds: 1000,
            ..CvConfig::default()
        };
        let folds = generate_folds(50, &config).unwrap();
        for pair in folds.windows(2) {
            assert!(pair[1].test_start > pair[0].test_start);
        }
        assert_eq!(folds.len(), 45);
    }

    #[test]
    fn test_gap_between_train_and_test() {
        let config = CvConfig {
            initial_window: 6,
            horizon: 2,
            gap: 3,
            max_folds: 2,
            ..CvConfig::default()
        };
        let folds = generate_folds(40, &config).unwrap();
        for fold in &folds {
            assert_eq!(fold.test_start - fold.train_end, 3);
        }
    }

    #[test]
    fn test_max_window_truncates_expanding() {
        let config = CvConfig {
            initial_window: 5,
            horizon: 1,
            step: 5,
            max_folds: 10,
            max_window: Some(8),
            ..CvConfig::default()
        };
        let folds = generate_folds(40, &config).unwrap();
        for fold in folds.iter().skip(1) {
            assert!(fold.train_end - fold.train_start <= 8);
        }
    }

    #[test]
    fn test_insufficient_data() {
        let config = CvConfig {
            initial_window: 20,
            horizon: 5,
            ..CvConfig::default()
        };
        assert!(matches!(
            generate_folds(10, &config),
            Err(ForecastError::InsufficientData { .. })
        ));
    }

    #[test]
    fn test_backtest_aggregates_by_concatenation() {
        // SMA(2) over [1..6] with min_train 3, horizon 2, step 1, two
        // folds. Fold 1 trains on [1,2,3], predicts mean(2,3)=2.5 for
        // actuals [4,5]; fold 2 trains on [1..4], predicts 3.5 for [5,6].
        let values = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let config = CvConfig {
            initial_window: 3,
            horizon: 2,
            step: 1,
            max_folds: 2,
            ..CvConfig::default()
        };
        let result = backtest(
            &values,
            || Box::new(Sma::new(2).unwrap()) as Box<dyn Forecaster>,
            &config,
        )
        .unwrap();

        assert_eq!(result.actuals, vec![4.0, 5.0, 5.0, 6.0]);
        assert_eq!(result.predictions, vec![2.5, 2.5, 3.5, 3.5]);
        let expected = metrics::mae(&result.actuals, &result.predictions).unwrap();
        assert_relative_eq!(result.mae, expected, epsilon = 1e-12);
        // The concatenated MAE differs from the mean of per-fold MAEs in
        // general; here both folds have equal size so they coincide, but
        // the vectors prove the contract.
        assert_eq!(result.folds.len(), 2);
    }

    #[test]
    fn test_auto_select_prefers_better_model() {
        // A trending series: drift should beat a flat naive forecast.
        let values: Vec<f64> = (0..40).map(|i| i as f64).collect();
        let candidates = vec![
            Candidate::new("Naive", || Box::new(Naive::new()) as Box<dyn Forecaster>),
            Candidate::new("RandomWalkDrift", || {
                Box::new(crate::baseline::RandomWalkDrift::new()) as Box<dyn Forecaster>
            }),
        ];
        let config = CvConfig {
            initial_window: 10,
            horizon: 3,
            step: 3,
            max_folds: 5,
            ..CvConfig::default()
        };
        let result = auto_select(&values, &candidates, &config, None).unwrap();
        assert_eq!(result.best, "RandomWalkDrift");
        assert_eq!(result.ranking.len(), 2);
        assert!(result.ranking[0].score <= result.ranking[1].score);
    }
}
