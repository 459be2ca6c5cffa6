//! Model evaluation on labeled data

use crate::dataset::Dataset;
use crate::model::TrainedModel;
use crate::predictor::{ModelHandle, Predictor, DEFAULT_THRESHOLD};
use serde::{Deserialize, Serialize};
use spamguard_core::{Error, Prediction, Result};
use std::fmt;
use tracing::info;

/// Probabilities are clipped to `[EPS, 1 - EPS]` before taking logs
const LOG_LOSS_EPS: f64 = 1e-15;

/// Counts of predicted vs. actual labels, spam being positive
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub true_positives: usize,
    pub false_positives: usize,
    pub true_negatives: usize,
    pub false_negatives: usize,
}

impl ConfusionMatrix {
    fn record(&mut self, predicted: bool, actual: bool) {
        match (predicted, actual) {
            (true, true) => self.true_positives += 1,
            (true, false) => self.false_positives += 1,
            (false, false) => self.true_negatives += 1,
            (false, true) => self.false_negatives += 1,
        }
    }

    /// Number of classified examples
    pub fn total(&self) -> usize {
        self.true_positives + self.false_positives + self.true_negatives + self.false_negatives
    }

    /// Number of correctly classified examples
    pub fn correct(&self) -> usize {
        self.true_positives + self.true_negatives
    }
}

/// Evaluation results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metrics {
    /// Fraction classified correctly
    pub accuracy: f64,

    /// Area under the ROC curve; NaN when only one class is present
    pub auc: f64,

    /// Spam precision
    pub precision: f64,

    /// Spam recall
    pub recall: f64,

    /// Harmonic mean of precision and recall
    pub f1_score: f64,

    /// Mean cross-entropy of the predicted probabilities
    pub log_loss: f64,

    /// Raw counts
    pub confusion: ConfusionMatrix,

    /// Number of evaluated examples
    pub examples: usize,
}

impl Metrics {
    /// Write the report to the log
    pub fn log_report(&self) {
        info!("Evaluated {} examples", self.examples);
        info!("Accuracy: {:.2}%", self.accuracy * 100.0);
        info!("AUC: {}", percent(self.auc));
        info!(
            "Precision: {:.2}%, Recall: {:.2}%, F1: {:.2}%, Log-loss: {:.4}",
            self.precision * 100.0,
            self.recall * 100.0,
            self.f1_score * 100.0,
            self.log_loss
        );
    }
}

impl fmt::Display for Metrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Examples:  {}", self.examples)?;
        writeln!(f, "Accuracy:  {:.2}%", self.accuracy * 100.0)?;
        writeln!(f, "AUC:       {}", percent(self.auc))?;
        writeln!(f, "Precision: {:.2}%", self.precision * 100.0)?;
        writeln!(f, "Recall:    {:.2}%", self.recall * 100.0)?;
        writeln!(f, "F1:        {:.2}%", self.f1_score * 100.0)?;
        writeln!(f, "Log-loss:  {:.4}", self.log_loss)?;
        write!(
            f,
            "Confusion: tp={} fp={} tn={} fn={}",
            self.confusion.true_positives,
            self.confusion.false_positives,
            self.confusion.true_negatives,
            self.confusion.false_negatives
        )
    }
}

fn percent(value: f64) -> String {
    if value.is_nan() {
        "n/a".to_string()
    } else {
        format!("{:.2}%", value * 100.0)
    }
}

/// Scores a model against labeled data
#[derive(Debug, Clone, Copy)]
pub struct Evaluator {
    threshold: f64,
}

impl Default for Evaluator {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

impl Evaluator {
    /// Evaluator with the default 0.5 threshold
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluator with a custom inclusive threshold
    pub fn with_threshold(threshold: f64) -> Self {
        Self { threshold }
    }

    /// Evaluate a model on a dataset through a predictor serving it
    pub fn evaluate(&self, model: &TrainedModel, dataset: &Dataset) -> Result<Metrics> {
        if dataset.is_empty() {
            return Err(Error::EmptyDataset);
        }
        let predictor = Predictor::new(ModelHandle::with_model(model.clone()))
            .with_threshold(self.threshold)?;
        Self::evaluate_predictor(&predictor, dataset)
    }

    /// Evaluate whatever model a predictor currently serves, at its threshold
    pub fn evaluate_predictor(predictor: &Predictor, dataset: &Dataset) -> Result<Metrics> {
        if dataset.is_empty() {
            return Err(Error::EmptyDataset);
        }
        let predictions = dataset
            .iter()
            .map(|example| predictor.predict(&example.text))
            .collect::<Result<Vec<_>>>()?;
        Ok(score(predictions, &dataset.labels()))
    }
}

fn score(predictions: Vec<Prediction>, labels: &[bool]) -> Metrics {
    let mut confusion = ConfusionMatrix::default();
    let mut log_loss = 0.0;
    for (prediction, &actual) in predictions.iter().zip(labels) {
        confusion.record(prediction.is_spam, actual);
        let p = prediction.probability.clamp(LOG_LOSS_EPS, 1.0 - LOG_LOSS_EPS);
        log_loss -= if actual { p.ln() } else { (1.0 - p).ln() };
    }

    let examples = confusion.total();
    let precision = ratio(
        confusion.true_positives,
        confusion.true_positives + confusion.false_positives,
    );
    let recall = ratio(
        confusion.true_positives,
        confusion.true_positives + confusion.false_negatives,
    );
    let f1_score = if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    };

    let probabilities: Vec<f64> = predictions.iter().map(|p| p.probability).collect();

    Metrics {
        accuracy: ratio(confusion.correct(), examples),
        auc: roc_auc(&probabilities, labels),
        precision,
        recall,
        f1_score,
        log_loss: log_loss / examples as f64,
        confusion,
        examples,
    }
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// ROC AUC via the rank-sum statistic, tied scores sharing their mean rank.
///
/// Returns NaN unless both classes are present.
pub fn roc_auc(scores: &[f64], labels: &[bool]) -> f64 {
    let positives = labels.iter().filter(|l| **l).count();
    let negatives = labels.len() - positives;
    if positives == 0 || negatives == 0 {
        return f64::NAN;
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut positive_rank_sum = 0.0;
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && scores[order[end]] == scores[order[start]] {
            end += 1;
        }
        // ranks start..end (0-based) share rank mean((start+1)..=end)
        let rank = (start + 1 + end) as f64 / 2.0;
        let tied_positives = order[start..end].iter().filter(|&&i| labels[i]).count();
        positive_rank_sum += rank * tied_positives as f64;
        start = end;
    }

    let p = positives as f64;
    (positive_rank_sum - p * (p + 1.0) / 2.0) / (p * negatives as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trainer::Trainer;
    use spamguard_core::LabeledExample;

    #[test]
    fn test_auc_perfect_and_inverted() {
        let labels = [false, false, true, true];
        assert_eq!(roc_auc(&[0.1, 0.2, 0.8, 0.9], &labels), 1.0);
        assert_eq!(roc_auc(&[0.9, 0.8, 0.2, 0.1], &labels), 0.0);
    }

    #[test]
    fn test_auc_ties_count_half() {
        assert_eq!(roc_auc(&[0.5, 0.5], &[false, true]), 0.5);
        // one of four positive/negative pairs is tied, the rest ordered
        assert_eq!(roc_auc(&[0.1, 0.4, 0.4, 0.9], &[false, false, true, true]), 0.875);
    }

    #[test]
    fn test_auc_single_class_is_nan() {
        assert!(roc_auc(&[0.2, 0.7], &[true, true]).is_nan());
    }

    #[test]
    fn test_score_counts() {
        let predictions = vec![
            Prediction::from_probability(0.9, 0.5),
            Prediction::from_probability(0.6, 0.5),
            Prediction::from_probability(0.3, 0.5),
            Prediction::from_probability(0.2, 0.5),
        ];
        let metrics = score(predictions, &[true, false, true, false]);
        assert_eq!(metrics.accuracy, 0.5);
        assert_eq!(metrics.confusion.true_positives, 1);
        assert_eq!(metrics.confusion.false_positives, 1);
        assert_eq!(metrics.confusion.false_negatives, 1);
        assert_eq!(metrics.precision, 0.5);
        assert_eq!(metrics.recall, 0.5);
        assert_eq!(metrics.auc, 0.75);
        assert!(metrics.log_loss > 0.0);
    }

    #[test]
    fn test_empty_dataset() {
        let dataset = Dataset::from_examples(vec![
            LabeledExample::spam("free money"),
            LabeledExample::ham("see you soon"),
        ]);
        let model = Trainer::default().fit(&dataset).unwrap();
        let err = Evaluator::new().evaluate(&model, &Dataset::default()).unwrap_err();
        assert!(matches!(err, Error::EmptyDataset));
    }

    #[test]
    fn test_non_finite_model_output_fails_evaluation() {
        use crate::config::FeaturizerConfig;
        use crate::featurizer::Featurizer;
        use crate::model::{LabelEncoding, LogisticRegression};

        let featurizer = Featurizer::new(FeaturizerConfig::default())
            .fit(&["free money", "team meeting"])
            .unwrap();
        let dimension = featurizer.dimension();
        let model = TrainedModel::from_parts(
            featurizer,
            LabelEncoding::fit(&[true, false]).unwrap(),
            LogisticRegression::new(vec![0.0; dimension], f64::NAN),
        )
        .unwrap();
        let dataset = Dataset::from_examples(vec![
            LabeledExample::spam("free money"),
            LabeledExample::ham("team meeting"),
        ]);

        let err = Evaluator::new().evaluate(&model, &dataset).unwrap_err();
        assert!(matches!(err, Error::Internal(_)), "{:?}", err);
    }

    #[test]
    fn test_invalid_threshold_is_rejected() {
        let dataset = Dataset::from_examples(vec![
            LabeledExample::spam("free money"),
            LabeledExample::ham("see you soon"),
        ]);
        let model = Trainer::default().fit(&dataset).unwrap();
        let err = Evaluator::with_threshold(1.5).evaluate(&model, &dataset).unwrap_err();
        assert!(matches!(err, Error::Config(_)), "{:?}", err);
    }

    #[test]
    fn test_display_handles_nan_auc() {
        let metrics = score(vec![Prediction::from_probability(0.9, 0.5)], &[true]);
        let text = metrics.to_string();
        assert!(text.contains("Accuracy:  100.00%"));
        assert!(text.contains("AUC:       n/a"));
    }
}
