/**
This modules gives a few tools to consume and prettyprint the span metrics of every label and the
overall metrics.
*/
use enum_iterator::Sequence;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt::Display;
use std::ops::Deref;
use std::str::FromStr;

/// Label used for the metrics computed over all the spans jointly.
pub const OVERALL: &str = "overall";

/// The report holds the metrics of every label seen by the scorer and the overall metrics, in a
/// flat mapping from `"<metric>-<label>"` to the value of the metric. The keys are ordered, which
/// makes the report stable when displayed or serialized.
///
/// # Example
///
/// ```rust
/// use spanf1::{LabelVocabulary, MetricKind, SpanBasedF1Measure, SpanF1Config, OVERALL};
/// use ndarray::{array, ArrayView2};
///
/// let vocabulary = LabelVocabulary::new(["O", "B-ARG0"]);
/// let mut metric = SpanBasedF1Measure::new(vocabulary, SpanF1Config::default());
/// let predictions = array![[[0.1, 0.9], [0.8, 0.2]]];
/// let gold = array![[1usize, 0]];
/// metric
///     .call(predictions.view(), gold.view(), None::<ArrayView2<u8>>, None)
///     .unwrap();
///
/// let report = metric.get_metric(false);
/// let keys: Vec<&str> = report.keys().map(|k| k.as_str()).collect();
/// assert_eq!(
///     keys,
///     vec![
///         "f1-measure-ARG0",
///         "f1-measure-overall",
///         "precision-ARG0",
///         "precision-overall",
///         "recall-ARG0",
///         "recall-overall",
///     ]
/// );
/// assert!((report.value(MetricKind::F1Measure, OVERALL).unwrap() - 1.0).abs() < 1e-6);
/// ```
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(transparent)]
pub struct SpanReport {
    pub(crate) metrics: BTreeMap<String, f64>,
}

impl Deref for SpanReport {
    type Target = BTreeMap<String, f64>;
    fn deref(&self) -> &Self::Target {
        &self.metrics
    }
}

impl From<SpanReport> for BTreeMap<String, f64> {
    fn from(value: SpanReport) -> Self {
        value.metrics
    }
}

impl From<SpanReport> for HashMap<String, f64> {
    fn from(value: SpanReport) -> Self {
        value.metrics.into_iter().collect()
    }
}

impl SpanReport {
    pub(crate) fn insert(&mut self, kind: MetricKind, label: &str, value: f64) -> Option<f64> {
        self.metrics.insert(kind.key(label), value)
    }

    /// Value of the metric `kind` for `label`. Use [`OVERALL`] for the overall metrics.
    pub fn value(&self, kind: MetricKind, label: &str) -> Option<f64> {
        self.metrics.get(&kind.key(label)).copied()
    }

    /// Precision, recall and f1-measure computed over all spans.
    pub fn overall(&self) -> Option<(f64, f64, f64)> {
        Some((
            self.value(MetricKind::Precision, OVERALL)?,
            self.value(MetricKind::Recall, OVERALL)?,
            self.value(MetricKind::F1Measure, OVERALL)?,
        ))
    }
}

/// The report acts as a two-column dataframe when displayed.
impl Display for SpanReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "metric, value")?;
        for (key, value) in self.metrics.iter() {
            writeln!(f, "{}, {}", key, value)?
        }
        Ok(())
    }
}

/// Enumeration of the metrics reported for every label.
#[derive(Debug, Hash, PartialEq, Eq, Copy, Clone, Sequence, Serialize, Deserialize)]
pub enum MetricKind {
    Precision,
    Recall,
    F1Measure,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Precision => "precision",
            Self::Recall => "recall",
            Self::F1Measure => "f1-measure",
        }
    }

    /// Key of this metric for `label` in a `SpanReport`, such as `precision-ARG0`.
    pub fn key(&self, label: &str) -> String {
        format!("{}-{}", self.as_str(), label)
    }
}

impl Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for MetricKind {
    type Err = MetricKindParsingError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "precision" => Ok(MetricKind::Precision),
            "recall" => Ok(MetricKind::Recall),
            "f1-measure" | "f1" => Ok(MetricKind::F1Measure),
            _ => Err(MetricKindParsingError(String::from(s))),
        }
    }
}

#[derive(Debug, PartialEq, PartialOrd, Eq, Ord, Clone)]
pub struct MetricKindParsingError(String);

impl Display for MetricKindParsingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Impossible to parse the string ({}) into a MetricKind",
            self.0
        )
    }
}

impl std::error::Error for MetricKindParsingError {}
