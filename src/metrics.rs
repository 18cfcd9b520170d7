/**
This module accumulates the span-level true positives, false positives and false negatives of
batches of predictions, and computes the precision, recall and f1-measure of every span label.
*/
use crate::config::SpanF1Config;
use crate::entity::{InvalidTagSequence, Spans};
use crate::reporter::{MetricKind, SpanReport, OVERALL};
use crate::vocabulary::LabelVocabulary;
use ahash::HashMap as AHashMap;
use enum_iterator::{all, Sequence};
use itertools::multizip;
use log::{debug, trace};
use ndarray::{prelude::*, Zip};
use ndarray_stats::QuantileExt;
use std::{
    collections::{BTreeSet, HashMap},
    error::Error,
    fmt::{self, Display},
    hash::BuildHasher,
    str::FromStr,
};

/// Added to every denominator to avoid dividing by zero.
const EPSILON: f64 = 1e-13;

#[derive(Debug, Clone, PartialEq, Eq)]
/// The inputs or the setup of a metric are not consistent. Nothing is accumulated when one of
/// these is returned.
pub enum ConfigurationError {
    /// The label encoding is not one of `BIO`, `IOB1` or `BIOUL`.
    UnknownLabelEncoding(String),
    /// No metric is registered under this name.
    UnknownMetric(String),
    /// The namespace holding the tags could not be found.
    MissingNamespace(String),
    /// A gold label id is not smaller than the number of classes of the predictions.
    LabelOutOfRange { id: usize, num_classes: usize },
    /// A label id has no tag in the vocabulary.
    LabelOutOfVocabulary { id: usize, vocabulary_size: usize },
    ShapeMismatch {
        what: &'static str,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },
    WrongNumberOfTensors { expected: usize, actual: usize },
    /// The scalar mixture was built to mix zero tensors.
    EmptyMixture,
    /// Layer normalization was requested without a mask.
    MissingMask,
    /// Layer normalization was requested with a mask that selects no position.
    EmptyMask,
}

impl Display for ConfigurationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownLabelEncoding(name) => write!(f, "Unknown label encoding: {}", name),
            Self::UnknownMetric(name) => write!(f, "Unknown metric: {}", name),
            Self::MissingNamespace(namespace) => {
                write!(f, "The vocabulary has no namespace named {}", namespace)
            }
            Self::LabelOutOfRange { id, num_classes } => write!(
                f,
                "A gold label passed to SpanBasedF1Measure contains an id >= {}, the number of classes (found id {})",
                num_classes, id
            ),
            Self::LabelOutOfVocabulary {
                id,
                vocabulary_size,
            } => write!(
                f,
                "The label id {} is not part of the vocabulary, which has {} tags",
                id, vocabulary_size
            ),
            Self::ShapeMismatch {
                what,
                expected,
                actual,
            } => write!(
                f,
                "Unexpected shape for {}: expected {:?}, got {:?}",
                what, expected, actual
            ),
            Self::WrongNumberOfTensors { expected, actual } => write!(
                f,
                "{} tensors were passed, but the module was initialized to mix {} tensors",
                actual, expected
            ),
            Self::EmptyMixture => write!(f, "The scalar mixture has no tensor to mix"),
            Self::MissingMask => write!(f, "A mask is required to do layer normalization"),
            Self::EmptyMask => write!(f, "The mask does not select any element"),
        }
    }
}

impl Error for ConfigurationError {}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Errors returned while accumulating a batch.
pub enum MetricError {
    Configuration(ConfigurationError),
    InvalidTagSequence(InvalidTagSequence),
    /// The scores of a token cannot be ordered (they contain a NaN) or are empty.
    UndefinedArgmax,
}

impl Display for MetricError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration(err) => Display::fmt(err, f),
            Self::InvalidTagSequence(err) => Display::fmt(err, f),
            Self::UndefinedArgmax => write!(
                f,
                "Could not compute the predicted class of a token: its scores are empty or not comparable"
            ),
        }
    }
}

impl Error for MetricError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Configuration(err) => Some(err),
            Self::InvalidTagSequence(err) => Some(err),
            Self::UndefinedArgmax => None,
        }
    }
}

impl From<ConfigurationError> for MetricError {
    fn from(value: ConfigurationError) -> Self {
        Self::Configuration(value)
    }
}

impl From<InvalidTagSequence> for MetricError {
    fn from(value: InvalidTagSequence) -> Self {
        Self::InvalidTagSequence(value)
    }
}

/// Names under which a metric can be built with `SpanBasedF1Measure::from_name`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Sequence)]
pub enum MetricName {
    SpanF1,
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SpanF1 => "span_f1",
        }
    }
}

impl Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for MetricName {
    type Err = ConfigurationError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        all::<MetricName>()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| ConfigurationError::UnknownMetric(String::from(s)))
    }
}

/// Computes the precision, recall and f1-measure from raw counts. A small epsilon is added to
/// the denominators, so empty counts give `0.0` instead of `NaN`.
pub fn compute_metrics(
    true_positives: usize,
    false_positives: usize,
    false_negatives: usize,
) -> (f64, f64, f64) {
    let tp = true_positives as f64;
    let precision = tp / (tp + false_positives as f64 + EPSILON);
    let recall = tp / (tp + false_negatives as f64 + EPSILON);
    let f1_measure = 2. * ((precision * recall) / (precision + recall + EPSILON));
    (precision, recall, f1_measure)
}

/// Per-label span counters.
///
/// The counts of several scorers (for instance one per worker) can be pooled with `merge` before
/// building a single report.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpanCounts {
    true_positives: AHashMap<String, usize>,
    false_positives: AHashMap<String, usize>,
    false_negatives: AHashMap<String, usize>,
}

fn increment(counter: &mut AHashMap<String, usize>, label: &str) {
    match counter.get_mut(label) {
        Some(count) => *count += 1,
        None => {
            counter.insert(String::from(label), 1);
        }
    }
}

impl SpanCounts {
    pub fn true_positives(&self, label: &str) -> usize {
        self.true_positives.get(label).copied().unwrap_or(0)
    }
    pub fn false_positives(&self, label: &str) -> usize {
        self.false_positives.get(label).copied().unwrap_or(0)
    }
    pub fn false_negatives(&self, label: &str) -> usize {
        self.false_negatives.get(label).copied().unwrap_or(0)
    }

    /// Every label seen by at least one counter, in lexicographic order.
    pub fn labels(&self) -> BTreeSet<&str> {
        self.true_positives
            .keys()
            .chain(self.false_positives.keys())
            .chain(self.false_negatives.keys())
            .map(String::as_str)
            .collect()
    }

    /// Pooled true positives, false positives and false negatives.
    pub fn totals(&self) -> (usize, usize, usize) {
        (
            self.true_positives.values().sum(),
            self.false_positives.values().sum(),
            self.false_negatives.values().sum(),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.true_positives.is_empty()
            && self.false_positives.is_empty()
            && self.false_negatives.is_empty()
    }

    /// Adds the counts of `other` to these counts.
    pub fn merge(&mut self, other: &SpanCounts) {
        let pairs = [
            (&mut self.true_positives, &other.true_positives),
            (&mut self.false_positives, &other.false_positives),
            (&mut self.false_negatives, &other.false_negatives),
        ];
        for (counter, other_counter) in pairs {
            for (label, count) in other_counter {
                *counter.entry(label.clone()).or_insert(0) += count;
            }
        }
    }

    /// Builds the report of every label and the overall metrics.
    pub fn report(&self) -> SpanReport {
        let mut report = SpanReport::default();
        for label in self.labels() {
            let (precision, recall, f1_measure) = compute_metrics(
                self.true_positives(label),
                self.false_positives(label),
                self.false_negatives(label),
            );
            report.insert(MetricKind::Precision, label, precision);
            report.insert(MetricKind::Recall, label, recall);
            report.insert(MetricKind::F1Measure, label, f1_measure);
        }
        let (tp, fp, fn_) = self.totals();
        let (precision, recall, f1_measure) = compute_metrics(tp, fp, fn_);
        report.insert(MetricKind::Precision, OVERALL, precision);
        report.insert(MetricKind::Recall, OVERALL, recall);
        report.insert(MetricKind::F1Measure, OVERALL, f1_measure);
        report
    }

    pub(crate) fn clear(&mut self) {
        self.true_positives.clear();
        self.false_positives.clear();
        self.false_negatives.clear();
    }

    /// Matches the predicted spans of a sequence against its gold spans. A predicted span is
    /// consumed by the gold span it matches.
    fn update<'s>(&mut self, predicted_spans: Spans<'s>, mut gold_spans: Spans<'s>) {
        for span in predicted_spans {
            if gold_spans.remove(&span) {
                increment(&mut self.true_positives, span.label());
            } else {
                increment(&mut self.false_positives, span.label());
            }
        }
        for span in gold_spans {
            increment(&mut self.false_negatives, span.label());
        }
    }
}

/// Computes the precision, recall and f1-measure of typed spans, as in the CoNLL shared tasks.
/// Predictions are given as class scores, decoded with the argmax and converted to tags with the
/// label vocabulary. The counts accumulate over calls until `reset` is called.
#[derive(Debug, Clone)]
pub struct SpanBasedF1Measure {
    label_vocabulary: LabelVocabulary,
    config: SpanF1Config,
    counts: SpanCounts,
}

impl SpanBasedF1Measure {
    pub fn new(label_vocabulary: LabelVocabulary, config: SpanF1Config) -> Self {
        Self {
            label_vocabulary,
            config,
            counts: SpanCounts::default(),
        }
    }

    /// Builds the metric registered under `name`.
    pub fn from_name(
        name: &str,
        label_vocabulary: LabelVocabulary,
        config: SpanF1Config,
    ) -> Result<Self, ConfigurationError> {
        match name.parse::<MetricName>()? {
            MetricName::SpanF1 => Ok(Self::new(label_vocabulary, config)),
        }
    }

    /// Builds the metric with the tags of the configured namespace.
    pub fn from_namespaces<H: BuildHasher>(
        namespaces: &HashMap<String, Vec<String>, H>,
        config: SpanF1Config,
    ) -> Result<Self, ConfigurationError> {
        let label_vocabulary = LabelVocabulary::from_namespace(namespaces, config.tag_namespace())?;
        Ok(Self::new(label_vocabulary, config))
    }

    pub fn config(&self) -> &SpanF1Config {
        &self.config
    }

    pub fn label_vocabulary(&self) -> &LabelVocabulary {
        &self.label_vocabulary
    }

    /// Counters accumulated since the last reset.
    pub fn counts(&self) -> &SpanCounts {
        &self.counts
    }

    /// Accumulates the spans of a batch.
    ///
    /// * `predictions`: Scores of shape `(batch, sequence, num_classes)`.
    /// * `gold_labels`: Gold label ids of shape `(batch, sequence)`.
    /// * `mask`: Optional boolean or numeric mask of shape `(batch, sequence)`. The length of a
    ///   sequence is its number of entries different from `false` / `0`, and only that many
    ///   leading tokens are scored.
    /// * `prediction_map`: Optional `(batch, num_classes)` array. When given, the predicted and
    ///   gold ids of a row are remapped through the row before being looked up in the vocabulary.
    ///
    /// The whole batch is validated and converted to spans before any counter is updated, so the
    /// counters are left untouched when an error is returned.
    pub fn call<F, M>(
        &mut self,
        predictions: ArrayView3<F>,
        gold_labels: ArrayView2<usize>,
        mask: Option<ArrayView2<M>>,
        prediction_map: Option<ArrayView2<usize>>,
    ) -> Result<(), MetricError>
    where
        F: PartialOrd + Send + Sync,
        M: PartialEq + Default + Clone,
    {
        let (batch_size, sequence_length, num_classes) = predictions.dim();
        check_shape("gold_labels", &[batch_size, sequence_length], gold_labels.shape())?;
        if let Some(mask) = mask.as_ref() {
            check_shape("mask", &[batch_size, sequence_length], mask.shape())?;
        }
        if let Some(map) = prediction_map.as_ref() {
            check_shape("prediction_map", &[batch_size, num_classes], map.shape())?;
        }
        if let Some(&id) = gold_labels.iter().find(|&&id| id >= num_classes) {
            return Err(ConfigurationError::LabelOutOfRange { id, num_classes }.into());
        }

        let predicted_ids = argmax_last_axis(&predictions, self.config.parallel())?;
        let lengths: Vec<usize> = match mask.as_ref() {
            Some(mask) => mask
                .rows()
                .into_iter()
                .map(|row| row.iter().filter(|&value| *value != M::default()).count())
                .collect(),
            None => vec![sequence_length; batch_size],
        };
        let (predicted_ids, gold_ids) = match prediction_map.as_ref() {
            Some(map) => (
                gather(map, predicted_ids.view())?,
                gather(map, gold_labels)?,
            ),
            None => (predicted_ids, gold_labels.to_owned()),
        };

        let batch_spans = batch_to_spans(
            &self.label_vocabulary,
            &self.config,
            predicted_ids.view(),
            gold_ids.view(),
            &lengths,
        )?;
        for (predicted_spans, gold_spans) in batch_spans {
            self.counts.update(predicted_spans, gold_spans);
        }
        Ok(())
    }

    /// Returns the precision, recall and f1-measure of every label seen so far, and the overall
    /// metrics. The counters are cleared afterwards if `reset` is true.
    pub fn get_metric(&mut self, reset: bool) -> SpanReport {
        let report = self.counts.report();
        if reset {
            self.reset();
        }
        report
    }

    pub fn reset(&mut self) {
        debug!("Resetting the span counters");
        self.counts.clear();
    }
}

fn check_shape(
    what: &'static str,
    expected: &[usize],
    actual: &[usize],
) -> Result<(), ConfigurationError> {
    if expected == actual {
        Ok(())
    } else {
        Err(ConfigurationError::ShapeMismatch {
            what,
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        })
    }
}

/// Index of the maximum of every lane along the class axis. The first maximum wins.
fn argmax_last_axis<F>(predictions: &ArrayView3<F>, parallel: bool) -> Result<Array2<usize>, MetricError>
where
    F: PartialOrd + Send + Sync,
{
    let lanes = Zip::from(predictions.lanes(Axis(2)));
    let argmax = if parallel {
        lanes.par_map_collect(|lane| lane.argmax().ok())
    } else {
        lanes.map_collect(|lane| lane.argmax().ok())
    };
    if argmax.iter().any(Option::is_none) {
        return Err(MetricError::UndefinedArgmax);
    }
    Ok(argmax.mapv(|id| id.unwrap_or_default()))
}

/// Replaces every id of row `i` by `map[i, id]`.
fn gather(map: &ArrayView2<usize>, ids: ArrayView2<usize>) -> Result<Array2<usize>, ConfigurationError> {
    let mut gathered = Array2::zeros(ids.raw_dim());
    for ((row, col), &id) in ids.indexed_iter() {
        gathered[[row, col]] =
            *map.get((row, id))
                .ok_or(ConfigurationError::LabelOutOfRange {
                    id,
                    num_classes: map.ncols(),
                })?;
    }
    Ok(gathered)
}

/// Converts every sequence of the batch into its predicted and gold spans. Sequences of length 0
/// are skipped.
fn batch_to_spans<'v>(
    vocabulary: &'v LabelVocabulary,
    config: &SpanF1Config,
    predicted_ids: ArrayView2<usize>,
    gold_ids: ArrayView2<usize>,
    lengths: &[usize],
) -> Result<Vec<(Spans<'v>, Spans<'v>)>, MetricError> {
    let encoding = config.label_encoding();
    let mut batch_spans = Vec::with_capacity(lengths.len());
    for (index, predicted, gold, &length) in multizip((
        0..,
        predicted_ids.rows(),
        gold_ids.rows(),
        lengths.iter(),
    )) {
        if length == 0 {
            debug!("Skipping sequence {} of the batch, it has a length of 0", index);
            continue;
        }
        let predicted_tags = vocabulary.lookup_all(predicted.iter().take(length).copied())?;
        let gold_tags = vocabulary.lookup_all(gold.iter().take(length).copied())?;
        let predicted_spans = encoding
            .tags_to_spans(&predicted_tags, config.ignore_classes())?
            .handle_continued_spans();
        let gold_spans = encoding
            .tags_to_spans(&gold_tags, config.ignore_classes())?
            .handle_continued_spans();
        trace!(
            "Sequence {}: {} predicted spans, {} gold spans",
            index,
            predicted_spans.len(),
            gold_spans.len()
        );
        batch_spans.push((predicted_spans, gold_spans));
    }
    Ok(batch_spans)
}
