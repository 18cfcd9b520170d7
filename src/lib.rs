/*!
This library computes span-based precision, recall and f1-measure for sequence tagging tasks such
as semantic role labelling or named entity recognition. Predictions are given as class scores,
decoded with the argmax, turned into tags with a label vocabulary and finally chunked into typed
spans. A predicted span only counts as correct if its label, start and end all match a gold span.
# LABEL ENCODINGS
The following encodings are supported:
* BIO: `B` begins a span, `I` continues the span of the same class and `O` is outside of any
    span. An `I` tag that does not continue a span of its class starts a new span.
* IOB1: `I` is a token inside a span and `B` is only used for the first token of a span
    immediately following another span of the same class.
* BIOUL: `B`egin, `I`nside, `L`ast, `U`nit and `O`utside. This encoding is strict: an ill-formed
    sequence is an error.

# Terminology
* A tag is a string made of a prefix and a class, such as `B-ARG0`. The class is what we score:
    `ARG0`, `PER`, `LOC`, etc.
* A span is a contiguous, inclusive range of tokens `(start, end)` labelled with a class.
* A continuation span has a class starting with `C-`, such as `C-ARG1`. It marks a discontinuous
    argument; before scoring, every continuation of `X` is merged with the spans of `X` into a
    single span covering all of them.
* The counters are accumulated across batches. The metrics are computed on demand for every label
    and over all labels (`overall`).

# Example
```rust
use spanf1::{LabelVocabulary, SpanBasedF1Measure, SpanF1ConfigBuilder, LabelEncoding};
use ndarray::{array, ArrayView2};

let vocabulary = LabelVocabulary::new(["O", "B-ARG0", "I-ARG0", "B-ARG1", "I-ARG1"]);
let config = SpanF1ConfigBuilder::new()
    .label_encoding(LabelEncoding::BIO)
    .build()
    .unwrap();
let mut metric = SpanBasedF1Measure::new(vocabulary, config);

// Predicted: B-ARG0 O ; gold: B-ARG0 B-ARG1
let predictions = array![[[0.1, 0.8, 0.0, 0.1, 0.0], [0.6, 0.1, 0.1, 0.1, 0.1]]];
let gold = array![[1usize, 3]];
metric
    .call(predictions.view(), gold.view(), None::<ArrayView2<u8>>, None)
    .unwrap();

let (precision, recall, _) = metric.get_metric(true).overall().unwrap();
assert!((precision - 1.0).abs() < 1e-6);
assert!((recall - 0.5).abs() < 1e-6);
```
*/

mod config;
mod entity;
mod metrics;
mod mix;
mod reporter;
mod vocabulary;

// The public api starts here
pub use entity::{InvalidTagSequence, LabelEncoding, Spans, TypedSpan};

pub use metrics::{
    compute_metrics, ConfigurationError, MetricError, MetricName, SpanBasedF1Measure, SpanCounts,
};

pub use reporter::{MetricKind, MetricKindParsingError, SpanReport, OVERALL};

pub use config::{SpanF1Config, SpanF1ConfigBuilder};

pub use vocabulary::{LabelVocabulary, DEFAULT_TAG_NAMESPACE};

pub use mix::{FloatExt, ScalarMix};
