use ndarray::{Array2, Array3, ArrayView2};
use serde::Deserialize;
use serde_jsonlines::{json_lines, write_json_lines};
use spanf1::{
    LabelEncoding, LabelVocabulary, MetricKind, ScalarMix, SpanBasedF1Measure, SpanF1Config,
    SpanF1ConfigBuilder, SpanReport, OVERALL,
};

const TAGS: [&str; 13] = [
    "O",
    "B-ARG0",
    "I-ARG0",
    "B-ARG1",
    "I-ARG1",
    "B-ARG2",
    "I-ARG2",
    "B-V",
    "I-V",
    "B-ARGM-TMP",
    "I-ARGM-TMP",
    "B-C-ARG1",
    "I-C-ARG1",
];

#[derive(Deserialize)]
struct Example {
    gold_tags: Vec<String>,
    predicted_tags: Vec<String>,
}

fn load_examples() -> Vec<Example> {
    json_lines::<Example, _>("tests/data/srl_batch.jsonl")
        .expect("file srl_batch.jsonl not found in test directory")
        .map(|r| r.unwrap())
        .collect()
}

fn tag_id(tag: &str) -> usize {
    TAGS.iter().position(|t| *t == tag).unwrap()
}

/// Scores, gold ids and mask of the examples, padded with `O` up to `padded_length`.
fn to_batch(examples: &[Example], padded_length: usize) -> (Array3<f32>, Array2<usize>, Array2<u8>) {
    let mut predictions = Array3::<f32>::zeros((examples.len(), padded_length, TAGS.len()));
    let mut gold = Array2::<usize>::zeros((examples.len(), padded_length));
    let mut mask = Array2::<u8>::zeros((examples.len(), padded_length));
    for (row, example) in examples.iter().enumerate() {
        for position in 0..padded_length {
            let (predicted, gold_id) = match (
                example.predicted_tags.get(position),
                example.gold_tags.get(position),
            ) {
                (Some(p), Some(g)) => {
                    mask[[row, position]] = 1;
                    (tag_id(p), tag_id(g))
                }
                _ => (0, 0),
            };
            predictions[[row, position, predicted]] = 1.0;
            gold[[row, position]] = gold_id;
        }
    }
    (predictions, gold, mask)
}

fn assert_close(report: &SpanReport, kind: MetricKind, label: &str, expected: f64) {
    let actual = report.value(kind, label).unwrap();
    assert!(
        (actual - expected).abs() < 1e-4,
        "{}: expected {}, got {}",
        kind.key(label),
        expected,
        actual
    );
}

#[test]
fn srl_batch_from_jsonl() {
    let examples = load_examples();
    let (predictions, gold, mask) = to_batch(&examples, 8);
    let mut metric = SpanBasedF1Measure::new(LabelVocabulary::new(TAGS), SpanF1Config::default());
    metric
        .call(predictions.view(), gold.view(), Some(mask.view()), None)
        .unwrap();

    assert_eq!(metric.counts().totals(), (6, 3, 2));
    let report = metric.get_metric(false);
    assert_close(&report, MetricKind::Precision, OVERALL, 6.0 / 9.0);
    assert_close(&report, MetricKind::Recall, OVERALL, 0.75);
    assert_close(&report, MetricKind::F1Measure, OVERALL, 0.705882);
    assert_close(&report, MetricKind::F1Measure, "ARG0", 1.0);
    assert_close(&report, MetricKind::Precision, "ARG1", 0.5);
    assert_close(&report, MetricKind::Recall, "ARG1", 0.5);
    assert_close(&report, MetricKind::F1Measure, "ARGM-TMP", 0.0);
    assert_close(&report, MetricKind::Recall, "ARG2", 0.0);
    // The continuation is merged into `ARG1` before scoring.
    assert!(report.value(MetricKind::Precision, "C-ARG1").is_none());
}

#[test]
fn one_call_per_sequence_gives_the_same_report() {
    let examples = load_examples();
    let (predictions, gold, mask) = to_batch(&examples, 6);
    let mut batched = SpanBasedF1Measure::new(LabelVocabulary::new(TAGS), SpanF1Config::default());
    batched
        .call(predictions.view(), gold.view(), Some(mask.view()), None)
        .unwrap();

    let mut sequential =
        SpanBasedF1Measure::new(LabelVocabulary::new(TAGS), SpanF1Config::default());
    for example in examples.chunks(1) {
        let (predictions, gold, _) = to_batch(example, 6);
        sequential
            .call(predictions.view(), gold.view(), None::<ArrayView2<u8>>, None)
            .unwrap();
    }
    assert_eq!(batched.counts(), sequential.counts());
    assert_eq!(batched.get_metric(true), sequential.get_metric(true));
}

#[test]
fn ignored_classes_and_parallel_argmax() {
    let examples = load_examples();
    let (predictions, gold, mask) = to_batch(&examples, 6);
    let config = SpanF1ConfigBuilder::default()
        .label_encoding_name("BIO")
        .ignore_classes(["V"])
        .parallel(true)
        .build()
        .unwrap();
    assert_eq!(config.label_encoding(), LabelEncoding::BIO);
    let mut metric = SpanBasedF1Measure::new(LabelVocabulary::new(TAGS), config);
    metric
        .call(predictions.view(), gold.view(), Some(mask.view()), None)
        .unwrap();
    assert_eq!(metric.counts().totals(), (3, 3, 2));
    assert_eq!(metric.counts().true_positives("V"), 0);
}

#[test]
fn failed_call_does_not_change_the_report() {
    let examples = load_examples();
    let (predictions, gold, mask) = to_batch(&examples, 6);
    let mut metric = SpanBasedF1Measure::new(LabelVocabulary::new(TAGS), SpanF1Config::default());
    metric
        .call(predictions.view(), gold.view(), Some(mask.view()), None)
        .unwrap();
    let before = metric.get_metric(false);

    let mut bad_gold = gold.clone();
    bad_gold[[2, 5]] = TAGS.len();
    assert!(metric
        .call(predictions.view(), bad_gold.view(), Some(mask.view()), None)
        .is_err());
    assert_eq!(metric.get_metric(false), before);
}

#[test]
fn report_survives_a_jsonl_round_trip() {
    let examples = load_examples();
    let (predictions, gold, mask) = to_batch(&examples, 6);
    let mut metric = SpanBasedF1Measure::new(LabelVocabulary::new(TAGS), SpanF1Config::default());
    metric
        .call(predictions.view(), gold.view(), Some(mask.view()), None)
        .unwrap();
    let report = metric.get_metric(true);

    let path = std::env::temp_dir().join(format!("spanf1_report_{}.jsonl", std::process::id()));
    write_json_lines(&path, [&report]).unwrap();
    let read_back: Vec<SpanReport> = json_lines(&path)
        .unwrap()
        .collect::<std::io::Result<_>>()
        .unwrap();
    std::fs::remove_file(&path).unwrap();

    assert_eq!(read_back.len(), 1);
    let keys: Vec<&String> = read_back[0].keys().collect();
    assert_eq!(keys, report.keys().collect::<Vec<_>>());
    for (key, value) in report.iter() {
        assert!((read_back[0][key] - value).abs() < 1e-12);
    }
}

#[test]
fn scalar_mix_of_two_layers() {
    let first = Array3::<f64>::from_elem((1, 2, 3), 1.0);
    let second = Array3::<f64>::from_elem((1, 2, 3), 3.0);
    let mix = ScalarMix::with_parameters(vec![0.0, 0.0], 2.0, false);
    let mixed = mix
        .forward(&[first.view(), second.view()], None::<ArrayView2<u8>>)
        .unwrap();
    assert!(mixed.iter().all(|v| (v - 4.0).abs() < 1e-12));
}
