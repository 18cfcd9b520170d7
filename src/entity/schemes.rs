/**
This modules gives the tooling necessary to parse a sequence of string tags into a set of typed
spans, for each of the supported label encodings.
*/
use crate::entity::{Spans, TypedSpan};
use crate::metrics::ConfigurationError;
use enum_iterator::{all, Sequence};
use serde::{Deserialize, Serialize};
use std::convert::TryFrom;
use std::error::Error;
use std::fmt::Display;
use std::str::FromStr;

#[allow(clippy::upper_case_acronyms)]
#[derive(
    Debug, Clone, Copy, Sequence, Hash, Eq, PartialEq, Ord, PartialOrd, Default, Serialize, Deserialize,
)]
/// Enumeration of the supported label encodings. They indicate how a sequence of tags is
/// chunked into spans.
pub enum LabelEncoding {
    /// `B` begins a span, `I` continues it and `O` is outside of any span.
    #[default]
    BIO,
    /// `I` is inside a span and `B` is only used to separate two adjacent spans of the same class.
    IOB1,
    /// `B`egin, `I`nside, `O`utside, `U`nit and `L`ast. Every multi-token span must be closed by
    /// an `L` tag.
    BIOUL,
}

impl LabelEncoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BIO => "BIO",
            Self::IOB1 => "IOB1",
            Self::BIOUL => "BIOUL",
        }
    }

    /// Converts a sequence of tags into the set of spans it describes. Spans whose class is in
    /// `classes_to_ignore` are never returned.
    ///
    /// * `tags`: Tags of a single sequence, such as `["B-ARG0", "I-ARG0", "O"]`.
    /// * `classes_to_ignore`: Span classes (the part after the prefix, e.g. `"V"`) to drop.
    pub fn tags_to_spans<'a, C: AsRef<str>>(
        &self,
        tags: &[&'a str],
        classes_to_ignore: &[C],
    ) -> Result<Spans<'a>, InvalidTagSequence> {
        match self {
            Self::BIO => bio_tags_to_spans(tags, classes_to_ignore),
            Self::IOB1 => iob1_tags_to_spans(tags, classes_to_ignore),
            Self::BIOUL => bioul_tags_to_spans(tags, classes_to_ignore),
        }
    }
}

impl Display for LabelEncoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for LabelEncoding {
    type Err = ConfigurationError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        all::<LabelEncoding>()
            .find(|encoding| encoding.as_str() == s)
            .ok_or_else(|| ConfigurationError::UnknownLabelEncoding(String::from(s)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// The tags could not be parsed with the requested encoding. It holds the whole offending
/// sequence.
pub struct InvalidTagSequence(pub(crate) Vec<String>);

impl InvalidTagSequence {
    fn from_tags(tags: &[&str]) -> Self {
        InvalidTagSequence(tags.iter().map(|t| String::from(*t)).collect())
    }

    pub fn tags(&self) -> &[String] {
        &self.0
    }
}

impl Display for InvalidTagSequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Invalid tag sequence: {}", self.0.join(" "))
    }
}

impl Error for InvalidTagSequence {}

#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
/// Prefixes that can start a tag. All prefixes are a single ascii character.
enum Prefix {
    B,
    I,
    O,
    U,
    L,
}

impl TryFrom<char> for Prefix {
    type Error = char;
    fn try_from(value: char) -> Result<Self, Self::Error> {
        match value {
            'B' => Ok(Self::B),
            'I' => Ok(Self::I),
            'O' => Ok(Self::O),
            'U' => Ok(Self::U),
            'L' => Ok(Self::L),
            c => Err(c),
        }
    }
}

impl Prefix {
    /// Prefixes allowed by `BIO` and `IOB1`.
    fn is_bio(&self) -> bool {
        matches!(self, Self::B | Self::I | Self::O)
    }
}

#[derive(Debug, PartialEq, Clone, Copy)]
struct InnerTag<'a> {
    /// The prefix, such as `B`, `I`, `O`, etc.
    prefix: Prefix,
    /// Everything after the prefix and its delimiter: `"ARG1"` for `"B-ARG1"`, `"C-ARG1"` for
    /// `"B-C-ARG1"`.
    class: &'a str,
}

impl<'a> InnerTag<'a> {
    /// Parses a `BIO` or `IOB1` tag. The class is everything after the first two characters.
    fn try_new_bio(tag: &'a str) -> Option<Self> {
        let prefix = tag.chars().next().and_then(|c| Prefix::try_from(c).ok())?;
        if !prefix.is_bio() {
            return None;
        }
        let class = match tag.char_indices().nth(2) {
            Some((offset, _)) => &tag[offset..],
            None => "",
        };
        Some(InnerTag { prefix, class })
    }

    /// Parses a `BIOUL` tag. The class is everything after the first `-`.
    fn try_new_bioul(tag: &'a str) -> Option<Self> {
        let prefix = tag.chars().next().and_then(|c| Prefix::try_from(c).ok())?;
        let class = tag.split_once('-').map(|(_, class)| class).unwrap_or("");
        Some(InnerTag { prefix, class })
    }

    fn is_ignored<C: AsRef<str>>(&self, classes_to_ignore: &[C]) -> bool {
        classes_to_ignore.iter().any(|c| c.as_ref() == self.class)
    }
}

/// Span currently being built while walking over a sequence.
struct ActiveSpan<'a> {
    class: &'a str,
    start: usize,
    end: usize,
}

impl<'a> ActiveSpan<'a> {
    fn new(class: &'a str, index: usize) -> Self {
        ActiveSpan {
            class,
            start: index,
            end: index,
        }
    }
}

impl<'a> From<ActiveSpan<'a>> for TypedSpan<'a> {
    fn from(value: ActiveSpan<'a>) -> Self {
        TypedSpan::new(value.class, value.start, value.end)
    }
}

fn close<'a>(spans: &mut Spans<'a>, active: &mut Option<ActiveSpan<'a>>) {
    if let Some(span) = active.take() {
        spans.insert(span.into());
    }
}

/// Builds the spans of a `BIO` sequence. Ill-formed sequences, such as an `I` tag without a
/// preceding `B` tag of the same class, are treated as if the `I` tag was a `B` tag.
pub(crate) fn bio_tags_to_spans<'a, C: AsRef<str>>(
    tags: &[&'a str],
    classes_to_ignore: &[C],
) -> Result<Spans<'a>, InvalidTagSequence> {
    let mut spans = Spans::default();
    let mut active: Option<ActiveSpan<'a>> = None;
    for (index, &tag) in tags.iter().enumerate() {
        let inner = InnerTag::try_new_bio(tag).ok_or_else(|| InvalidTagSequence::from_tags(tags))?;
        if inner.prefix == Prefix::O || inner.is_ignored(classes_to_ignore) {
            close(&mut spans, &mut active);
            continue;
        }
        match (inner.prefix, active.as_mut()) {
            (Prefix::I, Some(span)) if span.class == inner.class => span.end += 1,
            _ => {
                close(&mut spans, &mut active);
                active = Some(ActiveSpan::new(inner.class, index));
            }
        }
    }
    close(&mut spans, &mut active);
    Ok(spans)
}

/// Checks if a chunk started between the previous and current tag, in `IOB1`.
fn iob1_start_of_chunk(prev: Option<&InnerTag>, current: &InnerTag) -> bool {
    match (prev, current.prefix) {
        (_, Prefix::B) => true,
        (Some(p), Prefix::I) if p.prefix == Prefix::O => true,
        (_, Prefix::O) => false,
        (Some(p), _) => p.class != current.class,
        (None, _) => true,
    }
}

/// Builds the spans of an `IOB1` sequence.
pub(crate) fn iob1_tags_to_spans<'a, C: AsRef<str>>(
    tags: &[&'a str],
    classes_to_ignore: &[C],
) -> Result<Spans<'a>, InvalidTagSequence> {
    let mut spans = Spans::default();
    let mut active: Option<ActiveSpan<'a>> = None;
    let mut prev: Option<InnerTag<'a>> = None;
    for (index, &tag) in tags.iter().enumerate() {
        let inner = InnerTag::try_new_bio(tag).ok_or_else(|| InvalidTagSequence::from_tags(tags))?;
        if inner.prefix == Prefix::O || inner.is_ignored(classes_to_ignore) {
            close(&mut spans, &mut active);
        } else if iob1_start_of_chunk(prev.as_ref(), &inner) {
            close(&mut spans, &mut active);
            active = Some(ActiveSpan::new(inner.class, index));
        } else if let Some(span) = active.as_mut() {
            span.end = index;
        }
        prev = Some(inner);
    }
    close(&mut spans, &mut active);
    Ok(spans)
}

/// Builds the spans of a `BIOUL` sequence. Unlike `BIO`, this encoding is strict: a `B` tag must
/// be followed by `I` tags and closed by an `L` tag, and no `I` or `L` tag may appear outside of
/// a span.
pub(crate) fn bioul_tags_to_spans<'a, C: AsRef<str>>(
    tags: &[&'a str],
    classes_to_ignore: &[C],
) -> Result<Spans<'a>, InvalidTagSequence> {
    let invalid = || InvalidTagSequence::from_tags(tags);
    let mut spans = Spans::default();
    let mut index = 0;
    while index < tags.len() {
        let current = InnerTag::try_new_bioul(tags[index]).ok_or_else(invalid)?;
        match current.prefix {
            Prefix::U => {
                spans.insert(TypedSpan::new(current.class, index, index));
            }
            Prefix::B => {
                let start = index;
                let mut last = current;
                while last.prefix != Prefix::L {
                    index += 1;
                    let tag = tags.get(index).copied().ok_or_else(invalid)?;
                    last = InnerTag::try_new_bioul(tag).ok_or_else(invalid)?;
                    if !matches!(last.prefix, Prefix::I | Prefix::L) {
                        return Err(invalid());
                    }
                }
                spans.insert(TypedSpan::new(last.class, start, index));
            }
            _ if tags[index] == "O" => {}
            _ => return Err(invalid()),
        }
        index += 1;
    }
    spans.retain(|span| !classes_to_ignore.iter().any(|c| c.as_ref() == span.label()));
    Ok(spans)
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck::{self, TestResult};
    use rstest::rstest;

    const NO_IGNORE: [&str; 0] = [];

    fn sorted(spans: Spans) -> Vec<(String, (usize, usize))> {
        let mut v: Vec<_> = spans
            .iter()
            .map(|s| (s.label().to_string(), (s.start(), s.end())))
            .collect();
        v.sort();
        v
    }

    fn owned(expected: &[(&str, (usize, usize))]) -> Vec<(String, (usize, usize))> {
        let mut v: Vec<_> = expected
            .iter()
            .map(|(l, se)| (l.to_string(), *se))
            .collect();
        v.sort();
        v
    }

    #[rstest]
    #[case(LabelEncoding::BIO, "BIO")]
    #[case(LabelEncoding::IOB1, "IOB1")]
    #[case(LabelEncoding::BIOUL, "BIOUL")]
    fn test_label_encoding_from_str(#[case] expected: LabelEncoding, #[case] name: &str) {
        assert_eq!(name.parse::<LabelEncoding>().unwrap(), expected);
        assert_eq!(expected.to_string(), name);
    }

    #[rstest]
    #[case("bio")]
    #[case("IOB2")]
    #[case("")]
    fn test_unknown_label_encoding(#[case] name: &str) {
        assert_eq!(
            name.parse::<LabelEncoding>(),
            Err(ConfigurationError::UnknownLabelEncoding(String::from(name)))
        );
    }

    #[test]
    fn test_bio_tags_to_spans() {
        let tags = vec!["B-ARG1", "I-ARG1", "O", "B-ARG2", "I-ARG2", "B-ARG1", "B-ARG2"];
        let spans = bio_tags_to_spans(&tags, &NO_IGNORE).unwrap();
        assert_eq!(
            sorted(spans),
            owned(&[
                ("ARG1", (0, 1)),
                ("ARG2", (3, 4)),
                ("ARG1", (5, 5)),
                ("ARG2", (6, 6))
            ])
        );
    }

    #[test]
    fn test_bio_ill_formed_sequences_start_new_spans() {
        let tags = vec!["I-ARG1", "I-ARG1", "I-ARG2", "O", "I-ARG1"];
        let spans = bio_tags_to_spans(&tags, &NO_IGNORE).unwrap();
        assert_eq!(
            sorted(spans),
            owned(&[("ARG1", (0, 1)), ("ARG2", (2, 2)), ("ARG1", (4, 4))])
        );
    }

    #[test]
    fn test_bio_ignored_classes() {
        let tags = vec!["O", "O", "B-V", "I-V", "B-ARG1", "I-ARG1"];
        let spans = bio_tags_to_spans(&tags, &["V"]).unwrap();
        assert_eq!(sorted(spans), owned(&[("ARG1", (4, 5))]));
    }

    #[test]
    fn test_bio_continuation_class_is_kept() {
        let tags = vec!["B-ARG1", "O", "B-C-ARG1", "I-C-ARG1"];
        let spans = bio_tags_to_spans(&tags, &NO_IGNORE).unwrap();
        assert_eq!(
            sorted(spans),
            owned(&[("ARG1", (0, 0)), ("C-ARG1", (2, 3))])
        );
    }

    #[rstest]
    #[case(vec!["B-ARG1", "U-ARG1"])]
    #[case(vec!["O", "X"])]
    #[case(vec!["B-ARG1", ""])]
    fn test_bio_invalid_prefix(#[case] tags: Vec<&str>) {
        let err = bio_tags_to_spans(&tags, &NO_IGNORE).unwrap_err();
        assert_eq!(err.tags().len(), tags.len());
    }

    #[test]
    fn test_iob1_tags_to_spans() {
        let tags = vec!["I-ARG1", "I-ARG1", "B-ARG1", "I-ARG2", "O", "I-ARG2", "B-ARG2"];
        let spans = iob1_tags_to_spans(&tags, &NO_IGNORE).unwrap();
        assert_eq!(
            sorted(spans),
            owned(&[
                ("ARG1", (0, 1)),
                ("ARG1", (2, 2)),
                ("ARG2", (3, 3)),
                ("ARG2", (5, 5)),
                ("ARG2", (6, 6))
            ])
        );
    }

    #[test]
    fn test_iob1_ignored_classes() {
        let tags = vec!["I-V", "I-ARG0", "I-ARG0", "I-V"];
        let spans = iob1_tags_to_spans(&tags, &["V"]).unwrap();
        assert_eq!(sorted(spans), owned(&[("ARG0", (1, 2))]));
    }

    #[test]
    fn test_bioul_tags_to_spans() {
        let tags = vec!["B-ARG1", "I-ARG1", "L-ARG1", "O", "U-ARG2", "B-ARG0", "L-ARG0"];
        let spans = bioul_tags_to_spans(&tags, &NO_IGNORE).unwrap();
        assert_eq!(
            sorted(spans),
            owned(&[("ARG1", (0, 2)), ("ARG2", (4, 4)), ("ARG0", (5, 6))])
        );
    }

    #[test]
    fn test_bioul_ignored_classes() {
        let tags = vec!["U-V", "B-ARG1", "L-ARG1"];
        let spans = bioul_tags_to_spans(&tags, &["V"]).unwrap();
        assert_eq!(sorted(spans), owned(&[("ARG1", (1, 2))]));
    }

    #[rstest]
    #[case(vec!["B-ARG1", "I-ARG1"])]
    #[case(vec!["B-ARG1", "O", "L-ARG1"])]
    #[case(vec!["I-ARG1"])]
    #[case(vec!["L-ARG1"])]
    #[case(vec!["O", "B-ARG1", "U-ARG1"])]
    fn test_bioul_invalid_sequences(#[case] tags: Vec<&str>) {
        assert!(bioul_tags_to_spans(&tags, &NO_IGNORE).is_err());
    }

    #[test]
    fn test_empty_sequences_have_no_spans() {
        let tags: Vec<&str> = vec![];
        for encoding in all::<LabelEncoding>() {
            assert!(encoding.tags_to_spans(&tags, &NO_IGNORE).unwrap().is_empty());
        }
    }

    #[derive(Debug, Clone, Copy, Sequence, PartialEq, Eq)]
    enum BioTagToTest {
        BArg0,
        IArg0,
        BArg1,
        IArg1,
        O,
    }

    impl From<BioTagToTest> for &str {
        fn from(value: BioTagToTest) -> Self {
            match value {
                BioTagToTest::BArg0 => "B-ARG0",
                BioTagToTest::IArg0 => "I-ARG0",
                BioTagToTest::BArg1 => "B-ARG1",
                BioTagToTest::IArg1 => "I-ARG1",
                BioTagToTest::O => "O",
            }
        }
    }

    impl quickcheck::Arbitrary for BioTagToTest {
        fn arbitrary(g: &mut quickcheck::Gen) -> Self {
            let choices: Vec<BioTagToTest> = all::<BioTagToTest>().collect();
            *g.choose(choices.as_ref()).unwrap()
        }
    }

    #[test]
    fn test_propertie_bio_spans_are_disjoint_and_in_bounds() {
        fn propertie(tags: Vec<BioTagToTest>) -> TestResult {
            let tags: Vec<&str> = tags.into_iter().map(<&str>::from).collect();
            let spans = bio_tags_to_spans(&tags, &NO_IGNORE).unwrap();
            let mut covered = vec![false; tags.len()];
            for span in spans.iter() {
                if span.start() > span.end() || span.end() >= tags.len() {
                    return TestResult::failed();
                }
                for slot in covered[span.start()..=span.end()].iter_mut() {
                    if *slot {
                        return TestResult::failed();
                    }
                    *slot = true;
                }
            }
            let outside_is_uncovered = tags
                .iter()
                .zip(covered)
                .all(|(tag, is_covered)| *tag != "O" || !is_covered);
            TestResult::from_bool(outside_is_uncovered)
        }
        let mut qc = quickcheck::QuickCheck::new().tests(1000);
        qc.quickcheck(propertie as fn(Vec<BioTagToTest>) -> TestResult)
    }
}
