use ahash::HashSet as AHashSet;
use log::debug;
use std::{
    borrow::{Borrow, Cow},
    collections::BTreeSet,
    fmt::Display,
    ops::{Deref, DerefMut},
};

mod schemes;

// Re-exporting
pub use schemes::{InvalidTagSequence, LabelEncoding};

/// Prefix marking a span that continues a previously opened span of the same class.
pub(crate) const CONTINUATION_PREFIX: &str = "C-";

/// A typed span is a labeled, contiguous interval of a single sequence. Both `start` and `end`
/// are inclusive, 0-based indices. The label is the class of the span, such as `ARG0`, `PER`,
/// `C-ARG1`, etc.
#[derive(Debug, Hash, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct TypedSpan<'a> {
    pub(crate) label: Cow<'a, str>,
    pub(crate) start: usize,
    pub(crate) end: usize,
}

impl<'a> TypedSpan<'a> {
    pub fn new<L: Into<Cow<'a, str>>>(label: L, start: usize, end: usize) -> Self {
        TypedSpan {
            label: label.into(),
            start,
            end,
        }
    }

    pub fn label(&self) -> &str {
        self.label.borrow()
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn end(&self) -> usize {
        self.end
    }

    /// Returns the class this span continues, if its label carries the `C-` prefix.
    pub fn continued_label(&self) -> Option<Cow<'a, str>> {
        match &self.label {
            Cow::Borrowed(label) => label.strip_prefix(CONTINUATION_PREFIX).map(Cow::Borrowed),
            Cow::Owned(label) => label
                .strip_prefix(CONTINUATION_PREFIX)
                .map(|base| Cow::Owned(String::from(base))),
        }
    }

    pub fn into_owned(self) -> TypedSpan<'static> {
        TypedSpan {
            label: Cow::Owned(self.label.into_owned()),
            start: self.start,
            end: self.end,
        }
    }
}

impl<'a> Display for TypedSpan<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, ({}, {}))", self.label, self.start, self.end)
    }
}

impl<'a> From<(&'a str, (usize, usize))> for TypedSpan<'a> {
    fn from(value: (&'a str, (usize, usize))) -> Self {
        let (label, (start, end)) = value;
        TypedSpan::new(label, start, end)
    }
}

/// The set of spans extracted from a single sequence. Spans are unique: extracting the same
/// span twice keeps a single copy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Spans<'a>(AHashSet<TypedSpan<'a>>);

impl<'a> Deref for Spans<'a> {
    type Target = AHashSet<TypedSpan<'a>>;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<'a> DerefMut for Spans<'a> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl<'a> IntoIterator for Spans<'a> {
    type Item = TypedSpan<'a>;
    type IntoIter = std::collections::hash_set::IntoIter<TypedSpan<'a>>;
    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> FromIterator<TypedSpan<'a>> for Spans<'a> {
    fn from_iter<T: IntoIterator<Item = TypedSpan<'a>>>(iter: T) -> Self {
        Spans(iter.into_iter().collect())
    }
}

impl<'a> Spans<'a> {
    /// Merges the continuation spans (labels starting with `C-`) into the span they continue.
    ///
    /// For every class `X` such that a `C-X` span exists, all the spans whose label *contains*
    /// `X` are replaced by a single `X` span, going from the smallest start to the largest end of
    /// the replaced spans. Matching is done by substring, so `R-X` spans are merged as well and
    /// unrelated classes sharing a substring with `X` can be over-merged.
    ///
    /// Classes are processed in lexicographic order. Nested continuations (`C-C-X`) are resolved
    /// by repeating the merge until no `C-` span is left, so merging an already merged set is a
    /// no-op.
    pub fn handle_continued_spans(self) -> Spans<'a> {
        let mut span_set = self.0;
        loop {
            let continued_labels: BTreeSet<Cow<'a, str>> = span_set
                .iter()
                .filter_map(TypedSpan::continued_label)
                .collect();
            if continued_labels.is_empty() {
                break;
            }
            for label in continued_labels {
                let (continued, kept): (Vec<TypedSpan<'a>>, Vec<TypedSpan<'a>>) = span_set
                    .drain()
                    .partition(|span| span.label.contains(&*label));
                span_set.extend(kept);
                let span_start = continued.iter().map(|span| span.start).min();
                let span_end = continued.iter().map(|span| span.end).max();
                match (span_start, span_end) {
                    (Some(start), Some(end)) => {
                        debug!(
                            "Merged {} continued spans into ({}, ({}, {}))",
                            continued.len(),
                            label,
                            start,
                            end
                        );
                        span_set.insert(TypedSpan::new(label, start, end));
                    }
                    _ => debug!("Spans of continued class {} were already merged", label),
                }
            }
        }
        Spans(span_set)
    }

    /// Unique labels of the spans, in lexicographic order.
    pub fn labels(&self) -> BTreeSet<&str> {
        self.0.iter().map(TypedSpan::label).collect()
    }
}
