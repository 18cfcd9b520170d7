/*
 * This modules contains the `SpanF1Config` struct, which implements the default trait, and its
 * builder. The config is given to `SpanBasedF1Measure` at construction and holds everything that
 * does not change between two scoring calls.
*/
use crate::entity::LabelEncoding;
use crate::metrics::ConfigurationError;
use crate::vocabulary::DEFAULT_TAG_NAMESPACE;
use either::Either as LeftOrRight;
use std::convert::TryFrom;
use std::fmt::Display;

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
/// Config struct used to simplify the inputs of the `SpanBasedF1Measure`. It implements the
/// default trait.
pub struct SpanF1Config {
    /// Encoding of the tags: `BIO`, `IOB1` or `BIOUL`.
    pub(crate) label_encoding: LabelEncoding,
    /// Span classes that are never scored. The class is the part after the prefix, so it would be
    /// `"V"` for the tag `"B-V"`.
    pub(crate) ignore_classes: Vec<String>,
    /// Namespace of the tag vocabulary, when the vocabulary is selected among many namespaces.
    pub(crate) tag_namespace: String,
    /// Can we use multiple cores to compute the predicted labels of a batch? Counters are always
    /// updated sequentially.
    pub(crate) parallel: bool,
}

impl Default for SpanF1Config {
    fn default() -> Self {
        Self {
            label_encoding: LabelEncoding::BIO,
            ignore_classes: Vec::new(),
            tag_namespace: String::from(DEFAULT_TAG_NAMESPACE),
            parallel: false,
        }
    }
}

impl SpanF1Config {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn label_encoding(&self) -> LabelEncoding {
        self.label_encoding
    }
    pub fn ignore_classes(&self) -> &[String] {
        &self.ignore_classes
    }
    pub fn tag_namespace(&self) -> &str {
        &self.tag_namespace
    }
    pub fn parallel(&self) -> bool {
        self.parallel
    }
}

impl Display for SpanF1Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let string = format!("Label encoding: {}\n Ignored classes: {:?}\n Tag namespace: {}\n Using parallel computations: {}", self.label_encoding, self.ignore_classes, self.tag_namespace, self.parallel);
        write!(f, "{}", string)
    }
}

/// This builder can be used to build and customize a `SpanF1Config` stucture. The label
/// encoding can be given by name; the name is only validated when calling `build`.
#[derive(Clone, Debug)]
pub struct SpanF1ConfigBuilder {
    label_encoding: LeftOrRight<String, LabelEncoding>,
    ignore_classes: Vec<String>,
    tag_namespace: String,
    parallel: bool,
}

impl Default for SpanF1ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SpanF1ConfigBuilder {
    pub fn label_encoding(mut self, label_encoding: LabelEncoding) -> Self {
        self.label_encoding = LeftOrRight::Right(label_encoding);
        self
    }
    /// Sets the encoding from its name (`"BIO"`, `"IOB1"` or `"BIOUL"`).
    pub fn label_encoding_name<S: Into<String>>(mut self, name: S) -> Self {
        self.label_encoding = LeftOrRight::Left(name.into());
        self
    }
    pub fn ignore_classes<I, S>(mut self, ignore_classes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignore_classes = ignore_classes.into_iter().map(Into::into).collect();
        self
    }
    pub fn tag_namespace<S: Into<String>>(mut self, tag_namespace: S) -> Self {
        self.tag_namespace = tag_namespace.into();
        self
    }
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }
    pub fn new() -> Self {
        Self {
            label_encoding: LeftOrRight::Right(LabelEncoding::BIO),
            ignore_classes: Vec::new(),
            tag_namespace: String::from(DEFAULT_TAG_NAMESPACE),
            parallel: false,
        }
    }
    /// Fails if the label encoding was given by a name that is not `BIO`, `IOB1` or `BIOUL`.
    pub fn build(self) -> Result<SpanF1Config, ConfigurationError> {
        SpanF1Config::try_from(self)
    }
}

impl TryFrom<SpanF1ConfigBuilder> for SpanF1Config {
    type Error = ConfigurationError;
    fn try_from(value: SpanF1ConfigBuilder) -> Result<Self, Self::Error> {
        let label_encoding = value
            .label_encoding
            .either(|name| name.parse::<LabelEncoding>(), Ok)?;
        Ok(Self {
            label_encoding,
            ignore_classes: value.ignore_classes,
            tag_namespace: value.tag_namespace,
            parallel: value.parallel,
        })
    }
}
