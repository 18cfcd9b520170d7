/*
 * Mapping from label ids to the tags they stand for. The scorer receives integer ids from a model
 * and uses this vocabulary to turn them back into tags such as `B-ARG0` before extracting spans.
*/
use crate::metrics::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::hash::BuildHasher;
use std::ops::Deref;

/// Namespace holding the tag vocabulary when none is configured.
pub const DEFAULT_TAG_NAMESPACE: &str = "tags";

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
/// Index to tag vocabulary. The id `i` stands for the `i`-th tag.
pub struct LabelVocabulary {
    tags: Vec<String>,
}

impl LabelVocabulary {
    pub fn new<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::from_iter(tags)
    }

    /// Selects the vocabulary of `namespace` among many namespaced vocabularies.
    ///
    /// * `namespaces`: Tags of every namespace, in id order.
    /// * `namespace`: Namespace holding the tags, `"tags"` by default.
    pub fn from_namespace<H: BuildHasher, N: AsRef<str>>(
        namespaces: &HashMap<String, Vec<String>, H>,
        namespace: N,
    ) -> Result<Self, ConfigurationError> {
        let namespace = namespace.as_ref();
        namespaces
            .get(namespace)
            .map(|tags| Self::new(tags.iter().cloned()))
            .ok_or_else(|| ConfigurationError::MissingNamespace(String::from(namespace)))
    }

    /// Returns the tag of `id`, or an error if the id is not part of the vocabulary.
    pub fn lookup(&self, id: usize) -> Result<&str, ConfigurationError> {
        self.tags
            .get(id)
            .map(String::as_str)
            .ok_or(ConfigurationError::LabelOutOfVocabulary {
                id,
                vocabulary_size: self.tags.len(),
            })
    }

    /// Returns the tags of `ids`, in order. Fails on the first id outside of the vocabulary.
    pub fn lookup_all<I: IntoIterator<Item = usize>>(
        &self,
        ids: I,
    ) -> Result<Vec<&str>, ConfigurationError> {
        ids.into_iter().map(|id| self.lookup(id)).collect()
    }
}

impl Deref for LabelVocabulary {
    type Target = [String];
    fn deref(&self) -> &Self::Target {
        &self.tags
    }
}

impl<S: Into<String>> FromIterator<S> for LabelVocabulary {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        LabelVocabulary {
            tags: iter.into_iter().map(Into::into).collect(),
        }
    }
}
