use educe::Educe;
use serde::{Deserialize, Serialize};

use crate::{DEFAULT_REPLACE_THRESHOLD, MAX_DEPTH, MAX_EXPANDED_VALUES};

/// Settings for parsing a value tree and producing its delta.
///
/// Fields that aren't specified use their defaults instead. The defaults are:
///
/// - replace_threshold: 67
/// - max_depth: 100
/// - max_expanded_values: 1048576
///
#[derive(Educe, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields, default)]
pub struct TreeOptions {
    /// Percentage of the original bytes that must be dirty before a delta is emitted as one flat
    /// replacement instead of a copy/append diff.
    #[educe(Default(expression = DEFAULT_REPLACE_THRESHOLD))]
    pub replace_threshold: u8,
    /// Maximum nesting depth of composite values accepted while parsing.
    #[educe(Default(expression = MAX_DEPTH))]
    pub max_depth: usize,
    /// Maximum number of values one read may decode while expanding references. Each reference
    /// is expanded into a full copy of its target, so a few bytes of nested references can stand
    /// for an enormous value.
    #[educe(Default(expression = MAX_EXPANDED_VALUES))]
    pub max_expanded_values: usize,
}

impl TreeOptions {
    /// Make a new set of options with the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the replacement threshold, as a percentage of the original size.
    pub fn replace_threshold(mut self, percent: u8) -> Self {
        self.replace_threshold = percent;
        self
    }

    /// Set the maximum nesting depth.
    pub fn max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Set how many values a single read may produce by expanding references.
    pub fn max_expanded_values(mut self, max: usize) -> Self {
        self.max_expanded_values = max;
        self
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults() {
        let opts = TreeOptions::new();
        assert_eq!(opts.replace_threshold, 67);
        assert_eq!(opts.max_depth, 100);
        assert_eq!(opts.max_expanded_values, 1 << 20);
    }

    #[test]
    fn builder() {
        let opts = TreeOptions::new()
            .replace_threshold(50)
            .max_depth(8)
            .max_expanded_values(1000);
        assert_eq!(opts.replace_threshold, 50);
        assert_eq!(opts.max_depth, 8);
        assert_eq!(opts.max_expanded_values, 1000);
    }

    #[test]
    fn serde_partial() {
        let opts: TreeOptions =
            serde::Deserialize::deserialize(serde::de::value::MapDeserializer::<
                _,
                serde::de::value::Error,
            >::new(
                vec![("replace_threshold", 80u8)].into_iter()
            ))
            .unwrap();
        assert_eq!(opts, TreeOptions::new().replace_threshold(80));
    }
}
