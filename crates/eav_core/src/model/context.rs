//! Context axes (language, country, channel, ...) used to scope values.

use std::collections::BTreeMap;

/// Active axis values, e.g. `{language: "en"}`.
pub type Context = BTreeMap<String, String>;

/// Merges context layers from least to most specific; later layers win.
pub fn merge_contexts<'a>(layers: impl IntoIterator<Item = &'a Context>) -> Context {
    let mut merged = Context::new();
    for layer in layers {
        for (axis, value) in layer {
            merged.insert(axis.clone(), value.clone());
        }
    }
    merged
}

/// Builds a context from `(axis, value)` pairs.
pub fn context_of<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Context
where
    K: Into<String>,
    V: Into<String>,
{
    pairs
        .into_iter()
        .map(|(axis, value)| (axis.into(), value.into()))
        .collect()
}
