//! Result value objects returned by the executor

use crate::cluster::ClusterNode;
use bytes::Bytes;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt;

/// A key tagged with its ordinal position in the caller's request
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PositionalKey {
    key: Bytes,
    position: usize,
}

impl PositionalKey {
    pub fn new(key: impl Into<Bytes>, position: usize) -> Self {
        Self {
            key: key.into(),
            position,
        }
    }

    pub fn key(&self) -> &Bytes {
        &self.key
    }

    pub fn position(&self) -> usize {
        self.position
    }
}

/// Ordered collection of positional keys
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PositionalKeys {
    keys: Vec<PositionalKey>,
}

impl PositionalKeys {
    pub fn new() -> Self {
        Self::default()
    }

    /// Positions are assigned in iteration order, starting at zero.
    pub fn of<K: Into<Bytes>>(keys: impl IntoIterator<Item = K>) -> Self {
        Self {
            keys: keys
                .into_iter()
                .enumerate()
                .map(|(position, key)| PositionalKey::new(key, position))
                .collect(),
        }
    }

    pub fn append(&mut self, key: PositionalKey) {
        self.keys.push(key);
    }

    /// Index of an exact (key, position) match
    pub fn index_of(&self, key: &PositionalKey) -> Option<usize> {
        self.keys.iter().position(|k| k == key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PositionalKey> {
        self.keys.iter()
    }
}

impl IntoIterator for PositionalKeys {
    type Item = PositionalKey;
    type IntoIter = std::vec::IntoIter<PositionalKey>;

    fn into_iter(self) -> Self::IntoIter {
        self.keys.into_iter()
    }
}

impl<'a> IntoIterator for &'a PositionalKeys {
    type Item = &'a PositionalKey;
    type IntoIter = std::slice::Iter<'a, PositionalKey>;

    fn into_iter(self) -> Self::IntoIter {
        self.keys.iter()
    }
}

/// Unit of dispatched work
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeExecution {
    node: ClusterNode,
    positional_key: Option<PositionalKey>,
}

impl NodeExecution {
    pub fn new(node: ClusterNode, positional_key: Option<PositionalKey>) -> Self {
        Self {
            node,
            positional_key,
        }
    }

    pub fn node(&self) -> &ClusterNode {
        &self.node
    }

    pub fn positional_key(&self) -> Option<&PositionalKey> {
        self.positional_key.as_ref()
    }
}

impl fmt::Display for NodeExecution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.positional_key {
            Some(pk) => write!(
                f,
                "{} [key #{} {:?}]",
                self.node,
                pk.position,
                String::from_utf8_lossy(&pk.key)
            ),
            None => write!(f, "{}", self.node),
        }
    }
}

/// Result of one command against one node
#[derive(Debug, Clone, PartialEq)]
pub struct NodeResult<T> {
    node: ClusterNode,
    value: T,
    key: Option<Bytes>,
}

impl<T> NodeResult<T> {
    pub fn new(node: ClusterNode, value: T) -> Self {
        Self {
            node,
            value,
            key: None,
        }
    }

    pub fn with_key(node: ClusterNode, value: T, key: Bytes) -> Self {
        Self {
            node,
            value,
            key: Some(key),
        }
    }

    /// The node the caller asked for, which may differ from the node that
    /// finally served the command after redirects
    pub fn node(&self) -> &ClusterNode {
        &self.node
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn key(&self) -> Option<&Bytes> {
        self.key.as_ref()
    }

    pub fn into_value(self) -> T {
        self.value
    }

    pub fn map_value<U>(self, f: impl FnOnce(T) -> U) -> NodeResult<U> {
        NodeResult {
            node: self.node,
            value: f(self.value),
            key: self.key,
        }
    }
}

/// Values that can be "empty" beyond being absent.
///
/// Collections are empty when they hold no elements; `None` is always empty.
/// Scalars, strings and byte buffers are never empty.
pub trait MaybeEmpty {
    fn is_empty_value(&self) -> bool;
}

impl<T: MaybeEmpty> MaybeEmpty for Option<T> {
    fn is_empty_value(&self) -> bool {
        self.as_ref().is_none_or(MaybeEmpty::is_empty_value)
    }
}

macro_rules! collection_maybe_empty {
    ($($ty:ty => [$($gen:tt)*]),* $(,)?) => {
        $(impl<$($gen)*> MaybeEmpty for $ty {
            fn is_empty_value(&self) -> bool {
                self.is_empty()
            }
        })*
    };
}

collection_maybe_empty! {
    Vec<T> => [T],
    VecDeque<T> => [T],
    HashSet<T, S> => [T, S],
    BTreeSet<T> => [T],
    HashMap<K, V, S> => [K, V, S],
    BTreeMap<K, V> => [K, V],
}

macro_rules! scalar_maybe_empty {
    ($($ty:ty),* $(,)?) => {
        $(impl MaybeEmpty for $ty {
            fn is_empty_value(&self) -> bool {
                false
            }
        })*
    };
}

scalar_maybe_empty!(
    bool, char, i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64,
    String, Bytes, ()
);

/// Results of a fan-out call
#[derive(Debug, Clone)]
pub struct MultiNodeResult<T> {
    results: Vec<NodeResult<T>>,
    /// positional key of each entry in `results`, if it was added with one
    positions: Vec<Option<PositionalKey>>,
}

impl<T> Default for MultiNodeResult<T> {
    fn default() -> Self {
        Self {
            results: Vec::new(),
            positions: Vec::new(),
        }
    }
}

impl<T> MultiNodeResult<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, result: NodeResult<T>) {
        self.results.push(result);
        self.positions.push(None);
    }

    /// Add a result produced for `key`
    pub fn add_positional(&mut self, key: PositionalKey, result: NodeResult<T>) {
        self.results.push(result);
        self.positions.push(Some(key));
    }

    pub fn extend(&mut self, other: MultiNodeResult<T>) {
        self.results.extend(other.results);
        self.positions.extend(other.positions);
    }

    pub fn results(&self) -> &[NodeResult<T>] {
        &self.results
    }

    pub fn into_results(self) -> Vec<NodeResult<T>> {
        self.results
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Values in dispatch order, which need not match the input key order
    pub fn results_as_list(&self) -> Vec<&T> {
        self.results.iter().map(NodeResult::value).collect()
    }

    pub fn into_values(self) -> Vec<T> {
        self.results.into_iter().map(NodeResult::into_value).collect()
    }

    /// Every value, ordered by its key's index in `reference_keys`.
    ///
    /// A result added with a positional key ranks at its position when
    /// `reference_keys` holds the same key there, so repeated keys keep their
    /// own slot. Any other keyed result ranks at the first occurrence of its
    /// raw key. Ties and results whose key is absent from `reference_keys`
    /// keep dispatch order, the latter after everything else.
    pub fn results_as_list_sort_by<K: AsRef<[u8]>>(&self, reference_keys: &[K]) -> Vec<&T> {
        let first_index = |key: &[u8]| reference_keys.iter().position(|r| r.as_ref() == key);
        let exact_at = |position: usize, key: &[u8]| {
            reference_keys.get(position).is_some_and(|r| r.as_ref() == key)
        };

        let mut ranked: Vec<(usize, usize)> = self
            .results
            .iter()
            .zip(&self.positions)
            .enumerate()
            .map(|(idx, (result, position))| {
                let rank = match position {
                    Some(pk) if exact_at(pk.position, &pk.key) => Some(pk.position),
                    Some(pk) => first_index(&pk.key),
                    None => result.key().and_then(|key| first_index(key)),
                };
                (rank.unwrap_or(usize::MAX), idx)
            })
            .collect();

        ranked.sort_unstable();
        ranked
            .into_iter()
            .map(|(_, idx)| self.results[idx].value())
            .collect()
    }

    /// First value that is present and, for collections, non-empty
    pub fn first_non_null_not_empty_or_default(&self, fallback: T) -> T
    where
        T: MaybeEmpty + Clone,
    {
        self.results
            .iter()
            .map(NodeResult::value)
            .find(|value| !value.is_empty_value())
            .cloned()
            .unwrap_or(fallback)
    }
}

impl<T> IntoIterator for MultiNodeResult<T> {
    type Item = NodeResult<T>;
    type IntoIter = std::vec::IntoIter<NodeResult<T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(port: u16) -> ClusterNode {
        ClusterNode::new("127.0.0.1", port)
    }

    #[test]
    fn test_positional_keys_index_of() {
        let keys = PositionalKeys::of(["foo", "bar", "foo"]);
        assert_eq!(keys.len(), 3);
        assert_eq!(keys.index_of(&PositionalKey::new("foo", 2)), Some(2));
        assert_eq!(keys.index_of(&PositionalKey::new("foo", 1)), None);
    }

    #[test]
    fn test_sort_by_positional_keys() {
        let mut result = MultiNodeResult::new();
        // completion order scrambled
        for (key, position) in [("baz", 2), ("foo", 0), ("bar", 1)] {
            let pk = PositionalKey::new(key, position);
            result.add_positional(
                pk.clone(),
                NodeResult::with_key(node(7000), key.to_uppercase(), pk.key().clone()),
            );
        }

        assert_eq!(result.results_as_list(), vec!["BAZ", "FOO", "BAR"]);
        assert_eq!(
            result.results_as_list_sort_by(&["foo", "bar", "baz"]),
            vec!["FOO", "BAR", "BAZ"]
        );
    }

    #[test]
    fn test_sort_by_keeps_duplicate_keys_apart() {
        let mut result = MultiNodeResult::new();
        result.add_positional(
            PositionalKey::new("a", 2),
            NodeResult::with_key(node(7000), 3, Bytes::from_static(b"a")),
        );
        result.add_positional(
            PositionalKey::new("b", 1),
            NodeResult::with_key(node(7001), 2, Bytes::from_static(b"b")),
        );
        result.add_positional(
            PositionalKey::new("a", 0),
            NodeResult::with_key(node(7000), 1, Bytes::from_static(b"a")),
        );

        assert_eq!(result.results_as_list_sort_by(&["a", "b", "a"]), vec![&1, &2, &3]);
    }

    #[test]
    fn test_sort_by_raw_key_without_positions() {
        let mut result = MultiNodeResult::new();
        result.add(NodeResult::with_key(node(7000), "two", Bytes::from_static(b"k2")));
        result.add(NodeResult::new(node(7001), "unkeyed"));
        result.add(NodeResult::with_key(node(7002), "one", Bytes::from_static(b"k1")));

        assert_eq!(
            result.results_as_list_sort_by(&[b"k1".as_slice(), b"k2".as_slice()]),
            vec![&"one", &"two", &"unkeyed"]
        );
    }

    #[test]
    fn test_sort_by_ranks_mixed_entries() {
        let mut result = MultiNodeResult::new();
        result.add_positional(
            PositionalKey::new("b", 1),
            NodeResult::with_key(node(7001), "B", Bytes::from_static(b"b")),
        );
        result.add(NodeResult::with_key(node(7000), "A", Bytes::from_static(b"a")));
        result.add(NodeResult::new(node(7002), "none"));

        assert_eq!(result.results_as_list(), vec![&"B", &"A", &"none"]);
        assert_eq!(
            result.results_as_list_sort_by(&["a", "b"]),
            vec![&"A", &"B", &"none"]
        );
    }

    #[test]
    fn test_sort_by_keeps_repeated_positional_key() {
        // same key dispatched to two masters claiming its slot
        let mut result = MultiNodeResult::new();
        let foo = PositionalKey::new("foo", 1);
        result.add_positional(
            PositionalKey::new("bar", 0),
            NodeResult::with_key(node(7000), 1, Bytes::from_static(b"bar")),
        );
        result.add_positional(
            foo.clone(),
            NodeResult::with_key(node(7000), 2, Bytes::from_static(b"foo")),
        );
        result.add_positional(
            foo,
            NodeResult::with_key(node(7001), 3, Bytes::from_static(b"foo")),
        );

        assert_eq!(result.len(), 3);
        assert_eq!(result.results_as_list_sort_by(&["bar", "foo"]), vec![&1, &2, &3]);
    }

    #[test]
    fn test_first_non_null_not_empty() {
        let mut result: MultiNodeResult<Option<Vec<u8>>> = MultiNodeResult::new();
        result.add(NodeResult::new(node(7000), None));
        result.add(NodeResult::new(node(7001), Some(Vec::new())));
        result.add(NodeResult::new(node(7002), Some(vec![1, 2])));
        result.add(NodeResult::new(node(7003), Some(vec![3])));

        assert_eq!(
            result.first_non_null_not_empty_or_default(Some(vec![9])),
            Some(vec![1, 2])
        );
    }

    #[test]
    fn test_first_non_null_not_empty_falls_back() {
        let mut result: MultiNodeResult<Option<HashMap<String, String>>> = MultiNodeResult::new();
        result.add(NodeResult::new(node(7000), None));
        result.add(NodeResult::new(node(7001), Some(HashMap::new())));

        assert_eq!(result.first_non_null_not_empty_or_default(None), None);
    }

    #[test]
    fn test_empty_string_is_a_value() {
        let mut result = MultiNodeResult::new();
        result.add(NodeResult::new(node(7000), Some(String::new())));
        assert_eq!(
            result.first_non_null_not_empty_or_default(Some("fallback".to_string())),
            Some(String::new())
        );
    }

    #[test]
    fn test_extend_reindexes_positions() {
        let mut left = MultiNodeResult::new();
        left.add_positional(
            PositionalKey::new("x", 1),
            NodeResult::with_key(node(7000), 'x', Bytes::from_static(b"x")),
        );
        let mut right = MultiNodeResult::new();
        right.add_positional(
            PositionalKey::new("w", 0),
            NodeResult::with_key(node(7001), 'w', Bytes::from_static(b"w")),
        );

        left.extend(right);
        assert_eq!(left.len(), 2);
        assert_eq!(left.results_as_list_sort_by(&["w", "x"]), vec![&'w', &'x']);
    }
}
