use std::hash::{Hash, Hasher};

use opentelemetry::{Array, KeyValue, Value};
use ordered_float::OrderedFloat;
use rustc_hash::FxHasher;

/// A unique set of attributes that identifies one aggregation bucket.
///
/// Attributes are sorted by key and de-duplicated (the last value recorded for
/// a key wins), so two sets holding the same pairs in any order compare equal
/// and hash identically. The hash is computed once on creation.
///
/// Floating point values are compared through [OrderedFloat]: `NaN` equals
/// itself and `-0.0` equals `0.0`, and both hash accordingly.
#[derive(Clone, Default, Debug)]
pub(crate) struct AttributeSet(Vec<KeyValue>, u64);

impl From<&[KeyValue]> for AttributeSet {
    fn from(values: &[KeyValue]) -> Self {
        AttributeSet::from_vec(values.to_vec())
    }
}

impl AttributeSet {
    pub(crate) fn from_vec(mut vec: Vec<KeyValue>) -> Self {
        // stable sort keeps the recording order of duplicate keys
        vec.sort_by(|a, b| a.key.cmp(&b.key));

        // dedup_by keeps the first duplicate, the last recorded value must win
        if vec.len() > 1 {
            let mut i = vec.len() - 1;
            while i != 0 {
                if vec[i - 1].key == vec[i].key {
                    vec.remove(i - 1);
                }
                i -= 1;
            }
        }

        let hash = calculate_hash(&vec);
        AttributeSet(vec, hash)
    }

    pub(crate) fn into_vec(self) -> Vec<KeyValue> {
        self.0
    }

    pub(crate) fn to_vec(&self) -> Vec<KeyValue> {
        self.0.clone()
    }

    /// Keeps only the attributes accepted by `f`, preserving sort order.
    pub(crate) fn filter<F>(&self, f: F) -> AttributeSet
    where
        F: Fn(&KeyValue) -> bool,
    {
        let vec: Vec<KeyValue> = self.0.iter().filter(|kv| f(kv)).cloned().collect();
        let hash = calculate_hash(&vec);
        AttributeSet(vec, hash)
    }
}

fn calculate_hash(values: &[KeyValue]) -> u64 {
    let mut hasher = FxHasher::default();
    for kv in values {
        kv.key.hash(&mut hasher);
        hash_value(&kv.value, &mut hasher);
    }
    hasher.finish()
}

fn hash_value<H: Hasher>(value: &Value, state: &mut H) {
    type_order(value).hash(state);
    match value {
        Value::Bool(b) => b.hash(state),
        Value::I64(i) => i.hash(state),
        Value::F64(f) => OrderedFloat(*f).hash(state),
        Value::String(s) => s.as_str().hash(state),
        Value::Array(Array::Bool(b)) => b.hash(state),
        Value::Array(Array::I64(i)) => i.hash(state),
        Value::Array(Array::F64(f)) => f.iter().for_each(|f| OrderedFloat(*f).hash(state)),
        Value::Array(Array::String(s)) => s.iter().for_each(|s| s.as_str().hash(state)),
        other => other.as_str().hash(state),
    }
}

fn type_order(value: &Value) -> u8 {
    match value {
        Value::Bool(_) => 1,
        Value::I64(_) => 2,
        Value::F64(_) => 3,
        Value::String(_) => 4,
        Value::Array(Array::Bool(_)) => 5,
        Value::Array(Array::I64(_)) => 6,
        Value::Array(Array::F64(_)) => 7,
        Value::Array(Array::String(_)) => 8,
        _ => 0,
    }
}

fn value_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::F64(f), Value::F64(of)) => OrderedFloat(*f) == OrderedFloat(*of),
        (Value::Array(Array::F64(f)), Value::Array(Array::F64(of))) => {
            f.len() == of.len()
                && f.iter()
                    .zip(of.iter())
                    .all(|(f, of)| OrderedFloat(*f) == OrderedFloat(*of))
        }
        (non_float, other_non_float) => non_float == other_non_float,
    }
}

impl PartialEq for AttributeSet {
    fn eq(&self, other: &Self) -> bool {
        self.1 == other.1
            && self.0.len() == other.0.len()
            && self
                .0
                .iter()
                .zip(other.0.iter())
                .all(|(a, b)| a.key == b.key && value_eq(&a.value, &b.value))
    }
}

impl Eq for AttributeSet {}

impl Hash for AttributeSet {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.1)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn order_does_not_change_identity() {
        let a = AttributeSet::from(&[KeyValue::new("a", 1), KeyValue::new("b", 2)][..]);
        let b = AttributeSet::from(&[KeyValue::new("b", 2), KeyValue::new("a", 1)][..]);
        assert_eq!(a, b);

        let mut buckets = HashMap::new();
        *buckets.entry(a).or_insert(0) += 1;
        *buckets.entry(b).or_insert(0) += 1;
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets.values().next(), Some(&2));
    }

    #[test]
    fn duplicate_keys_keep_last_value() {
        let set = AttributeSet::from(
            &[
                KeyValue::new("k", "first"),
                KeyValue::new("a", "x"),
                KeyValue::new("k", "second"),
            ][..],
        );
        assert_eq!(
            set.to_vec(),
            vec![KeyValue::new("a", "x"), KeyValue::new("k", "second")]
        );
    }

    #[test]
    fn different_value_types_are_different_buckets() {
        let int = AttributeSet::from(&[KeyValue::new("code", 200)][..]);
        let string = AttributeSet::from(&[KeyValue::new("code", "200")][..]);
        assert_ne!(int, string);
    }

    #[test]
    fn float_values_have_a_stable_identity() {
        let mut buckets = HashMap::new();
        for _ in 0..3 {
            *buckets
                .entry(AttributeSet::from(&[KeyValue::new("ratio", f64::NAN)][..]))
                .or_insert(0) += 1;
        }
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets.values().next(), Some(&3));

        let zero = AttributeSet::from(&[KeyValue::new("ratio", 0.0)][..]);
        let negative_zero = AttributeSet::from(&[KeyValue::new("ratio", -0.0)][..]);
        assert_eq!(zero, negative_zero);
        assert_eq!(zero.1, negative_zero.1);

        let nan_array = || {
            AttributeSet::from(
                &[KeyValue::new(
                    "samples",
                    Value::Array(Array::F64(vec![1.0, f64::NAN])),
                )][..],
            )
        };
        assert_eq!(nan_array(), nan_array());
    }

    #[test]
    fn filter_keeps_sorted_subset() {
        let set = AttributeSet::from(
            &[
                KeyValue::new("c", 3),
                KeyValue::new("a", 1),
                KeyValue::new("b", 2),
            ][..],
        );
        let filtered = set.filter(|kv| kv.key.as_str() != "b");
        assert_eq!(
            filtered,
            AttributeSet::from(&[KeyValue::new("a", 1), KeyValue::new("c", 3)][..])
        );
        assert!(set.filter(|_| false).to_vec().is_empty());
    }
}
