use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use opentelemetry::{Key, KeyValue};

use crate::metrics::attribute_set::AttributeSet;

/// Drops the attributes a view does not allow before they reach a bucket.
///
/// Measurements whose attribute sets collapse to the same filtered set are
/// aggregated together.
#[derive(Clone)]
pub(crate) struct AttributeSetFilter {
    filter: Option<Arc<dyn Fn(&KeyValue) -> bool + Send + Sync>>,
}

impl fmt::Debug for AttributeSetFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttributeSetFilter")
            .field("active", &self.filter.is_some())
            .finish()
    }
}

impl AttributeSetFilter {
    /// A filter keeping only the keys in `allowed`, or every key when `None`.
    pub(crate) fn new(allowed: Option<&HashSet<Key>>) -> Self {
        let filter = allowed.map(|keys| {
            let keys = keys.clone();
            Arc::new(move |kv: &KeyValue| keys.contains(&kv.key))
                as Arc<dyn Fn(&KeyValue) -> bool + Send + Sync>
        });
        AttributeSetFilter { filter }
    }

    pub(crate) fn apply(&self, attrs: &[KeyValue]) -> AttributeSet {
        match &self.filter {
            Some(filter) => AttributeSet::from(attrs).filter(|kv| filter(kv)),
            None => AttributeSet::from(attrs),
        }
    }

    pub(crate) fn apply_set(&self, attrs: &AttributeSet) -> AttributeSet {
        match &self.filter {
            Some(filter) => attrs.filter(|kv| filter(kv)),
            None => attrs.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn without_allow_list_everything_passes() {
        let filter = AttributeSetFilter::new(None);
        let set = filter.apply(&[KeyValue::new("a", 1), KeyValue::new("b", 2)]);
        assert_eq!(set.to_vec().len(), 2);
    }

    #[test]
    fn allow_list_drops_unknown_keys() {
        let allowed: HashSet<Key> = [Key::new("a")].into_iter().collect();
        let filter = AttributeSetFilter::new(Some(&allowed));

        let one = filter.apply(&[KeyValue::new("a", 1), KeyValue::new("b", 2)]);
        let two = filter.apply(&[KeyValue::new("b", 3), KeyValue::new("a", 1)]);
        assert_eq!(one, two);
        assert_eq!(one, AttributeSet::from(&[KeyValue::new("a", 1)][..]));
    }
}
