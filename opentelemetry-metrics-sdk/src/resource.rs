//! Representation of the entity producing telemetry.
//!
//! A [Resource] is an immutable set of attributes describing the process that
//! produces metrics. The collection engine attaches it to every
//! [`MetricData`] it produces; building it (detectors, environment variables)
//! is left to the caller.
//!
//! [`MetricData`]: crate::metrics::data::MetricData
use opentelemetry::{Key, KeyValue, Value};
use std::borrow::Cow;
use std::collections::{hash_map, HashMap};
use std::sync::Arc;

/// Inner structure of `Resource` holding the actual data.
#[derive(Debug, Clone, PartialEq)]
struct ResourceInner {
    attrs: HashMap<Key, Value>,
    schema_url: Option<Cow<'static, str>>,
}

/// An immutable representation of the entity producing telemetry as attributes.
/// Utilizes `Arc` for cheap cloning into every produced metric.
#[derive(Clone, Debug, PartialEq)]
pub struct Resource {
    inner: Arc<ResourceInner>,
}

impl Default for Resource {
    fn default() -> Self {
        Resource::empty()
    }
}

impl Resource {
    /// Creates a [ResourceBuilder] starting from an empty resource.
    pub fn builder() -> ResourceBuilder {
        ResourceBuilder {
            attrs: HashMap::new(),
            schema_url: None,
        }
    }

    /// Creates an empty resource.
    pub fn empty() -> Self {
        Resource {
            inner: Arc::new(ResourceInner {
                attrs: HashMap::new(),
                schema_url: None,
            }),
        }
    }

    /// Create a new `Resource` from key value pairs.
    ///
    /// Values are de-duplicated by key, and the last key-value pair will be retained
    pub fn new<T: IntoIterator<Item = KeyValue>>(kvs: T) -> Self {
        Resource::builder().with_attributes(kvs).build()
    }

    /// Return the [schema url] of the resource. If the resource does not have a schema url, return `None`.
    ///
    /// [schema url]: https://github.com/open-telemetry/opentelemetry-specification/blob/v1.9.0/specification/schemas/overview.md#schema-url
    pub fn schema_url(&self) -> Option<&str> {
        self.inner.schema_url.as_deref()
    }

    /// Returns the number of attributes for this resource
    pub fn len(&self) -> usize {
        self.inner.attrs.len()
    }

    /// Returns `true` if the resource contains no attributes.
    pub fn is_empty(&self) -> bool {
        self.inner.attrs.is_empty()
    }

    /// Gets an iterator over the attributes of this resource.
    pub fn iter(&self) -> Iter<'_> {
        Iter(self.inner.attrs.iter())
    }

    /// Retrieve the value from resource associate with given key.
    pub fn get(&self, key: &Key) -> Option<Value> {
        self.inner.attrs.get(key).cloned()
    }
}

/// An iterator over the entries of a `Resource`.
#[derive(Debug)]
pub struct Iter<'a>(hash_map::Iter<'a, Key, Value>);

impl<'a> Iterator for Iter<'a> {
    type Item = (&'a Key, &'a Value);

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next()
    }
}

impl<'a> IntoIterator for &'a Resource {
    type Item = (&'a Key, &'a Value);
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        Iter(self.inner.attrs.iter())
    }
}

/// Builder for [Resource]
#[derive(Debug)]
pub struct ResourceBuilder {
    attrs: HashMap<Key, Value>,
    schema_url: Option<Cow<'static, str>>,
}

impl ResourceBuilder {
    /// Add a [KeyValue] to the resource.
    pub fn with_attribute(self, kv: KeyValue) -> Self {
        self.with_attributes([kv])
    }

    /// Add multiple [KeyValue]s to the resource. Later keys replace earlier ones.
    pub fn with_attributes<T: IntoIterator<Item = KeyValue>>(mut self, kvs: T) -> Self {
        for kv in kvs {
            self.attrs.insert(kv.key, kv.value);
        }
        self
    }

    /// Set the schema url, an empty url clears it.
    pub fn with_schema_url(mut self, schema_url: impl Into<Cow<'static, str>>) -> Self {
        let schema_url = schema_url.into();
        self.schema_url = if schema_url.is_empty() {
            None
        } else {
            Some(schema_url)
        };
        self
    }

    /// Create a [Resource] with the options provided to the [ResourceBuilder].
    pub fn build(self) -> Resource {
        Resource {
            inner: Arc::new(ResourceInner {
                attrs: self.attrs,
                schema_url: self.schema_url,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn later_attributes_replace_earlier_ones() {
        let resource = Resource::builder()
            .with_attribute(KeyValue::new("service.name", "first"))
            .with_attributes([
                KeyValue::new("service.name", "second"),
                KeyValue::new("host.name", "box"),
            ])
            .build();

        assert_eq!(resource.len(), 2);
        assert_eq!(
            resource.get(&Key::new("service.name")),
            Some(Value::from("second"))
        );
    }

    #[test]
    fn empty_schema_url_is_normalized_to_none() {
        let resource = Resource::builder().with_schema_url("").build();
        assert_eq!(resource.schema_url(), None);

        let resource = Resource::builder()
            .with_schema_url("https://opentelemetry.io/schemas/1.21.0")
            .build();
        assert_eq!(
            resource.schema_url(),
            Some("https://opentelemetry.io/schemas/1.21.0")
        );
    }

    #[test]
    fn clones_share_attributes() {
        let resource = Resource::new([KeyValue::new("k", "v")]);
        let cloned = resource.clone();
        assert!(Arc::ptr_eq(&resource.inner, &cloned.inner));
        assert_eq!(resource, cloned);
        assert!(Resource::default().is_empty());
    }
}
