use serde_json::Value as JsonValue;

use crate::document::Document;
use crate::error::{Error, Result};

/// An ordered sequence of documents. Order is insertion order until a
/// pipeline stage re-orders its copy; the collection itself is never
/// mutated by evaluation.
#[derive(Debug, Clone, Default)]
pub struct Collection {
    docs: Vec<Document>,
}

impl Collection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a JSON array of objects.
    pub fn from_json(value: &JsonValue) -> Result<Self> {
        let arr = value
            .as_array()
            .ok_or_else(|| Error::InvalidArgument("collection must be a JSON array".into()))?;
        arr.iter().map(Document::from_json).collect()
    }

    /// Parse a JSON text into a collection.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let value: JsonValue = serde_json::from_str(text)?;
        Self::from_json(&value)
    }

    pub fn push(&mut self, doc: Document) {
        self.docs.push(doc);
    }

    pub fn docs(&self) -> &[Document] {
        &self.docs
    }

    pub fn iter(&self) -> impl Iterator<Item = &Document> {
        self.docs.iter()
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }
}

impl FromIterator<Document> for Collection {
    fn from_iter<T: IntoIterator<Item = Document>>(iter: T) -> Self {
        Self {
            docs: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn from_json_array() {
        let col = Collection::from_json(&json!([{"a": 1}, {"a": 2}])).unwrap();
        assert_eq!(col.len(), 2);
        assert_eq!(col.docs()[1].to_json(), json!({"a": 2}));
    }

    #[test]
    fn from_json_rejects_non_array() {
        assert!(Collection::from_json(&json!({"a": 1})).is_err());
    }

    #[test]
    fn from_json_str_propagates_parse_errors() {
        let err = Collection::from_json_str("not json").unwrap_err();
        assert!(matches!(err, Error::Json(_)));
    }

    #[test]
    fn preserves_insertion_order() {
        let col = Collection::from_json(&json!([{"n": 3}, {"n": 1}, {"n": 2}])).unwrap();
        let order: Vec<_> = col.iter().map(|d| d.to_json()["n"].clone()).collect();
        assert_eq!(order, vec![json!(3), json!(1), json!(2)]);
    }
}
