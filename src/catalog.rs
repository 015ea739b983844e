use std::collections::HashMap;

use crate::collection::Collection;
use crate::document::Document;
use crate::error::{Error, Result};
use crate::pipeline::{evaluate, Pipeline};

/// Named collections, used to resolve `$lookup`'s foreign collection.
/// Read-only for the duration of a pipeline's evaluation.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    collections: HashMap<String, Collection>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, collection: Collection) {
        self.collections.insert(name.into(), collection);
    }

    pub fn get(&self, name: &str) -> Option<&Collection> {
        self.collections.get(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.collections.keys().cloned().collect()
    }

    /// Run a pipeline against a named collection.
    pub fn aggregate(&self, name: &str, pipeline: &Pipeline) -> Result<Vec<Document>> {
        let source = self
            .get(name)
            .ok_or_else(|| Error::Stage(format!("unknown collection: {}", name)))?;
        evaluate(source, pipeline, self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn aggregate_on_named_collection() {
        let mut catalog = Catalog::new();
        catalog.insert(
            "users",
            Collection::from_json(&json!([{"active": true}, {"active": false}])).unwrap(),
        );
        let pipeline = Pipeline::parse(&json!([
            {"$match": {"active": true}},
            {"$count": "total"}
        ]))
        .unwrap();

        let result = catalog.aggregate("users", &pipeline).unwrap();
        assert_eq!(result[0].to_json(), json!({"total": 1}));
    }

    #[test]
    fn aggregate_unknown_collection_is_stage_error() {
        let catalog = Catalog::new();
        let pipeline = Pipeline::parse(&json!([])).unwrap();
        let err = catalog.aggregate("nope", &pipeline).unwrap_err();
        assert!(matches!(err, Error::Stage(_)));
    }
}
