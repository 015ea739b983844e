use regex::Regex;
use serde_json::Value as JsonValue;

use crate::document::Document;
use crate::error::{Error, Result};
use crate::value::Value;

// ---------------------------------------------------------------------------
// Predicate AST
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum QueryOp {
    Eq(Value),
    Ne(Value),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    In(Vec<Value>),
    All(Vec<Value>),
    Exists(bool),
    Regex(Regex),
}

#[derive(Debug, Clone)]
pub enum Query {
    Field { field: String, op: QueryOp },
    And(Vec<Query>),
    Or(Vec<Query>),
    All, // match everything
}

// ---------------------------------------------------------------------------
// Parsing: JSON → predicate AST
// ---------------------------------------------------------------------------

pub fn parse_query(query: &JsonValue) -> Result<Query> {
    let obj = query
        .as_object()
        .ok_or_else(|| Error::InvalidArgument("query must be a JSON object".into()))?;

    if obj.is_empty() {
        return Ok(Query::All);
    }

    let mut conditions: Vec<Query> = Vec::new();

    for (key, value) in obj {
        match key.as_str() {
            "$and" => {
                let arr = value
                    .as_array()
                    .ok_or_else(|| Error::InvalidArgument("$and must be an array".into()))?;
                let subs: Result<Vec<Query>> = arr.iter().map(parse_query).collect();
                conditions.push(Query::And(subs?));
            }
            "$or" => {
                let arr = value
                    .as_array()
                    .ok_or_else(|| Error::InvalidArgument("$or must be an array".into()))?;
                let subs: Result<Vec<Query>> = arr.iter().map(parse_query).collect();
                conditions.push(Query::Or(subs?));
            }
            field => {
                if let Some(ops) = value.as_object() {
                    // Operator object (keys start with $), or plain object equality
                    let has_ops = ops.keys().any(|k| k.starts_with('$'));
                    if has_ops {
                        // $options is consumed alongside $regex, never alone
                        let options = ops.get("$options").and_then(|v| v.as_str());
                        if options.is_some() && !ops.contains_key("$regex") {
                            return Err(Error::InvalidArgument(
                                "$options requires $regex".into(),
                            ));
                        }
                        for (op_key, op_val) in ops {
                            if op_key == "$options" {
                                continue;
                            }
                            let op = if op_key == "$regex" {
                                parse_regex(op_val, options)?
                            } else {
                                parse_op(op_key, op_val)?
                            };
                            conditions.push(Query::Field {
                                field: field.to_string(),
                                op,
                            });
                        }
                    } else {
                        conditions.push(Query::Field {
                            field: field.to_string(),
                            op: QueryOp::Eq(Value::from_json(value)),
                        });
                    }
                } else {
                    // Shorthand for $eq
                    conditions.push(Query::Field {
                        field: field.to_string(),
                        op: QueryOp::Eq(Value::from_json(value)),
                    });
                }
            }
        }
    }

    match conditions.len() {
        0 => Ok(Query::All),
        1 => Ok(conditions.pop().unwrap()),
        _ => Ok(Query::And(conditions)),
    }
}

fn parse_op(op_key: &str, op_val: &JsonValue) -> Result<QueryOp> {
    match op_key {
        "$eq" => Ok(QueryOp::Eq(Value::from_json(op_val))),
        "$ne" => Ok(QueryOp::Ne(Value::from_json(op_val))),
        "$gt" => Ok(QueryOp::Gt(Value::from_json(op_val))),
        "$gte" => Ok(QueryOp::Gte(Value::from_json(op_val))),
        "$lt" => Ok(QueryOp::Lt(Value::from_json(op_val))),
        "$lte" => Ok(QueryOp::Lte(Value::from_json(op_val))),
        "$in" => {
            let arr = op_val
                .as_array()
                .ok_or_else(|| Error::InvalidArgument("$in must be an array".into()))?;
            Ok(QueryOp::In(arr.iter().map(Value::from_json).collect()))
        }
        "$all" => {
            let arr = op_val
                .as_array()
                .ok_or_else(|| Error::InvalidArgument("$all must be an array".into()))?;
            Ok(QueryOp::All(arr.iter().map(Value::from_json).collect()))
        }
        "$exists" => {
            let b = op_val
                .as_bool()
                .ok_or_else(|| Error::InvalidArgument("$exists must be a boolean".into()))?;
            Ok(QueryOp::Exists(b))
        }
        _ => Err(Error::InvalidArgument(format!(
            "unknown operator: {}",
            op_key
        ))),
    }
}

fn parse_regex(op_val: &JsonValue, options: Option<&str>) -> Result<QueryOp> {
    let pattern = op_val
        .as_str()
        .ok_or_else(|| Error::InvalidArgument("$regex must be a string".into()))?;
    let pattern = match options {
        Some(opts) if opts.contains('i') => format!("(?i){}", pattern),
        Some(opts) if !opts.is_empty() => {
            return Err(Error::InvalidArgument(format!(
                "unsupported $options: {}",
                opts
            )))
        }
        _ => pattern.to_string(),
    };
    let re = Regex::new(&pattern)
        .map_err(|e| Error::InvalidArgument(format!("invalid $regex: {}", e)))?;
    Ok(QueryOp::Regex(re))
}

// ---------------------------------------------------------------------------
// Evaluation against a single document
// ---------------------------------------------------------------------------

/// Equality with array-membership semantics: a field holding an array
/// matches a scalar target when any element equals it, and an array target
/// only by whole-array equality.
fn eq_matches(field_val: &Value, target: &Value) -> bool {
    if field_val == target {
        return true;
    }
    // `{field: null}` also matches documents where the field is absent
    if field_val.is_absent() && *target == Value::Null {
        return true;
    }
    match field_val {
        Value::Array(items) => items.iter().any(|item| item == target),
        _ => false,
    }
}

fn regex_matches(field_val: &Value, re: &Regex) -> bool {
    match field_val {
        Value::Text(s) => re.is_match(s),
        Value::Array(items) => items
            .iter()
            .any(|item| matches!(item, Value::Text(s) if re.is_match(s))),
        _ => false,
    }
}

pub fn matches_doc(query: &Query, doc: &Document) -> bool {
    match query {
        Query::All => true,
        Query::Field { field, op } => {
            let val = doc.get(field);
            match op {
                QueryOp::Exists(expected) => !val.is_absent() == *expected,
                QueryOp::Eq(v) => eq_matches(&val, v),
                QueryOp::Ne(v) => !eq_matches(&val, v),
                QueryOp::In(vals) => vals.iter().any(|v| eq_matches(&val, v)),
                QueryOp::All(vals) => match &val {
                    Value::Array(items) => vals.iter().all(|v| items.contains(v)),
                    _ => false,
                },
                QueryOp::Regex(re) => regex_matches(&val, re),
                QueryOp::Gt(v) => !val.is_absent() && val > *v,
                QueryOp::Gte(v) => !val.is_absent() && val >= *v,
                QueryOp::Lt(v) => !val.is_absent() && val < *v,
                QueryOp::Lte(v) => !val.is_absent() && val <= *v,
            }
        }
        Query::And(subs) => subs.iter().all(|s| matches_doc(s, doc)),
        Query::Or(subs) => subs.iter().any(|s| matches_doc(s, doc)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(json: JsonValue) -> Document {
        Document::from_json(&json).unwrap()
    }

    #[test]
    fn simple_eq() {
        let q = parse_query(&json!({"name": "Alice"})).unwrap();
        assert!(matches_doc(&q, &doc(json!({"name": "Alice"}))));
        assert!(!matches_doc(&q, &doc(json!({"name": "Bob"}))));
    }

    #[test]
    fn eq_on_array_is_membership() {
        let q = parse_query(&json!({"tags": "enim"})).unwrap();
        assert!(matches_doc(&q, &doc(json!({"tags": ["enim", "id"]}))));
        assert!(!matches_doc(&q, &doc(json!({"tags": ["velit"]}))));
        assert!(!matches_doc(&q, &doc(json!({"name": "no tags"}))));
    }

    #[test]
    fn eq_whole_array() {
        let q = parse_query(&json!({"tags": ["a", "b"]})).unwrap();
        assert!(matches_doc(&q, &doc(json!({"tags": ["a", "b"]}))));
        assert!(!matches_doc(&q, &doc(json!({"tags": ["a"]}))));
    }

    #[test]
    fn eq_null_matches_missing() {
        let q = parse_query(&json!({"nickname": null})).unwrap();
        assert!(matches_doc(&q, &doc(json!({"name": "Alice"}))));
        assert!(matches_doc(&q, &doc(json!({"nickname": null}))));
        assert!(!matches_doc(&q, &doc(json!({"nickname": "Al"}))));
    }

    #[test]
    fn multi_field_is_implicit_and() {
        let q = parse_query(&json!({"isActive": false, "tags": "velit"})).unwrap();
        assert!(matches_doc(
            &q,
            &doc(json!({"isActive": false, "tags": ["velit"]}))
        ));
        assert!(!matches_doc(
            &q,
            &doc(json!({"isActive": true, "tags": ["velit"]}))
        ));
    }

    #[test]
    fn positional_array_index() {
        let q = parse_query(&json!({"tags.1": "ad"})).unwrap();
        assert!(matches_doc(&q, &doc(json!({"tags": ["enim", "ad"]}))));
        assert!(!matches_doc(&q, &doc(json!({"tags": ["ad", "enim"]}))));
        assert!(!matches_doc(&q, &doc(json!({"tags": ["ad"]}))));
    }

    #[test]
    fn all_operator() {
        let q = parse_query(&json!({"tags": {"$all": ["enim", "id"]}})).unwrap();
        assert!(matches_doc(
            &q,
            &doc(json!({"tags": ["enim", "id", "velit"]}))
        ));
        assert!(!matches_doc(&q, &doc(json!({"tags": ["enim"]}))));
        assert!(!matches_doc(&q, &doc(json!({"tags": "enim"}))));
    }

    #[test]
    fn regex_prefix() {
        let q = parse_query(&json!({"company.phone": {"$regex": r"^\+1 \(940\)"}})).unwrap();
        assert!(matches_doc(
            &q,
            &doc(json!({"company": {"phone": "+1 (940) 501-3963"}}))
        ));
        assert!(!matches_doc(
            &q,
            &doc(json!({"company": {"phone": "+1 (844) 000-0000"}}))
        ));
    }

    #[test]
    fn regex_case_insensitive_option() {
        let q = parse_query(&json!({"name": {"$regex": "^ali", "$options": "i"}})).unwrap();
        assert!(matches_doc(&q, &doc(json!({"name": "Alice"}))));
    }

    #[test]
    fn regex_non_text_never_matches() {
        let q = parse_query(&json!({"age": {"$regex": "^2"}})).unwrap();
        assert!(!matches_doc(&q, &doc(json!({"age": 20}))));
    }

    #[test]
    fn invalid_regex_rejected() {
        assert!(parse_query(&json!({"name": {"$regex": "("}})).is_err());
    }

    #[test]
    fn range_operators() {
        let q = parse_query(&json!({"age": {"$gte": 18, "$lt": 65}})).unwrap();
        assert!(matches_doc(&q, &doc(json!({"age": 30}))));
        assert!(!matches_doc(&q, &doc(json!({"age": 10}))));
        assert!(!matches_doc(&q, &doc(json!({"age": 70}))));
        assert!(!matches_doc(&q, &doc(json!({"name": "no age"}))));
    }

    #[test]
    fn date_range() {
        let q = parse_query(&json!({
            "registered": {"$gte": "2024-01-01", "$lt": "2025-01-01"}
        }))
        .unwrap();
        assert!(matches_doc(&q, &doc(json!({"registered": "2024-06-15"}))));
        assert!(!matches_doc(&q, &doc(json!({"registered": "2023-06-15"}))));
    }

    #[test]
    fn in_operator() {
        let q = parse_query(&json!({"fruit": {"$in": ["banana", "apple"]}})).unwrap();
        assert!(matches_doc(&q, &doc(json!({"fruit": "banana"}))));
        assert!(!matches_doc(&q, &doc(json!({"fruit": "kiwi"}))));
    }

    #[test]
    fn exists_operator() {
        let q = parse_query(&json!({"tags": {"$exists": true}})).unwrap();
        assert!(matches_doc(&q, &doc(json!({"tags": []}))));
        assert!(matches_doc(&q, &doc(json!({"tags": null}))));
        assert!(!matches_doc(&q, &doc(json!({"name": "no tags"}))));
    }

    #[test]
    fn or_composition() {
        let q = parse_query(&json!({
            "$or": [{"status": "active"}, {"priority": {"$gte": 5}}]
        }))
        .unwrap();
        assert!(matches_doc(
            &q,
            &doc(json!({"status": "active", "priority": 1}))
        ));
        assert!(matches_doc(
            &q,
            &doc(json!({"status": "closed", "priority": 10}))
        ));
        assert!(!matches_doc(
            &q,
            &doc(json!({"status": "closed", "priority": 1}))
        ));
    }

    #[test]
    fn empty_query_matches_everything() {
        let q = parse_query(&json!({})).unwrap();
        assert!(matches_doc(&q, &doc(json!({"anything": 1}))));
    }

    #[test]
    fn unknown_operator_rejected() {
        assert!(parse_query(&json!({"age": {"$near": 5}})).is_err());
    }

    #[test]
    fn options_without_regex_rejected() {
        assert!(parse_query(&json!({"name": {"$options": "i"}})).is_err());
    }
}
