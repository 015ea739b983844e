use std::collections::HashMap;

use serde_json::Value as JsonValue;

use crate::catalog::Catalog;
use crate::collection::Collection;
use crate::document::Document;
use crate::error::{Error, Result};
use crate::query::{self, Query};
use crate::value::Value;

// ---------------------------------------------------------------------------
// Expression
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Expression {
    Literal(Value),
    FieldRef(String),
    Add(Vec<Expression>),
    Subtract(Box<Expression>, Box<Expression>),
    Multiply(Vec<Expression>),
    Divide(Box<Expression>, Box<Expression>),
    Size(Box<Expression>),
    IfNull(Box<Expression>, Box<Expression>),
    First(Box<Expression>),
    ArrayElemAt(Box<Expression>, i64),
}

// ---------------------------------------------------------------------------
// Group key
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum GroupKey {
    Null,
    Single(Expression),
    Compound(Vec<(String, Expression)>),
}

// ---------------------------------------------------------------------------
// Accumulators
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Accumulator {
    Sum(Expression),
    Avg(Expression),
    Min(Expression),
    Max(Expression),
    Count,
    First(Expression),
    Last(Expression),
    Push(Expression),
}

enum AccumulatorState {
    Sum(f64),
    Avg { sum: f64, count: u64 },
    Min(Option<Value>),
    Max(Option<Value>),
    Count(u64),
    First(Option<Value>),
    Last(Option<Value>),
    Push(Vec<Value>),
}

// ---------------------------------------------------------------------------
// Projection
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum ProjectionField {
    Include,
    Exclude,
    Compute(Expression),
}

// ---------------------------------------------------------------------------
// Pipeline stages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum SortOrder {
    Asc,
    Desc,
}

#[derive(Debug, Clone)]
enum Stage {
    Match(Query),
    Group {
        key: GroupKey,
        accumulators: Vec<(String, Accumulator)>,
    },
    Sort(Vec<(String, SortOrder)>),
    Skip(usize),
    Limit(usize),
    Project(Vec<(String, ProjectionField)>),
    Count(String),
    Unwind {
        path: String,
        preserve_empty: bool,
    },
    AddFields(Vec<(String, Expression)>),
    Lookup {
        from: String,
        local_field: String,
        foreign_field: String,
        as_field: String,
    },
}

/// A parsed aggregation pipeline: an ordered sequence of stage descriptions.
#[derive(Debug)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Group keys and lookup join keys treat a missing field as an explicit null.
fn null_if_absent(v: Value) -> Value {
    if v.is_absent() { Value::Null } else { v }
}

// ---------------------------------------------------------------------------
// Expression parsing & evaluation
// ---------------------------------------------------------------------------

fn parse_expression_list(arg: &JsonValue, op: &str) -> Result<Vec<Expression>> {
    let arr = arg
        .as_array()
        .ok_or_else(|| Error::InvalidArgument(format!("{} requires an array", op)))?;
    arr.iter().map(parse_expression).collect()
}

fn parse_expression_pair(arg: &JsonValue, op: &str) -> Result<(Box<Expression>, Box<Expression>)> {
    let arr = arg
        .as_array()
        .ok_or_else(|| Error::InvalidArgument(format!("{} requires an array", op)))?;
    if arr.len() != 2 {
        return Err(Error::InvalidArgument(format!(
            "{} requires exactly 2 arguments",
            op
        )));
    }
    Ok((
        Box::new(parse_expression(&arr[0])?),
        Box::new(parse_expression(&arr[1])?),
    ))
}

fn parse_expression(val: &JsonValue) -> Result<Expression> {
    match val {
        JsonValue::String(s) if s.starts_with('$') => Ok(Expression::FieldRef(s[1..].to_string())),
        JsonValue::Object(map) if map.len() == 1 => {
            let (key, arg) = map.iter().next().unwrap();
            match key.as_str() {
                "$add" => Ok(Expression::Add(parse_expression_list(arg, "$add")?)),
                "$multiply" => Ok(Expression::Multiply(parse_expression_list(
                    arg,
                    "$multiply",
                )?)),
                "$subtract" => {
                    let (a, b) = parse_expression_pair(arg, "$subtract")?;
                    Ok(Expression::Subtract(a, b))
                }
                "$divide" => {
                    let (a, b) = parse_expression_pair(arg, "$divide")?;
                    Ok(Expression::Divide(a, b))
                }
                "$size" => Ok(Expression::Size(Box::new(parse_expression(arg)?))),
                "$ifNull" => {
                    let (a, b) = parse_expression_pair(arg, "$ifNull")?;
                    Ok(Expression::IfNull(a, b))
                }
                "$first" => Ok(Expression::First(Box::new(parse_expression(arg)?))),
                "$arrayElemAt" => {
                    let arr = arg.as_array().ok_or_else(|| {
                        Error::InvalidArgument("$arrayElemAt requires an array".into())
                    })?;
                    if arr.len() != 2 {
                        return Err(Error::InvalidArgument(
                            "$arrayElemAt requires exactly 2 arguments".into(),
                        ));
                    }
                    let index = arr[1].as_i64().ok_or_else(|| {
                        Error::InvalidArgument("$arrayElemAt index must be an integer".into())
                    })?;
                    Ok(Expression::ArrayElemAt(
                        Box::new(parse_expression(&arr[0])?),
                        index,
                    ))
                }
                other if other.starts_with('$') => Err(Error::InvalidArgument(format!(
                    "unknown expression operator: {}",
                    other
                ))),
                _ => Ok(Expression::Literal(Value::from_json(val))),
            }
        }
        _ => Ok(Expression::Literal(Value::from_json(val))),
    }
}

impl Expression {
    fn eval(&self, doc: &Document) -> Value {
        match self {
            Expression::Literal(v) => v.clone(),
            Expression::FieldRef(path) => doc.get(path),
            Expression::Add(exprs) => {
                let mut sum = 0.0_f64;
                for e in exprs {
                    match e.eval(doc).as_f64() {
                        Some(n) => sum += n,
                        None => return Value::Null,
                    }
                }
                Value::from_f64(sum)
            }
            Expression::Subtract(a, b) => match (a.eval(doc).as_f64(), b.eval(doc).as_f64()) {
                (Some(a), Some(b)) => Value::from_f64(a - b),
                _ => Value::Null,
            },
            Expression::Multiply(exprs) => {
                let mut product = 1.0_f64;
                for e in exprs {
                    match e.eval(doc).as_f64() {
                        Some(n) => product *= n,
                        None => return Value::Null,
                    }
                }
                Value::from_f64(product)
            }
            Expression::Divide(a, b) => match (a.eval(doc).as_f64(), b.eval(doc).as_f64()) {
                (Some(a), Some(b)) if b != 0.0 => Value::from_f64(a / b),
                _ => Value::Null,
            },
            Expression::Size(e) => match e.eval(doc) {
                Value::Array(items) => Value::Int(items.len() as i64),
                _ => Value::Null,
            },
            Expression::IfNull(a, b) => {
                let v = a.eval(doc);
                if v.is_missing() { b.eval(doc) } else { v }
            }
            Expression::First(e) => match e.eval(doc) {
                Value::Array(items) => items.into_iter().next().unwrap_or(Value::Absent),
                Value::Absent => Value::Absent,
                _ => Value::Null,
            },
            Expression::ArrayElemAt(e, index) => match e.eval(doc) {
                Value::Array(items) => {
                    let len = items.len() as i64;
                    let i = if *index < 0 { len + *index } else { *index };
                    if (0..len).contains(&i) {
                        items.into_iter().nth(i as usize).unwrap_or(Value::Absent)
                    } else {
                        Value::Absent
                    }
                }
                Value::Absent => Value::Absent,
                _ => Value::Null,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Stage parsing helpers
// ---------------------------------------------------------------------------

fn parse_accumulator(val: &JsonValue) -> Result<Accumulator> {
    let obj = val
        .as_object()
        .ok_or_else(|| Error::InvalidArgument("accumulator must be an object".into()))?;
    if obj.len() != 1 {
        return Err(Error::InvalidArgument(
            "accumulator must have exactly one operator".into(),
        ));
    }
    let (op, arg) = obj.iter().next().unwrap();
    match op.as_str() {
        "$sum" => Ok(Accumulator::Sum(parse_expression(arg)?)),
        "$avg" => Ok(Accumulator::Avg(parse_expression(arg)?)),
        "$min" => Ok(Accumulator::Min(parse_expression(arg)?)),
        "$max" => Ok(Accumulator::Max(parse_expression(arg)?)),
        "$count" => Ok(Accumulator::Count),
        "$first" => Ok(Accumulator::First(parse_expression(arg)?)),
        "$last" => Ok(Accumulator::Last(parse_expression(arg)?)),
        "$push" => Ok(Accumulator::Push(parse_expression(arg)?)),
        _ => Err(Error::InvalidArgument(format!(
            "unknown accumulator: {}",
            op
        ))),
    }
}

fn parse_group_stage(val: &JsonValue) -> Result<Stage> {
    let obj = val
        .as_object()
        .ok_or_else(|| Error::InvalidArgument("$group must be an object".into()))?;

    let id_val = obj
        .get("_id")
        .ok_or_else(|| Error::InvalidArgument("$group requires '_id' field".into()))?;

    let key = match id_val {
        JsonValue::Null => GroupKey::Null,
        JsonValue::String(s) if s.starts_with('$') => {
            GroupKey::Single(Expression::FieldRef(s[1..].to_string()))
        }
        JsonValue::Object(map) => {
            let has_operators = map.keys().any(|k| k.starts_with('$'));
            if has_operators {
                GroupKey::Single(parse_expression(id_val)?)
            } else {
                let fields: Result<Vec<_>> = map
                    .iter()
                    .map(|(k, v)| Ok((k.clone(), parse_expression(v)?)))
                    .collect();
                GroupKey::Compound(fields?)
            }
        }
        _ => GroupKey::Single(Expression::Literal(Value::from_json(id_val))),
    };

    let mut accumulators = Vec::new();
    for (name, spec) in obj {
        if name == "_id" {
            continue;
        }
        accumulators.push((name.clone(), parse_accumulator(spec)?));
    }

    Ok(Stage::Group { key, accumulators })
}

fn parse_sort(val: &JsonValue) -> Result<Vec<(String, SortOrder)>> {
    let obj = val
        .as_object()
        .ok_or_else(|| Error::InvalidArgument("$sort must be an object".into()))?;
    let mut fields = Vec::new();
    for (field, dir) in obj {
        let order = match dir.as_i64() {
            Some(1) => SortOrder::Asc,
            Some(-1) => SortOrder::Desc,
            _ => {
                return Err(Error::InvalidArgument(
                    "sort direction must be 1 or -1".into(),
                ));
            }
        };
        fields.push((field.clone(), order));
    }
    Ok(fields)
}

fn parse_project(val: &JsonValue) -> Result<Vec<(String, ProjectionField)>> {
    let obj = val
        .as_object()
        .ok_or_else(|| Error::InvalidArgument("$project must be an object".into()))?;
    let mut fields = Vec::new();
    for (field, spec) in obj {
        let pf = match spec {
            JsonValue::Number(n) if n.as_i64() == Some(1) => ProjectionField::Include,
            JsonValue::Number(n) if n.as_i64() == Some(0) => ProjectionField::Exclude,
            JsonValue::Bool(true) => ProjectionField::Include,
            JsonValue::Bool(false) => ProjectionField::Exclude,
            _ => ProjectionField::Compute(parse_expression(spec)?),
        };
        fields.push((field.clone(), pf));
    }
    Ok(fields)
}

fn parse_unwind(val: &JsonValue) -> Result<(String, bool)> {
    match val {
        JsonValue::String(s) if s.starts_with('$') => Ok((s[1..].to_string(), false)),
        JsonValue::Object(obj) => {
            let path = obj
                .get("path")
                .and_then(|v| v.as_str())
                .ok_or_else(|| Error::InvalidArgument("$unwind requires 'path' string".into()))?;
            if !path.starts_with('$') {
                return Err(Error::InvalidArgument(
                    "$unwind path must start with $".into(),
                ));
            }
            let preserve = obj
                .get("preserveNullAndEmptyArrays")
                .and_then(|v| v.as_bool())
                .unwrap_or(false);
            Ok((path[1..].to_string(), preserve))
        }
        _ => Err(Error::InvalidArgument(
            "$unwind must be a string or object".into(),
        )),
    }
}

fn parse_lookup(val: &JsonValue) -> Result<Stage> {
    let obj = val
        .as_object()
        .ok_or_else(|| Error::InvalidArgument("$lookup must be an object".into()))?;
    let field = |name: &str| -> Result<String> {
        obj.get(name)
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| Error::InvalidArgument(format!("$lookup requires '{}' string", name)))
    };
    Ok(Stage::Lookup {
        from: field("from")?,
        local_field: field("localField")?,
        foreign_field: field("foreignField")?,
        as_field: field("as")?,
    })
}

fn parse_bound(val: &JsonValue, stage: &str) -> Result<usize> {
    let n = val
        .as_i64()
        .ok_or_else(|| Error::InvalidArgument(format!("{} must be an integer", stage)))?;
    if n < 0 {
        return Err(Error::InvalidArgument(format!(
            "{} must be non-negative",
            stage
        )));
    }
    Ok(n as usize)
}

// ---------------------------------------------------------------------------
// Stage execution
// ---------------------------------------------------------------------------

fn exec_match(docs: Vec<Document>, query: &Query) -> Vec<Document> {
    docs.into_iter()
        .filter(|doc| query::matches_doc(query, doc))
        .collect()
}

fn exec_group(
    docs: Vec<Document>,
    key: &GroupKey,
    accumulators: &[(String, Accumulator)],
) -> Vec<Document> {
    let mut groups: HashMap<Value, Vec<AccumulatorState>> = HashMap::new();
    let mut encounter_order: Vec<Value> = Vec::new();

    for doc in &docs {
        let key_val = match key {
            GroupKey::Null => Value::Null,
            GroupKey::Single(expr) => null_if_absent(expr.eval(doc)),
            GroupKey::Compound(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(name, expr)| (name.clone(), null_if_absent(expr.eval(doc))))
                    .collect(),
            ),
        };

        let states = groups.entry(key_val.clone()).or_insert_with(|| {
            encounter_order.push(key_val.clone());
            accumulators
                .iter()
                .map(|(_, acc)| match acc {
                    Accumulator::Sum(_) => AccumulatorState::Sum(0.0),
                    Accumulator::Avg(_) => AccumulatorState::Avg { sum: 0.0, count: 0 },
                    Accumulator::Min(_) => AccumulatorState::Min(None),
                    Accumulator::Max(_) => AccumulatorState::Max(None),
                    Accumulator::Count => AccumulatorState::Count(0),
                    Accumulator::First(_) => AccumulatorState::First(None),
                    Accumulator::Last(_) => AccumulatorState::Last(None),
                    Accumulator::Push(_) => AccumulatorState::Push(Vec::new()),
                })
                .collect()
        });

        for (i, (_, acc)) in accumulators.iter().enumerate() {
            let state = &mut states[i];
            match (acc, state) {
                (Accumulator::Sum(expr), AccumulatorState::Sum(s)) => {
                    if let Some(n) = expr.eval(doc).as_f64() {
                        *s += n;
                    }
                }
                (Accumulator::Avg(expr), AccumulatorState::Avg { sum, count }) => {
                    if let Some(n) = expr.eval(doc).as_f64() {
                        *sum += n;
                        *count += 1;
                    }
                }
                (Accumulator::Min(expr), AccumulatorState::Min(current)) => {
                    let val = expr.eval(doc);
                    if !val.is_missing() {
                        *current = Some(match current.take() {
                            None => val,
                            Some(cur) => {
                                if val < cur {
                                    val
                                } else {
                                    cur
                                }
                            }
                        });
                    }
                }
                (Accumulator::Max(expr), AccumulatorState::Max(current)) => {
                    let val = expr.eval(doc);
                    if !val.is_missing() {
                        *current = Some(match current.take() {
                            None => val,
                            Some(cur) => {
                                if val > cur {
                                    val
                                } else {
                                    cur
                                }
                            }
                        });
                    }
                }
                (Accumulator::Count, AccumulatorState::Count(c)) => {
                    *c += 1;
                }
                (Accumulator::First(expr), AccumulatorState::First(current)) => {
                    if current.is_none() {
                        *current = Some(expr.eval(doc));
                    }
                }
                (Accumulator::Last(expr), AccumulatorState::Last(current)) => {
                    *current = Some(expr.eval(doc));
                }
                (Accumulator::Push(expr), AccumulatorState::Push(vec)) => {
                    let val = expr.eval(doc);
                    if !val.is_absent() {
                        vec.push(val);
                    }
                }
                _ => {}
            }
        }
    }

    let mut results = Vec::new();
    for key_val in &encounter_order {
        let Some(states) = groups.remove(key_val) else {
            continue;
        };
        let mut doc = Document::new();
        doc.set("_id", key_val.clone());

        for ((name, _), state) in accumulators.iter().zip(states) {
            let val = match state {
                AccumulatorState::Sum(s) => Value::from_f64(s),
                AccumulatorState::Avg { sum, count } => {
                    if count == 0 {
                        Value::Null
                    } else {
                        Value::from_f64(sum / count as f64)
                    }
                }
                AccumulatorState::Min(v) => v.unwrap_or(Value::Null),
                AccumulatorState::Max(v) => v.unwrap_or(Value::Null),
                AccumulatorState::Count(c) => Value::Int(c as i64),
                AccumulatorState::First(v) => v.unwrap_or(Value::Null),
                AccumulatorState::Last(v) => v.unwrap_or(Value::Null),
                AccumulatorState::Push(v) => Value::Array(v),
            };
            doc.set(name, val);
        }

        results.push(doc);
    }

    results
}

fn exec_sort(mut docs: Vec<Document>, sort_fields: &[(String, SortOrder)]) -> Vec<Document> {
    // Vec::sort_by is stable: equal keys keep their input order
    docs.sort_by(|a, b| {
        for (field, order) in sort_fields {
            let cmp = a.get(field).cmp(&b.get(field));
            let cmp = match order {
                SortOrder::Asc => cmp,
                SortOrder::Desc => cmp.reverse(),
            };
            if cmp != std::cmp::Ordering::Equal {
                return cmp;
            }
        }
        std::cmp::Ordering::Equal
    });
    docs
}

fn exec_skip(docs: Vec<Document>, n: usize) -> Vec<Document> {
    docs.into_iter().skip(n).collect()
}

fn exec_limit(docs: Vec<Document>, n: usize) -> Vec<Document> {
    docs.into_iter().take(n).collect()
}

fn exec_project(docs: Vec<Document>, fields: &[(String, ProjectionField)]) -> Vec<Document> {
    let inclusion_mode = fields.iter().any(|(name, pf)| {
        (name != "_id" && matches!(pf, ProjectionField::Include))
            || matches!(pf, ProjectionField::Compute(_))
    });

    docs.into_iter()
        .map(|doc| {
            if inclusion_mode {
                let mut out = Document::new();

                let id_excluded = fields
                    .iter()
                    .any(|(name, pf)| name == "_id" && matches!(pf, ProjectionField::Exclude));
                if !id_excluded {
                    out.set("_id", doc.get("_id"));
                }

                for (name, pf) in fields {
                    match pf {
                        ProjectionField::Include => {
                            // Absent source fields are omitted, not defaulted
                            out.set(name, doc.get(name));
                        }
                        ProjectionField::Compute(expr) => {
                            out.set(name, expr.eval(&doc));
                        }
                        ProjectionField::Exclude => {}
                    }
                }
                out
            } else {
                let mut out = doc;
                for (name, pf) in fields {
                    if matches!(pf, ProjectionField::Exclude) {
                        out.set(name, Value::Absent);
                    }
                }
                out
            }
        })
        .collect()
}

fn exec_count(docs: Vec<Document>, field_name: &str) -> Vec<Document> {
    let mut doc = Document::new();
    doc.set(field_name, Value::Int(docs.len() as i64));
    vec![doc]
}

fn exec_unwind(docs: Vec<Document>, path: &str, preserve_empty: bool) -> Vec<Document> {
    let mut result = Vec::new();
    for doc in docs {
        match doc.get(path) {
            Value::Array(items) => {
                if items.is_empty() {
                    if preserve_empty {
                        result.push(doc);
                    }
                } else {
                    for item in items {
                        let mut new_doc = doc.clone();
                        new_doc.set(path, item);
                        result.push(new_doc);
                    }
                }
            }
            Value::Absent | Value::Null => {
                if preserve_empty {
                    result.push(doc);
                }
            }
            // Non-array, non-null: pass through unchanged
            _ => result.push(doc),
        }
    }
    result
}

fn exec_add_fields(docs: Vec<Document>, fields: &[(String, Expression)]) -> Vec<Document> {
    docs.into_iter()
        .map(|mut doc| {
            for (name, expr) in fields {
                let val = expr.eval(&doc);
                doc.set(name, val);
            }
            doc
        })
        .collect()
}

fn exec_lookup(
    docs: Vec<Document>,
    from: &str,
    local_field: &str,
    foreign_field: &str,
    as_field: &str,
    catalog: &Catalog,
) -> Result<Vec<Document>> {
    let foreign = catalog
        .get(from)
        .ok_or_else(|| Error::Stage(format!("$lookup references unknown collection: {}", from)))?;

    let mut result = Vec::with_capacity(docs.len());
    for mut doc in docs {
        let local_val = null_if_absent(doc.get(local_field));
        let matches: Vec<Value> = foreign
            .iter()
            .filter(|f| null_if_absent(f.get(foreign_field)) == local_val)
            .map(|f| Value::Object(f.clone()))
            .collect();
        doc.set(as_field, Value::Array(matches));
        result.push(doc);
    }
    Ok(result)
}

// ---------------------------------------------------------------------------
// Pipeline parsing & evaluation
// ---------------------------------------------------------------------------

impl Pipeline {
    /// Parse the standard JSON array-of-stages form:
    /// `[{"$match": …}, {"$group": …}, …]`.
    pub fn parse(pipeline_json: &JsonValue) -> Result<Self> {
        let arr = pipeline_json
            .as_array()
            .ok_or_else(|| Error::InvalidArgument("pipeline must be an array".into()))?;

        let mut stages = Vec::new();
        for stage_val in arr {
            let obj = stage_val.as_object().ok_or_else(|| {
                Error::InvalidArgument("each pipeline stage must be an object".into())
            })?;
            if obj.len() != 1 {
                return Err(Error::InvalidArgument(
                    "each pipeline stage must have exactly one key".into(),
                ));
            }
            let (stage_name, stage_body) = obj.iter().next().unwrap();

            let stage = match stage_name.as_str() {
                "$match" => Stage::Match(query::parse_query(stage_body)?),
                "$group" => parse_group_stage(stage_body)?,
                "$sort" => Stage::Sort(parse_sort(stage_body)?),
                "$skip" => Stage::Skip(parse_bound(stage_body, "$skip")?),
                "$limit" => Stage::Limit(parse_bound(stage_body, "$limit")?),
                "$project" => Stage::Project(parse_project(stage_body)?),
                "$count" => {
                    let field = stage_body.as_str().ok_or_else(|| {
                        Error::InvalidArgument("$count must be a string".into())
                    })?;
                    if field.is_empty() || field.starts_with('$') {
                        return Err(Error::InvalidArgument(
                            "$count field name must be a non-empty string not starting with $"
                                .into(),
                        ));
                    }
                    Stage::Count(field.to_string())
                }
                "$unwind" => {
                    let (path, preserve) = parse_unwind(stage_body)?;
                    Stage::Unwind {
                        path,
                        preserve_empty: preserve,
                    }
                }
                "$addFields" => {
                    let obj = stage_body.as_object().ok_or_else(|| {
                        Error::InvalidArgument("$addFields must be an object".into())
                    })?;
                    let fields: Result<Vec<_>> = obj
                        .iter()
                        .map(|(k, v)| Ok((k.clone(), parse_expression(v)?)))
                        .collect();
                    Stage::AddFields(fields?)
                }
                "$lookup" => parse_lookup(stage_body)?,
                _ => {
                    return Err(Error::InvalidArgument(format!(
                        "unknown stage: {}",
                        stage_name
                    )));
                }
            };
            stages.push(stage);
        }

        Ok(Pipeline { stages })
    }
}

/// Run a pipeline against a collection. The source collection and the
/// catalog are never mutated; each stage builds a new sequence from the
/// prior stage's full output.
pub fn evaluate(
    source: &Collection,
    pipeline: &Pipeline,
    catalog: &Catalog,
) -> Result<Vec<Document>> {
    let mut current: Vec<Document> = source.docs().to_vec();
    for stage in &pipeline.stages {
        current = match stage {
            Stage::Match(query) => exec_match(current, query),
            Stage::Group { key, accumulators } => exec_group(current, key, accumulators),
            Stage::Sort(fields) => exec_sort(current, fields),
            Stage::Skip(n) => exec_skip(current, *n),
            Stage::Limit(n) => exec_limit(current, *n),
            Stage::Project(fields) => exec_project(current, fields),
            Stage::Count(field) => exec_count(current, field),
            Stage::Unwind {
                path,
                preserve_empty,
            } => exec_unwind(current, path, *preserve_empty),
            Stage::AddFields(fields) => exec_add_fields(current, fields),
            Stage::Lookup {
                from,
                local_field,
                foreign_field,
                as_field,
            } => exec_lookup(current, from, local_field, foreign_field, as_field, catalog)?,
        };
    }
    Ok(current)
}

// ===========================================================================
// Tests
// ===========================================================================
