//! Combining per-chunk answers into one result.
//!
//! The merge strategy is picked from the shape of the first chunk that
//! parsed:
//!
//! - **Score** (`{"score": n}` or a bare number): `round(mean)` of every
//!   chunk's score.
//! - **Skills gap** (`matchedSkills` / `missingSkills`): score as above,
//!   skill lists unioned in first-seen order, non-empty `feedback` strings
//!   joined with a single space.
//! - **Analysis** (anything else): merged field by field. Numbers are
//!   averaged, arrays unioned, strings concatenated, objects merged
//!   recursively. A field present in one chunk only is carried through.
//!
//! A chunk whose text is not JSON is given a second chance: the first
//! balanced `{...}` in it is parsed instead. If that fails too the chunk
//! is marked `MalformedResponse` and left out.

use serde_json::{Map, Number, Value};
use tracing::warn;

use crate::types::{AnalysisResult, ChunkResult, ResultShape};
use crate::{MimirError, Result};

const SCORE: &str = "score";
const MATCHED_SKILLS: &str = "matchedSkills";
const MISSING_SKILLS: &str = "missingSkills";
const FEEDBACK: &str = "feedback";

/// Parse the JSON payload of a model answer.
///
/// Accepts an object or a number. Falls back to the first balanced
/// `{...}` substring that parses, which covers prose or code fences
/// around the payload.
pub fn extract_json(raw: &str) -> Option<Value> {
    if let Ok(value) = serde_json::from_str::<Value>(raw.trim())
        && (value.is_object() || value.is_number())
    {
        return Some(value);
    }

    let mut from = 0;
    while let Some(offset) = raw[from..].find('{') {
        let start = from + offset;
        if let Some(len) = balanced_object_len(&raw[start..])
            && let Ok(value @ Value::Object(_)) = serde_json::from_str(&raw[start..start + len])
        {
            return Some(value);
        }
        from = start + 1;
    }
    None
}

/// Length of the `{...}` at the start of `s`, honouring string literals
/// and escapes. `None` if it never closes.
fn balanced_object_len(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in s.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

/// Classify a parsed answer.
pub fn detect_shape(value: &Value) -> ResultShape {
    match value {
        Value::Number(_) => ResultShape::Score,
        Value::Object(map) if map.contains_key(MATCHED_SKILLS) || map.contains_key(MISSING_SKILLS) => {
            ResultShape::SkillsGap
        }
        Value::Object(map) if map.len() == 1 && map.get(SCORE).is_some_and(Value::is_number) => {
            ResultShape::Score
        }
        _ => ResultShape::Analysis,
    }
}

/// Merge parsed answers with the strategy for `shape`.
///
/// `values` must be non-empty and in chunk order.
pub fn merge_values(shape: ResultShape, values: &[Value]) -> Value {
    match shape {
        ResultShape::Score => {
            let mut out = Map::new();
            if let Some(score) = merged_score(values) {
                out.insert(SCORE.into(), score);
            }
            Value::Object(out)
        }
        ResultShape::SkillsGap => merge_skills_gap(values),
        ResultShape::Analysis => merge_generic(values.iter()),
    }
}

/// Parse every successful chunk and merge the ones that parsed.
///
/// Fails with `AllChunksFailed` when no chunk produced a usable answer.
pub fn merge_results(mut results: Vec<ChunkResult>) -> Result<AnalysisResult> {
    for result in results.iter_mut().filter(|r| r.is_success()) {
        match extract_json(&result.raw_text) {
            Some(value) => result.parsed = Some(value),
            None => {
                warn!(chunk = result.chunk_index, "chunk answer is not JSON, dropping it");
                result.error = Some(MimirError::MalformedResponse(format!(
                    "chunk {} returned no JSON payload",
                    result.chunk_index
                )));
            }
        }
    }
    results.sort_by_key(|r| r.chunk_index);

    let chunks = results.len();
    let mut values = Vec::new();
    let mut models = Vec::new();
    let mut failed_chunks = Vec::new();
    let mut last_error = None;
    for result in results {
        match (result.parsed, result.error) {
            (Some(value), None) => {
                values.push(value);
                models.extend(result.model);
            }
            (_, error) => {
                failed_chunks.push(result.chunk_index);
                last_error = error.map(|e| e.to_string()).or(last_error);
            }
        }
    }

    let Some(first) = values.first() else {
        return Err(MimirError::AllChunksFailed {
            chunks,
            last_error: last_error.unwrap_or_else(|| "no chunks to execute".into()),
        });
    };

    let shape = detect_shape(first);
    Ok(AnalysisResult {
        value: merge_values(shape, &values),
        shape,
        chunks,
        failed_chunks,
        models,
    })
}

/// `round(mean)` over every score found, as an integer.
fn merged_score(values: &[Value]) -> Option<Value> {
    let scores: Vec<f64> = values
        .iter()
        .filter_map(|v| match v {
            Value::Number(n) => n.as_f64(),
            other => other.get(SCORE).and_then(Value::as_f64),
        })
        .collect();
    if scores.is_empty() {
        return None;
    }
    let mean = scores.iter().sum::<f64>() / scores.len() as f64;
    Some(Value::from(mean.round() as i64))
}

fn merge_skills_gap(values: &[Value]) -> Value {
    let mut out = match merge_generic(values.iter()) {
        Value::Object(map) => map,
        _ => Map::new(),
    };

    if let Some(score) = merged_score(values) {
        out.insert(SCORE.into(), score);
    }
    for key in [MATCHED_SKILLS, MISSING_SKILLS] {
        out.insert(key.into(), union(values.iter().filter_map(|v| v.get(key))));
    }

    let feedback: Vec<&str> = values
        .iter()
        .filter_map(|v| v.get(FEEDBACK).and_then(Value::as_str))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    if !feedback.is_empty() {
        out.insert(FEEDBACK.into(), Value::String(feedback.join(" ")));
    }
    Value::Object(out)
}

/// Merge values of one field by their common type.
///
/// Nulls are ignored. Values of mixed types keep the first one.
fn merge_generic<'a>(values: impl Iterator<Item = &'a Value>) -> Value {
    let values: Vec<&Value> = values.filter(|v| !v.is_null()).collect();
    match values.as_slice() {
        [] => Value::Null,
        [only] => (*only).clone(),
        [first, ..] => match first {
            Value::Number(_) if values.iter().all(|v| v.is_number()) => mean(&values),
            Value::Array(_) if values.iter().all(|v| v.is_array()) => union(values.iter().copied()),
            Value::String(_) if values.iter().all(|v| v.is_string()) => concat(&values),
            Value::Object(_) if values.iter().all(|v| v.is_object()) => merge_objects(&values),
            _ => (*first).clone(),
        },
    }
}

/// Mean of numbers. Integer-only input is rounded to an integer.
fn mean(values: &[&Value]) -> Value {
    let all_integers = values.iter().all(|v| v.is_i64() || v.is_u64());
    let nums: Vec<f64> = values.iter().filter_map(|v| v.as_f64()).collect();
    let mean = nums.iter().sum::<f64>() / nums.len() as f64;
    if all_integers {
        Value::from(mean.round() as i64)
    } else {
        Number::from_f64(mean).map_or(Value::Null, Value::Number)
    }
}

/// Union of arrays, keeping the first occurrence of each element.
fn union<'a>(arrays: impl Iterator<Item = &'a Value>) -> Value {
    let mut out: Vec<Value> = Vec::new();
    for item in arrays.filter_map(Value::as_array).flatten() {
        if !out.contains(item) {
            out.push(item.clone());
        }
    }
    Value::Array(out)
}

/// Non-empty strings joined with a space. Repeats of an earlier string
/// are skipped.
fn concat(values: &[&Value]) -> Value {
    let mut parts: Vec<&str> = Vec::new();
    for s in values.iter().filter_map(|v| v.as_str()).map(str::trim) {
        if !s.is_empty() && !parts.contains(&s) {
            parts.push(s);
        }
    }
    Value::String(parts.join(" "))
}

fn merge_objects(values: &[&Value]) -> Value {
    let mut keys: Vec<&String> = Vec::new();
    for map in values.iter().filter_map(|v| v.as_object()) {
        for key in map.keys() {
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
    }

    let mut out = Map::new();
    for key in keys {
        let merged = merge_generic(values.iter().filter_map(|v| v.get(key.as_str())));
        out.insert(key.clone(), merged);
    }
    Value::Object(out)
}
