//! Typed access to untyped remote documents
//!
//! Remote resources stay `serde_json::Value` at the boundary. Reads go through
//! these helpers so a missing field (`Ok(None)`) and a field of the wrong shape
//! (`MalformedDocument`) are never confused with a zero value. An explicit
//! `null` reads as missing.

use crate::error::{ProviderError, ProviderResult};
use serde_json::{Map, Value};

/// Walk `path` through nested objects
pub fn nested<'a>(doc: &'a Value, path: &[&str]) -> ProviderResult<Option<&'a Value>> {
    let mut current = doc;
    for (depth, key) in path.iter().enumerate() {
        let object = match current {
            Value::Object(object) => object,
            Value::Null => return Ok(None),
            _ => return Err(ProviderError::malformed(&path[..depth], "an object")),
        };
        match object.get(*key) {
            Some(Value::Null) | None => return Ok(None),
            Some(value) => current = value,
        }
    }
    Ok(Some(current))
}

pub fn nested_i64(doc: &Value, path: &[&str]) -> ProviderResult<Option<i64>> {
    match nested(doc, path)? {
        None => Ok(None),
        Some(value) => value
            .as_i64()
            .map(Some)
            .ok_or_else(|| ProviderError::malformed(path, "an integer")),
    }
}

pub fn nested_str<'a>(doc: &'a Value, path: &[&str]) -> ProviderResult<Option<&'a str>> {
    match nested(doc, path)? {
        None => Ok(None),
        Some(value) => value
            .as_str()
            .map(Some)
            .ok_or_else(|| ProviderError::malformed(path, "a string")),
    }
}

pub fn nested_slice<'a>(doc: &'a Value, path: &[&str]) -> ProviderResult<Option<&'a Vec<Value>>> {
    match nested(doc, path)? {
        None => Ok(None),
        Some(value) => value
            .as_array()
            .map(Some)
            .ok_or_else(|| ProviderError::malformed(path, "a list")),
    }
}

pub fn nested_object<'a>(
    doc: &'a Value,
    path: &[&str],
) -> ProviderResult<Option<&'a Map<String, Value>>> {
    match nested(doc, path)? {
        None => Ok(None),
        Some(value) => value
            .as_object()
            .map(Some)
            .ok_or_else(|| ProviderError::malformed(path, "an object")),
    }
}

/// Set `value` at `path`, creating intermediate objects
pub fn set_nested(doc: &mut Value, value: Value, path: &[&str]) -> ProviderResult<()> {
    let Some((last, parents)) = path.split_last() else {
        *doc = value;
        return Ok(());
    };

    let mut current = doc;
    for (depth, key) in parents.iter().enumerate() {
        if current.is_null() {
            *current = Value::Object(Map::new());
        }
        let object = current
            .as_object_mut()
            .ok_or_else(|| ProviderError::malformed(&path[..depth], "an object"))?;
        current = object
            .entry(key.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }

    if current.is_null() {
        *current = Value::Object(Map::new());
    }
    current
        .as_object_mut()
        .ok_or_else(|| ProviderError::malformed(parents, "an object"))?
        .insert(last.to_string(), value);
    Ok(())
}
