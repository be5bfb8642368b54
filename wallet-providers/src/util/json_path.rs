//! JSON-path handling for presentation definition fields.
//!
//! Only the subset used by presentation definitions is supported: `$`, dot and
//! bracket member access, array indices and the `[*]` wildcard.

use thiserror::Error;

#[derive(Debug, PartialEq, Eq, Error)]
pub enum JsonPathError {
    #[error("Invalid JSON path `{0}`")]
    InvalidPath(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum PathSegment {
    Key(String),
    Index(usize),
    Wildcard,
}

pub fn parse_json_path(path: &str) -> Result<Vec<PathSegment>, JsonPathError> {
    let invalid = || JsonPathError::InvalidPath(path.to_owned());

    let rest = path.strip_prefix('$').ok_or_else(invalid)?;
    let mut chars = rest.chars().peekable();
    let mut segments = vec![];

    while let Some(c) = chars.next() {
        match c {
            '.' => {
                let mut key = String::new();
                while let Some(&next) = chars.peek() {
                    if next == '.' || next == '[' {
                        break;
                    }
                    key.push(next);
                    chars.next();
                }
                match key.as_str() {
                    "" => return Err(invalid()),
                    "*" => segments.push(PathSegment::Wildcard),
                    _ => segments.push(PathSegment::Key(key)),
                }
            }
            '[' => {
                let mut inner = String::new();
                for next in chars.by_ref() {
                    if next == ']' {
                        break;
                    }
                    inner.push(next);
                }
                let inner = inner.trim();
                if inner == "*" {
                    segments.push(PathSegment::Wildcard);
                } else if let Some(quoted) = inner
                    .strip_prefix('\'')
                    .and_then(|s| s.strip_suffix('\''))
                    .or_else(|| inner.strip_prefix('"').and_then(|s| s.strip_suffix('"')))
                {
                    segments.push(PathSegment::Key(quoted.to_owned()));
                } else {
                    let index = inner.parse::<usize>().map_err(|_| invalid())?;
                    segments.push(PathSegment::Index(index));
                }
            }
            _ => return Err(invalid()),
        }
    }

    Ok(segments)
}

/// All values reachable by the path.
pub fn select<'a>(value: &'a serde_json::Value, path: &[PathSegment]) -> Vec<&'a serde_json::Value> {
    let Some((first, rest)) = path.split_first() else {
        return vec![value];
    };

    match (first, value) {
        (PathSegment::Key(key), serde_json::Value::Object(map)) => map
            .get(key)
            .map(|child| select(child, rest))
            .unwrap_or_default(),
        (PathSegment::Index(index), serde_json::Value::Array(items)) => items
            .get(*index)
            .map(|child| select(child, rest))
            .unwrap_or_default(),
        (PathSegment::Wildcard, serde_json::Value::Array(items)) => {
            items.iter().flat_map(|child| select(child, rest)).collect()
        }
        (PathSegment::Wildcard, serde_json::Value::Object(map)) => {
            map.values().flat_map(|child| select(child, rest)).collect()
        }
        _ => vec![],
    }
}

/// Human readable claim name used when listing requested fields, e.g.
/// `$.address.street_address` becomes `address.street_address`.
pub fn get_claim_name_by_json_path(path: &[String]) -> Result<String, JsonPathError> {
    const VC_CREDENTIAL_PREFIX: &str = "$.vc.credentialSubject.";

    let first = path
        .first()
        .ok_or(JsonPathError::InvalidPath("empty path list".to_owned()))?;

    let segments = parse_json_path(first)?;
    let skip = if first.starts_with(VC_CREDENTIAL_PREFIX) { 2 } else { 0 };

    Ok(segments
        .iter()
        .skip(skip)
        .map(|segment| match segment {
            PathSegment::Key(key) => key.to_owned(),
            PathSegment::Index(index) => index.to_string(),
            PathSegment::Wildcard => "*".to_owned(),
        })
        .collect::<Vec<_>>()
        .join("."))
}
