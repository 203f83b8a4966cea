//! # Reply Normalization
//!
//! Stateless mapping from `Reply` shapes to the semantic result of each
//! command family. Strict decoders report a nil reply as `ClientError::Nil`;
//! read operations that treat absence as a zero value wrap them with
//! [`absent_as`].

use std::collections::{HashMap, HashSet};

use tracing::warn;

use crate::error::{ClientError, ClientResult};
use crate::resp::Reply;

/// Member-to-score mapping decoded from an interleaved `WITHSCORES` reply.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoredMembers {
    /// Member to score.
    pub scores: HashMap<String, f64>,
    /// Score tokens that failed to parse and were left out of `scores`.
    pub skipped: usize,
}

/// Maps a nil reply to `default`; every other outcome passes through.
pub fn absent_as<T>(result: ClientResult<T>, default: T) -> ClientResult<T> {
    match result {
        Err(ClientError::Nil) => Ok(default),
        other => other,
    }
}

/// Accepts any reply; used by commands whose reply carries nothing the caller needs.
pub fn discard(_reply: Reply) -> ClientResult<()> {
    Ok(())
}

/// Bulk or status reply as a string.
pub fn string(reply: Reply) -> ClientResult<String> {
    match reply {
        Reply::Bulk(data) => Ok(into_string(data)),
        Reply::Status(text) => Ok(text),
        Reply::Nil => Err(ClientError::Nil),
        _ => Err(ClientError::UnexpectedResponse("expected bulk string")),
    }
}

/// Bulk string, or the empty string when the backend has no value.
pub fn string_or_empty(reply: Reply) -> ClientResult<String> {
    absent_as(string(reply), String::new())
}

/// Integer reply; numeric bulk strings are accepted too.
pub fn integer(reply: Reply) -> ClientResult<i64> {
    match reply {
        Reply::Integer(value) => Ok(value),
        Reply::Bulk(data) => std::str::from_utf8(&data)
            .ok()
            .and_then(|text| text.parse().ok())
            .ok_or(ClientError::UnexpectedResponse("expected integer")),
        Reply::Nil => Err(ClientError::Nil),
        _ => Err(ClientError::UnexpectedResponse("expected integer")),
    }
}

/// Non-negative integer reply.
pub fn count(reply: Reply) -> ClientResult<u64> {
    let value = integer(reply)?;
    u64::try_from(value).map_err(|_| ClientError::UnexpectedResponse("negative count"))
}

/// True iff the integer reply is strictly positive.
pub fn boolean(reply: Reply) -> ClientResult<bool> {
    Ok(integer(reply)? > 0)
}

/// Floating point reply, parsed as 64-bit.
pub fn float(reply: Reply) -> ClientResult<f64> {
    match reply {
        Reply::Bulk(data) => parse_score(&data).ok_or(ClientError::UnexpectedResponse("expected float")),
        Reply::Status(text) => parse_score(text.as_bytes()).ok_or(ClientError::UnexpectedResponse("expected float")),
        Reply::Integer(value) => Ok(value as f64),
        Reply::Nil => Err(ClientError::Nil),
        Reply::Array(_) => Err(ClientError::UnexpectedResponse("expected float")),
    }
}

/// Array reply as an ordered sequence; nil elements become empty strings.
pub fn strings(reply: Reply) -> ClientResult<Vec<String>> {
    array(reply)?
        .into_iter()
        .map(|item| Ok(element(item)?.unwrap_or_default()))
        .collect()
}

/// Array reply as an unordered set.
pub fn string_set(reply: Reply) -> ClientResult<HashSet<String>> {
    Ok(strings(reply)?.into_iter().collect())
}

/// Flat `[field, value, field, value, ...]` array as a mapping.
pub fn string_map(reply: Reply) -> ClientResult<HashMap<String, String>> {
    let items = array(reply)?;
    if items.len() % 2 != 0 {
        return Err(ClientError::UnexpectedResponse("expected even number of elements"));
    }
    let mut map = HashMap::with_capacity(items.len() / 2);
    let mut iter = items.into_iter();
    while let (Some(field), Some(value)) = (iter.next(), iter.next()) {
        map.insert(element(field)?.unwrap_or_default(), element(value)?.unwrap_or_default());
    }
    Ok(map)
}

/// Positional values for `fields`, keeping only those present in the reply.
///
/// Entries beyond the reply's length and nil elements produce no key.
pub fn fields_map<S: AsRef<str>>(fields: &[S], reply: Reply) -> ClientResult<HashMap<String, String>> {
    let items = array(reply)?;
    let mut map = HashMap::with_capacity(items.len().min(fields.len()));
    for (field, item) in fields.iter().zip(items) {
        if let Some(value) = element(item)? {
            let field: &str = field.as_ref();
            map.insert(field.to_string(), value);
        }
    }
    Ok(map)
}

/// Interleaved `[member, score, member, score, ...]` array as a score mapping.
///
/// Unparsable score tokens are logged and skipped; a trailing member without
/// a score is ignored.
pub fn scored_members(key: &str, reply: Reply) -> ClientResult<ScoredMembers> {
    let items = array(reply)?;
    let mut result = ScoredMembers {
        scores: HashMap::with_capacity(items.len() / 2),
        skipped: 0,
    };
    let mut iter = items.into_iter();
    while let (Some(member), Some(score)) = (iter.next(), iter.next()) {
        let member = element(member)?.unwrap_or_default();
        let token = element(score)?.unwrap_or_default();
        match parse_score(token.as_bytes()) {
            Some(score) => {
                result.scores.insert(member, score);
            }
            None => {
                warn!(key, member = %member, token = %token, "skipping unparsable score");
                result.skipped += 1;
            }
        }
    }
    Ok(result)
}

fn array(reply: Reply) -> ClientResult<Vec<Reply>> {
    match reply {
        Reply::Array(items) => Ok(items),
        Reply::Nil => Err(ClientError::Nil),
        _ => Err(ClientError::UnexpectedResponse("expected array")),
    }
}

fn element(reply: Reply) -> ClientResult<Option<String>> {
    match reply {
        Reply::Bulk(data) => Ok(Some(into_string(data))),
        Reply::Status(text) => Ok(Some(text)),
        Reply::Nil => Ok(None),
        _ => Err(ClientError::UnexpectedResponse("expected string element")),
    }
}

fn into_string(data: Vec<u8>) -> String {
    String::from_utf8(data).unwrap_or_else(|err| String::from_utf8_lossy(err.as_bytes()).into_owned())
}

/// Parses a score token; the backend spells infinities `inf`/`-inf`.
fn parse_score(data: &[u8]) -> Option<f64> {
    let text = std::str::from_utf8(data).ok()?;
    let score: f64 = text.trim().parse().ok()?;
    if score.is_nan() {
        return None;
    }
    Some(score)
}
