//! # Typed Request Builders
//!
//! One builder per wire command the client issues. Each returns a `Request`
//! whose arguments are already rendered to bytes, so the transport only
//! frames and writes.

use std::fmt;
use std::str::FromStr;

use crate::error::{ClientError, ClientResult};

/// A single wire command: name plus ordered byte arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Command name, e.g. `GET`.
    pub name: &'static str,
    /// Arguments after the name, in wire order.
    pub args: Vec<Vec<u8>>,
}

impl Request {
    fn new(name: &'static str) -> Self {
        Request {
            name,
            args: Vec::new(),
        }
    }

    fn arg(mut self, value: impl AsRef<[u8]>) -> Self {
        self.args.push(value.as_ref().to_vec());
        self
    }

    fn int(self, value: i64) -> Self {
        self.arg(value.to_string())
    }

    fn args<S: AsRef<str>>(mut self, values: &[S]) -> Self {
        for value in values {
            let value: &str = value.as_ref();
            self.args.push(value.as_bytes().to_vec());
        }
        self
    }
}

/// Endpoint of a score range, rendered as the backend's range token.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScoreBound {
    /// `-inf`
    NegInf,
    /// `+inf`
    PosInf,
    /// `<score>`, included in the range.
    Inclusive(f64),
    /// `(<score>`, excluded from the range.
    Exclusive(f64),
}

impl ScoreBound {
    /// Renders the bound, rejecting NaN and infinite scores.
    pub fn token(&self) -> ClientResult<String> {
        match *self {
            ScoreBound::NegInf => Ok("-inf".to_string()),
            ScoreBound::PosInf => Ok("+inf".to_string()),
            ScoreBound::Inclusive(score) => Ok(finite(score, "score bound")?.to_string()),
            ScoreBound::Exclusive(score) => Ok(format!("({}", finite(score, "score bound")?)),
        }
    }
}

impl From<f64> for ScoreBound {
    fn from(score: f64) -> Self {
        if score == f64::NEG_INFINITY {
            ScoreBound::NegInf
        } else if score == f64::INFINITY {
            ScoreBound::PosInf
        } else {
            ScoreBound::Inclusive(score)
        }
    }
}

impl FromStr for ScoreBound {
    type Err = ClientError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        let invalid = || ClientError::InvalidArgument(format!("invalid score bound: {:?}", token));
        match token.to_ascii_lowercase().as_str() {
            "-inf" => return Ok(ScoreBound::NegInf),
            "+inf" | "inf" => return Ok(ScoreBound::PosInf),
            _ => {}
        }
        let (exclusive, number) = match token.strip_prefix('(') {
            Some(rest) => (true, rest),
            None => (false, token),
        };
        let score: f64 = number.parse().map_err(|_| invalid())?;
        if !score.is_finite() {
            return Err(invalid());
        }
        Ok(if exclusive {
            ScoreBound::Exclusive(score)
        } else {
            ScoreBound::Inclusive(score)
        })
    }
}

impl fmt::Display for ScoreBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScoreBound::NegInf => write!(f, "-inf"),
            ScoreBound::PosInf => write!(f, "+inf"),
            ScoreBound::Inclusive(score) => write!(f, "{}", score),
            ScoreBound::Exclusive(score) => write!(f, "({}", score),
        }
    }
}

fn finite(value: f64, what: &str) -> ClientResult<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ClientError::InvalidArgument(format!("{} must be finite, got {}", what, value)))
    }
}

/// `GET key`.
pub fn get(key: &str) -> Request {
    Request::new("GET").arg(key)
}

/// `SET key value`.
pub fn set(key: &str, value: &str) -> Request {
    Request::new("SET").arg(key).arg(value)
}

/// `SETEX key seconds value`.
pub fn setex(key: &str, seconds: i64, value: &str) -> Request {
    Request::new("SETEX").arg(key).int(seconds).arg(value)
}

/// `DEL key`.
pub fn del(key: &str) -> Request {
    Request::new("DEL").arg(key)
}

/// `RENAME key newkey`.
pub fn rename(key: &str, new_key: &str) -> Request {
    Request::new("RENAME").arg(key).arg(new_key)
}

/// `EXPIRE key seconds`.
pub fn expire(key: &str, seconds: i64) -> Request {
    Request::new("EXPIRE").arg(key).int(seconds)
}

/// `EXISTS key`.
pub fn exists(key: &str) -> Request {
    Request::new("EXISTS").arg(key)
}

/// `HGET key field`.
pub fn hget(key: &str, field: &str) -> Request {
    Request::new("HGET").arg(key).arg(field)
}

/// `HGETALL key`.
pub fn hgetall(key: &str) -> Request {
    Request::new("HGETALL").arg(key)
}

/// `HLEN key`.
pub fn hlen(key: &str) -> Request {
    Request::new("HLEN").arg(key)
}

/// `HSET key field value`.
pub fn hset(key: &str, field: &str, value: &str) -> Request {
    Request::new("HSET").arg(key).arg(field).arg(value)
}

/// `HMGET key field [field ...]`.
pub fn hmget<S: AsRef<str>>(key: &str, fields: &[S]) -> Request {
    Request::new("HMGET").arg(key).args(fields)
}

/// `HMSET key field value [field value ...]`.
pub fn hmset<K: AsRef<str>, V: AsRef<str>>(key: &str, pairs: &[(K, V)]) -> Request {
    pairs
        .iter()
        .fold(Request::new("HMSET").arg(key), |request, (field, value)| {
            let (field, value): (&str, &str) = (field.as_ref(), value.as_ref());
            request.arg(field).arg(value)
        })
}

/// `HDEL key field [field ...]`.
pub fn hdel<S: AsRef<str>>(key: &str, fields: &[S]) -> Request {
    Request::new("HDEL").arg(key).args(fields)
}

/// `ZADD key score member [score member ...]`.
pub fn zadd<S: AsRef<str>>(key: &str, pairs: &[(S, f64)]) -> ClientResult<Request> {
    let mut request = Request::new("ZADD").arg(key);
    for (member, score) in pairs {
        let member: &str = member.as_ref();
        request = request.arg(finite(*score, "score")?.to_string()).arg(member);
    }
    Ok(request)
}

/// `ZSCORE key member`.
pub fn zscore(key: &str, member: &str) -> Request {
    Request::new("ZSCORE").arg(key).arg(member)
}

/// `ZINCRBY key increment member`; rejects a non-finite increment.
pub fn zincrby(key: &str, delta: f64, member: &str) -> ClientResult<Request> {
    Ok(Request::new("ZINCRBY")
        .arg(key)
        .arg(finite(delta, "increment")?.to_string())
        .arg(member))
}

/// `ZREM key member [member ...]`.
pub fn zrem<S: AsRef<str>>(key: &str, members: &[S]) -> Request {
    Request::new("ZREM").arg(key).args(members)
}

/// `ZCOUNT key min max`.
pub fn zcount(key: &str, min: ScoreBound, max: ScoreBound) -> ClientResult<Request> {
    Ok(Request::new("ZCOUNT").arg(key).arg(min.token()?).arg(max.token()?))
}

/// `ZRANGE key start stop [WITHSCORES]`.
pub fn zrange(key: &str, start: i64, stop: i64, with_scores: bool) -> Request {
    with_scores_flag(Request::new("ZRANGE").arg(key).int(start).int(stop), with_scores)
}

/// `ZREVRANGE key start stop [WITHSCORES]`.
pub fn zrevrange(key: &str, start: i64, stop: i64, with_scores: bool) -> Request {
    with_scores_flag(Request::new("ZREVRANGE").arg(key).int(start).int(stop), with_scores)
}

/// `ZRANGEBYSCORE key min max`.
pub fn zrangebyscore(key: &str, min: ScoreBound, max: ScoreBound) -> ClientResult<Request> {
    Ok(Request::new("ZRANGEBYSCORE").arg(key).arg(min.token()?).arg(max.token()?))
}

/// Note the argument order: `max` comes before `min`.
pub fn zrevrangebyscore(key: &str, max: ScoreBound, min: ScoreBound) -> ClientResult<Request> {
    Ok(Request::new("ZREVRANGEBYSCORE").arg(key).arg(max.token()?).arg(min.token()?))
}

fn with_scores_flag(request: Request, with_scores: bool) -> Request {
    if with_scores {
        request.arg("WITHSCORES")
    } else {
        request
    }
}

/// `SADD key member [member ...]`.
pub fn sadd<S: AsRef<str>>(key: &str, members: &[S]) -> Request {
    Request::new("SADD").arg(key).args(members)
}

/// `SMEMBERS key`.
pub fn smembers(key: &str) -> Request {
    Request::new("SMEMBERS").arg(key)
}

/// `RPUSH key member [member ...]`.
pub fn rpush<S: AsRef<str>>(key: &str, members: &[S]) -> Request {
    Request::new("RPUSH").arg(key).args(members)
}

/// `LPUSH key member [member ...]`.
pub fn lpush<S: AsRef<str>>(key: &str, members: &[S]) -> Request {
    Request::new("LPUSH").arg(key).args(members)
}

/// `LREM key count value`.
pub fn lrem(key: &str, count: i64, value: &str) -> Request {
    Request::new("LREM").arg(key).int(count).arg(value)
}

/// `LTRIM key start stop`.
pub fn ltrim(key: &str, start: i64, stop: i64) -> Request {
    Request::new("LTRIM").arg(key).int(start).int(stop)
}

/// `LRANGE key start stop`.
pub fn lrange(key: &str, start: i64, stop: i64) -> Request {
    Request::new("LRANGE").arg(key).int(start).int(stop)
}

/// Operation kinds, used as the `type:` latency tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    Get,
    Set,
    Delete,
    Rename,
    Expire,
    Exists,
    HGet,
    HGetAll,
    HLen,
    HSet,
    HMGet,
    HMSet,
    HDel,
    ZAdd,
    ZScore,
    ZIncrBy,
    ZRem,
    ZCount,
    ZRange,
    ZRevRange,
    ZRangeByScore,
    ZRevRangeByScore,
    ZRangeWithScores,
    ZRevRangeWithScores,
    SAdd,
    SMembers,
    RPush,
    LPush,
    LRem,
    LTrim,
    LRange,
}

impl OpKind {
    /// Tag value used in `type:<op>`.
    pub fn as_str(&self) -> &'static str {
        match self {
            OpKind::Get => "get",
            OpKind::Set => "set",
            OpKind::Delete => "delete",
            OpKind::Rename => "rename",
            OpKind::Expire => "expire",
            OpKind::Exists => "exists",
            OpKind::HGet => "hget",
            OpKind::HGetAll => "hgetall",
            OpKind::HLen => "hlen",
            OpKind::HSet => "hset",
            OpKind::HMGet => "hmget",
            OpKind::HMSet => "hmset",
            OpKind::HDel => "hdel",
            OpKind::ZAdd => "zadd",
            OpKind::ZScore => "zscore",
            OpKind::ZIncrBy => "zincrby",
            OpKind::ZRem => "zrem",
            OpKind::ZCount => "zcount",
            OpKind::ZRange => "zrange",
            OpKind::ZRevRange => "zrevrange",
            OpKind::ZRangeByScore => "zrangebyscore",
            OpKind::ZRevRangeByScore => "zrevrangebyscore",
            OpKind::ZRangeWithScores => "zrange_withscores",
            OpKind::ZRevRangeWithScores => "zrevrange_withscores",
            OpKind::SAdd => "sadd",
            OpKind::SMembers => "smembers",
            OpKind::RPush => "rpush",
            OpKind::LPush => "lpush",
            OpKind::LRem => "lrem",
            OpKind::LTrim => "ltrim",
            OpKind::LRange => "lrange",
        }
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
