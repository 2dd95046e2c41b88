//! Thin wrapper over the Redis stream commands the dispatcher needs: `XADD`, `XGROUP CREATE`,
//! `XREADGROUP`, `XACK`, and `XAUTOCLAIM`.

use redis::aio::ConnectionManager;
use redis::{FromRedisValue, RedisResult, Value};

use crate::error::CoordinationResult;

/// A single stream entry: its id plus the raw `job` field payload.
#[derive(Debug, Clone)]
pub struct StreamEntry {
    /// Redis stream entry id (e.g. `"1700000000000-0"`).
    pub id: String,
    /// Raw JSON payload stored under the `job` field.
    pub payload: String,
}

fn parse_entries(value: Value) -> RedisResult<Vec<StreamEntry>> {
    let mut entries = Vec::new();
    let Value::Array(streams) = value else {
        return Ok(entries);
    };
    for stream in streams {
        let Value::Array(stream_fields) = stream else {
            continue;
        };
        let Some(Value::Array(records)) = stream_fields.into_iter().nth(1) else {
            continue;
        };
        for record in records {
            let Value::Array(record_fields) = record else {
                continue;
            };
            let mut iter = record_fields.into_iter();
            let Some(id_value) = iter.next() else { continue };
            let id = String::from_redis_value(&id_value)?;
            let Some(Value::Array(kv)) = iter.next() else {
                continue;
            };
            let mut payload = None;
            let mut kv_iter = kv.into_iter();
            while let (Some(field), Some(value)) = (kv_iter.next(), kv_iter.next()) {
                if String::from_redis_value(&field).as_deref() == Ok("job") {
                    payload = Some(String::from_redis_value(&value)?);
                }
            }
            if let Some(payload) = payload {
                entries.push(StreamEntry { id, payload });
            }
        }
    }
    Ok(entries)
}

/// Publish `payload` (already-serialized JSON) to `stream_key`, returning the assigned entry id.
///
/// # Errors
///
/// Returns an error if the Redis command fails.
pub async fn publish(
    redis: &ConnectionManager,
    stream_key: &str,
    payload: &str,
) -> CoordinationResult<String> {
    let mut conn = redis.clone();
    let id: String = redis::cmd("XADD")
        .arg(stream_key)
        .arg("*")
        .arg("job")
        .arg(payload)
        .query_async(&mut conn)
        .await?;
    Ok(id)
}

/// Ensure a consumer group exists on `stream_key`, creating the stream if needed. Ignores the
/// `BUSYGROUP` error Redis returns when the group already exists.
///
/// # Errors
///
/// Returns an error for any Redis failure other than `BUSYGROUP`.
pub async fn ensure_group(
    redis: &ConnectionManager,
    stream_key: &str,
    group: &str,
) -> CoordinationResult<()> {
    let mut conn = redis.clone();
    let result: RedisResult<()> = redis::cmd("XGROUP")
        .arg("CREATE")
        .arg(stream_key)
        .arg(group)
        .arg("$")
        .arg("MKSTREAM")
        .query_async(&mut conn)
        .await;
    match result {
        Ok(()) => Ok(()),
        Err(err) if err.to_string().contains("BUSYGROUP") => Ok(()),
        Err(err) => Err(err.into()),
    }
}

/// Read new (never-delivered) messages for `consumer` within `group`, up to `count` entries.
///
/// # Errors
///
/// Returns an error if the Redis command fails.
pub async fn read_new(
    redis: &ConnectionManager,
    stream_key: &str,
    group: &str,
    consumer: &str,
    count: usize,
) -> CoordinationResult<Vec<StreamEntry>> {
    let mut conn = redis.clone();
    let value: Value = redis::cmd("XREADGROUP")
        .arg("GROUP")
        .arg(group)
        .arg(consumer)
        .arg("COUNT")
        .arg(count)
        .arg("STREAMS")
        .arg(stream_key)
        .arg(">")
        .query_async(&mut conn)
        .await?;
    Ok(parse_entries(value)?)
}

/// Claim pending entries idle for at least `min_idle_ms`, transferring ownership to `consumer`.
///
/// # Errors
///
/// Returns an error if the Redis command fails.
pub async fn autoclaim(
    redis: &ConnectionManager,
    stream_key: &str,
    group: &str,
    consumer: &str,
    min_idle_ms: u64,
    count: usize,
) -> CoordinationResult<Vec<StreamEntry>> {
    let mut conn = redis.clone();
    let value: Value = redis::cmd("XAUTOCLAIM")
        .arg(stream_key)
        .arg(group)
        .arg(consumer)
        .arg(min_idle_ms)
        .arg("0-0")
        .arg("COUNT")
        .arg(count)
        .query_async(&mut conn)
        .await?;
    let Value::Array(parts) = value else {
        return Ok(Vec::new());
    };
    let Some(claimed) = parts.into_iter().nth(1) else {
        return Ok(Vec::new());
    };
    let Value::Array(records) = claimed else {
        return Ok(Vec::new());
    };
    let mut entries = Vec::new();
    for record in records {
        let Value::Array(record_fields) = record else {
            continue;
        };
        let mut iter = record_fields.into_iter();
        let Some(id_value) = iter.next() else { continue };
        let id = String::from_redis_value(&id_value)?;
        let Some(Value::Array(kv)) = iter.next() else {
            continue;
        };
        let mut payload = None;
        let mut kv_iter = kv.into_iter();
        while let (Some(field), Some(value)) = (kv_iter.next(), kv_iter.next()) {
            if String::from_redis_value(&field).as_deref() == Ok("job") {
                payload = Some(String::from_redis_value(&value)?);
            }
        }
        if let Some(payload) = payload {
            entries.push(StreamEntry { id, payload });
        }
    }
    Ok(entries)
}

/// Acknowledge a processed entry, removing it from the group's pending entries list.
///
/// # Errors
///
/// Returns an error if the Redis command fails.
pub async fn ack(
    redis: &ConnectionManager,
    stream_key: &str,
    group: &str,
    entry_id: &str,
) -> CoordinationResult<()> {
    let mut conn = redis.clone();
    let _: i64 = redis::cmd("XACK")
        .arg(stream_key)
        .arg(group)
        .arg(entry_id)
        .query_async(&mut conn)
        .await?;
    Ok(())
}
