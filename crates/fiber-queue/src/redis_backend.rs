//! Redis-backed implementation. Queue/DLQ are Redis lists; idempotency and
//! rate-limit state are Redis hashes/strings with TTLs. The atomic
//! multi-pop and the token-bucket RMW both run as Lua scripts — the
//! "shared-state backend with a scripting primitive" the spec's Design Notes
//! call for (§9), the same atomicity story `tower-resilience-core`'s error
//! module motivates for composing layers without races.

use crate::backend::{IdempotencyOutcome, IdempotencyStore, QueueBackend, RateLimitBackend};
use async_trait::async_trait;
use fiber_core::{generate_trace_id, AdminCommand, Decision, FiberError, FiberResult, PoppedBatch, QueueItem, TokenBucket};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};
use std::time::Duration;

const QUEUE_KEY: &str = "fiber:etl:queue";
const DLQ_KEY: &str = "fiber:etl:dlq";
const ADMIN_KEY: &str = "fiber:etl:admin";
const IDEMPOTENCY_PREFIX: &str = "fiber:batch:";
const RATE_LIMIT_PREFIX: &str = "fiber:rl:";
/// Hash of `token -> JSON array of popped items`, the in-flight set a
/// crashed popper leaves behind (spec §8 I-At-Least-Once).
const PROCESSING_HASH_KEY: &str = "fiber:etl:processing";
/// Sorted set of `token -> pop unix timestamp`, scanned by `reap_stale`.
const PROCESSING_INDEX_KEY: &str = "fiber:etl:processing:index";

/// Pops up to `ARGV[1]` elements from the head of `KEYS[1]`, and — if
/// anything was popped — records them under `KEYS[2]`/`KEYS[3]` keyed by the
/// caller-supplied token `ARGV[2]` so a crash before `ack_batch` leaves them
/// recoverable via `reap_stale` instead of silently dropped.
const POP_BATCH_SCRIPT: &str = r#"
local items = {}
for _ = 1, tonumber(ARGV[1]) do
    local v = redis.call('LPOP', KEYS[1])
    if not v then break end
    table.insert(items, v)
end
if #items > 0 then
    redis.call('HSET', KEYS[2], ARGV[2], cjson.encode(items))
    redis.call('ZADD', KEYS[3], ARGV[3], ARGV[2])
end
return items
"#;

/// Clears a token's in-flight entry once its batch has been durably handled.
const ACK_BATCH_SCRIPT: &str = r#"
redis.call('HDEL', KEYS[1], ARGV[1])
redis.call('ZREM', KEYS[2], ARGV[1])
return 1
"#;

/// Moves every in-flight batch popped before `ARGV[1]` back onto the head of
/// the queue and clears its in-flight entry, returning the total item count
/// requeued.
const REAP_STALE_SCRIPT: &str = r#"
local stale = redis.call('ZRANGEBYSCORE', KEYS[2], 0, ARGV[1])
local count = 0
for _, token in ipairs(stale) do
    local payload = redis.call('HGET', KEYS[3], token)
    if payload then
        local items = cjson.decode(payload)
        for i = #items, 1, -1 do
            redis.call('LPUSH', KEYS[1], items[i])
        end
        count = count + #items
    end
    redis.call('HDEL', KEYS[3], token)
    redis.call('ZREM', KEYS[2], token)
end
return count
"#;

/// `SET key value NX EX ttl`, returning the previously-set value on a miss-turned-hit.
const IDEMPOTENCY_SCRIPT: &str = r#"
local existing = redis.call('GET', KEYS[1])
if existing then
    return existing
end
redis.call('SET', KEYS[1], ARGV[1], 'EX', ARGV[2])
return false
"#;

/// Token-bucket RMW (spec §4.5 algorithm, steps 1-5) as a single script so the
/// read-modify-write is one atomic critical section regardless of how many
/// gateway instances call it concurrently.
const TOKEN_BUCKET_SCRIPT: &str = r#"
local tokens_key = KEYS[1]
local capacity = tonumber(ARGV[1])
local rate = tonumber(ARGV[2])
local requested = tonumber(ARGV[3])
local now = tonumber(ARGV[4])
local ttl = tonumber(ARGV[5])

local raw = redis.call('HMGET', tokens_key, 'tokens', 'last_refill')
local tokens = tonumber(raw[1])
local last_refill = tonumber(raw[2])
if tokens == nil then
    tokens = capacity
    last_refill = now
end

local elapsed = math.max(0, now - last_refill)
local refill = elapsed * rate
tokens = math.min(capacity, tokens + refill)

local allowed = 0
local retry_after = -1
if tokens >= requested then
    tokens = tokens - requested
    allowed = 1
elseif rate > 0 then
    retry_after = (requested - tokens) / rate
end

redis.call('HMSET', tokens_key, 'tokens', tostring(tokens), 'last_refill', tostring(now))
redis.call('EXPIRE', tokens_key, ttl)

return {allowed, tostring(tokens), tostring(retry_after)}
"#;

pub struct RedisQueue {
    conn: ConnectionManager,
}

impl RedisQueue {
    pub async fn connect(url: &str) -> FiberResult<Self> {
        let client = redis::Client::open(url).map_err(|e| FiberError::transient("redis", e))?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|e| FiberError::transient("redis", e))?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl QueueBackend for RedisQueue {
    async fn enqueue(&self, items: Vec<QueueItem>) -> FiberResult<()> {
        if items.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.clone();
        let payloads: Vec<String> = items
            .iter()
            .map(|i| serde_json::to_string(i).expect("QueueItem serializes"))
            .collect();
        conn.rpush::<_, _, ()>(QUEUE_KEY, payloads)
            .await
            .map_err(|e| FiberError::transient("redis-enqueue", e))
    }

    async fn pop_batch(&self, max: usize, timeout: Duration) -> FiberResult<PoppedBatch> {
        let mut conn = self.conn.clone();
        let script = Script::new(POP_BATCH_SCRIPT);
        // A single script invocation services one `batch_pop_timeout` window
        // worth of work; callers loop with their own idle-backoff sleep
        // between empty results (spec §4.4 step 1 / §5 batch_pop_timeout).
        let _ = timeout;
        let token = generate_trace_id();
        let now = chrono::Utc::now().timestamp();
        let raw: Vec<String> = script
            .key(QUEUE_KEY)
            .key(PROCESSING_HASH_KEY)
            .key(PROCESSING_INDEX_KEY)
            .arg(max)
            .arg(&token)
            .arg(now)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| FiberError::transient("redis-pop", e))?;

        if raw.is_empty() {
            return Ok(PoppedBatch::default());
        }
        let items = raw
            .into_iter()
            .map(|s| serde_json::from_str(&s).map_err(|e| FiberError::MalformedInput(e.to_string())))
            .collect::<FiberResult<Vec<QueueItem>>>()?;
        Ok(PoppedBatch { token, items })
    }

    async fn ack_batch(&self, token: &str) -> FiberResult<()> {
        let mut conn = self.conn.clone();
        let script = Script::new(ACK_BATCH_SCRIPT);
        let _: i64 = script
            .key(PROCESSING_HASH_KEY)
            .key(PROCESSING_INDEX_KEY)
            .arg(token)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| FiberError::transient("redis-ack", e))?;
        Ok(())
    }

    async fn reap_stale(&self, visibility_timeout: Duration) -> FiberResult<u64> {
        let mut conn = self.conn.clone();
        let cutoff = chrono::Utc::now().timestamp() - visibility_timeout.as_secs() as i64;
        let script = Script::new(REAP_STALE_SCRIPT);
        let requeued: u64 = script
            .key(QUEUE_KEY)
            .key(PROCESSING_INDEX_KEY)
            .key(PROCESSING_HASH_KEY)
            .arg(cutoff)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| FiberError::transient("redis-reap", e))?;
        Ok(requeued)
    }

    async fn push_dlq(&self, items: Vec<QueueItem>) -> FiberResult<()> {
        if items.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.clone();
        let payloads: Vec<String> = items
            .iter()
            .map(|i| serde_json::to_string(i).expect("QueueItem serializes"))
            .collect();
        conn.rpush::<_, _, ()>(DLQ_KEY, payloads)
            .await
            .map_err(|e| FiberError::transient("redis-dlq", e))
    }

    async fn queue_len(&self) -> FiberResult<u64> {
        let mut conn = self.conn.clone();
        conn.llen(QUEUE_KEY).await.map_err(|e| FiberError::transient("redis-len", e))
    }

    async fn dlq_len(&self) -> FiberResult<u64> {
        let mut conn = self.conn.clone();
        conn.llen(DLQ_KEY).await.map_err(|e| FiberError::transient("redis-len", e))
    }

    async fn enqueue_admin(&self, cmd: AdminCommand) -> FiberResult<()> {
        let mut conn = self.conn.clone();
        let payload = serde_json::to_string(&cmd).expect("AdminCommand serializes");
        conn.rpush::<_, _, ()>(ADMIN_KEY, payload)
            .await
            .map_err(|e| FiberError::transient("redis-admin", e))
    }

    async fn pop_admin(&self) -> FiberResult<Option<AdminCommand>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.lpop(ADMIN_KEY, None).await.map_err(|e| FiberError::transient("redis-admin", e))?;
        raw.map(|s| serde_json::from_str(&s).map_err(|e| FiberError::MalformedInput(e.to_string())))
            .transpose()
    }
}

pub struct RedisIdempotencyStore {
    conn: ConnectionManager,
}

impl RedisIdempotencyStore {
    pub async fn connect(url: &str) -> FiberResult<Self> {
        let client = redis::Client::open(url).map_err(|e| FiberError::transient("redis", e))?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|e| FiberError::transient("redis", e))?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl IdempotencyStore for RedisIdempotencyStore {
    async fn check_and_set(
        &self,
        batch_id: &str,
        enqueued_count: usize,
        ttl: Duration,
    ) -> FiberResult<IdempotencyOutcome> {
        let mut conn = self.conn.clone();
        let key = format!("{IDEMPOTENCY_PREFIX}{batch_id}");
        let script = Script::new(IDEMPOTENCY_SCRIPT);
        let existing: redis::Value = script
            .key(key)
            .arg(enqueued_count)
            .arg(ttl.as_secs())
            .invoke_async(&mut conn)
            .await
            .map_err(|e| FiberError::transient("redis-idempotency", e))?;

        match existing {
            redis::Value::Nil | redis::Value::Boolean(false) => Ok(IdempotencyOutcome::Fresh),
            redis::Value::BulkString(bytes) => {
                let s = String::from_utf8_lossy(&bytes);
                let enqueued = s.parse::<usize>().unwrap_or(enqueued_count);
                Ok(IdempotencyOutcome::Duplicate { enqueued })
            }
            _ => Ok(IdempotencyOutcome::Fresh),
        }
    }
}

pub struct RedisRateLimiter {
    conn: ConnectionManager,
}

impl RedisRateLimiter {
    pub async fn connect(url: &str) -> FiberResult<Self> {
        let client = redis::Client::open(url).map_err(|e| FiberError::transient("redis", e))?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|e| FiberError::transient("redis", e))?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl RateLimitBackend for RedisRateLimiter {
    async fn allow(
        &self,
        key: &str,
        bucket: TokenBucket,
        requested: f64,
        ttl: Duration,
    ) -> FiberResult<Decision> {
        let mut conn = self.conn.clone();
        let redis_key = format!("{RATE_LIMIT_PREFIX}{key}");
        let now = chrono::Utc::now().timestamp_millis() as f64 / 1000.0;
        let script = Script::new(TOKEN_BUCKET_SCRIPT);

        let (allowed, tokens, retry_after): (i64, String, String) = script
            .key(redis_key)
            .arg(bucket.capacity)
            .arg(bucket.rate_per_sec)
            .arg(requested)
            .arg(now)
            .arg(ttl.as_secs())
            .invoke_async(&mut conn)
            .await
            .map_err(|e| FiberError::transient("redis-ratelimit", e))?;

        let remaining: f64 = tokens.parse().unwrap_or(0.0);
        let retry_after: f64 = retry_after.parse().unwrap_or(-1.0);
        let reset_at_secs = if bucket.rate_per_sec > 0.0 {
            ((bucket.capacity - remaining) / bucket.rate_per_sec).max(0.0).ceil()
        } else {
            f64::INFINITY
        };

        Ok(Decision {
            allowed: allowed == 1,
            remaining,
            reset_at_secs,
            retry_after: if retry_after >= 0.0 { Some(retry_after) } else { None },
        })
    }
}
