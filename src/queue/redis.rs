//! Redis sorted-set provider.
//!
//! Uses `redis::aio::ConnectionManager` for a multiplexed, reconnecting
//! connection. Fair popping runs as a Lua script so owner selection, the pop and
//! the worker count increment happen atomically. Indexed pushes go out as one
//! `MULTI`/`EXEC` pipeline.

use async_trait::async_trait;
use tracing::debug;

use super::SortedSetStore;
use crate::config::{loader::redact_url, RedisConfig};
use crate::error::Result;

const POP_FAIR_SCRIPT: &str = r#"
local owners = redis.call("ZRANGE", KEYS[1], 0, -1)
for _, owner in ipairs(owners) do
    local popped = redis.call("ZPOPMAX", ARGV[1] .. ":" .. owner)
    if #popped > 0 then
        redis.call("ZINCRBY", KEYS[1], 1, owner)
        return {owner, popped[1]}
    end
    redis.call("ZREM", KEYS[1], owner)
end
return false
"#;

/// `MULTI`/`EXEC` pair adding the member and registering its key in the index
fn push_indexed_pipeline(key: &str, member: &str, score: f64, index_key: &str) -> ::redis::Pipeline {
    let mut pipe = ::redis::pipe();
    pipe.atomic()
        .cmd("ZADD")
        .arg(key)
        .arg(score)
        .arg(member)
        .ignore()
        .cmd("ZADD")
        .arg(index_key)
        .arg("NX")
        .arg(0)
        .arg(key)
        .ignore();
    pipe
}

#[derive(Clone)]
pub struct RedisSortedSetStore {
    connection_manager: ::redis::aio::ConnectionManager,
    pop_fair: ::redis::Script,
}

impl std::fmt::Debug for RedisSortedSetStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisSortedSetStore")
            .field("connection_manager", &"ConnectionManager")
            .finish()
    }
}

impl RedisSortedSetStore {
    pub async fn from_config(config: &RedisConfig) -> Result<Self> {
        let client = ::redis::Client::open(config.url.as_str())?;
        let connection_manager = ::redis::aio::ConnectionManager::new(client).await?;

        debug!(url = %redact_url(&config.url), "Redis queue store connected");

        Ok(Self {
            connection_manager,
            pop_fair: ::redis::Script::new(POP_FAIR_SCRIPT),
        })
    }
}

#[async_trait]
impl SortedSetStore for RedisSortedSetStore {
    async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<()> {
        let mut conn = self.connection_manager.clone();
        ::redis::cmd("ZADD")
            .arg(key)
            .arg(score)
            .arg(member)
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn push_indexed(
        &self,
        key: &str,
        member: &str,
        score: f64,
        index_key: &str,
    ) -> Result<()> {
        let mut conn = self.connection_manager.clone();
        push_indexed_pipeline(key, member, score, index_key)
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn zincrby(&self, key: &str, member: &str, delta: f64) -> Result<f64> {
        let mut conn = self.connection_manager.clone();
        let score: f64 = ::redis::cmd("ZINCRBY")
            .arg(key)
            .arg(delta)
            .arg(member)
            .query_async(&mut conn)
            .await?;
        Ok(score)
    }

    async fn zrem(&self, key: &str, member: &str) -> Result<bool> {
        let mut conn = self.connection_manager.clone();
        let removed: i64 = ::redis::cmd("ZREM")
            .arg(key)
            .arg(member)
            .query_async(&mut conn)
            .await?;
        Ok(removed > 0)
    }

    async fn zcard(&self, key: &str) -> Result<u64> {
        let mut conn = self.connection_manager.clone();
        let count: u64 = ::redis::cmd("ZCARD")
            .arg(key)
            .query_async(&mut conn)
            .await?;
        Ok(count)
    }

    async fn zpopmax(&self, key: &str) -> Result<Option<(String, f64)>> {
        let mut conn = self.connection_manager.clone();
        let popped: Vec<(String, f64)> = ::redis::cmd("ZPOPMAX")
            .arg(key)
            .query_async(&mut conn)
            .await?;
        Ok(popped.into_iter().next())
    }

    async fn zrange_with_scores(&self, key: &str) -> Result<Vec<(String, f64)>> {
        let mut conn = self.connection_manager.clone();
        let members: Vec<(String, f64)> = ::redis::cmd("ZRANGE")
            .arg(key)
            .arg(0)
            .arg(-1)
            .arg("WITHSCORES")
            .query_async(&mut conn)
            .await?;
        Ok(members)
    }

    async fn pop_fair(&self, active_key: &str, prefix: &str) -> Result<Option<(String, String)>> {
        let mut conn = self.connection_manager.clone();
        let popped: Option<(String, String)> = self
            .pop_fair
            .key(active_key)
            .arg(prefix)
            .invoke_async(&mut conn)
            .await?;
        Ok(popped)
    }

    fn provider_name(&self) -> &'static str {
        "redis"
    }
}
