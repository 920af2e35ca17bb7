use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{Client, Cmd, RedisError};
use zindex_core::{Error, Result};
use crate::command::{Command, Pipeline, Reply};
use crate::store::SortedSetStore;

const MAX_UNPACK: usize = 1000;

/// KEYS = [dest, token...], ARGV = [total_docs, ttl]
const IDF_INTERSECT_SCRIPT: &str = r#"
local n = tonumber(ARGV[1])
local args = {'ZINTERSTORE', KEYS[1], #KEYS - 1}
for i = 2, #KEYS do
    args[#args + 1] = KEYS[i]
end
args[#args + 1] = 'WEIGHTS'
for i = 2, #KEYS do
    args[#args + 1] = math.log(n / (1 + redis.call('ZCARD', KEYS[i])))
end
args[#args + 1] = 'AGGREGATE'
args[#args + 1] = 'SUM'
local count = redis.call(unpack(args))
redis.call('EXPIRE', KEYS[1], ARGV[2])
return count
"#;

/// KEYS = [src, dest], ARGV = [min, max, ttl, chunk]
const COPY_SCORE_RANGE_SCRIPT: &str = r#"
local members = redis.call('ZRANGEBYSCORE', KEYS[1], ARGV[1], ARGV[2], 'WITHSCORES')
local chunk = tonumber(ARGV[4]) * 2
redis.call('DEL', KEYS[2])
local batch = {}
for i = 1, #members, 2 do
    batch[#batch + 1] = members[i + 1]
    batch[#batch + 1] = members[i]
    if #batch >= chunk then
        redis.call('ZADD', KEYS[2], unpack(batch))
        batch = {}
    end
end
if #batch > 0 then
    redis.call('ZADD', KEYS[2], unpack(batch))
end
redis.call('EXPIRE', KEYS[2], ARGV[3])
return #members / 2
"#;

pub(crate) fn store_error(e: RedisError) -> Error {
    Error::Store(e.to_string())
}

/// Sorted-set store backed by a Redis server over one multiplexed connection
#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
}

impl RedisStore {
    pub async fn connect(url: &str) -> Result<Self> {
        let client = Client::open(url)
            .map_err(|e| Error::Configuration(format!("invalid Redis url '{}': {}", url, e)))?;

        let connection = ConnectionManager::new(client)
            .await
            .map_err(store_error)?;

        let mut test_conn = connection.clone();
        redis::cmd("PING")
            .query_async::<_, String>(&mut test_conn)
            .await
            .map_err(store_error)?;

        tracing::info!("Connected to Redis store at {}", url);

        Ok(Self { connection })
    }

    /// Reply of a command that needs no round trip
    fn local_reply(command: &Command) -> Option<Reply> {
        match command {
            Command::ZAdd { members, .. } if members.is_empty() => Some(Reply::Integer(0)),
            Command::ZRem { members, .. } if members.is_empty() => Some(Reply::Integer(0)),
            Command::Del { keys } if keys.is_empty() => Some(Reply::Integer(0)),
            Command::MGet { keys } if keys.is_empty() => Some(Reply::Values(Vec::new())),
            Command::ZInterStore { keys, .. } | Command::ZUnionStore { keys, .. } if keys.is_empty() => {
                Some(Reply::Integer(0))
            }
            Command::IdfIntersect { keys, .. } if keys.is_empty() => Some(Reply::Integer(0)),
            _ => None,
        }
    }

    fn to_cmd(command: &Command) -> Cmd {
        match command {
            Command::ZAdd { key, members } => {
                let mut cmd = redis::cmd("ZADD");
                cmd.arg(key);
                for (score, member) in members {
                    cmd.arg(*score).arg(member.as_slice());
                }
                cmd
            }
            Command::ZRem { key, members } => {
                let mut cmd = redis::cmd("ZREM");
                cmd.arg(key);
                for member in members {
                    cmd.arg(member.as_slice());
                }
                cmd
            }
            Command::ZCard { key } => {
                let mut cmd = redis::cmd("ZCARD");
                cmd.arg(key);
                cmd
            }
            Command::ZRange { key, start, stop } => {
                let mut cmd = redis::cmd("ZRANGE");
                cmd.arg(key).arg(*start).arg(*stop);
                cmd
            }
            Command::ZRangeByLex { key, min, max, limit } => {
                let mut cmd = redis::cmd("ZRANGEBYLEX");
                cmd.arg(key).arg(min.as_slice()).arg(max.as_slice());
                if let Some((offset, count)) = limit {
                    cmd.arg("LIMIT").arg(*offset).arg(*count);
                }
                cmd
            }
            Command::ZRevRangeWithScores { key, start, stop } => {
                let mut cmd = redis::cmd("ZREVRANGE");
                cmd.arg(key).arg(*start).arg(*stop).arg("WITHSCORES");
                cmd
            }
            Command::ZInterStore { dest, keys, weights, aggregate } => {
                Self::store_cmd("ZINTERSTORE", dest, keys, weights, aggregate.as_str())
            }
            Command::ZUnionStore { dest, keys, weights, aggregate } => {
                Self::store_cmd("ZUNIONSTORE", dest, keys, weights, aggregate.as_str())
            }
            Command::IdfIntersect { dest, keys, total_docs, ttl_secs } => {
                let mut cmd = redis::cmd("EVAL");
                cmd.arg(IDF_INTERSECT_SCRIPT)
                    .arg(keys.len() + 1)
                    .arg(dest)
                    .arg(keys)
                    .arg(*total_docs)
                    .arg(*ttl_secs);
                cmd
            }
            Command::CopyScoreRange { src, dest, min, max, ttl_secs } => {
                let mut cmd = redis::cmd("EVAL");
                cmd.arg(COPY_SCORE_RANGE_SCRIPT)
                    .arg(2)
                    .arg(src)
                    .arg(dest)
                    .arg(min.to_redis())
                    .arg(max.to_redis())
                    .arg(*ttl_secs)
                    .arg(MAX_UNPACK);
                cmd
            }
            Command::Expire { key, ttl_secs } => {
                let mut cmd = redis::cmd("EXPIRE");
                cmd.arg(key).arg(*ttl_secs);
                cmd
            }
            Command::Del { keys } => {
                let mut cmd = redis::cmd("DEL");
                cmd.arg(keys);
                cmd
            }
            Command::Set { key, value } => {
                let mut cmd = redis::cmd("SET");
                cmd.arg(key).arg(value.as_slice());
                cmd
            }
            Command::MGet { keys } => {
                let mut cmd = redis::cmd("MGET");
                cmd.arg(keys);
                cmd
            }
        }
    }

    fn store_cmd(name: &str, dest: &str, keys: &[String], weights: &[f64], aggregate: &str) -> Cmd {
        let mut cmd = redis::cmd(name);
        cmd.arg(dest).arg(keys.len()).arg(keys);
        if !weights.is_empty() {
            cmd.arg("WEIGHTS").arg(weights);
        }
        cmd.arg("AGGREGATE").arg(aggregate);
        cmd
    }

    fn to_reply(command: &Command, value: &redis::Value) -> Result<Reply> {
        let reply = match command {
            Command::Set { .. } => Reply::Ok,
            Command::ZRange { .. } | Command::ZRangeByLex { .. } => {
                Reply::Members(redis::from_redis_value(value).map_err(store_error)?)
            }
            Command::ZRevRangeWithScores { .. } => {
                Reply::Scored(redis::from_redis_value(value).map_err(store_error)?)
            }
            Command::MGet { .. } => Reply::Values(redis::from_redis_value(value).map_err(store_error)?),
            _ => Reply::Integer(redis::from_redis_value(value).map_err(store_error)?),
        };
        Ok(reply)
    }
}

#[async_trait]
impl SortedSetStore for RedisStore {
    async fn execute(&self, pipeline: Pipeline) -> Result<Vec<Reply>> {
        let commands = pipeline.into_commands();
        let mut replies: Vec<Option<Reply>> = commands.iter().map(Self::local_reply).collect();

        let mut pipe = redis::pipe();
        let mut sent = Vec::new();
        for (i, command) in commands.iter().enumerate() {
            if replies[i].is_none() {
                pipe.add_command(Self::to_cmd(command));
                sent.push(i);
            }
        }

        if !sent.is_empty() {
            tracing::debug!("Sending pipeline of {} commands", sent.len());
            let mut conn = self.connection.clone();
            let values = pipe
                .query_async::<_, Vec<redis::Value>>(&mut conn)
                .await
                .map_err(store_error)?;

            if values.len() != sent.len() {
                return Err(Error::Store(format!(
                    "expected {} replies, got {}",
                    sent.len(),
                    values.len()
                )));
            }
            for (i, value) in sent.into_iter().zip(values.iter()) {
                replies[i] = Some(Self::to_reply(&commands[i], value)?);
            }
        }

        replies
            .into_iter()
            .map(|r| r.ok_or_else(|| Error::Store("missing reply".to_string())))
            .collect()
    }

    fn kind(&self) -> &'static str {
        "redis"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{Aggregate, ScoreBound};

    #[test]
    fn test_local_replies() {
        let empty_add = Command::ZAdd { key: "k".to_string(), members: vec![] };
        assert_eq!(RedisStore::local_reply(&empty_add), Some(Reply::Integer(0)));
        assert_eq!(
            RedisStore::local_reply(&Command::MGet { keys: vec![] }),
            Some(Reply::Values(vec![]))
        );
        assert_eq!(RedisStore::local_reply(&Command::ZCard { key: "k".to_string() }), None);
    }

    #[test]
    fn test_command_translation() {
        let cmd = RedisStore::to_cmd(&Command::ZRangeByLex {
            key: "idx".to_string(),
            min: b"[a".to_vec(),
            max: b"(b".to_vec(),
            limit: Some((0, 10)),
        });
        let packed = String::from_utf8_lossy(&cmd.get_packed_command()).to_string();
        assert!(packed.contains("ZRANGEBYLEX"));
        assert!(packed.contains("LIMIT"));

        let cmd = RedisStore::to_cmd(&Command::ZUnionStore {
            dest: "d".to_string(),
            keys: vec!["a".to_string(), "b".to_string()],
            weights: vec![0.0, 0.0],
            aggregate: Aggregate::Max,
        });
        let packed = String::from_utf8_lossy(&cmd.get_packed_command()).to_string();
        assert!(packed.contains("WEIGHTS"));
        assert!(packed.contains("MAX"));

        let cmd = RedisStore::to_cmd(&Command::CopyScoreRange {
            src: "k:i:n".to_string(),
            dest: "tmp".to_string(),
            min: ScoreBound::Exclusive(1.0),
            max: ScoreBound::PosInf,
            ttl_secs: 60,
        });
        let packed = String::from_utf8_lossy(&cmd.get_packed_command()).to_string();
        assert!(packed.contains("EVAL"));
        assert!(packed.contains("(1"));
        assert!(packed.contains("+inf"));
    }

    #[test]
    fn test_reply_decoding() {
        let scored = redis::Value::Bulk(vec![
            redis::Value::Data(b"a".to_vec()),
            redis::Value::Data(b"2.5".to_vec()),
            redis::Value::Data(b"b".to_vec()),
            redis::Value::Data(b"1".to_vec()),
        ]);
        let cmd = Command::ZRevRangeWithScores { key: "k".to_string(), start: 0, stop: -1 };
        assert_eq!(
            RedisStore::to_reply(&cmd, &scored).unwrap(),
            Reply::Scored(vec![(b"a".to_vec(), 2.5), (b"b".to_vec(), 1.0)])
        );

        let values = redis::Value::Bulk(vec![redis::Value::Data(b"x".to_vec()), redis::Value::Nil]);
        let cmd = Command::MGet { keys: vec!["a".to_string(), "b".to_string()] };
        assert_eq!(
            RedisStore::to_reply(&cmd, &values).unwrap(),
            Reply::Values(vec![Some(b"x".to_vec()), None])
        );

        let cmd = Command::ZCard { key: "k".to_string() };
        assert_eq!(RedisStore::to_reply(&cmd, &redis::Value::Int(4)).unwrap(), Reply::Integer(4));
    }
}
