//! Redis-backed value store
//!
//! Every write is a `SET` followed by a `PUBLISH` on the same key, so both
//! polling readers and pub/sub subscribers see new values.

use super::{StoreError, ValueStore};
use ::redis::{Client, Commands, Connection};
use tracing::{debug, info};

pub struct RedisStore {
    connection: Connection,
}

impl RedisStore {
    /// Connect to a Redis server and verify it answers
    ///
    /// A single attempt is made.
    pub fn connect(host: &str, port: u16) -> Result<Self, StoreError> {
        let address = format!("{host}:{port}");
        let connect_err = |e: ::redis::RedisError| StoreError::Connect {
            address: address.clone(),
            message: e.to_string(),
        };

        let client = Client::open(format!("redis://{address}/")).map_err(connect_err)?;
        let mut connection = client.get_connection().map_err(connect_err)?;
        ::redis::cmd("PING")
            .query::<String>(&mut connection)
            .map_err(connect_err)?;
        info!(address = %address, "Connected to Redis");

        Ok(Self { connection })
    }
}

impl ValueStore for RedisStore {
    fn get(&mut self, key: &str) -> Result<Option<String>, StoreError> {
        self.connection
            .get::<_, Option<String>>(key)
            .map_err(|e| StoreError::Command {
                key: key.to_string(),
                message: e.to_string(),
            })
    }

    fn set(&mut self, key: &str, value: f64) -> Result<(), StoreError> {
        let command_err = |e: ::redis::RedisError| StoreError::Command {
            key: key.to_string(),
            message: e.to_string(),
        };
        self.connection
            .set::<_, _, ()>(key, value)
            .map_err(command_err)?;
        let receivers: i64 = self.connection.publish(key, value).map_err(command_err)?;
        debug!(key, value, receivers, "Published value");
        Ok(())
    }
}
