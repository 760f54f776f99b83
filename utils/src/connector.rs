use common::model::RedisConfig;
use errors::StoreError;

/// Builds the shared connection pool. No connection is opened here; callers
/// PING through the pool to find out whether the server is reachable.
pub fn create_redis_pool(
    config: &RedisConfig,
    pool_size: usize,
) -> Result<deadpool_redis::Pool, StoreError> {
    let cfg = deadpool_redis::Config {
        connection: Some(deadpool_redis::ConnectionInfo {
            addr: deadpool_redis::ConnectionAddr::Tcp(config.host.clone(), config.port),
            redis: deadpool_redis::RedisConnectionInfo {
                db: config.db as i64,
                username: config.username.clone(),
                password: config.password.clone(),
                protocol: deadpool_redis::ProtocolVersion::RESP2,
            },
        }),
        pool: Some(deadpool_redis::PoolConfig {
            max_size: pool_size.max(1),
            ..Default::default()
        }),
        ..Default::default()
    };
    let pool = cfg
        .create_pool(Some(deadpool_redis::Runtime::Tokio1))
        .map_err(|e| StoreError::Pool(e.to_string()))?;
    log::debug!(
        "redis pool created for {}:{} db {} (max {})",
        config.host,
        config.port,
        config.db,
        pool_size.max(1)
    );
    Ok(pool)
}
