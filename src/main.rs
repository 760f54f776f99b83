use beaconflow::prelude::*;
use clap::Parser;
use log::{error, info, warn};
use std::path::PathBuf;
use std::process::ExitCode;

/// Tails an access log and aggregates `/dig?` timing beacons.
#[derive(Parser, Debug)]
#[command(name = "beaconflow", version, about)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, env = "BEACONFLOW_CONFIG")]
    config: Option<PathBuf>,

    /// Access log to tail
    #[arg(long = "log-file-path", alias = "logFilePath")]
    log_file_path: Option<PathBuf>,

    /// Number of classification workers
    #[arg(long = "routine-num", alias = "routineNum")]
    routine_num: Option<usize>,

    /// Runtime log output path
    #[arg(short = 'l')]
    runtime_log: Option<PathBuf>,
}

impl Cli {
    fn load_config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };
        if let Some(path) = &self.log_file_path {
            config.tail.log_file_path = path.clone();
        }
        if let Some(workers) = self.routine_num {
            config.pipeline.workers = workers;
        }
        if let Some(path) = &self.runtime_log {
            config.logger.file_path = Some(path.clone());
        }
        config.validate()?;
        Ok(config)
    }
}

async fn run(config: Config) -> Result<StatsSnapshot> {
    let retry = config.store.retry_policy();
    let store = match &config.redis {
        Some(redis) => {
            let pool = create_redis_pool(redis, config.redis_pool_size())?;
            info!("Using redis at {}:{} db {}", redis.host, redis.port, redis.db);
            StoreService::new(Some(pool), retry)
        }
        None => {
            warn!("No [redis] section configured, aggregates are kept in memory only");
            StoreService::new(None, retry)
        }
    };
    Engine::new(config, store).run().await
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = match cli.load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("beaconflow: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = LoggerConfig::from(&config.logger).init() {
        eprintln!("beaconflow: logger setup failed: {e}");
    }
    info!("Exec start.");
    info!(
        "Params: log_file_path={}, workers={}",
        config.tail.log_file_path.display(),
        config.pipeline.workers
    );

    match run(config).await {
        Ok(snapshot) => {
            info!("Server done. {snapshot:?}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("beaconflow stopped: {e}");
            eprintln!("beaconflow: {e}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_flag_names_are_accepted() {
        let cli = Cli::try_parse_from([
            "beaconflow",
            "--logFilePath",
            "/var/log/nginx/access.log",
            "--routineNum",
            "8",
            "-l",
            "/tmp/beaconflow",
        ])
        .unwrap();
        let config = cli.load_config().unwrap();
        assert_eq!(
            config.tail.log_file_path,
            PathBuf::from("/var/log/nginx/access.log")
        );
        assert_eq!(config.pipeline.workers, 8);
        assert_eq!(config.logger.file_path, Some(PathBuf::from("/tmp/beaconflow")));
    }

    #[test]
    fn zero_workers_is_rejected() {
        let cli = Cli::try_parse_from(["beaconflow", "--routine-num", "0"]).unwrap();
        let err = cli.load_config().unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn defaults_without_flags() {
        let cli = Cli::try_parse_from(["beaconflow"]).unwrap();
        let config = cli.load_config().unwrap();
        assert_eq!(config.pipeline.workers, 5);
        assert_eq!(
            config.tail.log_file_path,
            PathBuf::from("/usr/local/etc/nginx/logs/access.log")
        );
    }
}
