use std::path::Path;

use clap::ValueEnum;
use common::funnel::MedianKind;
use serde_derive::Deserialize;
use tracing::level_filters::LevelFilter;
use tracing::Level;

use crate::error::Result;

pub const ENV_PREFIX: &str = "FUNNELS";

#[derive(Debug, Default, Deserialize, PartialEq, Eq)]
pub struct Engine {
    #[serde(default)]
    pub workers: Option<usize>,
    #[serde(default)]
    pub batch_size: Option<usize>,
    #[serde(default)]
    pub median: Option<MedianKind>,
}

#[derive(Debug, Deserialize, PartialEq, Eq)]
pub struct Log {
    pub level: LogLevel,
}

impl Default for Log {
    fn default() -> Self {
        Log {
            level: LogLevel::Info,
        }
    }
}

#[derive(Debug, Default, Deserialize, PartialEq, Eq)]
pub struct Config {
    #[serde(default)]
    pub engine: Engine,
    #[serde(default)]
    pub log: Log,
}

impl Config {
    /// Optional file, then `FUNNELS_*` variables, e.g. `FUNNELS_ENGINE__WORKERS=4`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(::config::File::from(path));
        }
        let config = builder
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }
}

impl TryInto<common::config::Config> for Config {
    type Error = crate::error::Error;

    fn try_into(self) -> std::result::Result<common::config::Config, Self::Error> {
        let default = common::config::Engine::default();
        let workers = self.engine.workers.unwrap_or(default.workers);
        if workers == 0 {
            return Err(crate::error::Error::BadRequest(
                "engine.workers should be positive".to_string(),
            ));
        }
        let batch_size = self.engine.batch_size.unwrap_or(default.batch_size);
        if batch_size == 0 {
            return Err(crate::error::Error::BadRequest(
                "engine.batch_size should be positive".to_string(),
            ));
        }

        Ok(common::config::Config {
            engine: common::config::Engine {
                workers,
                batch_size,
                median: self.engine.median.unwrap_or(default.median),
            },
            log: common::config::Log {
                level: self.log.level.into(),
            },
        })
    }
}

#[derive(Deserialize, Copy, Debug, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
pub enum LogLevel {
    #[serde(rename = "trace")]
    Trace,
    #[serde(rename = "debug")]
    Debug,
    #[serde(rename = "info")]
    Info,
    #[serde(rename = "warn")]
    Warn,
    #[serde(rename = "error")]
    Error,
}

impl From<LogLevel> for LevelFilter {
    fn from(l: LogLevel) -> Self {
        match l {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
        .into()
    }
}
