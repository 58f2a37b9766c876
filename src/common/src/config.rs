use tracing::level_filters::LevelFilter;

use crate::funnel::MedianKind;

#[derive(Debug, Clone)]
pub struct Engine {
    // worker threads per pass, 1 means the calling thread only
    pub workers: usize,
    // actors handed to a worker at once
    pub batch_size: usize,
    pub median: MedianKind,
}

#[derive(Debug, Clone)]
pub struct Log {
    pub level: LevelFilter,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub engine: Engine,
    pub log: Log,
}

impl Default for Engine {
    fn default() -> Self {
        Engine {
            workers: num_cpus::get(),
            batch_size: 256,
            median: MedianKind::default(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            engine: Engine::default(),
            log: Log {
                level: LevelFilter::INFO,
            },
        }
    }
}
