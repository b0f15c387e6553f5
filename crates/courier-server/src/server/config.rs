use clap::{Parser, ValueEnum};
use core::time::Duration;
use courier::{BatchConfig, Error, Topics};
use std::path::PathBuf;

/// Which halves of the harness to run.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    /// Fetch snapshots on a timer and write them to the broker.
    Producer,
    /// Poll the broker and hand every message to the handler.
    Consumer,
    /// Run both against the same broker.
    Both,
}

impl Mode {
    pub const fn produces(self) -> bool {
        matches!(self, Self::Producer | Self::Both)
    }

    pub const fn consumes(self) -> bool {
        matches!(self, Self::Consumer | Self::Both)
    }
}

/// Upstream source for producer mode.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceKind {
    /// HTTP currency rates endpoint.
    Rates,
    /// JSON-lines file of work items, re-read every cycle.
    File,
}

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Runtime configuration for the `courier-server` binary.
///
/// All values are parsed from CLI arguments or environment variables (a
/// `.env` file in the working directory is loaded first). The defaults run a
/// producer against an in-process broker.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "courier-server",
    version,
    about = "Periodic batch producer/consumer for partitioned message logs"
)]
pub struct CliArgs {
    /// Whether to produce, consume, or both.
    ///
    /// Environment variable: `MODE`
    #[arg(long, env = "MODE", value_enum, default_value_t = Mode::Producer)]
    pub mode: Mode,

    /// Number of concurrent workers.
    ///
    /// In producer mode every snapshot is split round-robin into this many
    /// partitions; in consumer mode this many readers poll the topic.
    ///
    /// Environment variable: `NUM_WORKERS`
    #[arg(long, env = "NUM_WORKERS", default_value_t = 4)]
    pub num_workers: usize,

    /// Delay between dispatch cycles (producer) or between reads (consumer),
    /// in milliseconds.
    ///
    /// Environment variable: `POLL_INTERVAL_MS`
    #[arg(long, env = "POLL_INTERVAL_MS", default_value_t = 5_000)]
    pub poll_interval_ms: u64,

    /// Messages per batch. A batch is flushed as soon as it is full, and any
    /// remainder is flushed when the worker finishes its partition.
    ///
    /// Environment variable: `CHUNK_SIZE`
    #[arg(long, env = "CHUNK_SIZE", default_value_t = 10)]
    pub chunk_size: usize,

    /// Upper bound on concurrent batch writes per producer worker.
    ///
    /// Environment variable: `MAX_INFLIGHT_FLUSHES`
    #[arg(long, env = "MAX_INFLIGHT_FLUSHES", default_value_t = 4)]
    pub max_inflight_flushes: usize,

    /// Topic for currency rates. Consumers read from this topic.
    ///
    /// Environment variable: `TOPIC`
    #[arg(long, env = "TOPIC", default_value_t = String::from("rates"))]
    pub topic: String,

    /// Topic for track propositions.
    ///
    /// Environment variable: `PROPOSITION_TOPIC`
    #[arg(long, env = "PROPOSITION_TOPIC", default_value_t = String::from("propositions"))]
    pub proposition_topic: String,

    /// Topic for recently played tracks.
    ///
    /// Environment variable: `NOW_PLAYING_TOPIC`
    #[arg(long, env = "NOW_PLAYING_TOPIC", default_value_t = String::from("now-playing"))]
    pub now_playing_topic: String,

    /// Consumer group shared by every consumer worker.
    ///
    /// Environment variable: `GROUP_ID`
    #[arg(long, env = "GROUP_ID", default_value_t = String::from("courier"))]
    pub group_id: String,

    /// Comma-separated broker addresses.
    ///
    /// Example: "memory://local"
    ///
    /// Environment variable: `BROKERS`
    #[arg(long, env = "BROKERS", value_delimiter = ',', default_value = "memory://local")]
    pub brokers: Vec<String>,

    /// Partitions per topic on the in-process broker.
    ///
    /// Environment variable: `PARTITIONS`
    #[arg(long, env = "PARTITIONS", default_value_t = 3)]
    pub partitions: usize,

    /// Messages kept per partition on the in-process broker. The oldest are
    /// discarded once a partition is full.
    ///
    /// Environment variable: `RETENTION`
    #[arg(long, env = "RETENTION", default_value_t = courier::DEFAULT_RETENTION)]
    pub retention: usize,

    /// How long a single consumer read may block waiting for a message, in
    /// milliseconds. Bounds how long shutdown waits on a consumer.
    ///
    /// Environment variable: `READ_TIMEOUT_MS`
    #[arg(long, env = "READ_TIMEOUT_MS", default_value_t = 1_000)]
    pub read_timeout_ms: u64,

    /// Where producer snapshots come from.
    ///
    /// Environment variable: `SOURCE`
    #[arg(long, env = "SOURCE", value_enum, default_value_t = SourceKind::Rates)]
    pub source: SourceKind,

    /// Currency rates endpoint, queried once per cycle.
    ///
    /// Environment variable: `RATES_URL`
    #[arg(long, env = "RATES_URL", default_value_t = String::from("https://api.frankfurter.app/latest"))]
    pub rates_url: String,

    /// JSON-lines file read by `--source file`.
    ///
    /// Environment variable: `SOURCE_FILE`
    #[arg(long, env = "SOURCE_FILE")]
    pub source_file: Option<PathBuf>,

    /// Timeout for one upstream fetch, in milliseconds.
    ///
    /// Environment variable: `FETCH_TIMEOUT_MS`
    #[arg(long, env = "FETCH_TIMEOUT_MS", default_value_t = 10_000)]
    pub fetch_timeout_ms: u64,

    /// Stop the producer after this many cycles. Runs until interrupted if
    /// unset.
    ///
    /// Environment variable: `MAX_CYCLES`
    #[arg(long, env = "MAX_CYCLES")]
    pub max_cycles: Option<u64>,

    /// Console log format.
    ///
    /// Environment variable: `LOG_FORMAT`
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceConfig {
    Rates { url: String, timeout: Duration },
    File { path: PathBuf },
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub mode: Mode,
    pub num_workers: usize,
    pub poll_interval: Duration,
    pub batch: BatchConfig,
    pub topics: Topics,
    pub group_id: String,
    pub brokers: Vec<String>,
    pub partitions: usize,
    pub retention: usize,
    pub read_timeout: Duration,
    pub source: SourceConfig,
    pub max_cycles: Option<u64>,
    pub log_format: LogFormat,
}

fn invalid(reason: impl Into<String>) -> Error {
    Error::InvalidConfiguration {
        reason: reason.into(),
    }
}

fn positive_millis(name: &str, millis: u64) -> Result<Duration, Error> {
    if millis == 0 {
        return Err(invalid(format!("{name} must be greater than 0")));
    }
    Ok(Duration::from_millis(millis))
}

fn non_empty(name: &str, value: String) -> Result<String, Error> {
    if value.trim().is_empty() {
        return Err(invalid(format!("{name} must not be empty")));
    }
    Ok(value)
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.num_workers == 0 {
            return Err(invalid("NUM_WORKERS must be greater than 0"));
        }
        if args.partitions == 0 {
            return Err(invalid("PARTITIONS must be greater than 0"));
        }
        if args.retention == 0 {
            return Err(invalid("RETENTION must be greater than 0"));
        }
        if args.max_cycles == Some(0) {
            return Err(invalid("MAX_CYCLES must be greater than 0 when set"));
        }

        let brokers: Vec<String> = args
            .brokers
            .into_iter()
            .map(|broker| broker.trim().to_owned())
            .filter(|broker| !broker.is_empty())
            .collect();
        if brokers.is_empty() {
            return Err(invalid("BROKERS must list at least one address"));
        }

        let batch = BatchConfig::new(args.chunk_size, args.max_inflight_flushes)?;
        let topics = Topics {
            rates: non_empty("TOPIC", args.topic)?,
            propositions: non_empty("PROPOSITION_TOPIC", args.proposition_topic)?,
            now_playing: non_empty("NOW_PLAYING_TOPIC", args.now_playing_topic)?,
        };

        let source = match args.source {
            SourceKind::Rates => SourceConfig::Rates {
                url: non_empty("RATES_URL", args.rates_url)?,
                timeout: positive_millis("FETCH_TIMEOUT_MS", args.fetch_timeout_ms)?,
            },
            SourceKind::File => SourceConfig::File {
                path: args
                    .source_file
                    .ok_or_else(|| invalid("SOURCE_FILE is required with `--source file`"))?,
            },
        };

        Ok(Self {
            mode: args.mode,
            num_workers: args.num_workers,
            poll_interval: positive_millis("POLL_INTERVAL_MS", args.poll_interval_ms)?,
            batch,
            topics,
            group_id: non_empty("GROUP_ID", args.group_id)?,
            brokers,
            partitions: args.partitions,
            retention: args.retention,
            read_timeout: positive_millis("READ_TIMEOUT_MS", args.read_timeout_ms)?,
            source,
            max_cycles: args.max_cycles,
            log_format: args.log_format,
        })
    }
}
