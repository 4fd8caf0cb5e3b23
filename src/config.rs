//! Configuration structs threaded through construction (DESIGN NOTES §9:
//! "explicit configuration structs... never a process-global mutable"),
//! following the teacher's `Config`/`Default` convention
//! (`rusty_db::Config`).

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Size/interval flush triggers for the [`crate::events::EventBuffer`]
/// (§4.D). `None` disables that trigger; at least one should normally be
/// set, but both being `None` just means only `FlushNow` ever flushes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlushStrategyConfig {
    pub max_size: Option<usize>,
    #[serde(with = "duration_millis")]
    pub max_interval: Option<Duration>,
}

impl Default for FlushStrategyConfig {
    fn default() -> Self {
        Self {
            max_size: Some(500),
            max_interval: Some(Duration::from_secs(5)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidatorKind {
    Null,
    Strict,
}

/// Configuration supplied externally to a writer node (§6 "CLI/config").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriterNodeConfig {
    pub flush: FlushStrategyConfig,
    pub validator: ValidatorKind,
    pub log_level: Option<String>,
}

impl Default for WriterNodeConfig {
    fn default() -> Self {
        Self {
            flush: FlushStrategyConfig::default(),
            validator: ValidatorKind::Null,
            log_level: None,
        }
    }
}

/// Configuration for a reader node (§4.G). `initial_load_on_empty_cache`
/// resolves the Open Question in spec.md §9 ("reader refresh after clean
/// startup"): default `false` preserves the historical behavior of
/// swallowing `CacheEmpty` and relying on an explicit `Load` at
/// construction, but it is now a knob rather than baked-in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReaderNodeConfig {
    #[serde(with = "duration_millis_required")]
    pub refresh_interval: Duration,
    pub initial_load_on_empty_cache: bool,
}

impl Default for ReaderNodeConfig {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(5),
            initial_load_on_empty_cache: false,
        }
    }
}

/// Capacity of the bounded event cache (§4.F). Chosen so that a reader
/// tolerating up to T seconds of lag never misses; the caller is
/// responsible for sizing it against expected write throughput.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventCacheConfig {
    pub capacity: usize,
}

impl Default for EventCacheConfig {
    fn default() -> Self {
        Self { capacity: 10_000 }
    }
}

/// Configuration for a shard router client (§4.H). `shard_config_endpoint`
/// is an opaque string; resolving it to a live configuration fetch is an
/// external collaborator's job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShardRouterConfig {
    #[serde(with = "duration_millis_required")]
    pub refresh_interval: Duration,
    pub shard_config_endpoint: String,
}

impl Default for ShardRouterConfig {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(5),
            shard_config_endpoint: String::new(),
        }
    }
}

/// `Duration` as milliseconds on the wire. Named for what it actually does —
/// this is not the `humantime` crate's human-readable format ("5s", "1h"),
/// just a plain integer, which is all the config wire format needs.
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        value.map(|d| d.as_millis() as u64).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        let millis: Option<u64> = Option::deserialize(d)?;
        Ok(millis.map(Duration::from_millis))
    }
}

mod duration_millis_required {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, s: S) -> Result<S::Ok, S::Error> {
        (value.as_millis() as u64).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(d)?;
        Ok(Duration::from_millis(millis))
    }
}
