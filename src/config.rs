//! Environment parsing helpers shared by the per-subsystem configs.
//!
//! Each helper takes a lookup function instead of reading `std::env` directly
//! so configs can be built from a map in tests. Unparseable values fall back
//! to the default.

use std::time::Duration;

pub(crate) fn env_usize<F>(lookup: &F, key: &str, default: usize) -> usize
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|value| value.trim().parse::<usize>().ok())
        .unwrap_or(default)
}

pub(crate) fn env_u32<F>(lookup: &F, key: &str, default: u32) -> u32
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|value| value.trim().parse::<u32>().ok())
        .unwrap_or(default)
}

pub(crate) fn env_u64<F>(lookup: &F, key: &str, default: u64) -> u64
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

pub(crate) fn env_duration_millis<F>(lookup: &F, key: &str, default_millis: u64) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    Duration::from_millis(env_u64(lookup, key, default_millis))
}
