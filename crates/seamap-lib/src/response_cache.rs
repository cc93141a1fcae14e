//! Serialized payload cache with ETags and conditional-GET handling.
//!
//! Keys fold in the layer generation, so a reload makes every older entry
//! unreachable without sweeping; those entries simply age out through LRU
//! eviction. Hits take only the read lock: recency is tracked with a
//! per-entry atomic tick.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::{Error, Result};

/// Width of a tolerance bucket in canonical degrees.
pub const TOLERANCE_QUANTUM: f64 = 1e-7;

/// Tolerances above this many degrees are treated as this value.
const MAX_TOLERANCE: f64 = 360.0;

/// A simplification tolerance quantised to [`TOLERANCE_QUANTUM`].
///
/// Bucket zero is full resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ToleranceBucket(u64);

impl ToleranceBucket {
    pub const FULL_RESOLUTION: Self = Self(0);

    /// Parse a raw `simplify` query value. Absent and empty values are full resolution.
    pub fn parse(raw: Option<&str>) -> Result<Self> {
        let Some(raw) = raw.map(str::trim).filter(|raw| !raw.is_empty()) else {
            return Ok(Self::FULL_RESOLUTION);
        };
        let value: f64 = raw.parse().map_err(|_| Error::InvalidTolerance {
            value: raw.to_string(),
        })?;
        Self::from_tolerance(value).map_err(|_| Error::InvalidTolerance {
            value: raw.to_string(),
        })
    }

    /// Quantise a tolerance; negative, NaN and infinite values are rejected.
    pub fn from_tolerance(tolerance: f64) -> Result<Self> {
        if !tolerance.is_finite() || tolerance < 0.0 {
            return Err(Error::InvalidTolerance {
                value: tolerance.to_string(),
            });
        }
        let clamped = tolerance.min(MAX_TOLERANCE);
        Ok(Self((clamped / TOLERANCE_QUANTUM).round() as u64))
    }

    /// Representative tolerance of the bucket, `None` at full resolution.
    pub fn tolerance(self) -> Option<f64> {
        (self.0 > 0).then(|| self.0 as f64 * TOLERANCE_QUANTUM)
    }

    pub fn is_full_resolution(self) -> bool {
        self.0 == 0
    }
}

/// Identity of one cached payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub layer_id: String,
    pub tolerance: ToleranceBucket,
    pub generation: u64,
}

/// A serialized payload and its entity tag. Cloning is cheap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    pub body: Bytes,
    pub etag: String,
}

impl CachedResponse {
    pub fn new(body: Bytes) -> Self {
        let etag = compute_etag(&body);
        Self { body, etag }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
}

impl CacheStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hit => "hit",
            Self::Miss => "miss",
        }
    }
}

/// Outcome of conditional-GET evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Responded {
    /// 200 or 304.
    pub status: u16,
    /// Empty for 304.
    pub body: Bytes,
    pub etag: String,
    pub cache_control: String,
}

impl Responded {
    pub fn is_not_modified(&self) -> bool {
        self.status == 304
    }
}

#[derive(Debug)]
struct Entry {
    response: CachedResponse,
    last_access: AtomicU64,
}

/// Bounded LRU cache of serialized layer payloads.
#[derive(Debug)]
pub struct ResponseCache {
    capacity: usize,
    cache_control: String,
    entries: RwLock<HashMap<CacheKey, Entry>>,
    clock: AtomicU64,
}

impl ResponseCache {
    /// Cache holding at most `capacity` payloads, advertising `max_age_secs`.
    ///
    /// A capacity of zero disables storage; payloads are rebuilt every time.
    pub fn new(capacity: usize, max_age_secs: u64) -> Self {
        Self {
            capacity,
            cache_control: format!("public, max-age={max_age_secs}"),
            entries: RwLock::new(HashMap::with_capacity(capacity)),
            clock: AtomicU64::new(0),
        }
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Cached payload for `key`, built with `build` on a miss.
    ///
    /// Concurrent misses may both build; the first insert wins and both
    /// callers return that payload.
    pub fn get_or_build<F>(&self, key: &CacheKey, build: F) -> Result<(CachedResponse, CacheStatus)>
    where
        F: FnOnce() -> Result<Bytes>,
    {
        if let Some(entry) = self.entries.read().get(key) {
            entry.last_access.store(self.tick(), Ordering::Relaxed);
            return Ok((entry.response.clone(), CacheStatus::Hit));
        }

        let response = CachedResponse::new(build()?);
        if self.capacity == 0 {
            return Ok((response, CacheStatus::Miss));
        }

        let mut entries = self.entries.write();
        if let Some(existing) = entries.get(key) {
            existing.last_access.store(self.tick(), Ordering::Relaxed);
            return Ok((existing.response.clone(), CacheStatus::Miss));
        }
        while entries.len() >= self.capacity {
            let Some(oldest) = entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_access.load(Ordering::Relaxed))
                .map(|(key, _)| key.clone())
            else {
                break;
            };
            entries.remove(&oldest);
            debug!(
                layer = %oldest.layer_id,
                generation = oldest.generation,
                "evicted least recently used response"
            );
        }
        entries.insert(
            key.clone(),
            Entry {
                response: response.clone(),
                last_access: AtomicU64::new(self.tick()),
            },
        );
        Ok((response, CacheStatus::Miss))
    }

    /// Evaluate `If-None-Match` against a payload.
    pub fn handle(&self, if_none_match: Option<&str>, response: &CachedResponse) -> Responded {
        if if_none_match.is_some_and(|header| etag_matches(header, &response.etag)) {
            return Responded {
                status: 304,
                body: Bytes::new(),
                etag: response.etag.clone(),
                cache_control: self.cache_control.clone(),
            };
        }
        Responded {
            status: 200,
            body: response.body.clone(),
            etag: response.etag.clone(),
            cache_control: self.cache_control.clone(),
        }
    }

    /// Drop every payload built for a generation below `current`.
    pub fn retire_before(&self, current: u64) {
        self.entries.write().retain(|key, _| key.generation >= current);
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total bytes of cached payloads.
    pub fn total_bytes(&self) -> usize {
        self.entries
            .read()
            .values()
            .map(|entry| entry.response.body.len())
            .sum()
    }
}

/// Strong entity tag over the payload bytes: a quoted, truncated SHA-256.
pub fn compute_etag(body: &[u8]) -> String {
    let digest = Sha256::digest(body);
    format!("\"{}\"", hex::encode(&digest[..16]))
}

/// Weak comparison of an `If-None-Match` header value with an entity tag.
///
/// Accepts `*`, comma separated lists and `W/` prefixed validators.
pub fn etag_matches(if_none_match: &str, etag: &str) -> bool {
    let etag = etag.strip_prefix("W/").unwrap_or(etag);
    if_none_match.split(',').map(str::trim).any(|candidate| {
        candidate == "*" || candidate.strip_prefix("W/").unwrap_or(candidate) == etag
    })
}
