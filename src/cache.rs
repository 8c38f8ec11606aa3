//! # Forecast Response Cache
//!
//! Raw API response bodies are kept on disk so a restart inside the TTL
//! does not cost a network round trip, and so a recent forecast is still
//! available when the network is down.
//!
//! ## Caching Strategy
//! - **Location**: `{dir}/admiralty_{station}_{days}d.json`, default `/tmp`
//!   (cleared on reboot)
//! - **Format**: the body exactly as received, replayed through the same
//!   JSON adapter and decoder as a live response
//! - **Writes**: a body that decoded cleanly goes to a `.partial` file and is
//!   renamed into place
//! - **Validation**: file modification time checked against the TTL before
//!   loading
//!
//! Cache failures never fail a fetch; callers log them and move on.

use crate::config::CacheConfig;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// Whether a cached body must be within its TTL to be used.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Freshness {
    /// Only bodies younger than the TTL
    Fresh,
    /// Any cached body, however old
    AnyAge,
}

/// Directory of cached response bodies.
#[derive(Clone, Debug)]
pub struct ForecastCache {
    dir: PathBuf,
    ttl: Duration,
}

impl ForecastCache {
    pub fn new<P: Into<PathBuf>>(dir: P, ttl: Duration) -> Self {
        Self {
            dir: dir.into(),
            ttl,
        }
    }

    /// `None` when caching is disabled.
    pub fn from_config(config: &CacheConfig) -> Option<Self> {
        let ttl = Duration::from_secs(config.ttl_minutes.saturating_mul(60));
        config.enabled.then(|| Self::new(&config.dir, ttl))
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Cache file for one station and horizon.
    ///
    /// Characters outside `[A-Za-z0-9_-]` in the station id are replaced so
    /// an id can never escape the cache directory.
    pub fn path_for(&self, station_id: &str, days: u8) -> PathBuf {
        let station: String = station_id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("admiralty_{station}_{days}d.json"))
    }

    /// Age of the cached body, from its modification time.
    ///
    /// # Errors
    /// Fails if the file is missing or its timestamp is unreadable.
    pub fn age(&self, station_id: &str, days: u8) -> io::Result<Duration> {
        let meta = fs::metadata(self.path_for(station_id, days))?;
        SystemTime::now()
            .duration_since(meta.modified()?)
            .map_err(|_| io::Error::other("cache modified in the future"))
    }

    /// Open a cached body for replay.
    ///
    /// # Errors
    /// Fails if there is no cached body, or with [`io::ErrorKind::Other`]
    /// ("stale") when `freshness` is [`Freshness::Fresh`] and the TTL has
    /// passed.
    pub fn open(&self, station_id: &str, days: u8, freshness: Freshness) -> io::Result<File> {
        if freshness == Freshness::Fresh && self.age(station_id, days)? >= self.ttl {
            return Err(io::Error::other("stale"));
        }
        File::open(self.path_for(station_id, days))
    }

    /// Start writing a new body for `station_id`.
    ///
    /// # Errors
    /// Fails if the cache directory or partial file cannot be created.
    pub fn writer(&self, station_id: &str, days: u8) -> io::Result<CacheWriter> {
        fs::create_dir_all(&self.dir)?;
        let target = self.path_for(station_id, days);
        let partial = target.with_extension("json.partial");
        let file = File::create(&partial)?;
        Ok(CacheWriter {
            file: Some(BufWriter::new(file)),
            partial,
            target,
            committed: false,
        })
    }
}

/// Writes one response body into the cache.
///
/// Dropped without [`commit`](Self::commit), the partial file is removed and
/// any previously cached body is left untouched.
#[derive(Debug)]
pub struct CacheWriter {
    file: Option<BufWriter<File>>,
    partial: PathBuf,
    target: PathBuf,
    committed: bool,
}

impl CacheWriter {
    /// # Errors
    /// Propagates write failures.
    pub fn write_chunk(&mut self, chunk: &[u8]) -> io::Result<()> {
        match self.file.as_mut() {
            Some(file) => file.write_all(chunk),
            None => Err(io::Error::other("cache writer already closed")),
        }
    }

    /// Flush and atomically replace the cached body.
    ///
    /// # Errors
    /// Propagates flush, sync and rename failures.
    pub fn commit(mut self) -> io::Result<PathBuf> {
        if let Some(file) = self.file.take() {
            let file = file.into_inner().map_err(|e| e.into_error())?;
            file.sync_all()?;
        }
        fs::rename(&self.partial, &self.target)?;
        self.committed = true;
        Ok(self.target.clone())
    }

    pub fn target(&self) -> &Path {
        &self.target
    }
}

impl Drop for CacheWriter {
    fn drop(&mut self) {
        if !self.committed {
            self.file.take();
            let _ = fs::remove_file(&self.partial);
        }
    }
}
