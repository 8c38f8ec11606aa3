//! # Admiralty API Retrieval
//!
//! This module drives one fetch cycle against the UK Admiralty tidal API:
//! resolve the host, connect, optionally pin the server certificate, send the
//! request, collect the body into a size-capped [`BodyBuffer`] and decode it.
//! The decoder's session starts before the body is examined, so a failed
//! fetch always leaves an empty store and [`ForecastSource::None`].
//!
//! ## Request
//!
//! ```text
//! GET {base_url}{station}/TidalEvents?duration={days}
//! Ocp-Apim-Subscription-Key: {subscription_key}
//! Connection: close
//! ```
//!
//! ## Status Codes
//!
//! Every failure maps onto a numeric [`FetchStatus`], matching the codes
//! deployed clients report:
//!
//! | Code | Meaning                      |
//! |------|------------------------------|
//! | 0    | success                      |
//! | 1    | host name resolution failed  |
//! | 2    | connection failed            |
//! | 3    | certificate validation failed|
//! | 4    | non-2xx HTTP status          |
//! | 5    | other transport error        |
//! | 6    | malformed response body      |
//! | 7    | invalid request URL          |
//!
//! ## Caching
//!
//! [`AdmiraltyApiClient::refresh`] is cache-first: a fresh cached body is
//! replayed instead of fetching; otherwise the network is used and the body
//! is cached once it has decoded. If the network fails, a stale cached body
//! is replayed and the forecast is marked offline.
//!
//! ## Trust
//!
//! rustls always validates the chain, against the bundled web roots plus an
//! optional `ca_certificate` PEM file. Chain rejections are recognised by
//! downcasting the error chain to [`rustls::Error`] and reported as code 3.

use crate::cache::{ForecastCache, Freshness};
use crate::config::{ApiConfig, Config};
use crate::decoder::{DecodeReport, TidalEventDecoder};
use crate::event::TidalEvent;
use crate::store::EventStore;
use crate::tokenizer::{self, BodyBuffer, TokenizeError};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::error::Error as StdError;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};
use url::{Host, Url};

/// Header carrying the API subscription key.
pub const SUBSCRIPTION_KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";

/// Numeric outcome of a fetch, as reported to callers and used as the exit code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[repr(u8)]
pub enum FetchStatus {
    Success = 0,
    HostByNameFailed = 1,
    ConnectFailed = 2,
    SslValidationFailed = 3,
    HttpStatus = 4,
    Transport = 5,
    MalformedBody = 6,
    InvalidRequest = 7,
}

impl FetchStatus {
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Errors that can occur while fetching and decoding a forecast.
#[derive(Error, Debug)]
pub enum FetchError {
    /// The configured base URL and station do not form a usable URL
    #[error("invalid request url `{url}`: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    /// DNS lookup failed or returned no addresses
    #[error("host lookup failed for {host}")]
    HostResolution {
        host: String,
        #[source]
        source: Option<io::Error>,
    },

    /// TCP (or TLS handshake) connection could not be established
    #[error("connection to {host} failed: {source}")]
    Connect {
        host: String,
        #[source]
        source: reqwest::Error,
    },

    /// Certificate chain rejected or pinned fingerprint mismatch
    #[error("certificate validation failed for {host}: {reason}")]
    Certificate { host: String, reason: String },

    /// The configured CA certificate could not be read or parsed
    #[error("cannot load CA certificate {}: {source}", path.display())]
    TrustAnchor {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Server answered with a non-2xx status
    #[error("API returned HTTP {0}")]
    Status(u16),

    /// HTTP request failed (timeout, protocol error, reset mid-body)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Response body was not a well-formed JSON document
    #[error("malformed response body: {0}")]
    Body(#[from] TokenizeError),
}

impl FetchError {
    pub fn status(&self) -> FetchStatus {
        match self {
            FetchError::InvalidUrl { .. } => FetchStatus::InvalidRequest,
            FetchError::HostResolution { .. } => FetchStatus::HostByNameFailed,
            FetchError::Connect { .. } => FetchStatus::ConnectFailed,
            FetchError::Certificate { .. } | FetchError::TrustAnchor { .. } => {
                FetchStatus::SslValidationFailed
            }
            FetchError::Status(_) => FetchStatus::HttpStatus,
            FetchError::Http(_) => FetchStatus::Transport,
            FetchError::Body(_) => FetchStatus::MalformedBody,
        }
    }
}

/// Where the events currently in the store came from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ForecastSource {
    /// Nothing decoded yet, or the last decode failed
    #[default]
    None,
    Network,
    /// A cached body within its TTL
    Cache,
    /// A cached body past its TTL, used because the network failed
    StaleCache,
}

impl ForecastSource {
    /// True when the forecast may be out of date.
    pub fn is_offline(self) -> bool {
        self == ForecastSource::StaleCache
    }
}

/// Client for the Admiralty tidal events endpoint.
///
/// Holds one decoder and therefore one forecast; fetches take `&mut self`
/// so only one decode session can run at a time.
#[derive(Debug)]
pub struct AdmiraltyApiClient {
    api: ApiConfig,
    station_id: String,
    http: reqwest::Client,
    decoder: TidalEventDecoder,
    cache: Option<ForecastCache>,
    source: ForecastSource,
}

impl AdmiraltyApiClient {
    /// Build a client from configuration.
    ///
    /// # Errors
    /// [`FetchError::TrustAnchor`] if `ca_certificate` is set but unreadable,
    /// otherwise fails if the HTTP client cannot be constructed.
    pub fn new(config: &Config) -> Result<Self, FetchError> {
        let mut builder = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.api.timeout_secs))
            .tls_info(config.api.validate_certificate)
            .user_agent(concat!("admiralty-tides/", env!("CARGO_PKG_VERSION")));

        if let Some(path) = &config.api.ca_certificate {
            builder = builder.add_root_certificate(load_trust_anchor(path)?);
            debug!(path = %path.display(), "added CA certificate");
        }
        let http = builder.build()?;

        Ok(Self {
            api: config.api.clone(),
            station_id: config.station.id.clone(),
            http,
            decoder: TidalEventDecoder::with_policy(config.decoder.partial_records),
            cache: ForecastCache::from_config(&config.cache),
            source: ForecastSource::None,
        })
    }

    pub fn station_id(&self) -> &str {
        &self.station_id
    }

    /// Events from the last successful decode.
    pub fn store(&self) -> &EventStore {
        self.decoder.store()
    }

    pub fn report(&self) -> DecodeReport {
        self.decoder.report()
    }

    pub fn source(&self) -> ForecastSource {
        self.source
    }

    /// The tidal event at or immediately before `time` (epoch seconds).
    pub fn previous_tidal_event(&self, time: i64) -> TidalEvent {
        self.store().previous_event(time)
    }

    /// The tidal event at or immediately after `time` (epoch seconds).
    pub fn next_tidal_event(&self, time: i64) -> TidalEvent {
        self.store().next_event(time)
    }

    /// Full request URL for a forecast of `days` days.
    ///
    /// # Errors
    /// [`FetchError::InvalidUrl`] if the result does not parse.
    pub fn request_url(&self, days: u8) -> Result<Url, FetchError> {
        let base = self.api.base_url.trim_end_matches('/');
        let raw = format!("{base}/{}/TidalEvents?duration={days}", self.station_id);
        Url::parse(&raw).map_err(|source| FetchError::InvalidUrl { url: raw, source })
    }

    /// Cache-first retrieval with stale-cache fallback.
    ///
    /// # Errors
    /// The network error, when there is no usable cached body either.
    pub async fn refresh(&mut self, days: u8) -> Result<DecodeReport, FetchError> {
        if let Some(report) = self.load_cached(days, Freshness::Fresh) {
            return Ok(report);
        }

        match self.fetch_tidal_events(days).await {
            Ok(report) => Ok(report),
            Err(err) => {
                warn!(error = %err, status = err.status().code(), "fetch failed, trying stale cache");
                self.load_cached(days, Freshness::AnyAge).ok_or(err)
            }
        }
    }

    /// Read tidal events from the API for the next `days` days.
    ///
    /// The body is collected up to [`tokenizer::MAX_BODY_BYTES`], decoded,
    /// and only then written to the cache when caching is enabled.
    ///
    /// # Errors
    /// See [`FetchError`]; [`FetchError::status`] gives the numeric code.
    pub async fn fetch_tidal_events(&mut self, days: u8) -> Result<DecodeReport, FetchError> {
        let url = self.request_url(days)?;
        let host = url.host_str().unwrap_or_default().to_string();
        resolve_host(&url).await?;

        info!(%url, "requesting tidal events");
        let mut response = self
            .http
            .get(url.clone())
            .header(SUBSCRIPTION_KEY_HEADER, &self.api.subscription_key)
            .header(reqwest::header::CONNECTION, "close")
            .send()
            .await
            .map_err(|err| classify(err, &host))?;

        if self.api.validate_certificate {
            self.verify_certificate(&response, &host)?;
        }

        let status = response.status();
        debug!(status = status.as_u16(), "received headers");
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let mut body = BodyBuffer::new();
        while let Some(chunk) = response.chunk().await.map_err(|err| classify(err, &host))? {
            body.push(&chunk)?;
        }

        self.source = ForecastSource::None;
        body.parse_into(&mut self.decoder)?;
        self.store_in_cache(days, body.as_bytes());

        self.source = ForecastSource::Network;
        let report = self.decoder.report();
        info!(
            events = report.events,
            bytes = body.len(),
            dropped = report.dropped,
            "decoded tidal events"
        );
        Ok(report)
    }

    /// Replay a cached body through the decoder.
    ///
    /// Returns `None` when caching is off, nothing suitable is cached, or the
    /// cached body does not decode. In the last case the store is left empty.
    pub fn load_cached(&mut self, days: u8, freshness: Freshness) -> Option<DecodeReport> {
        let cache = self.cache.as_ref()?;
        let file = match cache.open(&self.station_id, days, freshness) {
            Ok(file) => file,
            Err(err) => {
                debug!(error = %err, ?freshness, "no usable cache");
                return None;
            }
        };

        self.source = ForecastSource::None;
        if let Err(err) = tokenizer::parse_reader(file, &mut self.decoder) {
            warn!(error = %err, "cached body unusable");
            return None;
        }

        self.source = match freshness {
            Freshness::Fresh => ForecastSource::Cache,
            Freshness::AnyAge => ForecastSource::StaleCache,
        };
        let report = self.decoder.report();
        info!(events = report.events, ?freshness, "loaded tidal events from cache");
        Some(report)
    }

    /// Save a decoded body. Failures are logged and otherwise ignored.
    fn store_in_cache(&self, days: u8, body: &[u8]) {
        let Some(cache) = self.cache.as_ref() else {
            return;
        };
        let saved = cache.writer(&self.station_id, days).and_then(|mut writer| {
            writer.write_chunk(body)?;
            writer.commit()
        });
        match saved {
            Ok(path) => debug!(path = %path.display(), "cached response body"),
            Err(err) => warn!(error = %err, "could not save cache"),
        }
    }

    fn verify_certificate(&self, response: &reqwest::Response, host: &str) -> Result<(), FetchError> {
        if response.url().scheme() != "https" {
            warn!(%host, "certificate pinning skipped for plain HTTP");
            return Ok(());
        }

        let expected = self.api.certificate_sha256.as_deref().unwrap_or_default();
        let certificate = response
            .extensions()
            .get::<reqwest::tls::TlsInfo>()
            .and_then(|info| info.peer_certificate());

        match certificate {
            Some(der) if fingerprint_matches(expected, der) => Ok(()),
            Some(der) => Err(FetchError::Certificate {
                host: host.to_string(),
                reason: format!("fingerprint {} not pinned", hex::encode(Sha256::digest(der))),
            }),
            None => Err(FetchError::Certificate {
                host: host.to_string(),
                reason: "server presented no certificate".to_string(),
            }),
        }
    }
}

/// Resolve the API host before connecting so DNS failures get their own status.
async fn resolve_host(url: &Url) -> Result<(), FetchError> {
    let Some(Host::Domain(domain)) = url.host() else {
        // IP literals need no lookup
        return if url.host().is_some() {
            Ok(())
        } else {
            Err(FetchError::InvalidUrl {
                url: url.to_string(),
                source: url::ParseError::EmptyHost,
            })
        };
    };

    let port = url.port_or_known_default().unwrap_or(443);
    let failed = |source| FetchError::HostResolution {
        host: domain.to_string(),
        source,
    };

    let mut addrs = tokio::net::lookup_host((domain, port))
        .await
        .map_err(|err| failed(Some(err)))?;
    match addrs.next() {
        Some(addr) => {
            debug!(host = domain, ip = %addr.ip(), "resolved host");
            Ok(())
        }
        None => Err(failed(None)),
    }
}

/// Read a PEM CA certificate to trust alongside the bundled roots.
fn load_trust_anchor(path: &Path) -> Result<reqwest::Certificate, FetchError> {
    let failed = |source| FetchError::TrustAnchor {
        path: path.to_path_buf(),
        source,
    };
    let pem = fs::read(path).map_err(failed)?;
    reqwest::Certificate::from_pem(&pem)
        .map_err(|err| failed(io::Error::new(io::ErrorKind::InvalidData, err)))
}

/// Sort a reqwest failure into the status code taxonomy.
fn classify(err: reqwest::Error, host: &str) -> FetchError {
    if let Some(reason) = certificate_failure(&err) {
        FetchError::Certificate {
            host: host.to_string(),
            reason,
        }
    } else if err.is_connect() {
        FetchError::Connect {
            host: host.to_string(),
            source: err,
        }
    } else {
        FetchError::Http(err)
    }
}

/// Find a rustls certificate rejection anywhere in an error chain.
///
/// The TLS stream reports handshake failures as an [`io::Error`] wrapping the
/// rustls error, and `io::Error::source` skips the wrapped value, so both
/// layers are checked.
fn certificate_failure(err: &(dyn StdError + 'static)) -> Option<String> {
    let mut source = Some(err);
    while let Some(e) = source {
        let tls = e.downcast_ref::<rustls::Error>().or_else(|| {
            e.downcast_ref::<io::Error>()
                .and_then(|io| io.get_ref())
                .and_then(|inner| inner.downcast_ref::<rustls::Error>())
        });
        if let Some(tls) = tls {
            let rejected = matches!(
                tls,
                rustls::Error::InvalidCertificate(_) | rustls::Error::NoCertificatesPresented
            );
            return rejected.then(|| tls.to_string());
        }
        source = e.source();
    }
    None
}

/// Compare a configured hex fingerprint (any case, `:` separators allowed)
/// with the SHA-256 of a DER certificate.
pub fn fingerprint_matches(expected: &str, der: &[u8]) -> bool {
    let expected: String = expected
        .chars()
        .filter(|c| c.is_ascii_hexdigit())
        .map(|c| c.to_ascii_lowercase())
        .collect();
    !expected.is_empty() && expected == hex::encode(Sha256::digest(der))
}
