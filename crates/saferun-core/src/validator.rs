//! Live probes against real system state.
//!
//! A [`SystemValidator`] answers "did the claimed effect actually happen?"
//! by probing the filesystem, TCP ports, HTTP endpoints, and the process
//! table. Probes always return a [`ValidationResult`] — connection refused,
//! permission denied, or a vanished process are captured into the result's
//! `error` field, never thrown.
//!
//! Results are cached for [`CACHE_TTL_MS`] per probe key. A cache hit
//! returns the prior result verbatim, original timestamp included, which is
//! how tests prove a probe was not re-executed. The cache is an explicitly
//! constructed, injectable object so callers can isolate instances.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::metrics::METRICS;

/// Independent timeout for a single probe, in milliseconds.
pub const PROBE_TIMEOUT_MS: u64 = 5000;
/// How long a cached probe result stays live, in milliseconds.
pub const CACHE_TTL_MS: u64 = 5000;
/// Successful probes slower than this emit a performance warning.
const SLOW_PROBE_WARN_MS: u64 = 100;

// ---------------------------------------------------------------------------
// Result type
// ---------------------------------------------------------------------------

/// Outcome of one real-system probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    /// Whether the probed state matched the expectation.
    pub passed: bool,
    /// Human-readable description of what was observed. Always names the
    /// probed target so failures are self-describing.
    pub evidence: String,
    /// 0–100. 100 is reserved for checks with binary ground truth.
    pub confidence: u8,
    /// Probe wall-clock time in milliseconds (0 on cache hits).
    pub duration_millis: u64,
    /// RFC 3339 timestamp of when the probe actually ran.
    pub timestamp: String,
    /// Populated when the probe failed or errored.
    pub error: Option<String>,
}

struct ProbeOutcome {
    passed: bool,
    evidence: String,
    confidence: u8,
    error: Option<String>,
}

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

struct CacheEntry {
    result: ValidationResult,
    inserted_at: Instant,
}

/// Shared probe-result cache keyed by `kind:params`.
///
/// Readers and writers may race across invocation chains; the acceptable
/// outcome is a slightly stale value within one TTL window. The map is
/// guarded by a single mutex held only for the lookup or insert, so a
/// partially written entry is impossible.
#[derive(Default)]
pub struct ValidationCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl ValidationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the live (non-expired) cached result for `key`, if any.
    /// Expired entries are dropped on the way out.
    pub fn get(&self, key: &str) -> Option<ValidationResult> {
        let mut entries = self.entries.lock().expect("validation cache poisoned");
        match entries.get(key) {
            Some(entry) if entry.inserted_at.elapsed() <= Duration::from_millis(CACHE_TTL_MS) => {
                Some(entry.result.clone())
            }
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Store a result under `key`, replacing any prior entry
    /// (last writer wins).
    pub fn insert(&self, key: String, result: ValidationResult) {
        self.entries
            .lock()
            .expect("validation cache poisoned")
            .insert(
                key,
                CacheEntry {
                    result,
                    inserted_at: Instant::now(),
                },
            );
    }

    /// Number of entries currently held, expired or not.
    pub fn len(&self) -> usize {
        self.entries.lock().expect("validation cache poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ---------------------------------------------------------------------------
// Validator
// ---------------------------------------------------------------------------

/// Probes real system state with caching and per-probe timeouts.
#[derive(Clone)]
pub struct SystemValidator {
    cache: Arc<ValidationCache>,
    http: reqwest::Client,
}

impl Default for SystemValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemValidator {
    /// Validator with a fresh private cache.
    pub fn new() -> Self {
        Self::with_cache(Arc::new(ValidationCache::new()))
    }

    /// Validator sharing an externally owned cache.
    pub fn with_cache(cache: Arc<ValidationCache>) -> Self {
        Self {
            cache,
            http: reqwest::Client::new(),
        }
    }

    /// The cache this validator consults.
    pub fn cache(&self) -> &Arc<ValidationCache> {
        &self.cache
    }

    /// Check that a file or directory exists at `path`.
    pub async fn check_file(&self, path: &str) -> ValidationResult {
        let key = format!("file:{path}");
        let target = path.to_string();
        self.cached_probe(key, "file", path, async move {
            match tokio::fs::metadata(&target).await {
                Ok(meta) => ProbeOutcome {
                    passed: true,
                    evidence: format!(
                        "file {} exists ({} bytes)",
                        target,
                        meta.len()
                    ),
                    confidence: 100,
                    error: None,
                },
                Err(err) => ProbeOutcome {
                    passed: false,
                    evidence: format!("file {target} not accessible"),
                    confidence: 100,
                    error: Some(err.to_string()),
                },
            }
        })
        .await
    }

    /// Check that `host:port` is accepting TCP connections.
    pub async fn check_port(&self, port: u16, host: &str) -> ValidationResult {
        let key = format!("port:{host}:{port}");
        let target = format!("{host}:{port}");
        let addr = target.clone();
        self.cached_probe(key, "port", &target, async move {
            match tokio::net::TcpStream::connect(&addr).await {
                Ok(_) => ProbeOutcome {
                    passed: true,
                    evidence: format!("port {addr} is accepting connections"),
                    confidence: 100,
                    error: None,
                },
                Err(err) => ProbeOutcome {
                    passed: false,
                    evidence: format!("port {addr} is not accepting connections"),
                    confidence: 100,
                    error: Some(err.to_string()),
                },
            }
        })
        .await
    }

    /// Check that a GET of `url` returns `expected_status`.
    pub async fn check_endpoint(&self, url: &str, expected_status: u16) -> ValidationResult {
        let key = format!("endpoint:{url}:{expected_status}");
        let target = url.to_string();
        let client = self.http.clone();
        self.cached_probe(key, "endpoint", url, async move {
            match client.get(&target).send().await {
                Ok(response) => {
                    let status = response.status().as_u16();
                    if status == expected_status {
                        ProbeOutcome {
                            passed: true,
                            evidence: format!(
                                "endpoint {target} returned expected status {status}"
                            ),
                            confidence: 100,
                            error: None,
                        }
                    } else {
                        ProbeOutcome {
                            passed: false,
                            evidence: format!(
                                "endpoint {target} returned {status}, expected {expected_status}"
                            ),
                            confidence: 100,
                            error: Some(format!(
                                "unexpected status: {status} != {expected_status}"
                            )),
                        }
                    }
                }
                Err(err) => ProbeOutcome {
                    passed: false,
                    evidence: format!("endpoint {target} unreachable"),
                    confidence: 100,
                    error: Some(err.to_string()),
                },
            }
        })
        .await
    }

    /// Check that a process with exactly `name` is running.
    ///
    /// A name match is heuristic (the "right" binary may be a different
    /// instance), so confidence is 90 rather than 100.
    pub async fn check_process(&self, name: &str) -> ValidationResult {
        let key = format!("process:{name}");
        let target = name.to_string();
        self.cached_probe(key, "process", name, async move {
            match tokio::process::Command::new("pgrep")
                .arg("-x")
                .arg(&target)
                .output()
                .await
            {
                Ok(output) if output.status.success() => ProbeOutcome {
                    passed: true,
                    evidence: format!("process {target} is running"),
                    confidence: 90,
                    error: None,
                },
                Ok(_) => ProbeOutcome {
                    passed: false,
                    evidence: format!("process {target} is not running"),
                    confidence: 90,
                    error: Some(format!("no process named {target} found")),
                },
                Err(err) => ProbeOutcome {
                    passed: false,
                    evidence: format!("process {target} could not be checked"),
                    confidence: 90,
                    error: Some(err.to_string()),
                },
            }
        })
        .await
    }

    /// Run a caller-supplied predicate as a probe.
    ///
    /// `description` names the thing being checked and doubles as the cache
    /// key; `confidence` is declared by the caller since only they know how
    /// conclusive the predicate is.
    pub async fn run_custom<F, Fut>(
        &self,
        description: &str,
        confidence: u8,
        check: F,
    ) -> ValidationResult
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<bool, String>>,
    {
        let key = format!("custom:{description}");
        let target = description.to_string();
        self.cached_probe(key, "custom", description, async move {
            match check().await {
                Ok(true) => ProbeOutcome {
                    passed: true,
                    evidence: format!("custom check '{target}' holds"),
                    confidence,
                    error: None,
                },
                Ok(false) => ProbeOutcome {
                    passed: false,
                    evidence: format!("custom check '{target}' does not hold"),
                    confidence,
                    error: Some(format!("predicate '{target}' returned false")),
                },
                Err(err) => ProbeOutcome {
                    passed: false,
                    evidence: format!("custom check '{target}' failed to evaluate"),
                    confidence,
                    error: Some(err),
                },
            }
        })
        .await
    }

    /// Run several probes concurrently, preserving input order.
    ///
    /// A slow probe does not delay its siblings, but the aggregate only
    /// resolves once every member has completed or individually timed out.
    pub async fn run_parallel<'a>(
        &self,
        probes: Vec<Pin<Box<dyn Future<Output = ValidationResult> + Send + 'a>>>,
    ) -> Vec<ValidationResult> {
        futures::future::join_all(probes).await
    }

    async fn cached_probe<Fut>(
        &self,
        key: String,
        kind: &str,
        target: &str,
        run: Fut,
    ) -> ValidationResult
    where
        Fut: Future<Output = ProbeOutcome>,
    {
        if let Some(hit) = self.cache.get(&key) {
            METRICS.inc_probe_cache_hits();
            debug!(event = "validator.cache_hit", key = %key);
            return hit;
        }

        METRICS.inc_probes_run();
        let start = Instant::now();
        let outcome = match tokio::time::timeout(Duration::from_millis(PROBE_TIMEOUT_MS), run).await
        {
            Ok(outcome) => outcome,
            Err(_) => ProbeOutcome {
                passed: false,
                evidence: format!("{kind} probe of {target} did not complete"),
                confidence: 0,
                error: Some(format!("probe timed out after {PROBE_TIMEOUT_MS}ms")),
            },
        };
        let duration_millis = start.elapsed().as_millis() as u64;

        if outcome.passed && duration_millis > SLOW_PROBE_WARN_MS {
            warn!(
                event = "validator.slow_probe",
                key = %key,
                duration_ms = duration_millis,
                "probe succeeded but exceeded latency budget"
            );
        }

        let result = ValidationResult {
            passed: outcome.passed,
            evidence: outcome.evidence,
            confidence: outcome.confidence,
            duration_millis,
            timestamp: chrono::Utc::now().to_rfc3339(),
            error: outcome.error,
        };
        self.cache.insert(key, result.clone());
        result
    }
}
