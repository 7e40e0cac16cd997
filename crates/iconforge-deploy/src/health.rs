//! Production health monitoring
//!
//! Read-only probes against the public endpoints:
//!
//! | target   | CRITICAL                         | WARNING                     |
//! |----------|----------------------------------|-----------------------------|
//! | manifest | unreachable, non-200, unparseable | slow, stale `lastUpdate`   |
//! | sprite   | unreachable, non-200, empty body | slow, no `br`/`gzip`        |
//!
//! Every CRITICAL check is forwarded to the [`AlertSink`].

use std::collections::BTreeMap;
use std::fmt::{self, Debug, Display, Formatter};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use iconforge_core::{CdnConfig, HealthConfig, Manifest, PipelineConfig};
use serde::Serialize;
use tokio::time::MissedTickBehavior;

/// Response as seen by a probe
#[derive(Debug, Clone)]
pub struct ProbeResponse {
    pub status: u16,
    /// Header names lowercased
    pub headers: BTreeMap<String, String>,
    pub body: Bytes,
    pub latency: Duration,
}

impl ProbeResponse {
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

/// Probe transport failure
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

/// Fetches a URL on behalf of the monitor
#[async_trait]
pub trait HealthProbe: Send + Sync + Debug {
    async fn fetch(&self, url: &str) -> Result<ProbeResponse, ProbeError>;
}

/// reqwest-backed probe advertising `br, gzip`
///
/// The client does not decompress, so `Content-Encoding` reaches the checks.
#[derive(Debug, Clone, Default)]
pub struct HttpProbe {
    client: reqwest::Client,
}

impl HttpProbe {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HealthProbe for HttpProbe {
    async fn fetch(&self, url: &str) -> Result<ProbeResponse, ProbeError> {
        let started = Instant::now();
        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT_ENCODING, "br, gzip")
            .send()
            .await?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await?;
        Ok(ProbeResponse {
            status,
            headers,
            body,
            latency: started.elapsed(),
        })
    }
}

/// Check severity, ordered from best to worst
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HealthStatus {
    Ok,
    Warning,
    Critical,
}

impl Display for HealthStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ok => "OK",
            Self::Warning => "WARNING",
            Self::Critical => "CRITICAL",
        })
    }
}

/// Result of checking one URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckResult {
    /// `manifest` or the section key
    pub target: String,
    pub url: String,
    pub status: HealthStatus,
    pub latency_ms: Option<u64>,
    /// Empty when OK
    pub findings: Vec<String>,
}

impl CheckResult {
    fn new(target: &str, url: &str) -> Self {
        Self {
            target: target.to_string(),
            url: url.to_string(),
            status: HealthStatus::Ok,
            latency_ms: None,
            findings: Vec::new(),
        }
    }

    fn flag(&mut self, status: HealthStatus, finding: impl Into<String>) {
        self.status = self.status.max(status);
        self.findings.push(finding.into());
    }
}

/// One monitoring pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub checked_at: DateTime<Utc>,
    pub checks: Vec<CheckResult>,
}

impl HealthReport {
    /// Worst status across all checks
    #[must_use]
    pub fn overall(&self) -> HealthStatus {
        self.checks
            .iter()
            .map(|c| c.status)
            .max()
            .unwrap_or(HealthStatus::Ok)
    }

    pub fn critical(&self) -> impl Iterator<Item = &CheckResult> {
        self.checks
            .iter()
            .filter(|c| c.status == HealthStatus::Critical)
    }
}

/// Receives CRITICAL findings
#[async_trait]
pub trait AlertSink: Send + Sync + Debug {
    async fn alert(&self, check: &CheckResult);
}

/// Sink that logs at error level
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAlertSink;

#[async_trait]
impl AlertSink for LogAlertSink {
    async fn alert(&self, check: &CheckResult) {
        tracing::error!(
            target_name = %check.target,
            url = %check.url,
            findings = ?check.findings,
            "icon delivery is critical"
        );
    }
}

/// Periodic read-only monitor of the published manifest and sprites
#[derive(Debug, Clone)]
pub struct HealthMonitor {
    probe: Arc<dyn HealthProbe>,
    alerts: Arc<dyn AlertSink>,
    cdn: CdnConfig,
    manifest_url: String,
    config: HealthConfig,
}

impl HealthMonitor {
    #[must_use]
    pub fn new(
        probe: Arc<dyn HealthProbe>,
        alerts: Arc<dyn AlertSink>,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            probe,
            alerts,
            cdn: config.cdn.clone(),
            manifest_url: config.manifest_url(),
            config: config.health,
        }
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.probe_timeout_secs)
    }

    async fn fetch(&self, url: &str) -> Result<ProbeResponse, ProbeError> {
        let limit = self.timeout();
        tokio::time::timeout(limit, self.probe.fetch(url))
            .await
            .unwrap_or(Err(ProbeError::Timeout(limit)))
    }

    fn check_latency(&self, check: &mut CheckResult, latency: Duration) {
        let ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        check.latency_ms = Some(ms);
        if ms > self.config.slow_threshold_ms {
            check.flag(
                HealthStatus::Warning,
                format!("slow response: {ms}ms (threshold {}ms)", self.config.slow_threshold_ms),
            );
        }
    }

    /// Run every check once and raise alerts for CRITICAL results
    #[tracing::instrument(skip(self), fields(manifest = %self.manifest_url))]
    pub async fn check_once(&self) -> HealthReport {
        let now = Utc::now();
        let (manifest_check, manifest) = self.check_manifest(now).await;
        let mut checks = vec![manifest_check];

        if let Some(manifest) = manifest {
            let probes = manifest
                .sections
                .iter()
                .map(|(section, entry)| self.check_sprite(section, &entry.file_name));
            checks.extend(join_all(probes).await);
        }

        let report = HealthReport {
            checked_at: now,
            checks,
        };
        for check in report.critical() {
            self.alerts.alert(check).await;
        }
        tracing::info!(status = %report.overall(), checks = report.checks.len(), "health check complete");
        report
    }

    async fn check_manifest(&self, now: DateTime<Utc>) -> (CheckResult, Option<Manifest>) {
        let mut check = CheckResult::new("manifest", &self.manifest_url);
        let response = match self.fetch(&self.manifest_url).await {
            Ok(response) => response,
            Err(error) => {
                check.flag(HealthStatus::Critical, format!("unreachable: {error}"));
                return (check, None);
            }
        };
        self.check_latency(&mut check, response.latency);
        if response.status != 200 {
            check.flag(HealthStatus::Critical, format!("HTTP {}", response.status));
            return (check, None);
        }
        let manifest = match Manifest::from_json(&response.body) {
            Ok(manifest) => manifest,
            Err(error) => {
                check.flag(HealthStatus::Critical, format!("unparseable: {error}"));
                return (check, None);
            }
        };
        let age = now.signed_duration_since(manifest.last_update);
        let stale_after = i64::try_from(self.config.stale_after_secs).unwrap_or(i64::MAX);
        if age.num_seconds() > stale_after {
            check.flag(
                HealthStatus::Warning,
                format!("stale: last update {} ({}h ago)", manifest.last_update, age.num_hours()),
            );
        }
        (check, Some(manifest))
    }

    async fn check_sprite(&self, section: &str, file_name: &str) -> CheckResult {
        let url = self.cdn.url_for(file_name);
        let mut check = CheckResult::new(section, &url);
        let response = match self.fetch(&url).await {
            Ok(response) => response,
            Err(error) => {
                check.flag(HealthStatus::Critical, format!("unreachable: {error}"));
                return check;
            }
        };
        self.check_latency(&mut check, response.latency);
        if response.status != 200 {
            check.flag(HealthStatus::Critical, format!("HTTP {}", response.status));
            return check;
        }
        if response.body.is_empty() {
            check.flag(HealthStatus::Critical, "empty body");
        }
        match response.header("content-encoding") {
            Some("br" | "gzip") => {}
            other => check.flag(
                HealthStatus::Warning,
                format!("missing compression (content-encoding: {})", other.unwrap_or("none")),
            ),
        }
        check
    }

    /// Check on a fixed interval until `shutdown` resolves
    ///
    /// Ticks missed while a pass is running are skipped rather than replayed.
    pub async fn run<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(Duration::from_secs(self.config.interval_secs.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        tracing::info!(interval_secs = self.config.interval_secs, "health monitor started");
        loop {
            tokio::select! {
                () = &mut shutdown => break,
                _ = ticker.tick() => {
                    self.check_once().await;
                }
            }
        }
        tracing::info!("health monitor stopped");
    }
}
