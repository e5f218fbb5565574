//! Update Checker
//!
//! Compares the running version against the latest version reported by an
//! [`UpdateSource`]. Source failures never reach the caller: they are logged
//! and reported as "no update".

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use exthost_core::{ExtensionUpdate, UpdateCheck, UpdateSource};

pub struct UpdateChecker {
    current_version: String,
    source: Arc<dyn UpdateSource>,
}

impl UpdateChecker {
    pub fn new(current_version: impl Into<String>, source: Arc<dyn UpdateSource>) -> Self {
        Self { current_version: current_version.into(), source }
    }

    pub fn current_version(&self) -> &str {
        &self.current_version
    }

    /// Query the source once. Never fails.
    pub async fn check(&self) -> UpdateCheck {
        let latest = match self.source.latest().await {
            Ok(latest) => latest,
            Err(e) => {
                warn!(source = self.source.name(), error = %e, "Update check failed; reporting no update");
                return UpdateCheck::NoUpdate;
            }
        };

        if latest.version.trim().is_empty() {
            warn!(source = self.source.name(), "Update source returned an empty version");
            return UpdateCheck::NoUpdate;
        }

        if is_newer(&latest.version, &self.current_version) {
            info!(
                current = %self.current_version,
                latest = %latest.version,
                name = ?latest.version_name,
                "Update available"
            );
            UpdateCheck::UpdateAvailable(latest)
        } else {
            debug!(current = %self.current_version, latest = %latest.version, "No update");
            UpdateCheck::NoUpdate
        }
    }
}

/// True when `candidate` is a newer version than `current`.
///
/// Both sides are read as dotted numeric versions (`2`, `2.0`, `1.4.0.12`)
/// with an optional semver pre-release (`1.0.0-rc.1`) and build metadata.
/// Missing components count as zero, and a release outranks its
/// pre-releases. When only one side parses the versions are not comparable
/// and no update is reported; when neither parses, any different string
/// counts as newer.
pub fn is_newer(candidate: &str, current: &str) -> bool {
    match (ParsedVersion::parse(candidate), ParsedVersion::parse(current)) {
        (Some(a), Some(b)) => a > b,
        (None, None) => candidate.trim() != current.trim(),
        _ => {
            debug!(candidate, current, "Versions use incompatible formats; not an update");
            false
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
struct ParsedVersion {
    /// Numeric components with trailing zeros removed.
    numbers: Vec<u64>,
    pre: Option<semver::Prerelease>,
}

impl ParsedVersion {
    fn parse(version: &str) -> Option<Self> {
        let version = version.trim();
        let version = version.split_once('+').map_or(version, |(core, _build)| core);
        let (core, pre) = match version.split_once('-') {
            Some((core, pre)) => (core, Some(semver::Prerelease::new(pre).ok()?)),
            None => (version, None),
        };
        let mut numbers = core
            .split('.')
            .map(|p| p.parse::<u64>().ok())
            .collect::<Option<Vec<_>>>()?;
        while numbers.last() == Some(&0) {
            numbers.pop();
        }
        Some(Self { numbers, pre: pre.filter(|p| !p.is_empty()) })
    }
}

impl Ord for ParsedVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let width = self.numbers.len().max(other.numbers.len());
        let component = |v: &Self, i: usize| v.numbers.get(i).copied().unwrap_or(0);
        (0..width)
            .map(|i| component(self, i).cmp(&component(other, i)))
            .find(|o| o.is_ne())
            .unwrap_or(Ordering::Equal)
            .then_with(|| match (&self.pre, &other.pre) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Greater,
                (Some(_), None) => Ordering::Less,
                (Some(a), Some(b)) => a.cmp(b),
            })
    }
}

impl PartialOrd for ParsedVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// ---------------------------------------------------------------------------
// Update sources
// ---------------------------------------------------------------------------

/// Always reports the same latest version.
pub struct StaticUpdateSource {
    latest: ExtensionUpdate,
}

impl StaticUpdateSource {
    pub fn new(latest: ExtensionUpdate) -> Self {
        Self { latest }
    }
}

#[async_trait]
impl UpdateSource for StaticUpdateSource {
    fn name(&self) -> &str {
        "static"
    }

    async fn latest(&self) -> Result<ExtensionUpdate> {
        Ok(self.latest.clone())
    }
}

/// Fetches `{ "version": ..., "version_name": ... }` from an HTTP endpoint.
pub struct HttpUpdateSource {
    client: reqwest::Client,
    url: String,
}

impl HttpUpdateSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let url = url.into();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            bail!("update URL must be http(s): {url}");
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("build update HTTP client")?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl UpdateSource for HttpUpdateSource {
    fn name(&self) -> &str {
        "http"
    }

    async fn latest(&self) -> Result<ExtensionUpdate> {
        debug!(url = %self.url, "Fetching update manifest");
        let resp = self
            .client
            .get(&self.url)
            .send()
            .await
            .with_context(|| format!("request {}", self.url))?
            .error_for_status()
            .context("update endpoint returned an error status")?;
        let update: ExtensionUpdate = resp.json().await.context("parse update manifest")?;
        Ok(update)
    }
}
