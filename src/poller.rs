//! Background release polling.
//!
//! The poller runs an indefinite fetch/compare/sleep loop on its own tokio
//! task, strictly sequentially: one best-effort GET per iteration, never
//! overlapping. A parsed manifest whose version exceeds the running version
//! is delivered through the channel handed to [`start`](UpdatePoller::start);
//! every transient failure (network, status, parse) is absorbed into a log
//! line and the loop waits for the next interval.
//!
//! Stopping is cooperative: the cancellation token interrupts both the
//! interval sleep and an in-flight fetch, so [`stop`](UpdatePoller::stop)
//! returns promptly even mid-sleep or against a stalled endpoint.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::FetchError;
use crate::manifest::ReleaseManifest;
use crate::version::ReleaseVersion;

/// Default time between update checks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Periodically checks an update endpoint for a newer release.
pub struct UpdatePoller {
    client: reqwest::Client,
    endpoint: String,
    running_version: ReleaseVersion,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl UpdatePoller {
    /// Create a poller for `endpoint`, comparing against `running_version`.
    pub fn new(
        client: reqwest::Client,
        endpoint: impl Into<String>,
        running_version: ReleaseVersion,
    ) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            running_version,
            cancel: CancellationToken::new(),
            handle: None,
        }
    }

    /// Whether the background loop is currently active.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    /// Start the check loop if it is not already running.
    ///
    /// Idempotent: calling `start` while the loop is active is a no-op, so
    /// exactly one loop exists per poller. Newer manifests are sent through
    /// `available_tx`; if the receiver goes away the loop exits.
    pub fn start(&mut self, interval: Duration, available_tx: mpsc::Sender<ReleaseManifest>) {
        if self.is_running() {
            debug!(endpoint = %self.endpoint, "update check loop already running");
            return;
        }

        info!(endpoint = %self.endpoint, ?interval, "starting update check loop");
        let cancel = CancellationToken::new();
        self.cancel = cancel.clone();

        let client = self.client.clone();
        let endpoint = self.endpoint.clone();
        let running_version = self.running_version.clone();

        self.handle = Some(tokio::spawn(async move {
            loop {
                let outcome = tokio::select! {
                    () = cancel.cancelled() => break,
                    outcome = check_once(&client, &endpoint, &running_version) => outcome,
                };

                match outcome {
                    Ok(Some(manifest)) => {
                        info!(
                            manifest_version = %manifest.version,
                            running_version = %running_version,
                            "newer release available"
                        );
                        if available_tx.send(manifest).await.is_err() {
                            debug!("update notification receiver dropped; stopping loop");
                            break;
                        }
                    }
                    Ok(None) => debug!(endpoint = %endpoint, "no newer release"),
                    Err(err) => {
                        // Transient by definition; never terminates the loop.
                        warn!(endpoint = %endpoint, error = %err, "update check failed");
                    }
                }

                tokio::select! {
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(interval) => {}
                }
            }
            debug!("update check loop exited");
        }));
    }

    /// Request the loop to exit and wait for it to finish.
    ///
    /// Returns promptly: cancellation interrupts the interval sleep and any
    /// in-flight fetch. Calling `stop` when not running is a no-op.
    pub async fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(err) = handle.await {
                warn!(error = %err, "update check loop panicked");
            }
        }
    }
}

impl Drop for UpdatePoller {
    fn drop(&mut self) {
        // Best effort: the task notices on its next cancellation check.
        self.cancel.cancel();
    }
}

/// One poll iteration: fetch, parse, compare.
///
/// A response without a positive `Content-Length` means "no manifest this
/// iteration" and is skipped rather than treated as a failure.
async fn check_once(
    client: &reqwest::Client,
    endpoint: &str,
    running_version: &ReleaseVersion,
) -> Result<Option<ReleaseManifest>, FetchError> {
    let response = client.get(endpoint).send().await?.error_for_status()?;

    if response.content_length().is_none_or(|len| len == 0) {
        debug!(endpoint = %endpoint, "endpoint returned no manifest body; skipping");
        return Ok(None);
    }

    let bytes = response.bytes().await?;
    let manifest = ReleaseManifest::parse(&bytes)?;

    if manifest.version > *running_version {
        Ok(Some(manifest))
    } else {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use std::time::Instant;

    fn manifest_xml(version: &str) -> String {
        format!(
            "<ReleaseManifest>\
                <Name>Example App</Name>\
                <Version>{version}</Version>\
                <PackageUrl>https://releases.example.com/pkg.msi</PackageUrl>\
                <ReleaseNotesUrl>https://releases.example.com/notes</ReleaseNotesUrl>\
            </ReleaseManifest>"
        )
    }

    fn running() -> ReleaseVersion {
        "1.0.0".parse().unwrap()
    }

    #[tokio::test]
    async fn delivers_newer_manifest() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/manifest.xml");
            then.status(200).body(manifest_xml("2.0.0"));
        });

        let (tx, mut rx) = mpsc::channel(1);
        let mut poller =
            UpdatePoller::new(reqwest::Client::new(), server.url("/manifest.xml"), running());
        poller.start(Duration::from_secs(3600), tx);

        let manifest = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("poller did not deliver in time")
            .expect("channel closed");
        assert_eq!(manifest.version, "2.0.0".parse().unwrap());

        poller.stop().await;
    }

    #[tokio::test]
    async fn same_or_older_version_is_not_delivered() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/manifest.xml");
            then.status(200).body(manifest_xml("1.0"));
        });

        let (tx, mut rx) = mpsc::channel(1);
        let mut poller =
            UpdatePoller::new(reqwest::Client::new(), server.url("/manifest.xml"), running());
        poller.start(Duration::from_secs(3600), tx);

        // Give the first iteration time to complete, then confirm silence.
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(rx.try_recv().is_err());
        mock.assert();

        poller.stop().await;
    }

    #[tokio::test]
    async fn fetch_failure_does_not_kill_the_loop() {
        let server = MockServer::start();
        let mut bad = server.mock(|when, then| {
            when.method(GET).path("/manifest.xml");
            then.status(200).body("this is not xml");
        });

        let (tx, mut rx) = mpsc::channel(1);
        let mut poller =
            UpdatePoller::new(reqwest::Client::new(), server.url("/manifest.xml"), running());
        poller.start(Duration::from_millis(100), tx);

        // Let at least one failing iteration happen, then swap in a good
        // manifest; a delivery proves the loop survived the parse failure.
        tokio::time::sleep(Duration::from_millis(250)).await;
        bad.delete();
        server.mock(|when, then| {
            when.method(GET).path("/manifest.xml");
            then.status(200).body(manifest_xml("3.1.4"));
        });

        let manifest = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("loop died after fetch failure")
            .expect("channel closed");
        assert_eq!(manifest.version, "3.1.4".parse().unwrap());

        poller.stop().await;
    }

    #[tokio::test]
    async fn start_is_idempotent() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/manifest.xml");
            then.status(200).body(manifest_xml("1.0"));
        });

        let (tx, _rx) = mpsc::channel(1);
        let mut poller =
            UpdatePoller::new(reqwest::Client::new(), server.url("/manifest.xml"), running());
        poller.start(Duration::from_secs(3600), tx.clone());
        poller.start(Duration::from_secs(3600), tx);
        assert!(poller.is_running());

        // One loop means exactly one immediate fetch within the first
        // interval; a second loop would have produced a second hit.
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(mock.hits(), 1);

        poller.stop().await;
    }

    #[tokio::test]
    async fn stop_interrupts_the_interval_sleep() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/manifest.xml");
            then.status(200).body(manifest_xml("1.0"));
        });

        let (tx, _rx) = mpsc::channel(1);
        let mut poller =
            UpdatePoller::new(reqwest::Client::new(), server.url("/manifest.xml"), running());
        poller.start(Duration::from_secs(3600), tx);

        // Let the first fetch finish so the loop is parked in its sleep.
        tokio::time::sleep(Duration::from_millis(300)).await;

        let begin = Instant::now();
        tokio::time::timeout(Duration::from_secs(2), poller.stop())
            .await
            .expect("stop() blocked on a sleeping loop");
        assert!(begin.elapsed() < Duration::from_secs(2));
        assert!(!poller.is_running());

        // Stopping again is a no-op.
        poller.stop().await;
    }

    #[tokio::test]
    async fn empty_body_is_skipped_not_an_error() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/manifest.xml");
            then.status(200);
        });

        let (tx, mut rx) = mpsc::channel(1);
        let mut poller =
            UpdatePoller::new(reqwest::Client::new(), server.url("/manifest.xml"), running());
        poller.start(Duration::from_secs(3600), tx);

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(rx.try_recv().is_err());
        mock.assert();

        poller.stop().await;
    }
}
