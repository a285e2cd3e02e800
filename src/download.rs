//! Streaming installer download with progress and cooperative cancellation.
//!
//! The downloader streams the package URL into a caller-supplied temporary
//! directory in fixed 16 KiB chunks, writing each chunk to disk immediately.
//! When the response declares a positive `Content-Length`, a whole-percent
//! progress value is recomputed after every chunk and reported through the
//! progress callback; emitted percents are monotonically non-decreasing and
//! reach 100 exactly when the declared byte count has been written. Without a
//! usable `Content-Length` the transfer is all-or-nothing and no progress is
//! reported.
//!
//! Cancellation is cooperative at chunk granularity: the token is consulted
//! before each read and can also interrupt a read that is blocked on a stalled
//! connection. A cancelled transfer leaves the partial file in place (the
//! caller decides cleanup) and reports [`DownloadOutcome::Cancelled`], which
//! is an outcome, not an error.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::TryStreamExt;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::DownloadError;

/// Fixed read size for the download loop.
pub const CHUNK_SIZE: usize = 16 * 1024;

/// Observer invoked with each recomputed progress percent (0–100).
pub type ProgressCallback = Arc<dyn Fn(u8) + Send + Sync>;

/// How a download invocation ended, when it did not fail.
///
/// Both variants carry the destination path: a cancelled transfer leaves its
/// partial file in place for the caller to inspect or remove.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// The full payload was written to the contained path.
    Completed(PathBuf),
    /// Cancellation was observed mid-transfer; a partial file remains at the
    /// contained path.
    Cancelled(PathBuf),
}

/// Streams a remote package into a local file.
///
/// Stateless per invocation: each [`download`](Downloader::download) call
/// receives everything it needs as parameters and retains nothing.
#[derive(Debug, Clone)]
pub struct Downloader {
    client: reqwest::Client,
}

impl Default for Downloader {
    fn default() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Downloader {
    /// Create a downloader with a default HTTP client.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a downloader reusing an existing HTTP client, so connection
    /// pools and any configured request timeout are shared with the poller.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Derive the destination file name from a package URL: the final path
    /// segment, percent-decoded.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::InvalidUrl`] for an unparseable URL and
    /// [`DownloadError::NoFileName`] when the path has no usable final
    /// segment (for example a bare host or a trailing slash).
    pub fn file_name_from_url(url: &str) -> Result<String, DownloadError> {
        let parsed = Url::parse(url)?;
        let segment = parsed
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|segment| !segment.is_empty())
            .ok_or_else(|| DownloadError::NoFileName {
                url: url.to_string(),
            })?;

        let decoded = percent_encoding::percent_decode_str(segment)
            .decode_utf8()
            .map_err(|_| DownloadError::NoFileName {
                url: url.to_string(),
            })?;
        Ok(decoded.into_owned())
    }

    /// Download `url` into `dest_dir`, reporting progress and honoring
    /// cancellation.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Transport`] for request failures and error
    /// statuses, [`DownloadError::Truncated`] when the connection ends with
    /// declared bytes outstanding, and [`DownloadError::Io`] for filesystem
    /// failures. Cancellation is reported through
    /// [`DownloadOutcome::Cancelled`], not as an error.
    pub async fn download(
        &self,
        url: &str,
        dest_dir: &Path,
        cancel: &CancellationToken,
        progress: Option<ProgressCallback>,
    ) -> Result<DownloadOutcome, DownloadError> {
        let file_name = Self::file_name_from_url(url)?;
        let dest = dest_dir.join(&file_name);

        let response = self.client.get(url).send().await?.error_for_status()?;
        // Content-Length of zero is as useless as none at all for progress.
        let declared = response.content_length().filter(|&len| len > 0);

        match declared {
            Some(total) => {
                info!(total, path = %dest.display(), "starting installer download");
            }
            None => {
                warn!(
                    path = %dest.display(),
                    "no usable content length; downloading without progress"
                );
            }
        }

        let stream = response.bytes_stream().map_err(std::io::Error::other);
        let mut reader = StreamReader::new(stream);
        let mut file = File::create(&dest).await?;

        let mut buf = vec![0u8; CHUNK_SIZE];
        let mut written: u64 = 0;

        loop {
            if cancel.is_cancelled() {
                warn!(written, path = %dest.display(), "download cancelled");
                file.flush().await?;
                return Ok(DownloadOutcome::Cancelled(dest));
            }

            // Never read past the declared length; a server that keeps
            // sending after Content-Length does not extend the file.
            let limit = match declared {
                Some(total) => {
                    let remaining = total.saturating_sub(written);
                    if remaining == 0 {
                        break;
                    }
                    CHUNK_SIZE.min(remaining as usize)
                }
                None => CHUNK_SIZE,
            };

            let read = tokio::select! {
                () = cancel.cancelled() => {
                    warn!(written, path = %dest.display(), "download cancelled mid-read");
                    file.flush().await?;
                    return Ok(DownloadOutcome::Cancelled(dest));
                }
                read = reader.read(&mut buf[..limit]) => read,
            };

            let n = match read {
                Ok(n) => n,
                Err(err) => {
                    // A mid-body stream failure with declared bytes still
                    // outstanding is a truncated transfer, whatever the
                    // underlying transport reported.
                    return match declared {
                        Some(total) if written < total => {
                            warn!(written, total, error = %err, "stream ended early");
                            Err(DownloadError::Truncated {
                                received: written,
                                expected: total,
                            })
                        }
                        _ => Err(DownloadError::Io(err)),
                    };
                }
            };

            if n == 0 {
                match declared {
                    Some(total) if written < total => {
                        warn!(written, total, "zero-byte read with bytes outstanding");
                        return Err(DownloadError::Truncated {
                            received: written,
                            expected: total,
                        });
                    }
                    _ => break,
                }
            }

            file.write_all(&buf[..n]).await?;
            written += n as u64;

            if let (Some(total), Some(report)) = (declared, progress.as_ref()) {
                let percent = ((written as f64 / total as f64) * 100.0).round() as u8;
                report(percent);
            }
        }

        file.flush().await?;
        debug!(written, path = %dest.display(), "download complete");
        Ok(DownloadOutcome::Completed(dest))
    }
}
