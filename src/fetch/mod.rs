//! Fetch engine — resolves a catalog source location to bytes on disk with
//! retry, backoff and per-attempt timeouts. Bodies stream in chunks to a
//! `.part` staging file which is renamed into place only on success, so a
//! failed fetch never leaves a partial file at the destination.

pub mod error;

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::Client;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use url::Url;

pub use error::FetchError;

use crate::retry::{self, RetryAction, RetryConfig};

/// Successful fetch outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fetched {
    pub local_path: PathBuf,
    pub byte_count: u64,
}

/// A source location after resolution: either an absolute http(s) URL or a
/// local filesystem path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Remote(Url),
    Local(PathBuf),
}

/// Resolve a raw source location into something fetchable.
///
/// - scheme-relative (`//cdn.example.com/a.png`) gets an `https:` prefix
/// - anything with a non-http(s) scheme is rejected
/// - relative locations join against `base_url` when one is supplied
/// - without a base URL, a scheme-less location is treated as a local path
///   (the asset is copied rather than downloaded)
pub fn resolve_source(location: &str, base_url: Option<&str>) -> Result<Source, FetchError> {
    let location = location.trim();
    if location.is_empty() {
        return Err(FetchError::InvalidScheme(location.to_string()));
    }

    let candidate = if location.starts_with("//") {
        format!("https:{location}")
    } else {
        location.to_string()
    };

    if candidate.contains("://") {
        let url =
            Url::parse(&candidate).map_err(|_| FetchError::InvalidScheme(candidate.clone()))?;
        return match url.scheme() {
            "http" | "https" => Ok(Source::Remote(url)),
            _ => Err(FetchError::InvalidScheme(candidate)),
        };
    }

    if let Some(base) = base_url {
        let base =
            Url::parse(base).map_err(|_| FetchError::InvalidScheme(base.to_string()))?;
        let joined = base
            .join(&candidate)
            .map_err(|_| FetchError::InvalidScheme(candidate.clone()))?;
        return match joined.scheme() {
            "http" | "https" => Ok(Source::Remote(joined)),
            _ => Err(FetchError::InvalidScheme(joined.to_string())),
        };
    }

    Ok(Source::Local(PathBuf::from(location)))
}

/// Streaming downloader with bounded retries.
///
/// Holds the shared connection pool for the run; cloned handles reuse it.
#[derive(Debug, Clone)]
pub struct FetchEngine {
    client: Client,
    retry: RetryConfig,
}

impl FetchEngine {
    /// Build an engine with separate connect-phase and read-phase timeouts
    /// bounding each attempt individually.
    pub fn new(
        connect_timeout: Duration,
        read_timeout: Duration,
        retry: RetryConfig,
    ) -> anyhow::Result<Self> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .read_timeout(read_timeout)
            .build()?;
        Ok(Self { client, retry })
    }

    /// Wrap an existing client (tests inject short timeouts this way).
    pub fn with_client(client: Client, retry: RetryConfig) -> Self {
        Self { client, retry }
    }

    /// Fetch `location` to `dest`, retrying transient failures.
    ///
    /// Local paths are copied in a single attempt; retrying a missing file
    /// cannot help.
    pub async fn fetch(
        &self,
        location: &str,
        base_url: Option<&str>,
        dest: &Path,
    ) -> Result<Fetched, FetchError> {
        match resolve_source(location, base_url)? {
            Source::Local(path) => copy_local(&path, dest).await,
            Source::Remote(url) => {
                let part_path = staging_path(dest);
                retry::retry_with_backoff(
                    &self.retry,
                    |e: &FetchError| {
                        if e.is_retryable() {
                            RetryAction::Retry
                        } else {
                            RetryAction::Abort
                        }
                    },
                    || self.attempt(&url, dest, &part_path),
                )
                .await
            }
        }
    }

    /// Single download attempt. Streams to the staging path and renames into
    /// place; any failure removes the staging file before returning.
    async fn attempt(
        &self,
        url: &Url,
        dest: &Path,
        part_path: &Path,
    ) -> Result<Fetched, FetchError> {
        // Always start from scratch; partial bytes from a failed attempt are
        // worthless without range support.
        let _ = fs::remove_file(part_path).await;

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| classify_transport(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(if status.is_client_error() {
                FetchError::HttpClient {
                    status: status.as_u16(),
                    url: url.to_string(),
                }
            } else {
                FetchError::HttpServer {
                    status: status.as_u16(),
                    url: url.to_string(),
                }
            });
        }

        if let Some(ct) = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
        {
            if !ct.starts_with("image/") {
                tracing::warn!("Content-Type '{}' is not image/* for {}", ct, url);
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(part_path)
            .await?;

        let mut byte_count: u64 = 0;
        let mut stream = response.bytes_stream();
        let write_result: Result<(), FetchError> = async {
            while let Some(chunk) = stream.next().await {
                let chunk = chunk.map_err(|e| classify_transport(url, e))?;
                file.write_all(&chunk).await?;
                byte_count += chunk.len() as u64;
            }
            file.flush().await?;
            Ok(())
        }
        .await;
        drop(file);

        if let Err(e) = write_result {
            let _ = fs::remove_file(part_path).await;
            return Err(e);
        }

        if byte_count == 0 {
            let _ = fs::remove_file(part_path).await;
            return Err(FetchError::EmptyBody {
                url: url.to_string(),
            });
        }

        if let Err(e) = fs::rename(part_path, dest).await {
            let _ = fs::remove_file(part_path).await;
            return Err(FetchError::Disk(e));
        }

        Ok(Fetched {
            local_path: dest.to_path_buf(),
            byte_count,
        })
    }
}

/// Staging path for an in-flight download: `<dest>.part` in the same
/// directory, so the final rename stays on one filesystem.
fn staging_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    dest.with_file_name(name)
}

/// Copy a local source file into the destination, via the staging path so the
/// no-partial-file invariant holds for local sources too.
async fn copy_local(source: &Path, dest: &Path) -> Result<Fetched, FetchError> {
    let meta = fs::metadata(source)
        .await
        .map_err(|_| FetchError::LocalNotFound(source.display().to_string()))?;
    if !meta.is_file() {
        return Err(FetchError::LocalNotFound(source.display().to_string()));
    }

    let part_path = staging_path(dest);
    let byte_count = match fs::copy(source, &part_path).await {
        Ok(n) => n,
        Err(e) => {
            let _ = fs::remove_file(&part_path).await;
            return Err(FetchError::Disk(e));
        }
    };
    if byte_count == 0 {
        let _ = fs::remove_file(&part_path).await;
        return Err(FetchError::EmptyBody {
            url: source.display().to_string(),
        });
    }
    if let Err(e) = fs::rename(&part_path, dest).await {
        let _ = fs::remove_file(&part_path).await;
        return Err(FetchError::Disk(e));
    }

    Ok(Fetched {
        local_path: dest.to_path_buf(),
        byte_count,
    })
}

/// Map a reqwest transport error onto the retry taxonomy.
fn classify_transport(url: &Url, e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
        }
    } else if e.is_connect() {
        FetchError::Connect {
            url: url.to_string(),
            source: e,
        }
    } else {
        FetchError::Transport {
            url: url.to_string(),
            source: e,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_absolute_http() {
        let s = resolve_source("http://host/a.png", None).unwrap();
        assert_eq!(
            s,
            Source::Remote(Url::parse("http://host/a.png").unwrap())
        );
    }

    #[test]
    fn resolve_scheme_relative_gets_https() {
        let s = resolve_source("//cdn.example.com/img/a.png", None).unwrap();
        assert_eq!(
            s,
            Source::Remote(Url::parse("https://cdn.example.com/img/a.png").unwrap())
        );
    }

    #[test]
    fn resolve_relative_joins_base_url() {
        let s = resolve_source("img/a.png", Some("https://shop.example.com/media/")).unwrap();
        assert_eq!(
            s,
            Source::Remote(Url::parse("https://shop.example.com/media/img/a.png").unwrap())
        );
    }

    #[test]
    fn resolve_rejects_foreign_schemes() {
        assert!(matches!(
            resolve_source("ftp://host/a.png", None),
            Err(FetchError::InvalidScheme(_))
        ));
        assert!(matches!(
            resolve_source("file:///tmp/a.png", None),
            Err(FetchError::InvalidScheme(_))
        ));
    }

    #[test]
    fn resolve_rejects_empty() {
        assert!(matches!(
            resolve_source("   ", None),
            Err(FetchError::InvalidScheme(_))
        ));
    }

    #[test]
    fn resolve_scheme_less_without_base_is_local() {
        let s = resolve_source("/var/media/a.png", None).unwrap();
        assert_eq!(s, Source::Local(PathBuf::from("/var/media/a.png")));
    }

    #[test]
    fn staging_path_appends_part() {
        assert_eq!(
            staging_path(Path::new("/tmp/out/a.png")),
            PathBuf::from("/tmp/out/a.png.part")
        );
    }

    #[tokio::test]
    async fn copy_local_copies_file() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src.png");
        tokio::fs::write(&src, b"pixels").await.unwrap();
        let dest = dir.path().join("dest.png");

        let fetched = copy_local(&src, &dest).await.unwrap();
        assert_eq!(fetched.byte_count, 6);
        assert_eq!(tokio::fs::read(&dest).await.unwrap(), b"pixels");
    }

    #[tokio::test]
    async fn copy_local_missing_source_fails_without_partial() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("dest.png");

        let err = copy_local(Path::new("/nonexistent/a.png"), &dest)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::LocalNotFound(_)));
        assert!(!dest.exists());
        assert!(!staging_path(&dest).exists());
    }

    #[tokio::test]
    async fn failed_rename_removes_the_staged_file() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src.png");
        tokio::fs::write(&src, b"pixels").await.unwrap();
        // A directory at the destination makes the final rename fail.
        let dest = dir.path().join("dest.png");
        tokio::fs::create_dir(&dest).await.unwrap();

        let err = copy_local(&src, &dest).await.unwrap_err();
        assert!(matches!(err, FetchError::Disk(_)));
        assert!(!staging_path(&dest).exists());
    }

    #[tokio::test]
    async fn copy_local_empty_source_is_empty_body() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("empty.png");
        tokio::fs::write(&src, b"").await.unwrap();
        let dest = dir.path().join("dest.png");

        let err = copy_local(&src, &dest).await.unwrap_err();
        assert!(matches!(err, FetchError::EmptyBody { .. }));
        assert!(!dest.exists());
        assert!(!staging_path(&dest).exists());
    }
}
