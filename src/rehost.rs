//! Re-hosting — pushes fetched assets into durable object storage and
//! computes their new canonical URL. Never touches the catalog; the
//! reconcile stage owns that.

use std::path::Path;

use async_trait::async_trait;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RehostError {
    /// The bucket probe at run start failed; the rehost stage is disabled
    /// for the run rather than aborting it.
    #[error("object store unreachable: {0}")]
    Probe(String),

    #[error("upload failed for {key}: {message}")]
    Upload { key: String, message: String },
}

/// Upload seam between the pipeline and S3; tests substitute an in-memory
/// implementation.
#[async_trait]
pub trait Rehost: Send + Sync {
    /// Upload `local_path` under `filename`, returning the canonical
    /// externally reachable URL.
    async fn upload(&self, local_path: &Path, filename: &str) -> Result<String, RehostError>;
}

/// Destination bucket addressing.
#[derive(Debug, Clone)]
pub struct RehostTarget {
    pub bucket: String,
    /// Optional key prefix ("folder") inside the bucket.
    pub key_prefix: String,
    pub region: String,
}

impl RehostTarget {
    /// Object key for a filename, prefix applied.
    pub fn key_for(&self, filename: &str) -> String {
        let prefix = self.key_prefix.trim_matches('/');
        if prefix.is_empty() {
            filename.to_string()
        } else {
            format!("{prefix}/{filename}")
        }
    }

    /// Public-read address: `https://{bucket}.s3.{region}.amazonaws.com/{key}`.
    pub fn public_url(&self, key: &str) -> String {
        format!(
            "https://{}.s3.{}.amazonaws.com/{}",
            self.bucket, self.region, key
        )
    }
}

/// S3-backed rehoster.
pub struct S3Rehoster {
    client: aws_sdk_s3::Client,
    target: RehostTarget,
}

impl S3Rehoster {
    /// Build a client from the standard AWS environment chain and probe the
    /// bucket so an unreachable store is detected at run start.
    pub async fn connect(target: RehostTarget) -> Result<Self, RehostError> {
        let config = aws_config::from_env()
            .region(aws_config::Region::new(target.region.clone()))
            .load()
            .await;
        let client = aws_sdk_s3::Client::new(&config);

        client
            .head_bucket()
            .bucket(&target.bucket)
            .send()
            .await
            .map_err(|e| RehostError::Probe(format!("{}", DisplayErrorContext(&e))))?;

        Ok(Self { client, target })
    }
}

#[async_trait]
impl Rehost for S3Rehoster {
    async fn upload(&self, local_path: &Path, filename: &str) -> Result<String, RehostError> {
        let key = self.target.key_for(filename);

        let body = ByteStream::from_path(local_path)
            .await
            .map_err(|e| RehostError::Upload {
                key: key.clone(),
                message: e.to_string(),
            })?;

        self.client
            .put_object()
            .bucket(&self.target.bucket)
            .key(&key)
            .content_type(content_type_for(filename))
            .body(body)
            .send()
            .await
            .map_err(|e| RehostError::Upload {
                key: key.clone(),
                message: format!("{}", DisplayErrorContext(&e)),
            })?;

        Ok(self.target.public_url(&key))
    }
}

/// Content type from the file extension; unknown extensions upload as
/// octet-stream rather than failing.
pub fn content_type_for(filename: &str) -> &'static str {
    let ext = filename
        .rsplit('.')
        .next()
        .unwrap_or("")
        .to_ascii_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(prefix: &str) -> RehostTarget {
        RehostTarget {
            bucket: "assets".into(),
            key_prefix: prefix.into(),
            region: "eu-west-1".into(),
        }
    }

    #[test]
    fn key_without_prefix_is_filename() {
        assert_eq!(target("").key_for("a.png"), "a.png");
    }

    #[test]
    fn key_prefix_is_normalized() {
        assert_eq!(target("images").key_for("a.png"), "images/a.png");
        assert_eq!(target("/images/").key_for("a.png"), "images/a.png");
    }

    #[test]
    fn public_url_is_region_qualified() {
        let t = target("images");
        assert_eq!(
            t.public_url(&t.key_for("a.png")),
            "https://assets.s3.eu-west-1.amazonaws.com/images/a.png"
        );
    }

    #[test]
    fn content_types_cover_the_extension_allow_list() {
        assert_eq!(content_type_for("a.jpg"), "image/jpeg");
        assert_eq!(content_type_for("a.JPEG"), "image/jpeg");
        assert_eq!(content_type_for("a.png"), "image/png");
        assert_eq!(content_type_for("a.gif"), "image/gif");
        assert_eq!(content_type_for("a.bmp"), "image/bmp");
        assert_eq!(content_type_for("a.webp"), "image/webp");
        assert_eq!(content_type_for("a.svg"), "image/svg+xml");
        assert_eq!(content_type_for("a.bin"), "application/octet-stream");
        assert_eq!(content_type_for("noext"), "application/octet-stream");
    }
}
