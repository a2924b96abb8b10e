// Cloud Storage JSON API: media upload and download of whole objects.

use bytes::Bytes;
use tracing::debug;
use url::Url;

use crate::error::{GcpError, Result};
use crate::session::{check_status, GcpSession};

const BASE_URL: &str = "https://storage.googleapis.com";

pub struct StorageClient {
    session: GcpSession,
    base_url: String,
}

impl StorageClient {
    pub fn new(session: GcpSession) -> Self {
        Self {
            session,
            base_url: BASE_URL.to_string(),
        }
    }

    pub async fn upload(
        &self,
        bucket: &str,
        name: &str,
        body: Bytes,
        content_type: &str,
    ) -> Result<()> {
        let url = upload_url(&self.base_url, bucket, name)?;
        let token = self.session.bearer().await?;

        debug!(bucket, name, bytes = body.len(), content_type, "Uploading object");

        let resp = self
            .session
            .http()
            .post(url)
            .bearer_auth(token)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await?;

        check_status(resp, &format!("gs://{bucket}")).await?;
        Ok(())
    }

    /// Fetch an object's bytes. Missing objects are `GcpError::NotFound`.
    pub async fn download(&self, bucket: &str, name: &str) -> Result<Bytes> {
        let url = download_url(&self.base_url, bucket, name)?;
        let token = self.session.bearer().await?;

        let resp = self
            .session
            .http()
            .get(url)
            .bearer_auth(token)
            .send()
            .await?;

        let resp = check_status(resp, &format!("gs://{bucket}/{name}")).await?;
        Ok(resp.bytes().await?)
    }
}

fn upload_url(base: &str, bucket: &str, name: &str) -> Result<Url> {
    let mut url = Url::parse(base)?;
    url.path_segments_mut()
        .map_err(|_| GcpError::Parse(format!("{base} cannot be a base URL")))?
        .extend(["upload", "storage", "v1", "b", bucket, "o"]);
    url.query_pairs_mut()
        .append_pair("uploadType", "media")
        .append_pair("name", name);
    Ok(url)
}

fn download_url(base: &str, bucket: &str, name: &str) -> Result<Url> {
    let mut url = Url::parse(base)?;
    // Object names go in a single path segment, so '/' is percent-encoded.
    url.path_segments_mut()
        .map_err(|_| GcpError::Parse(format!("{base} cannot be a base URL")))?
        .extend(["storage", "v1", "b", bucket, "o", name]);
    url.query_pairs_mut().append_pair("alt", "media");
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn download_url_encodes_object_path() {
        let url = download_url(BASE_URL, "lighthouse-reports", "ebay/state.json").unwrap();
        assert_eq!(
            url.as_str(),
            "https://storage.googleapis.com/storage/v1/b/lighthouse-reports/o/ebay%2Fstate.json?alt=media"
        );
    }

    #[test]
    fn upload_url_passes_name_as_query() {
        let url = upload_url(BASE_URL, "bucket", "ebay/report_2018-12-17T10:56:56.420Z.html").unwrap();
        assert!(url.as_str().starts_with("https://storage.googleapis.com/upload/storage/v1/b/bucket/o?"));
        let name = url
            .query_pairs()
            .find(|(k, _)| k == "name")
            .map(|(_, v)| v.into_owned());
        assert_eq!(name.as_deref(), Some("ebay/report_2018-12-17T10:56:56.420Z.html"));
    }
}
