//! A minimal S3-compatible client: the six verbs the multipart upload protocol needs, each a
//! SigV4-signed `reqwest` call against a user-configured, path-style endpoint.

use chrono::Utc;
use reqwest::{Client, StatusCode};
use revaer_jobs_core::PartETag;

use crate::error::{S3Error, S3Result};
use crate::sigv4::{encode_uri_path, sign_request};

/// Connection details for one S3-compatible bucket.
#[derive(Debug, Clone)]
pub struct S3Config {
    /// Path-style endpoint, e.g. `https://s3.us-east-1.amazonaws.com` or a B2/MinIO equivalent.
    pub endpoint: String,
    /// Bucket name.
    pub bucket: String,
    /// Signing region; S3-compatible providers without real regions commonly accept `us-east-1`.
    pub region: String,
    /// Access key id.
    pub access_key_id: String,
    /// Secret access key.
    pub secret_access_key: String,
}

/// Thin signed-request client over the S3 multipart upload API.
pub struct S3Client {
    http_client: Client,
    config: S3Config,
    host: String,
}

impl S3Client {
    /// Build a client bound to one bucket's credentials and endpoint.
    ///
    /// # Panics
    ///
    /// Panics if `config.endpoint` is not a valid URL with a host component.
    #[must_use]
    pub fn new(http_client: Client, config: S3Config) -> Self {
        let host = reqwest::Url::parse(&config.endpoint)
            .ok()
            .and_then(|url| url.host_str().map(str::to_string))
            .unwrap_or_else(|| config.endpoint.clone());
        Self { http_client, config, host }
    }

    fn bucket_uri(&self) -> String {
        encode_uri_path(&format!("/{}", self.config.bucket))
    }

    fn object_uri(&self, key: &str) -> String {
        encode_uri_path(&format!("/{}/{key}", self.config.bucket))
    }

    fn url(&self, uri: &str, query: &str) -> String {
        let base = format!("{}{uri}", self.config.endpoint.trim_end_matches('/'));
        if query.is_empty() { base } else { format!("{base}?{query}") }
    }

    fn signed_headers(&self, method: &str, key: &str, query: &str, payload: &[u8]) -> Vec<(&'static str, String)> {
        sign_request(
            &self.config.access_key_id,
            &self.config.secret_access_key,
            &self.config.region,
            method,
            &self.host,
            &self.object_uri(key),
            query,
            payload,
            Utc::now(),
        )
        .headers
    }

    /// `HEAD` an object; returns `true` if it exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the request itself fails (a 404 is a normal, successful "does not
    /// exist" result, not an error).
    pub async fn head_object(&self, key: &str) -> S3Result<bool> {
        let headers = self.signed_headers("HEAD", key, "", b"");
        let mut request = self.http_client.head(self.url(&self.object_uri(key), ""));
        for (name, value) in headers {
            request = request.header(name, value);
        }
        let response = request.send().await?;
        Ok(response.status().is_success())
    }

    /// Verify bucket access by listing a single object, per the provider-credential check.
    ///
    /// # Errors
    ///
    /// Returns [`S3Error::AccessDenied`] on 403, [`S3Error::BucketNotFound`] on 404, or
    /// [`S3Error::S3Error`] on any other unexpected status.
    pub async fn verify_bucket_access(&self) -> S3Result<()> {
        let query = "list-type=2&max-keys=1";
        let headers = sign_request(
            &self.config.access_key_id,
            &self.config.secret_access_key,
            &self.config.region,
            "GET",
            &self.host,
            &self.bucket_uri(),
            query,
            b"",
            Utc::now(),
        )
        .headers;
        let mut request = self.http_client.get(self.url(&self.bucket_uri(), query));
        for (name, value) in headers {
            request = request.header(name, value);
        }
        let response = request.send().await?;
        match response.status() {
            StatusCode::OK => Ok(()),
            StatusCode::FORBIDDEN => Err(S3Error::AccessDenied { bucket: self.config.bucket.clone() }),
            StatusCode::NOT_FOUND => Err(S3Error::BucketNotFound { bucket: self.config.bucket.clone() }),
            status => Err(s3_error(status, "verify_bucket_access", response_body_excerpt(response).await)),
        }
    }

    /// Start a multipart upload, returning the server-assigned upload id.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response XML has no `UploadId`.
    pub async fn create_multipart_upload(&self, key: &str) -> S3Result<String> {
        let headers = self.signed_headers("POST", key, "uploads", b"");
        let mut request = self.http_client.post(self.url(&self.object_uri(key), "uploads"));
        for (name, value) in headers {
            request = request.header(name, value);
        }
        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response_body_excerpt(response).await;
            return Err(s3_error(status, "create_multipart_upload", body));
        }
        let body = response.text().await?;
        extract_xml_field(&body, "UploadId")
            .ok_or_else(|| s3_error(StatusCode::OK, "create_multipart_upload (missing UploadId)", body))
    }

    /// Upload one part, returning its ETag.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response has no `ETag` header.
    pub async fn upload_part(&self, key: &str, upload_id: &str, part_number: u32, body: Vec<u8>) -> S3Result<String> {
        let query = format!("partNumber={part_number}&uploadId={upload_id}");
        let headers = self.signed_headers("PUT", key, &query, &body);
        let mut request = self.http_client.put(self.url(&self.object_uri(key), &query)).body(body);
        for (name, value) in headers {
            request = request.header(name, value);
        }
        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let detail = response_body_excerpt(response).await;
            return Err(s3_error(status, "upload_part", detail));
        }
        let etag = response
            .headers()
            .get("ETag")
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim_matches('"').to_string())
            .ok_or_else(|| s3_error(StatusCode::OK, "upload_part (missing ETag)", String::new()))?;
        Ok(etag)
    }

    /// List the parts the server has recorded for an in-progress multipart upload.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response XML cannot be parsed.
    pub async fn list_parts(&self, key: &str, upload_id: &str) -> S3Result<Vec<PartETag>> {
        let query = format!("uploadId={upload_id}");
        let headers = self.signed_headers("GET", key, &query, b"");
        let mut request = self.http_client.get(self.url(&self.object_uri(key), &query));
        for (name, value) in headers {
            request = request.header(name, value);
        }
        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let detail = response_body_excerpt(response).await;
            return Err(s3_error(status, "list_parts", detail));
        }
        let body = response.text().await?;
        Ok(parse_list_parts(&body))
    }

    /// Complete a multipart upload given the sorted, final part ETags.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn complete_multipart_upload(&self, key: &str, upload_id: &str, parts: &[PartETag]) -> S3Result<()> {
        let query = format!("uploadId={upload_id}");
        let body = build_complete_multipart_body(parts);
        let headers = self.signed_headers("POST", key, &query, body.as_bytes());
        let mut request = self.http_client.post(self.url(&self.object_uri(key), &query)).body(body);
        for (name, value) in headers {
            request = request.header(name, value);
        }
        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let detail = response_body_excerpt(response).await;
            return Err(s3_error(status, "complete_multipart_upload", detail));
        }
        Ok(())
    }

    /// Abort an in-flight multipart upload, freeing its storage on the server.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> S3Result<()> {
        let query = format!("uploadId={upload_id}");
        let headers = self.signed_headers("DELETE", key, &query, b"");
        let mut request = self.http_client.delete(self.url(&self.object_uri(key), &query));
        for (name, value) in headers {
            request = request.header(name, value);
        }
        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let detail = response_body_excerpt(response).await;
            return Err(s3_error(status, "abort_multipart_upload", detail));
        }
        Ok(())
    }
}

fn s3_error(status: StatusCode, operation: &'static str, detail: String) -> S3Error {
    S3Error::S3Error { status: status.as_u16(), operation, detail }
}

async fn response_body_excerpt(response: reqwest::Response) -> String {
    response.text().await.unwrap_or_default().chars().take(500).collect()
}

/// Extract a single top-level XML field's text content by manual string splitting, matching the
/// no-XML-crate idiom for S3 response parsing.
fn extract_xml_field(xml: &str, field: &str) -> Option<String> {
    let open = format!("<{field}>");
    let close = format!("</{field}>");
    xml.split(&open).nth(1)?.split(&close).next().map(str::to_string)
}

fn parse_list_parts(xml: &str) -> Vec<PartETag> {
    xml.split("<Part>")
        .skip(1)
        .filter_map(|chunk| {
            let part_number = extract_xml_field(chunk, "PartNumber")?.parse().ok()?;
            let etag = extract_xml_field(chunk, "ETag")?.trim_matches('"').to_string();
            Some(PartETag { part_number, etag })
        })
        .collect()
}

fn build_complete_multipart_body(parts: &[PartETag]) -> String {
    let mut sorted = parts.to_vec();
    sorted.sort_by_key(|part| part.part_number);
    let mut body = String::from("<CompleteMultipartUpload>");
    for part in sorted {
        body.push_str(&format!(
            "<Part><PartNumber>{}</PartNumber><ETag>\"{}\"</ETag></Part>",
            part.part_number, part.etag
        ));
    }
    body.push_str("</CompleteMultipartUpload>");
    body
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_xml_field_reads_the_first_match() {
        let xml = "<InitiateMultipartUploadResult><Bucket>b</Bucket><Key>k</Key><UploadId>abc123</UploadId></InitiateMultipartUploadResult>";
        assert_eq!(extract_xml_field(xml, "UploadId"), Some("abc123".to_string()));
    }

    #[test]
    fn extract_xml_field_returns_none_when_absent() {
        assert_eq!(extract_xml_field("<Foo></Foo>", "UploadId"), None);
    }

    #[test]
    fn parse_list_parts_reads_every_part_entry() {
        let xml = r#"<ListPartsResult>
            <Part><PartNumber>1</PartNumber><ETag>"aaa"</ETag></Part>
            <Part><PartNumber>2</PartNumber><ETag>"bbb"</ETag></Part>
        </ListPartsResult>"#;
        let parts = parse_list_parts(xml);
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].part_number, 1);
        assert_eq!(parts[0].etag, "aaa");
        assert_eq!(parts[1].etag, "bbb");
    }

    #[test]
    fn complete_multipart_body_sorts_parts_ascending() {
        let parts = vec![
            PartETag { part_number: 2, etag: "bbb".into() },
            PartETag { part_number: 1, etag: "aaa".into() },
        ];
        let body = build_complete_multipart_body(&parts);
        let first = body.find("aaa").unwrap();
        let second = body.find("bbb").unwrap();
        assert!(first < second);
    }
}
