use std::fs::File;
use std::path::Path;
use std::thread;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};

use crate::domain::Accession;
use crate::error::DerepError;

/// What the service handed back; decides how the bundle is materialized.
#[derive(Debug, Clone, Copy)]
pub struct DownloadInfo {
    pub is_zip: bool,
    pub is_gzip: bool,
}

/// The genome acquisition service: fetch one accession's sequence bundle to
/// a local path. Implementations own transport-level retries; callers own
/// caching and batch policy.
pub trait GenomeSource: Send + Sync {
    fn fetch(&self, accession: &Accession, destination: &Path) -> Result<DownloadInfo, DerepError>;
}

#[derive(Clone)]
pub struct NcbiDatasetsClient {
    client: Client,
    base_url: String,
}

impl NcbiDatasetsClient {
    pub fn new() -> Result<Self, DerepError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("derephit/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| DerepError::Filesystem(err.to_string()))?,
        );
        headers.insert("X-Datasets-Client", HeaderValue::from_static("derephit"));

        if let Ok(api_key) = std::env::var("NCBI_API_KEY") {
            if !api_key.trim().is_empty() {
                headers.insert(
                    "api-key",
                    HeaderValue::from_str(api_key.trim())
                        .map_err(|err| DerepError::Filesystem(err.to_string()))?,
                );
            }
        }

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| DerepError::NcbiHttp(err.to_string()))?;

        Ok(Self {
            client,
            base_url: "https://api.ncbi.nlm.nih.gov/datasets/v2".to_string(),
        })
    }

    fn write_response_to_file(
        &self,
        mut response: reqwest::blocking::Response,
        destination: &Path,
    ) -> Result<DownloadInfo, DerepError> {
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "NCBI request failed".to_string());
            return Err(DerepError::NcbiStatus { status, message });
        }
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("")
            .to_string();
        let is_zip = content_type.contains("zip");
        let is_gzip = content_type.contains("gzip");

        let mut file =
            File::create(destination).map_err(|err| DerepError::Filesystem(err.to_string()))?;
        std::io::copy(&mut response, &mut file)
            .map_err(|err| DerepError::Filesystem(err.to_string()))?;
        Ok(DownloadInfo { is_zip, is_gzip })
    }

    fn send_with_retries<F>(
        &self,
        mut make_req: F,
    ) -> Result<reqwest::blocking::Response, DerepError>
    where
        F: FnMut() -> reqwest::blocking::RequestBuilder,
    {
        const MAX_RETRIES: usize = 3;
        const BASE_DELAY_MS: u64 = 200;
        let mut attempt = 0usize;
        loop {
            let response = make_req().send();
            match response {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < MAX_RETRIES && is_retryable_status(status) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < MAX_RETRIES && is_retryable_error(&err) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Err(DerepError::NcbiHttp(err.to_string()));
                }
            }
        }
    }
}

impl GenomeSource for NcbiDatasetsClient {
    fn fetch(&self, accession: &Accession, destination: &Path) -> Result<DownloadInfo, DerepError> {
        let url = format!(
            "{}/genome/accession/{}/download",
            self.base_url,
            accession.as_str()
        );
        let response = self.send_with_retries(|| {
            self.client
                .get(&url)
                .query(&[("include_annotation_type", "GENOME_FASTA")])
        })?;
        self.write_response_to_file(response, destination)
    }
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}
