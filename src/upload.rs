use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{mpsc, Mutex};
use std::thread;
use std::time::Duration;
use reqwest::blocking::{multipart, Client};
use serde_json::Value;
use tracing::{info, warn};
use crate::error::UploadError;
use crate::{UPLOAD_ENDPOINT, UPLOAD_TIMEOUT_SECS};

/// Upper bound on concurrent uploads in a batch
pub const MAX_UPLOAD_WORKERS: usize = 4;

const MISSING_URL_REASON: &str = "Unknown error from API (URL missing in 200 OK response)";

/// What the host said about one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Uploaded(String),
    Failed(String),
}

impl UploadOutcome {
    pub fn url(&self) -> Option<&str> {
        match self {
            UploadOutcome::Uploaded(url) => Some(url),
            UploadOutcome::Failed(_) => None,
        }
    }
}

pub type UploadResult = Result<UploadOutcome, UploadError>;

/// Anything that can push a file somewhere and hand back a URL
pub trait FileUploader: Send + Sync {
    fn upload(&self, path: &Path) -> UploadResult;
}

/// Client for the s-ul.eu upload API
pub struct SulClient {
    client: Client,
    api_key: String,
    endpoint: String,
}

impl SulClient {
    pub fn new(api_key: &str) -> Result<Self, UploadError> {
        Self::with_endpoint(api_key, UPLOAD_ENDPOINT, Duration::from_secs(UPLOAD_TIMEOUT_SECS))
    }

    pub fn with_endpoint(api_key: &str, endpoint: &str, timeout: Duration) -> Result<Self, UploadError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("team_banners/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| UploadError::Client(e.to_string()))?;
        Ok(Self {
            client,
            api_key: api_key.trim().to_string(),
            endpoint: endpoint.to_string(),
        })
    }
}

impl FileUploader for SulClient {
    fn upload(&self, path: &Path) -> UploadResult {
        if self.api_key.is_empty() {
            return Err(UploadError::MissingApiKey);
        }
        if !path.is_file() {
            return Err(UploadError::MissingFile(path.to_path_buf()));
        }

        let name = path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
        info!("Uploading '{}'", name);

        let form = match multipart::Form::new()
            .text("wizard", "true")
            .text("key", self.api_key.clone())
            .file("file", path)
        {
            Ok(form) => form,
            Err(e) => return Ok(failed(&name, format!("could not read file: {}", e))),
        };

        let response = match self.client.post(&self.endpoint).multipart(form).send() {
            Ok(response) => response,
            Err(e) if e.is_timeout() => return Ok(failed(&name, "request timed out".to_string())),
            Err(e) if e.is_connect() => return Ok(failed(&name, format!("connection error: {}", e))),
            Err(e) => return Ok(failed(&name, format!("request failed: {}", e))),
        };

        let status = response.status().as_u16();
        let body = match response.text() {
            Ok(body) => body,
            Err(e) => return Ok(failed(&name, format!("could not read response: {}", e))),
        };

        let outcome = parse_response(status, &body);
        match &outcome {
            UploadOutcome::Uploaded(url) => info!("Uploaded '{}' -> {}", name, url),
            UploadOutcome::Failed(reason) => warn!("Upload of '{}' failed: {}", name, reason),
        }
        Ok(outcome)
    }
}

fn failed(name: &str, reason: String) -> UploadOutcome {
    warn!("Upload of '{}' failed: {}", name, reason);
    UploadOutcome::Failed(reason)
}

/// Interpret an API reply: success needs a 2xx status and a non-empty `url`
pub fn parse_response(status: u16, body: &str) -> UploadOutcome {
    let json: Option<Value> = serde_json::from_str(body).ok();
    let field = |key: &str| {
        json.as_ref()
            .and_then(|v| v.get(key))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    let success = (200..300).contains(&status);
    if success {
        if let Some(url) = field("url") {
            return UploadOutcome::Uploaded(url);
        }
    }

    if let Some(error) = field("error") {
        return UploadOutcome::Failed(error);
    }
    if success {
        return UploadOutcome::Failed(MISSING_URL_REASON.to_string());
    }

    let snippet: String = body.trim().chars().take(200).collect();
    if snippet.is_empty() {
        UploadOutcome::Failed(format!("HTTP {}", status))
    } else {
        UploadOutcome::Failed(format!("HTTP {}: {}", status, snippet))
    }
}

/// Upload every path on a small pool of worker threads.
///
/// Workers report `(index, result)` over a channel; `on_result` runs on the
/// calling thread as each report arrives. Returns once all jobs are done, in
/// job order. Workers never touch the ledger.
pub fn upload_all<F>(uploader: &dyn FileUploader, jobs: &[PathBuf], mut on_result: F) -> Vec<UploadResult>
where
    F: FnMut(usize, &UploadResult),
{
    if jobs.is_empty() {
        return Vec::new();
    }

    let queue: Mutex<VecDeque<usize>> = Mutex::new((0..jobs.len()).collect());
    let (tx, rx) = mpsc::channel::<(usize, UploadResult)>();
    let workers = jobs.len().min(MAX_UPLOAD_WORKERS);
    let mut results: Vec<Option<UploadResult>> = (0..jobs.len()).map(|_| None).collect();

    thread::scope(|scope| {
        for _ in 0..workers {
            let tx = tx.clone();
            let queue = &queue;
            scope.spawn(move || loop {
                let next = match queue.lock() {
                    Ok(mut pending) => pending.pop_front(),
                    Err(_) => None,
                };
                let Some(index) = next else { break };
                let result = uploader.upload(&jobs[index]);
                if tx.send((index, result)).is_err() {
                    break;
                }
            });
        }
        drop(tx);

        for (index, result) in rx {
            on_result(index, &result);
            results[index] = Some(result);
        }
    });

    results
        .into_iter()
        .zip(jobs)
        .map(|(result, path)| {
            result.unwrap_or_else(|| Ok(UploadOutcome::Failed(format!(
                "worker stopped before uploading {}",
                path.display()
            ))))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_with_url_is_uploaded() {
        let outcome = parse_response(200, r#"{"url": "https://s-ul.eu/abc.png", "filename": "abc.png"}"#);
        assert_eq!(outcome, UploadOutcome::Uploaded("https://s-ul.eu/abc.png".to_string()));
        assert_eq!(outcome.url(), Some("https://s-ul.eu/abc.png"));
    }

    #[test]
    fn ok_without_url_is_failure() {
        assert_eq!(
            parse_response(200, r#"{"filename": "abc.png"}"#),
            UploadOutcome::Failed(MISSING_URL_REASON.to_string())
        );
        assert_eq!(
            parse_response(200, r#"{"url": ""}"#),
            UploadOutcome::Failed(MISSING_URL_REASON.to_string())
        );
    }

    #[test]
    fn api_error_field_is_reported() {
        assert_eq!(
            parse_response(401, r#"{"error": "Invalid key"}"#),
            UploadOutcome::Failed("Invalid key".to_string())
        );
    }

    #[test]
    fn non_json_error_keeps_status() {
        assert_eq!(
            parse_response(502, "Bad Gateway"),
            UploadOutcome::Failed("HTTP 502: Bad Gateway".to_string())
        );
        assert_eq!(parse_response(500, ""), UploadOutcome::Failed("HTTP 500".to_string()));
    }

    #[test]
    fn url_on_error_status_is_not_success() {
        assert!(matches!(
            parse_response(500, r#"{"url": "https://s-ul.eu/x"}"#),
            UploadOutcome::Failed(_)
        ));
    }

    #[test]
    fn missing_key_fails_before_network() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.png");
        std::fs::write(&file, b"x").unwrap();
        let client = SulClient::with_endpoint("", "http://127.0.0.1:9", Duration::from_secs(1)).unwrap();
        assert!(matches!(client.upload(&file), Err(UploadError::MissingApiKey)));
    }

    #[test]
    fn missing_file_fails_before_network() {
        let dir = tempfile::tempdir().unwrap();
        let client = SulClient::with_endpoint("key", "http://127.0.0.1:9", Duration::from_secs(1)).unwrap();
        assert!(matches!(
            client.upload(&dir.path().join("nope.png")),
            Err(UploadError::MissingFile(_))
        ));
    }
}
