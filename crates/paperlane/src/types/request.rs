//! Submission request types

use serde::{Deserialize, Serialize};

use super::job::{AnalysisKind, JobSource};

/// Payload for submitting a new analysis job
///
/// Exactly one of `document_ref` / `remote_url` must be present; the union
/// invariant is enforced by [`SubmitRequest::source`], which is the only way
/// a submission becomes a [`JobSource`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubmitRequest {
    /// Reference to a previously stored document
    #[serde(default)]
    pub document_ref: Option<String>,

    /// Remote URL to fetch and analyze
    #[serde(default)]
    pub remote_url: Option<String>,

    /// Which analysis to run (default: comprehensive)
    #[serde(default)]
    pub analysis_kind: AnalysisKind,

    /// Optional focus question forwarded to the analyzer
    #[serde(default)]
    pub query: Option<String>,

    /// Optional webhook notified once the job reaches a terminal state
    #[serde(default)]
    pub callback_url: Option<String>,
}

impl SubmitRequest {
    /// Convenience constructor for a stored-document submission
    pub fn for_document(document_ref: impl Into<String>) -> Self {
        Self {
            document_ref: Some(document_ref.into()),
            ..Default::default()
        }
    }

    /// Convenience constructor for a remote-URL submission
    pub fn for_url(remote_url: impl Into<String>) -> Self {
        Self {
            remote_url: Some(remote_url.into()),
            ..Default::default()
        }
    }

    /// Set the analysis kind
    pub fn with_kind(mut self, kind: AnalysisKind) -> Self {
        self.analysis_kind = kind;
        self
    }

    /// Set the focus query
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    /// Set the terminal-state webhook
    pub fn with_callback(mut self, url: impl Into<String>) -> Self {
        self.callback_url = Some(url.into());
        self
    }

    /// Validate the payload shape and extract the source union
    ///
    /// Checks only what can be known without touching the network: the
    /// one-of-two invariant, non-empty values, and URL well-formedness.
    /// Domain allow-listing, size caps, and content-type validation happen
    /// during the fetch stage.
    pub fn source(&self) -> Result<JobSource, String> {
        match (&self.document_ref, &self.remote_url) {
            (Some(_), Some(_)) => {
                Err("exactly one of document_ref or remote_url must be set, not both".to_string())
            }
            (None, None) => {
                Err("exactly one of document_ref or remote_url must be set".to_string())
            }
            (Some(doc), None) => {
                let doc = doc.trim();
                if doc.is_empty() {
                    return Err("document_ref must not be empty".to_string());
                }
                if doc.contains('/') || doc.contains('\\') || doc.contains("..") {
                    return Err("document_ref must be a bare identifier".to_string());
                }
                Ok(JobSource::DocumentRef(doc.to_string()))
            }
            (None, Some(url)) => {
                let url = url.trim();
                validate_http_url(url).map_err(|e| format!("remote_url {}", e))?;
                Ok(JobSource::RemoteUrl(url.to_string()))
            }
        }
    }

    /// Validate the optional callback URL shape
    pub fn validated_callback(&self) -> Result<Option<String>, String> {
        match &self.callback_url {
            None => Ok(None),
            Some(url) => {
                let url = url.trim();
                validate_http_url(url).map_err(|e| format!("callback_url {}", e))?;
                Ok(Some(url.to_string()))
            }
        }
    }
}

/// Check that a string parses as an absolute http(s) URL
fn validate_http_url(url: &str) -> Result<(), String> {
    if url.is_empty() {
        return Err("must not be empty".to_string());
    }
    let parsed = reqwest::Url::parse(url).map_err(|e| format!("is not a valid URL: {}", e))?;
    match parsed.scheme() {
        "http" | "https" => {}
        other => return Err(format!("must use http or https, got '{}'", other)),
    }
    if parsed.host_str().is_none() {
        return Err("must have a host".to_string());
    }
    Ok(())
}
