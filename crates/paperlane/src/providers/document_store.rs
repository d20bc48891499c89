//! Document resolution: upload-dir lookup and constrained remote fetch
//!
//! Policy checks live here, in front of the analyzer: domain allow-listing,
//! size caps, and PDF content validation. Violations are permanent failures
//! with stable codes; network trouble is transient and retried by the
//! worker.

use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::FetchConfig;
use crate::types::job::{codes, JobSource};

use super::{content_hash, AnalysisError, DocumentProvider, FetchedDocument};

/// Magic bytes every PDF starts with
const PDF_MAGIC: &[u8] = b"%PDF-";

/// Resolves document refs against an upload directory and remote URLs over
/// HTTP, enforcing fetch policy
pub struct DocumentStore {
    uploads_dir: PathBuf,
    client: reqwest::Client,
    config: FetchConfig,
}

impl DocumentStore {
    pub fn new(uploads_dir: PathBuf, config: FetchConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            uploads_dir,
            client,
            config,
        }
    }

    /// Whether a host passes the allow-list; an empty list allows any host
    fn host_allowed(&self, host: &str) -> bool {
        if self.config.allowed_domains.is_empty() {
            return true;
        }
        let host = host.to_ascii_lowercase();
        self.config.allowed_domains.iter().any(|domain| {
            let domain = domain.to_ascii_lowercase();
            host == domain || host.ends_with(&format!(".{}", domain))
        })
    }

    async fn resolve_ref(&self, doc_ref: &str) -> Result<FetchedDocument, AnalysisError> {
        // Submissions only admit bare identifiers, but resolve defensively
        if doc_ref.contains('/') || doc_ref.contains('\\') || doc_ref.contains("..") {
            return Err(AnalysisError::permanent(
                codes::DOCUMENT_NOT_FOUND,
                format!("invalid document ref '{}'", doc_ref),
            ));
        }

        let mut path = self.uploads_dir.join(doc_ref);
        if !path.exists() {
            path = self.uploads_dir.join(format!("{}.pdf", doc_ref));
        }

        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AnalysisError::permanent(
                    codes::DOCUMENT_NOT_FOUND,
                    format!("no stored document for ref '{}'", doc_ref),
                ));
            }
            Err(e) => {
                return Err(AnalysisError::transient(
                    codes::FETCH_FAILED,
                    format!("failed to read stored document: {}", e),
                ));
            }
        };

        self.validate(doc_ref.to_string(), bytes)
    }

    async fn resolve_url(&self, url: &str) -> Result<FetchedDocument, AnalysisError> {
        let parsed = reqwest::Url::parse(url).map_err(|e| {
            AnalysisError::permanent(codes::FETCH_FAILED, format!("invalid URL: {}", e))
        })?;

        let host = parsed.host_str().ok_or_else(|| {
            AnalysisError::permanent(codes::FETCH_FAILED, "URL has no host".to_string())
        })?;

        if !self.host_allowed(host) {
            return Err(AnalysisError::permanent(
                codes::DOMAIN_NOT_ALLOWED,
                format!("domain '{}' is not on the allow list", host),
            ));
        }

        let response = self.client.get(parsed.clone()).send().await.map_err(|e| {
            // Connection failures and timeouts are worth retrying
            AnalysisError::transient(codes::FETCH_FAILED, format!("request failed: {}", e))
        })?;

        let status = response.status();
        if status.is_server_error() || status.as_u16() == 429 {
            return Err(AnalysisError::transient(
                codes::FETCH_FAILED,
                format!("upstream returned HTTP {}", status.as_u16()),
            ));
        }
        if !status.is_success() {
            return Err(AnalysisError::permanent(
                codes::FETCH_FAILED,
                format!("upstream returned HTTP {}", status.as_u16()),
            ));
        }

        // Reject oversized documents before buffering when the upstream
        // declares a length
        if let Some(length) = response.content_length() {
            if length > self.config.max_document_bytes {
                return Err(AnalysisError::permanent(
                    codes::DOCUMENT_TOO_LARGE,
                    format!(
                        "document is {} bytes, limit is {}",
                        length, self.config.max_document_bytes
                    ),
                ));
            }
        }

        let bytes = response.bytes().await.map_err(|e| {
            AnalysisError::transient(codes::FETCH_FAILED, format!("failed to read body: {}", e))
        })?;

        let name = parsed
            .path_segments()
            .and_then(|segments| segments.last())
            .filter(|s| !s.is_empty())
            .unwrap_or("document.pdf")
            .to_string();

        self.validate(name, bytes.to_vec())
    }

    /// Shared size and content-type validation
    fn validate(&self, name: String, bytes: Vec<u8>) -> Result<FetchedDocument, AnalysisError> {
        if bytes.len() as u64 > self.config.max_document_bytes {
            return Err(AnalysisError::permanent(
                codes::DOCUMENT_TOO_LARGE,
                format!(
                    "document is {} bytes, limit is {}",
                    bytes.len(),
                    self.config.max_document_bytes
                ),
            ));
        }

        if !bytes.starts_with(PDF_MAGIC) {
            return Err(AnalysisError::permanent(
                codes::NOT_A_PDF,
                format!("'{}' is not a PDF document", name),
            ));
        }

        let content_hash = content_hash(&bytes);
        Ok(FetchedDocument {
            name,
            bytes,
            content_hash,
        })
    }
}

#[async_trait]
impl DocumentProvider for DocumentStore {
    async fn resolve(&self, source: &JobSource) -> Result<FetchedDocument, AnalysisError> {
        match source {
            JobSource::DocumentRef(doc_ref) => self.resolve_ref(doc_ref).await,
            JobSource::RemoteUrl(url) => self.resolve_url(url).await,
        }
    }

    fn name(&self) -> &str {
        "document-store"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::FailureKind;

    fn store_with(dir: &std::path::Path, domains: Vec<String>) -> DocumentStore {
        DocumentStore::new(
            dir.to_path_buf(),
            FetchConfig {
                allowed_domains: domains,
                max_document_bytes: 1024,
                request_timeout_secs: 2,
            },
        )
    }

    #[tokio::test]
    async fn missing_ref_is_permanent_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with(dir.path(), vec![]);

        let err = store
            .resolve(&JobSource::DocumentRef("nope".into()))
            .await
            .unwrap_err();
        assert_eq!(err.kind, FailureKind::Permanent);
        assert_eq!(err.code, codes::DOCUMENT_NOT_FOUND);
    }

    #[tokio::test]
    async fn stored_pdf_resolves_with_hash() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("paper-1.pdf"), b"%PDF-1.7 content").unwrap();
        let store = store_with(dir.path(), vec![]);

        let doc = store
            .resolve(&JobSource::DocumentRef("paper-1".into()))
            .await
            .unwrap();
        assert_eq!(doc.name, "paper-1");
        assert_eq!(doc.content_hash.len(), 64);
    }

    #[tokio::test]
    async fn non_pdf_content_is_permanent() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.pdf"), b"just text").unwrap();
        let store = store_with(dir.path(), vec![]);

        let err = store
            .resolve(&JobSource::DocumentRef("notes".into()))
            .await
            .unwrap_err();
        assert_eq!(err.code, codes::NOT_A_PDF);
        assert_eq!(err.kind, FailureKind::Permanent);
    }

    #[tokio::test]
    async fn oversized_document_is_permanent() {
        let dir = tempfile::tempdir().unwrap();
        let mut big = b"%PDF-1.7 ".to_vec();
        big.extend(vec![0u8; 2048]);
        std::fs::write(dir.path().join("big.pdf"), &big).unwrap();
        let store = store_with(dir.path(), vec![]);

        let err = store
            .resolve(&JobSource::DocumentRef("big".into()))
            .await
            .unwrap_err();
        assert_eq!(err.code, codes::DOCUMENT_TOO_LARGE);
    }

    #[tokio::test]
    async fn disallowed_domain_is_permanent_without_network() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with(dir.path(), vec!["arxiv.org".into()]);

        let err = store
            .resolve(&JobSource::RemoteUrl("https://evil.example.com/x.pdf".into()))
            .await
            .unwrap_err();
        assert_eq!(err.code, codes::DOMAIN_NOT_ALLOWED);
        assert_eq!(err.kind, FailureKind::Permanent);
    }

    #[test]
    fn subdomains_of_allowed_domains_pass() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with(dir.path(), vec!["arxiv.org".into()]);

        assert!(store.host_allowed("arxiv.org"));
        assert!(store.host_allowed("export.arxiv.org"));
        assert!(store.host_allowed("ARXIV.org"));
        assert!(!store.host_allowed("notarxiv.org"));
        assert!(!store.host_allowed("arxiv.org.evil.com"));
    }

    #[test]
    fn empty_allow_list_allows_everything() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with(dir.path(), vec![]);
        assert!(store.host_allowed("anything.example"));
    }
}
