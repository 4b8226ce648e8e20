//! reqwest-backed document source and persistence gateway

use reqwest::multipart::{Form, Part};
use reqwest::{Client, Url};

use pdfmark_core::config::UploadConfig;
use pdfmark_core::{DocumentSource, FetchError, PersistenceGateway, SaveTransportError};

/// Uploads burned PDFs as multipart to `{base_url}/documents/{id}/save-edit`
#[derive(Debug, Clone)]
pub struct HttpGateway {
    client: Client,
    base_url: String,
}

impl HttpGateway {
    pub fn new(config: &UploadConfig) -> Result<Self, SaveTransportError> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| SaveTransportError::Network(e.to_string()))?;
        Ok(Self::with_client(client, &config.base_url))
    }

    pub fn with_client(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Upload URL for a document. The id is a single escaped path segment.
    pub fn endpoint(&self, document_id: &str) -> Result<Url, SaveTransportError> {
        let invalid = || SaveTransportError::Network(format!("invalid base URL {}", self.base_url));
        let mut url = Url::parse(&self.base_url).map_err(|_| invalid())?;
        url.path_segments_mut()
            .map_err(|_| invalid())?
            .pop_if_empty()
            .extend(["documents", document_id, "save-edit"]);
        Ok(url)
    }
}

impl PersistenceGateway for HttpGateway {
    async fn upload(
        &self,
        document_id: &str,
        pdf: Vec<u8>,
        summary_json: String,
    ) -> Result<(), SaveTransportError> {
        let size = pdf.len();
        let file = Part::bytes(pdf)
            .file_name(format!("{}.pdf", document_id))
            .mime_str("application/pdf")
            .map_err(|e| SaveTransportError::Network(e.to_string()))?;
        let annotations = Part::text(summary_json)
            .mime_str("application/json")
            .map_err(|e| SaveTransportError::Network(e.to_string()))?;
        let form = Form::new().part("file", file).part("annotations", annotations);

        let url = self.endpoint(document_id)?;
        let response = self
            .client
            .post(url.clone())
            .multipart(form)
            .send()
            .await
            .map_err(|e| SaveTransportError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SaveTransportError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        tracing::debug!(document_id, bytes = size, %url, "upload accepted");
        Ok(())
    }
}

/// Downloads source PDFs, typically from presigned URLs
#[derive(Debug, Clone, Default)]
pub struct HttpSource {
    client: Client,
}

impl HttpSource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl DocumentSource for HttpSource {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let fail = |reason: String| FetchError {
            url: url.to_string(),
            reason,
        };

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| fail(e.to_string()))?
            .error_for_status()
            .map_err(|e| fail(e.to_string()))?;
        let bytes = response.bytes().await.map_err(|e| fail(e.to_string()))?;

        tracing::debug!(url, bytes = bytes.len(), "source document fetched");
        Ok(bytes.to_vec())
    }
}
