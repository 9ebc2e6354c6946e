//! HTTP client for the question-answering service: the streamed `/answer`
//! endpoint, the `/search` and `/extend` lookups, file upload and document
//! download.

use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use reqwest::header::ACCEPT;
use reqwest::StatusCode;
use std::collections::VecDeque;
use std::path::Path;
use std::time::Duration;
use url::Url;

use crate::config::ServerSection;
use crate::error::ClientError;
use crate::frame::{Frame, FrameDecoder};

/// The single-shot lookups. None of them is part of the transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupKind {
    /// Document search over the free-text query.
    Search,
    /// Concept-term expansion.
    Expand,
    /// Document similarity search from an uploaded file.
    Upload,
}

impl LookupKind {
    pub fn path(self) -> &'static str {
        match self {
            LookupKind::Search => "search",
            LookupKind::Expand => "extend",
            LookupKind::Upload => "upload",
        }
    }

    /// Whether completing this lookup puts the input back to typed queries.
    /// `Expand` keeps whatever discipline was active.
    pub fn reverts_input(self) -> bool {
        !matches!(self, LookupKind::Expand)
    }
}

/// What a lookup puts on the display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupOutcome {
    /// Status 200: the body, shown verbatim.
    Body(String),
    /// Any other status, or a transport error: a short description.
    Failed(String),
}

impl LookupOutcome {
    pub fn display_text(&self) -> &str {
        match self {
            LookupOutcome::Body(body) => body,
            LookupOutcome::Failed(reason) => reason,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, LookupOutcome::Body(_))
    }
}

/// Frames of one `/answer` response, in arrival order. Dropping it closes the connection.
pub struct AnswerStream {
    body: BoxStream<'static, Result<Vec<u8>, reqwest::Error>>,
    decoder: FrameDecoder,
    ready: VecDeque<Frame>,
}

impl AnswerStream {
    fn new(response: reqwest::Response) -> Self {
        Self {
            body: response
                .bytes_stream()
                .map(|chunk| chunk.map(|bytes| bytes.to_vec()))
                .boxed(),
            decoder: FrameDecoder::new(),
            ready: VecDeque::new(),
        }
    }

    /// Next decoded frame, or `None` once the server ends the response.
    pub async fn next_frame(&mut self) -> Option<Result<Frame, ClientError>> {
        loop {
            if let Some(frame) = self.ready.pop_front() {
                return Some(Ok(frame));
            }
            match self.body.next().await {
                Some(Ok(chunk)) => self.ready.extend(self.decoder.push(&chunk)),
                Some(Err(e)) => return Some(Err(e.into())),
                None => {
                    if self.decoder.has_pending() {
                        tracing::debug!("answer stream ended inside an event; partial event dropped");
                    }
                    return None;
                }
            }
        }
    }
}

/// Client for one service base URL.
#[derive(Debug, Clone)]
pub struct Client {
    http: reqwest::Client,
    base_url: Url,
    request_timeout: Option<Duration>,
}

impl Client {
    /// Client for the service at `base_url` (e.g. `http://127.0.0.1:5000`).
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        let mut url = Url::parse(base_url)
            .map_err(|e| ClientError::InvalidUrl(format!("{}: {}", base_url, e)))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ClientError::InvalidUrl(format!(
                "unsupported scheme: {} (only http/https allowed)",
                url.scheme()
            )));
        }
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        Ok(Self {
            http: reqwest::Client::new(),
            base_url: url,
            request_timeout: None,
        })
    }

    pub fn from_config(server: &ServerSection) -> Result<Self, ClientError> {
        Ok(Self::new(server.base_url())?.with_request_timeout(server.request_timeout()))
    }

    /// Timeout for lookups, uploads and downloads. The answer stream never times out here.
    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// `<base>/<path>?query=<url-encoded query>`.
    pub fn endpoint(&self, path: &str, query: &str) -> Result<Url, ClientError> {
        let mut url = self
            .base_url
            .join(path)
            .map_err(|e| ClientError::InvalidUrl(format!("{}: {}", path, e)))?;
        url.set_query(Some(&format!("query={}", urlencoding::encode(query))));
        Ok(url)
    }

    /// Open the answer stream for `query`.
    pub async fn open_answer(&self, query: &str) -> Result<AnswerStream, ClientError> {
        let url = self.endpoint("answer", query)?;
        tracing::info!(%url, "opening answer stream");
        let response = self
            .http
            .get(url)
            .header(ACCEPT, "text/event-stream")
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Status(status.as_u16()));
        }
        Ok(AnswerStream::new(response))
    }

    /// Run a `search` or `expand` lookup. Failures come back as [`LookupOutcome::Failed`].
    pub async fn lookup(&self, kind: LookupKind, query: &str) -> LookupOutcome {
        let url = match self.endpoint(kind.path(), query) {
            Ok(url) => url,
            Err(e) => return LookupOutcome::Failed(e.to_string()),
        };
        tracing::info!(%url, ?kind, "lookup");
        self.complete(self.http.get(url)).await
    }

    /// Post a file for a similarity search.
    pub async fn upload(&self, path: &Path) -> LookupOutcome {
        let contents = match tokio::fs::read(path).await {
            Ok(contents) => contents,
            Err(e) => return LookupOutcome::Failed(format!("{}: {}", path.display(), e)),
        };
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "query".into());
        let url = match self.base_url.join(LookupKind::Upload.path()) {
            Ok(url) => url,
            Err(e) => return LookupOutcome::Failed(e.to_string()),
        };
        tracing::info!(%url, file = %file_name, bytes = contents.len(), "upload");
        let part = reqwest::multipart::Part::bytes(contents).file_name(file_name);
        let form = reqwest::multipart::Form::new().part("file", part);
        self.complete(self.http.post(url).multipart(form)).await
    }

    /// Download a stored document to `dest`. Returns the number of bytes written.
    pub async fn download(&self, name: &str, dest: &Path) -> Result<u64, ClientError> {
        let path = format!("download/{}", urlencoding::encode(name));
        let url = self
            .base_url
            .join(&path)
            .map_err(|e| ClientError::InvalidUrl(format!("{}: {}", path, e)))?;
        tracing::info!(%url, dest = %dest.display(), "download");
        let response = self.with_timeout(self.http.get(url)).send().await?;
        let status = response.status();
        if status != StatusCode::OK {
            return Err(ClientError::Status(status.as_u16()));
        }
        let bytes = response.bytes().await?;
        tokio::fs::write(dest, &bytes).await?;
        Ok(bytes.len() as u64)
    }

    fn with_timeout(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.request_timeout {
            Some(timeout) => request.timeout(timeout),
            None => request,
        }
    }

    async fn complete(&self, request: reqwest::RequestBuilder) -> LookupOutcome {
        let response = match self.with_timeout(request).send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(error = %e, "lookup request failed");
                return LookupOutcome::Failed(e.to_string());
            }
        };
        let status = response.status();
        if status != StatusCode::OK {
            tracing::warn!(%status, "lookup returned non-OK status");
            return LookupOutcome::Failed(status_text(status));
        }
        match response.text().await {
            Ok(body) => LookupOutcome::Body(body),
            Err(e) => {
                tracing::warn!(error = %e, "lookup body could not be read");
                LookupOutcome::Failed(e.to_string())
            }
        }
    }
}

fn status_text(status: StatusCode) -> String {
    status
        .canonical_reason()
        .map(str::to_string)
        .unwrap_or_else(|| status.as_u16().to_string())
}
