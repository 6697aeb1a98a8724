//! HTTP engine client.
//!
//! Speaks the Docker Engine API over a Unix socket or plain TCP. Each request
//! opens a fresh HTTP/1.1 connection; the engine socket is local and cheap to
//! dial, and this keeps the client free of pooling state.

use crate::client::{
    ContainerOps, ListContainersOptions, NetworkOps, RemoveContainerOptions, SystemOps, VolumeOps,
};
use crate::config::{EngineConfig, Endpoint};
use crate::error::{EngineError, ObjectKind, Result};
use crate::types::{
    ContainerCreateRequest, ContainerCreateResponse, ContainerInspectResponse, ContainerSummary,
    ErrorResponse, Network, NetworkConnectRequest, NetworkCreateRequest, NetworkCreateResponse,
    NetworkDisconnectRequest, VersionResponse, Volume, VolumeCreateRequest, VolumeListResponse,
};
use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::client::conn::http1;
use hyper::{Method, Request, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpStream, UnixStream};

/// Docker Engine API client.
#[derive(Debug, Clone)]
pub struct HttpEngine {
    endpoint: Endpoint,
    api_version: String,
    timeout: Duration,
}

/// The object a request addresses, used to map 404s to the right error.
#[derive(Clone, Copy)]
struct Target<'a> {
    kind: ObjectKind,
    id: &'a str,
}

impl<'a> Target<'a> {
    const fn container(id: &'a str) -> Self {
        Self {
            kind: ObjectKind::Container,
            id,
        }
    }

    const fn volume(id: &'a str) -> Self {
        Self {
            kind: ObjectKind::Volume,
            id,
        }
    }

    const fn network(id: &'a str) -> Self {
        Self {
            kind: ObjectKind::Network,
            id,
        }
    }
}

impl HttpEngine {
    /// Creates a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the host or timeout is invalid.
    pub fn new(config: &EngineConfig) -> Result<Self> {
        Ok(Self {
            endpoint: config.endpoint()?,
            api_version: config.api_version.trim_matches('/').to_string(),
            timeout: config.request_timeout()?,
        })
    }

    /// Returns the engine endpoint.
    #[must_use]
    pub const fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    fn url(&self, path: &str) -> String {
        if self.api_version.is_empty() {
            format!("http://localhost{path}")
        } else {
            format!("http://localhost/{}{path}", self.api_version)
        }
    }

    async fn handshake<I>(io: I) -> Result<http1::SendRequest<Full<Bytes>>>
    where
        I: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (sender, conn) = http1::handshake(TokioIo::new(io))
            .await
            .map_err(|e| EngineError::Transport(format!("HTTP handshake failed: {e}")))?;

        tokio::spawn(async move {
            if let Err(e) = conn.await {
                tracing::debug!("engine connection closed: {}", e);
            }
        });

        Ok(sender)
    }

    async fn connect(&self) -> Result<http1::SendRequest<Full<Bytes>>> {
        match &self.endpoint {
            Endpoint::Unix(path) => {
                let stream = UnixStream::connect(path).await.map_err(|e| {
                    EngineError::Transport(format!(
                        "failed to connect to engine at {}: {e}",
                        path.display()
                    ))
                })?;
                Self::handshake(stream).await
            }
            Endpoint::Tcp(addr) => {
                let stream = TcpStream::connect(addr.as_str()).await.map_err(|e| {
                    EngineError::Transport(format!("failed to connect to engine at {addr}: {e}"))
                })?;
                Self::handshake(stream).await
            }
        }
    }

    /// Sends a request and returns the status and body of any 2xx or 304
    /// response. Every other status is mapped to an error.
    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
        target: Target<'_>,
        extra_timeout: Duration,
    ) -> Result<(StatusCode, Bytes)> {
        let timeout = self.timeout + extra_timeout;
        tokio::time::timeout(timeout, self.send_inner(method, path, body, target))
            .await
            .map_err(|_| EngineError::Timeout(timeout))?
    }

    async fn send_inner(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
        target: Target<'_>,
    ) -> Result<(StatusCode, Bytes)> {
        let mut sender = self.connect().await?;

        tracing::debug!(method = %method, path, "engine request");

        let builder = Request::builder()
            .method(method)
            .uri(self.url(path))
            .header("Host", "localhost");
        let request = match body {
            Some(bytes) => builder
                .header("Content-Type", "application/json")
                .header("Content-Length", bytes.len())
                .body(Full::new(Bytes::from(bytes))),
            None => builder.body(Full::new(Bytes::new())),
        }
        .map_err(|e| EngineError::Transport(format!("failed to build request: {e}")))?;

        let response = sender
            .send_request(request)
            .await
            .map_err(|e| EngineError::Transport(format!("failed to send request: {e}")))?;

        let status = response.status();
        let body = response
            .into_body()
            .collect()
            .await
            .map_err(|e| EngineError::Transport(format!("failed to read response: {e}")))?
            .to_bytes();

        if status.is_success() || status == StatusCode::NOT_MODIFIED {
            return Ok((status, body));
        }

        let message = serde_json::from_slice::<ErrorResponse>(&body)
            .map(|e| e.message)
            .unwrap_or_else(|_| String::from_utf8_lossy(&body).trim().to_string());
        Err(EngineError::from_status(
            status.as_u16(),
            message,
            target.kind,
            target.id,
        ))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, target: Target<'_>) -> Result<T> {
        let (_, body) = self
            .send(Method::GET, path, None, target, Duration::ZERO)
            .await?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn post<T: DeserializeOwned, B: Serialize + Sync>(
        &self,
        path: &str,
        body: &B,
        target: Target<'_>,
    ) -> Result<T> {
        let bytes = serde_json::to_vec(body)?;
        let (_, body) = self
            .send(Method::POST, path, Some(bytes), target, Duration::ZERO)
            .await?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn post_empty(
        &self,
        path: &str,
        body: Option<Vec<u8>>,
        target: Target<'_>,
        extra_timeout: Duration,
    ) -> Result<()> {
        self.send(Method::POST, path, body, target, extra_timeout)
            .await
            .map(|_| ())
    }

    async fn delete(&self, path: &str, target: Target<'_>) -> Result<()> {
        self.send(Method::DELETE, path, None, target, Duration::ZERO)
            .await
            .map(|_| ())
    }
}

/// Encodes label filters as the engine's `filters` query parameter.
fn label_filters(labels: &[String]) -> Result<Option<String>> {
    if labels.is_empty() {
        return Ok(None);
    }
    let filters: HashMap<&str, &[String]> = HashMap::from([("label", labels)]);
    let json = serde_json::to_string(&filters)?;
    Ok(Some(urlencoding::encode(&json).into_owned()))
}

fn with_filters(path: &str, labels: &[String]) -> Result<String> {
    let separator = if path.contains('?') { '&' } else { '?' };
    Ok(match label_filters(labels)? {
        Some(filters) => format!("{path}{separator}filters={filters}"),
        None => path.to_string(),
    })
}

fn stop_query(timeout: Option<Duration>) -> String {
    timeout.map_or_else(String::new, |t| format!("?t={}", t.as_secs()))
}

#[async_trait]
impl ContainerOps for HttpEngine {
    async fn create_container(
        &self,
        name: Option<&str>,
        request: &ContainerCreateRequest,
    ) -> Result<ContainerCreateResponse> {
        let path = match name {
            Some(name) => format!("/containers/create?name={}", urlencoding::encode(name)),
            None => "/containers/create".to_string(),
        };
        self.post(&path, request, Target::container(name.unwrap_or_default()))
            .await
    }

    async fn start_container(&self, id: &str) -> Result<()> {
        let path = format!("/containers/{}/start", urlencoding::encode(id));
        self.post_empty(&path, None, Target::container(id), Duration::ZERO)
            .await
    }

    async fn stop_container(&self, id: &str, timeout: Option<Duration>) -> Result<()> {
        let path = format!(
            "/containers/{}/stop{}",
            urlencoding::encode(id),
            stop_query(timeout)
        );
        self.post_empty(
            &path,
            None,
            Target::container(id),
            timeout.unwrap_or_default(),
        )
        .await
    }

    async fn restart_container(&self, id: &str, timeout: Option<Duration>) -> Result<()> {
        let path = format!(
            "/containers/{}/restart{}",
            urlencoding::encode(id),
            stop_query(timeout)
        );
        self.post_empty(
            &path,
            None,
            Target::container(id),
            timeout.unwrap_or_default(),
        )
        .await
    }

    async fn remove_container(&self, id: &str, options: RemoveContainerOptions) -> Result<()> {
        let path = format!(
            "/containers/{}?force={}&v={}",
            urlencoding::encode(id),
            options.force,
            options.volumes
        );
        self.delete(&path, Target::container(id)).await
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerInspectResponse> {
        let path = format!("/containers/{}/json", urlencoding::encode(id));
        self.get(&path, Target::container(id)).await
    }

    async fn list_containers(
        &self,
        options: &ListContainersOptions,
    ) -> Result<Vec<ContainerSummary>> {
        let path = with_filters(
            &format!("/containers/json?all={}", options.all),
            &options.labels,
        )?;
        self.get(&path, Target::container("")).await
    }
}

#[async_trait]
impl VolumeOps for HttpEngine {
    async fn create_volume(&self, request: &VolumeCreateRequest) -> Result<Volume> {
        let name = request.name.as_deref().unwrap_or_default();
        self.post("/volumes/create", request, Target::volume(name))
            .await
    }

    async fn inspect_volume(&self, name: &str) -> Result<Volume> {
        let path = format!("/volumes/{}", urlencoding::encode(name));
        self.get(&path, Target::volume(name)).await
    }

    async fn list_volumes(&self, labels: &[String]) -> Result<Vec<Volume>> {
        let path = with_filters("/volumes", labels)?;
        let response: VolumeListResponse = self.get(&path, Target::volume("")).await?;
        Ok(response.volumes.unwrap_or_default())
    }

    async fn remove_volume(&self, name: &str, force: bool) -> Result<()> {
        let path = format!("/volumes/{}?force={force}", urlencoding::encode(name));
        self.delete(&path, Target::volume(name)).await
    }
}

#[async_trait]
impl NetworkOps for HttpEngine {
    async fn create_network(
        &self,
        request: &NetworkCreateRequest,
    ) -> Result<NetworkCreateResponse> {
        self.post("/networks/create", request, Target::network(&request.name))
            .await
    }

    async fn inspect_network(&self, id: &str) -> Result<Network> {
        let path = format!("/networks/{}", urlencoding::encode(id));
        self.get(&path, Target::network(id)).await
    }

    async fn list_networks(&self, labels: &[String]) -> Result<Vec<Network>> {
        let path = with_filters("/networks", labels)?;
        self.get(&path, Target::network("")).await
    }

    async fn remove_network(&self, id: &str) -> Result<()> {
        let path = format!("/networks/{}", urlencoding::encode(id));
        self.delete(&path, Target::network(id)).await
    }

    async fn connect_network(&self, id: &str, request: &NetworkConnectRequest) -> Result<()> {
        let path = format!("/networks/{}/connect", urlencoding::encode(id));
        let body = serde_json::to_vec(request)?;
        self.post_empty(&path, Some(body), Target::network(id), Duration::ZERO)
            .await
    }

    async fn disconnect_network(
        &self,
        id: &str,
        request: &NetworkDisconnectRequest,
    ) -> Result<()> {
        let path = format!("/networks/{}/disconnect", urlencoding::encode(id));
        let body = serde_json::to_vec(request)?;
        self.post_empty(&path, Some(body), Target::network(id), Duration::ZERO)
            .await
    }
}

#[async_trait]
impl SystemOps for HttpEngine {
    async fn ping(&self) -> Result<()> {
        self.send(
            Method::GET,
            "/_ping",
            None,
            Target::container(""),
            Duration::ZERO,
        )
        .await
        .map(|_| ())
    }

    async fn version(&self) -> Result<VersionResponse> {
        self.get("/version", Target::container("")).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_filters_encoding() {
        let encoded = label_filters(&["com.docker.compose.project=web".to_string()])
            .unwrap()
            .unwrap();
        let decoded = urlencoding::decode(&encoded).unwrap();
        assert_eq!(decoded, r#"{"label":["com.docker.compose.project=web"]}"#);
        assert!(label_filters(&[]).unwrap().is_none());
    }

    #[test]
    fn test_with_filters_separator() {
        let labels = vec!["a=b".to_string()];
        assert!(
            with_filters("/containers/json?all=true", &labels)
                .unwrap()
                .starts_with("/containers/json?all=true&filters=")
        );
        assert!(
            with_filters("/volumes", &labels)
                .unwrap()
                .starts_with("/volumes?filters=")
        );
        assert_eq!(with_filters("/volumes", &[]).unwrap(), "/volumes");
    }

    #[test]
    fn test_url_prefix() {
        let engine = HttpEngine::new(&EngineConfig::default()).unwrap();
        assert_eq!(
            engine.url("/containers/json"),
            "http://localhost/v1.43/containers/json"
        );
        assert_eq!(stop_query(Some(Duration::from_secs(10))), "?t=10");
        assert_eq!(stop_query(None), "");
    }
}
