//! Docker Engine API client.
//!
//! One client per ship. Plain TCP, TLS and SSH-tunneled endpoints ride on
//! reqwest; Unix sockets use a per-request hyper connection. The API
//! surface is the [`ContainerDaemon`] trait.

use async_trait::async_trait;
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::Method;
use hyper_util::rt::TokioIo;
use maestro_model::{Registry, Ship, TlsSettings};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UnixStream;
use tracing::{debug, instrument};

use crate::auth;
use crate::daemon::{ContainerDaemon, ContainerDetails, ContainerStatus, DaemonConnector};
use crate::endpoint::DaemonEndpoint;
use crate::error::{DaemonError, Result};
use crate::spec::CreateSpec;
use crate::tunnel::SshTunnel;
use crate::types::{ApiErrorBody, ContainerInspect, CreateContainerRequest, CreateContainerResponse};
use crate::ImageName;

/// Deadline for image pulls, which routinely outlive the ship timeout.
const PULL_TIMEOUT: Duration = Duration::from_secs(600);

enum Transport {
    Http { base: String, client: reqwest::Client },
    Unix { path: PathBuf },
}

/// Client for one ship's daemon.
pub struct DockerClient {
    transport: Transport,
    /// API version path prefix, e.g. `/v1.41`, or empty.
    prefix: String,
    /// Printable endpoint for error messages.
    endpoint: String,
    timeout: Duration,
    /// Keeps the ssh child alive for the lifetime of the client.
    _tunnel: Option<SshTunnel>,
}

impl DockerClient {
    /// Connects to the daemon of a ship, establishing the SSH tunnel first
    /// when the ship is tunneled.
    ///
    /// # Errors
    ///
    /// Returns an error when the tunnel cannot be established or the HTTP
    /// client cannot be built (e.g. unreadable TLS material).
    pub async fn for_ship(ship: &Ship) -> Result<Self> {
        let endpoint = DaemonEndpoint::for_ship(ship);
        let printable = endpoint.to_string();

        let (transport, tunnel) = match &endpoint {
            DaemonEndpoint::Http { base } => {
                (Transport::Http { base: base.clone(), client: http_client(ship.timeout, None)? }, None)
            }
            DaemonEndpoint::Https { base, tls } => (
                Transport::Http { base: base.clone(), client: http_client(ship.timeout, Some(tls))? },
                None,
            ),
            DaemonEndpoint::Unix { path } => (Transport::Unix { path: path.clone() }, None),
            DaemonEndpoint::SshTunnel { ssh, host, docker_port, ssh_timeout } => {
                let tunnel = SshTunnel::open(ssh, host, *docker_port, *ssh_timeout).await?;
                let base = format!("http://127.0.0.1:{}", tunnel.local_port());
                (
                    Transport::Http { base, client: http_client(ship.timeout, None)? },
                    Some(tunnel),
                )
            }
        };

        Ok(Self {
            transport,
            prefix: ship.api_version.as_ref().map(|v| format!("/v{v}")).unwrap_or_default(),
            endpoint: printable,
            timeout: ship.timeout,
            _tunnel: tunnel,
        })
    }

    async fn request(
        &self,
        method: Method,
        path_and_query: &str,
        body: Option<serde_json::Value>,
        headers: &[(&'static str, String)],
    ) -> Result<(u16, Vec<u8>)> {
        self.request_with_timeout(method, path_and_query, body, headers, self.timeout).await
    }

    async fn request_with_timeout(
        &self,
        method: Method,
        path_and_query: &str,
        body: Option<serde_json::Value>,
        headers: &[(&'static str, String)],
        timeout: Duration,
    ) -> Result<(u16, Vec<u8>)> {
        let path_and_query = format!("{}{}", self.prefix, path_and_query);
        match &self.transport {
            Transport::Http { base, client } => {
                let url = format!("{base}{path_and_query}");
                let mut request = client.request(method, &url).timeout(timeout);
                for (name, value) in headers {
                    request = request.header(*name, value.as_str());
                }
                if let Some(body) = body {
                    request = request.json(&body);
                }
                let response = request.send().await.map_err(|e| self.map_reqwest(e, timeout))?;
                let status = response.status().as_u16();
                let bytes =
                    response.bytes().await.map_err(|e| self.map_reqwest(e, timeout))?;
                Ok((status, bytes.to_vec()))
            }
            Transport::Unix { path } => {
                let fut = unix_request(path, &self.endpoint, method, &path_and_query, body, headers);
                tokio::time::timeout(timeout, fut)
                    .await
                    .map_err(|_| DaemonError::Timeout(timeout))?
            }
        }
    }

    fn map_reqwest(&self, error: reqwest::Error, timeout: Duration) -> DaemonError {
        if error.is_timeout() {
            DaemonError::Timeout(timeout)
        } else if error.is_connect() {
            DaemonError::Connection { endpoint: self.endpoint.clone(), reason: error.to_string() }
        } else {
            DaemonError::Protocol(error.to_string())
        }
    }
}

fn http_client(timeout: Duration, tls: Option<&TlsSettings>) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder().connect_timeout(timeout).timeout(timeout);

    if let Some(tls) = tls {
        if let Some(ca_cert) = &tls.ca_cert {
            let pem = std::fs::read(ca_cert)?;
            let certificate = reqwest::Certificate::from_pem(&pem)
                .map_err(|e| DaemonError::Protocol(format!("bad CA certificate: {e}")))?;
            builder = builder.add_root_certificate(certificate);
        }
        if let (Some(cert), Some(key)) = (&tls.cert, &tls.key) {
            let mut pem = std::fs::read(cert)?;
            pem.extend(std::fs::read(key)?);
            let identity = reqwest::Identity::from_pem(&pem)
                .map_err(|e| DaemonError::Protocol(format!("bad client certificate: {e}")))?;
            builder = builder.identity(identity);
        }
        if !tls.verify {
            builder = builder.danger_accept_invalid_certs(true);
        }
    }

    builder.build().map_err(|e| DaemonError::Protocol(format!("cannot build HTTP client: {e}")))
}

/// Sends one request over a fresh Unix socket connection.
async fn unix_request(
    socket: &Path,
    endpoint: &str,
    method: Method,
    path_and_query: &str,
    body: Option<serde_json::Value>,
    headers: &[(&'static str, String)],
) -> Result<(u16, Vec<u8>)> {
    let stream = UnixStream::connect(socket).await.map_err(|e| DaemonError::Connection {
        endpoint: endpoint.to_string(),
        reason: e.to_string(),
    })?;
    let io = TokioIo::new(stream);

    let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
        .await
        .map_err(|e| DaemonError::Protocol(format!("HTTP handshake failed: {e}")))?;
    tokio::spawn(async move {
        if let Err(e) = conn.await {
            debug!("daemon connection closed: {e}");
        }
    });

    let mut builder = hyper::Request::builder()
        .method(method)
        .uri(format!("http://localhost{path_and_query}"))
        .header("Host", "localhost");
    for (name, value) in headers {
        builder = builder.header(*name, value.as_str());
    }
    let request = if let Some(body) = body {
        let bytes = serde_json::to_vec(&body)
            .map_err(|e| DaemonError::Protocol(format!("cannot serialize request: {e}")))?;
        builder
            .header("Content-Type", "application/json")
            .header("Content-Length", bytes.len())
            .body(Full::new(Bytes::from(bytes)))
    } else {
        builder.body(Full::new(Bytes::new()))
    }
    .map_err(|e| DaemonError::Protocol(format!("cannot build request: {e}")))?;

    let response = sender
        .send_request(request)
        .await
        .map_err(|e| DaemonError::Protocol(format!("request failed: {e}")))?;
    let status = response.status().as_u16();
    let body = response
        .into_body()
        .collect()
        .await
        .map_err(|e| DaemonError::Protocol(format!("cannot read response: {e}")))?
        .to_bytes();
    Ok((status, body.to_vec()))
}

fn api_error(status: u16, body: &[u8]) -> DaemonError {
    let message = serde_json::from_slice::<ApiErrorBody>(body).map_or_else(
        |_| String::from_utf8_lossy(body).trim().to_string(),
        |b| b.message,
    );
    DaemonError::Api { status, message }
}

#[async_trait]
impl ContainerDaemon for DockerClient {
    async fn ping(&self) -> Result<()> {
        let (status, body) = self.request(Method::GET, "/_ping", None, &[]).await?;
        if status == 200 {
            Ok(())
        } else {
            Err(api_error(status, &body))
        }
    }

    #[instrument(skip(self, auth), fields(endpoint = %self.endpoint))]
    async fn pull_image(&self, image: &ImageName, auth: Option<&Registry>) -> Result<()> {
        let path = format!(
            "/images/create?fromImage={}&tag={}",
            urlencoding::encode(&image.repository),
            urlencoding::encode(&image.tag)
        );
        let mut headers = Vec::new();
        if let Some(registry) = auth {
            headers.push(("X-Registry-Auth", auth::encode_auth_header(registry)));
        }

        let (status, body) = self
            .request_with_timeout(Method::POST, &path, None, &headers, PULL_TIMEOUT)
            .await?;
        if status != 200 {
            return Err(api_error(status, &body));
        }

        // The body is a progress stream of JSON records; a failed pull still
        // answers 200 and reports the failure inline.
        for line in body.split(|b| *b == b'\n') {
            if line.is_empty() {
                continue;
            }
            if let Ok(record) = serde_json::from_slice::<serde_json::Value>(line) {
                if let Some(error) = record.get("error").and_then(|e| e.as_str()) {
                    return Err(DaemonError::Api { status: 500, message: error.to_string() });
                }
            }
        }
        Ok(())
    }

    async fn has_image(&self, image: &ImageName) -> Result<bool> {
        let path = format!("/images/{}/json", image.reference());
        let (status, body) = self.request(Method::GET, &path, None, &[]).await?;
        match status {
            200 => Ok(true),
            404 => Ok(false),
            _ => Err(api_error(status, &body)),
        }
    }

    #[instrument(skip(self, spec), fields(name = %spec.name))]
    async fn create_container(&self, spec: &CreateSpec) -> Result<String> {
        let request = CreateContainerRequest::from(spec);
        let body = serde_json::to_value(&request)
            .map_err(|e| DaemonError::Protocol(format!("cannot serialize create spec: {e}")))?;
        let path = format!("/containers/create?name={}", urlencoding::encode(&spec.name));
        let (status, body) = self.request(Method::POST, &path, Some(body), &[]).await?;
        if status != 201 {
            return Err(api_error(status, &body));
        }
        let response: CreateContainerResponse = serde_json::from_slice(&body)
            .map_err(|e| DaemonError::Protocol(format!("bad create response: {e}")))?;
        for warning in response.warnings.unwrap_or_default() {
            debug!(container = %spec.name, "daemon warning: {warning}");
        }
        Ok(response.id)
    }

    async fn start_container(&self, name: &str) -> Result<()> {
        let path = format!("/containers/{name}/start");
        let (status, body) = self.request(Method::POST, &path, None, &[]).await?;
        match status {
            204 | 304 => Ok(()),
            _ => Err(api_error(status, &body)),
        }
    }

    async fn stop_container(&self, name: &str, timeout: Duration) -> Result<()> {
        let path = format!("/containers/{name}/stop?t={}", timeout.as_secs());
        // The daemon blocks for up to the grace period before answering.
        let (status, body) = self
            .request_with_timeout(Method::POST, &path, None, &[], timeout + self.timeout)
            .await?;
        match status {
            204 | 304 => Ok(()),
            _ => Err(api_error(status, &body)),
        }
    }

    async fn remove_container(&self, name: &str) -> Result<()> {
        let path = format!("/containers/{name}?v=1");
        let (status, body) = self.request(Method::DELETE, &path, None, &[]).await?;
        match status {
            204 => Ok(()),
            _ => Err(api_error(status, &body)),
        }
    }

    async fn inspect_container(&self, name: &str) -> Result<Option<ContainerDetails>> {
        let path = format!("/containers/{name}/json");
        let (status, body) = self.request(Method::GET, &path, None, &[]).await?;
        match status {
            200 => {
                let inspect: ContainerInspect = serde_json::from_slice(&body)
                    .map_err(|e| DaemonError::Protocol(format!("bad inspect response: {e}")))?;
                Ok(Some(ContainerDetails {
                    id: inspect.id,
                    image_id: inspect.image,
                    status: ContainerStatus::from_docker(&inspect.state.status),
                    exit_code: inspect.state.exit_code,
                }))
            }
            404 => Ok(None),
            _ => Err(api_error(status, &body)),
        }
    }

    async fn container_logs(&self, name: &str, tail: Option<usize>) -> Result<Vec<u8>> {
        let tail = tail.map_or_else(|| "all".to_string(), |n| n.to_string());
        let path = format!("/containers/{name}/logs?stdout=1&stderr=1&tail={tail}");
        let (status, body) = self.request(Method::GET, &path, None, &[]).await?;
        if status == 200 {
            Ok(body)
        } else {
            Err(api_error(status, &body))
        }
    }
}

/// The production connector: one [`DockerClient`] per ship, verified with
/// a ping before use.
#[derive(Debug, Clone, Copy, Default)]
pub struct DockerConnector;

#[async_trait]
impl DaemonConnector for DockerConnector {
    async fn connect(&self, ship: &Ship) -> Result<Arc<dyn ContainerDaemon>> {
        let endpoint = DaemonEndpoint::for_ship(ship).to_string();
        let client = DockerClient::for_ship(ship).await?;
        client.ping().await.map_err(|e| match e {
            e @ DaemonError::Connection { .. } => e,
            other => DaemonError::Connection { endpoint, reason: other.to_string() },
        })?;
        Ok(Arc::new(client))
    }
}

/// Strips the daemon's stream multiplexing framing from a log payload.
///
/// Frames are `[stream (1B)][padding (3B)][len (4B BE)][payload]`. Raw
/// (TTY) payloads are returned unchanged.
#[must_use]
pub fn demux_log_stream(buffer: &[u8]) -> Vec<u8> {
    if buffer.len() < 8 || buffer[0] > 2 {
        return buffer.to_vec();
    }
    let mut out = Vec::with_capacity(buffer.len());
    let mut rest = buffer;
    while rest.len() >= 8 {
        let size = u32::from_be_bytes([rest[4], rest[5], rest[6], rest[7]]) as usize;
        if rest.len() < 8 + size {
            break;
        }
        out.extend_from_slice(&rest[8..8 + size]);
        rest = &rest[8 + size..];
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_errors_prefer_json_message() {
        let err = api_error(500, br#"{"message": "no such image"}"#);
        assert_eq!(err.to_string(), "daemon returned 500: no such image");

        let err = api_error(500, b"plain text\n");
        assert_eq!(err.to_string(), "daemon returned 500: plain text");
    }

    #[test]
    fn demux_strips_frame_headers() {
        let mut stream = Vec::new();
        stream.extend_from_slice(&[1, 0, 0, 0, 0, 0, 0, 5]);
        stream.extend_from_slice(b"hello");
        stream.extend_from_slice(&[2, 0, 0, 0, 0, 0, 0, 6]);
        stream.extend_from_slice(b" world");
        assert_eq!(demux_log_stream(&stream), b"hello world");
    }

    #[test]
    fn demux_passes_raw_output_through() {
        assert_eq!(demux_log_stream(b"raw tty output"), b"raw tty output");
    }
}
