//! Transit client seam and its HTTP implementation.

use async_trait::async_trait;
use common::{
    protocol::{SecretResponse, VaultErrorResponse},
    CrypterError,
};
use reqwest::{StatusCode, Url};
use serde_json::{Map, Value};

use crate::providers::DEFAULT_REMOTE_TIMEOUT;

const SERVICE: &str = "vault";

/// Operations the transit provider needs from a Vault-compatible service.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TransitClient: Send + Sync {
    /// Issue a logical write to `path` (relative to `/v1/`) and return the
    /// response's `data` object, if any.
    async fn write(
        &self,
        path: &str,
        body: Value,
    ) -> Result<Option<Map<String, Value>>, CrypterError>;
}

/// [`TransitClient`] speaking the Vault HTTP API.
#[derive(Clone)]
pub struct VaultClient {
    http: reqwest::Client,
    addr: String,
    token: String,
    namespace: Option<String>,
}

impl VaultClient {
    /// Create a client for the Vault server at `addr` (e.g.
    /// `http://127.0.0.1:8200`) authenticating with `token`.
    ///
    /// # Errors
    ///
    /// Returns [`CrypterError::Configuration`] if `addr` is not an absolute
    /// http(s) URL or `token` is empty.
    ///
    /// Requests time out after [`DEFAULT_REMOTE_TIMEOUT`]; swap the HTTP
    /// client with [`VaultClient::with_http_client`] to change that.
    pub fn new(addr: &str, token: impl Into<String>) -> Result<Self, CrypterError> {
        let url = Url::parse(addr).map_err(|e| {
            CrypterError::Configuration(format!("invalid Vault address {addr:?}: {e}"))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(CrypterError::Configuration(format!(
                "Vault address {addr:?} must use http or https"
            )));
        }
        let token = token.into();
        if token.trim().is_empty() {
            return Err(CrypterError::Configuration(
                "Vault token must not be empty".into(),
            ));
        }
        let http = reqwest::Client::builder()
            .timeout(DEFAULT_REMOTE_TIMEOUT)
            .build()
            .map_err(|e| {
                CrypterError::Configuration(format!("failed to build Vault HTTP client: {e}"))
            })?;
        Ok(Self {
            http,
            addr: url.as_str().trim_end_matches('/').to_owned(),
            token,
            namespace: None,
        })
    }

    /// Send requests to a Vault Enterprise namespace.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Use a preconfigured HTTP client (custom TLS roots, proxies, timeouts).
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.addr, path.trim_start_matches('/'))
    }
}

impl std::fmt::Debug for VaultClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultClient")
            .field("addr", &self.addr)
            .field("token", &"[REDACTED]")
            .field("namespace", &self.namespace)
            .finish()
    }
}

#[async_trait]
impl TransitClient for VaultClient {
    async fn write(
        &self,
        path: &str,
        body: Value,
    ) -> Result<Option<Map<String, Value>>, CrypterError> {
        let mut req = self
            .http
            .post(self.url(path))
            .header("X-Vault-Token", &self.token)
            .json(&body);
        if let Some(ns) = &self.namespace {
            req = req.header("X-Vault-Namespace", ns);
        }

        let resp = req.send().await.map_err(|e| request_error(path, e))?;

        let status = resp.status();
        if !status.is_success() {
            let body: VaultErrorResponse = resp.json().await.unwrap_or_default();
            return Err(CrypterError::RemoteService {
                service: SERVICE,
                message: format!("write to {path} returned {status}: {}", body.errors.join("; ")),
            });
        }
        if status == StatusCode::NO_CONTENT {
            return Ok(None);
        }

        let secret: SecretResponse =
            resp.json()
                .await
                .map_err(|e| CrypterError::MalformedResponse {
                    service: SERVICE,
                    message: format!("response to {path} is not a Vault secret: {e}"),
                })?;
        Ok(secret.data)
    }
}

fn request_error(path: &str, err: reqwest::Error) -> CrypterError {
    if err.is_timeout() {
        CrypterError::Timeout { service: SERVICE }
    } else {
        CrypterError::RemoteService {
            service: SERVICE,
            message: format!("write to {path} failed: {err}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    use super::*;

    #[test]
    fn builds_v1_urls() {
        let client = VaultClient::new("http://localhost:8200/", "root").unwrap();
        assert_eq!(
            client.url("transit/encrypt/orders"),
            "http://localhost:8200/v1/transit/encrypt/orders"
        );
        assert_eq!(
            client.url("/transit/decrypt/orders"),
            "http://localhost:8200/v1/transit/decrypt/orders"
        );
    }

    #[test]
    fn rejects_relative_address() {
        let err = VaultClient::new("localhost:8200/vault", "root");
        assert!(matches!(err, Err(CrypterError::Configuration(_))));
        assert!(VaultClient::new("not a url", "root").is_err());
    }

    #[test]
    fn rejects_empty_token() {
        assert!(matches!(
            VaultClient::new("http://localhost:8200", " "),
            Err(CrypterError::Configuration(_))
        ));
    }

    #[test]
    fn debug_redacts_token() {
        let client = VaultClient::new("http://localhost:8200", "s.supersecret")
            .unwrap()
            .with_namespace("team-a");
        let s = format!("{client:?}");
        assert!(s.contains("REDACTED"));
        assert!(!s.contains("supersecret"));
        assert!(s.contains("team-a"));
    }

    /// Serve one HTTP exchange on a loopback port, answering with `status`
    /// and `body`. Resolves to the raw request text.
    async fn serve_once(
        status: &'static str,
        body: &'static str,
    ) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = format!("http://{}", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let request = read_request(&mut stream).await;
            let response = format!(
                "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            stream.write_all(response.as_bytes()).await.unwrap();
            stream.shutdown().await.unwrap();
            request
        });
        (addr, handle)
    }

    /// Read request headers, then as many body bytes as `content-length`
    /// announces.
    async fn read_request(stream: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        let header_end = loop {
            let n = stream.read(&mut chunk).await.unwrap();
            assert!(n > 0, "client closed before sending headers");
            buf.extend_from_slice(&chunk[..n]);
            if let Some(i) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break i + 4;
            }
        };
        let head = String::from_utf8_lossy(&buf[..header_end]).to_lowercase();
        let content_length = head
            .lines()
            .find_map(|l| l.strip_prefix("content-length:"))
            .map(|v| v.trim().parse::<usize>().unwrap())
            .unwrap_or(0);
        while buf.len() < header_end + content_length {
            let n = stream.read(&mut chunk).await.unwrap();
            assert!(n > 0, "client closed before sending body");
            buf.extend_from_slice(&chunk[..n]);
        }
        String::from_utf8(buf).unwrap()
    }

    fn client(addr: &str) -> VaultClient {
        VaultClient::new(addr, "s.token").unwrap().with_namespace("team-a")
    }

    #[tokio::test]
    async fn posts_with_token_and_namespace() {
        let (addr, server) =
            serve_once("200 OK", r#"{"data":{"ciphertext":"vault:v1:abc"}}"#).await;

        let data = client(&addr)
            .write("transit/encrypt/orders", serde_json::json!({ "plaintext": "eA==" }))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(data["ciphertext"], "vault:v1:abc");

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /v1/transit/encrypt/orders HTTP/1.1"));
        let lower = request.to_lowercase();
        assert!(lower.contains("x-vault-token: s.token"));
        assert!(lower.contains("x-vault-namespace: team-a"));
        assert!(request.ends_with(r#"{"plaintext":"eA=="}"#));
    }

    #[tokio::test]
    async fn error_status_carries_vault_errors() {
        let (addr, server) =
            serve_once("403 Forbidden", r#"{"errors":["permission denied"]}"#).await;

        let err = client(&addr)
            .write("transit/decrypt/orders", serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, CrypterError::RemoteService { service: "vault", .. }));
        let message = err.to_string();
        assert!(message.contains("403"));
        assert!(message.contains("permission denied"));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn no_content_has_no_data() {
        let (addr, server) = serve_once("204 No Content", "").await;

        let data = client(&addr)
            .write("transit/keys/orders/rotate", serde_json::json!({}))
            .await
            .unwrap();
        assert!(data.is_none());
        server.await.unwrap();
    }

    #[tokio::test]
    async fn non_secret_body_is_malformed() {
        let (addr, server) = serve_once("200 OK", "not json").await;

        let err = client(&addr)
            .write("transit/encrypt/orders", serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, CrypterError::MalformedResponse { service: "vault", .. }));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn silent_server_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = format!("http://{}", listener.local_addr().unwrap());
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(stream);
        });

        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(100))
            .build()
            .unwrap();
        let err = client(&addr)
            .with_http_client(http)
            .write("transit/encrypt/orders", serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, CrypterError::Timeout { service: "vault" }));
        server.abort();
    }
}
