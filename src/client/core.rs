use log::{debug, error, info, warn};
use reqwest::header::{HeaderMap, HeaderValue, COOKIE};
use reqwest::{redirect, Client, RequestBuilder, Response, StatusCode};
use serde_json::Value;

use crate::auth::Session;
use crate::error::{MqmError, Result};

use super::connection::ConnectionConfig;

const CLIENT_TYPE_HEADER: &str = "HPECLIENTTYPE";

/// REST client for the MQM server's CI integration API.
///
/// Each public operation performs a single round-trip and either returns a
/// typed result or a classified [`MqmError`]. Clones share the HTTP connection
/// pool and the sign-in session.
#[derive(Debug, Clone)]
pub struct MqmClient {
    pub(super) http: Client,
    pub(super) config: ConnectionConfig,
    session: Session,
}

impl MqmClient {
    /// Creates a client without signing in.
    ///
    /// # Errors
    ///
    /// Returns an error if the client type header is invalid or the HTTP
    /// client cannot be built.
    pub fn new(config: ConnectionConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            CLIENT_TYPE_HEADER,
            HeaderValue::from_str(config.client_type())
                .map_err(|e| MqmError::Config(format!("Invalid client type: {e}")))?,
        );

        // 307 on event delivery means "sign in again", so redirects must reach us.
        let mut builder = Client::builder()
            .user_agent(concat!("mqm-bridge/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .redirect(redirect::Policy::none());
        if let Some(timeout) = config.timeout() {
            builder = builder.timeout(timeout);
        }

        let http = builder
            .build()
            .map_err(|e| MqmError::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            http,
            config,
            session: Session::default(),
        })
    }

    /// Creates a client and signs in with the configured credentials.
    pub async fn connect(config: ConnectionConfig) -> Result<Self> {
        let client = Self::new(config)?;
        client.login().await?;
        Ok(client)
    }

    pub fn connection(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Signs in and replaces the session cookies.
    ///
    /// Does nothing when no credentials are configured.
    pub async fn login(&self) -> Result<()> {
        let Some(credentials) = self.config.credentials() else {
            debug!("No credentials configured, using anonymous access");
            return Ok(());
        };

        let uri = self.config.sign_in_uri()?;
        debug!("POST {uri}");
        let response = self
            .http
            .post(uri)
            .json(&credentials.sign_in_body())
            .send()
            .await
            .map_err(|e| MqmError::transport("Cannot sign in to MQM", e))?;

        if !response.status().is_success() {
            return Err(request_error("Authentication failed", response).await);
        }

        if !self.session.replace_from(response.headers()) {
            warn!("Sign-in response did not set the {} cookie", crate::auth::SSO_COOKIE);
        }
        info!("Signed in to {} as {}", self.config.location(), credentials.principal());

        Ok(())
    }

    /// Attaches the session cookies to a request.
    pub(super) fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match self.session.cookie_header() {
            Some(cookies) => request.header(COOKIE, cookies),
            None => request,
        }
    }

    /// Sends a request, mapping connection-level failures to `Transport`.
    pub(super) async fn execute(&self, request: RequestBuilder, context: &str) -> Result<Response> {
        self.authorized(request)
            .send()
            .await
            .map_err(|e| MqmError::transport(context, e))
    }
}

/// Fails with a `Request` error unless the response has the expected status.
pub(super) async fn expect_status(
    response: Response,
    expected: StatusCode,
    context: &str,
) -> Result<Response> {
    if response.status() == expected {
        Ok(response)
    } else {
        Err(request_error(context, response).await)
    }
}

/// Builds a `Request` error from a non-success response, consuming its body.
pub(super) async fn request_error(context: &str, response: Response) -> MqmError {
    let status = response.status();
    let description = match response.text().await {
        Ok(body) => extract_error_description(&body),
        Err(e) => {
            error!("Unable to determine failure message: {e}");
            String::new()
        }
    };

    MqmError::Request {
        context: context.to_string(),
        status: status.as_u16(),
        reason: status.canonical_reason().unwrap_or_default().to_string(),
        description,
    }
}

/// Best-effort error description from a server error body.
///
/// Prefers `description` when `error_code` is also present, then `message`.
pub(crate) fn extract_error_description(body: &str) -> String {
    let value: Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(e) => {
            error!("Unable to determine failure message: {e}");
            return String::new();
        }
    };

    if value.get("error_code").is_some() {
        if let Some(description) = value.get("description") {
            return value_to_string(description);
        }
    }
    value.get("message").map(value_to_string).unwrap_or_default()
}

/// Reads the response body as JSON.
pub(super) async fn read_json(response: Response, context: &str) -> Result<Value> {
    let body = response
        .text()
        .await
        .map_err(|e| MqmError::transport(context, e))?;
    serde_json::from_str(&body).map_err(|e| MqmError::invalid_response(context, e))
}

/// The `data` array of a collection response.
pub(super) fn data_array<'a>(value: &'a Value, context: &str) -> Result<&'a [Value]> {
    value
        .get("data")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .ok_or_else(|| MqmError::invalid_response(context, "missing 'data' array"))
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{Credentials, Secret};
    use mockito::Matcher;
    use serde_json::json;

    #[test]
    fn test_extract_error_description_prefers_description() {
        let body = r#"{"error_code":"platform.duplicate","description":"Pipeline exists","message":"ignored"}"#;
        assert_eq!(extract_error_description(body), "Pipeline exists");
    }

    #[test]
    fn test_extract_error_description_falls_back_to_message() {
        assert_eq!(
            extract_error_description(r#"{"description":"no code","message":"Bad request"}"#),
            "Bad request"
        );
    }

    #[test]
    fn test_extract_error_description_empty_for_html() {
        assert_eq!(extract_error_description("<html>Oops</html>"), "");
        assert_eq!(extract_error_description(r#"{"other":1}"#), "");
    }

    #[tokio::test]
    async fn test_login_stores_session_cookie() {
        let mut server = mockito::Server::new_async().await;
        let sign_in = server
            .mock("POST", "/authentication/sign_in")
            .match_header(CLIENT_TYPE_HEADER, "HPE_CI_CLIENT")
            .match_body(Matcher::Json(json!({
                "client_id": "ci_key",
                "client_secret": "secret"
            })))
            .with_status(200)
            .with_header("set-cookie", "LWSSO_COOKIE_KEY=abc; Path=/; HttpOnly")
            .create_async()
            .await;
        let ping = server
            .mock("GET", "/ping")
            .match_header("cookie", "LWSSO_COOKIE_KEY=abc")
            .with_status(200)
            .create_async()
            .await;

        let config = ConnectionConfig::new(&server.url(), "1001")
            .unwrap()
            .with_credentials(Credentials::ApiKey {
                client_id: "ci_key".to_string(),
                client_secret: Secret::from("secret"),
            });
        let client = MqmClient::connect(config).await.unwrap();

        let response = client
            .execute(client.http.get(format!("{}/ping", server.url())), "ping")
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        sign_in.assert_async().await;
        ping.assert_async().await;
    }

    #[tokio::test]
    async fn test_login_failure_is_request_error() {
        let mut server = mockito::Server::new_async().await;
        let _sign_in = server
            .mock("POST", "/authentication/sign_in")
            .with_status(401)
            .with_body(r#"{"error_code":"auth.failed","description":"Bad credentials"}"#)
            .create_async()
            .await;

        let config = ConnectionConfig::new(&server.url(), "1001")
            .unwrap()
            .with_credentials(Credentials::User {
                user: "ci".to_string(),
                password: Secret::from("wrong"),
            });
        let err = MqmClient::connect(config).await.unwrap_err();

        assert_eq!(err.status(), Some(401));
        assert!(err.to_string().contains("Bad credentials"));
    }

    #[tokio::test]
    async fn test_login_without_credentials_is_noop() {
        let config = ConnectionConfig::new("http://127.0.0.1:9", "1001").unwrap();
        let client = MqmClient::new(config).unwrap();
        assert!(client.login().await.is_ok());
    }
}
