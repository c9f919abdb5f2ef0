use log::{debug, info, warn};
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;

use super::core::MqmClient;
use crate::error::Result;
use crate::events::CiEventsList;

const URI_PUT_EVENTS: &str = "analytics/ci/events";

impl MqmClient {
    /// Delivers a raw JSON events payload.
    ///
    /// A 307 answer means the session expired: the client signs in again and
    /// repeats the request once. Delivery is best-effort, so every failure is
    /// logged and reported as `false` instead of an error.
    pub async fn put_events(&self, json: &str) -> bool {
        let mut status = match self.send_events(json).await {
            Ok(status) => status,
            Err(e) => {
                warn!("Failed to put events: {e}");
                return false;
            }
        };

        if status == StatusCode::TEMPORARY_REDIRECT {
            debug!("Event delivery redirected, signing in again");
            if let Err(e) = self.login().await {
                warn!("Failed to put events, re-login was rejected: {e}");
                return false;
            }
            status = match self.send_events(json).await {
                Ok(status) => status,
                Err(e) => {
                    warn!("Failed to put events after re-login: {e}");
                    return false;
                }
            };
        }

        if status == StatusCode::OK {
            info!("Events delivered");
            true
        } else {
            warn!(
                "Put events failed; status code {} and reason {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or_default()
            );
            false
        }
    }

    /// Serializes and delivers a list of CI events.
    pub async fn put_events_list(&self, events: &CiEventsList) -> bool {
        match serde_json::to_string(events) {
            Ok(json) => self.put_events(&json).await,
            Err(e) => {
                warn!("Failed to serialize events: {e}");
                false
            }
        }
    }

    async fn send_events(&self, json: &str) -> Result<StatusCode> {
        let uri = self
            .config
            .shared_space_internal_api_uri(URI_PUT_EVENTS, &[])?;
        debug!("PUT {uri}");

        let request = self
            .http
            .put(uri)
            .header(CONTENT_TYPE, "application/json")
            .body(json.to_string());
        let response = self.execute(request, "Cannot put events to MQM").await?;
        Ok(response.status())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{Credentials, Secret};
    use crate::client::ConnectionConfig;
    use crate::events::{CiEvent, CiEventType, CiServerInfo};
    use mockito::Matcher;
    use serde_json::json;

    const EVENTS_PATH: &str = "/internal-api/shared_spaces/1001/analytics/ci/events";

    fn client_with_credentials(server: &mockito::Server) -> MqmClient {
        let config = ConnectionConfig::new(&server.url(), "1001")
            .unwrap()
            .with_credentials(Credentials::User {
                user: "ci".to_string(),
                password: Secret::from("pass"),
            });
        MqmClient::new(config).unwrap()
    }

    #[tokio::test]
    async fn test_put_events_ok() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("PUT", EVENTS_PATH)
            .match_header("content-type", "application/json")
            .match_body(r#"{"events":[]}"#)
            .with_status(200)
            .create_async()
            .await;

        assert!(client_with_credentials(&server).put_events(r#"{"events":[]}"#).await);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_put_events_relogs_once_after_redirect() {
        let mut server = mockito::Server::new_async().await;
        let sign_in = server
            .mock("POST", "/authentication/sign_in")
            .with_status(200)
            .with_header("set-cookie", "LWSSO_COOKIE_KEY=fresh; Path=/")
            .expect(1)
            .create_async()
            .await;
        let expired = server
            .mock("PUT", EVENTS_PATH)
            .match_header("cookie", Matcher::Missing)
            .with_status(307)
            .expect(1)
            .create_async()
            .await;
        let accepted = server
            .mock("PUT", EVENTS_PATH)
            .match_header("cookie", "LWSSO_COOKIE_KEY=fresh")
            .with_status(200)
            .expect(1)
            .create_async()
            .await;

        assert!(client_with_credentials(&server).put_events("{}").await);

        sign_in.assert_async().await;
        expired.assert_async().await;
        accepted.assert_async().await;
    }

    #[tokio::test]
    async fn test_put_events_retries_only_once() {
        let mut server = mockito::Server::new_async().await;
        let sign_in = server
            .mock("POST", "/authentication/sign_in")
            .with_status(200)
            .with_header("set-cookie", "LWSSO_COOKIE_KEY=fresh; Path=/")
            .expect(1)
            .create_async()
            .await;
        let redirect = server
            .mock("PUT", EVENTS_PATH)
            .with_status(307)
            .expect(2)
            .create_async()
            .await;

        assert!(!client_with_credentials(&server).put_events("{}").await);

        sign_in.assert_async().await;
        redirect.assert_async().await;
    }

    #[tokio::test]
    async fn test_put_events_retry_failure_is_false() {
        let mut server = mockito::Server::new_async().await;
        let sign_in = server
            .mock("POST", "/authentication/sign_in")
            .with_status(200)
            .with_header("set-cookie", "LWSSO_COOKIE_KEY=fresh; Path=/")
            .expect(1)
            .create_async()
            .await;
        let expired = server
            .mock("PUT", EVENTS_PATH)
            .match_header("cookie", Matcher::Missing)
            .with_status(307)
            .expect(1)
            .create_async()
            .await;
        let retry = server
            .mock("PUT", EVENTS_PATH)
            .match_header("cookie", "LWSSO_COOKIE_KEY=fresh")
            .with_status(500)
            .expect(1)
            .create_async()
            .await;

        assert!(!client_with_credentials(&server).put_events("{}").await);

        sign_in.assert_async().await;
        expired.assert_async().await;
        retry.assert_async().await;
    }

    #[tokio::test]
    async fn test_put_events_failed_relogin_is_false() {
        let mut server = mockito::Server::new_async().await;
        let _sign_in = server
            .mock("POST", "/authentication/sign_in")
            .with_status(401)
            .create_async()
            .await;
        let redirect = server
            .mock("PUT", EVENTS_PATH)
            .with_status(307)
            .expect(1)
            .create_async()
            .await;

        assert!(!client_with_credentials(&server).put_events("{}").await);
        redirect.assert_async().await;
    }

    #[tokio::test]
    async fn test_put_events_server_error_is_false() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("PUT", EVENTS_PATH)
            .with_status(500)
            .expect(1)
            .create_async()
            .await;

        assert!(!client_with_credentials(&server).put_events("{}").await);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_put_events_unreachable_is_false() {
        let config = ConnectionConfig::new("http://127.0.0.1:9", "1001").unwrap();
        let client = MqmClient::new(config).unwrap();
        assert!(!client.put_events("{}").await);
    }

    #[tokio::test]
    async fn test_put_events_list_serializes_payload() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("PUT", EVENTS_PATH)
            .match_body(Matcher::PartialJson(json!({
                "server": { "type": "jenkins", "instanceId": "srv-1" },
                "events": [ { "eventType": "started", "project": "app", "buildCiId": "42" } ]
            })))
            .with_status(200)
            .create_async()
            .await;

        let events = CiEventsList {
            server: CiServerInfo {
                server_type: "jenkins".to_string(),
                version: "2.440".to_string(),
                url: "http://jenkins:8080".to_string(),
                instance_id: "srv-1".to_string(),
                sending_time: 1_700_000_000_000,
            },
            events: vec![CiEvent::new(CiEventType::Started, "app", 42)],
        };

        assert!(client_with_credentials(&server).put_events_list(&events).await);
        mock.assert_async().await;
    }
}
