use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use reqwest::header::{HeaderMap, SET_COOKIE};
use serde_json::json;

/// Name of the single sign-on cookie issued by the MQM server.
pub const SSO_COOKIE: &str = "LWSSO_COOKIE_KEY";

/// A secret value whose `Debug` output never reveals its content.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Secret {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for Secret {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    User { user: String, password: Secret },
    ApiKey { client_id: String, client_secret: Secret },
}

impl Credentials {
    pub(crate) fn sign_in_body(&self) -> serde_json::Value {
        match self {
            Self::User { user, password } => json!({
                "user": user,
                "password": password.as_str(),
            }),
            Self::ApiKey {
                client_id,
                client_secret,
            } => json!({
                "client_id": client_id,
                "client_secret": client_secret.as_str(),
            }),
        }
    }

    pub fn principal(&self) -> &str {
        match self {
            Self::User { user, .. } => user,
            Self::ApiKey { client_id, .. } => client_id,
        }
    }
}

/// Cookies obtained at sign-in, shared by every clone of a client.
#[derive(Debug, Clone, Default)]
pub(crate) struct Session {
    cookies: Arc<RwLock<Vec<(String, String)>>>,
}

impl Session {
    /// Replaces the session with the cookies set by a sign-in response.
    /// Returns whether the SSO cookie was among them.
    pub fn replace_from(&self, headers: &HeaderMap) -> bool {
        let mut cookies: Vec<(String, String)> = Vec::new();
        for value in headers.get_all(SET_COOKIE) {
            let Some((name, value)) = value.to_str().ok().and_then(parse_set_cookie) else {
                continue;
            };
            cookies.retain(|(existing, _)| *existing != name);
            cookies.push((name, value));
        }

        let has_sso = cookies.iter().any(|(name, _)| name == SSO_COOKIE);
        *self.cookies.write().unwrap_or_else(PoisonError::into_inner) = cookies;
        has_sso
    }

    /// Value for the `Cookie` request header, if signed in.
    pub fn cookie_header(&self) -> Option<String> {
        let guard = self.cookies.read().unwrap_or_else(PoisonError::into_inner);
        if guard.is_empty() {
            return None;
        }
        Some(
            guard
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

fn parse_set_cookie(raw: &str) -> Option<(String, String)> {
    let pair = raw.split(';').next()?.trim();
    let (name, value) = pair.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((name.to_string(), value.trim().to_string()))
}
