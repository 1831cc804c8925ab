//! Caller identity for an upgrade request.

use tungstenite::http::HeaderMap;

use crate::error::{RelayError, RelayResult, SetupStage};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Identity {
    pub username: String,
    pub groups: Vec<String>,
}

/// Resolves who is asking. Runs inside the websocket handshake.
pub trait AuthContext: Send + Sync {
    fn identify(&self, headers: &HeaderMap) -> RelayResult<Identity>;
}

/// Trusts identity headers set by an authenticating proxy in front of the relay.
#[derive(Debug, Clone)]
pub struct HeaderAuth {
    user_header: String,
    groups_header: String,
}

impl HeaderAuth {
    pub fn new(user_header: impl Into<String>, groups_header: impl Into<String>) -> Self {
        Self {
            user_header: user_header.into(),
            groups_header: groups_header.into(),
        }
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

impl AuthContext for HeaderAuth {
    fn identify(&self, headers: &HeaderMap) -> RelayResult<Identity> {
        let username = header(headers, &self.user_header).ok_or_else(|| {
            RelayError::setup(
                SetupStage::Identity,
                format!("missing {} header", self.user_header),
            )
        })?;
        let groups = header(headers, &self.groups_header)
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|group| !group.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        Ok(Identity {
            username: username.to_string(),
            groups,
        })
    }
}

/// Development mode: every request acts as one fixed user.
#[derive(Debug, Clone)]
pub struct DevAuth {
    username: String,
}

impl DevAuth {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
        }
    }
}

impl AuthContext for DevAuth {
    fn identify(&self, _headers: &HeaderMap) -> RelayResult<Identity> {
        Ok(Identity {
            username: self.username.clone(),
            groups: vec!["dev".to_string()],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tungstenite::http::HeaderValue;

    fn auth() -> HeaderAuth {
        HeaderAuth::new("X-Forwarded-User", "X-Forwarded-Groups")
    }

    #[test]
    fn header_auth_reads_user_and_groups() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-user", HeaderValue::from_static("ada"));
        headers.insert(
            "x-forwarded-groups",
            HeaderValue::from_static("admins, ops,,"),
        );
        let identity = auth().identify(&headers).unwrap();
        assert_eq!(identity.username, "ada");
        assert_eq!(identity.groups, vec!["admins", "ops"]);
    }

    #[test]
    fn header_auth_rejects_anonymous_requests() {
        let err = auth().identify(&HeaderMap::new()).unwrap_err();
        assert!(matches!(
            err,
            RelayError::Setup {
                stage: SetupStage::Identity,
                ..
            }
        ));
    }

    #[test]
    fn dev_auth_ignores_headers() {
        let identity = DevAuth::new("dev-user").identify(&HeaderMap::new()).unwrap();
        assert_eq!(identity.username, "dev-user");
    }
}
