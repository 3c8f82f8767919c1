//! Remote API interface: session creation and posting.
//!
//! Only the contract lives here; the HTTP client is supplied by the caller.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{AuthError, PostError};

/// Identifier of a created post.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PostId(pub String);

impl std::fmt::Display for PostId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceEntry {
    pub id: String,
    pub service_endpoint: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DidDoc {
    #[serde(default)]
    pub service: Vec<ServiceEntry>,
}

/// An authenticated session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub access_jwt: String,
    pub refresh_jwt: String,
    pub handle: String,
    pub did: String,
    #[serde(default)]
    pub did_doc: Option<DidDoc>,
}

impl Session {
    /// Endpoint of the first advertised service, if any.
    pub fn service_endpoint(&self) -> Option<&str> {
        self.did_doc
            .as_ref()?
            .service
            .first()
            .map(|s| s.service_endpoint.as_str())
    }

    /// Head and tail of the access token, `len / 2` characters each.
    ///
    /// Tokens too short to abbreviate are fully masked.
    pub fn debug_token(&self, len: usize) -> String {
        let chars: Vec<char> = self.access_jwt.chars().collect();
        let half = len / 2;
        if half == 0 || chars.len() <= len {
            return "*".repeat(chars.len().min(8));
        }
        let head: String = chars[..half].iter().collect();
        let tail: String = chars[chars.len() - half..].iter().collect();
        format!("{head}...{tail}")
    }
}

/// Remote service the bot posts to.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// Create a new session. May block on the network.
    async fn authenticate(&self) -> Result<Session, AuthError>;

    /// Publish `content` using `session`.
    async fn post(&self, session: &Session, content: &str) -> Result<PostId, PostError>;
}
