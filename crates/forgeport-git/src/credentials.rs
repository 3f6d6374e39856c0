//! Credential resolution and git-transport auth contexts
//!
//! A [`Credential`] is extracted from inbound request headers and scoped to a
//! single operation. The REST side of an adapter consumes it directly; the
//! git-transport side consumes an [`AuthContext`] derived from it by the
//! adapter's `build_auth_context`. Neither is ever logged or persisted.

use std::collections::HashMap;
use std::fmt;

use tracing::debug;

/// Header carrying the credential type discriminator.
pub const HEADER_CREDENTIAL_TYPE: &str = "x-forgeport-credential-type";
/// Optional username parameter for PAT credentials.
pub const HEADER_USERNAME: &str = "x-forgeport-username";
/// Token parameter for PAT credentials.
pub const HEADER_TOKEN: &str = "x-forgeport-token";

/// A credential for one inbound operation.
#[derive(Clone)]
pub enum Credential {
    /// Personal access token, optionally qualified by a username (required
    /// by providers that authenticate with Basic auth, e.g. Bitbucket).
    Pat {
        username: Option<String>,
        token: String,
    },
    /// OAuth client settings. Resolved tokens are exchanged upstream; the
    /// adapter only carries the client configuration through.
    OAuth {
        url: String,
        grant_type: String,
        scope: Option<String>,
        client_id: String,
        client_secret: String,
        certificate: Option<String>,
        certificate_key: Option<String>,
    },
    /// AWS IAM credentials for SigV4-signed providers.
    Aws {
        access_key_id: String,
        secret_key: String,
        session_token: Option<String>,
        region: String,
    },
}

// Secrets must never leak through Debug output.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::Pat { username, .. } => f
                .debug_struct("Credential::Pat")
                .field("username", username)
                .field("token", &"<redacted>")
                .finish(),
            Credential::OAuth { url, client_id, .. } => f
                .debug_struct("Credential::OAuth")
                .field("url", url)
                .field("client_id", client_id)
                .field("client_secret", &"<redacted>")
                .finish(),
            Credential::Aws {
                access_key_id,
                region,
                ..
            } => f
                .debug_struct("Credential::Aws")
                .field("access_key_id", access_key_id)
                .field("secret_key", &"<redacted>")
                .field("region", region)
                .finish(),
        }
    }
}

/// Extract a typed credential from a case-insensitive header map.
///
/// Dispatches on the `x-forgeport-credential-type` discriminator. An
/// unsupported or missing type yields `None`, which callers must treat as
/// "no credential" rather than silently proceeding as authenticated.
/// `OAUTH` and `AWS` discriminators are reserved for header-based resolution
/// and currently resolve to `None`; those credentials arrive through typed
/// configuration instead.
pub fn resolve_credential(headers: &HashMap<String, String>) -> Option<Credential> {
    let kind = header_value(headers, HEADER_CREDENTIAL_TYPE)?;

    if kind.eq_ignore_ascii_case("pat") {
        let token = match header_value(headers, HEADER_TOKEN) {
            Some(t) if !t.trim().is_empty() => t.trim().to_string(),
            _ => {
                debug!("PAT credential headers present but token is missing");
                return None;
            }
        };
        let username = header_value(headers, HEADER_USERNAME)
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty());
        return Some(Credential::Pat { username, token });
    }

    debug!(credential_type = %kind, "unsupported credential type header");
    None
}

fn header_value<'a>(headers: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Git transport to use for content retrieval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportProtocol {
    Http,
    Ssh,
}

/// Auth material for the git-transport layer, derived from a [`Credential`]
/// by a provider adapter. Distinct from the REST headers used for listing
/// calls.
///
/// Built once through [`AuthContext::builder`] and immutable afterwards.
#[derive(Clone)]
pub struct AuthContext {
    transport_protocol: TransportProtocol,
    http_auth_headers: Vec<(String, String)>,
    http_username: Option<String>,
    http_password: Option<String>,
    ssh_private_key: Option<String>,
    ssh_public_key: Option<String>,
    ssh_user: Option<String>,
}

impl AuthContext {
    pub fn builder(transport_protocol: TransportProtocol) -> AuthContextBuilder {
        AuthContextBuilder {
            transport_protocol,
            http_auth_headers: Vec::new(),
            http_username: None,
            http_password: None,
            ssh_private_key: None,
            ssh_public_key: None,
            ssh_user: None,
        }
    }

    pub fn transport_protocol(&self) -> TransportProtocol {
        self.transport_protocol
    }

    /// Headers for transports that support header injection.
    pub fn http_auth_headers(&self) -> &[(String, String)] {
        &self.http_auth_headers
    }

    /// Username/password pair for smart-HTTP credential callbacks.
    pub fn http_userpass(&self) -> Option<(&str, &str)> {
        match (&self.http_username, &self.http_password) {
            (Some(u), Some(p)) => Some((u.as_str(), p.as_str())),
            _ => None,
        }
    }

    pub fn ssh_private_key(&self) -> Option<&str> {
        self.ssh_private_key.as_deref()
    }

    pub fn ssh_public_key(&self) -> Option<&str> {
        self.ssh_public_key.as_deref()
    }

    pub fn ssh_user(&self) -> &str {
        self.ssh_user.as_deref().unwrap_or("git")
    }
}

impl fmt::Debug for AuthContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthContext")
            .field("transport_protocol", &self.transport_protocol)
            .field("http_auth_headers", &self.http_auth_headers.len())
            .field("http_username", &self.http_username)
            .field("ssh_user", &self.ssh_user)
            .finish()
    }
}

pub struct AuthContextBuilder {
    transport_protocol: TransportProtocol,
    http_auth_headers: Vec<(String, String)>,
    http_username: Option<String>,
    http_password: Option<String>,
    ssh_private_key: Option<String>,
    ssh_public_key: Option<String>,
    ssh_user: Option<String>,
}

impl AuthContextBuilder {
    pub fn http_auth_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.http_auth_headers.push((name.into(), value.into()));
        self
    }

    pub fn http_userpass(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.http_username = Some(username.into());
        self.http_password = Some(password.into());
        self
    }

    pub fn ssh_key_pair(
        mut self,
        private_key: impl Into<String>,
        public_key: Option<String>,
    ) -> Self {
        self.ssh_private_key = Some(private_key.into());
        self.ssh_public_key = public_key;
        self
    }

    pub fn ssh_user(mut self, user: impl Into<String>) -> Self {
        self.ssh_user = Some(user.into());
        self
    }

    pub fn build(self) -> AuthContext {
        AuthContext {
            transport_protocol: self.transport_protocol,
            http_auth_headers: self.http_auth_headers,
            http_username: self.http_username,
            http_password: self.http_password,
            ssh_private_key: self.ssh_private_key,
            ssh_public_key: self.ssh_public_key,
            ssh_user: self.ssh_user,
        }
    }
}
