//! Domain read-models shared by all provider adapters
//!
//! Everything here is transient: rebuilt from each API response, never cached
//! or persisted across calls.

use forgeport_core::UtcDateTime;
use serde::{Deserialize, Serialize};

/// A provider-level grouping that owns repositories: a GitHub organization,
/// GitLab group, Bitbucket workspace, Azure DevOps project, or the synthetic
/// CodeCommit default organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub id: String,
    pub name: String,
    pub url: Option<String>,
}

/// Who owns a repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OwnerType {
    /// A group/workspace/project owner.
    Organization,
    /// A user account.
    Account,
}

/// Repository visibility, normalized across providers.
///
/// Providers report this as a boolean flag or a string enum; anything
/// ambiguous or missing normalizes to `Private`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Visibility {
    Public,
    #[default]
    Private,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repository {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub clone_url_http: String,
    pub clone_url_ssh: String,
    pub default_branch: String,
    pub owner_type: OwnerType,
    pub owner_id: String,
    pub visibility: Visibility,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Commit {
    pub hash: String,
    pub message: String,
    pub author: String,
    pub timestamp: UtcDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    pub name: String,
    pub commit_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,
    pub commit_hash: String,
}

/// Identifies the revision to materialize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RepositoryPointer {
    Branch(String),
    Commit(String),
    Tag(String),
    /// Checkout branch "main", falling back to "master".
    Default,
}

/// Input to `create_repository`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositorySpec {
    pub name: String,
    pub description: Option<String>,
    /// Organization/workspace/project to create under; `None` creates under
    /// the authenticated account where the provider supports that.
    pub organization: Option<String>,
    pub visibility: Visibility,
}

impl Repository {
    /// The clone URL for the given transport, if non-empty.
    pub fn clone_url(&self, ssh: bool) -> Option<&str> {
        let url = if ssh {
            &self.clone_url_ssh
        } else {
            &self.clone_url_http
        };
        if url.is_empty() {
            None
        } else {
            Some(url)
        }
    }
}

impl Visibility {
    /// Normalize a provider boolean `private`/`is_private` flag.
    pub fn from_private_flag(private: Option<bool>) -> Self {
        match private {
            Some(false) => Visibility::Public,
            // true, or missing: fail closed
            _ => Visibility::Private,
        }
    }

    /// Normalize a provider string enum ("public", "private", "internal").
    pub fn from_provider_str(value: Option<&str>) -> Self {
        match value {
            Some(v) if v.eq_ignore_ascii_case("public") => Visibility::Public,
            _ => Visibility::Private,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_visibility_from_boolean_flag() {
        assert_eq!(
            Visibility::from_private_flag(Some(true)),
            Visibility::Private
        );
        assert_eq!(
            Visibility::from_private_flag(Some(false)),
            Visibility::Public
        );
        // Missing value fails closed
        assert_eq!(Visibility::from_private_flag(None), Visibility::Private);
    }

    #[test]
    fn test_visibility_from_string_enum() {
        assert_eq!(
            Visibility::from_provider_str(Some("private")),
            Visibility::Private
        );
        assert_eq!(
            Visibility::from_provider_str(Some("public")),
            Visibility::Public
        );
        assert_eq!(
            Visibility::from_provider_str(Some("internal")),
            Visibility::Private
        );
        assert_eq!(Visibility::from_provider_str(None), Visibility::Private);
    }

    #[test]
    fn test_clone_url_selection_rejects_empty() {
        let repo = Repository {
            id: "1".into(),
            name: "demo".into(),
            description: None,
            clone_url_http: "https://example.com/demo.git".into(),
            clone_url_ssh: String::new(),
            default_branch: "main".into(),
            owner_type: OwnerType::Account,
            owner_id: "me".into(),
            visibility: Visibility::Private,
        };
        assert_eq!(repo.clone_url(false), Some("https://example.com/demo.git"));
        assert_eq!(repo.clone_url(true), None);
    }
}
