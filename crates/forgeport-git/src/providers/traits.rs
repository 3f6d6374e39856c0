//! The shared capability contract every provider adapter implements

use async_trait::async_trait;
use forgeport_core::{Page, PageRequest};

use crate::credentials::{AuthContext, TransportProtocol};
use crate::error::Result;
use crate::models::{
    Branch, Commit, Organization, Repository, RepositorySpec, Tag, User,
};
use crate::providers::ProviderKind;

/// Unified interface over a Git hosting provider.
///
/// All operations are single-shot: no internal retries, no caching. A
/// blocked provider call occupies the calling task for the duration of the
/// configured HTTP timeout; callers apply their own timeout/retry policy
/// above this trait.
#[async_trait]
pub trait GitProvider: Send + Sync + std::fmt::Debug {
    /// Which provider this adapter talks to.
    fn kind(&self) -> ProviderKind;

    /// Probe connectivity and credential acceptance. Fails loudly on
    /// rejection rather than degrading.
    async fn check_connection(&self) -> Result<()>;

    /// The user the credential authenticates as.
    async fn get_current_user(&self) -> Result<User>;

    /// List organizations (groups/workspaces/projects) visible to the
    /// credential, in provider order.
    async fn list_organizations(&self, page: PageRequest) -> Result<Page<Organization>>;

    /// Fetch one organization by its provider identifier.
    async fn get_organization(&self, id: &str) -> Result<Organization>;

    /// List members of an organization.
    async fn list_members(&self, organization: &str, page: PageRequest) -> Result<Page<User>>;

    /// List repositories owned by an organization, a user, or the
    /// authenticated account when both are `None`.
    async fn list_repositories(
        &self,
        organization: Option<&str>,
        user: Option<&str>,
        page: PageRequest,
    ) -> Result<Page<Repository>>;

    /// Fetch one repository by the provider's natural identifier
    /// (`owner/name` path, GUID, or plain name depending on the provider).
    async fn get_repository(&self, id: &str) -> Result<Repository>;

    /// Create a repository.
    async fn create_repository(&self, spec: &RepositorySpec) -> Result<Repository>;

    /// List commits of a repository's default history, newest first.
    async fn list_commits(&self, repository: &str, page: PageRequest) -> Result<Page<Commit>>;

    /// List branches with their resolved commit hashes.
    async fn list_branches(&self, repository: &str, page: PageRequest) -> Result<Page<Branch>>;

    /// List tags with their resolved commit hashes.
    async fn list_tags(&self, repository: &str, page: PageRequest) -> Result<Page<Tag>>;

    /// Derive git-transport auth material from this adapter's credential.
    /// Independent from the REST headers used by the listing calls.
    fn build_auth_context(&self, protocol: TransportProtocol) -> Result<AuthContext>;
}
