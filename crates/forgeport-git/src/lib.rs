//! Unified client over Git hosting providers and repository content retrieval
//!
//! One capability contract ([`GitProvider`](providers::GitProvider)) over
//! GitHub, GitLab, Bitbucket Cloud, Azure DevOps and AWS CodeCommit, plus a
//! [`ContentRetriever`](retriever::ContentRetriever) that materializes a
//! repository revision into an isolated temporary directory via the git
//! transport.

pub mod credentials;
pub mod error;
pub mod models;
pub mod providers;
pub mod retriever;

pub use credentials::{resolve_credential, AuthContext, Credential, TransportProtocol};
pub use error::GitProviderError;
pub use models::{
    Branch, Commit, Organization, OwnerType, Repository, RepositoryPointer, RepositorySpec, Tag,
    User, Visibility,
};
pub use providers::{build_provider, build_public_provider, GitProvider, ProviderKind};
pub use retriever::{ContentRetriever, HostKeyPolicy, RetrievedContent};
