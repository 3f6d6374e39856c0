//! Repository content retrieval
//!
//! Materializes a repository revision into a fresh temporary directory via a
//! shallow clone. All libgit2 work runs on the blocking pool; the async seam
//! is only the dispatch.

use std::path::{Path, PathBuf};

use git2::build::{CheckoutBuilder, RepoBuilder};
use git2::{
    CertificateCheckStatus, CredentialType, FetchOptions, RemoteCallbacks,
    Repository as GitRepository,
};
use tempfile::TempDir;
use tokio::task;
use tracing::{debug, instrument};

use crate::credentials::{AuthContext, TransportProtocol};
use crate::error::{GitProviderError, Result};
use crate::models::{Repository, RepositoryPointer};

/// Host key handling for SSH transports, decided per call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HostKeyPolicy {
    /// Reject hosts that fail the default certificate check.
    #[default]
    Strict,
    /// Accept unknown host keys for this call only.
    AcceptUnknown,
}

/// A materialized working tree.
///
/// Holds the backing [`TempDir`]: dropping this value deletes the checkout.
#[derive(Debug)]
pub struct RetrievedContent {
    dir: TempDir,
    path: PathBuf,
}

impl RetrievedContent {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Hand over the directory handle, and with it deletion responsibility.
    pub fn into_temp_dir(self) -> TempDir {
        self.dir
    }
}

#[derive(Default)]
pub struct ContentRetriever;

impl ContentRetriever {
    pub fn new() -> Self {
        Self
    }

    /// Shallow-clone `repository` and check out the revision named by
    /// `pointer`.
    ///
    /// Each call gets its own temp directory; on any failure it is removed
    /// before the error is returned.
    #[instrument(skip(self, repository, auth), fields(repo = %repository.name))]
    pub async fn retrieve(
        &self,
        repository: &Repository,
        pointer: &RepositoryPointer,
        auth: &AuthContext,
        host_key_policy: HostKeyPolicy,
    ) -> Result<RetrievedContent> {
        validate_pointer(pointer)?;
        let ssh = auth.transport_protocol() == TransportProtocol::Ssh;
        if ssh && auth.ssh_private_key().is_none() {
            return Err(GitProviderError::Validation(
                "SSH retrieval requires private key material in the auth context".to_string(),
            ));
        }
        let url = repository
            .clone_url(ssh)
            .ok_or_else(|| {
                GitProviderError::Validation(format!(
                    "repository '{}' has no clone URL for the requested transport",
                    repository.name
                ))
            })?
            .to_string();

        let dir = TempDir::with_prefix("forgeport-").map_err(|e| {
            GitProviderError::transport_msg(format!("failed to create temp directory: {}", e))
        })?;
        let target = dir.path().to_path_buf();
        let auth = auth.clone();
        let pointer = pointer.clone();

        debug!(%url, "starting retrieval");
        let outcome = task::spawn_blocking(move || {
            clone_and_checkout(&url, &pointer, &auth, host_key_policy, &target)
        })
        .await
        .map_err(|e| GitProviderError::transport_msg(format!("retrieval task failed: {}", e)))?;

        // `dir` is dropped, and the checkout removed, on either error path
        outcome?;
        let path = dir.path().to_path_buf();
        Ok(RetrievedContent { dir, path })
    }
}

fn validate_pointer(pointer: &RepositoryPointer) -> Result<()> {
    let name = match pointer {
        RepositoryPointer::Branch(n) | RepositoryPointer::Commit(n) | RepositoryPointer::Tag(n) => {
            n
        }
        RepositoryPointer::Default => return Ok(()),
    };
    if name.trim().is_empty() {
        return Err(GitProviderError::Validation(
            "repository pointer must name a branch, commit, or tag".to_string(),
        ));
    }
    Ok(())
}

fn callbacks<'a>(auth: &'a AuthContext, policy: HostKeyPolicy) -> RemoteCallbacks<'a> {
    let mut cb = RemoteCallbacks::new();
    cb.credentials(move |_url, username_from_url, allowed_types| {
        match auth.transport_protocol() {
            TransportProtocol::Ssh => {
                if let Some(private_key) = auth.ssh_private_key() {
                    git2::Cred::ssh_key_from_memory(
                        username_from_url.unwrap_or_else(|| auth.ssh_user()),
                        auth.ssh_public_key(),
                        private_key,
                        None,
                    )
                } else {
                    git2::Cred::default()
                }
            }
            TransportProtocol::Http => {
                if allowed_types.contains(CredentialType::USER_PASS_PLAINTEXT) {
                    if let Some((user, pass)) = auth.http_userpass() {
                        return git2::Cred::userpass_plaintext(user, pass);
                    }
                }
                git2::Cred::default()
            }
        }
    });
    if policy == HostKeyPolicy::AcceptUnknown {
        cb.certificate_check(|_cert, _host| Ok(CertificateCheckStatus::CertificateOk));
    }
    cb
}

fn fetch_options<'a>(auth: &'a AuthContext, policy: HostKeyPolicy) -> FetchOptions<'a> {
    let mut options = FetchOptions::new();
    options.remote_callbacks(callbacks(auth, policy));
    options.depth(1);
    options
}

fn clone_and_checkout(
    url: &str,
    pointer: &RepositoryPointer,
    auth: &AuthContext,
    policy: HostKeyPolicy,
    target: &Path,
) -> Result<()> {
    let wrap = |e: git2::Error| GitProviderError::transport("git retrieval failed", e);

    let repo = match RepoBuilder::new()
        .fetch_options(fetch_options(auth, policy))
        .clone(url, target)
    {
        Ok(repo) => repo,
        // Not every transport implements shallow fetches; retry once at
        // full depth, keeping every other failure as-is
        Err(e) if e.message().contains("shallow") || e.message().contains("depth") => {
            debug!("shallow clone rejected, retrying at full depth");
            std::fs::remove_dir_all(target).map_err(|io| {
                GitProviderError::transport_msg(format!("failed to reset clone target: {}", io))
            })?;
            let mut options = FetchOptions::new();
            options.remote_callbacks(callbacks(auth, policy));
            RepoBuilder::new()
                .fetch_options(options)
                .clone(url, target)
                .map_err(wrap)?
        }
        Err(e) => return Err(wrap(e)),
    };

    let object = resolve_pointer(&repo, pointer, auth, policy).map_err(wrap)?;
    repo.checkout_tree(&object, Some(CheckoutBuilder::default().force()))
        .map_err(wrap)?;
    repo.set_head_detached(object.peel_to_commit().map_err(wrap)?.id())
        .map_err(wrap)?;
    Ok(())
}

fn resolve_pointer<'r>(
    repo: &'r GitRepository,
    pointer: &RepositoryPointer,
    auth: &AuthContext,
    policy: HostKeyPolicy,
) -> std::result::Result<git2::Object<'r>, git2::Error> {
    match pointer {
        RepositoryPointer::Branch(name) => {
            resolve_or_fetch(repo, auth, policy, &format!("refs/remotes/origin/{}", name), Some(&format!("refs/heads/{0}:refs/remotes/origin/{0}", name)))
        }
        RepositoryPointer::Tag(name) => {
            // Shallow clones can miss tags pointing outside the fetched tip
            resolve_or_fetch(repo, auth, policy, &format!("refs/tags/{}", name), Some(&format!("refs/tags/{0}:refs/tags/{0}", name)))
        }
        RepositoryPointer::Commit(hash) => resolve_or_fetch(repo, auth, policy, hash, Some(hash)),
        RepositoryPointer::Default => {
            match repo.revparse_single("refs/remotes/origin/main") {
                Ok(object) => Ok(object),
                Err(_) => repo.revparse_single("refs/remotes/origin/master"),
            }
        }
    }
}

/// Resolve a revision, fetching its exact refspec once if the shallow clone
/// did not bring it along.
fn resolve_or_fetch<'r>(
    repo: &'r GitRepository,
    auth: &AuthContext,
    policy: HostKeyPolicy,
    spec: &str,
    refspec: Option<&str>,
) -> std::result::Result<git2::Object<'r>, git2::Error> {
    if let Ok(object) = repo.revparse_single(spec) {
        return Ok(object);
    }
    if let Some(refspec) = refspec {
        let mut remote = repo.find_remote("origin")?;
        remote.fetch(&[refspec], Some(&mut fetch_options(auth, policy)), None)?;
    }
    repo.revparse_single(spec)
}
