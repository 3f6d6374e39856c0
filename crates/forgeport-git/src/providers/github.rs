//! GitHub REST v3 adapter

use async_trait::async_trait;
use chrono::Utc;
use forgeport_core::{Page, PageRequest};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::credentials::{AuthContext, Credential, TransportProtocol};
use crate::error::{GitProviderError, Result};
use crate::models::{
    Branch, Commit, Organization, OwnerType, Repository, RepositorySpec, Tag, User, Visibility,
};
use crate::providers::{build_http_client, error_from_response, GitProvider, ProviderKind};

pub const GITHUB_API_BASE: &str = "https://api.github.com";

#[derive(Debug)]
pub struct GitHubAdapter {
    client: reqwest::Client,
    base_url: String,
    credential: Option<Credential>,
}

// Response structs for API calls

#[derive(Deserialize)]
struct GitHubAccount {
    id: i64,
    login: String,
    #[serde(rename = "type")]
    kind: Option<String>,
    name: Option<String>,
    avatar_url: Option<String>,
    html_url: Option<String>,
}

#[derive(Deserialize)]
struct GitHubOrg {
    id: i64,
    login: String,
    url: Option<String>,
}

#[derive(Deserialize)]
struct GitHubRepo {
    id: i64,
    name: String,
    owner: GitHubAccount,
    description: Option<String>,
    private: Option<bool>,
    default_branch: Option<String>,
    clone_url: Option<String>,
    ssh_url: Option<String>,
}

#[derive(Deserialize)]
struct GitHubCommit {
    sha: String,
    commit: GitHubCommitDetail,
}

#[derive(Deserialize)]
struct GitHubCommitDetail {
    message: String,
    author: Option<GitHubCommitIdentity>,
}

#[derive(Deserialize)]
struct GitHubCommitIdentity {
    name: Option<String>,
    date: Option<String>,
}

#[derive(Deserialize)]
struct GitHubRef {
    name: String,
    commit: GitHubRefCommit,
}

#[derive(Deserialize)]
struct GitHubRefCommit {
    sha: String,
}

#[derive(Serialize)]
struct CreateRepoRequest<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    private: bool,
}

impl GitHubAdapter {
    pub fn new(base_url: impl Into<String>, credential: Option<Credential>) -> Result<Self> {
        if let Some(Credential::Aws { .. }) = credential {
            return Err(GitProviderError::Validation(
                "AWS credentials are not valid for GitHub".to_string(),
            ));
        }
        Ok(Self {
            client: build_http_client()?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credential,
        })
    }

    fn token(&self) -> Result<&str> {
        match &self.credential {
            Some(Credential::Pat { token, .. }) => Ok(token),
            Some(_) => Err(GitProviderError::Authentication(
                "GitHub REST calls require a personal access token".to_string(),
            )),
            None => Err(GitProviderError::Authentication(
                "no credential supplied for authenticated GitHub operation".to_string(),
            )),
        }
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .header(reqwest::header::ACCEPT, "application/vnd.github+json");
        if let Some(Credential::Pat { token, .. }) = &self.credential {
            builder = builder.bearer_auth(token);
        }
        builder
    }

    fn post(&self, path: &str) -> Result<reqwest::RequestBuilder> {
        let token = self.token()?;
        Ok(self
            .client
            .post(format!("{}{}", self.base_url, path))
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .bearer_auth(token))
    }

    async fn fetch<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        debug!(path, "GitHub API request");
        let response = self.get(path).send().await?;
        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        Ok(response.json().await?)
    }

    fn paged_path(path: &str, page: PageRequest) -> String {
        let sep = if path.contains('?') { '&' } else { '?' };
        format!("{}{}per_page={}&page={}", path, sep, page.size, page.one_based())
    }

    fn map_organization(org: GitHubOrg) -> Organization {
        Organization {
            id: org.id.to_string(),
            name: org.login,
            url: org.url,
        }
    }

    fn map_user(account: GitHubAccount) -> User {
        User {
            id: account.id.to_string(),
            username: account.login,
            display_name: account.name,
            avatar_url: account.avatar_url,
            url: account.html_url,
        }
    }

    fn map_repository(repo: GitHubRepo) -> Repository {
        let owner_type = match repo.owner.kind.as_deref() {
            Some("Organization") => OwnerType::Organization,
            _ => OwnerType::Account,
        };
        Repository {
            id: repo.id.to_string(),
            name: repo.name,
            description: repo.description,
            clone_url_http: repo.clone_url.unwrap_or_default(),
            clone_url_ssh: repo.ssh_url.unwrap_or_default(),
            default_branch: repo.default_branch.unwrap_or_else(|| "main".to_string()),
            owner_type,
            owner_id: repo.owner.login,
            visibility: Visibility::from_private_flag(repo.private),
        }
    }

    fn map_commit(commit: GitHubCommit) -> Commit {
        let identity = commit.commit.author;
        let author = identity
            .as_ref()
            .and_then(|a| a.name.clone())
            .unwrap_or_else(|| "unknown".to_string());
        let timestamp = identity
            .and_then(|a| a.date)
            .and_then(|d| chrono::DateTime::parse_from_rfc3339(&d).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);
        Commit {
            hash: commit.sha,
            message: commit.commit.message,
            author,
            timestamp,
        }
    }
}

#[async_trait]
impl GitProvider for GitHubAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::GitHub
    }

    async fn check_connection(&self) -> Result<()> {
        self.token()?;
        self.fetch::<serde_json::Value>("/user").await?;
        Ok(())
    }

    async fn get_current_user(&self) -> Result<User> {
        self.token()?;
        let account: GitHubAccount = self.fetch("/user").await?;
        Ok(Self::map_user(account))
    }

    async fn list_organizations(&self, page: PageRequest) -> Result<Page<Organization>> {
        let page = page.normalize();
        let orgs: Vec<GitHubOrg> = self
            .fetch(&Self::paged_path("/user/orgs", page))
            .await?;
        // GitHub does not report a grand total for this listing
        Ok(Page::unknown_total(
            orgs.into_iter().map(Self::map_organization).collect(),
            page,
        ))
    }

    async fn get_organization(&self, id: &str) -> Result<Organization> {
        let org: GitHubOrg = self.fetch(&format!("/orgs/{}", id)).await?;
        Ok(Self::map_organization(org))
    }

    async fn list_members(&self, organization: &str, page: PageRequest) -> Result<Page<User>> {
        let page = page.normalize();
        let members: Vec<GitHubAccount> = self
            .fetch(&Self::paged_path(
                &format!("/orgs/{}/members", organization),
                page,
            ))
            .await?;
        Ok(Page::unknown_total(
            members.into_iter().map(Self::map_user).collect(),
            page,
        ))
    }

    async fn list_repositories(
        &self,
        organization: Option<&str>,
        user: Option<&str>,
        page: PageRequest,
    ) -> Result<Page<Repository>> {
        let page = page.normalize();
        let path = match (organization, user) {
            (Some(org), _) => format!("/orgs/{}/repos", org),
            (None, Some(user)) => format!("/users/{}/repos", user),
            (None, None) => {
                self.token()?;
                "/user/repos".to_string()
            }
        };
        let repos: Vec<GitHubRepo> = self.fetch(&Self::paged_path(&path, page)).await?;
        Ok(Page::unknown_total(
            repos.into_iter().map(Self::map_repository).collect(),
            page,
        ))
    }

    async fn get_repository(&self, id: &str) -> Result<Repository> {
        let repo: GitHubRepo = self.fetch(&format!("/repos/{}", id)).await?;
        Ok(Self::map_repository(repo))
    }

    async fn create_repository(&self, spec: &RepositorySpec) -> Result<Repository> {
        let path = match &spec.organization {
            Some(org) => format!("/orgs/{}/repos", org),
            None => "/user/repos".to_string(),
        };
        let request = CreateRepoRequest {
            name: &spec.name,
            description: spec.description.as_deref(),
            private: spec.visibility == Visibility::Private,
        };
        let response = self.post(&path)?.json(&request).send().await?;
        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        let repo: GitHubRepo = response.json().await?;
        Ok(Self::map_repository(repo))
    }

    async fn list_commits(&self, repository: &str, page: PageRequest) -> Result<Page<Commit>> {
        let page = page.normalize();
        let commits: Vec<GitHubCommit> = self
            .fetch(&Self::paged_path(
                &format!("/repos/{}/commits", repository),
                page,
            ))
            .await?;
        Ok(Page::unknown_total(
            commits.into_iter().map(Self::map_commit).collect(),
            page,
        ))
    }

    async fn list_branches(&self, repository: &str, page: PageRequest) -> Result<Page<Branch>> {
        let page = page.normalize();
        let branches: Vec<GitHubRef> = self
            .fetch(&Self::paged_path(
                &format!("/repos/{}/branches", repository),
                page,
            ))
            .await?;
        Ok(Page::unknown_total(
            branches
                .into_iter()
                .map(|b| Branch {
                    name: b.name,
                    commit_hash: b.commit.sha,
                })
                .collect(),
            page,
        ))
    }

    async fn list_tags(&self, repository: &str, page: PageRequest) -> Result<Page<Tag>> {
        let page = page.normalize();
        let tags: Vec<GitHubRef> = self
            .fetch(&Self::paged_path(
                &format!("/repos/{}/tags", repository),
                page,
            ))
            .await?;
        Ok(Page::unknown_total(
            tags.into_iter()
                .map(|t| Tag {
                    name: t.name,
                    commit_hash: t.commit.sha,
                })
                .collect(),
            page,
        ))
    }

    fn build_auth_context(&self, protocol: TransportProtocol) -> Result<AuthContext> {
        match (&self.credential, protocol) {
            (Some(Credential::Pat { username, token }), TransportProtocol::Http) => {
                use base64::{engine::general_purpose::STANDARD, Engine};
                let user = username.as_deref().unwrap_or("x-access-token");
                let basic = STANDARD.encode(format!("{}:{}", user, token));
                Ok(AuthContext::builder(TransportProtocol::Http)
                    .http_auth_header("Authorization", format!("Basic {}", basic))
                    .http_userpass(user, token)
                    .build())
            }
            (Some(_), TransportProtocol::Ssh) => Err(GitProviderError::Validation(
                "SSH transport requires caller-supplied key material".to_string(),
            )),
            (Some(_), _) => Err(GitProviderError::Authentication(
                "GitHub transport auth requires a personal access token".to_string(),
            )),
            (None, _) => Err(GitProviderError::Authentication(
                "no credential to derive a transport auth context from".to_string(),
            )),
        }
    }
}
