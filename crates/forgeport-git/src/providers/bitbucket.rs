//! Bitbucket Cloud 2.0 adapter
//!
//! Bitbucket wraps every listing in a `{values, page, pagelen, size}`
//! envelope; `size` is an exact total when present.

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

pub const BITBUCKET_API_BASE: &str = "https://api.bitbucket.org/2.0";

#[derive(Debug)]
pub struct BitbucketAdapter {
    client: reqwest::Client,
    base_url: String,
    credential: Option<Credential>,
}

// Response structs for API calls

#[derive(Deserialize)]
struct Paginated<T> {
    values: Vec<T>,
    /// Exact total when Bitbucket chooses to compute one.
    size: Option<u64>,
}

#[derive(Deserialize)]
struct BbLink {
    href: String,
}

#[derive(Deserialize, Default)]
struct BbLinks {
    html: Option<BbLink>,
    avatar: Option<BbLink>,
    clone: Option<Vec<BbCloneLink>>,
}

#[derive(Deserialize)]
struct BbCloneLink {
    name: String,
    href: String,
}

#[derive(Deserialize)]
struct BbWorkspace {
    uuid: String,
    slug: String,
    name: Option<String>,
    #[serde(default)]
    links: BbLinks,
}

#[derive(Deserialize)]
struct BbUser {
    uuid: String,
    nickname: Option<String>,
    username: Option<String>,
    display_name: Option<String>,
    #[serde(default)]
    links: BbLinks,
}

#[derive(Deserialize)]
struct BbMembership {
    user: BbUser,
}

#[derive(Deserialize)]
struct BbOwner {
    #[serde(rename = "type")]
    kind: Option<String>,
    uuid: Option<String>,
    username: Option<String>,
}

#[derive(Deserialize)]
struct BbRepo {
    uuid: String,
    slug: String,
    description: Option<String>,
    is_private: Option<bool>,
    mainbranch: Option<BbMainBranch>,
    owner: Option<BbOwner>,
    #[serde(default)]
    links: BbLinks,
}

#[derive(Deserialize)]
struct BbMainBranch {
    name: Option<String>,
}

#[derive(Deserialize)]
struct BbCommit {
    hash: String,
    message: Option<String>,
    author: Option<BbCommitAuthor>,
    date: Option<String>,
}

#[derive(Deserialize)]
struct BbCommitAuthor {
    raw: Option<String>,
}

#[derive(Deserialize)]
struct BbRef {
    name: String,
    target: BbRefTarget,
}

#[derive(Deserialize)]
struct BbRefTarget {
    hash: String,
}

#[derive(Serialize)]
struct CreateRepoRequest<'a> {
    scm: &'a str,
    is_private: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
}

impl BitbucketAdapter {
    pub fn new(base_url: impl Into<String>, credential: Option<Credential>) -> Result<Self> {
        if let Some(Credential::Aws { .. }) = credential {
            return Err(GitProviderError::Validation(
                "AWS credentials are not valid for Bitbucket".to_string(),
            ));
        }
        Ok(Self {
            client: build_http_client()?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credential,
        })
    }

    fn require_credential(&self) -> Result<&Credential> {
        self.credential.as_ref().ok_or_else(|| {
            GitProviderError::Authentication(
                "no credential supplied for authenticated Bitbucket operation".to_string(),
            )
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        // App passwords use Basic auth; bare workspace tokens use Bearer
        match &self.credential {
            Some(Credential::Pat {
                username: Some(user),
                token,
            }) => {
                builder = builder.basic_auth(user, Some(token));
            }
            Some(Credential::Pat {
                username: None,
                token,
            }) => {
                builder = builder.bearer_auth(token);
            }
            _ => {}
        }
        builder
    }

    async fn fetch<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        debug!(path, "Bitbucket API request");
        let response = self.request(reqwest::Method::GET, path).send().await?;
        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        Ok(response.json().await?)
    }

    async fn fetch_page<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        page: PageRequest,
    ) -> Result<Paginated<T>> {
        let sep = if path.contains('?') { '&' } else { '?' };
        self.fetch(&format!(
            "{}{}pagelen={}&page={}",
            path,
            sep,
            page.size,
            page.one_based()
        ))
        .await
    }

    fn page_of<T, U>(envelope: Paginated<T>, page: PageRequest, f: impl FnMut(T) -> U) -> Page<U> {
        let items: Vec<U> = envelope.values.into_iter().map(f).collect();
        match envelope.size {
            Some(total) => Page::with_total(items, page, total),
            None => Page::unknown_total(items, page),
        }
    }

    fn map_workspace(ws: BbWorkspace) -> Organization {
        Organization {
            id: ws.slug.clone(),
            name: ws.name.unwrap_or(ws.slug),
            url: ws.links.html.map(|l| l.href),
        }
    }

    fn map_user(user: BbUser) -> User {
        let username = user
            .nickname
            .or(user.username)
            .unwrap_or_else(|| user.uuid.clone());
        User {
            id: user.uuid,
            username,
            display_name: user.display_name,
            avatar_url: user.links.avatar.map(|l| l.href),
            url: user.links.html.map(|l| l.href),
        }
    }

    fn map_repository(repo: BbRepo) -> Repository {
        let (mut http_url, mut ssh_url) = (String::new(), String::new());
        if let Some(clone_links) = repo.links.clone {
            for link in clone_links {
                match link.name.as_str() {
                    "https" => http_url = link.href,
                    "ssh" => ssh_url = link.href,
                    _ => {}
                }
            }
        }
        let owner = repo.owner.as_ref();
        let owner_type = match owner.and_then(|o| o.kind.as_deref()) {
            Some("user") => OwnerType::Account,
            // workspaces/teams own everything else
            _ => OwnerType::Organization,
        };
        let owner_id = owner
            .and_then(|o| o.username.clone().or_else(|| o.uuid.clone()))
            .unwrap_or_default();
        Repository {
            id: repo.uuid,
            name: repo.slug,
            description: repo.description,
            clone_url_http: http_url,
            clone_url_ssh: ssh_url,
            default_branch: repo
                .mainbranch
                .and_then(|b| b.name)
                .unwrap_or_else(|| "main".to_string()),
            owner_type,
            owner_id,
            visibility: Visibility::from_private_flag(repo.is_private),
        }
    }

    fn map_commit(commit: BbCommit) -> Commit {
        let timestamp = commit
            .date
            .and_then(|d| chrono::DateTime::parse_from_rfc3339(&d).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);
        Commit {
            hash: commit.hash,
            message: commit.message.unwrap_or_default(),
            author: commit
                .author
                .and_then(|a| a.raw)
                .unwrap_or_else(|| "unknown".to_string()),
            timestamp,
        }
    }

    /// `workspace/slug` repository path.
    fn repo_path(repository: &str) -> Result<(&str, &str)> {
        repository.split_once('/').ok_or_else(|| {
            GitProviderError::Validation(format!(
                "Bitbucket repository id must be 'workspace/slug', got '{}'",
                repository
            ))
        })
    }
}

#[async_trait]
impl GitProvider for BitbucketAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Bitbucket
    }

    async fn check_connection(&self) -> Result<()> {
        self.require_credential()?;
        self.fetch::<serde_json::Value>("/user").await?;
        Ok(())
    }

    async fn get_current_user(&self) -> Result<User> {
        self.require_credential()?;
        let user: BbUser = self.fetch("/user").await?;
        Ok(Self::map_user(user))
    }

    async fn list_organizations(&self, page: PageRequest) -> Result<Page<Organization>> {
        self.require_credential()?;
        let page = page.normalize();
        let envelope: Paginated<BbWorkspace> = self.fetch_page("/workspaces", page).await?;
        Ok(Self::page_of(envelope, page, Self::map_workspace))
    }

    async fn get_organization(&self, id: &str) -> Result<Organization> {
        let ws: BbWorkspace = self.fetch(&format!("/workspaces/{}", id)).await?;
        Ok(Self::map_workspace(ws))
    }

    async fn list_members(&self, organization: &str, page: PageRequest) -> Result<Page<User>> {
        self.require_credential()?;
        let page = page.normalize();
        let envelope: Paginated<BbMembership> = self
            .fetch_page(&format!("/workspaces/{}/members", organization), page)
            .await?;
        Ok(Self::page_of(envelope, page, |m| Self::map_user(m.user)))
    }

    async fn list_repositories(
        &self,
        organization: Option<&str>,
        user: Option<&str>,
        page: PageRequest,
    ) -> Result<Page<Repository>> {
        let page = page.normalize();
        // Workspaces and user accounts share the /repositories/{owner} path
        let path = match (organization, user) {
            (Some(owner), _) | (None, Some(owner)) => format!("/repositories/{}", owner),
            (None, None) => {
                self.require_credential()?;
                "/repositories?role=member".to_string()
            }
        };
        let envelope: Paginated<BbRepo> = self.fetch_page(&path, page).await?;
        Ok(Self::page_of(envelope, page, Self::map_repository))
    }

    async fn get_repository(&self, id: &str) -> Result<Repository> {
        let (workspace, slug) = Self::repo_path(id)?;
        let repo: BbRepo = self
            .fetch(&format!("/repositories/{}/{}", workspace, slug))
            .await?;
        Ok(Self::map_repository(repo))
    }

    async fn create_repository(&self, spec: &RepositorySpec) -> Result<Repository> {
        self.require_credential()?;
        let workspace = spec.organization.as_deref().ok_or_else(|| {
            GitProviderError::Validation(
                "Bitbucket repository creation requires a workspace".to_string(),
            )
        })?;
        let request = CreateRepoRequest {
            scm: "git",
            is_private: spec.visibility == Visibility::Private,
            description: spec.description.as_deref(),
        };
        let response = self
            .request(
                reqwest::Method::POST,
                &format!("/repositories/{}/{}", workspace, spec.name),
            )
            .json(&request)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        let repo: BbRepo = response.json().await?;
        Ok(Self::map_repository(repo))
    }

    async fn list_commits(&self, repository: &str, page: PageRequest) -> Result<Page<Commit>> {
        let (workspace, slug) = Self::repo_path(repository)?;
        let page = page.normalize();
        let envelope: Paginated<BbCommit> = self
            .fetch_page(&format!("/repositories/{}/{}/commits", workspace, slug), page)
            .await?;
        Ok(Self::page_of(envelope, page, Self::map_commit))
    }

    async fn list_branches(&self, repository: &str, page: PageRequest) -> Result<Page<Branch>> {
        let (workspace, slug) = Self::repo_path(repository)?;
        let page = page.normalize();
        let envelope: Paginated<BbRef> = self
            .fetch_page(
                &format!("/repositories/{}/{}/refs/branches", workspace, slug),
                page,
            )
            .await?;
        Ok(Self::page_of(envelope, page, |r| Branch {
            name: r.name,
            commit_hash: r.target.hash,
        }))
    }

    async fn list_tags(&self, repository: &str, page: PageRequest) -> Result<Page<Tag>> {
        let (workspace, slug) = Self::repo_path(repository)?;
        let page = page.normalize();
        let envelope: Paginated<BbRef> = self
            .fetch_page(
                &format!("/repositories/{}/{}/refs/tags", workspace, slug),
                page,
            )
            .await?;
        Ok(Self::page_of(envelope, page, |r| Tag {
            name: r.name,
            commit_hash: r.target.hash,
        }))
    }

    fn build_auth_context(&self, protocol: TransportProtocol) -> Result<AuthContext> {
        match (&self.credential, protocol) {
            (Some(Credential::Pat { username, token }), TransportProtocol::Http) => {
                use base64::{engine::general_purpose::STANDARD, Engine};
                let user = username.as_deref().unwrap_or("x-token-auth");
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
                "Bitbucket transport auth requires an app password or token".to_string(),
            )),
            (None, _) => Err(GitProviderError::Authentication(
                "no credential to derive a transport auth context from".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn adapter(server: &MockServer) -> BitbucketAdapter {
        BitbucketAdapter::new(
            server.uri(),
            Some(Credential::Pat {
                username: Some("dev".into()),
                token: "app-password".into(),
            }),
        )
        .unwrap()
    }

    fn repo_json(slug: &str, is_private: Option<bool>) -> serde_json::Value {
        let mut repo = serde_json::json!({
            "uuid": "{repo-uuid}",
            "slug": slug,
            "description": null,
            "mainbranch": {"name": "main"},
            "owner": {"type": "team", "uuid": "{ws-uuid}", "username": "acme"},
            "links": {"clone": [
                {"name": "https", "href": format!("https://bitbucket.org/acme/{}.git", slug)},
                {"name": "ssh", "href": format!("git@bitbucket.org:acme/{}.git", slug)}
            ]}
        });
        if let Some(flag) = is_private {
            repo["is_private"] = serde_json::json!(flag);
        }
        repo
    }

    #[tokio::test]
    async fn test_exact_total_from_size_field() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repositories/acme"))
            .and(query_param("pagelen", "2"))
            .and(query_param("page", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "values": [repo_json("r1", Some(true)), repo_json("r2", Some(true))],
                "page": 1,
                "pagelen": 2,
                "size": 3
            })))
            .mount(&server)
            .await;

        let page = adapter(&server)
            .list_repositories(Some("acme"), None, PageRequest::new(0, 2))
            .await
            .unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.len(), 2);
        assert_eq!(page.items[0].name, "r1");
    }

    #[tokio::test]
    async fn test_missing_size_falls_back_to_unknown_total() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repositories/acme"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "values": [repo_json("r3", Some(false))],
                "page": 2,
                "pagelen": 2
            })))
            .mount(&server)
            .await;

        let page = adapter(&server)
            .list_repositories(Some("acme"), None, PageRequest::new(1, 2))
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].visibility, Visibility::Public);
    }

    #[tokio::test]
    async fn test_visibility_defaults_private_when_flag_missing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repositories/acme/r1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(repo_json("r1", None)))
            .mount(&server)
            .await;

        let repo = adapter(&server).get_repository("acme/r1").await.unwrap();
        assert_eq!(repo.visibility, Visibility::Private);
    }

    #[tokio::test]
    async fn test_clone_urls_selected_by_link_name() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repositories/acme/r1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(repo_json("r1", Some(true))),
            )
            .mount(&server)
            .await;

        let repo = adapter(&server).get_repository("acme/r1").await.unwrap();
        assert_eq!(repo.clone_url_http, "https://bitbucket.org/acme/r1.git");
        assert_eq!(repo.clone_url_ssh, "git@bitbucket.org:acme/r1.git");
        assert_eq!(repo.owner_type, OwnerType::Organization);
    }

    #[tokio::test]
    async fn test_workspaces_map_to_organizations() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/workspaces"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "values": [{
                    "uuid": "{ws-uuid}",
                    "slug": "acme",
                    "name": "Acme Inc",
                    "links": {"html": {"href": "https://bitbucket.org/acme"}}
                }],
                "size": 1
            })))
            .mount(&server)
            .await;

        let page = adapter(&server)
            .list_organizations(PageRequest::first(20))
            .await
            .unwrap();
        assert_eq!(page.items[0].id, "acme");
        assert_eq!(page.items[0].name, "Acme Inc");
    }

    #[test]
    fn test_auth_context_uses_basic_auth_for_http() {
        let adapter = BitbucketAdapter::new(
            BITBUCKET_API_BASE,
            Some(Credential::Pat {
                username: Some("dev".into()),
                token: "app-password".into(),
            }),
        )
        .unwrap();
        let ctx = adapter
            .build_auth_context(TransportProtocol::Http)
            .unwrap();
        assert_eq!(ctx.http_userpass(), Some(("dev", "app-password")));
        assert!(ctx.http_auth_headers()[0].1.starts_with("Basic "));
    }

    #[test]
    fn test_malformed_repository_id_is_a_validation_error() {
        let err = BitbucketAdapter::repo_path("not-a-path").unwrap_err();
        assert!(matches!(err, GitProviderError::Validation(_)));
    }
}
