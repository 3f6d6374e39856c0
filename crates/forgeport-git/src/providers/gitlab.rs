//! GitLab REST v4 adapter
//!
//! GitLab reports exact listing totals through the `x-total` response
//! header; when the header is absent (very large listings) the adapter falls
//! back to the unknown-total convention.

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

pub const GITLAB_BASE: &str = "https://gitlab.com";

#[derive(Debug)]
pub struct GitLabAdapter {
    client: reqwest::Client,
    base_url: String,
    credential: Option<Credential>,
}

// Response structs for API calls

#[derive(Deserialize)]
struct GitLabGroup {
    id: i64,
    full_path: String,
    web_url: Option<String>,
}

#[derive(Deserialize)]
struct GitLabUser {
    id: i64,
    username: String,
    name: Option<String>,
    avatar_url: Option<String>,
    web_url: Option<String>,
}

#[derive(Deserialize)]
struct GitLabNamespace {
    kind: Option<String>,
}

#[derive(Deserialize)]
struct GitLabProject {
    id: i64,
    path: String,
    path_with_namespace: String,
    description: Option<String>,
    visibility: Option<String>,
    default_branch: Option<String>,
    http_url_to_repo: Option<String>,
    ssh_url_to_repo: Option<String>,
    namespace: Option<GitLabNamespace>,
}

#[derive(Deserialize)]
struct GitLabCommit {
    id: String,
    message: String,
    author_name: Option<String>,
    committed_date: Option<String>,
}

#[derive(Deserialize)]
struct GitLabRef {
    name: String,
    commit: GitLabRefCommit,
}

#[derive(Deserialize)]
struct GitLabRefCommit {
    id: String,
}

#[derive(Serialize)]
struct CreateProjectRequest<'a> {
    name: &'a str,
    path: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    visibility: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace_id: Option<i64>,
}

impl GitLabAdapter {
    pub fn new(base_url: impl Into<String>, credential: Option<Credential>) -> Result<Self> {
        if let Some(Credential::Aws { .. }) = credential {
            return Err(GitProviderError::Validation(
                "AWS credentials are not valid for GitLab".to_string(),
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
                "GitLab REST calls require a personal access token".to_string(),
            )),
            None => Err(GitProviderError::Authentication(
                "no credential supplied for authenticated GitLab operation".to_string(),
            )),
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .request(method, format!("{}/api/v4{}", self.base_url, path));
        // PAT uses the PRIVATE-TOKEN header
        if let Some(Credential::Pat { token, .. }) = &self.credential {
            builder = builder.header("PRIVATE-TOKEN", token.as_str());
        }
        builder
    }

    async fn fetch<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        debug!(path, "GitLab API request");
        let response = self.request(reqwest::Method::GET, path).send().await?;
        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        Ok(response.json().await?)
    }

    /// Fetch a listing page plus the exact total from `x-total` if GitLab
    /// reported one.
    async fn fetch_list<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        page: PageRequest,
    ) -> Result<(Vec<T>, Option<u64>)> {
        let sep = if path.contains('?') { '&' } else { '?' };
        let paged = format!("{}{}per_page={}&page={}", path, sep, page.size, page.one_based());
        debug!(path = %paged, "GitLab API request");
        let response = self.request(reqwest::Method::GET, &paged).send().await?;
        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        let total = response
            .headers()
            .get("x-total")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        let items = response.json().await?;
        Ok((items, total))
    }

    fn page_of<T>(items: Vec<T>, page: PageRequest, total: Option<u64>) -> Page<T> {
        match total {
            Some(total) => Page::with_total(items, page, total),
            None => Page::unknown_total(items, page),
        }
    }

    fn map_group(group: GitLabGroup) -> Organization {
        Organization {
            id: group.id.to_string(),
            name: group.full_path,
            url: group.web_url,
        }
    }

    fn map_user(user: GitLabUser) -> User {
        User {
            id: user.id.to_string(),
            username: user.username,
            display_name: user.name,
            avatar_url: user.avatar_url,
            url: user.web_url,
        }
    }

    fn map_project(project: GitLabProject) -> Repository {
        let owner_type = match project.namespace.as_ref().and_then(|n| n.kind.as_deref()) {
            Some("group") => OwnerType::Organization,
            _ => OwnerType::Account,
        };
        let owner_id = project
            .path_with_namespace
            .rsplit_once('/')
            .map(|(ns, _)| ns.to_string())
            .unwrap_or_default();
        Repository {
            id: project.id.to_string(),
            name: project.path,
            description: project.description,
            clone_url_http: project.http_url_to_repo.unwrap_or_default(),
            clone_url_ssh: project.ssh_url_to_repo.unwrap_or_default(),
            default_branch: project.default_branch.unwrap_or_else(|| "main".to_string()),
            owner_type,
            owner_id,
            visibility: Visibility::from_provider_str(project.visibility.as_deref()),
        }
    }

    fn map_commit(commit: GitLabCommit) -> Commit {
        let timestamp = commit
            .committed_date
            .and_then(|d| chrono::DateTime::parse_from_rfc3339(&d).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);
        Commit {
            hash: commit.id,
            message: commit.message,
            author: commit.author_name.unwrap_or_else(|| "unknown".to_string()),
            timestamp,
        }
    }

    /// Project listing path for `/projects/{id}` style endpoints; accepts a
    /// numeric project id or an `owner/name` path.
    fn project_segment(repository: &str) -> String {
        if repository.chars().all(|c| c.is_ascii_digit()) {
            repository.to_string()
        } else {
            urlencoding::encode(repository).into_owned()
        }
    }
}

#[async_trait]
impl GitProvider for GitLabAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::GitLab
    }

    async fn check_connection(&self) -> Result<()> {
        self.token()?;
        self.fetch::<serde_json::Value>("/user").await?;
        Ok(())
    }

    async fn get_current_user(&self) -> Result<User> {
        self.token()?;
        let user: GitLabUser = self.fetch("/user").await?;
        Ok(Self::map_user(user))
    }

    async fn list_organizations(&self, page: PageRequest) -> Result<Page<Organization>> {
        let page = page.normalize();
        let (groups, total): (Vec<GitLabGroup>, _) = self.fetch_list("/groups", page).await?;
        Ok(Self::page_of(
            groups.into_iter().map(Self::map_group).collect(),
            page,
            total,
        ))
    }

    async fn get_organization(&self, id: &str) -> Result<Organization> {
        let group: GitLabGroup = self
            .fetch(&format!("/groups/{}", Self::project_segment(id)))
            .await?;
        Ok(Self::map_group(group))
    }

    async fn list_members(&self, organization: &str, page: PageRequest) -> Result<Page<User>> {
        let page = page.normalize();
        let (members, total): (Vec<GitLabUser>, _) = self
            .fetch_list(
                &format!("/groups/{}/members", Self::project_segment(organization)),
                page,
            )
            .await?;
        Ok(Self::page_of(
            members.into_iter().map(Self::map_user).collect(),
            page,
            total,
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
            (Some(org), _) => format!("/groups/{}/projects", Self::project_segment(org)),
            (None, Some(user)) => format!("/users/{}/projects", user),
            (None, None) => {
                self.token()?;
                "/projects?membership=true".to_string()
            }
        };
        let (projects, total): (Vec<GitLabProject>, _) = self.fetch_list(&path, page).await?;
        Ok(Self::page_of(
            projects.into_iter().map(Self::map_project).collect(),
            page,
            total,
        ))
    }

    async fn get_repository(&self, id: &str) -> Result<Repository> {
        let project: GitLabProject = self
            .fetch(&format!("/projects/{}", Self::project_segment(id)))
            .await?;
        Ok(Self::map_project(project))
    }

    async fn create_repository(&self, spec: &RepositorySpec) -> Result<Repository> {
        self.token()?;
        // Resolve the namespace id when creating under a group
        let namespace_id = match &spec.organization {
            Some(namespace) => {
                #[derive(Deserialize)]
                struct Namespace {
                    id: i64,
                    path: String,
                    full_path: Option<String>,
                }
                let namespaces: Vec<Namespace> = self
                    .fetch(&format!("/namespaces?search={}", urlencoding::encode(namespace)))
                    .await?;
                let found = namespaces.into_iter().find(|n| {
                    n.path == *namespace || n.full_path.as_deref() == Some(namespace.as_str())
                });
                match found {
                    Some(n) => Some(n.id),
                    None => {
                        return Err(GitProviderError::Validation(format!(
                            "GitLab namespace '{}' not found",
                            namespace
                        )))
                    }
                }
            }
            None => None,
        };

        let visibility = match spec.visibility {
            Visibility::Public => "public",
            Visibility::Private => "private",
        };
        let request = CreateProjectRequest {
            name: &spec.name,
            path: &spec.name,
            description: spec.description.as_deref(),
            visibility,
            namespace_id,
        };
        let response = self
            .request(reqwest::Method::POST, "/projects")
            .json(&request)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        let project: GitLabProject = response.json().await?;
        Ok(Self::map_project(project))
    }

    async fn list_commits(&self, repository: &str, page: PageRequest) -> Result<Page<Commit>> {
        let page = page.normalize();
        let (commits, total): (Vec<GitLabCommit>, _) = self
            .fetch_list(
                &format!(
                    "/projects/{}/repository/commits",
                    Self::project_segment(repository)
                ),
                page,
            )
            .await?;
        Ok(Self::page_of(
            commits.into_iter().map(Self::map_commit).collect(),
            page,
            total,
        ))
    }

    async fn list_branches(&self, repository: &str, page: PageRequest) -> Result<Page<Branch>> {
        let page = page.normalize();
        let (branches, total): (Vec<GitLabRef>, _) = self
            .fetch_list(
                &format!(
                    "/projects/{}/repository/branches",
                    Self::project_segment(repository)
                ),
                page,
            )
            .await?;
        Ok(Self::page_of(
            branches
                .into_iter()
                .map(|b| Branch {
                    name: b.name,
                    commit_hash: b.commit.id,
                })
                .collect(),
            page,
            total,
        ))
    }

    async fn list_tags(&self, repository: &str, page: PageRequest) -> Result<Page<Tag>> {
        let page = page.normalize();
        let (tags, total): (Vec<GitLabRef>, _) = self
            .fetch_list(
                &format!(
                    "/projects/{}/repository/tags",
                    Self::project_segment(repository)
                ),
                page,
            )
            .await?;
        Ok(Self::page_of(
            tags.into_iter()
                .map(|t| Tag {
                    name: t.name,
                    commit_hash: t.commit.id,
                })
                .collect(),
            page,
            total,
        ))
    }

    fn build_auth_context(&self, protocol: TransportProtocol) -> Result<AuthContext> {
        match (&self.credential, protocol) {
            (Some(Credential::Pat { username, token }), TransportProtocol::Http) => {
                use base64::{engine::general_purpose::STANDARD, Engine};
                // GitLab smart-HTTP accepts any non-blank username with a PAT;
                // "oauth2" is the conventional one.
                let user = username.as_deref().unwrap_or("oauth2");
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
                "GitLab transport auth requires a personal access token".to_string(),
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
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn adapter(server: &MockServer) -> GitLabAdapter {
        GitLabAdapter::new(
            server.uri(),
            Some(Credential::Pat {
                username: None,
                token: "glpat-test".into(),
            }),
        )
        .unwrap()
    }

    fn project_json(name: &str, visibility: &str) -> serde_json::Value {
        serde_json::json!({
            "id": 7,
            "path": name,
            "path_with_namespace": format!("acme/{}", name),
            "description": "demo",
            "visibility": visibility,
            "default_branch": "main",
            "http_url_to_repo": format!("https://gitlab.com/acme/{}.git", name),
            "ssh_url_to_repo": format!("git@gitlab.com:acme/{}.git", name),
            "namespace": {"kind": "group"}
        })
    }

    #[tokio::test]
    async fn test_pat_uses_private_token_header() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v4/user"))
            .and(header("PRIVATE-TOKEN", "glpat-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": 5, "username": "dev", "name": "Dev", "avatar_url": null, "web_url": null
            })))
            .mount(&server)
            .await;

        let user = adapter(&server).get_current_user().await.unwrap();
        assert_eq!(user.id, "5");
        assert_eq!(user.username, "dev");
    }

    #[tokio::test]
    async fn test_exact_total_from_x_total_header() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v4/groups/acme/projects"))
            .and(query_param("page", "1"))
            .and(query_param("per_page", "2"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("x-total", "3")
                    .set_body_json(serde_json::json!([
                        project_json("r1", "private"),
                        project_json("r2", "private")
                    ])),
            )
            .mount(&server)
            .await;

        let page = adapter(&server)
            .list_repositories(Some("acme"), None, PageRequest::new(0, 2))
            .await
            .unwrap();
        // GitLab reports an exact total
        assert_eq!(page.total, 3);
        assert_eq!(page.len(), 2);
    }

    #[tokio::test]
    async fn test_visibility_string_enum_normalization() {
        let server = MockServer::start().await;
        for (value, expected) in [
            ("private", Visibility::Private),
            ("internal", Visibility::Private),
            ("public", Visibility::Public),
        ] {
            Mock::given(method("GET"))
                .and(path(format!("/api/v4/projects/{}", 7)))
                .respond_with(ResponseTemplate::new(200).set_body_json(project_json("r1", value)))
                .mount(&server)
                .await;

            let repo = adapter(&server).get_repository("7").await.unwrap();
            assert_eq!(repo.visibility, expected, "visibility={}", value);
            server.reset().await;
        }
    }

    #[tokio::test]
    async fn test_project_path_is_url_encoded() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v4/projects/acme%2Fr1/repository/branches"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"name": "main", "commit": {"id": "abc123"}}
            ])))
            .mount(&server)
            .await;

        let page = adapter(&server)
            .list_branches("acme/r1", PageRequest::first(20))
            .await
            .unwrap();
        assert_eq!(page.items[0].name, "main");
        assert_eq!(page.items[0].commit_hash, "abc123");
    }

    #[tokio::test]
    async fn test_group_owner_maps_to_organization() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v4/projects/7"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(project_json("r1", "private")),
            )
            .mount(&server)
            .await;

        let repo = adapter(&server).get_repository("7").await.unwrap();
        assert_eq!(repo.owner_type, OwnerType::Organization);
        assert_eq!(repo.owner_id, "acme");
    }

    #[test]
    fn test_auth_context_uses_oauth2_username_fallback() {
        let adapter = GitLabAdapter::new(
            GITLAB_BASE,
            Some(Credential::Pat {
                username: None,
                token: "glpat-test".into(),
            }),
        )
        .unwrap();
        let ctx = adapter.build_auth_context(TransportProtocol::Http).unwrap();
        let (user, pass) = ctx.http_userpass().unwrap();
        assert_eq!(user, "oauth2");
        assert_eq!(pass, "glpat-test");
    }
}
