//! Azure DevOps Git adapter
//!
//! The base URL carries the Azure DevOps organization
//! (`https://dev.azure.com/{organization}`), so "organizations" at the trait
//! level map to Azure DevOps *projects*. The REST `count` field is the item
//! count of the response, not a grand total, so every listing follows the
//! unknown-total convention except the unpaged repository listing, which is
//! cut to the requested window locally.

use async_trait::async_trait;
use chrono::Utc;
use forgeport_core::{page_window, Page, PageRequest};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::credentials::{AuthContext, Credential, TransportProtocol};
use crate::error::{GitProviderError, Result};
use crate::models::{
    Branch, Commit, Organization, OwnerType, Repository, RepositorySpec, Tag, User, Visibility,
};
use crate::providers::{build_http_client, error_from_response, GitProvider, ProviderKind};

const API_VERSION: &str = "7.1";

#[derive(Debug)]
pub struct AzureDevOpsAdapter {
    client: reqwest::Client,
    base_url: String,
    credential: Option<Credential>,
}

// Response structs for API calls

#[derive(Deserialize)]
struct ListEnvelope<T> {
    value: Vec<T>,
}

#[derive(Deserialize)]
struct AzProject {
    id: String,
    name: String,
    url: Option<String>,
    #[serde(rename = "defaultTeam")]
    default_team: Option<AzTeam>,
}

#[derive(Deserialize)]
struct AzTeam {
    id: String,
}

#[derive(Deserialize)]
struct AzTeamMember {
    identity: AzIdentity,
}

#[derive(Deserialize)]
struct AzIdentity {
    id: String,
    #[serde(rename = "displayName")]
    display_name: Option<String>,
    #[serde(rename = "uniqueName")]
    unique_name: Option<String>,
    #[serde(rename = "imageUrl")]
    image_url: Option<String>,
    url: Option<String>,
}

#[derive(Deserialize)]
struct AzConnectionData {
    #[serde(rename = "authenticatedUser")]
    authenticated_user: AzIdentity,
}

#[derive(Deserialize)]
struct AzRepo {
    id: String,
    name: String,
    #[serde(rename = "defaultBranch")]
    default_branch: Option<String>,
    #[serde(rename = "remoteUrl")]
    remote_url: Option<String>,
    #[serde(rename = "sshUrl")]
    ssh_url: Option<String>,
    project: Option<AzRepoProject>,
}

#[derive(Deserialize)]
struct AzRepoProject {
    id: String,
}

#[derive(Deserialize)]
struct AzCommit {
    #[serde(rename = "commitId")]
    commit_id: String,
    comment: Option<String>,
    author: Option<AzCommitAuthor>,
}

#[derive(Deserialize)]
struct AzCommitAuthor {
    name: Option<String>,
    date: Option<String>,
}

#[derive(Deserialize)]
struct AzRef {
    name: String,
    #[serde(rename = "objectId")]
    object_id: String,
}

#[derive(Serialize)]
struct CreateRepoRequest<'a> {
    name: &'a str,
    project: CreateRepoProject<'a>,
}

#[derive(Serialize)]
struct CreateRepoProject<'a> {
    id: &'a str,
}

impl AzureDevOpsAdapter {
    pub fn new(base_url: impl Into<String>, credential: Option<Credential>) -> Result<Self> {
        if let Some(Credential::Aws { .. }) = credential {
            return Err(GitProviderError::Validation(
                "AWS credentials are not valid for Azure DevOps".to_string(),
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
                "no credential supplied for authenticated Azure DevOps operation".to_string(),
            )
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let sep = if path.contains('?') { '&' } else { '?' };
        let url = format!("{}{}{}api-version={}", self.base_url, path, sep, API_VERSION);
        let mut builder = self.client.request(method, url);
        // Azure DevOps PATs ride Basic auth with a blank username
        if let Some(Credential::Pat { token, .. }) = &self.credential {
            builder = builder.basic_auth("", Some(token));
        }
        builder
    }

    async fn fetch<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        debug!(path, "Azure DevOps API request");
        let response = self.request(reqwest::Method::GET, path).send().await?;
        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        Ok(response.json().await?)
    }

    fn map_project(project: AzProject) -> Organization {
        Organization {
            id: project.id,
            name: project.name,
            url: project.url,
        }
    }

    fn map_identity(identity: AzIdentity) -> User {
        let username = identity
            .unique_name
            .or_else(|| identity.display_name.clone())
            .unwrap_or_else(|| identity.id.clone());
        User {
            id: identity.id,
            username,
            display_name: identity.display_name,
            avatar_url: identity.image_url,
            url: identity.url,
        }
    }

    fn map_repository(repo: AzRepo) -> Repository {
        Repository {
            id: repo.id,
            name: repo.name,
            description: None,
            clone_url_http: repo.remote_url.unwrap_or_default(),
            clone_url_ssh: repo.ssh_url.unwrap_or_default(),
            default_branch: repo
                .default_branch
                .as_deref()
                .map(strip_ref_prefix)
                .unwrap_or("main")
                .to_string(),
            owner_type: OwnerType::Organization,
            owner_id: repo.project.map(|p| p.id).unwrap_or_default(),
            // project-scoped, never exposed publicly
            visibility: Visibility::Private,
        }
    }

    fn map_commit(commit: AzCommit) -> Commit {
        let author = commit.author.unwrap_or(AzCommitAuthor {
            name: None,
            date: None,
        });
        let timestamp = author
            .date
            .as_deref()
            .and_then(|d| chrono::DateTime::parse_from_rfc3339(d).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);
        Commit {
            hash: commit.commit_id,
            message: commit.comment.unwrap_or_default(),
            author: author.name.unwrap_or_else(|| "unknown".to_string()),
            timestamp,
        }
    }

    async fn list_refs(
        &self,
        repository: &str,
        filter: &str,
        page: PageRequest,
    ) -> Result<Vec<AzRef>> {
        let envelope: ListEnvelope<AzRef> = self
            .fetch(&format!(
                "/_apis/git/repositories/{}/refs?filter={}&$top={}&$skip={}",
                repository,
                filter,
                page.size,
                page.offset()
            ))
            .await?;
        Ok(envelope.value)
    }
}

/// Azure reports refs fully qualified (`refs/heads/main`, `refs/tags/v1`).
fn strip_ref_prefix(name: &str) -> &str {
    name.strip_prefix("refs/heads/")
        .or_else(|| name.strip_prefix("refs/tags/"))
        .unwrap_or(name)
}

#[async_trait]
impl GitProvider for AzureDevOpsAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::AzureDevOps
    }

    async fn check_connection(&self) -> Result<()> {
        self.require_credential()?;
        self.fetch::<serde_json::Value>("/_apis/connectionData").await?;
        Ok(())
    }

    async fn get_current_user(&self) -> Result<User> {
        self.require_credential()?;
        let data: AzConnectionData = self.fetch("/_apis/connectionData").await?;
        Ok(Self::map_identity(data.authenticated_user))
    }

    async fn list_organizations(&self, page: PageRequest) -> Result<Page<Organization>> {
        self.require_credential()?;
        let page = page.normalize();
        let envelope: ListEnvelope<AzProject> = self
            .fetch(&format!(
                "/_apis/projects?$top={}&$skip={}",
                page.size,
                page.offset()
            ))
            .await?;
        Ok(Page::unknown_total(
            envelope.value.into_iter().map(Self::map_project).collect(),
            page,
        ))
    }

    async fn get_organization(&self, id: &str) -> Result<Organization> {
        let project: AzProject = self.fetch(&format!("/_apis/projects/{}", id)).await?;
        Ok(Self::map_project(project))
    }

    async fn list_members(&self, organization: &str, page: PageRequest) -> Result<Page<User>> {
        self.require_credential()?;
        let page = page.normalize();
        // Members come from the project's default team
        let project: AzProject = self
            .fetch(&format!("/_apis/projects/{}", organization))
            .await?;
        let team = project.default_team.ok_or_else(|| {
            GitProviderError::Validation(format!(
                "project '{}' reports no default team to list members from",
                organization
            ))
        })?;
        let envelope: ListEnvelope<AzTeamMember> = self
            .fetch(&format!(
                "/_apis/projects/{}/teams/{}/members?$top={}&$skip={}",
                project.id,
                team.id,
                page.size,
                page.offset()
            ))
            .await?;
        Ok(Page::unknown_total(
            envelope
                .value
                .into_iter()
                .map(|m| Self::map_identity(m.identity))
                .collect(),
            page,
        ))
    }

    async fn list_repositories(
        &self,
        organization: Option<&str>,
        user: Option<&str>,
        page: PageRequest,
    ) -> Result<Page<Repository>> {
        if user.is_some() {
            return Err(GitProviderError::Validation(
                "Azure DevOps repositories are project-scoped, not user-scoped".to_string(),
            ));
        }
        let page = page.normalize();
        let path = match organization {
            Some(project) => format!("/{}/_apis/git/repositories", project),
            None => "/_apis/git/repositories".to_string(),
        };
        // The repository listing is not paged server-side
        let envelope: ListEnvelope<AzRepo> = self.fetch(&path).await?;
        let total = envelope.value.len() as u64;
        let items = page_window(envelope.value, page)
            .into_iter()
            .map(Self::map_repository)
            .collect();
        Ok(Page::with_total(items, page, total))
    }

    async fn get_repository(&self, id: &str) -> Result<Repository> {
        let repo: AzRepo = self
            .fetch(&format!("/_apis/git/repositories/{}", id))
            .await?;
        Ok(Self::map_repository(repo))
    }

    async fn create_repository(&self, spec: &RepositorySpec) -> Result<Repository> {
        self.require_credential()?;
        let project = spec.organization.as_deref().ok_or_else(|| {
            GitProviderError::Validation(
                "Azure DevOps repository creation requires a project".to_string(),
            )
        })?;
        // The body wants the project id; resolve the name first
        let resolved: AzProject = self.fetch(&format!("/_apis/projects/{}", project)).await?;
        let request = CreateRepoRequest {
            name: &spec.name,
            project: CreateRepoProject { id: &resolved.id },
        };
        let response = self
            .request(
                reqwest::Method::POST,
                &format!("/{}/_apis/git/repositories", project),
            )
            .json(&request)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        let repo: AzRepo = response.json().await?;
        Ok(Self::map_repository(repo))
    }

    async fn list_commits(&self, repository: &str, page: PageRequest) -> Result<Page<Commit>> {
        let page = page.normalize();
        let envelope: ListEnvelope<AzCommit> = self
            .fetch(&format!(
                "/_apis/git/repositories/{}/commits?searchCriteria.$top={}&searchCriteria.$skip={}",
                repository,
                page.size,
                page.offset()
            ))
            .await?;
        Ok(Page::unknown_total(
            envelope.value.into_iter().map(Self::map_commit).collect(),
            page,
        ))
    }

    async fn list_branches(&self, repository: &str, page: PageRequest) -> Result<Page<Branch>> {
        let page = page.normalize();
        let refs = self.list_refs(repository, "heads/", page).await?;
        Ok(Page::unknown_total(
            refs.into_iter()
                .map(|r| Branch {
                    name: strip_ref_prefix(&r.name).to_string(),
                    commit_hash: r.object_id,
                })
                .collect(),
            page,
        ))
    }

    async fn list_tags(&self, repository: &str, page: PageRequest) -> Result<Page<Tag>> {
        let page = page.normalize();
        let refs = self.list_refs(repository, "tags/", page).await?;
        Ok(Page::unknown_total(
            refs.into_iter()
                .map(|r| Tag {
                    name: strip_ref_prefix(&r.name).to_string(),
                    commit_hash: r.object_id,
                })
                .collect(),
            page,
        ))
    }

    fn build_auth_context(&self, protocol: TransportProtocol) -> Result<AuthContext> {
        match (&self.credential, protocol) {
            (Some(Credential::Pat { username, token }), TransportProtocol::Http) => {
                use base64::{engine::general_purpose::STANDARD, Engine};
                // Blank username in the header; git credential callbacks
                // need a non-empty one
                let basic = STANDARD.encode(format!(":{}", token));
                Ok(AuthContext::builder(TransportProtocol::Http)
                    .http_auth_header("Authorization", format!("Basic {}", basic))
                    .http_userpass(username.as_deref().unwrap_or("pat"), token)
                    .build())
            }
            (Some(_), TransportProtocol::Ssh) => Err(GitProviderError::Validation(
                "SSH transport requires caller-supplied key material".to_string(),
            )),
            (Some(_), _) => Err(GitProviderError::Authentication(
                "Azure DevOps transport auth requires a personal access token".to_string(),
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

    fn adapter(server: &MockServer) -> AzureDevOpsAdapter {
        AzureDevOpsAdapter::new(
            server.uri(),
            Some(Credential::Pat {
                username: None,
                token: "azdo-pat".into(),
            }),
        )
        .unwrap()
    }

    fn repo_json(name: &str) -> serde_json::Value {
        serde_json::json!({
            "id": format!("{}-guid", name),
            "name": name,
            "defaultBranch": "refs/heads/develop",
            "remoteUrl": format!("https://dev.azure.com/acme/web/_git/{}", name),
            "sshUrl": format!("git@ssh.dev.azure.com:v3/acme/web/{}", name),
            "project": {"id": "proj-guid"}
        })
    }

    #[tokio::test]
    async fn test_projects_surface_as_organizations() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/_apis/projects"))
            .and(query_param("api-version", API_VERSION))
            .and(query_param("$top", "20"))
            .and(query_param("$skip", "0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "count": 1,
                "value": [{"id": "proj-guid", "name": "web", "url": "https://dev.azure.com/acme/_apis/projects/proj-guid"}]
            })))
            .mount(&server)
            .await;

        let page = adapter(&server)
            .list_organizations(PageRequest::first(20))
            .await
            .unwrap();
        assert_eq!(page.items[0].id, "proj-guid");
        assert_eq!(page.items[0].name, "web");
        assert_eq!(page.total, 1);
    }

    #[tokio::test]
    async fn test_repository_listing_is_windowed_locally() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/web/_apis/git/repositories"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "count": 3,
                "value": [repo_json("r1"), repo_json("r2"), repo_json("r3")]
            })))
            .mount(&server)
            .await;

        let page = adapter(&server)
            .list_repositories(Some("web"), None, PageRequest::new(1, 2))
            .await
            .unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.len(), 1);
        assert_eq!(page.items[0].name, "r3");
        assert_eq!(page.items[0].default_branch, "develop");
        assert_eq!(page.items[0].visibility, Visibility::Private);
    }

    #[tokio::test]
    async fn test_user_scoped_repositories_are_rejected() {
        let server = MockServer::start().await;
        let err = adapter(&server)
            .list_repositories(None, Some("dev"), PageRequest::first(20))
            .await
            .unwrap_err();
        assert!(matches!(err, GitProviderError::Validation(_)));
    }

    #[tokio::test]
    async fn test_members_resolve_through_default_team() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/_apis/projects/web"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "proj-guid",
                "name": "web",
                "defaultTeam": {"id": "team-guid"}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/_apis/projects/proj-guid/teams/team-guid/members"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "count": 1,
                "value": [{"identity": {
                    "id": "u1",
                    "displayName": "Dev One",
                    "uniqueName": "dev@example.com"
                }}]
            })))
            .mount(&server)
            .await;

        let page = adapter(&server)
            .list_members("web", PageRequest::first(20))
            .await
            .unwrap();
        assert_eq!(page.items[0].username, "dev@example.com");
        assert_eq!(page.items[0].display_name.as_deref(), Some("Dev One"));
    }

    #[tokio::test]
    async fn test_missing_default_team_is_a_validation_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/_apis/projects/web"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "proj-guid",
                "name": "web"
            })))
            .mount(&server)
            .await;

        let err = adapter(&server)
            .list_members("web", PageRequest::first(20))
            .await
            .unwrap_err();
        assert!(matches!(err, GitProviderError::Validation(_)));
    }

    #[tokio::test]
    async fn test_branch_names_lose_the_ref_prefix() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/_apis/git/repositories/r1-guid/refs"))
            .and(query_param("filter", "heads/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "count": 2,
                "value": [
                    {"name": "refs/heads/main", "objectId": "aaa"},
                    {"name": "refs/heads/develop", "objectId": "bbb"}
                ]
            })))
            .mount(&server)
            .await;

        let page = adapter(&server)
            .list_branches("r1-guid", PageRequest::first(20))
            .await
            .unwrap();
        assert_eq!(
            page.items,
            vec![
                Branch {
                    name: "main".into(),
                    commit_hash: "aaa".into()
                },
                Branch {
                    name: "develop".into(),
                    commit_hash: "bbb".into()
                },
            ]
        );
    }

    #[test]
    fn test_auth_context_encodes_blank_user_basic_header() {
        use base64::{engine::general_purpose::STANDARD, Engine};
        let adapter = AzureDevOpsAdapter::new(
            "https://dev.azure.com/acme",
            Some(Credential::Pat {
                username: None,
                token: "azdo-pat".into(),
            }),
        )
        .unwrap();
        let ctx = adapter
            .build_auth_context(TransportProtocol::Http)
            .unwrap();
        let expected = format!("Basic {}", STANDARD.encode(":azdo-pat"));
        assert_eq!(ctx.http_auth_headers()[0].1, expected);
        assert_eq!(ctx.http_userpass(), Some(("pat", "azdo-pat")));
    }
}
