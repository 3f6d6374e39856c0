//! Provider adapters and the factory that selects them

pub mod azure;
pub mod bitbucket;
pub mod codecommit;
pub mod github;
pub mod gitlab;
pub mod traits;

pub use azure::AzureDevOpsAdapter;
pub use bitbucket::BitbucketAdapter;
pub use codecommit::CodeCommitAdapter;
pub use github::GitHubAdapter;
pub use gitlab::GitLabAdapter;
pub use traits::GitProvider;

use std::fmt;
use std::str::FromStr;

use crate::credentials::Credential;
use crate::error::{GitProviderError, Result};

/// Supported Git hosting providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    GitHub,
    GitLab,
    Bitbucket,
    AzureDevOps,
    AwsCodeCommit,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderKind::GitHub => write!(f, "github"),
            ProviderKind::GitLab => write!(f, "gitlab"),
            ProviderKind::Bitbucket => write!(f, "bitbucket"),
            ProviderKind::AzureDevOps => write!(f, "azure-devops"),
            ProviderKind::AwsCodeCommit => write!(f, "aws-codecommit"),
        }
    }
}

impl FromStr for ProviderKind {
    type Err = GitProviderError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "github" => Ok(ProviderKind::GitHub),
            "gitlab" => Ok(ProviderKind::GitLab),
            "bitbucket" => Ok(ProviderKind::Bitbucket),
            "azure-devops" | "azuredevops" | "azure_devops" => Ok(ProviderKind::AzureDevOps),
            "aws-codecommit" | "awscodecommit" | "aws_codecommit" | "codecommit" => {
                Ok(ProviderKind::AwsCodeCommit)
            }
            other => Err(GitProviderError::Validation(format!(
                "unsupported provider type: '{}'",
                other
            ))),
        }
    }
}

/// Build an authenticated adapter for a (provider type, base URL,
/// credential) triple.
///
/// Precondition failures (blank base URL, unsupported type) are raised
/// before any HTTP client is constructed or network call made.
pub fn build_provider(
    kind: &str,
    base_url: &str,
    credential: Credential,
) -> Result<Box<dyn GitProvider>> {
    build(kind, base_url, Some(credential))
}

/// Build an unauthenticated adapter for documented public read-only
/// operations. Authenticated operations on the result fail with
/// `Authentication`.
pub fn build_public_provider(kind: &str, base_url: &str) -> Result<Box<dyn GitProvider>> {
    build(kind, base_url, None)
}

fn build(kind: &str, base_url: &str, credential: Option<Credential>) -> Result<Box<dyn GitProvider>> {
    let kind = ProviderKind::from_str(kind)?;
    if base_url.trim().is_empty() {
        return Err(GitProviderError::Validation(format!(
            "base URL must not be blank for provider '{}'",
            kind
        )));
    }

    match kind {
        ProviderKind::GitHub => Ok(Box::new(GitHubAdapter::new(base_url, credential)?)),
        ProviderKind::GitLab => Ok(Box::new(GitLabAdapter::new(base_url, credential)?)),
        ProviderKind::Bitbucket => Ok(Box::new(BitbucketAdapter::new(base_url, credential)?)),
        ProviderKind::AzureDevOps => Ok(Box::new(AzureDevOpsAdapter::new(base_url, credential)?)),
        ProviderKind::AwsCodeCommit => Ok(Box::new(CodeCommitAdapter::new(base_url, credential)?)),
    }
}

/// Map a non-success provider response to the error taxonomy, preserving
/// status and raw body. 401/403 are authentication rejections.
pub(crate) async fn error_from_response(response: reqwest::Response) -> GitProviderError {
    let status = response.status().as_u16();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<unreadable body>".to_string());
    if status == 401 || status == 403 {
        GitProviderError::Authentication(format!("provider rejected credential (HTTP {}): {}", status, body))
    } else {
        GitProviderError::ProviderClient { status, body }
    }
}

/// Build the adapter-side HTTP client from shared settings.
pub(crate) fn build_http_client() -> Result<reqwest::Client> {
    forgeport_core::HttpSettings::default()
        .build_client()
        .map_err(|e| GitProviderError::Validation(format!("failed to build HTTP client: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::Credential;

    fn pat() -> Credential {
        Credential::Pat {
            username: None,
            token: "t".into(),
        }
    }

    #[test]
    fn test_kind_parsing_is_case_insensitive() {
        for (input, expected) in [
            ("github", ProviderKind::GitHub),
            ("GITHUB", ProviderKind::GitHub),
            ("GitLab", ProviderKind::GitLab),
            ("bitbucket", ProviderKind::Bitbucket),
            ("Azure-DevOps", ProviderKind::AzureDevOps),
            ("azuredevops", ProviderKind::AzureDevOps),
            ("AWS-CodeCommit", ProviderKind::AwsCodeCommit),
            ("codecommit", ProviderKind::AwsCodeCommit),
        ] {
            assert_eq!(input.parse::<ProviderKind>().unwrap(), expected, "{}", input);
        }
    }

    #[test]
    fn test_unknown_kind_is_a_validation_error() {
        let err = "sourcehut".parse::<ProviderKind>().unwrap_err();
        assert!(matches!(err, GitProviderError::Validation(_)));
    }

    #[test]
    fn test_factory_returns_matching_adapter_for_every_kind() {
        let cases = [
            ("GitHub", "https://api.github.com", ProviderKind::GitHub),
            ("gitlab", "https://gitlab.com", ProviderKind::GitLab),
            (
                "BITBUCKET",
                "https://api.bitbucket.org/2.0",
                ProviderKind::Bitbucket,
            ),
            (
                "azure-devops",
                "https://dev.azure.com/acme",
                ProviderKind::AzureDevOps,
            ),
        ];
        for (kind, base_url, expected) in cases {
            let adapter = build_provider(kind, base_url, pat()).unwrap();
            assert_eq!(adapter.kind(), expected);
        }

        let aws = Credential::Aws {
            access_key_id: "AKID".into(),
            secret_key: "secret".into(),
            session_token: None,
            region: "eu-west-1".into(),
        };
        let adapter = build_provider(
            "aws-codecommit",
            "https://codecommit.eu-west-1.amazonaws.com",
            aws,
        )
        .unwrap();
        assert_eq!(adapter.kind(), ProviderKind::AwsCodeCommit);
    }

    #[test]
    fn test_blank_base_url_fails_before_any_client_is_built() {
        for url in ["", "   "] {
            let err = build_provider("github", url, pat()).unwrap_err();
            assert!(matches!(err, GitProviderError::Validation(_)), "{:?}", err);
        }
    }

    #[test]
    fn test_unsupported_type_fails_before_any_client_is_built() {
        let err = build_provider("gitea", "https://gitea.example.com", pat()).unwrap_err();
        assert!(matches!(err, GitProviderError::Validation(_)));
    }

    #[test]
    fn test_public_factory_omits_credential() {
        let adapter = build_public_provider("github", "https://api.github.com").unwrap();
        assert_eq!(adapter.kind(), ProviderKind::GitHub);
    }

    #[test]
    fn test_codecommit_rejects_non_aws_credential() {
        let err = build_provider(
            "codecommit",
            "https://codecommit.eu-west-1.amazonaws.com",
            pat(),
        )
        .unwrap_err();
        assert!(matches!(err, GitProviderError::Validation(_)));
    }
}
