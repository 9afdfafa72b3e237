//! GitHub repositories attached to community posts.

use std::fmt;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::cache::{DynCache, QueryKey};
use crate::error::{Error, Result};

/// Repository summary as embedded in posts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GitHubRepo {
  pub name: String,
  pub description: String,
  pub url: String,
  pub stars: u64,
  pub forks: u64,
  pub language: String,
  pub last_updated: String,
  #[serde(default)]
  pub topics: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ApiRepo {
  name: String,
  description: Option<String>,
  html_url: String,
  stargazers_count: u64,
  forks_count: u64,
  language: Option<String>,
  updated_at: String,
  #[serde(default)]
  topics: Vec<String>,
}

impl From<ApiRepo> for GitHubRepo {
  fn from(repo: ApiRepo) -> Self {
    Self {
      name: repo.name,
      description: repo
        .description
        .unwrap_or_else(|| "No description".to_string()),
      url: repo.html_url,
      stars: repo.stargazers_count,
      forks: repo.forks_count,
      language: repo.language.unwrap_or_else(|| "Unknown".to_string()),
      last_updated: repo.updated_at,
      topics: repo.topics,
    }
  }
}

struct UserRepos<'a>(&'a str);

impl QueryKey for UserRepos<'_> {
  fn scope(&self) -> &'static str {
    "github_repos"
  }

  fn identity(&self) -> String {
    self.0.to_lowercase()
  }
}

/// Recently updated public repositories of a user, cached per username.
#[derive(Clone)]
pub struct GithubClient {
  client: Client,
  api_url: Url,
  cache: DynCache<Vec<GitHubRepo>>,
}

impl fmt::Debug for GithubClient {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("GithubClient")
      .field("api_url", &self.api_url.as_str())
      .finish()
  }
}

impl GithubClient {
  pub fn new(client: Client, api_url: Url, cache: DynCache<Vec<GitHubRepo>>) -> Self {
    Self {
      client,
      api_url,
      cache,
    }
  }

  /// Ten most recently updated repositories of `username`.
  pub async fn user_repos(&self, username: &str) -> Result<Vec<GitHubRepo>> {
    self
      .cache
      .with_cache(&UserRepos(username), || self.fetch_repos(username))
      .await
  }

  async fn fetch_repos(&self, username: &str) -> Result<Vec<GitHubRepo>> {
    let mut url = self.api_url.clone();
    url
      .path_segments_mut()
      .map_err(|_| Error::remote(format!("invalid GitHub API url {}", self.api_url)))?
      .pop_if_empty()
      .extend(["users", username, "repos"]);

    let response = self
      .client
      .get(url)
      .query(&[("sort", "updated"), ("per_page", "10")])
      .header(reqwest::header::ACCEPT, "application/vnd.github+json")
      .send()
      .await?;

    if !response.status().is_success() {
      return Err(Error::remote(format!(
        "GitHub API error: {}",
        response.status()
      )));
    }

    let repos: Vec<ApiRepo> = response.json().await?;
    Ok(repos.into_iter().map(GitHubRepo::from).collect())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::CacheConfig;
  use serde_json::json;
  use std::time::Duration;
  use wiremock::matchers::{method, path, query_param};
  use wiremock::{Mock, MockServer, ResponseTemplate};

  fn client_for(server: &MockServer) -> GithubClient {
    GithubClient::new(
      Client::new(),
      Url::parse(&server.uri()).unwrap(),
      DynCache::from_config(&CacheConfig::default(), Duration::from_secs(600)),
    )
  }

  #[tokio::test]
  async fn test_repos_are_normalized_and_cached() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/users/octo/repos"))
      .and(query_param("sort", "updated"))
      .and(query_param("per_page", "10"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
        "name": "hello",
        "description": null,
        "html_url": "https://github.com/octo/hello",
        "stargazers_count": 7,
        "forks_count": 2,
        "language": null,
        "updated_at": "2024-01-01T00:00:00Z"
      }])))
      .expect(1)
      .mount(&server)
      .await;

    let github = client_for(&server);
    let repos = github.user_repos("octo").await.unwrap();
    let again = github.user_repos("octo").await.unwrap();

    assert_eq!(repos, again);
    assert_eq!(repos[0].description, "No description");
    assert_eq!(repos[0].language, "Unknown");
    assert_eq!(repos[0].url, "https://github.com/octo/hello");
    assert!(repos[0].topics.is_empty());
  }

  #[tokio::test]
  async fn test_error_status_is_not_cached() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .respond_with(ResponseTemplate::new(404))
      .expect(2)
      .mount(&server)
      .await;

    let github = client_for(&server);
    let err = github.user_repos("ghost").await.unwrap_err();
    assert_eq!(err, Error::remote("GitHub API error: 404 Not Found"));
    assert!(github.user_repos("ghost").await.is_err());
  }
}
