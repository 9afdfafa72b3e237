//! Domain facades over the store, the caches and the like toggle.
//!
//! Each facade owns its cache instances; the composition root builds them from
//! [`CacheConfig`](crate::config::CacheConfig) and passes the store in. Reads go
//! through `with_cache`, writes go straight to the store and then evict the
//! scopes they could have made stale.

mod content;
mod github;
mod posts;
mod projects;

use serde::Serialize;
use tracing::warn;

use crate::error::{Error, Result};
use crate::toggle::ActorId;

pub use content::{ContentService, Faq, Section, SiteSetting, TeamMember};
pub use github::{GitHubRepo, GithubClient};
pub use posts::{NewPost, Post, PostQuery, PostStats, PostType, PostsService};
pub use projects::{NewProject, Project, ProjectPatch, ProjectStatus, ProjectsService};

/// Result shape handed to UI callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Outcome<T> {
  pub success: bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub data: Option<T>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
}

impl<T> Outcome<T> {
  /// Convert a facade result, logging the failure under `operation`.
  pub fn logged(operation: &str, result: Result<T>) -> Self {
    if let Err(e) = &result {
      warn!(operation, error = %e, "operation failed");
    }
    result.into()
  }
}

impl<T> From<Result<T>> for Outcome<T> {
  fn from(result: Result<T>) -> Self {
    match result {
      Ok(data) => Self {
        success: true,
        data: Some(data),
        error: None,
      },
      Err(e) => Self {
        success: false,
        data: None,
        error: Some(e.to_string()),
      },
    }
  }
}

/// The signed-in actor, or `Unauthenticated`.
pub(crate) fn require_actor(actor: Option<&ActorId>) -> Result<&ActorId> {
  actor.ok_or(Error::Unauthenticated)
}

/// Timestamp in the format the store rows carry.
pub(crate) fn timestamp() -> String {
  chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}


#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_outcome_from_result() {
    let ok: Outcome<u32> = Ok(3).into();
    assert_eq!(ok.data, Some(3));
    assert!(ok.success);

    let failed: Outcome<u32> = Outcome::logged("likes", Err(Error::Unauthenticated));
    assert!(!failed.success);
    assert_eq!(failed.error.as_deref(), Some("user not authenticated"));
  }

  #[test]
  fn test_outcome_serialization_skips_empty_fields() {
    let ok: Outcome<u32> = Ok(1).into();
    assert_eq!(
      serde_json::to_value(&ok).unwrap(),
      serde_json::json!({"success": true, "data": 1})
    );
  }
}
