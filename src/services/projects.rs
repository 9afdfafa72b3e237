//! Showcase projects: owner-scoped CRUD, cached listings, likes and views.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::warn;

use super::{require_actor, timestamp};
use crate::cache::{DynCache, QueryKey};
use crate::error::{Error, Result};
use crate::store::{decode, encode, Direction, Filter, Query, Store};
use crate::toggle::{ActorId, InvalidationPolicy, LikeTarget, ToggleCoordinator, ToggleOutcome};

const PROJECTS_TABLE: &str = "projects";
const FEATURED_LIMIT: usize = 6;
const LISTING_SCOPES: [&str; 3] = ["user_projects", "published_projects", "featured_projects"];
const DETAIL_SCOPE: &str = "project";

const CATEGORIES: [&str; 9] = [
  "Web Development",
  "Mobile Development",
  "AI/ML",
  "Game Development",
  "DevOps",
  "Data Science",
  "Blockchain",
  "IoT",
  "Other",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectStatus {
  Draft,
  Published,
  Archived,
}

impl ProjectStatus {
  pub const ALL: [ProjectStatus; 3] = [Self::Draft, Self::Published, Self::Archived];

  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Draft => "draft",
      Self::Published => "published",
      Self::Archived => "archived",
    }
  }

  pub fn label(&self) -> &'static str {
    match self {
      Self::Draft => "Draft",
      Self::Published => "Published",
      Self::Archived => "Archived",
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
  pub id: String,
  pub title: String,
  #[serde(default)]
  pub description: String,
  #[serde(default)]
  pub image_url: String,
  #[serde(default)]
  pub github_url: Option<String>,
  #[serde(default)]
  pub live_url: Option<String>,
  #[serde(default)]
  pub technologies: Vec<String>,
  #[serde(default)]
  pub category: String,
  pub status: ProjectStatus,
  pub user_id: String,
  pub created_at: String,
  #[serde(default)]
  pub updated_at: String,
  #[serde(default)]
  pub likes: i64,
  #[serde(default)]
  pub views: i64,
  #[serde(default)]
  pub featured: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct NewProject {
  pub title: String,
  pub description: String,
  pub image_url: String,
  pub github_url: Option<String>,
  pub live_url: Option<String>,
  pub technologies: Vec<String>,
  pub category: String,
}

/// Fields to change on a project. Unset fields are left untouched.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProjectPatch {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub title: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub image_url: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub github_url: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub live_url: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub technologies: Option<Vec<String>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub category: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub status: Option<ProjectStatus>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub featured: Option<bool>,
}

enum ProjectKey<'a> {
  User(&'a str),
  Published {
    category: Option<&'a str>,
    limit: Option<usize>,
  },
  Featured,
  Detail(&'a str),
}

impl QueryKey for ProjectKey<'_> {
  fn scope(&self) -> &'static str {
    match self {
      Self::User(_) => LISTING_SCOPES[0],
      Self::Published { .. } => LISTING_SCOPES[1],
      Self::Featured => LISTING_SCOPES[2],
      Self::Detail(_) => DETAIL_SCOPE,
    }
  }

  fn identity(&self) -> String {
    match self {
      Self::User(user_id) => user_id.to_string(),
      Self::Published { category, limit } => format!(
        "{}:{}",
        category.unwrap_or("all"),
        limit.map_or_else(|| "all".to_string(), |l| l.to_string())
      ),
      Self::Featured => "featured".to_string(),
      Self::Detail(id) => id.to_string(),
    }
  }
}

pub struct ProjectsService {
  store: Arc<dyn Store>,
  listings: DynCache<Vec<Project>>,
  details: DynCache<Project>,
  likes: ToggleCoordinator<dyn Store>,
}

impl ProjectsService {
  pub fn new(
    store: Arc<dyn Store>,
    listings: DynCache<Vec<Project>>,
    details: DynCache<Project>,
  ) -> Self {
    let scopes = LISTING_SCOPES
      .iter()
      .chain([&DETAIL_SCOPE])
      .map(|s| s.to_string())
      .collect();
    let likes = ToggleCoordinator::new(
      Arc::clone(&store),
      LikeTarget::new("project_likes", "project_id", PROJECTS_TABLE, "likes"),
    )
    .with_policy(InvalidationPolicy::Scopes(scopes))
    .invalidates(Arc::new(listings.clone()))
    .invalidates(Arc::new(details.clone()));

    Self {
      store,
      listings,
      details,
      likes,
    }
  }

  /// Create a draft owned by `actor`.
  pub async fn create_project(&self, actor: Option<&ActorId>, project: NewProject) -> Result<Project> {
    let actor = require_actor(actor)?;
    let now = timestamp();

    let mut row = encode(&project)?;
    row.extend(encode(&json!({
      "user_id": actor.as_str(),
      "status": ProjectStatus::Draft,
      "likes": 0,
      "views": 0,
      "featured": false,
      "created_at": now,
      "updated_at": now,
    }))?);
    let created = decode(self.store.insert(PROJECTS_TABLE, row).await?)?;

    self.listings.invalidate_scope(LISTING_SCOPES[0]);
    Ok(created)
  }

  /// Apply `patch` to a project owned by `actor`.
  pub async fn update_project(
    &self,
    actor: Option<&ActorId>,
    project_id: &str,
    patch: ProjectPatch,
  ) -> Result<Project> {
    let actor = require_actor(actor)?;
    let mut row = encode(&patch)?;
    row.insert("updated_at".to_string(), Value::String(timestamp()));

    let updated = self
      .store
      .update(PROJECTS_TABLE, &owned_by(project_id, actor), row)
      .await?
      .into_iter()
      .next()
      .ok_or_else(|| not_owned(project_id))?;

    self.evict(project_id);
    decode(updated)
  }

  pub async fn delete_project(&self, actor: Option<&ActorId>, project_id: &str) -> Result<()> {
    let actor = require_actor(actor)?;
    let deleted = self
      .store
      .delete(PROJECTS_TABLE, &owned_by(project_id, actor))
      .await?;
    if deleted == 0 {
      return Err(not_owned(project_id));
    }

    self.evict(project_id);
    Ok(())
  }

  /// Projects of `user_id`, or of the actor when no user is given.
  pub async fn user_projects(
    &self,
    actor: Option<&ActorId>,
    user_id: Option<&str>,
  ) -> Result<Vec<Project>> {
    let actor = require_actor(actor)?;
    let user_id = user_id.unwrap_or(actor.as_str());

    self
      .listings
      .with_cache(&ProjectKey::User(user_id), || {
        self.load(Query::new().eq("user_id", user_id))
      })
      .await
  }

  pub async fn published_projects(
    &self,
    category: Option<&str>,
    limit: Option<usize>,
  ) -> Result<Vec<Project>> {
    let mut query = Query::new().eq("status", ProjectStatus::Published.as_str());
    if let Some(category) = category {
      query = query.eq("category", category);
    }
    if let Some(limit) = limit {
      query = query.limit(limit);
    }

    self
      .listings
      .with_cache(&ProjectKey::Published { category, limit }, || self.load(query))
      .await
  }

  pub async fn featured_projects(&self) -> Result<Vec<Project>> {
    let query = Query::new()
      .eq("status", ProjectStatus::Published.as_str())
      .eq("featured", true)
      .limit(FEATURED_LIMIT);

    self
      .listings
      .with_cache(&ProjectKey::Featured, || self.load(query))
      .await
  }

  pub async fn get_project(&self, project_id: &str) -> Result<Project> {
    self
      .details
      .with_cache(&ProjectKey::Detail(project_id), || self.load_one(project_id))
      .await
  }

  pub async fn like_project(
    &self,
    project_id: &str,
    actor: Option<&ActorId>,
  ) -> Result<ToggleOutcome> {
    self.likes.toggle(project_id, actor).await
  }

  /// Count a view. Failures are logged, never returned.
  pub async fn increment_views(&self, project_id: &str) {
    match self
      .store
      .adjust_counter(PROJECTS_TABLE, project_id, "views", 1)
      .await
    {
      Ok(_) => {
        self.details.invalidate(&ProjectKey::Detail(project_id));
      }
      Err(e) => warn!(project = project_id, error = %e, "failed to count project view"),
    }
  }

  /// Published projects whose title or description contains `term`, any case.
  pub async fn search_projects(&self, term: &str) -> Result<Vec<Project>> {
    let query = Query::new()
      .eq("status", ProjectStatus::Published.as_str())
      .filter(Filter::Any(vec![
        Filter::ILike("title".to_string(), term.to_string()),
        Filter::ILike("description".to_string(), term.to_string()),
      ]));
    self.load(query).await
  }

  pub fn categories() -> &'static [&'static str] {
    &CATEGORIES
  }

  pub fn statuses() -> Vec<(ProjectStatus, &'static str)> {
    ProjectStatus::ALL.iter().map(|s| (*s, s.label())).collect()
  }

  async fn load(&self, query: Query) -> Result<Vec<Project>> {
    let query = query.order("created_at", Direction::Desc);
    self
      .store
      .select(PROJECTS_TABLE, &query)
      .await?
      .into_iter()
      .map(decode)
      .collect()
  }

  async fn load_one(&self, project_id: &str) -> Result<Project> {
    let row = self
      .store
      .select_one(PROJECTS_TABLE, &Query::new().eq("id", project_id))
      .await
      .map_err(|e| match e {
        Error::NotFound(_) => Error::NotFound(format!("project {}", project_id)),
        other => other,
      })?;
    decode(row)
  }

  fn evict(&self, project_id: &str) {
    for scope in LISTING_SCOPES {
      self.listings.invalidate_scope(scope);
    }
    self.details.invalidate(&ProjectKey::Detail(project_id));
  }
}

fn owned_by(project_id: &str, actor: &ActorId) -> Vec<Filter> {
  vec![
    Filter::eq("id", project_id),
    Filter::eq("user_id", actor.as_str()),
  ]
}

fn not_owned(project_id: &str) -> Error {
  Error::NotFound(format!("project {} owned by the current user", project_id))
}
