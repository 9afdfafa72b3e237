//! Community posts: cached listings, likes and stats.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use super::github::GitHubRepo;
use super::{require_actor, timestamp};
use crate::cache::{DynCache, QueryKey};
use crate::error::Result;
use crate::store::{decode, encode, row_str, Direction, Query, Store};
use crate::toggle::{
  ActorId, CounterStrategy, InvalidationPolicy, LikeTarget, ToggleCoordinator, ToggleOutcome,
};

const POSTS_TABLE: &str = "community_posts";
const USERS_TABLE: &str = "users";
/// Page size when only an offset is given
const DEFAULT_PAGE: usize = 10;
const TRENDING_LIMIT: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostType {
  Project,
  Question,
  Showcase,
  Discussion,
}

impl PostType {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Project => "project",
      Self::Question => "question",
      Self::Showcase => "showcase",
      Self::Discussion => "discussion",
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
  pub id: String,
  pub user_id: String,
  pub user_name: String,
  pub user_avatar: String,
  pub content: String,
  pub post_type: PostType,
  #[serde(default)]
  pub tags: Vec<String>,
  #[serde(default)]
  pub likes_count: i64,
  #[serde(default)]
  pub comments_count: i64,
  #[serde(default)]
  pub github_repo: Option<GitHubRepo>,
  #[serde(default)]
  pub project_id: Option<String>,
  pub created_at: String,
  #[serde(default)]
  pub updated_at: String,
  /// Whether the requesting actor likes this post
  #[serde(default)]
  pub is_liked: bool,
}

#[derive(Debug, Clone)]
pub struct NewPost {
  pub content: String,
  pub post_type: PostType,
  pub tags: Vec<String>,
  pub github_repo: Option<GitHubRepo>,
  pub project_id: Option<String>,
}

/// Listing filters and pagination.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct PostQuery {
  pub post_type: Option<PostType>,
  /// Posts carrying any of these tags
  pub tags: Vec<String>,
  pub user_id: Option<String>,
  pub limit: Option<usize>,
  pub offset: Option<usize>,
}

impl PostQuery {
  fn to_query(&self) -> Query {
    let mut query = Query::new().order("created_at", Direction::Desc);
    if let Some(post_type) = self.post_type {
      query = query.eq("post_type", post_type.as_str());
    }
    if !self.tags.is_empty() {
      query = query.overlaps(
        "tags",
        self.tags.iter().cloned().map(Value::String).collect(),
      );
    }
    if let Some(user_id) = &self.user_id {
      query = query.eq("user_id", user_id.as_str());
    }
    match (self.limit, self.offset) {
      (limit, Some(offset)) => query
        .offset(offset)
        .limit(limit.unwrap_or(DEFAULT_PAGE)),
      (Some(limit), None) => query.limit(limit),
      (None, None) => query,
    }
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PostStats {
  pub total_posts: u64,
  pub total_likes: i64,
  pub total_comments: i64,
  pub by_type: BTreeMap<String, u64>,
}

enum PostKey<'a> {
  /// Listings carry the per-actor `is_liked` marks, so the actor is part of the key
  Listing {
    query: &'a PostQuery,
    actor: Option<&'a ActorId>,
  },
  Trending,
}

impl QueryKey for PostKey<'_> {
  fn scope(&self) -> &'static str {
    match self {
      Self::Listing { .. } => "posts",
      Self::Trending => "trending",
    }
  }

  fn identity(&self) -> String {
    match self {
      Self::Listing { query, actor } => format!("{:?}|{:?}", query, actor.map(ActorId::as_str)),
      Self::Trending => "trending".to_string(),
    }
  }
}

pub struct PostsService {
  store: Arc<dyn Store>,
  cache: DynCache<Vec<Post>>,
  likes: ToggleCoordinator<dyn Store>,
}

impl PostsService {
  pub fn new(store: Arc<dyn Store>, cache: DynCache<Vec<Post>>) -> Self {
    let likes = ToggleCoordinator::new(
      Arc::clone(&store),
      LikeTarget::new("post_likes", "post_id", POSTS_TABLE, "likes_count"),
    )
    .with_policy(InvalidationPolicy::Scopes(vec![
      "posts".to_string(),
      "trending".to_string(),
    ]))
    .invalidates(Arc::new(cache.clone()));

    Self {
      store,
      cache,
      likes,
    }
  }

  pub fn with_counter_strategy(mut self, strategy: CounterStrategy) -> Self {
    self.likes = self.likes.with_strategy(strategy);
    self
  }

  /// Publish a post as `actor`. The author's display name and avatar come from
  /// their profile, or are derived from their email.
  pub async fn create_post(&self, actor: Option<&ActorId>, post: NewPost) -> Result<Post> {
    let actor = require_actor(actor)?;
    let (user_name, user_avatar) = self.author_details(actor).await;
    let now = timestamp();

    let row = encode(&json!({
      "user_id": actor.as_str(),
      "user_name": user_name,
      "user_avatar": user_avatar,
      "content": post.content,
      "post_type": post.post_type,
      "tags": post.tags,
      "likes_count": 0,
      "comments_count": 0,
      "github_repo": post.github_repo,
      "project_id": post.project_id,
      "created_at": now,
      "updated_at": now,
    }))?;
    let created = decode(self.store.insert(POSTS_TABLE, row).await?)?;

    self.cache.invalidate_scope("posts");
    self.cache.invalidate_scope("trending");
    Ok(created)
  }

  /// Posts newest first, each marked with whether `actor` likes it.
  pub async fn get_posts(&self, query: &PostQuery, actor: Option<&ActorId>) -> Result<Vec<Post>> {
    let key = PostKey::Listing { query, actor };
    self
      .cache
      .with_cache(&key, || self.load_posts(query, actor))
      .await
  }

  pub async fn like_post(&self, post_id: &str, actor: Option<&ActorId>) -> Result<ToggleOutcome> {
    self.likes.toggle(post_id, actor).await
  }

  /// Most liked posts that link a GitHub repository.
  pub async fn trending_projects(&self) -> Result<Vec<Post>> {
    self
      .cache
      .with_cache(&PostKey::Trending, || self.load_trending())
      .await
  }

  pub async fn post_stats(&self) -> Result<PostStats> {
    let rows = self.store.select(POSTS_TABLE, &Query::new()).await?;

    let mut stats = PostStats::default();
    for row in &rows {
      stats.total_posts += 1;
      stats.total_likes += row.get("likes_count").and_then(Value::as_i64).unwrap_or(0);
      stats.total_comments += row
        .get("comments_count")
        .and_then(Value::as_i64)
        .unwrap_or(0);
      if let Some(post_type) = row_str(row, "post_type") {
        *stats.by_type.entry(post_type.to_string()).or_default() += 1;
      }
    }
    Ok(stats)
  }

  async fn load_posts(&self, query: &PostQuery, actor: Option<&ActorId>) -> Result<Vec<Post>> {
    let rows = self.store.select(POSTS_TABLE, &query.to_query()).await?;
    let mut posts = rows.into_iter().map(decode).collect::<Result<Vec<Post>>>()?;
    if let Some(actor) = actor {
      self.mark_liked(&mut posts, actor).await?;
    }
    Ok(posts)
  }

  async fn load_trending(&self) -> Result<Vec<Post>> {
    let query = Query::new()
      .not_null("github_repo")
      .order("likes_count", Direction::Desc)
      .limit(TRENDING_LIMIT);
    self
      .store
      .select(POSTS_TABLE, &query)
      .await?
      .into_iter()
      .map(decode)
      .collect()
  }

  async fn mark_liked(&self, posts: &mut [Post], actor: &ActorId) -> Result<()> {
    if posts.is_empty() {
      return Ok(());
    }
    let ids: Vec<String> = posts.iter().map(|p| p.id.clone()).collect();
    let liked: HashSet<String> = self.likes.liked_among(&ids, actor).await?.into_iter().collect();
    for post in posts.iter_mut() {
      post.is_liked = liked.contains(&post.id);
    }
    Ok(())
  }

  async fn author_details(&self, actor: &ActorId) -> (String, String) {
    let profile = match self
      .store
      .select_one(USERS_TABLE, &Query::new().eq("id", actor.as_str()))
      .await
    {
      Ok(profile) => Some(profile),
      Err(e) => {
        debug!(actor = %actor, error = %e, "no profile for post author");
        None
      }
    };

    let field = |column: &str| {
      profile
        .as_ref()
        .and_then(|p| row_str(p, column))
        .filter(|v| !v.is_empty())
        .map(String::from)
    };
    let handle = field("email").and_then(|email| email.split('@').next().map(String::from));

    let name = field("name")
      .or_else(|| handle.clone())
      .unwrap_or_else(|| "Anonymous".to_string());
    let avatar = field("avatar_url").unwrap_or_else(|| {
      let seed = handle.unwrap_or_else(|| name.clone());
      format!(
        "https://ui-avatars.com/api/?name={}&background=ff5500&color=fff",
        url::form_urlencoded::byte_serialize(seed.as_bytes()).collect::<String>()
      )
    });
    (name, avatar)
  }
}
