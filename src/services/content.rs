//! Site content: page sections, team roster, FAQs and settings.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::warn;

use crate::cache::{DynCache, QueryKey};
use crate::error::{Error, Result};
use crate::store::{decode, encode, Direction, Filter, Query, Row, Store};

const SECTIONS_TABLE: &str = "sections";
const TEAM_TABLE: &str = "team_members";
const FAQS_TABLE: &str = "faqs";
const SETTINGS_TABLE: &str = "site_settings";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
  pub id: String,
  pub page_slug: String,
  pub section_key: String,
  #[serde(default)]
  pub title: String,
  #[serde(default)]
  pub subtitle: String,
  #[serde(default)]
  pub content: String,
  #[serde(default)]
  pub image_url: String,
  #[serde(default)]
  pub order_index: i64,
  #[serde(default)]
  pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamMember {
  pub id: String,
  pub name: String,
  pub role: String,
  #[serde(default)]
  pub bio: String,
  #[serde(default)]
  pub avatar_url: String,
  #[serde(default)]
  pub github_url: String,
  #[serde(default)]
  pub linkedin_url: String,
  #[serde(default)]
  pub twitter_url: String,
  #[serde(default)]
  pub order_index: i64,
  #[serde(default)]
  pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Faq {
  pub id: String,
  pub question: String,
  pub answer: String,
  #[serde(default)]
  pub category: String,
  #[serde(default)]
  pub order_index: i64,
  #[serde(default)]
  pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteSetting {
  pub key: String,
  pub value: String,
  #[serde(default)]
  pub description: String,
}

enum ContentKey<'a> {
  Section { page: &'a str, key: &'a str },
  Team,
  Faqs(Option<&'a str>),
  Setting(&'a str),
}

impl QueryKey for ContentKey<'_> {
  fn scope(&self) -> &'static str {
    match self {
      Self::Section { .. } => "section",
      Self::Team => "team",
      Self::Faqs(_) => "faqs",
      Self::Setting(_) => "setting",
    }
  }

  fn identity(&self) -> String {
    match self {
      Self::Section { page, key } => format!("{}/{}", page, key),
      Self::Team => "team".to_string(),
      Self::Faqs(category) => category.unwrap_or("all").to_string(),
      Self::Setting(key) => key.to_string(),
    }
  }
}

/// Read-mostly site content, one cache per record shape.
pub struct ContentService {
  store: Arc<dyn Store>,
  sections: DynCache<Section>,
  team: DynCache<Vec<TeamMember>>,
  faqs: DynCache<Vec<Faq>>,
  settings: DynCache<Option<String>>,
}

impl ContentService {
  pub fn new(
    store: Arc<dyn Store>,
    sections: DynCache<Section>,
    team: DynCache<Vec<TeamMember>>,
    faqs: DynCache<Vec<Faq>>,
    settings: DynCache<Option<String>>,
  ) -> Self {
    Self {
      store,
      sections,
      team,
      faqs,
      settings,
    }
  }

  /// The active section `key` of `page`.
  pub async fn section(&self, page: &str, key: &str) -> Result<Section> {
    self
      .sections
      .with_cache(&ContentKey::Section { page, key }, || self.load_section(page, key))
      .await
  }

  /// Active team members in display order. The built-in roster is served
  /// (uncached) when the store is unavailable.
  pub async fn team_members(&self) -> Vec<TeamMember> {
    let loaded = self
      .team
      .with_cache(&ContentKey::Team, || {
        self.load_ordered(TEAM_TABLE, Query::new())
      })
      .await;

    loaded.unwrap_or_else(|e| {
      warn!(error = %e, "failed to load team members, serving defaults");
      default_team()
    })
  }

  /// Active FAQs in display order, optionally of one category. The built-in
  /// FAQs are served (uncached) when the store is unavailable.
  pub async fn faqs(&self, category: Option<&str>) -> Vec<Faq> {
    let mut query = Query::new();
    if let Some(category) = category {
      query = query.eq("category", category);
    }

    let loaded = self
      .faqs
      .with_cache(&ContentKey::Faqs(category), || {
        self.load_ordered(FAQS_TABLE, query)
      })
      .await;

    loaded.unwrap_or_else(|e| {
      warn!(error = %e, "failed to load FAQs, serving defaults");
      default_faqs()
        .into_iter()
        .filter(|faq| category.map_or(true, |c| faq.category == c))
        .collect()
    })
  }

  /// Value of a site setting, `None` when it is not set.
  pub async fn site_setting(&self, key: &str) -> Result<Option<String>> {
    self
      .settings
      .with_cache(&ContentKey::Setting(key), || self.load_setting(key))
      .await
  }

  /// Set a site setting, creating it when missing.
  pub async fn update_site_setting(&self, key: &str, value: &str) -> Result<()> {
    let filters = [Filter::eq("key", key)];
    let mut patch = Row::new();
    patch.insert("value".to_string(), Value::String(value.to_string()));

    let updated = self.store.update(SETTINGS_TABLE, &filters, patch).await?;
    if updated.is_empty() {
      let row = encode(&json!({ "key": key, "value": value, "description": "" }))?;
      self.store.insert(SETTINGS_TABLE, row).await?;
    }

    self.settings.invalidate_scope("setting");
    Ok(())
  }

  async fn load_section(&self, page: &str, key: &str) -> Result<Section> {
    let query = Query::new()
      .eq("page_slug", page)
      .eq("section_key", key)
      .eq("is_active", true);
    let row = self
      .store
      .select_one(SECTIONS_TABLE, &query)
      .await
      .map_err(|e| match e {
        Error::NotFound(_) => Error::NotFound(format!("section {}/{}", page, key)),
        other => other,
      })?;
    decode(row)
  }

  async fn load_ordered<T: serde::de::DeserializeOwned>(
    &self,
    table: &str,
    query: Query,
  ) -> Result<Vec<T>> {
    let query = query
      .eq("is_active", true)
      .order("order_index", Direction::Asc);
    self
      .store
      .select(table, &query)
      .await?
      .into_iter()
      .map(decode)
      .collect()
  }

  async fn load_setting(&self, key: &str) -> Result<Option<String>> {
    let rows = self
      .store
      .select(SETTINGS_TABLE, &Query::new().eq("key", key).limit(1))
      .await?;
    match rows.into_iter().next() {
      Some(row) => Ok(Some(decode::<SiteSetting>(row)?.value)),
      None => Ok(None),
    }
  }
}

fn member(id: &str, name: &str, role: &str, bio: &str, avatar: &str, handle: &str, order: i64) -> TeamMember {
  TeamMember {
    id: id.to_string(),
    name: name.to_string(),
    role: role.to_string(),
    bio: bio.to_string(),
    avatar_url: avatar.to_string(),
    github_url: format!("https://github.com/{}", handle),
    linkedin_url: format!("https://linkedin.com/in/{}", handle),
    twitter_url: format!("https://twitter.com/{}", handle),
    order_index: order,
    is_active: true,
  }
}

fn default_team() -> Vec<TeamMember> {
  vec![
    member(
      "1",
      "Ellie Chen",
      "Founder & CEO",
      "Passionate about democratizing development tools and making coding accessible to everyone. Former senior engineer at major tech companies.",
      "https://c.animaapp.com/bX3QfjDJ/img/logo-1.svg",
      "elliechen",
      1,
    ),
    member(
      "2",
      "Jordan Kim",
      "CTO & Lead Architect",
      "Expert in scalable systems and developer experience. Believes in the power of open source and community-driven development.",
      "https://c.animaapp.com/bX3QfjDJ/img/logo-2.svg",
      "jordankim",
      2,
    ),
    member(
      "3",
      "Rim Patel",
      "Head of Product",
      "Product strategist focused on user experience and developer workflows. Dedicated to building tools that developers actually want to use.",
      "https://c.animaapp.com/bX3QfjDJ/img/logo.svg",
      "rimpatel",
      3,
    ),
  ]
}

fn default_faqs() -> Vec<Faq> {
  [
    (
      "What is Orangopus?",
      "Orangopus is a platform that simplifies development by providing intuitive tools, resources, and a supportive community for developers of all skill levels.",
      "general",
    ),
    (
      "Is Orangopus free to use?",
      "Yes! Our core platform is completely free and open source. We believe in democratizing development tools for everyone.",
      "general",
    ),
    (
      "How can I contribute to Orangopus?",
      "You can contribute by joining our community, sharing projects, providing feedback, or contributing code to our open source repositories.",
      "community",
    ),
    (
      "What technologies does Orangopus support?",
      "We support a wide range of technologies including JavaScript, TypeScript, Python, React, Vue, Node.js, and many more.",
      "technical",
    ),
    (
      "How can I get help with my project?",
      "Join our community feed to ask questions, share your projects, and connect with other developers who can help you.",
      "community",
    ),
  ]
  .into_iter()
  .enumerate()
  .map(|(i, (question, answer, category))| Faq {
    id: (i + 1).to_string(),
    question: question.to_string(),
    answer: answer.to_string(),
    category: category.to_string(),
    order_index: i as i64 + 1,
    is_active: true,
  })
  .collect()
}
