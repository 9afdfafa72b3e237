use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::eyre;
use color_eyre::Result;
use serde::Serialize;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use url::Url;

use devhub::cache::DynCache;
use devhub::config::Config;
use devhub::globe::GlobeService;
use devhub::services::{
  ContentService, GithubClient, Outcome, PostQuery, PostType, PostsService, ProjectsService,
};
use devhub::store::{SqliteStore, Store};
use devhub::toggle::ActorId;

#[derive(Parser, Debug)]
#[command(name = "devhub")]
#[command(about = "Community feed, projects and globe layers for devhub")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/devhub/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Act as this user
  #[arg(long = "as", global = true)]
  actor: Option<String>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Collect every globe layer
  Globe,
  /// List community posts
  Posts {
    #[arg(long = "type", value_parser = parse_post_type)]
    post_type: Option<PostType>,
    /// Match posts carrying any of these tags
    #[arg(long = "tag")]
    tags: Vec<String>,
    #[arg(long)]
    user: Option<String>,
    #[arg(long)]
    limit: Option<usize>,
    #[arg(long)]
    offset: Option<usize>,
  },
  /// Toggle a like
  Like {
    #[command(subcommand)]
    target: LikeCommand,
  },
  /// List projects
  Projects {
    #[arg(long)]
    category: Option<String>,
    #[arg(long)]
    limit: Option<usize>,
    #[arg(long)]
    featured: bool,
    /// Search published projects instead of listing
    #[arg(long)]
    search: Option<String>,
    /// Show one project and count a view
    #[arg(long)]
    id: Option<String>,
  },
  /// Post statistics and trending projects
  Stats,
  /// Recent GitHub repositories of a user
  Repos { username: String },
  /// Site content
  Content {
    #[command(subcommand)]
    item: ContentCommand,
  },
}

#[derive(Subcommand, Debug)]
enum LikeCommand {
  Post { id: String },
  Project { id: String },
}

#[derive(Subcommand, Debug)]
enum ContentCommand {
  Section { page: String, key: String },
  Team,
  Faqs {
    #[arg(long)]
    category: Option<String>,
  },
  /// Read a setting, or set it when a value is given
  Setting { key: String, value: Option<String> },
}

fn parse_post_type(s: &str) -> Result<PostType, String> {
  serde_json::from_value(serde_json::Value::String(s.to_lowercase()))
    .map_err(|_| format!("unknown post type: {}", s))
}

/// Owns every cache and facade for one process.
struct Services {
  posts: PostsService,
  projects: ProjectsService,
  content: ContentService,
  github: GithubClient,
  globe: GlobeService,
}

impl Services {
  fn new(config: &Config, store: Arc<dyn Store>) -> Result<Self> {
    let cache = &config.cache;
    let http = reqwest::Client::builder()
      .user_agent(concat!("devhub/", env!("CARGO_PKG_VERSION")))
      .build()?;

    Ok(Self {
      posts: PostsService::new(
        Arc::clone(&store),
        DynCache::from_config(cache, cache.posts_ttl()),
      ),
      projects: ProjectsService::new(
        Arc::clone(&store),
        DynCache::from_config(cache, cache.projects_ttl()),
        DynCache::from_config(cache, cache.projects_ttl()),
      ),
      content: ContentService::new(
        store,
        DynCache::from_config(cache, cache.content_ttl()),
        DynCache::from_config(cache, cache.content_ttl()),
        DynCache::from_config(cache, cache.content_ttl()),
        DynCache::from_config(cache, cache.content_ttl()),
      ),
      github: GithubClient::new(
        http.clone(),
        Url::parse(&config.github.api_url)?,
        DynCache::from_config(cache, cache.github_ttl()),
      ),
      globe: GlobeService::from_config(
        &config.globe,
        http,
        Config::get_weather_api_key(),
      )?,
    })
  }
}

fn init_logging() -> Result<WorkerGuard> {
  let dir = dirs::data_dir()
    .ok_or_else(|| eyre!("Could not determine data directory"))?
    .join("devhub")
    .join("logs");
  std::fs::create_dir_all(&dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", dir.display(), e))?;

  let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, "devhub.log"));
  tracing_subscriber::registry()
    .with(
      tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "devhub=info".into()),
    )
    .with(tracing_subscriber::fmt::layer().with_writer(writer).with_ansi(false))
    .init();

  Ok(guard)
}

fn print<T: Serialize>(value: &T) -> Result<()> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;
  let _guard = init_logging()?;

  let args = Args::parse();
  let config = Config::load(args.config.as_deref())?;

  let store_path = match &config.store.path {
    Some(path) => path.clone(),
    None => SqliteStore::default_path()?,
  };
  let store: Arc<dyn Store> = Arc::new(SqliteStore::open(&store_path)?);
  let services = Services::new(&config, store)?;
  let actor = args.actor.map(ActorId::new);
  let actor = actor.as_ref();

  match args.command {
    Command::Globe => print(&services.globe.layers().await),
    Command::Posts {
      post_type,
      tags,
      user,
      limit,
      offset,
    } => {
      let query = PostQuery {
        post_type,
        tags,
        user_id: user,
        limit,
        offset,
      };
      print(&Outcome::logged("get_posts", services.posts.get_posts(&query, actor).await))
    }
    Command::Like { target } => match target {
      LikeCommand::Post { id } => print(&Outcome::logged(
        "like_post",
        services.posts.like_post(&id, actor).await,
      )),
      LikeCommand::Project { id } => print(&Outcome::logged(
        "like_project",
        services.projects.like_project(&id, actor).await,
      )),
    },
    Command::Projects {
      category,
      limit,
      featured,
      search,
      id,
    } => {
      let projects = &services.projects;
      if let Some(id) = id {
        let result = projects.get_project(&id).await;
        if result.is_ok() {
          projects.increment_views(&id).await;
        }
        print(&Outcome::logged("get_project", result))
      } else if let Some(term) = search {
        print(&Outcome::logged("search_projects", projects.search_projects(&term).await))
      } else if featured {
        print(&Outcome::logged("featured_projects", projects.featured_projects().await))
      } else {
        print(&Outcome::logged(
          "published_projects",
          projects.published_projects(category.as_deref(), limit).await,
        ))
      }
    }
    Command::Stats => {
      print(&Outcome::logged("post_stats", services.posts.post_stats().await))?;
      print(&Outcome::logged(
        "trending_projects",
        services.posts.trending_projects().await,
      ))
    }
    Command::Repos { username } => print(&Outcome::logged(
      "user_repos",
      services.github.user_repos(&username).await,
    )),
    Command::Content { item } => {
      let content = &services.content;
      match item {
        ContentCommand::Section { page, key } => {
          print(&Outcome::logged("section", content.section(&page, &key).await))
        }
        ContentCommand::Team => print(&content.team_members().await),
        ContentCommand::Faqs { category } => print(&content.faqs(category.as_deref()).await),
        ContentCommand::Setting { key, value: Some(value) } => print(&Outcome::logged(
          "update_site_setting",
          content.update_site_setting(&key, &value).await,
        )),
        ContentCommand::Setting { key, value: None } => {
          print(&Outcome::logged("site_setting", content.site_setting(&key).await))
        }
      }
    }
  }
}
