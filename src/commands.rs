//! Command handlers for the `gator` binary.
//!
//! Each subcommand maps to one handler through the typed [`Command`] enum.
//! Handlers that need a logged-in user resolve it from the loaded
//! configuration up front and receive it as an argument.

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use url::Url;

use crate::aggregate::{run_scheduler, shutdown_channel, Pipeline, Shutdown, ShutdownTrigger};
use crate::config::{parse_interval, Config};
use crate::feed::FeedFetcher;
use crate::storage::{Database, User};
use crate::util::{normalize_feed_url, validate_feed_url};

const DEFAULT_BROWSE_LIMIT: u32 = 2;

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Create a user and log in as them
    Register { name: String },
    /// Log in as an existing user
    Login { name: String },
    /// List users, marking the current one
    Users,
    /// Delete every user, feed, follow and post
    Reset,
    /// Register a feed and follow it
    Addfeed { name: String, url: String },
    /// List registered feeds
    Feeds,
    /// Follow a registered feed
    Follow { url: String },
    /// List the feeds you follow
    Following,
    /// Stop following a feed
    Unfollow { url: String },
    /// Show the newest posts from followed feeds
    Browse { limit: Option<String> },
    /// Poll feeds every INTERVAL (e.g. 30s, 1m) until interrupted
    Agg { interval: String },
}

/// Everything a handler may touch
pub struct State {
    pub db: Database,
    pub config: Config,
    /// Where `config` is saved when the current user changes
    pub config_path: PathBuf,
}

impl State {
    fn fetcher(&self) -> Result<FeedFetcher> {
        FeedFetcher::new(&self.config.user_agent, self.config.request_timeout)
            .context("Failed to build HTTP client")
    }

    fn set_current_user(&mut self, name: &str) -> Result<()> {
        self.config.current_user_name = Some(name.to_string());
        self.config
            .save(&self.config_path)
            .with_context(|| format!("Failed to save config to {}", self.config_path.display()))
    }

    async fn current_user(&self) -> Result<User> {
        let Some(name) = self.config.current_user_name.as_deref() else {
            bail!("No user is logged in. Run `gator register <name>` or `gator login <name>`");
        };
        self.db
            .get_user_by_name(name)
            .await?
            .with_context(|| format!("Logged-in user {name} no longer exists"))
    }
}

/// Run one command, writing its output to `out`.
pub async fn run<W: Write>(state: &mut State, command: Command, out: &mut W) -> Result<()> {
    match command {
        Command::Register { name } => register(state, &name, out).await,
        Command::Login { name } => login(state, &name, out).await,
        Command::Users => users(state, out).await,
        Command::Reset => reset(state, out).await,
        Command::Addfeed { name, url } => {
            let user = state.current_user().await?;
            add_feed(state, &user, &name, &url, out).await
        }
        Command::Feeds => feeds(state, out).await,
        Command::Follow { url } => {
            let user = state.current_user().await?;
            follow(state, &user, &url, out).await
        }
        Command::Following => {
            let user = state.current_user().await?;
            following(state, &user, out).await
        }
        Command::Unfollow { url } => {
            let user = state.current_user().await?;
            unfollow(state, &user, &url, out).await
        }
        Command::Browse { limit } => {
            let user = state.current_user().await?;
            browse(state, &user, limit.as_deref(), out).await
        }
        Command::Agg { interval } => {
            let interval = parse_interval(&interval)?;
            let (trigger, shutdown) = shutdown_channel();
            tokio::spawn(forward_shutdown_signals(trigger));
            aggregate(state, interval, shutdown, out).await
        }
    }
}

async fn register<W: Write>(state: &mut State, name: &str, out: &mut W) -> Result<()> {
    let name = name.trim();
    if name.is_empty() {
        bail!("User name must not be empty");
    }
    let user = state.db.create_user(name).await?;
    state.set_current_user(&user.name)?;
    tracing::info!(user_id = user.id, name = %user.name, "Registered user");
    writeln!(out, "User {} created", user.name)?;
    Ok(())
}

async fn login<W: Write>(state: &mut State, name: &str, out: &mut W) -> Result<()> {
    let Some(user) = state.db.get_user_by_name(name).await? else {
        bail!("User {name} not found");
    };
    state.set_current_user(&user.name)?;
    writeln!(out, "{} logged in", user.name)?;
    Ok(())
}

async fn users<W: Write>(state: &State, out: &mut W) -> Result<()> {
    let current = state.config.current_user_name.as_deref();
    for user in state.db.list_users().await? {
        if Some(user.name.as_str()) == current {
            writeln!(out, "* {} (current)", user.name)?;
        } else {
            writeln!(out, "* {}", user.name)?;
        }
    }
    Ok(())
}

async fn reset<W: Write>(state: &State, out: &mut W) -> Result<()> {
    let posts = state.db.delete_all_posts().await?;
    let feeds = state.db.delete_all_feeds().await?;
    let users = state.db.delete_all_users().await?;
    tracing::info!(posts, feeds, users, "Reset database");
    writeln!(out, "All tables have been reset")?;
    Ok(())
}

async fn add_feed<W: Write>(
    state: &State,
    user: &User,
    name: &str,
    url: &str,
    out: &mut W,
) -> Result<()> {
    let url = validate_feed_url(url).with_context(|| format!("Refusing feed URL {url}"))?;
    register_feed(state, user, name, &url, out).await
}

/// Fetch `url` once, then store it as a feed owned and followed by `user`.
/// Only URLs that actually serve a feed get registered.
async fn register_feed<W: Write>(
    state: &State,
    user: &User,
    name: &str,
    url: &Url,
    out: &mut W,
) -> Result<()> {
    let document = state
        .fetcher()?
        .fetch(url.as_str())
        .await
        .with_context(|| format!("Failed to fetch {url}"))?;

    let feed = state.db.insert_feed(name, url.as_str(), user.id).await?;
    let follow = state.db.create_feed_follow(user.id, feed.id).await?;

    writeln!(out, "{} added by user {}", feed.name, user.name)?;
    if !document.title.is_empty() {
        writeln!(out, "Channel: {} ({} entries)", document.title, document.entries.len())?;
    }
    writeln!(out, "{} is now following: {}", user.name, follow.feed_name)?;
    Ok(())
}

async fn feeds<W: Write>(state: &State, out: &mut W) -> Result<()> {
    for entry in state.db.list_feeds().await? {
        writeln!(out, "{}\n{}\n{}", entry.feed.name, entry.feed.url, entry.owner_name)?;
    }
    Ok(())
}

async fn follow<W: Write>(state: &State, user: &User, url: &str, out: &mut W) -> Result<()> {
    let Some(feed) = state.db.get_feed_by_url(&normalize_feed_url(url)).await? else {
        bail!("No feed registered for {url}");
    };
    let follow = state.db.create_feed_follow(user.id, feed.id).await?;
    writeln!(out, "{} is now following: {}", user.name, follow.feed_name)?;
    Ok(())
}

async fn following<W: Write>(state: &State, user: &User, out: &mut W) -> Result<()> {
    for follow in state.db.get_feed_follows_for_user(user.id).await? {
        writeln!(out, "{}", follow.feed_name)?;
    }
    Ok(())
}

async fn unfollow<W: Write>(state: &State, user: &User, url: &str, out: &mut W) -> Result<()> {
    let Some(feed) = state.db.get_feed_by_url(&normalize_feed_url(url)).await? else {
        bail!("No feed registered for {url}");
    };
    if !state.db.delete_feed_follow(user.id, feed.id).await? {
        bail!("{} is not following {}", user.name, feed.name);
    }
    writeln!(out, "{} unfollowed {}", user.name, feed.name)?;
    Ok(())
}

/// Unparsable or non-positive limits fall back to the default
fn browse_limit(raw: Option<&str>) -> u32 {
    raw.and_then(|s| s.trim().parse::<u32>().ok())
        .filter(|&limit| limit > 0)
        .unwrap_or(DEFAULT_BROWSE_LIMIT)
}

async fn browse<W: Write>(
    state: &State,
    user: &User,
    limit: Option<&str>,
    out: &mut W,
) -> Result<()> {
    let posts = state.db.get_posts_for_user(user.id, browse_limit(limit)).await?;
    if posts.is_empty() {
        writeln!(out, "No posts yet - try addfeed & agg first.")?;
        return Ok(());
    }

    for post in posts {
        let published = post
            .published_at
            .map(|at| at.format("%Y-%m-%d %H:%M UTC").to_string())
            .unwrap_or_else(|| "unknown".to_string());
        writeln!(out, "\n{}\n{}\nPublished: {}", post.title, post.url, published)?;
        if let Some(description) = post.description {
            writeln!(out, "{description}")?;
        }
    }
    Ok(())
}

/// Run the aggregation scheduler until `shutdown` fires
pub async fn aggregate<W: Write>(
    state: &State,
    interval: Duration,
    shutdown: Shutdown,
    out: &mut W,
) -> Result<()> {
    let pipeline = Pipeline::new(state.db.clone(), state.fetcher()?);

    writeln!(out, "Collecting feeds every {}", humantime::format_duration(interval))?;
    out.flush()?;

    let summary = run_scheduler(&pipeline, interval, shutdown).await?;

    writeln!(
        out,
        "Stopped after {} cycles: {} new posts, {} already stored, {} failed",
        summary.cycles, summary.stored, summary.duplicates, summary.failed
    )?;
    Ok(())
}

/// Fire `trigger` on SIGINT or SIGTERM (Ctrl-C elsewhere).
async fn forward_shutdown_signals(trigger: ShutdownTrigger) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let (mut sigterm, mut sigint) =
            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(term), Ok(int)) => (term, int),
                (Err(e), _) | (_, Err(e)) => {
                    tracing::warn!(error = %e, "Failed to install signal handlers");
                    // Keep the trigger alive: dropping it would stop the scheduler
                    std::future::pending::<()>().await;
                    return;
                }
            };

        tokio::select! {
            _ = sigterm.recv() => tracing::info!("Received SIGTERM, shutting down gracefully"),
            _ = sigint.recv() => tracing::info!("Received SIGINT, shutting down gracefully"),
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
        tracing::info!("Received Ctrl-C, shutting down gracefully");
    }

    trigger.trigger();
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct Fixture {
        state: State,
        dir: PathBuf,
    }

    impl Drop for Fixture {
        fn drop(&mut self) {
            std::fs::remove_dir_all(&self.dir).ok();
        }
    }

    async fn fixture(name: &str) -> Fixture {
        let dir = std::env::temp_dir().join(format!("gator_commands_test_{name}"));
        let _ = std::fs::remove_dir_all(&dir);
        let state = State {
            db: Database::open(":memory:").await.unwrap(),
            config: Config::default(),
            config_path: dir.join("config.toml"),
        };
        Fixture { state, dir }
    }

    async fn run_to_string(state: &mut State, command: Command) -> Result<String> {
        let mut out = Vec::new();
        run(state, command, &mut out).await?;
        Ok(String::from_utf8(out).unwrap())
    }

    #[tokio::test]
    async fn test_register_logs_in_and_saves_config() {
        let mut fx = fixture("register").await;

        let output = run_to_string(
            &mut fx.state,
            Command::Register {
                name: "kahya".into(),
            },
        )
        .await
        .unwrap();
        assert_eq!(output, "User kahya created\n");
        assert_eq!(fx.state.config.current_user_name.as_deref(), Some("kahya"));

        let saved = Config::load(&fx.state.config_path).unwrap();
        assert_eq!(saved.current_user_name.as_deref(), Some("kahya"));

        let again = run_to_string(
            &mut fx.state,
            Command::Register {
                name: "kahya".into(),
            },
        )
        .await;
        assert!(again.is_err());
    }

    #[tokio::test]
    async fn test_login_and_users_listing() {
        let mut fx = fixture("login").await;
        fx.state.db.create_user("kahya").await.unwrap();
        fx.state.db.create_user("lane").await.unwrap();

        let output = run_to_string(&mut fx.state, Command::Login { name: "lane".into() })
            .await
            .unwrap();
        assert_eq!(output, "lane logged in\n");

        let listing = run_to_string(&mut fx.state, Command::Users).await.unwrap();
        assert_eq!(listing, "* kahya\n* lane (current)\n");

        assert!(run_to_string(&mut fx.state, Command::Login { name: "ghost".into() })
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_user_commands_require_login() {
        let mut fx = fixture("no_login").await;
        let err = run_to_string(&mut fx.state, Command::Following)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("No user is logged in"));
    }

    #[tokio::test]
    async fn test_follow_following_unfollow() {
        let mut fx = fixture("follow").await;
        let owner = fx.state.db.create_user("owner").await.unwrap();
        fx.state
            .db
            .insert_feed("Boot.dev", "https://blog.boot.dev/index.xml", owner.id)
            .await
            .unwrap();
        run_to_string(&mut fx.state, Command::Register { name: "reader".into() })
            .await
            .unwrap();

        let url = "https://blog.boot.dev/index.xml".to_string();
        let followed = run_to_string(&mut fx.state, Command::Follow { url: url.clone() })
            .await
            .unwrap();
        assert_eq!(followed, "reader is now following: Boot.dev\n");

        let list = run_to_string(&mut fx.state, Command::Following).await.unwrap();
        assert_eq!(list, "Boot.dev\n");

        let gone = run_to_string(&mut fx.state, Command::Unfollow { url: url.clone() })
            .await
            .unwrap();
        assert_eq!(gone, "reader unfollowed Boot.dev\n");
        assert!(run_to_string(&mut fx.state, Command::Unfollow { url }).await.is_err());
    }

    #[tokio::test]
    async fn test_addfeed_refuses_internal_url() {
        let mut fx = fixture("addfeed_internal").await;
        run_to_string(&mut fx.state, Command::Register { name: "kahya".into() })
            .await
            .unwrap();

        let result = run_to_string(
            &mut fx.state,
            Command::Addfeed {
                name: "local".into(),
                url: "http://127.0.0.1:8080/rss".into(),
            },
        )
        .await;
        assert!(result.is_err());
        assert!(fx.state.db.list_feeds().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reset_clears_everything() {
        let mut fx = fixture("reset").await;
        let user = fx.state.db.create_user("kahya").await.unwrap();
        fx.state
            .db
            .insert_feed("X", "https://x.example/rss", user.id)
            .await
            .unwrap();

        let output = run_to_string(&mut fx.state, Command::Reset).await.unwrap();
        assert_eq!(output, "All tables have been reset\n");
        assert!(fx.state.db.list_users().await.unwrap().is_empty());
        assert!(fx.state.db.list_feeds().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_browse_without_posts() {
        let mut fx = fixture("browse_empty").await;
        run_to_string(&mut fx.state, Command::Register { name: "kahya".into() })
            .await
            .unwrap();

        let output = run_to_string(&mut fx.state, Command::Browse { limit: None })
            .await
            .unwrap();
        assert_eq!(output, "No posts yet - try addfeed & agg first.\n");
    }

    #[test]
    fn test_browse_limit_fallback() {
        assert_eq!(browse_limit(None), 2);
        assert_eq!(browse_limit(Some("5")), 5);
        assert_eq!(browse_limit(Some("0")), 2);
        assert_eq!(browse_limit(Some("-3")), 2);
        assert_eq!(browse_limit(Some("lots")), 2);
    }

    #[tokio::test]
    async fn test_agg_rejects_bad_interval() {
        let mut fx = fixture("agg_bad").await;
        let err = run_to_string(
            &mut fx.state,
            Command::Agg {
                interval: "whenever".into(),
            },
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("Invalid interval"));
    }

    #[tokio::test]
    async fn test_agg_reports_interval_and_summary() {
        let fx = fixture("agg_summary").await;
        let (trigger, shutdown) = shutdown_channel();
        trigger.trigger();

        let mut out = Vec::new();
        aggregate(&fx.state, Duration::from_secs(90), shutdown, &mut out)
            .await
            .unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Collecting feeds every 1m 30s\n\
             Stopped after 0 cycles: 0 new posts, 0 already stored, 0 failed\n"
        );
    }

    const LOCAL_RSS: &str = r#"<rss version="2.0"><channel><title>Local Blog</title>
        <item><title>Hello</title><link>https://local.example/hello</link></item>
        </channel></rss>"#;

    #[tokio::test]
    async fn test_registered_feed_can_be_followed_as_typed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(LOCAL_RSS))
            .expect(1)
            .mount(&server)
            .await;
        let mut fx = fixture("register_feed").await;
        run_to_string(&mut fx.state, Command::Register { name: "owner".into() })
            .await
            .unwrap();
        let owner = fx.state.current_user().await.unwrap();

        // Stored with a trailing slash; users type it without one
        let url = Url::parse(&server.uri()).unwrap();
        let mut out = Vec::new();
        register_feed(&fx.state, &owner, "Local", &url, &mut out)
            .await
            .unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Local added by user owner\nChannel: Local Blog (1 entries)\nowner is now following: Local\n"
        );
        let feeds = fx.state.db.list_feeds().await.unwrap();
        assert_eq!(feeds.len(), 1);
        assert_eq!(feeds[0].feed.url, url.as_str());

        run_to_string(&mut fx.state, Command::Register { name: "reader".into() })
            .await
            .unwrap();
        let followed = run_to_string(&mut fx.state, Command::Follow { url: server.uri() })
            .await
            .unwrap();
        assert_eq!(followed, "reader is now following: Local\n");

        let gone = run_to_string(
            &mut fx.state,
            Command::Unfollow {
                url: format!("{}#latest", server.uri().to_uppercase()),
            },
        )
        .await
        .unwrap();
        assert_eq!(gone, "reader unfollowed Local\n");
    }

    #[tokio::test]
    async fn test_feed_that_does_not_serve_rss_is_not_registered() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        let mut fx = fixture("register_feed_404").await;
        run_to_string(&mut fx.state, Command::Register { name: "owner".into() })
            .await
            .unwrap();
        let owner = fx.state.current_user().await.unwrap();

        let url = Url::parse(&format!("{}/missing.xml", server.uri())).unwrap();
        let mut out: Vec<u8> = Vec::new();
        let result = register_feed(&fx.state, &owner, "Missing", &url, &mut out).await;
        assert!(result.is_err());
        assert!(fx.state.db.list_feeds().await.unwrap().is_empty());
    }
}
