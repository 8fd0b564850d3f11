//! CLI entry point for Quillpad.

pub mod auth;
pub mod popup;
pub mod posts;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};

use crate::error::QuillError;
use crate::notice::{Notice, NoticeLevel, Notifier};
use crate::oauth::OAuthTimings;

/// Default bound on `auth oauth`, which waits for a whole browser round trip.
pub const CLI_OAUTH_TIMEOUT: Duration = Duration::from_secs(180);

/// Quillpad blog CLI
#[derive(Parser, Debug)]
#[command(name = "quillpad", version, about = "Quillpad blog client CLI")]
pub struct Cli {
    /// Backend URL (overrides QUILLPAD_BASE_URL)
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Session management
    Auth(AuthArgs),
    /// Blog posts
    Posts(PostsArgs),
}

/// Arguments for the `auth` subcommand group.
#[derive(Parser, Debug)]
pub struct AuthArgs {
    #[command(subcommand)]
    pub command: AuthCommands,
}

#[derive(Subcommand, Debug)]
pub enum AuthCommands {
    /// Sign in with email and password
    Login(LoginArgs),
    /// Create an account and sign in
    Register(RegisterArgs),
    /// Sign in with an OAuth2 provider in the browser
    ///
    /// Waits up to 180 s unless --timeout-secs or QUILLPAD_OAUTH_TIMEOUT_MS is set.
    Oauth(OAuthArgs),
    /// Change your name, email or profile picture
    Profile(ProfileArgs),
    /// Show who is signed in
    Status,
    /// Sign out
    Logout,
}

#[derive(Parser, Debug)]
pub struct LoginArgs {
    #[arg(long)]
    pub email: String,
    #[arg(long)]
    pub password: String,
}

#[derive(Parser, Debug)]
pub struct RegisterArgs {
    #[arg(long)]
    pub email: String,
    #[arg(long)]
    pub password: String,
    /// Repeat of the password
    #[arg(long)]
    pub password_confirm: String,
}

#[derive(Parser, Debug)]
pub struct OAuthArgs {
    /// Provider name as configured on the backend (google, github, ...)
    pub provider: String,
    /// Seconds to wait for the sign-in (overrides QUILLPAD_OAUTH_TIMEOUT_MS)
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout_secs: Option<u64>,
}

#[derive(Parser, Debug)]
pub struct ProfileArgs {
    #[arg(long)]
    pub name: Option<String>,
    #[arg(long)]
    pub email: Option<String>,
    /// Image file to upload as the profile picture
    #[arg(long)]
    pub avatar: Option<PathBuf>,
}

/// Arguments for the `posts` subcommand group.
#[derive(Parser, Debug)]
pub struct PostsArgs {
    #[command(subcommand)]
    pub command: PostsCommands,
}

#[derive(Subcommand, Debug)]
pub enum PostsCommands {
    /// List posts, newest first
    List(ListArgs),
    /// Print one post
    Show(ShowArgs),
    /// Publish a post as the signed-in user
    Create(CreateArgs),
}

#[derive(Parser, Debug)]
pub struct ListArgs {
    /// Only posts written by the signed-in user
    #[arg(long)]
    pub mine: bool,
}

#[derive(Parser, Debug)]
pub struct ShowArgs {
    pub id: String,
}

#[derive(Parser, Debug)]
pub struct CreateArgs {
    #[arg(long)]
    pub title: String,
    #[arg(long)]
    pub description: String,
    /// HTML file with the post body
    #[arg(long)]
    pub content_file: PathBuf,
    /// Cover image URL
    #[arg(long)]
    pub img: Option<String>,
}

/// Prints notices to the terminal.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&self, notice: Notice) {
        match notice.level {
            NoticeLevel::Success => println!("✅ {}: {}", notice.title, notice.description),
            NoticeLevel::Info => println!("ℹ️  {}: {}", notice.title, notice.description),
            NoticeLevel::Destructive => eprintln!("❌ {}: {}", notice.title, notice.description),
        }
    }
}

/// Timings for `auth oauth`: the flag wins, then the environment, then
/// [`CLI_OAUTH_TIMEOUT`].
pub fn oauth_timings(
    configured: OAuthTimings,
    timeout_secs: Option<u64>,
    env_timeout_set: bool,
) -> OAuthTimings {
    let timeout = match timeout_secs {
        Some(secs) => Duration::from_secs(secs),
        None if env_timeout_set => configured.timeout,
        None => CLI_OAUTH_TIMEOUT,
    };
    OAuthTimings {
        timeout,
        ..configured
    }
}

/// Recovery hint for errors the crate raised itself.
pub fn error_hint(err: &(dyn std::error::Error + 'static)) -> Option<&'static str> {
    err.downcast_ref::<QuillError>()
        .map(|err| err.recovery_suggestion().hint())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_posts_create() {
        let cli = Cli::parse_from([
            "quillpad",
            "posts",
            "create",
            "--title",
            "Hello",
            "--description",
            "First",
            "--content-file",
            "post.html",
        ]);
        let Commands::Posts(PostsArgs {
            command: PostsCommands::Create(args),
        }) = cli.command
        else {
            panic!("expected posts create");
        };
        assert_eq!(args.title, "Hello");
        assert_eq!(args.content_file, PathBuf::from("post.html"));
        assert!(args.img.is_none());
    }

    #[test]
    fn oauth_timeout_prefers_flag_then_env() {
        let configured = OAuthTimings::default();
        assert_eq!(oauth_timings(configured, None, false).timeout, CLI_OAUTH_TIMEOUT);
        assert_eq!(oauth_timings(configured, None, true).timeout, configured.timeout);
        let timings = oauth_timings(configured, Some(30), true);
        assert_eq!(timings.timeout, Duration::from_secs(30));
        assert_eq!(timings.poll_interval, configured.poll_interval);
    }

    #[test]
    fn zero_timeout_flag_is_rejected() {
        let parsed = Cli::try_parse_from(["quillpad", "auth", "oauth", "github", "--timeout-secs", "0"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn hints_only_for_crate_errors() {
        let err: Box<dyn std::error::Error> = Box::new(QuillError::Authentication("x".to_string()));
        assert_eq!(
            error_hint(err.as_ref()),
            Some("Sign in again with `quillpad auth login`.")
        );
        let other: Box<dyn std::error::Error> = "plain".into();
        assert_eq!(error_hint(other.as_ref()), None);
    }

    #[test]
    fn base_url_is_global() {
        let cli = Cli::parse_from(["quillpad", "auth", "status", "--base-url", "http://pb"]);
        assert_eq!(cli.base_url.as_deref(), Some("http://pb"));
        assert!(matches!(
            cli.command,
            Commands::Auth(AuthArgs {
                command: AuthCommands::Status
            })
        ));
    }
}
