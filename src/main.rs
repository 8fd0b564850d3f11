//! Quillpad CLI binary entry point.

use std::sync::Arc;

use clap::Parser;
use quillpad::app::Quillpad;
use quillpad::cli::popup::TerminalPopupOpener;
use quillpad::cli::{AuthArgs, AuthCommands, Cli, Commands, ConsoleNotifier, PostsCommands};
use quillpad::config::{QuillConfig, OAUTH_TIMEOUT_ENV};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        if let Some(hint) = quillpad::cli::error_hint(e.as_ref()) {
            eprintln!("   {hint}");
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = QuillConfig::from_env()?;
    if let Some(url) = cli.base_url {
        config = config.with_base_url(url);
    }
    if let Commands::Auth(AuthArgs {
        command: AuthCommands::Oauth(args),
    }) = &cli.command
    {
        let env_timeout_set = std::env::var_os(OAUTH_TIMEOUT_ENV).is_some();
        let timings =
            quillpad::cli::oauth_timings(config.oauth_timings(), args.timeout_secs, env_timeout_set);
        config = config.with_oauth_timings(timings);
    }
    let app = Quillpad::open(
        config,
        Arc::new(TerminalPopupOpener),
        Arc::new(ConsoleNotifier),
    )?;

    match cli.command {
        Commands::Auth(auth_args) => match auth_args.command {
            AuthCommands::Login(args) => quillpad::cli::auth::handle_login(&app, &args).await,
            AuthCommands::Register(args) => {
                quillpad::cli::auth::handle_register(&app, &args).await
            }
            AuthCommands::Oauth(args) => {
                quillpad::cli::auth::handle_oauth(&app, &args.provider).await
            }
            AuthCommands::Profile(args) => quillpad::cli::auth::handle_profile(&app, &args).await,
            AuthCommands::Status => quillpad::cli::auth::handle_status(&app).await,
            AuthCommands::Logout => quillpad::cli::auth::handle_logout(&app).await,
        },
        Commands::Posts(posts_args) => match posts_args.command {
            PostsCommands::List(args) => quillpad::cli::posts::handle_list(&app, &args).await,
            PostsCommands::Show(args) => quillpad::cli::posts::handle_show(&app, &args.id).await,
            PostsCommands::Create(args) => {
                quillpad::cli::posts::handle_create(&app, &args).await
            }
        },
    }
}
