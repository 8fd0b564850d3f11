//! CLI auth command handlers.

use std::path::Path;

use crate::api::FileUpload;
use crate::app::Quillpad;
use crate::auth::ProfileUpdate;
use crate::error::QuillError;
use crate::oauth::OAuthOutcome;

use super::{LoginArgs, ProfileArgs, RegisterArgs};

/// Handle `quillpad auth login`.
pub async fn handle_login(app: &Quillpad, args: &LoginArgs) -> Result<(), Box<dyn std::error::Error>> {
    if !app.auth().login(&args.email, &args.password).await {
        return Err(QuillError::Authentication("login failed".to_string()).into());
    }
    Ok(())
}

/// Handle `quillpad auth register`.
pub async fn handle_register(
    app: &Quillpad,
    args: &RegisterArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let registered = app
        .auth()
        .register(&args.email, &args.password, &args.password_confirm)
        .await;
    if !registered {
        return Err(QuillError::Authentication("registration failed".to_string()).into());
    }
    Ok(())
}

/// Handle `quillpad auth oauth <provider>`.
pub async fn handle_oauth(app: &Quillpad, provider: &str) -> Result<(), Box<dyn std::error::Error>> {
    println!("⏳ Waiting for {provider} sign-in...");
    match app.oauth().authenticate(provider).await {
        Ok(OAuthOutcome::Authenticated(user)) => {
            println!("   Signed in as {}", user.email);
            Ok(())
        }
        Ok(OAuthOutcome::Failed(message)) => Err(QuillError::Authentication(message).into()),
        Ok(outcome) => Err(QuillError::Cancelled(format!(
            "sign-in {}",
            outcome.label().replace('_', " ")
        ))
        .into()),
        Err(err) => Err(QuillError::from(err).into()),
    }
}

/// Handle `quillpad auth profile`.
pub async fn handle_profile(
    app: &Quillpad,
    args: &ProfileArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let avatar = match &args.avatar {
        Some(path) => Some(read_avatar(path).await?),
        None => None,
    };
    let update = ProfileUpdate {
        name: args.name.clone(),
        email: args.email.clone(),
        avatar,
    };
    if update.is_empty() {
        return Err(QuillError::Configuration(
            "nothing to update; pass --name, --email or --avatar".to_string(),
        )
        .into());
    }
    if !app.auth().update_profile(update).await {
        return Err(QuillError::Authentication("profile update failed".to_string()).into());
    }
    Ok(())
}

async fn read_avatar(path: &Path) -> Result<FileUpload, QuillError> {
    let bytes = tokio::fs::read(path).await?;
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "avatar".to_string());
    let upload = FileUpload::new("avatar", file_name, bytes);
    Ok(match image_type(path) {
        Some(content_type) => upload.with_content_type(content_type),
        None => upload,
    })
}

fn image_type(path: &Path) -> Option<&'static str> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    match extension.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        "svg" => Some("image/svg+xml"),
        _ => None,
    }
}

/// Handle `quillpad auth status`.
pub async fn handle_status(app: &Quillpad) -> Result<(), Box<dyn std::error::Error>> {
    let auth = app.auth();
    auth.revalidate();
    let snapshot = auth.snapshot();
    println!("Backend: {}", app.config().base_url());
    match snapshot.user {
        Some(user) if snapshot.is_authenticated => {
            println!("✅ Signed in as {} ({})", user.display_name(), user.email);
            if let Some(avatar) = app.avatar_url() {
                println!("   Avatar: {avatar}");
            }
        }
        _ => println!("❌ Not signed in"),
    }
    Ok(())
}

/// Handle `quillpad auth logout`.
pub async fn handle_logout(app: &Quillpad) -> Result<(), Box<dyn std::error::Error>> {
    app.auth().logout();
    Ok(())
}
