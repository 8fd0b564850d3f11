//! CLI post command handlers.

use crate::app::Quillpad;
use crate::error::QuillError;
use crate::posts::{BlogPost, PostDraft};

use super::{CreateArgs, ListArgs};

/// Page size for `posts list --mine`.
const MINE_PAGE_SIZE: u32 = 50;

/// Handle `quillpad posts list`.
pub async fn handle_list(app: &Quillpad, args: &ListArgs) -> Result<(), Box<dyn std::error::Error>> {
    let posts = if args.mine {
        let user = signed_in_user(app)?;
        app.posts()
            .list_by_author(&user, 1, MINE_PAGE_SIZE)
            .await?
            .items
    } else {
        app.posts().list_all().await?
    };

    if posts.is_empty() {
        println!("No posts found.");
        return Ok(());
    }
    for post in &posts {
        print_summary(post);
    }
    Ok(())
}

/// Handle `quillpad posts show <id>`.
pub async fn handle_show(app: &Quillpad, id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let post = app.posts().get(id).await?;
    println!("# {}", post.title);
    println!("{}", post.description);
    if let Some(img) = post.image_url() {
        println!("Image: {img}");
    }
    println!();
    println!("{}", post.content);
    Ok(())
}

/// Handle `quillpad posts create`.
pub async fn handle_create(
    app: &Quillpad,
    args: &CreateArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let author = signed_in_user(app)?;
    let content = tokio::fs::read_to_string(&args.content_file).await?;
    let draft = PostDraft::builder()
        .title(args.title.clone())
        .description(args.description.clone())
        .content(content)
        .maybe_img(args.img.clone())
        .build();
    let post = app.posts().create(&author, &draft).await?;
    println!("✅ Blog post created: {}", post.id);
    Ok(())
}

fn signed_in_user(app: &Quillpad) -> Result<String, QuillError> {
    let not_signed_in = || QuillError::Authentication("not signed in".to_string());
    if !app.auth().revalidate() {
        return Err(not_signed_in());
    }
    app.store()
        .current_user()
        .map(|user| user.id)
        .ok_or_else(not_signed_in)
}

fn print_summary(post: &BlogPost) {
    let created = post.created.as_deref().unwrap_or("-");
    println!("{}  {}  {}", post.id, created, post.title);
    if !post.description.is_empty() {
        println!("    {}", post.description);
    }
}
