//! Blog post records.

use std::sync::Arc;

use bon::Builder;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::api::{filter_eq, ApiError, ListOptions, ListResult, RecordApi};
use crate::auth::error::ValidationError;
use crate::error::{QuillError, Result};

/// A stored blog post. `content` is HTML produced by the editor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlogPost {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub img: Option<String>,
    #[serde(default)]
    pub content: String,
    /// Id of the user who wrote the post.
    #[serde(default)]
    pub author: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<String>,
}

impl BlogPost {
    /// Cover image URL, if one was set.
    pub fn image_url(&self) -> Option<&str> {
        self.img.as_deref().filter(|url| !url.trim().is_empty())
    }
}

/// Post fields as entered in the editor.
///
/// # Example
/// ```
/// use quillpad::posts::PostDraft;
///
/// let draft = PostDraft::builder()
///     .title("Hello")
///     .description("First post")
///     .content("<p>Hi there</p>")
///     .build();
/// assert!(draft.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Builder)]
pub struct PostDraft {
    #[builder(into)]
    pub title: String,
    #[builder(into)]
    pub description: String,
    #[builder(into)]
    pub content: String,
    #[builder(into)]
    pub img: Option<String>,
}

impl PostDraft {
    /// Title, description and non-empty content are required.
    pub fn validate(&self) -> std::result::Result<(), ValidationError> {
        if self.title.trim().is_empty() {
            return Err(ValidationError::MissingField("title"));
        }
        if self.description.trim().is_empty() {
            return Err(ValidationError::MissingField("description"));
        }
        if is_blank_html(&self.content) {
            return Err(ValidationError::MissingField("content"));
        }
        Ok(())
    }

    fn to_record(&self) -> Value {
        json!({
            "title": self.title.trim(),
            "description": self.description.trim(),
            "img": self.img.as_deref().unwrap_or_default(),
            "content": self.content,
        })
    }
}

/// An editor with nothing typed still yields `<p></p>`.
fn is_blank_html(content: &str) -> bool {
    let trimmed = content.trim();
    trimmed.is_empty() || trimmed == "<p></p>" || trimmed == "<p><br></p>"
}

/// Typed access to the posts collection.
#[derive(Clone)]
pub struct PostService {
    api: Arc<dyn RecordApi>,
    collection: String,
}

impl PostService {
    pub fn new(api: Arc<dyn RecordApi>) -> Self {
        Self {
            api,
            collection: crate::config::DEFAULT_POSTS_COLLECTION.to_string(),
        }
    }

    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = collection.into();
        self
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub async fn create(&self, author_id: &str, draft: &PostDraft) -> Result<BlogPost> {
        draft.validate()?;
        let mut record = draft.to_record();
        record["author"] = json!(author_id);
        let created = self.api.create(&self.collection, record).await?;
        let post: BlogPost = serde_json::from_value(created)?;
        tracing::info!(post_id = %post.id, author = author_id, "post created");
        Ok(post)
    }

    /// Replace the editable fields of a post. The author is left as is.
    pub async fn update(&self, id: &str, draft: &PostDraft) -> Result<BlogPost> {
        draft.validate()?;
        let updated = self
            .api
            .update(&self.collection, id, draft.to_record())
            .await
            .map_err(|err| not_found(err, id))?;
        tracing::info!(post_id = id, "post updated");
        Ok(serde_json::from_value(updated)?)
    }

    pub async fn get(&self, id: &str) -> Result<BlogPost> {
        let record = self
            .api
            .get_one(&self.collection, id)
            .await
            .map_err(|err| not_found(err, id))?;
        Ok(serde_json::from_value(record)?)
    }

    /// One page of the posts written by `author_id`.
    pub async fn list_by_author(
        &self,
        author_id: &str,
        page: u32,
        per_page: u32,
    ) -> Result<ListResult<BlogPost>> {
        let options = ListOptions::builder()
            .filter(filter_eq("author", author_id))
            .build();
        let result = self
            .api
            .get_list(&self.collection, page.max(1), per_page.max(1), &options)
            .await?;
        Ok(result.decode()?)
    }

    /// Every post, newest first.
    pub async fn list_all(&self) -> Result<Vec<BlogPost>> {
        let options = ListOptions::builder().sort("-created").build();
        let records = self.api.get_full_list(&self.collection, &options).await?;
        let posts = records
            .into_iter()
            .map(serde_json::from_value)
            .collect::<std::result::Result<Vec<BlogPost>, _>>()?;
        tracing::debug!(count = posts.len(), "listed posts");
        Ok(posts)
    }
}

fn not_found(err: ApiError, id: &str) -> QuillError {
    match err.status() {
        Some(404) => QuillError::NotFound(format!("post {id}")),
        _ => err.into(),
    }
}
