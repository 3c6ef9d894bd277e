//! Content endpoints: posts, comments and likes.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use super::{ApiClient, ApiError};
use crate::auth::SessionManager;
use crate::models::{Comment, CreatedPost, LikeResult, NewPost, Post, PostPage, PostQuery, User};

const POSTS_PATH: &str = "/blog/posts/";
const PROFILE_PATH: &str = "/auth/profile/";

#[derive(Serialize)]
struct NewComment<'a> {
    content: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parent: Option<i64>,
}

/// Content API access on behalf of the current session.
///
/// Requests carry the session's bearer token when there is one. A 401 on
/// any request hands the token back to `SessionManager::invalidate`.
#[derive(Clone)]
pub struct ContentClient {
    api: ApiClient,
    session: Arc<SessionManager>,
}

impl ContentClient {
    pub fn new(api: ApiClient, session: Arc<SessionManager>) -> Self {
        Self { api, session }
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    fn require_token(&self) -> Result<String, ApiError> {
        self.session.access_token().ok_or(ApiError::NotAuthenticated)
    }

    /// Route token rejections into the session before reporting them
    fn check_rejection<T>(
        &self,
        token: Option<&str>,
        result: Result<T, ApiError>,
    ) -> Result<T, ApiError> {
        if let (Err(e), Some(token)) = (&result, token) {
            if e.is_unauthorized() && self.session.invalidate(token) {
                debug!("Session cleared after token rejection");
            }
        }
        result
    }

    // ===== Posts =====

    /// List published posts, newest first
    pub async fn list_posts(&self, query: &PostQuery) -> Result<PostPage, ApiError> {
        let token = self.session.access_token();
        let result = self
            .api
            .get(POSTS_PATH, token.as_deref(), &query.to_params())
            .await;
        self.check_rejection(token.as_deref(), result)
    }

    /// Full post, including its content and top-level comments
    pub async fn post(&self, post_id: i64) -> Result<Post, ApiError> {
        let token = self.session.access_token();
        let result = self
            .api
            .get(&format!("{}{}/", POSTS_PATH, post_id), token.as_deref(), &[])
            .await;
        self.check_rejection(token.as_deref(), result)
    }

    /// Find a post by slug among the listing, then fetch its detail
    pub async fn post_by_slug(&self, slug: &str) -> Result<Post, ApiError> {
        let page = self.list_posts(&PostQuery::by_slug(slug)).await?;
        let summary = page
            .results
            .into_iter()
            .find(|p| p.slug == slug)
            .ok_or_else(|| ApiError::NotFound(format!("post {}", slug)))?;
        self.post(summary.id).await
    }

    pub async fn create_post(&self, post: &NewPost) -> Result<CreatedPost, ApiError> {
        if post.title.trim().is_empty() || post.content.trim().is_empty() {
            return Err(ApiError::BadRequest(
                r#"{"non_field_errors": ["Title and content are required"]}"#.to_string(),
            ));
        }
        let token = self.require_token()?;
        let result = self.api.post(POSTS_PATH, Some(&token), post).await;
        let created: CreatedPost = self.check_rejection(Some(&token), result)?;
        info!(title = %created.title, "Post created");
        Ok(created)
    }

    // ===== Comments =====

    pub async fn comments(&self, post_id: i64) -> Result<Vec<Comment>, ApiError> {
        let token = self.session.access_token();
        let result = self
            .api
            .get(&format!("{}{}/comments/", POSTS_PATH, post_id), token.as_deref(), &[])
            .await;
        self.check_rejection(token.as_deref(), result)
    }

    /// Comment on a post, optionally as a reply
    pub async fn add_comment(
        &self,
        post_id: i64,
        content: &str,
        parent: Option<i64>,
    ) -> Result<(), ApiError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(ApiError::BadRequest(
                r#"{"content": ["Comment cannot be empty"]}"#.to_string(),
            ));
        }
        let token = self.require_token()?;
        let body = NewComment { content, parent };
        let result: Result<serde_json::Value, ApiError> = self
            .api
            .post(&format!("{}{}/comments/", POSTS_PATH, post_id), Some(&token), &body)
            .await;
        self.check_rejection(Some(&token), result)?;
        Ok(())
    }

    // ===== Likes =====

    /// Toggle the current user's like and update `post.like_count` in place
    pub async fn toggle_like(&self, post: &mut Post) -> Result<bool, ApiError> {
        let token = self.require_token()?;
        let result = self
            .api
            .post_empty(&format!("{}{}/like/", POSTS_PATH, post.id), Some(&token))
            .await;
        let LikeResult { liked } = self.check_rejection(Some(&token), result)?;
        post.apply_like(liked);
        debug!(post_id = post.id, liked, like_count = post.like_count, "Like toggled");
        Ok(liked)
    }

    // ===== Profile =====

    /// Full profile of the logged-in user
    pub async fn profile(&self) -> Result<User, ApiError> {
        let token = self.require_token()?;
        let result = self.api.get(PROFILE_PATH, Some(&token), &[]).await;
        self.check_rejection(Some(&token), result)
    }
}
