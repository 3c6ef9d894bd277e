use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::User;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub id: i64,
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    #[default]
    Draft,
    Published,
    Archived,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    pub author: User,
    pub content: String,
    #[serde(default)]
    pub parent: Option<i64>,
    #[serde(default)]
    pub replies: Vec<Comment>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Comment {
    /// Count this comment and every nested reply
    pub fn thread_len(&self) -> usize {
        1 + self.replies.iter().map(Comment::thread_len).sum::<usize>()
    }
}

/// A blog post. List endpoints omit `content` and `comments`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    pub title: String,
    pub slug: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub excerpt: Option<String>,
    pub author: User,
    #[serde(default)]
    pub category: Option<Category>,
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub status: PostStatus,
    #[serde(default)]
    pub featured_image: Option<String>,
    #[serde(default)]
    pub view_count: u64,
    #[serde(default)]
    pub like_count: u64,
    #[serde(default)]
    pub comment_count: u64,
    #[serde(default)]
    pub is_featured: bool,
    #[serde(default = "default_true")]
    pub allow_comments: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub comments: Option<Vec<Comment>>,
}

fn default_true() -> bool {
    true
}

impl Post {
    /// Apply the server's answer to a like toggle without refetching the post.
    pub fn apply_like(&mut self, liked: bool) {
        if liked {
            self.like_count += 1;
        } else {
            self.like_count = self.like_count.saturating_sub(1);
        }
    }
}

/// Response of the like toggle endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct LikeResult {
    pub liked: bool,
}

/// A page of posts. The API answers either with a paginated envelope or,
/// when pagination is disabled, with a bare array.
#[derive(Debug, Clone, Default)]
pub struct PostPage {
    pub count: u64,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<Post>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PostPageWire {
    Paged {
        count: u64,
        next: Option<String>,
        previous: Option<String>,
        results: Vec<Post>,
    },
    Bare(Vec<Post>),
}

impl<'de> Deserialize<'de> for PostPage {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        Ok(match PostPageWire::deserialize(deserializer)? {
            PostPageWire::Paged {
                count,
                next,
                previous,
                results,
            } => PostPage {
                count,
                next,
                previous,
                results,
            },
            PostPageWire::Bare(results) => PostPage {
                count: results.len() as u64,
                next: None,
                previous: None,
                results,
            },
        })
    }
}

/// Filters for the post listing endpoint
#[derive(Debug, Clone, Default)]
pub struct PostQuery {
    pub slug: Option<String>,
    pub author: Option<String>,
    pub category: Option<String>,
    pub tag: Option<String>,
    pub featured: bool,
    pub search: Option<String>,
    pub page: Option<u32>,
}

impl PostQuery {
    pub fn by_slug(slug: impl Into<String>) -> Self {
        Self {
            slug: Some(slug.into()),
            ..Self::default()
        }
    }

    pub fn by_author(username: impl Into<String>) -> Self {
        Self {
            author: Some(username.into()),
            ..Self::default()
        }
    }

    pub fn to_params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if let Some(ref slug) = self.slug {
            params.push(("slug", slug.clone()));
        }
        if let Some(ref author) = self.author {
            params.push(("author", author.clone()));
        }
        if let Some(ref category) = self.category {
            params.push(("category", category.clone()));
        }
        if let Some(ref tag) = self.tag {
            params.push(("tag", tag.clone()));
        }
        if self.featured {
            params.push(("featured", "true".to_string()));
        }
        if let Some(ref search) = self.search {
            params.push(("search", search.clone()));
        }
        if let Some(page) = self.page {
            params.push(("page", page.to_string()));
        }
        params
    }
}

/// What the server echoes back after creating a post
#[derive(Debug, Clone, Deserialize)]
pub struct CreatedPost {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub slug: Option<String>,
    pub title: String,
    #[serde(default)]
    pub status: PostStatus,
}

/// Payload for creating a post
#[derive(Debug, Clone, Default, Serialize)]
pub struct NewPost {
    pub title: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub excerpt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<i64>,
    #[serde(serialize_with = "serialize_tags")]
    pub tags: Vec<String>,
    pub status: PostStatus,
    pub allow_comments: bool,
}

impl NewPost {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            allow_comments: true,
            ..Self::default()
        }
    }

    /// Add a tag, ignoring blanks and duplicates
    pub fn add_tag(&mut self, tag: &str) {
        let tag = tag.trim();
        if !tag.is_empty() && !self.tags.iter().any(|t| t == tag) {
            self.tags.push(tag.to_string());
        }
    }
}

// The server takes tags as one comma separated string.
fn serialize_tags<S>(tags: &[String], serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(&tags.join(","))
}
