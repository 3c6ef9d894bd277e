//! Data models for Chyrp entities.
//!
//! This module contains the data structures exchanged with the Chyrp API:
//!
//! - `User` and the auth payloads: `LoginCredentials`, `RegisterData`,
//!   `AuthResponse`, `TokenPair`
//! - Content types: `Post`, `Comment`, `Category`, `Tag`, `NewPost`

pub mod post;
pub mod user;

pub use post::{Category, Comment, CreatedPost, LikeResult, NewPost, Post, PostPage, PostQuery, PostStatus, Tag};
pub use user::{AuthResponse, LoginCredentials, RegisterData, TokenPair, User};
