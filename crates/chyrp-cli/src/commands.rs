use std::io::{self, BufRead, Write};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::{debug, warn};

use chyrp_core::auth::{AuthError, SessionManager, SessionStatus};
use chyrp_core::models::{
    Comment, LoginCredentials, NewPost, Post, PostQuery, PostStatus, RegisterData, User,
};
use chyrp_core::{ApiClient, Config, ContentClient};

use crate::Command;

/// Width of the title column in post listings
const TITLE_WIDTH: usize = 48;

/// One CLI run: configuration plus the session and the clients sharing it
pub struct App {
    config: Config,
    session: Arc<SessionManager>,
    content: ContentClient,
}

impl App {
    pub fn new(config: Config) -> Result<Self> {
        let api = ApiClient::from_config(&config)?;
        let store = config.credential_store()?;
        let session = Arc::new(SessionManager::new(store, Arc::new(api.clone())));
        let content = ContentClient::new(api, session.clone());
        Ok(Self {
            config,
            session,
            content,
        })
    }

    pub async fn run(&mut self, command: Command) -> Result<()> {
        let status = self.session.restore().await;
        debug!(?status, "Session restored");

        match command {
            Command::Login { username, password } => self.login(username, password).await,
            Command::Register {
                username,
                email,
                first_name,
                last_name,
            } => {
                let data = RegisterData {
                    username,
                    email,
                    first_name,
                    last_name,
                    ..RegisterData::default()
                };
                self.register(data).await
            }
            Command::Logout => {
                self.session.logout();
                println!("Logged out");
                Ok(())
            }
            Command::Whoami { full } => self.whoami(full).await,
            Command::Posts {
                author,
                category,
                tag,
                search,
                featured,
                page,
            } => {
                let query = PostQuery {
                    author,
                    category,
                    tag,
                    search,
                    featured,
                    page,
                    ..PostQuery::default()
                };
                self.posts(&query).await
            }
            Command::Show { slug } => self.show(&slug).await,
            Command::Like { slug } => self.like(&slug).await,
            Command::Comment {
                slug,
                text,
                reply_to,
            } => self.comment(&slug, &text, reply_to).await,
            Command::NewPost {
                title,
                content,
                file,
                excerpt,
                category,
                tags,
                publish,
                no_comments,
            } => {
                let body = match (content, file) {
                    (Some(content), _) => content,
                    (None, Some(path)) => std::fs::read_to_string(&path)
                        .with_context(|| format!("Failed to read {}", path.display()))?,
                    (None, None) => bail!("Provide the post body with --content or --file"),
                };
                let mut post = NewPost::new(title, body);
                post.excerpt = excerpt;
                post.category = category;
                for tag in &tags {
                    post.add_tag(tag);
                }
                post.status = if publish {
                    PostStatus::Published
                } else {
                    PostStatus::Draft
                };
                post.allow_comments = !no_comments;
                self.new_post(&post).await
            }
        }
    }

    /// Drop the session so nothing in flight commits after exit
    pub fn shutdown(&self) {
        self.session.close();
    }

    // ===== Account =====

    async fn login(&mut self, username: Option<String>, password: Option<String>) -> Result<()> {
        let username = match username {
            Some(username) => username,
            None => prompt_line("Username", self.config.last_username.as_deref())?,
        };
        let password = match password {
            Some(password) => password,
            None => rpassword::prompt_password("Password: ")?,
        };

        let user = self
            .session
            .login(&LoginCredentials::new(username.clone(), password))
            .await
            .map_err(describe_auth_error)?;
        self.remember_username(username);
        println!("Logged in as {}", user.display_name());
        Ok(())
    }

    async fn register(&mut self, mut data: RegisterData) -> Result<()> {
        data.password = rpassword::prompt_password("Password: ")?;
        data.password_confirm = rpassword::prompt_password("Confirm password: ")?;
        let username = data.username.clone();

        let user = self
            .session
            .register(&data)
            .await
            .map_err(describe_auth_error)?;
        self.remember_username(username);
        println!("Welcome, {}! You are now logged in.", user.display_name());
        Ok(())
    }

    async fn whoami(&self, full: bool) -> Result<()> {
        let Some(user) = self.session.current_identity() else {
            println!("Not logged in");
            return Ok(());
        };
        let user = if full {
            self.content.profile().await?
        } else {
            user
        };
        print!("{}", format_user(&user, full));
        Ok(())
    }

    fn remember_username(&mut self, username: String) {
        if self.config.last_username.as_deref() == Some(username.as_str()) {
            return;
        }
        self.config.last_username = Some(username);
        if let Err(e) = self.config.save() {
            warn!(error = %e, "Failed to save config");
        }
    }

    // ===== Content =====

    async fn posts(&self, query: &PostQuery) -> Result<()> {
        let page = self.content.list_posts(query).await?;
        if page.results.is_empty() {
            println!("No posts found");
            return Ok(());
        }
        for post in &page.results {
            println!("{}", format_post_line(post));
        }
        if page.next.is_some() {
            let next = query.page.unwrap_or(1) + 1;
            println!("\n{} posts in total. More with --page {}", page.count, next);
        }
        Ok(())
    }

    async fn show(&self, slug: &str) -> Result<()> {
        let post = self.content.post_by_slug(slug).await?;
        println!("{}", post.title);
        println!(
            "by {} | {} likes | {} views\n",
            post.author.display_name(),
            post.like_count,
            post.view_count
        );
        if let Some(ref content) = post.content {
            println!("{}\n", content.trim());
        }

        let comments = match post.comments {
            Some(comments) => comments,
            None => self.content.comments(post.id).await?,
        };
        let total: usize = comments.iter().map(Comment::thread_len).sum();
        println!("{} comments", total);
        for comment in &comments {
            print_comment(comment, 1);
        }
        Ok(())
    }

    async fn like(&self, slug: &str) -> Result<()> {
        self.require_login()?;
        let mut post = self.content.post_by_slug(slug).await?;
        let liked = self.content.toggle_like(&mut post).await?;
        let verb = if liked { "Liked" } else { "Unliked" };
        println!("{} \"{}\" ({} likes)", verb, post.title, post.like_count);
        Ok(())
    }

    async fn comment(&self, slug: &str, text: &str, reply_to: Option<i64>) -> Result<()> {
        self.require_login()?;
        let post = self.content.post_by_slug(slug).await?;
        if !post.allow_comments {
            bail!("Comments are closed on \"{}\"", post.title);
        }
        self.content.add_comment(post.id, text, reply_to).await?;
        println!("Comment posted");
        Ok(())
    }

    async fn new_post(&self, post: &NewPost) -> Result<()> {
        self.require_login()?;
        let created = self.content.create_post(post).await?;
        match created.status {
            PostStatus::Published => println!("Published \"{}\"", created.title),
            _ => println!("Saved draft \"{}\"", created.title),
        }
        Ok(())
    }

    fn require_login(&self) -> Result<()> {
        if self.session.status() != SessionStatus::Authenticated {
            bail!("You need to log in first (chyrp login)");
        }
        Ok(())
    }
}

fn prompt_line(label: &str, default: Option<&str>) -> Result<String> {
    match default {
        Some(default) => print!("{} [{}]: ", label, default),
        None => print!("{}: ", label),
    }
    io::stdout().flush()?;

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    let line = line.trim();
    match (line.is_empty(), default) {
        (true, Some(default)) => Ok(default.to_string()),
        _ => Ok(line.to_string()),
    }
}

/// Spell out every rejected field, not just the summary
fn describe_auth_error(err: AuthError) -> anyhow::Error {
    match err {
        AuthError::ValidationFailed(fields) if !fields.is_general() => {
            let lines: Vec<String> = fields
                .fields()
                .map(|(field, messages)| format!("  {}: {}", field, messages.join(" ")))
                .collect();
            anyhow::anyhow!("{}\n{}", fields.message(), lines.join("\n"))
        }
        other => other.into(),
    }
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let cut: String = text.chars().take(width.saturating_sub(3)).collect();
    format!("{}...", cut)
}

fn format_post_line(post: &Post) -> String {
    let date = post
        .published_at
        .unwrap_or(post.created_at)
        .format("%Y-%m-%d");
    let star = if post.is_featured { "*" } else { " " };
    format!(
        "{}{} {:<width$}  {:<16} {:>4} likes  {}",
        star,
        date,
        truncate(&post.title, TITLE_WIDTH),
        truncate(&post.author.username, 16),
        post.like_count,
        post.slug,
        width = TITLE_WIDTH
    )
}

fn format_user(user: &User, full: bool) -> String {
    let mut out = format!("{} (@{})\n", user.display_name(), user.username);
    if !full {
        return out;
    }
    let fields = [
        ("Email", user.email.clone()),
        ("Bio", user.bio.clone()),
        ("Website", user.website.clone()),
        ("Location", user.location.clone()),
        ("Birth date", user.birth_date.map(|d| d.to_string())),
        ("Joined", user.date_joined.map(|d| d.format("%Y-%m-%d").to_string())),
    ];
    for (label, value) in fields {
        if let Some(value) = value.filter(|v| !v.is_empty()) {
            out.push_str(&format!("  {:<11} {}\n", format!("{}:", label), value));
        }
    }
    if user.is_verified {
        out.push_str("  Verified\n");
    }
    out
}

fn print_comment(comment: &Comment, depth: usize) {
    let indent = "  ".repeat(depth);
    println!(
        "{}#{} {} ({}): {}",
        indent,
        comment.id,
        comment.author.display_name(),
        comment.created_at.format("%Y-%m-%d"),
        comment.content.trim()
    );
    for reply in &comment.replies {
        print_comment(reply, depth + 1);
    }
}
