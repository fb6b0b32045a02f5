use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use feedsync::api::HttpFeedApi;
use feedsync::store::{CommentId, Post, PostId};
use feedsync::sync::{Dispatch, SyncError};
use feedsync::{Config, FeedSession, SessionOptions};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "feedsync", about = "Community feed client: browse, like, comment and report")]
struct Args {
    /// Config file (default: ~/.config/feedsync/config.toml)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Pages to search when looking up a post by id
    #[arg(long, default_value_t = 5, global = true)]
    search_pages: usize,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List posts from the feed
    Feed {
        /// Number of pages to fetch
        #[arg(long, default_value_t = 1)]
        pages: usize,
    },
    /// Show the comment thread of a post
    Comments { post: String },
    /// Toggle your like on a post
    Like { post: String },
    /// Comment on a post
    Comment {
        post: String,
        text: String,
        /// Reply to this comment instead of posting top-level
        #[arg(long, value_name = "COMMENT")]
        reply_to: Option<String>,
    },
    /// Delete one of your comments
    DeleteComment { post: String, comment: String },
    /// Report a post to moderators
    Report { post: String, reason: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let config = match args.config.clone().or_else(Config::default_path) {
        Some(path) => Config::load(&path)
            .with_context(|| format!("Failed to load config from '{}'", path.display()))?,
        None => Config::default(),
    };
    tracing::debug!(?config, "Configuration resolved");

    let api = HttpFeedApi::from_config(&config).context("Failed to create API client")?;
    let mut session = FeedSession::new(Arc::new(api), SessionOptions::from_config(&config));

    match args.command {
        Command::Feed { pages } => {
            load_pages(&mut session, pages.max(1)).await?;
            for post in session.store().iter() {
                print_post(post, session.owns_post(post));
            }
            if session.has_more() {
                println!("-- more available (use --pages)");
            }
        }
        Command::Comments { post } => {
            let post_id = PostId::from(post);
            find_post(&mut session, &post_id, args.search_pages).await?;
            expect_sent(session.load_comments(&post_id), "load comments")?;
            check(session.settle().await)?;

            let Some(thread) = session.thread(&post_id) else {
                anyhow::bail!("No comments loaded for post {post_id}");
            };
            if thread.is_empty() {
                println!("No comments yet");
            }
            for comment in thread.comments() {
                let indent = if comment.is_reply() { "    " } else { "" };
                let mine = if session.can_delete(comment) { " (you)" } else { "" };
                println!(
                    "{indent}[{}] {}{mine}: {}",
                    comment.id, comment.author_id, comment.text
                );
            }
        }
        Command::Like { post } => {
            let post_id = PostId::from(post);
            find_post(&mut session, &post_id, args.search_pages).await?;
            expect_sent(session.toggle_like(&post_id), "toggle like")?;
            check(session.settle().await)?;
            if let Some(post) = session.post(&post_id) {
                print_post(post, session.owns_post(post));
            }
        }
        Command::Comment {
            post,
            text,
            reply_to,
        } => {
            let post_id = PostId::from(post);
            find_post(&mut session, &post_id, args.search_pages).await?;
            let parent = reply_to.map(CommentId::from);
            expect_sent(
                session.add_comment(&post_id, &text, parent),
                "add comment",
            )?;
            check(session.settle().await)?;
            println!("Comment posted");
        }
        Command::DeleteComment { post, comment } => {
            let (post_id, comment_id) = (PostId::from(post), CommentId::from(comment));
            expect_sent(
                session.delete_comment(&post_id, &comment_id),
                "delete comment",
            )?;
            check(session.settle().await)?;
            println!("Comment deleted");
        }
        Command::Report { post, reason } => {
            expect_sent(session.report(&PostId::from(post), &reason), "report")?;
            check(session.settle().await)?;
            if let Some(notice) = session.notice() {
                println!("{}", notice.text);
            }
        }
    }

    Ok(())
}

/// Refresh, then page forward until `pages` pages are loaded or the feed ends.
async fn load_pages(session: &mut FeedSession, pages: usize) -> Result<()> {
    session.refresh();
    check(session.settle().await)?;
    for _ in 1..pages {
        if !session.load_more().is_sent() {
            break;
        }
        check(session.settle().await)?;
    }
    Ok(())
}

/// Page through the feed until the post is loaded.
async fn find_post(session: &mut FeedSession, post_id: &PostId, max_pages: usize) -> Result<()> {
    session.refresh();
    check(session.settle().await)?;
    let mut pages = 1;
    while !session.store().contains(post_id) && pages < max_pages {
        if !session.load_more().is_sent() {
            break;
        }
        check(session.settle().await)?;
        pages += 1;
    }
    if !session.store().contains(post_id) {
        anyhow::bail!("Post {post_id} not found in the first {pages} page(s) of the feed");
    }
    Ok(())
}

fn check(errors: Vec<SyncError>) -> Result<()> {
    match errors.into_iter().next() {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}

fn expect_sent(dispatch: Dispatch, what: &str) -> Result<()> {
    match dispatch {
        Dispatch::Sent => Ok(()),
        Dispatch::Ignored(reason) => anyhow::bail!("Could not {what}: {reason:?}"),
    }
}

fn print_post(post: &Post, mine: bool) {
    let liked = if post.user_has_liked { "*" } else { " " };
    let text = post
        .text
        .as_deref()
        .and_then(|t| t.lines().next())
        .unwrap_or("");
    let media = if post.has_video() { " [video]" } else { "" };
    let mine = if mine { " (yours)" } else { "" };
    println!(
        "{liked} {}  {} likes  {} comments  {}{mine}: {text}{media}",
        post.id,
        post.likes_count,
        post.comments_count,
        post.created_at.format("%Y-%m-%d %H:%M"),
    );
}
