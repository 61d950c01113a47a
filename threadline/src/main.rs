use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use uuid::Uuid;

use threadline::logging::{init_logging, LogConfig};
use threadline::{
    ApiClient, CommentView, CommentsBackend, LoadOutcome, MockBackend, MutationOutcome, Settings, Tagged,
};
use threadline_types::{AuthorRef, Comment};

/// Threadline - browse and act on the comment threads of a post
#[derive(Parser)]
#[command(name = "threadline")]
#[command(about = "Threaded comments for a post, with optimistic actions")]
#[command(version)]
struct Cli {
    /// Server URL to connect to
    #[arg(long, short, env = "THREADLINE_SERVER_URL")]
    server: Option<String>,

    /// Session token sent as X-Session-Token
    #[arg(long, env = "THREADLINE_SESSION_TOKEN")]
    token: Option<String>,

    /// Post whose comments to open
    #[arg(long, short)]
    post: Option<Uuid>,

    /// Use a seeded in-memory backend instead of a server
    #[arg(long)]
    demo: bool,

    /// Enable verbose logging
    #[arg(long, short)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Show root comments with their first replies
    List {
        /// Number of root pages to load
        #[arg(long, default_value_t = 1)]
        pages: u32,
    },
    /// Show every reply of a root comment
    Replies { id: Uuid },
    /// Post a root comment
    Post { text: String },
    /// Reply to a comment
    Reply { id: Uuid, text: String },
    /// Like or unlike a comment
    Like { id: Uuid },
    /// Delete a comment
    Delete { id: Uuid },
    /// Report a comment
    Report { id: Uuid, reason: String },
}

fn load_env() {
    let _ = dotenv::dotenv();
}

/// Post id used by `--demo` when none is given
fn demo_post_id() -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, b"threadline-demo")
}

fn open_view(cli: &Cli, settings: &Settings) -> Result<CommentView> {
    if cli.demo {
        let post_id = cli.post.unwrap_or_else(demo_post_id);
        let backend = Arc::new(MockBackend::new());
        backend.seed_thread(post_id, 8, 3);
        let viewer = backend.viewer().clone();
        return Ok(CommentView::open(post_id, backend, settings, viewer));
    }

    let post_id = cli.post.context("--post is required unless --demo is given")?;
    let mut client = ApiClient::new(settings.server.url.clone());
    client.set_session_token(settings.server.session_token.clone());
    let backend: Arc<dyn CommentsBackend> = Arc::new(client);
    let viewer = AuthorRef {
        id: Uuid::nil(),
        display_name: "You".to_string(),
        avatar_url: None,
        handle: "you".to_string(),
    };
    Ok(CommentView::open(post_id, backend, settings, viewer))
}

fn print_comment(comment: &Comment, indent: usize) {
    let pad = " ".repeat(indent);
    let mut badges = vec![format!("{} likes", comment.likes_count)];
    if comment.is_liked {
        badges.push("liked".to_string());
    }
    if !comment.is_reply() && comment.comments_count > 0 {
        badges.push(format!("{} replies", comment.comments_count));
    }
    if comment.is_reported {
        badges.push("reported".to_string());
    }
    let hashtags = comment.hashtags();
    if !hashtags.is_empty() {
        badges.push(format!("#{}", hashtags.join(" #")));
    }

    println!(
        "{}{} @{} {} [{}]",
        pad,
        comment.id,
        comment.author.handle,
        comment.created_at.format("%Y-%m-%d %H:%M"),
        badges.join(", ")
    );
    println!("{}  {}", pad, comment.text);
}

fn print_threads(view: &CommentView) {
    let comments = view.comments();
    if comments.is_empty() {
        println!("No comments yet.");
        return;
    }
    for comment in &comments {
        print_comment(comment, 0);
        let replies = view.replies(comment.id);
        for reply in &replies {
            print_comment(reply, 4);
        }
        let hidden = (comment.comments_count as usize).saturating_sub(replies.len());
        if hidden > 0 {
            println!("    ... {} more replies", hidden);
        }
    }
    if view.store().has_next_page() {
        println!("(more comments available)");
    }
}

/// Page through roots, then reply windows, until `id` is loaded
async fn locate(view: &CommentView, id: Uuid) -> Result<Comment> {
    loop {
        if let Some(comment) = view.comment(id) {
            return Ok(comment);
        }
        if !view.store().has_next_page() {
            break;
        }
        if view.load_more_comments().await? == LoadOutcome::Skipped {
            break;
        }
    }

    for root in view.comments() {
        while let LoadOutcome::Loaded { .. } = view.load_more_replies(root.id).await? {
            if let Some(comment) = view.comment(id) {
                return Ok(comment);
            }
        }
    }
    view.comment(id).ok_or_else(|| anyhow!("Comment {} not found on this post", id))
}

fn report_outcome<T>(action: &str, outcome: MutationOutcome<T>) -> Result<()> {
    match outcome {
        MutationOutcome::Confirmed(_) => {
            println!("✓ {}", action);
            Ok(())
        }
        MutationOutcome::Applied => {
            println!("✓ {} (not confirmed by the server)", action);
            Ok(())
        }
        MutationOutcome::RolledBack(reason) => Err(anyhow!(reason.user_message())),
    }
}

async fn run(view: &CommentView, command: Command) -> Result<()> {
    view.load_initial().await.context("Failed to load comments")?;

    match command {
        Command::List { pages } => {
            for _ in 1..pages {
                if !view.store().has_next_page() {
                    break;
                }
                view.load_more_comments().await?;
            }
            print_threads(view);
        }
        Command::Replies { id } => {
            let root = locate(view, id).await?;
            if root.is_reply() {
                return Err(anyhow!("{} is a reply; pass its root comment {}", id, root.thread_root_id()));
            }
            while let LoadOutcome::Loaded { .. } = view.load_more_replies(id).await? {}
            print_comment(&root, 0);
            for reply in view.replies(id) {
                print_comment(&reply, 4);
            }
        }
        Command::Post { text } => {
            view.compose().set_text(text);
            let outcome = view.submit_draft().await?;
            if let MutationOutcome::Confirmed(comment) = &outcome {
                print_comment(comment, 0);
            }
            report_outcome("Posted", outcome)?;
        }
        Command::Reply { id, text } => {
            locate(view, id).await?;
            view.reply_to(id)?;
            view.compose().push_str(&text);
            let outcome = view.submit_draft().await?;
            if let MutationOutcome::Confirmed(comment) = &outcome {
                print_comment(comment, 4);
            }
            report_outcome("Replied", outcome)?;
        }
        Command::Like { id } => {
            locate(view, id).await?;
            let outcome = view.toggle_like(id).await?;
            let liked = view.comment(id).is_some_and(|c| c.is_liked);
            report_outcome(if liked { "Liked" } else { "Unliked" }, outcome)?;
        }
        Command::Delete { id } => {
            locate(view, id).await?;
            report_outcome("Deleted", view.delete(id).await?)?;
        }
        Command::Report { id, reason } => {
            locate(view, id).await?;
            report_outcome("Reported", view.report(id, &reason).await?)?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    load_env();
    let cli = Cli::parse();

    let log_config = if cli.verbose {
        LogConfig::verbose()
    } else {
        LogConfig::minimal()
    };
    if let Err(e) = init_logging(&log_config) {
        eprintln!("Warning: Failed to initialize logging: {}", e);
    }

    let mut settings = Settings::new().context("Failed to load threadline settings")?;
    if let Some(server) = &cli.server {
        settings.server.url = server.clone();
    }
    if let Some(token) = &cli.token {
        settings.server.session_token = Some(token.clone());
    }
    log::info!("Using server {}", settings.server.url);

    let view = open_view(&cli, &settings)?;
    let command = cli.command.unwrap_or(Command::List { pages: 1 });
    let result = run(&view, command).await;
    view.close();
    result
}
