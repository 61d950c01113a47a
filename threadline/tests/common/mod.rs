#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use threadline::config::PaginationSettings;
use threadline::{ApiError, CommentView, MockBackend, RetryPolicies, RetryPolicy, Settings};
use threadline_types::{AuthorRef, Comment};
use uuid::Uuid;

/// Settings with small pages and a single fast attempt per call
pub fn settings(root_page_size: u32, reply_page_size: u32, eager_replies: bool) -> Settings {
    let mut settings = Settings::default();
    settings.pagination = PaginationSettings {
        root_page_size,
        reply_page_size,
        eager_replies,
    };
    settings.retry = RetryPolicies::uniform(fast_policy(1));
    settings
}

pub fn fast_policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        initial_backoff_ms: 1,
        max_backoff_ms: 2,
        multiplier: 2.0,
    }
}

pub fn open(backend: &Arc<MockBackend>, post_id: Uuid, settings: &Settings) -> CommentView {
    CommentView::open(post_id, backend.clone(), settings, backend.viewer().clone())
}

pub fn t(minutes: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap() + Duration::minutes(minutes)
}

/// A root comment with explicit counters, stored in the backend
pub fn stored_comment(backend: &MockBackend, post_id: Uuid, minutes: i64, likes_count: u32, is_liked: bool) -> Comment {
    let comment = Comment {
        id: Uuid::new_v4(),
        post_id,
        parent_comment_id: None,
        root_comment_id: None,
        author: AuthorRef {
            id: Uuid::new_v4(),
            display_name: "Alice".to_string(),
            avatar_url: None,
            handle: "alice".to_string(),
        },
        text: format!("comment at t{}", minutes),
        created_at: t(minutes),
        likes_count,
        is_liked,
        comments_count: 0,
        is_reported: false,
    };
    backend.insert(comment.clone());
    comment
}

pub fn server_error() -> ApiError {
    ApiError::Api {
        status: 503,
        message: "service unavailable".to_string(),
    }
}

pub fn ids(comments: &[Comment]) -> Vec<Uuid> {
    comments.iter().map(|c| c.id).collect()
}
