//! In-memory comments backend.
//!
//! Serves the same contract as the HTTP client from a local list so the engine
//! can run without a server (`--demo`) and so tests can script failures and
//! hold responses in flight.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use uuid::Uuid;

use super::{ApiError, ApiResult, CommentsBackend};
use crate::cursor::PaginationCursor;
use crate::retry::CallSite;
use threadline_types::{AuthorRef, Comment, CommentsPage, RepliesPage};

#[derive(Default)]
struct MockState {
    comments: Vec<Comment>,
    reports: Vec<(Uuid, String)>,
    calls: HashMap<CallSite, u32>,
    failures: HashMap<CallSite, VecDeque<ApiError>>,
    holding: bool,
}

pub struct MockBackend {
    state: Mutex<MockState>,
    held: Arc<Semaphore>,
    viewer: AuthorRef,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::with_viewer(AuthorRef {
            id: Uuid::new_v4(),
            display_name: "Demo Viewer".to_string(),
            avatar_url: None,
            handle: "viewer".to_string(),
        })
    }

    /// Comments created through `post_comment` are attributed to `viewer`
    pub fn with_viewer(viewer: AuthorRef) -> Self {
        Self {
            state: Mutex::new(MockState::default()),
            held: Arc::new(Semaphore::new(0)),
            viewer,
        }
    }

    pub fn viewer(&self) -> &AuthorRef {
        &self.viewer
    }

    /// Store a comment as the server would have it
    pub fn insert(&self, comment: Comment) {
        self.state.lock().comments.push(comment);
    }

    /// Add a root comment with an explicit timestamp
    pub fn seed_comment(&self, post_id: Uuid, handle: &str, text: &str, created_at: DateTime<Utc>) -> Comment {
        let comment = build_comment(post_id, None, author(handle), text, created_at);
        self.insert(comment.clone());
        comment
    }

    /// Add a reply to `root` with an explicit timestamp
    pub fn seed_reply(&self, root: &Comment, handle: &str, text: &str, created_at: DateTime<Utc>) -> Comment {
        let reply = build_comment(root.post_id, Some(root.id), author(handle), text, created_at);
        self.insert(reply.clone());
        reply
    }

    /// Populate a post with `roots` root comments, each carrying `replies`
    /// replies. Ids derive from the post id, so reseeding the same post
    /// yields the same ids.
    pub fn seed_thread(&self, post_id: Uuid, roots: usize, replies: usize) {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).single().unwrap_or_else(Utc::now);
        for r in 0..roots {
            let root_at = base + Duration::minutes(r as i64 + 1);
            let mut root = build_comment(
                post_id,
                None,
                author(&format!("user{}", r)),
                &format!("Root comment #{} on this post #threadline", r + 1),
                root_at,
            );
            root.id = Uuid::new_v5(&post_id, format!("root-{}", r).as_bytes());
            self.insert(root.clone());

            for n in 0..replies {
                let mut reply = build_comment(
                    post_id,
                    Some(root.id),
                    author(&format!("replier{}", n)),
                    &format!("@{} reply {}", root.author.handle, n + 1),
                    root_at + Duration::seconds(n as i64 + 1),
                );
                reply.id = Uuid::new_v5(&post_id, format!("reply-{}-{}", r, n).as_bytes());
                self.insert(reply);
            }
        }
    }

    /// Make the next `times` calls at `site` fail with the error built by `make`
    pub fn fail_next(&self, site: CallSite, times: usize, make: impl Fn() -> ApiError) {
        let mut state = self.state.lock();
        let queue = state.failures.entry(site).or_default();
        for _ in 0..times {
            queue.push_back(make());
        }
    }

    /// Number of calls received at `site` so far
    pub fn calls(&self, site: CallSite) -> u32 {
        self.state.lock().calls.get(&site).copied().unwrap_or(0)
    }

    /// Park every call that arrives from now on until `release` is called
    pub fn hold(&self) {
        self.state.lock().holding = true;
    }

    /// Stop parking new calls; already parked calls stay parked
    pub fn open(&self) {
        self.state.lock().holding = false;
    }

    /// Let `n` parked calls continue, in arrival order
    pub fn release(&self, n: usize) {
        self.held.add_permits(n);
    }

    pub fn reports(&self) -> Vec<(Uuid, String)> {
        self.state.lock().reports.clone()
    }

    pub fn comment(&self, id: Uuid) -> Option<Comment> {
        self.state.lock().comments.iter().find(|c| c.id == id).cloned()
    }

    /// Record the call, wait if held, then surface any scripted failure
    async fn enter(&self, site: CallSite) -> ApiResult<()> {
        let holding = {
            let mut state = self.state.lock();
            *state.calls.entry(site).or_insert(0) += 1;
            state.holding
        };

        if holding {
            if let Ok(permit) = self.held.acquire().await {
                permit.forget();
            }
        }

        let failure = self
            .state
            .lock()
            .failures
            .get_mut(&site)
            .and_then(|queue| queue.pop_front());
        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn next_timestamp(state: &MockState) -> DateTime<Utc> {
        state
            .comments
            .iter()
            .map(|c| c.created_at)
            .max()
            .map(|latest| latest + Duration::seconds(1))
            .unwrap_or_else(Utc::now)
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn author(handle: &str) -> AuthorRef {
    AuthorRef {
        id: Uuid::new_v5(&Uuid::NAMESPACE_OID, handle.as_bytes()),
        display_name: handle.to_string(),
        avatar_url: None,
        handle: handle.to_string(),
    }
}

fn build_comment(
    post_id: Uuid,
    parent: Option<Uuid>,
    author: AuthorRef,
    text: &str,
    created_at: DateTime<Utc>,
) -> Comment {
    Comment {
        id: Uuid::new_v4(),
        post_id,
        parent_comment_id: parent,
        root_comment_id: parent,
        author,
        text: text.to_string(),
        created_at,
        likes_count: 0,
        is_liked: false,
        comments_count: 0,
        is_reported: false,
    }
}

/// Newest first, ties broken by id
fn newest_first(a: &Comment, b: &Comment) -> std::cmp::Ordering {
    b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id))
}

/// Slice one page out of an already filtered list
fn paginate(mut items: Vec<Comment>, limit: u32, cursor: Option<PaginationCursor>) -> (Vec<Comment>, bool) {
    items.sort_by(newest_first);
    let mut remaining: Vec<Comment> = items
        .into_iter()
        .filter(|c| cursor.map_or(true, |cur| cur.admits(c)))
        .collect();
    let has_more = remaining.len() > limit as usize;
    remaining.truncate(limit as usize);
    (remaining, has_more)
}

#[async_trait]
impl CommentsBackend for MockBackend {
    async fn fetch_comments(
        &self,
        post_id: Uuid,
        limit: u32,
        cursor: Option<PaginationCursor>,
    ) -> ApiResult<CommentsPage> {
        self.enter(CallSite::FetchComments).await?;
        let state = self.state.lock();
        let roots: Vec<Comment> = state
            .comments
            .iter()
            .filter(|c| c.post_id == post_id && c.parent_comment_id.is_none())
            .map(|c| {
                let mut root = c.clone();
                root.comments_count = state
                    .comments
                    .iter()
                    .filter(|r| r.parent_comment_id == Some(c.id))
                    .count() as u32;
                root
            })
            .collect();

        let (comments, has_next_page) = paginate(roots, limit, cursor);
        let end_cursor = comments.last().map(|c| c.created_at);
        Ok(CommentsPage {
            comments,
            has_next_page,
            end_cursor,
        })
    }

    async fn fetch_replies(
        &self,
        comment_id: Uuid,
        limit: u32,
        cursor: Option<PaginationCursor>,
    ) -> ApiResult<RepliesPage> {
        self.enter(CallSite::FetchReplies).await?;
        let state = self.state.lock();
        if !state.comments.iter().any(|c| c.id == comment_id) {
            return Err(ApiError::NotFound(format!("comment {}", comment_id)));
        }
        let replies: Vec<Comment> = state
            .comments
            .iter()
            .filter(|c| c.parent_comment_id == Some(comment_id))
            .cloned()
            .collect();
        let total_count = replies.len() as u32;

        let (replies, has_next_page) = paginate(replies, limit, cursor);
        let end_cursor = replies.last().map(|c| c.created_at);
        Ok(RepliesPage {
            replies,
            has_next_page,
            end_cursor,
            total_count,
        })
    }

    async fn post_comment(
        &self,
        post_id: Uuid,
        parent_comment_id: Option<Uuid>,
        text: String,
    ) -> ApiResult<Comment> {
        self.enter(CallSite::PostComment).await?;
        let mut state = self.state.lock();
        if let Some(parent_id) = parent_comment_id {
            match state.comments.iter().find(|c| c.id == parent_id) {
                None => return Err(ApiError::NotFound(format!("comment {}", parent_id))),
                Some(parent) if parent.is_reply() => {
                    return Err(ApiError::BadRequest("replies cannot be nested".to_string()))
                }
                Some(_) => {}
            }
        }
        let created_at = Self::next_timestamp(&state);
        let comment = build_comment(post_id, parent_comment_id, self.viewer.clone(), &text, created_at);
        state.comments.push(comment.clone());
        Ok(comment)
    }

    async fn delete_comment(&self, _post_id: Uuid, comment_id: Uuid) -> ApiResult<()> {
        self.enter(CallSite::DeleteComment).await?;
        let mut state = self.state.lock();
        let before = state.comments.len();
        state
            .comments
            .retain(|c| c.id != comment_id && c.parent_comment_id != Some(comment_id));
        if state.comments.len() == before {
            return Err(ApiError::NotFound(format!("comment {}", comment_id)));
        }
        Ok(())
    }

    async fn toggle_like_comment(&self, comment_id: Uuid) -> ApiResult<()> {
        self.enter(CallSite::ToggleLike).await?;
        let mut state = self.state.lock();
        let comment = state
            .comments
            .iter_mut()
            .find(|c| c.id == comment_id)
            .ok_or_else(|| ApiError::NotFound(format!("comment {}", comment_id)))?;
        if comment.is_liked {
            comment.likes_count = comment.likes_count.saturating_sub(1);
        } else {
            comment.likes_count += 1;
        }
        comment.is_liked = !comment.is_liked;
        Ok(())
    }

    async fn report_comment(&self, comment_id: Uuid, reason: String) -> ApiResult<()> {
        self.enter(CallSite::ReportComment).await?;
        self.state.lock().reports.push((comment_id, reason));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pages_do_not_overlap() {
        let backend = MockBackend::new();
        let post_id = Uuid::new_v4();
        backend.seed_thread(post_id, 5, 0);

        let first = backend.fetch_comments(post_id, 3, None).await.unwrap();
        assert_eq!(first.comments.len(), 3);
        assert!(first.has_next_page);

        let cursor = PaginationCursor::from_page_tail(&first.comments);
        let second = backend.fetch_comments(post_id, 3, cursor).await.unwrap();
        assert_eq!(second.comments.len(), 2);
        assert!(!second.has_next_page);
        assert!(second.comments.iter().all(|c| first.comments.iter().all(|f| f.id != c.id)));
    }

    #[tokio::test]
    async fn test_scripted_failure_is_consumed_once() {
        let backend = MockBackend::new();
        let post_id = Uuid::new_v4();
        backend.fail_next(CallSite::FetchComments, 1, || ApiError::Api {
            status: 500,
            message: "boom".to_string(),
        });

        assert!(backend.fetch_comments(post_id, 10, None).await.is_err());
        assert!(backend.fetch_comments(post_id, 10, None).await.is_ok());
        assert_eq!(backend.calls(CallSite::FetchComments), 2);
    }

    #[tokio::test]
    async fn test_nested_reply_is_rejected() {
        let backend = MockBackend::new();
        let post_id = Uuid::new_v4();
        let root = backend.seed_comment(post_id, "alice", "root", Utc::now());
        let reply = backend.seed_reply(&root, "bob", "reply", Utc::now());

        let err = backend
            .post_comment(post_id, Some(reply.id), "nested".to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }
}
