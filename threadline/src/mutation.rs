use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::api::{ApiError, ApiResult, CommentsBackend};
use crate::compose::{ComposeController, ComposeError, ReplyTarget, Submission};
use crate::logging::MUTATIONS;
use crate::retry::{CallSite, RetryPolicies};
use crate::scope::until_cancelled;
use crate::store::{CommentStore, RemovedComment};
use threadline_types::{Comment, MutationKind};

/// A mutation that could not even be applied locally
#[derive(Debug, Error)]
pub enum MutationError {
    #[error(transparent)]
    Compose(#[from] ComposeError),
    #[error("Comment {0} is not loaded")]
    UnknownComment(Uuid),
    #[error("The comment view is closed")]
    ViewClosed,
}

/// Broad class of a backend failure, used to pick user-facing wording
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureCategory {
    Network,
    Authorization,
    Validation,
    NotFound,
    RateLimited,
    Server,
    Other,
}

impl From<&ApiError> for FailureCategory {
    fn from(err: &ApiError) -> Self {
        match err {
            ApiError::Network(_) => FailureCategory::Network,
            ApiError::Unauthorized(_) => FailureCategory::Authorization,
            ApiError::BadRequest(_) => FailureCategory::Validation,
            ApiError::NotFound(_) => FailureCategory::NotFound,
            ApiError::TooManyRequests(_) => FailureCategory::RateLimited,
            ApiError::Api { status, .. } if *status == 403 => FailureCategory::Authorization,
            ApiError::Api { status, .. } if *status >= 500 => FailureCategory::Server,
            ApiError::Api { .. } | ApiError::Serialization(_) => FailureCategory::Other,
        }
    }
}

/// Why an optimistic change was undone
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollbackReason {
    pub kind: MutationKind,
    pub category: FailureCategory,
    pub message: String,
    /// Repeating the action may succeed
    pub retryable: bool,
}

impl RollbackReason {
    pub fn from_error(kind: MutationKind, err: &ApiError) -> Self {
        Self {
            kind,
            category: err.into(),
            message: err.to_string(),
            retryable: err.is_retryable(),
        }
    }

    pub fn user_message(&self) -> String {
        match self.category {
            FailureCategory::Network => {
                "Network Error: Connection failed. Check your network and try again".to_string()
            }
            FailureCategory::Authorization => {
                "Authorization Error: Session expired or insufficient permissions. Please log in again".to_string()
            }
            FailureCategory::Validation => format!("Validation Error: {}", self.message),
            FailureCategory::NotFound => "This comment no longer exists".to_string(),
            FailureCategory::RateLimited => "Slow down: too many requests, try again in a moment".to_string(),
            FailureCategory::Server => {
                "Server Error: The server is experiencing issues. Please try again later".to_string()
            }
            FailureCategory::Other => format!("Error: {} could not be completed ({})", self.kind, self.message),
        }
    }
}

/// How a mutation ended
#[derive(Debug, Clone, PartialEq)]
pub enum MutationOutcome<T> {
    /// The local change stands without confirmation: fire-and-forget actions,
    /// or the view closed before the backend answered
    Applied,
    Confirmed(T),
    RolledBack(RollbackReason),
}

impl<T> MutationOutcome<T> {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, MutationOutcome::Confirmed(_))
    }

    pub fn is_rolled_back(&self) -> bool {
        matches!(self, MutationOutcome::RolledBack(_))
    }

    pub fn rollback_reason(&self) -> Option<&RollbackReason> {
        match self {
            MutationOutcome::RolledBack(reason) => Some(reason),
            _ => None,
        }
    }

    pub fn confirmed(self) -> Option<T> {
        match self {
            MutationOutcome::Confirmed(value) => Some(value),
            _ => None,
        }
    }
}

/// Local state a mutation is allowed to touch
pub struct MutationContext<'a> {
    pub store: &'a CommentStore,
    pub compose: &'a Mutex<ComposeController>,
}

/// A user action applied to the cache before the backend confirms it.
///
/// `rollback` has no default: every mutation states how it is undone, even
/// when undoing means leaving the local change in place.
#[async_trait]
pub trait OptimisticMutation: Send + Sync {
    /// What `rollback` needs to restore the pre-apply state
    type Undo: Send;
    type Response: Send;
    type Output: Send;

    fn kind(&self) -> MutationKind;

    fn call_site(&self) -> CallSite;

    fn apply(&self, ctx: &MutationContext<'_>) -> Result<Self::Undo, MutationError>;

    async fn send(&self, backend: &dyn CommentsBackend) -> ApiResult<Self::Response>;

    fn confirm(&self, ctx: &MutationContext<'_>, response: Self::Response) -> Self::Output;

    fn rollback(&self, ctx: &MutationContext<'_>, undo: Self::Undo);
}

pub struct ToggleLike {
    comment_id: Uuid,
    like: bool,
}

/// Toggles compose: undoing one toggle is another toggle of whatever the
/// comment shows now, even if a later toggle landed in between.
fn flip_like(c: &mut Comment) {
    c.is_liked = !c.is_liked;
    c.likes_count = if c.is_liked {
        c.likes_count + 1
    } else {
        c.likes_count.saturating_sub(1)
    };
}

#[async_trait]
impl OptimisticMutation for ToggleLike {
    type Undo = ();
    type Response = ();
    type Output = ();

    fn kind(&self) -> MutationKind {
        if self.like {
            MutationKind::Like
        } else {
            MutationKind::Unlike
        }
    }

    fn call_site(&self) -> CallSite {
        CallSite::ToggleLike
    }

    fn apply(&self, ctx: &MutationContext<'_>) -> Result<(), MutationError> {
        let like = self.like;
        ctx.store
            .update_comment(self.comment_id, |c| {
                if c.is_liked != like {
                    flip_like(c);
                }
            })
            .ok_or(MutationError::UnknownComment(self.comment_id))
    }

    async fn send(&self, backend: &dyn CommentsBackend) -> ApiResult<()> {
        backend.toggle_like_comment(self.comment_id).await
    }

    fn confirm(&self, _ctx: &MutationContext<'_>, _response: ()) {}

    fn rollback(&self, ctx: &MutationContext<'_>, _undo: ()) {
        ctx.store.update_comment(self.comment_id, flip_like);
    }
}

/// Post a root comment or a reply. Nothing is inserted until the backend
/// returns the stored comment.
pub struct PostComment {
    post_id: Uuid,
    submission: Submission,
}

#[async_trait]
impl OptimisticMutation for PostComment {
    type Undo = ();
    type Response = Comment;
    type Output = Comment;

    fn kind(&self) -> MutationKind {
        if self.submission.reply_target.is_some() {
            MutationKind::PostReply
        } else {
            MutationKind::PostComment
        }
    }

    fn call_site(&self) -> CallSite {
        CallSite::PostComment
    }

    fn apply(&self, _ctx: &MutationContext<'_>) -> Result<(), MutationError> {
        Ok(())
    }

    async fn send(&self, backend: &dyn CommentsBackend) -> ApiResult<Comment> {
        backend
            .post_comment(
                self.post_id,
                self.submission.parent_comment_id(),
                self.submission.text.clone(),
            )
            .await
    }

    fn confirm(&self, ctx: &MutationContext<'_>, comment: Comment) -> Comment {
        let root_id = match (&self.submission.reply_target, comment.is_reply()) {
            (_, true) => Some(comment.thread_root_id()),
            (Some(target), false) => Some(target.root_comment_id),
            (None, false) => None,
        };

        match root_id {
            None => {
                ctx.store.insert_at_head(comment.clone());
                ctx.store.replies().ensure(comment.id, 0);
            }
            Some(root_id) => match ctx.store.comment(root_id) {
                Some(root) => {
                    ctx.store.replies().ensure(root_id, root.comments_count);
                    if ctx.store.replies().prepend_optimistic(root_id, comment.clone()) {
                        ctx.store.adjust_reply_count(root_id, 1);
                    }
                }
                None => {
                    log::debug!(target: MUTATIONS, "root {} left the list; reply {} not shown", root_id, comment.id);
                }
            },
        }
        comment
    }

    fn rollback(&self, ctx: &MutationContext<'_>, _undo: ()) {
        if !ctx.compose.lock().restore(self.submission.clone()) {
            log::info!(target: MUTATIONS, "kept newer draft; failed submission not restored");
        }
    }
}

pub enum DeleteUndo {
    Root(RemovedComment),
    Reply { root_id: Uuid, index: usize, reply: Comment },
}

pub struct DeleteComment {
    post_id: Uuid,
    comment_id: Uuid,
}

#[async_trait]
impl OptimisticMutation for DeleteComment {
    type Undo = DeleteUndo;
    type Response = ();
    type Output = ();

    fn kind(&self) -> MutationKind {
        MutationKind::Delete
    }

    fn call_site(&self) -> CallSite {
        CallSite::DeleteComment
    }

    fn apply(&self, ctx: &MutationContext<'_>) -> Result<DeleteUndo, MutationError> {
        if let Some(removed) = ctx.store.remove(self.comment_id) {
            return Ok(DeleteUndo::Root(removed));
        }
        let (root_id, index, reply) = ctx
            .store
            .replies()
            .remove_reply(self.comment_id)
            .ok_or(MutationError::UnknownComment(self.comment_id))?;
        ctx.store.adjust_reply_count(root_id, -1);
        Ok(DeleteUndo::Reply { root_id, index, reply })
    }

    /// A retry can land after an earlier attempt already deleted the
    /// comment; NotFound then means the comment is gone, as asked.
    async fn send(&self, backend: &dyn CommentsBackend) -> ApiResult<()> {
        match backend.delete_comment(self.post_id, self.comment_id).await {
            Err(ApiError::NotFound(msg)) => {
                log::debug!(target: MUTATIONS, "comment {} already gone: {}", self.comment_id, msg);
                Ok(())
            }
            other => other,
        }
    }

    fn confirm(&self, _ctx: &MutationContext<'_>, _response: ()) {}

    fn rollback(&self, ctx: &MutationContext<'_>, undo: DeleteUndo) {
        match undo {
            DeleteUndo::Root(removed) => ctx.store.reinsert(removed),
            DeleteUndo::Reply { root_id, index, reply } => {
                if ctx.store.replies().insert_reply_at(root_id, index, reply) {
                    ctx.store.adjust_reply_count(root_id, 1);
                }
            }
        }
    }
}

/// Fire-and-forget: the local flag stays set whatever the backend says
pub struct ReportComment {
    comment_id: Uuid,
    reason: String,
}

#[async_trait]
impl OptimisticMutation for ReportComment {
    type Undo = ();
    type Response = ();
    type Output = ();

    fn kind(&self) -> MutationKind {
        MutationKind::Report
    }

    fn call_site(&self) -> CallSite {
        CallSite::ReportComment
    }

    fn apply(&self, ctx: &MutationContext<'_>) -> Result<(), MutationError> {
        ctx.store
            .update_comment(self.comment_id, |c| c.is_reported = true)
            .ok_or(MutationError::UnknownComment(self.comment_id))
    }

    async fn send(&self, backend: &dyn CommentsBackend) -> ApiResult<()> {
        backend.report_comment(self.comment_id, self.reason.clone()).await
    }

    fn confirm(&self, _ctx: &MutationContext<'_>, _response: ()) {}

    fn rollback(&self, _ctx: &MutationContext<'_>, _undo: ()) {}
}

/// Runs user actions against the store: apply, send, then confirm or roll back
pub struct MutationCoordinator {
    backend: Arc<dyn CommentsBackend>,
    store: Arc<CommentStore>,
    compose: Arc<Mutex<ComposeController>>,
    retry: RetryPolicies,
    scope: CancellationToken,
}

impl MutationCoordinator {
    pub fn new(
        backend: Arc<dyn CommentsBackend>,
        store: Arc<CommentStore>,
        compose: Arc<Mutex<ComposeController>>,
        retry: RetryPolicies,
        scope: CancellationToken,
    ) -> Self {
        Self {
            backend,
            store,
            compose,
            retry,
            scope,
        }
    }

    fn context(&self) -> MutationContext<'_> {
        MutationContext {
            store: &self.store,
            compose: &self.compose,
        }
    }

    pub async fn run<M: OptimisticMutation>(&self, mutation: M) -> Result<MutationOutcome<M::Output>, MutationError> {
        if self.scope.is_cancelled() {
            return Err(MutationError::ViewClosed);
        }

        let kind = mutation.kind();
        let ctx = self.context();
        let undo = mutation.apply(&ctx)?;
        log::debug!(target: MUTATIONS, "applied {}", kind);

        let backend = self.backend.as_ref();
        let sent = until_cancelled(
            &self.scope,
            self.retry.run(mutation.call_site(), || mutation.send(backend)),
        )
        .await;

        match sent {
            None => {
                log::debug!(target: MUTATIONS, "view closed before {} was confirmed", kind);
                Ok(MutationOutcome::Applied)
            }
            Some(Ok(response)) => {
                log::debug!(target: MUTATIONS, "confirmed {}", kind);
                Ok(MutationOutcome::Confirmed(mutation.confirm(&ctx, response)))
            }
            Some(Err(err)) => {
                mutation.rollback(&ctx, undo);
                if kind.has_rollback() {
                    log::warn!(target: MUTATIONS, "rolled back {}: {}", kind, err);
                    Ok(MutationOutcome::RolledBack(RollbackReason::from_error(kind, &err)))
                } else {
                    log::warn!(target: MUTATIONS, "{} failed, keeping local state: {}", kind, err);
                    Ok(MutationOutcome::Applied)
                }
            }
        }
    }

    pub async fn toggle_like(&self, comment_id: Uuid) -> Result<MutationOutcome<()>, MutationError> {
        let liked = self
            .store
            .comment(comment_id)
            .ok_or(MutationError::UnknownComment(comment_id))?
            .is_liked;
        self.run(ToggleLike {
            comment_id,
            like: !liked,
        })
        .await
    }

    /// Post whatever is in the compose input. The input is cleared up front
    /// and restored if the backend rejects the comment.
    pub async fn submit_draft(&self) -> Result<MutationOutcome<Comment>, MutationError> {
        if self.scope.is_cancelled() {
            return Err(MutationError::ViewClosed);
        }
        let submission = self.compose.lock().take_submission()?;
        self.post(submission).await
    }

    /// Post `text` directly, bypassing the compose input
    pub async fn submit(
        &self,
        text: &str,
        reply_target: Option<ReplyTarget>,
    ) -> Result<MutationOutcome<Comment>, MutationError> {
        let submission = self.compose.lock().prepare(text, reply_target)?;
        self.post(submission).await
    }

    async fn post(&self, submission: Submission) -> Result<MutationOutcome<Comment>, MutationError> {
        self.run(PostComment {
            post_id: self.store.post_id(),
            submission,
        })
        .await
    }

    pub async fn delete(&self, comment_id: Uuid) -> Result<MutationOutcome<()>, MutationError> {
        self.run(DeleteComment {
            post_id: self.store.post_id(),
            comment_id,
        })
        .await
    }

    pub async fn report(&self, comment_id: Uuid, reason: &str) -> Result<MutationOutcome<()>, MutationError> {
        self.run(ReportComment {
            comment_id,
            reason: reason.to_string(),
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MockBackend;
    use crate::config::PaginationSettings;
    use crate::retry::RetryPolicy;

    struct Harness {
        backend: Arc<MockBackend>,
        store: Arc<CommentStore>,
        compose: Arc<Mutex<ComposeController>>,
        coordinator: MutationCoordinator,
    }

    async fn harness(roots: usize, replies: usize) -> Harness {
        let backend = Arc::new(MockBackend::new());
        let post_id = Uuid::new_v4();
        backend.seed_thread(post_id, roots, replies);

        let scope = CancellationToken::new();
        let retry = RetryPolicies::uniform(RetryPolicy::once());
        let store = Arc::new(CommentStore::new(
            post_id,
            backend.clone(),
            &PaginationSettings::default(),
            retry.clone(),
            scope.clone(),
        ));
        store.load_next_page().await.unwrap();

        let compose = Arc::new(Mutex::new(ComposeController::new(280)));
        let coordinator = MutationCoordinator::new(backend.clone(), store.clone(), compose.clone(), retry, scope);
        Harness {
            backend,
            store,
            compose,
            coordinator,
        }
    }

    fn server_error() -> ApiError {
        ApiError::Api {
            status: 500,
            message: "boom".to_string(),
        }
    }

    #[tokio::test]
    async fn test_like_twice_round_trips() {
        let h = harness(1, 0).await;
        let id = h.store.comments()[0].id;

        h.coordinator.toggle_like(id).await.unwrap();
        let liked = h.store.comment(id).unwrap();
        assert!(liked.is_liked);
        assert_eq!(liked.likes_count, 1);

        h.coordinator.toggle_like(id).await.unwrap();
        let unliked = h.store.comment(id).unwrap();
        assert!(!unliked.is_liked);
        assert_eq!(unliked.likes_count, 0);
    }

    #[tokio::test]
    async fn test_reply_delete_rollback_restores_counts() {
        let h = harness(1, 3).await;
        let root_id = h.store.comments()[0].id;
        let replies = h.store.replies().replies(root_id);
        let target = replies[1].clone();

        h.backend.fail_next(CallSite::DeleteComment, 1, server_error);
        let outcome = h.coordinator.delete(target.id).await.unwrap();
        assert!(outcome.rollback_reason().unwrap().retryable);

        let restored = h.store.replies().replies(root_id);
        assert_eq!(restored[1].id, target.id);
        assert_eq!(h.store.comment(root_id).unwrap().comments_count, 3);
    }

    #[tokio::test]
    async fn test_report_failure_keeps_flag() {
        let h = harness(1, 0).await;
        let id = h.store.comments()[0].id;

        h.backend.fail_next(CallSite::ReportComment, 1, || ApiError::BadRequest("nope".to_string()));
        let outcome = h.coordinator.report(id, "spam").await.unwrap();

        assert_eq!(outcome, MutationOutcome::Applied);
        assert!(h.store.comment(id).unwrap().is_reported);
    }

    #[tokio::test]
    async fn test_unknown_comment_is_rejected_before_sending() {
        let h = harness(1, 0).await;
        let err = h.coordinator.delete(Uuid::new_v4()).await.unwrap_err();

        assert!(matches!(err, MutationError::UnknownComment(_)));
        assert_eq!(h.backend.calls(CallSite::DeleteComment), 0);
    }

    #[tokio::test]
    async fn test_empty_draft_is_rejected() {
        let h = harness(0, 0).await;
        h.compose.lock().set_text("   ");

        let err = h.coordinator.submit_draft().await.unwrap_err();
        assert!(matches!(err, MutationError::Compose(ComposeError::Empty)));
        assert_eq!(h.backend.calls(CallSite::PostComment), 0);
    }

    #[test]
    fn test_user_message_by_category() {
        let reason = RollbackReason::from_error(MutationKind::Like, &ApiError::Unauthorized("expired".to_string()));
        assert_eq!(reason.category, FailureCategory::Authorization);
        assert!(!reason.retryable);
        assert!(reason.user_message().starts_with("Authorization Error"));

        let reason = RollbackReason::from_error(MutationKind::PostComment, &ApiError::BadRequest("too long".to_string()));
        assert!(reason.user_message().contains("too long"));
    }
}
