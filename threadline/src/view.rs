use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::api::{ApiResult, CommentsBackend};
use crate::compose::{ComposeController, DraftPreview, ReplyTarget};
use crate::config::Settings;
use crate::logging::PAGINATION;
use crate::mutation::{MutationCoordinator, MutationError, MutationOutcome};
use crate::store::CommentStore;
use crate::window::LoadOutcome;
use threadline_types::{AuthorRef, Comment};

/// The comment section of one open post.
///
/// Everything the view starts runs under its cancellation scope; once the
/// view is closed or dropped, responses that arrive late change nothing.
pub struct CommentView {
    scope: CancellationToken,
    viewer: AuthorRef,
    store: Arc<CommentStore>,
    compose: Arc<Mutex<ComposeController>>,
    coordinator: MutationCoordinator,
}

impl CommentView {
    pub fn open(post_id: Uuid, backend: Arc<dyn CommentsBackend>, settings: &Settings, viewer: AuthorRef) -> Self {
        let scope = CancellationToken::new();
        let store = Arc::new(CommentStore::new(
            post_id,
            backend.clone(),
            &settings.pagination,
            settings.retry.clone(),
            scope.clone(),
        ));
        let compose = Arc::new(Mutex::new(ComposeController::new(settings.compose.max_chars)));
        let coordinator = MutationCoordinator::new(
            backend,
            store.clone(),
            compose.clone(),
            settings.retry.clone(),
            scope.clone(),
        );

        log::info!(target: PAGINATION, "opened comment view for post {}", post_id);
        Self {
            scope,
            viewer,
            store,
            compose,
            coordinator,
        }
    }

    pub fn post_id(&self) -> Uuid {
        self.store.post_id()
    }

    pub fn viewer(&self) -> &AuthorRef {
        &self.viewer
    }

    pub fn store(&self) -> &CommentStore {
        &self.store
    }

    pub fn coordinator(&self) -> &MutationCoordinator {
        &self.coordinator
    }

    pub fn is_closed(&self) -> bool {
        self.scope.is_cancelled()
    }

    pub fn comments(&self) -> Vec<Comment> {
        self.store.comments()
    }

    pub fn replies(&self, root_id: Uuid) -> Vec<Comment> {
        self.store.replies().replies(root_id)
    }

    pub fn comment(&self, id: Uuid) -> Option<Comment> {
        self.store.comment(id)
    }

    /// First page of root comments, plus first reply pages when eager
    /// loading is on
    pub async fn load_initial(&self) -> ApiResult<LoadOutcome> {
        self.store.load_next_page().await
    }

    pub async fn load_more_comments(&self) -> ApiResult<LoadOutcome> {
        self.store.load_next_page().await
    }

    pub async fn load_more_replies(&self, root_id: Uuid) -> ApiResult<LoadOutcome> {
        self.store.load_replies(root_id).await
    }

    pub async fn refresh(&self) -> ApiResult<LoadOutcome> {
        self.store.refresh().await
    }

    /// Lock the compose input for editing
    pub fn compose(&self) -> MutexGuard<'_, ComposeController> {
        self.compose.lock()
    }

    /// Start replying to a loaded comment
    pub fn reply_to(&self, comment_id: Uuid) -> Result<(), MutationError> {
        let comment = self
            .store
            .comment(comment_id)
            .ok_or(MutationError::UnknownComment(comment_id))?;
        self.compose.lock().reply_to(&comment);
        Ok(())
    }

    pub fn preview(&self) -> DraftPreview {
        self.compose.lock().preview(&self.viewer)
    }

    pub async fn submit_draft(&self) -> Result<MutationOutcome<Comment>, MutationError> {
        self.coordinator.submit_draft().await
    }

    pub async fn submit(
        &self,
        text: &str,
        reply_target: Option<ReplyTarget>,
    ) -> Result<MutationOutcome<Comment>, MutationError> {
        self.coordinator.submit(text, reply_target).await
    }

    pub async fn toggle_like(&self, comment_id: Uuid) -> Result<MutationOutcome<()>, MutationError> {
        self.coordinator.toggle_like(comment_id).await
    }

    pub async fn delete(&self, comment_id: Uuid) -> Result<MutationOutcome<()>, MutationError> {
        self.coordinator.delete(comment_id).await
    }

    pub async fn report(&self, comment_id: Uuid, reason: &str) -> Result<MutationOutcome<()>, MutationError> {
        self.coordinator.report(comment_id, reason).await
    }

    /// Tear the view down. In-flight loads and mutations finish as no-ops.
    pub fn close(&self) {
        if self.scope.is_cancelled() {
            return;
        }
        self.scope.cancel();
        self.store.clear();
        log::info!(target: PAGINATION, "closed comment view for post {}", self.store.post_id());
    }
}

impl Drop for CommentView {
    fn drop(&mut self) {
        self.scope.cancel();
    }
}
