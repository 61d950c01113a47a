use async_trait::async_trait;
use uuid::Uuid;

use super::ApiResult;
use crate::cursor::PaginationCursor;
use threadline_types::{Comment, CommentsPage, RepliesPage};

/// Network boundary consumed by the store, the reply manager and the
/// mutation coordinator.
#[async_trait]
pub trait CommentsBackend: Send + Sync {
    /// Root comments of a post, newest first, strictly older than `cursor`
    async fn fetch_comments(
        &self,
        post_id: Uuid,
        limit: u32,
        cursor: Option<PaginationCursor>,
    ) -> ApiResult<CommentsPage>;

    /// Replies of a root comment, newest first, strictly older than `cursor`
    async fn fetch_replies(
        &self,
        comment_id: Uuid,
        limit: u32,
        cursor: Option<PaginationCursor>,
    ) -> ApiResult<RepliesPage>;

    /// Create a comment; `parent_comment_id` of None makes a root comment
    async fn post_comment(
        &self,
        post_id: Uuid,
        parent_comment_id: Option<Uuid>,
        text: String,
    ) -> ApiResult<Comment>;

    async fn delete_comment(&self, post_id: Uuid, comment_id: Uuid) -> ApiResult<()>;

    async fn toggle_like_comment(&self, comment_id: Uuid) -> ApiResult<()>;

    async fn report_comment(&self, comment_id: Uuid, reason: String) -> ApiResult<()>;
}
