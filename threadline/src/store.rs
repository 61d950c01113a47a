use std::sync::Arc;

use futures::future::join_all;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::api::{ApiResult, CommentsBackend};
use crate::config::PaginationSettings;
use crate::cursor::PaginationCursor;
use crate::logging::PAGINATION;
use crate::replies::ReplyStateManager;
use crate::retry::{CallSite, RetryPolicies};
use crate::scope::until_cancelled;
use crate::window::{FetchTicket, LoadOutcome, Page, PaginationWindow};
use threadline_types::Comment;

/// A root comment taken out of the list, with everything needed to put it back
#[derive(Debug, Clone)]
pub struct RemovedComment {
    pub index: usize,
    pub comment: Comment,
    pub replies: Option<PaginationWindow>,
}

/// The root-comment window of one post plus the reply windows hanging off it.
///
/// The root list and the reply manager sit behind separate locks; no method
/// holds both at once.
pub struct CommentStore {
    post_id: Uuid,
    backend: Arc<dyn CommentsBackend>,
    retry: RetryPolicies,
    scope: CancellationToken,
    page_size: u32,
    eager_replies: bool,
    root: Mutex<PaginationWindow>,
    replies: ReplyStateManager,
}

impl CommentStore {
    pub fn new(
        post_id: Uuid,
        backend: Arc<dyn CommentsBackend>,
        pagination: &PaginationSettings,
        retry: RetryPolicies,
        scope: CancellationToken,
    ) -> Self {
        let replies = ReplyStateManager::new(
            backend.clone(),
            pagination.reply_page_size,
            retry.clone(),
            scope.clone(),
        );
        Self {
            post_id,
            backend,
            retry,
            scope,
            page_size: pagination.root_page_size.max(1),
            eager_replies: pagination.eager_replies,
            root: Mutex::new(PaginationWindow::new(0)),
            replies,
        }
    }

    pub fn post_id(&self) -> Uuid {
        self.post_id
    }

    pub fn replies(&self) -> &ReplyStateManager {
        &self.replies
    }

    /// Root comments, newest first
    pub fn comments(&self) -> Vec<Comment> {
        self.root.lock().items().to_vec()
    }

    /// Look up a root comment or a materialized reply
    pub fn comment(&self, id: Uuid) -> Option<Comment> {
        if let Some(comment) = self.root.lock().get(id) {
            return Some(comment.clone());
        }
        self.replies.find_reply(id).map(|(_, _, reply)| reply)
    }

    pub fn len(&self) -> usize {
        self.root.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.root.lock().is_empty()
    }

    pub fn cursor(&self) -> Option<PaginationCursor> {
        self.root.lock().cursor()
    }

    pub fn has_next_page(&self) -> bool {
        self.root.lock().has_next_page()
    }

    pub fn is_loading(&self) -> bool {
        self.root.lock().is_loading()
    }

    pub fn total_count(&self) -> u32 {
        self.root.lock().total_count()
    }

    /// Fetch the next page of root comments. A no-op while a fetch is in
    /// flight or after the last page.
    pub async fn load_next_page(&self) -> ApiResult<LoadOutcome> {
        let Some(ticket) = self.root.lock().begin_fetch(self.page_size) else {
            log::trace!(target: PAGINATION, "root load skipped for post {}", self.post_id);
            return Ok(LoadOutcome::Skipped);
        };
        self.fetch_page(ticket).await
    }

    /// Start over from the newest page, replacing the list once it arrives.
    /// Any load still in flight is discarded when it lands.
    pub async fn refresh(&self) -> ApiResult<LoadOutcome> {
        let ticket = self.root.lock().begin_refresh(self.page_size);
        log::debug!(target: PAGINATION, "refreshing comments for post {}", self.post_id);
        self.fetch_page(ticket).await
    }

    async fn fetch_page(&self, ticket: FetchTicket) -> ApiResult<LoadOutcome> {
        log::debug!(
            target: PAGINATION,
            "loading comments for post {} (cursor={:?}, limit={})",
            self.post_id,
            ticket.cursor(),
            ticket.limit()
        );

        let backend = self.backend.as_ref();
        let post_id = self.post_id;
        let fetched = until_cancelled(
            &self.scope,
            self.retry.run(CallSite::FetchComments, || {
                backend.fetch_comments(post_id, ticket.limit(), ticket.cursor())
            }),
        )
        .await;

        let page: Page = match fetched {
            None => {
                self.root.lock().fail(ticket);
                log::debug!(target: PAGINATION, "comment load for post {} cancelled", post_id);
                return Ok(LoadOutcome::Cancelled);
            }
            Some(Err(err)) => {
                self.root.lock().fail(ticket);
                log::warn!(target: PAGINATION, "loading comments for post {} failed: {}", post_id, err);
                return Err(err);
            }
            Some(Ok(page)) => page.into(),
        };

        let roots: Vec<(Uuid, u32)> = page
            .items
            .iter()
            .map(|c| (c.id, c.comments_count))
            .collect();

        let outcome = self.root.lock().complete(ticket, page);
        if !matches!(outcome, LoadOutcome::Loaded { .. }) {
            log::debug!(target: PAGINATION, "dropped stale comment page for post {}", post_id);
            return Ok(outcome);
        }

        if ticket.is_first_page() {
            self.replies.reseed(&roots);
        } else {
            for (root_id, count) in &roots {
                self.replies.ensure(*root_id, *count);
            }
        }
        self.reconcile_reply_counts(&roots);

        if self.eager_replies {
            self.load_first_reply_pages(&roots).await;
        }

        Ok(outcome)
    }

    /// Server counts win unless fewer replies are reported than we hold
    fn reconcile_reply_counts(&self, roots: &[(Uuid, u32)]) {
        let totals: Vec<(Uuid, u32)> = roots
            .iter()
            .filter_map(|(root_id, count)| {
                self.replies
                    .set_total_count(*root_id, *count)
                    .map(|total| (*root_id, total))
            })
            .collect();

        let mut root = self.root.lock();
        for (root_id, total) in totals {
            if let Some(comment) = root.get_mut(root_id) {
                comment.comments_count = total;
            }
        }
    }

    async fn load_first_reply_pages(&self, roots: &[(Uuid, u32)]) {
        let pending: Vec<Uuid> = roots
            .iter()
            .filter(|(root_id, count)| *count > 0 && self.replies.is_unfetched(*root_id))
            .map(|(root_id, _)| *root_id)
            .collect();
        if pending.is_empty() {
            return;
        }

        log::debug!(target: PAGINATION, "eager-loading replies for {} threads", pending.len());
        let results = join_all(pending.iter().map(|root_id| self.load_replies(*root_id))).await;
        for (root_id, result) in pending.iter().zip(results) {
            if let Err(err) = result {
                log::warn!(target: PAGINATION, "eager reply load for {} failed: {}", root_id, err);
            }
        }
    }

    /// Load the next reply page of one thread and bring the root's reply
    /// count in line with the thread total
    pub async fn load_replies(&self, root_id: Uuid) -> ApiResult<LoadOutcome> {
        let outcome = self.replies.load_more(root_id).await?;
        if let LoadOutcome::Loaded { .. } = outcome {
            if let Some(total) = self.replies.total_count(root_id) {
                if let Some(comment) = self.root.lock().get_mut(root_id) {
                    comment.comments_count = total;
                }
            }
        }
        Ok(outcome)
    }

    /// Put a comment at the head of the list without moving the cursor
    pub fn insert_at_head(&self, comment: Comment) -> bool {
        self.root.lock().prepend(comment)
    }

    /// Drop a root comment together with its reply window
    pub fn remove(&self, id: Uuid) -> Option<RemovedComment> {
        let (index, comment) = self.root.lock().remove(id)?;
        let replies = self.replies.remove(id);
        Some(RemovedComment {
            index,
            comment,
            replies,
        })
    }

    /// Undo a [`remove`](Self::remove), clamping the position to the current list
    pub fn reinsert(&self, removed: RemovedComment) {
        let id = removed.comment.id;
        self.root.lock().insert_at(removed.index, removed.comment);
        if let Some(window) = removed.replies {
            self.replies.restore(id, window);
        }
    }

    /// Mutate a root comment or a materialized reply in place
    pub fn update_comment<R>(&self, id: Uuid, f: impl FnOnce(&mut Comment) -> R) -> Option<R> {
        if let Some(comment) = self.root.lock().get_mut(id) {
            return Some(f(comment));
        }
        self.replies.update_reply(id, f)
    }

    /// Shift a root's reply count by `delta`, never below its materialized
    /// replies. Returns the new count.
    pub fn adjust_reply_count(&self, root_id: Uuid, delta: i64) -> Option<u32> {
        let materialized = self.replies.materialized(root_id) as i64;
        let mut root = self.root.lock();
        let comment = root.get_mut(root_id)?;
        let next = (comment.comments_count as i64 + delta).max(materialized).max(0);
        comment.comments_count = next as u32;
        Some(comment.comments_count)
    }

    /// Forget every loaded comment and reply window
    pub fn clear(&self) {
        {
            let mut root = self.root.lock();
            root.reset();
            root.set_total_count(0);
        }
        self.replies.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MockBackend;
    use crate::retry::RetryPolicy;
    use chrono::{Duration, Utc};

    fn store(backend: Arc<MockBackend>, post_id: Uuid, eager_replies: bool) -> CommentStore {
        let pagination = PaginationSettings {
            root_page_size: 10,
            reply_page_size: 2,
            eager_replies,
        };
        CommentStore::new(
            post_id,
            backend,
            &pagination,
            RetryPolicies::uniform(RetryPolicy::once()),
            CancellationToken::new(),
        )
    }

    #[tokio::test]
    async fn test_first_page_seeds_reply_windows() {
        let backend = Arc::new(MockBackend::new());
        let post_id = Uuid::new_v4();
        backend.seed_thread(post_id, 3, 2);
        let store = store(backend.clone(), post_id, false);

        store.load_next_page().await.unwrap();

        assert_eq!(store.len(), 3);
        for comment in store.comments() {
            let window = store.replies().get(comment.id).unwrap();
            assert_eq!(window.total_count(), 2);
            assert!(window.is_empty());
        }
        assert_eq!(backend.calls(CallSite::FetchReplies), 0);
    }

    #[tokio::test]
    async fn test_eager_load_fetches_only_threads_with_replies() {
        let backend = Arc::new(MockBackend::new());
        let post_id = Uuid::new_v4();
        let start = Utc::now() - Duration::hours(1);
        let busy = backend.seed_comment(post_id, "alice", "busy", start);
        backend.seed_comment(post_id, "bob", "quiet", start + Duration::seconds(5));
        backend.seed_reply(&busy, "carol", "one", start + Duration::seconds(1));
        let store = store(backend.clone(), post_id, true);

        store.load_next_page().await.unwrap();

        assert_eq!(backend.calls(CallSite::FetchReplies), 1);
        assert_eq!(store.replies().replies(busy.id).len(), 1);
    }

    #[tokio::test]
    async fn test_remove_drops_reply_window_and_reinsert_restores_it() {
        let backend = Arc::new(MockBackend::new());
        let post_id = Uuid::new_v4();
        backend.seed_thread(post_id, 3, 1);
        let store = store(backend, post_id, true);
        store.load_next_page().await.unwrap();

        let middle = store.comments()[1].clone();
        let removed = store.remove(middle.id).unwrap();
        assert_eq!(removed.index, 1);
        assert!(!store.replies().contains(middle.id));

        store.reinsert(removed);
        assert_eq!(store.comments()[1].id, middle.id);
        assert_eq!(store.replies().replies(middle.id).len(), 1);
    }

    #[tokio::test]
    async fn test_reply_count_never_drops_below_materialized() {
        let backend = Arc::new(MockBackend::new());
        let post_id = Uuid::new_v4();
        backend.seed_thread(post_id, 1, 2);
        let store = store(backend, post_id, true);
        store.load_next_page().await.unwrap();

        let root_id = store.comments()[0].id;
        assert_eq!(store.adjust_reply_count(root_id, -5), Some(2));
        assert_eq!(store.adjust_reply_count(root_id, 1), Some(3));
        assert_eq!(store.adjust_reply_count(Uuid::new_v4(), 1), None);
    }

    #[tokio::test]
    async fn test_update_comment_reaches_replies() {
        let backend = Arc::new(MockBackend::new());
        let post_id = Uuid::new_v4();
        backend.seed_thread(post_id, 1, 1);
        let store = store(backend, post_id, true);
        store.load_next_page().await.unwrap();

        let root_id = store.comments()[0].id;
        let reply_id = store.replies().replies(root_id)[0].id;
        store.update_comment(reply_id, |c| c.is_reported = true).unwrap();

        assert!(store.comment(reply_id).unwrap().is_reported);
        assert!(store.update_comment(Uuid::new_v4(), |_| ()).is_none());
    }
}
