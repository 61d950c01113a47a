use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::api::{ApiResult, CommentsBackend};
use crate::logging::PAGINATION;
use crate::retry::{CallSite, RetryPolicies};
use crate::scope::until_cancelled;
use crate::window::{LoadOutcome, PaginationWindow};
use threadline_types::Comment;

/// One reply window per root comment, each paginated on its own.
///
/// Windows are created explicitly with [`ensure`](Self::ensure); reading or
/// loading a root that was never ensured is a reported branch, not an
/// implicit default.
pub struct ReplyStateManager {
    backend: Arc<dyn CommentsBackend>,
    retry: RetryPolicies,
    scope: CancellationToken,
    page_size: u32,
    windows: Mutex<HashMap<Uuid, PaginationWindow>>,
}

impl ReplyStateManager {
    pub fn new(
        backend: Arc<dyn CommentsBackend>,
        page_size: u32,
        retry: RetryPolicies,
        scope: CancellationToken,
    ) -> Self {
        Self {
            backend,
            retry,
            scope,
            page_size: page_size.max(1),
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Create an empty window for `root_id` unless one exists. Returns true
    /// when a window was created.
    pub fn ensure(&self, root_id: Uuid, initial_count: u32) -> bool {
        let mut windows = self.windows.lock();
        if windows.contains_key(&root_id) {
            return false;
        }
        windows.insert(root_id, PaginationWindow::new(initial_count));
        true
    }

    pub fn contains(&self, root_id: Uuid) -> bool {
        self.windows.lock().contains_key(&root_id)
    }

    /// Snapshot of one window
    pub fn get(&self, root_id: Uuid) -> Option<PaginationWindow> {
        self.windows.lock().get(&root_id).cloned()
    }

    /// Materialized replies of one thread, newest first
    pub fn replies(&self, root_id: Uuid) -> Vec<Comment> {
        self.windows
            .lock()
            .get(&root_id)
            .map(|w| w.items().to_vec())
            .unwrap_or_default()
    }

    pub fn materialized(&self, root_id: Uuid) -> usize {
        self.windows.lock().get(&root_id).map_or(0, |w| w.len())
    }

    /// True when the thread has a window whose first page was never fetched
    pub fn is_unfetched(&self, root_id: Uuid) -> bool {
        self.windows.lock().get(&root_id).is_some_and(|w| {
            w.cursor().is_none() && w.has_next_page() && !w.is_loading()
        })
    }

    pub fn total_count(&self, root_id: Uuid) -> Option<u32> {
        self.windows.lock().get(&root_id).map(|w| w.total_count())
    }

    /// Adopt a server-reported reply total for one thread. Returns the total
    /// actually kept, which never drops below the materialized replies.
    pub fn set_total_count(&self, root_id: Uuid, total: u32) -> Option<u32> {
        let mut windows = self.windows.lock();
        let window = windows.get_mut(&root_id)?;
        window.set_total_count(total);
        Some(window.total_count())
    }

    /// Drop a thread's window, returning it
    pub fn remove(&self, root_id: Uuid) -> Option<PaginationWindow> {
        self.windows.lock().remove(&root_id)
    }

    /// Put back a window taken out with [`remove`](Self::remove). A fetch
    /// that was in flight when it was removed no longer owns it.
    pub fn restore(&self, root_id: Uuid, mut window: PaginationWindow) {
        window.abandon_fetch();
        self.windows.lock().insert(root_id, window);
    }

    pub fn clear(&self) {
        self.windows.lock().clear();
    }

    /// Replace all windows with fresh ones for the listed roots
    pub fn reseed(&self, roots: &[(Uuid, u32)]) {
        let mut windows = self.windows.lock();
        windows.clear();
        for (root_id, count) in roots {
            windows.insert(*root_id, PaginationWindow::new(*count));
        }
    }

    /// Fetch the next reply page for `root_id`.
    ///
    /// On failure the guard is released and the cursor is left where it was,
    /// so calling again resumes from the same point.
    pub async fn load_more(&self, root_id: Uuid) -> ApiResult<LoadOutcome> {
        let ticket = {
            let mut windows = self.windows.lock();
            let Some(window) = windows.get_mut(&root_id) else {
                log::debug!(target: PAGINATION, "no reply window for {}", root_id);
                return Ok(LoadOutcome::NoWindow);
            };
            match window.begin_fetch(self.page_size) {
                Some(ticket) => ticket,
                None => return Ok(LoadOutcome::Skipped),
            }
        };

        log::debug!(
            target: PAGINATION,
            "loading replies for {} (cursor={:?})",
            root_id,
            ticket.cursor()
        );

        let backend = self.backend.as_ref();
        let fetched = until_cancelled(
            &self.scope,
            self.retry.run(CallSite::FetchReplies, || {
                backend.fetch_replies(root_id, ticket.limit(), ticket.cursor())
            }),
        )
        .await;

        let mut windows = self.windows.lock();
        let Some(result) = fetched else {
            if let Some(window) = windows.get_mut(&root_id) {
                window.fail(ticket);
            }
            log::debug!(target: PAGINATION, "reply load for {} cancelled", root_id);
            return Ok(LoadOutcome::Cancelled);
        };
        let Some(window) = windows.get_mut(&root_id) else {
            log::debug!(target: PAGINATION, "reply window for {} went away mid-load", root_id);
            return Ok(LoadOutcome::NoWindow);
        };

        match result {
            Ok(page) => {
                let outcome = window.complete(ticket, page.into());
                if outcome == LoadOutcome::Stale {
                    log::debug!(target: PAGINATION, "dropped stale reply page for {}", root_id);
                }
                Ok(outcome)
            }
            Err(err) => {
                window.fail(ticket);
                log::warn!(target: PAGINATION, "loading replies for {} failed: {}", root_id, err);
                Err(err)
            }
        }
    }

    /// Insert a confirmed reply at the head of its thread and count it.
    /// Returns false if the thread has no window.
    pub fn prepend_optimistic(&self, root_id: Uuid, reply: Comment) -> bool {
        match self.windows.lock().get_mut(&root_id) {
            Some(window) => {
                window.prepend(reply);
                true
            }
            None => false,
        }
    }

    /// Locate a reply in any window: (root id, position, reply)
    pub fn find_reply(&self, reply_id: Uuid) -> Option<(Uuid, usize, Comment)> {
        self.windows.lock().iter().find_map(|(root_id, window)| {
            window
                .items()
                .iter()
                .position(|c| c.id == reply_id)
                .map(|index| (*root_id, index, window.items()[index].clone()))
        })
    }

    /// Remove a reply from whichever window holds it
    pub fn remove_reply(&self, reply_id: Uuid) -> Option<(Uuid, usize, Comment)> {
        let mut windows = self.windows.lock();
        windows.iter_mut().find_map(|(root_id, window)| {
            window
                .remove(reply_id)
                .map(|(index, reply)| (*root_id, index, reply))
        })
    }

    pub fn insert_reply_at(&self, root_id: Uuid, index: usize, reply: Comment) -> bool {
        match self.windows.lock().get_mut(&root_id) {
            Some(window) => {
                window.insert_at(index, reply);
                true
            }
            None => false,
        }
    }

    /// Mutate a reply in place, wherever it lives
    pub fn update_reply<R>(&self, reply_id: Uuid, f: impl FnOnce(&mut Comment) -> R) -> Option<R> {
        let mut windows = self.windows.lock();
        windows
            .values_mut()
            .find_map(|window| window.get_mut(reply_id))
            .map(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ApiError, MockBackend};
    use crate::retry::RetryPolicy;
    use chrono::{Duration, Utc};

    fn manager(backend: Arc<MockBackend>, page_size: u32) -> ReplyStateManager {
        ReplyStateManager::new(
            backend,
            page_size,
            RetryPolicies::uniform(RetryPolicy::once()),
            CancellationToken::new(),
        )
    }

    fn thread(backend: &MockBackend, replies: i64) -> Comment {
        let start = Utc::now() - Duration::hours(1);
        let root = backend.seed_comment(Uuid::new_v4(), "alice", "root", start);
        for n in 0..replies {
            backend.seed_reply(&root, "bob", &format!("reply {}", n), start + Duration::seconds(n + 1));
        }
        root
    }

    #[test]
    fn test_ensure_is_idempotent() {
        let replies = manager(Arc::new(MockBackend::new()), 5);
        let root_id = Uuid::new_v4();

        assert!(replies.ensure(root_id, 4));
        assert!(!replies.ensure(root_id, 9));
        let window = replies.get(root_id).unwrap();
        assert_eq!(window.total_count(), 4);
        assert!(window.is_empty());
        assert!(window.has_next_page());
        assert_eq!(window.cursor(), None);
    }

    #[tokio::test]
    async fn test_missing_window_is_reported() {
        let backend = Arc::new(MockBackend::new());
        let replies = manager(backend.clone(), 5);

        let outcome = replies.load_more(Uuid::new_v4()).await.unwrap();
        assert_eq!(outcome, LoadOutcome::NoWindow);
        assert_eq!(backend.calls(CallSite::FetchReplies), 0);
    }

    #[tokio::test]
    async fn test_failed_load_resumes_from_same_cursor() {
        let backend = Arc::new(MockBackend::new());
        let root = thread(&backend, 3);
        let replies = manager(backend.clone(), 2);
        replies.ensure(root.id, 3);

        replies.load_more(root.id).await.unwrap();
        let cursor = replies.get(root.id).unwrap().cursor();

        backend.fail_next(CallSite::FetchReplies, 1, || ApiError::Api {
            status: 503,
            message: "unavailable".to_string(),
        });
        assert!(replies.load_more(root.id).await.is_err());
        let window = replies.get(root.id).unwrap();
        assert!(!window.is_loading());
        assert!(window.has_next_page());
        assert_eq!(window.cursor(), cursor);

        let outcome = replies.load_more(root.id).await.unwrap();
        assert_eq!(outcome, LoadOutcome::Loaded { added: 1, has_next_page: false });
        assert_eq!(replies.materialized(root.id), 3);
    }

    #[tokio::test]
    async fn test_second_load_while_in_flight_is_skipped() {
        let backend = Arc::new(MockBackend::new());
        let root = thread(&backend, 4);
        let replies = manager(backend.clone(), 2);
        replies.ensure(root.id, 4);

        backend.hold();
        let (first, second) = tokio::join!(replies.load_more(root.id), async {
            let outcome = replies.load_more(root.id).await;
            backend.release(1);
            outcome
        });

        assert_eq!(first.unwrap(), LoadOutcome::Loaded { added: 2, has_next_page: true });
        assert_eq!(second.unwrap(), LoadOutcome::Skipped);
        assert_eq!(backend.calls(CallSite::FetchReplies), 1);
        assert_eq!(replies.materialized(root.id), 2);
    }

    #[tokio::test]
    async fn test_restored_window_drops_in_flight_claim() {
        let backend = Arc::new(MockBackend::new());
        let root = thread(&backend, 1);
        let replies = manager(backend.clone(), 5);
        replies.ensure(root.id, 1);

        backend.hold();
        let (outcome, _) = tokio::join!(replies.load_more(root.id), async {
            let snapshot = replies.remove(root.id).unwrap();
            assert!(snapshot.is_loading());
            replies.restore(root.id, snapshot);
            backend.release(1);
        });

        assert_eq!(outcome.unwrap(), LoadOutcome::Stale);
        let window = replies.get(root.id).unwrap();
        assert!(!window.is_loading());
        assert!(window.is_empty());
    }
}
