use std::sync::atomic::{AtomicU64, Ordering};

use threadline_types::{Comment, CommentsPage, RepliesPage};
use uuid::Uuid;

use crate::cursor::PaginationCursor;

/// Generations are unique across all windows, so a ticket can never match a
/// window that replaced the one it was issued for.
fn next_generation() -> u64 {
    static NEXT: AtomicU64 = AtomicU64::new(1);
    NEXT.fetch_add(1, Ordering::Relaxed)
}

/// A fetched page, normalized across root and reply listings
#[derive(Debug, Clone)]
pub struct Page {
    pub items: Vec<Comment>,
    pub has_next_page: bool,
    /// Server-reported total, when the listing provides one
    pub total_count: Option<u32>,
}

impl From<CommentsPage> for Page {
    fn from(page: CommentsPage) -> Self {
        Self {
            items: page.comments,
            has_next_page: page.has_next_page,
            total_count: None,
        }
    }
}

impl From<RepliesPage> for Page {
    fn from(page: RepliesPage) -> Self {
        Self {
            items: page.replies,
            has_next_page: page.has_next_page,
            total_count: Some(page.total_count),
        }
    }
}

/// Permission to run one fetch against a window, tagged with the window
/// generation it was issued under
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTicket {
    generation: u64,
    cursor: Option<PaginationCursor>,
    limit: u32,
    first_page: bool,
}

impl FetchTicket {
    pub fn cursor(&self) -> Option<PaginationCursor> {
        self.cursor
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_first_page(&self) -> bool {
        self.first_page
    }
}

/// What a load request ended up doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// A page was applied to the window
    Loaded { added: usize, has_next_page: bool },
    /// A fetch was already in flight or there are no more pages
    Skipped,
    /// The response belonged to an older generation and was dropped
    Stale,
    /// The owning view closed before the response arrived
    Cancelled,
    /// No reply window exists for the requested root comment
    NoWindow,
}

/// Pagination state for one list: the root comments or one thread's replies
#[derive(Debug, Clone)]
pub struct PaginationWindow {
    items: Vec<Comment>,
    cursor: Option<PaginationCursor>,
    has_next_page: bool,
    loading: bool,
    total_count: u32,
    generation: u64,
}

impl PaginationWindow {
    pub fn new(total_count: u32) -> Self {
        Self {
            items: Vec::new(),
            cursor: None,
            has_next_page: true,
            loading: false,
            total_count,
            generation: next_generation(),
        }
    }

    pub fn items(&self) -> &[Comment] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn cursor(&self) -> Option<PaginationCursor> {
        self.cursor
    }

    pub fn has_next_page(&self) -> bool {
        self.has_next_page
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn total_count(&self) -> u32 {
        self.total_count
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.items.iter().any(|c| c.id == id)
    }

    pub fn get(&self, id: Uuid) -> Option<&Comment> {
        self.items.iter().find(|c| c.id == id)
    }

    pub fn get_mut(&mut self, id: Uuid) -> Option<&mut Comment> {
        self.items.iter_mut().find(|c| c.id == id)
    }

    /// Claim the window for a next-page fetch. Returns None while another
    /// fetch is in flight or once the last page has been seen.
    pub fn begin_fetch(&mut self, limit: u32) -> Option<FetchTicket> {
        if self.loading || !self.has_next_page {
            return None;
        }
        self.loading = true;
        Some(FetchTicket {
            generation: self.generation,
            cursor: self.cursor,
            limit,
            first_page: self.cursor.is_none(),
        })
    }

    /// Start over from the first page, ignoring the in-flight guard. Any
    /// ticket issued before this call becomes stale.
    pub fn begin_refresh(&mut self, limit: u32) -> FetchTicket {
        self.generation = next_generation();
        self.cursor = None;
        self.has_next_page = true;
        self.loading = true;
        FetchTicket {
            generation: self.generation,
            cursor: None,
            limit,
            first_page: true,
        }
    }

    /// Apply a fetched page. First pages replace the items, later pages
    /// append whatever is not already present.
    pub fn complete(&mut self, ticket: FetchTicket, page: Page) -> LoadOutcome {
        if ticket.generation != self.generation {
            return LoadOutcome::Stale;
        }
        self.loading = false;

        let returned = page.items.len();
        let cursor = PaginationCursor::from_page_tail(&page.items);
        if ticket.first_page {
            self.items.clear();
        }
        let added = self.append_unique(page.items);

        self.cursor = cursor;
        self.has_next_page = page.has_next_page && returned >= ticket.limit as usize;
        self.total_count = page
            .total_count
            .unwrap_or(self.total_count)
            .max(self.items.len() as u32);

        LoadOutcome::Loaded {
            added,
            has_next_page: self.has_next_page,
        }
    }

    /// Release the guard after a failed or abandoned fetch. Cursor and
    /// `has_next_page` stay put so a retry resumes from the same point.
    pub fn fail(&mut self, ticket: FetchTicket) -> bool {
        if ticket.generation != self.generation {
            return false;
        }
        self.loading = false;
        true
    }

    /// Drop the claim of whatever fetch is in flight; its response will be
    /// treated as stale
    pub fn abandon_fetch(&mut self) {
        if self.loading {
            self.generation = next_generation();
            self.loading = false;
        }
    }

    fn append_unique(&mut self, items: Vec<Comment>) -> usize {
        let mut added = 0;
        for item in items {
            if !self.contains(item.id) {
                self.items.push(item);
                added += 1;
            }
        }
        added
    }

    /// Insert at the head without moving the cursor. Returns false if the
    /// comment is already present.
    pub fn prepend(&mut self, comment: Comment) -> bool {
        if self.contains(comment.id) {
            return false;
        }
        self.items.insert(0, comment);
        self.total_count += 1;
        true
    }

    /// Put a comment back at `index` (clamped to the current length)
    pub fn insert_at(&mut self, index: usize, comment: Comment) {
        if self.contains(comment.id) {
            return;
        }
        let index = index.min(self.items.len());
        self.items.insert(index, comment);
        self.total_count += 1;
    }

    /// Remove by id, returning the old position and the comment
    pub fn remove(&mut self, id: Uuid) -> Option<(usize, Comment)> {
        let index = self.items.iter().position(|c| c.id == id)?;
        let comment = self.items.remove(index);
        self.total_count = self.total_count.saturating_sub(1);
        Some((index, comment))
    }

    /// Adopt a better-known total, never below what is materialized
    pub fn set_total_count(&mut self, total: u32) {
        self.total_count = total.max(self.items.len() as u32);
    }

    /// Forget everything and go back to the never-fetched state
    pub fn reset(&mut self) {
        self.generation = next_generation();
        self.items.clear();
        self.cursor = None;
        self.has_next_page = true;
        self.loading = false;
    }
}

impl Default for PaginationWindow {
    fn default() -> Self {
        Self::new(0)
    }
}
