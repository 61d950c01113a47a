use chrono::{DateTime, SecondsFormat, Utc};
use threadline_types::Comment;
use uuid::Uuid;

/// Forward-only page boundary: the `(created_at, id)` of the last fetched item.
///
/// Items sort newest first with ties on `created_at` broken by descending id,
/// so the pair is a total order and the next page holds exactly the items
/// that sort after the cursor. Callers treat the token as opaque.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PaginationCursor {
    created_at: DateTime<Utc>,
    id: Uuid,
}

impl PaginationCursor {
    pub fn new(created_at: DateTime<Utc>, id: Uuid) -> Self {
        Self { created_at, id }
    }

    /// Cursor pointing just past the given comment
    pub fn after(comment: &Comment) -> Self {
        Self::new(comment.created_at, comment.id)
    }

    /// Cursor for the tail of a page, or None for an empty page
    pub fn from_page_tail(items: &[Comment]) -> Option<Self> {
        items.last().map(Self::after)
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Whether `comment` belongs to a page fetched with this cursor
    pub fn admits(&self, comment: &Comment) -> bool {
        (comment.created_at, comment.id) < (self.created_at, self.id)
    }

    /// Opaque token for query strings: `<rfc3339>_<uuid>`
    pub fn encode(&self) -> String {
        format!(
            "{}_{}",
            self.created_at.to_rfc3339_opts(SecondsFormat::Nanos, true),
            self.id
        )
    }

    pub fn decode(token: &str) -> Option<Self> {
        let (timestamp, id) = token.rsplit_once('_')?;
        let created_at = timestamp.parse::<DateTime<Utc>>().ok()?;
        let id = Uuid::parse_str(id).ok()?;
        Some(Self::new(created_at, id))
    }
}

impl std::fmt::Display for PaginationCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.encode())
    }
}
