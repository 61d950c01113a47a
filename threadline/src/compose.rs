use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use thiserror::Error;
use uuid::Uuid;

use crate::tags;
use threadline_types::{AuthorRef, Comment};

static SHORTCODE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r":([a-z0-9_+\-]{1,40}):").expect("Failed to compile shortcode regex")
});

/// Replace known `:shortcode:` tokens with their emoji; unknown ones are kept
pub fn expand_shortcodes(text: &str) -> String {
    SHORTCODE_REGEX
        .replace_all(text, |caps: &Captures| match emojis::get_by_shortcode(&caps[1]) {
            Some(emoji) => emoji.as_str().to_string(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ComposeError {
    #[error("Comment text is empty")]
    Empty,
    #[error("Comment is {count} characters, the limit is {max}")]
    TooLong { count: usize, max: usize },
}

/// Who a reply is addressed to. Replies are one level deep, so the thread is
/// always a root comment even when the user replied to a reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyTarget {
    pub root_comment_id: Uuid,
    pub replied_to: Uuid,
    pub handle: String,
}

/// A validated draft handed over for posting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub text: String,
    pub reply_target: Option<ReplyTarget>,
}

impl Submission {
    pub fn parent_comment_id(&self) -> Option<Uuid> {
        self.reply_target.as_ref().map(|t| t.root_comment_id)
    }
}

/// Local-only rendering of the draft while it is being submitted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftPreview {
    pub author: AuthorRef,
    pub text: String,
    pub reply_target: Option<ReplyTarget>,
    pub char_count: usize,
    pub remaining: i64,
}

/// Draft text and reply target for the compose input
#[derive(Debug, Clone)]
pub struct ComposeController {
    draft: String,
    reply_target: Option<ReplyTarget>,
    max_chars: usize,
}

impl ComposeController {
    pub fn new(max_chars: usize) -> Self {
        Self {
            draft: String::new(),
            reply_target: None,
            max_chars,
        }
    }

    pub fn text(&self) -> &str {
        &self.draft
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.draft = text.into();
    }

    pub fn push_str(&mut self, text: &str) {
        self.draft.push_str(text);
    }

    pub fn is_empty(&self) -> bool {
        self.draft.trim().is_empty()
    }

    /// Characters the draft will occupy once shortcodes are expanded
    pub fn char_count(&self) -> usize {
        expand_shortcodes(&self.draft).chars().count()
    }

    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    pub fn reply_target(&self) -> Option<&ReplyTarget> {
        self.reply_target.as_ref()
    }

    /// Address the draft to `comment`. Replying to a reply stays in the same
    /// thread and seeds an `@handle` for the person replied to.
    pub fn reply_to(&mut self, comment: &Comment) {
        let handle = comment.author.handle.clone();
        if comment.is_reply() && !tags::mentions(&self.draft, &handle) {
            self.draft = format!("@{} {}", handle, self.draft.trim_start());
        }
        self.reply_target = Some(ReplyTarget {
            root_comment_id: comment.thread_root_id(),
            replied_to: comment.id,
            handle,
        });
    }

    pub fn cancel_reply(&mut self) {
        self.reply_target = None;
    }

    pub fn clear(&mut self) {
        self.draft.clear();
        self.reply_target = None;
    }

    /// Validate the current draft and hand it over, leaving the input empty
    pub fn take_submission(&mut self) -> Result<Submission, ComposeError> {
        let submission = self.prepare(&self.draft, self.reply_target.clone())?;
        self.clear();
        Ok(submission)
    }

    /// Validate arbitrary text against the same rules as the draft
    pub fn prepare(&self, text: &str, reply_target: Option<ReplyTarget>) -> Result<Submission, ComposeError> {
        let text = expand_shortcodes(text.trim());
        if text.is_empty() {
            return Err(ComposeError::Empty);
        }
        let count = text.chars().count();
        if count > self.max_chars {
            return Err(ComposeError::TooLong {
                count,
                max: self.max_chars,
            });
        }
        Ok(Submission { text, reply_target })
    }

    /// Put a failed submission back, unless the user already started a new
    /// draft. Returns whether it was restored.
    pub fn restore(&mut self, submission: Submission) -> bool {
        if !self.is_empty() {
            return false;
        }
        self.draft = submission.text;
        self.reply_target = submission.reply_target;
        true
    }

    pub fn preview(&self, viewer: &AuthorRef) -> DraftPreview {
        let text = expand_shortcodes(&self.draft);
        let char_count = text.chars().count();
        DraftPreview {
            author: viewer.clone(),
            text,
            reply_target: self.reply_target.clone(),
            char_count,
            remaining: self.max_chars as i64 - char_count as i64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn comment(handle: &str, parent: Option<Uuid>) -> Comment {
        Comment {
            id: Uuid::new_v4(),
            post_id: Uuid::new_v4(),
            parent_comment_id: parent,
            root_comment_id: parent,
            author: AuthorRef {
                id: Uuid::new_v4(),
                display_name: handle.to_string(),
                avatar_url: None,
                handle: handle.to_string(),
            },
            text: "hello".to_string(),
            created_at: Utc::now(),
            likes_count: 0,
            is_liked: false,
            comments_count: 0,
            is_reported: false,
        }
    }

    #[test]
    fn test_shortcodes_expand_and_count_as_emoji() {
        assert_eq!(expand_shortcodes("nice :rocket:"), "nice 🚀");
        assert_eq!(expand_shortcodes("keep :not_an_emoji_at_all:"), "keep :not_an_emoji_at_all:");

        let mut compose = ComposeController::new(280);
        compose.set_text(":rocket:");
        assert_eq!(compose.char_count(), 1);
    }

    #[test]
    fn test_take_submission_validates_and_clears() {
        let mut compose = ComposeController::new(5);
        compose.set_text("   ");
        assert_eq!(compose.take_submission(), Err(ComposeError::Empty));

        compose.set_text("too long");
        assert_eq!(compose.take_submission(), Err(ComposeError::TooLong { count: 8, max: 5 }));
        assert_eq!(compose.text(), "too long");

        compose.set_text(" hi ");
        let submission = compose.take_submission().unwrap();
        assert_eq!(submission.text, "hi");
        assert!(compose.is_empty());
    }

    #[test]
    fn test_reply_to_reply_targets_root_and_seeds_handle() {
        let root = comment("alice", None);
        let reply = comment("bob", Some(root.id));
        let mut compose = ComposeController::new(280);

        compose.reply_to(&root);
        assert_eq!(compose.text(), "");
        assert_eq!(compose.reply_target().unwrap().root_comment_id, root.id);

        compose.reply_to(&reply);
        compose.reply_to(&reply);
        assert_eq!(compose.text(), "@bob ");
        let target = compose.reply_target().unwrap();
        assert_eq!(target.root_comment_id, root.id);
        assert_eq!(target.replied_to, reply.id);
    }

    #[test]
    fn test_restore_does_not_clobber_new_draft() {
        let mut compose = ComposeController::new(280);
        compose.set_text("first");
        let submission = compose.take_submission().unwrap();

        compose.set_text("second");
        assert!(!compose.restore(submission.clone()));
        assert_eq!(compose.text(), "second");

        compose.clear();
        assert!(compose.restore(submission));
        assert_eq!(compose.text(), "first");
    }

    #[test]
    fn test_preview_reports_remaining_characters() {
        let viewer = comment("viewer", None).author;
        let mut compose = ComposeController::new(10);
        compose.set_text("hello");

        let preview = compose.preview(&viewer);
        assert_eq!(preview.author, viewer);
        assert_eq!(preview.remaining, 5);
    }
}
