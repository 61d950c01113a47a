//! Threaded comment cache and optimistic mutation engine for a post's comment
//! section.
//!
//! A [`CommentView`] owns one post's root-comment window, a reply window per
//! root comment, the compose input and the mutation coordinator, all under a
//! single cancellation scope.

pub mod api;
pub mod compose;
pub mod config;
pub mod cursor;
pub mod logging;
pub mod mutation;
pub mod replies;
pub mod retry;
pub mod scope;
pub mod store;
pub mod tags;
pub mod view;
pub mod window;

pub use api::{ApiClient, ApiError, ApiResult, CommentsBackend, MockBackend};
pub use compose::{ComposeController, ComposeError, DraftPreview, ReplyTarget, Submission};
pub use config::Settings;
pub use cursor::PaginationCursor;
pub use mutation::{MutationCoordinator, MutationError, MutationOutcome, OptimisticMutation, RollbackReason};
pub use replies::ReplyStateManager;
pub use retry::{CallSite, RetryPolicies, RetryPolicy};
pub use store::CommentStore;
pub use tags::Tagged;
pub use view::CommentView;
pub use window::{LoadOutcome, PaginationWindow};
