use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// Custom serde module for DateTime to ensure RFC3339 string format
mod datetime_format {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&date.to_rfc3339())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse::<DateTime<Utc>>().map_err(serde::de::Error::custom)
    }
}

/// Denormalized author summary, captured when the comment was written
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorRef {
    pub id: Uuid,
    pub display_name: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
    pub handle: String,
}

/// A root comment or a reply to one
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: Uuid,
    pub post_id: Uuid,
    /// Immediate parent for replies (None for root comments)
    #[serde(default)]
    pub parent_comment_id: Option<Uuid>,
    /// Root ancestor for replies (None for root comments)
    #[serde(default)]
    pub root_comment_id: Option<Uuid>,
    pub author: AuthorRef,
    pub text: String,
    #[serde(with = "datetime_format")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub likes_count: u32,
    #[serde(default)]
    pub is_liked: bool,
    /// Number of direct replies; only meaningful on root comments
    #[serde(default)]
    pub comments_count: u32,
    /// Local-only flag set when the viewer reports the comment
    #[serde(skip)]
    pub is_reported: bool,
}

impl Comment {
    pub fn is_reply(&self) -> bool {
        self.parent_comment_id.is_some()
    }

    /// Key of the reply window this comment lives in, or its own id for roots
    pub fn thread_root_id(&self) -> Uuid {
        self.root_comment_id
            .or(self.parent_comment_id)
            .unwrap_or(self.id)
    }
}

/// One page of root comments
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentsPage {
    pub comments: Vec<Comment>,
    pub has_next_page: bool,
    #[serde(default)]
    pub end_cursor: Option<DateTime<Utc>>,
}

/// One page of replies for a root comment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepliesPage {
    pub replies: Vec<Comment>,
    pub has_next_page: bool,
    #[serde(default)]
    pub end_cursor: Option<DateTime<Utc>>,
    pub total_count: u32,
}

// Request/Response types for API
#[derive(Debug, Serialize, Deserialize)]
pub struct PostCommentRequest {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_comment_id: Option<Uuid>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReportCommentRequest {
    pub reason: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub details: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn author() -> AuthorRef {
        AuthorRef {
            id: Uuid::new_v4(),
            display_name: "Alice".to_string(),
            avatar_url: None,
            handle: "alice".to_string(),
        }
    }

    #[test]
    fn test_comment_wire_shape() {
        let json = serde_json::json!({
            "id": "6f0b2d3c-6a55-4a3e-9a57-0c7a7d3e2b11",
            "post_id": "0b8e2d4f-1c3a-4e6b-8f9a-2d3c4b5a6f70",
            "author": {
                "id": "9d2c1b0a-8f7e-4d6c-b5a4-a3b2c1d0e9f8",
                "display_name": "Alice",
                "handle": "alice"
            },
            "text": "hello",
            "created_at": "2024-05-01T12:00:00+00:00",
            "likes_count": 3,
            "is_liked": true,
            "comments_count": 2
        });

        let comment: Comment = serde_json::from_value(json).unwrap();
        assert!(!comment.is_reply());
        assert_eq!(comment.thread_root_id(), comment.id);
        assert_eq!(comment.likes_count, 3);
        assert!(comment.is_liked);
        assert!(!comment.is_reported);
        assert_eq!(comment.author.avatar_url, None);
    }

    #[test]
    fn test_reply_thread_root_falls_back_to_parent() {
        let parent = Uuid::new_v4();
        let reply = Comment {
            id: Uuid::new_v4(),
            post_id: Uuid::new_v4(),
            parent_comment_id: Some(parent),
            root_comment_id: None,
            author: author(),
            text: "reply".to_string(),
            created_at: Utc::now(),
            likes_count: 0,
            is_liked: false,
            comments_count: 0,
            is_reported: false,
        };

        assert!(reply.is_reply());
        assert_eq!(reply.thread_root_id(), parent);
    }

    #[test]
    fn test_reported_flag_is_not_serialized() {
        let mut comment = Comment {
            id: Uuid::new_v4(),
            post_id: Uuid::new_v4(),
            parent_comment_id: None,
            root_comment_id: None,
            author: author(),
            text: "hi".to_string(),
            created_at: Utc::now(),
            likes_count: 0,
            is_liked: false,
            comments_count: 0,
            is_reported: false,
        };
        comment.is_reported = true;

        let value = serde_json::to_value(&comment).unwrap();
        assert!(value.get("is_reported").is_none());
        assert!(value["created_at"].as_str().is_some());
    }

    #[test]
    fn test_post_request_omits_missing_parent() {
        let request = PostCommentRequest {
            text: "root".to_string(),
            parent_comment_id: None,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert!(value.get("parent_comment_id").is_none());
    }
}
