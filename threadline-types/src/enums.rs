use serde::{Deserialize, Serialize};

/// The user actions the mutation coordinator knows how to apply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    Like,
    Unlike,
    PostComment,
    PostReply,
    Delete,
    Report,
}

impl MutationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MutationKind::Like => "like",
            MutationKind::Unlike => "unlike",
            MutationKind::PostComment => "post_comment",
            MutationKind::PostReply => "post_reply",
            MutationKind::Delete => "delete",
            MutationKind::Report => "report",
        }
    }

    /// Whether a failed backend call reverses the local change
    pub fn has_rollback(&self) -> bool {
        !matches!(self, MutationKind::Report)
    }
}

impl std::fmt::Display for MutationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_name_matches_as_str() {
        for kind in [
            MutationKind::Like,
            MutationKind::Unlike,
            MutationKind::PostComment,
            MutationKind::PostReply,
            MutationKind::Delete,
            MutationKind::Report,
        ] {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
            assert_eq!(kind.to_string(), kind.as_str());
        }
    }

    #[test]
    fn test_only_report_lacks_rollback() {
        assert!(!MutationKind::Report.has_rollback());
        assert!(MutationKind::Delete.has_rollback());
        assert!(MutationKind::Like.has_rollback());
    }
}
