use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use super::{ApiError, ApiResult, CommentsBackend};
use crate::cursor::PaginationCursor;
use crate::logging::API_CALLS;
use threadline_types::*;

/// HTTP client for the comments backend
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    session_token: Option<String>,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            session_token: None,
        }
    }

    /// Set the session token for authenticated requests
    pub fn set_session_token(&mut self, token: Option<String>) {
        self.session_token = token;
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Helper to add session token to request if available
    fn add_auth_header(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some(token) = &self.session_token {
            req.header("X-Session-Token", token)
        } else {
            req
        }
    }

    /// Build a paginated listing URL
    fn page_url(&self, path: &str, limit: u32, cursor: Option<PaginationCursor>) -> String {
        let mut url = format!("{}{}?limit={}", self.base_url, path, limit);
        if let Some(cursor) = cursor {
            url.push_str("&cursor=");
            url.push_str(&urlencoding::encode(&cursor.encode()));
        }
        url
    }

    /// Map a non-success response onto the error taxonomy
    async fn error_from_response(response: reqwest::Response) -> ApiError {
        let status = response.status();
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());

        // Prefer the structured error body when the server sends one
        let message = match serde_json::from_str::<ErrorResponse>(&error_text) {
            Ok(body) => body.details.unwrap_or(body.error),
            Err(_) if error_text.contains("<html>") || error_text.contains("<!DOCTYPE") => {
                format!("Server returned {} error. Please check the server URL.", status.as_u16())
            }
            Err(_) => error_text,
        };

        match status.as_u16() {
            404 => ApiError::NotFound(message),
            401 => ApiError::Unauthorized(message),
            400 => ApiError::BadRequest(message),
            429 => ApiError::TooManyRequests(message),
            code => ApiError::Api { status: code, message },
        }
    }

    /// Helper to handle API responses
    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> ApiResult<T> {
        if response.status().is_success() {
            let body = response.text().await?;
            Ok(serde_json::from_str(&body)?)
        } else {
            Err(Self::error_from_response(response).await)
        }
    }

    /// Helper for endpoints whose success body carries nothing we need
    async fn handle_empty_response(&self, response: reqwest::Response) -> ApiResult<()> {
        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::error_from_response(response).await)
        }
    }
}

#[async_trait]
impl CommentsBackend for ApiClient {
    async fn fetch_comments(
        &self,
        post_id: Uuid,
        limit: u32,
        cursor: Option<PaginationCursor>,
    ) -> ApiResult<CommentsPage> {
        let url = self.page_url(&format!("/posts/{}/comments", post_id), limit, cursor);
        log::debug!(target: API_CALLS, "GET {}", url);
        let req = self.add_auth_header(self.client.get(&url));
        let response = req.send().await?;
        self.handle_response(response).await
    }

    async fn fetch_replies(
        &self,
        comment_id: Uuid,
        limit: u32,
        cursor: Option<PaginationCursor>,
    ) -> ApiResult<RepliesPage> {
        let url = self.page_url(&format!("/comments/{}/replies", comment_id), limit, cursor);
        log::debug!(target: API_CALLS, "GET {}", url);
        let req = self.add_auth_header(self.client.get(&url));
        let response = req.send().await?;
        self.handle_response(response).await
    }

    async fn post_comment(
        &self,
        post_id: Uuid,
        parent_comment_id: Option<Uuid>,
        text: String,
    ) -> ApiResult<Comment> {
        let url = format!("{}/posts/{}/comments", self.base_url, post_id);
        log::debug!(target: API_CALLS, "POST {} (parent={:?})", url, parent_comment_id);
        let request = PostCommentRequest { text, parent_comment_id };
        let req = self.add_auth_header(self.client.post(&url).json(&request));
        let response = req.send().await?;
        self.handle_response(response).await
    }

    async fn delete_comment(&self, post_id: Uuid, comment_id: Uuid) -> ApiResult<()> {
        let url = format!("{}/posts/{}/comments/{}", self.base_url, post_id, comment_id);
        log::debug!(target: API_CALLS, "DELETE {}", url);
        let req = self.add_auth_header(self.client.delete(&url));
        let response = req.send().await?;
        self.handle_empty_response(response).await
    }

    async fn toggle_like_comment(&self, comment_id: Uuid) -> ApiResult<()> {
        let url = format!("{}/comments/{}/like", self.base_url, comment_id);
        log::debug!(target: API_CALLS, "POST {}", url);
        let req = self.add_auth_header(self.client.post(&url));
        let response = req.send().await?;
        self.handle_empty_response(response).await
    }

    async fn report_comment(&self, comment_id: Uuid, reason: String) -> ApiResult<()> {
        let url = format!("{}/comments/{}/report", self.base_url, comment_id);
        log::debug!(target: API_CALLS, "POST {}", url);
        let request = ReportCommentRequest { reason };
        let req = self.add_auth_header(self.client.post(&url).json(&request));
        let response = req.send().await?;
        self.handle_empty_response(response).await
    }
}

impl Default for ApiClient {
    fn default() -> Self {
        let base_url = std::env::var("THREADLINE_SERVER_URL")
            .unwrap_or_else(|_| "http://127.0.0.1:3000/api".to_string());
        Self::new(base_url)
    }
}
