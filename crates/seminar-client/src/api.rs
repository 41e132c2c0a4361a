//! Authenticated HTTP client for the backend's JSON endpoints.
//!
//! Three surfaces: the message write endpoint, the message read endpoint,
//! and the violation persistence endpoint. HTTP failures are mapped onto the
//! core error taxonomy at this boundary.

use std::future::Future;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use seminar_chat::{ChatError, MessageDraft, MessageReader, MessageWriter, WriteReceipt};
use seminar_proctor::QuizSession;
use seminar_shared::protocol::MessagePayload;
use seminar_shared::types::{MessageKind, RoomId};

/// Errors from the backend API boundary.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Not authenticated")]
    Unauthenticated,

    #[error("Server returned status {0}")]
    Status(u16),
}

impl From<ApiError> for ChatError {
    fn from(e: ApiError) -> Self {
        match e {
            ApiError::Unauthenticated => ChatError::Unauthenticated,
            other => ChatError::Transient(other.to_string()),
        }
    }
}

/// Persists quiz session summaries for later staff review.
pub trait ViolationSink: Send + Sync + 'static {
    fn submit(&self, session: &QuizSession) -> impl Future<Output = Result<(), ApiError>> + Send;
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    content: &'a str,
    message_type: MessageKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_to: Option<Uuid>,
    correlation_id: Uuid,
}

#[derive(Debug, Deserialize)]
struct SendMessageResponse {
    message: MessagePayload,
    #[serde(default)]
    secondary_message: Option<MessagePayload>,
}

/// Client for the backend HTTP API.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            token,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    fn check(resp: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        match resp.status() {
            s if s.is_success() => Ok(resp),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(ApiError::Unauthenticated),
            s => Err(ApiError::Status(s.as_u16())),
        }
    }

    /// `POST /rooms/{room}/messages`
    pub async fn send_message(
        &self,
        room: RoomId,
        draft: &MessageDraft,
    ) -> Result<WriteReceipt, ApiError> {
        let request = SendMessageRequest {
            content: &draft.content,
            message_type: draft.kind,
            reply_to: draft.reply_to,
            correlation_id: draft.correlation_id,
        };

        let resp = self
            .authorize(self.http.post(self.url(&format!("/rooms/{}/messages", room.0))))
            .json(&request)
            .send()
            .await?;
        let body: SendMessageResponse = Self::check(resp)?.json().await?;

        Ok(WriteReceipt {
            message: body.message,
            secondary: body.secondary_message,
        })
    }

    /// `GET /rooms/{room}/messages?limit=N`, ascending by timestamp.
    pub async fn fetch_messages(
        &self,
        room: RoomId,
        limit: u32,
    ) -> Result<Vec<MessagePayload>, ApiError> {
        let resp = self
            .authorize(
                self.http
                    .get(self.url(&format!("/rooms/{}/messages", room.0)))
                    .query(&[("limit", limit)]),
            )
            .send()
            .await?;
        Ok(Self::check(resp)?.json().await?)
    }

    /// `POST /quiz-sessions`
    pub async fn submit_session(&self, session: &QuizSession) -> Result<(), ApiError> {
        let resp = self
            .authorize(self.http.post(self.url("/quiz-sessions")))
            .json(session)
            .send()
            .await?;
        Self::check(resp)?;
        Ok(())
    }
}

impl MessageWriter for ApiClient {
    async fn write(&self, room: RoomId, draft: MessageDraft) -> Result<WriteReceipt, ChatError> {
        Ok(self.send_message(room, &draft).await?)
    }
}

impl MessageReader for ApiClient {
    async fn fetch(&self, room: RoomId, limit: u32) -> Result<Vec<MessagePayload>, ChatError> {
        Ok(self.fetch_messages(room, limit).await?)
    }
}

impl ViolationSink for ApiClient {
    async fn submit(&self, session: &QuizSession) -> Result<(), ApiError> {
        self.submit_session(session).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joins_without_double_slash() {
        let client = ApiClient::new("http://localhost:8080/", None);
        assert_eq!(
            client.url("/quiz-sessions"),
            "http://localhost:8080/quiz-sessions"
        );
    }

    #[test]
    fn test_send_request_shape() {
        let draft = MessageDraft {
            correlation_id: Uuid::new_v4(),
            kind: MessageKind::Text,
            content: "salut".to_string(),
            reply_to: None,
        };
        let request = SendMessageRequest {
            content: &draft.content,
            message_type: draft.kind,
            reply_to: draft.reply_to,
            correlation_id: draft.correlation_id,
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["content"], "salut");
        assert_eq!(json["message_type"], "text");
        assert_eq!(json["correlation_id"], draft.correlation_id.to_string());
        assert!(json.get("reply_to").is_none());
    }

    #[test]
    fn test_auth_failure_is_not_retryable() {
        let err: ChatError = ApiError::Unauthenticated.into();
        assert!(matches!(err, ChatError::Unauthenticated));
        assert!(!err.is_retryable());

        let err: ChatError = ApiError::Status(503).into();
        assert!(err.is_retryable());
    }
}
