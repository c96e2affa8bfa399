use anyhow::{Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// Port the backend listens on by default.
pub const DEFAULT_API_BASE: &str = "http://localhost:8392";

/// A selectable model advertised by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub id: String,
    pub label: String,
}

/// Catalog entry used when `/api/models` is unreachable or malformed.
pub fn default_model() -> ModelDescriptor {
    ModelDescriptor {
        id: "yandexgpt/rc".to_string(),
        label: "YandexGPT 5.1 Pro".to_string(),
    }
}

/// One stored turn as the backend reports it.
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryEntry {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub user_id: i64,
    pub prompt: String,
    pub model_id: String,
    pub system_prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatReply {
    pub success: bool,
    #[serde(default)]
    pub response: String,
}

/// A server-side conversation. `id: None` is the main conversation the
/// backend always reports.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatDescriptor {
    pub id: Option<i64>,
    pub title: String,
}

#[derive(Debug, Deserialize)]
struct CreateChatReply {
    success: bool,
    #[serde(default)]
    chat_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct AckReply {
    success: bool,
}

#[derive(Serialize)]
struct CreateChatBody<'a> {
    user_id: i64,
    title: &'a str,
}

#[derive(Serialize)]
struct RenameChatBody<'a> {
    user_id: i64,
    chat_id: i64,
    title: &'a str,
}

/// The remote chat backend, seen from the client side.
///
/// Implementors encapsulate transport and serialization; the controller
/// stays decoupled from any particular HTTP stack, which also lets tests
/// substitute an in-memory fake.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn models(&self) -> Result<Vec<ModelDescriptor>>;
    async fn history(&self, user_id: i64, chat_id: Option<i64>) -> Result<Vec<HistoryEntry>>;
    async fn clear_history(&self, user_id: i64, chat_id: Option<i64>) -> Result<bool>;
    async fn chat(&self, request: ChatRequest) -> Result<ChatReply>;
    async fn chats(&self, user_id: i64) -> Result<Vec<ChatDescriptor>>;
    async fn create_chat(&self, user_id: i64, title: &str) -> Result<Option<i64>>;
    async fn delete_chat(&self, user_id: i64, chat_id: i64) -> Result<bool>;
    async fn rename_chat(&self, user_id: i64, chat_id: i64, title: &str) -> Result<bool>;
}

#[derive(Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn user_query(user_id: i64, chat_id: Option<i64>) -> Vec<(&'static str, String)> {
        let mut query = vec![("user_id", user_id.to_string())];
        if let Some(chat_id) = chat_id {
            query.push(("chat_id", chat_id.to_string()));
        }
        query
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn models(&self) -> Result<Vec<ModelDescriptor>> {
        let response = self.client.get(self.url("/api/models")).send().await?;

        if !response.status().is_success() {
            return Err(anyhow!("Failed to list models: {}", response.status()));
        }

        Ok(response.json().await?)
    }

    async fn history(&self, user_id: i64, chat_id: Option<i64>) -> Result<Vec<HistoryEntry>> {
        let response = self
            .client
            .get(self.url("/api/history"))
            .query(&Self::user_query(user_id, chat_id))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow!("Failed to load history: {}", response.status()));
        }

        Ok(response.json().await?)
    }

    async fn clear_history(&self, user_id: i64, chat_id: Option<i64>) -> Result<bool> {
        let response = self
            .client
            .post(self.url("/api/history/clear"))
            .query(&Self::user_query(user_id, chat_id))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow!("Failed to clear history: {}", response.status()));
        }

        let ack: AckReply = response.json().await?;
        Ok(ack.success)
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatReply> {
        let response = self
            .client
            .post(self.url("/api/chat"))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "Chat request failed with status: {}",
                response.status()
            ));
        }

        Ok(response.json().await?)
    }

    async fn chats(&self, user_id: i64) -> Result<Vec<ChatDescriptor>> {
        let response = self
            .client
            .get(self.url("/api/chats"))
            .query(&Self::user_query(user_id, None))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow!("Failed to list chats: {}", response.status()));
        }

        Ok(response.json().await?)
    }

    async fn create_chat(&self, user_id: i64, title: &str) -> Result<Option<i64>> {
        let response = self
            .client
            .post(self.url("/api/chats/create"))
            .json(&CreateChatBody { user_id, title })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow!("Failed to create chat: {}", response.status()));
        }

        let reply: CreateChatReply = response.json().await?;
        if reply.success {
            Ok(reply.chat_id)
        } else {
            Ok(None)
        }
    }

    async fn delete_chat(&self, user_id: i64, chat_id: i64) -> Result<bool> {
        let response = self
            .client
            .post(self.url("/api/chats/delete"))
            .query(&Self::user_query(user_id, Some(chat_id)))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow!("Failed to delete chat: {}", response.status()));
        }

        let ack: AckReply = response.json().await?;
        Ok(ack.success)
    }

    async fn rename_chat(&self, user_id: i64, chat_id: i64, title: &str) -> Result<bool> {
        let response = self
            .client
            .post(self.url("/api/chats/rename"))
            .json(&RenameChatBody {
                user_id,
                chat_id,
                title,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow!("Failed to rename chat: {}", response.status()));
        }

        let ack: AckReply = response.json().await?;
        Ok(ack.success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_request_omits_absent_chat_id() {
        let request = ChatRequest {
            user_id: 7,
            prompt: "hi".to_string(),
            model_id: "m".to_string(),
            system_prompt: String::new(),
            chat_id: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("chat_id").is_none());

        let request = ChatRequest {
            chat_id: Some(3),
            ..request
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["chat_id"], 3);
    }

    #[test]
    fn chat_reply_tolerates_missing_response() {
        let reply: ChatReply = serde_json::from_str(r#"{"success": false}"#).unwrap();
        assert!(!reply.success);
        assert_eq!(reply.response, "");
    }

    #[test]
    fn chat_descriptor_accepts_null_id() {
        let chats: Vec<ChatDescriptor> = serde_json::from_str(
            r#"[{"id": null, "title": "Main", "is_main": true},
                {"id": 4, "title": "Rust", "created_at": "", "updated_at": ""}]"#,
        )
        .unwrap();
        assert_eq!(chats[0].id, None);
        assert_eq!(chats[1].id, Some(4));
        assert_eq!(chats[1].title, "Rust");
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let backend = HttpBackend::new("http://localhost:8392/");
        assert_eq!(backend.url("/api/models"), "http://localhost:8392/api/models");
    }
}
