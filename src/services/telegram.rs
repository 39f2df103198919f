use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Outbound side of a chat platform.
#[async_trait::async_trait]
pub trait ChatService: Send + Sync {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<()>;

    /// Fetch the bytes of a file attached to an incoming message.
    async fn download_file(&self, file_id: &str) -> Result<Vec<u8>>;
}

#[derive(Serialize)]
struct SendMessageRequest<'a> {
    chat_id: i64,
    text: &'a str,
}

#[derive(Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    #[serde(default)]
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Deserialize, Default)]
struct TelegramFile {
    #[serde(default)]
    file_path: Option<String>,
}

/// Telegram Bot API client.
pub struct TelegramClient {
    token: String,
    base_url: String,
    client: reqwest::Client,
}

impl TelegramClient {
    pub fn new(token: String) -> Self {
        Self {
            token,
            base_url: "https://api.telegram.org".to_string(),
            client: reqwest::Client::new(),
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.base_url, self.token, method)
    }

    fn file_url(&self, file_path: &str) -> String {
        format!("{}/file/bot{}/{}", self.base_url, self.token, file_path)
    }

    async fn get_file_path(&self, file_id: &str) -> Result<String> {
        let response = self
            .client
            .get(self.method_url("getFile"))
            .query(&[("file_id", file_id)])
            .send()
            .await?;

        let body: ApiResponse<TelegramFile> = response.json().await?;
        if !body.ok {
            anyhow::bail!(
                "Telegram getFile failed: {}",
                body.description.unwrap_or_else(|| "unknown error".to_string())
            );
        }

        body.result
            .and_then(|f| f.file_path)
            .ok_or_else(|| anyhow::anyhow!("Telegram getFile returned no file_path"))
    }
}

#[async_trait::async_trait]
impl ChatService for TelegramClient {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<()> {
        log::info!("📤 Sending message to chat {}", chat_id);

        let response = self
            .client
            .post(self.method_url("sendMessage"))
            .json(&SendMessageRequest { chat_id, text })
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("Telegram API error: {}", error_text);
        }

        Ok(())
    }

    async fn download_file(&self, file_id: &str) -> Result<Vec<u8>> {
        let file_path = self.get_file_path(file_id).await?;
        log::debug!("📥 Downloading Telegram file {}", file_path);

        let response = self.client.get(self.file_url(&file_path)).send().await?;
        if !response.status().is_success() {
            anyhow::bail!("Failed to download file: HTTP {}", response.status());
        }

        let bytes = response.bytes().await?;
        log::info!("📸 Downloaded {} bytes", bytes.len());
        Ok(bytes.to_vec())
    }
}
