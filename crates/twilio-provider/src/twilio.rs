//! Twilio REST API client

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Response, Url};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::config::ProviderConfig;
use crate::error::{ProviderError, Result};

/// Parameters the request builder always sets itself
const RESERVED_PARAMS: [&str; 3] = ["To", "From", "Body"];

/// Twilio API client
#[derive(Debug, Clone)]
pub struct TwilioClient {
    client: Client,
    account_sid: String,
    auth_token: String,
    base_url: String,
}

/// Message-create request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageRequest {
    pub to: String,
    pub from: String,
    pub body: String,
    pub media_url: Vec<String>,
    /// Extra Twilio parameters passed through as-is (e.g. `StatusCallback`)
    pub options: BTreeMap<String, String>,
}

impl MessageRequest {
    /// Create a text message request
    pub fn new(to: impl Into<String>, from: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            from: from.into(),
            body: body.into(),
            ..Self::default()
        }
    }

    /// Attach a media URL
    pub fn with_media_url(mut self, url: impl Into<String>) -> Self {
        self.media_url.push(url.into());
        self
    }

    /// Add passthrough parameters
    pub fn with_options(mut self, options: BTreeMap<String, String>) -> Self {
        self.options.extend(options);
        self
    }

    /// Form parameters in Twilio's naming; `MediaUrl` repeats per attachment
    pub fn form_params(&self) -> Vec<(String, String)> {
        let mut params: Vec<(String, String)> = self
            .options
            .iter()
            .filter(|(key, _)| !RESERVED_PARAMS.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        params.push(("To".to_string(), self.to.clone()));
        params.push(("From".to_string(), self.from.clone()));
        params.push(("Body".to_string(), self.body.clone()));
        for url in &self.media_url {
            params.push(("MediaUrl".to_string(), url.clone()));
        }

        params
    }
}

/// Message resource returned by Twilio, kept unaltered
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResource {
    pub sid: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Error body Twilio returns on failure
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    code: Option<i64>,
    message: Option<String>,
}

impl TwilioClient {
    /// Create a new Twilio client
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            account_sid: config.account_sid.clone(),
            auth_token: config.auth_token.clone(),
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Create a message (text and/or media)
    pub async fn create_message(&self, request: &MessageRequest) -> Result<MessageResource> {
        info!("Sending Twilio message to {}", request.to);

        let url = format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.base_url, self.account_sid
        );

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&request.form_params())
            .send()
            .await?;

        let response = Self::check_status(response).await?;
        let message: MessageResource = response.json().await?;

        debug!("Twilio accepted message {} ({:?})", message.sid, message.status);
        Ok(message)
    }

    /// Download an inbound media item into `dir`, returning the file path
    pub async fn download_media(&self, url: &str, dir: &Path) -> Result<PathBuf> {
        debug!("Downloading media from {}", url);

        let response = self
            .client
            .get(url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .send()
            .await?;

        let response = Self::check_status(response).await?;
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response.bytes().await?;

        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(media_file_name(url, content_type.as_deref()));
        tokio::fs::write(&path, &bytes).await?;

        info!("Saved {} bytes of media to {}", bytes.len(), path.display());
        Ok(path)
    }

    async fn check_status(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        error!("Twilio request failed: {} - {}", status, text);

        let (code, message) = match serde_json::from_str::<ApiErrorBody>(&text) {
            Ok(body) => (body.code, body.message.unwrap_or(text)),
            Err(_) => (None, text),
        };

        Err(ProviderError::Api {
            status: status.as_u16(),
            code,
            message,
        })
    }
}

/// File name for downloaded media: last URL segment plus an extension
/// derived from the content type when the segment has none.
fn media_file_name(url: &str, content_type: Option<&str>) -> String {
    let stem = Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    if Path::new(&stem).extension().is_some() {
        return stem;
    }

    match content_type.and_then(extension_for) {
        Some(ext) => format!("{}.{}", stem, ext),
        None => stem,
    }
}

fn extension_for(content_type: &str) -> Option<&'static str> {
    let parsed: mime::Mime = content_type.parse().ok()?;
    let extensions = mime_guess::get_mime_extensions(&parsed)?;
    let subtype = parsed.subtype().as_str();

    extensions
        .iter()
        .find(|ext| ext.eq_ignore_ascii_case(subtype))
        .or_else(|| extensions.first())
        .copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let config = ProviderConfig::new("AC123", "token123", "+14155238886");
        let client = TwilioClient::new(&config).unwrap();
        assert_eq!(client.account_sid, "AC123");
        assert_eq!(client.base_url, "https://api.twilio.com");
    }

    #[test]
    fn test_form_params_order_and_media() {
        let request = MessageRequest::new("whatsapp:+1555", "whatsapp:+1415", "hi")
            .with_media_url("https://a.example/1.png")
            .with_media_url("https://a.example/2.png");

        let params = request.form_params();
        assert_eq!(params[0], ("To".to_string(), "whatsapp:+1555".to_string()));
        let media: Vec<_> = params.iter().filter(|(k, _)| k == "MediaUrl").collect();
        assert_eq!(media.len(), 2);
    }

    #[test]
    fn test_passthrough_cannot_override_addresses() {
        let mut options = BTreeMap::new();
        options.insert("To".to_string(), "whatsapp:+1999".to_string());
        options.insert("StatusCallback".to_string(), "https://cb.example".to_string());

        let request = MessageRequest::new("whatsapp:+1555", "whatsapp:+1415", "hi")
            .with_options(options);
        let params = request.form_params();

        let to: Vec<_> = params.iter().filter(|(k, _)| k == "To").collect();
        assert_eq!(to.len(), 1);
        assert_eq!(to[0].1, "whatsapp:+1555");
        assert!(params.iter().any(|(k, _)| k == "StatusCallback"));
    }

    #[test]
    fn test_media_file_name() {
        let url = "https://api.twilio.com/2010-04-01/Accounts/AC1/Messages/MM1/Media/ME1";
        assert_eq!(media_file_name(url, Some("image/png")), "ME1.png");
        assert_eq!(media_file_name(url, Some("application/pdf")), "ME1.pdf");
        assert_eq!(media_file_name(url, None), "ME1");
        assert_eq!(
            media_file_name("https://cdn.example.com/menu.jpg", Some("image/jpeg")),
            "menu.jpg"
        );
    }

    #[test]
    fn test_message_resource_keeps_unknown_fields() {
        let json = serde_json::json!({
            "sid": "SM123",
            "status": "queued",
            "num_segments": "1",
            "price": null
        });
        let resource: MessageResource = serde_json::from_value(json).unwrap();
        assert_eq!(resource.sid, "SM123");
        assert_eq!(resource.status.as_deref(), Some("queued"));
        assert_eq!(resource.extra["num_segments"], "1");
    }
}
