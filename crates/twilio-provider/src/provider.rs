//! Twilio provider: the outbound facade the bot framework calls

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::config::ProviderConfig;
use crate::error::{ProviderError, Result};
use crate::events::{EventBus, ProviderEvent};
use crate::media::is_local_media;
use crate::phone::to_twilio_address;
use crate::traits::MessagingProvider;
use crate::twilio::{MessageRequest, MessageResource};
use crate::types::{NormalizedMessage, SaveFileOptions, SendOptions};
use crate::vendor::TwilioVendor;

/// Returned by [`TwilioProvider::save_file`] when the download fails
pub const SAVE_FILE_ERROR: &str = "ERROR";

const WARNING_TITLE: &str = "WARNING";
const INFO_TITLE: &str = "INFO";

/// Twilio messaging provider
pub struct TwilioProvider {
    config: Arc<ProviderConfig>,
    bus: EventBus,
    vendor: Mutex<Option<Arc<TwilioVendor>>>,
}

impl TwilioProvider {
    /// Create a new provider; the vendor is created by [`TwilioProvider::init_vendor`]
    pub fn new(config: ProviderConfig) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            config: Arc::new(config),
            bus: EventBus::new(),
            vendor: Mutex::new(None),
        })
    }

    /// Provider configuration
    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// Subscribe to provider events
    pub fn subscribe(&self) -> broadcast::Receiver<ProviderEvent> {
        self.bus.subscribe()
    }

    /// Create the vendor on first use, emitting `host`; later calls reuse it
    pub fn init_vendor(&self) -> Result<Arc<TwilioVendor>> {
        let mut slot = self
            .vendor
            .lock()
            .map_err(|_| ProviderError::Server("vendor lock poisoned".to_string()))?;

        if let Some(vendor) = slot.as_ref() {
            return Ok(Arc::clone(vendor));
        }

        let vendor = Arc::new(TwilioVendor::new(Arc::clone(&self.config), self.bus.clone())?);
        *slot = Some(Arc::clone(&vendor));
        Ok(vendor)
    }

    /// Send a text message; `options` are extra Twilio parameters passed through
    pub async fn send(
        &self,
        number: &str,
        message: &str,
        options: BTreeMap<String, String>,
    ) -> Result<MessageResource> {
        let request = MessageRequest::new(to_twilio_address(number), self.sender(), message)
            .with_options(options);
        self.create(request).await
    }

    /// Send a message, routing media to [`TwilioProvider::send_media`].
    ///
    /// Buttons are not supported by Twilio; a notice is emitted and the text
    /// is sent without them.
    pub async fn send_message(
        &self,
        number: &str,
        message: &str,
        options: SendOptions,
    ) -> Result<MessageResource> {
        if !options.buttons.is_empty() {
            self.send_buttons().await;
        }

        if let Some(media) = options.media.as_deref().filter(|m| !m.trim().is_empty()) {
            return self.send_media(number, message, Some(media)).await;
        }

        let request = MessageRequest::new(to_twilio_address(number), self.sender(), message);
        self.create(request).await
    }

    /// Send a message with an attachment.
    ///
    /// Local paths and loopback URLs are rewritten to this server's `/tmp`
    /// endpoint, which must be publicly reachable for Twilio to fetch them.
    pub async fn send_media(
        &self,
        number: &str,
        message: &str,
        media: Option<&str>,
    ) -> Result<MessageResource> {
        let media = media
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .ok_or(ProviderError::MissingMedia)?;

        let media_url = if is_local_media(media) {
            let vendor = self.init_vendor()?;
            let url = format!(
                "{}/tmp?path={}",
                self.config.entry_point_url(),
                vendor.cipher().seal(media)?
            );

            warn!("Local media {} will be served to Twilio from {}", media, url);
            self.bus.notice(
                WARNING_TITLE,
                vec![
                    "You are trying to send a file that is local.".to_string(),
                    "For this to work with Twilio, the file needs to be in a public URL.".to_string(),
                    "Set PUBLIC_URL to the address Twilio can reach this server on.".to_string(),
                    "This is the URL that will be sent to Twilio (must be public)".to_string(),
                    String::new(),
                    url.clone(),
                ],
            );
            url
        } else {
            media.to_string()
        };

        let request = MessageRequest::new(to_twilio_address(number), self.sender(), message)
            .with_media_url(media_url);

        self.create(request)
            .await
            .inspect_err(|e| error!("Error sending Twilio media to {}: {}", number, e))
    }

    /// Twilio has no interactive buttons; emit a notice instead
    pub async fn send_buttons(&self) {
        self.bus.notice(
            INFO_TITLE,
            vec![
                "Twilio presents a different way to implement buttons and lists".to_string(),
                "Use Twilio Content templates to send interactive messages".to_string(),
                "https://www.twilio.com/docs/content".to_string(),
            ],
        );
    }

    /// Download the first attachment of `ctx`; `"ERROR"` on failure
    pub async fn save_file(&self, ctx: &NormalizedMessage, options: SaveFileOptions) -> String {
        match self.try_save_file(ctx, options).await {
            Ok(path) => path.to_string_lossy().into_owned(),
            Err(e) => {
                error!("Failed to save Twilio media: {}", e);
                SAVE_FILE_ERROR.to_string()
            }
        }
    }

    /// Download the first attachment of `ctx` into `options.path`
    pub async fn try_save_file(
        &self,
        ctx: &NormalizedMessage,
        options: SaveFileOptions,
    ) -> Result<PathBuf> {
        let url = ctx.media_url().ok_or(ProviderError::NoMediaUrl)?;
        let dir = options.path.unwrap_or_else(std::env::temp_dir);

        let vendor = self.init_vendor()?;
        vendor.twilio().download_media(url, &dir).await
    }

    /// Webhook routes
    pub fn router(&self) -> Result<Router> {
        Ok(self.init_vendor()?.router())
    }

    /// Serve the webhook routes until `shutdown` fires; emits `ready` once bound
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
        let app = self.router()?;

        let addr = format!("0.0.0.0:{}", self.config.port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| ProviderError::Server(e.to_string()))?;

        info!("Twilio webhook server listening on {}", addr);
        self.bus.emit(ProviderEvent::Ready(true));

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                info!("Twilio provider shutting down");
            })
            .await
            .map_err(|e| ProviderError::Server(e.to_string()))?;

        Ok(())
    }

    fn sender(&self) -> String {
        to_twilio_address(&self.config.vendor_number)
    }

    async fn create(&self, request: MessageRequest) -> Result<MessageResource> {
        let vendor = self.init_vendor()?;
        let result = vendor.twilio().create_message(&request).await;

        if let Err(ProviderError::Api {
            status: 401,
            code,
            message,
        }) = &result
        {
            warn!("Twilio rejected the account credentials");
            self.bus.emit(ProviderEvent::AuthFailure(serde_json::json!({
                "status": 401,
                "code": code,
                "message": message,
            })));
        }

        result
    }
}

#[async_trait]
impl MessagingProvider for TwilioProvider {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn send_message(
        &self,
        number: &str,
        message: &str,
        options: SendOptions,
    ) -> Result<MessageResource> {
        TwilioProvider::send_message(self, number, message, options).await
    }

    async fn send_media(
        &self,
        number: &str,
        message: &str,
        media: Option<&str>,
    ) -> Result<MessageResource> {
        TwilioProvider::send_media(self, number, message, media).await
    }

    async fn send_buttons(&self) {
        TwilioProvider::send_buttons(self).await
    }

    async fn save_file(&self, ctx: &NormalizedMessage, options: SaveFileOptions) -> String {
        TwilioProvider::save_file(self, ctx, options).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{engine::general_purpose::STANDARD, Engine};
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::types::{Button, InboundPayload};
    use crate::webhook::normalize;

    const MESSAGES_PATH: &str = "/2010-04-01/Accounts/AC123/Messages.json";

    fn provider_for(server: &MockServer) -> TwilioProvider {
        let mut config = ProviderConfig::new("AC123", "token123", "+14155238886");
        config.api_base_url = server.uri();
        config.public_url = Some("https://bot.example.com".to_string());
        TwilioProvider::new(config).unwrap()
    }

    fn created(sid: &str) -> ResponseTemplate {
        ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "sid": sid,
            "status": "queued",
            "to": "whatsapp:+15551234567",
            "from": "whatsapp:+14155238886",
            "num_media": "0"
        }))
    }

    fn drain(rx: &mut broadcast::Receiver<ProviderEvent>) -> Vec<ProviderEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn notices(events: &[ProviderEvent]) -> Vec<&crate::types::Notice> {
        events
            .iter()
            .filter_map(|e| match e {
                ProviderEvent::Notice(n) => Some(n),
                _ => None,
            })
            .collect()
    }

    async fn sent_bodies(server: &MockServer) -> Vec<String> {
        server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .map(|r| String::from_utf8_lossy(&r.body).into_owned())
            .collect()
    }

    #[test]
    fn test_new_requires_credentials() {
        let result = TwilioProvider::new(ProviderConfig::new("AC123", "token", ""));
        assert!(matches!(
            result,
            Err(ProviderError::CredentialsNotSet("vendor_number"))
        ));
    }

    #[tokio::test]
    async fn test_init_vendor_is_idempotent() {
        let provider =
            TwilioProvider::new(ProviderConfig::new("AC123", "token", "+14155238886")).unwrap();
        let mut rx = provider.subscribe();

        let first = provider.init_vendor().unwrap();
        let second = provider.init_vendor().unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        let hosts = drain(&mut rx)
            .into_iter()
            .filter(|e| e.name() == "host")
            .count();
        assert_eq!(hosts, 1);
    }

    #[tokio::test]
    async fn test_send_normalizes_addresses_and_passes_options() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(MESSAGES_PATH))
            .and(body_string_contains("To=whatsapp%3A%2B15551234567"))
            .and(body_string_contains("From=whatsapp%3A%2B14155238886"))
            .and(body_string_contains("StatusCallback=https%3A%2F%2Fcb.example.com"))
            .respond_with(created("SM1"))
            .expect(1)
            .mount(&server)
            .await;

        let provider = provider_for(&server);
        let mut options = BTreeMap::new();
        options.insert(
            "StatusCallback".to_string(),
            "https://cb.example.com".to_string(),
        );

        let resource = provider
            .send("+1 555 123 4567", "hello", options)
            .await
            .unwrap();
        assert_eq!(resource.sid, "SM1");
        assert_eq!(resource.extra["num_media"], "0");
    }

    #[tokio::test]
    async fn test_send_propagates_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(MESSAGES_PATH))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "code": 21211,
                "message": "Invalid 'To' Phone Number",
                "status": 400
            })))
            .mount(&server)
            .await;

        let provider = provider_for(&server);
        let err = provider
            .send("15551234567", "hello", BTreeMap::new())
            .await
            .unwrap_err();

        match err {
            ProviderError::Api {
                status,
                code,
                message,
            } => {
                assert_eq!(status, 400);
                assert_eq!(code, Some(21211));
                assert_eq!(message, "Invalid 'To' Phone Number");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unauthorized_emits_auth_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(MESSAGES_PATH))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "code": 20003,
                "message": "Authenticate",
                "status": 401
            })))
            .mount(&server)
            .await;

        let provider = provider_for(&server);
        let mut rx = provider.subscribe();

        let err = provider
            .send_message("15551234567", "hello", SendOptions::default())
            .await
            .unwrap_err();
        assert!(err.is_auth_failure());

        let events = drain(&mut rx);
        let failure = events
            .iter()
            .find_map(|e| match e {
                ProviderEvent::AuthFailure(payload) => Some(payload),
                _ => None,
            })
            .expect("auth_failure event");
        assert_eq!(failure["code"], 20003);
    }

    #[tokio::test]
    async fn test_send_media_rewrites_local_file() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(MESSAGES_PATH))
            .and(body_string_contains(
                "MediaUrl=https%3A%2F%2Fbot.example.com%2Ftmp%3Fpath%3D",
            ))
            .respond_with(created("SM2"))
            .expect(1)
            .mount(&server)
            .await;

        let provider = provider_for(&server);
        let mut rx = provider.subscribe();

        let resource = provider
            .send_media("15551234567", "menu", Some("file:///tmp/x.png"))
            .await
            .unwrap();
        assert_eq!(resource.sid, "SM2");

        let bodies = sent_bodies(&server).await;
        assert!(!bodies[0].contains("file%3A"));
        assert!(!bodies[0].contains("x.png"));

        let events = drain(&mut rx);
        let warning = notices(&events)
            .into_iter()
            .find(|n| n.title == WARNING_TITLE)
            .expect("warning notice");
        let url = warning.instructions.last().unwrap();
        assert!(url.starts_with("https://bot.example.com/tmp?path="));

        let token = url.rsplit("path=").next().unwrap();
        let vendor = provider.init_vendor().unwrap();
        assert_eq!(vendor.cipher().open(token).unwrap(), "file:///tmp/x.png");
    }

    #[tokio::test]
    async fn test_send_media_keeps_public_url() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(MESSAGES_PATH))
            .and(body_string_contains(
                "MediaUrl=https%3A%2F%2Fcdn.example.com%2Fmenu.png",
            ))
            .respond_with(created("SM3"))
            .expect(1)
            .mount(&server)
            .await;

        let provider = provider_for(&server);
        let mut rx = provider.subscribe();

        provider
            .send_media("15551234567", "menu", Some("https://cdn.example.com/menu.png"))
            .await
            .unwrap();

        assert!(notices(&drain(&mut rx)).is_empty());
    }

    #[tokio::test]
    async fn test_send_media_without_media_fails_before_network() {
        let server = MockServer::start().await;
        let provider = provider_for(&server);

        let result = provider.send_media("15551234567", "menu", None).await;
        assert!(matches!(result, Err(ProviderError::MissingMedia)));

        let result = provider.send_media("15551234567", "menu", Some("  ")).await;
        assert!(matches!(result, Err(ProviderError::MissingMedia)));

        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_send_message_with_buttons_notices_then_sends_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(MESSAGES_PATH))
            .and(body_string_contains("Body=pick+one"))
            .respond_with(created("SM4"))
            .expect(1)
            .mount(&server)
            .await;

        let provider = provider_for(&server);
        let mut rx = provider.subscribe();

        let options = SendOptions {
            buttons: vec![Button {
                body: "yes".to_string(),
            }],
            media: None,
        };
        let resource = provider
            .send_message("15551234567", "pick one", options)
            .await
            .unwrap();
        assert_eq!(resource.sid, "SM4");

        let events = drain(&mut rx);
        assert!(notices(&events).iter().any(|n| n.title == INFO_TITLE));
        assert!(!sent_bodies(&server).await[0].contains("MediaUrl"));
    }

    #[tokio::test]
    async fn test_send_message_with_media_delegates() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(MESSAGES_PATH))
            .and(body_string_contains("MediaUrl="))
            .respond_with(created("SM5"))
            .expect(1)
            .mount(&server)
            .await;

        let provider = provider_for(&server);
        let options = SendOptions {
            buttons: Vec::new(),
            media: Some("https://cdn.example.com/menu.png".to_string()),
        };

        let resource = provider
            .send_message("15551234567", "menu", options)
            .await
            .unwrap();
        assert_eq!(resource.sid, "SM5");
    }

    #[tokio::test]
    async fn test_send_message_with_empty_media_sends_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(MESSAGES_PATH))
            .and(body_string_contains("Body=hi"))
            .respond_with(created("SM6"))
            .expect(1)
            .mount(&server)
            .await;

        let provider = provider_for(&server);
        let options = SendOptions {
            buttons: Vec::new(),
            media: Some(String::new()),
        };

        let resource = provider
            .send_message("15551234567", "hi", options)
            .await
            .unwrap();
        assert_eq!(resource.sid, "SM6");

        let requests = server.received_requests().await.unwrap();
        let body = String::from_utf8_lossy(&requests[0].body);
        assert!(!body.contains("MediaUrl"));
    }

    #[tokio::test]
    async fn test_send_buttons_only_notices() {
        let server = MockServer::start().await;
        let provider = provider_for(&server);
        let mut rx = provider.subscribe();

        provider.send_buttons().await;

        let events = drain(&mut rx);
        assert_eq!(notices(&events).len(), 1);
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    fn inbound_with_media(url: Option<String>) -> NormalizedMessage {
        normalize(&InboundPayload {
            from: "whatsapp:+15551234567".to_string(),
            to: "whatsapp:+14155238886".to_string(),
            num_media: Some("1".to_string()),
            media_content_type0: Some("image/png".to_string()),
            media_url0: url,
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_save_file_downloads_with_basic_auth() {
        let server = MockServer::start().await;
        let auth = format!("Basic {}", STANDARD.encode("AC123:token123"));
        Mock::given(method("GET"))
            .and(path("/media/ME123"))
            .and(header("authorization", auth.as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_raw(b"png-bytes".to_vec(), "image/png"))
            .expect(1)
            .mount(&server)
            .await;

        let provider = provider_for(&server);
        let dir = tempfile::tempdir().unwrap();
        let ctx = inbound_with_media(Some(format!("{}/media/ME123", server.uri())));

        let saved = provider
            .save_file(
                &ctx,
                SaveFileOptions {
                    path: Some(dir.path().join("inbox")),
                },
            )
            .await;

        let saved = PathBuf::from(saved);
        assert_eq!(saved, dir.path().join("inbox").join("ME123.png"));
        assert_eq!(std::fs::read(&saved).unwrap(), b"png-bytes");
    }

    #[tokio::test]
    async fn test_save_file_returns_error_sentinel() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/media/ME404"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let provider = provider_for(&server);
        let dir = tempfile::tempdir().unwrap();
        let options = || SaveFileOptions {
            path: Some(dir.path().to_path_buf()),
        };

        let ctx = inbound_with_media(Some(format!("{}/media/ME404", server.uri())));
        assert_eq!(provider.save_file(&ctx, options()).await, SAVE_FILE_ERROR);

        let ctx = inbound_with_media(None);
        assert_eq!(provider.save_file(&ctx, options()).await, SAVE_FILE_ERROR);
    }

    #[tokio::test]
    async fn test_run_emits_ready_and_shuts_down() {
        let mut config = ProviderConfig::new("AC123", "token", "+14155238886");
        config.port = 0;
        let provider = Arc::new(TwilioProvider::new(config).unwrap());
        let mut rx = provider.subscribe();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let server = {
            let provider = Arc::clone(&provider);
            tokio::spawn(async move { provider.run(shutdown_rx).await })
        };

        loop {
            match rx.recv().await.unwrap() {
                ProviderEvent::Ready(ready) => {
                    assert!(ready);
                    break;
                }
                _ => continue,
            }
        }

        shutdown_tx.send(()).unwrap();
        server.await.unwrap().unwrap();
    }

    #[test]
    fn test_provider_name() {
        let provider =
            TwilioProvider::new(ProviderConfig::new("AC123", "token", "+14155238886")).unwrap();
        assert_eq!(MessagingProvider::name(&provider), "bot");
    }
}
