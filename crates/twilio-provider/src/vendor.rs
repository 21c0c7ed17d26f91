//! Twilio vendor: the REST client plus the webhook surface

use std::sync::Arc;

use axum::Router;
use reqwest::Client;
use tracing::info;

use crate::config::ProviderConfig;
use crate::crypto::PathCipher;
use crate::error::Result;
use crate::events::{EventBus, ProviderEvent};
use crate::phone::strip_number;
use crate::twilio::TwilioClient;
use crate::types::HostInfo;
use crate::webhook::{create_webhook_router, WebhookState};

/// Wrapped Twilio channel client
#[derive(Debug)]
pub struct TwilioVendor {
    config: Arc<ProviderConfig>,
    twilio: TwilioClient,
    cipher: PathCipher,
    bus: EventBus,
}

impl TwilioVendor {
    /// Create the vendor and announce the host number on the bus.
    ///
    /// Twilio is a stateless REST endpoint, so nothing is contacted here.
    pub fn new(config: Arc<ProviderConfig>, bus: EventBus) -> Result<Self> {
        let twilio = TwilioClient::new(&config)?;

        let host = HostInfo {
            phone: strip_number(&config.vendor_number),
        };
        info!("Twilio vendor ready for {}", host.phone);
        bus.emit(ProviderEvent::Host(host));

        Ok(Self {
            config,
            twilio,
            cipher: PathCipher::new(),
            bus,
        })
    }

    /// REST client
    pub fn twilio(&self) -> &TwilioClient {
        &self.twilio
    }

    /// Cipher used for `/tmp` media tokens
    pub fn cipher(&self) -> &PathCipher {
        &self.cipher
    }

    /// Configuration the vendor was created with
    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// HTTP routes Twilio calls into
    pub fn router(&self) -> Router {
        create_webhook_router(WebhookState {
            bus: self.bus.clone(),
            cipher: self.cipher.clone(),
            client: Client::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vendor_announces_host() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let config = Arc::new(ProviderConfig::new("AC123", "token", "whatsapp:+14155238886"));

        let vendor = TwilioVendor::new(config, bus).unwrap();
        assert_eq!(vendor.config().account_sid, "AC123");

        match rx.try_recv().unwrap() {
            ProviderEvent::Host(host) => assert_eq!(host.phone, "14155238886"),
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
