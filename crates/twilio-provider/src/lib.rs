//! twilio-provider: Twilio WhatsApp/SMS provider for chatbot frameworks
//!
//! Receives Twilio webhooks, normalizes them into framework message events,
//! and sends text and media through the Twilio REST API.

pub mod config;
pub mod crypto;
pub mod error;
pub mod events;
pub mod media;
pub mod phone;
pub mod provider;
pub mod traits;
pub mod twilio;
pub mod types;
pub mod vendor;
pub mod webhook;

pub use config::ProviderConfig;
pub use error::{ProviderError, Result};
pub use events::{EventBus, ProviderEvent};
pub use provider::{TwilioProvider, SAVE_FILE_ERROR};
pub use traits::MessagingProvider;
pub use twilio::{MessageRequest, MessageResource, TwilioClient};
pub use types::{
    Button, HostInfo, InboundPayload, NormalizedMessage, Notice, SaveFileOptions, SendOptions,
};
pub use vendor::TwilioVendor;
