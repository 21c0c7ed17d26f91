//! Twilio webhook and framework-facing message types

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Inbound webhook form posted by Twilio.
///
/// Every field is optional so that any form body decodes; fields this crate
/// doesn't name are kept in `extra`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct InboundPayload {
    pub from: String,
    pub to: String,
    pub body: String,
    pub profile_name: Option<String>,
    pub num_media: Option<String>,
    pub media_content_type0: Option<String>,
    pub media_url0: Option<String>,
    pub latitude: Option<String>,
    pub longitude: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, String>,
}

impl InboundPayload {
    /// Whether the message carries an attachment.
    ///
    /// Only an explicit `NumMedia=0` rules it out; a content type without a
    /// count still counts as media.
    pub fn has_media(&self) -> bool {
        self.num_media.as_deref().is_none_or(|n| n.trim() != "0")
            && self.media_content_type0.is_some()
    }

    /// Whether the message is a shared location
    pub fn has_location(&self) -> bool {
        let present = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.is_empty());
        present(&self.latitude) && present(&self.longitude)
    }

    /// All fields as Twilio sent them
    pub fn fields(&self) -> BTreeMap<String, String> {
        let mut fields = self.extra.clone();
        fields.insert("From".to_string(), self.from.clone());
        fields.insert("To".to_string(), self.to.clone());
        fields.insert("Body".to_string(), self.body.clone());

        let optional = [
            ("ProfileName", &self.profile_name),
            ("NumMedia", &self.num_media),
            ("MediaContentType0", &self.media_content_type0),
            ("MediaUrl0", &self.media_url0),
            ("Latitude", &self.latitude),
            ("Longitude", &self.longitude),
        ];
        for (key, value) in optional {
            if let Some(value) = value {
                fields.insert(key.to_string(), value.clone());
            }
        }

        fields
    }
}

/// Message event handed to the bot framework
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedMessage {
    /// Sender, bare digits
    pub from: String,
    /// Recipient, bare digits
    pub to: String,
    /// The number this provider answers on, bare digits
    pub host: String,
    /// Literal text or a reference placeholder
    pub body: String,
    /// WhatsApp profile name of the sender
    pub name: String,
    /// Raw webhook fields
    #[serde(flatten)]
    pub raw: BTreeMap<String, String>,
}

impl NormalizedMessage {
    /// URL of the first attachment, if any
    pub fn media_url(&self) -> Option<&str> {
        self.raw
            .get("MediaUrl0")
            .map(String::as_str)
            .filter(|url| !url.is_empty())
    }
}

/// Identity of the active channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostInfo {
    pub phone: String,
}

/// Human-readable notice for capabilities Twilio lacks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub title: String,
    pub instructions: Vec<String>,
}

/// Options for [`crate::TwilioProvider::send_message`]
#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    /// Interactive buttons; Twilio can't render these
    pub buttons: Vec<Button>,
    /// Media path or URL to attach
    pub media: Option<String>,
}

/// Button requested by the framework
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Button {
    pub body: String,
}

/// Options for [`crate::TwilioProvider::save_file`]
#[derive(Debug, Clone, Default)]
pub struct SaveFileOptions {
    /// Target directory; defaults to the system temp directory
    pub path: Option<std::path::PathBuf>,
}
