//! Media classification and reference placeholders
//!
//! Inbound attachments are not forwarded to the framework as content.
//! Instead the message body is replaced by a reference token that names the
//! kind of attachment, and the framework fetches the asset on demand.

use uuid::Uuid;

const LOOPBACK_HOSTS: [&str; 3] = ["localhost", "127.0.0.1", "0.0.0.0"];

/// Kind of non-text content carried by an inbound message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventRef {
    VoiceNote,
    Media,
    Document,
    Contacts,
    Location,
}

impl EventRef {
    /// Token prefix understood by the framework
    pub fn prefix(&self) -> &'static str {
        match self {
            EventRef::VoiceNote => "_event_voice_note_",
            EventRef::Media => "_event_media_",
            EventRef::Document => "_event_document_",
            EventRef::Contacts => "_event_contacts_",
            EventRef::Location => "_event_location_",
        }
    }

    /// Generate a fresh reference placeholder, e.g. `_event_media__<uuid>`
    pub fn generate(&self) -> String {
        format!("{}_{}", self.prefix(), Uuid::new_v4())
    }

    /// Whether `body` is a placeholder of this kind
    pub fn matches(&self, body: &str) -> bool {
        body.starts_with(self.prefix())
    }

    /// Classify an attachment by the top-level type of its MIME string.
    ///
    /// Returns `None` for unparseable or unknown types; the caller keeps the
    /// literal body in that case.
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let parsed: mime::Mime = content_type.trim().parse().ok()?;
        let top = parsed.type_();

        if top == mime::AUDIO {
            Some(EventRef::VoiceNote)
        } else if top == mime::IMAGE || top == mime::VIDEO {
            Some(EventRef::Media)
        } else if top == mime::APPLICATION {
            Some(EventRef::Document)
        } else if top == mime::TEXT {
            Some(EventRef::Contacts)
        } else {
            None
        }
    }
}

/// Whether a media reference can't be fetched by Twilio as-is.
///
/// Loopback URLs and anything that is not an `http(s)` URL (filesystem
/// paths, `file://` URLs) need to be rewritten to a public URL first.
pub fn is_local_media(input: &str) -> bool {
    if LOOPBACK_HOSTS.iter().any(|host| input.contains(host)) {
        return true;
    }

    let is_remote = input.starts_with("http://") || input.starts_with("https://");
    !is_remote && !input.is_empty() && !input.chars().any(char::is_whitespace)
}
