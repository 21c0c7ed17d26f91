//! Phone number formatting
//!
//! Twilio wants `whatsapp:+<digits>` addresses, the bot framework wants bare
//! digits. Both helpers accept either form.

const WHATSAPP_SCHEME: &str = "whatsapp:";

/// Strip a Twilio address down to bare digits (`whatsapp:+1 555 0100` -> `15550100`)
pub fn strip_number(raw: &str) -> String {
    let trimmed = raw.trim();
    let without_scheme = trimmed.strip_prefix(WHATSAPP_SCHEME).unwrap_or(trimmed);

    without_scheme
        .chars()
        .filter(|c| *c != '+' && *c != ':' && !c.is_whitespace())
        .collect()
}

/// Build the canonical Twilio address for a number in any accepted form
pub fn to_twilio_address(raw: &str) -> String {
    format!("{}+{}", WHATSAPP_SCHEME, strip_number(raw))
}
