//! Registration token codec.
//!
//! A token is the customer email in URL-safe base64 without padding. That
//! alphabet (`A-Z a-z 0-9 - _`) is exactly what Telegram accepts as a
//! `/start` deep-link payload. The token hides the email from casual view in
//! a URL; it is not a credential.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

/// Longest `/start` payload Telegram will pass through.
pub const MAX_START_PAYLOAD_LEN: usize = 64;

/// Encode an email into a registration token.
pub fn encode_email(email: &str) -> String {
    URL_SAFE_NO_PAD.encode(email.as_bytes())
}

/// Decode a registration token back into an email.
///
/// Never fails. A token that is not valid base64 decodes to itself, and
/// invalid UTF-8 is replaced lossily, so a malformed token just fails to
/// match any registry row.
pub fn decode_token(token: &str) -> String {
    let trimmed = token.trim().trim_end_matches('=');
    match URL_SAFE_NO_PAD.decode(trimmed) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(_) => trimmed.to_string(),
    }
}

/// Build the deep link that starts a registration with the bot.
pub fn registration_link(bot_username: &str, email: &str) -> String {
    format!(
        "https://t.me/{}?start={}",
        bot_username.trim_start_matches('@'),
        encode_email(email)
    )
}

/// Whether the token fits in a Telegram `/start` payload.
pub fn fits_start_payload(token: &str) -> bool {
    token.len() <= MAX_START_PAYLOAD_LEN
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn printable_ascii_emails_survive_encoding() {
        let emails = [
            "a@x.com",
            "first.last+tag@example.co.uk",
            "UPPER@Example.COM",
            "weird!#$%&'*/=?^_`{|}~-@x.io",
            " spaced name@x.com",
            "",
        ];
        for email in emails {
            assert_eq!(decode_token(&encode_email(email)), email, "{email:?}");
        }
    }

    #[test]
    fn every_printable_ascii_character_round_trips() {
        let all: String = (0x20u8..=0x7e).map(char::from).collect();
        assert_eq!(decode_token(&encode_email(&all)), all);
    }

    #[test]
    fn token_uses_deep_link_alphabet() {
        let token = encode_email("??>>~~@x.com");
        assert!(token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn malformed_token_decodes_to_itself() {
        assert_eq!(decode_token("not base64!"), "not base64!");
        assert_eq!(decode_token("a"), "a");
    }

    #[test]
    fn invalid_utf8_decodes_lossily() {
        let token = URL_SAFE_NO_PAD.encode([0xff, 0xfe, b'a']);
        let decoded = decode_token(&token);
        assert!(decoded.ends_with('a'));
        assert!(decoded.contains('\u{fffd}'));
    }

    #[test]
    fn padded_and_whitespace_tokens_are_tolerated() {
        let padded = base64::engine::general_purpose::URL_SAFE.encode("a@x.com");
        assert!(padded.ends_with('='));
        assert_eq!(decode_token(&format!(" {padded}\n")), "a@x.com");
    }

    #[test]
    fn registration_link_embeds_token() {
        let link = registration_link("@paid_bot", "a@x.com");
        assert_eq!(
            link,
            format!("https://t.me/paid_bot?start={}", encode_email("a@x.com"))
        );
        assert_eq!(link, registration_link("paid_bot", "a@x.com"));
    }

    #[test]
    fn long_emails_exceed_start_payload() {
        assert!(fits_start_payload(&encode_email("a@x.com")));
        let long = format!("{}@example.com", "x".repeat(60));
        assert!(!fits_start_payload(&encode_email(&long)));
    }
}
