//! Request text shaping for the non-streaming backends.
//!
//! Clients send utterances in a `"speaker: utterance"` shape meant for the
//! streaming model. The other engines need the speaker tag removed and their
//! own padding to avoid clipped audio.

/// Appended for the lightweight model, which otherwise cuts the last word.
pub const KITTEN_TRAILING_PAD: &str = "     Done";

/// Prepended for `espeak`, which otherwise drops the first character.
pub const ESPEAK_LEADING_PAD: &str = "    ";

/// Drop everything up to and including the first `:` plus one more character.
///
/// Without a `:` only the first character is dropped.
pub fn strip_speaker_prefix(text: &str) -> &str {
    let start = text.find(':').map_or(0, |i| i + 1);
    let mut rest = text[start..].chars();
    rest.next();
    rest.as_str()
}

pub fn kitten_prompt(text: &str) -> String {
    format!("{}{}", strip_speaker_prefix(text), KITTEN_TRAILING_PAD)
}

pub fn espeak_argument(text: &str) -> String {
    format!("{}{}", ESPEAK_LEADING_PAD, strip_speaker_prefix(text))
}
