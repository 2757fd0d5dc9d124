//! Room Names
//!
//! Validated room identifiers and their mapping onto the broadcast topic.

use std::fmt;

/// Characters used for generated room names (unambiguous, lowercase).
/// Excludes 0/o, 1/i/l, 5/s, 2/z to avoid confusion when read aloud.
const ALPHABET: &[u8] = b"346789abcdefghjkmnpqrtuvwxy";

/// Length of generated room names.
const GENERATED_LEN: usize = 8;

/// Upper bound on accepted room names.
const MAX_LEN: usize = 64;

/// A validated, normalized room name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoomName(String);

impl RoomName {
    /// Parse a room name from user input.
    ///
    /// Keeps ASCII alphanumerics and dashes, lowercases the rest away.
    /// Returns `None` when nothing usable remains or the result is too long.
    pub fn parse(input: &str) -> Option<Self> {
        let normalized: String = input
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
            .map(|c| c.to_ascii_lowercase())
            .collect();

        if normalized.is_empty() || normalized.len() > MAX_LEN {
            return None;
        }
        Some(RoomName(normalized))
    }

    /// Generate a shareable random room name.
    pub fn random() -> Self {
        use rand::Rng;
        let mut rng = rand::thread_rng();

        let mut name = String::with_capacity(GENERATED_LEN);
        for _ in 0..GENERATED_LEN {
            let idx = rng.gen_range(0..ALPHABET.len());
            name.push(ALPHABET[idx] as char);
        }
        RoomName(name)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Topic name for this room's broadcast channel.
    pub fn topic(&self) -> String {
        format!("movi-room-{}", self.0)
    }
}

impl fmt::Display for RoomName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_normalizes_input() {
        let name = RoomName::parse("Movie Night!").unwrap();
        assert_eq!(name.as_str(), "movienight");

        let name = RoomName::parse("friday-horror").unwrap();
        assert_eq!(name.as_str(), "friday-horror");
    }

    #[test]
    fn parse_rejects_unusable_input() {
        assert!(RoomName::parse("").is_none());
        assert!(RoomName::parse("!!! ???").is_none());
        assert!(RoomName::parse(&"x".repeat(65)).is_none());
    }

    #[test]
    fn random_names_differ() {
        let a = RoomName::random();
        let b = RoomName::random();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), GENERATED_LEN);
    }

    #[test]
    fn topic_is_namespaced() {
        let name = RoomName::parse("friday").unwrap();
        assert_eq!(name.topic(), "movi-room-friday");
    }
}
