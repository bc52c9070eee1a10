use nanoid::nanoid;
use serde::{Deserialize, Serialize};

/// Lowercase-hex alphabet for entity ids.
///
/// The stream-key grammar splits on `_`, so ids must never contain one;
/// nanoid's default alphabet does.
const HEX_ALPHABET: [char; 16] = [
    '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', 'a', 'b', 'c', 'd', 'e', 'f',
];

/// Generate a 20-character hex nanoid for entity ids.
#[must_use]
pub fn generate_id() -> String {
    nanoid!(20, &HEX_ALPHABET)
}

macro_rules! id_type {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            #[must_use]
            pub fn new() -> Self {
                Self(generate_id())
            }

            #[must_use]
            pub const fn from_string(id: String) -> Self {
                Self(id)
            }

            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// First 8 characters, as embedded in stream keys.
            #[must_use]
            pub fn short(&self) -> &str {
                &self.0[..self.0.len().min(8)]
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

id_type!(
    /// User id. DJs are users with an approved artist profile.
    UserId
);
id_type!(
    /// Slot id; doubles as the stream id on live endpoints.
    SlotId
);
id_type!(
    /// Browser-session id used for viewer presence tracking.
    SessionId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_hex_and_underscore_free() {
        for _ in 0..50 {
            let id = generate_id();
            assert_eq!(id.len(), 20);
            assert!(id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_uppercase()));
        }
    }

    #[test]
    fn short_takes_first_eight() {
        let id = SlotId::from_string("0123456789abcdef0123".to_string());
        assert_eq!(id.short(), "01234567");

        let tiny = UserId::from_string("abc".to_string());
        assert_eq!(tiny.short(), "abc");
    }
}
