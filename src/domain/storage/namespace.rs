//! Namespace key codec
//!
//! Every stored item lives at a `(purpose, channel, app, key_path)` tuple.
//! Backends only understand flat string keys, so the codec flattens the tuple
//! into one key string.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer};

use crate::domain::DomainError;

/// Which data shape a key addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Purpose {
    /// Single scalar value
    Entity,
    /// Append-only message queue
    Mailbox,
}

impl Purpose {
    /// Tag written at the start of every backend key
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Entity => "ent",
            Self::Mailbox => "msg",
        }
    }

    fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "ent" => Some(Self::Entity),
            "msg" => Some(Self::Mailbox),
            _ => None,
        }
    }
}

/// Fully qualified address of an entity or a mailbox
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NamespaceKey {
    pub purpose: Purpose,
    pub channel: String,
    pub app: String,
    pub key_path: String,
}

impl NamespaceKey {
    pub fn new(
        purpose: Purpose,
        channel: impl Into<String>,
        app: impl Into<String>,
        key_path: impl Into<String>,
    ) -> Self {
        Self {
            purpose,
            channel: channel.into(),
            app: app.into(),
            key_path: key_path.into(),
        }
    }

    pub fn entity(
        channel: impl Into<String>,
        app: impl Into<String>,
        key_path: impl Into<String>,
    ) -> Self {
        Self::new(Purpose::Entity, channel, app, key_path)
    }

    pub fn mailbox(
        channel: impl Into<String>,
        app: impl Into<String>,
        key_path: impl Into<String>,
    ) -> Self {
        Self::new(Purpose::Mailbox, channel, app, key_path)
    }
}

/// How namespace keys are flattened into backend keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyEncoding {
    /// `{tag}:{len}:{channel}:{len}:{app}:{key_path}`
    ///
    /// Lengths are byte lengths, so segments may contain any character,
    /// including `:`, and distinct tuples never share a key.
    #[default]
    LengthPrefixed,
    /// `{tag}{channel}{app}{key_path}` with no delimiter
    ///
    /// Reads and writes stores populated by the delimiter-less key scheme.
    /// Segment boundaries are lost: `("ab", "c")` and `("a", "bc")` address
    /// the same item.
    Legacy,
}

impl fmt::Display for KeyEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LengthPrefixed => write!(f, "length_prefixed"),
            Self::Legacy => write!(f, "legacy"),
        }
    }
}

impl FromStr for KeyEncoding {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "length_prefixed" | "length-prefixed" | "prefixed" => Ok(Self::LengthPrefixed),
            "legacy" => Ok(Self::Legacy),
            _ => Err(DomainError::configuration(format!(
                "Unknown key encoding: {}. Valid encodings: length_prefixed, legacy",
                s
            ))),
        }
    }
}

impl<'de> Deserialize<'de> for KeyEncoding {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}

/// Turns namespace tuples into backend keys and back
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyCodec {
    encoding: KeyEncoding,
}

impl KeyCodec {
    pub fn new(encoding: KeyEncoding) -> Self {
        Self { encoding }
    }

    pub fn encoding(&self) -> KeyEncoding {
        self.encoding
    }

    pub fn encode(&self, key: &NamespaceKey) -> String {
        self.encode_parts(key.purpose, &key.channel, &key.app, &key.key_path)
    }

    pub fn entity_key(&self, channel: &str, app: &str, key_path: &str) -> String {
        self.encode_parts(Purpose::Entity, channel, app, key_path)
    }

    pub fn mailbox_key(&self, channel: &str, app: &str, key_path: &str) -> String {
        self.encode_parts(Purpose::Mailbox, channel, app, key_path)
    }

    fn encode_parts(&self, purpose: Purpose, channel: &str, app: &str, key_path: &str) -> String {
        match self.encoding {
            KeyEncoding::LengthPrefixed => format!(
                "{}:{}:{}:{}:{}:{}",
                purpose.tag(),
                channel.len(),
                channel,
                app.len(),
                app,
                key_path
            ),
            KeyEncoding::Legacy => format!("{}{}{}{}", purpose.tag(), channel, app, key_path),
        }
    }

    /// Recovers the namespace tuple from a backend key
    ///
    /// Only length-prefixed keys can be decoded.
    pub fn decode(&self, raw: &str) -> Result<NamespaceKey, DomainError> {
        if self.encoding == KeyEncoding::Legacy {
            return Err(DomainError::validation(
                "Legacy keys cannot be decoded: segment boundaries are not recorded",
            ));
        }

        let malformed = || DomainError::validation(format!("Malformed namespace key '{}'", raw));

        let (tag, rest) = raw.split_once(':').ok_or_else(malformed)?;
        let purpose = Purpose::from_tag(tag).ok_or_else(malformed)?;
        let (channel, rest) = take_segment(rest).ok_or_else(malformed)?;
        let (app, key_path) = take_segment(rest).ok_or_else(malformed)?;

        Ok(NamespaceKey::new(purpose, channel, app, key_path))
    }
}

/// Splits `{len}:{segment}:{rest}` into `(segment, rest)`
fn take_segment(input: &str) -> Option<(&str, &str)> {
    let (len, rest) = input.split_once(':')?;

    if len.is_empty() || !len.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let len: usize = len.parse().ok()?;
    let segment = rest.get(..len)?;
    let rest = rest.get(len..)?.strip_prefix(':')?;

    Some((segment, rest))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length_prefixed_format() {
        let codec = KeyCodec::default();

        assert_eq!(codec.entity_key("c1", "a1", "k1"), "ent:2:c1:2:a1:k1");
        assert_eq!(codec.mailbox_key("c1", "a1", "k1"), "msg:2:c1:2:a1:k1");
    }

    #[test]
    fn test_length_prefixed_separates_ambiguous_segments() {
        let codec = KeyCodec::default();

        let left = codec.entity_key("ab", "c", "k");
        let right = codec.entity_key("a", "bc", "k");
        assert_ne!(left, right);

        let left = codec.entity_key("a", "b:1:c", "");
        let right = codec.entity_key("a", "b", "1:c");
        assert_ne!(left, right);
    }

    #[test]
    fn test_legacy_format_collides() {
        let codec = KeyCodec::new(KeyEncoding::Legacy);

        assert_eq!(codec.encoding(), KeyEncoding::Legacy);
        assert_eq!(codec.entity_key("c1", "a1", "k1"), "entc1a1k1");
        assert_eq!(codec.mailbox_key("c1", "a1", "k1"), "msgc1a1k1");
        assert_eq!(
            codec.entity_key("ab", "c", "k"),
            codec.entity_key("a", "bc", "k")
        );
    }

    #[test]
    fn test_entity_and_mailbox_keys_differ() {
        for encoding in [KeyEncoding::LengthPrefixed, KeyEncoding::Legacy] {
            let codec = KeyCodec::new(encoding);
            assert_ne!(
                codec.entity_key("c", "a", "k"),
                codec.mailbox_key("c", "a", "k")
            );
        }
    }

    #[test]
    fn test_decode_round_trip() {
        let codec = KeyCodec::default();
        let keys = [
            NamespaceKey::entity("c1", "a1", "k1"),
            NamespaceKey::mailbox("chän:nel", "", "path/with:colons"),
            NamespaceKey::entity("", "", ""),
        ];

        for key in keys {
            let encoded = codec.encode(&key);
            assert_eq!(codec.decode(&encoded).unwrap(), key);
        }
    }

    #[test]
    fn test_decode_rejects_malformed_keys() {
        let codec = KeyCodec::default();

        for raw in [
            "",
            "ent",
            "xyz:1:a:1:b:c",
            "ent:+1:a:1:b:c",
            "ent:5:a:1:b:c",
            "ent:1:ab1:b:c",
            "ent:1:a:1:b",
        ] {
            let result = codec.decode(raw);
            assert!(
                matches!(result, Err(DomainError::Validation { .. })),
                "expected validation error for {:?}",
                raw
            );
        }
    }

    #[test]
    fn test_decode_legacy_unsupported() {
        let codec = KeyCodec::new(KeyEncoding::Legacy);
        assert!(codec.decode("entc1a1k1").is_err());
    }

    #[test]
    fn test_key_encoding_from_str() {
        assert_eq!(
            "length_prefixed".parse::<KeyEncoding>().unwrap(),
            KeyEncoding::LengthPrefixed
        );
        assert_eq!("LEGACY".parse::<KeyEncoding>().unwrap(), KeyEncoding::Legacy);
        assert!("base64".parse::<KeyEncoding>().is_err());
    }

    #[test]
    fn test_key_encoding_deserialize_matches_from_str() {
        for name in ["Legacy", "length-prefixed", "LENGTH_PREFIXED", "prefixed"] {
            let parsed: KeyEncoding = serde_json::from_value(serde_json::json!(name)).unwrap();
            assert_eq!(parsed, name.parse::<KeyEncoding>().unwrap());
        }

        let result: Result<KeyEncoding, _> = serde_json::from_value(serde_json::json!("base64"));
        assert!(result.is_err());
    }
}
