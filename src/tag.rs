//! Tag identifiers as read from the NFC reader.
//!
//! Readers hand back raw UID bytes; configuration files spell UIDs as text.
//! Both are normalized into the same colon-separated uppercase hex form
//! (`04:1E:72:12:BD:2A:81`) so lookups never depend on how a UID was written.

use anyhow::{anyhow, ensure, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Normalized identifier of a physical tag.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TagId(String);

impl TagId {
    /// Build an identifier from raw UID bytes.
    ///
    /// ```
    /// use plushcare::tag::TagId;
    ///
    /// let tag = TagId::from_bytes(&[0x04, 0x1e, 0x72]);
    /// assert_eq!(tag.as_str(), "04:1E:72");
    /// ```
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let hex: Vec<String> = bytes.iter().map(|b| format!("{b:02X}")).collect();
        Self(hex.join(":"))
    }

    /// Parse a textual UID.
    ///
    /// Accepts any case, with `:`, `-` or whitespace between bytes, or a
    /// bare run of hex digits (`041e72`).
    pub fn parse(text: &str) -> Result<Self> {
        Ok(Self::from_bytes(&parse_hex_bytes(text)?))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The raw UID bytes this identifier was built from.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        // Always well-formed: constructed only through `from_bytes`.
        parse_hex_bytes(&self.0).unwrap_or_default()
    }
}

fn parse_hex_bytes(text: &str) -> Result<Vec<u8>> {
    let trimmed = text.trim();
    ensure!(!trimmed.is_empty(), "tag identifier is empty");

    let groups: Vec<&str> = trimmed
        .split(|c: char| c == ':' || c == '-' || c.is_whitespace())
        .filter(|group| !group.is_empty())
        .collect();

    let pairs: Vec<String> = if groups.len() == 1 {
        let digits = groups[0];
        ensure!(
            digits.len() % 2 == 0,
            "tag identifier `{text}` has an odd number of hex digits"
        );
        digits
            .as_bytes()
            .chunks(2)
            .map(|pair| String::from_utf8_lossy(pair).into_owned())
            .collect()
    } else {
        groups.iter().map(|group| (*group).to_string()).collect()
    };

    pairs
        .iter()
        .map(|pair| {
            ensure!(pair.len() <= 2, "`{pair}` is not a single byte in `{text}`");
            u8::from_str_radix(pair, 16)
                .map_err(|e| anyhow!("invalid hex byte `{pair}` in tag identifier `{text}`: {e}"))
        })
        .collect()
}

impl FromStr for TagId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for TagId {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<TagId> for String {
    fn from(tag: TagId) -> Self {
        tag.0
    }
}

impl fmt::Display for TagId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_bytes_uppercases_and_pads() {
        let tag = TagId::from_bytes(&[0x04, 0x0a, 0xbd, 0xff]);
        assert_eq!(tag.as_str(), "04:0A:BD:FF");
    }

    #[test]
    fn test_parse_accepts_common_spellings() {
        let expected = TagId::from_bytes(&[0x1d, 0xdc, 0xaf, 0x27]);

        for text in ["1D:DC:AF:27", "1d:dc:af:27", "1d-dc-af-27", "1d dc af 27", "1ddcaf27", "  1D:DC:AF:27\n"] {
            assert_eq!(TagId::parse(text).unwrap(), expected, "spelling {text:?}");
        }
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(TagId::parse("").is_err());
        assert!(TagId::parse("abc").is_err());
        assert!(TagId::parse("04:ZZ").is_err());
        assert!(TagId::parse("041:1E").is_err());
    }

    #[test]
    fn test_to_bytes_recovers_uid() {
        let tag = TagId::parse("04:1E:72:12:BD:2A:81").unwrap();
        assert_eq!(tag.to_bytes(), vec![0x04, 0x1e, 0x72, 0x12, 0xbd, 0x2a, 0x81]);
    }

    #[test]
    fn test_serde_normalizes_keys() {
        let tag: TagId = serde_json::from_str("\"04:1e:72\"").unwrap();
        assert_eq!(tag.to_string(), "04:1E:72");
        assert_eq!(serde_json::to_string(&tag).unwrap(), "\"04:1E:72\"");
        assert!(serde_json::from_str::<TagId>("\"nope\"").is_err());
    }
}
