// Address Derivation
//
// Maps an (owner, log path) pair onto a fixed-width log identifier and a
// log identifier plus page index onto a page address. Everything here is
// pure: the engine and the client derive the same addresses independently.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha512};

/// Hex characters taken from the family name hash.
pub const NAMESPACE_PREFIX_LEN: usize = 6;

/// Hex characters taken from the scope hash.
pub const SCOPE_HASH_LEN: usize = 48;

/// Total hex length of a log identifier.
pub const LOG_ID_LEN: usize = NAMESPACE_PREFIX_LEN + SCOPE_HASH_LEN;

/// Zero-padded hex width of the page index suffix.
pub const PAGE_INDEX_WIDTH: usize = 16;

/// Total hex length of a page address.
pub const PAGE_ADDRESS_LEN: usize = LOG_ID_LEN + PAGE_INDEX_WIDTH;

/// Index of the head page of every log.
pub const HEAD_INDEX: u64 = 0;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("invalid length: expected {expected} hex characters, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("not a lowercase hex string: {0:?}")]
    NotHex(String),

    #[error("scope encoding failed: {0}")]
    Encoding(String),
}

/// Address prefix shared by every page of every log in one family.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NamespacePrefix(String);

impl NamespacePrefix {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NamespacePrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fixed-length identifier of one log: `namespace prefix ‖ scope hash`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LogId(String);

impl LogId {
    /// Parse and validate a log identifier.
    pub fn parse(s: &str) -> Result<Self, AddressError> {
        check_hex(s, LOG_ID_LEN)?;
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Namespace prefix this identifier was derived under.
    pub fn namespace(&self) -> &str {
        &self.0[..NAMESPACE_PREFIX_LEN]
    }

    /// Address of the page at `index` within this log.
    pub fn page(&self, index: u64) -> PageAddress {
        derive_page_address(self, index)
    }

    /// Address of the head page.
    pub fn head(&self) -> PageAddress {
        self.page(HEAD_INDEX)
    }
}

impl fmt::Display for LogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for LogId {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for LogId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for LogId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Address of a single page: a log identifier plus a page index.
///
/// Ordering follows the rendered hex string, since both parts are fixed width.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageAddress {
    log_id: LogId,
    index: u64,
}

impl PageAddress {
    /// Parse a 70-character page address.
    pub fn parse(s: &str) -> Result<Self, AddressError> {
        check_hex(s, PAGE_ADDRESS_LEN)?;
        let (log_id, suffix) = s.split_at(LOG_ID_LEN);
        let index =
            u64::from_str_radix(suffix, 16).map_err(|_| AddressError::NotHex(s.to_string()))?;

        Ok(Self {
            log_id: LogId(log_id.to_string()),
            index,
        })
    }

    pub fn log_id(&self) -> &LogId {
        &self.log_id
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn is_head(&self) -> bool {
        self.index == HEAD_INDEX
    }
}

impl fmt::Display for PageAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:016x}", self.log_id, self.index)
    }
}

impl FromStr for PageAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for PageAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PageAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Canonical scope of a log. Field names are part of the address format.
#[derive(Serialize)]
struct LogScope<'a> {
    #[serde(rename = "host")]
    owner: &'a str,
    #[serde(rename = "log")]
    log_path: &'a str,
}

fn sha512_hex(data: &[u8]) -> String {
    hex::encode(Sha512::digest(data))
}

/// Truncated hash of the family name.
pub fn namespace_prefix(family_name: &str) -> NamespacePrefix {
    let mut digest = sha512_hex(family_name.as_bytes());
    digest.truncate(NAMESPACE_PREFIX_LEN);
    NamespacePrefix(digest)
}

/// Derive the identifier of the log `log_path` owned by `owner`.
pub fn derive_log_identifier(
    family_name: &str,
    owner: &str,
    log_path: &str,
) -> Result<LogId, AddressError> {
    let scope = LogScope { owner, log_path };
    let mut encoded = Vec::new();
    ciborium::ser::into_writer(&scope, &mut encoded)
        .map_err(|e| AddressError::Encoding(e.to_string()))?;

    let mut id = namespace_prefix(family_name).0;
    id.push_str(&sha512_hex(&encoded)[..SCOPE_HASH_LEN]);
    Ok(LogId(id))
}

pub fn derive_page_address(log_id: &LogId, index: u64) -> PageAddress {
    PageAddress {
        log_id: log_id.clone(),
        index,
    }
}

/// Page index encoded in the suffix of `address`.
pub fn index_of(address: &PageAddress) -> u64 {
    address.index
}

fn check_hex(s: &str, expected: usize) -> Result<(), AddressError> {
    if s.len() != expected {
        return Err(AddressError::InvalidLength {
            expected,
            actual: s.len(),
        });
    }
    if !s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
        return Err(AddressError::NotHex(s.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespace_prefix_matches_family_hash() {
        assert_eq!(namespace_prefix("alethia").as_str(), "117169");
    }

    #[test]
    fn log_identifier_is_stable() {
        let a = derive_log_identifier("alethia", "www.jonathan.com", "syslog").unwrap();
        let b = derive_log_identifier("alethia", "www.jonathan.com", "syslog").unwrap();

        assert_eq!(a, b);
        assert_eq!(
            a.as_str(),
            "11716976f34c8853dc1f86f94955d574d1ce7910a7eb79fda5dffa"
        );
        assert_eq!(a.as_str().len(), LOG_ID_LEN);
        assert_eq!(a.namespace(), "117169");
    }

    #[test]
    fn distinct_scopes_do_not_collide() {
        let pairs = [
            ("host-a", "app.log"),
            ("host-a", "syslog"),
            ("host-b", "app.log"),
            ("www.website.com", "syslog4"),
            ("host-aapp", ".log"),
        ];

        let mut ids: Vec<_> = pairs
            .iter()
            .map(|(o, p)| derive_log_identifier("alethia", o, p).unwrap())
            .collect();
        ids.sort();
        ids.dedup();

        assert_eq!(ids.len(), pairs.len());
    }

    #[test]
    fn page_address_is_zero_padded() {
        let id = derive_log_identifier("alethia", "host-a", "app.log").unwrap();
        let addr = derive_page_address(&id, 26);

        let rendered = addr.to_string();
        assert_eq!(rendered.len(), PAGE_ADDRESS_LEN);
        assert!(rendered.ends_with("000000000000001a"));
        assert!(rendered.starts_with(id.as_str()));
        assert_eq!(index_of(&addr), 26);
    }

    #[test]
    fn page_address_parses_back() {
        let id = derive_log_identifier("alethia", "host-a", "app.log").unwrap();
        let addr = id.page(u64::MAX);

        let parsed = PageAddress::parse(&addr.to_string()).unwrap();
        assert_eq!(parsed, addr);
        assert_eq!(parsed.index(), u64::MAX);
        assert_eq!(parsed.log_id(), &id);
    }

    #[test]
    fn malformed_addresses_are_rejected() {
        assert!(matches!(
            PageAddress::parse("117169"),
            Err(AddressError::InvalidLength { .. })
        ));

        let upper = "F".repeat(PAGE_ADDRESS_LEN);
        assert!(matches!(
            PageAddress::parse(&upper),
            Err(AddressError::NotHex(_))
        ));

        assert!(LogId::parse(&"g".repeat(LOG_ID_LEN)).is_err());
    }
}
