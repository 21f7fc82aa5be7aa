//! Identities and record addressing.
//!
//! Every record in Skiff lives in its author's own repository and is
//! addressed by `(author DID, collection, record key)`. The canonical
//! rendering is an `at://` URI, which doubles as the unique key in every
//! local and canonical table.

use crate::error::{Error, Result};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// A decentralized identifier for a repository author.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Did(String);

impl Did {
    /// Parse a DID, requiring the `did:` method prefix.
    pub fn new(s: impl Into<String>) -> Result<Self> {
        let s = s.into();
        if !s.starts_with("did:") || s.len() <= 4 {
            return Err(Error::InvalidDid(s));
        }
        Ok(Self(s))
    }

    /// The DID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Did {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl Serialize for Did {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Did {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Did::new(s).map_err(de::Error::custom)
    }
}

/// The record collections the convergence engine watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Collection {
    /// Board definitions (columns, labels, policy)
    Board,
    /// Tasks on a board
    Task,
    /// Append-only field edits targeting tasks
    Op,
    /// Board-scoped trust grants
    Trust,
    /// Approvals of untrusted content
    Approval,
    /// Task comments
    Comment,
    /// Reactions to tasks or comments
    Reaction,
}

impl Collection {
    /// Every collection the engine subscribes to, in a fixed order.
    pub const ALL: [Collection; 7] = [
        Collection::Board,
        Collection::Task,
        Collection::Op,
        Collection::Trust,
        Collection::Approval,
        Collection::Comment,
        Collection::Reaction,
    ];

    /// The collection NSID as it appears on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Board => "app.skiff.board",
            Collection::Task => "app.skiff.task",
            Collection::Op => "app.skiff.op",
            Collection::Trust => "app.skiff.trust",
            Collection::Approval => "app.skiff.approval",
            Collection::Comment => "app.skiff.comment",
            Collection::Reaction => "app.skiff.reaction",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Collection {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "app.skiff.board" => Ok(Collection::Board),
            "app.skiff.task" => Ok(Collection::Task),
            "app.skiff.op" => Ok(Collection::Op),
            "app.skiff.trust" => Ok(Collection::Trust),
            "app.skiff.approval" => Ok(Collection::Approval),
            "app.skiff.comment" => Ok(Collection::Comment),
            "app.skiff.reaction" => Ok(Collection::Reaction),
            other => Err(Error::UnknownCollection(other.to_string())),
        }
    }
}

impl Serialize for Collection {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Collection {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// The full address of a record: author, collection, and record key.
///
/// Renders as `at://{did}/{collection}/{rkey}`. This is the unique key for
/// every table; ingesting the same URI twice upserts rather than duplicates.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordUri {
    /// The authoring repository
    pub did: Did,
    /// The record collection
    pub collection: Collection,
    /// The record key within the collection
    pub rkey: String,
}

impl RecordUri {
    /// Build a URI from its parts.
    pub fn new(did: Did, collection: Collection, rkey: impl Into<String>) -> Result<Self> {
        let rkey = rkey.into();
        if rkey.is_empty() || rkey.contains('/') {
            return Err(Error::InvalidRecordKey(rkey));
        }
        Ok(Self {
            did,
            collection,
            rkey,
        })
    }
}

impl fmt::Display for RecordUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "at://{}/{}/{}", self.did, self.collection, self.rkey)
    }
}

impl FromStr for RecordUri {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let rest = s
            .strip_prefix("at://")
            .ok_or_else(|| Error::InvalidUri(s.to_string()))?;
        let mut parts = rest.splitn(3, '/');
        let did = parts
            .next()
            .ok_or_else(|| Error::InvalidUri(s.to_string()))?;
        let collection = parts
            .next()
            .ok_or_else(|| Error::InvalidUri(s.to_string()))?;
        let rkey = parts
            .next()
            .ok_or_else(|| Error::InvalidUri(s.to_string()))?;
        RecordUri::new(Did::new(did)?, collection.parse()?, rkey)
    }
}

impl Serialize for RecordUri {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for RecordUri {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn did_requires_method_prefix() {
        assert!(Did::new("did:plc:abc123").is_ok());
        assert!(Did::new("plc:abc123").is_err());
        assert!(Did::new("did:").is_err());
    }

    #[test]
    fn uri_roundtrip() {
        let uri: RecordUri = "at://did:plc:alice/app.skiff.task/3k2aaa".parse().unwrap();
        assert_eq!(uri.did.as_str(), "did:plc:alice");
        assert_eq!(uri.collection, Collection::Task);
        assert_eq!(uri.rkey, "3k2aaa");
        assert_eq!(uri.to_string(), "at://did:plc:alice/app.skiff.task/3k2aaa");
    }

    #[test]
    fn uri_rejects_unknown_collection() {
        let parsed = "at://did:plc:alice/app.other.thing/3k2aaa".parse::<RecordUri>();
        assert!(matches!(parsed, Err(Error::UnknownCollection(_))));
    }

    #[test]
    fn uri_serde_as_string() {
        let uri: RecordUri = "at://did:plc:alice/app.skiff.board/b1".parse().unwrap();
        let json = serde_json::to_string(&uri).unwrap();
        assert_eq!(json, "\"at://did:plc:alice/app.skiff.board/b1\"");
        let back: RecordUri = serde_json::from_str(&json).unwrap();
        assert_eq!(back, uri);
    }
}
