use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// 32-byte transaction hash
pub type TxHash = [u8; 32];

/// 20-byte account address, rendered as 0x-prefixed lowercase hex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address([u8; 20]);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressParseError {
    #[error("address must be 20 bytes of hex, got {0} characters")]
    BadLength(usize),

    #[error("address contains non-hex characters")]
    BadHex,
}

impl Address {
    pub const ZERO: Address = Address([0u8; 20]);

    pub fn new(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for Address {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let stripped = s.strip_prefix("0x").unwrap_or(s);
        if stripped.len() != 40 {
            return Err(AddressParseError::BadLength(stripped.len()));
        }
        let bytes = hex::decode(stripped).map_err(|_| AddressParseError::BadHex)?;
        let mut out = [0u8; 20];
        out.copy_from_slice(&bytes);
        Ok(Address(out))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A user's named reputation scores, as reported by the scoring provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreSet {
    pub skills: u32,
    pub activity: u32,
    pub identity: u32,
    /// Composite score across all dimensions.
    pub composite: u32,
}

impl ScoreSet {
    pub fn get(&self, field: ScoreField) -> u32 {
        match field {
            ScoreField::Skills => self.skills,
            ScoreField::Activity => self.activity,
            ScoreField::Identity => self.identity,
            ScoreField::Composite => self.composite,
        }
    }
}

/// One named reputation score dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreField {
    Skills,
    Activity,
    Identity,
    Composite,
}

impl fmt::Display for ScoreField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScoreField::Skills => "Skills",
            ScoreField::Activity => "Activity",
            ScoreField::Identity => "Identity",
            ScoreField::Composite => "Composite",
        };
        write!(f, "{name}")
    }
}

/// Sort key accepted by the read API and pushed down to the source.
///
/// `Id` is the stable identity field and the default when no sort (or an
/// unrecognized one) is requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    #[default]
    Id,
    SkillsScore,
    ActivityScore,
    IdentityScore,
    Score,
}

impl SortField {
    /// Parse a query-string value. Unknown values yield `None` so the
    /// caller can fall back to the default.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "id" => Some(SortField::Id),
            "skills_score" => Some(SortField::SkillsScore),
            "activity_score" => Some(SortField::ActivityScore),
            "identity_score" => Some(SortField::IdentityScore),
            "score" => Some(SortField::Score),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SortField::Id => "id",
            SortField::SkillsScore => "skills_score",
            SortField::ActivityScore => "activity_score",
            SortField::IdentityScore => "identity_score",
            SortField::Score => "score",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "asc" => Some(SortOrder::Asc),
            "desc" => Some(SortOrder::Desc),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

/// Public profile attached to a user record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub display_name: String,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub avatar_url: String,
}

/// A scored user as served by the directory.
///
/// Immutable once fetched for a given cache generation: a record is only
/// replaced wholesale when its page is re-fetched from the source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: u64,
    pub wallet: Address,
    pub scores: ScoreSet,
    pub profile: Profile,
}
