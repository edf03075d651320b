use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::MAX_GOLFER_ID_LEN;
use crate::error::ProfileError;

// Golfer identity = stable per-installation string, also the peer address
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(try_from = "String", into = "String")]
pub struct GolferId(pub(crate) String);

impl GolferId {
    /// Validate an identifier received from outside the process.
    pub fn parse(s: &str) -> Result<Self, ProfileError> {
        let mut chars = s.chars();
        let valid_first = chars.next().is_some_and(|c| c.is_ascii_alphanumeric());
        let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');

        if s.is_empty() {
            return Err(ProfileError::MissingId);
        }
        if !valid_first || !valid_rest || s.len() > MAX_GOLFER_ID_LEN {
            return Err(ProfileError::InvalidId(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for GolferId {
    type Error = ProfileError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<GolferId> for String {
    fn from(id: GolferId) -> Self {
        id.0
    }
}

impl std::fmt::Display for GolferId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shot {
    pub id: String,
    pub club: String,
    /// Carry distance; `null` when the player skipped it.
    pub distance: Option<f64>,
    /// Unix epoch millis.
    pub timestamp: i64,
}

/// Result of a single played hole.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HoleResult {
    pub hole_number: u32,
    pub par: u32,
    #[serde(default)]
    pub shots: Vec<Shot>,
    pub score: u32,
    pub putts: u32,
    #[serde(default)]
    pub gir: bool,
    #[serde(default)]
    pub date: String,
}

/// One archived round. `id` is the only key used for de-duplication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Round {
    pub id: String,
    #[serde(default)]
    pub course_name: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub player_name: String,
    #[serde(default)]
    pub holes: Vec<HoleResult>,
    #[serde(default)]
    pub total_score: u32,
    #[serde(default)]
    pub total_par: u32,
    #[serde(default)]
    pub total_putts: u32,
}

impl Round {
    /// Archive a finished set of holes into a round, computing the totals.
    pub fn from_holes(
        course_name: impl Into<String>,
        date: impl Into<String>,
        player_name: impl Into<String>,
        holes: Vec<HoleResult>,
        archived_at: DateTime<Utc>,
    ) -> Self {
        let total_score = holes.iter().map(|h| h.score).sum();
        let total_par = holes.iter().map(|h| h.par).sum();
        let total_putts = holes.iter().map(|h| h.putts).sum();

        Self {
            id: format!("round_{}", archived_at.timestamp_millis()),
            course_name: course_name.into(),
            date: date.into(),
            player_name: player_name.into(),
            holes,
            total_score,
            total_par,
            total_putts,
        }
    }

    /// Strokes over (positive) or under (negative) par.
    pub fn to_par(&self) -> i64 {
        i64::from(self.total_score) - i64::from(self.total_par)
    }
}

/// The transmissible summary of one golfer: identity plus recent rounds.
///
/// Deserialization always goes through [`RawSnapshot`], so a snapshot that
/// exists as a value has a valid id and a non-empty name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawSnapshot")]
pub struct ProfileSnapshot {
    pub id: GolferId,
    pub name: String,
    pub rounds: Vec<Round>,
}

impl ProfileSnapshot {
    /// Build a snapshot from local history (most recent first), keeping at
    /// most `cap` rounds. The name is trimmed the same way decoding trims it.
    pub fn new(id: GolferId, name: impl Into<String>, rounds: &[Round], cap: usize) -> Self {
        let name: String = name.into();
        Self {
            id,
            name: name.trim().to_string(),
            rounds: rounds.iter().take(cap).cloned().collect(),
        }
    }
}

/// Untrusted snapshot shape as it arrives from a peer or a pasted code.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawSnapshot {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub rounds: Option<Vec<Round>>,
}

impl TryFrom<RawSnapshot> for ProfileSnapshot {
    type Error = ProfileError;

    fn try_from(raw: RawSnapshot) -> Result<Self, Self::Error> {
        let id = raw
            .id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or(ProfileError::MissingId)?;
        let id = GolferId::parse(id)?;

        let name = raw
            .name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .ok_or(ProfileError::MissingName)?;

        let rounds = raw.rounds.unwrap_or_default();
        if rounds.iter().any(|r| r.id.is_empty()) {
            return Err(ProfileError::MissingRoundId);
        }

        Ok(Self { id, name, rounds })
    }
}

/// A remote golfer's replicated profile, stored locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Friend {
    pub id: GolferId,
    pub name: String,
    /// Time of the last merge that changed this entry. Entries written
    /// without one read as the epoch.
    #[serde(with = "chrono::serde::ts_milliseconds", default)]
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub rounds: Vec<Round>,
}

impl Friend {
    pub fn round(&self, round_id: &str) -> Option<&Round> {
        self.rounds.iter().find(|r| r.id == round_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn hole(number: u32, par: u32, score: u32, putts: u32) -> HoleResult {
        HoleResult {
            hole_number: number,
            par,
            shots: Vec::new(),
            score,
            putts,
            gir: score <= par,
            date: "2024-05-01".to_string(),
        }
    }

    #[test]
    fn test_golfer_id_validation() {
        assert!(GolferId::parse("GF-AB12CD34").is_ok());
        assert!(GolferId::parse("peer_7").is_ok());
        assert_eq!(GolferId::parse(""), Err(ProfileError::MissingId));
        assert!(GolferId::parse("-leading-dash").is_err());
        assert!(GolferId::parse("has space").is_err());
        assert!(GolferId::parse(&"A".repeat(65)).is_err());
    }

    #[test]
    fn test_golfer_id_serde_is_plain_string() {
        let id = GolferId::parse("GF-AB12CD34").unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"GF-AB12CD34\"");
        assert!(serde_json::from_str::<GolferId>("\"bad id\"").is_err());
    }

    #[test]
    fn test_round_from_holes_totals() {
        let at = Utc.timestamp_millis_opt(1_714_550_400_000).unwrap();
        let round = Round::from_holes(
            "Pebble Beach",
            "2024-05-01",
            "Alex",
            vec![hole(1, 4, 5, 2), hole(2, 3, 3, 1), hole(3, 5, 4, 2)],
            at,
        );
        assert_eq!(round.id, "round_1714550400000");
        assert_eq!(round.total_score, 12);
        assert_eq!(round.total_par, 12);
        assert_eq!(round.total_putts, 5);
        assert_eq!(round.to_par(), 0);
    }

    #[test]
    fn test_snapshot_requires_id_and_name() {
        let missing_name: Result<ProfileSnapshot, _> =
            serde_json::from_str(r#"{"id":"GF-AB12CD34"}"#);
        assert!(missing_name.is_err());

        let missing_id: Result<ProfileSnapshot, _> = serde_json::from_str(r#"{"name":"Alex"}"#);
        assert!(missing_id.is_err());

        let blank_name = ProfileSnapshot::try_from(RawSnapshot {
            id: Some("GF-AB12CD34".into()),
            name: Some("   ".into()),
            rounds: None,
        });
        assert_eq!(blank_name, Err(ProfileError::MissingName));
    }

    #[test]
    fn test_snapshot_rounds_default_to_empty() {
        let snapshot: ProfileSnapshot =
            serde_json::from_str(r#"{"id":"GF-AB12CD34","name":"Alex"}"#).unwrap();
        assert!(snapshot.rounds.is_empty());
    }

    #[test]
    fn test_snapshot_cap() {
        let at = Utc.timestamp_millis_opt(0).unwrap();
        let rounds: Vec<Round> = (0..30)
            .map(|i| Round {
                id: format!("round_{i}"),
                ..Round::from_holes("c", "d", "p", Vec::new(), at)
            })
            .collect();
        let snapshot =
            ProfileSnapshot::new(GolferId::parse("GF-1").unwrap(), "Alex", &rounds, 20);
        assert_eq!(snapshot.rounds.len(), 20);
        assert_eq!(snapshot.rounds[0].id, "round_0");
    }

    #[test]
    fn test_friend_json_matches_stored_shape() {
        let friend = Friend {
            id: GolferId::parse("GF-AB12CD34").unwrap(),
            name: "Alex".into(),
            last_updated: Utc.timestamp_millis_opt(1_700_000_000_000).unwrap(),
            rounds: Vec::new(),
        };
        let json = serde_json::to_value(&friend).unwrap();
        assert_eq!(json["lastUpdated"], 1_700_000_000_000i64);
        assert_eq!(json["id"], "GF-AB12CD34");
    }

    #[test]
    fn test_friend_without_last_updated() {
        // friends added by older builds carry only the snapshot fields
        let friend: Friend =
            serde_json::from_str(r#"{"id":"GF-FRIEND01","name":"Sam","rounds":[]}"#).unwrap();
        assert_eq!(friend.last_updated.timestamp_millis(), 0);
        assert_eq!(friend.name, "Sam");
    }

    #[test]
    fn test_snapshot_name_is_trimmed() {
        let snapshot = ProfileSnapshot::new(GolferId::parse("GF-1").unwrap(), " 王小明 ", &[], 20);
        assert_eq!(snapshot.name, "王小明");
    }
}
