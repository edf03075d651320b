//! The local friend roster and the merge of incoming snapshots into it.
//!
//! Under [`MergePolicy::Union`] a merge behaves like a grow-only set keyed
//! by round id:
//! - applying the same snapshot twice changes nothing the second time,
//! - two snapshots from one friend give the same round set in either order,
//! - a round that was merged once is never dropped by a later merge.

use std::cmp::Reverse;
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Friend, GolferId, ProfileSnapshot, Round};

/// How rounds of an already-known friend are reconciled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergePolicy {
    /// Keep every known round, add unknown ones, refresh changed ones.
    #[default]
    Union,
    /// Adopt the incoming round set verbatim. A friend whose device rolled
    /// back loses the rounds it no longer sends.
    Replace,
}

impl std::str::FromStr for MergePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "union" => Ok(Self::Union),
            "replace" => Ok(Self::Replace),
            other => Err(format!("unknown merge policy: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// First snapshot from this golfer; a friend entry was created.
    Added,
    /// The entry changed. `new_rounds` counts round ids not seen before.
    Updated { new_rounds: usize },
    /// Nothing new; the entry is untouched.
    Unchanged,
}

/// All friends, most recently added first. One entry per [`GolferId`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Roster {
    friends: Vec<Friend>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a roster from persisted entries, collapsing duplicate ids.
    pub fn from_friends(friends: Vec<Friend>) -> Self {
        let mut roster = Self::new();
        for friend in friends {
            match roster.position(&friend.id) {
                Some(idx) => {
                    let existing = &mut roster.friends[idx];
                    let merged = union_rounds(&existing.rounds, &friend.rounds);
                    existing.rounds = merged.rounds;
                    existing.last_updated = existing.last_updated.max(friend.last_updated);
                }
                None => {
                    let mut friend = friend;
                    friend.rounds = union_rounds(&[], &friend.rounds).rounds;
                    roster.friends.push(friend);
                }
            }
        }
        roster
    }

    /// Integrate `snapshot` into the roster.
    ///
    /// The friend's name always follows the snapshot. `last_updated` only
    /// moves when something changed, and never backwards.
    pub fn merge(
        &mut self,
        snapshot: &ProfileSnapshot,
        policy: MergePolicy,
        now: DateTime<Utc>,
    ) -> MergeOutcome {
        let Some(idx) = self.position(&snapshot.id) else {
            self.friends.insert(
                0,
                Friend {
                    id: snapshot.id.clone(),
                    name: snapshot.name.clone(),
                    last_updated: now,
                    rounds: union_rounds(&[], &snapshot.rounds).rounds,
                },
            );
            return MergeOutcome::Added;
        };

        let friend = &mut self.friends[idx];
        let name_changed = friend.name != snapshot.name;

        let merged = match policy {
            MergePolicy::Union => union_rounds(&friend.rounds, &snapshot.rounds),
            MergePolicy::Replace => {
                let replaced = union_rounds(&[], &snapshot.rounds);
                let new_rounds = replaced
                    .rounds
                    .iter()
                    .filter(|r| friend.round(&r.id).is_none())
                    .count();
                Merged {
                    changed: replaced.rounds != friend.rounds,
                    new_rounds,
                    rounds: replaced.rounds,
                }
            }
        };

        if !name_changed && !merged.changed {
            return MergeOutcome::Unchanged;
        }

        friend.name = snapshot.name.clone();
        friend.rounds = merged.rounds;
        friend.last_updated = friend.last_updated.max(now);

        MergeOutcome::Updated {
            new_rounds: merged.new_rounds,
        }
    }

    /// Remove a friend. Returns the removed entry, if any.
    pub fn remove(&mut self, id: &GolferId) -> Option<Friend> {
        let idx = self.position(id)?;
        Some(self.friends.remove(idx))
    }

    pub fn get(&self, id: &GolferId) -> Option<&Friend> {
        self.friends.iter().find(|f| &f.id == id)
    }

    pub fn contains(&self, id: &GolferId) -> bool {
        self.get(id).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Friend> {
        self.friends.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = &GolferId> {
        self.friends.iter().map(|f| &f.id)
    }

    pub fn len(&self) -> usize {
        self.friends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.friends.is_empty()
    }

    pub fn to_vec(&self) -> Vec<Friend> {
        self.friends.clone()
    }

    fn position(&self, id: &GolferId) -> Option<usize> {
        self.friends.iter().position(|f| &f.id == id)
    }
}

struct Merged {
    rounds: Vec<Round>,
    changed: bool,
    new_rounds: usize,
}

/// Union by round id. Incoming content wins for ids present on both sides.
fn union_rounds(known: &[Round], incoming: &[Round]) -> Merged {
    let mut by_id: HashMap<&str, &Round> = known.iter().map(|r| (r.id.as_str(), r)).collect();
    let mut changed = false;
    let mut new_rounds = 0;

    for round in incoming {
        match by_id.insert(round.id.as_str(), round) {
            None => {
                new_rounds += 1;
                changed = true;
            }
            Some(previous) if previous != round => changed = true,
            Some(_) => {}
        }
    }

    let rounds = canonical(by_id.into_values().cloned().collect());
    Merged {
        changed: changed || rounds != known,
        rounds,
        new_rounds,
    }
}

/// Most recent first: date descending, then id descending.
fn canonical(mut rounds: Vec<Round>) -> Vec<Round> {
    rounds.sort_by(|a, b| {
        (Reverse(&a.date), Reverse(&a.id)).cmp(&(Reverse(&b.date), Reverse(&b.id)))
    });
    rounds.dedup_by(|a, b| a.id == b.id);
    rounds
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn round(id: &str, date: &str, score: u32) -> Round {
        Round {
            id: id.to_string(),
            course_name: "Riverside".into(),
            date: date.to_string(),
            player_name: "Alex".into(),
            holes: Vec::new(),
            total_score: score,
            total_par: 72,
            total_putts: 30,
        }
    }

    fn snap(id: &str, name: &str, rounds: Vec<Round>) -> ProfileSnapshot {
        ProfileSnapshot {
            id: GolferId::parse(id).unwrap(),
            name: name.into(),
            rounds,
        }
    }

    fn round_ids(roster: &Roster, id: &str) -> Vec<String> {
        let friend = roster.get(&GolferId::parse(id).unwrap()).unwrap();
        friend.rounds.iter().map(|r| r.id.clone()).collect()
    }

    #[test]
    fn test_new_friend_from_snapshot() {
        let mut roster = Roster::new();
        let outcome = roster.merge(&snap("GF-AB12CD34", "Alex", vec![]), MergePolicy::Union, t(0));

        assert_eq!(outcome, MergeOutcome::Added);
        assert_eq!(roster.len(), 1);
        let friend = roster.get(&GolferId::parse("GF-AB12CD34").unwrap()).unwrap();
        assert_eq!(friend.name, "Alex");
        assert!(friend.rounds.is_empty());
        assert_eq!(friend.last_updated, t(0));
    }

    #[test]
    fn test_merge_is_idempotent() {
        let s = snap(
            "GF-1",
            "Alex",
            vec![round("round_2", "2024-05-02", 80), round("round_1", "2024-05-01", 85)],
        );
        let mut roster = Roster::new();
        roster.merge(&s, MergePolicy::Union, t(0));
        let once = roster.clone();

        let outcome = roster.merge(&s, MergePolicy::Union, t(60));
        assert_eq!(outcome, MergeOutcome::Unchanged);
        assert_eq!(roster, once);
    }

    #[test]
    fn test_union_never_loses_rounds() {
        let a = snap("GF-1", "Alex", vec![round("round_1", "2024-05-01", 85)]);
        let b = snap(
            "GF-1",
            "Alex",
            vec![round("round_2", "2024-05-02", 80), round("round_1", "2024-05-01", 85)],
        );
        let rolled_back = snap("GF-1", "Alex", vec![]);

        let mut roster = Roster::new();
        roster.merge(&a, MergePolicy::Union, t(0));
        let outcome = roster.merge(&b, MergePolicy::Union, t(1));
        assert_eq!(outcome, MergeOutcome::Updated { new_rounds: 1 });
        assert_eq!(round_ids(&roster, "GF-1"), vec!["round_2", "round_1"]);

        roster.merge(&rolled_back, MergePolicy::Union, t(2));
        assert_eq!(round_ids(&roster, "GF-1"), vec!["round_2", "round_1"]);
    }

    #[test]
    fn test_merge_order_does_not_matter() {
        let a = snap(
            "GF-1",
            "Alex",
            vec![round("round_1", "2024-05-01", 85), round("round_3", "2024-05-03", 79)],
        );
        let b = snap(
            "GF-1",
            "Alex",
            vec![round("round_2", "2024-05-02", 80), round("round_1", "2024-05-01", 85)],
        );

        let mut ab = Roster::new();
        ab.merge(&a, MergePolicy::Union, t(0));
        ab.merge(&b, MergePolicy::Union, t(1));

        let mut ba = Roster::new();
        ba.merge(&b, MergePolicy::Union, t(0));
        ba.merge(&a, MergePolicy::Union, t(1));

        assert_eq!(round_ids(&ab, "GF-1"), round_ids(&ba, "GF-1"));
        assert_eq!(round_ids(&ab, "GF-1"), vec!["round_3", "round_2", "round_1"]);
    }

    #[test]
    fn test_replace_policy_adopts_incoming_set() {
        let mut roster = Roster::new();
        roster.merge(
            &snap("GF-1", "Alex", vec![round("round_1", "2024-05-01", 85)]),
            MergePolicy::Replace,
            t(0),
        );
        let outcome = roster.merge(
            &snap("GF-1", "Alex", vec![round("round_2", "2024-05-02", 80)]),
            MergePolicy::Replace,
            t(1),
        );
        assert_eq!(outcome, MergeOutcome::Updated { new_rounds: 1 });
        assert_eq!(round_ids(&roster, "GF-1"), vec!["round_2"]);
    }

    #[test]
    fn test_name_always_refreshed() {
        let mut roster = Roster::new();
        roster.merge(&snap("GF-1", "Alex", vec![]), MergePolicy::Union, t(0));
        let outcome = roster.merge(&snap("GF-1", "Alexandra", vec![]), MergePolicy::Union, t(5));

        assert_eq!(outcome, MergeOutcome::Updated { new_rounds: 0 });
        let friend = roster.get(&GolferId::parse("GF-1").unwrap()).unwrap();
        assert_eq!(friend.name, "Alexandra");
        assert_eq!(friend.last_updated, t(5));
    }

    #[test]
    fn test_last_updated_never_moves_backwards() {
        let mut roster = Roster::new();
        roster.merge(&snap("GF-1", "Alex", vec![]), MergePolicy::Union, t(100));
        // clock stepped back on this device
        roster.merge(
            &snap("GF-1", "Alex", vec![round("round_1", "2024-05-01", 85)]),
            MergePolicy::Union,
            t(100) - Duration::seconds(50),
        );
        let friend = roster.get(&GolferId::parse("GF-1").unwrap()).unwrap();
        assert_eq!(friend.last_updated, t(100));
        assert_eq!(friend.rounds.len(), 1);
    }

    #[test]
    fn test_edited_round_content_refreshed() {
        let mut roster = Roster::new();
        roster.merge(
            &snap("GF-1", "Alex", vec![round("round_1", "2024-05-01", 85)]),
            MergePolicy::Union,
            t(0),
        );
        let outcome = roster.merge(
            &snap("GF-1", "Alex", vec![round("round_1", "2024-05-01", 84)]),
            MergePolicy::Union,
            t(1),
        );
        assert_eq!(outcome, MergeOutcome::Updated { new_rounds: 0 });
        let friend = roster.get(&GolferId::parse("GF-1").unwrap()).unwrap();
        assert_eq!(friend.round("round_1").unwrap().total_score, 84);
    }

    #[test]
    fn test_one_entry_per_id() {
        let mut roster = Roster::new();
        roster.merge(&snap("GF-1", "Alex", vec![]), MergePolicy::Union, t(0));
        roster.merge(&snap("GF-2", "Sam", vec![]), MergePolicy::Union, t(1));
        roster.merge(&snap("GF-1", "Alex", vec![]), MergePolicy::Union, t(2));

        assert_eq!(roster.len(), 2);
        let ids: Vec<&str> = roster.ids().map(GolferId::as_str).collect();
        assert_eq!(ids, vec!["GF-2", "GF-1"]);
    }

    #[test]
    fn test_duplicate_round_ids_in_snapshot_collapse() {
        let mut roster = Roster::new();
        roster.merge(
            &snap(
                "GF-1",
                "Alex",
                vec![round("round_1", "2024-05-01", 85), round("round_1", "2024-05-01", 85)],
            ),
            MergePolicy::Union,
            t(0),
        );
        assert_eq!(round_ids(&roster, "GF-1"), vec!["round_1"]);
    }

    #[test]
    fn test_remove_and_from_friends() {
        let mut roster = Roster::new();
        roster.merge(&snap("GF-1", "Alex", vec![]), MergePolicy::Union, t(0));
        let removed = roster.remove(&GolferId::parse("GF-1").unwrap());
        assert!(removed.is_some());
        assert!(roster.is_empty());
        assert!(roster.remove(&GolferId::parse("GF-1").unwrap()).is_none());

        let friend = |rounds| Friend {
            id: GolferId::parse("GF-9").unwrap(),
            name: "Kim".into(),
            last_updated: t(0),
            rounds,
        };
        let rebuilt = Roster::from_friends(vec![
            friend(vec![round("round_1", "2024-05-01", 85)]),
            friend(vec![round("round_2", "2024-05-02", 80)]),
        ]);
        assert_eq!(rebuilt.len(), 1);
        assert_eq!(round_ids(&rebuilt, "GF-9"), vec!["round_2", "round_1"]);
    }

    #[test]
    fn test_merge_policy_from_str() {
        assert_eq!("union".parse::<MergePolicy>(), Ok(MergePolicy::Union));
        assert_eq!(" Replace ".parse::<MergePolicy>(), Ok(MergePolicy::Replace));
        assert!("lww".parse::<MergePolicy>().is_err());
    }
}
