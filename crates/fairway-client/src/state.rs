//! The profile state owned by the node actor.
//!
//! Everything the sync subsystem mutates lives here: the local name and
//! round history, and the friend roster. Fields of the persisted blob this
//! crate does not interpret are carried along untouched.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use fairway_shared::{Friend, GolferId, MergeOutcome, MergePolicy, ProfileSnapshot, Roster, Round};
use fairway_store::StoredState;

/// Name sent to friends until the user picks one.
pub const DEFAULT_PLAYER_NAME: &str = "Golfer";

/// Local edits that change what friends see.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    ArchiveRound(Round),
    DeleteRound(String),
    ClearHistory,
    SetUserName(String),
}

#[derive(Debug, Clone)]
pub struct ProfileState {
    local_id: GolferId,
    user_name: String,
    /// Most recent first.
    past_rounds: Vec<Round>,
    roster: Roster,
    extra: Map<String, Value>,
}

impl ProfileState {
    pub fn new(local_id: GolferId) -> Self {
        Self::from_stored(local_id, StoredState::default())
    }

    pub fn from_stored(local_id: GolferId, stored: StoredState) -> Self {
        let mut roster = Roster::from_friends(stored.friends);
        if roster.remove(&local_id).is_some() {
            tracing::warn!(golfer_id = %local_id, "dropped self from stored friends");
        }
        Self {
            local_id,
            user_name: stored.user_name,
            past_rounds: stored.past_rounds,
            roster,
            extra: stored.extra,
        }
    }

    pub fn to_stored(&self) -> StoredState {
        StoredState {
            golfer_id: Some(self.local_id.to_string()),
            user_name: self.user_name.clone(),
            past_rounds: self.past_rounds.clone(),
            friends: self.roster.to_vec(),
            extra: self.extra.clone(),
        }
    }

    pub fn local_id(&self) -> &GolferId {
        &self.local_id
    }

    pub fn user_name(&self) -> &str {
        &self.user_name
    }

    pub fn past_rounds(&self) -> &[Round] {
        &self.past_rounds
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    /// A fresh snapshot of the local profile with at most `cap` rounds.
    pub fn snapshot(&self, cap: usize) -> ProfileSnapshot {
        let name = match self.user_name.trim() {
            "" => DEFAULT_PLAYER_NAME,
            name => name,
        };
        ProfileSnapshot::new(self.local_id.clone(), name, &self.past_rounds, cap)
    }

    /// Merge a friend's snapshot. Snapshots carrying the local id are
    /// ignored.
    pub fn merge(
        &mut self,
        snapshot: &ProfileSnapshot,
        policy: MergePolicy,
        now: DateTime<Utc>,
    ) -> MergeOutcome {
        if snapshot.id == self.local_id {
            return MergeOutcome::Unchanged;
        }
        self.roster.merge(snapshot, policy, now)
    }

    pub fn remove_friend(&mut self, id: &GolferId) -> Option<Friend> {
        self.roster.remove(id)
    }

    /// Apply a local edit. Returns whether anything changed.
    pub fn apply(&mut self, action: Action) -> bool {
        match action {
            Action::ArchiveRound(round) => {
                match self.past_rounds.iter_mut().find(|r| r.id == round.id) {
                    Some(existing) if *existing == round => return false,
                    Some(existing) => *existing = round,
                    None => self.past_rounds.insert(0, round),
                }
                true
            }
            Action::DeleteRound(round_id) => {
                let before = self.past_rounds.len();
                self.past_rounds.retain(|r| r.id != round_id);
                self.past_rounds.len() != before
            }
            Action::ClearHistory => {
                let changed = !self.past_rounds.is_empty();
                self.past_rounds.clear();
                changed
            }
            Action::SetUserName(name) => {
                let name = name.trim();
                if name == self.user_name {
                    return false;
                }
                self.user_name = name.to_string();
                true
            }
        }
    }
}
