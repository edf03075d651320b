use tracing::info;

use fairway_shared::{decode_share_code, Friend, GolferId, MergeOutcome};

use crate::connections::Connectivity;
use crate::error::{ClientError, Result};
use crate::node::{NodeCommand, NodeHandle};

/// Result of adding a friend from a share code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddedFriend {
    pub id: GolferId,
    pub name: String,
    /// `Added` for a new friend, otherwise what the code changed.
    pub outcome: MergeOutcome,
}

impl AddedFriend {
    pub fn is_new(&self) -> bool {
        self.outcome == MergeOutcome::Added
    }
}

impl NodeHandle {
    /// Add (or refresh) a friend from a pasted code, link or message, then
    /// try to connect to them.
    ///
    /// An invalid code leaves the roster untouched.
    pub async fn add_friend(&self, input: &str) -> Result<AddedFriend> {
        let snapshot = decode_share_code(input)?;
        if &snapshot.id == self.local_id() {
            return Err(ClientError::OwnCode);
        }

        let id = snapshot.id.clone();
        let name = snapshot.name.clone();
        let outcome = self
            .request(|reply| NodeCommand::AddFriend { snapshot, reply })
            .await?;
        info!(friend = %id, outcome = ?outcome, "add friend");

        Ok(AddedFriend { id, name, outcome })
    }

    /// Remove a friend and close any connection to them.
    pub async fn remove_friend(&self, id: &GolferId) -> Result<bool> {
        let id = id.clone();
        self.request(|reply| NodeCommand::RemoveFriend { id, reply })
            .await
    }

    /// The roster, most recently added first.
    pub async fn friends(&self) -> Result<Vec<Friend>> {
        self.request(|reply| NodeCommand::Friends { reply }).await
    }

    pub async fn friend(&self, id: &GolferId) -> Result<Option<Friend>> {
        Ok(self.friends().await?.into_iter().find(|f| &f.id == id))
    }

    pub async fn connectivity(&self, id: &GolferId) -> Result<Connectivity> {
        let id = id.clone();
        self.request(|reply| NodeCommand::Connectivity { id, reply })
            .await
    }

    /// Sync with one friend now: push to them if connected, otherwise start
    /// a connection attempt without waiting for the next sweep.
    pub async fn sync_now(&self, id: &GolferId) -> Result<()> {
        let id = id.clone();
        self.request(|reply| NodeCommand::SyncNow { id, reply })
            .await?
    }
}
