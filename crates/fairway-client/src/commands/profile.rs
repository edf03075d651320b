use fairway_shared::{ProfileSnapshot, Round};

use crate::error::Result;
use crate::node::{NodeCommand, NodeHandle};
use crate::state::Action;

impl NodeHandle {
    async fn update(&self, action: Action) -> Result<bool> {
        self.request(|reply| NodeCommand::Update { action, reply })
            .await
    }

    /// Archive a finished round (or replace the round with the same id).
    /// Connected friends receive the new snapshot right away.
    pub async fn archive_round(&self, round: Round) -> Result<bool> {
        self.update(Action::ArchiveRound(round)).await
    }

    pub async fn delete_round(&self, round_id: &str) -> Result<bool> {
        self.update(Action::DeleteRound(round_id.to_string())).await
    }

    pub async fn clear_history(&self) -> Result<bool> {
        self.update(Action::ClearHistory).await
    }

    pub async fn set_user_name(&self, name: &str) -> Result<bool> {
        self.update(Action::SetUserName(name.to_string())).await
    }

    /// The local profile with its full round history.
    pub async fn profile(&self) -> Result<ProfileSnapshot> {
        self.request(|reply| NodeCommand::Snapshot {
            cap: Some(usize::MAX),
            reply,
        })
        .await
    }
}
