use url::Url;

use fairway_shared::{encode_share_code, share_link};

use crate::error::{ClientError, Result};
use crate::node::{NodeCommand, NodeHandle};

impl NodeHandle {
    /// Share code of the current local snapshot.
    pub async fn share_code(&self) -> Result<String> {
        let snapshot = self
            .request(|reply| NodeCommand::Snapshot { cap: None, reply })
            .await?;
        Ok(encode_share_code(&snapshot)?)
    }

    /// `<share base url>?code=<share code>`.
    pub async fn share_link(&self) -> Result<Url> {
        let base = self
            .share_base_url
            .clone()
            .ok_or(ClientError::NoShareBaseUrl)?;
        let code = self.share_code().await?;
        Ok(share_link(&base, &code))
    }
}
