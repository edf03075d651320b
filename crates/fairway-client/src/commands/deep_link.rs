use tracing::warn;
use url::Url;

use fairway_shared::codec::code_param;
use fairway_shared::strip_code_param;

use crate::commands::friends::AddedFriend;
use crate::error::Result;
use crate::node::NodeHandle;

/// What opening a link did.
#[derive(Debug)]
pub struct DeepLink {
    /// The link without its `code` parameter, for display.
    pub cleaned: Url,
    /// `None` if the link carried no code.
    pub friend: Option<Result<AddedFriend>>,
}

impl NodeHandle {
    /// Treat a `code` parameter in `link` as an add-friend action and hand
    /// back the link with the parameter removed. A bad code is reported in
    /// [`DeepLink::friend`]; the cleaned link is returned either way.
    pub async fn handle_deep_link(&self, link: &str) -> Result<DeepLink> {
        let url = Url::parse(link)?;
        let cleaned = strip_code_param(&url);

        let friend = match code_param(&url) {
            Some(code) => {
                let added = self.add_friend(&code).await;
                if let Err(ref e) = added {
                    warn!(error = %e, "deep link carried an unusable code");
                }
                Some(added)
            }
            None => None,
        };

        Ok(DeepLink { cleaned, friend })
    }
}
