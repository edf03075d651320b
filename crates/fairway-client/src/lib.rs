//! # fairway-client
//!
//! The Fairway node: a single-writer actor owning the profile state, the
//! friend roster and the connection table, driving the libp2p endpoint and
//! the retry sweep. Applications talk to it through [`NodeHandle`].

pub mod commands;
pub mod config;
pub mod connections;
pub mod error;
pub mod events;
pub mod node;
pub mod retry;
pub mod state;

use tracing_subscriber::{fmt, EnvFilter};

pub use commands::deep_link::DeepLink;
pub use commands::friends::AddedFriend;
pub use config::NodeConfig;
pub use connections::Connectivity;
pub use error::ClientError;
pub use events::NodeEvent;
pub use node::{EndpointLauncher, LaunchFuture, Node, NodeHandle};

/// Install the global `fmt` subscriber. `RUST_LOG` overrides the default
/// filter. Calling this more than once is harmless.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("fairway_client=debug,fairway_net=debug,fairway_store=info,warn")
    });

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init();
}
