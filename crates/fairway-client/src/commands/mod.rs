//! User-facing operations on a running node, grouped by concern.
//!
//! Each operation is a method on [`crate::NodeHandle`] that validates its
//! input on the caller's task and forwards a command to the node actor.

pub mod deep_link;
pub mod friends;
pub mod profile;
pub mod share;
