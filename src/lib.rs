//! Canned reply — Gmail auto-responder for an allow-list of senders.

pub mod auth;
pub mod committer;
pub mod config;
pub mod consent;
pub mod decider;
pub mod error;
pub mod inspector;
pub mod labels;
pub mod mailbox;
pub mod mime;
pub mod poller;
pub mod senders;

#[cfg(test)]
mod testing;
