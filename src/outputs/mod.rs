//! Turning a change set into notifications.
//!
//! # Submodules
//!
//! - [`message`]: Renders a [`ChangeSet`](crate::diff::ChangeSet) into
//!   size-bounded Telegram HTML messages
//! - [`telegram`]: Delivers rendered messages through the Bot API
//!
//! Rendering is pure and does not depend on whether delivery is enabled; with
//! no bot configured (or on a dry run) the same messages are printed instead.

pub mod message;
pub mod telegram;
