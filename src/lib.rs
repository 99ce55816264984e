//! Contextual action menu for tree-structured explorer panels.
//!
//! Sources register named actions per context type ([`actions::registry`]),
//! the menu composer ranks them by recent use and bound keys
//! ([`actions::menu`]), and the dispatcher runs the chosen entry against the
//! selected nodes ([`actions::dispatcher`]). Host calls that switch windows
//! or buffers go through the focus gate ([`events`]) so the panel does not
//! react to its own focus changes.

pub mod actions;
pub mod config;
pub mod events;
pub mod explorer;
pub mod host;
pub mod input;
pub mod services;
pub mod sources;
pub mod view;
