//! Shared library for the provisioning helpers.
//!
//! Mediates between an installer process and the udev device-naming
//! subsystem: composes persistent-naming rules, queries and parses the udev
//! property database, and layers multipath detection on top. All external
//! tools are reached through the [`command::CommandRunner`] seam, keeping
//! the parsers and composers pure.

pub mod command;
pub mod error;
pub mod features;
pub mod multipath;
pub mod udev;

pub use command::{CommandOutput, CommandRunner, SystemCommandRunner};
pub use error::ProvisionError;
pub use features::FEATURES;
