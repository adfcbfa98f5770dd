//! High-level driver for device interaction.
//!
//! The driver layer frames device output into [`CommandResult`]s, runs
//! confirmation dialogs and tracks privilege level and shell mode in a
//! [`DeviceSession`].

mod builder;
mod exchange;
mod interactive;
pub(crate) mod response;
mod session;

pub use builder::SessionBuilder;
pub use exchange::{CommandExchange, ExchangeTiming, Expect};
pub use interactive::{Dialog, DialogBuilder, DialogResult, DialogStep, PendingStep};
pub use response::{CommandResult, Completion};
pub use session::{DeviceSession, SessionParams};

#[cfg(test)]
pub(crate) use session::tests as testing;
