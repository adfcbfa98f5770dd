//! # iosrecon
//!
//! Session, reconnaissance and transfer engine for Cisco IOS devices driven
//! over an interactive SSH shell.
//!
//! The device offers no API, only a human-oriented CLI. Everything here is
//! built from literal commands and literal responses framed by prompts:
//!
//! - [`channel`]: the byte stream to the shell, and prompt-aware buffering
//! - [`driver`]: command exchange, confirmation dialogs and the privilege /
//!   mode state machine ([`DeviceSession`])
//! - [`recon`]: network discovery, ping sweeps and port scans through the
//!   on-device `iosmap.tcl`
//! - [`transfer`]: TFTP/FTP copies into flash, flash housekeeping, proxy launch
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use iosrecon::{SessionBuilder, recon};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), iosrecon::Error> {
//!     let mut session = SessionBuilder::new("192.168.1.1")
//!         .username("admin")
//!         .password("cisco")
//!         .secret("enable-secret")
//!         .platform("cisco_ios")
//!         .connect()
//!         .await?;
//!
//!     session.escalate_privilege().await?;
//!     for network in recon::discover_networks(&mut session).await? {
//!         println!("{}", network);
//!     }
//!
//!     session.close().await?;
//!     Ok(())
//! }
//! ```

pub mod channel;
pub mod display;
pub mod driver;
pub mod error;
pub mod options;
pub mod platform;
pub mod recon;
pub mod shutdown;
pub mod transfer;
pub mod transport;

// Re-export main types for convenience
pub use driver::{CommandResult, DeviceSession, Dialog, ExchangeTiming, SessionBuilder};
pub use error::Error;
pub use platform::{PlatformDefinition, SessionState};
pub use transport::{AuthMethod, SshConfig};
