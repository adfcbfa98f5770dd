//! Cisco IOS platform definition.
//!
//! Prompt shapes:
//!
//! ```text
//! router>          # user EXEC
//! router#          # privileged EXEC
//! router(tcl)#     # interactive Tcl interpreter (tclsh)
//! ```
//!
//! Marker strings come from classic IOS 12.x/15.x output, e.g.
//!
//! ```text
//! Destination filename [iosmap.tcl]?
//! Accessing tftp://10.0.0.2/iosmap.tcl...
//! %Error opening tftp://10.0.0.2/iosmap.tcl (Timed out)
//! 1024 bytes copied in 0.512 secs (2000 bytes/sec)
//! Delete flash:/iosmap.tcl? [confirm]
//! ```

use crate::platform::{
    MarkerTable, Mode, PlatformDefinition, Privilege, PromptLevel, ScriptPaths,
};

/// Markers for IOS 12.x / 15.x.
pub fn markers() -> MarkerTable {
    MarkerTable {
        firmware: "ios-15".to_string(),
        error: "%".to_string(),
        copied: "bytes copied".to_string(),
        timed_out: "timed out".to_string(),
        filename_prompt: "]?".to_string(),
        confirm_prompt: "]".to_string(),
    }
}

/// Create the Cisco IOS platform definition.
pub fn platform() -> PlatformDefinition {
    let scripting = PromptLevel::new(
        Privilege::Privileged,
        Mode::Scripting,
        r"(?m)^[\w.\-@/:]{1,63}\(tcl\)#\s?$",
    )
    .unwrap();

    let privileged = PromptLevel::new(
        Privilege::Privileged,
        Mode::Shell,
        r"(?m)^[\w.\-@/:]{1,63}#\s?$",
    )
    .unwrap()
    .with_not_contains("(config");

    let unprivileged = PromptLevel::new(
        Privilege::Unprivileged,
        Mode::Shell,
        r"(?m)^[\w.\-@/:]{1,63}>\s?$",
    )
    .unwrap();

    let scripts = ScriptPaths {
        mapper: "flash:iosmap.tcl".to_string(),
        proxy: "flash:/iosproxy.tcl".to_string(),
    };

    PlatformDefinition::new("cisco_ios", markers(), scripts)
        .with_prompt(scripting)
        .with_prompt(privileged)
        .with_prompt(unprivileged)
        .with_password_prompt("assword:")
        .with_on_open_command("terminal length 0")
        .with_terminal_size(511, 24)
}
