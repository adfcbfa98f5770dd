//! Console commands.
//!
//! Each command is a [`CommandHandler`] registered under a name in a
//! [`CommandRegistry`]. The registry is built from a fixed list; there is no
//! self-registration.

mod help;
mod options;
mod run;
mod set;

use async_trait::async_trait;
use indexmap::IndexMap;
use iosrecon::display::DisplaySink;
use iosrecon::options::OptionRegistry;
use iosrecon::shutdown::Shutdown;
use log::debug;

/// State a command may read or change.
pub struct CommandContext<'a> {
    pub options: &'a mut OptionRegistry,
    pub display: &'a DisplaySink,
    pub shutdown: Shutdown,
    pub commands: &'a CommandRegistry,
}

/// A console command.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Run with everything after the command name.
    async fn handle(&self, args: &str, ctx: &mut CommandContext<'_>);
}

/// A registered command and its help text.
pub struct CommandDescriptor {
    pub name: &'static str,
    pub usage: &'static str,
    pub help: &'static str,
    pub handler: Box<dyn CommandHandler>,
}

impl CommandDescriptor {
    pub fn new(
        name: &'static str,
        usage: &'static str,
        help: &'static str,
        handler: impl CommandHandler + 'static,
    ) -> Self {
        Self {
            name,
            usage,
            help,
            handler: Box::new(handler),
        }
    }
}

/// Commands by name, in registration order.
#[derive(Default)]
pub struct CommandRegistry {
    commands: IndexMap<&'static str, CommandDescriptor>,
}

impl CommandRegistry {
    pub fn new(descriptors: Vec<CommandDescriptor>) -> Self {
        let mut commands = IndexMap::new();
        for descriptor in descriptors {
            commands.entry(descriptor.name).or_insert(descriptor);
        }
        Self { commands }
    }

    /// The console's command set.
    pub fn builtin() -> Self {
        Self::new(vec![
            CommandDescriptor::new(
                "help",
                "help",
                "Print all available commands",
                help::HelpCommand,
            ),
            CommandDescriptor::new(
                "options",
                "options",
                "Print all available options",
                options::OptionsCommand,
            ),
            CommandDescriptor::new(
                "set",
                "set <option> <value>",
                "Change the value of an option",
                set::SetCommand,
            ),
            CommandDescriptor::new(
                "run",
                "run",
                "Connect to the target device and start reconnaissance",
                run::RunCommand::default(),
            ),
        ])
    }

    pub fn get(&self, name: &str) -> Option<&CommandDescriptor> {
        self.commands.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CommandDescriptor> {
        self.commands.values()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Route one input line to its command.
    pub async fn dispatch(
        &self,
        line: &str,
        options: &mut OptionRegistry,
        display: &DisplaySink,
        shutdown: Shutdown,
    ) {
        let line = line.trim();
        let (name, args) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        if name.is_empty() {
            return;
        }

        let Some(descriptor) = self.get(name) else {
            display.error(format!("Unknown command '{}'. Type 'help' for a list.", name));
            return;
        };

        debug!("console: dispatching '{}'", name);
        let mut ctx = CommandContext {
            options,
            display,
            shutdown,
            commands: self,
        };
        descriptor.handler.handle(args.trim(), &mut ctx).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use iosrecon::display::MessageKind;
    use iosrecon::options::OptionCell;

    fn options() -> OptionRegistry {
        let mut options = OptionRegistry::new();
        options.register("target", "host", OptionCell::new("", "Target device address", ""));
        options.register("docker", "enable_docker", OptionCell::new("false", "Provision decoys", "true,false"));
        options
    }

    #[test]
    fn test_builtin_order() {
        let registry = CommandRegistry::builtin();
        let names: Vec<&str> = registry.iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["help", "options", "set", "run"]);
    }

    #[tokio::test]
    async fn test_dispatch_set() {
        let registry = CommandRegistry::builtin();
        let mut options = options();
        let (sink, mut rx) = iosrecon::display::channel();

        registry
            .dispatch("set host 10.0.0.1", &mut options, &sink, Shutdown::never())
            .await;
        assert_eq!(options.value("host"), "10.0.0.1");
        let message = rx.try_recv().unwrap();
        assert_eq!(message.kind, MessageKind::Success);
        assert_eq!(message.text, "host => 10.0.0.1");
    }

    #[tokio::test]
    async fn test_dispatch_unknown_and_blank() {
        let registry = CommandRegistry::builtin();
        let mut options = options();
        let (sink, mut rx) = iosrecon::display::channel();

        registry.dispatch("   ", &mut options, &sink, Shutdown::never()).await;
        assert!(rx.try_recv().is_err());

        registry.dispatch("scan 10.0.0.1", &mut options, &sink, Shutdown::never()).await;
        assert_eq!(rx.try_recv().unwrap().kind, MessageKind::Error);
    }

    #[tokio::test]
    async fn test_help_lists_commands() {
        let registry = CommandRegistry::builtin();
        let mut options = options();
        let (sink, mut rx) = iosrecon::display::channel();

        registry.dispatch("help", &mut options, &sink, Shutdown::never()).await;
        let mut text = String::new();
        while let Ok(message) = rx.try_recv() {
            text.push_str(&message.text);
        }
        for name in ["help", "options", "set <option> <value>", "run"] {
            assert!(text.contains(name));
        }
    }

    #[tokio::test]
    async fn test_options_lists_namespaces() {
        let registry = CommandRegistry::builtin();
        let mut options = options();
        let (sink, mut rx) = iosrecon::display::channel();

        registry.dispatch("options", &mut options, &sink, Shutdown::never()).await;
        let mut text = String::new();
        while let Ok(message) = rx.try_recv() {
            text.push_str(&message.text);
        }
        assert!(text.contains("target"));
        assert!(text.contains("enable_docker"));
        assert!(text.contains("Provision decoys"));
    }
}
