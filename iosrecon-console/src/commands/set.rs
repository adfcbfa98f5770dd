//! `set <option> <value>`

use async_trait::async_trait;

use super::{CommandContext, CommandHandler};

pub struct SetCommand;

#[async_trait]
impl CommandHandler for SetCommand {
    async fn handle(&self, args: &str, ctx: &mut CommandContext<'_>) {
        let (key, value) = args.split_once(char::is_whitespace).unwrap_or((args, ""));
        if key.is_empty() {
            ctx.display.error("Usage: set <option> <value>");
            return;
        }

        match ctx.options.set(key, value.trim()) {
            Ok(confirmation) => ctx.display.success(confirmation),
            Err(e) => ctx.display.error(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use iosrecon::display::MessageKind;
    use iosrecon::options::{OptionCell, OptionRegistry};
    use iosrecon::shutdown::Shutdown;

    use crate::commands::CommandRegistry;

    #[tokio::test]
    async fn test_set_rejects_disallowed_value() {
        let registry = CommandRegistry::builtin();
        let mut options = OptionRegistry::new();
        options.register("target", "device_type", OptionCell::new("cisco_ios", "Device family", "cisco_ios"));
        let (sink, mut rx) = iosrecon::display::channel();

        registry
            .dispatch("set device_type juniper", &mut options, &sink, Shutdown::never())
            .await;

        let message = rx.try_recv().unwrap();
        assert_eq!(message.kind, MessageKind::Error);
        assert_eq!(message.text, r#"juniper is not in the list of allowed values: ["cisco_ios"]"#);
        assert_eq!(options.value("device_type"), "cisco_ios");
    }

    #[tokio::test]
    async fn test_set_without_arguments() {
        let registry = CommandRegistry::builtin();
        let mut options = OptionRegistry::new();
        let (sink, mut rx) = iosrecon::display::channel();

        registry.dispatch("set", &mut options, &sink, Shutdown::never()).await;
        assert_eq!(rx.try_recv().unwrap().text, "Usage: set <option> <value>");
    }
}
