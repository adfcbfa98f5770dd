//! `help`: the command table.

use async_trait::async_trait;

use super::{CommandContext, CommandHandler};
use crate::render;

pub struct HelpCommand;

#[async_trait]
impl CommandHandler for HelpCommand {
    async fn handle(&self, _args: &str, ctx: &mut CommandContext<'_>) {
        ctx.display.emphasis(render::heading("Core Commands"));

        let rows: Vec<Vec<String>> = ctx
            .commands
            .iter()
            .map(|d| vec![d.name.to_string(), d.usage.to_string(), d.help.to_string()])
            .collect();
        let table = render::table(&[("Command", 25), ("Usage", 20), ("Description", 30)], &rows);
        ctx.display.plain(format!("{}\n", table));
    }
}
