//! `options`: one table per option namespace.

use async_trait::async_trait;

use super::{CommandContext, CommandHandler};
use crate::render;

/// Options whose values are masked in listings.
const MASKED: &[&str] = &["password", "secret"];

pub struct OptionsCommand;

#[async_trait]
impl CommandHandler for OptionsCommand {
    async fn handle(&self, _args: &str, ctx: &mut CommandContext<'_>) {
        for (namespace, options) in ctx.options.namespaces() {
            ctx.display.emphasis(render::heading(namespace));

            let rows: Vec<Vec<String>> = options
                .iter()
                .map(|(key, cell)| {
                    let value = if MASKED.contains(&key.as_str()) && !cell.value.is_empty() {
                        "********".to_string()
                    } else {
                        cell.value.clone()
                    };
                    vec![key.clone(), value, cell.description.clone()]
                })
                .collect();
            let table = render::table(&[("Option", 25), ("Setting", 20), ("Description", 30)], &rows);
            ctx.display.plain(format!("{}\n", table));
        }
    }
}
