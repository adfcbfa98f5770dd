//! `iosrecon` console binary.

mod commands;
mod console;
mod provision;
mod render;

use std::error::Error;
use std::path::PathBuf;
use std::process;

use clap::Parser;
use colored::Colorize;
use iosrecon::options::OptionRegistry;
use log::info;

use crate::console::Console;

#[derive(Parser, Debug)]
#[command(name = "iosrecon")]
#[command(about = "Interactive reconnaissance console for Cisco IOS devices")]
#[command(version)]
struct Cli {
    /// Option definitions to load at startup
    #[arg(short, long, default_value = "config/options.yaml")]
    config: PathBuf,

    /// Console prompt
    #[arg(short, long, default_value = "iosrecon > ")]
    prompt: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    let options = match OptionRegistry::load(&cli.config) {
        Ok(options) => options,
        Err(e) => {
            eprintln!(
                "{}",
                format!("Failed to load options from {}: {}", cli.config.display(), e).red()
            );
            process::exit(1);
        }
    };
    info!("loaded {} options from {}", options.len(), cli.config.display());

    println!("{}", "iosrecon - type 'help' for a list of commands".bold());
    Console::new(options, cli.prompt).run().await;
    Ok(())
}
