//! Command line surface of the `posewatch` binary.

use anyhow::Result;
use clap::{Parser, Subcommand};
use vision::{PipelineCliArgs, PipelineConfig, PluginRegistry, plugins::builtin};

#[derive(Debug, Parser)]
#[command(
    name = "posewatch",
    version,
    about = "Live pose and hand monitor with pluggable alert routines",
    args_conflicts_with_subcommands = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
    /// Arguments for the default `run` command.
    #[command(flatten)]
    pub run: PipelineCliArgs,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Open the camera, run the pipeline and serve the viewer (default).
    Run(PipelineCliArgs),
    /// List the built-in plugins and exit.
    Plugins,
}

pub fn dispatch(cli: Cli) -> Result<()> {
    match cli.command {
        Some(Command::Run(args)) => vision::run(PipelineConfig::try_from(args)?),
        Some(Command::Plugins) => {
            print_plugins();
            Ok(())
        }
        None => vision::run(PipelineConfig::try_from(cli.run)?),
    }
}

fn print_plugins() {
    let registry = PluginRegistry::discover(&builtin::catalog());
    println!("{:<14} {:<20} {:<10} {:<8} {:<10} default", "ID", "NAME", "CATEGORY", "VERSION", "NEEDS");
    for plugin in registry.descriptors() {
        let needs = match (plugin.requires_keypoints, plugin.requires_hands) {
            (true, true) => "pose+hands",
            (true, false) => "pose",
            (false, true) => "hands",
            (false, false) => "-",
        };
        let default = if builtin::DEFAULT_ENABLED.contains(&plugin.id.as_str()) {
            "on"
        } else {
            "off"
        };
        println!(
            "{:<14} {:<20} {:<10} {:<8} {:<10} {default}",
            plugin.id, plugin.display_name, plugin.category, plugin.version, needs
        );
        println!("{:<14} {}", "", plugin.description);
    }
}
