//! Marionette CLI
//!
//! Command-line controller for inspecting a running target process
//! through a marionette agent: list modules, dump reconstructed types,
//! find live instances and inspect pinned objects.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use marionette_client::{RemoteSession, SessionConfig};
use marionette_common::logging::{init_debug_logging, init_logging};
use tracing::debug;

#[derive(Parser, Debug)]
#[command(name = "marionette")]
#[command(about = "Inspect and drive objects inside a running target process")]
struct Args {
    /// Path to a TOML session config
    #[arg(long)]
    config: Option<String>,

    /// Agent host to connect to
    #[arg(long)]
    host: Option<String>,

    /// Agent port to connect to
    #[arg(long)]
    port: Option<u16>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check the agent responds
    Ping,

    /// List modules loaded in the target
    Modules,

    /// Dump a type's reconstructed members
    DumpType {
        /// Full type name (e.g. "Game.Player")
        full_name: String,

        /// Owning module, when known
        #[arg(long)]
        module: Option<String>,
    },

    /// List live instances of a type
    Instances {
        /// Full type name to search the heap for
        full_name: String,
    },

    /// Inspect the pinned object at an address
    Inspect {
        /// Remote address, hex ("0x1a2b") or decimal
        address: String,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => SessionConfig::from_file(path)
            .with_context(|| format!("failed to load config from {path}"))?,
        None => SessionConfig::default(),
    };
    if let Some(host) = &args.host {
        config.agent_host = host.clone();
    }
    if let Some(port) = args.port {
        config.agent_port = port;
    }

    if args.verbose {
        init_debug_logging();
    } else {
        init_logging(&config.logging);
    }

    debug!(
        target: "marionette::cli",
        addr = %config.agent_addr(),
        "Connecting to agent"
    );
    let session = RemoteSession::connect(&config)
        .with_context(|| format!("failed to connect to agent at {}", config.agent_addr()))?;

    match args.command {
        Commands::Ping => {
            session.ping()?;
            println!("agent at {} is alive", config.agent_addr());
        }
        Commands::Modules => {
            let modules = session.modules()?;
            println!("{} module(s) loaded:", modules.len());
            for module in modules {
                match module.base_address {
                    Some(base) => println!("  {:<40} {} @ {base:#x}", module.name, module.runtime),
                    None => println!("  {:<40} {}", module.name, module.runtime),
                }
            }
        }
        Commands::DumpType { full_name, module } => {
            let proxy = session.get_type(module.as_deref(), &full_name)?;
            print_type(proxy.type_node());
        }
        Commands::Instances { full_name } => {
            let candidates = session.instances_of(&full_name)?;
            if candidates.is_empty() {
                println!("no live instances of {full_name}");
            } else {
                println!("{} instance(s) of {full_name}:", candidates.len());
                for candidate in candidates {
                    println!("  {:#x}", candidate.address);
                }
            }
        }
        Commands::Inspect { address } => {
            let address = parse_address(&address)?;
            let object = session.object_at(address)?;
            let node = object.type_node().clone();
            println!("{} @ {address:#x}", node.full_name);
            for (_, field) in node.fields.iter() {
                match object.get(&field.name) {
                    Ok(value) => println!("  {:<30} = {value:?}", field.name),
                    Err(e) => println!("  {:<30} <unreadable: {e}>", field.name),
                }
            }
            object.release()?;
        }
    }

    session.close();
    Ok(())
}

fn print_type(node: &marionette_client::TypeNode) {
    println!("{} [{}] (module {})", node.full_name, node.runtime, node.module);
    if let Some(base) = &node.base {
        println!("  base: {}", base.full_name());
    }
    if node.constructors.count() > 0 {
        println!("  constructors:");
        for (_, ctor) in node.constructors.iter() {
            println!("    .ctor/{}", ctor.arity());
        }
    }
    if node.methods.count() > 0 {
        println!("  methods:");
        for (_, method) in node.methods.iter() {
            let generics = if method.generic_params.is_empty() {
                String::new()
            } else {
                format!("<{}>", method.generic_params.join(", "))
            };
            println!("    {}{generics}/{}", method.name, method.arity());
        }
    }
    if node.fields.count() > 0 {
        println!("  fields:");
        for (_, field) in node.fields.iter() {
            println!("    {}: {}", field.name, field.binding.full_name());
        }
    }
    if node.properties.count() > 0 {
        println!("  properties:");
        for (_, property) in node.properties.iter() {
            println!("    {}: {}", property.name, property.binding.full_name());
        }
    }
    if node.events.count() > 0 {
        println!("  events:");
        for (_, event) in node.events.iter() {
            println!("    {}: {}", event.name, event.binding.full_name());
        }
    }
    if !node.vtable_entries.is_empty() {
        println!("  vtable:");
        for entry in &node.vtable_entries {
            println!("    [{}] {} @ {:#x}", entry.slot, entry.name, entry.address);
        }
    }
}

fn parse_address(text: &str) -> Result<u64> {
    let parsed = if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16)
    } else {
        text.parse()
    };
    match parsed {
        Ok(0) => bail!("address 0 is the null sentinel"),
        Ok(address) => Ok(address),
        Err(_) => bail!("invalid address '{text}'"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_parse_address_forms() {
        assert_eq!(parse_address("0x1A2B").unwrap(), 0x1A2B);
        assert_eq!(parse_address("4096").unwrap(), 4096);
        assert!(parse_address("0x0").is_err());
        assert!(parse_address("nonsense").is_err());
    }

    #[test]
    fn test_subcommand_parsing() {
        let args = Args::parse_from(["marionette", "--port", "4000", "dump-type", "Game.Player"]);
        assert_eq!(args.port, Some(4000));
        assert!(matches!(args.command, Commands::DumpType { ref full_name, .. } if full_name == "Game.Player"));
    }
}
