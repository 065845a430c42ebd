//! zpoolkit command-line interface: inspect imported pools and discover or
//! import pools found on attached media.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use schemars::schema_for;
use serde_json::to_string_pretty;
use std::path::{Path, PathBuf};
use zpoolkit_core::{
    logging, ExportedZpool, LogCfg, PoolProvider, VdevGroup, Zpool, ZpoolkitConfig,
};
use zpoolkit_zfs::SystemZpoolProvider;

/// Top-level command-line options shared by every subcommand.
#[derive(Parser, Debug)]
#[command(
    name = "zpoolkit",
    version,
    about = "Inspect ZFS pools and import pools found on attached media."
)]
struct Cli {
    /// Path to the zpoolkit configuration file. Defaults apply when it is missing.
    #[arg(short, long, default_value = "/etc/zpoolkit.toml")]
    config: PathBuf,

    /// Raise the log level once per occurrence (`-v` info, `-vv` debug).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List imported pools with capacity and health.
    List {
        /// Emit JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Show one imported pool and its vdev tree.
    Status {
        pool: String,

        #[arg(long)]
        json: bool,
    },

    /// List pools that can be imported, including destroyed ones.
    Importable {
        #[arg(long)]
        json: bool,
    },

    /// Import a pool by numeric identifier or name without mounting datasets.
    Import {
        /// Identifier or name as shown by `importable`.
        target: String,

        /// Force the import even if the pool appears to be in use.
        #[arg(long)]
        force: bool,
    },

    /// Validate a configuration file or emit the config schema.
    Validate {
        #[arg(short = 'f', long, default_value = "/etc/zpoolkit.toml")]
        file: PathBuf,

        /// Output the JSON schema instead of validating a file.
        #[arg(long)]
        schema: bool,
    },
}

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let loaded = ZpoolkitConfig::load_or_default(&cli.config).with_context(|| {
        format!(
            "failed to load configuration from {}",
            cli.config.display()
        )
    });
    logging::init(
        loaded
            .as_ref()
            .map(|cfg| &cfg.log)
            .unwrap_or(&LogCfg::default()),
        cli.verbose,
    );

    match cli.command {
        Commands::List { json } => {
            let pools = system_provider(loaded)?.list_zpools()?;
            if json {
                println!("{}", to_string_pretty(&pools)?);
            } else {
                print_zpool_table(&pools);
            }
        }
        Commands::Status { pool, json } => {
            let pool = system_provider(loaded)?.get_zpool(&pool)?;
            if json {
                println!("{}", to_string_pretty(&pool)?);
            } else {
                print_zpool_table(std::slice::from_ref(&pool));
                print_vdevs(&pool.vdevs);
            }
        }
        Commands::Importable { json } => {
            let pools = system_provider(loaded)?.list_exported()?;
            if json {
                println!("{}", to_string_pretty(&pools)?);
            } else if pools.is_empty() {
                println!("No importable pools found.");
            } else {
                for pool in &pools {
                    print_exported(pool);
                }
            }
        }
        Commands::Import { target, force } => {
            let provider = system_provider(loaded)?;
            let pools = provider.list_exported()?;
            let pool = select_importable(&pools, &target)?;
            provider
                .import_exported(pool, force)
                .with_context(|| format!("failed to import {}", pool.name))?;
            info!("imported {} ({})", pool.name, pool.import_target());
            println!("Imported {} (datasets not mounted).", pool.name);
        }
        Commands::Validate { file, schema } => validate(&file, schema)?,
    }
    Ok(())
}

/// Build the provider from the loaded configuration. A configuration that
/// failed to load only aborts the subcommands that talk to `zpool`.
fn system_provider(config: Result<ZpoolkitConfig>) -> Result<SystemZpoolProvider> {
    Ok(SystemZpoolProvider::from_config(&config?)?)
}

fn validate(file: &Path, schema: bool) -> Result<()> {
    if schema {
        let schema = schema_for!(ZpoolkitConfig);
        println!("{}", to_string_pretty(&schema)?);
        return Ok(());
    }

    let cfg = ZpoolkitConfig::load(file)
        .with_context(|| format!("failed to load configuration from {}", file.display()))?;
    println!(
        "Configuration valid (zpool binary: {}).",
        cfg.zpool_binary_path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "auto-discover".to_string())
    );
    Ok(())
}

/// Pick the importable pool whose identifier or name matches `target`.
/// Identifiers win over names; a name shared by several pools is ambiguous.
fn select_importable<'a>(
    pools: &'a [ExportedZpool],
    target: &str,
) -> Result<&'a ExportedZpool> {
    if let Some(pool) = pools.iter().find(|p| p.id.as_deref() == Some(target)) {
        return Ok(pool);
    }
    let mut named = pools.iter().filter(|p| p.name == target);
    match (named.next(), named.next()) {
        (Some(pool), None) => Ok(pool),
        (Some(_), Some(_)) => {
            bail!("several importable pools are named {target}; use the numeric id")
        }
        (None, _) => bail!("no importable pool matches {target}"),
    }
}

fn print_zpool_table(pools: &[Zpool]) {
    println!(
        "{:<20} {:>14} {:>14} {:>14} {:>6} {:>7} HEALTH",
        "NAME", "SIZE", "ALLOC", "FREE", "FRAG", "DEDUP"
    );
    for pool in pools {
        println!(
            "{:<20} {:>14} {:>14} {:>14} {:>5}% {:>6.2}x {}{}",
            pool.name,
            pool.size,
            pool.allocated,
            pool.free,
            pool.fragmentation,
            pool.dedup_ratio,
            pool.health,
            if pool.read_only { " (read-only)" } else { "" }
        );
    }
}

fn print_vdevs(vdevs: &[VdevGroup]) {
    for group in vdevs {
        println!("  {:<30} {}", group.group.name, group.group.health);
        for device in &group.devices {
            println!("    {:<28} {}", device.name, device.health);
        }
    }
}

fn print_exported(pool: &ExportedZpool) {
    println!("pool:   {}", pool.name);
    println!("id:     {}", pool.id.as_deref().unwrap_or("-"));
    println!("state:  {}", pool.state.as_deref().unwrap_or("-"));
    if let Some(status) = &pool.status {
        println!("status: {status}");
    }
    if let Some(action) = &pool.action {
        println!("action: {action}");
    }
    if let Some(see) = &pool.see {
        println!("see:    {see}");
    }
    print_vdevs(&pool.vdevs);
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(name: &str, id: &str) -> ExportedZpool {
        let mut pool = ExportedZpool::new(name);
        pool.id = Some(id.to_string());
        pool
    }

    #[test]
    fn select_by_id_or_unique_name() {
        let pools = vec![pool("tank", "1"), pool("old", "2"), pool("old", "3")];
        assert_eq!(select_importable(&pools, "3").unwrap().id.as_deref(), Some("3"));
        assert_eq!(select_importable(&pools, "tank").unwrap().name, "tank");
        assert!(select_importable(&pools, "old").is_err());
        assert!(select_importable(&pools, "ghost").is_err());
    }

    #[test]
    fn cli_parses_import_flags() {
        let cli = Cli::try_parse_from(["zpoolkit", "import", "4711", "--force"]).unwrap();
        match cli.command {
            Commands::Import { target, force } => {
                assert_eq!(target, "4711");
                assert!(force);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn verbosity_counts_after_subcommand() {
        let cli = Cli::try_parse_from(["zpoolkit", "-v", "importable", "-v"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.command, Commands::Importable { json: false }));
    }
}
