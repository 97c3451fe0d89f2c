//! Configuration view and validation commands — `prospector config`.

use anyhow::Result;

use prospector::prospector_config::{ENV_DB_PATH, ENV_PORT, ProspectorConfig, ProspectorToml};

use super::super::ConfigCommands;

fn print_toml(toml: &ProspectorToml) {
    println!("[server]");
    println!("  host = \"{}\"", toml.server.host);
    println!("  port = {}", toml.server.port);
    println!("  dev_mode = {}", toml.server.dev_mode);
    println!();
    println!("[database]");
    println!("  path = \"{}\"", toml.database.path);
    println!();
    println!("[logging]");
    println!("  level = \"{}\"", toml.logging.level);
    println!("  format = \"{}\"", toml.logging.format);
    if let Some(file) = &toml.logging.file {
        println!("  file = \"{}\"", file);
    }
    println!();
    println!("[board]");
    println!("  default_sort = \"{}\"", toml.board.default_sort);
    println!();
}

pub fn cmd_config(config: &ProspectorConfig, command: Option<ConfigCommands>) -> Result<()> {
    let config_path = config.config_file();

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Prospector Configuration");
            println!("========================");
            println!();

            if config_path.exists() {
                println!("Config file: {}", config_path.display());
            } else {
                println!("No prospector.toml found at {}", config_path.display());
                println!("Using default configuration:");
            }
            println!();
            print_toml(&config.toml);

            println!("Effective values (with env overrides):");
            println!("  port = {}  ({} overrides)", config.port(), ENV_PORT);
            println!(
                "  db_path = \"{}\"  ({} overrides)",
                config.db_path().display(),
                ENV_DB_PATH
            );
            println!("  default_sort = \"{}\"", config.toml.default_sort());
            println!();
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            if !config_path.exists() {
                println!("No prospector.toml found. Using defaults (valid).");
                return Ok(());
            }

            let warnings = config.validate();
            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                println!("prospector.toml already exists at {}", config_path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }

            std::fs::create_dir_all(&config.config_dir)?;
            ProspectorToml::default().save(&config_path)?;

            println!("Created prospector.toml at {}", config_path.display());
            println!();
            println!("You can now customize:");
            println!("  - [server] host, port, dev_mode");
            println!("  - [database] path");
            println!("  - [logging] level, format, file");
            println!("  - [board] default_sort");
            println!();
        }
    }

    Ok(())
}
