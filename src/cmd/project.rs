//! Project setup — `prospector init`.

use anyhow::{Context, Result};

use prospector::crm::server::open_database;
use prospector::prospector_config::{ProspectorConfig, ProspectorToml};

pub fn cmd_init(config: &ProspectorConfig) -> Result<()> {
    std::fs::create_dir_all(&config.config_dir).with_context(|| {
        format!(
            "Failed to create config directory: {}",
            config.config_dir.display()
        )
    })?;

    let config_path = config.config_file();
    if config_path.exists() {
        println!("Config already exists at {}", config_path.display());
    } else {
        ProspectorToml::default().save(&config_path)?;
        println!("Created {}", config_path.display());
    }

    let db_path = config.db_path();
    let db = open_database(&db_path)?;
    let count = db.lock_sync()?.count_prospects()?;
    println!(
        "Database ready at {} ({} prospect{})",
        db_path.display(),
        count,
        if count == 1 { "" } else { "s" }
    );
    println!();
    println!("Next: 'prospector add --name <NAME>' or 'prospector serve'.");
    Ok(())
}
