use anyhow::Result;

use crate::core::AppConfig;
use crate::core::db::open_initialized;

pub async fn run(config: &AppConfig) -> Result<()> {
    println!("Initializing db at {}...", config.db_path);
    open_initialized(&config.db_path).await?;
    println!("Finished initializing db");
    Ok(())
}
