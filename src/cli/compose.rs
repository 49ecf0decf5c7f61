use anyhow::{Result, anyhow};

use super::Workspace;
use crate::characters::{NewCharacter, compose_character_prompt};
use crate::core::AppConfig;

pub async fn run(
    config: &AppConfig,
    info: &str,
    rules: &str,
    save: bool,
    name: Option<String>,
    subtitle: &str,
) -> Result<()> {
    let prompt = compose_character_prompt(info, rules)?;
    println!("{}", prompt);

    if save {
        let name = name.ok_or_else(|| anyhow!("--name is required with --save"))?;
        let mut workspace = Workspace::open(config).await?;
        let created = workspace
            .directory
            .create(&NewCharacter::new(&name, subtitle, &prompt))
            .await?;
        println!("\nSaved as {} ({})", created.name, created.id);
    }

    Ok(())
}
