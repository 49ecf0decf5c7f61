use anyhow::{Result, anyhow};

use super::{CharacterCommand, Workspace};
use crate::characters::{Character, NewCharacter};
use crate::core::AppConfig;

pub fn print_character(character: &Character, active: bool) {
    let marker = if active { "*" } else { " " };
    if character.subtitle.is_empty() {
        println!("{} {}  {}", marker, character.id, character.name);
    } else {
        println!(
            "{} {}  {} - {}",
            marker, character.id, character.name, character.subtitle
        );
    }
}

pub async fn run(config: &AppConfig, command: CharacterCommand) -> Result<()> {
    let mut workspace = Workspace::open(config).await?;
    let directory = &mut workspace.directory;
    directory.restore().await;

    match command {
        CharacterCommand::List {} => {
            let active_id = directory.active().id.clone();
            for character in directory.list() {
                print_character(character, character.id == active_id);
            }
        }
        CharacterCommand::Create {
            name,
            subtitle,
            prompt,
        } => {
            let created = directory
                .create(&NewCharacter::new(&name, &subtitle, &prompt))
                .await?;
            println!("Created {} ({})", created.name, created.id);
        }
        CharacterCommand::Update {
            id,
            name,
            subtitle,
            prompt,
        } => {
            let current = directory
                .get(&id)
                .cloned()
                .ok_or_else(|| anyhow!("No character with id {}", id))?;
            let changes = NewCharacter::new(
                name.as_deref().unwrap_or(&current.name),
                subtitle.as_deref().unwrap_or(&current.subtitle),
                prompt.as_deref().unwrap_or(&current.prompt),
            );
            let updated = directory.update(&id, &changes).await?;
            println!("Updated {} ({})", updated.name, updated.id);
        }
        CharacterCommand::Delete { id } => {
            directory.delete(&id).await?;
            println!("Deleted {}", id);
        }
    }

    Ok(())
}

pub async fn select(config: &AppConfig, id: &str) -> Result<()> {
    let mut workspace = Workspace::open(config).await?;
    let directory = &mut workspace.directory;
    directory.load().await;
    if directory.get(id).is_none() {
        return Err(anyhow!("No character with id {}", id));
    }
    let active = directory.select(id).await;
    println!("Now chatting with {}", active.name);
    Ok(())
}
