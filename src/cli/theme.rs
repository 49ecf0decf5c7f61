use anyhow::Result;

use super::{ThemeArg, Workspace};
use crate::core::AppConfig;
use crate::storage::Theme;

pub async fn run(config: &AppConfig, mode: Option<ThemeArg>) -> Result<()> {
    let workspace = Workspace::open(config).await?;
    let prefs = &workspace.prefs;

    let theme = match mode {
        None => prefs.theme().await,
        Some(ThemeArg::Toggle) => prefs.toggle_theme().await,
        Some(ThemeArg::Light) => {
            prefs.set_theme(Theme::Light).await;
            Theme::Light
        }
        Some(ThemeArg::Dark) => {
            prefs.set_theme(Theme::Dark).await;
            Theme::Dark
        }
    };
    println!("{}", theme);
    Ok(())
}
