// src/cli/check.rs — `listbot check-config`

use crate::infra::config::Config;

/// Print the resolved configuration with secrets masked.
pub fn check_config(config: &Config) -> anyhow::Result<()> {
    let mut shown = config.clone();
    shown.telegram.bot_token = config.telegram.resolve_token().map(|t| mask(&t));
    shown.vision.api_key = config.vision.resolve_api_key().map(|k| mask(&k));
    println!("{}", toml::to_string_pretty(&shown)?);

    let mut problems = Vec::new();
    if shown.telegram.bot_token.is_none() {
        problems.push("no Telegram bot token (telegram.bot_token or TELEGRAM_BOT_TOKEN)");
    }
    if shown.vision.api_key.is_none() {
        problems.push("no vision API key (vision.api_key or OPENAI_API_KEY)");
    }
    match config.storage.resolve_path() {
        Some(path) => println!("# session store: {}", path.display()),
        None => println!("# session store: disabled"),
    }
    for p in &problems {
        println!("# warning: {p}");
    }
    Ok(())
}

fn mask(secret: &str) -> String {
    let visible: String = secret.chars().take(4).collect();
    format!("{visible}…")
}
