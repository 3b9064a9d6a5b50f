use console::style;

use super::{Config, ConfigError, settings::CONFIG_FILE_NAME};

/// Print the resolved configuration with the API key masked
#[inline]
pub fn show_config(config: &Config) {
    eprintln!("{}", style("📋 Current Configuration").bold().cyan());
    eprintln!();

    eprintln!("{}", style("Documents:").bold().yellow());
    eprintln!(
        "  Knowledge Base: {}",
        style(config.get_base_dir().join(&config.knowledge_base_path).display()).cyan()
    );
    eprintln!("  Vector Index: {}", style(config.index_path().display()).cyan());
    eprintln!("  Chunk Size: {}", style(config.chunk_size).cyan());
    eprintln!("  Chunk Overlap: {}", style(config.chunk_overlap).cyan());

    eprintln!();
    eprintln!("{}", style("Embeddings:").bold().yellow());
    match config.embedding_url() {
        Ok(url) => eprintln!("  Server: {}", style(url).cyan()),
        Err(e) => eprintln!("  Server: {} ({})", style("Invalid").red(), e),
    }
    eprintln!("  Model: {}", style(&config.embedding_model).cyan());
    eprintln!("  Batch Size: {}", style(config.embedding_batch_size).cyan());

    eprintln!();
    eprintln!("{}", style("Retrieval:").bold().yellow());
    eprintln!("  Top K: {}", style(config.top_k).cyan());
    match config.score_threshold {
        Some(threshold) => eprintln!("  Score Threshold: {}", style(threshold).cyan()),
        None => eprintln!("  Score Threshold: {}", style("disabled").dim()),
    }

    eprintln!();
    eprintln!("{}", style("Language Model:").bold().yellow());
    match config.llm_settings() {
        Some(llm) => {
            eprintln!("  Endpoint: {}", style(&llm.api_base).cyan());
            eprintln!("  API Key: {}", style(mask_secret(&llm.api_key)).cyan());
            eprintln!("  Model: {}", style(&llm.model).cyan());
            eprintln!("  Temperature: {}", style(llm.temperature).cyan());
        }
        None => eprintln!(
            "  {}",
            style("Not configured (answers show retrieved content only)").yellow()
        ),
    }

    eprintln!();
    eprintln!("{}", style("Server:").bold().yellow());
    eprintln!("  Listen: {}", style(config.bind_address()).cyan());
    eprintln!("  Logs: {}", style(config.log_path().display()).cyan());

    eprintln!();
    eprintln!(
        "Config file: {}",
        style(config.get_base_dir().join(CONFIG_FILE_NAME).display()).dim()
    );
}

/// The resolved configuration in `config.toml` form, with the API key masked
#[inline]
pub fn config_toml(config: &Config) -> Result<String, ConfigError> {
    let mut shown = config.clone();
    shown.llm_api_key = shown.llm_api_key.as_deref().map(mask_secret);
    Ok(toml::to_string_pretty(&shown)?)
}

/// Keep the first four characters of a secret
pub(crate) fn mask_secret(secret: &str) -> String {
    let visible: String = secret.chars().take(4).collect();
    if secret.chars().count() <= 4 {
        "****".to_string()
    } else {
        format!("{}****", visible)
    }
}
