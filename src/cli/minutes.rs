use anyhow::{Context, Result};
use serde_json::json;

use crate::core::config::AppConfig;
use crate::core::minutes::{MinutesGenerator, MinutesWriter, parse_minutes};
use crate::core::terminal::print_success;
use crate::platform::{NativePlatform, Platform};

pub(super) async fn run_minutes(file: &str, as_json: bool) -> Result<()> {
    let notes =
        std::fs::read_to_string(file).with_context(|| format!("Failed to read {}", file))?;
    if notes.trim().is_empty() {
        anyhow::bail!("{} is empty", file);
    }

    let config = AppConfig::load(&NativePlatform::data_dir())?;
    crate::logging::init("warn", None)?;
    let generator = MinutesGenerator::from_config(&config)?;
    let minutes = generator.generate_minutes(&notes).await?;

    if as_json {
        let output = json!({
            "mom": minutes,
            "structured": parse_minutes(&minutes),
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("{}\n", minutes);
        print_success("Minutes generated.");
    }
    Ok(())
}
