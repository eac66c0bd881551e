use std::path::Path;

use anyhow::{Context, Result};
use latch_storage::MemoryRoster;

use super::load_settings;

pub fn run(path: &Path) -> Result<()> {
    let settings = load_settings(path)?;
    print!("{}", settings.to_toml_string()?);

    let roster_path = &settings.roster.path;
    if roster_path.exists() {
        let roster = MemoryRoster::load(roster_path)
            .with_context(|| format!("invalid roster {}", roster_path.display()))?;
        println!("# roster: {} members", roster.len());
    } else {
        println!("# roster: {} does not exist yet", roster_path.display());
    }
    Ok(())
}
