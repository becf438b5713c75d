use std::fs;
use std::path::Path;

use anyhow::Context;
use tracing::info;

const CONFIG_TEMPLATE: &str = r#"# SiteForge configuration

[provider]
# OpenAI-compatible chat completions endpoint
base_url = "http://localhost:8080/v1"
# api_key = "..."            # or set SITEFORGE_API_KEY
timeout_seconds = 180

[provider.models]
standard = "gen-standard"
premium = "gen-premium"

[pricing]
# Customer-facing price reserved per job, in cents
standard_cents = 500
premium_cents = 1500

# Internal token rates, cents per million tokens, keyed by model
[pricing.token_rates.gen-standard]
prompt_cents_per_million = 25
completion_cents_per_million = 125

[pricing.token_rates.gen-premium]
prompt_cents_per_million = 300
completion_cents_per_million = 1500

[validation]
# Total provider calls per job, initial generation included
max_attempts = 3
# Required files smaller than this are a validation error
min_file_bytes = 64

[storage]
data_dir = ".siteforge"
"#;

/// Write the config template and create the data directory.
pub fn init_project(project_root: &Path) -> anyhow::Result<()> {
    let config_path = project_root.join("siteforge.toml");
    if config_path.exists() {
        info!("Config already exists: {}", config_path.display());
    } else {
        fs::write(&config_path, CONFIG_TEMPLATE)
            .with_context(|| format!("failed to write {}", config_path.display()))?;
        info!("Created {}", config_path.display());
    }

    let data_dir = project_root.join(".siteforge");
    fs::create_dir_all(data_dir.join("archives"))
        .with_context(|| format!("failed to create {}", data_dir.display()))?;

    println!("SiteForge initialized at {}", project_root.display());
    println!();
    println!("Next steps:");
    println!("  1. Point [provider] in siteforge.toml at your backend");
    println!("  2. Fund a team:   siteforge team add my-team && siteforge team credit my-team --cents 10000");
    println!("  3. Create a job:  siteforge create --team my-team --prompt \"a bakery landing page\"");
    println!("  4. Run it:        siteforge work");
    Ok(())
}
