use std::path::Path;

use crate::commands::{build_orchestrator, load_config};
use crate::models::{CreateRequest, ModelTier, OutputKind};

pub struct CreateOptions {
    pub prompt: String,
    pub team: String,
    pub owner: String,
    pub language: String,
    pub tier: ModelTier,
    pub output_kind: OutputKind,
    pub layout: Option<String>,
    pub site_name: Option<String>,
}

/// Create a job: reserve the price and persist it pending. No provider call
/// happens here; `siteforge work` picks the job up.
pub fn create_job(project_root: &Path, options: CreateOptions) -> anyhow::Result<()> {
    let config = load_config(project_root)?;
    let orchestrator = build_orchestrator(project_root, config)?;

    let job = orchestrator.create(CreateRequest {
        prompt: options.prompt,
        language: options.language,
        tier: options.tier,
        output_kind: options.output_kind,
        layout_hint: options.layout,
        site_name: options.site_name,
        owner_id: options.owner,
        team_id: options.team,
    })?;

    println!("{}", job.id);
    Ok(())
}
