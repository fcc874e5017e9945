use anyhow::Context as _;
use std::fs;
use utoipa::OpenApi;

const OUTPUT_DIR: &str = "./clients";

fn main() -> anyhow::Result<()> {
    let doc = backend::api::ApiDoc::openapi().to_pretty_json()?;
    fs::create_dir_all(OUTPUT_DIR).context("create clients dir")?;
    let path = format!("{OUTPUT_DIR}/backend_openapi.json");
    fs::write(&path, doc).with_context(|| format!("write {path}"))?;
    Ok(())
}
