use anyhow::Context as _;
use serde::de::DeserializeOwned;

pub const DEFAULT_RUN_MODE: &str = "dev";

/// Loads layered config for the app named by `APP_NAME` (falls back to `default_app`).
///
/// Sources in order of precedence (last wins):
/// `config/{mode}/base`, `config/{mode}/{app}`, `config/{mode}/{app}.local`, `APP_*` env.
pub fn load_config<T: DeserializeOwned>(default_app: &str) -> anyhow::Result<T> {
    let app_name = std::env::var("APP_NAME").unwrap_or_else(|_| default_app.into());
    let run_mode = std::env::var("APP_RUN_MODE").unwrap_or_else(|_| DEFAULT_RUN_MODE.into());
    load_config_from(&format!("config/{run_mode}"), &app_name)
}

pub fn load_config_from<T: DeserializeOwned>(base_path: &str, app_name: &str) -> anyhow::Result<T> {
    config::Config::builder()
        .add_source(config::File::with_name(&format!("{base_path}/base")).required(false))
        .add_source(config::File::with_name(&format!("{base_path}/{app_name}")).required(true))
        .add_source(
            config::File::with_name(&format!("{base_path}/{app_name}.local")).required(false),
        )
        .add_source(
            config::Environment::default()
                .prefix("APP")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()
        .with_context(|| format!("build config for {app_name} from {base_path}"))?
        .try_deserialize::<T>()
        .context("deserialize config")
}
