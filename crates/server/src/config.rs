use std::fs;

use anyhow::Context;
use serde::Deserialize;
use server_api::RelationSetting;

const CONFIG_FILE: &str = "server.toml";

#[derive(Debug)]
pub struct Settings {
    pub server_bind: String,
    pub database_url: String,
    pub sortable_relations: Vec<RelationSetting>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_bind: "127.0.0.1:8443".into(),
            database_url: "sqlite://./data/relations.db".into(),
            sortable_relations: Vec::new(),
        }
    }
}

/// Shape of `server.toml`. Every key is optional.
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    bind_addr: Option<String>,
    database_url: Option<String>,
    #[serde(default)]
    sortable: Vec<RelationSetting>,
}

pub fn load_settings() -> anyhow::Result<Settings> {
    let raw = match fs::read_to_string(CONFIG_FILE) {
        Ok(raw) => Some(raw),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => None,
        Err(error) => {
            return Err(error).with_context(|| format!("failed to read {CONFIG_FILE}"));
        }
    };
    settings_from(raw.as_deref(), |key| std::env::var(key).ok())
}

/// Layers the file contents and then the environment over the defaults.
/// `APP__*` variables win over their unprefixed forms.
pub fn settings_from(
    file_contents: Option<&str>,
    env: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<Settings> {
    let mut settings = Settings::default();

    if let Some(raw) = file_contents {
        let file_cfg: FileConfig =
            toml::from_str(raw).with_context(|| format!("invalid {CONFIG_FILE}"))?;
        if let Some(v) = file_cfg.bind_addr {
            settings.server_bind = v;
        }
        if let Some(v) = file_cfg.database_url {
            settings.database_url = v;
        }
        settings.sortable_relations = file_cfg.sortable;
    }

    if let Some(v) = env("SERVER_BIND") {
        settings.server_bind = v;
    }
    if let Some(v) = env("APP__BIND_ADDR") {
        settings.server_bind = v;
    }

    if let Some(v) = env("DATABASE_URL") {
        settings.database_url = v;
    }
    if let Some(v) = env("APP__DATABASE_URL") {
        settings.database_url = v;
    }

    if let Some(v) = env("APP__SORTABLE_RELATIONS") {
        settings.sortable_relations = parse_relation_list(&v);
    }

    Ok(settings)
}

/// Parses `post:tags,playlist:tracks`. A missing half is kept as `None` so the
/// registry can say which field was left out.
fn parse_relation_list(raw: &str) -> Vec<RelationSetting> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (parent_type, relation) = entry.split_once(':').unwrap_or((entry, ""));
            RelationSetting {
                parent_entity_type: non_empty(parent_type),
                relation_name: non_empty(relation),
            }
        })
        .collect()
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// The configured database url in `sqlite://` form, or the default when blank.
pub fn prepare_database_url(raw_database_url: &str) -> String {
    if raw_database_url.trim().is_empty() {
        return Settings::default().database_url;
    }
    storage::normalize_database_url(raw_database_url)
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
