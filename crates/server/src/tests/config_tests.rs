use super::{parse_relation_list, prepare_database_url, settings_from};

use std::collections::HashMap;

fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| vars.get(key).cloned()
}

#[test]
fn prepares_database_url_in_sqlite_form() {
    assert_eq!(
        prepare_database_url("./data/test.db"),
        "sqlite://./data/test.db"
    );
    assert_eq!(prepare_database_url("sqlite::memory:"), "sqlite::memory:");
}

#[test]
fn blank_database_url_falls_back_to_default() {
    assert_eq!(prepare_database_url("   "), "sqlite://./data/relations.db");
}

#[test]
fn reads_sortable_relations_from_file() {
    let raw = r#"
bind_addr = "0.0.0.0:9000"
database_url = "sqlite::memory:"

[[sortable]]
parent_entity_type = "post"
relation_name = "tags"

[[sortable]]
parent_entity_type = "playlist"
relation_name = "tracks"
"#;
    let settings = settings_from(Some(raw), env_of(&[])).expect("settings");
    assert_eq!(settings.server_bind, "0.0.0.0:9000");
    assert_eq!(settings.database_url, "sqlite::memory:");
    assert_eq!(settings.sortable_relations.len(), 2);
    assert_eq!(
        settings.sortable_relations[1].relation_name.as_deref(),
        Some("tracks")
    );
}

#[test]
fn environment_overrides_file_values() {
    let raw = r#"
bind_addr = "0.0.0.0:9000"

[[sortable]]
parent_entity_type = "post"
relation_name = "tags"
"#;
    let settings = settings_from(
        Some(raw),
        env_of(&[
            ("SERVER_BIND", "127.0.0.1:1"),
            ("APP__BIND_ADDR", "127.0.0.1:2"),
            ("DATABASE_URL", "sqlite://./a.db"),
            ("APP__SORTABLE_RELATIONS", "gallery:images"),
        ]),
    )
    .expect("settings");

    assert_eq!(settings.server_bind, "127.0.0.1:2");
    assert_eq!(settings.database_url, "sqlite://./a.db");
    assert_eq!(settings.sortable_relations.len(), 1);
    assert_eq!(
        settings.sortable_relations[0].parent_entity_type.as_deref(),
        Some("gallery")
    );
}

#[test]
fn missing_file_keeps_defaults() {
    let settings = settings_from(None, env_of(&[])).expect("settings");
    assert_eq!(settings.server_bind, "127.0.0.1:8443");
    assert!(settings.sortable_relations.is_empty());
}

#[test]
fn malformed_file_is_an_error() {
    assert!(settings_from(Some("sortable = 3"), env_of(&[])).is_err());
}

#[test]
fn relation_list_keeps_missing_halves_empty() {
    let parsed = parse_relation_list(" post:tags , playlist: ,:images, ,gallery");
    assert_eq!(parsed.len(), 4);
    assert_eq!(parsed[0].relation_name.as_deref(), Some("tags"));
    assert_eq!(parsed[1].parent_entity_type.as_deref(), Some("playlist"));
    assert!(parsed[1].relation_name.is_none());
    assert!(parsed[2].parent_entity_type.is_none());
    assert!(parsed[3].relation_name.is_none());
}
