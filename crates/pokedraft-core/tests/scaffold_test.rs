// Checks on the files shipped alongside the crates: default config and
// ruleset data.

use std::path::{Path, PathBuf};

use pokedraft_core::draft::ruleset::{self, DEFAULT_ITEM_VALUE};

/// Workspace root, where `defaults/` and `data/` live.
fn root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../..")
}

/// Verify that defaults/server.toml is valid TOML.
#[test]
fn server_toml_is_valid() {
    let content = std::fs::read_to_string(root().join("defaults/server.toml"))
        .expect("defaults/server.toml should exist");
    let parsed: Result<toml::Value, _> = toml::from_str(&content);
    assert!(parsed.is_ok(), "defaults/server.toml is not valid TOML: {:?}", parsed.err());
}

/// Verify that defaults/draft.toml is valid TOML.
#[test]
fn draft_toml_is_valid() {
    let content = std::fs::read_to_string(root().join("defaults/draft.toml"))
        .expect("defaults/draft.toml should exist");
    let parsed: Result<toml::Value, _> = toml::from_str(&content);
    assert!(parsed.is_ok(), "defaults/draft.toml is not valid TOML: {:?}", parsed.err());
}

/// Every shipped ruleset parses and bans at least one item.
#[test]
fn shipped_rulesets_load() {
    let rulesets = ruleset::load_dir(&root().join("data/rulesets"), 9).expect("rulesets should load");
    let ids: Vec<&str> = rulesets.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["sv-little-cup", "sv-ou"]);

    for rs in &rulesets {
        assert!(rs.values.values().any(|v| *v == 0), "{} bans nothing", rs.id);
        assert_eq!(rs.value_of("missingno"), DEFAULT_ITEM_VALUE);
    }
}
