use sekisyo_license::{LicenseState, LicenseStore, SqliteLicenseStore};
use sekisyo_server::{build_registry, ServerConfig};
use tempfile::TempDir;

const CONFIG: &str = r#"
listen = "0.0.0.0:9000"
database = ":memory:"
admin_token = "tok"

[keeper]
site_url = "https://example.com/"
sweep_interval_secs = 600

[[plugins]]
id = "premium"
local_path = "premium/premium.php"
label = "Premium"
validate_url = "https://licenses.example.com/v1/premium"
fail_limit = 3

[[plugins]]
id = "extra"
label = "Extra"
validate_url = "https://licenses.example.com/v1/extra"
"#;

#[test]
fn server_config_default() {
    let cfg = ServerConfig::default();
    assert_eq!(cfg.listen, "127.0.0.1:8787");
    assert!(cfg.admin_token.is_empty());
    assert!(cfg.plugins.is_empty());
    assert_eq!(cfg.keeper.sweep_interval_secs, 7200);
}

#[test]
fn parses_plugins_and_keeper_settings() {
    let cfg = ServerConfig::from_toml_str(CONFIG).unwrap();
    assert_eq!(cfg.listen, "0.0.0.0:9000");
    assert_eq!(cfg.keeper.origin(), "https://example.com");
    assert_eq!(cfg.keeper.sweep_interval_secs, 600);
    assert_eq!(cfg.keeper.request_timeout_secs, 30);
    assert_eq!(cfg.plugins.len(), 2);
    assert_eq!(cfg.plugins[0].fail_limit, 3);
    assert_eq!(cfg.plugins[1].fail_limit, 0);
}

#[test]
fn invalid_keeper_settings_are_rejected() {
    let err = ServerConfig::from_toml_str("[keeper]\nsweep_interval_secs = 0\n");
    assert!(err.is_err());
}

#[tokio::test]
async fn build_registry_registers_in_order() {
    let cfg = ServerConfig::from_toml_str(CONFIG).unwrap();
    let registry = build_registry(&cfg).unwrap();
    let ids: Vec<_> = registry.list().iter().map(|r| r.id().to_string()).collect();
    assert_eq!(ids, vec!["premium", "extra"]);
    assert_eq!(registry.get("premium").unwrap().failure_tolerance(), 3);
    assert_eq!(registry.origin(), "https://example.com");
}

#[tokio::test]
async fn duplicate_plugin_id_fails_startup() {
    let mut cfg = ServerConfig::from_toml_str(CONFIG).unwrap();
    let dup = cfg.plugins[0].clone();
    cfg.plugins.push(dup);
    let err = build_registry(&cfg).unwrap_err();
    assert!(format!("{err:#}").contains("already registered"));
}

#[tokio::test]
async fn sqlite_database_is_created() {
    let dir = TempDir::new().unwrap();
    let mut cfg = ServerConfig::from_toml_str(CONFIG).unwrap();
    cfg.database = dir.path().join("licenses.db");
    build_registry(&cfg).unwrap();
    assert!(cfg.database.exists());
}

#[tokio::test]
async fn stored_state_of_dropped_plugin_does_not_block_startup() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("licenses.db");
    SqliteLicenseStore::open(&db)
        .unwrap()
        .put("retired", &LicenseState::default())
        .unwrap();

    let mut cfg = ServerConfig::from_toml_str(CONFIG).unwrap();
    cfg.database = db;
    let registry = build_registry(&cfg).unwrap();
    assert_eq!(registry.orphaned_states().unwrap(), vec!["retired".to_string()]);
}

#[test]
fn load_reads_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("sekisyo.toml");
    std::fs::write(&path, CONFIG).unwrap();
    let cfg = ServerConfig::load(&path).unwrap();
    assert_eq!(cfg.admin_token, "tok");

    assert!(ServerConfig::load(&dir.path().join("missing.toml")).is_err());
}
