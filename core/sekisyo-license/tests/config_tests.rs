use sekisyo_license::{KeeperConfig, LicenseError, DEFAULT_SWEEP_INTERVAL_SECS};
use std::time::Duration;

#[test]
fn keeper_config_default() {
    let cfg = KeeperConfig::default();
    assert_eq!(cfg.sweep_interval(), Duration::from_secs(2 * 60 * 60));
    assert_eq!(cfg.sweep_interval_secs, DEFAULT_SWEEP_INTERVAL_SECS);
    assert_eq!(cfg.request_timeout(), Duration::from_secs(30));
    assert!(cfg.validate().is_ok());
}

#[test]
fn origin_strips_trailing_slashes() {
    let cfg = KeeperConfig {
        site_url: "https://example.com//".into(),
        ..Default::default()
    };
    assert_eq!(cfg.origin(), "https://example.com");
}

#[test]
fn zero_interval_is_rejected() {
    let cfg = KeeperConfig {
        sweep_interval_secs: 0,
        ..Default::default()
    };
    assert!(matches!(cfg.validate(), Err(LicenseError::Config(_))));
}

#[test]
fn empty_site_url_is_rejected() {
    let cfg = KeeperConfig {
        site_url: "/".into(),
        ..Default::default()
    };
    assert!(cfg.validate().is_err());
}

#[test]
fn partial_config_fills_defaults() {
    let cfg: KeeperConfig = serde_json::from_str(r#"{"site_url":"https://s.test"}"#).unwrap();
    assert_eq!(cfg.site_url, "https://s.test");
    assert_eq!(cfg.request_timeout_secs, 30);
}
