use std::sync::Mutex;
use std::time::Duration;

use tempfile::{Builder, NamedTempFile};

use live_detect::config::PanelConfig;
use live_detect::SessionSettings;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "LIVE_DETECT_CONFIG",
        "LIVE_DETECT_DB",
        "LIVE_DETECT_WS",
        "LIVE_DETECT_FALLBACK",
        "LIVE_DETECT_STREAM_DELAY_MS",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn defaults_without_file_or_env() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = PanelConfig::load().expect("load defaults");
    assert_eq!(cfg.db_path, "live_detect.db");
    assert_eq!(
        cfg.inference.endpoint.as_deref(),
        Some("ws://localhost:8080/detect")
    );
    assert!(cfg.simulation.fallback_enabled);
    assert_eq!(cfg.simulation.fallback_tick, Duration::from_millis(100));
    assert_eq!(cfg.simulation.fallback_probability, 0.1);
    assert_eq!(cfg.simulation.stream_connect_delay, Duration::from_secs(2));
}

#[test]
fn loads_json_file_with_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "db_path": "panel_prod.db",
        "inference": {
            "endpoint": "wss://inference.local/detect",
            "outbound_capacity": 4
        },
        "simulation": {
            "fallback_enabled": true,
            "fallback_tick_ms": 250,
            "fallback_probability": 0.5
        }
    }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");

    std::env::set_var("LIVE_DETECT_CONFIG", file.path());
    std::env::set_var("LIVE_DETECT_FALLBACK", "off");
    std::env::set_var("LIVE_DETECT_STREAM_DELAY_MS", "50");

    let cfg = PanelConfig::load().expect("load config");

    assert_eq!(cfg.db_path, "panel_prod.db");
    assert_eq!(
        cfg.inference.endpoint.as_deref(),
        Some("wss://inference.local/detect")
    );
    assert_eq!(cfg.inference.outbound_capacity, 4);
    assert!(!cfg.simulation.fallback_enabled);
    assert_eq!(cfg.simulation.fallback_tick, Duration::from_millis(250));
    assert_eq!(cfg.simulation.fallback_probability, 0.5);
    assert_eq!(cfg.simulation.stream_connect_delay, Duration::from_millis(50));

    let settings = SessionSettings::from(&cfg);
    assert_eq!(settings.outbound_capacity, 4);
    assert!(!settings.fallback_enabled);
    assert_eq!(settings.box_display, Duration::from_secs(2));

    clear_env();
}

#[test]
fn loads_toml_file_and_disables_endpoint() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = Builder::new().suffix(".toml").tempfile().expect("temp config");
    let toml = r#"
db_path = "panel.db"

[inference]
endpoint = "off"
"#;
    std::io::Write::write_all(&mut file, toml.as_bytes()).expect("write config");

    std::env::set_var("LIVE_DETECT_CONFIG", file.path());
    std::env::set_var("LIVE_DETECT_DB", "override.db");

    let cfg = PanelConfig::load().expect("load config");
    assert_eq!(cfg.db_path, "override.db");
    assert_eq!(cfg.inference.endpoint, None);

    clear_env();
}

#[test]
fn rejects_invalid_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("LIVE_DETECT_WS", "http://localhost:8080/detect");
    assert!(PanelConfig::load().is_err());
    clear_env();

    std::env::set_var("LIVE_DETECT_FALLBACK", "sometimes");
    assert!(PanelConfig::load().is_err());
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut file, br#"{"simulation": {"fallback_probability": 1.5}}"#)
        .expect("write config");
    std::env::set_var("LIVE_DETECT_CONFIG", file.path());
    assert!(PanelConfig::load().is_err());
    clear_env();

    std::env::set_var("LIVE_DETECT_CONFIG", "/nonexistent/live_detect.json");
    assert!(PanelConfig::load().is_err());

    clear_env();
}
