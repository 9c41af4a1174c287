mod util;

use carboncat::config::{ConfigError, PanelConfig};
use serial_test::serial;
use tempfile::TempDir;
use util::EnvGuard;

fn clear_overrides() -> Vec<EnvGuard> {
    ["CARBONCAT_TABLE", "CARBONCAT_ROW_LIMIT", "CARBONCAT_CHUNK_SIZE", "CARBONCAT_STATE_DIR"]
        .into_iter()
        .map(EnvGuard::unset)
        .collect()
}

#[test]
#[serial]
fn explicit_config_path_wins() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("panel.toml");
    std::fs::write(&path, "table = \"custom_logs\"\n").unwrap();
    let _env = clear_overrides();
    let _cfg = EnvGuard::set("CARBONCAT_CONFIG", path.to_string_lossy());

    assert_eq!(PanelConfig::config_path().unwrap(), path);
    assert_eq!(PanelConfig::load().unwrap().table, "custom_logs");
}

#[test]
#[serial]
fn xdg_config_home_is_respected() {
    let tmp = TempDir::new().unwrap();
    let _env = clear_overrides();
    let _cfg = EnvGuard::unset("CARBONCAT_CONFIG");
    let _xdg = EnvGuard::set("XDG_CONFIG_HOME", tmp.path().to_string_lossy());

    assert_eq!(
        PanelConfig::config_path().unwrap(),
        tmp.path().join("carboncat").join("config.toml")
    );
    assert_eq!(PanelConfig::load().unwrap(), PanelConfig::default());
}

#[test]
#[serial]
fn environment_overrides_the_file() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("panel.toml");
    std::fs::write(&path, "table = \"from_file\"\nrow_limit = 10\n").unwrap();
    let _env = clear_overrides();
    let _cfg = EnvGuard::set("CARBONCAT_CONFIG", path.to_string_lossy());
    let _table = EnvGuard::set("CARBONCAT_TABLE", "from_env");
    let _rows = EnvGuard::set("CARBONCAT_ROW_LIMIT", "250");
    let _dir = EnvGuard::set("CARBONCAT_STATE_DIR", tmp.path().join("state").to_string_lossy());

    let config = PanelConfig::load().unwrap();
    assert_eq!(config.table, "from_env");
    assert_eq!(config.row_limit, 250);
    assert_eq!(config.state_file().unwrap(), tmp.path().join("state").join("state.json"));
}

#[test]
#[serial]
fn bad_numeric_override_is_an_error() {
    let tmp = TempDir::new().unwrap();
    let _env = clear_overrides();
    let _cfg = EnvGuard::set("CARBONCAT_CONFIG", tmp.path().join("none.toml").to_string_lossy());
    let _size = EnvGuard::set("CARBONCAT_CHUNK_SIZE", "lots");

    assert!(matches!(PanelConfig::load(), Err(ConfigError::Validation(_))));
}
