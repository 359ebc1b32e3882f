use sparkle_config::{Configuration, ConfigurationStore, JsonConfigurationStore};
use sparkle_platform::{AppIdentity, AppPaths};

#[test]
fn configuration_survives_a_restart_through_the_json_store() {
    let dir = tempfile::tempdir().expect("temp dir should be created");
    let path = dir.path().join("sparkle-updater.json");

    let mut first = Configuration::new(Box::new(JsonConfigurationStore::new(&path)), "3.1.0");
    assert!(first.is_first_run());
    first
        .set_version_to_skip("3.2.0")
        .expect("skip should be stored");
    first.set_check_for_update(false);
    first.touch_check_time();
    drop(first);

    let second = Configuration::new(Box::new(JsonConfigurationStore::new(&path)), "3.1.0");
    assert!(!second.is_first_run());
    assert_eq!(second.last_version_skipped(), "3.2.0");
    assert!(!second.check_for_update());
    assert!(second.last_check_time().is_some());

    let raw = std::fs::read_to_string(&path).expect("state file should exist");
    let value: serde_json::Value = serde_json::from_str(&raw).expect("state should be JSON");
    for key in [
        "check_for_update",
        "last_check_time",
        "last_version_skipped",
        "did_run_once",
        "last_config_update",
        "previous_version_run",
        "remind_me_later_until",
    ] {
        assert!(value.get(key).is_some(), "missing key {key}");
    }
}

#[test]
fn two_handles_see_each_others_writes_after_reload() {
    let dir = tempfile::tempdir().expect("temp dir should be created");
    let path = dir.path().join("state.json");

    let mut writer = Configuration::new(Box::new(JsonConfigurationStore::new(&path)), "1.0.0");
    let mut reader = Configuration::new(Box::new(JsonConfigurationStore::new(&path)), "1.0.0");

    writer
        .set_version_to_skip("1.5.0")
        .expect("skip should be stored");
    assert_eq!(reader.last_version_skipped(), "");

    reader.reload();
    assert_eq!(reader.last_version_skipped(), "1.5.0");
}

#[test]
fn store_for_app_uses_the_config_directory() {
    let identity = AppIdentity::new("Acme", "Rocket");
    let paths = AppPaths::for_app(&identity).expect("paths should resolve");
    let store = JsonConfigurationStore::for_app(&paths);

    assert_eq!(store.path(), paths.updater_state_file().as_path());
    assert!(store.path().starts_with(&paths.config_dir));
    let _ = store.load();
}

#[test]
fn a_change_from_another_handle_survives_this_handles_next_write() {
    let dir = tempfile::tempdir().expect("temp dir should be created");
    let path = dir.path().join("state.json");

    let mut running = Configuration::new(Box::new(JsonConfigurationStore::new(&path)), "1.0.0");
    let mut command = Configuration::new(Box::new(JsonConfigurationStore::new(&path)), "1.0.0");

    command.set_check_for_update(false);
    command
        .set_version_to_skip("1.4.0")
        .expect("skip should be stored");

    running.touch_after_check_at(chrono::Utc::now());

    assert!(!running.check_for_update());
    assert_eq!(running.last_version_skipped(), "1.4.0");
    assert!(running.last_check_time().is_some());

    let on_disk = JsonConfigurationStore::new(&path)
        .load()
        .expect("state should load");
    assert!(!on_disk.check_for_update);
    assert_eq!(on_disk.last_version_skipped, "1.4.0");
    assert!(on_disk.last_check_time.is_some());
}
