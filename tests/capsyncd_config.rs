use std::sync::Mutex;
use std::time::Duration;

use tempfile::NamedTempFile;

use capsync::RecorderConfig;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "CAPSYNC_CONFIG",
        "CAPSYNC_OWNER",
        "CAPSYNC_FPS",
        "CAPSYNC_MOTION_THRESHOLD",
        "CAPSYNC_CHUNK_SECS",
        "CAPSYNC_CACHE_DIR",
        "CAPSYNC_REMOTE_DIR",
        "CAPSYNC_RESCAN_SECS",
        "CAPSYNC_CHECK_SECS",
        "CAPSYNC_UNITS",
        "CAPSYNC_CODECS",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let toml = r#"
        owner = "alice"
        fps = 10.0
        motion_threshold_pct = 1.5
        chunk_secs = 300
        cache_dir = "/var/cache/capsync"
        remote_dir = "/mnt/recordings"
        capture_units = 2
        codecs = ["H264"]

        [upload]
        rescan_secs = 60
        check_secs = 10
    "#;
    std::io::Write::write_all(&mut file, toml.as_bytes()).expect("write config");

    std::env::set_var("CAPSYNC_CONFIG", file.path());
    std::env::set_var("CAPSYNC_OWNER", "bob");
    std::env::set_var("CAPSYNC_CHUNK_SECS", "120");

    let cfg = RecorderConfig::load().expect("load config");

    // Env wins over file.
    assert_eq!(cfg.owner, "bob");
    assert_eq!(cfg.chunk_duration, Duration::from_secs(120));

    // File wins over defaults.
    assert_eq!(cfg.fps, 10.0);
    assert_eq!(cfg.motion_threshold_pct, 1.5);
    assert_eq!(cfg.cache_dir.to_str().unwrap(), "/var/cache/capsync");
    assert_eq!(cfg.remote_dir.to_str().unwrap(), "/mnt/recordings");
    assert_eq!(cfg.rescan_interval, Duration::from_secs(60));
    assert_eq!(cfg.check_interval, Duration::from_secs(10));
    assert_eq!(cfg.capture_units, 2);
    assert_eq!(cfg.codecs, vec!["H264"]);

    clear_env();
}

#[test]
fn defaults_apply_without_file_or_env() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = RecorderConfig::load().expect("load config");

    assert_eq!(cfg.fps, 5.0);
    assert_eq!(cfg.motion_threshold_pct, 0.5);
    assert_eq!(cfg.chunk_duration, Duration::from_secs(600));
    assert_eq!(cfg.rescan_interval, Duration::from_secs(30));
    assert_eq!(cfg.check_interval, Duration::from_secs(5));
    assert_eq!(cfg.capture_units, 1);
    assert_eq!(cfg.codecs, vec!["X264", "XVID"]);
    assert!(!cfg.owner.is_empty());
}

#[test]
fn codec_csv_override_applies() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("CAPSYNC_CODECS", "AV1, H264");
    let cfg = RecorderConfig::load().expect("load config");
    assert_eq!(cfg.codecs, vec!["AV1", "H264"]);

    clear_env();
}

#[test]
fn invalid_values_are_rejected() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("CAPSYNC_FPS", "not-a-number");
    assert!(RecorderConfig::load().is_err());
    clear_env();

    std::env::set_var("CAPSYNC_FPS", "0");
    assert!(RecorderConfig::load().is_err());
    clear_env();

    std::env::set_var("CAPSYNC_OWNER", "../escape");
    assert!(RecorderConfig::load().is_err());
    clear_env();
}

#[test]
fn malformed_config_file_is_rejected() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut file, b"owner = [not toml").expect("write config");
    std::env::set_var("CAPSYNC_CONFIG", file.path());

    assert!(RecorderConfig::load().is_err());

    clear_env();
}
