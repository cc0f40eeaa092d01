//! Unit tests for `AppError` display formats and conversions.

use proc_warden::AppError;

#[test]
fn construction_error_display_has_prefix() {
    let err = AppError::Construction("executable /nope does not exist".into());
    assert_eq!(
        err.to_string(),
        "construction: executable /nope does not exist"
    );
}

#[test]
fn every_variant_has_distinct_prefix() {
    let cases = [
        (AppError::Config("x".into()), "config: x"),
        (AppError::Construction("x".into()), "construction: x"),
        (AppError::LogOpen("x".into()), "log open: x"),
        (AppError::Spawn("x".into()), "spawn: x"),
        (AppError::Signal("x".into()), "signal: x"),
        (AppError::Priority("x".into()), "priority: x"),
        (AppError::InvalidState("x".into()), "invalid state: x"),
        (AppError::Io("x".into()), "io: x"),
    ];
    for (err, expected) in cases {
        assert_eq!(err.to_string(), expected);
    }
}

#[test]
fn error_message_no_trailing_period() {
    let err = AppError::Spawn("failed to spawn /bin/false".into());
    let s = err.to_string();
    assert!(!s.ends_with('.'), "error message must not end with a period: {s}");
}

#[test]
fn io_error_converts_to_io_variant() {
    let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
    let err: AppError = io.into();
    assert!(matches!(err, AppError::Io(ref msg) if msg.contains("gone")));
}

#[test]
fn toml_error_converts_to_config_variant() {
    let parse = toml::from_str::<toml::Value>("not = [valid").unwrap_err();
    let err: AppError = parse.into();
    assert!(err.to_string().starts_with("config: invalid config"));
}
