use super::*;
use std::path::Path;

#[test]
fn defaults_match_the_reference_layout() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

    assert_eq!(settings.render.tool_path, Path::new(DEFAULT_TOOL_PATH));
    assert_eq!(settings.render.temp_root, Path::new("/tmp"));
    assert_eq!(settings.render.source_extension, "scad");
    assert_eq!(settings.render.output_extension, "stl");
    assert!(settings.limits.max_resources.is_none());
    assert!(settings.limits.max_decoded_bytes.is_none());
    assert_eq!(settings.logging.level, LevelFilter::INFO);
    assert!(matches!(settings.logging.format, LogFormat::Compact));
}

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.render.tool_path = Some(PathBuf::from("/opt/openscad"));
    raw.logging.level = Some("info".to_string());

    let overrides = InvokeOverrides {
        render: RenderOverrides {
            tool_path: Some(PathBuf::from("/usr/bin/openscad-nightly")),
            ..Default::default()
        },
        log_level: Some("debug".to_string()),
        log_json: Some(true),
        ..Default::default()
    };

    raw.apply_invoke_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(
        settings.render.tool_path,
        Path::new("/usr/bin/openscad-nightly")
    );
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
    assert!(matches!(settings.logging.format, LogFormat::Json));
}

#[test]
fn limits_reject_zero() {
    let mut raw = RawSettings::default();
    raw.limits.max_resources = Some(0);
    let err = Settings::from_raw(raw).expect_err("zero limit");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "limits.max_resources",
            ..
        }
    ));
}

#[test]
fn extensions_are_normalised_and_validated() {
    let mut raw = RawSettings::default();
    raw.render.output_extension = Some(".OFF".to_string());
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(settings.render.output_extension, "off");

    let mut raw = RawSettings::default();
    raw.render.source_extension = Some("../scad".to_string());
    assert!(Settings::from_raw(raw).is_err());
}

#[test]
fn invalid_log_level_is_reported_with_key() {
    let mut raw = RawSettings::default();
    raw.logging.level = Some("chatty".to_string());
    let err = Settings::from_raw(raw).expect_err("bad level");
    assert!(err.to_string().contains("logging.level"), "{err}");
}

#[test]
fn parse_invoke_arguments() {
    let args = CliArgs::parse_from([
        "scad-render",
        "invoke",
        "--event",
        "/tmp/event.json",
        "--job-id",
        "abc-123",
        "--render-temp-root",
        "/var/tmp",
        "--limits-max-resources",
        "16",
    ]);

    match args.command {
        Command::Invoke(invoke) => {
            assert_eq!(invoke.event.as_deref(), Some(Path::new("/tmp/event.json")));
            assert_eq!(invoke.job_id.as_deref(), Some("abc-123"));
            assert_eq!(
                invoke.overrides.render.temp_root.as_deref(),
                Some(Path::new("/var/tmp"))
            );
            assert_eq!(invoke.overrides.limits_max_resources, Some(16));
        }
    }
}
