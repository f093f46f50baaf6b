// tests/logging.rs

use execlane::cli::LogLevel;
use execlane::logging::build_filter;

#[test]
fn cli_level_wins_over_the_environment() -> anyhow::Result<()> {
    let filter = build_filter(Some(LogLevel::Debug), Some("error"))?;
    assert_eq!(filter.to_string(), "debug");
    Ok(())
}

#[test]
fn environment_accepts_levels_and_directives() -> anyhow::Result<()> {
    assert_eq!(build_filter(None, Some("WARNING"))?.to_string(), "warn");
    assert_eq!(build_filter(None, Some(" trace "))?.to_string(), "trace");

    let filter = build_filter(None, Some("info,execlane::script=debug"))?;
    let text = filter.to_string();
    assert!(text.contains("execlane::script=debug"), "{text}");
    Ok(())
}

#[test]
fn defaults_to_info() -> anyhow::Result<()> {
    assert_eq!(build_filter(None, None)?.to_string(), "info");
    assert_eq!(build_filter(None, Some("   "))?.to_string(), "info");
    Ok(())
}

#[test]
fn invalid_directives_are_rejected() {
    let err = build_filter(None, Some("execlane=loud")).unwrap_err();
    assert!(err.to_string().contains("EXECLANE_LOG"));
}
