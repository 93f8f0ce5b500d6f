//! Settings loading tests

#[cfg(test)]
mod tests {
    use super::super::config::Settings;
    use std::env;
    use std::io::Write;
    use std::time::Duration;

    #[test]
    fn test_defaults_match_transport_and_backend_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.address(), "127.0.0.1:8080");

        let sse = settings.sse_config();
        assert_eq!(sse.max_connections, 20);
        assert_eq!(sse.idle_timeout, Duration::from_secs(10));
        assert_eq!(sse.max_idle_periods, 3);
        assert_eq!(sse.max_body_bytes, 1024 * 1024);

        let backends = settings.backend_settings();
        assert_eq!(backends.http_timeout, Duration::from_secs(30));
        assert_eq!(backends.command_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let settings = Settings::load(None).expect("defaults load");
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.sse.max_idle_periods, 3);
        assert_eq!(settings.tasks.command_timeout_secs, 30);
        assert!(settings.logging.directory.is_none());
    }

    #[test]
    fn test_loaded_defaults_equal_default_settings() {
        let mut loaded = serde_json::to_value(Settings::load(None).unwrap()).unwrap();
        let mut expected = serde_json::to_value(Settings::default()).unwrap();
        // Another test in this module sets TASKWEAVE_SSE__QUEUE_CAPACITY
        loaded["sse"]["queue_capacity"] = serde_json::Value::Null;
        expected["sse"]["queue_capacity"] = serde_json::Value::Null;
        assert_eq!(loaded, expected);
    }

    #[test]
    fn test_settings_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(
            file,
            r#"
[server]
port = 9191

[sse]
max_connections = 5

[logging]
directory = "/tmp/taskweave-logs"
"#
        )
        .unwrap();

        let settings = Settings::load(Some(file.path())).expect("settings file loads");
        assert_eq!(settings.server.port, 9191);
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.sse.max_connections, 5);
        assert_eq!(settings.logging.directory.as_deref(), Some("/tmp/taskweave-logs"));
    }

    #[test]
    fn test_missing_explicit_settings_file_is_an_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let result = Settings::load(Some(&dir.path().join("absent.toml")));
        assert!(result.is_err());
    }

    #[test]
    fn test_environment_overrides_nested_keys() {
        env::set_var("TASKWEAVE_SSE__QUEUE_CAPACITY", "64");
        let settings = Settings::load(None);
        env::remove_var("TASKWEAVE_SSE__QUEUE_CAPACITY");

        assert_eq!(settings.expect("settings load").sse.queue_capacity, 64);
    }
}
