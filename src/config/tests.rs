#[cfg(test)]
mod tests {
    use crate::config::{CONFIG_FILE, ServerConfig, TenantConfig};
    use std::net::IpAddr;

    #[test]
    fn test_load_or_init_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();

        let config = ServerConfig::load_or_init(dir.path()).unwrap();

        assert_eq!(config, ServerConfig::default());
        assert!(dir.path().join(CONFIG_FILE).exists());
        assert_eq!(config.bind_host, "127.0.0.1".parse::<IpAddr>().unwrap());
        assert_eq!(config.api_root, "api");
        assert_eq!(config.max_port_probes, 1024);
        assert_eq!(config.event_buffer, 256);

        // A second start reads back what the first one wrote.
        let reloaded = ServerConfig::load_or_init(dir.path()).unwrap();
        assert_eq!(reloaded, config);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config = ServerConfig::from_json(
            r#"{"tenants": [{"name": "docs"}, {"name": "specs", "storage": "/srv/specs"}]}"#,
        )
        .unwrap();

        assert_eq!(config.api_root, "api");
        assert_eq!(config.tenants.len(), 2);
        assert_eq!(config.tenants[0].storage, None);
        assert_eq!(config.tenants[1].storage.as_deref(), Some("/srv/specs"));
    }

    #[test]
    fn test_storage_path_resolution() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig {
            tenants: vec![
                TenantConfig {
                    name: "docs".to_string(),
                    storage: None,
                },
                TenantConfig {
                    name: "specs".to_string(),
                    storage: Some("elsewhere/specs".to_string()),
                },
            ],
            ..ServerConfig::default()
        };

        assert_eq!(
            config.storage_path(dir.path(), "docs"),
            dir.path().join("api").join("docs")
        );
        assert_eq!(
            config.storage_path(dir.path(), "specs"),
            dir.path().join("elsewhere/specs")
        );
        assert_eq!(
            config.storage_path(dir.path(), "system"),
            dir.path().join("api").join("system")
        );
    }

    #[test]
    fn test_validation_rejects_bad_tenants() {
        let reserved = r#"{"tenants": [{"name": "system"}]}"#;
        let duplicate = r#"{"tenants": [{"name": "docs"}, {"name": "docs"}]}"#;
        let empty = r#"{"tenants": [{"name": ""}]}"#;
        let no_probes = r#"{"max_port_probes": 0}"#;

        for content in [reserved, duplicate, empty, no_probes] {
            assert!(
                ServerConfig::from_json(content).is_err(),
                "Expected rejection of {}",
                content
            );
        }
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "{ not json").unwrap();

        assert!(ServerConfig::load_or_init(dir.path()).is_err());
    }
}
