//! Unit tests for configuration module
//!
//! These tests validate configuration parsing, defaults, and validation.

#[cfg(test)]
mod tests {
    use std::io::Write;

    use crate::config::*;
    use crate::errors::TriageError;

    // ====== Default Value Tests ======

    #[test]
    fn test_default_llm_settings() {
        let config = AppConfig::default();
        assert_eq!(config.llm.max_retries, 3);
        assert_eq!(config.llm.timeout_secs, 60);
        assert_eq!(config.llm.backoff_base_ms, 1000);
        assert!((config.llm.temperature - 0.2).abs() < f32::EPSILON);
        assert!((config.llm.top_p - 0.9).abs() < f32::EPSILON);
        assert!(!config.llm.stream);
        assert_eq!(config.llm_model(), "mistral");
    }

    #[test]
    fn test_default_embedding_settings() {
        let config = AppConfig::default();
        assert_eq!(config.embedding_dimension(), 768);
        assert_eq!(config.embeddings.flush_every, 10);
        assert_eq!(config.embeddings.max_input_chars, 2048);
        assert_eq!(config.retrieval_top_k(), 3);
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(AppConfig::default().validate().is_ok());
    }

    // ====== Parsing Tests ======

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = AppConfig::from_toml_str(
            r#"
[llm]
model = "llama3"
max_retries = 5

[embeddings]
provider = "hashing"
dimension = 128
"#,
        )
        .unwrap();

        assert_eq!(config.llm_model(), "llama3");
        assert_eq!(config.llm.max_retries, 5);
        assert_eq!(config.llm.timeout_secs, 60);
        assert_eq!(config.embeddings.provider, "hashing");
        assert_eq!(config.embedding_dimension(), 128);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_empty_toml_is_default() {
        let config = AppConfig::from_toml_str("").unwrap();
        assert_eq!(config.llm_endpoint(), "http://localhost:11434");
    }

    #[test]
    fn test_example_config_matches_defaults() {
        let config =
            AppConfig::from_toml_str(include_str!("../config.example.toml")).unwrap();
        let defaults = AppConfig::default();
        assert_eq!(config.llm_model(), defaults.llm_model());
        assert_eq!(config.embedding_model(), defaults.embedding_model());
        assert_eq!(config.embedding_cache_dir(), defaults.embedding_cache_dir());
        assert_eq!(config.retrieval.max_context_chars, defaults.retrieval.max_context_chars);
        assert_eq!(config.llm.backoff_base_ms, defaults.llm.backoff_base_ms);
        assert_eq!(config.logging.backtrace, defaults.logging.backtrace);
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[retrieval]\ntop_k = 7").unwrap();

        let config = AppConfig::from_file(file.path()).unwrap();
        assert_eq!(config.retrieval_top_k(), 7);
    }

    #[test]
    fn test_malformed_toml() {
        let result = AppConfig::from_toml_str("[llm\nmodel = ");
        assert!(matches!(result, Err(TriageError::TomlParsing(_))));
    }

    // ====== Validation Tests ======

    #[test]
    fn test_invalid_endpoint_rejected() {
        let mut config = AppConfig::default();
        config.llm.endpoint = "not a url".to_string();
        assert!(matches!(
            config.validate(),
            Err(TriageError::ConfigError(_))
        ));
    }

    #[test]
    fn test_zero_retries_rejected() {
        let mut config = AppConfig::default();
        config.llm.max_retries = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let mut config = AppConfig::default();
        config.embeddings.provider = "openai".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.llm.provider = "anthropic".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_sampling_ranges() {
        let mut config = AppConfig::default();
        config.llm.temperature = 3.0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.llm.top_p = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_dimension_rejected() {
        let mut config = AppConfig::default();
        config.embeddings.dimension = 0;
        assert!(config.validate().is_err());
    }
}
