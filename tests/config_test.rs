use bankflow::application::pipeline::Pipeline;
use bankflow::config::SimulationConfig;
use bankflow::error::PipelineError;
use std::io::Write;
use tempfile::NamedTempFile;

#[test]
fn test_load_partial_json_file() {
    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{
            "client_tps": 12.5,
            "priority_queue_capacity": 25,
            "normal_queue_capacity": 500,
            "auto_screen_rates": {{ "pass": 0.6, "retry": 0.3, "reject": 0.1 }},
            "seed": 3
        }}"#
    )
    .unwrap();

    let config = SimulationConfig::from_json_file(file.path()).unwrap();
    assert_eq!(config.client_tps, 12.5);
    assert_eq!(config.priority_queue_capacity, 25);
    assert_eq!(config.normal_queue_capacity, Some(500));
    assert_eq!(config.auto_screen_rates.retry, 0.3);
    assert_eq!(config.seed, Some(3));
    // Untouched keys keep their defaults.
    assert_eq!(config.max_retry_attempts, 3);
    assert_eq!(config.run_duration_secs, 600);
    assert!(Pipeline::new(config).is_ok());
}

#[test]
fn test_invalid_rates_in_file_rejected() {
    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{ "manual_screen_rates": {{ "pass": 0.9, "reject": 0.3 }} }}"#
    )
    .unwrap();

    let err = SimulationConfig::from_json_file(file.path()).unwrap_err();
    assert!(matches!(err, PipelineError::InvalidConfig(_)));
}

#[test]
fn test_malformed_json_rejected() {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{{ not json").unwrap();

    let err = SimulationConfig::from_json_file(file.path()).unwrap_err();
    assert!(matches!(err, PipelineError::Json(_)));
}

#[test]
fn test_missing_file_is_io_error() {
    let err = SimulationConfig::from_json_file("does/not/exist.json").unwrap_err();
    assert!(matches!(err, PipelineError::Io(_)));
}

#[test]
fn test_zero_priority_capacity_rejected() {
    let config = SimulationConfig::default().with_priority_queue_capacity(0);
    assert!(matches!(
        Pipeline::new(config),
        Err(PipelineError::InvalidConfig(_))
    ));
}

#[test]
fn test_tiny_client_rate_in_file_rejected() {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, r#"{{ "client_tps": 1e-20 }}"#).unwrap();

    let err = SimulationConfig::from_json_file(file.path()).unwrap_err();
    assert!(matches!(err, PipelineError::InvalidConfig(_)));
}
