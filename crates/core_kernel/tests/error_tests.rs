//! Tests for core_kernel error types

use core_kernel::{CoreError, MoneyError, PortError};

#[test]
fn test_core_error_from_money_error() {
    let money_error = MoneyError::CurrencyMismatch("EUR".to_string(), "USD".to_string());
    let core_error: CoreError = money_error.into();

    assert!(matches!(core_error, CoreError::Money(_)));
    assert!(core_error.to_string().contains("EUR and USD"));
}

#[test]
fn test_core_error_configuration() {
    let error = CoreError::configuration("Invalid timezone: Mars/Olympus");
    assert_eq!(
        error.to_string(),
        "Configuration error: Invalid timezone: Mars/Olympus"
    );
}

#[test]
fn test_port_error_empty_counts_as_not_found() {
    let error = PortError::empty("no entity graph has been saved");
    assert!(error.is_not_found());
    assert!(!PortError::internal("disk full").is_not_found());
}

#[test]
fn test_port_error_keeps_source() {
    let source = serde_json::from_str::<u32>("not json").unwrap_err();
    let error = PortError::transformation("failed to decode entity graph", source);

    assert!(std::error::Error::source(&error).is_some());
    assert!(error.to_string().contains("failed to decode"));
}
