use super::*;

#[test]
fn server_failure_keeps_status_and_message() {
    let err = ClientError::Server {
        status: 503,
        message: "Maintenance".to_string(),
    };
    let report = ApiError::from(&err);
    assert_eq!(report.kind, ErrorKind::Server);
    assert_eq!(report.status, Some(503));
    assert_eq!(report.message, "Maintenance");
    assert!(report.fields.is_empty());
}

#[test]
fn network_and_rejected_failures_are_classified() {
    let network = ApiError::from(&ClientError::network("connection reset"));
    assert_eq!(network.kind, ErrorKind::Network);
    assert_eq!(network.status, None);
    assert_eq!(network.message, NETWORK_ERROR_MESSAGE);

    let rejected = ApiError::from(&ClientError::Rejected {
        message: "Quota exceeded".to_string(),
    });
    assert_eq!(rejected.kind, ErrorKind::Server);
    assert_eq!(rejected.message, "Quota exceeded");
}

#[test]
fn validation_failure_lists_every_field() {
    let mut errors = ValidationErrors::new();
    errors.push("email", "Valid email is required");
    errors.push("birthYear", "Valid birth year is required");
    let report = ApiError::from(&ClientError::from(errors));

    assert_eq!(report.kind, ErrorKind::Validation);
    let fields: Vec<&str> = report.fields.iter().map(|f| f.field.as_str()).collect();
    assert_eq!(fields, vec!["email", "birthYear"]);

    let json = serde_json::to_value(&report).expect("encode");
    assert_eq!(json["kind"], "validation");
    assert!(json.get("status").is_none());
}
