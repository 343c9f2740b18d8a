//! Error tests - Property-based tests for the error model
//!
//! Tests the code→status table, Problem-Details rendering and the redaction
//! rules of the error boundary.

use crate::problem::{ErrorBoundary, ProblemDetails};
use crate::schema::Issue;
use crate::{DispatchError, RpcError, RpcErrorCode, status_for_code};
use proptest::prelude::*;
use serde_json::json;

// =============================================================================
// Strategies
// =============================================================================

fn arb_code() -> impl Strategy<Value = RpcErrorCode> {
    prop::sample::select(RpcErrorCode::ALL.to_vec())
}

fn arb_rpc_error() -> impl Strategy<Value = RpcError> {
    (
        arb_code(),
        "[a-zA-Z ]{1,40}",
        prop::option::of("[a-zA-Z ]{1,80}"),
        prop::option::of("[a-z]{1,10}"),
    )
        .prop_map(|(code, title, detail, ext)| {
            let mut err = RpcError::new(code, title);
            if let Some(detail) = detail {
                err = err.with_detail(detail);
            }
            if let Some(ext) = ext {
                err = err.with_extension("hint", ext);
            }
            err
        })
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Every code parses back from its wire name and keeps its status.
    #[test]
    fn prop_code_wire_name_round_trip(code in arb_code()) {
        let parsed: RpcErrorCode = code.as_str().parse().unwrap();
        prop_assert_eq!(parsed, code);
        prop_assert_eq!(status_for_code(code.as_str()), code.status());
        prop_assert_eq!(serde_json::to_value(code).unwrap(), json!(code.as_str()));
    }

    /// Strings outside the closed set map to 500.
    #[test]
    fn prop_unknown_codes_are_500(s in "[A-Z_]{1,30}") {
        prop_assume!(s.parse::<RpcErrorCode>().is_err());
        prop_assert_eq!(status_for_code(&s), 500);
    }

    /// The body status always equals the code's mapped status, and the body
    /// carries every required member.
    #[test]
    fn prop_problem_body_matches_code(error in arb_rpc_error()) {
        let body = ProblemDetails::from_error(&error.clone().into(), "/x");
        prop_assert_eq!(body.status, error.code.status());
        prop_assert_eq!(body.code_status(), body.status);
        prop_assert_eq!(body.error_code(), Some(error.code));

        let json = serde_json::to_value(&body).unwrap();
        for key in ["status", "title", "code", "instance"] {
            prop_assert!(json.get(key).is_some(), "missing {}", key);
        }
        if error.extensions.contains_key("hint") {
            prop_assert_eq!(&json["hint"], &error.extensions["hint"]);
        }
    }

    /// Production rendering never leaks causes, nor details of 5xx errors.
    #[test]
    fn prop_production_redaction(error in arb_rpc_error()) {
        let error = error.with_cause("secret");
        let body = ErrorBoundary::new(false).render(&error.clone().into(), "/x");
        prop_assert!(!body.extensions.contains_key("cause"));
        if error.code.is_server_error() {
            prop_assert!(body.detail.is_none());
        } else {
            prop_assert_eq!(body.title, error.title);
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[test]
fn test_request_validation_body() {
    let issues = vec![Issue::required().under("name")];
    let body = ProblemDetails::from_error(
        &DispatchError::RequestValidation { issues: issues.clone() },
        "/users/create",
    );
    assert_eq!(body.status, 400);
    assert_eq!(body.title, "Bad Request");
    assert_eq!(body.code, "BAD_REQUEST");
    assert_eq!(body.errors, Some(issues));
}

#[test]
fn test_response_validation_body_has_no_issues() {
    let err = DispatchError::ResponseValidation {
        issues: vec![Issue::required().under("id")],
    };
    assert_eq!(err.status(), 500);
    let json = serde_json::to_value(ProblemDetails::from_error(&err, "/x")).unwrap();
    assert_eq!(json["code"], "INTERNAL_SERVER_ERROR");
    assert!(json.get("errors").is_none());
}

#[test]
fn test_problem_deserializes_unknown_members_as_extensions() {
    let body: ProblemDetails = serde_json::from_value(json!({
        "status": 418,
        "title": "Teapot",
        "code": "TEAPOT",
        "instance": "/brew",
        "type": "about:blank",
        "flavour": "earl grey",
    }))
    .unwrap();
    assert_eq!(body.type_uri.as_deref(), Some("about:blank"));
    assert_eq!(body.extensions["flavour"], "earl grey");
    assert_eq!(body.error_code(), None);
    assert_eq!(body.code_status(), 500);
}

#[test]
fn test_error_display() {
    let err = RpcError::conflict("Email taken");
    assert_eq!(err.to_string(), "[CONFLICT] Email taken");
    let err: DispatchError = err.into();
    assert_eq!(err.to_string(), "[CONFLICT] Email taken");
    assert_eq!(err.status(), 409);
}
