mod common;

// crates.io
use httpmock::prelude::*;
// self
use common::*;
use service_token::{
	auth::TokenSecret,
	error::{ConfigError, Error, ErrorKind},
	exchange::{ReqwestServiceClient, ServiceClient, TokenEndpoint, TokenGenerator},
};

fn issuer_client(server: &MockServer) -> ReqwestServiceClient {
	ServiceClient::new(&server.base_url(), TokenEndpoint::Issuer)
		.expect("Issuer client should build against the mock server.")
		.with_retry(instant_retry())
}

#[tokio::test]
async fn issuer_exchange_returns_access_token() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/v1/token")
				.header("content-type", "application/x-www-form-urlencoded")
				.body_includes("client_id=svc-client")
				.body_includes("client_secret=svc-secret")
				.body_includes("grant_type=client_credentials")
				.body_includes("scope=hpe-tenant");
			then.status(200)
				.header("content-type", "application/json")
				.body(r#"{"access_token":"abc","token_type":"Bearer","expires_in":3600}"#);
		})
		.await;
	let token = issuer_client(&server)
		.generate(&credentials())
		.await
		.expect("Issuer exchange should succeed.");

	assert_eq!(token.expose(), "abc");

	mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn issuer_exchange_trims_trailing_slash() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/api/iam/v1/token");
			then.status(200).body(r#"{"access_token":"abc"}"#);
		})
		.await;
	let client = ServiceClient::new(&server.url("/api/iam/"), TokenEndpoint::Issuer)
		.expect("Issuer client should build.");

	assert!(client.token_url().as_str().ends_with("/api/iam/v1/token"));

	client.generate(&credentials()).await.expect("Issuer exchange should succeed.");
	mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn issuer_statuses_map_to_typed_errors() {
	for (status, body, kind) in [
		(400, r#"{"error":"invalid_request"}"#, ErrorKind::BadRequest),
		(401, "", ErrorKind::Unauthorized),
		(403, "", ErrorKind::Forbidden),
		(404, "not found", ErrorKind::InternalError),
	] {
		let server = MockServer::start_async().await;
		let mock = server
			.mock_async(|when, then| {
				when.method(POST).path("/v1/token");
				then.status(status).body(body);
			})
			.await;
		let err = issuer_client(&server)
			.generate(&credentials())
			.await
			.expect_err("Non-200 statuses should fail.");

		assert_eq!(err.kind(), Some(kind), "Status {status} mapped to {err:?}.");
		assert!(!err.is_retryable());

		match (status, &err) {
			(400, Error::BadRequest { body: raw }) => assert_eq!(raw, body),
			(401, Error::Unauthorized { client_id }) | (403, Error::Forbidden { client_id }) =>
				assert_eq!(client_id, CLIENT_ID),
			(404, Error::Internal { .. }) => assert!(err.to_string().contains("404")),
			_ => panic!("Unexpected error for status {status}: {err:?}"),
		}

		mock.assert_calls_async(1).await;
	}
}

#[tokio::test]
async fn server_errors_are_retried_before_classification() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/v1/token");
			then.status(500);
		})
		.await;
	let err = issuer_client(&server)
		.generate(&credentials())
		.await
		.expect_err("Persistent 500s should fail.");

	assert!(matches!(err, Error::Internal { status: 500 }));

	mock.assert_calls_async(4).await;
}

#[tokio::test]
async fn bad_gateway_is_not_retried() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/v1/token");
			then.status(502);
		})
		.await;
	let err = issuer_client(&server)
		.generate(&credentials())
		.await
		.expect_err("502 should fail.");

	assert!(matches!(err, Error::Internal { status: 502 }));

	mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn malformed_json_reports_parse_error() {
	let server = MockServer::start_async().await;
	let _mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/v1/token");
			then.status(200).body(r#"{"token_type":"Bearer"}"#);
		})
		.await;
	let err = issuer_client(&server)
		.generate(&credentials())
		.await
		.expect_err("A body without access_token should fail.");

	assert!(matches!(err, Error::TokenResponseParse { .. }), "Unexpected error: {err:?}");
}

#[tokio::test]
async fn passed_in_token_skips_the_network() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/v1/token");
			then.status(200).body(r#"{"access_token":"from-iam"}"#);
		})
		.await;
	let client = issuer_client(&server).with_passed_in_token(TokenSecret::new("static-token"));

	for _ in 0..2 {
		let token = client.generate(&credentials()).await.expect("Passed-in token is served.");

		assert_eq!(token.expose(), "static-token");
	}

	mock.assert_calls_async(0).await;
}

#[test]
fn invalid_service_url_is_a_config_error() {
	let err = ServiceClient::new("::not a url::", TokenEndpoint::Issuer)
		.expect_err("An unparsable URL should be rejected.");

	assert!(matches!(err, Error::Config(ConfigError::InvalidServiceUrl { .. })));
}
