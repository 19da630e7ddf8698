//! Runs a refresh handler against a mock IAM service: several callers share one generated
//! token, and a cancelled caller walks away empty-handed without an error.

// std
use std::{
	collections::HashMap,
	time::{SystemTime, UNIX_EPOCH},
};
// crates.io
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use color_eyre::Result;
use httpmock::prelude::*;
// self
use service_token::{
	CancellationToken,
	config::{ENV_IAM_SERVICE_URL, ENV_USER_ID, ENV_USER_SECRET, HandlerConfig},
	handler::RefreshHandler,
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start_async().await;
	let exp = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs() + 900;
	let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"sub":"demo","cid":"demo","exp":{exp}}}"#));
	let token = format!("e30.{payload}.unsigned");
	let token_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/v1/token");
			then.status(200)
				.header("content-type", "application/json")
				.body(format!(r#"{{"access_token":"{token}","token_type":"Bearer"}}"#));
		})
		.await;
	let vars = HashMap::from([
		(ENV_IAM_SERVICE_URL.to_owned(), server.base_url()),
		(ENV_USER_ID.to_owned(), "demo-client".to_owned()),
		(ENV_USER_SECRET.to_owned(), "demo-secret".to_owned()),
	]);
	let config = HandlerConfig::from_vars(&vars)?;

	println!("config: {config:?}");

	let handler = RefreshHandler::from_config(&config)?;
	let mut callers = Vec::new();

	for caller in 0..3 {
		let retriever = handler.retriever();

		callers.push(tokio::spawn(async move {
			retriever.retrieve_token().await.map(|token| (caller, token.expose().len()))
		}));
	}
	for caller in callers {
		let (caller, len) = caller.await??;

		println!("caller {caller} received a {len}-byte token");
	}

	let cancel = CancellationToken::new();

	cancel.cancel();

	println!("cancelled caller received: {:?}", handler.retrieve(&cancel).await?);
	println!("metrics: {:?}", handler.metrics());

	token_mock.assert_calls_async(1).await;
	handler.shutdown();

	Ok(())
}
