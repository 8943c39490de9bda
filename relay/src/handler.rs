use std::convert::Infallible;
use std::sync::Arc;

use bytes::Bytes;
use http::{Response, StatusCode};
use http_body_util::{BodyExt, Full};
use log::error;

use crate::upstream::Upstream;

/// Inbound header naming the path the request is relayed to.
pub const URI_PATH_HEADER: &str = "uri-path";

/// Handle one inbound request.
///
/// Every failure, wherever it happens in the flow, maps to a bare 500 so
/// signing diagnostics never leak to the caller. The real error is logged
/// server side with its full chain.
pub async fn handle<B>(
    upstream: Arc<Upstream>,
    req: http::Request<B>,
) -> Result<Response<Full<Bytes>>, Infallible>
where
    B: hyper::body::Body,
    B::Error: std::fmt::Display,
{
    let (parts, body) = req.into_parts();

    let payload = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            error!("failed to read inbound request body: {e}");
            return Ok(internal_error());
        }
    };

    let path = parts
        .headers
        .get(URI_PATH_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("/")
        .to_string();

    match upstream.relay(parts.method, &path, payload).await {
        Ok(resp) => {
            // Relay only status and body; upstream headers stay upstream.
            let (parts, body) = resp.into_parts();
            let mut relayed = Response::new(Full::from(body));
            *relayed.status_mut() = parts.status;
            Ok(relayed)
        }
        Err(err) => {
            error!("relay failed: {err:?}");
            Ok(internal_error())
        }
    }
}

fn internal_error() -> Response<Full<Bytes>> {
    let mut resp = Response::new(Full::from(Bytes::from_static(
        b"Internal Server Error Occurred",
    )));
    *resp.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    resp
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RelayConfig;
    use http::header;
    use pretty_assertions::assert_eq;
    use sigrelay_core::{Context, HttpSend, Result, StaticEnv};
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Debug)]
    struct MockHttpSend {
        status: StatusCode,
        body: Bytes,
        seen: Mutex<Option<http::Request<Bytes>>>,
    }

    #[async_trait::async_trait]
    impl HttpSend for MockHttpSend {
        async fn http_send(&self, req: http::Request<Bytes>) -> Result<http::Response<Bytes>> {
            *self.seen.lock().unwrap() = Some(req);
            Ok(http::Response::builder()
                .status(self.status)
                .body(self.body.clone())
                .unwrap())
        }
    }

    fn test_upstream(status: StatusCode, body: &'static [u8]) -> (Arc<Upstream>, Arc<MockHttpSend>) {
        let transport = Arc::new(MockHttpSend {
            status,
            body: Bytes::from_static(body),
            seen: Mutex::new(None),
        });
        let ctx = Context::new()
            .with_env(StaticEnv {
                envs: HashMap::from(
                    [
                        ("AWS_ACCESS_KEY_ID", "AKIDEXAMPLE"),
                        ("AWS_SECRET_ACCESS_KEY", "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY"),
                        ("AWS_DEFAULT_REGION", "us-east-1"),
                        ("AWS_SERVICE", "execute-api"),
                        ("AWS_HOST", "example.amazonaws.com"),
                    ]
                    .map(|(k, v)| (k.to_string(), v.to_string())),
                ),
            })
            .with_http_send(transport.clone());
        let config = RelayConfig::load(&ctx).unwrap();

        (Arc::new(Upstream::new(ctx, &config)), transport)
    }

    fn inbound(path_header: Option<&str>, body: &'static [u8]) -> http::Request<Full<Bytes>> {
        let mut builder = http::Request::builder()
            .method(http::Method::POST)
            .uri("http://relay.local/");
        if let Some(path) = path_header {
            builder = builder.header(URI_PATH_HEADER, path);
        }
        builder.body(Full::from(Bytes::from_static(body))).unwrap()
    }

    #[tokio::test]
    async fn test_handle_relays_status_and_body() {
        let (upstream, transport) = test_upstream(StatusCode::OK, b"{\"ok\":true}");

        let resp = handle(upstream, inbound(Some("/prod/items"), b"payload"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let sent = transport.seen.lock().unwrap().take().unwrap();
        assert_eq!(sent.method(), http::Method::POST);
        assert_eq!(
            sent.uri().to_string(),
            "http://example.amazonaws.com/prod/items"
        );
        assert_eq!(sent.body().as_ref(), b"payload");
        assert!(sent.headers().contains_key(header::AUTHORIZATION));
    }

    #[tokio::test]
    async fn test_handle_defaults_missing_path_to_root() {
        let (upstream, transport) = test_upstream(StatusCode::OK, b"ok");

        let resp = handle(upstream, inbound(None, b"")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let sent = transport.seen.lock().unwrap().take().unwrap();
        assert_eq!(sent.uri().path(), "/");
    }

    #[tokio::test]
    async fn test_handle_hides_upstream_failure_details() {
        let (upstream, _) = test_upstream(StatusCode::FORBIDDEN, b"access denied because xyz");

        let resp = handle(upstream, inbound(Some("/"), b"")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = resp.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(body.as_ref(), b"Internal Server Error Occurred");
    }
}
