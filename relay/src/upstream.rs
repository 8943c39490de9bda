use bytes::Bytes;
use http::{header, Method};
use log::debug;
use sigrelay_aws_v4::{
    Credential, EnvCredentialProvider, RequestSigner, X_AMZ_CONTENT_SHA_256,
};
use sigrelay_core::hash::hex_sha256;
use sigrelay_core::{Context, Error, Result, Signer};

use crate::config::RelayConfig;

/// The upstream half of the relay: builds the outbound request, signs it
/// and dispatches it through the context transport.
///
/// One instance is shared across all connections. It holds no per-request
/// state, so concurrent relays never contend on anything but the one-time
/// credential resolution inside [`Signer`].
#[derive(Debug)]
pub struct Upstream {
    ctx: Context,
    host: String,
    signer: Signer<Credential>,
}

impl Upstream {
    /// Create the upstream for the configured host, region and service.
    pub fn new(ctx: Context, config: &RelayConfig) -> Self {
        let signer = Signer::new(
            ctx.clone(),
            EnvCredentialProvider::new(),
            RequestSigner::new(&config.service, &config.region),
        );

        Self {
            ctx,
            host: config.host.clone(),
            signer,
        }
    }

    /// Relay one request: build, sign, send, validate the response.
    ///
    /// A non-success upstream status is an error and is never retried; the
    /// status lands in the error message verbatim. An empty upstream body
    /// is an error as well.
    pub async fn relay(
        &self,
        method: Method,
        path: &str,
        payload: Bytes,
    ) -> Result<http::Response<Bytes>> {
        let req = build_upstream_request(method, &self.host, path, &[], &[], payload)?;

        let (mut parts, body) = req.into_parts();
        self.signer.sign(&mut parts).await?;
        let req = http::Request::from_parts(parts, body);

        debug!("relaying {} {}", req.method(), req.uri());
        let resp = self.ctx.http_send(req).await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(Error::upstream_status(format!(
                "upstream returned non-success status {status}"
            )));
        }
        if resp.body().is_empty() {
            return Err(Error::empty_response("upstream response body was empty"));
        }

        Ok(resp)
    }
}

/// Build the unsigned outbound request.
///
/// The path is normalized to start with `/`. The payload hash and
/// content-length are set here so the signature covers them; `host`,
/// `x-amz-date` and the optional security token are the signer's job.
/// Extra header names are lowercased before insertion so the canonical
/// form and the wire form agree.
pub fn build_upstream_request(
    method: Method,
    host: &str,
    path: &str,
    query: &[(String, String)],
    extra_headers: &[(String, String)],
    payload: Bytes,
) -> Result<http::Request<Bytes>> {
    let mut uri = format!("http://{host}");
    if !path.starts_with('/') {
        uri.push('/');
    }
    uri.push_str(path);
    if !query.is_empty() {
        uri.push('?');
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        serializer.extend_pairs(query);
        uri.push_str(&serializer.finish());
    }

    let payload_hash = hex_sha256(&payload);

    let mut builder = http::Request::builder().method(method).uri(uri);
    for (name, value) in extra_headers {
        builder = builder.header(name.to_ascii_lowercase(), value);
    }

    builder
        .header(X_AMZ_CONTENT_SHA_256, payload_hash)
        .header(header::CONTENT_LENGTH, payload.len())
        .body(payload)
        .map_err(|e| Error::request_invalid("failed to construct upstream request").with_source(e))
}
