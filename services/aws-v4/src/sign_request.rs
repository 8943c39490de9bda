use crate::constants::{
    AWS_QUERY_ENCODE_SET, AWS_URI_ENCODE_SET, X_AMZ_CONTENT_SHA_256, X_AMZ_DATE,
    X_AMZ_SECURITY_TOKEN,
};
use crate::Credential;
use async_trait::async_trait;
use http::request::Parts;
use http::{header, HeaderValue};
use log::debug;
use percent_encoding::{percent_decode_str, utf8_percent_encode};
use sigrelay_core::hash::{hex_hmac_sha256, hex_sha256, hmac_sha256};
use sigrelay_core::time::{format_date, format_iso8601, now, DateTime};
use sigrelay_core::{Context, Error, Result, SignRequest, SigningCredential, SigningRequest};
use std::fmt::Write;

/// RequestSigner that implements AWS SigV4.
///
/// - [Signature Version 4 signing process](https://docs.aws.amazon.com/general/latest/gr/signature-version-4.html)
///
/// All headers the signature depends on are inserted before the canonical
/// request is built; the authorization header is attached last and the
/// request is sealed with it.
#[derive(Debug)]
pub struct RequestSigner {
    service: String,
    region: String,

    time: Option<DateTime>,
}

impl RequestSigner {
    /// Create a new SigV4 request signer for the given service and region.
    pub fn new(service: &str, region: &str) -> Self {
        Self {
            service: service.into(),
            region: region.into(),

            time: None,
        }
    }

    /// Specify the signing time.
    ///
    /// # Note
    ///
    /// We should always take current time to sign requests.
    /// Only use this function for testing.
    #[cfg(test)]
    pub fn with_time(mut self, time: DateTime) -> Self {
        self.time = Some(time);
        self
    }
}

#[async_trait]
impl SignRequest for RequestSigner {
    type Credential = Credential;

    async fn sign_request(
        &self,
        _: &Context,
        req: &mut Parts,
        credential: Option<&Self::Credential>,
    ) -> Result<()> {
        let Some(cred) = credential.filter(|c| c.is_valid()) else {
            return Err(Error::config_invalid(
                "missing or incomplete credential: access key id and secret access key are required",
            ));
        };

        let now = self.time.unwrap_or_else(now);
        let mut signing = SigningRequest::build(req)?;

        // Finalize every header the signature covers, then canonicalize.
        canonicalize_header(&mut signing, cred, now)?;
        canonicalize_query(&mut signing);

        let creq = canonical_request_string(&signing)?;
        let encoded_req = hex_sha256(creq.as_bytes());

        // Scope: "20220313/<region>/<service>/aws4_request"
        let scope = format!(
            "{}/{}/{}/aws4_request",
            format_date(now),
            self.region,
            self.service
        );
        debug!("calculated scope: {scope}");

        let string_to_sign = string_to_sign(now, &scope, &encoded_req)?;
        debug!("calculated string to sign: {string_to_sign}");

        let signature = derive_signature(
            &cred.secret_access_key,
            now,
            &self.region,
            &self.service,
            &string_to_sign,
        );

        let mut authorization = HeaderValue::from_str(&format!(
            "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
            cred.access_key_id,
            scope,
            signing.header_name_to_vec_sorted().join(";"),
            signature
        ))?;
        authorization.set_sensitive(true);

        signing.headers.insert(header::AUTHORIZATION, authorization);

        // Seal the request. Nothing may touch the headers after this point.
        signing.apply(req)
    }
}

/// Serialize the signing view into the canonical request string.
///
/// The format is fixed: method, URI-encoded path, canonical query string,
/// one `name:value` line per header sorted by lowercase name, a blank line,
/// the `;`-joined signed header names, and the payload hash. A single byte
/// of difference here produces an authentication failure upstream with no
/// useful diagnostic, which is why this stays a pure function of its input.
pub fn canonical_request_string(ctx: &SigningRequest) -> Result<String> {
    // 256 is specially chosen to avoid reallocation for most requests.
    let mut f = String::with_capacity(256);

    writeln!(f, "{}", ctx.method)?;

    // The path is decoded first so that an already-encoded path does not
    // get double encoded.
    let path = percent_decode_str(&ctx.path)
        .decode_utf8()
        .map_err(|e| Error::request_invalid("request path is not valid utf-8").with_source(e))?;
    writeln!(f, "{}", utf8_percent_encode(&path, &AWS_URI_ENCODE_SET))?;

    writeln!(
        f,
        "{}",
        ctx.query
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&")
    )?;

    let signed_headers = ctx.header_name_to_vec_sorted();
    for name in signed_headers.iter() {
        let value = ctx.headers[*name].to_str()?;
        writeln!(f, "{name}:{value}")?;
    }
    writeln!(f)?;
    writeln!(f, "{}", signed_headers.join(";"))?;

    match ctx.headers.get(X_AMZ_CONTENT_SHA_256) {
        Some(v) => write!(f, "{}", v.to_str()?)?,
        None => write!(f, "UNSIGNED-PAYLOAD")?,
    }

    Ok(f)
}

/// Build the string to sign for the given instant and scope.
///
/// The timestamp here and the `x-amz-date` header must name the same
/// instant; any mismatch invalidates the signature.
pub fn string_to_sign(now: DateTime, scope: &str, hashed_canonical_request: &str) -> Result<String> {
    let mut f = String::new();
    writeln!(f, "AWS4-HMAC-SHA256")?;
    writeln!(f, "{}", format_iso8601(now))?;
    writeln!(f, "{scope}")?;
    write!(f, "{hashed_canonical_request}")?;
    Ok(f)
}

fn canonicalize_header(ctx: &mut SigningRequest, cred: &Credential, now: DateTime) -> Result<()> {
    // Header values are normalized according to Step 4 of
    // https://docs.aws.amazon.com/general/latest/gr/sigv4-create-canonical-request.html
    for (_, value) in ctx.headers.iter_mut() {
        SigningRequest::header_value_normalize(value)
    }

    // Insert HOST header if not present.
    if ctx.headers.get(header::HOST).is_none() {
        ctx.headers
            .insert(header::HOST, ctx.authority.as_str().parse()?);
    }

    // Insert DATE header if not present.
    if ctx.headers.get(X_AMZ_DATE).is_none() {
        ctx.headers
            .insert(X_AMZ_DATE, HeaderValue::try_from(format_iso8601(now))?);
    }

    // Insert CONTENT SHA256 header if not present. Callers that hashed the
    // payload set it beforehand; everything else signs an unsigned payload.
    if ctx.headers.get(X_AMZ_CONTENT_SHA_256).is_none() {
        ctx.headers.insert(
            X_AMZ_CONTENT_SHA_256,
            HeaderValue::from_static("UNSIGNED-PAYLOAD"),
        );
    }

    // Insert SECURITY TOKEN header if a session token exists.
    if let Some(token) = &cred.session_token {
        let mut value = HeaderValue::from_str(token)?;
        // Set token value sensitive to avoid leaking.
        value.set_sensitive(true);

        ctx.headers.insert(X_AMZ_SECURITY_TOKEN, value);
    }

    Ok(())
}

fn canonicalize_query(ctx: &mut SigningRequest) {
    if ctx.query.is_empty() {
        return;
    }

    // Sort by param name, then encode with the AWS query set so the signed
    // form and the wire form agree byte for byte.
    ctx.query.sort();

    ctx.query = ctx
        .query
        .iter()
        .map(|(k, v)| {
            (
                utf8_percent_encode(k, &AWS_QUERY_ENCODE_SET).to_string(),
                utf8_percent_encode(v, &AWS_QUERY_ENCODE_SET).to_string(),
            )
        })
        .collect();
}

/// Derive the scoped signing key and sign the string to sign with it,
/// returning the lowercase hex signature.
///
/// The key chain is recomputed on every call. Signing keys are scoped to
/// one (date, region, service) triple and must never outlive the request
/// being signed, so caching them buys nothing and keeps secrets around
/// longer than necessary.
pub fn derive_signature(
    secret: &str,
    time: DateTime,
    region: &str,
    service: &str,
    string_to_sign: &str,
) -> String {
    let signing_key = generate_signing_key(secret, time, region, service);
    hex_hmac_sha256(&signing_key, string_to_sign.as_bytes())
}

/// Run the fixed HMAC chain that scopes the long-term secret to
/// (date, region, service).
pub fn generate_signing_key(secret: &str, time: DateTime, region: &str, service: &str) -> Vec<u8> {
    // Sign secret
    let secret = format!("AWS4{secret}");
    // Sign date
    let sign_date = hmac_sha256(secret.as_bytes(), format_date(time).as_bytes());
    // Sign region
    let sign_region = hmac_sha256(sign_date.as_slice(), region.as_bytes());
    // Sign service
    let sign_service = hmac_sha256(sign_region.as_slice(), service.as_bytes());
    // Sign request
    hmac_sha256(sign_service.as_slice(), "aws4_request".as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use http::{Method, Request};
    use pretty_assertions::assert_eq;

    const ACCESS_KEY_ID: &str = "AKIDEXAMPLE";
    const SECRET_ACCESS_KEY: &str = "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY";
    const EMPTY_PAYLOAD_SHA256: &str =
        "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    fn test_credential() -> Credential {
        Credential {
            access_key_id: ACCESS_KEY_ID.to_string(),
            secret_access_key: SECRET_ACCESS_KEY.to_string(),
            session_token: None,
        }
    }

    fn test_time() -> DateTime {
        Utc.with_ymd_and_hms(2015, 8, 30, 12, 36, 0).unwrap()
    }

    /// GET / with an empty payload, the way the relay builds it: payload
    /// hash and content-length are set before signing.
    fn test_get_parts() -> Parts {
        Request::builder()
            .method(Method::GET)
            .uri("http://example.amazonaws.com/")
            .header(header::CONTENT_LENGTH, "0")
            .header(X_AMZ_CONTENT_SHA_256, EMPTY_PAYLOAD_SHA256)
            .body(())
            .expect("request must be valid")
            .into_parts()
            .0
    }

    #[test]
    fn test_generate_signing_key_aws_published_vector() {
        // https://docs.aws.amazon.com/general/latest/gr/sigv4-calculate-signature.html
        let key = generate_signing_key(SECRET_ACCESS_KEY, test_time(), "us-east-1", "iam");
        assert_eq!(
            hex::encode(&key),
            "c4afb1cc5771d871763a393e44b703571b55cc28424d1a5e86da6ed3c154a4b9"
        );
    }

    #[test]
    fn test_derive_signature_is_input_sensitive() {
        let sig = derive_signature(SECRET_ACCESS_KEY, test_time(), "us-east-1", "iam", "payload");
        assert_eq!(
            sig,
            derive_signature(SECRET_ACCESS_KEY, test_time(), "us-east-1", "iam", "payload")
        );
        assert_ne!(
            sig,
            derive_signature(SECRET_ACCESS_KEY, test_time(), "us-west-2", "iam", "payload")
        );
        assert_ne!(
            sig,
            derive_signature(SECRET_ACCESS_KEY, test_time(), "us-east-1", "s3", "payload")
        );
        assert_ne!(
            sig,
            derive_signature("other_secret", test_time(), "us-east-1", "iam", "payload")
        );
    }

    #[tokio::test]
    async fn test_sign_get_request() -> anyhow::Result<()> {
        let _ = env_logger::builder().is_test(true).try_init();

        let mut parts = test_get_parts();
        let signer = RequestSigner::new("execute-api", "us-east-1").with_time(test_time());
        signer
            .sign_request(&Context::new(), &mut parts, Some(&test_credential()))
            .await?;

        assert_eq!(parts.headers.get(header::HOST).unwrap(), "example.amazonaws.com");
        assert_eq!(
            parts.headers.get(X_AMZ_DATE).unwrap(),
            "20150830T123600Z"
        );
        // Independently computed over the canonical request
        // GET / {content-length, host, x-amz-content-sha256, x-amz-date}.
        assert_eq!(
            parts.headers.get(header::AUTHORIZATION).unwrap().to_str()?,
            "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20150830/us-east-1/execute-api/aws4_request, \
             SignedHeaders=content-length;host;x-amz-content-sha256;x-amz-date, \
             Signature=c2ad31a6c0c298e8cffb4e161907c69d920add328a3d991d52ef532981ee8489"
        );

        Ok(())
    }

    #[tokio::test]
    async fn test_sign_is_deterministic_for_fixed_time() -> anyhow::Result<()> {
        let signer = RequestSigner::new("execute-api", "us-east-1").with_time(test_time());

        let mut first = test_get_parts();
        signer
            .sign_request(&Context::new(), &mut first, Some(&test_credential()))
            .await?;
        let mut second = test_get_parts();
        signer
            .sign_request(&Context::new(), &mut second, Some(&test_credential()))
            .await?;

        assert_eq!(
            first.headers.get(header::AUTHORIZATION).unwrap(),
            second.headers.get(header::AUTHORIZATION).unwrap()
        );

        Ok(())
    }

    #[tokio::test]
    async fn test_signature_depends_on_timestamp() -> anyhow::Result<()> {
        let mut first = test_get_parts();
        RequestSigner::new("execute-api", "us-east-1")
            .with_time(test_time())
            .sign_request(&Context::new(), &mut first, Some(&test_credential()))
            .await?;

        let mut second = test_get_parts();
        RequestSigner::new("execute-api", "us-east-1")
            .with_time(Utc.with_ymd_and_hms(2015, 8, 30, 12, 37, 0).unwrap())
            .sign_request(&Context::new(), &mut second, Some(&test_credential()))
            .await?;

        assert!(second
            .headers
            .get(header::AUTHORIZATION)
            .unwrap()
            .to_str()?
            .ends_with("ab1b0aa282854d69e76987997153308c61e5bcc6f54d8a1a62e7556e41a93c8a"));
        assert_ne!(
            first.headers.get(header::AUTHORIZATION).unwrap(),
            second.headers.get(header::AUTHORIZATION).unwrap()
        );

        Ok(())
    }

    #[tokio::test]
    async fn test_sign_with_session_token() -> anyhow::Result<()> {
        let cred = Credential {
            session_token: Some("SESSIONTOKENEXAMPLE".to_string()),
            ..test_credential()
        };

        let mut parts = test_get_parts();
        RequestSigner::new("execute-api", "us-east-1")
            .with_time(test_time())
            .sign_request(&Context::new(), &mut parts, Some(&cred))
            .await?;

        assert_eq!(
            parts.headers.get(X_AMZ_SECURITY_TOKEN).unwrap(),
            "SESSIONTOKENEXAMPLE"
        );
        assert_eq!(
            parts.headers.get(header::AUTHORIZATION).unwrap().to_str()?,
            "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20150830/us-east-1/execute-api/aws4_request, \
             SignedHeaders=content-length;host;x-amz-content-sha256;x-amz-date;x-amz-security-token, \
             Signature=b48a0c5abb8fbdc196b5264b807322e01a1e46a0d519d0e3f89d7ed89f18be99"
        );

        Ok(())
    }

    #[tokio::test]
    async fn test_sign_put_request_with_query() -> anyhow::Result<()> {
        let payload = "hello world";
        let mut parts = Request::builder()
            .method(Method::PUT)
            .uri("http://example.amazonaws.com/prod/items?a=1&b=2")
            .header(header::CONTENT_LENGTH, payload.len().to_string())
            .header(X_AMZ_CONTENT_SHA_256, hex_sha256(payload.as_bytes()))
            .body(())?
            .into_parts()
            .0;

        RequestSigner::new("execute-api", "us-east-1")
            .with_time(test_time())
            .sign_request(&Context::new(), &mut parts, Some(&test_credential()))
            .await?;

        // Query params survive signing in sorted, encoded form.
        assert_eq!(parts.uri.query(), Some("a=1&b=2"));
        assert_eq!(
            parts.headers.get(header::AUTHORIZATION).unwrap().to_str()?,
            "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20150830/us-east-1/execute-api/aws4_request, \
             SignedHeaders=content-length;host;x-amz-content-sha256;x-amz-date, \
             Signature=1bad340ceac3f56217cb9ca2819cc151e44a41f358276957846dfaa9c431aeba"
        );

        Ok(())
    }

    #[tokio::test]
    async fn test_missing_credential_is_a_config_error() {
        let mut parts = test_get_parts();
        let err = RequestSigner::new("execute-api", "us-east-1")
            .with_time(test_time())
            .sign_request(&Context::new(), &mut parts, None)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), sigrelay_core::ErrorKind::ConfigInvalid);
        // No partial signing happened.
        assert!(parts.headers.get(header::AUTHORIZATION).is_none());
    }

    #[tokio::test]
    async fn test_incomplete_credential_is_a_config_error() {
        let cred = Credential {
            access_key_id: ACCESS_KEY_ID.to_string(),
            secret_access_key: String::new(),
            session_token: None,
        };

        let mut parts = test_get_parts();
        let err = RequestSigner::new("execute-api", "us-east-1")
            .with_time(test_time())
            .sign_request(&Context::new(), &mut parts, Some(&cred))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), sigrelay_core::ErrorKind::ConfigInvalid);
    }

    #[test]
    fn test_canonical_request_for_empty_inputs() -> anyhow::Result<()> {
        let mut parts = test_get_parts();
        let mut signing = SigningRequest::build(&mut parts)?;
        canonicalize_header(&mut signing, &test_credential(), test_time())?;
        canonicalize_query(&mut signing);

        let creq = canonical_request_string(&signing)?;
        let mut lines = creq.lines();
        assert_eq!(lines.next(), Some("GET"));
        assert_eq!(lines.next(), Some("/"));
        // Empty query mapping yields an empty canonical query string.
        assert_eq!(lines.next(), Some(""));
        assert_eq!(lines.next(), Some("content-length:0"));
        assert_eq!(lines.next(), Some("host:example.amazonaws.com"));
        assert_eq!(
            lines.next(),
            Some(format!("x-amz-content-sha256:{EMPTY_PAYLOAD_SHA256}").as_str())
        );
        assert_eq!(lines.next(), Some("x-amz-date:20150830T123600Z"));
        assert_eq!(lines.next(), Some(""));
        assert_eq!(
            lines.next(),
            Some("content-length;host;x-amz-content-sha256;x-amz-date")
        );
        assert_eq!(lines.next(), Some(EMPTY_PAYLOAD_SHA256));
        assert_eq!(lines.next(), None);

        Ok(())
    }

    #[test]
    fn test_canonical_query_is_sorted_and_encoded() {
        let mut parts = Request::builder()
            .method(Method::GET)
            .uri("http://example.amazonaws.com/?b=2&a=1&key=value%20with%20space")
            .body(())
            .unwrap()
            .into_parts()
            .0;
        let mut signing = SigningRequest::build(&mut parts).unwrap();
        canonicalize_query(&mut signing);

        assert_eq!(
            signing.query,
            vec![
                ("a".to_string(), "1".to_string()),
                ("b".to_string(), "2".to_string()),
                ("key".to_string(), "value%20with%20space".to_string()),
            ]
        );
    }
}
