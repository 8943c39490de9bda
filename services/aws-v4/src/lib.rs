//! AWS SigV4 request signing.

mod constants;
pub use constants::{
    AWS_ACCESS_KEY_ID, AWS_DEFAULT_REGION, AWS_HOST, AWS_SECRET_ACCESS_KEY, AWS_SERVICE,
    AWS_SESSION_TOKEN, X_AMZ_CONTENT_SHA_256, X_AMZ_DATE, X_AMZ_SECURITY_TOKEN,
};

mod credential;
pub use credential::Credential;

mod provide_credential;
pub use provide_credential::{EnvCredentialProvider, StaticCredentialProvider};

mod sign_request;
pub use sign_request::{
    canonical_request_string, derive_signature, generate_signing_key, string_to_sign, RequestSigner,
};
