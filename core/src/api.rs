use crate::{Context, Result};
use std::fmt::Debug;

/// SigningCredential is the material a scheme signs requests with.
pub trait SigningCredential: Clone + Debug + Send + Sync + Unpin + 'static {
    /// Check if the credential is complete enough to sign with.
    fn is_valid(&self) -> bool;
}

impl<T: SigningCredential> SigningCredential for Option<T> {
    fn is_valid(&self) -> bool {
        let Some(cred) = self else {
            return false;
        };

        cred.is_valid()
    }
}

/// ProvideCredential resolves the credential used for signing.
///
/// Different deployments keep credentials in different places; the relay
/// reads them from its environment, tests inject them statically.
#[async_trait::async_trait]
pub trait ProvideCredential: Debug + Send + Sync + Unpin + 'static {
    /// Credential returned by this provider.
    type Credential: Send + Sync + Unpin + 'static;

    /// Resolve a credential from the given context.
    ///
    /// Returns `Ok(None)` when this provider has nothing to offer, which is
    /// not an error by itself; whether an absent credential is fatal is the
    /// signing scheme's call.
    async fn provide_credential(&self, ctx: &Context) -> Result<Option<Self::Credential>>;
}

/// SignRequest computes and attaches the authorization material for one
/// request.
///
/// Implementations mutate the request parts in place. Once this returns,
/// the request is sealed: adding any header afterwards invalidates the
/// signature.
#[async_trait::async_trait]
pub trait SignRequest: Debug + Send + Sync + Unpin + 'static {
    /// Credential used by this signer.
    type Credential: Send + Sync + Unpin + 'static;

    /// Sign the request parts with the given credential.
    async fn sign_request(
        &self,
        ctx: &Context,
        req: &mut http::request::Parts,
        credential: Option<&Self::Credential>,
    ) -> Result<()>;
}
