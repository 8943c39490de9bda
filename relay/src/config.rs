use sigrelay_aws_v4::{AWS_DEFAULT_REGION, AWS_HOST, AWS_SERVICE};
use sigrelay_core::{Context, Error, Result};

/// Environment variable for the bind address.
pub const SIGRELAY_LISTEN: &str = "SIGRELAY_LISTEN";

const DEFAULT_LISTEN: &str = "0.0.0.0:3000";

/// Relay configuration, resolved once at startup.
///
/// `region`, `service` and `host` are required; a missing or empty value
/// fails the load before any network activity. Credentials are not read
/// here, they are resolved by the signer's credential provider.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Address the relay listens on.
    pub listen: String,
    /// AWS region the upstream endpoint lives in.
    pub region: String,
    /// AWS service name used in the credential scope.
    pub service: String,
    /// Upstream host every request is relayed to.
    pub host: String,
}

impl RelayConfig {
    /// Load the configuration from the context environment.
    pub fn load(ctx: &Context) -> Result<Self> {
        Ok(Self {
            listen: ctx
                .env_var(SIGRELAY_LISTEN)
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| DEFAULT_LISTEN.to_string()),
            region: required_var(ctx, AWS_DEFAULT_REGION)?,
            service: required_var(ctx, AWS_SERVICE)?,
            host: required_var(ctx, AWS_HOST)?,
        })
    }
}

fn required_var(ctx: &Context, name: &str) -> Result<String> {
    match ctx.env_var(name) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(Error::config_invalid(format!(
            "required environment variable {name} is missing or empty"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sigrelay_core::{ErrorKind, StaticEnv};
    use std::collections::HashMap;

    fn ctx_with(envs: &[(&str, &str)]) -> Context {
        Context::new().with_env(StaticEnv {
            envs: envs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<HashMap<_, _>>(),
        })
    }

    #[test]
    fn test_load_with_defaults() {
        let ctx = ctx_with(&[
            (AWS_DEFAULT_REGION, "us-east-1"),
            (AWS_SERVICE, "execute-api"),
            (AWS_HOST, "example.amazonaws.com"),
        ]);

        let config = RelayConfig::load(&ctx).unwrap();
        assert_eq!(config.listen, "0.0.0.0:3000");
        assert_eq!(config.region, "us-east-1");
        assert_eq!(config.service, "execute-api");
        assert_eq!(config.host, "example.amazonaws.com");
    }

    #[test]
    fn test_listen_override() {
        let ctx = ctx_with(&[
            (SIGRELAY_LISTEN, "127.0.0.1:8080"),
            (AWS_DEFAULT_REGION, "us-east-1"),
            (AWS_SERVICE, "execute-api"),
            (AWS_HOST, "example.amazonaws.com"),
        ]);

        assert_eq!(RelayConfig::load(&ctx).unwrap().listen, "127.0.0.1:8080");
    }

    #[test]
    fn test_missing_host_is_config_invalid() {
        let ctx = ctx_with(&[
            (AWS_DEFAULT_REGION, "us-east-1"),
            (AWS_SERVICE, "execute-api"),
        ]);

        let err = RelayConfig::load(&ctx).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigInvalid);
    }

    #[test]
    fn test_empty_value_is_config_invalid() {
        let ctx = ctx_with(&[
            (AWS_DEFAULT_REGION, "us-east-1"),
            (AWS_SERVICE, ""),
            (AWS_HOST, "example.amazonaws.com"),
        ]);

        let err = RelayConfig::load(&ctx).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigInvalid);
    }
}
