//! Issuing real cluster tokens for the principal behind a redeemed code.

use async_trait::async_trait;
use project_shim_utils::Unloggable;
use snafu::{OptionExt, ResultExt, Snafu};
use stackable_operator::{
    k8s_openapi::{
        api::{
            authentication::v1::{TokenRequest, TokenRequestSpec},
            core::v1::ServiceAccount,
        },
        apimachinery::pkg::apis::meta::v1::Time,
    },
    kube::{
        self,
        api::{Api, PostParams},
        runtime::reflector::ObjectRef,
    },
};

/// Lifetime requested for every issued token.
pub const TOKEN_LIFETIME_SECONDS: i64 = 168 * 60 * 60;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to serialize TokenRequest"))]
    SerializeRequest { source: serde_json::Error },

    #[snafu(display("failed to request token for {service_account}"))]
    CreateToken {
        source: kube::Error,
        service_account: ObjectRef<ServiceAccount>,
    },

    #[snafu(display("token issued for {service_account} has no status"))]
    MissingStatus {
        service_account: ObjectRef<ServiceAccount>,
    },
}
type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug)]
pub struct IssuedToken {
    pub token: Unloggable<String>,
    pub expires_at: Option<Time>,
}

#[async_trait]
pub trait TokenIssuer: Send + Sync + 'static {
    async fn issue(&self, principal: &str) -> Result<IssuedToken>;
}

/// Issues tokens for the `ServiceAccount` named after the principal.
pub struct ServiceAccountTokens {
    api: Api<ServiceAccount>,
    namespace: String,
}

impl ServiceAccountTokens {
    pub fn new(client: kube::Client, namespace: &str) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
            namespace: namespace.to_string(),
        }
    }
}

#[async_trait]
impl TokenIssuer for ServiceAccountTokens {
    async fn issue(&self, principal: &str) -> Result<IssuedToken> {
        let service_account = ObjectRef::<ServiceAccount>::new(principal).within(&self.namespace);
        let request = TokenRequest {
            spec: TokenRequestSpec {
                expiration_seconds: Some(TOKEN_LIFETIME_SECONDS),
                ..TokenRequestSpec::default()
            },
            ..TokenRequest::default()
        };
        let body = serde_json::to_vec(&request).context(SerializeRequestSnafu)?;
        let issued = self
            .api
            .create_subresource::<TokenRequest>("token", principal, &PostParams::default(), body)
            .await
            .with_context(|_| CreateTokenSnafu {
                service_account: service_account.clone(),
            })?;
        let status = issued
            .status
            .context(MissingStatusSnafu { service_account })?;
        Ok(IssuedToken {
            token: Unloggable(status.token),
            expires_at: Some(status.expiration_timestamp),
        })
    }
}
