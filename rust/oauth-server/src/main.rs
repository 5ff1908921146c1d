use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum_server::{tls_openssl::OpenSSLConfig, Handle};
use clap::{crate_description, crate_version, Parser};
use project_shim_oauth_server::{
    code_store::CodeStore,
    server::{self, AppState, DEFAULT_USERINFO_USERNAME},
    token::ServiceAccountTokens,
};
use project_shim_utils::tls::{SelfSignedCertificate, DEFAULT_KEY_BITS};
use stackable_operator::logging::TracingTarget;
use tokio::signal::unix::{signal, SignalKind};

pub const APP_NAME: &str = "oauth-server";
const FIELD_MANAGER: &str = "oauth-server.project.openshift.io";

#[derive(clap::Parser)]
#[clap(author, version)]
struct Opts {
    /// Plain HTTP listen address
    #[arg(long, env, default_value = "0.0.0.0:8080")]
    address: SocketAddr,

    /// HTTPS listen address, served with a self-signed certificate for `localhost`
    #[arg(long, env, default_value = "0.0.0.0:8081")]
    https_address: SocketAddr,

    /// Namespace holding the ServiceAccounts that tokens are issued for
    #[arg(long, env, default_value = "oauth-server")]
    service_account_namespace: String,

    /// How long an authorization code stays redeemable
    #[arg(long, env, default_value_t = 300)]
    code_ttl_seconds: u64,

    /// `preferred_username` reported by `/userinfo`
    #[arg(long, env = "username", default_value = DEFAULT_USERINFO_USERNAME)]
    userinfo_username: String,

    /// Tracing log collector system
    #[arg(long, env, default_value_t, value_enum)]
    pub tracing_target: TracingTarget,
}

mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
    pub const TARGET: Option<&str> = option_env!("TARGET");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let opts = Opts::parse();
    stackable_operator::logging::initialize_logging(
        "OAUTH_SERVER_LOG",
        APP_NAME,
        opts.tracing_target,
    );
    stackable_operator::utils::print_startup_string(
        crate_description!(),
        crate_version!(),
        built_info::GIT_VERSION,
        built_info::TARGET.unwrap_or("unknown target"),
        built_info::BUILT_TIME_UTC,
        built_info::RUSTC_VERSION,
    );
    let client = stackable_operator::client::create_client(Some(FIELD_MANAGER.to_string())).await?;

    let codes = Arc::new(CodeStore::new(Duration::from_secs(opts.code_ttl_seconds)));
    tokio::spawn({
        let codes = codes.clone();
        async move { codes.run_sweeper().await }
    });
    let app = server::router(AppState {
        codes,
        tokens: Arc::new(ServiceAccountTokens::new(
            client.as_kube_client(),
            &opts.service_account_namespace,
        )),
        userinfo_username: opts.userinfo_username,
    });

    // Never written to disk, a restart rotates it
    let certificate = SelfSignedCertificate::generate("localhost", DEFAULT_KEY_BITS)?;
    let tls_config = OpenSSLConfig::from_pem(&certificate.cert_pem()?, &certificate.key_pem()?)?;

    let handle = Handle::new();
    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::spawn({
        let handle = handle.clone();
        async move {
            sigterm.recv().await;
            tracing::info!("received SIGTERM, shutting down");
            handle.graceful_shutdown(Some(Duration::from_secs(10)));
        }
    });

    tracing::info!(address = %opts.address, https_address = %opts.https_address, "listening");
    tokio::try_join!(
        axum_server::bind(opts.address)
            .handle(handle.clone())
            .serve(app.clone().into_make_service()),
        axum_server::bind_openssl(opts.https_address, tls_config)
            .handle(handle)
            .serve(app.into_make_service()),
    )?;
    Ok(())
}
