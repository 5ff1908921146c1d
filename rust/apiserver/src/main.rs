use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum_server::{tls_openssl::OpenSSLConfig, Handle};
use clap::{crate_description, crate_version, Parser};
use project_shim_apiserver::{cluster::KubeNamespaces, server, storage::Registry};
use project_shim_utils::tls::{SelfSignedCertificate, DEFAULT_KEY_BITS};
use stackable_operator::logging::TracingTarget;
use tokio::signal::unix::{signal, SignalKind};

pub const APP_NAME: &str = "project-apiserver";
const FIELD_MANAGER: &str = "project-apiserver.project.openshift.io";

#[derive(clap::Parser)]
#[clap(author, version)]
struct Opts {
    /// Address to serve the API on
    #[arg(long, env, default_value = "0.0.0.0:8443")]
    address: SocketAddr,

    /// Serve HTTPS with a self-signed certificate generated at startup
    #[arg(long, env)]
    tls: bool,

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
        "PROJECT_APISERVER_LOG",
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
    let registry = Registry::standard(Arc::new(KubeNamespaces::new(
        client.as_kube_client(),
    )));
    let app = server::router(Arc::new(registry)).into_make_service();

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

    if opts.tls {
        let certificate = SelfSignedCertificate::generate("localhost", DEFAULT_KEY_BITS)?;
        let config = OpenSSLConfig::from_pem(&certificate.cert_pem()?, &certificate.key_pem()?)?;
        tracing::info!(address = %opts.address, "serving HTTPS");
        axum_server::bind_openssl(opts.address, config)
            .handle(handle)
            .serve(app)
            .await?;
    } else {
        tracing::info!(address = %opts.address, "serving HTTP");
        axum_server::bind(opts.address)
            .handle(handle)
            .serve(app)
            .await?;
    }
    Ok(())
}
