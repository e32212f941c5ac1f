mod server;

use rmcp::ServiceExt;
use tracing_subscriber::EnvFilter;

use partmap_core::{read_settings, Store, UserId};
use server::PartmapServer;

/// `--user <id>` wins over `$PARTMAP_USER`; both fall back to "local".
fn user_arg(args: &[String]) -> String {
    args.iter()
        .position(|a| a == "--user")
        .and_then(|i| args.get(i + 1).cloned())
        .or_else(|| std::env::var("PARTMAP_USER").ok())
        .unwrap_or_else(|| "local".to_string())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // stdout carries the protocol, so logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let user = UserId::parse(&user_arg(&args))?;
    let store = Store::from_env();
    let settings = read_settings(store.root()).with_env_overrides();
    tracing::info!(
        root = %store.root().display(),
        %user,
        ai = settings.is_configured(),
        "starting partmap-mcp"
    );

    let service = PartmapServer::new(store, user, settings)
        .serve(rmcp::transport::io::stdio())
        .await
        .inspect_err(|e| tracing::error!(error = %e, "MCP server error"))?;
    service.waiting().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_flag_is_read() {
        let args: Vec<String> = ["partmap-mcp", "--user", "alice"].map(String::from).to_vec();
        assert_eq!(user_arg(&args), "alice");
    }
}
