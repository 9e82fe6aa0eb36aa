// # gwsync - Gateway blocklist sync
//
// This binary is a THIN integration layer. All reconciliation logic lives
// in gwsync-core; this file only:
// 1. Parses the action (`run` or `leave`)
// 2. Reads configuration from environment variables
// 3. Registers gateways and sources
// 4. Runs the engine once and maps the outcome to an exit code
//
// ## Configuration
//
// ### Scope
// - `GWSYNC_SCOPE`: Scope name; lists are `[scope] - 001`, ..., the rule is
//   `[scope] Block Ads` (default: `AdBlock-DNS Filters`)
//
// ### Gateway
// - `GWSYNC_API_TOKEN`: Cloudflare API token
// - `GWSYNC_ACCOUNT_ID`: Cloudflare account id
// - `GWSYNC_MODE`: `dry-run` to skip every write
//
// ### Sources (`run` only)
// - `GWSYNC_BLOCK_URLS`: Comma-separated blocklist URLs or paths
// - `GWSYNC_ALLOW_URLS`: Comma-separated allowlist URLs or paths
//
// ### Engine
// - `GWSYNC_MAX_LIST_SIZE`: Domains per list (default: 1000)
// - `GWSYNC_MAX_TOTAL_DOMAINS`: Quota across all lists (default: 300000)
// - `GWSYNC_LOG_LEVEL`: trace, debug, info, warn, error (default: info)
//
// ## Example
//
// ```bash
// export GWSYNC_API_TOKEN=...
// export GWSYNC_ACCOUNT_ID=...
// export GWSYNC_BLOCK_URLS=https://example.org/hosts.txt,/etc/gwsync/extra.txt
//
// gwsync run
// gwsync leave
// ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use gwsync_core::config::{
    DEFAULT_MAX_LIST_SIZE, DEFAULT_MAX_TOTAL_DOMAINS, EngineConfig, GatewayConfig, Scope,
    ScopeConfig, SourceConfig, SyncConfig,
};
use gwsync_core::traits::GatewayClient;
use gwsync_core::{Registry, RunReport, SyncEngine};
use std::env;
use std::process::ExitCode;
use tracing::{Level, error, info};
use tracing_subscriber::FmtSubscriber;

/// Scope name used when `GWSYNC_SCOPE` is unset
const DEFAULT_SCOPE: &str = "AdBlock-DNS Filters";

/// Exit codes for different termination scenarios
///
/// - 0: Run completed
/// - 1: Configuration error or refused precondition (e.g. quota)
/// - 2: Runtime error (remote call failed) or usage error
#[derive(Debug, Clone, Copy)]
enum GwsyncExitCode {
    /// Run completed
    Success = 0,
    /// Configuration error or precondition failure
    ConfigError = 1,
    /// Runtime error
    RuntimeError = 2,
}

impl From<GwsyncExitCode> for ExitCode {
    fn from(code: GwsyncExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Sync a domain blocklist into Cloudflare Gateway lists and a block rule
#[derive(Debug, Parser)]
#[command(name = "gwsync", version, about)]
struct Cli {
    #[command(subcommand)]
    action: Action,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
enum Action {
    /// Reconcile the gateway against the configured blocklists
    Run,
    /// Delete every list and rule this scope manages
    Leave,
}

/// Application configuration
struct Config {
    scope: String,
    api_token: String,
    account_id: String,
    block_urls: Vec<String>,
    allow_urls: Vec<String>,
    max_list_size: usize,
    max_total_domains: usize,
    log_level: String,
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_number(name: &str, default: usize) -> Result<usize> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("{} must be a positive integer. Got: '{}'", name, raw)),
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Ok(Self {
            scope: env::var("GWSYNC_SCOPE").unwrap_or_else(|_| DEFAULT_SCOPE.to_string()),
            api_token: env::var("GWSYNC_API_TOKEN").unwrap_or_default(),
            account_id: env::var("GWSYNC_ACCOUNT_ID").unwrap_or_default(),
            block_urls: split_list(&env::var("GWSYNC_BLOCK_URLS").unwrap_or_default()),
            allow_urls: split_list(&env::var("GWSYNC_ALLOW_URLS").unwrap_or_default()),
            max_list_size: parse_number("GWSYNC_MAX_LIST_SIZE", DEFAULT_MAX_LIST_SIZE)?,
            max_total_domains: parse_number("GWSYNC_MAX_TOTAL_DOMAINS", DEFAULT_MAX_TOTAL_DOMAINS)?,
            log_level: env::var("GWSYNC_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }

    /// Validate the configuration for `action`
    fn validate(&self, action: Action) -> Result<()> {
        if self.api_token.is_empty() {
            anyhow::bail!(
                "GWSYNC_API_TOKEN is required. \
                Set it via: export GWSYNC_API_TOKEN=your_token"
            );
        }

        // Check for obvious placeholder tokens (common mistake)
        let token_lower = self.api_token.to_lowercase();
        if token_lower.contains("your_token")
            || token_lower.contains("replace_me")
            || token_lower == "token"
        {
            anyhow::bail!(
                "GWSYNC_API_TOKEN appears to be a placeholder. \
                Use an actual API token from the Cloudflare dashboard."
            );
        }

        if self.account_id.is_empty() {
            anyhow::bail!(
                "GWSYNC_ACCOUNT_ID is required. \
                Set it via: export GWSYNC_ACCOUNT_ID=your_account_id"
            );
        }

        if self.scope.trim().is_empty() {
            anyhow::bail!("GWSYNC_SCOPE cannot be empty");
        }

        if action == Action::Run && self.block_urls.is_empty() {
            anyhow::bail!(
                "GWSYNC_BLOCK_URLS must contain at least one URL or path. \
                Set it via: export GWSYNC_BLOCK_URLS=https://example.org/hosts.txt"
            );
        }

        for url in self.block_urls.iter().chain(&self.allow_urls) {
            if url.starts_with("http://") {
                eprintln!(
                    "WARNING: {} uses HTTP (not HTTPS). \
                    A tampered blocklist changes what gets blocked.",
                    url
                );
            }
        }

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "GWSYNC_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        self.to_sync_config().engine.validate()?;
        Ok(())
    }

    fn to_sync_config(&self) -> SyncConfig {
        SyncConfig {
            scope: ScopeConfig::new(self.scope.trim()),
            gateway: GatewayConfig::Cloudflare {
                api_token: self.api_token.clone(),
                account_id: self.account_id.clone(),
            },
            sources: SourceConfig::Http {
                block_urls: self.block_urls.clone(),
                allow_urls: self.allow_urls.clone(),
            },
            engine: EngineConfig {
                max_list_size: self.max_list_size,
                max_total_domains: self.max_total_domains,
                ..EngineConfig::default()
            },
        }
    }
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // Help and version land here too, with exit code 0
            let _ = e.print();
            return ExitCode::from(e.exit_code() as u8);
        }
    };

    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return GwsyncExitCode::ConfigError.into();
        }
    };

    if let Err(e) = config.validate(cli.action) {
        eprintln!("Configuration validation error: {}", e);
        return GwsyncExitCode::ConfigError.into();
    }

    // Initialize tracing
    let log_level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return GwsyncExitCode::ConfigError.into();
    }

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return GwsyncExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        match execute(cli.action, config.to_sync_config()).await {
            Ok(report) => {
                log_report(&report);
                GwsyncExitCode::Success
            }
            Err(e) => {
                error!("{}", e);
                exit_code_for(&e)
            }
        }
    });

    result.into()
}

/// Precondition failures are configuration problems; anything else is a
/// runtime failure
fn exit_code_for(e: &anyhow::Error) -> GwsyncExitCode {
    match e.downcast_ref::<gwsync_core::Error>() {
        Some(core) if core.is_precondition() => GwsyncExitCode::ConfigError,
        _ => GwsyncExitCode::RuntimeError,
    }
}

/// Build the components and run one action
async fn execute(action: Action, config: SyncConfig) -> Result<RunReport> {
    let registry = Registry::new();

    #[cfg(feature = "cloudflare")]
    gwsync_gateway_cloudflare::register(&registry);

    #[cfg(feature = "http")]
    gwsync_source_http::register(&registry);

    let scope = config.scope.to_scope()?;
    let gateway = registry.create_gateway(&config.gateway)?;
    let engine = build_engine(gateway, scope, config.engine.clone())?;

    let report = match action {
        Action::Run => {
            info!(
                "Syncing rule '{}' from {} source(s)",
                engine.scope().rule_name(),
                match &config.sources {
                    SourceConfig::Http { block_urls, .. } => block_urls.len(),
                    SourceConfig::Custom { .. } => 1,
                }
            );
            let source = registry.create_source(&config.sources)?;
            engine.run(source.as_ref()).await?
        }
        Action::Leave => {
            info!("Leaving scope '{}'", engine.scope().list_prefix());
            engine.teardown().await?
        }
    };

    Ok(report)
}

/// Build the engine without an event listener
///
/// The receiver is dropped right away so events are discarded silently
/// instead of filling the channel.
fn build_engine(
    gateway: Box<dyn GatewayClient>,
    scope: Scope,
    config: EngineConfig,
) -> Result<SyncEngine> {
    let (engine, _) = SyncEngine::new(gateway, scope, config)?;
    Ok(engine)
}

fn log_report(report: &RunReport) {
    let elapsed = report.finished_at - report.started_at;
    info!(
        "{} finished in {} ms: {} created, {} updated, {} unchanged, {} deleted list(s); rule {}",
        report.mode,
        elapsed.num_milliseconds(),
        report.lists_created(),
        report.lists_updated(),
        report.lists_unchanged(),
        report.lists_deleted(),
        report.rule_action()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use gwsync_core::StaticDomainSource;

    fn config() -> Config {
        Config {
            scope: DEFAULT_SCOPE.to_string(),
            api_token: "0123456789abcdef0123456789abcdef01234567".to_string(),
            account_id: "account".to_string(),
            block_urls: vec!["https://example.org/hosts.txt".to_string()],
            allow_urls: vec![],
            max_list_size: DEFAULT_MAX_LIST_SIZE,
            max_total_domains: DEFAULT_MAX_TOTAL_DOMAINS,
            log_level: "info".to_string(),
        }
    }

    #[test]
    fn test_actions_parse() {
        assert_eq!(
            Cli::try_parse_from(["gwsync", "run"]).unwrap().action,
            Action::Run
        );
        assert_eq!(
            Cli::try_parse_from(["gwsync", "leave"]).unwrap().action,
            Action::Leave
        );
    }

    #[test]
    fn test_unknown_action_is_usage_error() {
        let err = Cli::try_parse_from(["gwsync", "sync"]).unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(Cli::try_parse_from(["gwsync"]).is_err());
    }

    #[test]
    fn test_valid_config() {
        assert!(config().validate(Action::Run).is_ok());
    }

    #[test]
    fn test_leave_needs_no_sources() {
        let config = Config {
            block_urls: vec![],
            ..config()
        };
        assert!(config.validate(Action::Run).is_err());
        assert!(config.validate(Action::Leave).is_ok());
    }

    #[test]
    fn test_placeholder_token_rejected() {
        let config = Config {
            api_token: "your_token_here".to_string(),
            ..config()
        };
        assert!(config.validate(Action::Leave).is_err());
    }

    #[test]
    fn test_zero_list_size_rejected() {
        let config = Config {
            max_list_size: 0,
            ..config()
        };
        assert!(config.validate(Action::Run).is_err());
    }

    #[test]
    fn test_scope_names() {
        let scope = config().to_sync_config().scope.to_scope().unwrap();
        assert_eq!(scope.list_name(1), "[AdBlock-DNS Filters] - 001");
        assert_eq!(scope.rule_name(), "[AdBlock-DNS Filters] Block Ads");
    }

    #[test]
    fn test_quota_maps_to_config_exit_code() {
        let quota: anyhow::Error = gwsync_core::Error::quota_exceeded(2, 1).into();
        assert!(matches!(exit_code_for(&quota), GwsyncExitCode::ConfigError));

        let remote: anyhow::Error = gwsync_core::Error::gateway("boom").into();
        assert!(matches!(exit_code_for(&remote), GwsyncExitCode::RuntimeError));
    }

    #[tokio::test]
    async fn test_engine_runs_past_event_capacity() {
        let gateway = gwsync_core::MemoryGateway::new();
        let engine = build_engine(
            Box::new(gateway.clone()),
            Scope::from_name("Test").unwrap(),
            EngineConfig {
                max_list_size: 1,
                max_total_domains: 100,
                event_channel_capacity: 1,
            },
        )
        .unwrap();
        let domains = StaticDomainSource::new((0..10).map(|i| format!("d{}.example.com", i)));

        let report = engine.run(&domains).await.unwrap();

        assert_eq!(report.lists_created(), 10);
        assert_eq!(gateway.list_count().await, 10);
    }

    #[test]
    fn test_split_list() {
        assert_eq!(split_list(" a, ,b ,"), vec!["a".to_string(), "b".to_string()]);
    }
}
