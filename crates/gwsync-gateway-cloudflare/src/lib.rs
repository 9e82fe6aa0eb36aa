// # Cloudflare Gateway Client
//
// This crate provides a Cloudflare Zero Trust Gateway client for gwsync.
//
// ## Behavior
//
// - One HTTP request per logical operation, except list membership reads
//   which follow pagination
// - Full error propagation to the engine; the first failure ends the run
// - HTTP timeout configured (30 seconds)
// - Specific error handling for HTTP status codes (401/403, 404, 429, 5xx)
// - Cloudflare `success: false` envelopes are errors even on HTTP 200
// - Dry-run mode for safe testing
// - No retry, backoff or caching
//
// ## Trust Level: Untrusted (Gateway Client)
//
// **Allowed**:
// - Perform HTTPS API calls to the Cloudflare API only
// - Parse Cloudflare-specific responses
//
// **Forbidden**:
// - Spawn tasks or threads
// - Retry failed calls
// - Decide whether a write is needed (owned by SyncEngine)
// - Cache state beyond a single call
//
// ## Security Requirements
//
// - API token NEVER appears in logs
// - API token MUST be provided via environment variables only
// - Client construction fails if the token is empty
//
// ## API Reference
//
// - Cloudflare API v4: https://developers.cloudflare.com/api/
// - Lists: `/accounts/:account_id/gateway/lists[/:list_id[/items]]`
// - Rules: `/accounts/:account_id/gateway/rules[/:rule_id]`

use async_trait::async_trait;
use gwsync_core::config::GatewayConfig;
use gwsync_core::traits::{DomainSet, GatewayClient, GatewayFactory, RemoteList, RemoteRule};
use gwsync_core::{Error, Result};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::collections::BTreeSet;
use std::time::Duration;

/// Cloudflare API base URL
const CLOUDFLARE_API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// Default HTTP timeout for API requests (30 seconds)
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Page size when reading list items
const ITEMS_PER_PAGE: usize = 1000;

/// Traffic expression for a rule that references no lists
///
/// Cloudflare rejects an empty expression; this one matches nothing and the
/// rule is disabled besides.
const EMPTY_TRAFFIC: &str = "dns.fqdn == \"gwsync.invalid\"";

/// Cloudflare API response envelope
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct ListRecord {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct ItemRecord {
    value: String,
}

#[derive(Debug, Deserialize)]
struct RuleRecord {
    id: String,
    name: String,
    #[serde(default)]
    traffic: String,
}

#[derive(Debug, Deserialize)]
struct Created {
    id: String,
}

/// Add one page of list items to `members`
///
/// Returns whether another page should be requested: only a full page that
/// contributed at least one new member continues the walk.
fn absorb_page(members: &mut DomainSet, items: impl IntoIterator<Item = String>) -> bool {
    let before = members.len();
    let mut fetched = 0usize;
    for item in items {
        fetched += 1;
        members.insert(item);
    }
    fetched >= ITEMS_PER_PAGE && members.len() > before
}

/// Build the traffic expression for a rule referencing `list_ids`
///
/// ```
/// # use std::collections::BTreeSet;
/// let ids: BTreeSet<String> = ["a".to_string(), "b".to_string()].into();
/// assert_eq!(
///     gwsync_gateway_cloudflare::build_traffic(&ids),
///     "any(dns.domains[*] in $a) or any(dns.domains[*] in $b)"
/// );
/// ```
pub fn build_traffic(list_ids: &BTreeSet<String>) -> String {
    if list_ids.is_empty() {
        return EMPTY_TRAFFIC.to_string();
    }

    list_ids
        .iter()
        .map(|id| format!("any(dns.domains[*] in ${})", id))
        .collect::<Vec<_>>()
        .join(" or ")
}

/// Extract the list ids a traffic expression references
///
/// Every `$` followed by an id (alphanumerics and `-`) counts. Expressions
/// written by hand are read the same way.
pub fn parse_traffic(traffic: &str) -> BTreeSet<String> {
    traffic
        .split('$')
        .skip(1)
        .map(|rest| {
            rest.chars()
                .take_while(|c| c.is_ascii_alphanumeric() || *c == '-')
                .collect::<String>()
        })
        .filter(|id| !id.is_empty())
        .collect()
}

/// Cloudflare Zero Trust Gateway client
///
/// # Trust Level: Untrusted
///
/// This client is isolated, stateless, and single-shot. Every decision
/// about what to write is made by `SyncEngine`.
///
/// # Dry-Run Mode
///
/// When `dry_run` is true, the client will:
/// - Perform all GET requests
/// - Log every intended write with its payload size
/// - **NOT** modify lists or rules
/// - Return placeholder ids from create calls
pub struct CloudflareGateway {
    /// Cloudflare API token
    /// ⚠️ NEVER log this value
    api_token: String,

    /// Account owning the gateway lists and rules
    account_id: String,

    /// HTTP client for API requests
    client: reqwest::Client,

    /// Dry-run mode: if true, perform GET requests but skip writes
    dry_run: bool,
}

// Custom Debug implementation that hides the API token
impl std::fmt::Debug for CloudflareGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudflareGateway")
            .field("api_token", &"<REDACTED>")
            .field("account_id", &self.account_id)
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

impl CloudflareGateway {
    /// Create a new Cloudflare gateway client
    ///
    /// # Parameters
    ///
    /// - `api_token`: API token with Zero Trust edit permissions
    /// - `account_id`: Account owning the gateway
    /// - `dry_run`: If true, perform GET requests but skip writes
    pub fn new(
        api_token: impl Into<String>,
        account_id: impl Into<String>,
        dry_run: bool,
    ) -> Result<Self> {
        let api_token = api_token.into();
        let account_id = account_id.into();

        if api_token.is_empty() {
            return Err(Error::config("Cloudflare API token cannot be empty"));
        }
        if account_id.is_empty() {
            return Err(Error::config("Cloudflare account ID cannot be empty"));
        }

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::http(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            api_token,
            account_id,
            client,
            dry_run,
        })
    }

    /// Create a client in live mode
    pub fn new_live(api_token: impl Into<String>, account_id: impl Into<String>) -> Result<Self> {
        Self::new(api_token, account_id, false)
    }

    /// Create a client in dry-run mode
    pub fn new_dry_run(
        api_token: impl Into<String>,
        account_id: impl Into<String>,
    ) -> Result<Self> {
        Self::new(api_token, account_id, true)
    }

    /// Whether writes are skipped
    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/accounts/{}/gateway/{}",
            CLOUDFLARE_API_BASE, self.account_id, path
        )
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, self.url(path))
            .bearer_auth(&self.api_token)
            .header("Content-Type", "application/json")
    }

    /// Send a request and unwrap the Cloudflare envelope
    ///
    /// `what` names the resource for error messages.
    async fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        what: &str,
    ) -> Result<Option<T>> {
        let response = request
            .send()
            .await
            .map_err(|e| Error::provider("cloudflare", format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(status_error(status, what, &error_text));
        }

        let envelope: Envelope<T> = response.json().await.map_err(|e| {
            Error::provider("cloudflare", format!("Failed to parse response: {}", e))
        })?;

        if !envelope.success {
            let message = envelope
                .errors
                .iter()
                .map(|e| format!("{} ({})", e.message, e.code))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(Error::provider(
                "cloudflare",
                format!("{} rejected: {}", what, message),
            ));
        }

        Ok(envelope.result)
    }

    fn rule_body(&self, name: &str, list_ids: &BTreeSet<String>) -> Value {
        json!({
            "name": name,
            "description": "Managed by gwsync",
            "action": "block",
            "enabled": !list_ids.is_empty(),
            "filters": ["dns"],
            "traffic": build_traffic(list_ids),
            "rule_settings": { "block_page_enabled": false },
        })
    }

    fn skip_write(&self, what: std::fmt::Arguments<'_>) -> bool {
        if self.dry_run {
            tracing::info!("[DRY-RUN] Would {}", what);
        }
        self.dry_run
    }
}

/// Map a non-2xx status to an error
fn status_error(status: StatusCode, what: &str, body: &str) -> Error {
    match status.as_u16() {
        401 | 403 => Error::auth(format!(
            "Invalid API token or insufficient permissions. Status: {}",
            status
        )),
        404 => Error::not_found(what.to_string()),
        429 => Error::rate_limited(format!("Cloudflare rate limit exceeded. Status: {}", status)),
        500..=599 => Error::provider(
            "cloudflare",
            format!("Cloudflare server error (transient): {} - {}", status, body),
        ),
        _ => Error::provider(
            "cloudflare",
            format!("{} failed: {} - {}", what, status, body),
        ),
    }
}

#[async_trait]
impl GatewayClient for CloudflareGateway {
    async fn list_lists(&self, name_prefix: &str) -> Result<Vec<RemoteList>> {
        let lists: Vec<ListRecord> = self
            .send(self.request(Method::GET, "lists"), "Gateway lists")
            .await?
            .unwrap_or_default();

        Ok(lists
            .into_iter()
            .filter(|l| l.name.starts_with(name_prefix))
            .map(|l| RemoteList::new(l.id, l.name))
            .collect())
    }

    async fn list_rules(&self, rule_name: &str) -> Result<Vec<RemoteRule>> {
        let rules: Vec<RuleRecord> = self
            .send(self.request(Method::GET, "rules"), "Gateway rules")
            .await?
            .unwrap_or_default();

        Ok(rules
            .into_iter()
            .filter(|r| r.name == rule_name)
            .map(|r| RemoteRule {
                list_ids: parse_traffic(&r.traffic),
                id: r.id,
                name: r.name,
            })
            .collect())
    }

    async fn list_members(&self, list_id: &str) -> Result<DomainSet> {
        let path = format!("lists/{}/items", list_id);
        let what = format!("List {}", list_id);
        let mut members = DomainSet::new();
        let mut page = 1usize;

        loop {
            let request = self
                .request(Method::GET, &path)
                .query(&[("page", page), ("per_page", ITEMS_PER_PAGE)]);
            let items: Vec<ItemRecord> = self.send(request, &what).await?.unwrap_or_default();

            if !absorb_page(&mut members, items.into_iter().map(|i| i.value)) {
                break;
            }
            page += 1;
        }

        tracing::debug!("List {} holds {} items", list_id, members.len());
        Ok(members)
    }

    async fn create_list(&self, name: &str, members: &DomainSet) -> Result<String> {
        if self.skip_write(format_args!("create list {} with {} items", name, members.len())) {
            return Ok(format!("dry-run:{}", name));
        }

        let body = json!({
            "name": name,
            "description": "Managed by gwsync",
            "type": "DOMAIN",
            "items": members.iter().map(|d| json!({ "value": d })).collect::<Vec<_>>(),
        });
        let created: Created = self
            .send(self.request(Method::POST, "lists").json(&body), name)
            .await?
            .ok_or_else(|| Error::provider("cloudflare", "Create list returned no result"))?;

        Ok(created.id)
    }

    async fn update_list(
        &self,
        list_id: &str,
        to_remove: &DomainSet,
        to_add: &DomainSet,
    ) -> Result<()> {
        if self.skip_write(format_args!(
            "patch list {} (+{} -{})",
            list_id,
            to_add.len(),
            to_remove.len()
        )) {
            return Ok(());
        }

        let body = json!({
            "append": to_add.iter().map(|d| json!({ "value": d })).collect::<Vec<_>>(),
            "remove": to_remove,
        });
        let path = format!("lists/{}", list_id);
        self.send::<Value>(
            self.request(Method::PATCH, &path).json(&body),
            &format!("List {}", list_id),
        )
        .await?;

        Ok(())
    }

    async fn delete_list(&self, list_id: &str) -> Result<()> {
        if self.skip_write(format_args!("delete list {}", list_id)) {
            return Ok(());
        }

        let path = format!("lists/{}", list_id);
        self.send::<Value>(
            self.request(Method::DELETE, &path),
            &format!("List {}", list_id),
        )
        .await?;
        Ok(())
    }

    async fn create_rule(&self, name: &str, list_ids: &BTreeSet<String>) -> Result<String> {
        if self.skip_write(format_args!("create rule {} over {} lists", name, list_ids.len())) {
            return Ok(format!("dry-run:{}", name));
        }

        let body = self.rule_body(name, list_ids);
        let created: Created = self
            .send(self.request(Method::POST, "rules").json(&body), name)
            .await?
            .ok_or_else(|| Error::provider("cloudflare", "Create rule returned no result"))?;

        Ok(created.id)
    }

    async fn update_rule(
        &self,
        name: &str,
        rule_id: &str,
        list_ids: &BTreeSet<String>,
    ) -> Result<()> {
        if self.skip_write(format_args!("update rule {} to {} lists", name, list_ids.len())) {
            return Ok(());
        }

        let body = self.rule_body(name, list_ids);
        let path = format!("rules/{}", rule_id);
        self.send::<Value>(
            self.request(Method::PUT, &path).json(&body),
            &format!("Rule {}", rule_id),
        )
        .await?;
        Ok(())
    }

    async fn delete_rule(&self, rule_id: &str) -> Result<()> {
        if self.skip_write(format_args!("delete rule {}", rule_id)) {
            return Ok(());
        }

        let path = format!("rules/{}", rule_id);
        self.send::<Value>(
            self.request(Method::DELETE, &path),
            &format!("Rule {}", rule_id),
        )
        .await?;
        Ok(())
    }

    fn client_name(&self) -> &'static str {
        "cloudflare"
    }
}

/// Factory for creating Cloudflare gateway clients
pub struct CloudflareFactory;

impl GatewayFactory for CloudflareFactory {
    fn create(&self, config: &GatewayConfig) -> Result<Box<dyn GatewayClient>> {
        match config {
            GatewayConfig::Cloudflare {
                api_token,
                account_id,
            } => {
                // Check for dry-run mode environment variable
                let dry_run = std::env::var("GWSYNC_MODE")
                    .unwrap_or_default()
                    .to_lowercase()
                    == "dry-run";

                if dry_run {
                    tracing::warn!(
                        "Cloudflare gateway running in DRY-RUN mode - no changes will be made"
                    );
                }

                Ok(Box::new(CloudflareGateway::new(
                    api_token.clone(),
                    account_id.clone(),
                    dry_run,
                )?))
            }
            _ => Err(Error::config("Invalid config for Cloudflare gateway")),
        }
    }
}

/// Register the Cloudflare gateway with a registry
///
/// # Example
///
/// ```rust
/// use gwsync_core::Registry;
///
/// let registry = Registry::new();
/// gwsync_gateway_cloudflare::register(&registry);
/// assert!(registry.has_gateway("cloudflare"));
/// ```
pub fn register(registry: &gwsync_core::Registry) {
    registry.register_gateway("cloudflare", Box::new(CloudflareFactory));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_factory_creation() {
        let factory = CloudflareFactory;

        let config = GatewayConfig::Cloudflare {
            api_token: "test_token".to_string(),
            account_id: "test_account".to_string(),
        };

        let gateway = factory.create(&config).unwrap();
        assert_eq!(gateway.client_name(), "cloudflare");
    }

    #[test]
    fn test_factory_missing_token() {
        let factory = CloudflareFactory;

        let config = GatewayConfig::Cloudflare {
            api_token: "".to_string(),
            account_id: "test_account".to_string(),
        };

        assert!(matches!(factory.create(&config), Err(Error::Config(_))));
    }

    #[test]
    fn test_factory_rejects_other_configs() {
        let config = GatewayConfig::Custom {
            factory: "other".to_string(),
            config: Value::Null,
        };
        assert!(CloudflareFactory.create(&config).is_err());
    }

    #[test]
    fn test_dry_run_mode() {
        let dry = CloudflareGateway::new_dry_run("token", "account").unwrap();
        let live = CloudflareGateway::new_live("token", "account").unwrap();

        assert!(dry.is_dry_run());
        assert!(!live.is_dry_run());
    }

    #[tokio::test]
    async fn test_dry_run_writes_make_no_requests() {
        // A live request would fail: the account does not exist and no
        // network is expected here
        let gateway = CloudflareGateway::new_dry_run("token", "account").unwrap();

        let id = gateway
            .create_list("[T] - 001", &ids(&["a.com"]))
            .await
            .unwrap();
        assert_eq!(id, "dry-run:[T] - 001");

        gateway.update_list(&id, &ids(&[]), &ids(&["b.com"])).await.unwrap();
        gateway.delete_list(&id).await.unwrap();
        gateway.delete_rule("rule").await.unwrap();
    }

    #[test]
    fn test_api_token_not_exposed_in_debug() {
        let gateway = CloudflareGateway::new("secret_token_12345", "account", false).unwrap();

        let debug_str = format!("{:?}", gateway);
        assert!(!debug_str.contains("secret_token"));
        assert!(debug_str.contains("CloudflareGateway"));
        assert!(debug_str.contains("<REDACTED>"));
    }

    #[test]
    fn test_urls_are_account_scoped() {
        let gateway = CloudflareGateway::new("token", "acc123", false).unwrap();
        assert_eq!(
            gateway.url("lists/abc/items"),
            "https://api.cloudflare.com/client/v4/accounts/acc123/gateway/lists/abc/items"
        );
    }

    #[test]
    fn test_traffic_round_trip() {
        let list_ids = ids(&[
            "0f6b2d3c-1a2b-4c5d-8e9f-001122334455",
            "9a8b7c6d-0000-4111-8222-aabbccddeeff",
        ]);
        assert_eq!(parse_traffic(&build_traffic(&list_ids)), list_ids);
    }

    #[test]
    fn test_parse_hand_written_traffic() {
        let traffic = concat!(
            "any(dns.domains[*] in $abc-1) or dns.fqdn in $def2",
            " and not any(dns.domains[*] in $abc-1)"
        );
        assert_eq!(parse_traffic(traffic), ids(&["abc-1", "def2"]));
        assert!(parse_traffic("dns.fqdn == \"x.com\"").is_empty());
    }

    #[test]
    fn test_empty_rule_is_disabled_and_matches_nothing() {
        let gateway = CloudflareGateway::new("token", "account", false).unwrap();
        let body = gateway.rule_body("[T] Block Ads", &BTreeSet::new());

        assert_eq!(body["enabled"], json!(false));
        assert_eq!(body["traffic"], json!(EMPTY_TRAFFIC));
        assert!(parse_traffic(EMPTY_TRAFFIC).is_empty());
    }

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            status_error(StatusCode::FORBIDDEN, "x", ""),
            Error::Authentication(_)
        ));
        assert!(matches!(
            status_error(StatusCode::NOT_FOUND, "List 1", ""),
            Error::NotFound(_)
        ));
        assert!(matches!(
            status_error(StatusCode::TOO_MANY_REQUESTS, "x", ""),
            Error::RateLimited(_)
        ));
        assert!(matches!(
            status_error(StatusCode::BAD_GATEWAY, "x", ""),
            Error::Provider { .. }
        ));
    }

    #[test]
    fn test_failed_envelope_deserializes() {
        let envelope: Envelope<Value> = serde_json::from_value(json!({
            "success": false,
            "errors": [{ "code": 2001, "message": "list limit reached" }],
            "result": null
        }))
        .unwrap();
        assert!(!envelope.success);
        assert_eq!(envelope.errors[0].message, "list limit reached");
        assert!(envelope.result.is_none());
    }

    fn page(range: std::ops::Range<usize>) -> Vec<String> {
        range.map(|i| format!("d{:04}.example.com", i)).collect()
    }

    #[test]
    fn test_short_page_ends_pagination() {
        let mut members = DomainSet::new();
        assert!(!absorb_page(&mut members, page(0..10)));
        assert_eq!(members.len(), 10);
    }

    #[test]
    fn test_full_pages_continue_until_short() {
        let mut members = DomainSet::new();
        assert!(absorb_page(&mut members, page(0..ITEMS_PER_PAGE)));
        assert!(absorb_page(&mut members, page(ITEMS_PER_PAGE..2 * ITEMS_PER_PAGE)));
        assert!(!absorb_page(&mut members, Vec::new()));
        assert_eq!(members.len(), 2 * ITEMS_PER_PAGE);
    }

    #[test]
    fn test_repeated_full_page_ends_pagination() {
        let mut members = DomainSet::new();
        assert!(absorb_page(&mut members, page(0..ITEMS_PER_PAGE)));
        assert!(!absorb_page(&mut members, page(0..ITEMS_PER_PAGE)));
        assert_eq!(members.len(), ITEMS_PER_PAGE);
    }

    #[test]
    fn test_register() {
        let registry = gwsync_core::Registry::new();
        register(&registry);
        assert!(registry.has_gateway("cloudflare"));
    }
}
