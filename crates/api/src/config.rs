use crate::auth::jwt::JwtConfig;

/// Server configuration loaded from environment variables.
///
/// All fields except the JWT secret have defaults suitable for local
/// development.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `5000`).
    pub port: u16,
    /// Allowed CORS origins. Empty means any origin.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Budget for draining background jobs on shutdown (default: `30`).
    pub shutdown_timeout_secs: u64,
    /// Bearer-token verification settings.
    pub jwt: JwtConfig,
    /// Shared secret the executor sends in `X-Webhook-Token`.
    pub webhook_secret: Option<String>,
    /// Serve the OpenAPI document at `/docs`.
    pub enable_docs: bool,
    pub docs_path: String,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default                      |
    /// |------------------------|------------------------------|
    /// | `HOST`                 | `0.0.0.0`                    |
    /// | `PORT`                 | `5000`                       |
    /// | `CORS_ORIGINS`         | `*`                          |
    /// | `REQUEST_TIMEOUT_SECS` | `30`                         |
    /// | `SHUTDOWN_TIMEOUT_SECS`| `30`                         |
    /// | `WEBHOOK_SECRET`       | unset                        |
    /// | `ENABLE_DOCS`          | `false`                      |
    /// | `DOCS_PATH`            | `documentation/openapi.json` |
    ///
    /// JWT settings come from [`JwtConfig::from_env`].
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "5000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins = parse_origins(
            &std::env::var("CORS_ORIGINS").unwrap_or_else(|_| "*".into()),
        );

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let shutdown_timeout_secs: u64 = std::env::var("SHUTDOWN_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("SHUTDOWN_TIMEOUT_SECS must be a valid u64");

        let webhook_secret = std::env::var("WEBHOOK_SECRET")
            .ok()
            .filter(|s| !s.is_empty());

        let enable_docs = std::env::var("ENABLE_DOCS")
            .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        let docs_path =
            std::env::var("DOCS_PATH").unwrap_or_else(|_| "documentation/openapi.json".into());

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            shutdown_timeout_secs,
            jwt: JwtConfig::from_env(),
            webhook_secret,
            enable_docs,
            docs_path,
        }
    }
}

/// Split a comma-separated origin list. `*` anywhere means any origin.
pub fn parse_origins(raw: &str) -> Vec<String> {
    let origins: Vec<String> = raw
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    if origins.iter().any(|o| o == "*") {
        return Vec::new();
    }
    origins
}
