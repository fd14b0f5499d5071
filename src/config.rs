use std::env;

/// Body size cap for JSON requests carrying base64 attachments (50 MiB).
const DEFAULT_MAX_BODY_BYTES: usize = 50 * 1024 * 1024;

const LOCAL_JWT_SECRET: &str = "local-development-jwt-secret-change-me";

/// AppConfig
///
/// Immutable configuration loaded once at startup and shared through
/// `FromRef<AppState>`.
#[derive(Clone, Debug)]
pub struct AppConfig {
    // Postgres connection string. Absent in local mode means the in-memory store.
    pub db_url: Option<String>,
    // Runtime environment marker.
    pub env: Env,
    // Symmetric key for HS256 session tokens.
    pub jwt_secret: String,
    // Address the HTTP server binds to.
    pub bind_addr: String,
    // bcrypt work factor for password hashes.
    pub bcrypt_cost: u32,
    pub max_body_bytes: usize,
}

/// Env
///
/// Local runs get pretty logs and secret fallbacks; production demands every
/// secret explicitly and logs JSON.
#[derive(Clone, PartialEq, Debug)]
pub enum Env {
    Local,
    Production,
}

impl Default for AppConfig {
    /// Safe values for test state scaffolding: no database, minimal bcrypt cost.
    fn default() -> Self {
        Self {
            db_url: None,
            env: Env::Local,
            jwt_secret: "super-secure-test-secret-value-local".to_string(),
            bind_addr: "127.0.0.1:3000".to_string(),
            bcrypt_cost: 4,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl AppConfig {
    /// load
    ///
    /// Reads configuration from the environment (after `.env` has been
    /// applied by the caller).
    ///
    /// # Panics
    /// In production, panics when `JWT_SECRET` or `DATABASE_URL` is missing so
    /// the server never starts with an insecure or incomplete configuration.
    pub fn load() -> Self {
        let env = match env::var("APP_ENV").as_deref() {
            Ok("production") => Env::Production,
            _ => Env::Local,
        };

        let jwt_secret = match env {
            Env::Production => {
                env::var("JWT_SECRET").expect("FATAL: JWT_SECRET must be set in production.")
            }
            Env::Local => env::var("JWT_SECRET").unwrap_or_else(|_| LOCAL_JWT_SECRET.to_string()),
        };

        let db_url = match env {
            Env::Production => Some(
                env::var("DATABASE_URL").expect("FATAL: DATABASE_URL required in production"),
            ),
            Env::Local => env::var("DATABASE_URL").ok().filter(|url| !url.is_empty()),
        };

        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());

        let bcrypt_cost = env::var("BCRYPT_COST")
            .ok()
            .and_then(|raw| raw.parse::<u32>().ok())
            .filter(|cost| (4..=31).contains(cost))
            .unwrap_or(bcrypt::DEFAULT_COST);

        let max_body_bytes = env::var("MAX_BODY_BYTES")
            .ok()
            .and_then(|raw| raw.parse::<usize>().ok())
            .unwrap_or(DEFAULT_MAX_BODY_BYTES);

        Self {
            db_url,
            env,
            jwt_secret,
            bind_addr,
            bcrypt_cost,
            max_body_bytes,
        }
    }
}
