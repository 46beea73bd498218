use chrono::Duration;
use secrecy::{ExposeSecret, Secret};
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::net::IpAddr;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct TrustConfig {
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    /// `None` runs on the in-memory store (dev only).
    pub database: Option<DatabaseConfig>,
    pub jwt: JwtConfig,
    pub csrf: CsrfConfig,
    pub password_reset: PasswordResetConfig,
    pub rate_limit: RateLimitConfig,
    pub maintenance: MaintenanceConfig,
    pub security: SecurityConfig,
    /// `None` records reset emails in memory instead of sending them (dev only).
    pub smtp: Option<SmtpConfig>,
    /// Admin account created at startup when no user has its username.
    pub bootstrap_admin: Option<BootstrapAdminConfig>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Environment {
    Dev,
    Prod,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: Secret<String>,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub access_secret: Secret<String>,
    pub refresh_secret: Secret<String>,
    pub access_token_expiry_minutes: i64,
    pub refresh_token_expiry_days: i64,
}

#[derive(Debug, Clone)]
pub struct CsrfConfig {
    pub secret: Secret<String>,
    pub cookie_max_age_hours: i64,
}

#[derive(Debug, Clone)]
pub struct PasswordResetConfig {
    pub expiry_minutes: i64,
    /// Base of the link placed in reset emails.
    pub public_base_url: String,
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub login_attempts: u32,
    pub login_window_seconds: u64,
    pub password_reset_attempts: u32,
    pub password_reset_window_seconds: u64,
    pub sweep_interval_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct MaintenanceConfig {
    pub interval_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct SecurityConfig {
    pub allowed_origins: Vec<String>,
    /// Peers allowed to report the client address in `X-Forwarded-For`.
    pub trusted_proxies: Vec<IpAddr>,
}

#[derive(Debug, Clone)]
pub struct BootstrapAdminConfig {
    pub username: String,
    pub email: String,
    pub password: Secret<String>,
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub user: String,
    pub password: String,
}

// Development fallbacks; production refuses to start without real values.
const DEV_ACCESS_SECRET: &str = "dev-access-secret-change-me";
const DEV_REFRESH_SECRET: &str = "dev-refresh-secret-change-me";
const DEV_CSRF_SECRET: &str = "dev-csrf-secret-change-me";

impl TrustConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;
        Self::from_vars(common_config, |key| env::var(key).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_vars<F>(common: core_config::Config, vars: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment: Environment = vars("ENVIRONMENT")
            .unwrap_or_else(|| "dev".to_string())
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;
        let is_prod = environment == Environment::Prod;
        let get = |key: &str, default: Option<&str>| get_env(&vars, key, default, is_prod);

        let database = match vars("DATABASE_URL") {
            Some(url) => Some(DatabaseConfig {
                url: Secret::new(url),
                max_connections: parse(
                    "DATABASE_MAX_CONNECTIONS",
                    &get_env(&vars, "DATABASE_MAX_CONNECTIONS", Some("10"), false)?,
                )?,
                min_connections: parse(
                    "DATABASE_MIN_CONNECTIONS",
                    &get_env(&vars, "DATABASE_MIN_CONNECTIONS", Some("1"), false)?,
                )?,
            }),
            None if is_prod => {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "DATABASE_URL is required in production but not set"
                )))
            }
            None => None,
        };

        let smtp = match (vars("SMTP_HOST"), vars("SMTP_USER"), vars("SMTP_PASSWORD")) {
            (Some(host), Some(user), Some(password)) => Some(SmtpConfig {
                host,
                user,
                password,
            }),
            _ if is_prod => {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "SMTP_HOST, SMTP_USER and SMTP_PASSWORD are required in production"
                )))
            }
            _ => None,
        };

        let bootstrap_admin = match (
            vars("BOOTSTRAP_ADMIN_USERNAME"),
            vars("BOOTSTRAP_ADMIN_EMAIL"),
            vars("BOOTSTRAP_ADMIN_PASSWORD"),
        ) {
            (Some(username), Some(email), Some(password)) => Some(BootstrapAdminConfig {
                username,
                email,
                password: Secret::new(password),
            }),
            (None, None, None) => None,
            _ => {
                return Err(config_error(
                    "BOOTSTRAP_ADMIN_USERNAME, BOOTSTRAP_ADMIN_EMAIL and BOOTSTRAP_ADMIN_PASSWORD must be set together",
                ))
            }
        };

        let config = TrustConfig {
            common,
            environment: environment.clone(),
            service_name: vars("SERVICE_NAME").unwrap_or_else(|| "trust-service".to_string()),
            service_version: vars("SERVICE_VERSION")
                .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string()),
            log_level: vars("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            otlp_endpoint: vars("OTLP_ENDPOINT").filter(|s| !s.is_empty()),
            database,
            jwt: JwtConfig {
                access_secret: Secret::new(get("JWT_ACCESS_SECRET", Some(DEV_ACCESS_SECRET))?),
                refresh_secret: Secret::new(get("JWT_REFRESH_SECRET", Some(DEV_REFRESH_SECRET))?),
                access_token_expiry_minutes: parse(
                    "JWT_ACCESS_TOKEN_EXPIRY_MINUTES",
                    &get_or("JWT_ACCESS_TOKEN_EXPIRY_MINUTES", "15", &vars),
                )?,
                refresh_token_expiry_days: parse(
                    "JWT_REFRESH_TOKEN_EXPIRY_DAYS",
                    &get_or("JWT_REFRESH_TOKEN_EXPIRY_DAYS", "7", &vars),
                )?,
            },
            csrf: CsrfConfig {
                secret: Secret::new(get("CSRF_SECRET", Some(DEV_CSRF_SECRET))?),
                cookie_max_age_hours: parse(
                    "CSRF_COOKIE_MAX_AGE_HOURS",
                    &get_or("CSRF_COOKIE_MAX_AGE_HOURS", "24", &vars),
                )?,
            },
            password_reset: PasswordResetConfig {
                expiry_minutes: parse(
                    "PASSWORD_RESET_EXPIRY_MINUTES",
                    &get_or("PASSWORD_RESET_EXPIRY_MINUTES", "60", &vars),
                )?,
                public_base_url: get("PUBLIC_BASE_URL", Some("http://localhost:8080"))?,
            },
            rate_limit: RateLimitConfig {
                login_attempts: parse(
                    "RATE_LIMIT_LOGIN_ATTEMPTS",
                    &get_or("RATE_LIMIT_LOGIN_ATTEMPTS", "5", &vars),
                )?,
                login_window_seconds: parse(
                    "RATE_LIMIT_LOGIN_WINDOW_SECONDS",
                    &get_or("RATE_LIMIT_LOGIN_WINDOW_SECONDS", "900", &vars),
                )?,
                password_reset_attempts: parse(
                    "RATE_LIMIT_PASSWORD_RESET_ATTEMPTS",
                    &get_or("RATE_LIMIT_PASSWORD_RESET_ATTEMPTS", "3", &vars),
                )?,
                password_reset_window_seconds: parse(
                    "RATE_LIMIT_PASSWORD_RESET_WINDOW_SECONDS",
                    &get_or("RATE_LIMIT_PASSWORD_RESET_WINDOW_SECONDS", "3600", &vars),
                )?,
                sweep_interval_seconds: parse(
                    "RATE_LIMIT_SWEEP_INTERVAL_SECONDS",
                    &get_or("RATE_LIMIT_SWEEP_INTERVAL_SECONDS", "60", &vars),
                )?,
            },
            maintenance: MaintenanceConfig {
                interval_seconds: parse(
                    "MAINTENANCE_INTERVAL_SECONDS",
                    &get_or("MAINTENANCE_INTERVAL_SECONDS", "300", &vars),
                )?,
            },
            security: SecurityConfig {
                allowed_origins: get("ALLOWED_ORIGINS", Some("http://localhost:3000"))?
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
                trusted_proxies: get_or("TRUSTED_PROXIES", "", &vars)
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(|s| parse::<IpAddr>("TRUSTED_PROXIES", s))
                    .collect::<Result<_, _>>()?,
            },
            smtp,
            bootstrap_admin,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.common.port == 0 {
            return Err(config_error("PORT must be greater than 0"));
        }

        if self.jwt.access_token_expiry_minutes <= 0 {
            return Err(config_error("JWT_ACCESS_TOKEN_EXPIRY_MINUTES must be positive"));
        }
        if self.jwt.refresh_token_expiry_days <= 0 {
            return Err(config_error("JWT_REFRESH_TOKEN_EXPIRY_DAYS must be positive"));
        }
        if self.csrf.cookie_max_age_hours <= 0 {
            return Err(config_error("CSRF_COOKIE_MAX_AGE_HOURS must be positive"));
        }
        if self.password_reset.expiry_minutes <= 0 {
            return Err(config_error("PASSWORD_RESET_EXPIRY_MINUTES must be positive"));
        }
        if self.rate_limit.login_attempts == 0 || self.rate_limit.password_reset_attempts == 0 {
            return Err(config_error("Rate limit ceilings must be positive"));
        }
        if self.rate_limit.login_window_seconds == 0
            || self.rate_limit.password_reset_window_seconds == 0
            || self.rate_limit.sweep_interval_seconds == 0
            || self.maintenance.interval_seconds == 0
        {
            return Err(config_error("Rate limit and maintenance intervals must be positive"));
        }

        if let Some(admin) = &self.bootstrap_admin {
            if admin.password.expose_secret().len() < 8 {
                return Err(config_error(
                    "BOOTSTRAP_ADMIN_PASSWORD must be at least 8 characters",
                ));
            }
        }

        let access = self.jwt.access_secret.expose_secret();
        let refresh = self.jwt.refresh_secret.expose_secret();
        if access.is_empty() || refresh.is_empty() || self.csrf.secret.expose_secret().is_empty() {
            return Err(config_error("Signing secrets must not be empty"));
        }
        if access == refresh {
            return Err(config_error(
                "JWT_ACCESS_SECRET and JWT_REFRESH_SECRET must differ",
            ));
        }

        if self.environment == Environment::Prod {
            if self.security.allowed_origins.iter().any(|o| o == "*") {
                return Err(config_error("Wildcard CORS origin not allowed in production"));
            }
            if [access, refresh, self.csrf.secret.expose_secret()]
                .iter()
                .any(|s| s.starts_with("dev-"))
            {
                return Err(config_error("Development secrets are not allowed in production"));
            }
        }

        Ok(())
    }

    pub fn is_prod(&self) -> bool {
        self.environment == Environment::Prod
    }

    /// Cookies carry `Secure` only in production.
    pub fn secure_cookies(&self) -> bool {
        self.is_prod()
    }

    pub fn access_token_ttl(&self) -> Duration {
        Duration::minutes(self.jwt.access_token_expiry_minutes)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::days(self.jwt.refresh_token_expiry_days)
    }

    pub fn csrf_cookie_ttl(&self) -> Duration {
        Duration::hours(self.csrf.cookie_max_age_hours)
    }

    pub fn password_reset_ttl(&self) -> Duration {
        Duration::minutes(self.password_reset.expiry_minutes)
    }
}

fn config_error(msg: &str) -> AppError {
    AppError::ConfigError(anyhow::anyhow!(msg.to_string()))
}

fn get_env<F>(vars: &F, key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError>
where
    F: Fn(&str) -> Option<String>,
{
    match vars(key) {
        Some(val) => Ok(val),
        None => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required in production but not set",
                    key
                ))))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required but not set",
                    key
                ))))
            }
        }
    }
}

/// Tunables fall back to their default in every environment.
fn get_or<F>(key: &str, default: &str, vars: &F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    vars(key).unwrap_or_else(|| default.to_string())
}

fn parse<T>(key: &str, raw: &str) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| {
        AppError::ConfigError(anyhow::anyhow!("{} has an invalid value: {}", key, e))
    })
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<TrustConfig, AppError> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        TrustConfig::from_vars(core_config::Config::default(), move |key| {
            map.get(key).cloned()
        })
    }

    fn prod_vars() -> Vec<(&'static str, &'static str)> {
        vec![
            ("ENVIRONMENT", "prod"),
            ("DATABASE_URL", "postgres://trust@db/trust"),
            ("JWT_ACCESS_SECRET", "access-0f5e"),
            ("JWT_REFRESH_SECRET", "refresh-9a21"),
            ("CSRF_SECRET", "csrf-77b0"),
            ("PUBLIC_BASE_URL", "https://admin.school.example"),
            ("ALLOWED_ORIGINS", "https://admin.school.example"),
            ("SMTP_HOST", "smtp.school.example"),
            ("SMTP_USER", "noreply@school.example"),
            ("SMTP_PASSWORD", "smtp-pass"),
        ]
    }

    #[test]
    fn test_dev_defaults() {
        let config = load(&[]).unwrap();

        assert_eq!(config.environment, Environment::Dev);
        assert!(config.database.is_none());
        assert!(config.smtp.is_none());
        assert!(!config.secure_cookies());
        assert_eq!(config.access_token_ttl(), Duration::minutes(15));
        assert_eq!(config.session_ttl(), Duration::days(7));
        assert_eq!(config.csrf_cookie_ttl(), Duration::hours(24));
        assert_eq!(config.password_reset_ttl(), Duration::hours(1));
        assert_eq!(config.rate_limit.login_attempts, 5);
        assert_eq!(config.rate_limit.login_window_seconds, 900);
        assert_eq!(config.rate_limit.sweep_interval_seconds, 60);
        assert!(config.security.trusted_proxies.is_empty());
    }

    #[test]
    fn test_trusted_proxies_are_parsed() {
        let config = load(&[("TRUSTED_PROXIES", "10.0.0.1, ::1")]).unwrap();
        assert_eq!(
            config.security.trusted_proxies,
            vec![
                "10.0.0.1".parse::<IpAddr>().unwrap(),
                "::1".parse::<IpAddr>().unwrap()
            ]
        );

        assert!(load(&[("TRUSTED_PROXIES", "proxy.internal")]).is_err());
    }

    #[test]
    fn test_prod_requires_secrets() {
        let vars: Vec<_> = prod_vars()
            .into_iter()
            .filter(|(k, _)| *k != "JWT_REFRESH_SECRET")
            .collect();
        assert!(load(&vars).is_err());
    }

    #[test]
    fn test_prod_with_all_values() {
        let config = load(&prod_vars()).unwrap();
        assert!(config.secure_cookies());
        assert!(config.database.is_some());
        assert!(config.smtp.is_some());
    }

    #[test]
    fn test_identical_jwt_secrets_rejected() {
        assert!(load(&[("JWT_ACCESS_SECRET", "same"), ("JWT_REFRESH_SECRET", "same")]).is_err());
    }

    #[test]
    fn test_prod_rejects_wildcard_origin() {
        let mut vars = prod_vars();
        vars.retain(|(k, _)| *k != "ALLOWED_ORIGINS");
        vars.push(("ALLOWED_ORIGINS", "*"));
        assert!(load(&vars).is_err());
    }

    #[test]
    fn test_invalid_number_is_reported() {
        assert!(load(&[("RATE_LIMIT_LOGIN_ATTEMPTS", "many")]).is_err());
        assert!(load(&[("JWT_ACCESS_TOKEN_EXPIRY_MINUTES", "0")]).is_err());
    }

    #[test]
    fn test_bootstrap_admin_requires_all_three_values() {
        assert!(load(&[]).unwrap().bootstrap_admin.is_none());

        let partial = load(&[("BOOTSTRAP_ADMIN_USERNAME", "root")]);
        assert!(matches!(partial, Err(AppError::ConfigError(_))));

        let short = load(&[
            ("BOOTSTRAP_ADMIN_USERNAME", "root"),
            ("BOOTSTRAP_ADMIN_EMAIL", "root@school.example"),
            ("BOOTSTRAP_ADMIN_PASSWORD", "short"),
        ]);
        assert!(matches!(short, Err(AppError::ConfigError(_))));

        let config = load(&[
            ("BOOTSTRAP_ADMIN_USERNAME", "root"),
            ("BOOTSTRAP_ADMIN_EMAIL", "root@school.example"),
            ("BOOTSTRAP_ADMIN_PASSWORD", "long-enough-pass"),
        ])
        .unwrap();
        let admin = config.bootstrap_admin.unwrap();
        assert_eq!(admin.username, "root");
        assert_eq!(admin.password.expose_secret(), "long-enough-pass");
    }
}
