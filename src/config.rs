use std::path::Path;

use serde::Deserialize;

use crate::leave::WorkSchedule;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    8
}

/// Yearly entitlements and validator limits.
#[derive(Debug, Clone, Deserialize)]
pub struct LeavePolicyConfig {
    /// Vacation days granted when a balance row is first created.
    pub vacation_days_per_year: f64,
    /// Permission hours granted when a balance row is first created.
    pub permission_hours_per_year: f64,
    /// Widest window accepted by the conflict-dates query.
    pub max_conflict_window_days: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReconcilerConfig {
    /// Seconds between full balance recalculations; 0 disables the task.
    pub interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct SecurityConfig {
    /// When set, every API route requires `Authorization: Bearer <token>`.
    pub auth_token: Option<String>,
    pub enable_hsts: Option<bool>,
    pub hsts_max_age: Option<u64>,
    pub hsts_include_subdomains: Option<bool>,
    pub csp: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub leave_policy: LeavePolicyConfig,
    /// Company-wide schedule seeded into the database on first start.
    pub work_schedule: WorkSchedule,
    pub reconciler: ReconcilerConfig,
    pub security: Option<SecurityConfig>,
}

const DEFAULTS: &str = include_str!("../config/default.toml");

impl Default for AppConfig {
    fn default() -> Self {
        // Fallback: parse the embedded default TOML
        match ::config::Config::builder()
            .add_source(::config::File::from_str(DEFAULTS, ::config::FileFormat::Toml))
            .build()
        {
            Ok(cfg) => match cfg.try_deserialize() {
                Ok(app_cfg) => app_cfg,
                Err(e) => panic!("Failed to deserialize default config: {}", e),
            },
            Err(e) => panic!("Failed to parse default config: {}", e),
        }
    }
}

pub fn load() -> anyhow::Result<AppConfig> {
    // Load .env first (optional)
    let _ = dotenvy::dotenv();

    let mut builder = ::config::Config::builder()
        .add_source(::config::File::from_str(DEFAULTS, ::config::FileFormat::Toml))
        // Optional local file: presenze.toml (in CWD)
        .add_source(::config::File::with_name("presenze").required(false));

    if let Ok(custom_path) = std::env::var("PRESENZE_CONFIG") {
        builder = builder.add_source(::config::File::with_name(&custom_path).required(false));
    }
    // Environment variables last to have highest precedence
    builder = builder.add_source(::config::Environment::with_prefix("PRESENZE").separator("__").try_parsing(true));

    let cfg = builder.build()?;
    let app_cfg: AppConfig = cfg.try_deserialize()?;
    validate(&app_cfg)?;
    Ok(app_cfg)
}

pub fn validate(cfg: &AppConfig) -> anyhow::Result<()> {
    // Server
    if cfg.server.port == 0 {
        return Err(anyhow::anyhow!("invalid server.port: {}", cfg.server.port));
    }
    #[cfg(unix)]
    if cfg.server.port < 1024 {
        tracing::warn!("Using privileged port {} - may require elevated permissions", cfg.server.port);
    }

    // Database
    if cfg.database.max_connections == 0 {
        return Err(anyhow::anyhow!("database.max_connections must be > 0"));
    }

    // Leave policy
    let policy = &cfg.leave_policy;
    if !(0.0..=366.0).contains(&policy.vacation_days_per_year) {
        return Err(anyhow::anyhow!("leave_policy.vacation_days_per_year must be in 0..=366"));
    }
    if !(0.0..=8784.0).contains(&policy.permission_hours_per_year) {
        return Err(anyhow::anyhow!("leave_policy.permission_hours_per_year must be in 0..=8784"));
    }
    if policy.max_conflict_window_days < 1 || policy.max_conflict_window_days > 3660 {
        return Err(anyhow::anyhow!("leave_policy.max_conflict_window_days must be in 1..=3660"));
    }

    // Company schedule
    let schedule = &cfg.work_schedule;
    if schedule.start_time >= schedule.end_time {
        return Err(anyhow::anyhow!("work_schedule.start_time must be before end_time"));
    }
    if !schedule.has_working_days() {
        return Err(anyhow::anyhow!("work_schedule must include at least one working day"));
    }
    if schedule.daily_hours() <= 0.0 {
        return Err(anyhow::anyhow!("work_schedule.break_minutes leaves no working time"));
    }

    if let Some(token) = cfg.security.as_ref().and_then(|s| s.auth_token.as_deref()) {
        if token.len() < 16 {
            return Err(anyhow::anyhow!("security.auth_token must be at least 16 characters"));
        }
    }

    Ok(())
}

pub fn ensure_sqlite_parent_dir(url: &str) -> anyhow::Result<()> {
    let Some(rest) = url.strip_prefix("sqlite://").or_else(|| url.strip_prefix("sqlite:")) else {
        return Ok(());
    };
    let path = rest.split('?').next().unwrap_or(rest);
    if path.is_empty() || path == ":memory:" {
        return Ok(());
    }
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}
