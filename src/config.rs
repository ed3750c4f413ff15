use std::str::FromStr;

use anyhow::{anyhow, Context};

/// Argon2 cost parameters.
#[derive(Debug, Clone)]
pub struct HashCost {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for HashCost {
    fn default() -> Self {
        Self {
            memory_kib: argon2::Params::DEFAULT_M_COST,
            iterations: argon2::Params::DEFAULT_T_COST,
            parallelism: argon2::Params::DEFAULT_P_COST,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_path: String,
    pub base_path: String,
    pub token_secret: String,
    pub hash_cost: HashCost,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let token_secret = std::env::var("TASKLIST_TOKEN_SECRET")
            .map_err(|_| anyhow!("TASKLIST_TOKEN_SECRET must be set"))?;
        if token_secret.is_empty() {
            return Err(anyhow!("TASKLIST_TOKEN_SECRET must not be empty"));
        }

        let defaults = HashCost::default();
        Ok(Self {
            port: parse_var("TASKLIST_PORT", 3000)?,
            database_path: std::env::var("TASKLIST_DATABASE")
                .unwrap_or_else(|_| "tasks.db".to_string()),
            base_path: std::env::var("TASKLIST_BASE_PATH")
                .map(|p| normalize_base_path(&p))
                .unwrap_or_default(),
            token_secret,
            hash_cost: HashCost {
                memory_kib: parse_var("TASKLIST_ARGON2_MEMORY_KIB", defaults.memory_kib)?,
                iterations: parse_var("TASKLIST_ARGON2_ITERATIONS", defaults.iterations)?,
                parallelism: parse_var("TASKLIST_ARGON2_PARALLELISM", defaults.parallelism)?,
            },
        })
    }
}

fn parse_var<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{name} has an invalid value: {raw:?}")),
        Err(_) => Ok(default),
    }
}

/// `"tasks/"` -> `"/tasks"`, `"/"` -> `""`.
pub fn normalize_base_path(path: &str) -> String {
    let path = path.trim().trim_end_matches('/');
    if path.is_empty() || path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    }
}
