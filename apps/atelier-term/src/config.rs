use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub project_root: PathBuf,
    pub shell: Option<String>,
    pub exec_timeout_seconds: u64,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            port: env::var("ATELIER_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3001),
            project_root: env::var("ATELIER_PROJECT_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(".")),
            shell: env::var("ATELIER_SHELL").ok(),
            exec_timeout_seconds: env::var("ATELIER_EXEC_TIMEOUT")
                .ok()
                .and_then(|t| t.parse().ok())
                .unwrap_or(30),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3001,
            project_root: PathBuf::from("."),
            shell: None,
            exec_timeout_seconds: 30,
        }
    }
}
