use std::env;
use std::io;
use std::str::FromStr;
use std::time::Duration;

use crate::search::DEFAULT_RESULT_LIMIT;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendMode {
    /// Hosted platform over HTTP.
    Rest,
    /// In-process tables, for demos without a platform project.
    Memory,
}

impl FromStr for BackendMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rest" | "" => Ok(BackendMode::Rest),
            "memory" => Ok(BackendMode::Memory),
            other => Err(format!("unknown BACKEND_MODE '{other}'")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub backend_mode: BackendMode,
    pub backend_url: String,
    pub backend_anon_key: String,
    pub storage_bucket: String,
    pub result_limit: usize,
    pub http_timeout: Duration,
    pub cookie_secure: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            backend_mode: BackendMode::Memory,
            backend_url: String::new(),
            backend_anon_key: String::new(),
            storage_bucket: "experience-images".to_string(),
            result_limit: DEFAULT_RESULT_LIMIT,
            http_timeout: Duration::from_secs(10),
            cookie_secure: false,
        }
    }
}

fn invalid(message: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, message)
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: T,
) -> io::Result<T> {
    match lookup(name) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|_| invalid(format!("{name} has an invalid value: {raw}"))),
        _ => Ok(default),
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl AppConfig {
    /// Reads the process environment (after `.env` has been loaded).
    pub fn from_env() -> io::Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> io::Result<Self> {
        let defaults = Self::default();

        let backend_url = lookup("BACKEND_URL").unwrap_or_default();

        // Unset mode follows BACKEND_URL: talk to the platform when one is
        // configured, otherwise run in memory.
        let backend_mode = match lookup("BACKEND_MODE") {
            Some(raw) => raw.parse().map_err(invalid)?,
            None if backend_url.trim().is_empty() => defaults.backend_mode,
            None => BackendMode::Rest,
        };
        if backend_mode == BackendMode::Rest && backend_url.trim().is_empty() {
            return Err(invalid(
                "BACKEND_URL must be set in environment (or use BACKEND_MODE=memory)".to_string(),
            ));
        }

        let cookie_secure = match lookup("COOKIE_SECURE") {
            Some(raw) => parse_bool(&raw)
                .ok_or_else(|| invalid(format!("COOKIE_SECURE has an invalid value: {raw}")))?,
            None => defaults.cookie_secure,
        };

        let timeout_secs: u64 = parse_var(&lookup, "HTTP_TIMEOUT_SECS", 10)?;

        Ok(Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parse_var(&lookup, "PORT", defaults.port)?,
            backend_mode,
            backend_url,
            backend_anon_key: lookup("BACKEND_ANON_KEY").unwrap_or_default(),
            storage_bucket: lookup("STORAGE_BUCKET")
                .filter(|b| !b.trim().is_empty())
                .unwrap_or(defaults.storage_bucket),
            result_limit: parse_var(&lookup, "RESULT_LIMIT", defaults.result_limit)?.max(1),
            http_timeout: Duration::from_secs(timeout_secs.max(1)),
            cookie_secure,
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
