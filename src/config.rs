use crate::error::{Error, Result};
use dotenvy::dotenv;
use std::env;
use std::sync::OnceLock;

#[derive(Debug, Clone)]
pub struct Config {
    pub server_address: String,
    pub database_url: String,
    pub event_secret: String,
    pub webapp_url: String,
    pub email_gateway_url: Option<String>,
    pub sms_gateway_url: Option<String>,
    pub whatsapp_gateway_url: Option<String>,
    pub gateway_secret: String,
    pub delivery_max_retries: u32,
    pub fanout_concurrency: usize,
    pub audience_page_size: i64,
    pub broadcast_sweep_secs: u64,
    pub reminder_sweep_secs: u64,
    pub inbox_window: usize,
}

pub static CONFIG: OnceLock<Config> = OnceLock::new();

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        Ok(Self {
            server_address: get_env("SERVER_ADDRESS")?,
            database_url: get_env("DATABASE_URL")?,
            event_secret: get_env("EVENT_SECRET")?,
            webapp_url: get_env("WEBAPP_URL")?,
            email_gateway_url: env::var("EMAIL_GATEWAY_URL").ok(),
            sms_gateway_url: env::var("SMS_GATEWAY_URL").ok(),
            whatsapp_gateway_url: env::var("WHATSAPP_GATEWAY_URL").ok(),
            gateway_secret: get_env("GATEWAY_SECRET")?,
            delivery_max_retries: get_env_or("DELIVERY_MAX_RETRIES", 2)?,
            fanout_concurrency: get_env_or("FANOUT_CONCURRENCY", 8)?,
            audience_page_size: get_env_or("AUDIENCE_PAGE_SIZE", 200)?,
            broadcast_sweep_secs: get_env_or("BROADCAST_SWEEP_SECS", 30)?,
            reminder_sweep_secs: get_env_or("REMINDER_SWEEP_SECS", 60)?,
            inbox_window: get_env_or("INBOX_WINDOW", 50)?,
        })
    }
}

fn get_env(name: &str) -> Result<String> {
    env::var(name).map_err(|_| Error::Config(format!("Missing environment variable: {}", name)))
}

fn get_env_or<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| Error::Config(format!("Invalid value for {}: {}", name, e))),
        Err(_) => Ok(default),
    }
}

pub fn init_config() -> Result<()> {
    let config = Config::from_env()?;
    CONFIG
        .set(config)
        .map_err(|_| Error::Config("Configuration has already been initialized".to_string()))?;
    Ok(())
}

pub fn get_config() -> &'static Config {
    CONFIG
        .get()
        .expect("Configuration has not been initialized")
}
