use std::env;
use std::str::FromStr;
use tracing::warn;

/// Upper bound for `CANCELLATION_NOTICE_HOURS` (one year).
pub const MAX_CANCELLATION_NOTICE_HOURS: i64 = 24 * 365;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_service_role_key: String,
    pub supabase_jwt_secret: String,
    pub directory_seed_file: Option<String>,
    pub redis_url: Option<String>,
    pub mail_api_url: Option<String>,
    pub mail_api_key: String,
    pub mail_from: String,
    pub notification_workers: usize,
    pub notification_max_attempts: u32,
    pub notification_retry_delay_ms: u64,
    pub notification_queue_capacity: usize,
    pub cancellation_notice_hours: i64,
    pub appointments_page_size: u32,
    pub port: u16,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            supabase_url: String::new(),
            supabase_anon_key: String::new(),
            supabase_service_role_key: String::new(),
            supabase_jwt_secret: String::new(),
            directory_seed_file: None,
            redis_url: None,
            mail_api_url: None,
            mail_api_key: String::new(),
            mail_from: "Agendamentos <noreply@agendamentos.local>".to_string(),
            notification_workers: 2,
            notification_max_attempts: 3,
            notification_retry_delay_ms: 30_000,
            notification_queue_capacity: 10_000,
            cancellation_notice_hours: 2,
            appointments_page_size: 20,
            port: 3000,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, appointments will be kept in memory");
                    String::new()
                }),
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                    String::new()
                }),
            supabase_service_role_key: env::var("SUPABASE_SERVICE_ROLE_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_SERVICE_ROLE_KEY not set, using empty value");
                    String::new()
                }),
            supabase_jwt_secret: env::var("SUPABASE_JWT_SECRET")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_JWT_SECRET not set, every request will be rejected");
                    String::new()
                }),
            directory_seed_file: env::var("DIRECTORY_SEED_FILE").ok(),
            redis_url: env::var("REDIS_URL").ok().or_else(|| {
                warn!("REDIS_URL not set, using in-process notification queue");
                None
            }),
            mail_api_url: env::var("MAIL_API_URL").ok().or_else(|| {
                warn!("MAIL_API_URL not set, notifications will only be logged");
                None
            }),
            mail_api_key: env::var("MAIL_API_KEY").unwrap_or_default(),
            mail_from: env::var("MAIL_FROM").unwrap_or(defaults.mail_from),
            notification_workers: parse_or("NOTIFICATION_WORKERS", defaults.notification_workers),
            notification_max_attempts: parse_or(
                "NOTIFICATION_MAX_ATTEMPTS",
                defaults.notification_max_attempts,
            ),
            notification_retry_delay_ms: parse_or(
                "NOTIFICATION_RETRY_DELAY_MS",
                defaults.notification_retry_delay_ms,
            ),
            notification_queue_capacity: parse_or(
                "NOTIFICATION_QUEUE_CAPACITY",
                defaults.notification_queue_capacity,
            ),
            cancellation_notice_hours: within(
                "CANCELLATION_NOTICE_HOURS",
                parse_or("CANCELLATION_NOTICE_HOURS", defaults.cancellation_notice_hours),
                0,
                MAX_CANCELLATION_NOTICE_HOURS,
            ),
            appointments_page_size: parse_or("APPOINTMENTS_PAGE_SIZE", defaults.appointments_page_size),
            port: parse_or("PORT", defaults.port),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_anon_key.is_empty()
            && !self.supabase_jwt_secret.is_empty()
    }

    pub fn is_mail_configured(&self) -> bool {
        self.mail_api_url.as_deref().is_some_and(|url| !url.is_empty())
    }

    /// Key sent to PostgREST for server-side access; falls back to the anon key.
    pub fn supabase_server_key(&self) -> &str {
        if self.supabase_service_role_key.is_empty() {
            &self.supabase_anon_key
        } else {
            &self.supabase_service_role_key
        }
    }
}

fn parse_or<T>(key: &str, default: T) -> T
where
    T: FromStr + std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("{} has invalid value '{}', using default {}", key, raw, default);
            default
        }),
        Err(_) => default,
    }
}

fn within<T>(key: &str, value: T, min: T, max: T) -> T
where
    T: PartialOrd + std::fmt::Display + Copy,
{
    if value < min {
        warn!("{} = {} is below {}, clamping", key, value, min);
        min
    } else if value > max {
        warn!("{} = {} is above {}, clamping", key, value, max);
        max
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_key_falls_back_to_anon_key() {
        let mut config = AppConfig {
            supabase_anon_key: "anon".to_string(),
            ..AppConfig::default()
        };
        assert_eq!(config.supabase_server_key(), "anon");

        config.supabase_service_role_key = "service".to_string();
        assert_eq!(config.supabase_server_key(), "service");
    }

    #[test]
    fn mail_requires_non_empty_url() {
        let mut config = AppConfig::default();
        assert!(!config.is_mail_configured());

        config.mail_api_url = Some(String::new());
        assert!(!config.is_mail_configured());

        config.mail_api_url = Some("http://mail.local".to_string());
        assert!(config.is_mail_configured());
    }

    #[test]
    fn notice_hours_are_clamped_to_a_sane_range() {
        let key = "CANCELLATION_NOTICE_HOURS";
        assert_eq!(within(key, 2, 0, MAX_CANCELLATION_NOTICE_HOURS), 2);
        assert_eq!(within(key, -5, 0, MAX_CANCELLATION_NOTICE_HOURS), 0);
        assert_eq!(within(key, i64::MAX, 0, MAX_CANCELLATION_NOTICE_HOURS), MAX_CANCELLATION_NOTICE_HOURS);
    }
}
