use std::env;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    pub gateway_token: String,
    pub payment_webhook_secret: String,
    pub cancellation_notice_hours: i64,
    pub booking_rate_limit_per_hour: i64,
    pub completion_sweep_secs: u64,
    pub utc_offset_minutes: i32,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            port: parse_var("PORT", 3000),
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "spacebook.db".to_string()),
            gateway_token: env::var("GATEWAY_TOKEN").unwrap_or_else(|_| "changeme".to_string()),
            payment_webhook_secret: env::var("PAYMENT_WEBHOOK_SECRET").unwrap_or_default(),
            cancellation_notice_hours: parse_var("CANCELLATION_NOTICE_HOURS", 24),
            booking_rate_limit_per_hour: parse_var("BOOKING_RATE_LIMIT_PER_HOUR", 30),
            completion_sweep_secs: parse_var("COMPLETION_SWEEP_SECS", 300),
            utc_offset_minutes: parse_var("UTC_OFFSET_MINUTES", 0),
        }
    }

    pub fn booking_rules(&self) -> crate::services::booking::BookingRules {
        crate::services::booking::BookingRules {
            cancellation_notice: chrono::Duration::hours(self.cancellation_notice_hours),
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
