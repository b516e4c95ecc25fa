use std::env;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    // Server
    pub port: u16,
    pub data_dir: String,
    pub max_items_page: usize,

    // Feed fetching
    pub fetch_timeout_ms: u64,
    pub max_feed_size_mb: usize,
    pub max_retries: u32,

    // Checking
    pub check_concurrency: i64,
    pub max_check_concurrency: usize,
    pub check_timeout_ms: i64,
    pub check_retries: u32,
    pub auto_repair: bool,

    // Scheduling
    pub update_interval_secs: u64,
    pub update_on_startup: bool,
    pub check_after_update: bool,
    pub offline_retention_hours: i64,

    // Misc
    pub user_agent: String,
}

impl Config {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        Self {
            // Server
            port: env::var("PORT")
                .unwrap_or_else(|_| "3001".to_string())
                .parse()
                .unwrap_or(3001),
            data_dir: env::var("DATA_DIR").unwrap_or_else(|_| "./data".to_string()),
            max_items_page: env::var("MAX_ITEMS_PAGE")
                .unwrap_or_else(|_| "5000".to_string())
                .parse()
                .unwrap_or(5000),

            // Feed fetching
            fetch_timeout_ms: env::var("FETCH_TIMEOUT_MS")
                .unwrap_or_else(|_| "60000".to_string())
                .parse()
                .unwrap_or(60_000), // 1 minute
            max_feed_size_mb: env::var("MAX_FEED_SIZE_MB")
                .unwrap_or_else(|_| "50".to_string())
                .parse()
                .unwrap_or(50),
            max_retries: env::var("MAX_RETRIES")
                .unwrap_or_else(|_| "3".to_string())
                .parse()
                .unwrap_or(3),

            // Checking
            check_concurrency: env::var("CHECK_CONCURRENCY")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .unwrap_or(10),
            max_check_concurrency: env::var("MAX_CHECK_CONCURRENCY")
                .unwrap_or_else(|_| "100".to_string())
                .parse()
                .unwrap_or(100),
            check_timeout_ms: env::var("CHECK_TIMEOUT_MS")
                .unwrap_or_else(|_| "5000".to_string())
                .parse()
                .unwrap_or(5_000), // 5 seconds
            check_retries: env::var("CHECK_RETRIES")
                .unwrap_or_else(|_| "0".to_string())
                .parse()
                .unwrap_or(0),
            auto_repair: env::var("AUTO_REPAIR")
                .unwrap_or_else(|_| "false".to_string())
                .parse()
                .unwrap_or(false),

            // Scheduling
            update_interval_secs: env::var("UPDATE_INTERVAL_SECS")
                .unwrap_or_else(|_| "21600".to_string())
                .parse()
                .unwrap_or(21_600), // 6 hours
            update_on_startup: env::var("UPDATE_ON_STARTUP")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .unwrap_or(true),
            check_after_update: env::var("CHECK_AFTER_UPDATE")
                .unwrap_or_else(|_| "false".to_string())
                .parse()
                .unwrap_or(false),
            offline_retention_hours: env::var("OFFLINE_RETENTION_HOURS")
                .unwrap_or_else(|_| "0".to_string())
                .parse()
                .unwrap_or(0),

            // Misc - VLC user agent, plenty of IPTV hosts block unknown clients
            user_agent: env::var("USER_AGENT")
                .unwrap_or_else(|_| "VLC/3.0.20 LibVLC/3.0.20".to_string()),
        }
    }
}

