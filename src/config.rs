use clap::Parser;

/// domainprobe: probes a domain's delivery path and scores the result.
#[derive(Parser, Debug, Clone)]
#[command(name = "domainprobe")]
pub struct CliArgs {
    /// HTTP port to listen on
    #[arg(long = "port", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Bind address
    #[arg(long = "bind", default_value = "0.0.0.0")]
    pub bind: String,
}

#[derive(Debug, Clone)]
pub struct ProbeConfig {
    pub port: u16,
    pub bind: String,
}

// Server constants
pub const DEFAULT_PORT: u16 = 3000;

// Resolver health constants
pub const HEALTH_TTL_SECS: i64 = 300; // 5 minutes
pub const HEALTH_PROBE_TIMEOUT_SECS: u64 = 2;
pub const HEALTH_PROBE_DOMAINS: &[&str] = &["google.com", "cloudflare.com", "github.com"];

// Resolver query constants
pub const QUERY_TIMEOUT_SECS: u64 = 3;
pub const QUERY_BACKOFF_BASE_MS: u64 = 500;
pub const QUERY_MAX_RETRIES: u32 = 1;

// Multi-location fan-out constants
pub const FANOUT_DEADLINE_SECS: u64 = 15;
pub const LOW_SUCCESS_RATE_THRESHOLD: f64 = 0.7;

// HTTP probe constants
pub const PROBE_TIMEOUT_SECS: u64 = 10;
pub const PROBE_USER_AGENT: &str = concat!("domainprobe/", env!("CARGO_PKG_VERSION"));

// Advisor constants
pub const INDUSTRY_AVERAGE_SCORE: u32 = 72;
pub const OVERALL_WEIGHT_CDN: u32 = 30;
pub const OVERALL_WEIGHT_PERFORMANCE: u32 = 40;
pub const OVERALL_WEIGHT_SSL: u32 = 30;

impl ProbeConfig {
    pub fn from_args(args: CliArgs) -> Self {
        ProbeConfig {
            port: args.port,
            bind: args.bind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_port() {
        assert_eq!(DEFAULT_PORT, 3000);
    }

    #[test]
    fn test_health_ttl_is_five_minutes() {
        assert_eq!(HEALTH_TTL_SECS, 300);
    }

    #[test]
    fn test_overall_weights_sum_to_one_hundred() {
        assert_eq!(
            OVERALL_WEIGHT_CDN + OVERALL_WEIGHT_PERFORMANCE + OVERALL_WEIGHT_SSL,
            100
        );
    }

    #[test]
    fn test_health_probe_domains_defined() {
        assert_eq!(HEALTH_PROBE_DOMAINS.len(), 3);
        for domain in HEALTH_PROBE_DOMAINS {
            assert!(!domain.is_empty());
        }
    }

    #[test]
    fn test_config_from_args() {
        let config = ProbeConfig::from_args(CliArgs {
            port: 8080,
            bind: "127.0.0.1".to_string(),
        });
        assert_eq!(config.port, 8080);
        assert_eq!(config.bind, "127.0.0.1");
    }
}
