pub mod cdn_latency;
pub mod health;
pub mod test_domain;
