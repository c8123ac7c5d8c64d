use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    pub kafka: Option<KafkaConfig>,
    pub payment: PaymentConfig,
    pub business_rules: BusinessRules,
    #[serde(default)]
    pub sweeper: SweeperConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct KafkaConfig {
    pub brokers: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PaymentConfig {
    pub currency: String,
    /// Prefix of genuine processor references, e.g. `pi_`.
    pub reference_prefix: String,
    /// Absent means the mock processor is used.
    pub stripe: Option<StripeConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StripeConfig {
    pub secret_key: String,
    pub api_base: Option<String>,
    pub success_url: String,
    pub cancel_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BusinessRules {
    pub platform_fee_rate: f64,
    /// Applied twice, once per tax component.
    pub tax_component_rate: f64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SweeperConfig {
    pub interval_seconds: u64,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self { interval_seconds: 300 }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            // Start off by merging in the "default" configuration file
            .add_source(config::File::with_name("config/default"))
            // Per-environment overrides, optional
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Local overrides, never checked in
            .add_source(config::File::with_name("config/local").required(false))
            // Eg.. `VELO__DATABASE__URL=postgres://...` sets `database.url`
            .add_source(config::Environment::with_prefix("VELO").separator("__"))
            .build()?;

        Self::from_settings(s)
    }

    /// Deserialize merged settings and reject values the worker cannot run with.
    pub fn from_settings(settings: config::Config) -> Result<Self, config::ConfigError> {
        let config: Self = settings.try_deserialize()?;

        if config.sweeper.interval_seconds == 0 {
            return Err(config::ConfigError::Message(
                "sweeper.interval_seconds must be at least 1".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&config.business_rules.platform_fee_rate) {
            return Err(config::ConfigError::Message(
                "business_rules.platform_fee_rate must be in [0, 1)".to_string(),
            ));
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> config::ConfigBuilder<config::builder::DefaultState> {
        config::Config::builder().add_source(config::File::from_str(
            include_str!("../../config/default.toml"),
            config::FileFormat::Toml,
        ))
    }

    #[test]
    fn test_defaults_file_parses() {
        let config = Config::from_settings(defaults().build().unwrap()).unwrap();

        assert_eq!(config.payment.reference_prefix, "pi_");
        assert_eq!(config.business_rules.platform_fee_rate, 0.05);
        assert_eq!(config.sweeper.interval_seconds, 300);
        assert!(config.payment.stripe.is_none());
    }

    #[test]
    fn test_zero_sweep_interval_is_rejected() {
        let settings = defaults()
            .set_override("sweeper.interval_seconds", 0_i64)
            .unwrap()
            .build()
            .unwrap();

        let err = Config::from_settings(settings).unwrap_err();
        assert!(err.to_string().contains("interval_seconds"));
    }
}
