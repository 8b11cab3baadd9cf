//! Agent configuration
//!
//! Programmatic configuration for an [`crate::application::Application`].
//! Hosts build an `AgentConfig`, adjust the sections they care about, and
//! hand it to `Application::new`. Validation happens once at construction;
//! nothing here is re-read afterwards.

use crate::attributes::{dest, AttributeConfig};
use crate::errors::ConfigError;
use crate::limits::{DEFAULT_APDEX_THRESHOLD, LICENSE_LENGTH, MAX_APP_NAMES};
use std::time::Duration;

/// Include/exclude lists for one attribute scope. Patterns may end in `*`.
#[derive(Debug, Clone, Default)]
pub struct AttributeInclusion {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

/// Agent diagnostic log sink, fed to [`crate::logging::init_logging`].
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub log_dir: String,
    pub log_file: String,
    /// "hourly", "daily", or anything else for a single file.
    pub rotation: String,
    pub log_level: String,
    pub use_json: bool,
    /// When true, full payload dumps are logged under the audit target.
    pub audit_events: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            log_dir: "logs".to_string(),
            log_file: "pulse_agent.log".to_string(),
            rotation: "daily".to_string(),
            log_level: "info".to_string(),
            use_json: false,
            audit_events: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TransactionEventsConfig {
    pub enabled: bool,
    pub attributes: AttributeInclusion,
}

impl Default for TransactionEventsConfig {
    fn default() -> Self {
        TransactionEventsConfig {
            enabled: true,
            attributes: AttributeInclusion::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SpanEventsConfig {
    pub enabled: bool,
    pub attributes: AttributeInclusion,
}

impl Default for SpanEventsConfig {
    fn default() -> Self {
        SpanEventsConfig {
            enabled: true,
            attributes: AttributeInclusion::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CustomEventsConfig {
    pub enabled: bool,
}

impl Default for CustomEventsConfig {
    fn default() -> Self {
        CustomEventsConfig { enabled: true }
    }
}

#[derive(Debug, Clone)]
pub struct ErrorCollectorConfig {
    pub enabled: bool,
    pub capture_events: bool,
    /// Re-record panics captured by instrumentation glue before re-panicking.
    pub record_panics: bool,
    /// HTTP status codes that do not count as errors.
    pub ignore_status_codes: Vec<u16>,
    pub attributes: AttributeInclusion,
}

impl Default for ErrorCollectorConfig {
    fn default() -> Self {
        ErrorCollectorConfig {
            enabled: true,
            capture_events: true,
            record_panics: false,
            ignore_status_codes: vec![404],
            attributes: AttributeInclusion::default(),
        }
    }
}

/// Transaction trace threshold: apdex-failing (4x the apdex threshold) or a
/// fixed duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceThreshold {
    ApdexFailing,
    Fixed(Duration),
}

#[derive(Debug, Clone)]
pub struct TransactionTracerConfig {
    pub enabled: bool,
    pub threshold: TraceThreshold,
    pub attributes: AttributeInclusion,
    pub slow_queries_enabled: bool,
    pub slow_query_threshold: Duration,
    /// Segments shorter than this are left out of the trace tree.
    pub segment_threshold: Duration,
}

impl Default for TransactionTracerConfig {
    fn default() -> Self {
        TransactionTracerConfig {
            enabled: true,
            threshold: TraceThreshold::ApdexFailing,
            attributes: AttributeInclusion::default(),
            slow_queries_enabled: true,
            slow_query_threshold: Duration::from_millis(10),
            segment_threshold: Duration::from_millis(2),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DistributedTracerConfig {
    pub enabled: bool,
}

impl Default for DistributedTracerConfig {
    fn default() -> Self {
        DistributedTracerConfig { enabled: true }
    }
}

#[derive(Debug, Clone)]
pub struct BrowserConfig {
    pub enabled: bool,
    pub attributes: AttributeInclusion,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        BrowserConfig {
            enabled: true,
            attributes: AttributeInclusion::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ApplicationLoggingConfig {
    pub enabled: bool,
    /// Forward log records as log events.
    pub forwarding_enabled: bool,
    /// Emit Logging/lines metrics even when forwarding is off.
    pub metrics_enabled: bool,
    pub attributes: AttributeInclusion,
}

impl Default for ApplicationLoggingConfig {
    fn default() -> Self {
        ApplicationLoggingConfig {
            enabled: true,
            forwarding_enabled: true,
            metrics_enabled: true,
            attributes: AttributeInclusion::default(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct HerokuConfig {
    /// Use the DYNO env var as the reported hostname.
    pub use_dyno_names: bool,
    /// Dyno name prefixes collapsed to `<prefix>.*` (e.g. "scheduler").
    pub dyno_name_prefixes_to_shorten: Vec<String>,
}

/// Security policies negotiated at connect time (LASP). All-permissive by
/// default; the connect reply may tighten them.
#[derive(Debug, Clone)]
pub struct SecurityPolicies {
    pub allow_raw_exception_messages: bool,
    pub custom_events: bool,
    pub custom_parameters: bool,
    pub record_sql: bool,
}

impl Default for SecurityPolicies {
    fn default() -> Self {
        SecurityPolicies {
            allow_raw_exception_messages: true,
            custom_events: true,
            custom_parameters: true,
            record_sql: true,
        }
    }
}

/// Top-level agent configuration.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// 40-byte license key.
    pub license: String,
    /// Up to three app names, `;`-separated.
    pub app_name: String,
    /// Master switch: a disabled agent records nothing and never connects.
    pub enabled: bool,
    /// Collector host override; normally derived from the license region.
    pub host: Option<String>,
    /// Reported hostname override.
    pub hostname: Option<String>,
    pub high_security: bool,
    /// Security policies token; mutually exclusive with high security.
    pub security_policies_token: String,
    pub labels: Vec<(String, String)>,
    pub apdex_threshold: Duration,
    pub log: LogConfig,
    /// Global attribute include/exclude, applied to every destination.
    pub attributes_enabled: bool,
    pub attributes: AttributeInclusion,
    pub transaction_events: TransactionEventsConfig,
    pub span_events: SpanEventsConfig,
    pub custom_events: CustomEventsConfig,
    pub error_collector: ErrorCollectorConfig,
    pub transaction_tracer: TransactionTracerConfig,
    pub distributed_tracer: DistributedTracerConfig,
    pub browser: BrowserConfig,
    pub application_logging: ApplicationLoggingConfig,
    pub heroku: HerokuConfig,
}

impl AgentConfig {
    pub fn new(app_name: impl Into<String>, license: impl Into<String>) -> Self {
        AgentConfig {
            license: license.into(),
            app_name: app_name.into(),
            enabled: true,
            host: None,
            hostname: None,
            high_security: false,
            security_policies_token: String::new(),
            labels: Vec::new(),
            apdex_threshold: DEFAULT_APDEX_THRESHOLD,
            log: LogConfig::default(),
            attributes_enabled: true,
            attributes: AttributeInclusion::default(),
            transaction_events: TransactionEventsConfig::default(),
            span_events: SpanEventsConfig::default(),
            custom_events: CustomEventsConfig::default(),
            error_collector: ErrorCollectorConfig::default(),
            transaction_tracer: TransactionTracerConfig::default(),
            distributed_tracer: DistributedTracerConfig::default(),
            browser: BrowserConfig::default(),
            application_logging: ApplicationLoggingConfig::default(),
            heroku: HerokuConfig::default(),
        }
    }

    /// Validate per the construction-time taxonomy. The harvest loop never
    /// sees an invalid config.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.license.len() != LICENSE_LENGTH {
            return Err(ConfigError::LicenseLength(self.license.len()));
        }
        let names = self.app_names();
        if names.is_empty() {
            return Err(ConfigError::AppNameMissing);
        }
        if names.len() > MAX_APP_NAMES {
            return Err(ConfigError::AppNameCount(names.len()));
        }
        if self.high_security && !self.security_policies_token.is_empty() {
            return Err(ConfigError::HighSecurityPolicyConflict);
        }
        Ok(())
    }

    /// App names split on `;`, empty entries dropped.
    pub fn app_names(&self) -> Vec<&str> {
        self.app_name
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// Compile every include/exclude list into one attribute config.
    pub fn attribute_config(&self) -> AttributeConfig {
        let mut b = AttributeConfig::builder()
            .include(&self.attributes.include, dest::ALL)
            .exclude(&self.attributes.exclude, dest::ALL)
            .include(&self.transaction_events.attributes.include, dest::TXN_EVENT)
            .exclude(&self.transaction_events.attributes.exclude, dest::TXN_EVENT)
            .include(&self.transaction_tracer.attributes.include, dest::TXN_TRACE)
            .exclude(&self.transaction_tracer.attributes.exclude, dest::TXN_TRACE)
            .include(&self.error_collector.attributes.include, dest::ERROR)
            .exclude(&self.error_collector.attributes.exclude, dest::ERROR)
            .include(&self.browser.attributes.include, dest::BROWSER)
            .exclude(&self.browser.attributes.exclude, dest::BROWSER)
            .include(&self.span_events.attributes.include, dest::SPAN)
            .exclude(&self.span_events.attributes.exclude, dest::SPAN)
            .include(&self.application_logging.attributes.include, dest::LOG)
            .exclude(&self.application_logging.attributes.exclude, dest::LOG);
        if !self.attributes_enabled {
            b = b.disable(dest::ALL);
        }
        if !self.browser.enabled {
            b = b.disable(dest::BROWSER);
        }
        b.build()
    }
}
