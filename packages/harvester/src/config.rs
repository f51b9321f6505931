//! Configuration constants, registry endpoints and the run configuration.

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use chrono::NaiveDate;

use crate::collector::Pagination;
use crate::dates::parse_date;
use crate::error::{HarvesterError, Result};
use crate::http::RetryPolicy;

/// Base URL of the public FSA registry.
pub const FSA_BASE_URL: &str = "https://pub.fsa.gov.ru";

/// Path of the technical-regulation dictionary, shared by both registers.
pub const TECH_REG_DICTIONARY_PATH: &str = "/api/v1/rss/common/dictionaries/techreglaments";

/// Default directory for cache files and exports.
pub const DEFAULT_DOWNLOADS_DIR: &str = "downloads";

/// Cache key (file stem) of the technical-regulation dictionary.
pub const TECH_REG_CACHE_KEY: &str = "trts";

/// Prefix every technical regulation of the customs union carries in its display name.
pub const TECH_REG_MARKER: &str = "ТР ТС";

/// HTTP timeout in seconds.
pub const HTTP_TIMEOUT_SECS: u64 = 30;

/// Politeness delay between page fetches (milliseconds).
pub const DEFAULT_PAGE_DELAY_MS: u64 = 100;

/// Contact type code for e-mail addresses.
pub const CONTACT_TYPE_EMAIL: i64 = 4;

/// Contact type code for landline phones.
pub const CONTACT_TYPE_PHONE: i64 = 1;

/// Contact type code for mobile phones; declarations only.
pub const CONTACT_TYPE_MOBILE: i64 = 7;

/// The two registers published by the FSA.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryKind {
    /// Certificates of conformity (RSS).
    Certificates,
    /// Declarations of conformity (RDS).
    Declarations,
}

impl RegistryKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Certificates => "certificates",
            Self::Declarations => "declarations",
        }
    }

    fn api_section(&self) -> &'static str {
        match self {
            Self::Certificates => "rss",
            Self::Declarations => "rds",
        }
    }

    /// Listing endpoint (POST with a page query body).
    #[must_use]
    pub fn listing_url(&self, base_url: &str) -> String {
        format!(
            "{base_url}/api/v1/{}/common/{}/get",
            self.api_section(),
            self.as_str()
        )
    }

    /// Per-record detail endpoint (GET).
    #[must_use]
    pub fn detail_url(&self, base_url: &str, id: u64) -> String {
        format!(
            "{base_url}/api/v1/{}/common/{}/{id}",
            self.api_section(),
            self.as_str()
        )
    }

    /// Identifier dictionary endpoint (status labels and other codes).
    #[must_use]
    pub fn identifiers_url(&self, base_url: &str) -> String {
        format!("{base_url}/api/v1/{}/common/identifiers", self.api_section())
    }

    /// Human-facing page of a record on the registry website.
    #[must_use]
    pub fn public_link(&self, base_url: &str, id: u64) -> String {
        match self {
            Self::Certificates => format!("{base_url}/rss/certificate/view/{id}/baseInfo"),
            Self::Declarations => format!("{base_url}/rds/declaration/view/{id}/common"),
        }
    }

    /// Column the listing is sorted on (ascending).
    #[must_use]
    pub fn sort_column(&self) -> &'static str {
        match self {
            Self::Certificates => "date",
            Self::Declarations => "declDate",
        }
    }

    #[must_use]
    pub fn default_page_size(&self) -> u32 {
        match self {
            Self::Certificates => 100,
            Self::Declarations => 1000,
        }
    }

    /// Certificate listings report a total, declaration listings are read until empty.
    #[must_use]
    pub fn pagination(&self) -> Pagination {
        match self {
            Self::Certificates => Pagination::CountDriven,
            Self::Declarations => Pagination::SentinelDriven,
        }
    }

    #[must_use]
    pub fn details_dir_name(&self) -> &'static str {
        match self {
            Self::Certificates => "certificate_details",
            Self::Declarations => "declaration_details",
        }
    }

    /// Cache key (file stem) of the identifier dictionary.
    #[must_use]
    pub fn identifiers_cache_key(&self) -> &'static str {
        match self {
            Self::Certificates => "cert_types_map",
            Self::Declarations => "decl_types_map",
        }
    }

    #[must_use]
    pub fn listing_file(&self) -> &'static str {
        match self {
            Self::Certificates => "cert_data.csv",
            Self::Declarations => "decl_data.csv",
        }
    }

    #[must_use]
    pub fn output_file(&self) -> &'static str {
        match self {
            Self::Certificates => "output_certificates.csv",
            Self::Declarations => "output_declarations.csv",
        }
    }

    /// Suffix appended to the scheme code in the export ("3с", "1д").
    #[must_use]
    pub fn scheme_suffix(&self) -> &'static str {
        match self {
            Self::Certificates => "с",
            Self::Declarations => "д",
        }
    }

    /// Contact types that count as the applicant's phone.
    #[must_use]
    pub fn phone_contact_types(&self) -> &'static [i64] {
        match self {
            Self::Certificates => &[CONTACT_TYPE_PHONE],
            Self::Declarations => &[CONTACT_TYPE_PHONE, CONTACT_TYPE_MOBILE],
        }
    }
}

/// Split a comma-separated prefix list, dropping blanks.
///
/// # Examples
/// ```
/// use fsa_harvester::config::parse_prefixes;
///
/// let prefixes = parse_prefixes(" 017, 020,,");
/// assert_eq!(prefixes.len(), 2);
/// assert!(prefixes.contains("017"));
/// ```
pub fn parse_prefixes(list: &str) -> BTreeSet<String> {
    list.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(String::from)
        .collect()
}

/// Everything one harvest run needs, built once at start-up.
///
/// NOTE: `Debug` is implemented by hand so the bearer token never reaches logs.
#[derive(Clone)]
pub struct HarvesterConfig {
    pub bearer_token: String,
    pub base_url: String,
    pub tech_reg_path: String,
    pub downloads_dir: PathBuf,
    pub tech_reg_prefixes: BTreeSet<String>,
    pub min_end_date: NaiveDate,
    pub max_end_date: NaiveDate,
    /// Overrides the register's default page size.
    pub page_size: Option<u32>,
    pub page_delay: Duration,
    pub timeout: Duration,
    pub accept_invalid_certs: bool,
    pub retry: RetryPolicy,
}

impl fmt::Debug for HarvesterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HarvesterConfig")
            .field("bearer_token", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("tech_reg_path", &self.tech_reg_path)
            .field("downloads_dir", &self.downloads_dir)
            .field("tech_reg_prefixes", &self.tech_reg_prefixes)
            .field("min_end_date", &self.min_end_date)
            .field("max_end_date", &self.max_end_date)
            .field("page_size", &self.page_size)
            .field("page_delay", &self.page_delay)
            .field("timeout", &self.timeout)
            .field("accept_invalid_certs", &self.accept_invalid_certs)
            .field("retry", &self.retry)
            .finish()
    }
}

impl HarvesterConfig {
    /// Load configuration from environment variables (and a `.env` file, if present).
    ///
    /// `overrides` is consulted first; the CLI passes its flags through it.
    pub fn from_env<F>(overrides: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        // A missing .env file is normal in CI and containers
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| overrides(name).or_else(|| std::env::var(name).ok()))
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// The CLI uses this to let flags shadow environment variables.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| HarvesterError::Config(format!("{name} not set")))
        };

        let bearer_token = required("BEARER_TOKEN")?;

        let tech_reg_prefixes = parse_prefixes(&required("IDS_TECH_REG")?);
        if tech_reg_prefixes.is_empty() {
            return Err(HarvesterError::Config(
                "IDS_TECH_REG contains no regulation prefixes".into(),
            ));
        }

        let min_end_date = parse_date(&required("MIN_END_DATE")?)?;
        let max_end_date = parse_date(&required("MAX_END_DATE")?)?;

        let base_url = lookup("FSA_BASE_URL").unwrap_or_else(|| FSA_BASE_URL.into());

        let tech_reg_path =
            lookup("FSA_TECH_REG_PATH").unwrap_or_else(|| TECH_REG_DICTIONARY_PATH.into());

        let downloads_dir = lookup("FSA_DOWNLOADS_DIR")
            .unwrap_or_else(|| DEFAULT_DOWNLOADS_DIR.into())
            .into();

        let page_size = lookup("FSA_PAGE_SIZE").and_then(|v| v.parse().ok());

        let defaults = RetryPolicy::default();

        let max_retries = lookup("FSA_MAX_RETRIES")
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.max_retries);

        let base_delay = lookup("FSA_RETRY_BASE_DELAY_MS")
            .and_then(|v| v.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.base_delay);

        let page_delay_ms: u64 = lookup("FSA_PAGE_DELAY_MS")
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_PAGE_DELAY_MS);

        let timeout_secs: u64 = lookup("FSA_TIMEOUT_SECS")
            .and_then(|v| v.parse().ok())
            .unwrap_or(HTTP_TIMEOUT_SECS);

        let accept_invalid_certs = lookup("FSA_ACCEPT_INVALID_CERTS")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        let config = Self {
            bearer_token,
            base_url,
            tech_reg_path,
            downloads_dir,
            tech_reg_prefixes,
            min_end_date,
            max_end_date,
            page_size,
            page_delay: Duration::from_millis(page_delay_ms),
            timeout: Duration::from_secs(timeout_secs),
            accept_invalid_certs,
            retry: RetryPolicy {
                max_retries,
                base_delay,
                ..defaults
            },
        };
        config.validate()?;
        Ok(config)
    }

    /// Create a config builder for testing.
    pub fn builder(bearer_token: impl Into<String>) -> HarvesterConfigBuilder {
        HarvesterConfigBuilder {
            bearer_token: bearer_token.into(),
            base_url: FSA_BASE_URL.into(),
            tech_reg_path: TECH_REG_DICTIONARY_PATH.into(),
            downloads_dir: DEFAULT_DOWNLOADS_DIR.into(),
            tech_reg_prefixes: BTreeSet::new(),
            min_end_date: NaiveDate::MIN,
            max_end_date: NaiveDate::MAX,
            page_size: None,
            page_delay: Duration::from_millis(DEFAULT_PAGE_DELAY_MS),
            timeout: Duration::from_secs(HTTP_TIMEOUT_SECS),
            accept_invalid_certs: false,
            retry: RetryPolicy::default(),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.min_end_date > self.max_end_date {
            return Err(HarvesterError::Config(format!(
                "end-date window is empty: {} is after {}",
                self.min_end_date, self.max_end_date
            )));
        }
        if self.retry.max_retries == 0 {
            return Err(HarvesterError::Config(
                "FSA_MAX_RETRIES must be at least 1".into(),
            ));
        }
        if self.page_size == Some(0) {
            return Err(HarvesterError::Config("page size must be positive".into()));
        }
        Ok(())
    }

    /// Page size for a register, honouring the override.
    #[must_use]
    pub fn page_size_for(&self, kind: RegistryKind) -> u32 {
        self.page_size.unwrap_or_else(|| kind.default_page_size())
    }

    /// Full URL of the technical-regulation dictionary.
    #[must_use]
    pub fn tech_reg_url(&self) -> String {
        format!("{}{}", self.base_url, self.tech_reg_path)
    }
}

/// Builder for constructing `HarvesterConfig` in tests.
pub struct HarvesterConfigBuilder {
    bearer_token: String,
    base_url: String,
    tech_reg_path: String,
    downloads_dir: PathBuf,
    tech_reg_prefixes: BTreeSet<String>,
    min_end_date: NaiveDate,
    max_end_date: NaiveDate,
    page_size: Option<u32>,
    page_delay: Duration,
    timeout: Duration,
    accept_invalid_certs: bool,
    retry: RetryPolicy,
}

impl HarvesterConfigBuilder {
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn tech_reg_path(mut self, tech_reg_path: impl Into<String>) -> Self {
        self.tech_reg_path = tech_reg_path.into();
        self
    }

    pub fn downloads_dir(mut self, downloads_dir: impl Into<PathBuf>) -> Self {
        self.downloads_dir = downloads_dir.into();
        self
    }

    pub fn tech_reg_prefixes<I, S>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tech_reg_prefixes = prefixes.into_iter().map(Into::into).collect();
        self
    }

    pub fn end_date_window(mut self, min: NaiveDate, max: NaiveDate) -> Self {
        self.min_end_date = min;
        self.max_end_date = max;
        self
    }

    pub fn page_size(mut self, page_size: u32) -> Self {
        self.page_size = Some(page_size);
        self
    }

    pub fn page_delay(mut self, page_delay: Duration) -> Self {
        self.page_delay = page_delay;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn accept_invalid_certs(mut self, accept: bool) -> Self {
        self.accept_invalid_certs = accept;
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn build(self) -> Result<HarvesterConfig> {
        let config = HarvesterConfig {
            bearer_token: self.bearer_token,
            base_url: self.base_url,
            tech_reg_path: self.tech_reg_path,
            downloads_dir: self.downloads_dir,
            tech_reg_prefixes: self.tech_reg_prefixes,
            min_end_date: self.min_end_date,
            max_end_date: self.max_end_date,
            page_size: self.page_size,
            page_delay: self.page_delay,
            timeout: self.timeout,
            accept_invalid_certs: self.accept_invalid_certs,
            retry: self.retry,
        };
        config.validate()?;
        Ok(config)
    }
}
