//! Client for one FSA register.
//!
//! Ties endpoint layout, the retry client and the memo caches together.
//! Listing pages always go to the network; detail records and the two
//! dictionaries go through [`DiskCache`].

use std::collections::BTreeSet;
use std::thread;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::cache::DiskCache;
use crate::collector::{Collector, DateWindow, PageQuery};
use crate::config::{HarvesterConfig, RegistryKind};
use crate::error::{HarvesterError, Result};
use crate::http::{HttpMethod, ReqwestTransport, RetryClient, Transport};
use crate::reference::{self, ReferenceTable};
use crate::types::{DetailRecord, Identifiers, ListItem, Page};

pub struct RegistryClient<T: Transport = ReqwestTransport> {
    kind: RegistryKind,
    base_url: String,
    tech_reg_url: String,
    client: RetryClient<T>,
    documents: DiskCache,
    details: DiskCache,
    page_size: u32,
    collector: Collector,
    request_delay: Duration,
}

impl RegistryClient<ReqwestTransport> {
    /// Create the production client for a register.
    pub fn from_config(config: &HarvesterConfig, kind: RegistryKind) -> Result<Self> {
        Ok(Self::with_client(
            config,
            kind,
            RetryClient::from_config(config)?,
        ))
    }
}

impl<T: Transport> RegistryClient<T> {
    /// Create a client over an existing retry client (scripted transports in tests).
    pub fn with_client(config: &HarvesterConfig, kind: RegistryKind, client: RetryClient<T>) -> Self {
        let page_size = config.page_size_for(kind);
        Self {
            kind,
            base_url: config.base_url.clone(),
            tech_reg_url: config.tech_reg_url(),
            client,
            documents: DiskCache::new(&config.downloads_dir),
            details: DiskCache::new(config.downloads_dir.join(kind.details_dir_name())),
            page_size,
            collector: Collector::new(kind.pagination(), page_size, config.page_delay),
            request_delay: config.page_delay,
        }
    }

    pub fn kind(&self) -> RegistryKind {
        self.kind
    }

    pub fn transport(&self) -> &T {
        self.client.transport()
    }

    pub fn details_cache(&self) -> &DiskCache {
        &self.details
    }

    /// Public web page of a record.
    #[must_use]
    pub fn public_link(&self, id: u64) -> String {
        self.kind.public_link(&self.base_url, id)
    }

    /// Technical-regulation table and the subset matching `prefixes`.
    pub fn resolve_regulations(
        &self,
        prefixes: &BTreeSet<String>,
    ) -> Result<(ReferenceTable, ReferenceTable)> {
        reference::resolve(&self.client, &self.documents, &self.tech_reg_url, prefixes)
    }

    /// Identifier dictionary of this register, cached forever.
    pub fn fetch_identifiers(&self) -> Result<Identifiers> {
        let url = self.kind.identifiers_url(&self.base_url);
        let value = self
            .documents
            .get_or_fetch(self.kind.identifiers_cache_key(), || {
                let value = self.client.request(&url, HttpMethod::Get, &json!({}))?;
                decode::<Identifiers>(&url, value.clone())?;
                Ok(value)
            })?;
        decode(&url, value)
    }

    /// One listing page. Never cached.
    pub fn fetch_page(&self, query: &PageQuery) -> Result<Page> {
        let url = self.kind.listing_url(&self.base_url);
        tracing::debug!(page = query.page, "Fetching listing page");
        let value = self
            .client
            .request(&url, HttpMethod::Post, &serde_json::to_value(query)?)?;
        decode(&url, value)
    }

    /// Every listing item whose end date falls in `window`, restricted to `filter_ids`.
    ///
    /// `on_page` is called after each page with its number and content.
    pub fn collect_all<F>(
        &self,
        window: DateWindow,
        filter_ids: Vec<u64>,
        mut on_page: F,
    ) -> Result<Vec<ListItem>>
    where
        F: FnMut(u64, &Page),
    {
        let query = PageQuery::new(self.page_size, window, filter_ids, self.kind.sort_column());
        self.collector.collect_all(|page| {
            let page_data = self.fetch_page(&query.for_page(page))?;
            on_page(page, &page_data);
            Ok(page_data)
        })
    }

    /// Detail record of one listing item; network only on a cache miss.
    ///
    /// Only documents that decode as a [`DetailRecord`] are persisted.
    pub fn fetch_detail(&self, id: u64) -> Result<DetailRecord> {
        let url = self.kind.detail_url(&self.base_url, id);
        let value = self.details.get_or_fetch(&id.to_string(), || {
            let value = self.client.request(&url, HttpMethod::Get, &json!({}))?;
            self.pause();
            decode::<DetailRecord>(&url, value.clone())?;
            Ok(value)
        })?;
        decode(&url, value)
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    fn pause(&self) {
        if !self.request_delay.is_zero() {
            thread::sleep(self.request_delay);
        }
    }
}

fn decode<D: DeserializeOwned>(url: &str, value: Value) -> Result<D> {
    serde_json::from_value(value).map_err(|e| HarvesterError::InvalidResponse {
        url: url.to_string(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::test_support::ScriptedTransport;
    use crate::http::RetryPolicy;
    use chrono::NaiveDate;
    use tempfile::{tempdir, TempDir};

    fn config(dir: &TempDir) -> HarvesterConfig {
        HarvesterConfig::builder("Bearer test")
            .base_url("http://registry")
            .downloads_dir(dir.path())
            .page_delay(Duration::ZERO)
            .page_size(2)
            .build()
            .unwrap()
    }

    fn registry(
        dir: &TempDir,
        kind: RegistryKind,
        responses: Vec<Value>,
    ) -> RegistryClient<ScriptedTransport> {
        RegistryClient::with_client(
            &config(dir),
            kind,
            RetryClient::new(
                ScriptedTransport::with_json(responses),
                RetryPolicy::immediate(1, 0),
            ),
        )
    }

    fn detail_json() -> Value {
        json!({
            "idCertScheme": 3,
            "applicant": {"fullName": "ООО \"Ромашка\"", "contacts": [], "addresses": []},
            "manufacturer": {"addresses": []},
            "product": {"fullName": "Куртки"},
            "idTechnicalReglaments": [8]
        })
    }

    fn window() -> DateWindow {
        DateWindow {
            min: NaiveDate::from_ymd_opt(2023, 11, 11).unwrap(),
            max: NaiveDate::from_ymd_opt(2023, 12, 31).unwrap(),
        }
    }

    #[test]
    fn test_fetch_detail_is_cached_per_id() {
        let dir = tempdir().unwrap();
        let registry = registry(&dir, RegistryKind::Certificates, vec![detail_json()]);

        let first = registry.fetch_detail(42).unwrap();
        let second = registry.fetch_detail(42).unwrap();

        assert_eq!(first, second);
        assert_eq!(registry.transport().calls(), 1);
        assert_eq!(
            registry.transport().requests()[0].url,
            "http://registry/api/v1/rss/common/certificates/42"
        );
        assert!(dir.path().join("certificate_details").join("42.json").is_file());
    }

    #[test]
    fn test_fetch_detail_rejects_malformed_document() {
        let dir = tempdir().unwrap();
        let registry = registry(
            &dir,
            RegistryKind::Certificates,
            vec![json!({"message": "temporarily unavailable"}), detail_json()],
        );

        let err = registry.fetch_detail(42).unwrap_err();
        assert!(matches!(err, HarvesterError::InvalidResponse { .. }));
        assert!(!dir.path().join("certificate_details").join("42.json").exists());

        // The next attempt goes back to the registry and caches the good document
        let detail = registry.fetch_detail(42).unwrap();
        assert_eq!(detail.scheme, "3");
        assert_eq!(registry.transport().calls(), 2);
        assert!(dir.path().join("certificate_details").join("42.json").is_file());
    }

    #[test]
    fn test_malformed_identifiers_are_not_cached() {
        let dir = tempdir().unwrap();
        let registry = registry(
            &dir,
            RegistryKind::Declarations,
            vec![json!({"status": "n/a"})],
        );

        let err = registry.fetch_identifiers().unwrap_err();
        assert!(matches!(err, HarvesterError::InvalidResponse { .. }));
        assert!(!dir.path().join("decl_types_map.json").exists());
    }

    #[test]
    fn test_collect_all_sends_same_filter_on_every_page() {
        let dir = tempdir().unwrap();
        let registry = registry(
            &dir,
            RegistryKind::Certificates,
            vec![
                json!({"total": 3, "items": [{"id": 1}, {"id": 2}]}),
                json!({"total": 3, "items": [{"id": 3}]}),
            ],
        );

        let mut seen_pages = Vec::new();
        let items = registry
            .collect_all(window(), vec![8, 24], |page, data| {
                seen_pages.push((page, data.items.len()));
            })
            .unwrap();

        assert_eq!(items.iter().map(|i| i.id).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(seen_pages, vec![(0, 2), (1, 1)]);

        let requests = registry.transport().requests();
        assert_eq!(requests.len(), 2);
        for (n, request) in requests.iter().enumerate() {
            assert_eq!(request.method, HttpMethod::Post);
            assert_eq!(request.body["page"], json!(n));
            assert_eq!(request.body["size"], json!(2));
            assert_eq!(request.body["filter"]["idTechReg"], json!([8, 24]));
            assert_eq!(request.body["columnsSort"][0]["column"], json!("date"));
        }
    }

    #[test]
    fn test_declarations_collect_until_empty() {
        let dir = tempdir().unwrap();
        let registry = registry(
            &dir,
            RegistryKind::Declarations,
            vec![
                json!({"items": [{"id": 1}, {"id": 2}]}),
                json!({"items": []}),
            ],
        );

        let items = registry.collect_all(window(), vec![], |_, _| {}).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(registry.transport().calls(), 2);
        assert_eq!(
            registry.transport().requests()[0].url,
            "http://registry/api/v1/rds/common/declarations/get"
        );
    }

    #[test]
    fn test_fetch_identifiers_is_cached() {
        let dir = tempdir().unwrap();
        let registry = registry(
            &dir,
            RegistryKind::Certificates,
            vec![json!({"status": {"a": {"id": 6, "name": "Действует"}}})],
        );

        let labels = registry.fetch_identifiers().unwrap().status_labels();
        assert_eq!(labels.get(&6).map(String::as_str), Some("Действует"));
        registry.fetch_identifiers().unwrap();
        assert_eq!(registry.transport().calls(), 1);
        assert!(dir.path().join("cert_types_map.json").is_file());
    }

    #[test]
    fn test_public_link() {
        let dir = tempdir().unwrap();
        let registry = registry(&dir, RegistryKind::Declarations, vec![]);
        assert_eq!(
            registry.public_link(9),
            "http://registry/rds/declaration/view/9/common"
        );
    }
}
