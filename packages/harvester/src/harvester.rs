//! Main harvester service that ties all components together.

use std::fs;
use std::path::PathBuf;

use indicatif::ProgressBar;

use crate::collector::{dedup_by_id, total_pages, DateWindow};
use crate::config::{HarvesterConfig, RegistryKind};
use crate::error::{HarvesterError, Result};
use crate::export::{remove_files, write_csv, RowContext};
use crate::http::Transport;
use crate::registry::RegistryClient;

/// What a finished run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarvestSummary {
    pub kind: RegistryKind,
    /// Listing items as returned, duplicates included.
    pub listed: usize,
    /// Rows written after deduplication.
    pub rows: usize,
    pub listing_path: PathBuf,
    pub output_path: PathBuf,
}

/// Harvest one register against the live registry.
///
/// # Arguments
/// * `config` - Run configuration
/// * `kind` - Register to harvest
/// * `progress` - Progress bar to drive; pass `ProgressBar::hidden()` when unused
pub fn harvest(
    config: &HarvesterConfig,
    kind: RegistryKind,
    progress: &ProgressBar,
) -> Result<HarvestSummary> {
    let registry = RegistryClient::from_config(config, kind)?;
    run(&registry, config, progress)
}

/// Run the full pipeline through an existing registry client.
///
/// Steps: resolve regulations, load status labels, collect and deduplicate
/// the listing, enrich every item with its detail record, write both CSVs.
/// The first failing record aborts the run after its id is logged.
pub fn run<T: Transport>(
    registry: &RegistryClient<T>,
    config: &HarvesterConfig,
    progress: &ProgressBar,
) -> Result<HarvestSummary> {
    let kind = registry.kind();
    let listing_path = config.downloads_dir.join(kind.listing_file());
    let output_path = config.downloads_dir.join(kind.output_file());

    // The listing is recomputed every run; only detail records persist
    remove_files(&[listing_path.clone(), output_path.clone()])?;
    fs::create_dir_all(registry.details_cache().dir())?;

    progress.set_message("Resolving technical regulations...");
    let (regulations, selected) = registry.resolve_regulations(&config.tech_reg_prefixes)?;
    if selected.is_empty() {
        return Err(HarvesterError::Config(format!(
            "no technical regulation matches IDS_TECH_REG {:?}",
            config.tech_reg_prefixes
        )));
    }

    progress.set_message("Loading status labels...");
    let status_labels = registry.fetch_identifiers()?.status_labels();

    let window = DateWindow {
        min: config.min_end_date,
        max: config.max_end_date,
    };

    progress.set_message("Fetching listing pages...");
    let items = registry.collect_all(window, selected.ids().collect(), |page, data| {
        if page == 0 {
            if let Some(total) = data.total {
                progress.set_length(total_pages(total, registry.page_size()));
            }
        }
        progress.inc(1);
    })?;

    let listed = items.len();
    let items = dedup_by_id(items);
    write_csv(&listing_path, &items)?;
    tracing::info!(
        register = kind.as_str(),
        listed,
        unique = items.len(),
        path = %listing_path.display(),
        "Listing saved"
    );

    progress.reset();
    progress.set_length(items.len() as u64);
    progress.set_message("Fetching details...");

    let context = RowContext {
        kind,
        status_labels: &status_labels,
        regulations: &regulations,
    };

    let mut rows = Vec::with_capacity(items.len());
    for item in &items {
        let row = registry
            .fetch_detail(item.id)
            .and_then(|detail| context.build_row(registry.public_link(item.id), item, &detail))
            .map_err(|e| {
                tracing::error!(id = item.id, error = %e, "Failed to process record");
                e
            })?;
        rows.push(row);
        progress.inc(1);
    }

    write_csv(&output_path, &rows)?;
    progress.finish_and_clear();

    tracing::info!(
        register = kind.as_str(),
        rows = rows.len(),
        path = %output_path.display(),
        "Export saved"
    );

    Ok(HarvestSummary {
        kind,
        listed,
        rows: rows.len(),
        listing_path,
        output_path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::test_support::ScriptedTransport;
    use crate::http::{Outcome, RetryClient, RetryPolicy};
    use chrono::NaiveDate;
    use serde_json::{json, Value};
    use std::time::Duration;
    use tempfile::{tempdir, TempDir};

    fn config(dir: &TempDir, prefixes: &[&str]) -> HarvesterConfig {
        HarvesterConfig::builder("Bearer test")
            .base_url("http://registry")
            .downloads_dir(dir.path())
            .tech_reg_prefixes(prefixes.iter().copied())
            .end_date_window(
                NaiveDate::from_ymd_opt(2023, 11, 11).unwrap(),
                NaiveDate::from_ymd_opt(2023, 12, 31).unwrap(),
            )
            .page_delay(Duration::ZERO)
            .build()
            .unwrap()
    }

    fn trts() -> Value {
        json!([
            {"id": 8, "displayName": "ТР ТС 017/2011 \"Легкая промышленность\"", "name": "017"},
            {"id": 39, "displayName": "ТР ТС 007/2011 \"Детская продукция\"", "name": "007"}
        ])
    }

    fn detail(regulations: &[u64]) -> Value {
        json!({
            "idObjectDeclType": 1,
            "applicant": {"fullName": "ООО Ромашка", "contacts": [], "addresses": []},
            "manufacturer": {"addresses": []},
            "product": {"fullName": "Куртки"},
            "idTechnicalReglaments": regulations
        })
    }

    fn item(id: u64) -> Value {
        json!({
            "id": id,
            "idStatus": 6,
            "number": format!("N-{id}"),
            "declDate": "2023-01-10",
            "declEndDate": "2023-12-01",
            "declObjectType": "Партия",
            "manufacterName": "Фабрика"
        })
    }

    fn run_with(dir: &TempDir, prefixes: &[&str], script: Vec<Outcome>) -> Result<HarvestSummary> {
        let config = config(dir, prefixes);
        let registry = RegistryClient::with_client(
            &config,
            RegistryKind::Declarations,
            RetryClient::new(ScriptedTransport::new(script), RetryPolicy::immediate(1, 0)),
        );
        run(&registry, &config, &ProgressBar::hidden())
    }

    fn ok(value: Value) -> Outcome {
        Outcome::Success(value.to_string())
    }

    #[test]
    fn test_full_run_deduplicates_and_exports() {
        let dir = tempdir().unwrap();
        let script = vec![
            ok(trts()),
            ok(json!({"status": {"x": {"id": 6, "name": "Действует"}}})),
            ok(json!({"items": [item(1), item(2)]})),
            ok(json!({"items": [item(2), item(3)]})),
            ok(json!({"items": []})),
            ok(detail(&[8])),
            ok(detail(&[8, 39])),
            ok(detail(&[39])),
        ];

        let summary = run_with(&dir, &["017"], script).unwrap();
        assert_eq!(summary.listed, 4);
        assert_eq!(summary.rows, 3);

        let output = fs::read_to_string(&summary.output_path).unwrap();
        assert_eq!(output.lines().count(), 4);
        assert!(output.contains("http://registry/rds/declaration/view/1/common"));
        assert!(output.contains("Действует"));
        assert!(output.contains("1д"));
        assert!(summary.listing_path.is_file());
        assert!(dir.path().join("declaration_details").join("3.json").is_file());
    }

    #[test]
    fn test_unknown_regulation_aborts_run() {
        let dir = tempdir().unwrap();
        let script = vec![
            ok(trts()),
            ok(json!({"status": {}})),
            ok(json!({"items": [item(1)]})),
            ok(json!({"items": []})),
            ok(detail(&[555])),
        ];

        let err = run_with(&dir, &["017"], script).unwrap_err();
        assert!(matches!(err, HarvesterError::UnknownRegulation { record_id: 1, .. }));
        assert!(!dir.path().join("output_declarations.csv").exists());
    }

    #[test]
    fn test_credential_error_stops_immediately() {
        let dir = tempdir().unwrap();
        let script = vec![Outcome::Terminal(401)];

        let err = run_with(&dir, &["017"], script).unwrap_err();
        assert!(matches!(err, HarvesterError::Credential { status: 401 }));
    }

    #[test]
    fn test_no_matching_regulation_is_a_config_error() {
        let dir = tempdir().unwrap();
        let err = run_with(&dir, &["999"], vec![ok(trts())]).unwrap_err();
        assert!(matches!(err, HarvesterError::Config(_)));
    }

    #[test]
    fn test_previous_outputs_are_removed() {
        let dir = tempdir().unwrap();
        let stale = dir.path().join("output_declarations.csv");
        fs::write(&stale, "stale").unwrap();

        let _ = run_with(&dir, &["017"], vec![Outcome::Terminal(403)]);
        assert!(!stale.exists());
    }
}
