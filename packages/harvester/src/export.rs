//! Output rows and CSV files.

use std::collections::HashMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::config::{RegistryKind, CONTACT_TYPE_EMAIL};
use crate::dates::{format_display, parse_date};
use crate::error::{HarvesterError, Result};
use crate::reference::ReferenceTable;
use crate::types::{Address, DetailRecord, ListItem};

/// Separator between regulation names in the `ТРТС` column.
const REGULATION_SEPARATOR: &str = "; ";

/// One exported record. Column headers are the ones the export's readers use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputRow {
    pub id: u64,
    pub link: String,
    #[serde(rename = "номер")]
    pub number: String,
    #[serde(rename = "статус")]
    pub status: String,
    #[serde(rename = "выпуск")]
    pub object_type: String,
    #[serde(rename = "схема")]
    pub scheme: String,
    #[serde(rename = "дата оформления")]
    pub reg_date: String,
    #[serde(rename = "дата окончания")]
    pub end_date: String,
    #[serde(rename = "полное наименование")]
    pub applicant_name: String,
    #[serde(rename = "фамилия")]
    pub surname: String,
    #[serde(rename = "имя")]
    pub first_name: String,
    #[serde(rename = "отчество")]
    pub patronymic: String,
    #[serde(rename = "должность")]
    pub head_position: String,
    #[serde(rename = "огрн")]
    pub ogrn: String,
    #[serde(rename = "почта")]
    pub email: String,
    #[serde(rename = "телефон1")]
    pub phone: String,
    #[serde(rename = "адрес")]
    pub applicant_address: String,
    #[serde(rename = "производитель")]
    pub manufacturer: String,
    #[serde(rename = "адрес производителя")]
    pub manufacturer_address: String,
    #[serde(rename = "продукция")]
    pub product: String,
    #[serde(rename = "ТРТС")]
    pub regulations: String,
}

/// Lookups shared by every row of a run.
pub struct RowContext<'a> {
    pub kind: RegistryKind,
    pub status_labels: &'a HashMap<i64, String>,
    pub regulations: &'a ReferenceTable,
}

impl RowContext<'_> {
    /// Merge a listing item with its detail record.
    ///
    /// # Errors
    /// * `DateParse` when a listing date is malformed (tagged with the record id)
    /// * `UnknownRegulation` when the detail references an id outside the table
    pub fn build_row(&self, link: String, item: &ListItem, detail: &DetailRecord) -> Result<OutputRow> {
        let record = format!("record {}", item.id);
        let reg_date = parse_date(&item.reg_date)
            .map_err(|_| HarvesterError::date_in(&item.reg_date, &record))?;
        let end_date = parse_date(&item.end_date)
            .map_err(|_| HarvesterError::date_in(&item.end_date, &record))?;

        let regulations = self
            .regulations
            .display_names(item.id, &detail.id_technical_reglaments)?
            .join(REGULATION_SEPARATOR);

        let applicant = &detail.applicant;

        let scheme = if detail.scheme.is_empty() {
            String::new()
        } else {
            format!("{}{}", detail.scheme, self.kind.scheme_suffix())
        };

        Ok(OutputRow {
            id: item.id,
            link,
            number: item.number.clone(),
            status: item
                .id_status
                .and_then(|s| self.status_labels.get(&s).cloned())
                .unwrap_or_default(),
            object_type: item.object_type.clone(),
            scheme,
            reg_date: format_display(reg_date),
            end_date: format_display(end_date),
            applicant_name: clean_opt(applicant.full_name.as_deref()),
            surname: clean_opt(applicant.surname.as_deref()),
            first_name: clean_opt(applicant.first_name.as_deref()),
            patronymic: clean_opt(applicant.patronymic.as_deref()),
            head_position: clean_opt(applicant.head_position.as_deref()),
            ogrn: clean_opt(applicant.ogrn.as_deref()),
            email: clean_opt(applicant.contacts_of(&[CONTACT_TYPE_EMAIL]).next()),
            phone: clean_opt(applicant.contacts_of(self.kind.phone_contact_types()).next()),
            applicant_address: clean_opt(first_address(&applicant.addresses)),
            manufacturer: clean_opt(item.manufacturer_name.as_deref()),
            manufacturer_address: clean_opt(
                detail
                    .manufacturer
                    .addresses
                    .first()
                    .and_then(|a| a.full_address.as_deref()),
            ),
            product: clean_opt(detail.product.full_name.as_deref()),
            regulations,
        })
    }
}

/// First address that actually has text.
fn first_address(addresses: &[Address]) -> Option<&str> {
    addresses.iter().find_map(|a| a.full_address.as_deref())
}

/// Replace line breaks so each record stays on one spreadsheet row.
#[must_use]
pub fn clean_text(text: &str) -> String {
    text.replace(['\n', '\r'], " ")
}

fn clean_opt(text: Option<&str>) -> String {
    text.map(clean_text).unwrap_or_default()
}

/// Write rows as CSV with a header line.
///
/// Writes to a hidden temp file next to `path` and renames it into place.
pub fn write_csv<S: Serialize>(path: &Path, rows: &[S]) -> Result<PathBuf> {
    let dir = path.parent().unwrap_or(Path::new("."));
    fs::create_dir_all(dir)?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "export.csv".to_string());
    let temp_file = dir.join(format!(".{file_name}.tmp"));

    {
        let mut writer = csv::Writer::from_writer(File::create(&temp_file)?);
        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
        let file = writer
            .into_inner()
            .map_err(|e| HarvesterError::Io(e.into_error()))?;
        file.sync_all()?;
    }

    // On Windows, rename fails if the destination already exists
    #[cfg(target_os = "windows")]
    if path.exists() {
        fs::remove_file(path)?;
    }

    fs::rename(&temp_file, path)?;
    Ok(path.to_path_buf())
}

/// Delete files left by a previous run, if present.
pub fn remove_files(paths: &[PathBuf]) -> Result<()> {
    for path in paths {
        if path.is_file() {
            fs::remove_file(path)?;
            tracing::info!(path = %path.display(), "Removed previous output");
        }
    }
    Ok(())
}
