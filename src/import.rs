use std::path::Path;

use anyhow::Context;

use crate::models::AttendanceRecord;
use crate::schema::{self, Rejection, ValidatedRecords};

/// Load dashboard rows from a saved export instead of the backend.
///
/// `.csv` files need a `turma,tipo,data,emocao` header; anything else is read
/// as the JSON array served by `/api/codigo/dashboard`.
pub fn load_records(path: &Path) -> anyhow::Result<ValidatedRecords> {
    let is_csv = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("csv"))
        .unwrap_or(false);

    if is_csv {
        let reader = csv::Reader::from_path(path)
            .with_context(|| format!("failed to open {}", path.display()))?;
        Ok(read_csv(reader))
    } else {
        let raw = std::fs::read(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let rows: Vec<serde_json::Value> = serde_json::from_slice(&raw)
            .with_context(|| format!("{} is not a JSON array of records", path.display()))?;
        Ok(schema::validate_records(rows))
    }
}

fn read_csv<R: std::io::Read>(mut reader: csv::Reader<R>) -> ValidatedRecords {
    let mut validated = ValidatedRecords::default();

    for (index, result) in reader.deserialize::<AttendanceRecord>().enumerate() {
        match result {
            Ok(record) => validated.records.push(record),
            Err(err) => validated.rejected.push(Rejection {
                index,
                reason: err.to_string(),
            }),
        }
    }

    if !validated.rejected.is_empty() {
        tracing::warn!(
            rejected = validated.rejected.len(),
            accepted = validated.records.len(),
            "csv rows failed schema validation"
        );
    }
    validated
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code_store::tests::scratch_dir;

    #[test]
    fn csv_rows_validate_individually() {
        let data = "turma,tipo,data,emocao\n\
                    3A,CHECKIN,05/01/2024 08:00,1\n\
                    3A,CHECKOUT,05/01/2024 11:40,feliz\n\
                    2B,CHECKIN,06/01/2024 08:05,9\n";
        let validated = read_csv(csv::Reader::from_reader(data.as_bytes()));
        assert_eq!(validated.records.len(), 2);
        assert_eq!(validated.records[1].class_label, "2B");
        assert_eq!(validated.rejected.len(), 1);
        assert_eq!(validated.rejected[0].index, 1);
    }

    #[test]
    fn json_files_go_through_the_schema() {
        let dir = scratch_dir();
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("dashboard.json");
        std::fs::write(
            &path,
            concat!(
                r#"[{"turma":"3A","tipo":"CHECKIN","data":"05/01/2024 08:00","emocao":2},"#,
                r#"{"turma":"3A"}]"#,
            ),
        )
        .unwrap();

        let validated = load_records(&path).unwrap();
        assert_eq!(validated.records.len(), 1);
        assert_eq!(validated.rejected.len(), 1);

        std::fs::write(&path, r#"{"turma":"3A"}"#).unwrap();
        assert!(load_records(&path).is_err());
        std::fs::remove_dir_all(&dir).ok();
    }
}
