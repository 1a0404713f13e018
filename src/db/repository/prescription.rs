use rusqlite::{params, Connection, OptionalExtension};

use crate::db::DatabaseError;
use crate::models::*;

const SELECT_COLUMNS: &str =
    "SELECT id, file_name, extracted_text, medicines_json, timestamp_ms, is_pdf FROM prescriptions";

pub fn insert_prescription(
    conn: &Connection,
    record: &PrescriptionRecord,
) -> Result<(), DatabaseError> {
    let medicines_json = serde_json::to_string(&record.medicines)?;
    conn.execute(
        "INSERT INTO prescriptions (id, file_name, extracted_text, medicines_json, timestamp_ms, is_pdf)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            record.id,
            record.file_name,
            record.extracted_text,
            medicines_json,
            record.timestamp_millis,
            record.is_pdf as i32,
        ],
    )?;
    Ok(())
}

/// All saved prescriptions, most recent first.
pub fn get_all_prescriptions(conn: &Connection) -> Result<Vec<PrescriptionRecord>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "{SELECT_COLUMNS} ORDER BY timestamp_ms DESC, rowid DESC"
    ))?;

    let rows = stmt.query_map([], row_to_tuple)?;

    let mut records = Vec::new();
    for row in rows {
        records.push(tuple_to_record(row?)?);
    }
    Ok(records)
}

pub fn get_most_recent_prescription(
    conn: &Connection,
) -> Result<Option<PrescriptionRecord>, DatabaseError> {
    let row = conn
        .query_row(
            &format!("{SELECT_COLUMNS} ORDER BY timestamp_ms DESC, rowid DESC LIMIT 1"),
            [],
            row_to_tuple,
        )
        .optional()?;
    row.map(tuple_to_record).transpose()
}

/// Returns whether a row was removed; an unknown id is not an error.
pub fn delete_prescription(conn: &Connection, id: &str) -> Result<bool, DatabaseError> {
    let affected = conn.execute("DELETE FROM prescriptions WHERE id = ?1", params![id])?;
    Ok(affected > 0)
}

pub fn clear_prescriptions(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute("DELETE FROM prescriptions", [])?;
    Ok(())
}

/// Keep only the `keep` most recent prescriptions. Returns how many were evicted.
pub fn evict_old_prescriptions(conn: &Connection, keep: usize) -> Result<usize, DatabaseError> {
    let evicted = conn.execute(
        "DELETE FROM prescriptions WHERE id NOT IN (
             SELECT id FROM prescriptions ORDER BY timestamp_ms DESC, rowid DESC LIMIT ?1
         )",
        params![keep as i64],
    )?;
    Ok(evicted)
}

type PrescriptionRow = (String, String, String, String, i64, i32);

fn row_to_tuple(row: &rusqlite::Row<'_>) -> rusqlite::Result<PrescriptionRow> {
    Ok((
        row.get::<_, String>(0)?,
        row.get::<_, String>(1)?,
        row.get::<_, String>(2)?,
        row.get::<_, String>(3)?,
        row.get::<_, i64>(4)?,
        row.get::<_, i32>(5)?,
    ))
}

fn tuple_to_record(row: PrescriptionRow) -> Result<PrescriptionRecord, DatabaseError> {
    let (id, file_name, extracted_text, medicines_json, timestamp_millis, is_pdf) = row;
    Ok(PrescriptionRecord {
        id,
        file_name,
        extracted_text,
        medicines: serde_json::from_str(&medicines_json)?,
        timestamp_millis,
        is_pdf: is_pdf != 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;

    fn record(id: &str, ts: i64, medicines: Vec<Medicine>) -> PrescriptionRecord {
        PrescriptionRecord {
            id: id.into(),
            file_name: format!("{id}.jpg"),
            extracted_text: "{\"medicines\": []}".into(),
            medicines,
            timestamp_millis: ts,
            is_pdf: false,
        }
    }

    #[test]
    fn insert_and_read_back_medicines() {
        let conn = open_memory_database().unwrap();
        let meds = vec![
            Medicine::new("Paracetamol", WhenToTake::Morning, 1),
            Medicine::new("Ibuprofen", WhenToTake::Evening, 2),
        ];
        insert_prescription(&conn, &record("rx-1", 1_000, meds.clone())).unwrap();

        let all = get_all_prescriptions(&conn).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].medicines, meds);
        assert!(!all[0].is_pdf);
    }

    #[test]
    fn ordered_most_recent_first() {
        let conn = open_memory_database().unwrap();
        insert_prescription(&conn, &record("old", 1_000, vec![])).unwrap();
        insert_prescription(&conn, &record("new", 3_000, vec![])).unwrap();
        insert_prescription(&conn, &record("mid", 2_000, vec![])).unwrap();

        let ids: Vec<String> = get_all_prescriptions(&conn)
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["new", "mid", "old"]);
        assert_eq!(get_most_recent_prescription(&conn).unwrap().unwrap().id, "new");
    }

    #[test]
    fn most_recent_on_empty_table_is_none() {
        let conn = open_memory_database().unwrap();
        assert!(get_most_recent_prescription(&conn).unwrap().is_none());
    }

    #[test]
    fn eviction_keeps_newest() {
        let conn = open_memory_database().unwrap();
        for i in 0..5 {
            insert_prescription(&conn, &record(&format!("rx-{i}"), i, vec![])).unwrap();
        }
        let evicted = evict_old_prescriptions(&conn, 3).unwrap();
        assert_eq!(evicted, 2);

        let ids: Vec<String> = get_all_prescriptions(&conn)
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["rx-4", "rx-3", "rx-2"]);
    }

    #[test]
    fn delete_reports_whether_a_row_went() {
        let conn = open_memory_database().unwrap();
        insert_prescription(&conn, &record("a", 1, vec![])).unwrap();
        assert!(!delete_prescription(&conn, "missing").unwrap());
        assert!(delete_prescription(&conn, "a").unwrap());
        assert!(get_all_prescriptions(&conn).unwrap().is_empty());
    }

    #[test]
    fn clear_removes_everything() {
        let conn = open_memory_database().unwrap();
        insert_prescription(&conn, &record("a", 1, vec![])).unwrap();
        insert_prescription(&conn, &record("b", 2, vec![])).unwrap();
        clear_prescriptions(&conn).unwrap();
        assert!(get_all_prescriptions(&conn).unwrap().is_empty());
    }

    #[test]
    fn malformed_medicines_column_is_json_error() {
        let conn = open_memory_database().unwrap();
        conn.execute(
            "INSERT INTO prescriptions (id, file_name, extracted_text, medicines_json, timestamp_ms, is_pdf)
             VALUES ('bad', 'x.jpg', '', 'not json', 1, 0)",
            [],
        )
        .unwrap();
        let err = get_all_prescriptions(&conn).unwrap_err();
        assert!(matches!(err, DatabaseError::Json(_)));
    }
}
