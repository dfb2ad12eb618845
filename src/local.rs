//! Local file-based record store. Serves as the required fallback when the
//! remote backend is unreachable, and as the whole store when no database
//! is configured. Submissions live in a JSON-lines file, settings in a
//! small JSON map; writes go through a temp file and rename so a crash
//! never leaves a half-written store behind.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::Result;
use crate::models::SubmissionRecord;
use crate::store::{
    apply_updates, guard_allows, select_index, FieldUpdates, RecordKey, RecordStore, WriteGuard,
};

pub struct LocalStore {
    dir: PathBuf,
}

impl LocalStore {
    pub fn new(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)?;
        Ok(LocalStore {
            dir: dir.to_path_buf(),
        })
    }

    fn records_path(&self) -> PathBuf {
        self.dir.join("submissions.jsonl")
    }

    fn settings_path(&self) -> PathBuf {
        self.dir.join("settings.json")
    }

    fn read_records(&self) -> Result<Vec<SubmissionRecord>> {
        let path = self.records_path();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let contents = fs::read_to_string(&path)?;
        let mut records = Vec::new();
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            records.push(serde_json::from_str(line)?);
        }
        Ok(records)
    }

    fn write_records(&self, records: &[SubmissionRecord]) -> Result<()> {
        let mut contents = String::new();
        for record in records {
            contents.push_str(&serde_json::to_string(record)?);
            contents.push('\n');
        }
        self.replace_file(&self.records_path(), &contents)
    }

    fn read_settings(&self) -> Result<HashMap<String, String>> {
        let path = self.settings_path();
        if !path.exists() {
            return Ok(HashMap::new());
        }
        Ok(serde_json::from_str(&fs::read_to_string(&path)?)?)
    }

    fn replace_file(&self, path: &Path, contents: &str) -> Result<()> {
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, contents)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

#[async_trait]
impl RecordStore for LocalStore {
    async fn insert(&self, record: &SubmissionRecord) -> Result<()> {
        let mut records = self.read_records()?;
        // same idempotency as the database's unique key
        let duplicate = records.iter().any(|r| {
            r.candidate_name == record.candidate_name && r.submitted_at == record.submitted_at
        });
        if !duplicate {
            records.push(record.clone());
            self.write_records(&records)?;
        }
        Ok(())
    }

    async fn find(&self, key: &RecordKey) -> Result<Option<SubmissionRecord>> {
        let records = self.read_records()?;
        Ok(select_index(&records, key).map(|i| records[i].clone()))
    }

    async fn list_all(&self) -> Result<Vec<SubmissionRecord>> {
        self.read_records()
    }

    async fn apply(
        &self,
        key: &RecordKey,
        updates: FieldUpdates,
        guard: WriteGuard,
    ) -> Result<bool> {
        // read-modify-write; the guard is re-checked here but not atomic
        // across processes, unlike the database path
        let mut records = self.read_records()?;
        let Some(index) = select_index(&records, key) else {
            return Ok(false);
        };
        if !guard_allows(&records[index].lock, &guard) {
            return Ok(false);
        }
        apply_updates(&mut records[index], updates);
        self.write_records(&records)?;
        Ok(true)
    }

    async fn get_setting(&self, key: &str) -> Result<Option<String>> {
        Ok(self.read_settings()?.get(key).cloned())
    }

    async fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        let mut settings = self.read_settings()?;
        settings.insert(key.to_string(), value.to_string());
        self.replace_file(&self.settings_path(), &serde_json::to_string_pretty(&settings)?)
    }
}
