use anyhow::{Context, Result};
use biogate_engine::{Modality, OverallVerificationOutcome, TemplateStore, VerificationStatus};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

const TEMPLATES_FILE: &str = "templates.bin";
const OUTCOMES_FILE: &str = "outcomes.bin";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateRecord {
    pub id: String,
    pub modality: Modality,
    /// base64(JSON) text as produced by the engine codec.
    pub encoded: String,
    pub created_unix: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeRecord {
    pub id: String,
    pub status: VerificationStatus,
    pub face_matched: bool,
    pub fingerprint_matched: bool,
    pub message: String,
    /// Full outcome as JSON.
    pub detail: String,
    pub created_unix: u64,
}

/// Per-person directories holding postcard-encoded record lists.
pub struct FileTemplateStore {
    root: PathBuf,
    // Serialises read-modify-write cycles on the record files.
    write_lock: Mutex<()>,
}

impl FileTemplateStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_lock: Mutex::new(()),
        }
    }

    fn person_dir(&self, person: &str) -> Result<PathBuf> {
        if person.is_empty()
            || person.contains(['/', '\\'])
            || person == "."
            || person == ".."
        {
            anyhow::bail!("invalid person id '{person}'");
        }
        Ok(self.root.join(person))
    }

    pub fn load_templates(&self, person: &str) -> Result<Vec<TemplateRecord>> {
        read_records(&self.person_dir(person)?.join(TEMPLATES_FILE))
    }

    pub fn load_outcomes(&self, person: &str) -> Result<Vec<OutcomeRecord>> {
        read_records(&self.person_dir(person)?.join(OUTCOMES_FILE))
    }

    pub fn purge(&self, person: &str) -> Result<()> {
        let path = self.person_dir(person)?;
        if path.exists() {
            std::fs::remove_dir_all(&path)
                .with_context(|| format!("removing {}", path.display()))?;
        }
        Ok(())
    }

    fn update<T, F>(&self, person: &str, file: &str, change: F) -> Result<()>
    where
        T: Serialize + for<'de> Deserialize<'de>,
        F: FnOnce(&mut Vec<T>),
    {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| anyhow::anyhow!("store lock poisoned"))?;
        let dir = self.person_dir(person)?;
        std::fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
        let path = dir.join(file);
        let mut records = read_records(&path)?;
        change(&mut records);
        let data = postcard::to_allocvec(&records)?;
        std::fs::write(&path, data).with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }
}

impl TemplateStore for FileTemplateStore {
    fn lookup_template(&self, person: &str, modality: Modality) -> Result<Option<String>> {
        Ok(self
            .load_templates(person)?
            .into_iter()
            .rev()
            .find(|r| r.modality == modality)
            .map(|r| r.encoded))
    }

    /// Re-enrolling a modality replaces its previous template.
    fn persist_template(&self, person: &str, modality: Modality, encoded: &str) -> Result<()> {
        let record = TemplateRecord {
            id: uuid::Uuid::new_v4().to_string(),
            modality,
            encoded: encoded.to_string(),
            created_unix: now_unix(),
        };
        self.update(person, TEMPLATES_FILE, |records: &mut Vec<TemplateRecord>| {
            records.retain(|r| r.modality != modality);
            records.push(record);
        })
    }

    fn persist_outcome(&self, person: &str, outcome: &OverallVerificationOutcome) -> Result<()> {
        let record = OutcomeRecord {
            id: uuid::Uuid::new_v4().to_string(),
            status: outcome.status,
            face_matched: outcome.face.verified(),
            fingerprint_matched: outcome.fingerprint.verified(),
            message: outcome.message().to_string(),
            detail: serde_json::to_string(outcome)?,
            created_unix: now_unix(),
        };
        self.update(person, OUTCOMES_FILE, |records: &mut Vec<OutcomeRecord>| {
            records.push(record)
        })
    }
}

fn read_records<T: for<'de> Deserialize<'de>>(file: &Path) -> Result<Vec<T>> {
    if !file.exists() {
        return Ok(vec![]);
    }
    let data = std::fs::read(file).with_context(|| format!("reading {}", file.display()))?;
    postcard::from_bytes(&data).with_context(|| format!("decoding {}", file.display()))
}

fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
