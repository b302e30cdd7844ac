use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::{anyhow, Result};

use crate::decision::OverallVerificationOutcome;
use crate::template::Modality;

/// Persistence collaborator. Templates travel as encoded text (see [`crate::codec`]).
pub trait TemplateStore: Send + Sync {
    fn lookup_template(&self, person: &str, modality: Modality) -> Result<Option<String>>;

    fn persist_template(&self, person: &str, modality: Modality, encoded: &str) -> Result<()>;

    fn persist_outcome(&self, person: &str, outcome: &OverallVerificationOutcome) -> Result<()>;
}

/// Process-local store, used by tests and by callers that persist elsewhere.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    templates: Mutex<HashMap<(String, Modality), String>>,
    outcomes: Mutex<Vec<(String, OverallVerificationOutcome)>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn outcomes(&self) -> Vec<(String, OverallVerificationOutcome)> {
        self.outcomes
            .lock()
            .map(|o| o.clone())
            .unwrap_or_default()
    }

    pub fn template_count(&self) -> usize {
        self.templates.lock().map(|t| t.len()).unwrap_or_default()
    }
}

impl TemplateStore for InMemoryStore {
    fn lookup_template(&self, person: &str, modality: Modality) -> Result<Option<String>> {
        let templates = self
            .templates
            .lock()
            .map_err(|_| anyhow!("template map poisoned"))?;
        Ok(templates.get(&(person.to_string(), modality)).cloned())
    }

    fn persist_template(&self, person: &str, modality: Modality, encoded: &str) -> Result<()> {
        self.templates
            .lock()
            .map_err(|_| anyhow!("template map poisoned"))?
            .insert((person.to_string(), modality), encoded.to_string());
        Ok(())
    }

    fn persist_outcome(&self, person: &str, outcome: &OverallVerificationOutcome) -> Result<()> {
        self.outcomes
            .lock()
            .map_err(|_| anyhow!("outcome log poisoned"))?
            .push((person.to_string(), outcome.clone()));
        Ok(())
    }
}
