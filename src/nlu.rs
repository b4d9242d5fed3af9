//! # NLU export
//!
//! Builds Rasa NLU training data (`version: "3.1"`) from the stored intents so the
//! external dialogue engine can be retrained after operators edit phrases.
//!
//! ```yaml
//! version: '3.1'
//! nlu:
//! - intent: greet
//!   examples: |-
//!     - hi
//!     - hello
//! ```
//!
//! One entry is emitted per intent name. Tenants that share an intent name (every
//! tenant has a `greet`) are merged, keeping the first occurrence of each phrase.

use serde::Serialize;
use std::{error::Error, fs, path::Path};
use tracing::info;

use crate::models::BusinessIntent;

pub const NLU_VERSION: &str = "3.1";

/// Dialogue-engine intents that are not backed by a canned response.
const SPECIAL_INTENTS: &[(&str, &[&str])] = &[
    (
        "set_business_type",
        &[
            "My business type is [healthcare](business_type)",
            "I run a [retail](business_type) business",
            "I work in [finance](business_type)",
            "Change my business type to [healthcare](business_type)",
        ],
    ),
    (
        "request_intents",
        &[
            "What can you do?",
            "Show me the available intents",
            "List all the things you can help with",
        ],
    ),
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NluDocument {
    pub version: String,
    pub nlu: Vec<NluEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NluEntry {
    pub intent: String,
    /// Markdown list, one `- phrase` per line.
    pub examples: String,
}

impl NluEntry {
    fn from_phrases<S: AsRef<str>>(intent: &str, phrases: &[S]) -> Self {
        let examples = phrases
            .iter()
            .map(|p| format!("- {}", p.as_ref()))
            .collect::<Vec<_>>()
            .join("\n");
        Self {
            intent: intent.to_string(),
            examples,
        }
    }
}

/// Build the training document for `intents`, in first-seen intent order.
///
/// Intents without training phrases are skipped; the special dialogue intents
/// are appended last.
pub fn build_nlu_document(intents: &[BusinessIntent]) -> NluDocument {
    let mut merged: Vec<(&str, Vec<&str>)> = Vec::new();
    for intent in intents {
        let phrases = intent.training_phrases();
        if phrases.is_empty() {
            continue;
        }
        let index = match merged
            .iter()
            .position(|(name, _)| *name == intent.intent_name)
        {
            Some(index) => index,
            None => {
                merged.push((intent.intent_name.as_str(), Vec::new()));
                merged.len() - 1
            }
        };
        let slot = &mut merged[index].1;
        for phrase in phrases {
            if !slot.contains(&phrase) {
                slot.push(phrase);
            }
        }
    }

    let nlu = merged
        .iter()
        .map(|(name, phrases)| NluEntry::from_phrases(name, phrases))
        .chain(
            SPECIAL_INTENTS
                .iter()
                .map(|(name, phrases)| NluEntry::from_phrases(name, phrases)),
        )
        .collect();

    NluDocument {
        version: NLU_VERSION.to_string(),
        nlu,
    }
}

/// Serialise `document` as YAML to `path`, creating parent directories.
pub fn write_nlu_file(path: &Path, document: &NluDocument) -> Result<(), Box<dyn Error>> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let yaml = serde_yaml::to_string(document)?;
    fs::write(path, yaml)?;
    info!(
        "Wrote {} NLU intents to {}",
        document.nlu.len(),
        path.display()
    );
    Ok(())
}
