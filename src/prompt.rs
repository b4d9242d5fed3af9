//! # System prompts
//!
//! Every LLM fallback request starts with a system prompt chosen by business
//! type. Built-in prompts cover `healthcare`, `retail` and `finance`; anything
//! else (or no business type) gets a general-purpose prompt.
//!
//! Operators can replace a prompt by dropping a YAML template into the prompts
//! directory:
//!
//! ```text
//! <prompts_dir>/<business_type>.yaml
//! ```
//!
//! ```yaml
//! # prompts/retail.yaml
//! system_prompt: "You are the assistant of ABC Retail. Keep answers short."
//! ```
//!
//! ```rust
//! use bizbot::prompt::PromptBook;
//!
//! let prompts = PromptBook::builtin();
//! assert!(prompts.system_prompt_for(Some("healthcare")).contains("medical advice"));
//! ```

use serde::{Deserialize, Serialize};
use std::{collections::HashMap, error::Error, fs, path::Path};

const BASE_PROMPT: &str = "You are a helpful assistant for a business. \
Your answers should be concise, helpful, and professional. ";

const HEALTHCARE_PROMPT: &str = "This is a healthcare business. Remember to be empathetic and remind users \
that you cannot provide medical advice, diagnosis, or treatment recommendations. \
For specific medical concerns, always suggest consulting with a healthcare professional.";

const RETAIL_PROMPT: &str = "This is a retail business. Focus on helping customers with product information, \
order tracking, returns, and general shopping assistance. Be friendly and solution-oriented.";

const FINANCE_PROMPT: &str = "This is a financial services business. Be precise and clear in your responses. \
Remember to note that you cannot provide specific financial advice or investment recommendations. \
For personalized financial guidance, suggest consulting with a financial advisor.";

const GENERAL_PROMPT: &str = "Provide helpful, accurate information. If you don't know the answer to a question, \
acknowledge this and suggest how the user might find the information they're looking for.";

/// On-disk shape of a prompt override.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PromptTemplate {
    pub system_prompt: String,
}

/// The built-in system prompt for `business_type`.
pub fn builtin_prompt(business_type: Option<&str>) -> String {
    let suffix = match business_type {
        Some("healthcare") => HEALTHCARE_PROMPT,
        Some("retail") => RETAIL_PROMPT,
        Some("finance") => FINANCE_PROMPT,
        _ => GENERAL_PROMPT,
    };
    format!("{BASE_PROMPT}{suffix}")
}

/// Read a single prompt template file.
pub fn load_template(path: &Path) -> Result<PromptTemplate, Box<dyn Error>> {
    tracing::info!("Loading prompt template: {}", path.display());
    let content = fs::read_to_string(path)?;
    let template: PromptTemplate = serde_yaml::from_str(&content)?;
    Ok(template)
}

/// Built-in prompts plus per-business overrides.
#[derive(Debug, Clone, Default)]
pub struct PromptBook {
    overrides: HashMap<String, String>,
}

impl PromptBook {
    /// A book with no overrides.
    pub fn builtin() -> Self {
        Self::default()
    }

    /// Load every `*.yaml` / `*.yml` file in `dir` as an override keyed by its
    /// lower-cased file stem. Other files are ignored.
    ///
    /// # Errors
    /// The directory cannot be read, or a template is not valid YAML.
    pub fn load_dir(dir: &Path) -> Result<Self, Box<dyn Error>> {
        let mut book = Self::builtin();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            let is_yaml = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext == "yaml" || ext == "yml");
            if !is_yaml {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let template =
                load_template(&path).map_err(|e| format!("{}: {e}", path.display()))?;
            book.insert(stem, template.system_prompt);
        }
        Ok(book)
    }

    pub fn insert(&mut self, business_type: &str, system_prompt: impl Into<String>) {
        self.overrides
            .insert(business_type.trim().to_lowercase(), system_prompt.into());
    }

    pub fn system_prompt_for(&self, business_type: Option<&str>) -> String {
        business_type
            .and_then(|bt| self.overrides.get(bt))
            .cloned()
            .unwrap_or_else(|| builtin_prompt(business_type))
    }
}
