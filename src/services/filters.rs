//! Mandatory content rules applied to every candidate before ranking
use crate::{
    error::{AppError, AppResult},
    models::CandidateItem,
};

/// Original languages a session may show
pub const ALLOWED_LANGUAGES: [&str; 8] = ["en", "es", "fr", "it", "de", "pt", "ja", "ko"];

/// One pure stage of the filter pipeline
pub trait CandidateFilter: Send + Sync {
    fn name(&self) -> &'static str;

    fn accepts(&self, item: &CandidateItem) -> bool;
}

pub struct LanguageAllowList;

impl CandidateFilter for LanguageAllowList {
    fn name(&self) -> &'static str {
        "language_allow_list"
    }

    fn accepts(&self, item: &CandidateItem) -> bool {
        ALLOWED_LANGUAGES.contains(&item.original_language.as_str())
    }
}

pub struct DescriptionPresent;

impl CandidateFilter for DescriptionPresent {
    fn name(&self) -> &'static str {
        "description_present"
    }

    fn accepts(&self, item: &CandidateItem) -> bool {
        !item.overview.trim().is_empty()
    }
}

/// Ordered chain of filter stages
pub struct FilterPipeline {
    stages: Vec<Box<dyn CandidateFilter>>,
}

impl Default for FilterPipeline {
    fn default() -> Self {
        Self::new(vec![Box::new(LanguageAllowList), Box::new(DescriptionPresent)])
    }
}

impl FilterPipeline {
    pub fn new(stages: Vec<Box<dyn CandidateFilter>>) -> Self {
        Self { stages }
    }

    /// Runs every stage in order. An empty survivor set is a rule violation.
    pub fn apply(&self, mut items: Vec<CandidateItem>) -> AppResult<Vec<CandidateItem>> {
        for stage in &self.stages {
            let before = items.len();
            items.retain(|item| stage.accepts(item));

            tracing::debug!(
                stage = stage.name(),
                dropped = before - items.len(),
                kept = items.len(),
                "Filter stage applied"
            );
        }

        if items.is_empty() {
            return Err(AppError::BusinessRule(
                "no items satisfy mandatory content rules".to_string(),
            ));
        }

        Ok(items)
    }
}
