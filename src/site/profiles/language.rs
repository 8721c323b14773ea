use std::collections::BTreeSet;

use super::{ProfileKind, SiteProfile};
use crate::site::mapping::{encode_tags, MappedParams};
use crate::site::schema::TagSchema;

/// Drops a secondary language tag when any dominant one is present.
pub struct LanguagePriority {
    dominant: Vec<&'static str>,
    secondary: &'static str,
}

impl Default for LanguagePriority {
    fn default() -> Self {
        Self {
            dominant: vec!["tag.国语", "tag.中字", "tag.粤语"],
            secondary: "tag.英语",
        }
    }
}

impl LanguagePriority {
    pub fn filter(&self, tags: &BTreeSet<String>) -> BTreeSet<String> {
        let dominant = self.dominant.iter().any(|t| tags.contains(*t));
        tags.iter()
            .filter(|t| !(dominant && t.as_str() == self.secondary))
            .cloned()
            .collect()
    }
}

impl SiteProfile for LanguagePriority {
    fn kind(&self) -> ProfileKind {
        ProfileKind::LanguagePriority
    }

    fn handle_tags(&self, tags: &BTreeSet<String>, schema: &TagSchema) -> MappedParams {
        encode_tags(&self.filter(tags), schema)
    }
}
