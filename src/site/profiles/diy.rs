use std::collections::BTreeSet;
use tracing::info;

use super::{ProfileKind, SiteProfile};
use crate::site::mapping::MappedParams;
use crate::site::schema::{LogicalField, SiteSchema};

/// Rewrites a plain Blu-ray medium code to its DIY code when a DIY tag is
/// present. Other media are left alone.
pub struct DiyMedium {
    rewrites: Vec<(&'static str, &'static str)>,
}

impl Default for DiyMedium {
    fn default() -> Self {
        Self {
            // Blu-ray -> Blu-ray DIY, UHD Blu-ray -> UHD Blu-ray DIY
            rewrites: vec![("1", "13"), ("11", "12")],
        }
    }
}

impl SiteProfile for DiyMedium {
    fn kind(&self) -> ProfileKind {
        ProfileKind::DiyMedium
    }

    fn correct_fields(&self, mapped: &mut MappedParams, schema: &SiteSchema, tags: &BTreeSet<String>) {
        if !tags.iter().any(|t| t.to_uppercase().contains("DIY")) {
            return;
        }
        let Some(field) = schema.field_name(LogicalField::Medium) else {
            return;
        };
        let Some(current) = mapped.get_mut(field) else {
            return;
        };
        if let Some((from, to)) = self.rewrites.iter().find(|(from, _)| current.as_str() == *from) {
            info!("DIY tag present, medium {} -> {}", from, to);
            *current = to.to_string();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::site::schema::{FieldSchema, FieldTable};

    fn schema() -> SiteSchema {
        SiteSchema {
            site: "baozi".to_string(),
            fields: FieldTable {
                medium: Some(FieldSchema {
                    name: "medium_sel[4]".to_string(),
                    ..Default::default()
                }),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn corrected(medium: &str, tags: &[&str]) -> String {
        let mut mapped = MappedParams::new();
        mapped.insert("medium_sel[4]".to_string(), medium.to_string());
        let tags: BTreeSet<String> = tags.iter().map(|s| s.to_string()).collect();
        DiyMedium::default().correct_fields(&mut mapped, &schema(), &tags);
        mapped["medium_sel[4]"].clone()
    }

    #[test]
    fn test_bluray_rewritten() {
        assert_eq!(corrected("1", &["tag.DIY"]), "13");
        assert_eq!(corrected("11", &["tag.diy"]), "12");
    }

    #[test]
    fn test_without_diy_unchanged() {
        assert_eq!(corrected("1", &["tag.中字"]), "1");
        assert_eq!(corrected("11", &[]), "11");
    }

    #[test]
    fn test_other_medium_unchanged() {
        assert_eq!(corrected("7", &["tag.DIY"]), "7");
    }
}
