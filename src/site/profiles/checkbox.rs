use std::collections::BTreeSet;

use super::description::{assemble_description, DescriptionParts, MediaWrap};
use super::{ProfileKind, SiteProfile};
use crate::site::mapping::MappedParams;
use crate::site::schema::TagSchema;

/// Tags become independent checkbox fields from a fixed table. MediaInfo
/// and BDInfo are folded into the description inside `[hide]` blocks.
pub struct CheckboxTags {
    table: Vec<(&'static str, &'static str)>,
}

impl Default for CheckboxTags {
    fn default() -> Self {
        Self {
            table: vec![
                ("tag.禁转", "jinzhuan"),
                ("tag.官方", "guanfang"),
                ("tag.国语", "guoyu"),
                ("tag.粤语", "yueyu"),
                ("tag.中字", "zhongzi"),
                ("tag.英字", "ensub"),
                ("tag.应求", "yingqiu"),
                ("tag.DIY", "diy"),
                ("tag.原创", "pr"),
                ("tag.自购", "bim"),
                ("tag.MV母盘", "mp"),
            ],
        }
    }
}

impl SiteProfile for CheckboxTags {
    fn kind(&self) -> ProfileKind {
        ProfileKind::CheckboxTags
    }

    fn handle_tags(&self, tags: &BTreeSet<String>, schema: &TagSchema) -> MappedParams {
        tags.iter()
            .chain(schema.implicit.iter())
            .filter_map(|tag| self.table.iter().find(|(t, _)| *t == tag.as_str()))
            .map(|(_, field)| (field.to_string(), schema.checked_value.clone()))
            .collect()
    }

    fn build_description(&self, parts: &DescriptionParts) -> String {
        assemble_description(parts, MediaWrap::Hide)
    }
}
