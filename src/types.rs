use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which underlying member collection a fetch runs against.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
pub enum CollectionSelector {
    #[default]
    #[value(name = "all")]
    #[serde(rename = "all")]
    AllMembers,
    #[value(name = "not-in-family")]
    #[serde(rename = "not_in_family", alias = "not-in-family")]
    MembersNotInFamily,
}

impl CollectionSelector {
    pub fn toggled(self) -> Self {
        match self {
            CollectionSelector::AllMembers => CollectionSelector::MembersNotInFamily,
            CollectionSelector::MembersNotInFamily => CollectionSelector::AllMembers,
        }
    }
}

impl fmt::Display for CollectionSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CollectionSelector::AllMembers => write!(f, "All members"),
            CollectionSelector::MembersNotInFamily => write!(f, "Not in a family"),
        }
    }
}

/// Member profile as shown in the selector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: String,
    pub name: String,
    pub phone_number: String,
    pub profile_image: String,
    pub email: String,
    pub joined_at: Option<DateTime<Utc>>,
}

/// One cursor-paginated page. `has_next_page` is authoritative: a page may
/// be empty and still have a successor, or carry a cursor and be the last.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub has_next_page: bool,
    pub end_cursor: Option<String>,
}

impl<T> Page<T> {
    pub fn last(items: Vec<T>) -> Self {
        Self {
            items,
            has_next_page: false,
            end_cursor: None,
        }
    }
}

/// Progress of a single fetch: at least one `Loading`, then exactly one
/// terminal `Success` or `Error`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchEvent<T> {
    Loading,
    Success(Page<T>),
    Error(String),
}

impl<T> FetchEvent<T> {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, FetchEvent::Loading)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selector_toggles_between_collections() {
        assert_eq!(
            CollectionSelector::AllMembers.toggled(),
            CollectionSelector::MembersNotInFamily
        );
        assert_eq!(
            CollectionSelector::MembersNotInFamily.toggled(),
            CollectionSelector::AllMembers
        );
    }

    #[test]
    fn selector_parses_from_config_names() {
        #[derive(Deserialize)]
        struct Wrapper {
            collection: CollectionSelector,
        }
        let w: Wrapper = toml::from_str(r#"collection = "not_in_family""#).unwrap();
        assert_eq!(w.collection, CollectionSelector::MembersNotInFamily);
        let w: Wrapper = toml::from_str(r#"collection = "all""#).unwrap();
        assert_eq!(w.collection, CollectionSelector::AllMembers);
    }

    #[test]
    fn only_loading_is_non_terminal() {
        assert!(!FetchEvent::<u32>::Loading.is_terminal());
        assert!(FetchEvent::Success(Page::<u32>::last(vec![])).is_terminal());
        assert!(FetchEvent::<u32>::Error("boom".into()).is_terminal());
    }
}
