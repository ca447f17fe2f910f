use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use crate::error::{Result, RosterError};
use crate::fetcher::{PageRequest, PagedFetcher};
use crate::types::{CollectionSelector, Member, Page};

const FIRST_NAMES: [&str; 12] = [
    "Asha", "Vikram", "Meera", "Arjun", "Kavita", "Rohan", "Sunita", "Dev", "Lata", "Naveen",
    "Pooja", "Satish",
];
const LAST_NAMES: [&str; 8] = [
    "Sharma", "Arya", "Verma", "Gupta", "Rao", "Joshi", "Patel", "Mehta",
];

/// In-memory directory used by `--demo`. Cursors are stringified offsets
/// into the (filtered) member list.
#[derive(Debug)]
pub struct Demo {
    members: Vec<Member>,
    latency: Duration,
}

impl Demo {
    pub fn new(members: Vec<Member>, latency: Duration) -> Self {
        Self { members, latency }
    }

    /// A generated directory of `count` members, newest first.
    pub fn generated(count: usize, latency: Duration) -> Self {
        let members = (0..count)
            .map(|i| {
                let first = FIRST_NAMES[i % FIRST_NAMES.len()];
                let last = LAST_NAMES[(i / FIRST_NAMES.len()) % LAST_NAMES.len()];
                Member {
                    id: format!("m{:04}", i + 1),
                    name: format!("{} {}", first, last),
                    phone_number: format!("98{:08}", 10_000_000 + i * 7919),
                    profile_image: String::new(),
                    email: format!("{}.{}{}@example.org", first, last, i).to_lowercase(),
                    joined_at: Utc
                        .timestamp_opt(1_700_000_000 - (i as i64) * 86_400, 0)
                        .single(),
                }
            })
            .collect();
        Self::new(members, latency)
    }

    /// Every third member belongs to a family.
    fn in_collection(index: usize, selector: CollectionSelector) -> bool {
        match selector {
            CollectionSelector::AllMembers => true,
            CollectionSelector::MembersNotInFamily => index % 3 != 0,
        }
    }

    fn page<'a>(
        &self,
        matching: impl Iterator<Item = &'a Member>,
        request: &PageRequest,
    ) -> Result<Page<Member>> {
        let offset = match &request.cursor {
            Some(cursor) => cursor
                .parse::<usize>()
                .map_err(|_| RosterError::Api(format!("invalid cursor: {}", cursor)))?,
            None => 0,
        };
        let limit = request.limit as usize;

        let mut rest = matching.skip(offset);
        let items: Vec<Member> = rest.by_ref().take(limit).cloned().collect();
        let has_next_page = rest.next().is_some();
        let end_cursor = Some((offset + items.len()).to_string());

        Ok(Page {
            items,
            has_next_page,
            end_cursor,
        })
    }
}

fn member_matches(member: &Member, needle: &str) -> bool {
    member.name.to_lowercase().contains(needle) || member.phone_number.contains(needle)
}

#[async_trait]
impl PagedFetcher<Member> for Demo {
    fn name(&self) -> &str {
        "demo"
    }

    async fn recent_page(&self, request: &PageRequest) -> Result<Page<Member>> {
        tokio::time::sleep(self.latency).await;
        let matching = self
            .members
            .iter()
            .enumerate()
            .filter(|(i, _)| Self::in_collection(*i, request.selector))
            .map(|(_, m)| m);
        self.page(matching, request)
    }

    async fn search_page(&self, query: &str, request: &PageRequest) -> Result<Page<Member>> {
        tokio::time::sleep(self.latency).await;
        let needle = query.trim().to_lowercase();
        let matching = self
            .members
            .iter()
            .enumerate()
            .filter(|(i, m)| Self::in_collection(*i, request.selector) && member_matches(m, &needle))
            .map(|(_, m)| m);
        self.page(matching, request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(limit: u32, cursor: Option<&str>, selector: CollectionSelector) -> PageRequest {
        PageRequest {
            limit,
            cursor: cursor.map(str::to_string),
            selector,
        }
    }

    #[tokio::test]
    async fn pages_through_all_members() {
        let demo = Demo::generated(5, Duration::ZERO);
        let all = CollectionSelector::AllMembers;

        let first = demo.recent_page(&request(2, None, all)).await.unwrap();
        assert_eq!(first.items.len(), 2);
        assert!(first.has_next_page);
        assert_eq!(first.end_cursor.as_deref(), Some("2"));

        let cursor = first.end_cursor.clone();
        let second = demo
            .recent_page(&request(3, cursor.as_deref(), all))
            .await
            .unwrap();
        assert_eq!(second.items.len(), 3);
        assert!(!second.has_next_page);
        assert_eq!(second.items[0].id, "m0003");
    }

    #[tokio::test]
    async fn not_in_family_skips_family_members() {
        let demo = Demo::generated(6, Duration::ZERO);
        let page = demo
            .recent_page(&request(10, None, CollectionSelector::MembersNotInFamily))
            .await
            .unwrap();
        let ids: Vec<&str> = page.items.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["m0002", "m0003", "m0005", "m0006"]);
    }

    #[tokio::test]
    async fn search_matches_name_case_insensitively() {
        let demo = Demo::generated(24, Duration::ZERO);
        let page = demo
            .search_page(" meera ", &request(10, None, CollectionSelector::AllMembers))
            .await
            .unwrap();
        assert_eq!(page.items.len(), 2);
        assert!(page.items.iter().all(|m| m.name.starts_with("Meera")));
        assert!(!page.has_next_page);
    }

    #[tokio::test]
    async fn search_matches_phone_digits() {
        let demo = Demo::generated(3, Duration::ZERO);
        let phone = demo.members[1].phone_number.clone();
        let page = demo
            .search_page(&phone, &request(10, None, CollectionSelector::AllMembers))
            .await
            .unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].id, "m0002");
    }

    #[tokio::test]
    async fn bad_cursor_is_an_error() {
        let demo = Demo::generated(3, Duration::ZERO);
        let err = demo
            .recent_page(&request(1, Some("abc"), CollectionSelector::AllMembers))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "API error: invalid cursor: abc");
    }
}
