use std::sync::Arc;

use async_trait::async_trait;
use futures::future;
use futures::stream::{self, BoxStream, StreamExt};

use crate::error::Result;
use crate::types::{CollectionSelector, FetchEvent, Page};

/// Default number of items requested per page.
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Parameters shared by recent and search fetches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub limit: u32,
    pub cursor: Option<String>,
    pub selector: CollectionSelector,
}

pub type FetchStream<T> = BoxStream<'static, FetchEvent<T>>;

/// Backend that serves cursor-paginated pages of items.
#[async_trait]
pub trait PagedFetcher<T>: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &str;

    /// Most recent items of the selected collection.
    async fn recent_page(&self, request: &PageRequest) -> Result<Page<T>>;

    /// Items of the selected collection matching `query`.
    async fn search_page(&self, query: &str, request: &PageRequest) -> Result<Page<T>>;
}

/// Progress stream for a recent-items fetch: `Loading` followed by exactly
/// one `Success` or `Error`.
pub fn fetch_recent<T: Send + 'static>(
    fetcher: Arc<dyn PagedFetcher<T>>,
    request: PageRequest,
) -> FetchStream<T> {
    progress(async move { fetcher.recent_page(&request).await })
}

/// Progress stream for a search fetch.
pub fn fetch_search<T: Send + 'static>(
    fetcher: Arc<dyn PagedFetcher<T>>,
    query: String,
    request: PageRequest,
) -> FetchStream<T> {
    progress(async move { fetcher.search_page(&query, &request).await })
}

fn progress<T, F>(fetch: F) -> FetchStream<T>
where
    T: Send + 'static,
    F: std::future::Future<Output = Result<Page<T>>> + Send + 'static,
{
    let terminal = async move {
        match fetch.await {
            Ok(page) => FetchEvent::Success(page),
            Err(e) => FetchEvent::Error(e.to_string()),
        }
    };

    stream::once(future::ready(FetchEvent::Loading))
        .chain(stream::once(terminal))
        .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RosterError;

    #[derive(Debug)]
    struct Fixed {
        fail: bool,
    }

    #[async_trait]
    impl PagedFetcher<u32> for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn recent_page(&self, request: &PageRequest) -> Result<Page<u32>> {
            if self.fail {
                return Err(RosterError::Api("offline".into()));
            }
            Ok(Page {
                items: (0..request.limit).collect(),
                has_next_page: true,
                end_cursor: Some("c1".into()),
            })
        }

        async fn search_page(&self, query: &str, _request: &PageRequest) -> Result<Page<u32>> {
            Ok(Page::last(vec![query.len() as u32]))
        }
    }

    fn request() -> PageRequest {
        PageRequest {
            limit: 2,
            cursor: None,
            selector: CollectionSelector::AllMembers,
        }
    }

    #[tokio::test]
    async fn recent_stream_reports_loading_then_success() {
        let fetcher: Arc<dyn PagedFetcher<u32>> = Arc::new(Fixed { fail: false });
        let events: Vec<_> = fetch_recent(fetcher, request()).collect().await;
        assert_eq!(
            events,
            vec![
                FetchEvent::Loading,
                FetchEvent::Success(Page {
                    items: vec![0, 1],
                    has_next_page: true,
                    end_cursor: Some("c1".into()),
                }),
            ]
        );
    }

    #[tokio::test]
    async fn failures_become_error_events() {
        let fetcher: Arc<dyn PagedFetcher<u32>> = Arc::new(Fixed { fail: true });
        let events: Vec<_> = fetch_recent(fetcher, request()).collect().await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[1], FetchEvent::Error("API error: offline".into()));
    }

    #[tokio::test]
    async fn search_stream_passes_query_through() {
        let fetcher: Arc<dyn PagedFetcher<u32>> = Arc::new(Fixed { fail: false });
        let events: Vec<_> = fetch_search(fetcher, "abcd".into(), request()).collect().await;
        assert_eq!(events[1], FetchEvent::Success(Page::last(vec![4])));
    }
}
