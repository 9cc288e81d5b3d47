use std::collections::HashSet;
use std::future::Future;

use tracing::trace;

use crate::app::ports::{ConsumerProbe, RateLimiterPort};
use crate::error::{AggregatorError, Result};
use crate::types::Page;

/// Totals accumulated over every page of one listing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageTotals {
    pub count: u64,
    pub total_size: u64,
}

#[derive(Debug, Default)]
struct PageAccumulator {
    count: u64,
    total_size: u64,
    page_token: Option<String>,
}

impl PageAccumulator {
    fn add(&mut self, count: u64, size: u64) {
        self.count += count;
        self.total_size += size;
    }

    fn totals(&self) -> PageTotals {
        PageTotals {
            count: self.count,
            total_size: self.total_size,
        }
    }
}

/// Walks a paginated listing to exhaustion, one rate-limited fetch per page.
pub struct PageWalker<'a> {
    limiter: &'a dyn RateLimiterPort,
    probe: &'a dyn ConsumerProbe,
}

impl<'a> PageWalker<'a> {
    pub fn new(limiter: &'a dyn RateLimiterPort, probe: &'a dyn ConsumerProbe) -> Self {
        Self { limiter, probe }
    }

    /// Fetch pages until one comes back without a continuation token (absent or
    /// empty), adding each item's `(count, size)` contribution along the way.
    ///
    /// Fetch errors are returned as-is; nothing is retried here. A continuation
    /// token seen earlier in the same walk is a protocol violation, so cyclic
    /// listings end with [`AggregatorError::Pagination`].
    pub async fn walk<T, F, Fut, M>(&self, mut fetch_page: F, measure: M) -> Result<PageTotals>
    where
        F: FnMut(Option<String>) -> Fut,
        Fut: Future<Output = Result<Page<T>>>,
        M: Fn(&T) -> (u64, u64),
    {
        let mut acc = PageAccumulator::default();
        let mut pages = 0usize;
        let mut seen_tokens: HashSet<String> = HashSet::new();

        loop {
            if self.probe.is_disconnected() {
                return Err(AggregatorError::ConsumerDisconnected);
            }
            self.limiter.acquire().await?;

            let page = fetch_page(acc.page_token.take()).await?;
            pages += 1;
            crate::observability::metrics::content::page_fetched();

            for item in &page.items {
                let (count, size) = measure(item);
                acc.add(count, size);
            }
            trace!(page = pages, items = page.items.len(), running_count = acc.count, "Fetched page");

            match page.next_page_token.filter(|token| !token.is_empty()) {
                None => return Ok(acc.totals()),
                Some(next) if seen_tokens.contains(&next) => {
                    return Err(AggregatorError::Pagination(format!(
                        "page {} returned continuation token '{}' a second time",
                        pages, next
                    )));
                }
                Some(next) => {
                    seen_tokens.insert(next.clone());
                    acc.page_token = Some(next);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::ports::AlwaysConnected;
    use crate::pipeline::testing::{CountingLimiter, FlagProbe};
    use crate::types::ContentItem;
    use std::sync::Mutex;

    fn item(size: Option<u64>) -> ContentItem {
        ContentItem { size_bytes: size }
    }

    fn measure(item: &ContentItem) -> (u64, u64) {
        (1, item.size_bytes.unwrap_or(0))
    }

    #[tokio::test]
    async fn sums_every_page_until_token_runs_out() {
        let limiter = CountingLimiter::default();
        let walker = PageWalker::new(&limiter, &AlwaysConnected);
        let requested = Mutex::new(Vec::new());

        let totals = walker
            .walk(
                |token| {
                    requested.lock().unwrap().push(token.clone());
                    async move {
                        Ok::<_, AggregatorError>(match token.as_deref() {
                            None => Page::with_token(vec![item(Some(100)), item(None)], "p2"),
                            Some("p2") => Page::with_token(vec![item(Some(50))], "p3"),
                            _ => Page::last(vec![item(Some(7)), item(Some(3))]),
                        })
                    }
                },
                measure,
            )
            .await
            .unwrap();

        assert_eq!(totals, PageTotals { count: 5, total_size: 160 });
        assert_eq!(
            *requested.lock().unwrap(),
            vec![None, Some("p2".to_string()), Some("p3".to_string())]
        );
        assert_eq!(limiter.acquisitions(), 3);
    }

    #[tokio::test]
    async fn single_empty_page_yields_zero_totals() {
        let limiter = CountingLimiter::default();
        let walker = PageWalker::new(&limiter, &AlwaysConnected);
        let totals = walker
            .walk(|_| async { Ok::<_, AggregatorError>(Page::<ContentItem>::last(Vec::new())) }, measure)
            .await
            .unwrap();
        assert_eq!(totals, PageTotals::default());
        assert_eq!(limiter.acquisitions(), 1);
    }

    #[tokio::test]
    async fn empty_token_terminates_even_with_items() {
        let limiter = CountingLimiter::default();
        let walker = PageWalker::new(&limiter, &AlwaysConnected);
        let totals = walker
            .walk(|_| async { Ok::<_, AggregatorError>(Page::with_token(vec![item(Some(10))], "")) }, measure)
            .await
            .unwrap();
        assert_eq!(totals, PageTotals { count: 1, total_size: 10 });
    }

    #[tokio::test]
    async fn fetch_failure_surfaces_without_retry() {
        let limiter = CountingLimiter::default();
        let walker = PageWalker::new(&limiter, &AlwaysConnected);
        let calls = Mutex::new(0);

        let result = walker
            .walk(
                |token| {
                    *calls.lock().unwrap() += 1;
                    async move {
                        match token {
                            None => Ok(Page::with_token(vec![item(Some(1))], "next")),
                            Some(_) => Err(AggregatorError::service("content", "503 backend error")),
                        }
                    }
                },
                measure,
            )
            .await;

        assert!(matches!(result, Err(AggregatorError::Service { .. })));
        assert_eq!(*calls.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn repeated_token_is_a_protocol_violation() {
        let limiter = CountingLimiter::default();
        let walker = PageWalker::new(&limiter, &AlwaysConnected);
        let result = walker
            .walk(|_| async { Ok::<_, AggregatorError>(Page::with_token(vec![item(Some(1))], "same")) }, measure)
            .await;
        assert!(matches!(result, Err(AggregatorError::Pagination(_))));
        assert_eq!(limiter.acquisitions(), 2);
    }

    #[tokio::test]
    async fn two_token_cycle_is_a_protocol_violation() {
        let limiter = CountingLimiter::default();
        let walker = PageWalker::new(&limiter, &AlwaysConnected);
        let result = walker
            .walk(
                |token| async move {
                    let next = if token.as_deref() == Some("A") { "B" } else { "A" };
                    Ok::<_, AggregatorError>(Page::with_token(vec![item(Some(1))], next))
                },
                measure,
            )
            .await;
        assert!(matches!(result, Err(AggregatorError::Pagination(_))));
        // None -> A, A -> B, B -> A (already seen)
        assert_eq!(limiter.acquisitions(), 3);
    }

    #[tokio::test]
    async fn stops_before_fetching_once_consumer_is_gone() {
        let limiter = CountingLimiter::default();
        let probe = FlagProbe::default();
        probe.disconnect();
        let walker = PageWalker::new(&limiter, &probe);
        let result = walker
            .walk(|_| async { Ok::<_, AggregatorError>(Page::<ContentItem>::last(Vec::new())) }, measure)
            .await;
        assert!(matches!(result, Err(AggregatorError::ConsumerDisconnected)));
        assert_eq!(limiter.acquisitions(), 0);
    }
}
