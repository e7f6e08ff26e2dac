pub mod model;

use std::sync::Arc;

use futures::{Stream, TryStreamExt};
use thiserror::Error;
use tracing::debug;

use crate::audit::CancellationFlag;
use crate::retry::RetryPolicy;
use crate::service::{DescribePage, DescribeRequest, LogService, ServiceError};

pub use model::LogGroupRecord;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("log group catalog unavailable while fetching page {page}: {source}")]
    Unavailable {
        page: usize,
        #[source]
        source: ServiceError,
    },
}

pub type CatalogResult<T> = std::result::Result<T, CatalogError>;

enum Cursor {
    Start,
    Next { token: String, page: usize },
    Done,
}

/// Paginated view over every log group in the account.
///
/// Each call to [`LogGroupCatalog::pages`] or [`LogGroupCatalog::list_all`]
/// enumerates from scratch. No deduplication is done across pages.
#[derive(Clone)]
pub struct LogGroupCatalog {
    service: Arc<dyn LogService>,
    retry: RetryPolicy,
    name_prefix: Option<String>,
    page_limit: Option<u32>,
}

impl LogGroupCatalog {
    pub fn new(service: Arc<dyn LogService>, retry: RetryPolicy) -> Self {
        Self {
            service,
            retry,
            name_prefix: None,
            page_limit: None,
        }
    }

    pub fn with_name_prefix(mut self, prefix: Option<String>) -> Self {
        self.name_prefix = prefix.filter(|value| !value.is_empty());
        self
    }

    pub fn with_page_limit(mut self, limit: Option<u32>) -> Self {
        self.page_limit = limit;
        self
    }

    /// Once `flag` is set, page fetches and lookups fail with
    /// `ServiceError::Cancelled` instead of calling the service.
    pub fn with_cancellation(mut self, flag: CancellationFlag) -> Self {
        self.retry = self.retry.with_cancellation(flag);
        self
    }

    /// Lazily walks the listing one page at a time until the service stops
    /// returning a continuation token. The first failing page ends the stream.
    pub fn pages(&self) -> impl Stream<Item = CatalogResult<Vec<LogGroupRecord>>> + '_ {
        futures::stream::try_unfold(Cursor::Start, move |cursor| async move {
            let (token, page) = match cursor {
                Cursor::Done => return Ok::<_, CatalogError>(None),
                Cursor::Start => (None, 1),
                Cursor::Next { token, page } => (Some(token), page),
            };
            let request = DescribeRequest {
                next_token: token,
                name_prefix: self.name_prefix.clone(),
                limit: self.page_limit,
            };
            let fetched = self
                .describe(request, "describe_log_groups")
                .await
                .map_err(|source| CatalogError::Unavailable { page, source })?;
            debug!(
                page,
                records = fetched.records.len(),
                more = fetched.next_token.is_some(),
                "fetched catalog page"
            );
            let next = match fetched.next_token {
                Some(token) if !token.is_empty() => Cursor::Next {
                    token,
                    page: page + 1,
                },
                _ => Cursor::Done,
            };
            Ok::<_, CatalogError>(Some((fetched.records, next)))
        })
    }

    pub async fn list_all(&self) -> CatalogResult<Vec<LogGroupRecord>> {
        let mut records = Vec::new();
        let mut pages = std::pin::pin!(self.pages());
        while let Some(page) = pages.try_next().await? {
            records.extend(page);
        }
        Ok(records)
    }

    /// Fresh, authoritative lookup of a single group by exact name.
    /// `Ok(None)` means the group does not exist anymore.
    pub async fn describe_one(
        &self,
        identifier: &str,
    ) -> Result<Option<LogGroupRecord>, ServiceError> {
        let mut token = None;
        loop {
            let request = DescribeRequest {
                next_token: token,
                name_prefix: Some(identifier.to_string()),
                limit: self.page_limit,
            };
            let page = self.describe(request, "describe_log_group").await?;
            if let Some(found) = page
                .records
                .into_iter()
                .find(|record| record.log_group_name == identifier)
            {
                return Ok(Some(found));
            }
            match page.next_token {
                Some(next) if !next.is_empty() => token = Some(next),
                _ => return Ok(None),
            }
        }
    }

    async fn describe(
        &self,
        request: DescribeRequest,
        operation: &str,
    ) -> Result<DescribePage, ServiceError> {
        let outcome = self
            .retry
            .run(operation, |_| {
                let service = Arc::clone(&self.service);
                let request = request.clone();
                async move { service.describe_log_groups(request).await }
            })
            .await?;
        Ok(outcome.result)
    }
}

impl std::fmt::Debug for LogGroupCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogGroupCatalog")
            .field("retry", &self.retry)
            .field("name_prefix", &self.name_prefix)
            .field("page_limit", &self.page_limit)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::InMemoryLogService;
    use proptest::prelude::*;

    fn groups(count: usize) -> Vec<LogGroupRecord> {
        (0..count)
            .map(|idx| LogGroupRecord::new(format!("/app/group-{idx:03}")))
            .collect()
    }

    fn catalog(service: Arc<InMemoryLogService>) -> LogGroupCatalog {
        LogGroupCatalog::new(service, RetryPolicy::none())
    }

    #[tokio::test]
    async fn empty_account_yields_empty_listing() {
        let service = Arc::new(InMemoryLogService::new(Vec::new()));
        let records = catalog(Arc::clone(&service)).list_all().await.unwrap();
        assert!(records.is_empty());
        assert_eq!(service.describe_calls(), 1);
    }

    #[tokio::test]
    async fn listing_is_complete_for_page_sizes_one_half_and_all() {
        let expected = groups(10);
        for page_size in [1, 5, 10] {
            let service =
                Arc::new(InMemoryLogService::new(expected.clone()).with_page_size(page_size));
            let records = catalog(Arc::clone(&service)).list_all().await.unwrap();
            assert_eq!(records, expected, "page size {page_size}");
            assert_eq!(service.describe_calls(), 10usize.div_ceil(page_size));
        }
    }

    #[tokio::test]
    async fn each_listing_restarts_from_scratch() {
        let service = Arc::new(InMemoryLogService::new(groups(4)).with_page_size(3));
        let catalog = catalog(Arc::clone(&service));
        let first = catalog.list_all().await.unwrap();
        let second = catalog.list_all().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(service.describe_calls(), 4);
    }

    #[tokio::test]
    async fn failing_page_surfaces_catalog_unavailable() {
        let service = Arc::new(
            InMemoryLogService::new(groups(6))
                .with_page_size(2)
                .fail_listing_page(2),
        );
        let err = catalog(service).list_all().await.unwrap_err();
        match err {
            CatalogError::Unavailable { page, source } => {
                assert_eq!(page, 2);
                assert!(source.is_retryable());
            }
        }
    }

    #[tokio::test]
    async fn transient_page_failure_is_retried() {
        let service = Arc::new(
            InMemoryLogService::new(groups(4))
                .with_page_size(2)
                .fail_listing_page_once(2),
        );
        let retry = RetryPolicy::new(&crate::config::RetrySection {
            max_attempts: 2,
            base_delay_ms: 0,
            max_delay_ms: 0,
            jitter_ms: 0,
        });
        let records = LogGroupCatalog::new(service, retry).list_all().await.unwrap();
        assert_eq!(records.len(), 4);
    }

    #[tokio::test]
    async fn name_prefix_narrows_the_listing() {
        let mut records = groups(3);
        records.push(LogGroupRecord::new("/aws/lambda/orders"));
        let service = Arc::new(InMemoryLogService::new(records));
        let listed = catalog(service)
            .with_name_prefix(Some("/aws/".into()))
            .list_all()
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].identifier(), "/aws/lambda/orders");
    }

    #[tokio::test]
    async fn describe_one_matches_exact_name_only() {
        let service = Arc::new(
            InMemoryLogService::new(vec![
                LogGroupRecord::new("/app/api-canary"),
                LogGroupRecord::new("/app/api").with_retention(14),
            ])
            .with_page_size(1),
        );
        let catalog = catalog(service);
        let found = catalog.describe_one("/app/api").await.unwrap().unwrap();
        assert_eq!(found.retention_in_days, Some(14));
        assert!(catalog.describe_one("/app/gone").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn cancelled_lookup_sends_nothing() {
        let service = Arc::new(InMemoryLogService::new(groups(5)).with_page_size(1));
        let flag = CancellationFlag::new();
        let catalog = catalog(Arc::clone(&service)).with_cancellation(flag.clone());
        assert!(catalog.describe_one("/app/group-000").await.unwrap().is_some());
        let calls_before = service.describe_calls();

        flag.cancel();
        let err = catalog.describe_one("/app/group-004").await.unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(service.describe_calls(), calls_before);
    }

    proptest! {
        #[test]
        fn proptest_listing_is_independent_of_partitioning(
            count in 0usize..40,
            page_size in 1usize..12,
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            let expected = groups(count);
            let service = Arc::new(InMemoryLogService::new(expected.clone()).with_page_size(page_size));
            let listed = runtime.block_on(catalog(service).list_all()).unwrap();
            prop_assert_eq!(listed, expected);
        }
    }
}
