//! In-memory collaborators for exercising the audit pipeline without a cloud account.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use crate::catalog::LogGroupRecord;
use crate::service::{DescribePage, DescribeRequest, IdentityService, LogService, ServiceError};

/// Scripted response for `put_retention_policy` on one log group.
#[derive(Debug, Clone)]
pub enum PutBehavior {
    /// The group disappears before the call lands.
    NotFound,
    /// Every call fails with the given error.
    Fail(ServiceError),
    /// The first call fails, later calls succeed.
    FailOnce(ServiceError),
    /// The first call takes effect but the caller sees the error.
    ApplyThenFail(ServiceError),
}

type PutHook = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Default)]
struct State {
    groups: BTreeMap<String, LogGroupRecord>,
    /// Retention reported by listings, overriding the live value.
    stale_listing: HashMap<String, Option<u32>>,
    put_behaviors: HashMap<String, PutBehavior>,
    failing_details: HashMap<String, ServiceError>,
    failing_page: Option<(usize, bool)>,
    puts: Vec<(String, u32)>,
}

/// Log service backed by a sorted map. Continuation tokens encode the page
/// number and the first name of the next page.
pub struct InMemoryLogService {
    state: Mutex<State>,
    page_size: usize,
    describe_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    put_delay: Duration,
    on_put: Option<PutHook>,
}

impl InMemoryLogService {
    pub fn new(records: Vec<LogGroupRecord>) -> Self {
        let groups = records
            .into_iter()
            .map(|record| (record.log_group_name.clone(), record))
            .collect();
        Self {
            state: Mutex::new(State {
                groups,
                ..State::default()
            }),
            page_size: 50,
            describe_calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            put_delay: Duration::ZERO,
            on_put: None,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_put_delay(mut self, delay: Duration) -> Self {
        self.put_delay = delay;
        self
    }

    /// Runs `hook` with the identifier on every `put_retention_policy` call.
    pub fn on_put(mut self, hook: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_put = Some(Arc::new(hook));
        self
    }

    /// Every attempt to fetch listing page `page` (1-based) fails.
    pub fn fail_listing_page(self, page: usize) -> Self {
        self.lock().failing_page = Some((page, false));
        self
    }

    /// The first attempt to fetch listing page `page` fails.
    pub fn fail_listing_page_once(self, page: usize) -> Self {
        self.lock().failing_page = Some((page, true));
        self
    }

    pub fn put_behavior(self, identifier: &str, behavior: PutBehavior) -> Self {
        self.lock()
            .put_behaviors
            .insert(identifier.to_string(), behavior);
        self
    }

    pub fn fail_detail(self, identifier: &str, error: ServiceError) -> Self {
        self.lock()
            .failing_details
            .insert(identifier.to_string(), error);
        self
    }

    /// Listings report `listed` for the group while lookups see the live value.
    pub fn stale_listing(self, identifier: &str, listed: Option<u32>) -> Self {
        self.lock()
            .stale_listing
            .insert(identifier.to_string(), listed);
        self
    }

    pub fn describe_calls(&self) -> usize {
        self.describe_calls.load(Ordering::SeqCst)
    }

    pub fn put_calls(&self) -> Vec<(String, u32)> {
        self.lock().puts.clone()
    }

    pub fn max_concurrent_puts(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// `None` when the group does not exist.
    pub fn retention_of(&self, identifier: &str) -> Option<Option<u32>> {
        self.lock()
            .groups
            .get(identifier)
            .map(|record| record.retention_in_days)
    }

    pub fn insert(&self, record: LogGroupRecord) {
        self.lock()
            .groups
            .insert(record.log_group_name.clone(), record);
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn decode_token(token: &str) -> Result<(usize, String), ServiceError> {
        let (page, start) = token.split_once(':').ok_or_else(|| ServiceError::Api {
            code: "InvalidParameterException".into(),
            message: format!("malformed token {token}"),
        })?;
        let page = page.parse::<usize>().map_err(|_| ServiceError::Api {
            code: "InvalidParameterException".into(),
            message: format!("malformed token {token}"),
        })?;
        Ok((page, start.to_string()))
    }
}

#[async_trait]
impl LogService for InMemoryLogService {
    async fn describe_log_groups(
        &self,
        request: DescribeRequest,
    ) -> Result<DescribePage, ServiceError> {
        self.describe_calls.fetch_add(1, Ordering::SeqCst);
        let (page, start) = match request.next_token.as_deref() {
            Some(token) => {
                let (page, start) = Self::decode_token(token)?;
                (page, Some(start))
            }
            None => (1, None),
        };

        let mut state = self.lock();
        let is_listing = request.name_prefix.is_none();
        if is_listing {
            if let Some((failing, once)) = state.failing_page {
                if failing == page {
                    if once {
                        state.failing_page = None;
                    }
                    return Err(ServiceError::Unavailable {
                        status: 503,
                        message: format!("page {page} unavailable"),
                    });
                }
            }
        } else if let Some(prefix) = request.name_prefix.as_deref() {
            if let Some(error) = state.failing_details.get(prefix) {
                return Err(error.clone());
            }
        }

        let prefix = request.name_prefix.clone().unwrap_or_default();
        let page_size = request
            .limit
            .map(|limit| limit as usize)
            .unwrap_or(self.page_size)
            .min(self.page_size)
            .max(1);
        let mut matching = state
            .groups
            .values()
            .filter(|record| record.log_group_name.starts_with(&prefix))
            .filter(|record| {
                start
                    .as_deref()
                    .map(|start| record.log_group_name.as_str() >= start)
                    .unwrap_or(true)
            })
            .cloned();

        let mut records: Vec<LogGroupRecord> = matching.by_ref().take(page_size).collect();
        let next_token = matching
            .next()
            .map(|next| format!("{}:{}", page + 1, next.log_group_name));
        if is_listing {
            for record in records.iter_mut() {
                if let Some(listed) = state.stale_listing.get(&record.log_group_name) {
                    record.retention_in_days = *listed;
                }
            }
        }
        Ok(DescribePage {
            records,
            next_token,
        })
    }

    async fn put_retention_policy(
        &self,
        identifier: &str,
        days: u32,
    ) -> Result<(), ServiceError> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        if let Some(hook) = &self.on_put {
            hook(identifier);
        }
        if !self.put_delay.is_zero() {
            tokio::time::sleep(self.put_delay).await;
        }
        let result = {
            let mut state = self.lock();
            state.puts.push((identifier.to_string(), days));
            let behavior = state.put_behaviors.get(identifier).cloned();
            match behavior {
                Some(PutBehavior::NotFound) => {
                    state.groups.remove(identifier);
                    Err(ServiceError::not_found(identifier))
                }
                Some(PutBehavior::Fail(error)) => Err(error),
                Some(PutBehavior::FailOnce(error)) => {
                    state.put_behaviors.remove(identifier);
                    Err(error)
                }
                Some(PutBehavior::ApplyThenFail(error)) => {
                    state.put_behaviors.remove(identifier);
                    if let Some(record) = state.groups.get_mut(identifier) {
                        record.retention_in_days = Some(days);
                    }
                    Err(error)
                }
                None => match state.groups.get_mut(identifier) {
                    Some(record) => {
                        record.retention_in_days = Some(days);
                        Ok(())
                    }
                    None => Err(ServiceError::not_found(identifier)),
                },
            }
        };
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// Identity service returning a fixed account or a fixed failure.
#[derive(Debug, Clone)]
pub struct StaticIdentity {
    account: Result<String, ServiceError>,
}

impl StaticIdentity {
    pub fn new(account: impl Into<String>) -> Self {
        Self {
            account: Ok(account.into()),
        }
    }

    pub fn failing(error: ServiceError) -> Self {
        Self {
            account: Err(error),
        }
    }
}

#[async_trait]
impl IdentityService for StaticIdentity {
    async fn caller_account_id(&self) -> Result<String, ServiceError> {
        self.account.clone()
    }
}
