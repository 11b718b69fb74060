use tracing::warn;

use crate::error::DataError;

/// Handle for one in-flight request against a [`Resource`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket(u64);

/// Request state behind a view: the last loaded data, the last error and
/// whether a request is running. Only the most recent request may settle it;
/// a failure keeps the previously loaded data.
#[derive(Debug, Clone)]
pub struct Resource<T> {
    data: Option<T>,
    error: Option<DataError>,
    loading: bool,
    generation: u64,
}

impl<T> Default for Resource<T> {
    fn default() -> Self {
        Self { data: None, error: None, loading: false, generation: 0 }
    }
}

impl<T> Resource<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a request; any earlier ticket becomes stale
    pub fn begin(&mut self) -> Ticket {
        self.generation += 1;
        self.loading = true;
        self.error = None;
        Ticket(self.generation)
    }

    /// Settle the request behind `ticket`. Returns false, changing nothing,
    /// when a newer request has started or the resource was cancelled.
    pub fn finish(&mut self, ticket: Ticket, result: Result<T, DataError>) -> bool {
        if ticket.0 != self.generation {
            warn!(ticket = ticket.0, current = self.generation, "Dropping stale response");
            return false;
        }
        self.loading = false;
        match result {
            Ok(data) => {
                self.data = Some(data);
                self.error = None;
            }
            Err(err) => self.error = Some(err),
        }
        true
    }

    /// Abandon the running request, e.g. when the view goes away
    pub fn cancel(&mut self) {
        self.generation += 1;
        self.loading = false;
    }

    /// Run `load` and settle with its result in one step
    pub async fn load<F>(&mut self, load: F) -> bool
    where
        F: std::future::Future<Output = Result<T, DataError>>,
    {
        let ticket = self.begin();
        let result = load.await;
        self.finish(ticket, result)
    }

    pub fn data(&self) -> Option<&T> {
        self.data.as_ref()
    }

    pub fn error(&self) -> Option<&DataError> {
        self.error.as_ref()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }
}
