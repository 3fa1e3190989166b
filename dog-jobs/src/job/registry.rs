use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;

use crate::{QueueResult, QueueError, Job, JobError, job::JobContext};

/// Type-erased job handler for runtime dispatch
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Execute a job payload, returning an optional result to keep on the record
    async fn handle(
        &self,
        payload: serde_json::Value,
        job: JobContext,
    ) -> Result<Option<serde_json::Value>, JobError>;

    /// Execution deadline for this job type
    fn timeout(&self) -> Option<Duration> {
        None
    }
}

/// Handler for a typed `Job`, bound to its context at registration
struct TypedJobHandler<J: Job> {
    context: J::Context,
    _phantom: PhantomData<fn() -> J>,
}

#[async_trait]
impl<J: Job> JobHandler for TypedJobHandler<J> {
    async fn handle(
        &self,
        payload: serde_json::Value,
        job: JobContext,
    ) -> Result<Option<serde_json::Value>, JobError> {
        let typed: J = serde_json::from_value(payload)?;
        let output = typed.execute(self.context.clone(), &job).await?;

        let result = serde_json::to_value(&output)
            .map_err(|e| JobError::Permanent(format!("Failed to serialize result: {}", e)))?;

        Ok(match result {
            serde_json::Value::Null => None,
            value => Some(value),
        })
    }

    fn timeout(&self) -> Option<Duration> {
        J::TIMEOUT
    }
}

/// Handler built from an async closure over the raw payload
pub struct FnHandler<F> {
    f: F,
    timeout: Option<Duration>,
}

impl<F, Fut> FnHandler<F>
where
    F: Fn(serde_json::Value, JobContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<serde_json::Value>, JobError>> + Send + 'static,
{
    pub fn new(f: F) -> Self {
        Self { f, timeout: None }
    }

    /// Set the execution deadline
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[async_trait]
impl<F, Fut> JobHandler for FnHandler<F>
where
    F: Fn(serde_json::Value, JobContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<serde_json::Value>, JobError>> + Send + 'static,
{
    async fn handle(
        &self,
        payload: serde_json::Value,
        job: JobContext,
    ) -> Result<Option<serde_json::Value>, JobError> {
        (self.f)(payload, job).await
    }

    fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

/// Registry mapping job types to their handlers
#[derive(Clone, Default)]
pub struct JobRegistry {
    handlers: HashMap<String, Arc<dyn JobHandler>>,
}

impl JobRegistry {
    /// Create a new job registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a typed job with the context its executions receive
    pub fn register<J: Job>(&mut self, context: J::Context) -> QueueResult<()> {
        self.register_handler(
            J::JOB_TYPE,
            TypedJobHandler::<J> {
                context,
                _phantom: PhantomData,
            },
        )
    }

    /// Register an async closure for a job type
    pub fn register_fn<F, Fut>(&mut self, job_type: impl Into<String>, f: F) -> QueueResult<()>
    where
        F: Fn(serde_json::Value, JobContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<serde_json::Value>, JobError>> + Send + 'static,
    {
        self.register_handler(job_type, FnHandler::new(f))
    }

    /// Register any handler implementation
    pub fn register_handler(
        &mut self,
        job_type: impl Into<String>,
        handler: impl JobHandler + 'static,
    ) -> QueueResult<()> {
        let job_type = job_type.into();
        if self.handlers.contains_key(&job_type) {
            return Err(QueueError::JobTypeAlreadyRegistered(job_type));
        }

        self.handlers.insert(job_type, Arc::new(handler));
        Ok(())
    }

    /// Look up the handler for a job type
    pub fn get(&self, job_type: &str) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(job_type).cloned()
    }

    /// Check if a job type is registered
    pub fn is_registered(&self, job_type: &str) -> bool {
        self.handlers.contains_key(job_type)
    }

    /// Get all registered job types
    pub fn registered_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.handlers.keys().cloned().collect();
        types.sort();
        types
    }
}
