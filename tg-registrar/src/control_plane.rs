//! Load balancer control plane access.
//!
//! Follows the same shape as our other AWS wrappers: a small trait that the coordinator depends
//! on, a real implementation over the SDK client, and a manual mock that is always available for
//! tests. No retries happen here; the coordinator decides what a failure means.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use aws_sdk_elasticloadbalancingv2::error::{DisplayErrorContext, ProvideErrorMetadata};
use aws_sdk_elasticloadbalancingv2::types::TargetDescription;
use aws_sdk_elasticloadbalancingv2::Client as ElbSdkClient;

use crate::error::ApiError;
use crate::membership::{InstanceId, TargetGroupId};

#[async_trait]
pub trait TargetGroupClient: Send + Sync {
    /// Add the instance to the target group.
    async fn register(
        &self,
        instance_id: &InstanceId,
        target_group: &TargetGroupId,
    ) -> Result<(), ApiError>;

    /// Remove the instance from the target group.
    async fn deregister(
        &self,
        instance_id: &InstanceId,
        target_group: &TargetGroupId,
    ) -> Result<(), ApiError>;
}

#[async_trait]
impl<T: TargetGroupClient + ?Sized> TargetGroupClient for Arc<T> {
    async fn register(
        &self,
        instance_id: &InstanceId,
        target_group: &TargetGroupId,
    ) -> Result<(), ApiError> {
        (**self).register(instance_id, target_group).await
    }

    async fn deregister(
        &self,
        instance_id: &InstanceId,
        target_group: &TargetGroupId,
    ) -> Result<(), ApiError> {
        (**self).deregister(instance_id, target_group).await
    }
}

/// ELBv2 implementation.
pub struct ElbClient {
    client: ElbSdkClient,
}

impl ElbClient {
    pub fn new(client: ElbSdkClient) -> Self {
        Self { client }
    }
}

fn target_description(instance_id: &InstanceId) -> TargetDescription {
    TargetDescription::builder().id(instance_id.as_str()).build()
}

fn classify<E>(err: E) -> ApiError
where
    E: ProvideErrorMetadata + std::error::Error,
{
    ApiError::from_code(err.code(), DisplayErrorContext(&err).to_string())
}

#[async_trait]
impl TargetGroupClient for ElbClient {
    async fn register(
        &self,
        instance_id: &InstanceId,
        target_group: &TargetGroupId,
    ) -> Result<(), ApiError> {
        self.client
            .register_targets()
            .target_group_arn(target_group.as_str())
            .targets(target_description(instance_id))
            .send()
            .await
            .map_err(classify)?;

        Ok(())
    }

    async fn deregister(
        &self,
        instance_id: &InstanceId,
        target_group: &TargetGroupId,
    ) -> Result<(), ApiError> {
        self.client
            .deregister_targets()
            .target_group_arn(target_group.as_str())
            .targets(target_description(instance_id))
            .send()
            .await
            .map_err(classify)?;

        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Register,
    Deregister,
}

/// One recorded call against [`MockTargetGroupClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientCall {
    pub operation: Operation,
    pub instance_id: InstanceId,
    pub target_group: TargetGroupId,
}

impl ClientCall {
    pub fn register(instance_id: &str, target_group: &str) -> Self {
        Self {
            operation: Operation::Register,
            instance_id: InstanceId::new(instance_id),
            target_group: TargetGroupId::new(target_group),
        }
    }

    pub fn deregister(instance_id: &str, target_group: &str) -> Self {
        Self {
            operation: Operation::Deregister,
            instance_id: InstanceId::new(instance_id),
            target_group: TargetGroupId::new(target_group),
        }
    }
}

type CallHook = Arc<dyn Fn() + Send + Sync>;

/// Mock control plane for testing - always available, no conditional compilation needed.
///
/// Every call succeeds unless a failure was configured for that (operation, target group).
/// Clones share the call log, so a test can keep one clone and hand another to the coordinator.
#[derive(Clone, Default)]
pub struct MockTargetGroupClient {
    failures: HashMap<(Operation, String), ApiError>,
    hooks: HashMap<(Operation, String), CallHook>,
    calls: Arc<Mutex<Vec<ClientCall>>>,
}

impl MockTargetGroupClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `register` fail for the given target group.
    pub fn register_err(mut self, target_group: &str, error: ApiError) -> Self {
        self.failures
            .insert((Operation::Register, target_group.to_string()), error);
        self
    }

    /// Make `deregister` fail for the given target group.
    pub fn deregister_err(mut self, target_group: &str, error: ApiError) -> Self {
        self.failures
            .insert((Operation::Deregister, target_group.to_string()), error);
        self
    }

    /// Run `hook` while the given call is in flight, after it has been recorded.
    pub fn on_call(
        mut self,
        operation: Operation,
        target_group: &str,
        hook: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        self.hooks
            .insert((operation, target_group.to_string()), Arc::new(hook));
        self
    }

    /// All calls made so far, in order.
    pub fn calls(&self) -> Vec<ClientCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn calls_for(&self, operation: Operation) -> Vec<ClientCall> {
        self.calls()
            .into_iter()
            .filter(|call| call.operation == operation)
            .collect()
    }

    fn record(
        &self,
        operation: Operation,
        instance_id: &InstanceId,
        target_group: &TargetGroupId,
    ) -> Result<(), ApiError> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(ClientCall {
                operation,
                instance_id: instance_id.clone(),
                target_group: target_group.clone(),
            });

        let key = (operation, target_group.as_str().to_string());
        if let Some(hook) = self.hooks.get(&key) {
            hook();
        }

        match self.failures.get(&key) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl TargetGroupClient for MockTargetGroupClient {
    async fn register(
        &self,
        instance_id: &InstanceId,
        target_group: &TargetGroupId,
    ) -> Result<(), ApiError> {
        self.record(Operation::Register, instance_id, target_group)
    }

    async fn deregister(
        &self,
        instance_id: &InstanceId,
        target_group: &TargetGroupId,
    ) -> Result<(), ApiError> {
        self.record(Operation::Deregister, instance_id, target_group)
    }
}
