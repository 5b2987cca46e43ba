//! Signaling backends
//!
//! The watcher and the wait view talk to the platform only through
//! `SignalingBackend`. A backend acts on behalf of one signed-in user.

use async_trait::async_trait;
use ringline_core::{
    models::{CallRequest, NewCallRequest, Principal},
    AppResult,
};
use ringline_services::{AcceptOutcome, BanOutcome, CallRequestService};
use std::sync::Arc;
use uuid::Uuid;

#[async_trait]
pub trait SignalingBackend: Send + Sync {
    /// Place a call request as the signed-in caller
    async fn book(&self, booking: NewCallRequest) -> AppResult<CallRequest>;

    /// Ringing requests for the signed-in broadcaster, newest first
    async fn incoming(&self) -> AppResult<Vec<CallRequest>>;

    async fn fetch(&self, id: Uuid) -> AppResult<CallRequest>;

    async fn accept(&self, id: Uuid) -> AppResult<AcceptOutcome>;

    async fn reject(&self, id: Uuid) -> AppResult<CallRequest>;

    async fn ban(&self, id: Uuid) -> AppResult<BanOutcome>;

    async fn cancel(&self, id: Uuid) -> AppResult<CallRequest>;
}

/// In-process backend over the service layer
#[derive(Clone)]
pub struct LocalBackend {
    service: Arc<CallRequestService>,
    principal: Principal,
}

impl LocalBackend {
    pub fn new(service: Arc<CallRequestService>, principal: Principal) -> Self {
        Self { service, principal }
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }
}

#[async_trait]
impl SignalingBackend for LocalBackend {
    async fn book(&self, booking: NewCallRequest) -> AppResult<CallRequest> {
        self.service.book(&self.principal, booking).await
    }

    async fn incoming(&self) -> AppResult<Vec<CallRequest>> {
        self.service.incoming(&self.principal).await
    }

    async fn fetch(&self, id: Uuid) -> AppResult<CallRequest> {
        self.service.get(&self.principal, id).await
    }

    async fn accept(&self, id: Uuid) -> AppResult<AcceptOutcome> {
        self.service.accept(&self.principal, id).await
    }

    async fn reject(&self, id: Uuid) -> AppResult<CallRequest> {
        self.service.reject(&self.principal, id).await
    }

    async fn ban(&self, id: Uuid) -> AppResult<BanOutcome> {
        self.service.ban(&self.principal, id).await
    }

    async fn cancel(&self, id: Uuid) -> AppResult<CallRequest> {
        self.service.cancel(&self.principal, id).await
    }
}
