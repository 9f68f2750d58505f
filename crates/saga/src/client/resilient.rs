use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::ServiceName;

use super::{
    Bulkhead, BulkheadConfig, CircuitBreaker, CircuitBreakerConfig, CircuitState,
    CompensateRequest, CompensateResponse, NotifyRequest, NotifyResponse, Participant,
    ParticipantError, RetryPolicy, ServiceClient,
};

/// Per-participant guard settings. Every participant gets its own breaker
/// and bulkhead built from these values.
#[derive(Debug, Clone)]
pub struct ResilienceConfig {
    pub circuit_breaker: CircuitBreakerConfig,
    pub bulkhead: BulkheadConfig,
    pub retry: RetryPolicy,
    /// Upper bound for a single participant call. An expired call counts as
    /// a transport error.
    pub call_timeout: Duration,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            circuit_breaker: CircuitBreakerConfig::default(),
            bulkhead: BulkheadConfig::default(),
            retry: RetryPolicy::default(),
            call_timeout: Duration::from_secs(10),
        }
    }
}

struct GuardedParticipant {
    participant: Arc<dyn Participant>,
    breaker: CircuitBreaker,
    bulkhead: Bulkhead,
}

/// Why a guarded call produced no participant reply.
#[derive(Debug)]
enum CallFailure {
    NotRegistered,
    CircuitOpen(CircuitState),
    Overloaded,
    Failed(ParticipantError),
}

impl CallFailure {
    fn message(&self, service: ServiceName) -> String {
        match self {
            CallFailure::NotRegistered => format!("No participant registered for {service}"),
            CallFailure::CircuitOpen(state) => format!(
                "Circuit breaker is {state} for {}",
                service.display_name()
            ),
            CallFailure::Overloaded => {
                format!("Service {} is overloaded", service.display_name())
            }
            CallFailure::Failed(err) => format!("Service call failed: {err}"),
        }
    }

    fn label(&self) -> &'static str {
        match self {
            CallFailure::NotRegistered => "not_registered",
            CallFailure::CircuitOpen(_) => "circuit_open",
            CallFailure::Overloaded => "overloaded",
            CallFailure::Failed(_) => "error",
        }
    }
}

/// Calls participants through bulkhead, retry and circuit breaker, in that
/// order from the outside in.
///
/// Only transport errors are retried and counted against the breaker. A
/// business decline is a normal reply and is returned as is.
#[derive(Clone)]
pub struct ResilientServiceClient {
    services: Arc<HashMap<ServiceName, GuardedParticipant>>,
    retry: RetryPolicy,
    call_timeout: Duration,
}

/// Builder registering the participants a client can reach.
pub struct ResilientServiceClientBuilder {
    config: ResilienceConfig,
    services: HashMap<ServiceName, GuardedParticipant>,
}

impl ResilientServiceClientBuilder {
    /// Registers a participant under its own service name.
    pub fn participant<P: Participant + 'static>(mut self, participant: P) -> Self {
        let service = participant.service_name();
        self.services.insert(
            service,
            GuardedParticipant {
                participant: Arc::new(participant),
                breaker: CircuitBreaker::new(service, self.config.circuit_breaker.clone()),
                bulkhead: Bulkhead::new(&self.config.bulkhead),
            },
        );
        self
    }

    pub fn build(self) -> ResilientServiceClient {
        ResilientServiceClient {
            services: Arc::new(self.services),
            retry: self.config.retry,
            call_timeout: self.config.call_timeout,
        }
    }
}

impl ResilientServiceClient {
    pub fn builder(config: ResilienceConfig) -> ResilientServiceClientBuilder {
        ResilientServiceClientBuilder {
            config,
            services: HashMap::new(),
        }
    }

    /// Breaker state of a participant, if registered.
    pub fn circuit_state(&self, service: ServiceName) -> Option<CircuitState> {
        self.services.get(&service).map(|g| g.breaker.state())
    }

    /// Free bulkhead slots of a participant, if registered.
    pub fn available_permits(&self, service: ServiceName) -> Option<usize> {
        self.services
            .get(&service)
            .map(|g| g.bulkhead.available_permits())
    }

    async fn call<T, F, Fut>(
        &self,
        service: ServiceName,
        operation: &'static str,
        f: F,
    ) -> Result<T, CallFailure>
    where
        F: Fn(Arc<dyn Participant>) -> Fut,
        Fut: Future<Output = Result<T, ParticipantError>>,
    {
        let guarded = self
            .services
            .get(&service)
            .ok_or(CallFailure::NotRegistered)?;

        let _permit = guarded
            .bulkhead
            .acquire()
            .await
            .ok_or(CallFailure::Overloaded)?;

        let attempts = self.retry.attempts();
        let mut attempt = 1;
        loop {
            guarded
                .breaker
                .try_acquire()
                .map_err(CallFailure::CircuitOpen)?;

            let call = f(Arc::clone(&guarded.participant));
            let reply = tokio::time::timeout(self.call_timeout, call)
                .await
                .unwrap_or(Err(ParticipantError::Timeout(self.call_timeout)));
            match reply {
                Ok(reply) => {
                    guarded.breaker.record_success();
                    return Ok(reply);
                }
                Err(err) => {
                    guarded.breaker.record_failure();
                    tracing::warn!(
                        %service,
                        operation,
                        attempt,
                        error = %err,
                        "participant call failed"
                    );
                    if attempt >= attempts {
                        return Err(CallFailure::Failed(err));
                    }
                    tokio::time::sleep(self.retry.backoff(attempt)).await;
                    attempt += 1;
                }
            }
        }
    }

    fn record_outcome(service: ServiceName, operation: &'static str, outcome: &'static str) {
        metrics::counter!(
            "saga_participant_calls_total",
            "service" => service.as_str(),
            "operation" => operation,
            "outcome" => outcome
        )
        .increment(1);
    }
}

#[async_trait]
impl ServiceClient for ResilientServiceClient {
    async fn notify(&self, service: ServiceName, request: NotifyRequest) -> NotifyResponse {
        let request = &request;
        let result = self
            .call(service, "notify", |participant| async move {
                participant.notify(request).await
            })
            .await;

        match result {
            Ok(reply) => {
                let outcome = if reply.success { "success" } else { "declined" };
                Self::record_outcome(service, "notify", outcome);
                reply
            }
            Err(failure) => {
                Self::record_outcome(service, "notify", failure.label());
                NotifyResponse::failure(failure.message(service))
            }
        }
    }

    async fn compensate(
        &self,
        service: ServiceName,
        request: CompensateRequest,
    ) -> CompensateResponse {
        let request = &request;
        let result = self
            .call(service, "compensate", |participant| async move {
                participant.compensate(request).await
            })
            .await;

        match result {
            Ok(reply) => {
                let outcome = if reply.success { "success" } else { "declined" };
                Self::record_outcome(service, "compensate", outcome);
                reply
            }
            Err(failure) => {
                Self::record_outcome(service, "compensate", failure.label());
                CompensateResponse::failure(failure.message(service))
            }
        }
    }
}
