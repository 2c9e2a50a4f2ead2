//! Operation Context
//!
//! Contains metadata about the current operation for logging and tracing.

use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use uuid::Uuid;

use super::account::AccountId;

/// Context for an operation, carried into logs and handlers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationContext {
    /// Caller identity resolved by the upstream gateway
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caller: Option<AccountId>,

    /// Correlation ID for request tracing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<Uuid>,

    /// Client IP address
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_ip: Option<IpAddr>,
}

impl OperationContext {
    /// Create a new empty context
    pub fn new() -> Self {
        Self {
            caller: None,
            correlation_id: None,
            client_ip: None,
        }
    }

    /// Create context with the authenticated caller
    pub fn with_caller(mut self, caller: AccountId) -> Self {
        self.caller = Some(caller);
        self
    }

    /// Create context with correlation ID
    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    /// Create context with client IP
    pub fn with_client_ip(mut self, ip: IpAddr) -> Self {
        self.client_ip = Some(ip);
        self
    }
}

impl Default for OperationContext {
    fn default() -> Self {
        Self::new()
    }
}
