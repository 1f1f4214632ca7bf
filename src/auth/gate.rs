//! Layered authorization.
//!
//! # Stages
//! ```text
//! Authenticated  principal is not anonymous      else AuthenticationRequired
//!   → Activated  principal.activated             else AccountNotActivated
//!     → Permission(code) code ∈ permissions_for  else PermissionDenied
//! ```
//!
//! # Design Decisions
//! - A chain is an ordered list of gates, least privileged first
//! - Each stage implies the ones before it; the builder inserts them
//! - The first refusal short-circuits: later gates never run

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::auth::permissions::PermissionResolver;
use crate::auth::principal::Principal;
use crate::error::Error;
use crate::resilience::with_deadline;

/// Position of a gate in a chain. Lower stages run first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Authenticated,
    Activated,
    Permitted,
}

/// One check-and-continue-or-reject step.
#[async_trait]
pub trait Gate: Send + Sync {
    fn stage(&self) -> Stage;

    /// Identifies the gate in logs and for deduplication within a stage.
    fn name(&self) -> String;

    async fn check(&self, principal: &Principal) -> Result<(), Error>;
}

pub struct RequireAuthenticated;

#[async_trait]
impl Gate for RequireAuthenticated {
    fn stage(&self) -> Stage {
        Stage::Authenticated
    }

    fn name(&self) -> String {
        "authenticated".into()
    }

    async fn check(&self, principal: &Principal) -> Result<(), Error> {
        if principal.is_anonymous() {
            return Err(Error::AuthenticationRequired);
        }
        Ok(())
    }
}

pub struct RequireActivated;

#[async_trait]
impl Gate for RequireActivated {
    fn stage(&self) -> Stage {
        Stage::Activated
    }

    fn name(&self) -> String {
        "activated".into()
    }

    async fn check(&self, principal: &Principal) -> Result<(), Error> {
        if !principal.is_activated() {
            return Err(Error::AccountNotActivated);
        }
        Ok(())
    }
}

pub struct RequirePermission {
    code: String,
    resolver: Arc<dyn PermissionResolver>,
    timeout: Duration,
}

impl RequirePermission {
    pub fn new(code: impl Into<String>, resolver: Arc<dyn PermissionResolver>, timeout: Duration) -> Self {
        Self {
            code: code.into(),
            resolver,
            timeout,
        }
    }
}

#[async_trait]
impl Gate for RequirePermission {
    fn stage(&self) -> Stage {
        Stage::Permitted
    }

    fn name(&self) -> String {
        format!("permission:{}", self.code)
    }

    async fn check(&self, principal: &Principal) -> Result<(), Error> {
        let lookup = self.resolver.permissions_for(principal.id());
        let permissions = with_deadline("permission lookup", self.timeout, lookup).await?;
        if !permissions.include(&self.code) {
            return Err(Error::PermissionDenied);
        }
        Ok(())
    }
}

/// An ordered, immutable stack of gates.
#[derive(Clone)]
pub struct GateChain {
    gates: Arc<[Arc<dyn Gate>]>,
}

impl Default for GateChain {
    fn default() -> Self {
        GateChainBuilder::default().build()
    }
}

impl GateChain {
    pub fn builder() -> GateChainBuilder {
        GateChainBuilder::default()
    }

    pub fn is_empty(&self) -> bool {
        self.gates.is_empty()
    }

    /// Gate names in the order they run.
    pub fn names(&self) -> Vec<String> {
        self.gates.iter().map(|g| g.name()).collect()
    }

    /// Run every gate in order, stopping at the first refusal.
    pub async fn admit(&self, principal: &Principal) -> Result<(), Error> {
        for gate in self.gates.iter() {
            if let Err(err) = gate.check(principal).await {
                tracing::debug!(gate = %gate.name(), user = %principal.id(), error = %err, "Gate refused request");
                return Err(err);
            }
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct GateChainBuilder {
    gates: Vec<Arc<dyn Gate>>,
}

impl GateChainBuilder {
    pub fn authenticated(self) -> Self {
        self.gate(RequireAuthenticated)
    }

    pub fn activated(self) -> Self {
        self.authenticated().gate(RequireActivated)
    }

    pub fn permission(self, code: impl Into<String>, resolver: Arc<dyn PermissionResolver>, timeout: Duration) -> Self {
        self.activated()
            .gate(RequirePermission::new(code, resolver, timeout))
    }

    /// Add a gate as-is.
    pub fn gate<G: Gate + 'static>(mut self, gate: G) -> Self {
        let name = gate.name();
        if !self.gates.iter().any(|g| g.name() == name) {
            self.gates.push(Arc::new(gate));
        }
        self
    }

    pub fn build(mut self) -> GateChain {
        // Stable: gates within a stage keep their insertion order.
        self.gates.sort_by_key(|g| g.stage());
        GateChain {
            gates: self.gates.into(),
        }
    }
}
