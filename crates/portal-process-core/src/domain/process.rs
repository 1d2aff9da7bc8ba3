use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::process_step::ProcessStep;

/// Value object: Process ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProcessId(pub Uuid);

impl ProcessId {
    /// Generate a new random process ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ProcessId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Value object: opaque optimistic-concurrency token of a process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProcessVersion(pub Uuid);

impl ProcessVersion {
    /// Generate a fresh version token
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ProcessVersion {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ProcessVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Value object: Application ID (the onboarding application a checklist belongs to)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ApplicationId(pub Uuid);

impl ApplicationId {
    /// Generate a new random application ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ApplicationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Value object: identity of the user or service account that made a change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EditorId(pub Uuid);

impl fmt::Display for EditorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

coded_enum! {
    /// Kind of workflow a process runs. Immutable after creation.
    pub enum ProcessType {
        /// Company application checklist (registration to activation)
        ApplicationChecklist => "APPLICATION_CHECKLIST",
        /// Offer subscription provisioning
        OfferSubscription => "OFFER_SUBSCRIPTION",
        /// Partner registration via onboarding service provider
        PartnerRegistration => "PARTNER_REGISTRATION",
        /// DIM technical user lifecycle
        DimTechnicalUser => "DIM_TECHNICAL_USER",
        /// Self-description document creation
        SelfDescriptionCreation => "SELF_DESCRIPTION_CREATION",
        /// Identity provider synchronisation and cleanup
        IdentityProviderProvisioning => "IDENTITY_PROVIDER_PROVISIONING",
        /// Company invitation
        Invitation => "INVITATION",
        /// Outgoing mail delivery
        Mailing => "MAILING",
    }
}

coded_enum! {
    /// Lifecycle flag of a process
    pub enum ProcessStatus {
        /// Steps may be claimed and executed
        Active => "ACTIVE",
        /// Cancelled by an operator; outstanding steps are aborted on next visit
        Cancelled => "CANCELLED",
        /// A step failed without possibility of retry
        Failed => "FAILED",
    }
}

/// Aggregate: Process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Process {
    /// Unique identifier
    pub id: ProcessId,

    /// Workflow kind
    pub process_type: ProcessType,

    /// Lifecycle flag
    pub status: ProcessStatus,

    /// Optimistic-concurrency token, regenerated on every mutation
    pub version: ProcessVersion,

    /// Lease expiry; set while an executor works on the process
    pub lock_expiry_date: Option<DateTime<Utc>>,

    /// Application this process drives, if any
    pub application_id: Option<ApplicationId>,

    /// Creation timestamp
    pub date_created: DateTime<Utc>,
}

impl Process {
    /// Create a new active, unlocked process
    pub fn new(
        process_type: ProcessType,
        application_id: Option<ApplicationId>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ProcessId::new(),
            process_type,
            status: ProcessStatus::Active,
            version: ProcessVersion::new(),
            lock_expiry_date: None,
            application_id,
            date_created: now,
        }
    }

    /// Whether steps of this process may still be executed
    #[inline]
    pub fn is_active(&self) -> bool {
        self.status == ProcessStatus::Active
    }

    /// Whether a live lease is held at `now`
    #[inline]
    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        matches!(self.lock_expiry_date, Some(expiry) if expiry > now)
    }

    /// Regenerate the version token
    #[inline]
    pub fn bump_version(&mut self) {
        self.version = ProcessVersion::new();
    }

    /// Copy of this process leased until `now + lease`, with a new version
    pub fn locked(&self, now: DateTime<Utc>, lease: Duration) -> Self {
        let mut locked = self.clone();
        locked.lock_expiry_date = Some(now + lease);
        locked.bump_version();
        locked
    }

    /// Copy of this process with the lease cleared and a new version
    pub fn released(&self) -> Self {
        let mut released = self.clone();
        released.lock_expiry_date = None;
        released.bump_version();
        released
    }

    /// Copy of this process flagged with `status` and a new version
    pub fn with_status(&self, status: ProcessStatus) -> Self {
        let mut changed = self.clone();
        changed.status = status;
        changed.bump_version();
        changed
    }

    /// Whether no further step of this process will run
    pub fn is_terminal(&self, steps: &[ProcessStep]) -> bool {
        !self.is_active() || !steps.iter().any(ProcessStep::is_pending)
    }
}
