//! Closed catalog of process step types.
//!
//! Every step type belongs to exactly one [`ProcessType`]. Failed steps are
//! never retried in place; an operator enqueues the matching `RETRIGGER_*`
//! step instead, which re-enqueues the original step type when it runs.

use super::checklist::ChecklistEntryType;
use super::process::ProcessType;

coded_enum! {
    /// Step kind; decides the handler and the owning process type
    pub enum ProcessStepType {
        // application checklist
        /// Manual verification of the registration data
        VerifyRegistration => "VERIFY_REGISTRATION",
        /// Push the company to the business partner data pool
        CreateBusinessPartnerNumberPush => "CREATE_BUSINESS_PARTNER_NUMBER_PUSH",
        /// Poll the business partner data pool for the assigned number
        CreateBusinessPartnerNumberPull => "CREATE_BUSINESS_PARTNER_NUMBER_PULL",
        /// Operator entered the number manually
        CreateBusinessPartnerNumberManual => "CREATE_BUSINESS_PARTNER_NUMBER_MANUAL",
        /// Retry of the push
        RetriggerBusinessPartnerNumberPush => "RETRIGGER_BUSINESS_PARTNER_NUMBER_PUSH",
        /// Retry of the pull
        RetriggerBusinessPartnerNumberPull => "RETRIGGER_BUSINESS_PARTNER_NUMBER_PULL",
        /// Operator override of the assigned number
        OverrideBusinessPartnerNumber => "OVERRIDE_BUSINESS_PARTNER_NUMBER",
        /// Create the managed identity wallet
        CreateIdentityWallet => "CREATE_IDENTITY_WALLET",
        /// Retry of the wallet creation
        RetriggerIdentityWallet => "RETRIGGER_IDENTITY_WALLET",
        /// Request a DIM wallet
        CreateDimWallet => "CREATE_DIM_WALLET",
        /// Retry of the DIM wallet request
        RetriggerCreateDimWallet => "RETRIGGER_CREATE_DIM_WALLET",
        /// Await the DIM callback
        AwaitDimResponse => "AWAIT_DIM_RESPONSE",
        /// Validate the DID document returned by DIM
        ValidateDidDocument => "VALIDATE_DID_DOCUMENT",
        /// Retry of the DID validation
        RetriggerValidateDidDocument => "RETRIGGER_VALIDATE_DID_DOCUMENT",
        /// Request the BPN credential from the issuer
        RequestBpnCredential => "REQUEST_BPN_CREDENTIAL",
        /// Retry of the credential request
        RetriggerRequestBpnCredential => "RETRIGGER_REQUEST_BPN_CREDENTIAL",
        /// Await the issuer callback for the stored credential
        StoredBpnCredential => "STORED_BPN_CREDENTIAL",
        /// Submit the company to the clearing house
        StartClearingHouse => "START_CLEARING_HOUSE",
        /// Retry of the clearing house submission
        RetriggerClearingHouse => "RETRIGGER_CLEARING_HOUSE",
        /// Await the clearing house callback
        EndClearingHouse => "END_CLEARING_HOUSE",
        /// Operator forced clearing house approval
        StartOverrideClearingHouse => "START_OVERRIDE_CLEARING_HOUSE",
        /// Operator requested the clearing house override
        TriggerOverrideClearingHouse => "TRIGGER_OVERRIDE_CLEARING_HOUSE",
        /// Request the legal person self-description
        StartSelfDescriptionLp => "START_SELF_DESCRIPTION_LP",
        /// Retry of the self-description request
        RetriggerSelfDescriptionLp => "RETRIGGER_SELF_DESCRIPTION_LP",
        /// Await the self-description callback
        FinishSelfDescriptionLp => "FINISH_SELF_DESCRIPTION_LP",
        /// Activate the company and its users
        ActivateApplication => "ACTIVATE_APPLICATION",

        // offer subscription
        /// Notify the offer provider
        TriggerProvider => "TRIGGER_PROVIDER",
        /// Retry of the provider notification
        RetriggerProvider => "RETRIGGER_PROVIDER",
        /// Provider started the autosetup
        StartAutosetup => "START_AUTOSETUP",
        /// Create the subscription client
        OfferSubscriptionClientCreation => "OFFERSUBSCRIPTION_CLIENT_CREATION",
        /// Retry of the client creation
        RetriggerOfferSubscriptionClientCreation => "RETRIGGER_OFFERSUBSCRIPTION_CLIENT_CREATION",
        /// Create the subscription technical user
        OfferSubscriptionTechnicalUserCreation => "OFFERSUBSCRIPTION_TECHNICALUSER_CREATION",
        /// Retry of the technical user creation
        RetriggerOfferSubscriptionTechnicalUserCreation => "RETRIGGER_OFFERSUBSCRIPTION_TECHNICALUSER_CREATION",
        /// Activate the subscription
        ActivateSubscription => "ACTIVATE_SUBSCRIPTION",
        /// Call back the provider with the subscription details
        TriggerProviderCallback => "TRIGGER_PROVIDER_CALLBACK",
        /// Retry of the provider callback
        RetriggerProviderCallback => "RETRIGGER_PROVIDER_CALLBACK",

        // partner registration
        /// Synchronise a registered partner user
        SynchronizeUser => "SYNCHRONIZE_USER",
        /// Retry of the user synchronisation
        RetriggerSynchronizeUser => "RETRIGGER_SYNCHRONIZE_USER",
        /// Mark the partner registration as verified
        ManualVerifyPartnerRegistration => "MANUAL_VERIFY_PARTNER_REGISTRATION",

        // DIM technical user
        /// Request the technical user from DIM
        CreateDimTechnicalUser => "CREATE_DIM_TECHNICAL_USER",
        /// Retry of the technical user request
        RetriggerCreateDimTechnicalUser => "RETRIGGER_CREATE_DIM_TECHNICAL_USER",
        /// Await the DIM callback for the created technical user
        AwaitCreateDimTechnicalUserResponse => "AWAIT_CREATE_DIM_TECHNICAL_USER_RESPONSE",
        /// Request deletion of the technical user
        DeleteDimTechnicalUser => "DELETE_DIM_TECHNICAL_USER",
        /// Retry of the deletion request
        RetriggerDeleteDimTechnicalUser => "RETRIGGER_DELETE_DIM_TECHNICAL_USER",
        /// Await the DIM callback for the deleted technical user
        AwaitDeleteDimTechnicalUserResponse => "AWAIT_DELETE_DIM_TECHNICAL_USER_RESPONSE",

        // self-description creation
        /// Create a connector self-description
        SelfDescriptionConnectorCreation => "SELF_DESCRIPTION_CONNECTOR_CREATION",
        /// Retry of the connector self-description
        RetriggerSelfDescriptionConnectorCreation => "RETRIGGER_SELF_DESCRIPTION_CONNECTOR_CREATION",
        /// Create a company self-description
        SelfDescriptionCompanyCreation => "SELF_DESCRIPTION_COMPANY_CREATION",
        /// Retry of the company self-description
        RetriggerSelfDescriptionCompanyCreation => "RETRIGGER_SELF_DESCRIPTION_COMPANY_CREATION",

        // identity provider provisioning
        /// Synchronise identity provider configuration
        SynchronizeIdentityProvider => "SYNCHRONIZE_IDENTITY_PROVIDER",
        /// Retry of the synchronisation
        RetriggerSynchronizeIdentityProvider => "RETRIGGER_SYNCHRONIZE_IDENTITY_PROVIDER",
        /// Delete the shared realm of an identity provider
        DeleteIdpSharedRealm => "DELETE_IDP_SHARED_REALM",
        /// Retry of the shared realm deletion
        RetriggerDeleteIdpSharedRealm => "RETRIGGER_DELETE_IDP_SHARED_REALM",
        /// Delete the central identity provider
        DeleteCentralIdentityProvider => "DELETE_CENTRAL_IDENTITY_PROVIDER",
        /// Retry of the central identity provider deletion
        RetriggerDeleteCentralIdentityProvider => "RETRIGGER_DELETE_CENTRAL_IDENTITY_PROVIDER",

        // invitation
        /// Create the central identity provider for the invitee
        InvitationCreateCentralIdp => "INVITATION_CREATE_CENTRAL_IDP",
        /// Retry of the central idp creation
        RetriggerInvitationCreateCentralIdp => "RETRIGGER_INVITATION_CREATE_CENTRAL_IDP",
        /// Create the shared realm for the invitee
        InvitationCreateSharedRealm => "INVITATION_CREATE_SHARED_REALM",
        /// Retry of the shared realm creation
        RetriggerInvitationCreateSharedRealm => "RETRIGGER_INVITATION_CREATE_SHARED_REALM",
        /// Create the first user of the invitee
        InvitationCreateUser => "INVITATION_CREATE_USER",
        /// Retry of the user creation
        RetriggerInvitationCreateUser => "RETRIGGER_INVITATION_CREATE_USER",

        // mailing
        /// Send a queued mail
        SendMail => "SEND_MAIL",
        /// Retry of the mail delivery
        RetriggerSendMail => "RETRIGGER_SEND_MAIL",
    }
}

impl ProcessStepType {
    /// Process type this step is valid for
    pub const fn process_type(&self) -> ProcessType {
        use ProcessStepType::*;
        match self {
            VerifyRegistration
            | CreateBusinessPartnerNumberPush
            | CreateBusinessPartnerNumberPull
            | CreateBusinessPartnerNumberManual
            | RetriggerBusinessPartnerNumberPush
            | RetriggerBusinessPartnerNumberPull
            | OverrideBusinessPartnerNumber
            | CreateIdentityWallet
            | RetriggerIdentityWallet
            | CreateDimWallet
            | RetriggerCreateDimWallet
            | AwaitDimResponse
            | ValidateDidDocument
            | RetriggerValidateDidDocument
            | RequestBpnCredential
            | RetriggerRequestBpnCredential
            | StoredBpnCredential
            | StartClearingHouse
            | RetriggerClearingHouse
            | EndClearingHouse
            | StartOverrideClearingHouse
            | TriggerOverrideClearingHouse
            | StartSelfDescriptionLp
            | RetriggerSelfDescriptionLp
            | FinishSelfDescriptionLp
            | ActivateApplication => ProcessType::ApplicationChecklist,

            TriggerProvider
            | RetriggerProvider
            | StartAutosetup
            | OfferSubscriptionClientCreation
            | RetriggerOfferSubscriptionClientCreation
            | OfferSubscriptionTechnicalUserCreation
            | RetriggerOfferSubscriptionTechnicalUserCreation
            | ActivateSubscription
            | TriggerProviderCallback
            | RetriggerProviderCallback => ProcessType::OfferSubscription,

            SynchronizeUser | RetriggerSynchronizeUser | ManualVerifyPartnerRegistration => {
                ProcessType::PartnerRegistration
            }

            CreateDimTechnicalUser
            | RetriggerCreateDimTechnicalUser
            | AwaitCreateDimTechnicalUserResponse
            | DeleteDimTechnicalUser
            | RetriggerDeleteDimTechnicalUser
            | AwaitDeleteDimTechnicalUserResponse => ProcessType::DimTechnicalUser,

            SelfDescriptionConnectorCreation
            | RetriggerSelfDescriptionConnectorCreation
            | SelfDescriptionCompanyCreation
            | RetriggerSelfDescriptionCompanyCreation => ProcessType::SelfDescriptionCreation,

            SynchronizeIdentityProvider
            | RetriggerSynchronizeIdentityProvider
            | DeleteIdpSharedRealm
            | RetriggerDeleteIdpSharedRealm
            | DeleteCentralIdentityProvider
            | RetriggerDeleteCentralIdentityProvider => ProcessType::IdentityProviderProvisioning,

            InvitationCreateCentralIdp
            | RetriggerInvitationCreateCentralIdp
            | InvitationCreateSharedRealm
            | RetriggerInvitationCreateSharedRealm
            | InvitationCreateUser
            | RetriggerInvitationCreateUser => ProcessType::Invitation,

            SendMail | RetriggerSendMail => ProcessType::Mailing,
        }
    }

    /// For a `RETRIGGER_*` step, the step type it re-enqueues
    pub const fn retriggered_step(&self) -> Option<ProcessStepType> {
        use ProcessStepType::*;
        let target = match self {
            RetriggerBusinessPartnerNumberPush => CreateBusinessPartnerNumberPush,
            RetriggerBusinessPartnerNumberPull => CreateBusinessPartnerNumberPull,
            RetriggerIdentityWallet => CreateIdentityWallet,
            RetriggerCreateDimWallet => CreateDimWallet,
            RetriggerValidateDidDocument => ValidateDidDocument,
            RetriggerRequestBpnCredential => RequestBpnCredential,
            RetriggerClearingHouse => StartClearingHouse,
            RetriggerSelfDescriptionLp => StartSelfDescriptionLp,
            RetriggerProvider => TriggerProvider,
            RetriggerOfferSubscriptionClientCreation => OfferSubscriptionClientCreation,
            RetriggerOfferSubscriptionTechnicalUserCreation => OfferSubscriptionTechnicalUserCreation,
            RetriggerProviderCallback => TriggerProviderCallback,
            RetriggerSynchronizeUser => SynchronizeUser,
            RetriggerCreateDimTechnicalUser => CreateDimTechnicalUser,
            RetriggerDeleteDimTechnicalUser => DeleteDimTechnicalUser,
            RetriggerSelfDescriptionConnectorCreation => SelfDescriptionConnectorCreation,
            RetriggerSelfDescriptionCompanyCreation => SelfDescriptionCompanyCreation,
            RetriggerSynchronizeIdentityProvider => SynchronizeIdentityProvider,
            RetriggerDeleteIdpSharedRealm => DeleteIdpSharedRealm,
            RetriggerDeleteCentralIdentityProvider => DeleteCentralIdentityProvider,
            RetriggerInvitationCreateCentralIdp => InvitationCreateCentralIdp,
            RetriggerInvitationCreateSharedRealm => InvitationCreateSharedRealm,
            RetriggerInvitationCreateUser => InvitationCreateUser,
            RetriggerSendMail => SendMail,
            _ => return None,
        };
        Some(target)
    }

    /// The `RETRIGGER_*` step type that re-enqueues this step, if retries are offered
    pub fn retrigger_step(&self) -> Option<ProcessStepType> {
        Self::ALL
            .iter()
            .copied()
            .find(|candidate| candidate.retriggered_step() == Some(*self))
    }

    /// Whether this is a `RETRIGGER_*` step
    #[inline]
    pub fn is_retrigger(&self) -> bool {
        self.retriggered_step().is_some()
    }

    /// Checklist category this step reports into
    pub const fn checklist_entry_type(&self) -> Option<ChecklistEntryType> {
        use ProcessStepType::*;
        let entry_type = match self {
            VerifyRegistration => ChecklistEntryType::RegistrationVerification,
            CreateBusinessPartnerNumberPush
            | CreateBusinessPartnerNumberPull
            | CreateBusinessPartnerNumberManual
            | RetriggerBusinessPartnerNumberPush
            | RetriggerBusinessPartnerNumberPull
            | OverrideBusinessPartnerNumber => ChecklistEntryType::BusinessPartnerNumber,
            CreateIdentityWallet
            | RetriggerIdentityWallet
            | CreateDimWallet
            | RetriggerCreateDimWallet
            | AwaitDimResponse
            | ValidateDidDocument
            | RetriggerValidateDidDocument => ChecklistEntryType::IdentityWallet,
            RequestBpnCredential | RetriggerRequestBpnCredential | StoredBpnCredential => {
                ChecklistEntryType::BpnlCredential
            }
            StartClearingHouse
            | RetriggerClearingHouse
            | EndClearingHouse
            | StartOverrideClearingHouse
            | TriggerOverrideClearingHouse => ChecklistEntryType::ClearingHouse,
            StartSelfDescriptionLp | RetriggerSelfDescriptionLp | FinishSelfDescriptionLp => {
                ChecklistEntryType::SelfDescriptionLp
            }
            ActivateApplication => ChecklistEntryType::ApplicationActivation,
            _ => return None,
        };
        Some(entry_type)
    }

    /// All step types valid for `process_type`
    pub fn for_process_type(process_type: ProcessType) -> Vec<ProcessStepType> {
        Self::ALL
            .iter()
            .copied()
            .filter(|step_type| step_type.process_type() == process_type)
            .collect()
    }
}
