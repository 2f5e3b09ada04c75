use tracing::warn;

use crate::adapters::IdentityService;
use crate::error::StoreError;
use crate::model::Identity;
use crate::IdentityDescriptor;

/// Resolves a source identity to its target-store equivalent via the shared
/// email attribute. Nothing is cached or persisted; every call is a fresh
/// pair of lookups.
pub struct IdentityTranslator<'a> {
    source: &'a dyn IdentityService,
    target: &'a dyn IdentityService,
}

impl<'a> IdentityTranslator<'a> {
    pub fn new(source: &'a dyn IdentityService, target: &'a dyn IdentityService) -> Self {
        Self { source, target }
    }

    /// Translate `descriptor` to a target identity, or `None` when the source
    /// identity has no usable email or nothing in the target matches it.
    pub async fn translate(
        &self,
        descriptor: &IdentityDescriptor,
    ) -> Result<Option<Identity>, StoreError> {
        let mut identity = self.source.read_by_descriptor(descriptor).await?;

        if usable_email(&identity).is_none() {
            // One forced refresh, then a re-read; the email attribute is
            // sometimes absent from a stale identity record.
            self.source.refresh(descriptor).await?;
            identity = self.source.read_by_descriptor(descriptor).await?;
        }

        let Some(email) = usable_email(&identity) else {
            warn!(
                display_name = %identity.display_name,
                "no e-mail address known in source store; cannot translate identity"
            );
            return Ok(None);
        };

        if let Some(found) = self.target.read_by_email(email).await? {
            return Ok(Some(found));
        }

        // Some stores key accounts by email address; retry the same string as
        // an account name before giving up.
        if let Some(found) = self.target.read_by_account_name(email).await? {
            return Ok(Some(found));
        }

        warn!(
            email = %email,
            display_name = %identity.display_name,
            "cannot find tester in target store"
        );
        Ok(None)
    }
}

fn usable_email(identity: &Identity) -> Option<&str> {
    identity.email.as_deref().filter(|email| !email.is_empty())
}
