use std::{
    collections::BTreeMap,
    sync::{Arc, OnceLock},
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{
    IdpError, IdpSession, IdpUser,
    metadata::{
        DEFAULT_NAME_ID_FORMAT, Endpoint, EntityDescriptor, HTTP_POST_BINDING,
        HTTP_REDIRECT_BINDING, IndexedEndpoint, SpSsoDescriptor, pem_body,
    },
};
use crate::config::SamlProviderConfig;

/// Validated content of a SAML response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SamlAssertion {
    pub name_id: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, Vec<String>>,
    /// SessionIndex from the AuthnStatement, needed for single logout.
    #[serde(default)]
    pub session_index: Option<String>,
}

impl SamlAssertion {
    fn first(&self, names: &[&str]) -> Option<String> {
        names
            .iter()
            .find_map(|name| self.attributes.get(*name)?.first().cloned())
    }
}

/// Validates a base64 `SAMLResponse`: signature, audience, conditions, and that it
/// answers the AuthnRequest identified by `request_id`.
#[async_trait]
pub trait SamlResponseValidator: Send + Sync {
    async fn validate(&self, response: &str, request_id: &str)
    -> Result<SamlAssertion, IdpError>;
}

#[derive(Clone)]
pub struct SamlProvider {
    certificate: Vec<u8>,
    name_id_format: Option<String>,
    sign_requests: bool,
    want_assertions_signed: bool,
    validator: Option<Arc<dyn SamlResponseValidator>>,
}

impl SamlProvider {
    pub fn new(certificate: impl Into<Vec<u8>>) -> Self {
        Self {
            certificate: certificate.into(),
            name_id_format: None,
            sign_requests: false,
            want_assertions_signed: true,
            validator: None,
        }
    }

    pub fn from_config(config: &SamlProviderConfig) -> Self {
        Self {
            certificate: config.certificate.clone().into_bytes(),
            name_id_format: config.name_id_format.clone(),
            sign_requests: config.sign_requests,
            want_assertions_signed: config.want_assertions_signed,
            validator: None,
        }
    }

    pub fn with_validator(mut self, validator: Arc<dyn SamlResponseValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn with_name_id_format(mut self, format: impl Into<String>) -> Self {
        self.name_id_format = Some(format.into());
        self
    }

    /// Certificate as stored, PEM encoded.
    pub fn certificate(&self) -> &[u8] {
        &self.certificate
    }

    /// Service-provider descriptor rooted at `saml_root_url` (`…/idps/{id}/saml/`).
    pub fn service_provider(&self, saml_root_url: &str) -> EntityDescriptor {
        let root = saml_root_url.trim_end_matches('/');
        let certificate = pem_body(&self.certificate);
        EntityDescriptor {
            entity_id: format!("{root}/metadata"),
            sp_sso_descriptors: vec![SpSsoDescriptor {
                authn_requests_signed: self.sign_requests,
                want_assertions_signed: self.want_assertions_signed,
                certificate: (!certificate.is_empty()).then_some(certificate),
                name_id_formats: vec![
                    self.name_id_format
                        .clone()
                        .unwrap_or_else(|| DEFAULT_NAME_ID_FORMAT.to_string()),
                ],
                single_logout_services: [HTTP_REDIRECT_BINDING, HTTP_POST_BINDING]
                    .into_iter()
                    .map(|binding| Endpoint {
                        binding: binding.to_string(),
                        location: format!("{root}/slo"),
                    })
                    .collect(),
                assertion_consumer_services: vec![IndexedEndpoint::new(
                    HTTP_POST_BINDING,
                    &format!("{root}/acs"),
                    1,
                )],
            }],
        }
    }
}

pub struct SamlSession {
    provider: SamlProvider,
    request_id: String,
    response: String,
    assertion: OnceLock<SamlAssertion>,
}

impl SamlSession {
    /// Bind a received response to the AuthnRequest id stored on the intent.
    pub fn new(
        provider: SamlProvider,
        request_id: impl Into<String>,
        response: impl Into<String>,
    ) -> Result<Self, IdpError> {
        let response = response.into();
        if response.trim().is_empty() {
            return Err(IdpError::MissingSamlResponse);
        }
        Ok(Self {
            provider,
            request_id: request_id.into(),
            response,
            assertion: OnceLock::new(),
        })
    }

    /// The validated assertion, once [`fetch_user`](IdpSession::fetch_user) succeeded.
    pub fn assertion(&self) -> Option<&SamlAssertion> {
        self.assertion.get()
    }
}

#[async_trait]
impl IdpSession for SamlSession {
    async fn fetch_user(&self) -> Result<IdpUser, IdpError> {
        let validator = self
            .provider
            .validator
            .as_ref()
            .ok_or(IdpError::NotConfigured("SAML response validation"))?;
        let assertion = validator.validate(&self.response, &self.request_id).await?;
        if assertion.name_id.is_empty() {
            return Err(IdpError::MissingClaim("NameID".into()));
        }

        let user = IdpUser {
            id: assertion.name_id.clone(),
            email: assertion.first(&["email", "mail", "urn:oid:0.9.2342.19200300.100.1.3"]),
            email_verified: false,
            first_name: assertion.first(&["givenName", "urn:oid:2.5.4.42"]),
            last_name: assertion.first(&["surname", "sn", "urn:oid:2.5.4.4"]),
            display_name: assertion.first(&["displayName", "urn:oid:2.16.840.1.113730.3.1.241"]),
            preferred_username: assertion.first(&["uid", "urn:oid:0.9.2342.19200300.100.1.1"]),
            raw: serde_json::to_value(&assertion.attributes).unwrap_or_default(),
        };
        let _ = self.assertion.set(assertion);
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::ScriptedSamlValidator;

    const CERT: &str = "-----BEGIN CERTIFICATE-----\nMIIC\n-----END CERTIFICATE-----\n";

    #[test]
    fn empty_response_is_rejected() {
        assert!(matches!(
            SamlSession::new(SamlProvider::new(CERT), "req-1", "  "),
            Err(IdpError::MissingSamlResponse)
        ));
    }

    #[tokio::test]
    async fn binds_request_id_and_maps_attributes() {
        let validator = ScriptedSamlValidator::accepting("req-1", "name-id-1")
            .with_attribute("mail", "jane@example.com")
            .with_attribute("givenName", "Jane");
        let provider = SamlProvider::new(CERT).with_validator(Arc::new(validator.clone()));
        let session = SamlSession::new(provider, "req-1", "PHNhbWxwOlJlc3BvbnNlLz4=").unwrap();

        let user = session.fetch_user().await.unwrap();
        assert_eq!(user.id, "name-id-1");
        assert_eq!(user.email.as_deref(), Some("jane@example.com"));
        assert_eq!(user.first_name.as_deref(), Some("Jane"));
        assert_eq!(user.raw["mail"][0], "jane@example.com");
        assert_eq!(session.assertion().unwrap().name_id, "name-id-1");
        assert_eq!(validator.seen_request_ids(), vec!["req-1".to_string()]);
    }

    #[tokio::test]
    async fn response_for_other_request_fails() {
        let validator = ScriptedSamlValidator::accepting("req-1", "name-id-1");
        let provider = SamlProvider::new(CERT).with_validator(Arc::new(validator));
        let session = SamlSession::new(provider, "req-2", "PHNhbWxwOlJlc3BvbnNlLz4=").unwrap();

        assert!(matches!(
            session.fetch_user().await,
            Err(IdpError::Validation(_))
        ));
        assert!(session.assertion().is_none());
    }

    #[tokio::test]
    async fn validator_required() {
        let session = SamlSession::new(SamlProvider::new(CERT), "req-1", "x").unwrap();
        assert!(matches!(
            session.fetch_user().await,
            Err(IdpError::NotConfigured(_))
        ));
    }

    #[test]
    fn service_provider_descriptor() {
        let sp = SamlProvider::new(CERT)
            .with_name_id_format("urn:oasis:names:tc:SAML:1.1:nameid-format:emailAddress")
            .service_provider("https://login.example.com/idps/42/saml/");

        assert_eq!(
            sp.entity_id,
            "https://login.example.com/idps/42/saml/metadata"
        );
        let descriptor = &sp.sp_sso_descriptors[0];
        assert_eq!(descriptor.certificate.as_deref(), Some("MIIC"));
        assert_eq!(
            descriptor.assertion_consumer_services[0].location,
            "https://login.example.com/idps/42/saml/acs"
        );
        assert_eq!(descriptor.single_logout_services.len(), 2);
        assert_eq!(
            descriptor.name_id_formats,
            vec!["urn:oasis:names:tc:SAML:1.1:nameid-format:emailAddress".to_string()]
        );
    }
}
