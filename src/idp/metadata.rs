//! SAML service-provider metadata.
//!
//! [`EntityDescriptor::to_xml`] renders the `md:EntityDescriptor` document served to
//! external IdPs. [`with_login_acs`] adds the assertion consumer endpoints operated
//! by the login UI, whose position decides which endpoint an IdP picks by default.

use std::borrow::Cow;

pub const HTTP_POST_BINDING: &str = "urn:oasis:names:tc:SAML:2.0:bindings:HTTP-POST";
pub const HTTP_REDIRECT_BINDING: &str = "urn:oasis:names:tc:SAML:2.0:bindings:HTTP-Redirect";
pub const HTTP_ARTIFACT_BINDING: &str = "urn:oasis:names:tc:SAML:2.0:bindings:HTTP-Artifact";

pub const DEFAULT_NAME_ID_FORMAT: &str = "urn:oasis:names:tc:SAML:2.0:nameid-format:persistent";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub binding: String,
    pub location: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedEndpoint {
    pub binding: String,
    pub location: String,
    pub index: usize,
    pub is_default: Option<bool>,
}

impl IndexedEndpoint {
    pub fn new(binding: &str, location: &str, index: usize) -> Self {
        Self {
            binding: binding.to_string(),
            location: location.to_string(),
            index,
            is_default: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpSsoDescriptor {
    pub authn_requests_signed: bool,
    pub want_assertions_signed: bool,
    /// Base64 DER body of the certificate, without PEM armor.
    pub certificate: Option<String>,
    pub name_id_formats: Vec<String>,
    pub single_logout_services: Vec<Endpoint>,
    pub assertion_consumer_services: Vec<IndexedEndpoint>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityDescriptor {
    pub entity_id: String,
    pub sp_sso_descriptors: Vec<SpSsoDescriptor>,
}

/// Add the login UI's POST and Artifact assertion consumers to an ACS list.
///
/// - `internal_ui == false`: both are appended, numbered `len + 1` and `len + 2`.
/// - `internal_ui == true`: both are prepended at 0 (marked default) and 1, and the
///   existing entries are renumbered from 2 in their original order.
pub fn with_login_acs(
    existing: Vec<IndexedEndpoint>,
    location: &str,
    internal_ui: bool,
) -> Vec<IndexedEndpoint> {
    let len = existing.len();
    if !internal_ui {
        let mut acs = existing;
        acs.push(IndexedEndpoint::new(HTTP_POST_BINDING, location, len + 1));
        acs.push(IndexedEndpoint::new(HTTP_ARTIFACT_BINDING, location, len + 2));
        return acs;
    }

    let mut acs = Vec::with_capacity(len + 2);
    acs.push(IndexedEndpoint {
        is_default: Some(true),
        ..IndexedEndpoint::new(HTTP_POST_BINDING, location, 0)
    });
    acs.push(IndexedEndpoint::new(HTTP_ARTIFACT_BINDING, location, 1));
    acs.extend(
        existing
            .into_iter()
            .enumerate()
            .map(|(i, endpoint)| IndexedEndpoint {
                index: i + 2,
                ..endpoint
            }),
    );
    acs
}

impl EntityDescriptor {
    /// Apply [`with_login_acs`] to every SP descriptor.
    pub fn inject_login_acs(&mut self, location: &str, internal_ui: bool) {
        for descriptor in &mut self.sp_sso_descriptors {
            let existing = std::mem::take(&mut descriptor.assertion_consumer_services);
            descriptor.assertion_consumer_services = with_login_acs(existing, location, internal_ui);
        }
    }

    pub fn to_xml(&self) -> String {
        let mut xml = format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<md:EntityDescriptor xmlns:md="urn:oasis:names:tc:SAML:2.0:metadata" entityID="{}">"#,
            escape(&self.entity_id)
        );

        for sp in &self.sp_sso_descriptors {
            xml.push_str(&format!(
                r#"
  <md:SPSSODescriptor AuthnRequestsSigned="{}" WantAssertionsSigned="{}" protocolSupportEnumeration="urn:oasis:names:tc:SAML:2.0:protocol">"#,
                sp.authn_requests_signed, sp.want_assertions_signed
            ));

            if let Some(cert) = &sp.certificate {
                for usage in ["signing", "encryption"] {
                    xml.push_str(&format!(
                        r#"
    <md:KeyDescriptor use="{}">
      <ds:KeyInfo xmlns:ds="http://www.w3.org/2000/09/xmldsig#">
        <ds:X509Data>
          <ds:X509Certificate>{}</ds:X509Certificate>
        </ds:X509Data>
      </ds:KeyInfo>
    </md:KeyDescriptor>"#,
                        usage,
                        escape(cert)
                    ));
                }
            }

            // SAML schema order: SingleLogoutService, NameIDFormat, AssertionConsumerService
            for slo in &sp.single_logout_services {
                xml.push_str(&format!(
                    r#"
    <md:SingleLogoutService Binding="{}" Location="{}"/>"#,
                    escape(&slo.binding),
                    escape(&slo.location)
                ));
            }

            for format in &sp.name_id_formats {
                xml.push_str(&format!(
                    r#"
    <md:NameIDFormat>{}</md:NameIDFormat>"#,
                    escape(format)
                ));
            }

            for acs in &sp.assertion_consumer_services {
                let is_default = match acs.is_default {
                    Some(value) => format!(r#" isDefault="{}""#, value),
                    None => String::new(),
                };
                xml.push_str(&format!(
                    r#"
    <md:AssertionConsumerService Binding="{}" Location="{}" index="{}"{}/>"#,
                    escape(&acs.binding),
                    escape(&acs.location),
                    acs.index,
                    is_default
                ));
            }

            xml.push_str(
                r#"
  </md:SPSSODescriptor>"#,
            );
        }

        xml.push_str(
            r#"
</md:EntityDescriptor>"#,
        );
        xml
    }
}

/// Strip PEM armor and whitespace, leaving the base64 body.
pub fn pem_body(pem: &[u8]) -> String {
    String::from_utf8_lossy(pem)
        .lines()
        .filter(|line| !line.starts_with("-----"))
        .map(str::trim)
        .collect()
}

fn escape(value: &str) -> Cow<'_, str> {
    if !value.contains(['&', '<', '>', '"', '\'']) {
        return Cow::Borrowed(value);
    }
    let mut out = String::with_capacity(value.len() + 8);
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    Cow::Owned(out)
}
