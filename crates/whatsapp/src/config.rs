use {
    botline_channels::error::{Error, Result},
    botline_common::types::PlatformCredentials,
};

/// WhatsApp Web credentials. Nothing is strictly required: first login goes
/// through a QR scan, and a persisted browser profile carries it forward.
#[derive(Debug, Clone, Default)]
pub struct WhatsAppCredentials {
    pub phone_number: Option<String>,
    pub browser_profile: Option<String>,
}

impl WhatsAppCredentials {
    pub fn from_platform(credentials: &PlatformCredentials) -> Result<Self> {
        let PlatformCredentials::WhatsappWeb {
            phone_number,
            browser_profile,
        } = credentials
        else {
            return Err(Error::invalid_input(format!(
                "expected whatsapp-web credentials, got {}",
                credentials.platform()
            )));
        };

        Ok(Self {
            phone_number: phone_number.clone(),
            browser_profile: browser_profile.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use secrecy::Secret;

    use super::*;

    #[test]
    fn whatsapp_variant_is_accepted() {
        let creds = WhatsAppCredentials::from_platform(&PlatformCredentials::WhatsappWeb {
            phone_number: Some("+55 11 99999-0000".into()),
            browser_profile: Some("/var/lib/botline/wa-1".into()),
        })
        .unwrap();
        assert_eq!(creds.browser_profile.as_deref(), Some("/var/lib/botline/wa-1"));
    }

    #[test]
    fn other_variants_are_rejected() {
        let err = WhatsAppCredentials::from_platform(&PlatformCredentials::MercadoLibre {
            app_id: "a".into(),
            client_secret: Secret::new("s".into()),
            access_token: Secret::new("t".into()),
            seller_id: None,
        })
        .unwrap_err();
        assert!(matches!(err, Error::InvalidInput { .. }));
    }
}
