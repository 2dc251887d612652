use secrecy::{ExposeSecret, Secret};

use {
    botline_channels::error::{Error, Result},
    botline_common::types::{PlatformCredentials, PlatformType},
};

/// Validated Mercado Libre credentials, extracted from the tagged union at
/// the adapter boundary.
#[derive(Clone)]
pub struct MeliCredentials {
    pub app_id: String,
    pub client_secret: Secret<String>,
    pub access_token: Secret<String>,
    /// Seller user id; resolved from the `/users/me` probe when absent.
    pub seller_id: Option<u64>,
}

impl MeliCredentials {
    /// Extract and validate the Mercado Libre variant.
    ///
    /// Fails fast with `MissingCredential` on empty required fields —
    /// configuration errors are never retried.
    pub fn from_platform(credentials: &PlatformCredentials) -> Result<Self> {
        let PlatformCredentials::MercadoLibre {
            app_id,
            client_secret,
            access_token,
            seller_id,
        } = credentials
        else {
            return Err(Error::invalid_input(format!(
                "expected mercadolibre credentials, got {}",
                credentials.platform()
            )));
        };

        if app_id.is_empty() {
            return Err(Error::missing_credential(
                PlatformType::MercadoLibre,
                "app_id",
            ));
        }
        if client_secret.expose_secret().is_empty() {
            return Err(Error::missing_credential(
                PlatformType::MercadoLibre,
                "client_secret",
            ));
        }
        if access_token.expose_secret().is_empty() {
            return Err(Error::missing_credential(
                PlatformType::MercadoLibre,
                "access_token",
            ));
        }

        let seller_id = match seller_id {
            Some(raw) => Some(raw.parse::<u64>().map_err(|_| {
                Error::invalid_input(format!("seller_id is not a numeric user id: {raw}"))
            })?),
            None => None,
        };

        Ok(Self {
            app_id: app_id.clone(),
            client_secret: client_secret.clone(),
            access_token: access_token.clone(),
            seller_id,
        })
    }
}

impl std::fmt::Debug for MeliCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MeliCredentials")
            .field("app_id", &self.app_id)
            .field("client_secret", &"[REDACTED]")
            .field("access_token", &"[REDACTED]")
            .field("seller_id", &self.seller_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(app_id: &str, secret: &str, token: &str, seller: Option<&str>) -> PlatformCredentials {
        PlatformCredentials::MercadoLibre {
            app_id: app_id.into(),
            client_secret: Secret::new(secret.into()),
            access_token: Secret::new(token.into()),
            seller_id: seller.map(String::from),
        }
    }

    #[test]
    fn valid_credentials_pass() {
        let creds =
            MeliCredentials::from_platform(&raw("123", "secret", "token", Some("42"))).unwrap();
        assert_eq!(creds.seller_id, Some(42));
    }

    #[test]
    fn empty_required_fields_fail_fast() {
        for (app, secret, token, field) in [
            ("", "s", "t", "app_id"),
            ("a", "", "t", "client_secret"),
            ("a", "s", "", "access_token"),
        ] {
            let err =
                MeliCredentials::from_platform(&raw(app, secret, token, None)).unwrap_err();
            match err {
                Error::MissingCredential { field: f, .. } => assert_eq!(f, field),
                other => panic!("expected MissingCredential, got {other:?}"),
            }
        }
    }

    #[test]
    fn non_numeric_seller_id_is_invalid() {
        let err =
            MeliCredentials::from_platform(&raw("a", "s", "t", Some("MLB-42"))).unwrap_err();
        assert!(matches!(err, Error::InvalidInput { .. }));
    }

    #[test]
    fn wrong_variant_is_rejected() {
        let creds = PlatformCredentials::WhatsappWeb {
            phone_number: None,
            browser_profile: None,
        };
        assert!(matches!(
            MeliCredentials::from_platform(&creds),
            Err(Error::InvalidInput { .. })
        ));
    }
}
