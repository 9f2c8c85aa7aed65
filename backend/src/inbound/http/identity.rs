//! Caller identity extraction.
//!
//! Authentication mechanics live in the external identity provider; the
//! gateway in front of this service verifies tokens and forwards the
//! caller's identity in trusted headers. Handlers that require an
//! authenticated caller take a [`CallerIdentity`] parameter and get a
//! `401 Unauthorized` for free when the headers are absent.

use actix_web::dev::Payload;
use actix_web::{FromRequest, HttpRequest};
use futures_util::future::{Ready, ready};

use crate::domain::{AccountId, Error};

/// Header carrying the verified account id.
pub const VERIFIED_UID_HEADER: &str = "x-verified-uid";
/// Header carrying the verified account email, when the provider knows one.
pub const VERIFIED_EMAIL_HEADER: &str = "x-verified-email";

/// Verified identity of the calling account.
#[derive(Debug, Clone)]
pub struct CallerIdentity {
    uid: AccountId,
    email: Option<String>,
}

impl CallerIdentity {
    /// Account id asserted by the identity gateway.
    pub fn account_id(&self) -> &AccountId {
        &self.uid
    }

    /// Verified email, when one was forwarded.
    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    fn from_headers(req: &HttpRequest) -> Result<Self, Error> {
        let uid = req
            .headers()
            .get(VERIFIED_UID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| Error::unauthorized("verified caller identity required"))?;
        let uid = AccountId::new(uid)
            .map_err(|_| Error::unauthorized("verified caller identity required"))?;
        let email = req
            .headers()
            .get(VERIFIED_EMAIL_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(ToOwned::to_owned);
        Ok(Self { uid, email })
    }
}

impl FromRequest for CallerIdentity {
    type Error = Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(Self::from_headers(req))
    }
}
