use super::core::{cache_saved, cookie_header, Session, SessionError, SessionOptions, SessionStore};
use crate::dispatcher::{Request, Response};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::digest::KeyInit;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::Sha256;
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};
use subtle::ConstantTimeEq;
use tracing::debug;

/// Browsers drop cookies larger than this.
const MAX_COOKIE_LEN: usize = 4096;

type HmacSha256 = Hmac<Sha256>;

#[derive(Serialize, Deserialize)]
struct Payload {
    #[serde(rename = "v")]
    values: HashMap<String, Value>,
    #[serde(rename = "t")]
    issued_at: i64,
    #[serde(rename = "m")]
    max_age: i64,
}

/// Keeps the whole session in a signed cookie.
///
/// The cookie value is `base64url(payload) "." base64url(mac)` where the MAC
/// is HMAC-SHA256 over the cookie name and the encoded payload. The first
/// key signs; every key is tried when verifying, so keys can be rotated by
/// prepending a new one.
pub struct CookieStore {
    keys: Vec<Vec<u8>>,
    options: SessionOptions,
}

impl CookieStore {
    pub fn new<I, K>(keys: I) -> Result<Self, SessionError>
    where
        I: IntoIterator<Item = K>,
        K: AsRef<[u8]>,
    {
        let keys: Vec<Vec<u8>> = keys
            .into_iter()
            .map(|k| k.as_ref().to_vec())
            .filter(|k| !k.is_empty())
            .collect();
        if keys.is_empty() {
            return Err(SessionError::Store(
                "cookie store needs at least one non-empty key".into(),
            ));
        }
        Ok(Self {
            keys,
            options: SessionOptions::default(),
        })
    }

    pub fn with_options(mut self, options: SessionOptions) -> Self {
        self.options = options;
        self
    }

    fn encode(&self, session: &Session) -> Result<String, SessionError> {
        let payload = Payload {
            values: session.values.clone(),
            issued_at: unix_now(),
            max_age: session.options.max_age,
        };
        let body = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&payload)?);
        let signing_key = self.keys.first().ok_or_else(|| {
            SessionError::Store("cookie store has no signing key".into())
        })?;
        let mac = URL_SAFE_NO_PAD.encode(sign(signing_key, session.name(), &body)?);
        let value = format!("{body}.{mac}");
        if value.len() + session.name().len() > MAX_COOKIE_LEN {
            return Err(SessionError::Store(format!(
                "session {:?} does not fit in a cookie",
                session.name()
            )));
        }
        Ok(value)
    }

    /// Verify and decode a cookie value. `Ok(None)` means the cookie was
    /// valid but has expired.
    fn decode(&self, name: &str, raw: &str) -> Result<Option<Payload>, SessionError> {
        let decode_err = || SessionError::Decode {
            name: name.to_string(),
        };
        let (body, mac) = raw.split_once('.').ok_or_else(decode_err)?;
        let mac = URL_SAFE_NO_PAD.decode(mac).map_err(|_| decode_err())?;

        let verified = self.keys.iter().any(|key| {
            sign(key, name, body).is_ok_and(|expected| bool::from(expected.ct_eq(&mac)))
        });
        if !verified {
            return Err(SessionError::Signature {
                name: name.to_string(),
            });
        }

        let bytes = URL_SAFE_NO_PAD.decode(body).map_err(|_| decode_err())?;
        let payload: Payload = serde_json::from_slice(&bytes).map_err(|_| decode_err())?;
        if payload.max_age > 0 && unix_now() > payload.issued_at + payload.max_age {
            return Ok(None);
        }
        Ok(Some(payload))
    }
}

impl SessionStore for CookieStore {
    fn get(&self, req: &mut Request, name: &str) -> Result<Session, SessionError> {
        if let Some(cached) = req.sessions.get(name) {
            return Ok(cached.clone());
        }

        let mut session = Session::new(name, self.options.clone());
        let raw = req.cookie(name).map(str::to_string);
        let outcome = match raw {
            None => Ok(()),
            Some(raw) => match self.decode(name, &raw) {
                Ok(Some(payload)) => {
                    session.values = payload.values;
                    if payload.max_age > 0 {
                        session.options.max_age = payload.max_age;
                    }
                    session.is_new = false;
                    Ok(())
                }
                Ok(None) => {
                    debug!(session = %name, "session cookie expired");
                    Ok(())
                }
                Err(e) => Err(e),
            },
        };

        // A fresh session is cached even when decoding failed so a later
        // save in this request replaces the bad cookie.
        req.sessions.insert(name.to_string(), session.clone());
        outcome.map(|()| session)
    }

    fn save(
        &self,
        req: &mut Request,
        res: &mut Response,
        session: &Session,
    ) -> Result<(), SessionError> {
        let value = if session.options.max_age < 0 {
            String::new()
        } else {
            self.encode(session)?
        };
        res.set_cookie(
            session.name(),
            cookie_header(session.name(), &value, &session.options),
        );
        cache_saved(req, session);
        Ok(())
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// HMAC-SHA256 over `name|body`.
fn sign(key: &[u8], name: &str, body: &str) -> Result<Vec<u8>, SessionError> {
    let mut mac = <HmacSha256 as KeyInit>::new_from_slice(key)
        .map_err(|e| SessionError::Store(format!("invalid signing key: {e}")))?;
    mac.update(name.as_bytes());
    mac.update(b"|");
    mac.update(body.as_bytes());
    Ok(mac.finalize().into_bytes().to_vec())
}
