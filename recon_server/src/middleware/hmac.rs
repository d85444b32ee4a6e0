//! HMAC middleware for Actix Web.
//!
//! Processors sign each webhook delivery with a secret shared with us. The signature is the base64-encoded
//! HMAC-SHA256 of the raw request body, sent in a processor-specific header.
//!
//! Wrap each processor's listener scope with [`HmacMiddlewareFactory`] to refuse any delivery whose signature is
//! missing or wrong. Refusals are a bare 403; the reason is only logged.
use std::{
    future::{ready, Ready},
    rc::Rc,
};

use actix_http::h1;
use actix_web::{
    dev::{forward_ready, Payload, Service, ServiceRequest, ServiceResponse, Transform},
    error::ErrorBadRequest,
    web,
    Error,
};
use bytes::Bytes;
use futures::future::LocalBoxFuture;
use log::{trace, warn};
use recon_common::Secret;

use crate::{
    errors::{AuthError, ServerError},
    helpers::verify_hmac,
};

pub struct HmacMiddlewareFactory {
    processor: String,
    hmac_header: String,
    key: Secret<String>,
    // If false, then the middleware will not check the HMAC signature and always allow the call
    enabled: bool,
}

impl HmacMiddlewareFactory {
    pub fn new(processor: &str, hmac_header: &str, key: Secret<String>, enabled: bool) -> Self {
        HmacMiddlewareFactory { processor: processor.into(), hmac_header: hmac_header.into(), key, enabled }
    }
}

impl<S, B> Transform<S, ServiceRequest> for HmacMiddlewareFactory
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;
    type InitError = ();
    type Response = ServiceResponse<B>;
    type Transform = HmacMiddlewareService<S>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(HmacMiddlewareService {
            processor: self.processor.clone(),
            hmac_header: self.hmac_header.clone(),
            key: self.key.clone(),
            enabled: self.enabled,
            service: Rc::new(service),
        }))
    }
}

pub struct HmacMiddlewareService<S> {
    processor: String,
    hmac_header: String,
    key: Secret<String>,
    enabled: bool,
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for HmacMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;
    type Response = ServiceResponse<B>;

    forward_ready!(service);

    fn call(&self, mut req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let secret = self.key.clone();
        let hmac_header = self.hmac_header.clone();
        let processor = self.processor.clone();
        let enabled = self.enabled;
        Box::pin(async move {
            trace!("🔐️ Checking HMAC for {processor} delivery");
            if !enabled {
                trace!("🔐️ HMAC checks are disabled for {processor}. Allowing request.");
                return service.call(req).await;
            }
            if secret.is_empty() {
                warn!("🔐️ No HMAC secret is configured for {processor}. Denying access.");
                return Err(forbidden());
            }
            let data = req.extract::<web::Bytes>().await.map_err(|e| {
                warn!("🔐️ Failed to extract request data: {:?}", e);
                ErrorBadRequest("Failed to extract request data.")
            })?;
            let signature = req.headers().get(&hmac_header).and_then(|v| v.to_str().ok()).ok_or_else(|| {
                warn!("🔐️ No HMAC signature found in {processor} delivery. Denying access.");
                forbidden()
            })?;
            if verify_hmac(secret.reveal(), data.as_ref(), signature) {
                trace!("🔐️ HMAC check for {processor} delivery ✅️");
                req.set_payload(bytes_to_payload(data));
                service.call(req).await
            } else {
                warn!("🔐️ Invalid HMAC signature found in {processor} delivery. Denying access.");
                Err(forbidden())
            }
        })
    }
}

fn forbidden() -> Error {
    ServerError::AuthenticationError(AuthError::InvalidSignature).into()
}

fn bytes_to_payload(buf: Bytes) -> Payload {
    let (_, mut pl) = h1::Payload::create(true);
    pl.unread_data(buf);
    Payload::from(pl)
}
