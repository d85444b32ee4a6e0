//! Request handler definitions
//!
//! Define each route and its handler here.
//! Handlers that are more than a line or two MUST go into a separate module. Keep this module neat and tidy 🙏
//!
//! A note about performance:
//! Since each worker thread processes its requests sequentially, handlers which block the current thread will cause the
//! current worker to stop processing new requests. Any long, non-cpu-bound operation (e.g. I/O, database operations,
//! etc.) should be expressed as futures or asynchronous functions.
use actix_web::{get, http::header::ContentType, post, web, HttpRequest, HttpResponse, Responder};
use log::*;
use recon_engine::{
    listener::{AckResponse, Delivery, NotificationOutcome, WebhookListener},
    notifications::DecoderRegistry,
    traits::ReconciliationDatabase,
};

use crate::{
    data_objects::{ListenerOptions, ACCEPTED},
    errors::{AuthError, ServerError},
};

// Web-actix cannot handle generics in handlers, so it's implemented manually using the `route!` macro
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+) => {
        paste::paste! { pub struct [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ >( $( core::marker::PhantomData<fn() -> [< T $bounds:camel> ] >,)+ );}
        paste::paste! { impl< $( [< T $bounds:camel> ],)+ > [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ > {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self($( core::marker::PhantomData::<fn() -> [< T $bounds:camel> ] >,)+)
            }
        }}
        paste::paste! { impl<$( [< T $bounds:camel >] , )+> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<$([<T $bounds:camel>],)+>
        where
            $([<T $bounds:camel>]: $bounds + 'static,)+
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::< $( [< T $bounds:camel >], )+>);
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };
}

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//----------------------------------------------   Listener  ----------------------------------------------------
// Mounted inside each processor's `/listener/{name}` scope, behind the allowlist and HMAC checks. Reaching this
// handler means the delivery has been authenticated.
route!(listener => Post "" impl ReconciliationDatabase);
pub async fn listener<B>(
    req: HttpRequest,
    body: web::Bytes,
    api: web::Data<WebhookListener<B>>,
    decoders: web::Data<DecoderRegistry>,
    options: web::Data<ListenerOptions>,
) -> Result<HttpResponse, ServerError>
where
    B: ReconciliationDatabase,
{
    trace!("📬️ Received webhook delivery: {}", req.uri());
    let delivery = Delivery::decode(&decoders, &options.decoder, &options.processor, true, body.as_ref());
    match api.handle(delivery).await {
        // Processors only ever see "accepted", whatever happened to the individual notifications
        AckResponse::Accepted(outcomes) => {
            let failed = outcomes
                .iter()
                .filter(|o| {
                    matches!(o, NotificationOutcome::Malformed(_) | NotificationOutcome::Executed { success: false, .. })
                })
                .count();
            if failed > 0 {
                warn!("📬️ {failed} of {} notifications from {} were not processed", outcomes.len(), options.processor);
            }
            Ok(HttpResponse::Ok().insert_header(ContentType::plaintext()).body(ACCEPTED))
        },
        AckResponse::Unauthorized => Err(ServerError::AuthenticationError(AuthError::InvalidSignature)),
    }
}

/// Catches deliveries for processors that aren't configured.
#[post("/listener/{processor}")]
pub async fn unknown_listener(path: web::Path<String>) -> Result<HttpResponse, ServerError> {
    let processor = path.into_inner();
    warn!("📬️ Received a delivery for {processor}, which is not a configured processor");
    Err(ServerError::UnknownProcessor(processor))
}
