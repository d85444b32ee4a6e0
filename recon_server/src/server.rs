use std::time::Duration;

use actix_web::{
    dev::{Server, Service},
    http::KeepAlive,
    middleware::Logger,
    web,
    App,
    HttpServer,
};
use futures::{future::ok, FutureExt};
use log::*;
use recon_engine::{
    dispatch::ActionDispatcher,
    listener::WebhookListener,
    notifications::DecoderRegistry,
    traits::ReconciliationDatabase,
    SqliteDatabase,
};

use crate::{
    config::ServerConfig,
    data_objects::ListenerOptions,
    errors::{AuthError, ServerError, ServerError::AuthenticationError},
    helpers::get_remote_ip,
    middleware::HmacMiddlewareFactory,
    routes::{health, unknown_listener, ListenerRoute},
    workers::{start_pending_expiry_worker, start_queue_consumers, start_requeue_worker},
};

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, 25)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    db.run_migrations().await.map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let _consumers = start_queue_consumers(db.clone(), &config)?;
    let _requeue_worker = start_requeue_worker(db.clone());
    let _expiry_worker = start_pending_expiry_worker(db.clone(), config.workers.pending_max_age);
    let srv = create_server_instance(config, db)?;
    srv.await.map_err(|e| ServerError::Unspecified(e.to_string()))
}

pub fn create_server_instance(config: ServerConfig, db: SqliteDatabase) -> Result<Server, ServerError> {
    let decoders = web::Data::new(decoder_registry(&config));
    let bind_addr = (config.host.clone(), config.port);
    let srv = HttpServer::new(move || {
        let listener = webhook_listener(&config, db.clone());
        App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("recon::access_log"))
            .app_data(web::Data::new(listener))
            .app_data(decoders.clone())
            .configure(|cfg| configure_listeners::<SqliteDatabase>(cfg, &config))
            .service(health)
            .service(unknown_listener)
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind(bind_addr)?
    .run();
    Ok(srv)
}

/// The decoders shared by every worker. Processors configured with a decoder that doesn't exist are logged here, once.
pub fn decoder_registry(config: &ServerConfig) -> DecoderRegistry {
    let decoders = DecoderRegistry::with_defaults();
    for processor in &config.processors {
        if !decoders.contains(&processor.decoder) {
            error!(
                "🪛️ {} is configured with the '{}' decoder, which does not exist. Its deliveries will be acknowledged \
                 but not processed.",
                processor.name, processor.decoder
            );
        }
    }
    decoders
}

/// The listener core, with a dispatcher that knows every configured processor.
pub fn webhook_listener<B: ReconciliationDatabase>(config: &ServerConfig, db: B) -> WebhookListener<B> {
    let mut dispatcher = ActionDispatcher::new(db);
    for processor in &config.processors {
        dispatcher.add_context(config.processor_context(processor));
    }
    WebhookListener::new(dispatcher)
}

/// Adds a `/listener/{name}` scope for each configured processor. Each scope checks the caller's address against the
/// processor's allowlist, and then the HMAC signature, before the delivery reaches the listener.
pub fn configure_listeners<B>(cfg: &mut web::ServiceConfig, config: &ServerConfig)
where B: ReconciliationDatabase + 'static {
    let use_x_forwarded_for = config.use_x_forwarded_for;
    let use_forwarded = config.use_forwarded;
    for processor in &config.processors {
        let allowlist = processor.ip_allowlist.clone();
        let name = processor.name.clone();
        let hmac = HmacMiddlewareFactory::new(
            &processor.name,
            &processor.hmac_header,
            processor.hmac_secret.clone(),
            processor.hmac_checks,
        );
        let scope = web::scope(&format!("/listener/{}", processor.name))
            .app_data(web::Data::new(ListenerOptions::new(processor.name.clone(), processor.decoder.clone())))
            .wrap(hmac)
            .wrap_fn(move |req, srv| {
                let peer_ip = get_remote_ip(req.request(), use_x_forwarded_for, use_forwarded);
                if allowlist.allows(peer_ip.as_ref()) {
                    srv.call(req).boxed_local()
                } else {
                    let peer = peer_ip.map(|ip| ip.to_string()).unwrap_or_else(|| "an unknown address".into());
                    warn!("🔐️ Refusing {name} delivery from {peer}. It is not on the allowlist.");
                    ok(req.error_response(AuthenticationError(AuthError::ForbiddenPeer))).boxed_local()
                }
            })
            .service(ListenerRoute::<B>::new());
        cfg.service(scope);
    }
}
