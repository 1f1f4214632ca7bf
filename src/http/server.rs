//! HTTP server setup.
//!
//! # Responsibilities
//! - Build the Axum router: routes, per-route gate chains, shared layers
//! - Own the limiter registry and start its sweep with the server
//! - Serve with connection info (the limiter keys on the peer address)
//! - Stop accepting on the shutdown signal and drain in-flight requests

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    routing::{get, patch, post, put},
    Router,
};
use tokio::net::TcpListener;

use crate::auth::{CredentialStore, PermissionGrants, PermissionResolver, TokenAuthenticator};
use crate::config::{GateConfig, TokenConfig};
use crate::domain::movies::{Movie, MovieCatalogue};
use crate::domain::users::{User, UserDirectory};
use crate::http::handlers;
use crate::lifecycle::Shutdown;
use crate::pipeline::RequestPipeline;
use crate::security::ClientLimiterRegistry;
use crate::store::memory::MemoryBackends;
use crate::store::{ConcurrencyControlledStore, ConditionalStore};

/// The store boundaries the service runs against.
#[derive(Clone)]
pub struct Backends {
    pub movies: Arc<dyn ConditionalStore<Movie>>,
    pub catalogue: Arc<dyn MovieCatalogue>,
    pub users: Arc<dyn ConditionalStore<User>>,
    pub directory: Arc<dyn UserDirectory>,
    pub credentials: Arc<dyn CredentialStore>,
    pub permissions: Arc<dyn PermissionResolver>,
    pub grants: Arc<dyn PermissionGrants>,
}

impl From<MemoryBackends> for Backends {
    fn from(memory: MemoryBackends) -> Self {
        Self {
            movies: memory.movies.clone(),
            catalogue: memory.movies,
            users: memory.users.clone(),
            directory: memory.users,
            credentials: memory.credentials,
            permissions: memory.permissions.clone(),
            grants: memory.permissions,
        }
    }
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub env: String,
    pub movies: ConcurrencyControlledStore<Movie>,
    pub catalogue: Arc<dyn MovieCatalogue>,
    pub users: ConcurrencyControlledStore<User>,
    pub directory: Arc<dyn UserDirectory>,
    pub credentials: Arc<dyn CredentialStore>,
    pub grants: Arc<dyn PermissionGrants>,
    pub authenticator: TokenAuthenticator,
    pub tokens: TokenConfig,
    pub store_timeout: Duration,
}

pub struct HttpServer {
    router: Router,
    limiter: Arc<ClientLimiterRegistry>,
    config: GateConfig,
}

impl HttpServer {
    pub fn new(config: GateConfig, backends: Backends) -> Self {
        let store_timeout = config.store.operation_timeout();
        let limiter = Arc::new(ClientLimiterRegistry::new(config.rate_limit.clone()));
        let authenticator = TokenAuthenticator::new(Arc::clone(&backends.credentials), store_timeout);

        let pipeline = RequestPipeline::new(
            Arc::clone(&limiter),
            authenticator.clone(),
            Arc::clone(&backends.permissions),
            store_timeout,
        )
        .with_request_timeout(config.timeouts.request())
        .with_trusted_origins(&config.cors.trusted_origins);

        let state = AppState {
            env: config.listener.env.clone(),
            movies: ConcurrencyControlledStore::new(backends.movies, store_timeout),
            catalogue: backends.catalogue,
            users: ConcurrencyControlledStore::new(backends.users, store_timeout),
            directory: backends.directory,
            credentials: backends.credentials,
            grants: backends.grants,
            authenticator,
            tokens: config.tokens.clone(),
            store_timeout,
        };

        let router = Self::build_router(&pipeline, state);
        Self { router, limiter, config }
    }

    fn build_router(pipeline: &RequestPipeline, state: AppState) -> Router {
        let read = pipeline.permission("movies:read");
        let write = pipeline.permission("movies:write");

        let routes = Router::new()
            .route("/v1/healthcheck", get(handlers::healthcheck))
            .route("/v1/users", post(handlers::register_user))
            .route("/v1/users/activated", put(handlers::activate_user))
            .route(
                "/v1/users/{id}",
                pipeline.guard(pipeline.authenticated(), get(handlers::show_user)),
            )
            .route(
                "/v1/users/{id}",
                pipeline.guard(
                    pipeline.activated(),
                    put(handlers::update_user)
                        .patch(handlers::update_user)
                        .delete(handlers::delete_user),
                ),
            )
            .route("/v1/tokens/authentication", post(handlers::create_authentication_token))
            .route(
                "/v1/movies",
                pipeline.guard(read.clone(), get(handlers::list_movies)),
            )
            .route(
                "/v1/movies",
                pipeline.guard(write.clone(), post(handlers::create_movie)),
            )
            .route(
                "/v1/movies/{id}",
                pipeline.guard(read, get(handlers::show_movie)),
            )
            .route(
                "/v1/movies/{id}",
                pipeline.guard(
                    write,
                    patch(handlers::update_movie)
                        .put(handlers::update_movie)
                        .delete(handlers::delete_movie),
                ),
            )
            .fallback(handlers::not_found)
            .method_not_allowed_fallback(handlers::method_not_allowed)
            .with_state(state);

        pipeline.wrap(routes)
    }

    /// The fully layered router, for driving the service without a socket.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn limiter(&self) -> &Arc<ClientLimiterRegistry> {
        &self.limiter
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Serve on `listener` until `shutdown` is triggered.
    ///
    /// The limiter sweep runs for as long as the server does.
    pub async fn run(self, listener: TcpListener, shutdown: &Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            rate_limit = self.config.rate_limit.enabled,
            "HTTP server starting"
        );

        self.limiter.spawn_sweeper(shutdown);

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown.signalled())
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
