//! # Module Server - Surface HTTP du device host
//!
//! Une abstraction mince au-dessus d'Axum : routes nommées (GET, POST,
//! toutes méthodes pour SUBSCRIBE/UNSUBSCRIBE) et arrêt gracieux qui
//! attend les requêtes en vol.
//!
//! ## Fonctionnalités
//!
//! - 🎯 **Handlers nommés** : `add_handler()`, `add_post_handler_with_state()`
//! - 📡 **Méthodes étendues** : `add_any_handler_with_state()` pour GENA
//! - ⚡ **Gestion gracieuse** : arrêt sur Ctrl+C ou [`Server::stop`]

use axum::Router;
use axum::handler::Handler;
use axum::routing::get;
use std::{net::SocketAddr, sync::Arc};
use tokio::{signal, sync::RwLock, task::JoinHandle};
use tracing::{info, warn};

/// Serveur HTTP du host.
pub struct Server {
    name: String,
    base_url: String,
    http_port: u16,
    router: Arc<RwLock<Router>>,
    join_handle: Option<JoinHandle<()>>,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl Server {
    /// Crée une nouvelle instance de serveur.
    ///
    /// # Arguments
    ///
    /// * `name` - Nom du serveur (pour les logs)
    /// * `base_url` - URL de base (ex: "http://192.168.1.10:8080")
    /// * `http_port` - Port HTTP à écouter
    pub fn new(name: impl Into<String>, base_url: impl Into<String>, http_port: u16) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            http_port,
            router: Arc::new(RwLock::new(Router::new())),
            join_handle: None,
            shutdown_tx: None,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn http_port(&self) -> u16 {
        self.http_port
    }

    /// Ajoute un handler GET.
    pub async fn add_handler<H, T>(&mut self, path: &str, handler: H)
    where
        H: Handler<T, ()>,
        T: 'static,
    {
        let route = Router::new().route("/", get(handler));

        let mut r = self.router.write().await;
        *r = std::mem::take(&mut *r).nest(path, route);
    }

    /// Ajoute un handler GET avec state.
    pub async fn add_handler_with_state<H, T, S>(&mut self, path: &str, handler: H, state: S)
    where
        H: Handler<T, S>,
        T: 'static,
        S: Clone + Send + Sync + 'static,
    {
        let route = Router::new().route("/", get(handler)).with_state(state);

        let mut r = self.router.write().await;
        *r = std::mem::take(&mut *r).nest(path, route);
    }

    /// Ajoute un handler POST avec state (contrôle SOAP).
    pub async fn add_post_handler_with_state<H, T, S>(&mut self, path: &str, handler: H, state: S)
    where
        H: Handler<T, S>,
        T: 'static,
        S: Clone + Send + Sync + 'static,
    {
        let route = Router::new()
            .route("/", axum::routing::post(handler))
            .with_state(state);

        let mut r = self.router.write().await;
        *r = std::mem::take(&mut *r).nest(path, route);
    }

    /// Ajoute un handler acceptant toutes les méthodes, y compris les
    /// méthodes étendues SUBSCRIBE/UNSUBSCRIBE de GENA.
    pub async fn add_any_handler_with_state<H, T, S>(&mut self, path: &str, handler: H, state: S)
    where
        H: Handler<T, S>,
        T: 'static,
        S: Clone + Send + Sync + 'static,
    {
        let route = Router::new()
            .route("/", axum::routing::any(handler))
            .with_state(state);

        let mut r = self.router.write().await;
        *r = std::mem::take(&mut *r).nest(path, route);
    }

    /// Démarre le serveur HTTP.
    ///
    /// L'arrêt (Ctrl+C ou [`stop`](Self::stop)) est gracieux : l'accepteur
    /// se ferme puis les requêtes en vol se terminent.
    pub async fn start(&mut self) {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.http_port));
        info!("Server {} running at {} (port {})", self.name, self.base_url, self.http_port);

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        self.shutdown_tx = Some(shutdown_tx);

        let router = self.router.clone();

        self.join_handle = Some(tokio::spawn(async move {
            let r = router.read().await.clone();
            let listener = match tokio::net::TcpListener::bind(addr).await {
                Ok(listener) => listener,
                Err(e) => {
                    warn!("Failed to bind HTTP listener on {}: {}", addr, e);
                    return;
                }
            };

            let shutdown = async move {
                tokio::select! {
                    _ = shutdown_rx => {},
                    _ = signal::ctrl_c() => {
                        info!("Ctrl+C reçu, arrêt gracieux");
                    }
                }
            };

            if let Err(e) = axum::serve(listener, r.into_make_service())
                .with_graceful_shutdown(shutdown)
                .await
            {
                warn!("HTTP server error: {}", e);
            }
        }));
    }

    /// Déclenche l'arrêt gracieux.
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }

    /// Attend la fin du serveur.
    pub async fn wait(&mut self) {
        if let Some(h) = self.join_handle.take() {
            let _ = h.await;
        }
    }
}

/// Builder pattern
pub struct ServerBuilder {
    name: String,
    base_url: String,
    http_port: u16,
}

impl ServerBuilder {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>, http_port: u16) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            http_port,
        }
    }

    /// Construit le serveur.
    pub fn build(self) -> Server {
        Server::new(self.name, self.base_url, self.http_port)
    }
}
