//! SzczkDriver - StorageDriver implementation for the Szczk service
//!
//! Wires the [`TokenManager`], [`TokenScheduler`] and [`SzczkClient`]
//! together and delegates to the items, resolve and upload modules to fulfil
//! the [`StorageDriver`] port contract.
//!
//! ## Design Notes
//!
//! - [`SzczkDriver::init`] authenticates before returning; a driver that
//!   exists always holds a token.
//! - The driver owns a child of the host's lifecycle token. Cancelling
//!   either one stops the scheduler and fails in-flight calls.
//! - Adapter errors are classified into [`DriverError`] here, with the
//!   operation name and the target id or path attached.

use std::sync::Arc;

use reqwest::Client;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use szczk_core::config::DriverConfig;
use szczk_core::domain::newtypes::{RemoteId, RemotePath};
use szczk_core::ports::{
    DriverError, DriverInfo, FileStream, Link, Object, ProgressFn, StorageDriver,
};

use crate::auth::{HttpTokenProvider, TokenManager, TokenProvider};
use crate::client::SzczkClient;
use crate::scheduler::TokenScheduler;
use crate::{items, resolve, upload, SzczkError};

/// Static metadata for this driver
pub const DRIVER_INFO: DriverInfo = DriverInfo {
    name: "szczk",
    display_name: "Szczk Cloud",
    local_sort: false,
    no_cache: true,
    keep_file_info: true,
    default_root: "/",
};

/// Maps an adapter error to the host classification
fn classify(op: &'static str, target: impl std::fmt::Display, err: SzczkError) -> DriverError {
    if err.is_cancelled() {
        DriverError::Cancelled
    } else {
        DriverError::backend(op, target, err)
    }
}

/// Storage driver backed by the Szczk REST API
pub struct SzczkDriver {
    client: SzczkClient,
    root: Object,
    scheduler: Mutex<Option<JoinHandle<()>>>,
}

impl SzczkDriver {
    /// Authenticates with the configured credentials and starts the scheduler
    ///
    /// # Errors
    /// - [`DriverError::InvalidInput`] when `root_folder_id` is not a valid id
    /// - [`DriverError::Backend`] with op `"init"` when authentication fails
    /// - [`DriverError::Cancelled`] when `lifecycle` fires during startup
    pub async fn init(
        config: &DriverConfig,
        lifecycle: &CancellationToken,
    ) -> Result<Self, DriverError> {
        let http = Client::new();
        let provider = HttpTokenProvider::new(
            http.clone(),
            config.auth_base(),
            config.api_key.clone(),
            config.api_secret.clone(),
        );
        Self::with_provider(config, Arc::new(provider), http, lifecycle).await
    }

    /// Like [`init`](Self::init) with a caller-supplied [`TokenProvider`]
    pub async fn with_provider(
        config: &DriverConfig,
        provider: Arc<dyn TokenProvider>,
        http: Client,
        lifecycle: &CancellationToken,
    ) -> Result<Self, DriverError> {
        let root = Object::root(RemoteId::new(config.root_folder_id.clone())?);
        let scope = lifecycle.child_token();
        let tokens = Arc::new(TokenManager::new(provider));

        let auth = crate::until_cancelled(&scope, lifecycle, tokens.authenticate()).await;
        if let Err(e) = auth {
            warn!(error = %e, "Driver initialisation failed");
            return Err(classify("init", config.auth_base(), e));
        }

        let scheduler = TokenScheduler::new(tokens.clone(), scope.clone()).spawn();
        let client = SzczkClient::new(http, config.file_base(), tokens, scope);

        info!(root = %root.id, "Szczk driver initialised");
        Ok(Self {
            client,
            root,
            scheduler: Mutex::new(Some(scheduler)),
        })
    }

    /// The root container
    pub fn root(&self) -> &Object {
        &self.root
    }

    /// The underlying request executor
    pub fn client(&self) -> &SzczkClient {
        &self.client
    }

    fn ensure_live(&self) -> Result<(), DriverError> {
        if self.client.lifecycle().is_cancelled() {
            return Err(DriverError::Cancelled);
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl StorageDriver for SzczkDriver {
    fn info(&self) -> DriverInfo {
        DRIVER_INFO
    }

    async fn list(
        &self,
        dir: Option<&Object>,
        cancel: &CancellationToken,
    ) -> Result<Vec<Object>, DriverError> {
        self.ensure_live()?;
        let dir = dir.unwrap_or(&self.root);
        debug!(path = %dir.path, "SzczkDriver::list");
        items::list_files(&self.client, dir, cancel)
            .await
            .map_err(|e| classify("list", &dir.path, e))
    }

    async fn get(
        &self,
        path: &RemotePath,
        cancel: &CancellationToken,
    ) -> Result<Object, DriverError> {
        self.ensure_live()?;
        if path.is_root() {
            return Ok(self.root.clone());
        }

        debug!(path = %path, "SzczkDriver::get");
        resolve::resolve_path(&self.client, &self.root, path, cancel)
            .await
            .map_err(|e| classify("get", path, e))?
            .ok_or_else(|| DriverError::NotFound(path.to_string()))
    }

    async fn link(&self, file: &Object, cancel: &CancellationToken) -> Result<Link, DriverError> {
        if file.is_folder {
            return Err(DriverError::NotAFile(file.path.to_string()));
        }
        self.ensure_live()?;

        debug!(id = %file.id, "SzczkDriver::link");
        let url = items::get_download_url(&self.client, &file.id, cancel)
            .await
            .map_err(|e| classify("link", &file.id, e))?;

        Ok(Link {
            url,
            content_length: u64::try_from(file.size).ok(),
        })
    }

    async fn make_dir(
        &self,
        _parent: &Object,
        _name: &str,
        _cancel: &CancellationToken,
    ) -> Result<Object, DriverError> {
        Err(DriverError::NotSupported("make_dir"))
    }

    async fn rename(
        &self,
        obj: &Object,
        new_name: &str,
        cancel: &CancellationToken,
    ) -> Result<(), DriverError> {
        self.ensure_live()?;
        // a name must be a single valid path segment
        RemotePath::root().join(new_name)?;

        debug!(id = %obj.id, new_name, "SzczkDriver::rename");
        items::rename_item(&self.client, &obj.id, new_name, cancel)
            .await
            .map_err(|e| classify("rename", &obj.id, e))
    }

    async fn move_item(
        &self,
        obj: &Object,
        dst_dir: &Object,
        cancel: &CancellationToken,
    ) -> Result<(), DriverError> {
        self.ensure_live()?;
        debug!(id = %obj.id, destination = %dst_dir.id, "SzczkDriver::move_item");
        items::move_item(&self.client, &obj.id, &dst_dir.id, cancel)
            .await
            .map_err(|e| classify("move", &obj.id, e))
    }

    async fn remove(&self, obj: &Object, cancel: &CancellationToken) -> Result<(), DriverError> {
        self.ensure_live()?;
        debug!(id = %obj.id, "SzczkDriver::remove");
        items::delete_item(&self.client, &obj.id, cancel)
            .await
            .map_err(|e| classify("remove", &obj.id, e))
    }

    async fn put(
        &self,
        dst_dir: &Object,
        file: FileStream,
        progress: Option<ProgressFn>,
        cancel: &CancellationToken,
    ) -> Result<(), DriverError> {
        self.ensure_live()?;
        let target = dst_dir.path.join(file.name())?;

        debug!(path = %target, size = file.size(), "SzczkDriver::put");
        upload::put_file(&self.client, &dst_dir.id, file, progress, cancel)
            .await
            .map_err(|e| classify("put", &target, e))
    }

    async fn shutdown(&self) -> Result<(), DriverError> {
        self.client.lifecycle().cancel();

        let handle = self.scheduler.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "Token scheduler task ended abnormally");
            }
            info!("Szczk driver shut down");
        }
        Ok(())
    }
}
