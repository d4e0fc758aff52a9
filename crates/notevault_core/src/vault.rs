//! Composition root wiring one store and one blob root into the services.
//!
//! # Responsibility
//! - Create the persisted layout under the configured data directory.
//! - Share one `Store` and one `FsBlobStore` across every service.

use crate::blob::FsBlobStore;
use crate::config::CoreConfig;
use crate::error::{CoreResult, StorageError};
use crate::service::attachment_service::AttachmentService;
use crate::service::backup_service::BackupService;
use crate::service::folder_service::FolderService;
use crate::service::note_service::NoteService;
use crate::store::Store;
use log::info;
use std::sync::Arc;

/// Opened vault with all services bound to the same store.
pub struct NoteVault {
    config: CoreConfig,
    folders: FolderService,
    notes: NoteService<FsBlobStore>,
    attachments: AttachmentService<FsBlobStore>,
    backups: BackupService<FsBlobStore>,
}

impl NoteVault {
    /// Opens (creating when missing) the database and directories described
    /// by `config`.
    pub fn open(config: CoreConfig) -> CoreResult<Self> {
        std::fs::create_dir_all(&config.data_dir)
            .map_err(|err| StorageError::io("create_dir", &config.data_dir, err))?;
        let store = Arc::new(Store::open(&config.database_file)?);
        Self::with_store(config, store)
    }

    /// Binds services to an already opened store.
    pub fn with_store(config: CoreConfig, store: Arc<Store>) -> CoreResult<Self> {
        let blobs = Arc::new(FsBlobStore::open(&config.upload_dir)?);
        info!(
            "event=vault_open module=vault status=ok data_dir={} upload_max_files={} upload_max_bytes={}",
            config.data_dir.display(),
            config.upload_limits.max_files,
            config.upload_limits.max_file_bytes
        );
        Ok(Self {
            folders: FolderService::new(Arc::clone(&store)),
            notes: NoteService::new(Arc::clone(&store), Arc::clone(&blobs)),
            attachments: AttachmentService::new(Arc::clone(&store), Arc::clone(&blobs), &config),
            backups: BackupService::new(store, blobs, config.export_dir.clone()),
            config,
        })
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn folders(&self) -> &FolderService {
        &self.folders
    }

    pub fn notes(&self) -> &NoteService<FsBlobStore> {
        &self.notes
    }

    pub fn attachments(&self) -> &AttachmentService<FsBlobStore> {
        &self.attachments
    }

    pub fn backups(&self) -> &BackupService<FsBlobStore> {
        &self.backups
    }
}
