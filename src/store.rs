//! Store handle: the minimal facade surface the sync engine needs.
//!
//! Owns the working directory, the commit identity, the serialized task
//! queue and the registry of active sync controllers. Document CRUD lives
//! above this crate; here the working tree is driven only through sync
//! tasks.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::error::SyncError;
use crate::git;
use crate::jsondiff::DiffOptions;
use crate::options::SyncOptions;
use crate::remote::{LibgitEngine, RemoteEngine};
use crate::sync::{Identity, Syncer, TaskQueue};
use crate::types::SyncResult;

/// State shared between the store handle and its controllers.
///
/// Controllers hold a `Weak` back-reference; the store owns the map, so
/// dropping the store tears the cycle down.
pub struct StoreShared {
    pub working_dir: PathBuf,
    pub author: Identity,
    pub committer: Identity,
    pub schema: DiffOptions,
    pub queue: TaskQueue,
    syncers: Mutex<HashMap<String, Arc<Syncer>>>,
}

impl StoreShared {
    pub(crate) fn deregister(&self, remote_name: &str) {
        self.syncers.lock().unwrap().remove(remote_name);
    }
}

/// Handle to one Git-backed document store.
pub struct DocStore {
    shared: Arc<StoreShared>,
}

impl DocStore {
    /// Open the store at `working_dir`, initializing the repository with
    /// an empty first commit when absent.
    ///
    /// Must be called within a tokio runtime; the store spawns its task
    /// queue worker on it.
    pub fn open(
        working_dir: impl AsRef<Path>,
        author_name: &str,
        author_email: &str,
    ) -> Result<Self, SyncError> {
        let working_dir = working_dir.as_ref().to_path_buf();
        git::open_or_init(&working_dir, author_name, author_email)?;
        let author = Identity {
            name: author_name.to_string(),
            email: author_email.to_string(),
        };
        Ok(DocStore {
            shared: Arc::new(StoreShared {
                working_dir,
                committer: author.clone(),
                author,
                schema: DiffOptions::default(),
                queue: TaskQueue::new(),
                syncers: Mutex::new(HashMap::new()),
            }),
        })
    }

    /// Replace the document schema options (array identity keys, plain
    /// text properties) used by conflict merges.
    pub fn with_schema(mut self, schema: DiffOptions) -> Self {
        let shared = Arc::get_mut(&mut self.shared)
            .expect("set the schema before registering controllers");
        shared.schema = schema;
        self
    }

    /// The working directory holding the document files.
    pub fn working_dir(&self) -> &Path {
        &self.shared.working_dir
    }

    /// Register a remote and run its initial push or sync with the
    /// default libgit2 engine.
    pub async fn sync(
        &self,
        options: SyncOptions,
    ) -> Result<(Arc<Syncer>, SyncResult), SyncError> {
        self.sync_with_engine(options, Arc::new(LibgitEngine::new()))
            .await
    }

    /// Register a remote with a caller-supplied engine implementation.
    pub async fn sync_with_engine(
        &self,
        options: SyncOptions,
        engine: Arc<dyn RemoteEngine>,
    ) -> Result<(Arc<Syncer>, SyncResult), SyncError> {
        let syncer = Arc::new(Syncer::new(&self.shared, options, engine)?);
        {
            let mut syncers = self.shared.syncers.lock().unwrap();
            if syncers.contains_key(syncer.remote_name()) {
                return Err(SyncError::SyncWorker {
                    message: format!(
                        "remote '{}' is already registered",
                        syncer.remote_name()
                    ),
                });
            }
            syncers.insert(syncer.remote_name().to_string(), Arc::clone(&syncer));
        }
        let result = match syncer.init().await {
            Ok(result) => result,
            Err(err) => {
                self.shared.deregister(syncer.remote_name());
                return Err(err);
            }
        };
        Ok((syncer, result))
    }

    /// Look up an active controller by remote name.
    pub fn get_sync(&self, remote_name: &str) -> Option<Arc<Syncer>> {
        self.shared.syncers.lock().unwrap().get(remote_name).cloned()
    }

    /// Close and deregister one controller.
    pub fn remove_sync(&self, remote_name: &str) {
        if let Some(syncer) = self.get_sync(remote_name) {
            syncer.close();
        }
    }

    /// Close every controller and the task queue. Idempotent.
    pub fn close(&self) {
        let syncers: Vec<Arc<Syncer>> = {
            let map = self.shared.syncers.lock().unwrap();
            map.values().cloned().collect()
        };
        for syncer in syncers {
            syncer.close();
        }
        self.shared.queue.close();
    }
}

impl Drop for DocStore {
    fn drop(&mut self) {
        self.close();
    }
}
