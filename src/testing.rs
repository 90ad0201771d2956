// src/testing.rs
//! Fake collaborators for unit tests

use crate::recording::{
    AccessControl, Collection, Recording, RecordingContext, SimpleCanonicalizer, User,
};
use crate::storage::{FileKind, LocalLoader, Storage};
use crate::store::MemoryStore;
use crate::utils::config::RecordingConfig;
use crate::utils::errors::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

/// Access control with switchable grants, all granted by default
pub struct TestAccess {
    read: AtomicBool,
    write: AtomicBool,
    admin: AtomicBool,
}

impl TestAccess {
    pub fn new() -> Self {
        Self {
            read: AtomicBool::new(true),
            write: AtomicBool::new(true),
            admin: AtomicBool::new(true),
        }
    }

    pub fn set_read(&self, allowed: bool) {
        self.read.store(allowed, Ordering::SeqCst);
    }

    pub fn set_write(&self, allowed: bool) {
        self.write.store(allowed, Ordering::SeqCst);
    }

    pub fn set_admin(&self, allowed: bool) {
        self.admin.store(allowed, Ordering::SeqCst);
    }
}

impl AccessControl for TestAccess {
    fn can_read_coll(&self, _collection: &dyn Collection) -> bool {
        self.read.load(Ordering::SeqCst)
    }

    fn can_write_coll(&self, _collection: &dyn Collection) -> bool {
        self.write.load(Ordering::SeqCst)
    }

    fn can_admin_coll(&self, _collection: &dyn Collection) -> bool {
        self.admin.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct TestUser {
    name: String,
    temp_dir: PathBuf,
    anonymous: bool,
}

impl TestUser {
    pub fn new(name: &str, temp_dir: PathBuf) -> Self {
        Self {
            name: name.to_string(),
            temp_dir,
            anonymous: false,
        }
    }

    pub fn anonymous(temp_dir: PathBuf) -> Self {
        Self {
            name: "anon".to_string(),
            temp_dir,
            anonymous: true,
        }
    }

    pub fn temp_write_path(&self) -> PathBuf {
        self.temp_dir.clone()
    }
}

impl User for TestUser {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_anonymous(&self) -> bool {
        self.anonymous
    }

    fn temp_write_path(&self) -> PathBuf {
        self.temp_dir.clone()
    }
}

/// Storage whose upload and availability results are scripted
///
/// Remote URLs look like `s3://bucket/<kind>/<filename>`.
pub struct ScriptedStorage {
    upload_ok: AtomicBool,
    available: AtomicBool,
    delete_ok: AtomicBool,
    uploads: AtomicUsize,
    uploaded: Mutex<HashMap<String, FileKind>>,
    deleted: Mutex<Vec<String>>,
}

impl ScriptedStorage {
    pub fn new() -> Self {
        Self {
            upload_ok: AtomicBool::new(true),
            available: AtomicBool::new(true),
            delete_ok: AtomicBool::new(true),
            uploads: AtomicUsize::new(0),
            uploaded: Mutex::new(HashMap::new()),
            deleted: Mutex::new(Vec::new()),
        }
    }

    pub fn set_upload_ok(&self, ok: bool) {
        self.upload_ok.store(ok, Ordering::SeqCst);
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn set_delete_ok(&self, ok: bool) {
        self.delete_ok.store(ok, Ordering::SeqCst);
    }

    /// Upload attempts, successful or not
    pub fn upload_count(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().clone()
    }
}

#[async_trait]
impl Storage for ScriptedStorage {
    async fn upload_file(
        &self,
        _user: &dyn User,
        _collection: &dyn Collection,
        _recording_id: &str,
        filename: &str,
        _local_path: &Path,
        kind: FileKind,
    ) -> bool {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        if !self.upload_ok.load(Ordering::SeqCst) {
            return false;
        }
        self.uploaded.lock().insert(filename.to_string(), kind);
        true
    }

    async fn get_upload_url(&self, filename: &str) -> Option<String> {
        if !self.available.load(Ordering::SeqCst) {
            return None;
        }
        let kind = *self.uploaded.lock().get(filename)?;
        Some(format!("s3://bucket/{}/{}", kind, filename))
    }

    async fn delete_file(&self, location: &str) -> bool {
        if !self.delete_ok.load(Ordering::SeqCst) {
            return false;
        }
        self.deleted.lock().push(location.to_string());
        true
    }
}

/// Collection that deletes removed recordings through its storage
pub struct TestCollection {
    id: String,
    owner: Arc<dyn User>,
    storage: Option<Arc<dyn Storage>>,
    removed: Mutex<Vec<String>>,
    syncs: AtomicUsize,
}

impl TestCollection {
    pub fn new(id: &str, owner: Arc<dyn User>, storage: Option<Arc<dyn Storage>>) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            owner,
            storage,
            removed: Mutex::new(Vec::new()),
            syncs: AtomicUsize::new(0),
        })
    }

    pub fn removed(&self) -> Vec<String> {
        self.removed.lock().clone()
    }

    pub fn sync_count(&self) -> usize {
        self.syncs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Collection for TestCollection {
    fn id(&self) -> &str {
        &self.id
    }

    fn owner(&self) -> Arc<dyn User> {
        Arc::clone(&self.owner)
    }

    fn storage(&self) -> Option<Arc<dyn Storage>> {
        self.storage.clone()
    }

    async fn remove_recording(&self, recording: &Recording, delete: bool) -> Result<()> {
        if delete {
            recording
                .delete_me(self.storage.as_deref())
                .await?
                .into_result()?;
        }
        self.removed.lock().push(recording.id().to_string());
        Ok(())
    }

    fn sync_index(&self, _exists: bool, _do_async: bool) {
        self.syncs.fetch_add(1, Ordering::SeqCst);
    }
}

/// One collection with scripted storage over an in-memory store
pub struct Fixture {
    pub store: Arc<MemoryStore>,
    pub ctx: RecordingContext,
    pub collection: Arc<dyn Collection>,
    pub test_collection: Arc<TestCollection>,
    pub storage: Arc<ScriptedStorage>,
    pub access: Arc<TestAccess>,
    pub user: Arc<TestUser>,
    _temp: TempDir,
}

impl Fixture {
    pub async fn new() -> Self {
        let temp = tempfile::tempdir().unwrap();
        let user = TestUser::new("alice", temp.path().join("tmp"));
        Self::with_user(user, temp)
    }

    /// Owner is anonymous, so commits have no storage
    pub async fn anonymous() -> Self {
        let temp = tempfile::tempdir().unwrap();
        let user = TestUser::anonymous(temp.path().join("tmp"));
        Self::with_user(user, temp)
    }

    fn with_user(user: TestUser, temp: TempDir) -> Self {
        std::fs::create_dir_all(user.temp_write_path()).unwrap();

        let store = Arc::new(MemoryStore::new());
        let access = Arc::new(TestAccess::new());
        let storage = Arc::new(ScriptedStorage::new());
        let user = Arc::new(user);

        let test_collection = TestCollection::new(
            "coll",
            user.clone(),
            Some(storage.clone() as Arc<dyn Storage>),
        );
        let collection: Arc<dyn Collection> = test_collection.clone();

        let ctx = RecordingContext {
            store: store.clone(),
            access: access.clone(),
            loader: Arc::new(LocalLoader::new()),
            canonicalizer: Arc::new(SimpleCanonicalizer),
            config: RecordingConfig::default(),
        };

        Self {
            store,
            ctx,
            collection,
            test_collection,
            storage,
            access,
            user,
            _temp: temp,
        }
    }

    pub async fn new_recording(&self) -> Recording {
        Recording::create(self.ctx.clone(), &self.collection, "test", None, &[])
            .await
            .unwrap()
    }
}
