use std::fs;
use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::Arc;

use sidecar_crypto::ContentHasher;
use sidecar_index::{Manifest, WorkspaceLayout};
use sidecar_queue::OrderedQueue;
use sidecar_store::{ContentStore, TrackedFile};
use sidecar_sync::{Archive, ArchiveLocation};
use tracing::{debug, info};

use crate::error::{SdkError, SdkResult};
use crate::report::{AddOutcome, AddReport, PullOutcome, PullReport, PushReport, StatusReport, StatusState};

/// Worker count for bulk operations when none is given.
pub const DEFAULT_JOBS: NonZeroUsize = match NonZeroUsize::new(10) {
    Some(n) => n,
    None => unreachable!(),
};

/// Result of [`Sidecar::init`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InitOutcome {
    Created,
    AlreadyInitialized,
}

/// One index entry on its way through a bulk operation.
#[derive(Clone, Debug)]
struct WorkItem {
    path: String,
    file: TrackedFile,
}

/// High-level sidecar API over one working tree.
#[derive(Clone, Debug)]
pub struct Sidecar {
    layout: WorkspaceLayout,
    manifest: Manifest,
}

impl Sidecar {
    /// Create the manifest and content store for a new working tree.
    ///
    /// An existing, readable manifest is left untouched.
    pub fn init(layout: &WorkspaceLayout, url: &str) -> SdkResult<InitOutcome> {
        let manifest_path = layout.manifest_path();
        if Manifest::load(&manifest_path).is_ok() {
            return Ok(InitOutcome::AlreadyInitialized);
        }
        ArchiveLocation::parse(url)?;
        layout.store().ensure_dir()?;
        Manifest::new(url).save(&manifest_path)?;
        info!(root = %layout.root().display(), %url, "initialized");
        Ok(InitOutcome::Created)
    }

    /// Load the working tree at `layout`.
    pub fn open(layout: WorkspaceLayout) -> SdkResult<Self> {
        let manifest = Manifest::load(&layout.manifest_path())?;
        Ok(Self { layout, manifest })
    }

    pub fn layout(&self) -> &WorkspaceLayout {
        &self.layout
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Write the manifest back to disk.
    pub fn save(&self) -> SdkResult<()> {
        self.manifest.save(&self.layout.manifest_path())?;
        Ok(())
    }

    // ---- Local operations ----

    /// Tracked paths in lexicographic order.
    pub fn ls(&self) -> Vec<String> {
        self.manifest.index.sorted_keys()
    }

    /// Start tracking each of `paths`, then save the manifest once.
    ///
    /// Per-path problems are reported, not returned; only a failure to save
    /// the manifest is an error. A path enters the index only if its content
    /// reached the store and its link was created.
    pub fn add<S: AsRef<str>>(&mut self, paths: &[S]) -> SdkResult<Vec<AddReport>> {
        let store = self.layout.store();
        let reports: Vec<AddReport> = paths
            .iter()
            .map(|path| {
                let path = path.as_ref();
                AddReport {
                    path: path.to_string(),
                    outcome: self.add_one(&store, path),
                }
            })
            .collect();
        self.save()?;
        Ok(reports)
    }

    fn add_one(&mut self, store: &ContentStore, path: &str) -> AddOutcome {
        let fs_path = self.layout.resolve(path);
        let meta = match fs::symlink_metadata(&fs_path) {
            Ok(meta) => meta,
            Err(e) => return AddOutcome::Unreadable(e.to_string()),
        };
        if meta.file_type().is_symlink() {
            return if self.manifest.index.contains(path) {
                AddOutcome::AlreadyTracked
            } else {
                AddOutcome::Symlink
            };
        }

        let digest = match ContentHasher::hash_file(&fs_path) {
            Ok(digest) => digest,
            Err(e) => return AddOutcome::HashFailed(e.to_string()),
        };
        let file = TrackedFile::new(fs_path, digest);
        let target = match file.link_target(store) {
            Ok(target) => target,
            Err(e) => return AddOutcome::Failed(e.to_string()),
        };
        if let Err(e) = file.add(store) {
            return AddOutcome::Failed(e.to_string());
        }
        if let Some(previous) = self.manifest.index.insert(path, digest) {
            debug!(path, %previous, %digest, "re-added with new content");
        }
        AddOutcome::Added { target }
    }

    // ---- Archive operations ----

    /// The archive URL to use: `url_override` if given, else the manifest's.
    pub fn archive_url<'a>(&'a self, url_override: Option<&'a str>) -> SdkResult<&'a str> {
        url_override
            .or_else(|| self.manifest.settings.url())
            .filter(|url| !url.is_empty())
            .ok_or(SdkError::MissingUrl)
    }

    /// Open the S3 archive named by [`Sidecar::archive_url`].
    pub fn open_archive(&self, url_override: Option<&str>) -> SdkResult<Archive> {
        Ok(Archive::open(self.archive_url(url_override)?)?)
    }

    /// Report whether each tracked file's content is in the archive.
    pub async fn status(
        &self,
        archive: Arc<Archive>,
        jobs: NonZeroUsize,
        on_report: impl FnMut(StatusReport),
    ) -> SdkResult<()> {
        self.run_ordered(
            jobs,
            move |item: WorkItem| {
                let archive = Arc::clone(&archive);
                async move {
                    let state = match archive.exists(&item.file).await {
                        Ok(true) => StatusState::Ok,
                        Ok(false) => StatusState::NotPushed,
                        Err(e) => StatusState::Error(e.to_string()),
                    };
                    StatusReport {
                        path: item.path,
                        state,
                    }
                }
            },
            on_report,
        )
        .await
    }

    /// Upload every tracked blob the archive does not have yet.
    pub async fn push(
        &self,
        archive: Arc<Archive>,
        jobs: NonZeroUsize,
        on_report: impl FnMut(PushReport),
    ) -> SdkResult<()> {
        let store = self.layout.store();
        self.run_ordered(
            jobs,
            move |item: WorkItem| {
                let archive = Arc::clone(&archive);
                let store = store.clone();
                async move {
                    debug!(path = %item.path, "pushing");
                    let result = archive.push(&store, &item.file).await.map_err(SdkError::from);
                    PushReport {
                        path: item.path,
                        result,
                    }
                }
            },
            on_report,
        )
        .await
    }

    /// Make every tracked path a working link to an intact local blob,
    /// downloading blobs that are missing or damaged.
    pub async fn pull(
        &self,
        archive: Arc<Archive>,
        jobs: NonZeroUsize,
        on_report: impl FnMut(PullReport),
    ) -> SdkResult<()> {
        let store = self.layout.store();
        self.run_ordered(
            jobs,
            move |item: WorkItem| {
                let archive = Arc::clone(&archive);
                let store = store.clone();
                async move {
                    let result = pull_one(&archive, store, item.file).await;
                    PullReport {
                        path: item.path,
                        result,
                    }
                }
            },
            on_report,
        )
        .await
    }

    /// Run `transform` over every index entry on `jobs` workers, handing
    /// results to `on_report` in path order as they become available.
    async fn run_ordered<R, F, Fut>(
        &self,
        jobs: NonZeroUsize,
        transform: F,
        mut on_report: impl FnMut(R),
    ) -> SdkResult<()>
    where
        R: Send + 'static,
        F: Fn(WorkItem) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
    {
        let items: Vec<WorkItem> = self
            .manifest
            .index
            .iter()
            .map(|(path, digest)| WorkItem {
                path: path.to_string(),
                file: self.layout.tracked_file(path, *digest),
            })
            .collect();

        let (tx, mut rx) = OrderedQueue::start(jobs, transform);
        let producer = tx.feed(items);
        while let Some(report) = rx.recv().await {
            on_report(report);
        }
        let submitted = producer
            .await
            .map_err(|e| SdkError::Internal(e.to_string()))??;
        debug!(submitted, delivered = rx.delivered(), "bulk operation finished");
        Ok(())
    }
}

async fn pull_one(archive: &Archive, store: ContentStore, file: TrackedFile) -> SdkResult<PullOutcome> {
    let digest = *file.digest();
    let check = store.clone();
    let intact = blocking(move || check.verify_blob(&digest)).await?;
    if !intact {
        debug!(path = %file.path().display(), "pulling");
        archive.pull(&store, &file).await?;
    }
    let repair = blocking(move || file.repair(&store)).await??;
    Ok(PullOutcome {
        downloaded: !intact,
        repair,
    })
}

async fn blocking<T, F>(f: F) -> SdkResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| SdkError::Internal(e.to_string()))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use sidecar_sync::InMemoryBackend;
    use sidecar_types::Digest;
    use std::path::Path;

    const HELLO_HEX: &str = "5d41402abc4b2a76b9719d911017c592";

    struct Workspace {
        dir: tempfile::TempDir,
        sidecar: Sidecar,
        backend: Arc<InMemoryBackend>,
        archive: Arc<Archive>,
    }

    impl Workspace {
        fn root(&self) -> &Path {
            self.dir.path()
        }

        fn write(&self, name: &str, data: &str) {
            let path = self.root().join(name);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).unwrap();
            }
            fs::write(path, data).unwrap();
        }

        async fn status(&self, jobs: usize) -> Vec<String> {
            let mut lines = Vec::new();
            self.sidecar
                .status(self.archive.clone(), NonZeroUsize::new(jobs).unwrap(), |r| {
                    lines.push(r.to_string())
                })
                .await
                .unwrap();
            lines
        }

        async fn push(&self) -> Vec<String> {
            let mut lines = Vec::new();
            self.sidecar
                .push(self.archive.clone(), DEFAULT_JOBS, |r| lines.push(r.to_string()))
                .await
                .unwrap();
            lines
        }

        async fn pull(&self) -> Vec<PullReport> {
            let mut reports = Vec::new();
            self.sidecar
                .pull(self.archive.clone(), DEFAULT_JOBS, |r| reports.push(r))
                .await
                .unwrap();
            reports
        }
    }

    fn workspace(url: &str) -> Workspace {
        let dir = tempfile::tempdir().unwrap();
        let layout = WorkspaceLayout::new(dir.path());
        assert_eq!(Sidecar::init(&layout, url).unwrap(), InitOutcome::Created);
        let sidecar = Sidecar::open(layout).unwrap();
        let backend = Arc::new(InMemoryBackend::new());
        let archive = Arc::new(Archive::with_backend(
            ArchiveLocation::parse(url).unwrap(),
            backend.clone(),
        ));
        Workspace {
            dir,
            sidecar,
            backend,
            archive,
        }
    }

    #[test]
    fn init_creates_manifest_and_store() {
        let ws = workspace("s3://bucket/prefix");
        assert!(ws.root().join("sidecar.json").is_file());
        assert!(ws.root().join(".sidecar").is_dir());
        assert_eq!(ws.sidecar.manifest().settings.url(), Some("s3://bucket/prefix"));
        assert!(ws.sidecar.ls().is_empty());
    }

    #[test]
    fn second_init_leaves_manifest_alone() {
        let ws = workspace("s3://bucket/prefix");
        let layout = ws.sidecar.layout().clone();
        assert_eq!(
            Sidecar::init(&layout, "s3://other/root").unwrap(),
            InitOutcome::AlreadyInitialized
        );
        let reopened = Sidecar::open(layout).unwrap();
        assert_eq!(reopened.manifest().settings.url(), Some("s3://bucket/prefix"));
    }

    #[test]
    fn init_rejects_unsupported_url() {
        let dir = tempfile::tempdir().unwrap();
        let layout = WorkspaceLayout::new(dir.path());
        let err = Sidecar::init(&layout, "ftp://host/path").unwrap_err();
        assert!(matches!(err, SdkError::Archive(sidecar_sync::ArchiveError::Config(_))));
        assert!(!layout.manifest_path().exists());
    }

    #[test]
    fn open_without_init() {
        let dir = tempfile::tempdir().unwrap();
        let err = Sidecar::open(WorkspaceLayout::new(dir.path())).unwrap_err();
        assert!(err.is_not_initialized());
    }

    #[test]
    fn index_only_manifest_keeps_entries_across_add() {
        let dir = tempfile::tempdir().unwrap();
        let layout = WorkspaceLayout::new(dir.path());
        layout.store().ensure_dir().unwrap();
        fs::write(
            layout.manifest_path(),
            format!("{{\"a.txt\": \"{HELLO_HEX}\"}}"),
        )
        .unwrap();
        fs::write(dir.path().join("b.txt"), "bee").unwrap();

        let mut sidecar = Sidecar::open(layout.clone()).unwrap();
        assert_eq!(sidecar.ls(), vec!["a.txt".to_string()]);
        sidecar.add(&["b.txt"]).unwrap();

        let reopened = Sidecar::open(layout).unwrap();
        assert_eq!(
            reopened.ls(),
            vec!["a.txt".to_string(), "b.txt".to_string()]
        );
    }

    #[test]
    fn unrecognised_manifest_is_not_initialized() {
        let dir = tempfile::tempdir().unwrap();
        let layout = WorkspaceLayout::new(dir.path());
        fs::write(layout.manifest_path(), r#"{"version": 2, "files": []}"#).unwrap();
        let err = Sidecar::open(layout.clone()).unwrap_err();
        assert!(err.is_not_initialized());
        assert_eq!(
            Sidecar::init(&layout, "s3://bucket").unwrap(),
            InitOutcome::Created
        );
    }

    #[test]
    fn add_moves_content_and_records_digest() {
        let mut ws = workspace("s3://bucket/prefix");
        ws.write("a.txt", "hello");

        let reports = ws.sidecar.add(&["a.txt"]).unwrap();
        assert_eq!(
            reports[0].to_string(),
            format!("Adding: \"a.txt\" -> \".sidecar/{HELLO_HEX}\"")
        );

        let link = ws.root().join("a.txt");
        assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
        assert_eq!(fs::read_link(&link).unwrap(), Path::new(".sidecar").join(HELLO_HEX));
        assert_eq!(fs::read_to_string(&link).unwrap(), "hello");

        // Saved to disk, not just in memory.
        let reopened = Sidecar::open(ws.sidecar.layout().clone()).unwrap();
        assert_eq!(
            reopened.manifest().index.get("a.txt"),
            Some(&Digest::from_hex(HELLO_HEX).unwrap())
        );
    }

    #[test]
    fn add_classifies_links_and_failures() {
        let mut ws = workspace("s3://bucket");
        ws.write("a.txt", "hello");
        ws.write("data/nested.bin", "payload");
        fs::create_dir(ws.root().join("emptydir")).unwrap();
        std::os::unix::fs::symlink("a.txt", ws.root().join("alias")).unwrap();

        ws.sidecar.add(&["a.txt"]).unwrap();
        let reports = ws
            .sidecar
            .add(&["a.txt", "alias", "missing", "emptydir", "data/nested.bin"])
            .unwrap();
        let outcomes: Vec<&AddOutcome> = reports.iter().map(|r| &r.outcome).collect();

        assert_eq!(outcomes[0], &AddOutcome::AlreadyTracked);
        assert_eq!(outcomes[1], &AddOutcome::Symlink);
        assert!(matches!(outcomes[2], AddOutcome::Unreadable(_)));
        assert!(matches!(outcomes[3], AddOutcome::HashFailed(_)));
        assert!(matches!(outcomes[4], AddOutcome::Added { target } if target.starts_with("../.sidecar")));

        assert_eq!(ws.sidecar.ls(), vec!["a.txt".to_string(), "data/nested.bin".to_string()]);
    }

    #[test]
    fn identical_content_shares_one_blob() {
        let mut ws = workspace("s3://bucket");
        ws.write("one", "same");
        ws.write("two", "same");
        ws.sidecar.add(&["one", "two"]).unwrap();

        let blobs = fs::read_dir(ws.root().join(".sidecar")).unwrap().count();
        assert_eq!(blobs, 1);
        assert_eq!(fs::read_to_string(ws.root().join("one")).unwrap(), "same");
        assert_eq!(fs::read_to_string(ws.root().join("two")).unwrap(), "same");
    }

    #[test]
    fn archive_url_prefers_override() {
        let ws = workspace("s3://bucket/prefix");
        assert_eq!(ws.sidecar.archive_url(None).unwrap(), "s3://bucket/prefix");
        assert_eq!(ws.sidecar.archive_url(Some("s3://x/y")).unwrap(), "s3://x/y");

        let dir = tempfile::tempdir().unwrap();
        let layout = WorkspaceLayout::new(dir.path());
        Manifest::default().save(&layout.manifest_path()).unwrap();
        let bare = Sidecar::open(layout).unwrap();
        assert!(matches!(bare.archive_url(None), Err(SdkError::MissingUrl)));
    }

    #[tokio::test]
    async fn push_status_pull_round_trip() {
        let mut ws = workspace("s3://bucket/prefix");
        ws.write("a.txt", "hello");
        ws.sidecar.add(&["a.txt"]).unwrap();

        assert_eq!(ws.status(10).await, vec!["\"a.txt\": not pushed"]);
        assert_eq!(ws.push().await, vec!["Pushed \"a.txt\""]);
        assert_eq!(ws.backend.keys(), vec![format!("prefix/{HELLO_HEX}")]);
        assert_eq!(ws.status(10).await, vec!["\"a.txt\": ok"]);

        // A fresh clone: manifest only, no store content, no link.
        fs::remove_file(ws.root().join("a.txt")).unwrap();
        fs::remove_file(ws.root().join(".sidecar").join(HELLO_HEX)).unwrap();

        let reports = ws.pull().await;
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].to_string(), "Pulled \"a.txt\"");
        let outcome = reports[0].result.as_ref().unwrap();
        assert!(outcome.downloaded);
        assert_eq!(outcome.repair, sidecar_store::RepairAction::Created);

        let file = ws.sidecar.layout().tracked_file("a.txt", Digest::from_hex(HELLO_HEX).unwrap());
        assert!(file.verify());
    }

    #[tokio::test]
    async fn pull_skips_download_for_intact_blob() {
        let mut ws = workspace("s3://bucket/prefix");
        ws.write("a.txt", "hello");
        ws.sidecar.add(&["a.txt"]).unwrap();
        fs::remove_file(ws.root().join("a.txt")).unwrap();

        // Nothing in the archive, but nothing needs downloading either.
        let reports = ws.pull().await;
        let outcome = reports[0].result.as_ref().unwrap();
        assert!(!outcome.downloaded);
        assert_eq!(outcome.repair, sidecar_store::RepairAction::Created);
    }

    #[tokio::test]
    async fn pull_reports_corrupt_archive_copy() {
        let mut ws = workspace("s3://bucket/prefix");
        ws.write("a.txt", "hello");
        ws.sidecar.add(&["a.txt"]).unwrap();
        ws.push().await;
        ws.backend.corrupt_data(&format!("prefix/{HELLO_HEX}"), "jello");
        fs::remove_file(ws.root().join(".sidecar").join(HELLO_HEX)).unwrap();

        let reports = ws.pull().await;
        let line = reports[0].to_string();
        assert!(line.starts_with("Problem pulling \"a.txt\": integrity error"), "{line}");
        let file = ws.sidecar.layout().tracked_file("a.txt", Digest::from_hex(HELLO_HEX).unwrap());
        assert!(!file.verify());
    }

    #[tokio::test]
    async fn status_marks_corrupt_archive_copy_not_pushed() {
        let mut ws = workspace("s3://bucket/prefix");
        ws.write("a.txt", "hello");
        ws.sidecar.add(&["a.txt"]).unwrap();
        ws.backend.insert(format!("prefix/{HELLO_HEX}"), "jello");

        assert_eq!(ws.status(1).await, vec!["\"a.txt\": not pushed"]);
        assert_eq!(ws.push().await, vec!["Pushed \"a.txt\""]);
        assert_eq!(ws.status(1).await, vec!["\"a.txt\": ok"]);
    }

    #[tokio::test]
    async fn status_reports_backend_errors_per_file() {
        let mut ws = workspace("s3://bucket/prefix");
        ws.write("a.txt", "hello");
        ws.sidecar.add(&["a.txt"]).unwrap();
        ws.backend.set_offline(true);

        let lines = ws.status(4).await;
        assert_eq!(lines, vec!["\"a.txt\": network error: backend is offline"]);

        let mut pushes = Vec::new();
        ws.sidecar
            .push(ws.archive.clone(), DEFAULT_JOBS, |r| pushes.push(r))
            .await
            .unwrap();
        assert!(pushes[0].result.is_err());
        assert!(pushes[0].to_string().starts_with("Problem pushing \"a.txt\": "));
    }

    #[tokio::test]
    async fn reports_arrive_in_path_order() {
        let mut ws = workspace("s3://bucket");
        let names: Vec<String> = (0..40).rev().map(|i| format!("f{i:02}")).collect();
        for name in &names {
            ws.write(name, name);
        }
        ws.sidecar.add(&names[..]).unwrap();
        ws.push().await;

        let lines = ws.status(3).await;
        let expected: Vec<String> = (0..40).map(|i| format!("\"f{i:02}\": ok")).collect();
        assert_eq!(lines, expected);
    }

    #[tokio::test]
    async fn empty_index_reports_nothing() {
        let ws = workspace("s3://bucket");
        assert!(ws.status(10).await.is_empty());
        assert!(ws.push().await.is_empty());
        assert!(ws.pull().await.is_empty());
    }
}
