//! Parallel directory walker.
//!
//! The walk is an explicit frontier of jobs on a fixed rayon pool. Listing a
//! directory spawns one job per subdirectory and one per batch of files, and
//! no job ever waits on another, so worker stacks stay flat however deep the
//! tree goes. Every directory is a [`DirNode`] with a pending-work counter;
//! the node completes once its listing, its file batches and every
//! subdirectory below it have completed, and its subtree [`WalkCounts`] are
//! then folded into its parent. Records and warnings flow into an
//! [`Aggregator`].

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use globset::GlobSet;
use rayon::{Scope, ThreadPool, ThreadPoolBuilder};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use fstimeline_core::{ScanConfig, ScanError, ScanWarning, Timeline, WarningKind};

use crate::aggregate::{Aggregator, AggregatorSink};
use crate::extract::MetadataExtractor;
use crate::inode::DirKey;
use crate::owner::OwnerResolver;
use crate::progress::{ProgressCounters, ScanProgress};

/// A progress snapshot is broadcast every this many files.
const PROGRESS_INTERVAL: u64 = 1000;

/// Files extracted by one job.
const FILE_BATCH: usize = 32;

/// Parallel walker producing a [`Timeline`].
pub struct Walker {
    config: ScanConfig,
    pool: ThreadPool,
    ignore: GlobSet,
    extractor: MetadataExtractor,
    progress_tx: broadcast::Sender<ScanProgress>,
    cancel: CancellationToken,
}

impl Walker {
    /// Create a walker with its own worker pool.
    ///
    /// `config.threads == 0` sizes the pool to the number of CPUs.
    pub fn new(config: ScanConfig) -> Result<Self, ScanError> {
        let ignore = config.ignore_matcher()?;
        let pool = ThreadPoolBuilder::new()
            .num_threads(config.threads)
            .thread_name(|i| format!("fstimeline-walk-{i}"))
            .build()
            .map_err(|e| ScanError::Other {
                message: format!("failed to start worker pool: {e}"),
            })?;
        let (progress_tx, _) = broadcast::channel(100);

        Ok(Self {
            extractor: MetadataExtractor::from_config(&config),
            config,
            pool,
            ignore,
            progress_tx,
            cancel: CancellationToken::new(),
        })
    }

    /// Use a specific owner resolver instead of the platform default.
    pub fn with_resolver(mut self, resolver: Arc<dyn OwnerResolver>) -> Self {
        self.extractor = MetadataExtractor::new(resolver, self.config.follow_symlinks);
        self
    }

    /// Use an externally owned cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Token that stops in-progress and future walks when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Subscribe to scan progress updates.
    pub fn subscribe(&self) -> broadcast::Receiver<ScanProgress> {
        self.progress_tx.subscribe()
    }

    /// The configuration this walker was built with.
    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Number of worker threads.
    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Walk the configured root.
    pub fn scan(&self) -> Result<Timeline, ScanError> {
        self.walk(&self.config.root)
    }

    /// Walk `dir` and every directory below it.
    ///
    /// Fails only when `dir` itself cannot be used as a root. Anything that
    /// goes wrong further down is recorded as a warning in the returned
    /// timeline.
    pub fn walk(&self, dir: &Path) -> Result<Timeline, ScanError> {
        let start = Instant::now();
        let root = resolve_root(dir)?;

        info!(
            root = %root.display(),
            threads = self.threads(),
            owner = self.extractor.resolver().name(),
            "starting scan"
        );

        let aggregator = Aggregator::new();
        let counters = ProgressCounters::new();
        let skipped = AtomicBool::new(false);
        let cancel = self.cancel.child_token();
        let root_node = DirNode::root(root.clone());

        {
            let ctx = WalkContext {
                walker: self,
                sink: aggregator.sink(),
                counters: &counters,
                cancel: &cancel,
                deadline: self.config.timeout.map(|t| start + t),
                skipped: &skipped,
            };
            self.pool
                .install(|| rayon::scope(|s| ctx.visit_dir(s, Arc::clone(&root_node))));
        }
        let counts = root_node.counts.load();

        let (events, mut warnings) = aggregator.finish();
        debug_assert_eq!(counts.files, events.len() as u64);

        let cancelled = skipped.load(Ordering::Relaxed);
        if cancelled {
            warn!(root = %root.display(), "scan cancelled, results are partial");
            warnings.push(ScanWarning::cancelled(&root));
        }

        let _ = self
            .progress_tx
            .send(counters.snapshot(root.clone(), true));

        let mut timeline = Timeline::new(root, events, warnings, start.elapsed(), cancelled);
        timeline.stats.record_dirs(counts.dirs, counts.max_depth);

        info!(
            files = timeline.total_files(),
            dirs = counts.dirs,
            warnings = timeline.warnings.len(),
            elapsed_ms = timeline.scan_duration.as_millis() as u64,
            "scan finished"
        );
        Ok(timeline)
    }
}

/// Canonicalize a root path, rejecting anything that cannot be walked.
fn resolve_root(dir: &Path) -> Result<PathBuf, ScanError> {
    if dir.as_os_str().is_empty() {
        return Err(ScanError::InvalidArgument {
            message: "root path is empty".to_string(),
        });
    }
    let root = dir.canonicalize().map_err(|e| ScanError::InvalidArgument {
        message: format!("root path {} is not accessible: {e}", dir.display()),
    })?;
    if !root.is_dir() {
        return Err(ScanError::NotADirectory { path: root });
    }
    Ok(root)
}

/// Totals for one subtree.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct WalkCounts {
    pub files: u64,
    pub dirs: u64,
    pub warnings: u64,
    pub max_depth: u32,
}

impl WalkCounts {
    fn merge(self, other: Self) -> Self {
        Self {
            files: self.files + other.files,
            dirs: self.dirs + other.dirs,
            warnings: self.warnings + other.warnings,
            max_depth: self.max_depth.max(other.max_depth),
        }
    }

    fn warning() -> Self {
        Self {
            warnings: 1,
            ..Self::default()
        }
    }
}

/// [`WalkCounts`] that several jobs add into at once.
#[derive(Debug, Default)]
struct SharedCounts {
    files: AtomicU64,
    dirs: AtomicU64,
    warnings: AtomicU64,
    max_depth: AtomicU32,
}

impl SharedCounts {
    fn add(&self, counts: WalkCounts) {
        self.files.fetch_add(counts.files, Ordering::Relaxed);
        self.dirs.fetch_add(counts.dirs, Ordering::Relaxed);
        self.warnings.fetch_add(counts.warnings, Ordering::Relaxed);
        self.max_depth.fetch_max(counts.max_depth, Ordering::Relaxed);
    }

    fn load(&self) -> WalkCounts {
        WalkCounts {
            files: self.files.load(Ordering::Relaxed),
            dirs: self.dirs.load(Ordering::Relaxed),
            warnings: self.warnings.load(Ordering::Relaxed),
            max_depth: self.max_depth.load(Ordering::Relaxed),
        }
    }
}

/// One directory in the frontier.
///
/// `pending` starts at one for the directory's own listing and grows by one
/// for every file batch and subdirectory spawned from it. Whoever brings it
/// to zero folds `counts` into the parent.
#[derive(Debug)]
struct DirNode {
    path: PathBuf,
    depth: u32,
    parent: Option<Arc<DirNode>>,
    /// Set once the directory is entered with symlinks followed.
    key: OnceLock<DirKey>,
    pending: AtomicUsize,
    counts: SharedCounts,
}

impl DirNode {
    fn root(path: PathBuf) -> Arc<Self> {
        Arc::new(Self {
            path,
            depth: 0,
            parent: None,
            key: OnceLock::new(),
            pending: AtomicUsize::new(1),
            counts: SharedCounts::default(),
        })
    }

    fn child(self: &Arc<Self>, path: PathBuf) -> Arc<Self> {
        Arc::new(Self {
            path,
            depth: self.depth + 1,
            parent: Some(Arc::clone(self)),
            key: OnceLock::new(),
            pending: AtomicUsize::new(1),
            counts: SharedCounts::default(),
        })
    }

    fn ancestors(&self) -> impl Iterator<Item = &DirNode> {
        std::iter::successors(self.parent.as_deref(), |node| node.parent.as_deref())
    }

    /// Check if `key` is already open on the path from the root to here.
    fn loops_back(&self, key: &DirKey) -> bool {
        self.ancestors().any(|node| node.key.get() == Some(key))
    }
}

// Unlink the parent chain iteratively so dropping a deep branch cannot
// recurse once per level.
impl Drop for DirNode {
    fn drop(&mut self) {
        let mut parent = self.parent.take();
        while let Some(node) = parent {
            parent = match Arc::try_unwrap(node) {
                Ok(mut node) => node.parent.take(),
                Err(_) => None,
            };
        }
    }
}

/// Immediate children of one directory, split by kind.
#[derive(Debug, Default)]
struct Listing {
    files: Vec<PathBuf>,
    subdirs: Vec<PathBuf>,
    warnings: u64,
}

/// State shared by every worker for the duration of one walk.
struct WalkContext<'a> {
    walker: &'a Walker,
    sink: AggregatorSink,
    counters: &'a ProgressCounters,
    cancel: &'a CancellationToken,
    deadline: Option<Instant>,
    skipped: &'a AtomicBool,
}

impl WalkContext<'_> {
    fn should_stop(&self) -> bool {
        if self.cancel.is_cancelled() {
            return true;
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                self.cancel.cancel();
                return true;
            }
        }
        false
    }

    fn mark_skipped(&self) {
        self.skipped.store(true, Ordering::Relaxed);
    }

    fn warn(&self, warning: ScanWarning) -> WalkCounts {
        warn!(path = %warning.path.display(), kind = ?warning.kind, "{}", warning.message);
        self.counters.record_error();
        self.sink.warn(warning);
        WalkCounts::warning()
    }

    /// Finish one unit of `node`'s work, then walk up through every
    /// ancestor that this completes.
    fn complete(&self, mut node: Arc<DirNode>) {
        loop {
            if node.pending.fetch_sub(1, Ordering::AcqRel) != 1 {
                return;
            }
            let Some(parent) = node.parent.clone() else {
                return;
            };
            parent.counts.add(node.counts.load());
            node = parent;
        }
    }

    fn visit_dir<'s>(&'s self, scope: &Scope<'s>, node: Arc<DirNode>) {
        let own = self.enter_dir(&node);
        node.counts.add(own);
        if own.dirs == 0 {
            return self.complete(node);
        }

        let listing = match self.list_dir(&node.path, node.depth) {
            Ok(listing) => listing,
            Err(err) => {
                node.counts.add(self.warn(err.into_warning(&node.path)));
                return self.complete(node);
            }
        };
        debug!(
            dir = %node.path.display(),
            files = listing.files.len(),
            subdirs = listing.subdirs.len(),
            "enumerated directory"
        );
        node.counts.add(WalkCounts {
            warnings: listing.warnings,
            ..WalkCounts::default()
        });

        let batches = listing.files.len().div_ceil(FILE_BATCH);
        node.pending
            .fetch_add(batches + listing.subdirs.len(), Ordering::AcqRel);

        for batch in listing.files.chunks(FILE_BATCH) {
            let batch = batch.to_vec();
            let owner = Arc::clone(&node);
            scope.spawn(move |_| self.visit_files(&batch, owner));
        }
        for sub in listing.subdirs {
            let child = node.child(sub);
            scope.spawn(move |s| self.visit_dir(s, child));
        }

        self.complete(node);
    }

    /// Decide whether to list `node`. Returns its own counts; `dirs` is zero
    /// when it is skipped.
    fn enter_dir(&self, node: &DirNode) -> WalkCounts {
        if self.should_stop() {
            self.mark_skipped();
            return WalkCounts::default();
        }

        if self.walker.config.follow_symlinks {
            match fs::metadata(&node.path) {
                Ok(metadata) => {
                    let key = DirKey::of(&node.path, &metadata);
                    if node.loops_back(&key) {
                        return self.warn(ScanWarning::symlink_cycle(&node.path));
                    }
                    let _ = node.key.set(key);
                }
                Err(err) => {
                    return self.warn(ScanError::io(&node.path, err).into_warning(&node.path));
                }
            }
        }

        self.counters.record_dir();
        WalkCounts {
            dirs: 1,
            max_depth: node.depth,
            ..WalkCounts::default()
        }
    }

    fn visit_files(&self, batch: &[PathBuf], node: Arc<DirNode>) {
        let counts = batch
            .iter()
            .map(|file| self.visit_file(file))
            .fold(WalkCounts::default(), WalkCounts::merge);
        node.counts.add(counts);
        self.complete(node);
    }

    fn visit_file(&self, path: &Path) -> WalkCounts {
        if self.should_stop() {
            self.mark_skipped();
            return WalkCounts::default();
        }

        match self.walker.extractor.extract(path) {
            Ok(event) => {
                let seen = self.counters.record_file(event.size);
                self.sink.record(event);
                if seen % PROGRESS_INTERVAL == 0 {
                    let current = path.parent().map(Path::to_path_buf).unwrap_or_default();
                    let _ = self
                        .walker
                        .progress_tx
                        .send(self.counters.snapshot(current, false));
                }
                WalkCounts {
                    files: 1,
                    ..WalkCounts::default()
                }
            }
            Err(err) => self.warn(err.into_warning(path)),
        }
    }

    fn list_dir(&self, dir: &Path, depth: u32) -> Result<Listing, ScanError> {
        let config = &self.walker.config;
        let descend = config.allows_depth(depth + 1);
        let mut listing = Listing::default();

        for entry in fs::read_dir(dir).map_err(|e| ScanError::io(dir, e))? {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    self.warn(ScanWarning::read_error(dir, &err));
                    listing.warnings += 1;
                    continue;
                }
            };

            let name = entry.file_name();
            let name = name.to_string_lossy();
            if config.should_skip_hidden(&name) || self.walker.ignore.is_match(&*name) {
                continue;
            }

            let path = entry.path();
            if config.is_excluded(&path) {
                continue;
            }

            let file_type = match entry.file_type() {
                Ok(file_type) => file_type,
                Err(err) => {
                    self.warn(ScanWarning::new(
                        &path,
                        err.to_string(),
                        WarningKind::MetadataError,
                    ));
                    listing.warnings += 1;
                    continue;
                }
            };

            let (is_dir, is_file) = if file_type.is_symlink() {
                if !config.follow_symlinks {
                    continue;
                }
                match fs::metadata(&path) {
                    Ok(target) => (target.is_dir(), target.is_file()),
                    Err(err) => {
                        self.warn(ScanError::io(&path, err).into_warning(&path));
                        listing.warnings += 1;
                        continue;
                    }
                }
            } else {
                (file_type.is_dir(), file_type.is_file())
            };

            if is_file {
                listing.files.push(path);
            } else if is_dir && descend {
                listing.subdirs.push(path);
            }
        }

        Ok(listing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::owner::NoopOwnerResolver;
    use tempfile::TempDir;

    fn create_test_tree() -> TempDir {
        let temp = TempDir::new().unwrap();
        let root = temp.path();

        fs::create_dir(root.join("dir1")).unwrap();
        fs::create_dir(root.join("dir2")).unwrap();
        fs::create_dir(root.join("dir1/subdir")).unwrap();

        fs::write(root.join("file1.txt"), "hello").unwrap();
        fs::write(root.join("dir1/file2.txt"), "world world world").unwrap();
        fs::write(root.join("dir1/subdir/file3.txt"), "test").unwrap();
        fs::write(root.join("dir2/file4.txt"), "another file here").unwrap();

        temp
    }

    fn walker(config: ScanConfig) -> Walker {
        Walker::new(config)
            .unwrap()
            .with_resolver(Arc::new(NoopOwnerResolver))
    }

    #[test]
    fn test_basic_walk() {
        let temp = create_test_tree();
        let timeline = walker(ScanConfig::new(temp.path())).scan().unwrap();

        assert_eq!(timeline.stats.total_files, 4);
        // root, dir1, dir2, subdir
        assert_eq!(timeline.stats.total_dirs, 4);
        assert_eq!(timeline.stats.max_depth, 2);
        assert_eq!(timeline.total_size(), 5 + 17 + 4 + 17);
        assert!(!timeline.has_warnings());
        assert!(timeline.is_complete());
    }

    #[test]
    fn test_merge_counts() {
        let a = WalkCounts {
            files: 2,
            dirs: 1,
            warnings: 0,
            max_depth: 3,
        };
        let b = WalkCounts {
            files: 1,
            dirs: 2,
            warnings: 1,
            max_depth: 1,
        };
        assert_eq!(
            a.merge(b),
            WalkCounts {
                files: 3,
                dirs: 3,
                warnings: 1,
                max_depth: 3,
            }
        );
        assert_eq!(a.merge(WalkCounts::default()), a);
    }

    #[test]
    fn test_walk_rejects_file_root() {
        let temp = create_test_tree();
        let err = walker(ScanConfig::new(temp.path()))
            .walk(&temp.path().join("file1.txt"))
            .unwrap_err();
        assert!(matches!(err, ScanError::NotADirectory { .. }));
    }

    #[test]
    fn test_walk_rejects_missing_root() {
        let temp = TempDir::new().unwrap();
        let err = walker(ScanConfig::new(temp.path()))
            .walk(&temp.path().join("nope"))
            .unwrap_err();
        assert!(matches!(err, ScanError::InvalidArgument { .. }));

        let err = walker(ScanConfig::new(temp.path()))
            .walk(Path::new(""))
            .unwrap_err();
        assert!(matches!(err, ScanError::InvalidArgument { .. }));
    }

    #[test]
    fn test_invalid_ignore_pattern() {
        let mut config = ScanConfig::new(".");
        config.ignore_patterns = vec!["[".to_string()];
        assert!(matches!(
            Walker::new(config),
            Err(ScanError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_explicit_pool_size() {
        let mut config = ScanConfig::new(".");
        config.threads = 3;
        assert_eq!(walker(config).threads(), 3);
    }

    #[test]
    fn test_deadline_already_passed() {
        let temp = create_test_tree();
        let mut config = ScanConfig::new(temp.path());
        config.timeout = Some(std::time::Duration::ZERO);

        let walker = walker(config);
        let timeline = walker.scan().unwrap();

        assert!(timeline.cancelled);
        assert!(timeline.events.is_empty());
        assert_eq!(timeline.warnings.len(), 1);
        assert_eq!(timeline.warnings[0].kind, WarningKind::Cancelled);
        // The deadline only stops this walk's child token
        assert!(!walker.cancellation_token().is_cancelled());
    }

    #[test]
    fn test_file_failures_isolated_within_batch() {
        let temp = create_test_tree();
        let root = temp.path().canonicalize().unwrap();
        let walker = walker(ScanConfig::new(&root));

        // Listed, then gone or replaced by a directory before extraction
        let batch = vec![
            root.join("file1.txt"),
            root.join("gone.txt"),
            root.join("dir2"),
            root.join("dir1/file2.txt"),
        ];

        let aggregator = Aggregator::new();
        let counters = ProgressCounters::new();
        let skipped = AtomicBool::new(false);
        let cancel = CancellationToken::new();
        let node = DirNode::root(root.clone());
        {
            let ctx = WalkContext {
                walker: &walker,
                sink: aggregator.sink(),
                counters: &counters,
                cancel: &cancel,
                deadline: None,
                skipped: &skipped,
            };
            ctx.visit_files(&batch, Arc::clone(&node));
        }

        let (events, warnings) = aggregator.finish();
        let mut names: Vec<_> = events.iter().map(|e| e.name.to_string()).collect();
        names.sort();
        assert_eq!(names, vec!["file1.txt", "file2.txt"]);

        assert_eq!(warnings.len(), 2);
        let gone = warnings.iter().find(|w| w.path == root.join("gone.txt")).unwrap();
        assert_eq!(gone.kind, WarningKind::NotFound);
        let dir = warnings.iter().find(|w| w.path == root.join("dir2")).unwrap();
        assert_eq!(dir.kind, WarningKind::MetadataError);

        let counts = node.counts.load();
        assert_eq!(counts.files, 2);
        assert_eq!(counts.warnings, 2);
        assert_eq!(node.pending.load(Ordering::Relaxed), 0);
        assert!(!skipped.load(Ordering::Relaxed));
    }

    #[test]
    fn test_completion_folds_into_ancestors() {
        let temp = TempDir::new().unwrap();
        let walker = walker(ScanConfig::new(temp.path()));
        let aggregator = Aggregator::new();
        let counters = ProgressCounters::new();
        let skipped = AtomicBool::new(false);
        let cancel = CancellationToken::new();
        let ctx = WalkContext {
            walker: &walker,
            sink: aggregator.sink(),
            counters: &counters,
            cancel: &cancel,
            deadline: None,
            skipped: &skipped,
        };

        let root = DirNode::root(PathBuf::from("/r"));
        let child = root.child(PathBuf::from("/r/c"));
        let leaf = child.child(PathBuf::from("/r/c/l"));
        assert_eq!(leaf.depth, 2);

        // root and child each wait on their listing plus one subdirectory
        root.pending.fetch_add(1, Ordering::Relaxed);
        child.pending.fetch_add(1, Ordering::Relaxed);
        child.counts.add(WalkCounts {
            dirs: 1,
            max_depth: 1,
            ..WalkCounts::default()
        });
        leaf.counts.add(WalkCounts {
            files: 3,
            dirs: 1,
            warnings: 1,
            max_depth: 2,
        });

        ctx.complete(Arc::clone(&root));
        ctx.complete(Arc::clone(&child));
        assert_eq!(root.counts.load(), WalkCounts::default());

        ctx.complete(leaf);
        assert_eq!(
            root.counts.load(),
            WalkCounts {
                files: 3,
                dirs: 2,
                warnings: 1,
                max_depth: 2,
            }
        );
        assert_eq!(root.pending.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_loops_back_only_on_ancestors() {
        let key = |inode| DirKey::Inode { device: 1, inode };

        let root = DirNode::root(PathBuf::from("/r"));
        let _ = root.key.set(key(1));
        let a = root.child(PathBuf::from("/r/a"));
        let _ = a.key.set(key(2));
        let sibling = root.child(PathBuf::from("/r/b"));
        let _ = sibling.key.set(key(3));
        let below = a.child(PathBuf::from("/r/a/x"));

        assert!(below.loops_back(&key(1)));
        assert!(below.loops_back(&key(2)));
        // Reachable elsewhere in the tree, but not an ancestor
        assert!(!below.loops_back(&key(3)));
        assert!(!root.loops_back(&key(1)));
    }

    #[test]
    fn test_dropping_deep_branch() {
        let root = DirNode::root(PathBuf::from("/r"));
        let mut node = Arc::clone(&root);
        for i in 0..100_000 {
            node = node.child(PathBuf::from(format!("/r/{i}")));
        }
        assert_eq!(node.depth, 100_000);
        assert_eq!(node.ancestors().count(), 100_000);

        // The leaf holds the only reference to every node but the root
        drop(node);
        assert_eq!(Arc::strong_count(&root), 1);
    }
}
