//! Live change notifications for library roots.

use crate::config::VideoFormat;
use crate::error::Result;
use crate::fs::is_hidden_below;
use notify::event::{CreateKind, ModifyKind, RenameMode};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

/// What happened to a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WatchEventKind {
    /// A file appeared.
    Added,
    /// A file or directory disappeared.
    Removed,
    /// A file's content or metadata changed.
    Changed,
}

/// A single filesystem notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    /// Kind of change.
    pub kind: WatchEventKind,
    /// Affected path.
    pub path: PathBuf,
    /// Subscription that produced the event.
    pub generation: u64,
}

/// Where watch events are delivered.
pub type EventSink = mpsc::UnboundedSender<WatchEvent>;

/// An active subscription; dropping it stops delivery.
pub trait Subscription: Send {
    /// Roots covered by this subscription.
    fn roots(&self) -> &[PathBuf];
}

/// Change-notification provider.
pub trait ChangeNotifier: Send + Sync {
    /// Start delivering events for `roots` to `sink`, tagged with `generation`.
    fn subscribe(
        &self,
        roots: &[PathBuf],
        generation: u64,
        sink: EventSink,
    ) -> Result<Box<dyn Subscription>>;
}

/// Notifier backed by the platform watcher (inotify, FSEvents, ReadDirectoryChangesW).
#[derive(Debug, Clone, Copy, Default)]
pub struct NotifyWatcher;

struct NotifySubscription {
    roots: Vec<PathBuf>,
    _watcher: RecommendedWatcher,
}

impl Subscription for NotifySubscription {
    fn roots(&self) -> &[PathBuf] {
        &self.roots
    }
}

impl ChangeNotifier for NotifyWatcher {
    fn subscribe(
        &self,
        roots: &[PathBuf],
        generation: u64,
        sink: EventSink,
    ) -> Result<Box<dyn Subscription>> {
        let watched = roots.to_vec();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    for watch_event in classify(event, &watched, generation) {
                        tracing::debug!(?watch_event, "File watch event");
                        if sink.send(watch_event).is_err() {
                            // Receiver gone: the engine was dropped.
                            return;
                        }
                    }
                }
                Err(e) => tracing::warn!(error = %e, "Watch error"),
            },
            Config::default(),
        )?;

        for root in roots {
            watcher.watch(root, RecursiveMode::Recursive)?;
            tracing::info!(path = %root.display(), "Watching path");
        }

        Ok(Box::new(NotifySubscription {
            roots: roots.to_vec(),
            _watcher: watcher,
        }))
    }
}

/// Notifier that never emits anything, for hosts that do not want live updates.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

struct NoopSubscription {
    roots: Vec<PathBuf>,
}

impl Subscription for NoopSubscription {
    fn roots(&self) -> &[PathBuf] {
        &self.roots
    }
}

impl ChangeNotifier for NoopNotifier {
    fn subscribe(
        &self,
        roots: &[PathBuf],
        _generation: u64,
        _sink: EventSink,
    ) -> Result<Box<dyn Subscription>> {
        Ok(Box::new(NoopSubscription {
            roots: roots.to_vec(),
        }))
    }
}

/// Translate a raw notification into library events.
///
/// Renames become a removal of the old path and an addition of the new one. Hidden paths
/// are dropped, as are additions and changes of unsupported files. Added directories are
/// kept so their contents can be indexed.
pub fn classify(event: Event, roots: &[PathBuf], generation: u64) -> Vec<WatchEvent> {
    let make = |kind, path: &PathBuf| WatchEvent {
        kind,
        path: path.clone(),
        generation,
    };

    let events: Vec<WatchEvent> = match event.kind {
        EventKind::Create(_) => event
            .paths
            .iter()
            .map(|p| make(WatchEventKind::Added, p))
            .collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if event.paths.len() >= 2 => {
            vec![
                make(WatchEventKind::Removed, &event.paths[0]),
                make(WatchEventKind::Added, &event.paths[1]),
            ]
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => event
            .paths
            .iter()
            .map(|p| make(WatchEventKind::Removed, p))
            .collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => event
            .paths
            .iter()
            .map(|p| make(WatchEventKind::Added, p))
            .collect(),
        EventKind::Modify(_) => event
            .paths
            .iter()
            .map(|p| make(WatchEventKind::Changed, p))
            .collect(),
        EventKind::Remove(_) => event
            .paths
            .iter()
            .map(|p| make(WatchEventKind::Removed, p))
            .collect(),
        EventKind::Any | EventKind::Access(_) | EventKind::Other => Vec::new(),
    };

    let folder_created = matches!(event.kind, EventKind::Create(CreateKind::Folder));
    events
        .into_iter()
        .filter(|e| !is_hidden_event(&e.path, roots))
        .filter(|e| match e.kind {
            WatchEventKind::Removed => true,
            WatchEventKind::Added => {
                VideoFormat::from_path(&e.path).is_some() || folder_created || e.path.is_dir()
            }
            WatchEventKind::Changed => VideoFormat::from_path(&e.path).is_some(),
        })
        .collect()
}

fn is_hidden_event(path: &Path, roots: &[PathBuf]) -> bool {
    match roots.iter().find(|root| path.starts_with(root)) {
        Some(root) => is_hidden_below(path, root),
        None => path
            .file_name()
            .is_some_and(|name| name.to_string_lossy().starts_with('.')),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{DataChange, RemoveKind};

    fn roots() -> Vec<PathBuf> {
        vec![PathBuf::from("/videos")]
    }

    fn event(kind: EventKind, paths: &[&str]) -> Event {
        let mut event = Event::new(kind);
        for p in paths {
            event = event.add_path(PathBuf::from(p));
        }
        event
    }

    #[test]
    fn test_create_is_added() {
        let events = classify(
            event(EventKind::Create(CreateKind::File), &["/videos/a.mkv"]),
            &roots(),
            3,
        );
        assert_eq!(
            events,
            vec![WatchEvent {
                kind: WatchEventKind::Added,
                path: PathBuf::from("/videos/a.mkv"),
                generation: 3,
            }]
        );
    }

    #[test]
    fn test_modify_is_changed() {
        let events = classify(
            event(
                EventKind::Modify(ModifyKind::Data(DataChange::Content)),
                &["/videos/a.mp4"],
            ),
            &roots(),
            1,
        );
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, WatchEventKind::Changed);
    }

    #[test]
    fn test_rename_both_splits() {
        let events = classify(
            event(
                EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
                &["/videos/old.mkv", "/videos/new.mkv"],
            ),
            &roots(),
            1,
        );
        let kinds: Vec<_> = events.iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![WatchEventKind::Removed, WatchEventKind::Added]);
        assert_eq!(events[1].path, PathBuf::from("/videos/new.mkv"));
    }

    #[test]
    fn test_hidden_and_unsupported_dropped() {
        let hidden = classify(
            event(EventKind::Create(CreateKind::File), &["/videos/.trash/a.mkv"]),
            &roots(),
            1,
        );
        assert!(hidden.is_empty());

        let unsupported = classify(
            event(EventKind::Create(CreateKind::File), &["/videos/notes.txt"]),
            &roots(),
            1,
        );
        assert!(unsupported.is_empty());
    }

    #[test]
    fn test_removed_directory_kept() {
        let events = classify(
            event(EventKind::Remove(RemoveKind::Folder), &["/videos/Show"]),
            &roots(),
            1,
        );
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, WatchEventKind::Removed);
    }

    #[test]
    fn test_created_directory_kept() {
        let events = classify(
            event(EventKind::Create(CreateKind::Folder), &["/videos/New Show"]),
            &roots(),
            1,
        );
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, WatchEventKind::Added);
    }

    #[test]
    fn test_directory_renamed_in_kept() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("videos");
        let moved = root.join("Show.Season.1");
        std::fs::create_dir_all(&moved).unwrap();

        let events = classify(
            event(
                EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
                &[
                    root.join("Show").to_str().unwrap(),
                    moved.to_str().unwrap(),
                ],
            ),
            &[root.clone()],
            1,
        );
        let kinds: Vec<_> = events.iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![WatchEventKind::Removed, WatchEventKind::Added]);
        assert_eq!(events[1].path, moved);
    }

    #[test]
    fn test_access_ignored() {
        let events = classify(
            event(
                EventKind::Access(notify::event::AccessKind::Any),
                &["/videos/a.mkv"],
            ),
            &roots(),
            1,
        );
        assert!(events.is_empty());
    }
}
