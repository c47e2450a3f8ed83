//! Notification source: turns raw `notify` events into change batches.

use std::fs;
use std::path::{Path, PathBuf};

use notify::event::{EventKind as FsEventKind, ModifyKind, RenameMode};
use notify::Event;

use watchfolder_core::EventKind;
use watchfolder_dispatch::ChangeBatch;

/// Map one filesystem event to `(kind, path)` changes.
///
/// Renames are split into a removal of the old name and an addition of the
/// new one. Access events and unknown kinds carry no change.
pub fn classify(event: &Event) -> Vec<(EventKind, PathBuf)> {
    let each = |kind: EventKind| -> Vec<(EventKind, PathBuf)> {
        event.paths.iter().map(|p| (kind, p.clone())).collect()
    };

    match &event.kind {
        FsEventKind::Create(_) => each(EventKind::Added),
        FsEventKind::Remove(_) => each(EventKind::Removed),
        FsEventKind::Modify(ModifyKind::Name(mode)) => match mode {
            RenameMode::From => each(EventKind::Removed),
            RenameMode::To => each(EventKind::Added),
            RenameMode::Both => match event.paths.as_slice() {
                [from, to, ..] => vec![
                    (EventKind::Removed, from.clone()),
                    (EventKind::Added, to.clone()),
                ],
                _ => vec![],
            },
            // The backend could not tell which side of the rename this is.
            RenameMode::Any | RenameMode::Other => event
                .paths
                .iter()
                .map(|p| {
                    let kind = if p.exists() {
                        EventKind::Added
                    } else {
                        EventKind::Removed
                    };
                    (kind, p.clone())
                })
                .collect(),
        },
        FsEventKind::Modify(_) => each(EventKind::Modified),
        FsEventKind::Access(_) | FsEventKind::Any | FsEventKind::Other => vec![],
    }
}

/// Maps paths reported by the OS back onto the roots as registered.
///
/// Backends report canonical paths (`/private/var/...` on macOS), while
/// roots are registered in their expanded, uncanonicalized form.
#[derive(Debug, Clone, Default)]
pub struct RootAliases {
    aliases: Vec<(PathBuf, PathBuf)>,
}

impl RootAliases {
    pub fn new(roots: &[PathBuf]) -> Self {
        let aliases = roots
            .iter()
            .filter_map(|root| {
                let canonical = fs::canonicalize(root).ok()?;
                (canonical != *root).then(|| (canonical, root.clone()))
            })
            .collect();
        Self { aliases }
    }

    pub fn localize(&self, path: &Path) -> PathBuf {
        for (canonical, registered) in &self.aliases {
            if let Ok(rest) = path.strip_prefix(canonical) {
                return registered.join(rest);
            }
        }
        path.to_path_buf()
    }
}

/// Fold one event into `batch`; returns how many changes it contributed.
pub fn absorb(batch: &mut ChangeBatch, aliases: &RootAliases, event: &Event) -> usize {
    let changes = classify(event);
    let count = changes.len();
    for (kind, path) in changes {
        batch.push(kind, aliases.localize(&path));
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, RemoveKind};
    use tempfile::TempDir;

    fn event(kind: FsEventKind, paths: &[&str]) -> Event {
        paths
            .iter()
            .fold(Event::new(kind), |e, p| e.add_path(PathBuf::from(p)))
    }

    #[test]
    fn create_modify_remove_map_directly() {
        let created = event(FsEventKind::Create(CreateKind::File), &["/r/a/in/x"]);
        assert_eq!(classify(&created), vec![(EventKind::Added, PathBuf::from("/r/a/in/x"))]);

        let written = event(
            FsEventKind::Modify(ModifyKind::Data(DataChange::Content)),
            &["/r/a/in/x"],
        );
        assert_eq!(classify(&written)[0].0, EventKind::Modified);

        let removed = event(FsEventKind::Remove(RemoveKind::File), &["/r/a/in/x"]);
        assert_eq!(classify(&removed)[0].0, EventKind::Removed);
    }

    #[test]
    fn rename_both_splits_into_removal_and_addition() {
        let renamed = event(
            FsEventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            &["/r/a/in/x.part", "/r/a/in/x"],
        );
        assert_eq!(
            classify(&renamed),
            vec![
                (EventKind::Removed, PathBuf::from("/r/a/in/x.part")),
                (EventKind::Added, PathBuf::from("/r/a/in/x")),
            ]
        );
    }

    #[test]
    fn access_events_are_ignored() {
        let accessed = event(
            FsEventKind::Access(notify::event::AccessKind::Any),
            &["/r/a/in/x"],
        );
        assert!(classify(&accessed).is_empty());
    }

    #[test]
    fn absorb_deduplicates_and_localizes() {
        let dir = TempDir::new().expect("tempdir");
        let registered = dir.path().to_path_buf();
        let canonical = fs::canonicalize(&registered).expect("canonicalize");
        let aliases = RootAliases::new(&[registered.clone()]);

        let path = canonical.join("abc").join("in").join("x");
        let mut batch = ChangeBatch::new();
        let created = Event::new(FsEventKind::Create(CreateKind::File)).add_path(path.clone());
        absorb(&mut batch, &aliases, &created);
        absorb(&mut batch, &aliases, &created);

        assert_eq!(batch.added, vec![registered.join("abc").join("in").join("x")]);
    }

    #[test]
    fn create_then_write_in_one_window_is_a_single_addition() {
        let aliases = RootAliases::default();
        let mut batch = ChangeBatch::new();
        let created = event(FsEventKind::Create(CreateKind::File), &["/r/abc/in/x.bin"]);
        let written = event(
            FsEventKind::Modify(ModifyKind::Data(DataChange::Content)),
            &["/r/abc/in/x.bin"],
        );
        absorb(&mut batch, &aliases, &created);
        absorb(&mut batch, &aliases, &written);

        assert_eq!(batch.added, vec![PathBuf::from("/r/abc/in/x.bin")]);
        assert!(batch.modified.is_empty());
    }

    #[test]
    fn short_lived_file_leaves_no_change() {
        let aliases = RootAliases::default();
        let mut batch = ChangeBatch::new();
        absorb(
            &mut batch,
            &aliases,
            &event(FsEventKind::Create(CreateKind::File), &["/r/abc/in/tmp"]),
        );
        absorb(
            &mut batch,
            &aliases,
            &event(FsEventKind::Remove(RemoveKind::File), &["/r/abc/in/tmp"]),
        );
        assert!(batch.is_empty());
    }
}
