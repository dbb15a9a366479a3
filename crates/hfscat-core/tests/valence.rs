#![allow(clippy::unwrap_used, missing_docs)]

mod common;

use hfscat::{CatalogKey, CatalogRecord, Cnid, Error, FileRecord};
use hfscat_btree::CatalogTree;

use common::{Fault, Keys, Op, harness, key, valence};

#[test]
fn counts_follow_creates_and_deletes() {
    let h = harness();
    let mut entries = Vec::new();
    for i in 0..6 {
        let name = format!("e{i}");
        let entry = if i % 2 == 0 {
            h.cache.mkdir(&h.root, &key(Cnid::ROOT, &name)).unwrap()
        } else {
            h.cache
                .create(&h.root, &key(Cnid::ROOT, &name), 0, 0, 0)
                .unwrap()
        };
        entries.push(entry);
    }
    assert_eq!(valence(&h.root), (3, 3));

    for entry in entries.drain(..4) {
        h.cache.delete(&h.root, &entry, true).unwrap();
        assert!(entry.is_deleted());
    }
    assert_eq!(valence(&h.root), (1, 1));

    let counts = h.volume.counts();
    assert_eq!((counts.files, counts.dirs), (1, 1));
    assert_eq!((counts.root_files, counts.root_dirs), (1, 1));

    // e0 and e2 were directories; their threads went with them
    for cnid in [16, 18] {
        assert!(h.tree.get(&CatalogKey::thread(Cnid::new(cnid))).is_none());
    }
}

#[test]
fn counts_survive_writeback_and_reload() {
    let h = harness();
    let docs = h.cache.mkdir(&h.root, &key(Cnid::ROOT, "docs")).unwrap();
    for name in ["a", "b", "c"] {
        h.cache
            .create(&docs, &key(docs.cnid(), name), 0, 0, 0)
            .unwrap();
    }
    h.cache.mkdir(&docs, &key(docs.cnid(), "sub")).unwrap();
    let cnid = docs.cnid();
    drop(docs);

    let Some(CatalogRecord::Directory(stored)) = h.tree.record(&key(Cnid::ROOT, "docs")) else {
        panic!("docs is not a directory record");
    };
    assert_eq!(stored.valence, 4);

    let docs = h.cache.get(&h.volume, &key(Cnid::ROOT, "docs")).unwrap();
    assert_eq!(docs.cnid(), cnid);
    assert_eq!(valence(&docs), (3, 1));
}

#[test]
fn full_directory_rejects_new_children_untouched() {
    let h = harness();
    h.root.update(|d| {
        let dir = d.dir_mut().unwrap();
        dir.files = 32_000;
        dir.dirs = 767;
    });
    h.tree.stats().reset();

    let err = h
        .cache
        .create(&h.root, &key(Cnid::ROOT, "one-more"), 0, 0, 0)
        .unwrap_err();
    assert!(matches!(err, Error::NoSpace));
    let err = h
        .cache
        .mkdir(&h.root, &key(Cnid::ROOT, "one-more"))
        .unwrap_err();
    assert!(matches!(err, Error::NoSpace));

    assert_eq!(h.tree.stats().mutations(), 0);
    assert_eq!(valence(&h.root), (32_000, 767));
    assert!(!h.cache.contains(h.volume.id(), &key(Cnid::ROOT, "one-more")));
}

#[test]
fn full_directory_rejects_moves_into_it() {
    let h = harness();
    let docs = h.cache.mkdir(&h.root, &key(Cnid::ROOT, "docs")).unwrap();
    let file = h
        .cache
        .create(&docs, &key(docs.cnid(), "report"), 0, 0, 0)
        .unwrap();
    h.root.update(|d| d.dir_mut().unwrap().files = 32_767 - 1);
    h.tree.stats().reset();

    let err = h
        .cache
        .rename(&docs, &h.root, &file, &key(Cnid::ROOT, "report"))
        .unwrap_err();
    assert!(matches!(err, Error::NoSpace));
    assert_eq!(h.tree.stats().mutations(), 0);
    assert_eq!(valence(&docs), (1, 0));
    assert!(h.tree.get(&key(docs.cnid(), "report")).is_some());
    assert!(!file.is_deleted());
}

#[test]
fn failed_insert_leaves_counts_alone() {
    let h = harness();
    h.tree.arm(Fault::io(Op::Insert, Keys::Named));

    let err = h
        .cache
        .create(&h.root, &key(Cnid::ROOT, "flaky"), FileRecord::FLAG_THREAD, 0, 0)
        .unwrap_err();
    assert!(err.is_io());
    assert_eq!(valence(&h.root), (0, 0));
    assert!(!h.cache.contains(h.volume.id(), &key(Cnid::ROOT, "flaky")));

    // The insert failed with an I/O error, so the thread was left behind
    assert!(h.tree.get(&CatalogKey::thread(Cnid::new(16))).is_some());

    let retry = h
        .cache
        .create(&h.root, &key(Cnid::ROOT, "flaky"), 0, 0, 0)
        .unwrap();
    assert!(retry.cnid().is_valid());
    assert_eq!(valence(&h.root), (1, 0));
}

#[test]
fn thread_removed_when_record_insert_is_refused() {
    let h = harness();
    h.tree.mem().insert(&key(Cnid::ROOT, "taken"), &[]).unwrap();

    let err = h
        .cache
        .mkdir(&h.root, &key(Cnid::ROOT, "taken"))
        .unwrap_err();
    assert!(matches!(err, Error::AlreadyExists));
    assert!(h.tree.get(&CatalogKey::thread(Cnid::new(16))).is_none());
    assert_eq!(valence(&h.root), (0, 0));
}
