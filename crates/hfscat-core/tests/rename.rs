#![allow(clippy::unwrap_used, missing_docs)]

mod common;

use std::thread;

use hfscat::{CatalogKey, CatalogRecord, Cnid, Error, FileRecord};
use hfscat_btree::CatalogTree;

use common::{Fault, Keys, Op, harness, key, valence};

#[test]
fn directory_cannot_move_into_itself() {
    let h = harness();
    let outer = h.cache.mkdir(&h.root, &key(Cnid::ROOT, "outer")).unwrap();
    let inner = h.cache.mkdir(&outer, &key(outer.cnid(), "inner")).unwrap();
    h.tree.stats().reset();

    let err = h
        .cache
        .rename(&h.root, &outer, &outer, &key(outer.cnid(), "outer"))
        .unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));

    let err = h
        .cache
        .rename(&h.root, &inner, &outer, &key(inner.cnid(), "outer"))
        .unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));

    assert_eq!(h.tree.stats().mutations(), 0);
    assert_eq!(valence(&h.root), (0, 1));
    assert_eq!(outer.key(), key(Cnid::ROOT, "outer"));
    assert!(!outer.is_deleted());
}

#[test]
fn rename_replaces_existing_file() {
    let h = harness();
    let a = h
        .cache
        .create(&h.root, &key(Cnid::ROOT, "a"), 0, 0, 0)
        .unwrap();
    let b = h
        .cache
        .create(&h.root, &key(Cnid::ROOT, "b"), 0, 0, 0)
        .unwrap();
    a.update(|d| d.backup_date = 111);

    let replaced = h
        .cache
        .rename(&h.root, &h.root, &a, &key(Cnid::ROOT, "b"))
        .unwrap()
        .unwrap();

    assert!(replaced.same_entry(&b));
    assert!(replaced.is_deleted());
    drop(replaced);
    drop(b);

    let found = h.cache.get(&h.volume, &key(Cnid::ROOT, "B")).unwrap();
    assert!(found.same_entry(&a));
    assert!(matches!(
        h.cache.get(&h.volume, &key(Cnid::ROOT, "a")),
        Err(Error::NotFound)
    ));
    assert_eq!(valence(&h.root), (1, 0));
    assert_eq!(h.volume.counts().root_files, 1);

    h.cache.commit(&h.volume);
    let stored = h.tree.record(&key(Cnid::ROOT, "b")).unwrap();
    assert_eq!(stored.cnid(), Some(a.cnid()));
    assert!(h.tree.get(&key(Cnid::ROOT, "a")).is_none());
}

#[test]
fn rename_refuses_non_empty_directory_destination() {
    let h = harness();
    let x = h.cache.mkdir(&h.root, &key(Cnid::ROOT, "x")).unwrap();
    let y = h.cache.mkdir(&h.root, &key(Cnid::ROOT, "y")).unwrap();
    h.cache
        .create(&y, &key(y.cnid(), "keep"), 0, 0, 0)
        .unwrap();
    h.tree.stats().reset();

    let err = h
        .cache
        .rename(&h.root, &h.root, &x, &key(Cnid::ROOT, "y"))
        .unwrap_err();
    assert!(matches!(err, Error::NotEmpty));
    assert_eq!(h.tree.stats().mutations(), 0);
    assert!(!x.is_deleted());
    assert!(!y.is_deleted());
}

#[test]
fn directory_moves_between_parents() {
    let h = harness();
    let archive = h.cache.mkdir(&h.root, &key(Cnid::ROOT, "archive")).unwrap();
    let docs = h.cache.mkdir(&h.root, &key(Cnid::ROOT, "docs")).unwrap();
    h.cache
        .create(&docs, &key(docs.cnid(), "letter"), 0, 0, 0)
        .unwrap();

    let replaced = h
        .cache
        .rename(&h.root, &archive, &docs, &key(archive.cnid(), "docs"))
        .unwrap();
    assert!(replaced.is_none());

    assert_eq!(valence(&h.root), (0, 1));
    assert_eq!(valence(&archive), (0, 1));
    let counts = h.volume.counts();
    assert_eq!((counts.dirs, counts.root_dirs), (2, 1));

    let Some(CatalogRecord::Thread(thread)) = h.tree.record(&CatalogKey::thread(docs.cnid()))
    else {
        panic!("docs lost its thread record");
    };
    assert_eq!(thread.parent, archive.cnid());
    assert_eq!(thread.name.as_bytes(), b"docs");

    let parent = h.cache.parent(&docs).unwrap();
    assert!(parent.same_entry(&archive));

    h.cache.commit(&h.volume);
    assert!(h.tree.get(&key(Cnid::ROOT, "docs")).is_none());
    let Some(CatalogRecord::Directory(stored)) = h.tree.record(&key(archive.cnid(), "docs"))
    else {
        panic!("docs record missing under archive");
    };
    assert_eq!(stored.cnid, docs.cnid());
    assert_eq!(stored.valence, 1);
}

#[test]
fn missing_file_thread_clears_the_flag() {
    let h = harness();
    let file = h
        .cache
        .create(&h.root, &key(Cnid::ROOT, "f"), FileRecord::FLAG_THREAD, 0, 0)
        .unwrap();
    assert!(file.with_data(|d| d.has_thread()));
    h.tree.mem().delete(&CatalogKey::thread(file.cnid())).unwrap();

    h.cache
        .rename(&h.root, &h.root, &file, &key(Cnid::ROOT, "g"))
        .unwrap();

    assert!(!file.with_data(|d| d.has_thread()));
    h.cache.commit(&h.volume);
    let Some(CatalogRecord::File(stored)) = h.tree.record(&key(Cnid::ROOT, "g")) else {
        panic!("g is not a file record");
    };
    assert!(!stored.has_thread());
}

#[test]
fn missing_directory_thread_after_source_removed_deletes_entry() {
    let h = harness();
    let x = h.cache.mkdir(&h.root, &key(Cnid::ROOT, "x")).unwrap();
    h.tree.mem().delete(&CatalogKey::thread(x.cnid())).unwrap();

    let err = h
        .cache
        .rename(&h.root, &h.root, &x, &key(Cnid::ROOT, "y"))
        .unwrap_err();
    assert!(err.is_io());

    assert!(x.is_deleted());
    assert!(h.tree.get(&key(Cnid::ROOT, "x")).is_none());
    assert!(h.tree.get(&key(Cnid::ROOT, "y")).is_none());
    assert_eq!(valence(&h.root), (0, 0));
    assert!(!h.cache.contains(h.volume.id(), &key(Cnid::ROOT, "y")));
}

#[test]
fn failed_source_delete_rolls_back_placeholder() {
    let h = harness();
    let a = h
        .cache
        .create(&h.root, &key(Cnid::ROOT, "a"), 0, 0, 0)
        .unwrap();
    h.tree.arm(Fault::io(Op::Delete, Keys::Named));

    let err = h
        .cache
        .rename(&h.root, &h.root, &a, &key(Cnid::ROOT, "c"))
        .unwrap_err();
    assert!(err.is_io());

    assert!(!a.is_deleted());
    assert_eq!(a.key(), key(Cnid::ROOT, "a"));
    assert!(h.tree.get(&key(Cnid::ROOT, "a")).is_some());
    assert!(h.tree.get(&key(Cnid::ROOT, "c")).is_none());
    assert_eq!(valence(&h.root), (1, 0));
    assert!(!h.cache.contains(h.volume.id(), &key(Cnid::ROOT, "c")));

    h.cache
        .rename(&h.root, &h.root, &a, &key(Cnid::ROOT, "c"))
        .unwrap();
    assert_eq!(a.key(), key(Cnid::ROOT, "c"));
}

#[test]
fn rename_onto_own_key_leaves_tree_alone() {
    let h = harness();
    let a = h
        .cache
        .create(&h.root, &key(Cnid::ROOT, "a"), 0, 0, 0)
        .unwrap();
    h.tree.stats().reset();

    let replaced = h
        .cache
        .rename(&h.root, &h.root, &a, &key(Cnid::ROOT, "a"))
        .unwrap();
    assert!(replaced.is_none());
    assert!(!a.is_deleted());
    assert_eq!(h.tree.stats().mutations(), 0);
    assert_eq!(valence(&h.root), (1, 0));
}

#[test]
fn crossing_renames_do_not_deadlock() {
    let h = harness();
    let p = h.cache.mkdir(&h.root, &key(Cnid::ROOT, "p")).unwrap();
    let q = h.cache.mkdir(&h.root, &key(Cnid::ROOT, "q")).unwrap();
    let mut workers = Vec::new();
    for (from, to, name) in [(p.clone(), q.clone(), "left"), (q.clone(), p.clone(), "right")] {
        let file = h
            .cache
            .create(&from, &key(from.cnid(), name), 0, 0, 0)
            .unwrap();
        let cache = h.cache.clone();
        workers.push(thread::spawn(move || {
            for round in 0..20 {
                let (src, dst) = if round % 2 == 0 { (&from, &to) } else { (&to, &from) };
                cache
                    .rename(src, dst, &file, &key(dst.cnid(), name))
                    .unwrap();
            }
        }));
    }
    for worker in workers {
        worker.join().unwrap();
    }

    assert_eq!(valence(&p), (1, 0));
    assert_eq!(valence(&q), (1, 0));
    assert!(h.tree.get(&key(p.cnid(), "left")).is_some());
    assert!(h.tree.get(&key(q.cnid(), "right")).is_some());
}
