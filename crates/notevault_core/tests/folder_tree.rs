use notevault_core::{
    CoreError, Folder, FolderId, FolderService, Store, StructuralViolation, TxMode,
    ValidationError, ROOT_FOLDER_ID,
};
use std::collections::HashMap;
use std::sync::Arc;

fn setup() -> (Arc<Store>, FolderService) {
    let store = Arc::new(Store::open_in_memory().unwrap());
    let service = FolderService::new(Arc::clone(&store));
    (store, service)
}

fn insert_note(store: &Store, folder_id: FolderId) -> i64 {
    store
        .run(TxMode::Write, |tx| {
            tx.execute(
                "INSERT INTO notes (title, folder_id) VALUES ('note', ?1);",
                [folder_id],
            )?;
            Ok::<_, CoreError>(tx.last_insert_rowid())
        })
        .unwrap()
}

fn insert_attachment(store: &Store, note_id: i64, key: &str) {
    store
        .run(TxMode::Write, |tx| {
            tx.execute(
                "INSERT INTO attachments (storage_key, original_name, storage_path, note_id)
                 VALUES (?1, 'a.png', ?1, ?2);",
                rusqlite::params![key, note_id],
            )
            .map_err(CoreError::from)
        })
        .unwrap();
}

/// Every folder must reach Root by following parent links.
fn assert_acyclic(folders: &[Folder]) {
    let parents: HashMap<FolderId, Option<FolderId>> = folders
        .iter()
        .map(|folder| (folder.id, folder.parent_id))
        .collect();
    let roots = folders.iter().filter(|folder| folder.parent_id.is_none()).count();
    assert_eq!(roots, 1, "exactly one parent-less folder expected");

    for folder in folders {
        let mut cursor = folder.id;
        let mut steps = 0;
        while let Some(parent) = parents[&cursor] {
            cursor = parent;
            steps += 1;
            assert!(steps <= folders.len(), "cycle through folder {}", folder.id);
        }
        assert_eq!(cursor, ROOT_FOLDER_ID);
    }
}

/// Small deterministic generator for move sequences.
struct XorShift(u64);

impl XorShift {
    fn next(&mut self) -> u64 {
        self.0 ^= self.0 << 13;
        self.0 ^= self.0 >> 7;
        self.0 ^= self.0 << 17;
        self.0
    }

    fn pick(&mut self, ids: &[FolderId]) -> FolderId {
        ids[(self.next() % ids.len() as u64) as usize]
    }
}

#[test]
fn root_exists_and_create_without_parent_files_under_root() {
    let (_, service) = setup();

    let root = service.root().unwrap();
    assert_eq!(root.id, ROOT_FOLDER_ID);
    assert!(root.is_root());

    let docs = service.create("  Docs ", None).unwrap();
    assert_eq!(docs.name, "Docs");
    assert_eq!(docs.parent_id, Some(ROOT_FOLDER_ID));
    assert_eq!(service.get(docs.id).unwrap(), docs);
}

#[test]
fn create_rejects_invalid_names_and_missing_parent() {
    let (_, service) = setup();

    for name in ["   ", "a/b", "what?", "tab\there"] {
        assert!(
            matches!(service.create(name, None), Err(CoreError::Validation(_))),
            "{name:?} should be rejected"
        );
    }
    assert!(matches!(
        service.create(&"x".repeat(256), None),
        Err(CoreError::Validation(ValidationError::TooLong { .. }))
    ));
    assert!(matches!(
        service.create("Orphan", Some(404)),
        Err(CoreError::NotFound { .. })
    ));
}

#[test]
fn sibling_names_are_unique_and_case_sensitive() {
    let (_, service) = setup();
    let docs = service.create("Docs", None).unwrap();

    assert!(matches!(
        service.create("Docs", Some(ROOT_FOLDER_ID)),
        Err(CoreError::Conflict(_))
    ));
    let lower = service.create("docs", None).unwrap();
    assert_ne!(lower.id, docs.id);

    // Same name under a different parent is fine.
    service.create("Docs", Some(docs.id)).unwrap();

    // Renaming to its own name is a no-op; renaming onto a sibling conflicts.
    assert_eq!(service.rename(docs.id, "Docs").unwrap().name, "Docs");
    assert!(matches!(
        service.rename(lower.id, "Docs"),
        Err(CoreError::Conflict(_))
    ));
    assert_eq!(service.rename(lower.id, "Papers").unwrap().name, "Papers");
    assert!(matches!(
        service.rename(999, "Anything"),
        Err(CoreError::NotFound { .. })
    ));
}

#[test]
fn root_cannot_be_deleted_or_moved_but_can_be_renamed() {
    let (_, service) = setup();
    let child = service.create("Child", None).unwrap();

    assert!(matches!(
        service.delete(ROOT_FOLDER_ID),
        Err(CoreError::Structural(StructuralViolation::RootImmutable { .. }))
    ));
    assert!(matches!(
        service.move_to(ROOT_FOLDER_ID, child.id),
        Err(CoreError::Structural(StructuralViolation::RootImmutable { .. }))
    ));

    let renamed = service.rename(ROOT_FOLDER_ID, "Home").unwrap();
    assert_eq!(renamed.name, "Home");
    assert!(renamed.is_root());
}

#[test]
fn move_between_siblings_succeeds_and_cycles_are_rejected() {
    let (_, service) = setup();
    let f1 = service.create("F1", None).unwrap();
    let f2 = service.create("F2", None).unwrap();

    let moved = service.move_to(f1.id, f2.id).unwrap();
    assert_eq!(moved.parent_id, Some(f2.id));

    let f3 = service.create("F3", Some(f1.id)).unwrap();
    assert!(matches!(
        service.move_to(f2.id, f3.id),
        Err(CoreError::Structural(StructuralViolation::Cycle { .. }))
    ));
    assert!(matches!(
        service.move_to(f2.id, f2.id),
        Err(CoreError::Structural(StructuralViolation::SelfParent(_)))
    ));
    assert!(matches!(
        service.move_to(f2.id, 12345),
        Err(CoreError::NotFound { .. })
    ));

    // Nothing changed after the rejected moves.
    assert_eq!(service.get(f2.id).unwrap().parent_id, Some(ROOT_FOLDER_ID));
    assert_acyclic(&service.list_all().unwrap());
}

#[test]
fn move_into_parent_with_same_named_child_conflicts() {
    let (_, service) = setup();
    let a = service.create("A", None).unwrap();
    let b = service.create("B", None).unwrap();
    service.create("Shared", Some(a.id)).unwrap();
    let shared_b = service.create("Shared", Some(b.id)).unwrap();

    assert!(matches!(
        service.move_to(shared_b.id, a.id),
        Err(CoreError::Conflict(_))
    ));
    assert_eq!(service.get(shared_b.id).unwrap().parent_id, Some(b.id));
}

#[test]
fn delete_refuses_non_empty_folders() {
    let (store, service) = setup();
    let parent = service.create("Parent", None).unwrap();
    let child = service.create("Child", Some(parent.id)).unwrap();

    match service.delete(parent.id) {
        Err(CoreError::Structural(StructuralViolation::FolderNotEmpty {
            subfolders, notes, ..
        })) => {
            assert_eq!(subfolders, 1);
            assert_eq!(notes, 0);
        }
        other => panic!("unexpected result: {other:?}"),
    }

    insert_note(&store, child.id);
    assert!(matches!(
        service.delete(child.id),
        Err(CoreError::Structural(StructuralViolation::FolderNotEmpty { .. }))
    ));
    assert!(service.get(child.id).is_ok());

    let empty = service.create("Empty", None).unwrap();
    service.delete(empty.id).unwrap();
    assert!(matches!(
        service.get(empty.id),
        Err(CoreError::NotFound { .. })
    ));
}

#[test]
fn stats_count_direct_children_only() {
    let (store, service) = setup();
    let folder = service.create("Projects", None).unwrap();
    let sub = service.create("Sub", Some(folder.id)).unwrap();
    service.create("Sub2", Some(folder.id)).unwrap();
    service.create("Deep", Some(sub.id)).unwrap();

    let note = insert_note(&store, folder.id);
    insert_attachment(&store, note, "k1.png");
    insert_attachment(&store, note, "k2.png");
    let deep_note = insert_note(&store, sub.id);
    insert_attachment(&store, deep_note, "k3.png");

    let stats = service.stats(folder.id).unwrap();
    assert_eq!(stats.subfolders, 2);
    assert_eq!(stats.notes, 1);
    assert_eq!(stats.attachments, 2);
}

#[test]
fn tree_nests_every_folder_under_root() {
    let (_, service) = setup();
    let a = service.create("A", None).unwrap();
    service.create("A1", Some(a.id)).unwrap();
    service.create("B", None).unwrap();

    let tree = service.tree().unwrap();
    assert_eq!(tree.folder.id, ROOT_FOLDER_ID);
    let names: Vec<_> = tree
        .children
        .iter()
        .map(|node| node.folder.name.as_str())
        .collect();
    assert_eq!(names, vec!["A", "B"]);
    assert_eq!(tree.children[0].children[0].folder.name, "A1");
}

#[test]
fn random_move_sequences_never_create_cycles() {
    let (_, service) = setup();
    let mut ids = vec![ROOT_FOLDER_ID];
    for index in 0..24 {
        let parent = ids[index / 3];
        ids.push(service.create(&format!("f{index}"), Some(parent)).unwrap().id);
    }

    let mut rng = XorShift(0x9E37_79B9_7F4A_7C15);
    let mut applied = 0;
    for _ in 0..600 {
        let folder = rng.pick(&ids[1..]);
        let parent = rng.pick(&ids);
        if service.move_to(folder, parent).is_ok() {
            applied += 1;
        }
    }
    assert!(applied > 0);
    assert_acyclic(&service.list_all().unwrap());
}

#[test]
fn concurrent_moves_never_create_cycles() {
    let (_, service) = setup();
    let service = Arc::new(service);
    let mut ids = vec![ROOT_FOLDER_ID];
    for index in 0..16 {
        ids.push(service.create(&format!("c{index}"), None).unwrap().id);
    }
    let ids = Arc::new(ids);

    let workers: Vec<_> = (0..4u64)
        .map(|worker| {
            let service = Arc::clone(&service);
            let ids = Arc::clone(&ids);
            std::thread::spawn(move || {
                let mut rng = XorShift(0xA5A5_0000 + worker * 7919);
                for _ in 0..250 {
                    let folder = rng.pick(&ids[1..]);
                    let parent = rng.pick(&ids);
                    let _ = service.move_to(folder, parent);
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    let folders = service.list_all().unwrap();
    assert_eq!(folders.len(), ids.len());
    assert_acyclic(&folders);
}
