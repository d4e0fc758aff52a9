use notevault_core::{
    CoreConfig, CoreError, EntityKind, Folder, NoteVault, UploadFile, ValidationError,
    ROOT_FOLDER_ID,
};
use serde_json::json;
use std::collections::{BTreeSet, HashMap};

fn open_vault(dir: &tempfile::TempDir) -> NoteVault {
    NoteVault::open(CoreConfig::new(dir.path())).unwrap()
}

/// Root, Work, Work/Reports, Home; three notes and one attachment.
fn seed(vault: &NoteVault) {
    let work = vault.folders().create("Work", None).unwrap();
    let reports = vault.folders().create("Reports", Some(work.id)).unwrap();
    vault.folders().create("Home", None).unwrap();

    let q1 = vault
        .notes()
        .create("Q1", "revenue up", Some(reports.id))
        .unwrap();
    vault.notes().create("Todo", "milk", Some(ROOT_FOLDER_ID)).unwrap();
    vault.notes().create("Scratch", "", None).unwrap();
    vault
        .attachments()
        .upload(q1.id, &UploadFile::new("chart.png", b"chart-bytes".to_vec()))
        .unwrap();
}

/// Folder paths like `Root/Work/Reports`, independent of identities.
fn folder_paths(vault: &NoteVault) -> BTreeSet<String> {
    let folders = vault.folders().list_all().unwrap();
    let by_id: HashMap<_, &Folder> = folders.iter().map(|folder| (folder.id, folder)).collect();
    folders
        .iter()
        .map(|folder| {
            let mut parts = vec![folder.name.clone()];
            let mut cursor = folder.parent_id;
            while let Some(parent) = cursor {
                parts.push(by_id[&parent].name.clone());
                cursor = by_id[&parent].parent_id;
            }
            parts.reverse();
            parts.join("/")
        })
        .collect()
}

fn folder_path_of(vault: &NoteVault, folder_id: Option<i64>) -> Option<String> {
    let folder_id = folder_id?;
    let mut parts = Vec::new();
    let mut cursor = Some(folder_id);
    while let Some(id) = cursor {
        let folder = vault.folders().get(id).unwrap();
        parts.push(folder.name);
        cursor = folder.parent_id;
    }
    parts.reverse();
    Some(parts.join("/"))
}

fn note_count(vault: &NoteVault) -> usize {
    vault
        .folders()
        .list_all()
        .unwrap()
        .iter()
        .map(|folder| vault.notes().list_in_folder(Some(folder.id)).unwrap().len())
        .sum::<usize>()
        + vault.notes().list_in_folder(None).unwrap().len()
}

#[test]
fn export_then_import_into_same_store_skips_everything() {
    let dir = tempfile::tempdir().unwrap();
    let vault = open_vault(&dir);
    seed(&vault);

    let exported = vault.backups().export(true).unwrap();
    let data = &exported.snapshot.data;
    assert_eq!(data.folders.len(), 4);
    assert_eq!(data.notes.len(), 3);
    assert_eq!(data.attachments.len(), 1);

    let summary = vault.backups().import(&exported.snapshot, false).unwrap();
    assert_eq!(summary.imported_count, 0);
    assert_eq!(summary.skipped_count, 7);
    assert_eq!(vault.folders().list_all().unwrap().len(), 4);
}

#[test]
fn export_without_blobs_still_counts_attachments() {
    let dir = tempfile::tempdir().unwrap();
    let vault = open_vault(&dir);
    seed(&vault);

    let exported = vault.backups().export(false).unwrap();
    let manifest = &exported.record.manifest;

    assert_eq!(manifest.version, "1.0.0");
    assert!(!manifest.include_attachments);
    assert_eq!(manifest.total_folders, 4);
    assert_eq!(manifest.total_notes, 3);
    assert_eq!(manifest.total_attachments, 1);
    assert!(exported.snapshot.data.attachments.is_empty());

    let export_dir = exported.record.path.parent().unwrap();
    assert!(!export_dir.join("attachments").exists());
    assert!(exported
        .record
        .file_name
        .starts_with("backup-"));
    assert_eq!(vault.backups().load_snapshot(&exported.record.name).unwrap(), exported.snapshot);
}

#[test]
fn import_into_fresh_store_remaps_folder_identities() {
    let source_dir = tempfile::tempdir().unwrap();
    let source = open_vault(&source_dir);
    seed(&source);
    let snapshot = source.backups().export(false).unwrap().snapshot;

    let target_dir = tempfile::tempdir().unwrap();
    let target = open_vault(&target_dir);
    // Shift identities so snapshot ids cannot line up by accident.
    let filler = target.folders().create("Filler", None).unwrap();
    target.folders().create("More", Some(filler.id)).unwrap();

    let summary = target.backups().import(&snapshot, false).unwrap();
    assert_eq!(summary.imported_count, 6);
    assert_eq!(summary.skipped_count, 1);

    let paths = folder_paths(&target);
    for expected in ["Root", "Root/Work", "Root/Work/Reports", "Root/Home"] {
        assert!(paths.contains(expected), "missing {expected}");
    }
    assert_eq!(note_count(&target), 3);

    let reports_notes: Vec<_> = target
        .folders()
        .list_all()
        .unwrap()
        .into_iter()
        .filter(|folder| folder.name == "Reports")
        .flat_map(|folder| target.notes().list_in_folder(Some(folder.id)).unwrap())
        .collect();
    assert_eq!(reports_notes.len(), 1);
    assert_eq!(reports_notes[0].title, "Q1");
    assert_eq!(
        folder_path_of(&target, reports_notes[0].folder_id).as_deref(),
        Some("Root/Work/Reports")
    );
    assert_eq!(target.notes().list_in_folder(None).unwrap()[0].title, "Scratch");
}

#[test]
fn clearing_then_importing_restores_counts() {
    let dir = tempfile::tempdir().unwrap();
    let vault = open_vault(&dir);
    seed(&vault);
    let snapshot = vault.backups().export(false).unwrap().snapshot;
    let paths_before = folder_paths(&vault);

    for folder in vault.folders().list_all().unwrap() {
        for note in vault.notes().list_in_folder(Some(folder.id)).unwrap() {
            vault.notes().delete(note.id).unwrap();
        }
    }
    for note in vault.notes().list_in_folder(None).unwrap() {
        vault.notes().delete(note.id).unwrap();
    }
    let reports = vault
        .folders()
        .list_all()
        .unwrap()
        .into_iter()
        .find(|folder| folder.name == "Reports")
        .unwrap();
    vault.folders().delete(reports.id).unwrap();
    for folder in vault.folders().list_all().unwrap() {
        if !folder.is_root() {
            vault.folders().delete(folder.id).unwrap();
        }
    }
    assert_eq!(vault.folders().list_all().unwrap().len(), 1);
    assert_eq!(note_count(&vault), 0);

    vault.backups().import(&snapshot, false).unwrap();

    assert_eq!(folder_paths(&vault), paths_before);
    assert_eq!(note_count(&vault), 3);
}

#[test]
fn overwrite_updates_matching_notes_in_place() {
    let dir = tempfile::tempdir().unwrap();
    let vault = open_vault(&dir);
    seed(&vault);
    let mut snapshot = vault.backups().export(false).unwrap().snapshot;
    for note in &mut snapshot.data.notes {
        if note.title == "Todo" {
            note.content = "eggs".to_string();
        }
    }

    let summary = vault.backups().import(&snapshot, true).unwrap();

    assert_eq!(summary.imported_count, 7);
    assert_eq!(summary.skipped_count, 0);
    let todo = vault
        .notes()
        .list_in_folder(Some(ROOT_FOLDER_ID))
        .unwrap()
        .into_iter()
        .find(|note| note.title == "Todo")
        .unwrap();
    assert_eq!(todo.content, "eggs");
    assert_eq!(note_count(&vault), 3);
}

#[test]
fn invalid_snapshot_rolls_back_whole_import() {
    let dir = tempfile::tempdir().unwrap();
    let vault = open_vault(&dir);
    seed(&vault);
    let mut snapshot = vault.backups().export(false).unwrap().snapshot;

    let target_dir = tempfile::tempdir().unwrap();
    let target = open_vault(&target_dir);
    snapshot.data.notes[0].folder_id = Some(8888);

    assert!(matches!(
        target.backups().import(&snapshot, false),
        Err(CoreError::Validation(ValidationError::MalformedSnapshot(_)))
    ));
    assert_eq!(target.folders().list_all().unwrap().len(), 1);
    assert_eq!(note_count(&target), 0);
}

#[test]
fn import_json_checks_document_shape() {
    let dir = tempfile::tempdir().unwrap();
    let vault = open_vault(&dir);

    for document in [
        json!({}),
        json!({ "data": { "folders": [] } }),
        json!({ "data": { "folders": {}, "notes": [] } }),
    ] {
        assert!(matches!(
            vault.backups().import_json(&document, false),
            Err(CoreError::Validation(ValidationError::MalformedSnapshot(_)))
        ));
    }

    let future = json!({
        "metadata": { "version": "2.0.0" },
        "data": { "folders": [], "notes": [] }
    });
    assert!(vault.backups().import_json(&future, false).is_err());

    let minimal = json!({
        "data": {
            "folders": [
                { "id": 10, "name": "Root", "parent_id": null, "created_at": 0 },
                { "id": 11, "name": "Imported", "parent_id": 10, "created_at": 0 }
            ],
            "notes": [
                { "id": 5, "title": "hello", "folder_id": 11, "created_at": 1, "updated_at": 2 }
            ]
        }
    });
    let summary = vault.backups().import_json(&minimal, false).unwrap();
    assert_eq!(summary.imported_count, 2);
    assert_eq!(summary.skipped_count, 1);
    assert!(folder_paths(&vault).contains("Root/Imported"));
}

#[test]
fn restore_brings_back_deleted_note_with_its_attachment() {
    let dir = tempfile::tempdir().unwrap();
    let vault = open_vault(&dir);
    seed(&vault);
    let exported = vault.backups().export(true).unwrap();
    let copied = exported
        .record
        .path
        .parent()
        .unwrap()
        .join("attachments")
        .join(&exported.snapshot.data.attachments[0].storage_key);
    assert!(copied.is_file());

    let q1 = vault
        .folders()
        .list_all()
        .unwrap()
        .into_iter()
        .filter(|folder| folder.name == "Reports")
        .flat_map(|folder| vault.notes().list_in_folder(Some(folder.id)).unwrap())
        .next()
        .unwrap();
    vault.notes().delete(q1.id).unwrap();

    let summary = vault.backups().restore(&exported.record.name, false).unwrap();
    assert_eq!(summary.imported_count, 1);
    assert_eq!(summary.attachments_restored, 1);

    let restored = vault
        .notes()
        .list_in_folder(q1.folder_id)
        .unwrap()
        .pop()
        .unwrap();
    assert_eq!(restored.title, "Q1");
    let attachments = vault.attachments().list_for_note(restored.id).unwrap();
    assert_eq!(attachments.len(), 1);
    assert_eq!(attachments[0].original_name, "chart.png");
    assert_eq!(
        std::fs::read(&attachments[0].storage_path).unwrap(),
        b"chart-bytes"
    );
}

#[test]
fn history_stats_and_delete() {
    let dir = tempfile::tempdir().unwrap();
    let vault = open_vault(&dir);
    assert!(vault.backups().history().unwrap().is_empty());
    seed(&vault);

    let first = vault.backups().export(false).unwrap();
    let second = vault.backups().export(true).unwrap();
    std::fs::create_dir_all(vault.backups().export_root().join(".staging-leftover")).unwrap();

    let history = vault.backups().history().unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].name, second.record.name);
    assert_eq!(history[1].name, first.record.name);

    let stats = vault.backups().stats().unwrap();
    assert_eq!(stats.total_backups, 2);
    assert_eq!(
        stats.total_size,
        history.iter().map(|record| record.size_bytes).sum::<u64>()
    );
    assert_eq!(stats.average_size, stats.total_size / 2);
    assert_eq!(stats.newest_backup, Some(second.record.manifest.exported_at));
    assert_eq!(stats.oldest_backup, Some(first.record.manifest.exported_at));

    vault.backups().delete_backup(&first.record.name).unwrap();
    assert!(!first.record.path.exists());
    assert_eq!(vault.backups().history().unwrap().len(), 1);

    assert!(matches!(
        vault.backups().delete_backup(&first.record.name),
        Err(CoreError::NotFound {
            entity: EntityKind::Backup,
            ..
        })
    ));
    assert!(matches!(
        vault.backups().delete_backup("../uploads"),
        Err(CoreError::Validation(ValidationError::InvalidBackupName(_)))
    ));
}

#[test]
fn notes_sharing_a_title_survive_import_and_restore() {
    let dir = tempfile::tempdir().unwrap();
    let vault = open_vault(&dir);
    let work = vault.folders().create("Work", None).unwrap();
    let first = vault.notes().create("Todo", "first", Some(work.id)).unwrap();
    let second = vault.notes().create("Todo", "second", Some(work.id)).unwrap();
    vault
        .attachments()
        .upload(second.id, &UploadFile::new("list.txt", b"eggs".to_vec()))
        .unwrap();
    let exported = vault.backups().export(true).unwrap();

    // Re-importing into the same store pairs each row with one incoming note.
    let summary = vault.backups().import(&exported.snapshot, false).unwrap();
    assert_eq!(summary.imported_count, 0);
    assert_eq!(summary.skipped_count, 4);
    assert_eq!(vault.notes().list_in_folder(Some(work.id)).unwrap().len(), 2);

    let target_dir = tempfile::tempdir().unwrap();
    let target = open_vault(&target_dir);
    let summary = target.backups().import(&exported.snapshot, false).unwrap();
    assert_eq!(summary.imported_count, 3);
    assert_eq!(summary.skipped_count, 1);
    let target_work = target
        .folders()
        .list_all()
        .unwrap()
        .into_iter()
        .find(|folder| folder.name == "Work")
        .unwrap();
    let mut contents: Vec<_> = target
        .notes()
        .list_in_folder(Some(target_work.id))
        .unwrap()
        .into_iter()
        .map(|note| note.content)
        .collect();
    contents.sort();
    assert_eq!(contents, vec!["first", "second"]);

    vault.notes().delete(first.id).unwrap();
    vault.notes().delete(second.id).unwrap();
    let summary = vault.backups().restore(&exported.record.name, false).unwrap();
    assert_eq!(summary.imported_count, 2);
    assert_eq!(summary.attachments_restored, 1);
    let restored = vault.notes().list_in_folder(Some(work.id)).unwrap();
    assert_eq!(restored.len(), 2);
    let with_files: Vec<_> = restored
        .iter()
        .filter(|note| !vault.attachments().list_for_note(note.id).unwrap().is_empty())
        .map(|note| note.content.as_str())
        .collect();
    assert_eq!(with_files, vec!["second"]);
}
