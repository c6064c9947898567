//! Atomic write behaviour under concurrent writers and existing files

use assert_fs::prelude::*;
use condarc_fs::{NormalizedPath, io};
use predicates::prelude::*;
use std::sync::{Arc, Barrier};
use std::thread;
use tempfile::tempdir;

#[test]
fn concurrent_writers_leave_one_complete_file() {
    let dir = tempdir().unwrap();
    let file_path = dir.path().join(".condarc");
    let path = Arc::new(NormalizedPath::new(&file_path));

    let num_threads = 8;
    let writes_per_thread = 15;
    let barrier = Arc::new(Barrier::new(num_threads));

    let handles: Vec<_> = (0..num_threads)
        .map(|thread_id| {
            let path = Arc::clone(&path);
            let barrier = Arc::clone(&barrier);

            thread::spawn(move || {
                barrier.wait();
                for i in 0..writes_per_thread {
                    let content = format!("channels:\n  - thread{}-write{}\n", thread_id, i);
                    io::write_text(&path, &content).unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("writer thread panicked");
    }

    let content = std::fs::read_to_string(&file_path).unwrap();
    assert!(content.starts_with("channels:\n  - thread"));
    assert_eq!(content.matches("thread").count(), 1, "interleaved: {content}");

    // Every temp file was either persisted or cleaned up
    let leftovers = std::fs::read_dir(dir.path())
        .unwrap()
        .filter(|e| {
            e.as_ref()
                .unwrap()
                .file_name()
                .to_string_lossy()
                .ends_with(".tmp")
        })
        .count();
    assert_eq!(leftovers, 0);
}

#[test]
fn overwrite_replaces_previous_content_entirely() {
    let temp = assert_fs::TempDir::new().unwrap();
    let file = temp.child("condarc.d/10-channels.yml");
    file.write_str("channels:\n  - a\n  - b\n  - c\n").unwrap();

    io::write_text(&NormalizedPath::new(file.path()), "channels: []\n").unwrap();

    file.assert("channels: []\n");
    file.assert(predicate::str::contains("- a").not());
}

#[cfg(unix)]
#[test]
fn permissions_survive_replacement() {
    use std::os::unix::fs::PermissionsExt;

    let temp = assert_fs::TempDir::new().unwrap();
    let file = temp.child(".condarc");
    file.write_str("ssl_verify: true\n").unwrap();
    std::fs::set_permissions(file.path(), std::fs::Permissions::from_mode(0o640)).unwrap();

    io::write_text(&NormalizedPath::new(file.path()), "ssl_verify: false\n").unwrap();

    let mode = std::fs::metadata(file.path()).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o640);
    file.assert("ssl_verify: false\n");
}

#[test]
fn read_only_flag_is_reported() {
    let temp = assert_fs::TempDir::new().unwrap();
    let file = temp.child(".condarc");
    file.write_str("channels: []\n").unwrap();
    let path = NormalizedPath::new(file.path());
    assert!(!io::is_read_only(&path));

    let mut perms = std::fs::metadata(file.path()).unwrap().permissions();
    perms.set_readonly(true);
    std::fs::set_permissions(file.path(), perms).unwrap();

    assert!(io::is_read_only(&path));
}
