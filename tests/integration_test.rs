use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

fn blockdedup_exe() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_blockdedup"))
}

fn create_dir_tree(root: &Path, files: &[(&str, &[u8])]) {
    for (rel_path, content) in files {
        let full = root.join(rel_path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&full, content).unwrap();
    }
}

fn run(args: &[&str]) -> Output {
    Command::new(blockdedup_exe())
        .args(args)
        .output()
        .expect("Failed to run blockdedup")
}

fn assert_success(output: &Output, what: &str) {
    assert!(
        output.status.success(),
        "blockdedup {} failed:\nstdout: {}\nstderr: {}",
        what,
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
}

fn patterned(len: usize, salt: u32) -> Vec<u8> {
    let mut state = salt.wrapping_mul(2_654_435_761).wrapping_add(1);
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            (state >> 24) as u8
        })
        .collect()
}

#[test]
fn test_end_to_end_index_scan_restore() {
    let temp = tempfile::tempdir().unwrap();
    let reference = temp.path().join("reference");
    let index_file = temp.path().join("ref.idx");
    let delta_file = temp.path().join("input.delta");
    let input_file = temp.path().join("input.bin");
    let restored_file = temp.path().join("restored.bin");

    let disk_image = patterned(64 * 1024, 1);
    let config = b"{\"version\": 1, \"debug\": false}".to_vec();
    create_dir_tree(
        &reference,
        &[
            ("images/disk.img", &disk_image),
            ("config/settings.json", &config),
        ],
    );

    // New data: a header, most of the image shifted by the header, new bytes, the image tail
    let mut input = b"NEW HEADER v2".to_vec();
    input.extend_from_slice(&disk_image[..40 * 1024]);
    input.extend_from_slice(&patterned(5000, 2));
    input.extend_from_slice(&disk_image[48 * 1024..]);
    fs::write(&input_file, &input).unwrap();

    let output = run(&[
        "index",
        "--reference",
        reference.to_str().unwrap(),
        "--output",
        index_file.to_str().unwrap(),
        "--block-size",
        "1024",
    ]);
    assert_success(&output, "index");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Files indexed: 2"), "stdout: {}", stdout);

    let output = run(&[
        "scan",
        "--index",
        index_file.to_str().unwrap(),
        "--input",
        input_file.to_str().unwrap(),
        "--output",
        delta_file.to_str().unwrap(),
    ]);
    assert_success(&output, "scan");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Blocks matched: 56"), "stdout: {}", stdout);

    assert!(
        fs::metadata(&delta_file).unwrap().len() < input.len() as u64 / 4,
        "Delta should be much smaller than the input"
    );

    let output = run(&[
        "restore",
        "--reference",
        reference.to_str().unwrap(),
        "--delta",
        delta_file.to_str().unwrap(),
        "--output",
        restored_file.to_str().unwrap(),
    ]);
    assert_success(&output, "restore");

    assert_eq!(fs::read(&restored_file).unwrap(), input);
}

#[test]
fn test_exact_verification_matches_hash_verification() {
    let temp = tempfile::tempdir().unwrap();
    let reference = temp.path().join("base.bin");
    let index_file = temp.path().join("base.idx");
    let input_file = temp.path().join("input.bin");
    let hashed = temp.path().join("hashed.delta");
    let exact = temp.path().join("exact.delta");
    let restored = temp.path().join("restored.bin");

    let base = patterned(16 * 1024, 7);
    fs::write(&reference, &base).unwrap();
    let mut input = base[8 * 1024..].to_vec();
    input.extend_from_slice(b"appended");
    input.extend_from_slice(&base[..8 * 1024]);
    fs::write(&input_file, &input).unwrap();

    assert_success(
        &run(&[
            "index",
            "--reference",
            reference.to_str().unwrap(),
            "--output",
            index_file.to_str().unwrap(),
            "--block-size",
            "512",
        ]),
        "index",
    );

    for (delta, exact_ref) in [(&hashed, None), (&exact, Some(&reference))] {
        let mut args = vec![
            "scan",
            "--index",
            index_file.to_str().unwrap(),
            "--input",
            input_file.to_str().unwrap(),
            "--output",
            delta.to_str().unwrap(),
        ];
        if let Some(r) = exact_ref {
            args.push("--exact");
            args.push(r.to_str().unwrap());
        }
        assert_success(&run(&args), "scan");
    }

    assert_eq!(fs::read(&hashed).unwrap(), fs::read(&exact).unwrap());

    assert_success(
        &run(&[
            "restore",
            "--reference",
            reference.to_str().unwrap(),
            "--delta",
            exact.to_str().unwrap(),
            "--output",
            restored.to_str().unwrap(),
        ]),
        "restore",
    );
    assert_eq!(fs::read(&restored).unwrap(), input);
}

#[test]
fn test_restore_rejects_modified_reference() {
    let temp = tempfile::tempdir().unwrap();
    let reference = temp.path().join("reference");
    let index_file = temp.path().join("ref.idx");
    let input_file = temp.path().join("input.bin");
    let delta_file = temp.path().join("input.delta");
    let restored = temp.path().join("restored.bin");

    let data = patterned(8192, 3);
    create_dir_tree(&reference, &[("data.bin", &data)]);
    fs::write(&input_file, &data).unwrap();

    assert_success(
        &run(&[
            "index",
            "--reference",
            reference.to_str().unwrap(),
            "--output",
            index_file.to_str().unwrap(),
            "--block-size",
            "1024",
        ]),
        "index",
    );
    assert_success(
        &run(&[
            "scan",
            "--index",
            index_file.to_str().unwrap(),
            "--input",
            input_file.to_str().unwrap(),
            "--output",
            delta_file.to_str().unwrap(),
        ]),
        "scan",
    );

    // Same size, different content
    let mut tampered = data.clone();
    tampered[100] ^= 0xFF;
    fs::write(reference.join("data.bin"), &tampered).unwrap();

    let output = run(&[
        "restore",
        "--reference",
        reference.to_str().unwrap(),
        "--delta",
        delta_file.to_str().unwrap(),
        "--output",
        restored.to_str().unwrap(),
    ]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Hash mismatch"));
    assert!(!restored.exists());
}

#[test]
fn test_zero_block_size_is_rejected() {
    let temp = tempfile::tempdir().unwrap();
    let reference = temp.path().join("ref.bin");
    fs::write(&reference, b"some reference bytes").unwrap();

    let output = run(&[
        "index",
        "--reference",
        reference.to_str().unwrap(),
        "--output",
        temp.path().join("ref.idx").to_str().unwrap(),
        "--block-size",
        "0",
    ]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("block size"));
}

#[test]
fn test_empty_input_round_trip() {
    let temp = tempfile::tempdir().unwrap();
    let reference = temp.path().join("ref.bin");
    let index_file = temp.path().join("ref.idx");
    let input_file = temp.path().join("empty.bin");
    let delta_file = temp.path().join("empty.delta");
    let restored = temp.path().join("restored.bin");

    fs::write(&reference, patterned(4096, 9)).unwrap();
    fs::write(&input_file, b"").unwrap();

    assert_success(
        &run(&[
            "index",
            "--reference",
            reference.to_str().unwrap(),
            "--output",
            index_file.to_str().unwrap(),
        ]),
        "index",
    );
    assert_success(
        &run(&[
            "scan",
            "--index",
            index_file.to_str().unwrap(),
            "--input",
            input_file.to_str().unwrap(),
            "--output",
            delta_file.to_str().unwrap(),
        ]),
        "scan",
    );
    assert_success(
        &run(&[
            "restore",
            "--reference",
            reference.to_str().unwrap(),
            "--delta",
            delta_file.to_str().unwrap(),
            "--output",
            restored.to_str().unwrap(),
        ]),
        "restore",
    );
    assert!(fs::read(&restored).unwrap().is_empty());
}
