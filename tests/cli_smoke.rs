use std::path::{Path, PathBuf};

use grayfade::{Channels, Dims, PixelBuffer};

fn exe() -> PathBuf {
    std::env::var_os("CARGO_BIN_EXE_grayfade")
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            let mut p = PathBuf::from("target").join("debug");
            p.push(if cfg!(windows) {
                "grayfade.exe"
            } else {
                "grayfade"
            });
            p
        })
}

fn write_source(dir: &Path) -> (PathBuf, PixelBuffer) {
    std::fs::create_dir_all(dir).unwrap();
    let source = PixelBuffer::from_raw(
        Dims::new(4, 3),
        Channels::Rgb,
        (0..36).map(|i| (i * 7) as u8).collect(),
    )
    .unwrap();
    let path = dir.join("source.png");
    grayfade::codec::encode(&path, &source).unwrap();
    (path, source)
}

#[test]
fn cli_dist_writes_frame_sequence() {
    let dir = PathBuf::from("target").join("cli_smoke").join("dist");
    let _ = std::fs::remove_dir_all(&dir);
    let (in_path, source) = write_source(&dir);
    let out_dir = dir.join("frames");

    let status = std::process::Command::new(exe())
        .args(["--quiet", "dist", "--workers", "2", "--frames", "3", "--in"])
        .arg(&in_path)
        .arg("--out-dir")
        .arg(&out_dir)
        .status()
        .unwrap();
    assert!(status.success());

    let first = grayfade::codec::decode(&out_dir.join("frame_dist_0.png")).unwrap();
    assert_eq!(first, source);

    let last = grayfade::codec::decode(&out_dir.join("frame_dist_2.png")).unwrap();
    for px in last.as_bytes().chunks_exact(3) {
        assert!(px[0] == px[1] && px[1] == px[2], "{px:?}");
    }
    assert!(out_dir.join("frame_dist_1.png").exists());
    assert!(!out_dir.join("frame_dist_3.png").exists());
}

#[test]
fn cli_sequential_honors_prefix() {
    let dir = PathBuf::from("target").join("cli_smoke").join("sequential");
    let _ = std::fs::remove_dir_all(&dir);
    let (in_path, _) = write_source(&dir);

    let status = std::process::Command::new(exe())
        .args(["-q", "sequential", "--frames", "2", "--prefix", "fade", "--in"])
        .arg(&in_path)
        .arg("--out-dir")
        .arg(&dir)
        .status()
        .unwrap();
    assert!(status.success());
    assert!(dir.join("fade_0.png").exists());
    assert!(dir.join("fade_1.png").exists());
}

#[test]
fn cli_missing_input_exits_with_one() {
    let dir = PathBuf::from("target").join("cli_smoke").join("missing");
    let _ = std::fs::remove_dir_all(&dir);

    let status = std::process::Command::new(exe())
        .args(["-q", "threaded", "--threads", "2", "--in"])
        .arg(dir.join("nope.png"))
        .arg("--out-dir")
        .arg(&dir)
        .status()
        .unwrap();
    assert_eq!(status.code(), Some(1));
    assert!(!dir.exists());
}

#[test]
fn cli_usage_error_exits_with_one() {
    let status = std::process::Command::new(exe())
        .args(["dist"])
        .stderr(std::process::Stdio::null())
        .status()
        .unwrap();
    assert_eq!(status.code(), Some(1));
}

#[test]
fn cli_analyze_prints_metrics() {
    let dir = PathBuf::from("target").join("cli_smoke").join("analyze");
    let _ = std::fs::remove_dir_all(&dir);
    let (in_path, _) = write_source(&dir);

    let out = std::process::Command::new(exe())
        .args([
            "-q",
            "analyze",
            "--size",
            "8",
            "--frames",
            "2",
            "--parallel-secs",
            "0.5",
            "--processors",
            "2",
            "--in",
        ])
        .arg(&in_path)
        .output()
        .unwrap();
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("sequential time:"));
    assert!(stdout.contains("speedup:"));
    assert!(stdout.contains("efficiency:"));
}
