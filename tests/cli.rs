use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn write_images(dir: &Path, count: u32) {
    std::fs::create_dir_all(dir).unwrap();
    for i in 0..count {
        let image = image::RgbImage::from_fn(300, 200 + i * 20, |x, y| {
            image::Rgb([(x % 256) as u8, (y % 256) as u8, 90])
        });
        image.save(dir.join(format!("img-{}.png", i))).unwrap();
    }
}

fn probe(root: &Path) -> Command {
    let mut cmd = Command::cargo_bin("resizeprobe").unwrap();
    cmd.current_dir(root)
        .env_remove("RESIZEPROBE_CONFIG")
        .args(["--idle-samples", "2", "--idle-interval-ms", "5", "--settle-interval-ms", "0"]);
    cmd
}

#[test]
fn stream_variant_writes_outputs_and_chart() {
    let dir = TempDir::new().unwrap();
    write_images(&dir.path().join("images"), 3);

    probe(dir.path())
        .args(["run", "stream", "-Q"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Processed"));

    let outputs = std::fs::read_dir(dir.path().join("output")).unwrap().count();
    assert_eq!(outputs, 3);
    assert!(dir.path().join("memoryUsageChart-stream.png").exists());
    assert!(dir.path().join("memoryUsageChart-stream.json").exists());
}

#[test]
fn worker_variant_writes_both_charts() {
    let dir = TempDir::new().unwrap();
    write_images(&dir.path().join("images"), 3);

    probe(dir.path())
        .args(["run", "worker", "--max-workers", "2", "-Q"])
        .assert()
        .success();

    let data = dir.path().join("data");
    assert!(data.join("memoryUsageChart-from-master.png").exists());
    assert!(data.join("memoryUsageData-from-workers.png").exists());
}

#[test]
fn direct_variant_json_output() {
    let dir = TempDir::new().unwrap();
    write_images(&dir.path().join("pics"), 2);

    let output = probe(dir.path())
        .args(["run", "direct", "--json", "-i", "pics", "-o", "small", "-d", "charts", "-w", "100"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["variant"], "direct");
    assert_eq!(report["processed"], 2);
    assert_eq!(report["samples"].as_array().unwrap().len(), 2 + 2);
    assert_eq!(report["samples"][2]["file"], "timeout-test-1");

    let resized = image::open(dir.path().join("small").join("img-0.png")).unwrap();
    assert_eq!(resized.width(), 100);
    assert!(dir.path().join("charts").join("memoryUsageChart-disk.png").exists());
}

#[test]
fn missing_input_directory_fails() {
    let dir = TempDir::new().unwrap();

    probe(dir.path())
        .args(["run", "stream", "-Q"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error"));
}

#[test]
fn example_config_round_trips() {
    let dir = TempDir::new().unwrap();

    Command::cargo_bin("resizeprobe")
        .unwrap()
        .current_dir(dir.path())
        .args(["example-config", "probe.toml"])
        .assert()
        .success();

    Command::cargo_bin("resizeprobe")
        .unwrap()
        .current_dir(dir.path())
        .args(["config", "probe.toml"])
        .assert()
        .success()
        .stdout(predicate::str::contains("valid"));
}

#[test]
fn invalid_width_is_rejected() {
    let dir = TempDir::new().unwrap();
    write_images(&dir.path().join("images"), 1);

    probe(dir.path())
        .args(["run", "direct", "-w", "0"])
        .assert()
        .failure();
}
