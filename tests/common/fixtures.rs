//! Throwaway project trees

use std::path::Path;
use tempfile::TempDir;

pub fn write_file(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

pub fn unity_project() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write_file(root, "Assets/Scripts/Player.cs", "public class Player : MonoBehaviour {}\n");
    write_file(root, "Assets/Scripts/Game.asmdef", r#"{ "name": "Game" }"#);
    write_file(root, "Assets/Textures/terrain.png", "not really a png");
    write_file(root, "ProjectSettings/ProjectVersion.txt", "m_EditorVersion: 2022.3.10f1\n");
    write_file(root, "Packages/manifest.json", r#"{ "dependencies": {} }"#);
    write_file(root, "Game.sln", "Microsoft Visual Studio Solution File\n");
    write_file(root, "Library/ArtifactDB", "cache");
    dir
}

pub fn bevy_project() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write_file(
        root,
        "Cargo.toml",
        "[package]\nname = \"game\"\nversion = \"0.1.0\"\n\n[dependencies]\nbevy = \"0.12\"\n",
    );
    write_file(root, "src/main.rs", "fn main() {\n    game::run();\n}\n");
    write_file(root, "src/lib.rs", "pub fn run() {}\n");
    write_file(root, "assets/textures/grass.png", "not really a png");
    write_file(root, "target/debug/game", "binary");
    dir
}

pub const NUNIT_PASSING: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<test-run id="2" result="Passed" total="2" passed="2" failed="0" skipped="0">
  <test-case id="1" name="Moves" fullname="PlayerTests.Moves" result="Passed" />
  <test-case id="2" name="Jumps" fullname="PlayerTests.Jumps" result="Passed" />
</test-run>"#;

pub const NUNIT_FAILING: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<test-run id="2" result="Failed" total="2" passed="1" failed="1" skipped="0">
  <test-case id="1" name="Moves" fullname="PlayerTests.Moves" result="Passed" />
  <test-case id="2" name="Jumps" fullname="PlayerTests.Jumps" result="Failed" />
</test-run>"#;
