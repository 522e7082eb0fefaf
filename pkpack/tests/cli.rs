#![cfg(feature = "cli")]

use std::error::Error;
use std::fs;
use std::path::Path;
use std::process::{Command, Output, Stdio};

use pkpack::codec;
use pkpack::core::Entry;

const PKPACK: &str = env!("CARGO_BIN_EXE_pkpack");

fn entries() -> Vec<Entry> {
    vec![
        Entry::new("app-1.0/readme.txt", "hello from app\n"),
        Entry::new("app-1.0/app/__init__.src", ""),
        Entry::new("app-1.0/app/mod.src", "X=1\n"),
        Entry::new("app-1.0/a.src", "#!/usr/bin/env pkpack\nimport app.mod\nprint('x is', app.mod.X)\n"),
        Entry::new("app-1.0/env.sh", "#!/bin/sh\necho \"${PKPACK_INLINE:-unset} $1\"\nexit 3\n"),
    ]
}

fn command(program: impl AsRef<std::ffi::OsStr>) -> Command {
    let mut command = Command::new(program);
    command
        .env_remove("pk")
        .env_remove("PKPACK_INLINE")
        .env_remove("PKPACK_LOADER_TMP")
        .env_remove("PKPACK_PATH")
        .env_remove("PKPACK_VERBOSE")
        .env("PKPACK_SHELL", "/bin/sh")
        .stdin(Stdio::null());
    command
}

fn tarball(dir: &Path) -> Result<std::path::PathBuf, Box<dyn Error>> {
    let path = dir.join("app.tar.gz");
    fs::write(&path, codec::pack(&entries())?)?;
    Ok(path)
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn readme_without_arguments() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let output = command(PKPACK).env("pk", tarball(dir.path())?).output()?;
    assert!(output.status.success(), "{:?}", output);
    assert_eq!(stdout(&output), "hello from app\n");
    Ok(())
}

#[test]
fn listing() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let output = command(PKPACK)
        .env("pk", tarball(dir.path())?)
        .args(&["--ls", "app-1.0/app/"])
        .output()?;
    assert!(output.status.success(), "{:?}", output);
    assert_eq!(stdout(&output), "app-1.0/app/__init__.src app-1.0/app/mod.src\n");
    Ok(())
}

#[test]
fn archive_on_stdin() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let output = command(PKPACK)
        .stdin(fs::File::open(tarball(dir.path())?)?)
        .arg("a.src")
        .output()?;
    assert!(output.status.success(), "{:?}", output);
    assert_eq!(stdout(&output), "x is 1\n");
    Ok(())
}

#[test]
fn bundle_runs_under_sh() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let scratch = dir.path().join("scratch");
    fs::create_dir(&scratch)?;

    let output = command(PKPACK)
        .env("pk", tarball(dir.path())?)
        .args(&["--pack", "a.src"])
        .output()?;
    assert!(output.status.success(), "{:?}", output);
    let bundle = dir.path().join("app.pk");
    fs::write(&bundle, &output.stdout)?;

    let output = command("/bin/sh").env("TMPDIR", &scratch).arg(&bundle).output()?;
    assert!(output.status.success(), "{:?}", output);
    assert_eq!(stdout(&output), "hello from app\n");

    // Not an entry: the declared default runs instead
    let output = command("/bin/sh")
        .env("TMPDIR", &scratch)
        .arg(&bundle)
        .arg("not-an-entry")
        .output()?;
    assert!(output.status.success(), "{:?}", output);
    assert_eq!(stdout(&output), "x is 1\n");

    // Shell entry: stub variables are gone and the exit code comes through
    let output = command("/bin/sh")
        .env("TMPDIR", &scratch)
        .arg(&bundle)
        .args(&["env.sh", "arg"])
        .output()?;
    assert_eq!(output.status.code(), Some(3));
    assert_eq!(stdout(&output), "unset arg\n");

    // The stub's loader copy was deleted by the loader
    assert_eq!(fs::read_dir(&scratch)?.count(), 0);
    Ok(())
}

#[test]
fn empty_stdin_prints_usage() -> Result<(), Box<dyn Error>> {
    let output = command(PKPACK).arg("a.src").output()?;
    assert_eq!(output.status.code(), Some(1));
    assert!(stdout(&output).starts_with("pkpack: self-executing bundle loader\n"));
    Ok(())
}

#[test]
fn loader_flags_are_forwarded_to_the_default_entry() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let tarball = dir.path().join("argv.tar.gz");
    fs::write(
        &tarball,
        codec::pack(&[
            Entry::new("a.src", "#!/pk\nprint(argv)\n"),
            Entry::new("pack.spec", "__pk_entry__ = 'a.src'\n"),
        ])?,
    )?;

    for flag in &["--version", "-h", "--help", "-V"] {
        let output = command(PKPACK).env("pk", &tarball).arg(flag).output()?;
        assert!(output.status.success(), "{:?}", output);
        assert_eq!(stdout(&output), format!("[\"a.src\", \"{}\"]\n", flag));
    }
    Ok(())
}
