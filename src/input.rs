use crate::DynResult;
use regex::Regex;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Submission {
    pub name: String,
    pub content: String,
}

fn file_name_matches(path: &Path, filter: &Regex) -> bool {
    path.file_name().and_then(OsStr::to_str).map(|s| filter.is_match(s)) == Some(true)
}

fn sorted_entries(directory: &Path) -> DynResult<Vec<PathBuf>> {
    let mut paths = vec![];
    for entry in std::fs::read_dir(directory)? {
        paths.push(entry?.path());
    }
    paths.sort();
    Ok(paths)
}

/// Every file under `directory` whose name matches `filter`, recursively, in path order.
fn collect_files(directory: &Path, filter: &Regex, files: &mut Vec<PathBuf>) -> DynResult<()> {
    for path in sorted_entries(directory)? {
        if path.is_dir() {
            collect_files(&path, filter, files)?;
        } else if file_name_matches(&path, filter) {
            files.push(path);
        }
    }
    Ok(())
}

fn read_lossy(path: &Path) -> DynResult<String> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
        Err(e) => Err(format!("cannot read '{}': {e}", path.display()))?,
    }
}

/// Reads one submission per entry of `directory`. A plain file is a submission on its own; a
/// sub-directory is one submission made of its matching files joined by newlines. Entries left
/// with no matching file are skipped.
pub fn read_submissions(directory: &Path, filter: &Regex) -> DynResult<Vec<Submission>> {
    if !directory.is_dir() {
        return Err(format!("'{}' is not a directory", directory.display()))?;
    }

    let mut submissions = vec![];
    for path in sorted_entries(directory)? {
        let Some(name) = path.file_name().map(|name| name.to_string_lossy().into_owned()) else {
            continue;
        };
        if name.starts_with('.') {
            continue;
        }

        let mut files = vec![];
        if path.is_dir() {
            collect_files(&path, filter, &mut files)?;
        } else if file_name_matches(&path, filter) {
            files.push(path);
        }
        if files.is_empty() {
            continue;
        }

        let parts = files.iter().map(|file| read_lossy(file)).collect::<DynResult<Vec<_>>>()?;
        submissions.push(Submission {
            name,
            content: parts.join("\n"),
        });
    }

    Ok(submissions)
}

#[cfg(test)]
mod test {
    use super::*;
    use std::fs;

    #[test]
    fn files_and_directories_become_submissions() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("alice.c"), "int a;").unwrap();
        fs::create_dir_all(root.join("bob").join("src")).unwrap();
        fs::write(root.join("bob").join("main.c"), "int main;").unwrap();
        fs::write(root.join("bob").join("src").join("util.c"), "int util;").unwrap();
        fs::write(root.join("bob").join("notes.txt"), "ignored").unwrap();
        fs::create_dir(root.join("carol")).unwrap();
        fs::write(root.join(".hidden"), "x").unwrap();

        let filter = Regex::new(r"\.c$").unwrap();
        let submissions = read_submissions(root, &filter).unwrap();
        assert_eq!(
            submissions,
            vec![
                Submission {
                    name: "alice.c".into(),
                    content: "int a;".into()
                },
                Submission {
                    name: "bob".into(),
                    content: "int main;\nint util;".into()
                },
            ]
        );
    }

    #[test]
    fn empty_filter_matches_everything() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "one").unwrap();
        fs::write(dir.path().join("b"), [0xff, b'x']).unwrap();
        let submissions = read_submissions(dir.path(), &Regex::new("").unwrap()).unwrap();
        assert_eq!(submissions.len(), 2);
        assert_eq!(submissions[1].content, "\u{fffd}x");
    }

    #[test]
    fn missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_submissions(&dir.path().join("nope"), &Regex::new("").unwrap()).is_err());
    }
}
