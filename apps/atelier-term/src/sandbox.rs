use std::fs;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;

/// The closed verb vocabulary accepted on the command channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SandboxCommand {
    CreateFile(String),
    CreateDir(String),
    Remove(String),
    List(Option<String>),
}

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("unknown command: {0}")]
    UnknownCommand(String),
    #[error("{0} requires a path argument")]
    MissingPath(&'static str),
    #[error("path escapes the project root: {0}")]
    Containment(String),
    #[error("parent directory does not exist: {0}")]
    ParentMissing(String),
    #[error("no such file or directory: {0}")]
    NotFound(String),
    #[error("filesystem error: {0}")]
    Io(#[from] std::io::Error),
}

impl SandboxCommand {
    /// Parse a `<verb> <path>` line. Unknown verbs are a parse error, not a
    /// fallthrough.
    pub fn parse(line: &str) -> Result<Self, SandboxError> {
        let line = line.trim();
        let (verb, argument) = match line.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb, Some(rest.trim())),
            None => (line, None),
        };
        let argument = argument.filter(|a| !a.is_empty()).map(str::to_string);

        match verb {
            "crear-archivo" => argument
                .map(SandboxCommand::CreateFile)
                .ok_or(SandboxError::MissingPath("crear-archivo")),
            "crear-directorio" => argument
                .map(SandboxCommand::CreateDir)
                .ok_or(SandboxError::MissingPath("crear-directorio")),
            "eliminar" => argument
                .map(SandboxCommand::Remove)
                .ok_or(SandboxError::MissingPath("eliminar")),
            "listar" => Ok(SandboxCommand::List(argument)),
            other => Err(SandboxError::UnknownCommand(other.to_string())),
        }
    }
}

/// Syntactic path filter: backslashes become slashes, `..` sequences are
/// removed, and anything outside `[A-Za-z0-9_\-./]` is stripped. The
/// containment check in `resolve` backs this up.
pub fn sanitize_path(raw: &str) -> String {
    let mut path = raw.replace('\\', "/");
    while path.contains("..") {
        path = path.replace("..", "");
    }
    path.chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '/'))
        .collect()
}

/// Resolve a raw client path against the project root, fail-closed: the
/// result must stay under the root or the operation is rejected before any
/// filesystem syscall.
pub fn resolve(root: &Path, raw: &str) -> Result<PathBuf, SandboxError> {
    let safe = sanitize_path(raw);
    let relative = safe.trim_start_matches('/');

    let mut resolved = root.to_path_buf();
    for component in Path::new(relative).components() {
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::CurDir => {}
            // Sanitization already removed `..`; anything else that would
            // re-anchor the path is a containment violation.
            _ => return Err(SandboxError::Containment(raw.to_string())),
        }
    }

    if !resolved.starts_with(root) {
        return Err(SandboxError::Containment(raw.to_string()));
    }
    Ok(resolved)
}

/// Parse and execute one command line against the project root.
pub fn run(root: &Path, line: &str) -> Result<String, SandboxError> {
    let command = SandboxCommand::parse(line)?;
    execute(root, command)
}

pub fn execute(root: &Path, command: SandboxCommand) -> Result<String, SandboxError> {
    match command {
        SandboxCommand::CreateFile(raw) => {
            let path = resolve(root, &raw)?;
            match path.parent() {
                Some(parent) if parent.is_dir() => {}
                _ => return Err(SandboxError::ParentMissing(raw)),
            }
            fs::write(&path, b"")?;
            Ok(format!("created file {}", display_path(root, &path)))
        }
        SandboxCommand::CreateDir(raw) => {
            let path = resolve(root, &raw)?;
            fs::create_dir_all(&path)?;
            Ok(format!("created directory {}", display_path(root, &path)))
        }
        SandboxCommand::Remove(raw) => {
            let path = resolve(root, &raw)?;
            let metadata =
                fs::symlink_metadata(&path).map_err(|_| SandboxError::NotFound(raw.clone()))?;
            if metadata.is_dir() {
                fs::remove_dir_all(&path)?;
            } else {
                fs::remove_file(&path)?;
            }
            Ok(format!("removed {}", display_path(root, &path)))
        }
        SandboxCommand::List(raw) => {
            let path = match raw {
                Some(raw) => resolve(root, &raw)?,
                None => root.to_path_buf(),
            };
            let mut entries: Vec<String> = fs::read_dir(&path)?
                .filter_map(|entry| entry.ok())
                .map(|entry| entry.file_name().to_string_lossy().into_owned())
                .collect();
            entries.sort();
            Ok(entries.join("\n"))
        }
    }
}

fn display_path(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn project_root() -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let root = dir.path().canonicalize().unwrap();
        (dir, root)
    }

    #[test]
    fn sanitize_strips_traversal_and_odd_characters() {
        assert_eq!(sanitize_path("../../etc/passwd"), "//etc/passwd");
        assert_eq!(sanitize_path("..\\..\\secret"), "//secret");
        assert_eq!(sanitize_path("src/main.rs"), "src/main.rs");
        assert_eq!(sanitize_path("a b;c|d"), "abcd");
        assert_eq!(sanitize_path("a/..../b"), "a//b");
    }

    #[test]
    fn resolve_always_stays_under_the_root() {
        let (_dir, root) = project_root();
        for raw in [
            "../../etc/passwd",
            "..\\..\\secret",
            "a/../../b",
            "/etc/shadow",
            "normal/path.txt",
            "....//h",
        ] {
            let resolved = resolve(&root, raw).unwrap();
            assert!(
                resolved.starts_with(&root),
                "{:?} resolved to {:?}",
                raw,
                resolved
            );
        }
    }

    #[test]
    fn parse_accepts_the_four_verbs_only() {
        assert_eq!(
            SandboxCommand::parse("crear-archivo src/main.rs").unwrap(),
            SandboxCommand::CreateFile("src/main.rs".to_string())
        );
        assert_eq!(
            SandboxCommand::parse("crear-directorio src").unwrap(),
            SandboxCommand::CreateDir("src".to_string())
        );
        assert_eq!(
            SandboxCommand::parse("eliminar old.txt").unwrap(),
            SandboxCommand::Remove("old.txt".to_string())
        );
        assert_eq!(
            SandboxCommand::parse("listar").unwrap(),
            SandboxCommand::List(None)
        );
        assert_eq!(
            SandboxCommand::parse("listar src").unwrap(),
            SandboxCommand::List(Some("src".to_string()))
        );

        assert!(matches!(
            SandboxCommand::parse("formatear-disco c"),
            Err(SandboxError::UnknownCommand(_))
        ));
        assert!(matches!(
            SandboxCommand::parse("eliminar"),
            Err(SandboxError::MissingPath("eliminar"))
        ));
    }

    #[test]
    fn create_file_requires_an_existing_parent() {
        let (_dir, root) = project_root();

        assert!(matches!(
            run(&root, "crear-archivo missing/dir/file.txt"),
            Err(SandboxError::ParentMissing(_))
        ));

        run(&root, "crear-archivo notes.txt").unwrap();
        assert!(root.join("notes.txt").is_file());
    }

    #[test]
    fn create_dir_is_idempotent() {
        let (_dir, root) = project_root();

        run(&root, "crear-directorio src/components").unwrap();
        run(&root, "crear-directorio src/components").unwrap();
        assert!(root.join("src/components").is_dir());
    }

    #[test]
    fn list_on_an_empty_root_is_empty_not_an_error() {
        let (_dir, root) = project_root();
        assert_eq!(run(&root, "listar").unwrap(), "");
    }

    #[test]
    fn list_returns_sorted_entries() {
        let (_dir, root) = project_root();
        run(&root, "crear-directorio zeta").unwrap();
        run(&root, "crear-archivo alpha.txt").unwrap();
        assert_eq!(run(&root, "listar").unwrap(), "alpha.txt\nzeta");
    }

    #[test]
    fn remove_handles_files_and_directories() {
        let (_dir, root) = project_root();

        run(&root, "crear-directorio nested/inner").unwrap();
        run(&root, "crear-archivo nested/inner/file.txt").unwrap();
        run(&root, "eliminar nested").unwrap();
        assert!(!root.join("nested").exists());

        run(&root, "crear-archivo single.txt").unwrap();
        run(&root, "eliminar single.txt").unwrap();
        assert!(!root.join("single.txt").exists());
    }

    #[test]
    fn remove_of_a_missing_path_is_an_error() {
        let (_dir, root) = project_root();
        assert!(matches!(
            run(&root, "eliminar no-such-thing"),
            Err(SandboxError::NotFound(_))
        ));
    }

    #[test]
    fn traversal_attempts_never_touch_the_outside() {
        let (_dir, root) = project_root();
        // After sanitization this lands inside the root, not at /etc
        run(&root, "crear-directorio ../../taken").unwrap();
        assert!(root.join("taken").is_dir());
    }
}
