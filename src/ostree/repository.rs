use crate::audit::CommandLog;
use crate::config::{Config, ConfigError};
use crate::error::{OstreeError, Result};
use crate::ostree::executor::{CommandOutput, Diagnostics, OstreeExecutor};
use crate::ostree::parser::{self, CommitRecord, DiffEntry, FileEntry, Parsed};
use std::ops::Deref;
use std::path::Path;

/// Parsed output of one invocation together with its exit status and stderr.
///
/// Exit status does not fail the call unless strict checking is enabled, so
/// callers that care can inspect `diagnostics` themselves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response<T> {
    pub value: T,
    pub diagnostics: Diagnostics,
}

impl<T> Response<T> {
    pub fn into_value(self) -> T {
        self.value
    }

    fn map<U>(self, f: impl FnOnce(T) -> U) -> Response<U> {
        Response {
            value: f(self.value),
            diagnostics: self.diagnostics,
        }
    }
}

impl<T> Deref for Response<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

/// Client bound to one ostree repository
#[derive(Debug)]
pub struct Repository {
    location: String,
    executor: OstreeExecutor,
}

impl Repository {
    /// Create a client for a repository path or URI without checking it
    pub fn new<S: Into<String>>(location: S) -> Self {
        let location = location.into();
        let executor = OstreeExecutor::new(location.clone());

        Self { location, executor }
    }

    /// Create a client for a local repository, checking its layout
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let location = path.to_str().ok_or_else(|| {
            OstreeError::InvalidArgument(format!(
                "repository path is not valid UTF-8: {}",
                path.display()
            ))
        })?;
        if !is_repository(path) {
            return Err(OstreeError::NotARepository(path.to_path_buf()));
        }

        Ok(Self::new(location))
    }

    /// Find a repository at or above `start_path`.
    ///
    /// Each directory is checked itself and through a `repo/` child, so
    /// starting anywhere under `/ostree` finds `/ostree/repo`.
    pub fn discover_from<P: AsRef<Path>>(start_path: P) -> Result<Self> {
        let mut current = start_path.as_ref().to_path_buf();

        loop {
            if is_repository(&current) {
                return Self::open(&current);
            }
            let nested = current.join("repo");
            if is_repository(&nested) {
                return Self::open(&nested);
            }

            if !current.pop() {
                return Err(OstreeError::NotARepository(start_path.as_ref().to_path_buf()));
            }
        }
    }

    /// Build a client from configuration; `ostree.repo` must be set
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;

        let location = config.ostree.repo.clone().ok_or_else(|| {
            ConfigError::InvalidValue("ostree.repo is not set".to_string())
        })?;

        let mut executor = OstreeExecutor::new(location.clone())
            .with_binary(config.ostree.binary.clone())
            .with_strict_exit_status(config.behavior.strict_exit_status);

        if config.behavior.log_commands {
            let log = match &config.log.path {
                Some(path) => CommandLog::with_path(path)?,
                None => CommandLog::new()?,
            };
            executor = executor.with_log(log);
        }

        Ok(Self { location, executor })
    }

    /// Use a different ostree executable
    pub fn with_binary<S: Into<String>>(mut self, binary: S) -> Self {
        self.executor = self.executor.with_binary(binary);
        self
    }

    /// Fail operations whose invocation exits non-zero
    pub fn with_strict_exit_status(mut self, strict: bool) -> Self {
        self.executor = self.executor.with_strict_exit_status(strict);
        self
    }

    /// Get the repository location passed as `--repo`
    pub fn location(&self) -> &str {
        &self.location
    }

    /// List ref names (`ostree refs`)
    pub fn list_refs(&self) -> Result<Response<Vec<String>>> {
        let output = self.run(&["refs"])?;
        Ok(text_response(&output)?.map(|text| parser::parse_refs(&text)))
    }

    /// Resolve a ref or partial checksum to a full checksum (`ostree rev-parse`)
    pub fn resolve_revision(&self, rev: &str) -> Result<Response<String>> {
        check_revision(rev)?;
        let output = self.run(&["rev-parse", rev])?;
        text_response(&output)
    }

    /// Read a file's content at a revision (`ostree cat`), undecoded
    pub fn read_file(&self, rev: &str, path: &str) -> Result<Response<Vec<u8>>> {
        check_revision(rev)?;
        check_path(path)?;
        let output = self.run(&["cat", rev, path])?;

        Ok(Response {
            diagnostics: output.diagnostics(),
            value: output.stdout,
        })
    }

    /// Commit history from `rev` (`ostree log`).
    ///
    /// The first entry is always `Parsed::Incomplete`, from the text before
    /// the first `commit` line. Use [`Repository::commits`] to skip it.
    pub fn log(&self, rev: &str) -> Result<Response<Vec<Parsed<CommitRecord>>>> {
        check_revision(rev)?;
        let output = self.run(&["log", rev])?;
        let response = text_response(&output)?;

        Ok(Response {
            value: parser::parse_log(&response.value)?,
            diagnostics: response.diagnostics,
        })
    }

    /// Commit history from `rev` without incomplete blocks
    pub fn commits(&self, rev: &str) -> Result<Response<Vec<CommitRecord>>> {
        Ok(self
            .log(rev)?
            .map(|commits| commits.into_iter().filter_map(Parsed::into_complete).collect()))
    }

    /// A single commit (`ostree show`)
    pub fn show(&self, rev: &str) -> Result<Response<Parsed<CommitRecord>>> {
        check_revision(rev)?;
        let output = self.run(&["show", rev])?;
        let response = text_response(&output)?;

        Ok(Response {
            value: parser::parse_show(&response.value)?,
            diagnostics: response.diagnostics,
        })
    }

    /// Changes introduced by `rev` (`ostree diff <rev>`)
    pub fn diff(&self, rev: &str) -> Result<Response<Vec<DiffEntry>>> {
        check_revision(rev)?;
        self.run_diff(&["diff", rev])
    }

    /// Changes between two revisions (`ostree diff <from> <to>`)
    pub fn diff_between(&self, from: &str, to: &str) -> Result<Response<Vec<DiffEntry>>> {
        check_revision(from)?;
        check_revision(to)?;
        self.run_diff(&["diff", from, to])
    }

    /// List `path` at `rev` (`ostree ls [--recursive]`)
    pub fn ls(
        &self,
        rev: &str,
        path: &str,
        recursive: bool,
    ) -> Result<Response<Vec<Parsed<FileEntry>>>> {
        check_revision(rev)?;
        check_path(path)?;

        let mut args = vec!["ls"];
        if recursive {
            args.push("--recursive");
        }
        args.extend([rev, path]);

        let output = self.run(&args)?;
        let response = text_response(&output)?;

        Ok(Response {
            value: parser::parse_listing(&response.value)?,
            diagnostics: response.diagnostics,
        })
    }

    fn run_diff(&self, args: &[&str]) -> Result<Response<Vec<DiffEntry>>> {
        let output = self.run(args)?;
        let response = text_response(&output)?;

        Ok(Response {
            value: parser::parse_diff(&response.value)?,
            diagnostics: response.diagnostics,
        })
    }

    fn run(&self, args: &[&str]) -> Result<CommandOutput> {
        self.executor.execute(args)
    }

    /// Get the executor for this repository
    pub fn executor(&self) -> &OstreeExecutor {
        &self.executor
    }
}

fn text_response(output: &CommandOutput) -> Result<Response<String>> {
    Ok(Response {
        value: output.text()?,
        diagnostics: output.diagnostics(),
    })
}

/// A local directory with an ostree repository layout
fn is_repository(path: &Path) -> bool {
    path.join("config").is_file() && path.join("objects").is_dir()
}

/// Reject revisions that ostree would read as an option
fn check_revision(rev: &str) -> Result<()> {
    if rev.is_empty() {
        return Err(OstreeError::InvalidArgument("empty revision".to_string()));
    }
    if rev.starts_with('-') {
        return Err(OstreeError::InvalidArgument(format!(
            "revision must not start with '-': {}",
            rev
        )));
    }
    Ok(())
}

fn check_path(path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(OstreeError::InvalidArgument("empty path".to_string()));
    }
    if path.starts_with('-') {
        return Err(OstreeError::InvalidArgument(format!(
            "path must not start with '-': {}",
            path
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn create_repo_layout(path: &Path) {
        fs::create_dir_all(path.join("objects")).unwrap();
        fs::create_dir_all(path.join("refs").join("heads")).unwrap();
        fs::write(path.join("config"), "[core]\nrepo_version=1\nmode=bare\n").unwrap();
    }

    #[test]
    fn test_new_keeps_location() {
        let repo = Repository::new("https://example.com/repo");
        assert_eq!(repo.location(), "https://example.com/repo");
        assert_eq!(repo.executor().repo(), "https://example.com/repo");
    }

    #[test]
    fn test_open_repo() {
        let temp = TempDir::new().unwrap();
        create_repo_layout(temp.path());

        let repo = Repository::open(temp.path()).unwrap();
        assert_eq!(Path::new(repo.location()), temp.path());
    }

    #[cfg(unix)]
    #[test]
    fn test_open_non_utf8_path() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let temp = TempDir::new().unwrap();
        let path = temp.path().join(OsStr::from_bytes(b"repo-\xff"));
        create_repo_layout(&path);

        let result = Repository::open(&path);
        assert!(matches!(result, Err(OstreeError::InvalidArgument(_))));
    }

    #[test]
    fn test_open_not_a_repo() {
        let temp = TempDir::new().unwrap();
        let result = Repository::open(temp.path());

        assert!(matches!(result, Err(OstreeError::NotARepository(_))));
    }

    #[test]
    fn test_discover_from_subdirectory() {
        let temp = TempDir::new().unwrap();
        create_repo_layout(temp.path());
        let sub_dir = temp.path().join("objects").join("ab");
        fs::create_dir_all(&sub_dir).unwrap();

        let repo = Repository::discover_from(&sub_dir).unwrap();
        assert_eq!(Path::new(repo.location()), temp.path());
    }

    #[test]
    fn test_discover_nested_repo_dir() {
        let temp = TempDir::new().unwrap();
        let repo_dir = temp.path().join("ostree").join("repo");
        create_repo_layout(&repo_dir);
        let deploy_dir = temp.path().join("ostree").join("deploy");
        fs::create_dir_all(&deploy_dir).unwrap();

        let repo = Repository::discover_from(&deploy_dir).unwrap();
        assert_eq!(Path::new(repo.location()), repo_dir);
    }

    #[test]
    fn test_discover_not_a_repo() {
        let temp = TempDir::new().unwrap();
        let result = Repository::discover_from(temp.path());

        assert!(matches!(result, Err(OstreeError::NotARepository(_))));
    }

    #[test]
    fn test_from_config_requires_repo() {
        let config = Config::default_config();
        let result = Repository::from_config(&config);

        assert!(matches!(
            result,
            Err(OstreeError::Config(ConfigError::InvalidValue(_)))
        ));
    }

    #[test]
    fn test_from_config() {
        let temp = TempDir::new().unwrap();
        let mut config = Config::default_config();
        config.ostree.repo = Some("/srv/repo".to_string());
        config.ostree.binary = "/usr/local/bin/ostree".to_string();
        config.behavior.log_commands = true;
        config.log.path = Some(temp.path().join("commands.log"));

        let repo = Repository::from_config(&config).unwrap();
        assert_eq!(repo.location(), "/srv/repo");
        assert_eq!(repo.executor().binary(), "/usr/local/bin/ostree");
    }

    #[test]
    fn test_option_like_arguments_rejected() {
        let repo = Repository::new("/srv/repo").with_binary("/nonexistent/ostree-binary");

        assert!(matches!(
            repo.resolve_revision("--help"),
            Err(OstreeError::InvalidArgument(_))
        ));
        assert!(matches!(repo.log(""), Err(OstreeError::InvalidArgument(_))));
        assert!(matches!(
            repo.read_file("main", "-rf"),
            Err(OstreeError::InvalidArgument(_))
        ));
        assert!(matches!(
            repo.ls("main", "", false),
            Err(OstreeError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_response_deref() {
        let response = Response {
            value: vec![1, 2, 3],
            diagnostics: Diagnostics::default(),
        };

        assert_eq!(response.len(), 3);
        assert_eq!(response.into_value(), vec![1, 2, 3]);
    }
}
