/*!
`run.rs`

The whole `diem` pipeline:

  parse tokens -> resolve repository -> metadata (exists? default branch)
  -> branch (--branch overrides) -> fetch + merge fragments
  -> scratch dir -> download files + entrypoint (concurrently)
  -> [install dependencies] -> launch entrypoint with passthrough tail

Settings precedence: CLI flag > environment variable > built-in default.

  --workdir    DIEM_WORKDIR    ./tmp
  --runner     DIEM_RUNNER     node
  --installer  DIEM_INSTALLER  npm install
  --api-url    DIEM_API_URL    https://api.github.com
  --raw-url    DIEM_RAW_URL    https://raw.githubusercontent.com
               GITHUB_TOKEN    (optional bearer token)
*/

use anyhow::{Context, Result, bail};
use clap::Args;
use futures::future::try_join_all;
use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use url::Url;

use crate::args::{ParsedArguments, extract};
use crate::cmd::format::StatusLine;
use crate::config::EffectiveConfig;
use crate::launch::{self, CommandLine, DEFAULT_INSTALLER, DEFAULT_RUNNER};
use crate::manifest::resolve_config;
use crate::remote::{
    DEFAULT_API_URL, DEFAULT_RAW_URL, GithubSource, RepositoryName, RepositorySource,
};
use crate::scratch::{self, DEFAULT_WORKDIR};
use crate::utils::env_nonempty;

/* -------------------------------------------------------------------------- */
/* Argument Struct                                                            */
/* -------------------------------------------------------------------------- */

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Root for scratch directories (DIEM_WORKDIR) [default: ./tmp]
    #[arg(long, value_name = "DIR")]
    pub workdir: Option<String>,

    /// Command used to run the entrypoint (DIEM_RUNNER) [default: node]
    #[arg(long, value_name = "CMD")]
    pub runner: Option<String>,

    /// Command used to install dependencies (DIEM_INSTALLER) [default: npm install]
    #[arg(long, value_name = "CMD")]
    pub installer: Option<String>,

    /// GitHub REST API base URL (DIEM_API_URL)
    #[arg(long, value_name = "URL")]
    pub api_url: Option<String>,

    /// Raw content base URL (DIEM_RAW_URL)
    #[arg(long, value_name = "URL")]
    pub raw_url: Option<String>,

    /// Repository, then its options (--branch, --entrypoint, --files, --install)
    /// and `-- ARGS` forwarded to the script
    #[arg(
        value_name = "REPOSITORY",
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    pub tokens: Vec<String>,
}

/* -------------------------------------------------------------------------- */
/* Settings                                                                   */
/* -------------------------------------------------------------------------- */

/// Resolved, validated settings for one run.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub workdir: PathBuf,
    pub runner: CommandLine,
    pub installer: CommandLine,
    pub api_url: Url,
    pub raw_url: Url,
    pub token: Option<String>,
}

impl RunSettings {
    pub fn resolve(args: &RunArgs) -> Result<Self> {
        Self::resolve_with(args, env_nonempty)
    }

    /// Same as `resolve` with an injectable environment lookup.
    pub fn resolve_with(args: &RunArgs, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let pick = |flag: &Option<String>, key: &str, default: &str| -> String {
            flag.clone()
                .filter(|s| !s.trim().is_empty())
                .or_else(|| env(key))
                .unwrap_or_else(|| default.to_string())
        };

        let workdir = PathBuf::from(pick(&args.workdir, "DIEM_WORKDIR", DEFAULT_WORKDIR));
        let workdir = if workdir.is_absolute() {
            workdir
        } else {
            std::env::current_dir()
                .context("Failed to read current directory")?
                .join(workdir)
        };

        let runner = CommandLine::parse(&pick(&args.runner, "DIEM_RUNNER", DEFAULT_RUNNER))
            .context("Invalid runner")?;
        let installer =
            CommandLine::parse(&pick(&args.installer, "DIEM_INSTALLER", DEFAULT_INSTALLER))
                .context("Invalid installer")?;

        let api_raw = pick(&args.api_url, "DIEM_API_URL", DEFAULT_API_URL);
        let api_url = Url::parse(&api_raw).with_context(|| format!("Invalid API URL: '{api_raw}'"))?;
        let raw_raw = pick(&args.raw_url, "DIEM_RAW_URL", DEFAULT_RAW_URL);
        let raw_url = Url::parse(&raw_raw).with_context(|| format!("Invalid raw URL: '{raw_raw}'"))?;

        Ok(RunSettings {
            workdir,
            runner,
            installer,
            api_url,
            raw_url,
            token: env("GITHUB_TOKEN"),
        })
    }
}

/* -------------------------------------------------------------------------- */
/* Public Entry Point                                                         */
/* -------------------------------------------------------------------------- */

pub fn execute_run<W: Write>(args: RunArgs, status: &mut StatusLine<W>) -> Result<()> {
    let settings = RunSettings::resolve(&args)?;
    let parsed = extract(&args.tokens);
    crate::log_debug!("parsed arguments: {parsed:?}");

    let source = GithubSource::new(
        settings.api_url.clone(),
        settings.raw_url.clone(),
        settings.token.clone(),
    )?;

    let rt = tokio::runtime::Runtime::new().context("Failed to create Tokio runtime")?;
    rt.block_on(run(&source, &parsed, &settings, status))
}

/* -------------------------------------------------------------------------- */
/* Pipeline                                                                   */
/* -------------------------------------------------------------------------- */

/// Everything on disk and ready to launch.
#[derive(Debug)]
pub struct Prepared {
    pub repo: RepositoryName,
    pub branch: String,
    pub config: EffectiveConfig,
    pub dir: PathBuf,
}

/// Resolve, configure and download. Stops short of running anything.
pub async fn prepare<S, W>(
    source: &S,
    parsed: &ParsedArguments,
    settings: &RunSettings,
    status: &mut StatusLine<W>,
) -> Result<Prepared>
where
    S: RepositorySource,
    W: Write,
{
    let Some(raw_repo) = parsed.positional.first() else {
        bail!("Missing repository (usage: diem <OWNER/NAME | NAME> [OPTIONS] [-- ARGS])");
    };
    let repo = RepositoryName::resolve(raw_repo)?;

    status.step("announce", &format!("Diem to {repo} ..."));

    let Some(meta) = source
        .metadata(&repo)
        .await
        .with_context(|| format!("Failed to look up {repo}"))?
    else {
        bail!("Looks like {repo} does not exist");
    };

    let branch = match parsed.text("branch").map(str::trim).filter(|b| !b.is_empty()) {
        Some(b) => b.to_string(),
        None => {
            if parsed.option("branch").is_some() {
                crate::log_warn!("--branch given without a value; using default branch");
            }
            meta.default_branch
        }
    };
    crate::log_info!("repository {repo} @ {branch}");

    status.step("tool", "Fetching the config ...");
    let config = resolve_config(source, &repo, &branch, parsed).await;
    crate::log_debug!("effective config: {config:?}");

    status.step("package", "Downloading files ...");
    let dir = scratch::prepare_dir(&settings.workdir, &repo.to_string()).await?;
    crate::log_info!("scratch directory {}", dir.display());
    download_all(source, &repo, &branch, &dir, &config).await?;

    Ok(Prepared {
        repo,
        branch,
        config,
        dir,
    })
}

/// Fetch every listed file plus the entrypoint into `dir`. A repeated path is
/// fetched once; a path escaping `dir` is rejected before any request.
async fn download_all<S: RepositorySource>(
    source: &S,
    repo: &RepositoryName,
    branch: &str,
    dir: &Path,
    config: &EffectiveConfig,
) -> Result<()> {
    let mut seen = HashSet::new();
    for file in config.downloads() {
        scratch::contained_path(dir, file)?;
    }
    let jobs = config
        .downloads()
        .filter(|file| seen.insert(*file))
        .map(|file| async move {
            let bytes = source.fetch(repo, branch, file).await.map_err(|e| {
                let url = source
                    .file_url(repo, branch, file)
                    .map(|u| u.to_string())
                    .unwrap_or_else(|_| file.to_string());
                e.context(format!("Cannot download file {url}"))
            })?;
            let written = scratch::place(dir, file, &bytes).await?;
            crate::log_trace!("wrote {} ({} bytes)", written.display(), bytes.len());
            Ok::<_, anyhow::Error>(())
        });
    try_join_all(jobs).await?;
    Ok(())
}

/// Full run: prepare, optionally install, then launch the entrypoint.
pub async fn run<S, W>(
    source: &S,
    parsed: &ParsedArguments,
    settings: &RunSettings,
    status: &mut StatusLine<W>,
) -> Result<()>
where
    S: RepositorySource,
    W: Write,
{
    let prepared = prepare(source, parsed, settings, status).await?;
    crate::log_debug!(
        "{}@{} ready in {}",
        prepared.repo,
        prepared.branch,
        prepared.dir.display()
    );

    if prepared.config.install_dependencies {
        status.block(
            "cabinet",
            "Installing dependencies ...",
            &settings.installer.to_string(),
        );
        launch::execute(&settings.installer, &prepared.dir)
            .await
            .context("Dependency installation failed")?;
    }

    let command = launch::run_command(
        &settings.runner,
        &prepared.config.entrypoint,
        &parsed.passthrough,
    );
    status.block("rocket", "Launching the script ...", &command.to_string());
    launch::execute(&command, &prepared.dir).await?;

    status.done("Diem complete");
    Ok(())
}

/* -------------------------------------------------------------------------- */
/* Tests                                                                      */
/* -------------------------------------------------------------------------- */

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmd::format::StyleOptions;
    use crate::launch::ChildFailed;
    use crate::remote::RepositoryMetadata;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory repository host.
    #[derive(Default)]
    struct FakeSource {
        branches: HashMap<String, String>,
        files: HashMap<String, Vec<u8>>,
        fetched: Mutex<Vec<String>>,
    }

    impl FakeSource {
        fn repo(mut self, name: &str, default_branch: &str) -> Self {
            self.branches.insert(name.into(), default_branch.into());
            self
        }

        fn file(mut self, repo: &str, branch: &str, path: &str, body: &str) -> Self {
            self.files
                .insert(format!("{repo}@{branch}:{path}"), body.as_bytes().to_vec());
            self
        }

        fn fetched(&self) -> Vec<String> {
            let mut list = self.fetched.lock().unwrap().clone();
            list.sort();
            list
        }
    }

    impl RepositorySource for FakeSource {
        async fn metadata(&self, repo: &RepositoryName) -> Result<Option<RepositoryMetadata>> {
            Ok(self
                .branches
                .get(&repo.to_string())
                .map(|b| RepositoryMetadata {
                    default_branch: b.clone(),
                }))
        }

        async fn fetch(&self, repo: &RepositoryName, branch: &str, path: &str) -> Result<Vec<u8>> {
            self.fetched.lock().unwrap().push(path.to_string());
            self.files
                .get(&format!("{repo}@{branch}:{path}"))
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("404 Not Found"))
        }

        fn file_url(&self, repo: &RepositoryName, branch: &str, path: &str) -> Result<Url> {
            Ok(Url::parse(&format!("https://raw.test/{repo}/{branch}/{path}"))?)
        }
    }

    fn settings(workdir: &Path, runner: &str) -> RunSettings {
        RunSettings {
            workdir: workdir.to_path_buf(),
            runner: CommandLine::parse(runner).unwrap(),
            installer: CommandLine::parse("true").unwrap(),
            api_url: Url::parse(DEFAULT_API_URL).unwrap(),
            raw_url: Url::parse(DEFAULT_RAW_URL).unwrap(),
            token: None,
        }
    }

    fn quiet_status() -> StatusLine<Vec<u8>> {
        StatusLine::new(Vec::new(), StyleOptions::plain(), true)
    }

    async fn prepare_quiet(
        source: &FakeSource,
        parsed: &ParsedArguments,
        workdir: &Path,
    ) -> Result<Prepared> {
        prepare(source, parsed, &settings(workdir, "node"), &mut quiet_status()).await
    }

    fn sample_source() -> FakeSource {
        FakeSource::default()
            .repo("acme/tools", "main")
            .file(
                "acme/tools",
                "main",
                ".diem.json",
                r#"{"files":["lib/util.js"],"entrypoint":"cli.js"}"#,
            )
            .file(
                "acme/tools",
                "main",
                "package.json",
                r#"{"name":"tools","diem":{"entrypoint":"other.js","installDependencies":true,"files":["package.json"]}}"#,
            )
            .file("acme/tools", "main", "lib/util.js", "exports.x = 1;")
            .file("acme/tools", "main", "cli.js", "require('./lib/util');")
    }

    #[tokio::test]
    async fn prepares_scratch_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let source = sample_source();
        let parsed = extract(["acme/tools", "--", "--port", "80"]);
        let mut status = StatusLine::new(Vec::new(), StyleOptions::plain(), false);

        let prepared = prepare(&source, &parsed, &settings(tmp.path(), "node"), &mut status)
            .await
            .unwrap();

        assert_eq!(prepared.branch, "main");
        assert_eq!(prepared.config.entrypoint, "cli.js");
        assert!(prepared.config.install_dependencies);
        assert_eq!(prepared.config.files, vec!["lib/util.js", "package.json"]);
        assert_eq!(prepared.dir, tmp.path().join("acme_tools"));
        assert_eq!(
            std::fs::read_to_string(prepared.dir.join("lib/util.js")).unwrap(),
            "exports.x = 1;"
        );
        assert!(prepared.dir.join("cli.js").is_file());
        assert!(prepared.dir.join("package.json").is_file());

        let shown = String::from_utf8(status.into_inner()).unwrap();
        assert!(shown.contains("Diem to acme/tools ..."));
        assert!(shown.contains("Downloading files ..."));
    }

    #[tokio::test]
    async fn branch_option_overrides_default() {
        let tmp = tempfile::tempdir().unwrap();
        let source = FakeSource::default()
            .repo("solo/solo", "main")
            .file("solo/solo", "dev", "diem.js", "console.log('dev')");
        let settings = settings(tmp.path(), "node");

        // `-bdev` sets option `b`, not `branch`
        let short = extract(["solo", "-bdev"]);
        assert!(prepare(&source, &short, &settings, &mut quiet_status()).await.is_err());

        let long = extract(["solo", "--branch", "dev"]);
        let prepared = prepare(&source, &long, &settings, &mut quiet_status())
            .await
            .unwrap();
        assert_eq!(prepared.branch, "dev");
        assert_eq!(prepared.config.entrypoint, "diem.js");
        assert!(prepared.dir.join("diem.js").is_file());
    }

    #[tokio::test]
    async fn bare_branch_flag_falls_back_to_default() {
        let tmp = tempfile::tempdir().unwrap();
        let source = FakeSource::default()
            .repo("solo/solo", "trunk")
            .file("solo/solo", "trunk", "diem.js", "1");
        let parsed = extract(["solo", "--branch"]);
        let prepared = prepare_quiet(&source, &parsed, tmp.path())
            .await
            .unwrap();
        assert_eq!(prepared.branch, "trunk");
    }

    #[tokio::test]
    async fn unknown_repository_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let source = FakeSource::default();
        let parsed = extract(["ghost/repo"]);
        let err = prepare_quiet(&source, &parsed, tmp.path())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Looks like ghost/repo does not exist");
        assert!(source.fetched().is_empty());
    }

    #[tokio::test]
    async fn missing_repository_argument() {
        let tmp = tempfile::tempdir().unwrap();
        let parsed = extract(["--branch", "dev"]);
        let err = prepare_quiet(&FakeSource::default(), &parsed, tmp.path())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Missing repository"));
    }

    #[tokio::test]
    async fn failed_download_names_url() {
        let tmp = tempfile::tempdir().unwrap();
        let source = FakeSource::default()
            .repo("acme/tools", "main")
            .file("acme/tools", "main", ".diem.json", r#"{"files":["gone.js"]}"#)
            .file("acme/tools", "main", "diem.js", "1");
        let parsed = extract(["acme/tools"]);
        let err = prepare_quiet(&source, &parsed, tmp.path())
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Cannot download file https://raw.test/acme/tools/main/gone.js"
        );
    }

    #[tokio::test]
    async fn escaping_paths_are_rejected_before_fetching() {
        let tmp = tempfile::tempdir().unwrap();
        let source = FakeSource::default()
            .repo("acme/tools", "main")
            .file("acme/tools", "main", ".diem.json", r#"{"files":["ok.js","../x.js"]}"#)
            .file("acme/tools", "main", "ok.js", "1")
            .file("acme/tools", "main", "../x.js", "2")
            .file("acme/tools", "main", "diem.js", "3");
        let parsed = extract(["acme/tools"]);
        let err = prepare_quiet(&source, &parsed, tmp.path())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("outside the scratch directory"));

        let fetched = source.fetched();
        assert_eq!(fetched, vec![".diem.json", "package.json"]);
        assert!(!tmp.path().join("x.js").exists());
    }

    #[tokio::test]
    async fn options_fragment_takes_priority_and_duplicates_fetch_once() {
        let tmp = tempfile::tempdir().unwrap();
        let source = sample_source().file("acme/tools", "main", "alt.js", "2");
        let parsed = extract([
            "acme/tools",
            "--entrypoint",
            "alt.js",
            "--files",
            "lib/util.js",
        ]);
        let prepared = prepare_quiet(&source, &parsed, tmp.path())
            .await
            .unwrap();
        assert_eq!(prepared.config.entrypoint, "alt.js");
        assert_eq!(
            prepared.config.files,
            vec!["lib/util.js", "lib/util.js", "package.json"]
        );
        let fetched = source.fetched();
        assert_eq!(fetched.iter().filter(|p| *p == "lib/util.js").count(), 1);
        assert!(!fetched.contains(&"cli.js".to_string()));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn run_launches_entrypoint() {
        let tmp = tempfile::tempdir().unwrap();
        let source = sample_source();
        let parsed = extract(["acme/tools", "--", "extra"]);
        let mut status = StatusLine::new(Vec::new(), StyleOptions::plain(), false);

        run(&source, &parsed, &settings(tmp.path(), "true"), &mut status)
            .await
            .unwrap();

        let shown = String::from_utf8(status.into_inner()).unwrap();
        assert!(shown.contains("Installing dependencies ..."));
        assert!(shown.contains("> true cli.js extra"));
        assert!(shown.ends_with("Diem complete\n"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_entrypoint_surfaces_exit_code() {
        let tmp = tempfile::tempdir().unwrap();
        let source = sample_source();
        let parsed = extract(["acme/tools"]);
        let err = run(&source, &parsed, &settings(tmp.path(), "false"), &mut quiet_status())
            .await
            .unwrap_err();
        let failed = err.downcast_ref::<ChildFailed>().expect("child failure");
        assert_eq!(failed.exit_code(), 1);
    }

    #[test]
    fn settings_precedence() {
        let args = RunArgs {
            workdir: Some("/srv/diem".into()),
            runner: None,
            installer: Some("  ".into()),
            api_url: None,
            raw_url: Some("http://mirror.local/raw".into()),
            tokens: vec![],
        };
        let env = |key: &str| match key {
            "DIEM_RUNNER" => Some("deno run".to_string()),
            "DIEM_WORKDIR" => Some("/ignored".to_string()),
            "GITHUB_TOKEN" => Some("secret".to_string()),
            _ => None,
        };
        let s = RunSettings::resolve_with(&args, env).unwrap();
        assert_eq!(s.workdir, PathBuf::from("/srv/diem"));
        assert_eq!(s.runner.to_string(), "deno run");
        assert_eq!(s.installer.to_string(), DEFAULT_INSTALLER);
        assert_eq!(s.api_url.as_str(), "https://api.github.com/");
        assert_eq!(s.raw_url.as_str(), "http://mirror.local/raw");
        assert_eq!(s.token.as_deref(), Some("secret"));
    }

    #[test]
    fn settings_reject_bad_url() {
        let args = RunArgs {
            workdir: None,
            runner: None,
            installer: None,
            api_url: Some("not a url".into()),
            raw_url: None,
            tokens: vec![],
        };
        assert!(RunSettings::resolve_with(&args, |_| None).is_err());
    }
}
