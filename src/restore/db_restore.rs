// pgrestore-sync/src/restore/db_restore.rs
use anyhow::{Context, anyhow};
use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{error, info};

use crate::config::DatabaseConfig;
use crate::errors::{RestoreError, Result};
use crate::utils::find_psql_executable;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepLabel {
    PreProcessing,
    Restore,
    PostProcessing,
}

impl fmt::Display for StepLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StepLabel::PreProcessing => "pre-processing",
            StepLabel::Restore => "restore",
            StepLabel::PostProcessing => "post-processing",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlStep {
    pub label: StepLabel,
    pub script: PathBuf,
}

/// Builds the fixed pre -> restore -> post sequence, omitting absent steps.
pub fn plan_steps(pre: Option<&Path>, main: &Path, post: Option<&Path>) -> Vec<SqlStep> {
    let step = |label, script: &Path| SqlStep {
        label,
        script: script.to_path_buf(),
    };
    pre.map(|p| step(StepLabel::PreProcessing, p))
        .into_iter()
        .chain(std::iter::once(step(StepLabel::Restore, main)))
        .chain(post.map(|p| step(StepLabel::PostProcessing, p)))
        .collect()
}

/// Exit status and captured stderr of one script run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptOutput {
    pub exit_code: Option<i32>,
    pub stderr: String,
}

impl ScriptOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Executes one SQL file against the target database.
#[async_trait]
pub trait SqlRunner: Send + Sync {
    /// `Err` means the tool could not be run at all.
    async fn run_script(&self, database: &DatabaseConfig, script: &Path) -> anyhow::Result<ScriptOutput>;
}

/// Runs scripts with the `psql` command-line tool.
#[derive(Debug, Default, Clone)]
pub struct PsqlRunner;

/// Builds the psql invocation. The password goes through the child's
/// environment only, never argv.
pub fn psql_command(psql: &Path, database: &DatabaseConfig, script: &Path) -> Command {
    let mut cmd = Command::new(psql);
    cmd.arg("-X") // Do not read psqlrc
        .arg("-q")
        .arg("-v")
        .arg("ON_ERROR_STOP=1")
        .arg("-h")
        .arg(&database.host)
        .arg("-p")
        .arg(database.port.to_string())
        .arg("-U")
        .arg(&database.user)
        .arg("-d")
        .arg(&database.database)
        .arg("-f")
        .arg(script)
        .env("PGPASSWORD", &database.password)
        .kill_on_drop(true);
    cmd
}

#[async_trait]
impl SqlRunner for PsqlRunner {
    async fn run_script(&self, database: &DatabaseConfig, script: &Path) -> anyhow::Result<ScriptOutput> {
        let psql_path = find_psql_executable()?;

        let output = psql_command(&psql_path, database, script)
            .output()
            .await
            .with_context(|| format!("Failed to execute psql for file: {}", script.display()))?;

        Ok(ScriptOutput {
            exit_code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Runs the steps in order and stops at the first failure.
pub async fn execute_steps(
    runner: &dyn SqlRunner,
    database: &DatabaseConfig,
    steps: &[SqlStep],
) -> Result<()> {
    for step in steps {
        let step_error = |exit_code: Option<i32>, source: anyhow::Error| RestoreError::SqlExecution {
            step: step.label,
            script: step.script.clone(),
            exit_code,
            source,
        };

        if !step.script.is_file() {
            return Err(step_error(
                None,
                anyhow!("SQL file not found: {}", step.script.display()),
            ));
        }

        info!(
            step = %step.label,
            script = %step.script.display(),
            host = %database.host,
            database = %database.database,
            "Executing SQL script"
        );

        let output = runner
            .run_script(database, &step.script)
            .await
            .map_err(|e| step_error(None, e))?;

        if !output.success() {
            error!(
                step = %step.label,
                script = %step.script.display(),
                exit_code = ?output.exit_code,
                stderr = %output.stderr.trim(),
                "SQL script failed"
            );
            return Err(step_error(
                output.exit_code,
                anyhow!("psql stderr: {}", output.stderr.trim()),
            ));
        }

        info!(step = %step.label, script = %step.script.display(), "SQL script succeeded");
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records every invocation; fails the configured step.
    #[derive(Default)]
    pub(crate) struct RecordingRunner {
        pub calls: Mutex<Vec<PathBuf>>,
        pub fail_script: Option<PathBuf>,
    }

    #[async_trait]
    impl SqlRunner for RecordingRunner {
        async fn run_script(&self, _database: &DatabaseConfig, script: &Path) -> anyhow::Result<ScriptOutput> {
            self.calls.lock().unwrap().push(script.to_path_buf());
            let exit_code = if self.fail_script.as_deref() == Some(script) { 3 } else { 0 };
            Ok(ScriptOutput {
                exit_code: Some(exit_code),
                stderr: if exit_code == 0 { String::new() } else { "ERROR: boom".to_string() },
            })
        }
    }

    pub(crate) fn database() -> DatabaseConfig {
        DatabaseConfig {
            host: "localhost".to_string(),
            port: 5432,
            database: "app".to_string(),
            user: "postgres".to_string(),
            password: "secret".to_string(),
        }
    }

    struct Scripts {
        _dir: tempfile::TempDir,
        pre: PathBuf,
        main: PathBuf,
        post: PathBuf,
    }

    fn scripts() -> Scripts {
        let dir = tempfile::tempdir().unwrap();
        let path = |name: &str| {
            let p = dir.path().join(name);
            std::fs::write(&p, "SELECT 1;\n").unwrap();
            p
        };
        let (pre, main, post) = (path("pre.sql"), path("dump.sql"), path("post.sql"));
        Scripts {
            _dir: dir,
            pre,
            main,
            post,
        }
    }

    #[test]
    fn test_plan_orders_and_omits_steps() {
        let steps = plan_steps(Some(Path::new("pre.sql")), Path::new("dump.sql"), Some(Path::new("post.sql")));
        let labels: Vec<_> = steps.iter().map(|s| s.label).collect();
        assert_eq!(
            labels,
            vec![StepLabel::PreProcessing, StepLabel::Restore, StepLabel::PostProcessing]
        );

        let steps = plan_steps(None, Path::new("dump.sql"), None);
        assert_eq!(
            steps,
            vec![SqlStep {
                label: StepLabel::Restore,
                script: PathBuf::from("dump.sql")
            }]
        );
    }

    #[tokio::test]
    async fn test_runs_all_steps_in_order() -> anyhow::Result<()> {
        let s = scripts();
        let runner = RecordingRunner::default();
        let steps = plan_steps(Some(&s.pre), &s.main, Some(&s.post));

        execute_steps(&runner, &database(), &steps).await?;
        assert_eq!(*runner.calls.lock().unwrap(), vec![s.pre.clone(), s.main.clone(), s.post.clone()]);
        Ok(())
    }

    #[tokio::test]
    async fn test_pre_failure_stops_everything() {
        let s = scripts();
        let runner = RecordingRunner {
            fail_script: Some(s.pre.clone()),
            ..Default::default()
        };
        let steps = plan_steps(Some(&s.pre), &s.main, Some(&s.post));

        let err = execute_steps(&runner, &database(), &steps).await.unwrap_err();
        assert!(matches!(
            err,
            RestoreError::SqlExecution { step: StepLabel::PreProcessing, exit_code: Some(3), .. }
        ));
        assert_eq!(*runner.calls.lock().unwrap(), vec![s.pre.clone()]);
    }

    #[tokio::test]
    async fn test_main_failure_skips_post() {
        let s = scripts();
        let runner = RecordingRunner {
            fail_script: Some(s.main.clone()),
            ..Default::default()
        };
        let steps = plan_steps(Some(&s.pre), &s.main, Some(&s.post));

        let err = execute_steps(&runner, &database(), &steps).await.unwrap_err();
        assert!(matches!(err, RestoreError::SqlExecution { step: StepLabel::Restore, .. }));
        assert_eq!(*runner.calls.lock().unwrap(), vec![s.pre.clone(), s.main.clone()]);
    }

    #[tokio::test]
    async fn test_missing_script_fails_before_running() {
        let s = scripts();
        let runner = RecordingRunner::default();
        let missing = s.pre.with_file_name("nope.sql");
        let steps = plan_steps(Some(&missing), &s.main, None);

        let err = execute_steps(&runner, &database(), &steps).await.unwrap_err();
        assert!(matches!(
            err,
            RestoreError::SqlExecution { step: StepLabel::PreProcessing, exit_code: None, .. }
        ));
        assert!(runner.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_error_message_names_step_and_status() {
        let err = RestoreError::SqlExecution {
            step: StepLabel::PostProcessing,
            script: PathBuf::from("post.sql"),
            exit_code: Some(3),
            source: anyhow!("boom"),
        };
        assert_eq!(err.to_string(), "post-processing script post.sql failed (exit status: 3)");
    }

    #[test]
    fn test_psql_command_keeps_password_out_of_argv() {
        let db = database();
        let cmd = psql_command(Path::new("/usr/bin/psql"), &db, Path::new("/tmp/dump.sql"));
        let std_cmd = cmd.as_std();

        let args: Vec<String> = std_cmd
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert!(args.iter().all(|a| !a.contains(&db.password)));
        assert_eq!(
            args,
            vec![
                "-X", "-q", "-v", "ON_ERROR_STOP=1", "-h", "localhost", "-p", "5432", "-U",
                "postgres", "-d", "app", "-f", "/tmp/dump.sql",
            ]
        );

        let password = std_cmd
            .get_envs()
            .find(|(k, _)| k.to_str() == Some("PGPASSWORD"))
            .and_then(|(_, v)| v);
        assert_eq!(password, Some(std::ffi::OsStr::new("secret")));
        assert_eq!(std_cmd.get_program(), Path::new("/usr/bin/psql").as_os_str());
    }
}
