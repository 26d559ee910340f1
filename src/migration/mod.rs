//! Idempotent, transactional schema migrations tracked in an in-database ledger.

pub mod ledger;
mod script;

pub use script::{Migration, MigrationSet};

use crate::docker::{ExecOutput, LOOPBACK};
use crate::error::{Error, Result};
use crate::supervisor::ContainerSupervisor;
use tokio_util::sync::CancellationToken;

/// Outcome of one [`MigrationEngine::apply`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MigrationReport {
    pub applied: usize,
    pub already_applied: usize,
}

/// How to reach the database from inside its container.
#[derive(Debug, Clone)]
pub struct PsqlTarget {
    pub user: String,
    pub database: String,
}

impl PsqlTarget {
    /// `psql` argv that skips any psqlrc, stops at the first error and runs
    /// `sql` as one command.
    pub fn command(&self, sql: &str) -> Vec<String> {
        self.build(&[], sql)
    }

    /// Like [`command`](Self::command) but quiet, printing bare values only.
    pub fn query(&self, sql: &str) -> Vec<String> {
        self.build(&["-q", "-t", "-A"], sql)
    }

    fn build(&self, extra: &[&str], sql: &str) -> Vec<String> {
        let mut argv: Vec<String> = [
            "psql",
            "-h",
            LOOPBACK,
            "-U",
            self.user.as_str(),
            "-d",
            self.database.as_str(),
            "-X",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        argv.extend(extra.iter().map(|s| s.to_string()));
        argv.extend(
            ["-v", "ON_ERROR_STOP=1", "-c", sql]
                .iter()
                .map(|s| s.to_string()),
        );
        argv
    }
}

/// Applies the pending part of a [`MigrationSet`] inside the datastore container.
pub struct MigrationEngine {
    supervisor: ContainerSupervisor,
    target: PsqlTarget,
    scripts: MigrationSet,
}

impl MigrationEngine {
    pub fn new(supervisor: ContainerSupervisor, target: PsqlTarget, scripts: MigrationSet) -> Self {
        Self {
            supervisor,
            target,
            scripts,
        }
    }

    pub fn scripts(&self) -> &MigrationSet {
        &self.scripts
    }

    /// Bring the ledger up to date with the script set.
    ///
    /// All pending scripts run in a single transaction together with their
    /// ledger inserts, so either every pending version is recorded or none is.
    pub async fn apply(
        &self,
        token: &CancellationToken,
        container_id: &str,
    ) -> Result<MigrationReport> {
        let out = self
            .run(token, container_id, self.target.command(&ledger::bootstrap_sql()))
            .await?;
        check(out, "ledger bootstrap failed")?;

        let out = self
            .run(token, container_id, self.target.query(&ledger::select_sql()))
            .await?;
        let rows = ledger::parse_rows(&check(out, "reading the ledger failed")?)?;
        let applied = ledger::applied_versions(&rows);

        let pending = self.scripts.pending(&applied);
        let already_applied = self.scripts.len() - pending.len();
        if pending.is_empty() {
            tracing::info!("Schema up to date ({} migration(s))", already_applied);
            return Ok(MigrationReport {
                applied: 0,
                already_applied,
            });
        }

        for m in &pending {
            tracing::info!("Applying migration {}: {}", m.version, m.name);
        }
        let out = self
            .run(token, container_id, self.target.command(&ledger::batch_sql(&pending)))
            .await?;
        check(out, "migration batch rolled back")?;

        tracing::info!(
            "Applied {} migration(s), {} already applied",
            pending.len(),
            already_applied
        );
        Ok(MigrationReport {
            applied: pending.len(),
            already_applied,
        })
    }

    async fn run(
        &self,
        token: &CancellationToken,
        container_id: &str,
        argv: Vec<String>,
    ) -> Result<ExecOutput> {
        self.supervisor
            .exec_output(token, container_id, &argv)
            .await
    }
}

/// Non-zero exit becomes [`Error::MigrationApply`] carrying the raw output.
fn check(out: ExecOutput, what: &str) -> Result<String> {
    if out.success() {
        Ok(out.output)
    } else {
        Err(Error::MigrationApply {
            reason: format!("{} (exit code {})", what, out.exit_code),
            output: out.output,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_psql_argv() {
        let target = PsqlTarget {
            user: "supabase_admin".to_string(),
            database: "postgres".to_string(),
        };
        assert_eq!(
            target.command("SELECT 1"),
            vec![
                "psql",
                "-h",
                "127.0.0.1",
                "-U",
                "supabase_admin",
                "-d",
                "postgres",
                "-X",
                "-v",
                "ON_ERROR_STOP=1",
                "-c",
                "SELECT 1"
            ]
        );
        let q = target.query("SELECT 1");
        assert_eq!(&q[7..11], &["-X", "-q", "-t", "-A"]);
    }

    #[test]
    fn test_check_keeps_output() {
        let err = check(
            ExecOutput {
                output: "ERROR:  syntax error at or near \"CREAT\"".to_string(),
                exit_code: 3,
            },
            "migration batch rolled back",
        )
        .unwrap_err();
        match err {
            Error::MigrationApply { reason, output } => {
                assert!(reason.contains("exit code 3"));
                assert!(output.contains("CREAT"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
