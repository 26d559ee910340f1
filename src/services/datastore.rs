use super::files::{materialize, Refresh};
use super::ServiceEnv;
use crate::docker::{ContainerRuntime, Mount, LOOPBACK};
use crate::error::Result;
use crate::healthcheck::{ExecCheck, ReadinessCheck};
use crate::migration::{ledger::quote_literal, MigrationEngine, PsqlTarget};
use crate::services::secrets::JWT_EXP_SECS;
use crate::supervisor::{ContainerSupervisor, ServiceDescriptor};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const ROLES_SQL: &str = include_str!("../../assets/roles.sql");
const JWT_SQL: &str = include_str!("../../assets/jwt.sql");

const INIT_DIR: &str = "/docker-entrypoint-initdb.d/init-scripts";
const DATA_DIR: &str = "/var/lib/postgresql/data";

/// Roles whose password is reset to the per-run secret after startup.
pub const PATCHED_ROLES: &[&str] = &[
    "anon",
    "authenticated",
    "authenticator",
    "dashboard_user",
    "pgbouncer",
    "postgres",
    "service_role",
    "supabase_admin",
    "supabase_auth_admin",
    "supabase_read_only_user",
    "supabase_replication_admin",
    "supabase_storage_admin",
];

struct InitFile {
    name: &'static str,
    body: &'static str,
    target: &'static str,
}

const INIT_FILES: &[InitFile] = &[
    InitFile {
        name: "roles.sql",
        body: ROLES_SQL,
        target: "99-roles.sql",
    },
    InitFile {
        name: "jwt.sql",
        body: JWT_SQL,
        target: "99-jwt.sql",
    },
];

fn init_path(env: &ServiceEnv<'_>, name: &str) -> PathBuf {
    env.config.data_dir().join("init").join(name)
}

fn data_path(env: &ServiceEnv<'_>) -> PathBuf {
    env.config.data_dir().join("db").join("data")
}

/// Write the read-only init scripts and make sure the data directory exists.
pub(super) fn prepare(env: &ServiceEnv<'_>) -> Result<()> {
    for file in INIT_FILES {
        materialize(
            &init_path(env, file.name),
            file.body.as_bytes(),
            0o444,
            Refresh::IfMissing,
        )?;
    }
    std::fs::create_dir_all(data_path(env))?;
    Ok(())
}

pub(super) fn descriptor(env: &ServiceEnv<'_>) -> ServiceDescriptor {
    let ds = &env.config.datastore;
    let port = ds.port.to_string();
    let password = env.secrets.db_password.as_str();

    let mut desc = ServiceDescriptor::new(&ds.image, &ds.container_name, &ds.alias)
        .project(&env.config.project)
        .env("POSTGRES_HOST", "/var/run/postgresql")
        .env("PGPORT", &port)
        .env("POSTGRES_PORT", &port)
        .env("PGPASSWORD", password)
        .env("POSTGRES_PASSWORD", password)
        .env("PGDATABASE", &ds.database)
        .env("POSTGRES_DB", &ds.database)
        .env("JWT_SECRET", &env.secrets.jwt_secret)
        .env("JWT_EXP", JWT_EXP_SECS.to_string())
        .mount(Mount::volume(
            format!("{}-db-config", env.config.project),
            "/etc/postgresql-custom",
        ))
        .mount(Mount::bind(
            data_path(env).to_string_lossy(),
            DATA_DIR,
            false,
        ))
        .port(ds.port)
        .command([
            "postgres",
            "-c",
            "config_file=/etc/postgresql/postgresql.conf",
            "-c",
            "log_min_messages=fatal",
            "-c",
            "wal_level=minimal",
            "-c",
            "max_wal_senders=0",
        ]);

    for file in INIT_FILES {
        desc = desc.mount(Mount::bind(
            init_path(env, file.name).to_string_lossy(),
            format!("{}/{}", INIT_DIR, file.target),
            true,
        ));
    }
    desc
}

pub(super) fn readiness_check(
    env: &ServiceEnv<'_>,
    runtime: Arc<dyn ContainerRuntime>,
    container_id: &str,
) -> Box<dyn ReadinessCheck> {
    Box::new(ExecCheck::new(
        runtime,
        container_id,
        ["pg_isready", "-h", LOOPBACK, "-U", "postgres"]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        "accepting connections",
        env.config.readiness.probe_timeout,
    ))
}

pub fn psql_target(env: &ServiceEnv<'_>) -> PsqlTarget {
    PsqlTarget {
        user: env.config.datastore.admin_user.clone(),
        database: env.config.datastore.database.clone(),
    }
}

/// `ALTER USER` for every built-in role, setting the per-run password.
pub fn credential_patch_sql(password: &str) -> String {
    let quoted = quote_literal(password);
    PATCHED_ROLES
        .iter()
        .map(|role| format!("ALTER USER {} WITH PASSWORD {};\n", role, quoted))
        .collect()
}

/// Reset role passwords, then bring the schema up to date.
pub(super) async fn post_start(
    env: &ServiceEnv<'_>,
    supervisor: &ContainerSupervisor,
    migrations: &MigrationEngine,
    token: &CancellationToken,
    container_id: &str,
) -> Result<()> {
    tracing::debug!("Patching role passwords");
    let argv = psql_target(env).command(&credential_patch_sql(&env.secrets.db_password));
    let output = supervisor.exec(token, container_id, &argv).await?;
    tracing::debug!(
        "Role passwords patched: {}",
        output.trim().replace('\n', "\\n")
    );

    let report = migrations.apply(token, container_id).await?;
    tracing::debug!(
        "Migrations: {} applied, {} already applied",
        report.applied,
        report.already_applied
    );
    Ok(())
}
