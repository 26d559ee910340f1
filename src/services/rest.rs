use super::ServiceEnv;
use crate::error::Result;
use crate::healthcheck::{HttpCheck, ReadinessCheck};
use crate::services::secrets::JWT_EXP_SECS;
use crate::supervisor::ServiceDescriptor;

/// Connection string the REST layer uses to reach the datastore by alias.
fn db_uri(env: &ServiceEnv<'_>) -> String {
    let ds = &env.config.datastore;
    format!(
        "postgres://authenticator:{}@{}:{}/{}",
        env.secrets.db_password, ds.alias, ds.port, ds.database
    )
}

pub(super) fn descriptor(env: &ServiceEnv<'_>) -> ServiceDescriptor {
    let rest = &env.config.rest;
    let jwt_secret = env.secrets.jwt_secret.as_str();

    ServiceDescriptor::new(&rest.image, &rest.container_name, &rest.alias)
        .project(&env.config.project)
        .env("PGRST_DB_URI", db_uri(env))
        .env("PGRST_DB_SCHEMAS", "public")
        .env("PGRST_DB_ANON_ROLE", "anon")
        .env("PGRST_JWT_SECRET", jwt_secret)
        .env("PGRST_DB_USE_LEGACY_GUCS", "false")
        .env("PGRST_APP_SETTINGS_JWT_SECRET", jwt_secret)
        .env("PGRST_APP_SETTINGS_JWT_EXP", JWT_EXP_SECS.to_string())
        .env("PGRST_SERVER_PORT", rest.api_port.to_string())
        .env("PGRST_ADMIN_SERVER_PORT", rest.admin_port.to_string())
        .port(rest.api_port)
        .port(rest.admin_port)
        .command(["postgrest"])
}

pub(super) fn readiness_check(env: &ServiceEnv<'_>) -> Result<Box<dyn ReadinessCheck>> {
    Ok(Box::new(HttpCheck::new(
        env.config.rest.ready_url(),
        env.config.readiness.probe_timeout,
    )?))
}
