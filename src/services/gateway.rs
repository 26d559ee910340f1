use super::files::{materialize, Refresh};
use super::ServiceEnv;
use crate::docker::Mount;
use crate::error::{Error, Result};
use crate::supervisor::ServiceDescriptor;
use regex::Regex;
use std::path::PathBuf;

const KONG_TEMPLATE: &str = include_str!("../../assets/kong.yml");
const KONG_CONFIG_TARGET: &str = "/home/kong/kong.yml";

fn config_path(env: &ServiceEnv<'_>) -> PathBuf {
    env.config.data_dir().join("gateway").join("kong.yml")
}

/// Expand `${NAME}` placeholders. A name `lookup` doesn't know is an error.
pub fn render_template(
    template: &str,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<String> {
    let re = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}")
        .map_err(|e| Error::Config(format!("template pattern: {}", e)))?;

    let mut out = String::with_capacity(template.len());
    let mut last = 0;
    for cap in re.captures_iter(template) {
        let (Some(whole), Some(name)) = (cap.get(0), cap.get(1)) else {
            continue;
        };
        let value = lookup(name.as_str()).ok_or_else(|| {
            Error::Config(format!(
                "gateway template references unknown variable '{}'",
                name.as_str()
            ))
        })?;
        out.push_str(&template[last..whole.start()]);
        out.push_str(&value);
        last = whole.end();
    }
    out.push_str(&template[last..]);
    Ok(out)
}

fn render(env: &ServiceEnv<'_>) -> Result<String> {
    let rest = &env.config.rest;
    render_template(KONG_TEMPLATE, |name| match name {
        "SUPABASE_ANON_KEY" => Some(env.secrets.anon_key.clone()),
        "SUPABASE_SERVICE_KEY" => Some(env.secrets.service_key.clone()),
        "REST_UPSTREAM" => Some(format!("http://{}:{}/", rest.alias, rest.api_port)),
        _ => None,
    })
}

/// Render the declarative config with this run's keys.
pub(super) fn prepare(env: &ServiceEnv<'_>) -> Result<()> {
    let rendered = render(env)?;
    materialize(&config_path(env), rendered.as_bytes(), 0o600, Refresh::Always)?;
    Ok(())
}

pub(super) fn descriptor(env: &ServiceEnv<'_>) -> ServiceDescriptor {
    let gw = &env.config.gateway;

    ServiceDescriptor::new(&gw.image, &gw.container_name, &gw.alias)
        .project(&env.config.project)
        .env("KONG_DATABASE", "off")
        .env("KONG_DECLARATIVE_CONFIG", KONG_CONFIG_TARGET)
        .env("KONG_DNS_ORDER", "LAST,A,CNAME")
        .env(
            "KONG_PLUGINS",
            "request-transformer,cors,key-auth,acl,basic-auth",
        )
        .env("KONG_NGINX_PROXY_PROXY_BUFFER_SIZE", "160k")
        .env("KONG_NGINX_PROXY_PROXY_BUFFERS", "64 160k")
        .env("KONG_PROXY_LISTEN", format!("0.0.0.0:{}", gw.port))
        .mount(Mount::bind(
            config_path(env).to_string_lossy(),
            KONG_CONFIG_TARGET,
            true,
        ))
        .port(gw.port)
        .command(["/docker-entrypoint.sh", "kong", "docker-start"])
}
