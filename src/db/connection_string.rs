//! Driver connection strings per database engine.
//!
//! Pure functions: nothing here touches the network.

use crate::error::{DbError, DbResult};
use crate::models::EngineKind;
use url::Url;

/// The configured pieces a connection string is built from.
#[derive(Clone, Copy)]
pub struct ConnectionParts<'a> {
    pub endpoint: &'a str,
    pub engine: EngineKind,
    pub address: &'a str,
    pub user_name: &'a str,
    pub user_password: &'a str,
    pub database_name: &'a str,
    pub connection_options: &'a str,
}

/// Build the driver connection string. The result contains credentials.
pub fn build_connection_string(parts: &ConnectionParts<'_>) -> DbResult<String> {
    let ConnectionParts {
        endpoint,
        address,
        user_name,
        user_password,
        database_name,
        connection_options,
        ..
    } = *parts;

    match parts.engine {
        EngineKind::PostgreSQL => Ok(format!(
            "postgresql://{user_name}:{user_password}@{address}/{database_name}?{connection_options}"
        )),
        EngineKind::MySQL => Ok(with_options(
            format!("mysql://{user_name}:{user_password}@{address}/{database_name}"),
            connection_options,
        )),
        EngineKind::SQLite => Ok(with_options(
            format!("sqlite:{database_name}"),
            connection_options,
        )),
        EngineKind::SQLServer => {
            let (host, port) = split_host_port(address)
                .ok_or_else(|| DbError::address_format(endpoint, address))?;
            Ok(format!(
                "server={host};port={port};user id={user_name};password={user_password};database={database_name};encrypt=disable"
            ))
        }
        EngineKind::Oracle => oracle_url(parts),
        EngineKind::Unknown => Err(DbError::unsupported_engine(endpoint, "unknown")),
    }
}

/// `engine://address/database_name`, safe to log.
pub fn non_sensitive_connection_string(engine: EngineKind, address: &str, database_name: &str) -> String {
    format!("{}://{}/{}", engine.scheme(), address, database_name)
}

fn with_options(base: String, options: &str) -> String {
    if options.is_empty() {
        base
    } else {
        format!("{base}?{options}")
    }
}

fn oracle_url(parts: &ConnectionParts<'_>) -> DbResult<String> {
    let (host, port) = split_host_port(parts.address)
        .ok_or_else(|| DbError::address_format(parts.endpoint, parts.address))?;
    let port: u16 = port
        .parse()
        .map_err(|_| DbError::port_format(parts.endpoint, port))?;

    let host = if host.contains(':') {
        format!("[{host}]")
    } else {
        host.to_string()
    };
    let mut url = Url::parse(&format!("oracle://{host}:{port}/"))
        .map_err(|_| DbError::address_format(parts.endpoint, parts.address))?;
    url.set_username(parts.user_name)
        .map_err(|_| DbError::address_format(parts.endpoint, parts.address))?;
    url.set_password(Some(parts.user_password))
        .map_err(|_| DbError::address_format(parts.endpoint, parts.address))?;
    url.query_pairs_mut().append_pair("SID", parts.database_name);
    Ok(url.to_string())
}

/// Split `host:port`, accepting a bracketed IPv6 host (`[::1]:1433`).
///
/// The port may be empty. An unbracketed host containing `:` is rejected.
pub fn split_host_port(address: &str) -> Option<(&str, &str)> {
    if let Some(rest) = address.strip_prefix('[') {
        let (host, after) = rest.split_once(']')?;
        let port = after.strip_prefix(':')?;
        return Some((host, port));
    }
    let (host, port) = address.rsplit_once(':')?;
    if host.contains(':') || host.contains('[') || host.contains(']') {
        return None;
    }
    Some((host, port))
}
