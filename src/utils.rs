// ABOUTME: Shared validation helpers used by the store adapters
// ABOUTME: Connection URL checks and SQL identifier safety

use anyhow::{bail, Result};

/// Validate a connection URL against the schemes a store accepts.
///
/// Only the shape is checked: a known scheme followed by a non-empty
/// authority. Reachability is left to `connect`.
///
/// # Examples
///
/// ```
/// # use datda::utils::validate_connection_url;
/// assert!(validate_connection_url("mysql://root@localhost/app", &["mysql://"]).is_ok());
/// assert!(validate_connection_url("", &["mysql://"]).is_err());
/// assert!(validate_connection_url("postgres://h/db", &["mysql://"]).is_err());
/// ```
pub fn validate_connection_url(url: &str, schemes: &[&str]) -> Result<()> {
    if url.trim().is_empty() {
        bail!("Connection string cannot be empty");
    }

    let Some(scheme) = schemes.iter().find(|s| url.starts_with(*s)) else {
        bail!(
            "Invalid connection string format.\n\
             Expected a URL starting with one of: {}\n\
             Got: {}",
            schemes.join(", "),
            redact_url(url)
        );
    };

    let rest = &url[scheme.len()..];
    if rest.is_empty() || rest.starts_with('/') {
        bail!(
            "Connection string missing host.\n\
             Expected format: {}user:password@host:port/database",
            scheme
        );
    }

    Ok(())
}

/// Hide the password portion of a URL before it reaches a log line.
///
/// # Examples
///
/// ```
/// # use datda::utils::redact_url;
/// assert_eq!(redact_url("mysql://root:secret@db/app"), "mysql://root:***@db/app");
/// assert_eq!(redact_url("mysql://db/app"), "mysql://db/app");
/// ```
pub fn redact_url(url: &str) -> String {
    let Some(scheme_end) = url.find("://") else {
        return url.to_string();
    };
    let authority_start = scheme_end + 3;
    let Some(at) = url[authority_start..].find('@') else {
        return url.to_string();
    };
    let credentials = &url[authority_start..authority_start + at];
    match credentials.find(':') {
        Some(colon) => format!(
            "{}{}:***{}",
            &url[..authority_start],
            &credentials[..colon],
            &url[authority_start + at..]
        ),
        None => url.to_string(),
    }
}

/// Validate a table name before it is interpolated into SQL.
///
/// Names must be 1-63 characters of ASCII letters, digits or underscores.
/// Callers still quote the name; this check keeps quoting trivially safe.
///
/// # Examples
///
/// ```
/// # use datda::utils::validate_table_name;
/// assert!(validate_table_name("users").is_ok());
/// assert!(validate_table_name("user_events_2024").is_ok());
/// assert!(validate_table_name("users; DROP TABLE users;").is_err());
/// assert!(validate_table_name("users'--").is_err());
/// ```
pub fn validate_table_name(table_name: &str) -> Result<()> {
    if table_name.is_empty() {
        bail!("Table name cannot be empty");
    }

    if table_name.len() > 63 {
        bail!(
            "Table name too long (max 63 characters): {}",
            sanitize_identifier(table_name)
        );
    }

    for ch in table_name.chars() {
        if !ch.is_ascii_alphanumeric() && ch != '_' {
            bail!(
                "Invalid table name '{}': contains invalid character '{}'. \
                Only alphanumeric characters and underscores are allowed.",
                sanitize_identifier(table_name),
                if ch.is_control() {
                    format!("\\x{:02x}", ch as u32)
                } else {
                    ch.to_string()
                }
            );
        }
    }

    Ok(())
}

/// Double-quote an identifier for SQLite and PostgreSQL statements.
pub fn quote_identifier(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

/// Sanitize an identifier for display
///
/// Removes control characters and limits length to prevent log injection.
/// Display only; never use the result in SQL.
///
/// # Examples
///
/// ```
/// # use datda::utils::sanitize_identifier;
/// assert_eq!(sanitize_identifier("normal_table"), "normal_table");
/// assert_eq!(sanitize_identifier("table\x00name"), "tablename");
/// ```
pub fn sanitize_identifier(identifier: &str) -> String {
    identifier
        .chars()
        .filter(|c| !c.is_control())
        .take(100)
        .collect()
}
