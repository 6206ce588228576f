//! Package import-path conventions.
//!
//! A package id is an import path such as `github.com/user/repo/sub`. Its
//! origin host, owning author and project are derived from host-specific
//! path-segment rules.

/// Forges whose second path segment names the owning account.
const ACCOUNT_FORGES: &[&str] = &["github.com", "bitbucket.org"];

/// Forges with an `owner/project` layout.
const PROJECT_FORGES: &[&str] = &["github.com", "code.google.com", "bitbucket.org", "labix.org"];

/// Check that a path names a fetchable remote package.
///
/// The first segment must look like a host (contains a dot), no segment may be
/// empty or hidden (`.x`, `_x`), `testdata` trees are excluded and only
/// URL-safe characters are allowed. Account forges need at least
/// `host/owner/repo`.
pub fn is_valid_remote_path(path: &str) -> bool {
    let parts: Vec<&str> = path.split('/').collect();
    if parts.len() < 2 {
        return false;
    }

    let host = parts[0];
    if !host.contains('.') || host.starts_with('.') || host.ends_with('.') {
        return false;
    }
    if !host
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == ':')
    {
        return false;
    }

    for part in &parts[1..] {
        if part.is_empty() || part.starts_with('.') || part.starts_with('_') || *part == "testdata"
        {
            return false;
        }
        if !part
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | '~' | '+'))
        {
            return false;
        }
    }

    if ACCOUNT_FORGES.contains(&host) && parts.len() < 3 {
        return false;
    }

    true
}

/// Origin host of a package path, lowercased.
pub fn host_of_package(path: &str) -> String {
    path.split('/').next().unwrap_or_default().to_lowercase()
}

/// Author of a package, derived from its import path.
///
/// Falls back to the host when no owner can be derived.
pub fn author_of_package(path: &str) -> String {
    let parts: Vec<&str> = path.split('/').collect();

    match parts[0] {
        "github.com" | "bitbucket.org" if parts.len() > 1 => return parts[1].to_string(),
        "llamaslayers.net" => return "Nightgunner5".to_string(),
        "launchpad.net" if parts.len() > 1 => {
            if let Some(user) = parts[1].strip_prefix('~') {
                return user.to_string();
            }
        }
        _ => {}
    }
    parts[0].to_string()
}

/// Project of a package, derived from its import path.
///
/// Falls back to the whole path for unknown hosts.
pub fn project_of_package(path: &str) -> String {
    let parts: Vec<&str> = path.split('/').collect();

    match parts[0] {
        "llamaslayers.net" | "bazil.org" if parts.len() > 1 => parts[1].to_string(),
        host if PROJECT_FORGES.contains(&host) && parts.len() > 2 => parts[2].to_string(),
        "golanger.com" => "golangers".to_string(),
        "launchpad.net" if parts.len() > 2 && parts[1].starts_with('~') => parts[2].to_string(),
        "launchpad.net" if parts.len() > 1 => parts[1].to_string(),
        "cgl.tideland.biz" => "tcgl".to_string(),
        _ => path.to_string(),
    }
}

/// The author identity to discover from a package path, if its host has one.
///
/// Returns `(site, username)`.
pub fn author_identity(path: &str) -> Option<(String, String)> {
    let mut parts = path.split('/');
    let host = parts.next()?;
    if !ACCOUNT_FORGES.contains(&host) {
        return None;
    }
    let user = parts.next().filter(|u| !u.is_empty())?;
    Some((host.to_string(), user.to_string()))
}

/// Id of an author entry: `site:username`.
pub fn person_id(site: &str, username: &str) -> String {
    format!("{}:{}", site, username)
}

/// Split an author id into `(site, username)`.
pub fn parse_person_id(id: &str) -> Option<(&str, &str)> {
    let (site, username) = id.split_once(':')?;
    (!site.is_empty() && !username.is_empty()).then_some((site, username))
}
