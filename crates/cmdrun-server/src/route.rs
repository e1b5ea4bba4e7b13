//! Mapping upgrade request paths to command ids.

use cmdrun_common::CommandId;

/// Where an upgrade request under the prefix points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandRoute {
    Command(CommandId),
    /// Under the prefix, but the last segment is not a non-negative integer.
    BadId(String),
}

/// Match `<prefix>/<id>`. `None` means the path is not ours (HTTP 404).
pub fn parse_route(prefix: &str, path: &str) -> Option<CommandRoute> {
    let path = path.split('?').next().unwrap_or(path);
    let prefix = prefix.trim_end_matches('/');
    let rest = path.strip_prefix(prefix)?.strip_prefix('/')?;
    let segment = rest.trim_end_matches('/');

    if segment.is_empty() || segment.contains('/') {
        return None;
    }
    Some(match segment.parse::<CommandId>() {
        Ok(id) => CommandRoute::Command(id),
        Err(_) => CommandRoute::BadId(segment.to_string()),
    })
}
