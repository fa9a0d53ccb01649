//! Discovery client - reads the alive set from a registry

use tracing::debug;

use crate::error::RegistryError;
use crate::registry::{decode_header, SERVERS_HEADER};

/// Fetch the alive addresses from the registry at `registry_url`.
///
/// The list comes back in the registry's order (ascending). A missing or
/// empty header means no instance is alive.
pub async fn fetch_alive(
    client: &reqwest::Client,
    registry_url: &str,
) -> Result<Vec<String>, RegistryError> {
    let response = client.get(registry_url).send().await?;

    if !response.status().is_success() {
        return Err(RegistryError::Transport(format!(
            "registry answered HTTP {}",
            response.status()
        )));
    }

    let servers = response
        .headers()
        .get(SERVERS_HEADER)
        .map(|value| decode_header(value.as_bytes()))
        .unwrap_or_default();

    let alive = parse_servers(&servers);
    debug!(count = alive.len(), registry = registry_url, "Fetched alive services");
    Ok(alive)
}

/// Split a comma-joined server list, dropping empty segments
pub fn parse_servers(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_empty_header() {
        assert!(parse_servers("").is_empty());
    }

    #[test]
    fn test_parse_server_list() {
        assert_eq!(
            parse_servers("a:1,b:2, c:3,"),
            vec!["a:1".to_string(), "b:2".to_string(), "c:3".to_string()]
        );
    }
}
