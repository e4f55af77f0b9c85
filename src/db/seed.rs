//! Registry bootstrap from a JSON seed file.

use super::{DbError, NewEndpoint, Store};

use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SeedError {
    #[error("failed to read seed file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid seed file: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Db(#[from] DbError),
}

/// Register every endpoint from `path` whose name is not taken yet.
///
/// The file holds a JSON array of endpoint definitions. Returns how many
/// endpoints were added.
pub fn seed_endpoints<P: AsRef<Path>>(store: &Store, path: P) -> Result<usize, SeedError> {
    let raw = std::fs::read_to_string(path)?;
    let endpoints: Vec<NewEndpoint> = serde_json::from_str(&raw)?;

    let mut added = 0;
    for endpoint in &endpoints {
        match store.add_endpoint_if_absent(endpoint)? {
            Some(stored) => {
                tracing::info!("Registered endpoint {} ({})", stored.name, stored.url);
                added += 1;
            }
            None => tracing::debug!("Endpoint {} already registered", endpoint.name),
        }
    }

    Ok(added)
}
