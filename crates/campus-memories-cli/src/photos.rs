use std::path::{Path, PathBuf};

use campus_memories_core::{
    encode_photo, KeyValueStorage, MapSurface, PhotoCompletion, PhotoError, PhotoPayload, Session,
};
use futures::stream::{FuturesUnordered, StreamExt};

/// Read every selected file concurrently and attach the results to the open
/// draft. Reads finish in any order; the draft keeps selection order. Returns
/// the files that could not be attached.
pub async fn attach_photos<S, M>(session: &mut Session<S, M>, paths: &[PathBuf]) -> Vec<PhotoError>
where
    S: KeyValueStorage,
    M: MapSurface,
{
    let tickets = session.reserve_photos(paths.len());
    let mut reads = tickets
        .into_iter()
        .zip(paths.iter().cloned())
        .map(|(ticket, path)| async move { (ticket, read_photo(&path).await) })
        .collect::<FuturesUnordered<_>>();

    let mut failures = Vec::new();
    while let Some((ticket, result)) = reads.next().await {
        if let PhotoCompletion::Failed(err) = session.complete_photo(ticket, result) {
            failures.push(err);
        }
    }
    failures
}

async fn read_photo(path: &Path) -> Result<PhotoPayload, PhotoError> {
    let bytes = tokio::fs::read(path).await.map_err(|err| PhotoError::Read {
        name: path.display().to_string(),
        message: err.to_string(),
    })?;
    encode_photo(path, &bytes)
}
