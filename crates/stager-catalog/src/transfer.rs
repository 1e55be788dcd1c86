//! Data object transfers
//!
//! Provides the byte-moving operations of the catalog client:
//! - [`download_to_file`] - Streams a data object into a local file
//! - [`upload_from_file`] - Writes a local file into a data object in chunks
//!
//! ## Design Notes
//!
//! - Downloads land in a temporary sibling file that is renamed over the
//!   target once complete, so an interrupted download never leaves a
//!   truncated file under the final name.
//! - Uploads are sent as a sequence of `op=write` requests at increasing
//!   offsets; the first one truncates the object.

use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use reqwest::multipart::{Form, Part};
use reqwest::Method;
use serde::Deserialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, instrument};

use stager_core::ports::CatalogError;

use crate::client::{check_http_status, classify_status, CatalogClient};

/// Status-only body of a write response
#[derive(Debug, Deserialize)]
struct WriteResponse {
    irods_response: WriteStatus,
}

#[derive(Debug, Deserialize)]
struct WriteStatus {
    status_code: i64,
    #[serde(default)]
    status_message: Option<String>,
}

/// Temporary download target next to `target`
fn partial_path(target: &Path) -> PathBuf {
    let mut p = target.as_os_str().to_owned();
    p.push(".stager-part");
    PathBuf::from(p)
}

/// Streams the data object at `path` into the local file `target`
///
/// Returns the number of bytes written. The parent directory of `target`
/// must exist.
#[instrument(skip(client), fields(path = %path, target = %target.display()))]
pub async fn download_to_file(
    client: &CatalogClient,
    path: &str,
    target: &Path,
) -> Result<u64, CatalogError> {
    let response = client
        .send(|token| {
            client
                .request(Method::GET, "/data-objects", token)
                .query(&[("op", "read"), ("lpath", path)])
        })
        .await?;
    let response = check_http_status(response, path).await?;

    let tmp_path = partial_path(target);
    match write_partial(response, path, &tmp_path, target).await {
        Ok(written) => {
            debug!(bytes = written, "download complete");
            Ok(written)
        }
        Err(e) => {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            Err(e)
        }
    }
}

/// Streams the body into `tmp_path` and renames it over `target`
///
/// Leaves `tmp_path` behind on error; the caller removes it.
async fn write_partial(
    response: reqwest::Response,
    path: &str,
    tmp_path: &Path,
    target: &Path,
) -> Result<u64, CatalogError> {
    let mut file = tokio::fs::File::create(tmp_path).await?;
    let mut written: u64 = 0;
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk
            .map_err(|e| CatalogError::Transport(format!("download of {path} interrupted: {e}")))?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }

    file.flush().await?;
    file.sync_all().await?;
    drop(file);
    tokio::fs::rename(tmp_path, target).await?;
    Ok(written)
}

/// Writes the local file `source` into the data object at `path`
///
/// Returns the number of bytes sent. An empty file still produces one
/// (empty) write so the object exists afterwards.
#[instrument(skip(client), fields(source = %source.display(), path = %path))]
pub async fn upload_from_file(
    client: &CatalogClient,
    source: &Path,
    path: &str,
) -> Result<u64, CatalogError> {
    let chunk_size = client.options().chunk_size.max(1);
    let mut file = tokio::fs::File::open(source).await?;
    let mut offset: u64 = 0;
    let mut buf = vec![0u8; chunk_size];

    loop {
        let filled = read_full(&mut file, &mut buf).await?;
        if filled == 0 && offset > 0 {
            break;
        }

        write_chunk(client, path, offset, &buf[..filled]).await?;
        offset += filled as u64;

        if filled < chunk_size {
            break;
        }
    }

    debug!(bytes = offset, "upload complete");
    Ok(offset)
}

/// Reads until `buf` is full or the file ends
async fn read_full(file: &mut tokio::fs::File, buf: &mut [u8]) -> Result<usize, CatalogError> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = file.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

async fn write_chunk(
    client: &CatalogClient,
    path: &str,
    offset: u64,
    data: &[u8],
) -> Result<(), CatalogError> {
    let truncate = if offset == 0 { "1" } else { "0" };
    let offset_str = offset.to_string();

    let response = client
        .send(|token| {
            let form = Form::new()
                .text("op", "write")
                .text("lpath", path.to_string())
                .text("offset", offset_str.clone())
                .text("truncate", truncate)
                .part(
                    "bytes",
                    Part::bytes(data.to_vec()).file_name("bytes"),
                );
            client
                .request(Method::POST, "/data-objects", token)
                .multipart(form)
        })
        .await?;
    let response = check_http_status(response, path).await?;

    let body: WriteResponse = response
        .json()
        .await
        .map_err(|e| CatalogError::Transport(format!("Invalid write response for {path}: {e}")))?;
    match body.irods_response.status_code {
        0 => {
            debug!(offset, bytes = data.len(), "chunk written");
            Ok(())
        }
        code => Err(classify_status(code, body.irods_response.status_message, path)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_path_is_sibling() {
        let p = partial_path(Path::new("/data/out/file.bin"));
        assert_eq!(p, PathBuf::from("/data/out/file.bin.stager-part"));
    }

    #[tokio::test]
    async fn test_read_full_handles_short_files() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("f");
        tokio::fs::write(&path, b"abcdef").await.unwrap();

        let mut file = tokio::fs::File::open(&path).await.unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(read_full(&mut file, &mut buf).await.unwrap(), 4);
        assert_eq!(&buf, b"abcd");
        assert_eq!(read_full(&mut file, &mut buf).await.unwrap(), 2);
        assert_eq!(read_full(&mut file, &mut buf).await.unwrap(), 0);
    }
}
