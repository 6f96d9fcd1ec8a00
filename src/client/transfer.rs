//! ## File transfer endpoint
//!
//! The data plane: one TCP connection per download, opened by the
//! requester directly against the owner. A single request frame
//! `"<filename>,<requester>"` goes up, raw file bytes come back in
//! fixed-size chunks, and the connection close is the only end-of-file
//! marker. The control plane is never told about transfer failures;
//! the view stays intact because the owner may simply be busy.

use std::path::Path;

use anyhow::{Context, bail};
use codec::Contact;
use tokio::{
    fs::File,
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
};

use super::SharedDir;

/// Files move in chunks of this size; the request frame must also fit
/// in one.
pub const CHUNK_SIZE: usize = 4096;

/// The owner side: accept connections one at a time and stream the
/// requested file back.
///
/// Failures here are the requester's problem; this side logs them and
/// goes back to accepting.
pub async fn serve(listener: TcpListener, dir: SharedDir) {
    while let Ok((stream, addr)) = listener.accept().await {
        log::info!("tcp socket accept: addr={}", addr);
        if let Err(e) = handle(stream, &dir).await {
            log::warn!("file transfer failed: addr={}, err={}", addr, e);
        }
    }
}

async fn handle(mut stream: TcpStream, dir: &SharedDir) -> anyhow::Result<()> {
    let mut buf = vec![0u8; CHUNK_SIZE];
    let size = stream.read(&mut buf).await?;
    let frame = std::str::from_utf8(&buf[..size])?;
    let (filename, requester) = frame
        .split_once(',')
        .context("malformed transfer request frame")?;
    let filename = filename.to_string();
    let requester = requester.to_string();

    log::info!("transfer request: file={}, peer={}", filename, requester);

    let Some(dir) = dir.read().clone() else {
        bail!("no offer directory configured");
    };

    let mut file = File::open(dir.join(&filename)).await?;
    loop {
        let size = file.read(&mut buf).await?;
        if size == 0 {
            break;
        }

        stream.write_all(&buf[..size]).await?;
    }

    stream.shutdown().await?;
    log::info!("transfer complete: file={}, peer={}", filename, requester);
    Ok(())
}

/// The requester side: pull `file` from `owner` and write it to `dest`.
///
/// The command loop passes the bare filename as `dest`, landing the
/// download in the working directory and overwriting any previous copy.
pub async fn fetch(
    contact: Contact,
    file: &str,
    owner: &str,
    requester: &str,
    dest: &Path,
) -> anyhow::Result<()> {
    let mut stream = TcpStream::connect((contact.ip(), contact.tcp_port())).await?;
    println!("< Connection with client {} established. >", owner);

    stream
        .write_all(format!("{},{}", file, requester).as_bytes())
        .await?;
    println!("< Downloading {}... >", file);

    let mut out = File::create(dest).await?;
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let size = stream.read(&mut buf).await?;
        if size == 0 {
            break;
        }

        out.write_all(&buf[..size]).await?;
    }

    out.flush().await?;
    println!("< {} downloaded successfully! >", file);
    println!("< Connection with client {} closed. >", owner);
    Ok(())
}
