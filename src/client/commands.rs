//! ## Command interpreter
//!
//! Reads lines from standard input on the main task and dispatches the
//! interactive commands. Offer and deregistration exchanges go through
//! the retry coordinator against the ack queues the UDP listener feeds;
//! everything else is local or TCP work.

use std::{
    io,
    net::SocketAddr,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::bail;
use bytes::Bytes;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    net::UdpSocket,
    sync::mpsc::UnboundedReceiver,
    task::JoinHandle,
};

use crate::retry::{self, AckTransport};

use super::{SharedDir, SharedView, transfer};

const OFFER_RECEIVED: &str = ">>> [Offer Message received by Server.]";
const NO_ACK: &str = ">>> [No ACK from Server, please try again later.]";
const OFFLINE_BYE: &str = ">>> [You are now Offline. Bye.]";
const NO_FILES: &str = ">>> [No files available for download at the moment.]";
const INVALID_REQUEST: &str = "< Invalid Request >";
const OFFLINE_LOCKOUT: &str = ">>> [You are Offline. Only the list command is available.]";
const USAGE: &str =
    "usage: setdir <dir> | offer <file> ... | list | request <file> <owner> | dereg <name> | exit";

/// Everything the command loop owns or shares with the background
/// tasks.
pub struct Session {
    pub name: String,
    pub server: SocketAddr,
    pub socket: Arc<UdpSocket>,
    pub view: SharedView,
    pub dir: SharedDir,
    pub offer_queue: UnboundedReceiver<Bytes>,
    pub dereg_queue: UnboundedReceiver<Bytes>,
    pub tcp_task: JoinHandle<()>,
    pub deregistered: bool,
}

/// One parsed input line.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    SetDir(PathBuf),
    Offer(Vec<String>),
    List,
    Request { file: String, owner: String },
    Dereg(String),
    Exit,
}

impl Command {
    /// `command arg ...`, whitespace separated. `None` for a blank
    /// line, `Err` for anything that matches no command form.
    fn parse(line: &str) -> Result<Option<Self>, ()> {
        let mut words = line.split_whitespace();
        let Some(command) = words.next() else {
            return Ok(None);
        };

        let args: Vec<&str> = words.collect();
        let command = match (command, args.as_slice()) {
            ("setdir", [dir]) => Self::SetDir(PathBuf::from(dir)),
            ("offer", files) if !files.is_empty() => {
                Self::Offer(files.iter().map(|file| file.to_string()).collect())
            }
            ("list", []) => Self::List,
            ("request", [file, owner]) => Self::Request {
                file: file.to_string(),
                owner: owner.to_string(),
            },
            ("dereg", [name]) => Self::Dereg(name.to_string()),
            ("exit", []) => Self::Exit,
            _ => return Err(()),
        };

        Ok(Some(command))
    }
}

pub async fn run(mut session: Session) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    prompt();
    while let Some(line) = lines.next_line().await? {
        match Command::parse(&line) {
            Ok(Some(command)) => {
                if !session.dispatch(command).await? {
                    break;
                }
            }
            Ok(None) => {}
            Err(()) => println!("{}", USAGE),
        }

        prompt();
    }

    session.tcp_task.abort();
    Ok(())
}

fn prompt() {
    use std::io::Write;

    print!(">>> ");
    let _ = io::stdout().flush();
}

impl Session {
    /// Returns whether the loop should keep running.
    async fn dispatch(&mut self, command: Command) -> anyhow::Result<bool> {
        // After deregistration only the local table remains available.
        if self.deregistered && !matches!(command, Command::List | Command::Exit) {
            println!("{}", OFFLINE_LOCKOUT);
            return Ok(true);
        }

        match command {
            Command::SetDir(dir) => self.set_dir(dir).await,
            Command::Offer(files) => self.offer(files).await?,
            Command::List => self.list(),
            Command::Request { file, owner } => self.request(&file, &owner).await,
            Command::Dereg(name) => self.dereg(&name).await?,
            Command::Exit => return Ok(false),
        }

        Ok(true)
    }

    async fn set_dir(&self, dir: PathBuf) {
        match tokio::fs::metadata(&dir).await {
            Ok(meta) if meta.is_dir() => {
                println!(
                    ">>> [Successfully set {} as the directory for searching offered files.]",
                    dir.display(),
                );
                *self.dir.write() = Some(dir);
            }
            _ => println!(">>> [setdir failed: {} does not exist.]", dir.display()),
        }
    }

    async fn offer(&mut self, files: Vec<String>) -> anyhow::Result<()> {
        let Some(dir) = self.dir.read().clone() else {
            println!(">>> [Please set a directory first via the setdir command.]");
            return Ok(());
        };

        for file in &files {
            // Commas cannot survive the composite view key.
            if file.contains(',') {
                println!(">>> [Offer failed: filenames must not contain commas.]");
                return Ok(());
            }

            if !is_regular_file(dir.join(file)).await {
                println!(
                    ">>> [Offer failed: {} does not exist in the offer directory.]",
                    file,
                );
                return Ok(());
            }
        }

        let mut exchange = Exchange {
            socket: self.socket.as_ref(),
            server: self.server,
            payload: codec::encode_offer(&files),
            queue: &mut self.offer_queue,
        };

        exchange.drain_stale();
        match retry::send_and_await(&mut exchange, |ack| ack == codec::ACK_OFFER).await {
            Ok(()) => println!("{}", OFFER_RECEIVED),
            Err(retry::Error::Timeout) => println!("{}", NO_ACK),
            Err(retry::Error::Io(e)) => return Err(e.into()),
        }

        Ok(())
    }

    fn list(&self) {
        let view = self.view.read();
        if view.is_empty() {
            println!("{}", NO_FILES);
            return;
        }

        let rows: Vec<_> = view
            .iter()
            .map(|(key, contact)| {
                (
                    key.file.clone(),
                    key.owner.clone(),
                    contact.ip().to_string(),
                    contact.tcp_port(),
                )
            })
            .collect();
        drop(view);

        let file_width = column_width("FILENAME", rows.iter().map(|row| row.0.len()));
        let owner_width = column_width("OWNER", rows.iter().map(|row| row.1.len()));
        let ip_width = column_width("IP ADDRESS", rows.iter().map(|row| row.2.len()));

        println!(
            "{:<fw$}  {:<ow$}  {:<iw$}  TCP PORT",
            "FILENAME",
            "OWNER",
            "IP ADDRESS",
            fw = file_width,
            ow = owner_width,
            iw = ip_width,
        );

        for (file, owner, ip, tcp_port) in rows {
            println!(
                "{:<fw$}  {:<ow$}  {:<iw$}  {}",
                file,
                owner,
                ip,
                tcp_port,
                fw = file_width,
                ow = owner_width,
                iw = ip_width,
            );
        }
    }

    async fn request(&self, file: &str, owner: &str) {
        // Requesting a file from oneself, or a pair the view does not
        // advertise, never touches the network.
        if owner == self.name {
            println!("{}", INVALID_REQUEST);
            return;
        }

        let Some(contact) = self.view.read().get(file, owner) else {
            println!("{}", INVALID_REQUEST);
            return;
        };

        if let Err(e) = transfer::fetch(contact, file, owner, &self.name, Path::new(file)).await {
            println!("< Transfer of {} failed: {} >", file, e);
        }
    }

    async fn dereg(&mut self, name: &str) -> anyhow::Result<()> {
        if name != self.name {
            println!(">>> [You can only deregister yourself.]");
            return Ok(());
        }

        // Stop serving files before telling the server. Peers holding a
        // stale view see connection refused, which the protocol already
        // treats as the owner being busy.
        self.tcp_task.abort();

        let mut exchange = Exchange {
            socket: self.socket.as_ref(),
            server: self.server,
            payload: Bytes::from_static(codec::DEREG),
            queue: &mut self.dereg_queue,
        };

        exchange.drain_stale();
        match retry::send_and_await(&mut exchange, |ack| ack == codec::ACK_DEREG).await {
            Ok(()) => {
                self.deregistered = true;
                println!("{}", OFFLINE_BYE);
                Ok(())
            }
            Err(_) => {
                println!("{}", NO_ACK);
                bail!("server did not acknowledge the deregistration");
            }
        }
    }
}

async fn is_regular_file(path: PathBuf) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|meta| meta.is_file())
        .unwrap_or(false)
}

fn column_width(header: &str, cells: impl Iterator<Item = usize>) -> usize {
    cells.fold(header.len(), usize::max)
}

/// A command-initiated exchange: requests go out the shared socket, and
/// acknowledgement candidates come from the per-kind queue the UDP
/// listener feeds. Broadcasts never reach the command loop.
struct Exchange<'a> {
    socket: &'a UdpSocket,
    server: SocketAddr,
    payload: Bytes,
    queue: &'a mut UnboundedReceiver<Bytes>,
}

impl Exchange<'_> {
    /// Discard acks left over from an exchange that already timed out.
    fn drain_stale(&mut self) {
        while self.queue.try_recv().is_ok() {}
    }
}

impl AckTransport for Exchange<'_> {
    async fn send(&mut self) -> io::Result<()> {
        self.socket.send_to(&self.payload, self.server).await?;
        Ok(())
    }

    async fn recv(&mut self) -> io::Result<Bytes> {
        self.queue
            .recv()
            .await
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "listener task stopped"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_parse() {
        assert_eq!(Command::parse(""), Ok(None));
        assert_eq!(Command::parse("   "), Ok(None));

        assert_eq!(
            Command::parse("setdir ./shared"),
            Ok(Some(Command::SetDir(PathBuf::from("./shared"))))
        );
        assert_eq!(
            Command::parse("offer x.txt y.txt"),
            Ok(Some(Command::Offer(vec![
                "x.txt".to_string(),
                "y.txt".to_string(),
            ])))
        );
        assert_eq!(Command::parse("list"), Ok(Some(Command::List)));
        assert_eq!(
            Command::parse("request x.txt alice"),
            Ok(Some(Command::Request {
                file: "x.txt".to_string(),
                owner: "alice".to_string(),
            }))
        );
        assert_eq!(
            Command::parse("dereg alice"),
            Ok(Some(Command::Dereg("alice".to_string())))
        );
        assert_eq!(Command::parse("exit"), Ok(Some(Command::Exit)));
    }

    #[test]
    fn test_command_parse_rejects_bad_arity() {
        assert_eq!(Command::parse("setdir"), Err(()));
        assert_eq!(Command::parse("setdir a b"), Err(()));
        assert_eq!(Command::parse("offer"), Err(()));
        assert_eq!(Command::parse("list x"), Err(()));
        assert_eq!(Command::parse("request x.txt"), Err(()));
        assert_eq!(Command::parse("dereg"), Err(()));
        assert_eq!(Command::parse("download x.txt"), Err(()));
    }
}
