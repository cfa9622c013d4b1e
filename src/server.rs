//! The HTTP front end: `GET` reads files and lists directories, `PUT` creates or
//! overwrites files (creating intermediate directories implicitly), and `DELETE`
//! unlinks. Every mutating request runs inside a storage transaction that is committed
//! on success and rolled back before any error response.

use anyhow::{anyhow, Result};
use log::{info, warn};
use tiny_http::{Method, Response, Server};

use crate::disk_format::inode::{InodeNumber, InodeType, ROOT_INODE};
use crate::fs::{FileSystem, FsError};
use crate::storage::Disk;

/// The leading URL component under which the file system is exposed.
pub const MOUNT_PREFIX: &str = "ds3";

/// An HTTP status code and response body.
#[derive(Debug, PartialEq, Eq)]
pub struct Reply {
    /// The HTTP status code.
    pub status: u16,
    /// The response body.
    pub body: Vec<u8>,
}

impl Reply {
    fn ok(body: Vec<u8>) -> Self {
        Reply { status: 200, body }
    }

    fn status(status: u16) -> Self {
        Reply {
            status,
            body: vec![],
        }
    }
}

/// Handles a single request against the file system.
///
/// The URL is split on `/`; the leading component must be [`MOUNT_PREFIX`] and the
/// remainder names a path from the root directory. An empty remainder names the root
/// itself.
pub fn dispatch(fs: &mut FileSystem<Disk>, method: &Method, url: &str, body: &[u8]) -> Reply {
    let path = url.split('?').next().unwrap_or(url);
    let mut components = path.split('/').filter(|component| !component.is_empty());

    if components.next() != Some(MOUNT_PREFIX) {
        return Reply::status(404);
    }
    let rest: Vec<&str> = components.collect();

    match method {
        Method::Get => get(fs, &rest),
        Method::Put => in_transaction(fs, |fs| put(fs, &rest, body)),
        Method::Delete => in_transaction(fs, |fs| delete(fs, &rest)),
        _ => Reply::status(405),
    }
}

/// Runs `op` inside a storage transaction: commit on success, rollback on error.
fn in_transaction(
    fs: &mut FileSystem<Disk>,
    op: impl FnOnce(&mut FileSystem<Disk>) -> Result<Reply, Reply>,
) -> Reply {
    fs.storage.begin_transaction();

    match op(fs) {
        Ok(reply) => match fs.storage.commit() {
            Ok(()) => reply,
            Err(err) => {
                warn!("commit failed: {err:#}");
                Reply::status(500)
            }
        },
        Err(reply) => {
            fs.storage.rollback();
            reply
        }
    }
}

fn get(fs: &FileSystem<Disk>, path: &[&str]) -> Reply {
    let mut inum = ROOT_INODE;
    for component in path {
        inum = match fs.lookup(inum, component) {
            Ok(inum) => inum,
            Err(_) => return Reply::status(404),
        };
    }

    let inode = match fs.stat(inum) {
        Ok(inode) => inode,
        Err(_) => return Reply::status(404),
    };

    let contents = match inode.type_ {
        InodeType::Regular => fs.read(inum, inode.size as usize),
        InodeType::Directory => list_directory(fs, inum).map(String::into_bytes),
    };

    match contents {
        Ok(body) => Reply::ok(body),
        Err(err) => Reply::status(status_for(&err)),
    }
}

/// Renders a directory as one entry per line, `name` for regular files and `name/` for
/// subdirectories, sorted byte-wise ascending, with `.` and `..` omitted.
fn list_directory(fs: &FileSystem<Disk>, inum: InodeNumber) -> Result<String, FsError> {
    let mut entries = vec![];
    for entry in fs.read_directory(inum)? {
        if entry.name.matches(".") || entry.name.matches("..") {
            continue;
        }

        let type_ = fs.stat(entry.inum)?.type_;
        entries.push((entry.name.to_string(), type_ == InodeType::Directory));
    }
    entries.sort();

    Ok(entries
        .into_iter()
        .map(|(name, is_directory)| {
            if is_directory {
                format!("{name}/\n")
            } else {
                format!("{name}\n")
            }
        })
        .collect())
}

fn put(fs: &mut FileSystem<Disk>, path: &[&str], body: &[u8]) -> Result<Reply, Reply> {
    let Some((last, intermediates)) = path.split_last() else {
        return Err(Reply::status(404));
    };

    // Intermediate directories are created implicitly; a component that exists as
    // something other than a directory is a conflict.
    let mut parent = ROOT_INODE;
    for component in intermediates {
        parent = match fs.lookup(parent, component) {
            Ok(inum) => match fs.stat(inum) {
                Ok(inode) if inode.type_ == InodeType::Directory => inum,
                Ok(_) => return Err(Reply::status(409)),
                Err(err) => return Err(Reply::status(status_for(&err))),
            },
            Err(FsError::NotFound) => fs
                .create(parent, InodeType::Directory, component)
                .map_err(|err| Reply::status(status_for(&err)))?,
            Err(err) => return Err(Reply::status(status_for(&err))),
        };
    }

    let inum = fs
        .create(parent, InodeType::Regular, last)
        .map_err(|err| Reply::status(status_for(&err)))?;
    fs.write(inum, body)
        .map_err(|err| Reply::status(status_for(&err)))?;

    Ok(Reply::status(200))
}

fn delete(fs: &mut FileSystem<Disk>, path: &[&str]) -> Result<Reply, Reply> {
    let Some((last, intermediates)) = path.split_last() else {
        return Err(Reply::status(404));
    };

    let mut parent = ROOT_INODE;
    for component in intermediates {
        parent = match fs.lookup(parent, component) {
            Ok(inum) => inum,
            Err(_) => return Err(Reply::status(404)),
        };
    }

    // Unlinking a missing name succeeds, so deleting a path that never existed is 200.
    match fs.unlink(parent, last) {
        Ok(()) => Ok(Reply::status(200)),
        Err(FsError::DirNotEmpty) => Err(Reply::status(409)),
        Err(FsError::Storage(_)) => Err(Reply::status(500)),
        Err(_) => Err(Reply::status(400)),
    }
}

fn status_for(err: &FsError) -> u16 {
    match err {
        FsError::NotFound | FsError::InvalidInode | FsError::NotAllocated => 404,
        FsError::DirNotEmpty => 409,
        FsError::NotEnoughSpace => 507,
        FsError::Storage(_) => 500,
        _ => 400,
    }
}

/// Serves the file system over HTTP, one request at a time.
pub fn serve(mut fs: FileSystem<Disk>, addr: &str) -> Result<()> {
    let server = Server::http(addr).map_err(|err| anyhow!("binding {addr}: {err}"))?;
    info!("serving on http://{addr}/{MOUNT_PREFIX}/");

    for mut request in server.incoming_requests() {
        let mut body = vec![];
        if let Err(err) = request.as_reader().read_to_end(&mut body) {
            warn!("failed to read request body: {err}");
            let _ = request.respond(Response::empty(400));
            continue;
        }

        let method = request.method().clone();
        let url = request.url().to_string();

        let reply = dispatch(&mut fs, &method, &url, &body);
        info!("{method} {url} -> {}", reply.status);

        let response = Response::from_data(reply.body).with_status_code(reply.status);
        if let Err(err) = request.respond(response) {
            warn!("failed to send response: {err}");
        }
    }

    Ok(())
}
