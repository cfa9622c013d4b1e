#![warn(missing_docs)]

//! An implementation of the ds3 disk format, the file system operations over it, and an
//! HTTP front end that serves a disk image.

/// Packed allocation bitmaps.
pub mod bitmap;
/// Constants and structures that define the on-disk format.
pub mod disk_format;
/// The file system engine.
pub mod fs;
/// The HTTP front end.
pub mod server;
/// Storage backends that support block-based I/O.
pub mod storage;
